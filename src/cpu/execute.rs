//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::cpu::{Memory, Registers};
use crate::cpu::decode::{self, Instruction, DecodeError};
use crate::cpu::memory::{is_data_addr, MEMORY_SIZE};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed HALT instruction).
    Halted,
    /// CPU hit a fault. Terminal.
    Faulted,
}

/// The CPU: register file, memory image and run state.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instructions executed so far, HALT included.
    pub cycles: u64,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a new CPU over zeroed memory.
    pub fn new() -> Self {
        Self::with_memory(Memory::new())
    }

    /// Create a CPU over a prepared memory image.
    pub fn with_memory(mem: Memory) -> Self {
        Self {
            regs: Registers::new(),
            mem,
            state: CpuState::Running,
            cycles: 0,
            last_instr: None,
        }
    }

    /// Reset registers and run state. Memory is left as it is.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or the fault. A fault
    /// moves the CPU to [`CpuState::Faulted`] and leaves pc pointing at
    /// the offending instruction.
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let pc = self.regs.pc;
        let raw = self.mem.fetch(pc);

        let result = decode::decode(raw)
            .map_err(|e| CpuError::from_decode(e, pc))
            .and_then(|instr| self.execute(instr).map(|()| instr));

        match result {
            Ok(instr) => {
                trace!(pc, ?instr, r0 = self.regs.gpr[0], r1 = self.regs.gpr[1], "step");
                self.cycles += 1;
                self.last_instr = Some(instr);
                Ok(instr)
            }
            Err(err) => {
                warn!(pc, %err, "fault");
                self.state = CpuState::Faulted;
                Err(err)
            }
        }
    }

    /// Run until halt or fault.
    ///
    /// Returns the number of instructions executed. A program that never
    /// halts keeps this running forever; see [`Cpu::run_limited`].
    #[instrument(skip(self), fields(pc = self.regs.pc))]
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step()?;
        }

        let executed = self.cycles - start_cycles;
        debug!(executed, "halted");
        Ok(executed)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles + max_cycles;

        while self.state == CpuState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction, then advance pc unless the
    /// instruction owns it.
    fn execute(&mut self, instr: Instruction) -> Result<(), CpuError> {
        match instr {
            // ==================== Data Transfer ====================

            Instruction::Load { reg, addr } => {
                // Loads may read anywhere, including the program itself.
                let value = self.mem.read(addr);
                self.regs.write(reg, value)?;
            }

            Instruction::Store { reg, addr } => {
                // Same boundary as `Memory::store`, checked before the register.
                if !is_data_addr(addr) {
                    return Err(CpuError::InvalidMemoryAccess { addr, pc: self.regs.pc });
                }
                let value = self.regs.read(reg)?;
                self.mem.write(addr, value);
            }

            // ==================== Arithmetic ====================

            Instruction::Add { dst, src } => {
                let result = self.regs.read(dst)?.wrapping_add(self.regs.read(src)?);
                self.regs.write(dst, result)?;
            }

            Instruction::Sub { dst, src } => {
                let result = self.regs.read(dst)?.wrapping_sub(self.regs.read(src)?);
                self.regs.write(dst, result)?;
            }

            Instruction::Addi { reg, imm } => {
                let result = self.regs.read(reg)?.wrapping_add(imm);
                self.regs.write(reg, result)?;
            }

            Instruction::Subi { reg, imm } => {
                let result = self.regs.read(reg)?.wrapping_sub(imm);
                self.regs.write(reg, result)?;
            }

            // ==================== Control Flow ====================

            Instruction::Jump { addr } => {
                self.regs.jump(addr);
                return Ok(());
            }

            Instruction::Beqz { reg, offset } => {
                // Relative to this instruction; the +3 below still applies.
                if self.regs.read(reg)? == 0 {
                    self.regs.branch(offset);
                }
            }

            Instruction::Halt => {
                self.state = CpuState::Halted;
                return Ok(());
            }
        }

        self.regs.advance_pc();
        Ok(())
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// Check if the CPU has faulted.
    pub fn is_faulted(&self) -> bool {
        self.state == CpuState::Faulted
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Run the program in `memory` to completion, mutating it in place.
///
/// Execution starts at 0x08 with both registers zeroed. Returns `Ok(())`
/// once a HALT executes. On a fault the error is returned and `memory`
/// keeps every write made before the fault.
pub fn execute(memory: &mut [u8; MEMORY_SIZE]) -> Result<(), CpuError> {
    let mut cpu = Cpu::with_memory(Memory::from_bytes(*memory));
    let result = cpu.run();
    *memory = cpu.mem.into_bytes();
    result.map(|_| ())
}

/// Fault category, without the diagnostic payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    InvalidMemoryAccess,
    UnrecognizedOpcode,
    RegisterOutOfRange,
    NotRunning,
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("invalid memory access {addr:#04x} at pc {pc:#04x}")]
    InvalidMemoryAccess { addr: u8, pc: u8 },

    #[error("unrecognized opcode {opcode:#04x} at pc {pc:#04x}")]
    UnrecognizedOpcode { opcode: u8, pc: u8 },

    #[error("register index {index} out of range at pc {pc:#04x}")]
    RegisterOutOfRange { index: u8, pc: u8 },

    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),
}

impl CpuError {
    fn from_decode(err: DecodeError, pc: u8) -> Self {
        match err {
            DecodeError::UnrecognizedOpcode(opcode) => CpuError::UnrecognizedOpcode { opcode, pc },
        }
    }

    /// The fault category.
    pub fn kind(&self) -> FaultKind {
        match self {
            CpuError::InvalidMemoryAccess { .. } => FaultKind::InvalidMemoryAccess,
            CpuError::UnrecognizedOpcode { .. } => FaultKind::UnrecognizedOpcode,
            CpuError::RegisterOutOfRange { .. } => FaultKind::RegisterOutOfRange,
            CpuError::NotRunning(_) => FaultKind::NotRunning,
        }
    }

    /// Address of the faulting instruction, if the error came from one.
    pub fn pc(&self) -> Option<u8> {
        match *self {
            CpuError::InvalidMemoryAccess { pc, .. }
            | CpuError::UnrecognizedOpcode { pc, .. }
            | CpuError::RegisterOutOfRange { pc, .. } => Some(pc),
            CpuError::NotRunning(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::memory::PROGRAM_START;
    use proptest::prelude::*;

    fn make_image(data: &[u8], instructions: &[Instruction]) -> [u8; MEMORY_SIZE] {
        let mut image = [0u8; MEMORY_SIZE];
        image[..data.len()].copy_from_slice(data);
        for (i, instr) in instructions.iter().enumerate() {
            let at = PROGRAM_START as usize + i * 3;
            image[at..at + 3].copy_from_slice(&encode(instr));
        }
        image
    }

    fn make_cpu(data: &[u8], instructions: &[Instruction]) -> Cpu {
        Cpu::with_memory(Memory::from_bytes(make_image(data, instructions)))
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = make_cpu(&[], &[Instruction::Halt]);

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 0x08);
    }

    #[test]
    fn test_load_leaves_memory_unchanged() {
        let mut cpu = make_cpu(
            &[0x42],
            &[Instruction::Load { reg: 0, addr: 0x00 }, Instruction::Halt],
        );
        let before = cpu.mem.clone();

        cpu.run().unwrap();

        assert_eq!(cpu.regs.gpr[0], 0x42);
        assert_eq!(cpu.mem, before);
    }

    #[test]
    fn test_load_reads_instruction_region() {
        let mut cpu = make_cpu(
            &[],
            &[Instruction::Load { reg: 1, addr: 0x08 }, Instruction::Halt],
        );

        cpu.run().unwrap();

        // The opcode of the LOAD itself.
        assert_eq!(cpu.regs.gpr[1], 0x01);
    }

    #[test]
    fn test_addi_then_store() {
        let mut image = make_image(
            &[],
            &[
                Instruction::Addi { reg: 0, imm: 5 },
                Instruction::Store { reg: 0, addr: 0x01 },
                Instruction::Halt,
            ],
        );

        execute(&mut image).unwrap();

        assert_eq!(image[0x01], 5);
    }

    #[test]
    fn test_wraparound_arithmetic() {
        let mut cpu = make_cpu(
            &[],
            &[
                Instruction::Addi { reg: 0, imm: 0xFF },
                Instruction::Addi { reg: 1, imm: 0x01 },
                Instruction::Add { dst: 0, src: 1 },
                Instruction::Store { reg: 0, addr: 0x00 },
                Instruction::Sub { dst: 0, src: 1 },
                Instruction::Store { reg: 0, addr: 0x01 },
                Instruction::Subi { reg: 1, imm: 0x02 },
                Instruction::Store { reg: 1, addr: 0x02 },
                Instruction::Halt,
            ],
        );

        cpu.run().unwrap();

        assert_eq!(&cpu.mem.data()[..3], &[0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_jump_to_self_never_halts() {
        let mut cpu = make_cpu(&[], &[Instruction::Jump { addr: 0x08 }]);

        let executed = cpu.run_limited(1000).unwrap();

        assert_eq!(executed, 1000);
        assert!(cpu.is_running());
        assert_eq!(cpu.regs.pc, 0x08);
    }

    #[test]
    fn test_beqz_taken_lands_after_offset() {
        let mut cpu = make_cpu(&[], &[Instruction::Beqz { reg: 0, offset: 0x10 }]);

        cpu.step().unwrap();

        assert_eq!(cpu.regs.pc, 0x1B);
    }

    #[test]
    fn test_beqz_not_taken_falls_through() {
        let mut cpu = make_cpu(&[], &[Instruction::Beqz { reg: 0, offset: 0x10 }]);
        cpu.regs.gpr[0] = 1;

        cpu.step().unwrap();

        assert_eq!(cpu.regs.pc, 0x0B);
    }

    #[test]
    fn test_countdown_loop() {
        // 08: LOAD r0, [0]
        // 0B: BEQZ r0 -> 14
        // 0E: SUBI r0, 1
        // 11: JUMP 0B
        // 14: HALT
        let mut cpu = make_cpu(
            &[3],
            &[
                Instruction::Load { reg: 0, addr: 0x00 },
                Instruction::Beqz { reg: 0, offset: decode::branch_offset(0x0B, 0x14) },
                Instruction::Subi { reg: 0, imm: 1 },
                Instruction::Jump { addr: 0x0B },
                Instruction::Halt,
            ],
        );

        let executed = cpu.run().unwrap();

        assert_eq!(cpu.regs.gpr[0], 0);
        assert_eq!(executed, 1 + 3 * 3 + 1 + 1);
    }

    #[test]
    fn test_store_to_last_data_cell() {
        let mut cpu = make_cpu(
            &[],
            &[
                Instruction::Addi { reg: 1, imm: 0x99 },
                Instruction::Store { reg: 1, addr: 0x07 },
                Instruction::Halt,
            ],
        );

        cpu.run().unwrap();

        assert_eq!(cpu.mem.read(0x07), 0x99);
    }

    #[test]
    fn test_store_into_program_faults() {
        let mut cpu = make_cpu(&[], &[Instruction::Store { reg: 0, addr: 0x08 }]);
        let before = cpu.mem.clone();

        let err = cpu.run().unwrap_err();

        assert_eq!(err, CpuError::InvalidMemoryAccess { addr: 0x08, pc: 0x08 });
        assert_eq!(err.kind(), FaultKind::InvalidMemoryAccess);
        assert!(cpu.is_faulted());
        assert_eq!(cpu.mem, before);
    }

    #[test]
    fn test_store_checks_address_before_register() {
        let mut cpu = make_cpu(&[], &[Instruction::Store { reg: 7, addr: 0x80 }]);

        let err = cpu.step().unwrap_err();

        assert_eq!(err, CpuError::InvalidMemoryAccess { addr: 0x80, pc: 0x08 });
    }

    #[test]
    fn test_unrecognized_opcode() {
        let mut image = [0u8; MEMORY_SIZE];
        image[0x08] = 0x09;

        let err = execute(&mut image).unwrap_err();

        assert_eq!(err, CpuError::UnrecognizedOpcode { opcode: 0x09, pc: 0x08 });
        assert_eq!(err.pc(), Some(0x08));
    }

    #[test]
    fn test_register_out_of_range() {
        let mut cpu = make_cpu(
            &[],
            &[Instruction::Addi { reg: 0, imm: 1 }, Instruction::Load { reg: 2, addr: 0x00 }],
        );

        let err = cpu.run().unwrap_err();

        assert_eq!(err, CpuError::RegisterOutOfRange { index: 2, pc: 0x0B });
        assert_eq!(err.kind(), FaultKind::RegisterOutOfRange);
    }

    #[test]
    fn test_register_out_of_range_every_opcode() {
        let cases = [
            Instruction::Load { reg: 0xFF, addr: 0x00 },
            Instruction::Store { reg: 0xFF, addr: 0x00 },
            Instruction::Add { dst: 0xFF, src: 0 },
            Instruction::Add { dst: 0, src: 0xFF },
            Instruction::Sub { dst: 0xFF, src: 0 },
            Instruction::Sub { dst: 0, src: 0xFF },
            Instruction::Addi { reg: 0xFF, imm: 1 },
            Instruction::Subi { reg: 0xFF, imm: 1 },
            Instruction::Beqz { reg: 0xFF, offset: 0x10 },
        ];

        for instr in cases {
            let mut image = make_image(&[0x11], &[instr, Instruction::Halt]);
            let before = image;

            let err = execute(&mut image).unwrap_err();

            assert_eq!(
                err,
                CpuError::RegisterOutOfRange { index: 0xFF, pc: 0x08 },
                "{:?}",
                instr
            );
            assert_eq!(image, before, "{:?}", instr);
        }
    }

    #[test]
    fn test_fault_keeps_pc_and_cycles() {
        let mut cpu = make_cpu(
            &[],
            &[Instruction::Addi { reg: 0, imm: 1 }, Instruction::Add { dst: 0, src: 9 }],
        );

        assert!(cpu.run().is_err());

        assert_eq!(cpu.regs.pc, 0x0B);
        assert_eq!(cpu.cycles, 1);
        assert_eq!(cpu.last_instruction(), Some(Instruction::Addi { reg: 0, imm: 1 }));
    }

    #[test]
    fn test_partial_writes_survive_fault() {
        let mut image = make_image(
            &[],
            &[
                Instruction::Addi { reg: 0, imm: 7 },
                Instruction::Store { reg: 0, addr: 0x03 },
                Instruction::Store { reg: 0, addr: 0x40 },
                Instruction::Store { reg: 0, addr: 0x04 },
                Instruction::Halt,
            ],
        );

        let err = execute(&mut image).unwrap_err();

        assert_eq!(err.kind(), FaultKind::InvalidMemoryAccess);
        assert_eq!(image[0x03], 7);
        assert_eq!(image[0x04], 0);
    }

    #[test]
    fn test_terminal_states() {
        let mut cpu = make_cpu(&[], &[Instruction::Halt]);
        cpu.run().unwrap();

        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Halted)));
        assert_eq!(cpu.cycles, 1);

        let mut cpu = make_cpu(&[], &[]);
        assert!(cpu.step().is_err());
        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Faulted)));
    }

    #[test]
    fn test_operand_fetch_wraps_past_end() {
        // JUMP to 0xFF, where an ADDI takes its operands from 0x00 and 0x01.
        // The next pc wraps to 0x02, which holds HALT.
        let mut image = make_image(&[0x00, 0x07, 0xFF], &[Instruction::Jump { addr: 0xFF }]);
        image[0xFF] = 0x05;
        let mut cpu = Cpu::with_memory(Memory::from_bytes(image));

        cpu.run().unwrap();

        assert_eq!(cpu.regs.gpr[0], 0x07);
        assert_eq!(cpu.regs.pc, 0x02);
    }

    #[test]
    fn test_reset_keeps_memory() {
        let mut cpu = make_cpu(
            &[],
            &[
                Instruction::Addi { reg: 0, imm: 2 },
                Instruction::Store { reg: 0, addr: 0x00 },
                Instruction::Halt,
            ],
        );
        cpu.run().unwrap();

        cpu.reset();

        assert!(cpu.is_running());
        assert_eq!(cpu.regs, Registers::new());
        assert_eq!(cpu.mem.read(0x00), 2);
        assert_eq!(cpu.run().unwrap(), 3);
    }

    #[test]
    fn test_snapshot_json() {
        let mut cpu = make_cpu(
            &[0x10],
            &[Instruction::Load { reg: 1, addr: 0x00 }, Instruction::Halt],
        );
        cpu.run().unwrap();

        let json = serde_json::to_string(&cpu).unwrap();
        let back: Cpu = serde_json::from_str(&json).unwrap();

        assert_eq!(back.regs, cpu.regs);
        assert_eq!(back.mem, cpu.mem);
        assert_eq!(back.state, CpuState::Halted);
        assert_eq!(back.last_instruction(), Some(Instruction::Halt));
    }

    fn run_arith(first: u8, second: u8, op: Instruction) -> u8 {
        let mut cpu = make_cpu(
            &[],
            &[
                Instruction::Addi { reg: 0, imm: first },
                Instruction::Addi { reg: 1, imm: second },
                op,
                Instruction::Halt,
            ],
        );
        cpu.run().unwrap();
        cpu.regs.gpr[0]
    }

    proptest! {
        #[test]
        fn prop_add_sub_wrap(a in any::<u8>(), b in any::<u8>()) {
            prop_assert_eq!(run_arith(a, b, Instruction::Add { dst: 0, src: 1 }), a.wrapping_add(b));
            prop_assert_eq!(run_arith(a, b, Instruction::Sub { dst: 0, src: 1 }), a.wrapping_sub(b));
        }

        #[test]
        fn prop_immediates_wrap(a in any::<u8>(), imm in any::<u8>()) {
            prop_assert_eq!(run_arith(a, 0, Instruction::Addi { reg: 0, imm }), a.wrapping_add(imm));
            prop_assert_eq!(run_arith(a, 0, Instruction::Subi { reg: 0, imm }), a.wrapping_sub(imm));
        }

        #[test]
        fn prop_store_boundary_matches_memory(addr in any::<u8>(), value in any::<u8>()) {
            let mut cpu = make_cpu(&[], &[
                Instruction::Addi { reg: 0, imm: value },
                Instruction::Store { reg: 0, addr },
            ]);
            let mut mem = Memory::new();

            cpu.step().unwrap();
            let engine = cpu.step();
            let checked = mem.store(addr, value);

            prop_assert_eq!(engine.is_ok(), checked.is_ok());
            if let Err(err) = engine {
                prop_assert_eq!(err, CpuError::InvalidMemoryAccess { addr, pc: 0x0B });
            } else {
                prop_assert_eq!(cpu.mem.read(addr), value);
            }
        }

        #[test]
        fn prop_beqz_landing(offset in any::<u8>(), value in any::<u8>()) {
            let mut cpu = make_cpu(&[], &[Instruction::Beqz { reg: 0, offset }]);
            cpu.regs.gpr[0] = value;

            cpu.step().unwrap();

            let expected = if value == 0 {
                0x08u8.wrapping_add(offset).wrapping_add(3)
            } else {
                0x0B
            };
            prop_assert_eq!(cpu.regs.pc, expected);
        }
    }
}
