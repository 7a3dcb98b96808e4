//! CPU registers.
//!
//! The machine has:
//! - pc: 8-bit program counter, starts at 0x08
//! - r0, r1: two 8-bit general-purpose registers
//!
//! The pc is control state and lives in its own field; operand bytes only
//! ever index the general-purpose array.

use crate::cpu::execute::CpuError;
use crate::cpu::memory::PROGRAM_START;
use serde::{Serialize, Deserialize};

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 2;

/// Width of every instruction in bytes.
pub const INSTRUCTION_WIDTH: u8 = 3;

/// The register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// Program counter: address of the next instruction.
    pub pc: u8,

    /// General-purpose registers r0 and r1.
    pub gpr: [u8; REGISTER_COUNT],
}

impl Registers {
    /// Create a register file in its power-on state.
    pub fn new() -> Self {
        Self {
            pc: PROGRAM_START,
            gpr: [0; REGISTER_COUNT],
        }
    }

    /// Reset to the power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read a general-purpose register by operand index.
    ///
    /// Indices past the end of the register file fault.
    #[inline]
    pub fn read(&self, index: u8) -> Result<u8, CpuError> {
        self.gpr
            .get(index as usize)
            .copied()
            .ok_or(CpuError::RegisterOutOfRange { index, pc: self.pc })
    }

    /// Write a general-purpose register by operand index.
    #[inline]
    pub fn write(&mut self, index: u8, value: u8) -> Result<(), CpuError> {
        let pc = self.pc;
        let slot = self
            .gpr
            .get_mut(index as usize)
            .ok_or(CpuError::RegisterOutOfRange { index, pc })?;
        *slot = value;
        Ok(())
    }

    /// Step past the current instruction.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u8 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(INSTRUCTION_WIDTH);
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u8) {
        self.pc = addr;
    }

    /// Move the program counter by a relative offset, modulo 256.
    pub fn branch(&mut self, offset: u8) {
        self.pc = self.pc.wrapping_add(offset);
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let regs = Registers::new();
        assert_eq!(regs.pc, 0x08);
        assert_eq!(regs.gpr, [0, 0]);
    }

    #[test]
    fn test_read_write() {
        let mut regs = Registers::new();
        regs.write(1, 0x42).unwrap();
        assert_eq!(regs.read(1).unwrap(), 0x42);
        assert_eq!(regs.read(0).unwrap(), 0);
    }

    #[test]
    fn test_index_out_of_range() {
        let mut regs = Registers::new();
        regs.pc = 0x20;

        assert!(matches!(
            regs.read(2),
            Err(CpuError::RegisterOutOfRange { index: 2, pc: 0x20 })
        ));
        assert!(matches!(
            regs.write(0xFF, 1),
            Err(CpuError::RegisterOutOfRange { index: 0xFF, pc: 0x20 })
        ));
        assert_eq!(regs.gpr, [0, 0]);
    }

    #[test]
    fn test_advance_pc_wraps() {
        let mut regs = Registers::new();
        regs.pc = 0xFE;

        let old = regs.advance_pc();
        assert_eq!(old, 0xFE);
        assert_eq!(regs.pc, 0x01);
    }

    #[test]
    fn test_branch_wraps() {
        let mut regs = Registers::new();
        regs.pc = 0xF0;
        regs.branch(0x20);
        assert_eq!(regs.pc, 0x10);
    }
}
