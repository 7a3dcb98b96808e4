//! Instruction decoder.
//!
//! Every instruction is three bytes wide: an opcode followed by two
//! operand bytes. Instructions that need fewer operands still occupy
//! the full slot; the unused bytes are padding.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Decoded instruction.
///
/// The instruction set has nine instructions organized into groups:
/// - Transfer: LOAD, STORE
/// - Arithmetic: ADD, SUB, ADDI, SUBI (all modulo 256)
/// - Control: JUMP, BEQZ, HALT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Data Transfer ====================

    /// Load register: reg := [addr]
    Load { reg: u8, addr: u8 },

    /// Store register: [addr] := reg (addr must be in the data region)
    Store { reg: u8, addr: u8 },

    // ==================== Arithmetic ====================

    /// Add registers: dst := dst + src
    Add { dst: u8, src: u8 },

    /// Subtract registers: dst := dst - src
    Sub { dst: u8, src: u8 },

    /// Add immediate: reg := reg + imm
    Addi { reg: u8, imm: u8 },

    /// Subtract immediate: reg := reg - imm
    Subi { reg: u8, imm: u8 },

    // ==================== Control Flow ====================

    /// Unconditional jump: pc := addr
    Jump { addr: u8 },

    /// Branch if zero: if reg = 0 then pc := pc + offset, then the usual +3
    Beqz { reg: u8, offset: u8 },

    /// Halt execution
    Halt,
}

/// Opcode byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode;

impl Opcode {
    pub const LOAD: u8 = 0x01;
    pub const STORE: u8 = 0x02;
    pub const ADD: u8 = 0x03;
    pub const SUB: u8 = 0x04;
    pub const ADDI: u8 = 0x05;
    pub const SUBI: u8 = 0x06;
    pub const JUMP: u8 = 0x07;
    pub const BEQZ: u8 = 0x08;
    pub const HALT: u8 = 0xFF;
}

impl Instruction {
    /// The opcode byte for this instruction.
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Load { .. } => Opcode::LOAD,
            Instruction::Store { .. } => Opcode::STORE,
            Instruction::Add { .. } => Opcode::ADD,
            Instruction::Sub { .. } => Opcode::SUB,
            Instruction::Addi { .. } => Opcode::ADDI,
            Instruction::Subi { .. } => Opcode::SUBI,
            Instruction::Jump { .. } => Opcode::JUMP,
            Instruction::Beqz { .. } => Opcode::BEQZ,
            Instruction::Halt => Opcode::HALT,
        }
    }

    /// Upper-case assembly mnemonic.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Load { .. } => "LOAD",
            Instruction::Store { .. } => "STORE",
            Instruction::Add { .. } => "ADD",
            Instruction::Sub { .. } => "SUB",
            Instruction::Addi { .. } => "ADDI",
            Instruction::Subi { .. } => "SUBI",
            Instruction::Jump { .. } => "JUMP",
            Instruction::Beqz { .. } => "BEQZ",
            Instruction::Halt => "HALT",
        }
    }
}

/// Decode the three bytes of an instruction slot.
pub fn decode(bytes: [u8; 3]) -> Result<Instruction, DecodeError> {
    let [op, a, b] = bytes;

    let instruction = match op {
        Opcode::LOAD => Instruction::Load { reg: a, addr: b },
        Opcode::STORE => Instruction::Store { reg: a, addr: b },
        Opcode::ADD => Instruction::Add { dst: a, src: b },
        Opcode::SUB => Instruction::Sub { dst: a, src: b },
        Opcode::ADDI => Instruction::Addi { reg: a, imm: b },
        Opcode::SUBI => Instruction::Subi { reg: a, imm: b },
        Opcode::JUMP => Instruction::Jump { addr: a },
        Opcode::BEQZ => Instruction::Beqz { reg: a, offset: b },
        Opcode::HALT => Instruction::Halt,
        _ => return Err(DecodeError::UnrecognizedOpcode(op)),
    };

    Ok(instruction)
}

/// Encode an instruction into its three-byte slot. Padding bytes are zero.
pub fn encode(instr: &Instruction) -> [u8; 3] {
    let (a, b) = match *instr {
        Instruction::Load { reg, addr } | Instruction::Store { reg, addr } => (reg, addr),
        Instruction::Add { dst, src } | Instruction::Sub { dst, src } => (dst, src),
        Instruction::Addi { reg, imm } | Instruction::Subi { reg, imm } => (reg, imm),
        Instruction::Jump { addr } => (addr, 0),
        Instruction::Beqz { reg, offset } => (reg, offset),
        Instruction::Halt => (0, 0),
    };

    [instr.opcode(), a, b]
}

/// Offset that makes a taken `BEQZ` placed at `beqz_at` land on `target`.
///
/// A taken branch lands at `beqz_at + offset + 3`, so the offset is
/// `target - beqz_at - 3`, all modulo 256.
pub fn branch_offset(beqz_at: u8, target: u8) -> u8 {
    target.wrapping_sub(beqz_at).wrapping_sub(3)
}

/// Address a taken `BEQZ` at `beqz_at` with `offset` lands on.
pub fn branch_target(beqz_at: u8, offset: u8) -> u8 {
    beqz_at.wrapping_add(offset).wrapping_add(3)
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unrecognized opcode {0:#04x}")]
    UnrecognizedOpcode(u8),
}
