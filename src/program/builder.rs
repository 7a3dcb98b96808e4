//! In-memory program builder.
//!
//! Lays encoded instructions out from 0x08 and fills the data region:
//!
//! ```
//! use bytevm::cpu::{Instruction, execute};
//! use bytevm::program::ProgramBuilder;
//!
//! let mut b = ProgramBuilder::new();
//! b.data(0x00, 2).unwrap();
//! b.emit(Instruction::Load { reg: 0, addr: 0x00 }).unwrap();
//! b.emit(Instruction::Addi { reg: 0, imm: 3 }).unwrap();
//! b.emit(Instruction::Store { reg: 0, addr: 0x01 }).unwrap();
//! b.emit(Instruction::Halt).unwrap();
//!
//! let mut image = b.build().into_bytes();
//! execute(&mut image).unwrap();
//! assert_eq!(image[0x01], 5);
//! ```

use crate::cpu::decode::{encode, Instruction};
use crate::cpu::memory::{Memory, MemoryError, MEMORY_SIZE, PROGRAM_START};
use thiserror::Error;

/// Builds a memory image one instruction at a time.
#[derive(Debug, Clone)]
pub struct ProgramBuilder {
    mem: Memory,
    /// Address of the next instruction slot. May reach 0x100.
    cursor: usize,
}

impl ProgramBuilder {
    /// Start from zeroed memory.
    pub fn new() -> Self {
        Self {
            mem: Memory::new(),
            cursor: PROGRAM_START as usize,
        }
    }

    /// Set one data cell.
    pub fn data(&mut self, addr: u8, value: u8) -> Result<&mut Self, BuildError> {
        self.mem.store(addr, value)?;
        Ok(self)
    }

    /// Set the data region from 0x00 onward.
    pub fn data_cells(&mut self, values: &[u8]) -> Result<&mut Self, BuildError> {
        self.mem.set_data(values)?;
        Ok(self)
    }

    /// Append an instruction, returning the address it was placed at.
    pub fn emit(&mut self, instr: Instruction) -> Result<u8, BuildError> {
        if self.cursor + 3 > MEMORY_SIZE {
            return Err(BuildError::ProgramTooLarge { addr: self.cursor });
        }

        let addr = self.cursor as u8;
        self.place(addr, &instr);
        self.cursor += 3;
        Ok(addr)
    }

    /// Rewrite an already emitted instruction, typically a forward branch.
    pub fn patch(&mut self, addr: u8, instr: Instruction) -> Result<(), BuildError> {
        if addr < PROGRAM_START || addr as usize + 3 > self.cursor {
            return Err(BuildError::NotEmitted(addr));
        }
        self.place(addr, &instr);
        Ok(())
    }

    fn place(&mut self, addr: u8, instr: &Instruction) {
        for (i, byte) in encode(instr).into_iter().enumerate() {
            self.mem.write(addr + i as u8, byte);
        }
    }

    /// The image built so far.
    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    /// Number of instruction bytes emitted.
    pub fn program_len(&self) -> usize {
        self.cursor - PROGRAM_START as usize
    }

    /// Finish and return the memory image.
    pub fn build(self) -> Memory {
        self.mem
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur while building a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("instruction at {addr:#05x} would run past the end of memory")]
    ProgramTooLarge { addr: usize },

    #[error("no instruction emitted at {0:#04x}")]
    NotEmitted(u8),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}
