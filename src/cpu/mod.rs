//! CPU emulation.
//!
//! This module implements the complete machine:
//! - 256 one-byte memory cells, 0x00-0x07 data and 0x08-0xFF program
//! - 2 general-purpose registers plus the program counter
//! - 9-instruction set with fixed three-byte instructions

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;

pub use memory::{Memory, MemoryError, MEMORY_SIZE};
pub use registers::Registers;
pub use decode::{Instruction, Opcode, DecodeError};
pub use execute::{execute, Cpu, CpuError, CpuState, FaultKind};
