//! Program tools.
//!
//! This module provides:
//! - An in-memory image builder (instructions laid out from 0x08)
//! - A disassembler (image → readable text)
//! - The catalogue of built-in sample programs

pub mod builder;
pub mod disasm;
pub mod samples;

pub use builder::{BuildError, ProgramBuilder};
pub use disasm::{disassemble, disassemble_instruction};
pub use samples::{Expect, Sample};
