//! # byte-vm
//!
//! A minimal byte-addressable virtual machine.
//!
//! One 256-byte memory image holds eight data cells followed by the
//! program. [`execute`] runs the program from 0x08 until it halts,
//! mutating the data cells in place, or returns the fault that stopped it.

pub mod cpu;
pub mod program;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use cpu::{execute, Cpu, CpuState, CpuError, FaultKind, Memory, Registers, Instruction};
pub use program::{disassemble, ProgramBuilder};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
