//! Built-in sample programs.
//!
//! Each sample builds its image in memory and knows what a correct run
//! leaves behind, which makes the catalogue double as a self-test.

use crate::cpu::decode::{branch_offset, Instruction};
use crate::cpu::{CpuError, FaultKind, Memory};
use crate::program::builder::{BuildError, ProgramBuilder};
use thiserror::Error;

/// What a run of a sample must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Halts, with these `(addr, value)` data cells.
    Data(&'static [(u8, u8)]),
    /// Faults with this kind.
    Fault(FaultKind),
}

/// A named program.
#[derive(Clone, Copy)]
pub struct Sample {
    pub name: &'static str,
    pub description: &'static str,
    /// Data region contents the expectation is computed for.
    pub data: &'static [u8],
    pub expect: Expect,
    emit: fn(&mut ProgramBuilder) -> Result<(), BuildError>,
}

impl Sample {
    /// Build the image with the default data cells.
    pub fn image(&self) -> Result<Memory, BuildError> {
        self.image_with_data(&[])
    }

    /// Build the image, then overwrite the data region from 0x00 with
    /// `overrides`.
    pub fn image_with_data(&self, overrides: &[u8]) -> Result<Memory, BuildError> {
        let mut b = ProgramBuilder::new();
        b.data_cells(self.data)?;
        (self.emit)(&mut b)?;
        if !overrides.is_empty() {
            b.data_cells(overrides)?;
        }
        Ok(b.build())
    }

    /// Compare the outcome of a run on the default image with the expectation.
    pub fn check(&self, outcome: &Result<u64, CpuError>, mem: &Memory) -> Result<(), CheckError> {
        match (self.expect, outcome) {
            (Expect::Data(cells), Ok(_)) => {
                for &(addr, expected) in cells {
                    let actual = mem.read(addr);
                    if actual != expected {
                        return Err(CheckError::WrongCell { addr, expected, actual });
                    }
                }
                Ok(())
            }
            (Expect::Data(_), Err(err)) => Err(CheckError::UnexpectedFault(err.clone())),
            (Expect::Fault(kind), Ok(_)) => Err(CheckError::MissingFault(kind)),
            (Expect::Fault(kind), Err(err)) if err.kind() == kind => Ok(()),
            (Expect::Fault(expected), Err(err)) => Err(CheckError::WrongFault {
                expected,
                actual: err.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sample")
            .field("name", &self.name)
            .field("data", &self.data)
            .field("expect", &self.expect)
            .finish()
    }
}

/// A sample run that did not match its expectation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("expected halt, got fault: {0}")]
    UnexpectedFault(CpuError),

    #[error("expected {0:?} fault, program halted")]
    MissingFault(FaultKind),

    #[error("expected {expected:?} fault, got: {actual}")]
    WrongFault { expected: FaultKind, actual: CpuError },

    #[error("cell {addr:#04x}: expected {expected:#04x}, got {actual:#04x}")]
    WrongCell { addr: u8, expected: u8, actual: u8 },
}

static SAMPLES: &[Sample] = &[
    Sample {
        name: "load",
        description: "load cell 0 into r0 and halt; memory is unchanged",
        data: &[0x42],
        expect: Expect::Data(&[(0x00, 0x42)]),
        emit: emit_load,
    },
    Sample {
        name: "addi-store",
        description: "add 5 to r0 and store it in cell 1",
        data: &[],
        expect: Expect::Data(&[(0x01, 5)]),
        emit: emit_addi_store,
    },
    Sample {
        name: "sum",
        description: "cell 2 := cell 0 + cell 1",
        data: &[20, 22],
        expect: Expect::Data(&[(0x02, 42)]),
        emit: emit_sum,
    },
    Sample {
        name: "multiply",
        description: "cell 2 := cell 0 * cell 1 by repeated addition (consumes cell 1)",
        data: &[6, 7],
        expect: Expect::Data(&[(0x01, 0), (0x02, 42)]),
        emit: emit_multiply,
    },
    Sample {
        name: "wrap",
        description: "0xFF + 1 wraps to 0 (cell 0), 0 - 1 wraps to 0xFF (cell 1)",
        data: &[],
        expect: Expect::Data(&[(0x00, 0x00), (0x01, 0xFF)]),
        emit: emit_wrap,
    },
    Sample {
        name: "store-fault",
        description: "store into the program region, which faults",
        data: &[],
        expect: Expect::Fault(FaultKind::InvalidMemoryAccess),
        emit: emit_store_fault,
    },
];

/// All samples, in catalogue order.
pub fn all() -> &'static [Sample] {
    SAMPLES
}

/// Look a sample up by name.
pub fn find(name: &str) -> Option<&'static Sample> {
    SAMPLES.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

fn emit_load(b: &mut ProgramBuilder) -> Result<(), BuildError> {
    b.emit(Instruction::Load { reg: 0, addr: 0x00 })?;
    b.emit(Instruction::Halt)?;
    Ok(())
}

fn emit_addi_store(b: &mut ProgramBuilder) -> Result<(), BuildError> {
    b.emit(Instruction::Addi { reg: 0, imm: 5 })?;
    b.emit(Instruction::Store { reg: 0, addr: 0x01 })?;
    b.emit(Instruction::Halt)?;
    Ok(())
}

fn emit_sum(b: &mut ProgramBuilder) -> Result<(), BuildError> {
    b.emit(Instruction::Load { reg: 0, addr: 0x00 })?;
    b.emit(Instruction::Load { reg: 1, addr: 0x01 })?;
    b.emit(Instruction::Add { dst: 0, src: 1 })?;
    b.emit(Instruction::Store { reg: 0, addr: 0x02 })?;
    b.emit(Instruction::Halt)?;
    Ok(())
}

fn emit_multiply(b: &mut ProgramBuilder) -> Result<(), BuildError> {
    // r0 accumulates; cell 1 is the loop counter, reloaded into r1 each pass.
    let top = b.emit(Instruction::Load { reg: 1, addr: 0x01 })?;
    let exit = b.emit(Instruction::Beqz { reg: 1, offset: 0 })?;
    b.emit(Instruction::Subi { reg: 1, imm: 1 })?;
    b.emit(Instruction::Store { reg: 1, addr: 0x01 })?;
    b.emit(Instruction::Load { reg: 1, addr: 0x00 })?;
    b.emit(Instruction::Add { dst: 0, src: 1 })?;
    b.emit(Instruction::Jump { addr: top })?;
    let done = b.emit(Instruction::Store { reg: 0, addr: 0x02 })?;
    b.emit(Instruction::Halt)?;

    b.patch(exit, Instruction::Beqz { reg: 1, offset: branch_offset(exit, done) })?;
    Ok(())
}

fn emit_wrap(b: &mut ProgramBuilder) -> Result<(), BuildError> {
    b.emit(Instruction::Addi { reg: 0, imm: 0xFF })?;
    b.emit(Instruction::Addi { reg: 0, imm: 0x01 })?;
    b.emit(Instruction::Store { reg: 0, addr: 0x00 })?;
    b.emit(Instruction::Subi { reg: 0, imm: 0x01 })?;
    b.emit(Instruction::Store { reg: 0, addr: 0x01 })?;
    b.emit(Instruction::Halt)?;
    Ok(())
}

fn emit_store_fault(b: &mut ProgramBuilder) -> Result<(), BuildError> {
    b.emit(Instruction::Addi { reg: 0, imm: 1 })?;
    b.emit(Instruction::Store { reg: 0, addr: 0x08 })?;
    b.emit(Instruction::Halt)?;
    Ok(())
}
