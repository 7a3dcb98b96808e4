//! Machine memory.
//!
//! A single 256-byte image holds both the data the program works on and
//! the program itself:
//!
//! ```text
//! 00 01 02 03 04 05 06 07 08 09 0a 0b ... ff
//! ^====== DATA ========^ ^== INSTRUCTIONS ==^
//! ```

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Total number of addressable cells.
pub const MEMORY_SIZE: usize = 256;

/// Number of cells in the data region (0x00-0x07).
pub const DATA_SIZE: usize = 8;

/// First address of the instruction region, and the initial pc.
pub const PROGRAM_START: u8 = 0x08;

/// Highest address a `Store` may target.
pub const DATA_END: u8 = (DATA_SIZE - 1) as u8;

/// Returns true if `addr` lies in the data region.
#[inline]
pub fn is_data_addr(addr: u8) -> bool {
    addr <= DATA_END
}

/// A fixed 256-byte memory image.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Memory {
    cells: [u8; MEMORY_SIZE],
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self { cells: [0; MEMORY_SIZE] }
    }

    /// Wrap an existing image.
    pub fn from_bytes(cells: [u8; MEMORY_SIZE]) -> Self {
        Self { cells }
    }

    /// Copy an image out of a slice, which must be exactly 256 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MemoryError> {
        let cells: [u8; MEMORY_SIZE] = bytes
            .try_into()
            .map_err(|_| MemoryError::WrongSize(bytes.len()))?;
        Ok(Self { cells })
    }

    /// Read a cell. Every `u8` is a valid address.
    #[inline]
    pub fn read(&self, addr: u8) -> u8 {
        self.cells[addr as usize]
    }

    /// Write any cell, including the instruction region.
    ///
    /// This is the host's view of memory; programs go through [`Memory::store`].
    #[inline]
    pub fn write(&mut self, addr: u8, value: u8) {
        self.cells[addr as usize] = value;
    }

    /// Write a cell on behalf of a running program.
    ///
    /// Only the data region is writable this way.
    pub fn store(&mut self, addr: u8, value: u8) -> Result<(), MemoryError> {
        if !is_data_addr(addr) {
            return Err(MemoryError::OutsideDataRegion(addr));
        }
        self.cells[addr as usize] = value;
        Ok(())
    }

    /// Fetch the three bytes of the instruction at `pc`.
    ///
    /// Operand addresses wrap past 0xFF back to 0x00.
    #[inline]
    pub fn fetch(&self, pc: u8) -> [u8; 3] {
        [
            self.read(pc),
            self.read(pc.wrapping_add(1)),
            self.read(pc.wrapping_add(2)),
        ]
    }

    /// `count` cells starting at `start`, wrapping past 0xFF like [`Memory::fetch`].
    pub fn dump(&self, start: u8, count: usize) -> Vec<u8> {
        (0..count)
            .map(|i| self.read(start.wrapping_add(i as u8)))
            .collect()
    }

    /// The data region (0x00-0x07).
    pub fn data(&self) -> &[u8] {
        &self.cells[..DATA_SIZE]
    }

    /// Overwrite the data region starting at 0x00.
    ///
    /// Values past the end of the data region are rejected.
    pub fn set_data(&mut self, values: &[u8]) -> Result<(), MemoryError> {
        if values.len() > DATA_SIZE {
            return Err(MemoryError::DataTooLarge(values.len()));
        }
        self.cells[..values.len()].copy_from_slice(values);
        Ok(())
    }

    /// The whole image.
    pub fn as_bytes(&self) -> &[u8; MEMORY_SIZE] {
        &self.cells
    }

    /// Consume the memory and return the raw image.
    pub fn into_bytes(self) -> [u8; MEMORY_SIZE] {
        self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<u8>> for Memory {
    type Error = MemoryError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_slice(&bytes)
    }
}

impl From<Memory> for Vec<u8> {
    fn from(mem: Memory) -> Self {
        mem.cells.to_vec()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let program_bytes = self.cells[DATA_SIZE..]
            .iter()
            .filter(|&&b| b != 0)
            .count();

        f.debug_struct("Memory")
            .field("data", &self.data())
            .field("non_zero_program_bytes", &program_bytes)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// A checked write outside the data region.
    #[error("cell {0:#04x} is outside the data region 0x00-0x07")]
    OutsideDataRegion(u8),

    /// An image was not exactly 256 bytes.
    #[error("memory image must be 256 bytes, got {0}")]
    WrongSize(usize),

    /// More data values than data cells.
    #[error("data region holds 8 cells, got {0} values")]
    DataTooLarge(usize),
}
