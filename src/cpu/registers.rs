//! HAL unit registers.
//!
//! Each unit has:
//! - ACC: the accumulator, operand and result of every arithmetic and load/store opcode
//! - PC: the program counter (an instruction index)
//! - R0..R15: a fixed register file, written only by STORE

use serde::{Serialize, Deserialize};

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 16;

/// The register state of one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registers {
    /// Accumulator.
    pub acc: f64,

    /// Program counter.
    pub pc: usize,

    /// General purpose register file.
    pub file: [f64; REGISTER_COUNT],
}

impl Registers {
    /// Create a new register set with all values zeroed.
    pub fn new() -> Self {
        Self {
            acc: 0.0,
            pc: 0,
            file: [0.0; REGISTER_COUNT],
        }
    }

    /// Read register `index`, or `None` if it does not exist.
    #[inline]
    pub fn read(&self, index: usize) -> Option<f64> {
        self.file.get(index).copied()
    }

    /// Write register `index`. Returns `false` if it does not exist.
    #[inline]
    pub fn write(&mut self, index: usize, value: f64) -> bool {
        match self.file.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Increment the program counter by 1.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> usize {
        let old = self.pc;
        self.pc += 1;
        old
    }

    /// Set the program counter to an absolute instruction index.
    pub fn jump(&mut self, target: usize) {
        self.pc = target;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
