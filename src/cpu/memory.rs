//! Instruction memory of a HAL unit.
//!
//! A unit's memory holds its program and nothing else; data lives in the
//! register file. Memory is filled once at load time and never written.

use crate::cpu::decode::Instruction;
use serde::{Serialize, Deserialize};

/// Read-only instruction store.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<Instruction>,
}

impl Memory {
    /// Create a memory holding `program`.
    pub fn new(program: Vec<Instruction>) -> Self {
        Self { cells: program }
    }

    /// Fetch the instruction at `pc`.
    #[inline]
    pub fn fetch(&self, pc: usize) -> Result<Instruction, MemoryError> {
        self.cells
            .get(pc)
            .copied()
            .ok_or(MemoryError::AddressOutOfRange { pc, len: self.cells.len() })
    }

    /// Whether `target` is a valid instruction index.
    #[inline]
    pub fn contains(&self, target: usize) -> bool {
        target < self.cells.len()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Numbered listing of the program, one instruction per line.
    pub fn listing(&self) -> String {
        let mut output = String::new();
        for (addr, instr) in self.cells.iter().enumerate() {
            output.push_str(&format!("{:03}: {}\n", addr, instr));
        }
        output
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("instructions", &self.cells.len())
            .finish()
    }
}

/// Errors that can occur while fetching instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryError {
    /// Program counter is past the end of the program.
    AddressOutOfRange { pc: usize, len: usize },
}

impl std::fmt::Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryError::AddressOutOfRange { pc, len } => {
                write!(f, "program counter {} out of range (program has {} instructions)", pc, len)
            }
        }
    }
}

impl std::error::Error for MemoryError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::Opcode;

    fn program() -> Memory {
        Memory::new(vec![
            Instruction::new(Opcode::LoadNum, 1.0),
            Instruction::bare(Opcode::Stop),
        ])
    }

    #[test]
    fn test_fetch() {
        let mem = program();
        assert_eq!(mem.fetch(1).unwrap().opcode, Opcode::Stop);
        assert_eq!(
            mem.fetch(2),
            Err(MemoryError::AddressOutOfRange { pc: 2, len: 2 })
        );
    }

    #[test]
    fn test_contains() {
        let mem = program();
        assert!(mem.contains(0));
        assert!(mem.contains(1));
        assert!(!mem.contains(2));
    }

    #[test]
    fn test_listing() {
        let mem = program();
        assert_eq!(mem.listing(), "000: LOADNUM 1\n001: STOP\n");
    }
}
