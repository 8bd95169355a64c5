//! HAL processing units.
//!
//! Each unit is a single-accumulator machine:
//! - an accumulator, a program counter and 16 general purpose registers
//! - a read-only instruction memory
//! - numbered input and output ports wired by the interconnect
//! - a 19-opcode instruction set where only IN and OUT can block

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;

pub use memory::Memory;
pub use registers::{Registers, REGISTER_COUNT};
pub use decode::{Instruction, Opcode, OpcodeTable, OperandKind, DecodeError};
pub use execute::{ExecutionFault, Unit, UnitOptions, UnitState};
