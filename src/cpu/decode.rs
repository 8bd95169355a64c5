//! Opcode table and instruction representation for HAL units.
//!
//! A HAL program is a list of `(mnemonic, operand)` pairs. The operand is
//! always carried as a float; whether it is a literal, a register index, a
//! port id or a jump target depends on the opcode (see [`OperandKind`]).

use std::collections::HashMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// How an opcode interprets its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperandKind {
    /// Operand is ignored.
    None,
    /// Index into the 16-entry register file.
    Register,
    /// Literal value (the `NUM` variants).
    Literal,
    /// Local port id of an input or output port.
    Port,
    /// Instruction index to jump to.
    Target,
}

/// Every opcode a HAL unit understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // ==================== Control ====================
    Start,
    Stop,

    // ==================== Port I/O ====================
    Out,
    In,

    // ==================== Data Transfer ====================
    Load,
    LoadNum,
    Store,

    // ==================== Jumps ====================
    JumpNeg,
    JumpPos,
    JumpNull,
    Jump,

    // ==================== Arithmetic ====================
    Add,
    AddNum,
    Sub,
    SubNum,
    Mul,
    MulNum,
    Div,
    DivNum,
}

impl Opcode {
    /// All opcodes, in table order.
    pub const ALL: [Opcode; 19] = [
        Opcode::Start,
        Opcode::Stop,
        Opcode::Out,
        Opcode::In,
        Opcode::Load,
        Opcode::LoadNum,
        Opcode::Store,
        Opcode::JumpNeg,
        Opcode::JumpPos,
        Opcode::JumpNull,
        Opcode::Jump,
        Opcode::Add,
        Opcode::AddNum,
        Opcode::Sub,
        Opcode::SubNum,
        Opcode::Mul,
        Opcode::MulNum,
        Opcode::Div,
        Opcode::DivNum,
    ];

    /// Canonical upper-case mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Start => "START",
            Opcode::Stop => "STOP",
            Opcode::Out => "OUT",
            Opcode::In => "IN",
            Opcode::Load => "LOAD",
            Opcode::LoadNum => "LOADNUM",
            Opcode::Store => "STORE",
            Opcode::JumpNeg => "JUMPNEG",
            Opcode::JumpPos => "JUMPPOS",
            Opcode::JumpNull => "JUMPNULL",
            Opcode::Jump => "JUMP",
            Opcode::Add => "ADD",
            Opcode::AddNum => "ADDNUM",
            Opcode::Sub => "SUB",
            Opcode::SubNum => "SUBNUM",
            Opcode::Mul => "MUL",
            Opcode::MulNum => "MULNUM",
            Opcode::Div => "DIV",
            Opcode::DivNum => "DIVNUM",
        }
    }

    /// How this opcode reads its operand.
    pub const fn operand_kind(self) -> OperandKind {
        match self {
            Opcode::Start | Opcode::Stop => OperandKind::None,
            Opcode::Out | Opcode::In => OperandKind::Port,
            Opcode::Load | Opcode::Store
            | Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => OperandKind::Register,
            Opcode::LoadNum
            | Opcode::AddNum | Opcode::SubNum | Opcode::MulNum | Opcode::DivNum => OperandKind::Literal,
            Opcode::JumpNeg | Opcode::JumpPos | Opcode::JumpNull | Opcode::Jump => OperandKind::Target,
        }
    }

    /// True for the two opcodes that may block on a port.
    pub const fn is_blocking(self) -> bool {
        matches!(self, Opcode::Out | Opcode::In)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Immutable mnemonic → opcode lookup.
///
/// Built once and handed to whoever turns text into instructions. Lookups
/// are case-insensitive.
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    entries: HashMap<&'static str, Opcode>,
}

impl OpcodeTable {
    /// Build the table covering every [`Opcode`].
    pub fn new() -> Self {
        let entries = Opcode::ALL
            .iter()
            .map(|&op| (op.mnemonic(), op))
            .collect();
        Self { entries }
    }

    /// Resolve a mnemonic.
    pub fn lookup(&self, mnemonic: &str) -> Result<Opcode, DecodeError> {
        let upper = mnemonic.to_ascii_uppercase();
        self.entries
            .get(upper.as_str())
            .copied()
            .ok_or(DecodeError::UnknownMnemonic(upper))
    }

    /// Number of mnemonics in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// One loaded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: f64,
}

impl Instruction {
    /// Instruction with an explicit operand.
    pub const fn new(opcode: Opcode, operand: f64) -> Self {
        Self { opcode, operand }
    }

    /// Instruction whose operand defaults to zero.
    pub const fn bare(opcode: Opcode) -> Self {
        Self { opcode, operand: 0.0 }
    }

    /// The operand as an index, if it is a non-negative whole number.
    ///
    /// Register numbers, port ids and jump targets all go through this;
    /// bounds are checked by the caller against the relevant table.
    pub fn index(&self) -> Option<usize> {
        operand_index(self.operand)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode.operand_kind() {
            OperandKind::None => write!(f, "{}", self.opcode),
            _ => write!(f, "{} {}", self.opcode, self.operand),
        }
    }
}

/// Convert a float operand to an index.
pub fn operand_index(operand: f64) -> Option<usize> {
    if operand.is_finite() && operand >= 0.0 && operand.fract() == 0.0 && operand <= u32::MAX as f64 {
        Some(operand as usize)
    } else {
        None
    }
}

/// Errors that can occur while decoding a mnemonic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown mnemonic: {0}")]
    UnknownMnemonic(String),
}
