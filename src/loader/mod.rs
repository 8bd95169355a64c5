//! Text front end: program files and system manifests.
//!
//! This module provides:
//! - A program reader (text → instruction list)
//! - A manifest reader (text → unit list, connections and external bindings)

pub mod program;
pub mod manifest;

pub use program::{load_program, parse_program};
pub use manifest::{load_manifest, load_system, parse_manifest, InputSpec, LoadedSystem, Manifest};

use thiserror::Error;

/// Errors that can occur while loading programs or manifests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadFault {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("invalid operand on line {line}: {operand}")]
    InvalidOperand { line: usize, operand: String },

    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("program contains no instructions")]
    EmptyProgram,

    #[error("manifest has no {0} section")]
    MissingSection(String),

    #[error("in {path}: {fault}")]
    InFile { path: String, fault: Box<LoadFault> },
}

impl LoadFault {
    /// Attach the file a fault came from.
    pub fn in_file(self, path: &std::path::Path) -> Self {
        match self {
            LoadFault::Io { .. } | LoadFault::InFile { .. } => self,
            fault => LoadFault::InFile { path: path.display().to_string(), fault: Box::new(fault) },
        }
    }
}

/// Strip a trailing `;` or `#` comment.
pub(crate) fn strip_comment(line: &str) -> &str {
    match line.find([';', '#']) {
        Some(idx) => &line[..idx],
        None => line,
    }
}
