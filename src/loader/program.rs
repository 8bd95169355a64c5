//! HAL program files.
//!
//! Syntax, one instruction per line:
//! ```text
//! ; Comment
//! 0 START
//! 1 LOADNUM 5     ; line numbers are optional and ignored
//!   OUT 0
//!   stop          # mnemonics are case-insensitive
//! ```
//!
//! The operand is a decimal number and defaults to `0` when absent.

use std::path::Path;

use crate::cpu::decode::{DecodeError, Instruction, OpcodeTable};
use crate::loader::{strip_comment, LoadFault};

/// Parse program text into an instruction list.
pub fn parse_program(source: &str, table: &OpcodeTable) -> Result<Vec<Instruction>, LoadFault> {
    let mut program = Vec::new();

    for (line_num, line) in source.lines().enumerate() {
        if let Some(instr) = parse_line(line, line_num + 1, table)? {
            program.push(instr);
        }
    }

    if program.is_empty() {
        return Err(LoadFault::EmptyProgram);
    }

    Ok(program)
}

/// Read and parse a program file.
pub fn load_program<P: AsRef<Path>>(path: P, table: &OpcodeTable) -> Result<Vec<Instruction>, LoadFault> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .map_err(|e| LoadFault::Io { path: path.display().to_string(), message: e.to_string() })?;
    let program = parse_program(&source, table).map_err(|e| e.in_file(path))?;
    log::debug!("Loaded {} instructions from {}", program.len(), path.display());
    Ok(program)
}

fn parse_line(line: &str, line_num: usize, table: &OpcodeTable) -> Result<Option<Instruction>, LoadFault> {
    let mut tokens: Vec<&str> = strip_comment(line).split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(None);
    }

    // Leading line number
    if tokens.len() > 1 && tokens[0].parse::<u64>().is_ok() {
        tokens.remove(0);
    }

    if tokens.len() > 2 {
        return Err(LoadFault::Syntax {
            line: line_num,
            message: format!("unexpected '{}' after operand", tokens[2]),
        });
    }

    let opcode = table.lookup(tokens[0]).map_err(|e| match e {
        DecodeError::UnknownMnemonic(mnemonic) => LoadFault::UnknownMnemonic { line: line_num, mnemonic },
    })?;

    let operand = match tokens.get(1) {
        Some(text) => parse_operand(text, line_num)?,
        None => 0.0,
    };

    Ok(Some(Instruction::new(opcode, operand)))
}

fn parse_operand(text: &str, line_num: usize) -> Result<f64, LoadFault> {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LoadFault::InvalidOperand { line: line_num, operand: text.to_string() })
}
