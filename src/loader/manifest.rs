//! System manifests.
//!
//! A manifest lists the units of a system, how their ports connect, and
//! which ports talk to the outside world:
//!
//! ```text
//! --processors--
//! 0 producer.hal
//! 1 consumer.hal
//! --connections--
//! 0:0 > 1:0
//! --inputs--
//! 0:1 = 5          ; seeded before launch
//! 1:2              ; value supplied by the caller
//! --results--
//! 1:1
//! ```
//!
//! Program paths are relative to the manifest's directory. A unit's index
//! is its position in `--processors--`; a leading index, if written, must
//! match it.

use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::cpu::decode::{Instruction, OpcodeTable};
use crate::loader::{load_program, strip_comment, LoadFault};
use crate::net::topology::{Connection, PortRef, Topology};

/// An external input declared by a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub target: PortRef,
    /// `None` when the value is left to the caller.
    pub value: Option<f64>,
}

/// A parsed manifest. Program files are not read yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub programs: Vec<PathBuf>,
    pub topology: Topology,
    pub inputs: Vec<InputSpec>,
    pub results: Vec<PortRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Processors,
    Connections,
    Inputs,
    Results,
}

impl Section {
    fn from_header(line: &str) -> Option<Self> {
        match line {
            "--processors--" => Some(Section::Processors),
            "--connections--" => Some(Section::Connections),
            "--inputs--" => Some(Section::Inputs),
            "--results--" => Some(Section::Results),
            _ => None,
        }
    }
}

/// Parse manifest text. Relative program paths are joined onto `base_dir`.
pub fn parse_manifest(source: &str, base_dir: &Path) -> Result<Manifest, LoadFault> {
    let mut manifest = Manifest::default();
    let mut section = None;
    let mut saw_processors = false;

    for (line_num, raw) in source.lines().enumerate() {
        let line_num = line_num + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(next) = Section::from_header(line) {
            saw_processors |= next == Section::Processors;
            section = Some(next);
            continue;
        }

        let syntax = |message: String| LoadFault::Syntax { line: line_num, message };

        match section {
            None => return Err(syntax(format!("'{}' appears before any section header", line))),

            Some(Section::Processors) => {
                let path = parse_processor(line, manifest.programs.len()).map_err(syntax)?;
                manifest.programs.push(base_dir.join(path));
            }

            Some(Section::Connections) => {
                let (from, to) = line
                    .split_once('>')
                    .ok_or_else(|| syntax(format!("expected 'A:p > B:q', found '{}'", line)))?;
                let from: PortRef = from.parse().map_err(syntax)?;
                let to: PortRef = to.parse().map_err(syntax)?;
                manifest.topology.push(Connection::new(from.unit, from.port, to.unit, to.port));
            }

            Some(Section::Inputs) => {
                let (target, value) = match line.split_once('=') {
                    Some((target, value)) => {
                        let value = value.trim();
                        let parsed = value.parse::<f64>()
                            .ok()
                            .filter(|v| v.is_finite())
                            .ok_or_else(|| LoadFault::InvalidOperand { line: line_num, operand: value.to_string() })?;
                        (target, Some(parsed))
                    }
                    None => (line, None),
                };
                let target: PortRef = target.parse().map_err(syntax)?;
                manifest.inputs.push(InputSpec { target, value });
            }

            Some(Section::Results) => {
                let target: PortRef = line.parse().map_err(syntax)?;
                manifest.results.push(target);
            }
        }
    }

    if !saw_processors || manifest.programs.is_empty() {
        return Err(LoadFault::MissingSection("processors".into()));
    }

    Ok(manifest)
}

fn parse_processor(line: &str, position: usize) -> Result<&str, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [path] => Ok(*path),
        [index, path] => {
            let index: usize = index
                .parse()
                .map_err(|_| format!("invalid processor index '{}'", index))?;
            if index != position {
                return Err(format!("processor index {} out of order (expected {})", index, position));
            }
            Ok(*path)
        }
        _ => Err(format!("expected '[index] path', found '{}'", line)),
    }
}

/// Read and parse a manifest file.
pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<Manifest, LoadFault> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .map_err(|e| LoadFault::Io { path: path.display().to_string(), message: e.to_string() })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    parse_manifest(&source, base_dir).map_err(|e| e.in_file(path))
}

/// A manifest together with every program it names.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSystem {
    pub manifest: Manifest,
    /// One `(name, program)` per unit, in unit order.
    pub units: Vec<(String, Vec<Instruction>)>,
}

/// Load a manifest and all of its programs.
pub fn load_system<P: AsRef<Path>>(path: P, table: &OpcodeTable) -> Result<LoadedSystem, LoadFault> {
    let manifest = load_manifest(path.as_ref())?;

    let units = manifest
        .programs
        .iter()
        .map(|program_path| {
            let program = load_program(program_path, table)?;
            Ok((program_path.display().to_string(), program))
        })
        .collect::<Result<Vec<_>, LoadFault>>()?;

    log::info!(
        "Loaded system from {}: {} units, {} connections",
        path.as_ref().display(),
        units.len(),
        manifest.topology.len()
    );

    Ok(LoadedSystem { manifest, units })
}
