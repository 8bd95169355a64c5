//! # HAL Simulator
//!
//! A simulator for networks of HAL accumulator machines.
//!
//! Each unit runs its own program on its own thread and talks to other
//! units only through bounded FIFO ports. A manifest names the programs,
//! wires output ports to input ports, and declares which ports are fed
//! from outside and which are collected as results.

pub mod cpu;
pub mod net;
pub mod loader;
pub mod config;
pub mod system;

// Re-export commonly used types
pub use cpu::{ExecutionFault, Instruction, Memory, Opcode, OpcodeTable, Registers, Unit, UnitOptions, UnitState};
pub use net::{Connection, PortRef, Topology, WireFault};
pub use loader::{load_program, load_system, parse_manifest, parse_program, LoadFault, LoadedSystem, Manifest};
pub use config::{ConfigError, SimConfig};
pub use system::{ResultReport, RunReport, SimError, System, UnitReport};
