//! Port-based interconnect between HAL units.
//!
//! - [`port`]: bounded single-producer/single-consumer FIFOs
//! - [`topology`]: static wiring of ports into units

pub mod port;
pub mod topology;

pub use port::{channel, preloaded, Consumer, Direction, PortError, PortId, PortSet, Producer, DEFAULT_CAPACITY};
pub use topology::{attach_external_input, attach_result, connect, Connection, PortRef, Topology, WireFault};
