//! Static wiring between units.
//!
//! A [`Topology`] is the ordered list of [`Connection`]s for one run. Wiring
//! happens on the coordinator's thread before any unit is launched, and a
//! failing connection installs nothing.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::cpu::Unit;
use crate::net::port::{self, Consumer, Direction, PortId};

/// One directed link: `from_unit`'s output `out_port` feeds `to_unit`'s input `in_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from_unit: usize,
    pub out_port: PortId,
    pub to_unit: usize,
    pub in_port: PortId,
}

impl Connection {
    pub fn new(from_unit: usize, out_port: PortId, to_unit: usize, in_port: PortId) -> Self {
        Self { from_unit, out_port, to_unit, in_port }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} > {}:{}", self.from_unit, self.out_port, self.to_unit, self.in_port)
    }
}

/// A (unit, port) pair, written `unit:port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub unit: usize,
    pub port: PortId,
}

impl PortRef {
    pub fn new(unit: usize, port: PortId) -> Self {
        Self { unit, port }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.port)
    }
}

impl FromStr for PortRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (unit, port) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected UNIT:PORT, found '{}'", s.trim()))?;
        let unit = unit.trim().parse().map_err(|_| format!("invalid unit index '{}'", unit.trim()))?;
        let port = port.trim().parse().map_err(|_| format!("invalid port id '{}'", port.trim()))?;
        Ok(Self { unit, port })
    }
}

/// The full connection list of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub connections: Vec<Connection>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection.
    pub fn push(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    /// Number of connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Check every connection against `units` and against each other.
    ///
    /// Reports the first fault in list order, exactly as wiring would.
    pub fn validate(&self, units: &[Unit]) -> Result<(), WireFault> {
        let mut claimed = HashSet::new();
        for &Connection { from_unit, out_port, to_unit, in_port } in &self.connections {
            check_unit(units, from_unit)?;
            check_unit(units, to_unit)?;
            if from_unit == to_unit {
                return Err(WireFault::SelfConnection { unit: from_unit });
            }
            for (unit, port, direction) in [
                (from_unit, out_port, Direction::Output),
                (to_unit, in_port, Direction::Input),
            ] {
                check_free(units, unit, port, direction)?;
                if !claimed.insert((unit, port, direction)) {
                    return Err(WireFault::DuplicateBinding { unit, port, direction });
                }
            }
        }
        Ok(())
    }

    /// Wire every connection into `units`.
    ///
    /// All or nothing: on a fault no port is installed.
    pub fn wire(&self, units: &mut [Unit], capacity: usize) -> Result<(), WireFault> {
        self.validate(units)?;
        for connection in &self.connections {
            connect(units, connection, capacity)?;
        }
        log::debug!("wired {} connections across {} units", self.connections.len(), units.len());
        Ok(())
    }
}

impl FromIterator<Connection> for Topology {
    fn from_iter<I: IntoIterator<Item = Connection>>(iter: I) -> Self {
        Self { connections: iter.into_iter().collect() }
    }
}

fn check_unit(units: &[Unit], unit: usize) -> Result<(), WireFault> {
    if unit < units.len() {
        Ok(())
    } else {
        Err(WireFault::UnknownUnit { unit, units: units.len() })
    }
}

fn check_free(units: &[Unit], unit: usize, port: PortId, direction: Direction) -> Result<(), WireFault> {
    if units[unit].ports.is_bound(direction, port) {
        Err(WireFault::DuplicateBinding { unit, port, direction })
    } else {
        Ok(())
    }
}

/// Allocate one port and install it between the two endpoints of `connection`.
pub fn connect(units: &mut [Unit], connection: &Connection, capacity: usize) -> Result<(), WireFault> {
    let Connection { from_unit, out_port, to_unit, in_port } = *connection;

    check_unit(units, from_unit)?;
    check_unit(units, to_unit)?;
    if from_unit == to_unit {
        return Err(WireFault::SelfConnection { unit: from_unit });
    }
    check_free(units, from_unit, out_port, Direction::Output)?;
    check_free(units, to_unit, in_port, Direction::Input)?;

    let (producer, consumer) = port::channel(capacity);
    units[from_unit].ports.attach_output(out_port, producer);
    units[to_unit].ports.attach_input(in_port, consumer);
    log::trace!("connected {}", connection);
    Ok(())
}

/// Bind input `port` of `unit` to a port fed from outside the system.
///
/// `values` are queued before the unit starts; once they are consumed the
/// port reads as closed.
pub fn attach_external_input(
    units: &mut [Unit],
    unit: usize,
    port: PortId,
    values: &[f64],
    capacity: usize,
) -> Result<(), WireFault> {
    check_unit(units, unit)?;
    check_free(units, unit, port, Direction::Input)?;
    units[unit].ports.attach_input(port, port::preloaded(values, capacity));
    Ok(())
}

/// Bind output `port` of `unit` to a port read from outside the system.
pub fn attach_result(
    units: &mut [Unit],
    unit: usize,
    port: PortId,
    capacity: usize,
) -> Result<Consumer, WireFault> {
    check_unit(units, unit)?;
    check_free(units, unit, port, Direction::Output)?;
    let (producer, consumer) = port::channel(capacity);
    units[unit].ports.attach_output(port, producer);
    Ok(consumer)
}

/// Errors raised while wiring a topology.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum WireFault {
    #[error("unit {unit} does not exist ({units} units declared)")]
    UnknownUnit { unit: usize, units: usize },

    #[error("{direction} port {port} of unit {unit} is already bound")]
    DuplicateBinding { unit: usize, port: PortId, direction: Direction },

    #[error("unit {unit} cannot be connected to itself")]
    SelfConnection { unit: usize },
}
