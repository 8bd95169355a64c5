//! Run coordinator.
//!
//! A [`System`] owns every unit of a run. Wiring, seeding and result
//! binding all need `&mut self`, so the topology is fixed by the time
//! [`System::run`] moves the units onto their own threads.

use std::any::Any;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::config::{ConfigError, SimConfig};
use crate::cpu::decode::Instruction;
use crate::cpu::{ExecutionFault, Unit, UnitState, REGISTER_COUNT};
use crate::loader::{LoadFault, LoadedSystem};
use crate::net::port::Consumer;
use crate::net::topology::{self, Connection, PortRef, Topology, WireFault};

/// A set of wired units, ready to launch.
#[derive(Debug)]
pub struct System {
    units: Vec<Unit>,
    config: SimConfig,
    results: Vec<(PortRef, Consumer)>,
}

impl System {
    /// Build one unit per `(name, program)` pair, in order.
    pub fn new(programs: Vec<(String, Vec<Instruction>)>, config: SimConfig) -> Self {
        let options = config.unit_options();
        let units = programs
            .into_iter()
            .map(|(name, program)| Unit::with_options(name, program, options))
            .collect();
        Self { units, config, results: Vec::new() }
    }

    /// Build a system from a loaded manifest: wire its connections, seed its
    /// inputs and bind its result ports.
    ///
    /// Every manifest input must carry a value by now. Several inputs naming
    /// the same port are seeded in order onto that one port.
    pub fn from_loaded(loaded: LoadedSystem, config: SimConfig) -> Result<Self, SimError> {
        let LoadedSystem { manifest, units } = loaded;
        let mut system = Self::new(units, config);

        system.wire(&manifest.topology)?;

        let mut seeds: Vec<(PortRef, Vec<f64>)> = Vec::new();
        for input in &manifest.inputs {
            let value = input.value.ok_or(SimError::MissingInput(input.target))?;
            match seeds.iter_mut().find(|(target, _)| *target == input.target) {
                Some((_, values)) => values.push(value),
                None => seeds.push((input.target, vec![value])),
            }
        }
        for (target, values) in &seeds {
            system.seed(*target, values)?;
        }

        for target in &manifest.results {
            system.bind_result(*target)?;
        }

        Ok(system)
    }

    /// The units, in index order.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Wire a single connection.
    pub fn connect(&mut self, connection: Connection) -> Result<(), WireFault> {
        topology::connect(&mut self.units, &connection, self.config.port_capacity)
    }

    /// Wire every connection of `topology`.
    pub fn wire(&mut self, topology: &Topology) -> Result<(), WireFault> {
        topology.wire(&mut self.units, self.config.port_capacity)
    }

    /// Queue `values` on an input port before launch.
    ///
    /// The port must not be wired to another unit. Once the unit has read
    /// every seeded value, further IN on that port faults with `PortClosed`.
    pub fn seed(&mut self, target: PortRef, values: &[f64]) -> Result<(), WireFault> {
        topology::attach_external_input(
            &mut self.units,
            target.unit,
            target.port,
            values,
            self.config.port_capacity,
        )?;
        log::debug!("seeded {} with {} value(s)", target, values.len());
        Ok(())
    }

    /// Collect everything written to an output port during the run.
    pub fn bind_result(&mut self, target: PortRef) -> Result<(), WireFault> {
        let consumer = topology::attach_result(
            &mut self.units,
            target.unit,
            target.port,
            self.config.port_capacity,
        )?;
        self.results.push((target, consumer));
        Ok(())
    }

    /// Launch every unit on its own thread and wait for all of them.
    ///
    /// Each result port is drained by a collector thread while the units
    /// run, so a unit never stalls writing to one.
    pub fn run(self) -> RunReport {
        let Self { units, results, .. } = self;
        log::info!("launching {} units, {} result ports", units.len(), results.len());
        let start = Instant::now();

        let (unit_reports, result_reports) = thread::scope(|scope| {
            let collectors: Vec<_> = results
                .into_iter()
                .map(|(target, consumer)| {
                    (target, scope.spawn(move || consumer.drain()))
                })
                .collect();

            let workers: Vec<_> = units
                .into_iter()
                .map(|unit| {
                    let name = unit.name.clone();
                    (name, scope.spawn(move || run_unit(unit)))
                })
                .collect();

            let unit_reports: Vec<UnitReport> = workers
                .into_iter()
                .map(|(name, handle)| {
                    handle.join().unwrap_or_else(|panic| UnitReport::panicked(name, panic))
                })
                .collect();

            let result_reports: Vec<ResultReport> = collectors
                .into_iter()
                .map(|(target, handle)| ResultReport {
                    target,
                    values: handle.join().unwrap_or_default(),
                })
                .collect();

            (unit_reports, result_reports)
        });

        let report = RunReport { units: unit_reports, results: result_reports, elapsed: start.elapsed() };
        for unit in report.faulted() {
            if let Some(fault) = &unit.fault {
                log::warn!("{} - terminated with fault: {}", unit.name, fault);
            }
        }
        log::info!("run finished in {:?}", report.elapsed);
        report
    }
}

fn run_unit(mut unit: Unit) -> UnitReport {
    let outcome = unit.run();
    let (elapsed, fault) = match outcome {
        Ok(elapsed) => (Some(elapsed), None),
        Err(fault) => (None, Some(fault)),
    };
    UnitReport {
        name: unit.name.clone(),
        state: unit.state,
        cycles: unit.cycles,
        pc: unit.regs.pc,
        accumulator: unit.regs.acc,
        registers: unit.regs.file,
        elapsed,
        fault,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Final state of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub name: String,
    pub state: UnitState,
    pub cycles: u64,
    pub pc: usize,
    pub accumulator: f64,
    pub registers: [f64; REGISTER_COUNT],
    /// Time spent running; `None` if the unit faulted.
    pub elapsed: Option<Duration>,
    pub fault: Option<ExecutionFault>,
}

impl UnitReport {
    fn panicked(name: String, panic: Box<dyn Any + Send>) -> Self {
        let fault = ExecutionFault::Panicked(panic_message(panic.as_ref()));
        log::error!("{} - {}", name, fault);
        Self {
            name,
            state: UnitState::Faulted,
            cycles: 0,
            pc: 0,
            accumulator: 0.0,
            registers: [0.0; REGISTER_COUNT],
            elapsed: None,
            fault: Some(fault),
        }
    }

    /// Register `index`, if in range.
    pub fn register(&self, index: usize) -> Option<f64> {
        self.registers.get(index).copied()
    }

    pub fn is_halted(&self) -> bool {
        self.state == UnitState::Halted
    }
}

/// Everything received on one result port.
///
/// An empty `values` means the producing unit terminated without writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultReport {
    pub target: PortRef,
    pub values: Vec<f64>,
}

impl ResultReport {
    /// The first value received, if any.
    pub fn value(&self) -> Option<f64> {
        self.values.first().copied()
    }
}

/// Outcome of [`System::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// One entry per unit, in index order.
    pub units: Vec<UnitReport>,
    /// One entry per bound result port, in binding order.
    pub results: Vec<ResultReport>,
    pub elapsed: Duration,
}

impl RunReport {
    /// True when every unit halted.
    pub fn is_success(&self) -> bool {
        self.units.iter().all(UnitReport::is_halted)
    }

    /// Units that ended in a fault.
    pub fn faulted(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|unit| unit.fault.is_some())
    }

    /// The report for unit `index`.
    pub fn unit(&self, index: usize) -> Option<&UnitReport> {
        self.units.get(index)
    }

    /// Values collected from `target`, if it was bound.
    pub fn result(&self, target: PortRef) -> Option<&ResultReport> {
        self.results.iter().find(|result| result.target == target)
    }
}

/// Errors that stop a run before any unit starts.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Load(#[from] LoadFault),

    #[error("wiring failed: {0}")]
    Wire(#[from] WireFault),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no value supplied for input {0}")]
    MissingInput(PortRef),

    #[error("invalid value for input {target}: '{text}'")]
    InvalidInput { target: PortRef, text: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::Opcode;
    use crate::loader::{InputSpec, Manifest};
    use crate::net::port::Direction;

    fn op(opcode: Opcode, operand: f64) -> Instruction {
        Instruction::new(opcode, operand)
    }

    fn bare(opcode: Opcode) -> Instruction {
        Instruction::bare(opcode)
    }

    fn config() -> SimConfig {
        SimConfig { io_timeout_ms: Some(5_000), ..SimConfig::default() }
    }

    fn system(programs: Vec<Vec<Instruction>>, config: SimConfig) -> System {
        let named = programs
            .into_iter()
            .enumerate()
            .map(|(i, program)| (format!("unit{}", i), program))
            .collect();
        System::new(named, config)
    }

    #[test]
    fn test_two_unit_handoff() {
        let producer = vec![op(Opcode::LoadNum, 5.0), op(Opcode::Out, 0.0), bare(Opcode::Stop)];
        let consumer = vec![op(Opcode::In, 0.0), op(Opcode::Store, 0.0), bare(Opcode::Stop)];

        let mut sys = system(vec![producer, consumer], config());
        sys.connect(Connection::new(0, 0, 1, 0)).unwrap();
        let report = sys.run();

        assert!(report.is_success());
        assert_eq!(report.unit(1).unwrap().register(0), Some(5.0));
        assert_eq!(report.unit(0).unwrap().cycles, 3);
    }

    #[test]
    fn test_stream_arrives_in_order() {
        // Unit 0 emits 1..=10 on output 0.
        let counter = vec![
            op(Opcode::LoadNum, 0.0),
            op(Opcode::AddNum, 1.0),
            op(Opcode::Out, 0.0),
            op(Opcode::Store, 0.0),
            op(Opcode::SubNum, 10.0),
            op(Opcode::JumpNull, 8.0),
            op(Opcode::Load, 0.0),
            op(Opcode::Jump, 1.0),
            bare(Opcode::Stop),
        ];
        // Unit 1 relays ten values from input 0 to output 1.
        let relay = vec![
            op(Opcode::LoadNum, 10.0),
            op(Opcode::Store, 1.0),
            op(Opcode::In, 0.0),
            op(Opcode::Out, 1.0),
            op(Opcode::Load, 1.0),
            op(Opcode::SubNum, 1.0),
            op(Opcode::Store, 1.0),
            op(Opcode::JumpPos, 2.0),
            bare(Opcode::Stop),
        ];

        let mut sys = system(vec![counter, relay], config());
        sys.connect(Connection::new(0, 0, 1, 0)).unwrap();
        sys.bind_result(PortRef::new(1, 1)).unwrap();
        let report = sys.run();

        assert!(report.is_success());
        let expected: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(report.result(PortRef::new(1, 1)).unwrap().values, expected);
    }

    #[test]
    fn test_seeded_input_and_result() {
        let doubler = vec![
            op(Opcode::In, 0.0),
            op(Opcode::MulNum, 2.0),
            op(Opcode::Out, 1.0),
            bare(Opcode::Stop),
        ];

        let mut sys = system(vec![doubler], config());
        sys.seed(PortRef::new(0, 0), &[21.0]).unwrap();
        sys.bind_result(PortRef::new(0, 1)).unwrap();
        let report = sys.run();

        assert_eq!(report.results[0].value(), Some(42.0));
    }

    #[test]
    fn test_seed_more_values_than_capacity() {
        let summer = vec![
            op(Opcode::In, 0.0),
            op(Opcode::Store, 0.0),
            op(Opcode::In, 0.0),
            op(Opcode::Add, 0.0),
            op(Opcode::Store, 0.0),
            op(Opcode::In, 0.0),
            op(Opcode::Add, 0.0),
            op(Opcode::Out, 1.0),
            bare(Opcode::Stop),
        ];

        let mut sys = system(vec![summer], config());
        sys.seed(PortRef::new(0, 0), &[1.0, 2.0, 3.0]).unwrap();
        sys.bind_result(PortRef::new(0, 1)).unwrap();
        let report = sys.run();

        assert!(report.is_success());
        assert_eq!(report.results[0].values, vec![6.0]);
    }

    #[test]
    fn test_exhausted_seed_reads_closed() {
        let greedy = vec![op(Opcode::In, 0.0), op(Opcode::In, 0.0), bare(Opcode::Stop)];

        let mut sys = system(vec![greedy], config());
        sys.seed(PortRef::new(0, 0), &[1.0]).unwrap();
        let report = sys.run();

        assert_eq!(
            report.units[0].fault,
            Some(ExecutionFault::PortClosed { port: 0, direction: Direction::Input })
        );
    }

    #[test]
    fn test_halt_without_result_value() {
        let mut sys = system(vec![vec![bare(Opcode::Stop)]], config());
        sys.bind_result(PortRef::new(0, 3)).unwrap();
        let report = sys.run();

        assert!(report.is_success());
        assert!(report.results[0].values.is_empty());
        assert_eq!(report.results[0].value(), None);
    }

    #[test]
    fn test_faulted_peer_closes_port() {
        let failing = vec![
            op(Opcode::LoadNum, 1.0),
            op(Opcode::DivNum, 0.0),
            op(Opcode::Out, 0.0),
            bare(Opcode::Stop),
        ];
        let waiting = vec![op(Opcode::In, 0.0), bare(Opcode::Stop)];

        // No timeout: only the closed port can wake unit 1.
        let cfg = SimConfig { io_timeout_ms: None, ..SimConfig::default() };
        let mut sys = system(vec![failing, waiting], cfg);
        sys.connect(Connection::new(0, 0, 1, 0)).unwrap();
        let report = sys.run();

        assert!(!report.is_success());
        assert_eq!(report.units[0].fault, Some(ExecutionFault::DivisionByZero));
        assert_eq!(
            report.units[1].fault,
            Some(ExecutionFault::PortClosed { port: 0, direction: Direction::Input })
        );
        assert_eq!(report.faulted().count(), 2);
    }

    #[test]
    fn test_deadlock_times_out() {
        let waiter = || vec![op(Opcode::In, 0.0), op(Opcode::Out, 0.0), bare(Opcode::Stop)];

        let cfg = SimConfig { io_timeout_ms: Some(50), ..SimConfig::default() };
        let mut sys = system(vec![waiter(), waiter()], cfg);
        sys.connect(Connection::new(0, 0, 1, 0)).unwrap();
        sys.connect(Connection::new(1, 0, 0, 0)).unwrap();
        let report = sys.run();

        assert!(report.units.iter().all(|u| u.state == UnitState::Faulted));
        assert!(report
            .units
            .iter()
            .any(|u| matches!(u.fault, Some(ExecutionFault::PortTimeout { timeout_ms: 50, .. }))));
    }

    #[test]
    fn test_pipeline_chain() {
        let stage = || vec![
            op(Opcode::In, 0.0),
            op(Opcode::AddNum, 1.0),
            op(Opcode::Out, 0.0),
            bare(Opcode::Stop),
        ];

        let mut sys = system((0..5).map(|_| stage()).collect(), config());
        for i in 0..4 {
            sys.connect(Connection::new(i, 0, i + 1, 0)).unwrap();
        }
        sys.seed(PortRef::new(0, 0), &[1.0]).unwrap();
        sys.bind_result(PortRef::new(4, 0)).unwrap();
        let report = sys.run();

        assert!(report.is_success());
        assert_eq!(report.results[0].value(), Some(6.0));
    }

    #[test]
    fn test_duplicate_wiring_rejected() {
        let mut sys = system(vec![vec![bare(Opcode::Stop)]; 3], config());
        sys.connect(Connection::new(0, 0, 1, 0)).unwrap();
        let err = sys.connect(Connection::new(0, 0, 2, 0)).unwrap_err();
        assert_eq!(err, WireFault::DuplicateBinding { unit: 0, port: 0, direction: Direction::Output });
    }

    #[test]
    fn test_failed_wire_leaves_units_unwired() {
        let producer = vec![op(Opcode::LoadNum, 7.0), op(Opcode::Out, 0.0), bare(Opcode::Stop)];
        let consumer = vec![op(Opcode::In, 0.0), op(Opcode::Store, 0.0), bare(Opcode::Stop)];

        let mut sys = system(vec![producer, consumer], config());
        let topology: Topology = [Connection::new(0, 0, 1, 0), Connection::new(0, 0, 9, 0)]
            .into_iter()
            .collect();
        assert_eq!(sys.wire(&topology), Err(WireFault::UnknownUnit { unit: 9, units: 2 }));
        assert!(sys.units().iter().all(|u| u.ports.output_ids().is_empty() && u.ports.input_ids().is_empty()));

        let report = sys.run();
        assert!(!report.is_success());
        assert_eq!(
            report.units[0].fault,
            Some(ExecutionFault::UnwiredPort { port: 0, direction: Direction::Output })
        );
    }

    #[test]
    fn test_seed_conflicts_with_connection() {
        let mut sys = system(vec![vec![bare(Opcode::Stop)]; 2], config());
        sys.connect(Connection::new(0, 0, 1, 0)).unwrap();
        assert!(sys.seed(PortRef::new(1, 0), &[1.0]).is_err());
        assert!(sys.bind_result(PortRef::new(0, 0)).is_err());
    }

    #[test]
    fn test_options_reach_units() {
        let cfg = SimConfig { max_cycles: Some(3), ..config() };
        let spin = vec![op(Opcode::Jump, 0.0)];
        let sys = system(vec![spin], cfg);
        assert_eq!(sys.units()[0].options().max_cycles, Some(3));

        let report = sys.run();
        assert_eq!(report.units[0].fault, Some(ExecutionFault::CycleLimit(3)));
        assert_eq!(report.units[0].cycles, 3);
    }

    #[test]
    fn test_from_loaded() {
        let manifest = Manifest {
            programs: Vec::new(),
            topology: [Connection::new(0, 0, 1, 0)].into_iter().collect(),
            inputs: vec![
                InputSpec { target: PortRef::new(0, 0), value: Some(2.0) },
                InputSpec { target: PortRef::new(0, 0), value: Some(3.0) },
            ],
            results: vec![PortRef::new(1, 1)],
        };
        let adder = vec![
            op(Opcode::In, 0.0),
            op(Opcode::Store, 0.0),
            op(Opcode::In, 0.0),
            op(Opcode::Add, 0.0),
            op(Opcode::Out, 0.0),
            bare(Opcode::Stop),
        ];
        let negate = vec![
            op(Opcode::In, 0.0),
            op(Opcode::MulNum, -1.0),
            op(Opcode::Out, 1.0),
            bare(Opcode::Stop),
        ];
        let loaded = LoadedSystem {
            manifest,
            units: vec![("adder".into(), adder), ("negate".into(), negate)],
        };

        let report = System::from_loaded(loaded, config()).unwrap().run();
        assert!(report.is_success());
        assert_eq!(report.units[0].name, "adder");
        assert_eq!(report.result(PortRef::new(1, 1)).unwrap().values, vec![-5.0]);
    }

    #[test]
    fn test_from_loaded_missing_input() {
        let manifest = Manifest {
            inputs: vec![InputSpec { target: PortRef::new(0, 0), value: None }],
            ..Manifest::default()
        };
        let loaded = LoadedSystem { manifest, units: vec![("a".into(), vec![bare(Opcode::Stop)])] };
        let err = System::from_loaded(loaded, config()).unwrap_err();
        assert!(matches!(err, SimError::MissingInput(target) if target == PortRef::new(0, 0)));
    }

    #[test]
    fn test_handoff_demo() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/handoff/system.manifest");
        let loaded = crate::loader::load_system(&path, &crate::cpu::OpcodeTable::new()).unwrap();
        assert_eq!(loaded.units.len(), 2);

        let report = System::from_loaded(loaded, config()).unwrap().run();
        assert!(report.is_success());
        assert_eq!(report.result(PortRef::new(1, 0)).unwrap().values, vec![10.0]);
    }

    #[test]
    fn test_overflow_report_round_trips() {
        let overflow = vec![
            op(Opcode::LoadNum, 1e300),
            op(Opcode::MulNum, 1e300),
            bare(Opcode::Stop),
        ];
        let report = system(vec![overflow], config()).run();
        assert_eq!(report.units[0].fault, Some(ExecutionFault::NonFiniteResult(Opcode::MulNum)));

        let json = serde_json::to_string(&report).unwrap();
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.units, report.units);
    }

    #[test]
    fn test_report_serializes() {
        let report = system(vec![vec![bare(Opcode::Stop)]], config()).run();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"Halted\""));
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.units, report.units);
    }
}
