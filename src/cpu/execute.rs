//! Execution engine for a HAL unit.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use std::time::{Duration, Instant};

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::cpu::decode::{Instruction, Opcode};
use crate::cpu::memory::MemoryError;
use crate::cpu::{Memory, Registers};
use crate::net::port::{Direction, PortError, PortId, PortSet};

/// Log target for the per-step register dump.
pub const TRACE_TARGET: &str = "halsim::trace";

/// Unit execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitState {
    /// Unit is running normally.
    Running,
    /// Unit has executed STOP.
    Halted,
    /// Unit raised an execution fault.
    Faulted,
}

/// Per-unit execution knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOptions {
    /// Longest a single IN or OUT may block. `None` waits forever.
    pub io_timeout: Option<Duration>,
    /// Fault after this many instructions without reaching STOP.
    pub max_cycles: Option<u64>,
    /// Dump registers before and after every step.
    pub trace: bool,
}

/// One HAL processing unit.
pub struct Unit {
    /// Name used in logs and reports (usually the program path).
    pub name: String,
    /// Accumulator, program counter and register file.
    pub regs: Registers,
    /// Program memory.
    pub mem: Memory,
    /// Wired input and output ports.
    pub ports: PortSet,
    /// Current execution state.
    pub state: UnitState,
    /// Instructions executed so far.
    pub cycles: u64,
    options: UnitOptions,
    last_instr: Option<Instruction>,
}

impl Unit {
    /// Create a unit with zeroed registers and no ports.
    pub fn new(name: impl Into<String>, program: Vec<Instruction>) -> Self {
        Self::with_options(name, program, UnitOptions::default())
    }

    /// Create a unit with explicit options.
    pub fn with_options(name: impl Into<String>, program: Vec<Instruction>, options: UnitOptions) -> Self {
        Self {
            name: name.into(),
            regs: Registers::new(),
            mem: Memory::new(program),
            ports: PortSet::new(),
            state: UnitState::Running,
            cycles: 0,
            options,
            last_instr: None,
        }
    }

    /// The options this unit runs with.
    pub fn options(&self) -> &UnitOptions {
        &self.options
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or the fault it raised.
    /// A fault leaves the unit in [`UnitState::Faulted`].
    pub fn step(&mut self) -> Result<Instruction, ExecutionFault> {
        if self.state != UnitState::Running {
            return Err(ExecutionFault::NotRunning(self.state));
        }

        if let Some(limit) = self.options.max_cycles {
            if self.cycles >= limit {
                return Err(self.fail(ExecutionFault::CycleLimit(limit)));
            }
        }

        // Fetch
        let instr = match self.mem.fetch(self.regs.pc) {
            Ok(instr) => instr,
            Err(e) => return Err(self.fail(e.into())),
        };

        if self.options.trace {
            self.trace("before", &instr);
        }
        if instr.opcode.is_blocking() {
            log::trace!("{} - pc={} {} may block", self.name, self.regs.pc, instr);
        }

        // Execute
        if let Err(fault) = self.execute(instr) {
            return Err(self.fail(fault));
        }

        self.cycles += 1;
        self.last_instr = Some(instr);

        if self.options.trace {
            self.trace("after ", &instr);
        }

        if self.state == UnitState::Halted {
            self.ports.close();
        }

        Ok(instr)
    }

    /// Run until STOP or a fault.
    ///
    /// Returns the wall-clock time spent executing.
    pub fn run(&mut self) -> Result<Duration, ExecutionFault> {
        if self.state != UnitState::Running {
            return Err(ExecutionFault::NotRunning(self.state));
        }

        log::info!("{} - starting ({} instructions)", self.name, self.mem.len());
        let start = Instant::now();

        while self.state == UnitState::Running {
            self.step()?;
        }

        let elapsed = start.elapsed();
        log::info!("{} - halted after {} cycles in {:?}", self.name, self.cycles, elapsed);
        Ok(elapsed)
    }

    /// Execute a fetched instruction.
    fn execute(&mut self, instr: Instruction) -> Result<(), ExecutionFault> {
        match instr.opcode {
            // ==================== Control ====================

            Opcode::Start => {}

            Opcode::Stop => {
                self.state = UnitState::Halted;
            }

            // ==================== Port I/O ====================

            Opcode::Out => {
                let port = self.port_id(&instr)?;
                let producer = self.ports.output(port)
                    .ok_or(ExecutionFault::UnwiredPort { port, direction: Direction::Output })?;
                producer.send(self.regs.acc, self.options.io_timeout)
                    .map_err(|e| self.port_fault(e, port, Direction::Output))?;
            }

            Opcode::In => {
                let port = self.port_id(&instr)?;
                let consumer = self.ports.input(port)
                    .ok_or(ExecutionFault::UnwiredPort { port, direction: Direction::Input })?;
                let value = consumer.recv(self.options.io_timeout)
                    .map_err(|e| self.port_fault(e, port, Direction::Input))?;
                self.regs.acc = finite(instr.opcode, value)?;
            }

            // ==================== Data Transfer ====================

            Opcode::Load => {
                self.regs.acc = self.read_register(&instr)?;
            }

            Opcode::LoadNum => {
                self.regs.acc = finite(instr.opcode, instr.operand)?;
            }

            Opcode::Store => {
                let acc = self.regs.acc;
                let stored = instr.index().map_or(false, |i| self.regs.write(i, acc));
                if !stored {
                    return Err(ExecutionFault::RegisterOutOfRange { operand: instr.operand });
                }
            }

            // ==================== Arithmetic ====================

            Opcode::Add => {
                let value = self.read_register(&instr)?;
                self.regs.acc = finite(instr.opcode, self.regs.acc + value)?;
            }

            Opcode::AddNum => {
                self.regs.acc = finite(instr.opcode, self.regs.acc + instr.operand)?;
            }

            Opcode::Sub => {
                let value = self.read_register(&instr)?;
                self.regs.acc = finite(instr.opcode, self.regs.acc - value)?;
            }

            Opcode::SubNum => {
                self.regs.acc = finite(instr.opcode, self.regs.acc - instr.operand)?;
            }

            Opcode::Mul => {
                let value = self.read_register(&instr)?;
                self.regs.acc = finite(instr.opcode, self.regs.acc * value)?;
            }

            Opcode::MulNum => {
                self.regs.acc = finite(instr.opcode, self.regs.acc * instr.operand)?;
            }

            Opcode::Div => {
                let divisor = self.read_register(&instr)?;
                self.regs.acc = finite(instr.opcode, divide(self.regs.acc, divisor)?)?;
            }

            Opcode::DivNum => {
                self.regs.acc = finite(instr.opcode, divide(self.regs.acc, instr.operand)?)?;
            }

            // ==================== Jumps ====================

            Opcode::JumpNeg => {
                if self.regs.acc < 0.0 {
                    return self.jump(&instr);
                }
            }

            Opcode::JumpPos => {
                if self.regs.acc > 0.0 {
                    return self.jump(&instr);
                }
            }

            Opcode::JumpNull => {
                if self.regs.acc == 0.0 {
                    return self.jump(&instr);
                }
            }

            Opcode::Jump => {
                return self.jump(&instr);
            }
        }

        self.regs.advance_pc();
        Ok(())
    }

    fn read_register(&self, instr: &Instruction) -> Result<f64, ExecutionFault> {
        instr.index()
            .and_then(|i| self.regs.read(i))
            .ok_or(ExecutionFault::RegisterOutOfRange { operand: instr.operand })
    }

    fn port_id(&self, instr: &Instruction) -> Result<PortId, ExecutionFault> {
        instr.index().ok_or(ExecutionFault::PortOutOfRange { operand: instr.operand })
    }

    fn jump(&mut self, instr: &Instruction) -> Result<(), ExecutionFault> {
        match instr.index().filter(|&t| self.mem.contains(t)) {
            Some(target) => {
                self.regs.jump(target);
                Ok(())
            }
            None => Err(ExecutionFault::JumpOutOfRange {
                target: instr.operand,
                len: self.mem.len(),
            }),
        }
    }

    fn port_fault(&self, error: PortError, port: PortId, direction: Direction) -> ExecutionFault {
        match error {
            PortError::Closed => ExecutionFault::PortClosed { port, direction },
            PortError::TimedOut => ExecutionFault::PortTimeout {
                port,
                direction,
                timeout_ms: self.options.io_timeout.map_or(0, |t| t.as_millis() as u64),
            },
        }
    }

    /// Move to the faulted state and release every port.
    fn fail(&mut self, fault: ExecutionFault) -> ExecutionFault {
        log::warn!("{} - fault at pc={}: {}", self.name, self.regs.pc, fault);
        self.state = UnitState::Faulted;
        self.ports.close();
        fault
    }

    fn trace(&self, when: &str, instr: &Instruction) {
        log::debug!(
            target: TRACE_TARGET,
            "{} - {} pc={:03} {:<12} acc={} regs={:?}",
            self.name, when, self.regs.pc, instr.to_string(), self.regs.acc, self.regs.file
        );
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the unit has halted.
    pub fn is_halted(&self) -> bool {
        self.state == UnitState::Halted
    }
}

/// Reject a result the accumulator cannot hold. The accumulator is left untouched.
fn finite(opcode: Opcode, value: f64) -> Result<f64, ExecutionFault> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ExecutionFault::NonFiniteResult(opcode))
    }
}

fn divide(dividend: f64, divisor: f64) -> Result<f64, ExecutionFault> {
    if divisor == 0.0 {
        return Err(ExecutionFault::DivisionByZero);
    }
    Ok(dividend / divisor)
}

impl std::fmt::Debug for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unit")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur while a unit runs.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ExecutionFault {
    #[error("unit not running: {0:?}")]
    NotRunning(UnitState),

    #[error("{0}")]
    Memory(#[from] MemoryError),

    #[error("division by zero")]
    DivisionByZero,

    #[error("{0} produced a non-finite result")]
    NonFiniteResult(Opcode),

    #[error("register index {operand} out of range")]
    RegisterOutOfRange { operand: f64 },

    #[error("jump target {target} out of range (program has {len} instructions)")]
    JumpOutOfRange { target: f64, len: usize },

    #[error("port id {operand} is not a valid port number")]
    PortOutOfRange { operand: f64 },

    #[error("{direction} port {port} is not wired")]
    UnwiredPort { port: PortId, direction: Direction },

    #[error("{direction} port {port} closed: peer unit terminated")]
    PortClosed { port: PortId, direction: Direction },

    #[error("{direction} port {port} timed out after {timeout_ms} ms")]
    PortTimeout { port: PortId, direction: Direction, timeout_ms: u64 },

    #[error("cycle limit of {0} reached without STOP")]
    CycleLimit(u64),

    #[error("unit thread panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::port::channel;
    use proptest::prelude::*;
    use std::thread;

    fn op(opcode: Opcode, operand: f64) -> Instruction {
        Instruction::new(opcode, operand)
    }

    fn bare(opcode: Opcode) -> Instruction {
        Instruction::bare(opcode)
    }

    fn run_program(program: Vec<Instruction>) -> (Unit, Result<Duration, ExecutionFault>) {
        let mut unit = Unit::new("test", program);
        let result = unit.run();
        (unit, result)
    }

    #[test]
    fn test_stop_only() {
        let (unit, result) = run_program(vec![bare(Opcode::Stop)]);

        assert!(result.is_ok());
        assert!(unit.is_halted());
        assert_eq!(unit.cycles, 1);
        assert_eq!(unit.regs.acc, 0.0);
        assert_eq!(unit.regs.pc, 1);
    }

    #[test]
    fn test_start_then_stop() {
        let (unit, result) = run_program(vec![bare(Opcode::Start), bare(Opcode::Stop)]);

        assert!(result.is_ok());
        assert_eq!(unit.cycles, 2);
        assert_eq!(unit.last_instruction(), Some(bare(Opcode::Stop)));
    }

    #[test]
    fn test_arithmetic() {
        let (unit, result) = run_program(vec![
            op(Opcode::LoadNum, 10.0),
            op(Opcode::Store, 0.0),
            op(Opcode::AddNum, 5.0),   // 15
            op(Opcode::Mul, 0.0),      // 150
            op(Opcode::SubNum, 30.0),  // 120
            op(Opcode::Div, 0.0),      // 12
            op(Opcode::Sub, 0.0),      // 2
            op(Opcode::MulNum, 4.0),   // 8
            op(Opcode::DivNum, 16.0),  // 0.5
            op(Opcode::Add, 0.0),      // 10.5
            bare(Opcode::Stop),
        ]);

        assert!(result.is_ok());
        assert_eq!(unit.regs.acc, 10.5);
        assert_eq!(unit.regs.read(0), Some(10.0));
    }

    #[test]
    fn test_countdown_loop() {
        // R0 counts down from 3; R1 counts iterations.
        let (unit, result) = run_program(vec![
            op(Opcode::LoadNum, 3.0),
            op(Opcode::Store, 0.0),
            op(Opcode::Load, 1.0),     // 2: loop
            op(Opcode::AddNum, 1.0),
            op(Opcode::Store, 1.0),
            op(Opcode::Load, 0.0),
            op(Opcode::SubNum, 1.0),
            op(Opcode::Store, 0.0),
            op(Opcode::JumpPos, 2.0),
            bare(Opcode::Stop),
        ]);

        assert!(result.is_ok());
        assert_eq!(unit.regs.read(0), Some(0.0));
        assert_eq!(unit.regs.read(1), Some(3.0));
    }

    #[test]
    fn test_division_by_zero_register() {
        let (unit, result) = run_program(vec![
            op(Opcode::LoadNum, 1.0),
            op(Opcode::Div, 3.0),
            bare(Opcode::Stop),
        ]);

        assert_eq!(result, Err(ExecutionFault::DivisionByZero));
        assert_eq!(unit.state, UnitState::Faulted);
        assert_eq!(unit.regs.acc, 1.0);
        assert_eq!(unit.regs.pc, 1);
    }

    #[test]
    fn test_division_by_zero_literal() {
        let (_, result) = run_program(vec![op(Opcode::DivNum, 0.0), bare(Opcode::Stop)]);
        assert_eq!(result, Err(ExecutionFault::DivisionByZero));
    }

    #[test]
    fn test_overflow_faults_before_reaching_acc() {
        let (unit, result) = run_program(vec![
            op(Opcode::LoadNum, 1e300),
            op(Opcode::MulNum, 1e300),
            op(Opcode::Store, 0.0),
            op(Opcode::Sub, 0.0),
            op(Opcode::JumpNeg, 7.0),
            op(Opcode::JumpPos, 7.0),
            op(Opcode::JumpNull, 7.0),
            bare(Opcode::Stop),
        ]);

        assert_eq!(result, Err(ExecutionFault::NonFiniteResult(Opcode::MulNum)));
        assert_eq!(unit.state, UnitState::Faulted);
        assert_eq!(unit.regs.pc, 1);
        assert_eq!(unit.regs.acc, 1e300);
        assert_eq!(unit.regs.read(0), Some(0.0));
    }

    #[test]
    fn test_non_finite_literal_rejected() {
        let (_, result) = run_program(vec![op(Opcode::LoadNum, f64::NAN), bare(Opcode::Stop)]);
        assert_eq!(result, Err(ExecutionFault::NonFiniteResult(Opcode::LoadNum)));

        let (unit, result) = run_program(vec![op(Opcode::LoadNum, 1.0), op(Opcode::AddNum, f64::INFINITY)]);
        assert_eq!(result, Err(ExecutionFault::NonFiniteResult(Opcode::AddNum)));
        assert_eq!(unit.regs.acc, 1.0);
    }

    #[test]
    fn test_register_out_of_range() {
        let (_, result) = run_program(vec![op(Opcode::Load, 16.0), bare(Opcode::Stop)]);
        assert_eq!(result, Err(ExecutionFault::RegisterOutOfRange { operand: 16.0 }));

        let (_, result) = run_program(vec![op(Opcode::Store, 1.5), bare(Opcode::Stop)]);
        assert_eq!(result, Err(ExecutionFault::RegisterOutOfRange { operand: 1.5 }));

        let (_, result) = run_program(vec![op(Opcode::Add, -1.0), bare(Opcode::Stop)]);
        assert_eq!(result, Err(ExecutionFault::RegisterOutOfRange { operand: -1.0 }));
    }

    #[test]
    fn test_jump_out_of_range() {
        let (_, result) = run_program(vec![op(Opcode::Jump, 5.0), bare(Opcode::Stop)]);
        assert_eq!(result, Err(ExecutionFault::JumpOutOfRange { target: 5.0, len: 2 }));
    }

    #[test]
    fn test_untaken_branch_is_not_validated() {
        let (unit, result) = run_program(vec![op(Opcode::JumpNeg, 99.0), bare(Opcode::Stop)]);
        assert!(result.is_ok());
        assert!(unit.is_halted());
    }

    #[test]
    fn test_running_off_the_end() {
        let (unit, result) = run_program(vec![op(Opcode::LoadNum, 1.0)]);
        assert_eq!(
            result,
            Err(ExecutionFault::Memory(MemoryError::AddressOutOfRange { pc: 1, len: 1 }))
        );
        assert_eq!(unit.regs.acc, 1.0);
    }

    #[test]
    fn test_unwired_port() {
        let (_, result) = run_program(vec![op(Opcode::Out, 2.0), bare(Opcode::Stop)]);
        assert_eq!(
            result,
            Err(ExecutionFault::UnwiredPort { port: 2, direction: Direction::Output })
        );

        let (_, result) = run_program(vec![op(Opcode::In, 0.5), bare(Opcode::Stop)]);
        assert_eq!(result, Err(ExecutionFault::PortOutOfRange { operand: 0.5 }));
    }

    #[test]
    fn test_step_after_halt() {
        let (mut unit, _) = run_program(vec![bare(Opcode::Stop)]);
        assert_eq!(unit.step(), Err(ExecutionFault::NotRunning(UnitState::Halted)));
        assert_eq!(unit.run(), Err(ExecutionFault::NotRunning(UnitState::Halted)));
    }

    #[test]
    fn test_cycle_limit() {
        let options = UnitOptions { max_cycles: Some(50), ..UnitOptions::default() };
        let mut unit = Unit::with_options("spin", vec![op(Opcode::Jump, 0.0)], options);

        assert_eq!(unit.run(), Err(ExecutionFault::CycleLimit(50)));
        assert_eq!(unit.cycles, 50);
    }

    #[test]
    fn test_in_out_through_port() {
        let (tx, rx) = channel(2);
        let mut producer = Unit::new("a", vec![
            op(Opcode::LoadNum, 5.0),
            op(Opcode::Out, 0.0),
            bare(Opcode::Stop),
        ]);
        producer.ports.attach_output(0, tx);
        let mut consumer = Unit::new("b", vec![
            op(Opcode::In, 0.0),
            op(Opcode::Store, 0.0),
            bare(Opcode::Stop),
        ]);
        consumer.ports.attach_input(0, rx);

        let handle = thread::spawn(move || {
            consumer.run().unwrap();
            consumer
        });
        producer.run().unwrap();
        let consumer = handle.join().unwrap();

        assert_eq!(consumer.regs.read(0), Some(5.0));
    }

    #[test]
    fn test_in_timeout() {
        let (_tx, rx) = channel(2);
        let options = UnitOptions {
            io_timeout: Some(Duration::from_millis(20)),
            ..UnitOptions::default()
        };
        let mut unit = Unit::with_options("waiter", vec![op(Opcode::In, 0.0), bare(Opcode::Stop)], options);
        unit.ports.attach_input(0, rx);

        assert_eq!(
            unit.run(),
            Err(ExecutionFault::PortTimeout { port: 0, direction: Direction::Input, timeout_ms: 20 })
        );
    }

    #[test]
    fn test_in_from_terminated_peer() {
        let (tx, rx) = channel(2);
        drop(tx);
        let mut unit = Unit::new("orphan", vec![op(Opcode::In, 0.0), bare(Opcode::Stop)]);
        unit.ports.attach_input(0, rx);

        assert_eq!(
            unit.run(),
            Err(ExecutionFault::PortClosed { port: 0, direction: Direction::Input })
        );
    }

    #[test]
    fn test_halt_closes_ports() {
        let (tx, rx) = channel(2);
        let mut unit = Unit::new("quiet", vec![bare(Opcode::Stop)]);
        unit.ports.attach_output(1, tx);

        unit.run().unwrap();
        assert_eq!(rx.recv(None), Err(PortError::Closed));
    }

    #[test]
    fn test_trace_does_not_change_state() {
        let program = vec![
            op(Opcode::LoadNum, 2.0),
            op(Opcode::Store, 4.0),
            op(Opcode::MulNum, 3.0),
            bare(Opcode::Stop),
        ];
        let mut plain = Unit::new("plain", program.clone());
        let mut traced = Unit::with_options(
            "traced",
            program,
            UnitOptions { trace: true, ..UnitOptions::default() },
        );
        plain.run().unwrap();
        traced.run().unwrap();

        assert_eq!(plain.regs, traced.regs);
        assert_eq!(plain.cycles, traced.cycles);
    }

    fn straight_line_instruction() -> impl Strategy<Value = Instruction> {
        let register = (0usize..16).prop_map(|r| r as f64);
        let literal = -1000.0f64..1000.0;
        prop_oneof![
            register.clone().prop_map(|r| op(Opcode::Load, r)),
            register.clone().prop_map(|r| op(Opcode::Store, r)),
            register.clone().prop_map(|r| op(Opcode::Add, r)),
            register.clone().prop_map(|r| op(Opcode::Sub, r)),
            register.clone().prop_map(|r| op(Opcode::Mul, r)),
            register.prop_map(|r| op(Opcode::Div, r)),
            literal.clone().prop_map(|n| op(Opcode::LoadNum, n)),
            literal.clone().prop_map(|n| op(Opcode::AddNum, n)),
            literal.clone().prop_map(|n| op(Opcode::SubNum, n)),
            literal.clone().prop_map(|n| op(Opcode::MulNum, n)),
            literal.prop_map(|n| op(Opcode::DivNum, n)),
        ]
    }

    proptest! {
        #[test]
        fn prop_straight_line_programs_are_deterministic(
            body in prop::collection::vec(straight_line_instruction(), 0..24),
        ) {
            let mut program = body;
            program.push(bare(Opcode::Stop));

            let (first, first_result) = run_program(program.clone());
            let (second, second_result) = run_program(program);

            prop_assert_eq!(first_result.is_ok(), second_result.is_ok());
            prop_assert_eq!(first.state, second.state);
            prop_assert_eq!(first.cycles, second.cycles);
            prop_assert_eq!(first.regs.pc, second.regs.pc);
            prop_assert_eq!(first.regs.acc.to_bits(), second.regs.acc.to_bits());
            for (a, b) in first.regs.file.iter().zip(second.regs.file.iter()) {
                prop_assert_eq!(a.to_bits(), b.to_bits());
            }
        }

        #[test]
        fn prop_store_then_load_round_trips(n in -1.0e12f64..1.0e12, r in 0usize..16) {
            let (unit, result) = run_program(vec![
                op(Opcode::LoadNum, n),
                op(Opcode::Store, r as f64),
                op(Opcode::LoadNum, 0.0),
                op(Opcode::Load, r as f64),
                bare(Opcode::Stop),
            ]);

            prop_assert!(result.is_ok());
            prop_assert_eq!(unit.regs.acc, n);
        }

        #[test]
        fn prop_exactly_one_conditional_jump_fires(acc in prop_oneof![Just(0.0f64), -100.0f64..100.0]) {
            let mut taken = 0;
            for jump in [Opcode::JumpNeg, Opcode::JumpPos, Opcode::JumpNull] {
                let mut unit = Unit::new("jump", vec![
                    op(Opcode::LoadNum, acc),
                    op(jump, 3.0),
                    bare(Opcode::Stop),
                    bare(Opcode::Stop),
                ]);
                unit.step().unwrap();
                unit.step().unwrap();
                match unit.regs.pc {
                    3 => taken += 1,
                    2 => {}
                    pc => prop_assert!(false, "unexpected pc {}", pc),
                }
            }
            prop_assert_eq!(taken, 1);
        }
    }
}
