//! Bounded point-to-point ports.
//!
//! A port is a FIFO of `f64` with a fixed capacity and exactly two
//! endpoints: a [`Producer`] installed as some unit's output and a
//! [`Consumer`] installed as another unit's input. Neither endpoint is
//! `Clone`, so fan-in and fan-out cannot be expressed.
//!
//! Dropping an endpoint closes that side of the port. A consumer still
//! drains whatever was queued before its producer went away, then sees
//! [`PortError::Closed`]; a producer facing a full queue whose consumer is
//! gone sees `Closed` instead of waiting forever.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Local id of a port on one unit, for one direction.
pub type PortId = usize;

/// Default number of values a port can buffer.
pub const DEFAULT_CAPACITY: usize = 2;

/// Which side of a unit a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

struct Queue {
    values: VecDeque<f64>,
    capacity: usize,
    producer_open: bool,
    consumer_open: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    /// Signalled when a value is pushed or the producer closes.
    readable: Condvar,
    /// Signalled when a value is popped or the consumer closes.
    writable: Condvar,
}

/// Create a port that buffers up to `capacity` values (at least one).
pub fn channel(capacity: usize) -> (Producer, Consumer) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(Queue {
            values: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            producer_open: true,
            consumer_open: true,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });
    (
        Producer { shared: Arc::clone(&shared) },
        Consumer { shared },
    )
}

/// Create a port already holding `values`, whose producer has gone away.
///
/// The consumer receives `values` in order and then sees [`PortError::Closed`].
/// Capacity grows to fit `values` if needed.
pub fn preloaded(values: &[f64], capacity: usize) -> Consumer {
    let (producer, consumer) = channel(capacity.max(values.len()));
    consumer.shared.queue.lock().values.extend(values.iter().copied());
    drop(producer);
    consumer
}

/// Wait on `cond` until `deadline`. Returns `false` once the deadline passed.
fn wait(cond: &Condvar, guard: &mut MutexGuard<'_, Queue>, deadline: Option<Instant>) -> bool {
    match deadline {
        None => {
            cond.wait(guard);
            true
        }
        Some(deadline) => !cond.wait_until(guard, deadline).timed_out(),
    }
}

/// Producing end of a port.
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Enqueue `value`, blocking while the port is full.
    ///
    /// With a `timeout`, gives up with [`PortError::TimedOut`] once it
    /// elapses. Fails with [`PortError::Closed`] if the port is full and
    /// its consumer has been dropped.
    pub fn send(&self, value: f64, timeout: Option<Duration>) -> Result<(), PortError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut queue = self.shared.queue.lock();
        loop {
            if queue.values.len() < queue.capacity {
                queue.values.push_back(value);
                drop(queue);
                self.shared.readable.notify_one();
                return Ok(());
            }
            if !queue.consumer_open {
                return Err(PortError::Closed);
            }
            if !wait(&self.shared.writable, &mut queue, deadline)
                && queue.values.len() >= queue.capacity
            {
                return Err(PortError::TimedOut);
            }
        }
    }

    /// Enqueue without blocking.
    pub fn try_send(&self, value: f64) -> Result<(), PortError> {
        self.send(value, Some(Duration::ZERO))
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.shared.queue.lock().producer_open = false;
        self.shared.readable.notify_all();
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.shared.queue.lock();
        f.debug_struct("Producer")
            .field("queued", &queue.values.len())
            .field("capacity", &queue.capacity)
            .finish()
    }
}

/// Consuming end of a port.
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Dequeue the oldest value, blocking while the port is empty.
    ///
    /// Returns [`PortError::Closed`] once the queue is empty and its
    /// producer has been dropped, or [`PortError::TimedOut`] if `timeout`
    /// elapses first.
    pub fn recv(&self, timeout: Option<Duration>) -> Result<f64, PortError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut queue = self.shared.queue.lock();
        loop {
            if let Some(value) = queue.values.pop_front() {
                drop(queue);
                self.shared.writable.notify_one();
                return Ok(value);
            }
            if !queue.producer_open {
                return Err(PortError::Closed);
            }
            if !wait(&self.shared.readable, &mut queue, deadline) && queue.values.is_empty() {
                return Err(PortError::TimedOut);
            }
        }
    }

    /// Dequeue without blocking.
    pub fn try_recv(&self) -> Result<f64, PortError> {
        self.recv(Some(Duration::ZERO))
    }

    /// Receive every remaining value until the producer closes.
    pub fn drain(&self) -> Vec<f64> {
        let mut values = Vec::new();
        while let Ok(value) = self.recv(None) {
            values.push(value);
        }
        values
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.shared.queue.lock().consumer_open = false;
        self.shared.writable.notify_all();
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.shared.queue.lock();
        f.debug_struct("Consumer")
            .field("queued", &queue.values.len())
            .field("capacity", &queue.capacity)
            .finish()
    }
}

/// The wired ports of one unit.
#[derive(Debug, Default)]
pub struct PortSet {
    inputs: HashMap<PortId, Consumer>,
    outputs: HashMap<PortId, Producer>,
}

impl PortSet {
    /// Create an empty port set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is already bound in `direction`.
    pub fn is_bound(&self, direction: Direction, id: PortId) -> bool {
        match direction {
            Direction::Input => self.inputs.contains_key(&id),
            Direction::Output => self.outputs.contains_key(&id),
        }
    }

    /// Install a consumer as input `id`. Returns `false` if `id` is taken.
    pub fn attach_input(&mut self, id: PortId, consumer: Consumer) -> bool {
        if self.inputs.contains_key(&id) {
            return false;
        }
        self.inputs.insert(id, consumer);
        true
    }

    /// Install a producer as output `id`. Returns `false` if `id` is taken.
    pub fn attach_output(&mut self, id: PortId, producer: Producer) -> bool {
        if self.outputs.contains_key(&id) {
            return false;
        }
        self.outputs.insert(id, producer);
        true
    }

    /// Input port `id`, if wired.
    pub fn input(&self, id: PortId) -> Option<&Consumer> {
        self.inputs.get(&id)
    }

    /// Output port `id`, if wired.
    pub fn output(&self, id: PortId) -> Option<&Producer> {
        self.outputs.get(&id)
    }

    /// Wired input ids, sorted.
    pub fn input_ids(&self) -> Vec<PortId> {
        let mut ids: Vec<_> = self.inputs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Wired output ids, sorted.
    pub fn output_ids(&self) -> Vec<PortId> {
        let mut ids: Vec<_> = self.outputs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Drop every endpoint, closing this unit's side of each port.
    pub fn close(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
    }
}

/// Errors raised by port operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PortError {
    #[error("peer endpoint closed")]
    Closed,

    #[error("timed out")]
    TimedOut,
}
