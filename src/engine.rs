//! Engine seam and the periodic step loop.
//!
//! The simulation engine lives on the other side of a transport this crate does
//! not own. [`Engine`] is the seam: hand it one framed request round, get back one
//! framed answer round. [`StepLoop`] drives [`Controller::step`] on a tokio interval
//! in the background while client threads use the accessors.
//!
//! [`MockEngine`] is an in-process engine for tests and demos. It decodes sampling
//! commands, remembers the period each device asked for, and replays answers
//! queued by the test.
//!
//! # Example
//!
//! ```rust
//! use device_sync::controller::Controller;
//! use device_sync::device::InertialUnit;
//! use device_sync::engine::MockEngine;
//! use device_sync::protocol::ByteOrder;
//!
//! let controller = Controller::new(ByteOrder::Little);
//! let imu = controller.attach("imu", Box::new(InertialUnit::new()))?;
//! let mut engine = MockEngine::new(ByteOrder::Little);
//!
//! controller.inertial_unit().enable(imu, 32)?;
//! engine.queue_inertial_unit_data(imu, [0.1, -0.2, 3.0]);
//! controller.step(&mut engine)?;
//!
//! assert_eq!(engine.sampling_period(imu), Some(32));
//! assert_eq!(controller.inertial_unit().roll_pitch_yaw(imu)?, [0.1, -0.2, 3.0]);
//! # Ok::<(), device_sync::error::SyncError>(())
//! ```

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::controller::Controller;
use crate::device::{DeviceTag, LookupTable};
use crate::error::{AppResult, SyncError};
use crate::protocol::{ByteOrder, MessageTag, WireReader, WireWriter};

/// Remote side of a synchronization round.
pub trait Engine: Send {
    /// Deliver one framed request round and return the framed answer round.
    ///
    /// Any error ends the synchronization session: the commands of the round have
    /// already been flushed and are not sent again.
    fn exchange(&mut self, request: Bytes) -> AppResult<Bytes>;
}

// =============================================================================
// Step Loop
// =============================================================================

/// Runs synchronization rounds periodically in the background.
pub struct StepLoop {
    controller: Arc<Controller>,
    period: Duration,
}

impl StepLoop {
    /// Loop over `controller` with one round every `period`.
    ///
    /// # Errors
    /// Returns [`SyncError::Configuration`] if `period` is zero.
    pub fn new(controller: Arc<Controller>, period: Duration) -> AppResult<Self> {
        if period.is_zero() {
            return Err(SyncError::Configuration(
                "step loop period must be non-zero".into(),
            ));
        }
        Ok(Self { controller, period })
    }

    /// Run rounds until `shutdown` flips to true or a round fails.
    ///
    /// # Returns
    /// - Ok(rounds) after a clean shutdown
    /// - Err with the first round error, which has already terminated the session
    ///   if it was fatal
    pub async fn run<E: Engine>(
        self,
        mut engine: E,
        mut shutdown: watch::Receiver<bool>,
    ) -> AppResult<u64> {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut rounds = 0u64;

        info!(period_ms = self.period.as_millis() as u64, "step loop started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.controller.step(&mut engine) {
                        warn!(error = %err, rounds, "step loop stopped");
                        return Err(err);
                    }
                    rounds += 1;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(rounds, "step loop shut down");
        Ok(rounds)
    }

    /// Spawn the loop on the current tokio runtime.
    pub fn spawn<E: Engine + 'static>(self, engine: E) -> StepLoopHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(engine, shutdown_rx));
        StepLoopHandle { shutdown_tx, task }
    }
}

/// Handle to a spawned [`StepLoop`].
pub struct StepLoopHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<AppResult<u64>>,
}

impl StepLoopHandle {
    /// Whether the loop has already stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the loop to stop and wait for it.
    pub async fn shutdown(self) -> AppResult<u64> {
        // The loop may already be gone after a fatal round; its result still matters.
        let _ = self.shutdown_tx.send(true);
        self.task
            .await
            .map_err(|err| SyncError::EngineFailure(format!("step loop task failed: {err}")))?
    }
}

// =============================================================================
// MockEngine - Simulated Engine
// =============================================================================

/// Sampling command decoded by the [`MockEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingCommand {
    /// Device the command came from.
    pub device: DeviceTag,
    /// Requested period in milliseconds.
    pub sampling_period: u16,
}

#[derive(Debug)]
struct MockEngineState {
    commands: Vec<SamplingCommand>,
    periods: BTreeMap<DeviceTag, u16>,
    answer: WireWriter,
    rounds: u64,
}

/// In-process engine for tests.
///
/// Clones share state, so a test can keep one clone for inspection while a
/// [`StepLoop`] owns another.
#[derive(Debug, Clone)]
pub struct MockEngine {
    order: ByteOrder,
    state: Arc<Mutex<MockEngineState>>,
}

impl MockEngine {
    /// Create an engine speaking `order`.
    pub fn new(order: ByteOrder) -> Self {
        Self {
            order,
            state: Arc::new(Mutex::new(MockEngineState {
                commands: Vec::new(),
                periods: BTreeMap::new(),
                answer: WireWriter::new(order),
                rounds: 0,
            })),
        }
    }

    /// Every sampling command received so far, in arrival order.
    pub fn commands(&self) -> Vec<SamplingCommand> {
        self.state.lock().commands.clone()
    }

    /// Drain the received commands.
    pub fn take_commands(&self) -> Vec<SamplingCommand> {
        std::mem::take(&mut self.state.lock().commands)
    }

    /// Period the engine currently samples `device` at, if it ever asked.
    pub fn sampling_period(&self, device: DeviceTag) -> Option<u16> {
        self.state.lock().periods.get(&device).copied()
    }

    /// Number of completed exchanges.
    pub fn rounds(&self) -> u64 {
        self.state.lock().rounds
    }

    /// Queue `[InertialUnitData][roll][pitch][yaw]` for the next round.
    pub fn queue_inertial_unit_data(&self, device: DeviceTag, roll_pitch_yaw: [f64; 3]) {
        self.queue_vector(device, MessageTag::InertialUnitData, roll_pitch_yaw);
    }

    /// Queue `[GyroData][x][y][z]` for the next round.
    pub fn queue_gyro_data(&self, device: DeviceTag, values: [f64; 3]) {
        self.queue_vector(device, MessageTag::GyroData, values);
    }

    fn queue_vector(&self, device: DeviceTag, tag: MessageTag, values: [f64; 3]) {
        let mut state = self.state.lock();
        state.answer.write_u16(device.get());
        state.answer.write_tag(tag);
        for value in values {
            state.answer.write_f64(value);
        }
    }

    /// Queue a configure message carrying `table` for the next round.
    pub fn queue_configure(&self, device: DeviceTag, table: &LookupTable) {
        let mut state = self.state.lock();
        state.answer.write_u16(device.get());
        state.answer.write_tag(MessageTag::Configure);
        state.answer.write_i32(table.size() as i32);
        for value in table.as_slice() {
            state.answer.write_f64(*value);
        }
    }

    /// Queue raw bytes, framing included, for the next round.
    pub fn queue_raw(&self, bytes: &[u8]) {
        self.state.lock().answer.write_bytes(bytes);
    }

    fn decode_request(&self, state: &mut MockEngineState, request: Bytes) -> AppResult<()> {
        let mut reader = WireReader::new(request, self.order);
        while !reader.is_exhausted() {
            let device = DeviceTag::new(reader.read_u16()?);
            let raw = reader.read_u8()?;
            match MessageTag::from_u8(raw) {
                Some(MessageTag::SetSamplingPeriod) => {
                    let sampling_period = reader.read_u16()?;
                    debug!(%device, sampling_period, "mock engine received sampling period");
                    state.commands.push(SamplingCommand {
                        device,
                        sampling_period,
                    });
                    state.periods.insert(device, sampling_period);
                }
                _ => {
                    return Err(SyncError::EngineFailure(format!(
                        "mock engine cannot decode request tag 0x{raw:02x} from device {device}"
                    )))
                }
            }
        }
        Ok(())
    }
}

impl Engine for MockEngine {
    fn exchange(&mut self, request: Bytes) -> AppResult<Bytes> {
        let mut state = self.state.lock();
        self.decode_request(&mut state, request)?;
        state.rounds += 1;
        Ok(state.answer.split())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
