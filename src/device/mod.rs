//! Synchronized Devices
//!
//! Every simulated sensor or actuator that mirrors state with the engine
//! implements [`SyncDevice`]. The trait is the whole contract between a device kind
//! and the step loop:
//!
//! - `write_request` flushes a pending command into the outbound round
//! - `read_answer` decodes one tagged message addressed to the device
//! - `toggle_remote` re-arms pending commands after a topology change
//! - dropping the device releases everything it owns
//!
//! Device kinds are built from the same small parts: [`SamplingState`] carries the
//! edge-triggered enable flag and the requested period, [`LookupTable`] carries the
//! calibration table the engine sends in a configure message.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                 Controller (step lock)                    │
//! │  ┌────────────────────────────────────────────────────┐   │
//! │  │                 DeviceRegistry                     │   │
//! │  │  ┌──────────────┐  ┌──────────┐                    │   │
//! │  │  │ InertialUnit │  │   Gyro   │  ...               │   │
//! │  │  └──────────────┘  └──────────┘                    │   │
//! │  └────────────────────────────────────────────────────┘   │
//! ├───────────────────────────────────────────────────────────┤
//! │            SyncDevice  (flush | decode | resync)          │
//! ├───────────────────────────────────────────────────────────┤
//! │                WireWriter  |  WireReader                  │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod gyro;
pub mod inertial_unit;
pub mod lookup_table;
pub mod registry;
pub mod sampling;

pub use gyro::Gyro;
pub use inertial_unit::InertialUnit;
pub use lookup_table::{LookupRow, LookupTable};
pub use registry::{DeviceInfo, DeviceRegistry};
pub use sampling::SamplingState;

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

use crate::error::AppResult;
use crate::protocol::{WireReader, WireWriter};

/// Opaque device handle.
///
/// Handles are assigned by the [`DeviceRegistry`] and double as the device
/// address in the framed request and answer streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceTag(u16);

impl DeviceTag {
    /// Wrap a raw handle value.
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw handle value as written on the wire.
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for DeviceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device kinds known to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Roll/pitch/yaw orientation sensor.
    InertialUnit,
    /// Three-axis angular velocity sensor.
    Gyro,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeKind::InertialUnit => "inertial_unit",
            NodeKind::Gyro => "gyro",
        };
        write!(f, "{}", label)
    }
}

/// Capability: state synchronized with the simulation engine.
///
/// # Contract
/// - `write_request` is called once per round, before any answer of that round
/// - `write_request` writes nothing unless a command is pending
/// - `read_answer` consumes exactly one message, tag included
/// - an unknown tag is returned as [`SyncError::ProtocolDesync`](crate::error::SyncError::ProtocolDesync),
///   never skipped
///
/// # Thread Safety
/// Implementations are plain data. The [`Controller`](crate::controller::Controller)
/// step lock serializes every call.
pub trait SyncDevice: Any + Send {
    /// Kind used to check handles on resolution.
    fn kind(&self) -> NodeKind;

    /// Flush any pending command into the outbound round.
    fn write_request(&mut self, writer: &mut WireWriter);

    /// Decode one message addressed to `tag`.
    fn read_answer(&mut self, tag: DeviceTag, reader: &mut WireReader) -> AppResult<()>;

    /// Re-arm pending commands so the next flush replays current configuration.
    ///
    /// # Default Implementation
    /// Does nothing: the device has no configuration worth replaying.
    fn toggle_remote(&mut self) {}

    /// Downcast support for typed resolution.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
