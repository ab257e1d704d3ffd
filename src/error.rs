//! Custom error types for the crate.
//!
//! This module defines the primary error type, `SyncError`. Using the `thiserror`
//! crate, it gives one consistent way to report everything that can go wrong between
//! a client accessor call and a decoded answer from the simulation engine.
//!
//! ## Error Hierarchy
//!
//! Errors fall into two categories:
//!
//! 1. **Accessor errors** - `InvalidDevice`, `InvalidArgument`, `DuplicateDevice`
//!    - Reported at the failing call, no device state is touched
//!    - Other devices and in-flight rounds are unaffected
//!    - Recovery: fix the call site and carry on
//!
//! 2. **Protocol errors** - `ProtocolDesync`, `UnknownDevice`, `Truncated`, `EngineFailure`,
//!    `SessionTerminated`
//!    - The shared byte stream can no longer be trusted
//!    - Recovery: none; the synchronization session is over
//!
//! Configuration problems (`Config`, `Configuration`) only happen at startup.

use crate::device::{DeviceTag, NodeKind};
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, SyncError>;

/// Primary error type for device synchronization.
#[derive(Error, Debug)]
pub enum SyncError {
    /// An accessor was called with a handle that does not resolve to a device
    /// of the expected kind.
    #[error("{function}(): invalid device tag {tag}")]
    InvalidDevice {
        /// Accessor that rejected the handle.
        function: &'static str,
        /// Offending handle.
        tag: DeviceTag,
    },

    /// An accessor argument was rejected before any state was touched.
    #[error("{function}() called with {message}")]
    InvalidArgument {
        /// Accessor that rejected the argument.
        function: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// A device with the same name is already attached.
    #[error("Device '{0}' is already registered")]
    DuplicateDevice(String),

    /// An answer carried a tag the addressed device does not understand.
    ///
    /// The client and the engine disagree on message framing or protocol
    /// version. Every byte after this point is misaligned.
    #[error("Protocol desynchronized: {kind} device {device} received unknown tag 0x{tag:02x}")]
    ProtocolDesync {
        /// Device the message was addressed to.
        device: DeviceTag,
        /// Kind of that device.
        kind: NodeKind,
        /// Raw tag byte.
        tag: u8,
    },

    /// An answer was addressed to a handle that is not attached.
    #[error("Protocol desynchronized: answer addressed to unknown device {0}")]
    UnknownDevice(DeviceTag),

    /// The answer stream ended in the middle of a message.
    #[error("Truncated message: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the decoder asked for.
        needed: usize,
        /// Bytes left in the stream.
        remaining: usize,
    },

    /// The engine side of the exchange failed (transport lost, malformed request).
    #[error("Engine exchange failed: {0}")]
    EngineFailure(String),

    /// A previous fatal error ended the synchronization session.
    #[error("Synchronization session terminated")]
    SessionTerminated,

    /// Configuration validation failed.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl SyncError {
    /// Whether this error ends the synchronization session.
    ///
    /// Fatal errors come from the shared byte stream; once one is seen, message
    /// boundaries are lost for every device, not just the one being decoded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::ProtocolDesync { .. }
                | SyncError::UnknownDevice(_)
                | SyncError::Truncated { .. }
                | SyncError::EngineFailure(_)
                | SyncError::SessionTerminated
        )
    }
}

impl From<figment::Error> for SyncError {
    fn from(value: figment::Error) -> Self {
        SyncError::Config(Box::new(value))
    }
}
