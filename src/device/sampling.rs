//! Edge-triggered sampling configuration shared by sampled sensors.

use tracing::{trace, warn};

use crate::error::{AppResult, SyncError};
use crate::protocol::{MessageTag, WireWriter};

/// Requested sampling period plus the pending-command edge.
///
/// `enabled` is set by every accepted request and cleared by the flush that sends
/// it, so any number of requests between two flushes produce exactly one command
/// carrying the latest period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplingState {
    enabled: bool,
    sampling_period: i32,
}

impl SamplingState {
    /// Disabled, nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a command is waiting for the next flush.
    pub fn is_pending(&self) -> bool {
        self.enabled
    }

    /// Requested period in milliseconds, 0 when disabled.
    pub fn sampling_period(&self) -> i32 {
        self.sampling_period
    }

    /// Whether the engine has been asked to sample.
    pub fn is_sampling(&self) -> bool {
        self.sampling_period > 0
    }

    /// Record a new period and arm the edge.
    ///
    /// A period of 0 is accepted: it stops sampling and still sends one final
    /// command so the engine learns about it.
    pub fn request(&mut self, function: &'static str, sampling_period: i32) -> AppResult<()> {
        if sampling_period < 0 {
            return Err(SyncError::InvalidArgument {
                function,
                message: "negative sampling period".into(),
            });
        }
        self.sampling_period = sampling_period;
        self.enabled = true;
        Ok(())
    }

    /// Consume the edge, returning the period to send if one was pending.
    pub fn take_pending(&mut self) -> Option<i32> {
        if !self.enabled {
            return None;
        }
        self.enabled = false;
        Some(self.sampling_period)
    }

    /// Arm the edge again if there is a configuration worth replaying.
    pub fn rearm(&mut self) {
        if self.sampling_period != 0 {
            self.enabled = true;
        }
    }

    /// Write `[SetSamplingPeriod][period: u16]` if a command is pending.
    pub fn write_pending(&mut self, writer: &mut WireWriter) {
        let Some(period) = self.take_pending() else {
            return;
        };
        let wire_period = u16::try_from(period).unwrap_or_else(|_| {
            warn!(period, "sampling period exceeds wire range, saturating");
            u16::MAX
        });
        trace!(period = wire_period, "flushing sampling period");
        writer.write_tag(MessageTag::SetSamplingPeriod);
        writer.write_u16(wire_period);
    }
}
