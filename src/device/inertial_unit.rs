//! Inertial unit: roll/pitch/yaw orientation sensor.
//!
//! The engine answers with two messages:
//!
//! - `[InertialUnitData][roll: f64][pitch: f64][yaw: f64]`
//! - `[Configure][size: i32][size × (input, low, high): f64]`
//!
//! The client sends `[SetSamplingPeriod][period: u16]` whenever the sampling
//! period was changed since the last round.
//!
//! # Example
//!
//! ```rust
//! use device_sync::controller::Controller;
//! use device_sync::device::InertialUnit;
//! use device_sync::protocol::ByteOrder;
//!
//! let controller = Controller::new(ByteOrder::Little);
//! let imu = controller.attach("imu", Box::new(InertialUnit::new()))?;
//!
//! controller.inertial_unit().enable(imu, 32)?;
//! assert_eq!(controller.inertial_unit().sampling_period(imu)?, 32);
//! # Ok::<(), device_sync::error::SyncError>(())
//! ```

use std::any::Any;
use tracing::{error, trace, warn};

use crate::controller::Controller;
use crate::device::{DeviceTag, LookupTable, NodeKind, SamplingState, SyncDevice};
use crate::error::{AppResult, SyncError};
use crate::protocol::{MessageTag, WireReader, WireWriter};

/// Orientation sensor state.
#[derive(Debug, Clone)]
pub struct InertialUnit {
    sampling: SamplingState,
    roll_pitch_yaw: [f64; 3],
    lookup_table: LookupTable,
}

impl InertialUnit {
    /// Fresh state: disabled, nothing pending, no measurement, no table.
    pub fn new() -> Self {
        Self {
            sampling: SamplingState::new(),
            roll_pitch_yaw: [f64::NAN; 3],
            lookup_table: LookupTable::default(),
        }
    }

    /// Request a sampling period in milliseconds; 0 stops sampling.
    pub fn enable(&mut self, sampling_period: i32) -> AppResult<()> {
        self.sampling.request("inertial_unit_enable", sampling_period)
    }

    /// Requested sampling period in milliseconds.
    pub fn sampling_period(&self) -> i32 {
        self.sampling.sampling_period()
    }

    /// Whether a sampling command waits for the next round.
    pub fn is_pending(&self) -> bool {
        self.sampling.is_pending()
    }

    /// Last roll/pitch/yaw received, NaN before the first data message.
    pub fn roll_pitch_yaw(&self) -> [f64; 3] {
        self.roll_pitch_yaw
    }

    /// Overwrite the orientation without waiting for the engine.
    pub fn set_roll_pitch_yaw(&mut self, values: [f64; 3]) {
        self.roll_pitch_yaw = values;
    }

    /// Calibration table last sent by the engine.
    pub fn lookup_table(&self) -> &LookupTable {
        &self.lookup_table
    }
}

impl Default for InertialUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncDevice for InertialUnit {
    fn kind(&self) -> NodeKind {
        NodeKind::InertialUnit
    }

    fn write_request(&mut self, writer: &mut WireWriter) {
        self.sampling.write_pending(writer);
    }

    fn read_answer(&mut self, tag: DeviceTag, reader: &mut WireReader) -> AppResult<()> {
        let raw = reader.read_u8()?;
        match MessageTag::from_u8(raw) {
            Some(MessageTag::InertialUnitData) => {
                let roll = reader.read_f64()?;
                let pitch = reader.read_f64()?;
                let yaw = reader.read_f64()?;
                self.roll_pitch_yaw = [roll, pitch, yaw];
                trace!(%tag, roll, pitch, yaw, "inertial unit data");
            }
            Some(MessageTag::Configure) => {
                // Retire the previous table even if the new one fails to decode.
                self.lookup_table = LookupTable::default();
                self.lookup_table = LookupTable::decode(reader)?;
                trace!(%tag, rows = self.lookup_table.size(), "inertial unit configured");
            }
            _ => {
                return Err(SyncError::ProtocolDesync {
                    device: tag,
                    kind: NodeKind::InertialUnit,
                    tag: raw,
                })
            }
        }
        Ok(())
    }

    fn toggle_remote(&mut self) {
        self.sampling.rearm();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// =============================================================================
// Public Accessors
// =============================================================================

/// Thread-safe accessors for inertial units attached to a [`Controller`].
///
/// Every call takes the controller's step lock and resolves the handle first; an
/// unknown handle, or one naming another kind of device, is rejected without
/// touching any state.
pub struct InertialUnitApi<'c> {
    controller: &'c Controller,
}

impl<'c> InertialUnitApi<'c> {
    pub(crate) fn new(controller: &'c Controller) -> Self {
        Self { controller }
    }

    /// Request a sampling period in milliseconds.
    ///
    /// Negative periods are rejected before the handle is even looked at. A period
    /// of 0 disables sampling and still sends one final command to the engine.
    pub fn enable(&self, tag: DeviceTag, sampling_period: i32) -> AppResult<()> {
        const FUNCTION: &str = "inertial_unit_enable";
        if sampling_period < 0 {
            error!("{}() called with negative sampling period", FUNCTION);
            return Err(SyncError::InvalidArgument {
                function: FUNCTION,
                message: "negative sampling period".into(),
            });
        }
        self.controller
            .with_device(FUNCTION, tag, NodeKind::InertialUnit, |unit: &mut InertialUnit| {
                unit.enable(sampling_period)
            })?
    }

    /// Stop sampling.
    pub fn disable(&self, tag: DeviceTag) -> AppResult<()> {
        self.controller
            .with_device("inertial_unit_disable", tag, NodeKind::InertialUnit, |_: &mut InertialUnit| ())?;
        self.enable(tag, 0)
    }

    /// Requested sampling period in milliseconds.
    pub fn sampling_period(&self, tag: DeviceTag) -> AppResult<i32> {
        self.controller.with_device(
            "inertial_unit_get_sampling_period",
            tag,
            NodeKind::InertialUnit,
            |unit: &mut InertialUnit| unit.sampling_period(),
        )
    }

    /// Last roll/pitch/yaw in radians.
    ///
    /// Reading a device that is not sampling is allowed but logged: the value is
    /// either NaN or stale.
    pub fn roll_pitch_yaw(&self, tag: DeviceTag) -> AppResult<[f64; 3]> {
        const FUNCTION: &str = "inertial_unit_get_roll_pitch_yaw";
        let warn_disabled = self.controller.warn_on_disabled_read();
        self.controller
            .with_device(FUNCTION, tag, NodeKind::InertialUnit, |unit: &mut InertialUnit| {
                if warn_disabled && unit.sampling_period() <= 0 {
                    warn!(
                        %tag,
                        "{}() called for a disabled device! Please use: inertial_unit_enable()",
                        FUNCTION
                    );
                }
                unit.roll_pitch_yaw()
            })
    }

    /// Number of rows in the calibration table.
    pub fn lookup_table_size(&self, tag: DeviceTag) -> AppResult<usize> {
        self.controller.with_device(
            "inertial_unit_get_lookup_table_size",
            tag,
            NodeKind::InertialUnit,
            |unit: &mut InertialUnit| unit.lookup_table().size(),
        )
    }

    /// Snapshot of the calibration table.
    ///
    /// The snapshot is owned by the caller and unaffected by later configure
    /// messages.
    pub fn lookup_table(&self, tag: DeviceTag) -> AppResult<LookupTable> {
        self.controller.with_device(
            "inertial_unit_get_lookup_table",
            tag,
            NodeKind::InertialUnit,
            |unit: &mut InertialUnit| unit.lookup_table().clone(),
        )
    }

    /// Inject an orientation directly, as a remote-control backend does.
    pub fn set_values(&self, tag: DeviceTag, values: [f64; 3]) -> AppResult<()> {
        self.controller.with_device(
            "inertial_unit_set_values",
            tag,
            NodeKind::InertialUnit,
            |unit: &mut InertialUnit| unit.set_roll_pitch_yaw(values),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ByteOrder;
    use tracing_test::traced_test;

    fn answer(build: impl FnOnce(&mut WireWriter)) -> WireReader {
        let mut writer = WireWriter::new(ByteOrder::Little);
        build(&mut writer);
        WireReader::new(writer.freeze(), ByteOrder::Little)
    }

    #[test]
    fn test_new_unit_has_sentinel_state() {
        let unit = InertialUnit::new();
        assert_eq!(unit.sampling_period(), 0);
        assert!(!unit.is_pending());
        assert!(unit.roll_pitch_yaw().iter().all(|v| v.is_nan()));
        assert!(unit.lookup_table().is_empty());
    }

    #[test]
    fn test_write_request_flushes_once() {
        let mut unit = InertialUnit::new();
        unit.enable(64).unwrap();

        let mut writer = WireWriter::new(ByteOrder::Little);
        unit.write_request(&mut writer);
        unit.write_request(&mut writer);

        assert_eq!(&writer.freeze()[..], &[1, 64, 0]);
        assert!(!unit.is_pending());
    }

    #[test]
    fn test_data_message_is_bit_exact() {
        let mut unit = InertialUnit::new();
        let mut reader = answer(|w| {
            w.write_tag(MessageTag::InertialUnitData);
            w.write_f64(0.1);
            w.write_f64(-0.2);
            w.write_f64(3.0);
        });
        unit.read_answer(DeviceTag::new(1), &mut reader).unwrap();
        assert_eq!(unit.roll_pitch_yaw(), [0.1, -0.2, 3.0]);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_configure_replaces_table() {
        let mut unit = InertialUnit::new();
        let mut reader = answer(|w| {
            w.write_tag(MessageTag::Configure);
            w.write_i32(1);
            w.write_f64(0.0);
            w.write_f64(-1.0);
            w.write_f64(1.0);
            w.write_tag(MessageTag::Configure);
            w.write_i32(0);
        });

        unit.read_answer(DeviceTag::new(1), &mut reader).unwrap();
        assert_eq!(unit.lookup_table().size(), 1);

        unit.read_answer(DeviceTag::new(1), &mut reader).unwrap();
        assert!(unit.lookup_table().is_empty());
    }

    #[test]
    fn test_foreign_tag_is_desync() {
        let mut unit = InertialUnit::new();
        let mut reader = answer(|w| w.write_tag(MessageTag::GyroData));
        match unit.read_answer(DeviceTag::new(5), &mut reader) {
            Err(SyncError::ProtocolDesync { device, kind, tag }) => {
                assert_eq!(device, DeviceTag::new(5));
                assert_eq!(kind, NodeKind::InertialUnit);
                assert_eq!(tag, MessageTag::GyroData.as_u8());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_toggle_remote_rearms_only_when_configured() {
        let mut unit = InertialUnit::new();
        unit.toggle_remote();
        assert!(!unit.is_pending());

        unit.enable(16).unwrap();
        let mut writer = WireWriter::new(ByteOrder::Little);
        unit.write_request(&mut writer);
        assert!(!unit.is_pending());

        unit.toggle_remote();
        assert!(unit.is_pending());
    }

    #[test]
    #[traced_test]
    fn test_reading_disabled_unit_warns() {
        let controller = Controller::new(ByteOrder::Little);
        let imu = controller
            .attach("imu", Box::new(InertialUnit::new()))
            .unwrap();

        let values = controller.inertial_unit().roll_pitch_yaw(imu).unwrap();
        assert!(values.iter().all(|v| v.is_nan()));
        assert!(logs_contain(
            "inertial_unit_get_roll_pitch_yaw() called for a disabled device! Please use: inertial_unit_enable()"
        ));
    }

    #[test]
    #[traced_test]
    fn test_invalid_handle_is_logged() {
        let controller = Controller::new(ByteOrder::Little);
        let gyro = controller
            .attach("gyro", Box::new(crate::device::Gyro::new()))
            .unwrap();

        let err = controller
            .inertial_unit()
            .lookup_table_size(gyro)
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidDevice {
                function: "inertial_unit_get_lookup_table_size",
                ..
            }
        ));
        assert!(logs_contain("inertial_unit_get_lookup_table_size(): invalid device tag"));
    }

    #[test]
    #[traced_test]
    fn test_disable_logs_its_own_name() {
        let controller = Controller::new(ByteOrder::Little);
        let missing = DeviceTag::new(42);

        let err = controller.inertial_unit().disable(missing).unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidDevice {
                function: "inertial_unit_disable",
                ..
            }
        ));
        assert!(logs_contain("inertial_unit_disable(): invalid device tag 42"));
        assert!(!logs_contain("inertial_unit_enable(): invalid device tag"));
    }

    #[test]
    #[traced_test]
    fn test_negative_enable_is_logged_and_ignored() {
        let controller = Controller::new(ByteOrder::Little);
        let imu = controller
            .attach("imu", Box::new(InertialUnit::new()))
            .unwrap();
        controller.inertial_unit().enable(imu, 8).unwrap();

        assert!(controller.inertial_unit().enable(imu, -1).is_err());
        assert_eq!(controller.inertial_unit().sampling_period(imu).unwrap(), 8);
        assert!(logs_contain("inertial_unit_enable() called with negative sampling period"));
    }
}
