//! Gyro: three-axis angular velocity sensor.
//!
//! Same sampling and calibration handshake as the inertial unit, with its own
//! data tag: `[GyroData][x: f64][y: f64][z: f64]`, rad/s.

use std::any::Any;
use tracing::{error, trace, warn};

use crate::controller::Controller;
use crate::device::{DeviceTag, LookupTable, NodeKind, SamplingState, SyncDevice};
use crate::error::{AppResult, SyncError};
use crate::protocol::{MessageTag, WireReader, WireWriter};

/// Angular velocity sensor state.
#[derive(Debug, Clone)]
pub struct Gyro {
    sampling: SamplingState,
    values: [f64; 3],
    lookup_table: LookupTable,
}

impl Gyro {
    /// Fresh state: disabled, nothing pending, no measurement, no table.
    pub fn new() -> Self {
        Self {
            sampling: SamplingState::new(),
            values: [f64::NAN; 3],
            lookup_table: LookupTable::default(),
        }
    }

    /// Request a sampling period in milliseconds; 0 stops sampling.
    pub fn enable(&mut self, sampling_period: i32) -> AppResult<()> {
        self.sampling.request("gyro_enable", sampling_period)
    }

    /// Requested sampling period in milliseconds.
    pub fn sampling_period(&self) -> i32 {
        self.sampling.sampling_period()
    }

    /// Whether a sampling command waits for the next round.
    pub fn is_pending(&self) -> bool {
        self.sampling.is_pending()
    }

    /// Last angular velocity received, NaN before the first data message.
    pub fn values(&self) -> [f64; 3] {
        self.values
    }

    /// Calibration table last sent by the engine.
    pub fn lookup_table(&self) -> &LookupTable {
        &self.lookup_table
    }
}

impl Default for Gyro {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncDevice for Gyro {
    fn kind(&self) -> NodeKind {
        NodeKind::Gyro
    }

    fn write_request(&mut self, writer: &mut WireWriter) {
        self.sampling.write_pending(writer);
    }

    fn read_answer(&mut self, tag: DeviceTag, reader: &mut WireReader) -> AppResult<()> {
        let raw = reader.read_u8()?;
        match MessageTag::from_u8(raw) {
            Some(MessageTag::GyroData) => {
                let x = reader.read_f64()?;
                let y = reader.read_f64()?;
                let z = reader.read_f64()?;
                self.values = [x, y, z];
                trace!(%tag, values = ?self.values, "gyro data");
            }
            Some(MessageTag::Configure) => {
                self.lookup_table = LookupTable::default();
                self.lookup_table = LookupTable::decode(reader)?;
            }
            _ => {
                return Err(SyncError::ProtocolDesync {
                    device: tag,
                    kind: NodeKind::Gyro,
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

/// Thread-safe accessors for gyros attached to a [`Controller`].
pub struct GyroApi<'c> {
    controller: &'c Controller,
}

impl<'c> GyroApi<'c> {
    pub(crate) fn new(controller: &'c Controller) -> Self {
        Self { controller }
    }

    /// Request a sampling period in milliseconds.
    pub fn enable(&self, tag: DeviceTag, sampling_period: i32) -> AppResult<()> {
        if sampling_period < 0 {
            error!("gyro_enable() called with negative sampling period");
            return Err(SyncError::InvalidArgument {
                function: "gyro_enable",
                message: "negative sampling period".into(),
            });
        }
        self.controller
            .with_device("gyro_enable", tag, NodeKind::Gyro, |gyro: &mut Gyro| {
                gyro.enable(sampling_period)
            })?
    }

    /// Stop sampling.
    pub fn disable(&self, tag: DeviceTag) -> AppResult<()> {
        self.controller
            .with_device("gyro_disable", tag, NodeKind::Gyro, |_: &mut Gyro| ())?;
        self.enable(tag, 0)
    }

    /// Requested sampling period in milliseconds.
    pub fn sampling_period(&self, tag: DeviceTag) -> AppResult<i32> {
        self.controller
            .with_device("gyro_get_sampling_period", tag, NodeKind::Gyro, |gyro: &mut Gyro| {
                gyro.sampling_period()
            })
    }

    /// Last angular velocity in rad/s.
    pub fn values(&self, tag: DeviceTag) -> AppResult<[f64; 3]> {
        let warn_disabled = self.controller.warn_on_disabled_read();
        self.controller
            .with_device("gyro_get_values", tag, NodeKind::Gyro, |gyro: &mut Gyro| {
                if warn_disabled && gyro.sampling_period() <= 0 {
                    warn!(%tag, "gyro_get_values() called for a disabled device! Please use: gyro_enable()");
                }
                gyro.values()
            })
    }

    /// Number of rows in the calibration table.
    pub fn lookup_table_size(&self, tag: DeviceTag) -> AppResult<usize> {
        self.controller.with_device(
            "gyro_get_lookup_table_size",
            tag,
            NodeKind::Gyro,
            |gyro: &mut Gyro| gyro.lookup_table().size(),
        )
    }

    /// Snapshot of the calibration table.
    pub fn lookup_table(&self, tag: DeviceTag) -> AppResult<LookupTable> {
        self.controller
            .with_device("gyro_get_lookup_table", tag, NodeKind::Gyro, |gyro: &mut Gyro| {
                gyro.lookup_table().clone()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ByteOrder;

    #[test]
    fn test_data_message_updates_values() {
        let mut writer = WireWriter::new(ByteOrder::Big);
        writer.write_tag(MessageTag::GyroData);
        writer.write_f64(1.5);
        writer.write_f64(f64::INFINITY);
        writer.write_f64(-0.0);
        let mut reader = WireReader::new(writer.freeze(), ByteOrder::Big);

        let mut gyro = Gyro::new();
        gyro.read_answer(DeviceTag::new(2), &mut reader).unwrap();
        let values = gyro.values();
        assert_eq!(values[0], 1.5);
        assert_eq!(values[1], f64::INFINITY);
        assert!(values[2].is_sign_negative());
    }

    #[test]
    fn test_inertial_unit_tag_is_desync() {
        let mut writer = WireWriter::new(ByteOrder::Little);
        writer.write_tag(MessageTag::InertialUnitData);
        let mut reader = WireReader::new(writer.freeze(), ByteOrder::Little);

        let mut gyro = Gyro::new();
        let err = gyro
            .read_answer(DeviceTag::new(2), &mut reader)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_truncated_data_keeps_previous_values() {
        let mut writer = WireWriter::new(ByteOrder::Little);
        writer.write_tag(MessageTag::GyroData);
        for v in [1.0, 2.0, 3.0] {
            writer.write_f64(v);
        }
        writer.write_tag(MessageTag::GyroData);
        writer.write_f64(9.0);
        let mut reader = WireReader::new(writer.freeze(), ByteOrder::Little);

        let mut gyro = Gyro::new();
        gyro.read_answer(DeviceTag::new(2), &mut reader).unwrap();
        let err = gyro
            .read_answer(DeviceTag::new(2), &mut reader)
            .unwrap_err();

        assert!(matches!(err, SyncError::Truncated { needed: 8, remaining: 0 }));
        assert_eq!(gyro.values(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_configure_replaces_table() {
        let mut writer = WireWriter::new(ByteOrder::Little);
        writer.write_tag(MessageTag::Configure);
        writer.write_i32(2);
        for v in [0.0, -0.5, 0.5, 1.0, 0.9, 1.1] {
            writer.write_f64(v);
        }
        writer.write_tag(MessageTag::Configure);
        writer.write_i32(-1);
        let mut reader = WireReader::new(writer.freeze(), ByteOrder::Little);

        let mut gyro = Gyro::new();
        gyro.read_answer(DeviceTag::new(2), &mut reader).unwrap();
        assert_eq!(gyro.lookup_table().size(), 2);
        assert_eq!(gyro.lookup_table().as_slice()[4], 0.9);

        gyro.read_answer(DeviceTag::new(2), &mut reader).unwrap();
        assert!(gyro.lookup_table().is_empty());
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_accessors_reject_inertial_unit_handle() {
        let controller = Controller::new(ByteOrder::Little);
        let imu = controller
            .attach("imu", Box::new(crate::device::InertialUnit::new()))
            .unwrap();
        let api = controller.gyro();

        assert!(matches!(
            api.enable(imu, 10),
            Err(SyncError::InvalidDevice { function: "gyro_enable", .. })
        ));
        assert!(matches!(
            api.disable(imu),
            Err(SyncError::InvalidDevice { function: "gyro_disable", .. })
        ));
        assert!(matches!(
            api.sampling_period(imu),
            Err(SyncError::InvalidDevice { function: "gyro_get_sampling_period", .. })
        ));
        assert!(matches!(
            api.values(imu),
            Err(SyncError::InvalidDevice { function: "gyro_get_values", .. })
        ));
        assert!(matches!(
            api.lookup_table_size(imu),
            Err(SyncError::InvalidDevice { function: "gyro_get_lookup_table_size", .. })
        ));
        assert!(matches!(
            api.lookup_table(imu),
            Err(SyncError::InvalidDevice { function: "gyro_get_lookup_table", .. })
        ));

        // The inertial unit was not touched.
        let unit = controller.inertial_unit();
        assert_eq!(unit.sampling_period(imu).unwrap(), 0);
    }

    #[test]
    fn test_accessors_round_trip_through_controller() {
        let controller = Controller::new(ByteOrder::Little);
        let gyro = controller.attach("gyro", Box::new(Gyro::new())).unwrap();
        let api = controller.gyro();

        api.enable(gyro, 25).unwrap();
        assert_eq!(api.sampling_period(gyro).unwrap(), 25);
        assert!(api.enable(gyro, -3).is_err());
        assert_eq!(api.sampling_period(gyro).unwrap(), 25);

        api.disable(gyro).unwrap();
        assert_eq!(api.sampling_period(gyro).unwrap(), 0);
        assert_eq!(api.lookup_table_size(gyro).unwrap(), 0);
        assert!(api.values(gyro).unwrap().iter().all(|v| v.is_nan()));
    }
}
