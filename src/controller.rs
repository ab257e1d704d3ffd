//! Controller: the step lock and synchronization rounds.
//!
//! The [`Controller`] owns the [`DeviceRegistry`] behind one process-wide mutex,
//! the step lock. Every accessor call and every round takes it, so a round is
//! atomic across *all* devices: no accessor can slip in between the requests a round
//! writes and the answers it decodes.
//!
//! # Round framing
//!
//! ```text
//! request:  ([handle: u16][command ...])*    one entry per device with a pending command
//! answer:   ([handle: u16][tag: u8][payload ...])*   until the buffer is exhausted
//! ```
//!
//! Any fatal error while decoding terminates the session: later rounds fail with
//! [`SyncError::SessionTerminated`], while accessors keep serving last-known values.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::device::gyro::GyroApi;
use crate::device::inertial_unit::InertialUnitApi;
use crate::device::{DeviceInfo, DeviceRegistry, DeviceTag, NodeKind, SyncDevice};
use crate::engine::Engine;
use crate::error::{AppResult, SyncError};
use crate::protocol::{ByteOrder, WireReader, WireWriter};

/// Device state shared between client threads and the step loop.
pub struct Controller {
    registry: Mutex<DeviceRegistry>,
    order: ByteOrder,
    warn_on_disabled_read: bool,
    terminated: AtomicBool,
}

impl Controller {
    /// Controller with no devices attached.
    pub fn new(order: ByteOrder) -> Self {
        Self::with_registry(DeviceRegistry::new(), order)
    }

    /// Controller around an existing registry.
    pub fn with_registry(registry: DeviceRegistry, order: ByteOrder) -> Self {
        Self {
            registry: Mutex::new(registry),
            order,
            warn_on_disabled_read: true,
            terminated: AtomicBool::new(false),
        }
    }

    /// Controller with the devices and protocol settings from `config`.
    pub fn from_config(config: &SyncConfig) -> AppResult<Self> {
        let registry = DeviceRegistry::from_config(config)?;
        info!(
            devices = registry.len(),
            byte_order = ?config.protocol.byte_order,
            "controller configured"
        );
        let mut controller = Self::with_registry(registry, config.protocol.byte_order);
        controller.warn_on_disabled_read = config.protocol.warn_on_disabled_read;
        Ok(controller)
    }

    /// Byte order used for both directions.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub(crate) fn warn_on_disabled_read(&self) -> bool {
        self.warn_on_disabled_read
    }

    /// Whether a fatal protocol error has ended the session.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Attach a device and return its handle.
    pub fn attach(&self, name: &str, device: Box<dyn SyncDevice>) -> AppResult<DeviceTag> {
        self.registry.lock().attach(name, device)
    }

    /// Detach a device, releasing its state.
    pub fn detach(&self, tag: DeviceTag) -> bool {
        self.registry.lock().detach(tag)
    }

    /// Find a device handle by name.
    pub fn find(&self, name: &str) -> Option<DeviceTag> {
        self.registry.lock().find(name)
    }

    /// List all attached devices.
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.registry.lock().list_devices()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Accessors for inertial units.
    pub fn inertial_unit(&self) -> InertialUnitApi<'_> {
        InertialUnitApi::new(self)
    }

    /// Accessors for gyros.
    pub fn gyro(&self) -> GyroApi<'_> {
        GyroApi::new(self)
    }

    /// Run `f` on the device behind `tag` under the step lock.
    ///
    /// Fails with [`SyncError::InvalidDevice`] when the handle is unknown or names a
    /// device of another kind; `f` does not run in that case.
    pub(crate) fn with_device<T: SyncDevice, R>(
        &self,
        function: &'static str,
        tag: DeviceTag,
        kind: NodeKind,
        f: impl FnOnce(&mut T) -> R,
    ) -> AppResult<R> {
        let mut registry = self.registry.lock();
        match registry.resolve::<T>(tag, kind) {
            Some(device) => Ok(f(device)),
            None => {
                error!("{}(): invalid device tag {}", function, tag);
                Err(SyncError::InvalidDevice { function, tag })
            }
        }
    }

    // =========================================================================
    // Synchronization rounds
    // =========================================================================

    /// Take the step lock for one round.
    ///
    /// Accessors block until the returned [`Round`] is dropped.
    pub fn begin_round(&self) -> AppResult<Round<'_>> {
        if self.is_terminated() {
            return Err(SyncError::SessionTerminated);
        }
        Ok(Round {
            registry: self.registry.lock(),
            controller: self,
        })
    }

    /// Run one complete round against `engine`: flush requests, exchange, decode.
    ///
    /// Any exchange failure terminates the session. Errors the engine reports as
    /// recoverable come back wrapped in [`SyncError::EngineFailure`].
    pub fn step(&self, engine: &mut dyn Engine) -> AppResult<()> {
        let mut round = self.begin_round()?;

        let mut writer = WireWriter::new(self.order);
        round.write_requests(&mut writer);

        // The request edges are already consumed; a failed exchange cannot be retried.
        let answer = match engine.exchange(writer.freeze()) {
            Ok(answer) => answer,
            Err(err) if err.is_fatal() => return Err(round.fail(err)),
            Err(err) => return Err(round.fail(SyncError::EngineFailure(err.to_string()))),
        };
        round.read_answers(WireReader::new(answer, self.order))
    }

    /// Re-arm every device after a topology change.
    ///
    /// Devices with a configured sampling period send it again on the next round.
    pub fn toggle_remote(&self) {
        let mut registry = self.registry.lock();
        registry.for_each_mut(|_, device| device.toggle_remote());
        debug!("re-armed devices for remote replay");
    }
}

/// One synchronization round holding the step lock.
pub struct Round<'c> {
    registry: MutexGuard<'c, DeviceRegistry>,
    controller: &'c Controller,
}

impl Round<'_> {
    /// Flush every pending device command into `writer`, framed by handle.
    pub fn write_requests(&mut self, writer: &mut WireWriter) {
        let mut scratch = WireWriter::new(writer.order());
        self.registry.for_each_mut(|tag, device| {
            device.write_request(&mut scratch);
            if !scratch.is_empty() {
                let command = scratch.split();
                debug!(%tag, bytes = command.len(), "flushing device request");
                writer.write_u16(tag.get());
                writer.write_bytes(&command);
            }
        });
    }

    /// Decode every framed answer in `reader`.
    ///
    /// Stops at the first error. Fatal errors terminate the session.
    pub fn read_answers(&mut self, mut reader: WireReader) -> AppResult<()> {
        while !reader.is_exhausted() {
            if let Err(err) = self.read_one(&mut reader) {
                return Err(self.fail(err));
            }
        }
        Ok(())
    }

    fn read_one(&mut self, reader: &mut WireReader) -> AppResult<()> {
        let tag = DeviceTag::new(reader.read_u16()?);
        let device = self
            .registry
            .get_mut(tag)
            .ok_or(SyncError::UnknownDevice(tag))?;
        device.read_answer(tag, reader)
    }

    /// Re-arm every device within this round.
    pub fn toggle_remote(&mut self) {
        self.registry.for_each_mut(|_, device| device.toggle_remote());
    }

    fn fail(&self, err: SyncError) -> SyncError {
        if err.is_fatal() {
            error!(error = %err, "fatal protocol error, terminating synchronization session");
            self.controller.terminated.store(true, Ordering::Release);
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Gyro, InertialUnit};
    use crate::protocol::MessageTag;

    fn controller_with_devices() -> (Controller, DeviceTag, DeviceTag) {
        let controller = Controller::new(ByteOrder::Little);
        let imu = controller
            .attach("imu", Box::new(InertialUnit::new()))
            .unwrap();
        let gyro = controller.attach("gyro", Box::new(Gyro::new())).unwrap();
        (controller, imu, gyro)
    }

    #[test]
    fn test_requests_are_framed_by_handle() {
        let (controller, imu, gyro) = controller_with_devices();
        controller.inertial_unit().enable(imu, 16).unwrap();
        controller.gyro().enable(gyro, 258).unwrap();

        let mut writer = WireWriter::new(ByteOrder::Little);
        controller
            .begin_round()
            .unwrap()
            .write_requests(&mut writer);

        assert_eq!(
            &writer.freeze()[..],
            &[1, 0, 1, 16, 0, 2, 0, 1, 2, 1]
        );
    }

    #[test]
    fn test_idle_devices_write_nothing() {
        let (controller, _, _) = controller_with_devices();
        let mut writer = WireWriter::new(ByteOrder::Little);
        controller
            .begin_round()
            .unwrap()
            .write_requests(&mut writer);
        assert!(writer.is_empty());
    }

    #[test]
    fn test_answers_are_routed_to_devices() {
        let (controller, imu, gyro) = controller_with_devices();

        let mut writer = WireWriter::new(ByteOrder::Little);
        writer.write_u16(gyro.get());
        writer.write_tag(MessageTag::GyroData);
        for v in [1.0, 2.0, 3.0] {
            writer.write_f64(v);
        }
        writer.write_u16(imu.get());
        writer.write_tag(MessageTag::InertialUnitData);
        for v in [0.5, 0.25, 0.125] {
            writer.write_f64(v);
        }

        controller
            .begin_round()
            .unwrap()
            .read_answers(WireReader::new(writer.freeze(), ByteOrder::Little))
            .unwrap();

        assert_eq!(controller.gyro().values(gyro).unwrap(), [1.0, 2.0, 3.0]);
        assert_eq!(
            controller.inertial_unit().roll_pitch_yaw(imu).unwrap(),
            [0.5, 0.25, 0.125]
        );
    }

    #[test]
    fn test_unknown_handle_terminates_session() {
        let (controller, imu, _) = controller_with_devices();

        let mut writer = WireWriter::new(ByteOrder::Little);
        writer.write_u16(77);
        writer.write_tag(MessageTag::InertialUnitData);

        let result = controller
            .begin_round()
            .unwrap()
            .read_answers(WireReader::new(writer.freeze(), ByteOrder::Little));
        assert!(matches!(result, Err(SyncError::UnknownDevice(tag)) if tag.get() == 77));
        assert!(controller.is_terminated());
        assert!(matches!(
            controller.begin_round(),
            Err(SyncError::SessionTerminated)
        ));

        // Accessors still serve last-known state.
        assert_eq!(controller.inertial_unit().sampling_period(imu).unwrap(), 0);
    }

    #[test]
    fn test_truncated_answer_is_fatal() {
        let (controller, imu, _) = controller_with_devices();

        let mut writer = WireWriter::new(ByteOrder::Little);
        writer.write_u16(imu.get());
        writer.write_tag(MessageTag::InertialUnitData);
        writer.write_f64(1.0);

        let result = controller
            .begin_round()
            .unwrap()
            .read_answers(WireReader::new(writer.freeze(), ByteOrder::Little));
        assert!(matches!(result, Err(SyncError::Truncated { .. })));
        assert!(controller.is_terminated());
    }

    #[test]
    fn test_toggle_remote_replays_configured_devices_only() {
        let (controller, imu, _) = controller_with_devices();
        controller.inertial_unit().enable(imu, 32).unwrap();

        let mut writer = WireWriter::new(ByteOrder::Little);
        controller
            .begin_round()
            .unwrap()
            .write_requests(&mut writer);
        let _ = writer.split();

        controller.toggle_remote();
        controller
            .begin_round()
            .unwrap()
            .write_requests(&mut writer);
        assert_eq!(&writer.freeze()[..], &[1, 0, 1, 32, 0]);
    }

    #[test]
    fn test_round_toggle_remote_rearms_under_the_same_lock() {
        let (controller, _, gyro) = controller_with_devices();
        controller.gyro().enable(gyro, 10).unwrap();

        let mut round = controller.begin_round().unwrap();
        let mut writer = WireWriter::new(ByteOrder::Little);
        round.write_requests(&mut writer);
        round.toggle_remote();

        let mut replay = WireWriter::new(ByteOrder::Little);
        round.write_requests(&mut replay);
        assert_eq!(&writer.freeze()[..], &replay.freeze()[..]);
    }
}
