//! Device Registry
//!
//! Owns every attached device and resolves opaque [`DeviceTag`] handles back to
//! device state. A handle resolves only when it is attached *and* its device has the
//! kind the caller expects, so an orientation accessor can never touch a gyro.
//!
//! Handles start at 1, are never reused after a detach, and double as device
//! addresses in the framed round streams. Iteration is in handle order, which keeps
//! the outbound round byte-for-byte deterministic.
//!
//! # Example Usage
//!
//! ```rust
//! use device_sync::device::{DeviceRegistry, InertialUnit, NodeKind};
//!
//! let mut registry = DeviceRegistry::new();
//! let tag = registry.attach("imu", Box::new(InertialUnit::new()))?;
//!
//! assert!(registry.resolve::<InertialUnit>(tag, NodeKind::InertialUnit).is_some());
//! assert!(registry.resolve::<InertialUnit>(tag, NodeKind::Gyro).is_none());
//! # Ok::<(), device_sync::error::SyncError>(())
//! ```

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{DeviceDefinition, SyncConfig};
use crate::device::{DeviceTag, Gyro, InertialUnit, NodeKind, SyncDevice};
use crate::error::{AppResult, SyncError};

/// Information about an attached device (returned by list operations)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Handle
    pub tag: DeviceTag,
    /// Unique name
    pub name: String,
    /// Device kind
    pub kind: NodeKind,
}

struct RegisteredDevice {
    name: String,
    device: Box<dyn SyncDevice>,
}

/// Central registry for attached devices.
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceTag, RegisteredDevice>,
    next_tag: u16,
}

impl DeviceRegistry {
    /// Create a new empty device registry
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
            next_tag: 1,
        }
    }

    /// Create a registry holding every enabled device from `config`.
    ///
    /// Devices with a configured sampling period start with that period requested,
    /// so the first round already asks the engine to sample them.
    pub fn from_config(config: &SyncConfig) -> AppResult<Self> {
        let mut registry = Self::new();
        for definition in config.enabled_devices() {
            registry.attach_definition(definition)?;
        }
        Ok(registry)
    }

    /// Attach a device under a unique name.
    ///
    /// # Errors
    /// Returns error if:
    /// - the name is already attached
    /// - every handle value has been handed out
    pub fn attach(&mut self, name: &str, device: Box<dyn SyncDevice>) -> AppResult<DeviceTag> {
        if self.find(name).is_some() {
            return Err(SyncError::DuplicateDevice(name.to_string()));
        }
        let tag = DeviceTag::new(self.next_tag);
        self.next_tag = self
            .next_tag
            .checked_add(1)
            .ok_or_else(|| SyncError::Configuration("device handles exhausted".into()))?;

        debug!(%tag, name, kind = %device.kind(), "attached device");
        self.devices.insert(
            tag,
            RegisteredDevice {
                name: name.to_string(),
                device,
            },
        );
        Ok(tag)
    }

    fn attach_definition(&mut self, definition: &DeviceDefinition) -> AppResult<DeviceTag> {
        let device: Box<dyn SyncDevice> = match definition.kind {
            NodeKind::InertialUnit => {
                let mut unit = InertialUnit::new();
                if definition.sampling_period > 0 {
                    unit.enable(definition.sampling_period)?;
                }
                Box::new(unit)
            }
            NodeKind::Gyro => {
                let mut gyro = Gyro::new();
                if definition.sampling_period > 0 {
                    gyro.enable(definition.sampling_period)?;
                }
                Box::new(gyro)
            }
        };
        let tag = self.attach(&definition.name, device)?;
        info!(%tag, name = %definition.name, kind = %definition.kind, "registered configured device");
        Ok(tag)
    }

    /// Detach a device, releasing everything it owns.
    ///
    /// # Returns
    /// true if device was found and removed, false if not found
    pub fn detach(&mut self, tag: DeviceTag) -> bool {
        match self.devices.remove(&tag) {
            Some(registered) => {
                debug!(%tag, name = %registered.name, "detached device");
                true
            }
            None => false,
        }
    }

    /// Resolve a handle to typed device state.
    ///
    /// Returns `None` when the handle is unknown or names a device of another kind.
    pub fn resolve<T: SyncDevice>(&mut self, tag: DeviceTag, expected: NodeKind) -> Option<&mut T> {
        let registered = self.devices.get_mut(&tag)?;
        if registered.device.kind() != expected {
            return None;
        }
        registered.device.as_any_mut().downcast_mut::<T>()
    }

    /// Untyped access used by the round loop.
    pub fn get_mut(&mut self, tag: DeviceTag) -> Option<&mut dyn SyncDevice> {
        match self.devices.get_mut(&tag) {
            Some(registered) => Some(registered.device.as_mut()),
            None => None,
        }
    }

    /// Visit every device in handle order.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(DeviceTag, &mut dyn SyncDevice)) {
        for (tag, registered) in self.devices.iter_mut() {
            f(*tag, registered.device.as_mut());
        }
    }

    /// Find a device handle by name.
    pub fn find(&self, name: &str) -> Option<DeviceTag> {
        self.devices
            .iter()
            .find(|(_, registered)| registered.name == name)
            .map(|(tag, _)| *tag)
    }

    /// List all attached devices in handle order
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices
            .iter()
            .map(|(tag, registered)| DeviceInfo {
                tag: *tag,
                name: registered.name.clone(),
                kind: registered.device.kind(),
            })
            .collect()
    }

    /// Get count of attached devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
