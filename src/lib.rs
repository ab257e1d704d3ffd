//! # Device Sync
//!
//! Client-side state for simulated devices whose truth lives in a remote simulation
//! engine. Client threads read and configure devices through handle-based accessors
//! while a step loop exchanges one framed round of bytes with the engine at a time.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-backed configuration (TOML file plus `DEVICE_SYNC_` environment)
//! - **`controller`**: The [`Controller`](controller::Controller), owner of the step lock,
//!   and the atomic synchronization [`Round`](controller::Round)
//! - **`device`**: The [`SyncDevice`](device::SyncDevice) trait, the device registry and the
//!   concrete kinds (inertial unit, gyro)
//! - **`engine`**: The [`Engine`](engine::Engine) seam, a tokio step loop and a mock engine
//! - **`error`**: The crate-wide [`SyncError`](error::SyncError)
//! - **`logging`**: Tracing subscriber setup
//! - **`protocol`**: Message tags and the byte codec
//!
//! ## Example
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
//! controller.inertial_unit().enable(imu, 16)?;
//! controller.step(&mut engine)?;
//! assert_eq!(engine.sampling_period(imu), Some(16));
//! # Ok::<(), device_sync::error::SyncError>(())
//! ```

pub mod config;
pub mod controller;
pub mod device;
pub mod engine;
pub mod error;
pub mod logging;
pub mod protocol;

pub use controller::Controller;
pub use error::{AppResult, SyncError};
