//! HID device lifecycle layer for hidhost
//!
//! This crate discovers HID peripherals, keeps an authoritative registry of
//! the ones currently connected and dispatches connect/disconnect events to a
//! single host callback:
//!
//! - [`HidBackend`] - the OS HID layer (hidapi polling backend included)
//! - [`HidSession`] - open/close of one backend manager object
//! - [`DeviceRegistry`] - insertion-ordered live device set
//! - [`HidManager`] - lifecycle and event translation, generic over a
//!   [`DeviceFamily`]

pub mod device;
pub mod device_registry;
pub mod error;
pub mod manager;
pub mod session;
pub mod types;

mod hid_backend;

pub use device::{DeviceCapability, DeviceFamily, DeviceHandle, HidApiDevice, HidIo};
pub use device_registry::DeviceRegistry;
pub use error::TransportError;
pub use hid_backend::{HidApiBackend, HidApiSession, DEFAULT_POLL_INTERVAL};
pub use manager::{DiscoveryCallback, HidManager};
pub use session::HidSession;
pub use types::{
    matches_any, DeviceDescriptor, DeviceEvent, HardwareRef, ManagerState, MatchCriterion,
};

use std::sync::Arc;

/// Sink for device-matched notifications
pub type MatchedCallback = Arc<dyn Fn(DeviceDescriptor) + Send + Sync>;

/// Sink for device-removed notifications
pub type RemovedCallback = Arc<dyn Fn(HardwareRef) + Send + Sync>;

/// The OS HID layer - all backends implement this
///
/// The calls mirror the lifecycle of a platform HID manager object: create it
/// with match criteria, register the two notification sinks, schedule it on a
/// background delivery context, and tear it down in reverse order.
pub trait HidBackend: Send + Sync + 'static {
    /// Backend-specific manager object
    type Session: Send + 'static;

    /// Create a manager object with the given match criteria installed
    ///
    /// # Arguments
    /// * `label` - Owner name, used for logs and thread names
    /// * `criteria` - Devices to deliver notifications for
    fn create_session(
        &self,
        label: &'static str,
        criteria: &[MatchCriterion],
    ) -> Result<Self::Session, TransportError>;

    /// Register the sink invoked when a matching device appears
    fn register_matched(
        &self,
        session: &mut Self::Session,
        callback: MatchedCallback,
    ) -> Result<(), TransportError>;

    /// Register the sink invoked when a matching device goes away
    fn register_removed(
        &self,
        session: &mut Self::Session,
        callback: RemovedCallback,
    ) -> Result<(), TransportError>;

    /// Start delivering notifications on a background context
    ///
    /// Devices already present are reported as matched.
    fn schedule(&self, session: &mut Self::Session) -> Result<(), TransportError>;

    /// Stop delivering notifications
    ///
    /// Must not return while a sink is executing on another thread, and no sink
    /// may run afterwards.
    fn unschedule(&self, session: &mut Self::Session);

    /// Drop both registered sinks
    fn unregister_callbacks(&self, session: &mut Self::Session);

    /// Release the manager object
    fn release_session(&self, session: Self::Session);

    /// Open a matched device for I/O
    fn open_device(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn HidIo>, TransportError>;
}
