//! hidhost - HID device lifecycle for a scripting host
//!
//! Two device families sit on top of the `hidhost-transport` lifecycle layer:
//! - [`gamepad`] - joysticks, game pads and multi-axis controllers
//! - [`speededitor`] - the Blackmagic DaVinci Resolve Speed Editor
//!
//! [`host::HostManager`] is what a scripting host binds to.

pub mod config;
pub mod gamepad;
pub mod host;
pub mod speededitor;

mod io_slot;

pub use config::{FamilyConfig, HostConfig};
pub use gamepad::{GamepadDevice, GamepadFamily};
pub use host::{HostEvent, HostManager};
pub use speededitor::{SpeedEditorDevice, SpeedEditorFamily};

// Re-export the lifecycle layer for hosts that only depend on this crate
pub use hidhost_transport as transport;
