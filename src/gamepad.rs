//! Gamepad family - joysticks, game pads and multi-axis controllers

use hidhost_transport::{
    DeviceCapability, DeviceDescriptor, DeviceFamily, HidIo, MatchCriterion, TransportError,
};
use tracing::debug;

use crate::io_slot::IoSlot;

/// HID Generic Desktop usage page
pub const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
pub const USAGE_JOYSTICK: u16 = 0x04;
pub const USAGE_GAME_PAD: u16 = 0x05;
pub const USAGE_MULTI_AXIS_CONTROLLER: u16 = 0x08;

/// Collections every gamepad manager listens for
pub const GAMEPAD_CRITERIA: [MatchCriterion; 3] = [
    MatchCriterion::usage(USAGE_PAGE_GENERIC_DESKTOP, USAGE_JOYSTICK),
    MatchCriterion::usage(USAGE_PAGE_GENERIC_DESKTOP, USAGE_GAME_PAD),
    MatchCriterion::usage(USAGE_PAGE_GENERIC_DESKTOP, USAGE_MULTI_AXIS_CONTROLLER),
];

#[derive(Debug, Clone, Default)]
pub struct GamepadFamily {
    extra_criteria: Vec<MatchCriterion>,
}

impl GamepadFamily {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also match devices that do not declare a gamepad collection
    pub fn with_extra_criteria(mut self, criteria: impl IntoIterator<Item = MatchCriterion>) -> Self {
        self.extra_criteria.extend(criteria);
        self
    }
}

impl DeviceFamily for GamepadFamily {
    type Capability = GamepadDevice;

    fn name(&self) -> &'static str {
        "gamepad"
    }

    fn match_criteria(&self) -> Vec<MatchCriterion> {
        let mut criteria = GAMEPAD_CRITERIA.to_vec();
        for extra in &self.extra_criteria {
            if !criteria.contains(extra) {
                criteria.push(*extra);
            }
        }
        criteria
    }

    fn attach(
        &self,
        descriptor: &DeviceDescriptor,
        io: Box<dyn HidIo>,
    ) -> Result<GamepadDevice, TransportError> {
        Ok(GamepadDevice {
            product_name: descriptor.display_name(),
            io: IoSlot::new(io),
        })
    }
}

/// Raw report access to one connected gamepad
///
/// Report decoding (buttons, axes) is left to the host.
pub struct GamepadDevice {
    product_name: String,
    io: IoSlot,
}

impl GamepadDevice {
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    /// Read one input report; `Ok(0)` on timeout
    pub fn read_report(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        self.io.with(|io| io.read_timeout(buf, timeout_ms))
    }

    /// Write one output report (rumble, LEDs); `data[0]` is the report ID
    pub fn write_report(&self, data: &[u8]) -> Result<usize, TransportError> {
        self.io.with(|io| io.write(data))
    }

    pub fn is_open(&self) -> bool {
        self.io.is_open()
    }
}

impl DeviceCapability for GamepadDevice {
    fn close(&self) {
        if self.io.release() {
            debug!("Released gamepad {}", self.product_name);
        }
    }
}
