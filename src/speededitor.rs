//! Blackmagic Speed Editor family
//!
//! The editor talks through input, output and feature reports on a single
//! interface. The authentication handshake and key/jog/LED protocol sit above
//! this layer; the capability only hands out raw report access.

use hidhost_transport::{
    DeviceCapability, DeviceDescriptor, DeviceFamily, HidIo, MatchCriterion, TransportError,
};
use tracing::debug;

use crate::io_slot::IoSlot;

/// Blackmagic Design
pub const BLACKMAGIC_VID: u16 = 0x1EDB;
/// DaVinci Resolve Speed Editor
pub const SPEED_EDITOR_PID: u16 = 0xDA0E;

pub const SPEED_EDITOR_CRITERIA: [MatchCriterion; 1] =
    [MatchCriterion::product(BLACKMAGIC_VID, SPEED_EDITOR_PID)];

#[derive(Debug, Clone, Default)]
pub struct SpeedEditorFamily {
    extra_criteria: Vec<MatchCriterion>,
}

impl SpeedEditorFamily {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also match other product IDs speaking the same protocol
    pub fn with_extra_criteria(mut self, criteria: impl IntoIterator<Item = MatchCriterion>) -> Self {
        self.extra_criteria.extend(criteria);
        self
    }
}

impl DeviceFamily for SpeedEditorFamily {
    type Capability = SpeedEditorDevice;

    fn name(&self) -> &'static str {
        "speededitor"
    }

    fn match_criteria(&self) -> Vec<MatchCriterion> {
        let mut criteria = SPEED_EDITOR_CRITERIA.to_vec();
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
    ) -> Result<SpeedEditorDevice, TransportError> {
        Ok(SpeedEditorDevice {
            serial: descriptor.serial.clone().filter(|s| !s.is_empty()),
            io: IoSlot::new(io),
        })
    }
}

/// Raw report access to one connected Speed Editor
pub struct SpeedEditorDevice {
    serial: Option<String>,
    io: IoSlot,
}

impl SpeedEditorDevice {
    /// USB serial number, distinguishes several editors on one host
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Read one input report (key, jog); `Ok(0)` on timeout
    pub fn read_report(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        self.io.with(|io| io.read_timeout(buf, timeout_ms))
    }

    /// Write one output report (LEDs); `data[0]` is the report ID
    pub fn write_report(&self, data: &[u8]) -> Result<usize, TransportError> {
        self.io.with(|io| io.write(data))
    }

    pub fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError> {
        self.io.with(|io| io.send_feature_report(data))
    }

    /// `buf[0]` selects the report ID
    pub fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.io.with(|io| io.get_feature_report(buf))
    }

    pub fn is_open(&self) -> bool {
        self.io.is_open()
    }
}

impl DeviceCapability for SpeedEditorDevice {
    fn close(&self) {
        if self.io.release() {
            debug!(
                "Released Speed Editor {}",
                self.serial.as_deref().unwrap_or("(no serial)")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_slot::tests::LoopbackIo;
    use hidhost_transport::matches_any;

    fn editor(serial: &str) -> DeviceDescriptor {
        let mut desc = DeviceDescriptor::new("/dev/hidraw7", BLACKMAGIC_VID, SPEED_EDITOR_PID)
            .with_product_name("DaVinci Resolve Speed Editor");
        desc.serial = Some(serial.to_string());
        desc
    }

    #[test]
    fn test_criteria_match_only_the_editor() {
        let criteria = SpeedEditorFamily::new().match_criteria();
        assert!(matches_any(&criteria, &editor("X")));
        assert!(!matches_any(
            &criteria,
            &DeviceDescriptor::new("/dev/hidraw8", BLACKMAGIC_VID, 0xDA0B)
        ));
    }

    #[test]
    fn test_serial_is_optional() {
        let family = SpeedEditorFamily::new();
        let with = family
            .attach(&editor("8A1F3C"), Box::new(LoopbackIo::default()))
            .unwrap();
        assert_eq!(with.serial(), Some("8A1F3C"));

        let without = family
            .attach(&editor(""), Box::new(LoopbackIo::default()))
            .unwrap();
        assert_eq!(without.serial(), None);
    }

    #[test]
    fn test_feature_reports_until_closed() {
        let device = SpeedEditorFamily::new()
            .attach(&editor("8A1F3C"), Box::new(LoopbackIo::default()))
            .unwrap();

        device.send_feature_report(&[0x06, 0x00]).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(device.get_feature_report(&mut buf).unwrap(), 2);
        assert_eq!(buf[0], 0x06);

        device.close();
        device.close();
        assert!(matches!(
            device.send_feature_report(&[0x06]),
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            device.get_feature_report(&mut buf),
            Err(TransportError::Closed)
        ));
    }
}
