//! Common types for the HID lifecycle layer

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque OS-assigned identity of one connected device
///
/// Stable for the duration of a single connection only. With the hidapi
/// backend this is the platform device path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareRef(String);

impl HardwareRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HardwareRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Filter selecting which physical devices a manager cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchCriterion {
    /// Exact USB vendor/product pair
    Product { vendor_id: u16, product_id: u16 },
    /// HID top-level collection usage
    Usage { usage_page: u16, usage: u16 },
}

impl MatchCriterion {
    pub const fn product(vendor_id: u16, product_id: u16) -> Self {
        Self::Product {
            vendor_id,
            product_id,
        }
    }

    pub const fn usage(usage_page: u16, usage: u16) -> Self {
        Self::Usage { usage_page, usage }
    }

    /// Check if a device descriptor satisfies this criterion
    pub fn matches(&self, desc: &DeviceDescriptor) -> bool {
        match *self {
            Self::Product {
                vendor_id,
                product_id,
            } => desc.vendor_id == vendor_id && desc.product_id == product_id,
            Self::Usage { usage_page, usage } => {
                desc.usage_page == usage_page && desc.usage == usage
            }
        }
    }
}

impl fmt::Display for MatchCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product {
                vendor_id,
                product_id,
            } => write!(f, "VID:0x{vendor_id:04X} PID:0x{product_id:04X}"),
            Self::Usage { usage_page, usage } => {
                write!(f, "usage page 0x{usage_page:04X} usage 0x{usage:04X}")
            }
        }
    }
}

/// Check a descriptor against a set of criteria (any match wins)
pub fn matches_any(criteria: &[MatchCriterion], desc: &DeviceDescriptor) -> bool {
    criteria.iter().any(|c| c.matches(desc))
}

/// Device metadata delivered with a matched notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Hardware identity (registry key)
    pub hardware_ref: HardwareRef,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// HID usage page of the top-level collection
    pub usage_page: u16,
    /// HID usage of the top-level collection
    pub usage: u16,
    /// USB interface number (-1 if unknown)
    pub interface_number: i32,
    /// Product name if available
    pub product_name: Option<String>,
    /// Manufacturer name if available
    pub manufacturer: Option<String>,
    /// Serial number if available
    pub serial: Option<String>,
}

impl DeviceDescriptor {
    /// Minimal descriptor for a vendor/product pair
    pub fn new(hardware_ref: impl Into<HardwareRef>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            hardware_ref: hardware_ref.into(),
            vendor_id,
            product_id,
            usage_page: 0,
            usage: 0,
            interface_number: -1,
            product_name: None,
            manufacturer: None,
            serial: None,
        }
    }

    /// Set the top-level collection usage
    pub fn with_usage(mut self, usage_page: u16, usage: u16) -> Self {
        self.usage_page = usage_page;
        self.usage = usage;
        self
    }

    /// Set the product name
    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    /// Display name for logs: product string, or VID:PID
    pub fn display_name(&self) -> String {
        match &self.product_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!("{:04x}:{:04x}", self.vendor_id, self.product_id),
        }
    }
}

impl From<&hidapi::DeviceInfo> for DeviceDescriptor {
    fn from(info: &hidapi::DeviceInfo) -> Self {
        Self {
            hardware_ref: HardwareRef::new(info.path().to_string_lossy()),
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            usage_page: info.usage_page(),
            usage: info.usage(),
            interface_number: info.interface_number(),
            product_name: info.product_string().map(|s| s.to_string()),
            manufacturer: info.manufacturer_string().map(|s| s.to_string()),
            serial: info.serial_number().map(|s| s.to_string()),
        }
    }
}

/// Event kind passed to the discovery callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEvent {
    /// A matching device was connected and opened
    Connected,
    /// A registered device was removed
    Disconnected,
}

impl DeviceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceEvent::Connected => "connected",
            DeviceEvent::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manager lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerState {
    #[default]
    Stopped,
    Running,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_criterion() {
        let c = MatchCriterion::product(0x1EDB, 0xDA0E);
        assert!(c.matches(&DeviceDescriptor::new("a", 0x1EDB, 0xDA0E)));
        assert!(!c.matches(&DeviceDescriptor::new("a", 0x1EDB, 0xDA0F)));
    }

    #[test]
    fn test_usage_criterion_ignores_ids() {
        let c = MatchCriterion::usage(0x01, 0x05);
        let pad = DeviceDescriptor::new("a", 0x045E, 0x028E).with_usage(0x01, 0x05);
        let mouse = DeviceDescriptor::new("b", 0x045E, 0x0040).with_usage(0x01, 0x02);
        assert!(c.matches(&pad));
        assert!(!c.matches(&mouse));
    }

    #[test]
    fn test_matches_any() {
        let criteria = [
            MatchCriterion::usage(0x01, 0x04),
            MatchCriterion::usage(0x01, 0x05),
        ];
        let stick = DeviceDescriptor::new("a", 1, 2).with_usage(0x01, 0x04);
        assert!(matches_any(&criteria, &stick));
        assert!(!matches_any(&[], &stick));
    }

    #[test]
    fn test_criterion_serde_shape() {
        let json = serde_json::to_string(&MatchCriterion::product(0x1EDB, 0xDA0E)).unwrap();
        assert!(json.contains("\"type\":\"product\""));
        assert!(json.contains("\"vendor_id\":7899"));
    }

    #[test]
    fn test_display_name_fallback() {
        let desc = DeviceDescriptor::new("a", 0x1EDB, 0xDA0E);
        assert_eq!(desc.display_name(), "1edb:da0e");
        let named = desc.with_product_name(" DaVinci Resolve Speed Editor ");
        assert_eq!(named.display_name(), "DaVinci Resolve Speed Editor");
    }
}
