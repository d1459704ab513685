//! Transport error types

use thiserror::Error;

/// Errors that can occur while managing HID sessions and devices
#[derive(Error, Debug)]
pub enum TransportError {
    // Lifecycle errors
    #[error("Manager already running")]
    AlreadyRunning,

    #[error("Manager start/stop already in progress")]
    Busy,

    #[error("HID session already open")]
    SessionAlreadyOpen,

    #[error("Failed to open HID session: {0}")]
    SessionOpen(String),

    // Device errors
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open device {path}: {reason}")]
    DeviceOpen { path: String, reason: String },

    #[error("Device handle closed")]
    Closed,

    #[error("Device disconnected: {0}")]
    Disconnected(String),

    // HID-specific errors
    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Whether this error came from the OS refusing access
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, TransportError::HidPermissionDenied(_))
    }

    /// Whether the hardware behind an open connection went away
    pub fn is_disconnected(&self) -> bool {
        matches!(self, TransportError::Disconnected(_))
    }
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::HidPermissionDenied(msg)
        } else if msg.contains("No such device")
            || msg.contains("ENODEV")
            || msg.contains("Input/output error")
            || msg.contains("disconnected")
        {
            TransportError::Disconnected(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_mapping() {
        let err: TransportError = hidapi::HidError::HidApiError {
            message: "open failed: Permission denied".into(),
        }
        .into();
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_generic_hid_error_mapping() {
        let err: TransportError = hidapi::HidError::HidApiError {
            message: "unexpected report length".into(),
        }
        .into();
        assert!(matches!(err, TransportError::HidError(_)));
        assert!(!err.is_permission_denied());
    }

    #[test]
    fn test_vanished_device_mapping() {
        for message in ["read error: No such device", "hid_write: Input/output error"] {
            let err: TransportError = hidapi::HidError::HidApiError {
                message: message.into(),
            }
            .into();
            assert!(err.is_disconnected(), "{message}");
        }
    }
}
