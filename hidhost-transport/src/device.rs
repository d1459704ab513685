//! Device handles and the per-family capability seam
//!
//! A [`DeviceHandle`] wraps one opened hardware connection. What the host can
//! do with it is decided by the family's [`DeviceCapability`]; the lifecycle
//! layer only ever opens, registers and closes handles.

use std::sync::atomic::{AtomicBool, Ordering};

use hidapi::HidDevice;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransportError;
use crate::types::{DeviceDescriptor, HardwareRef, MatchCriterion};

/// Raw report I/O on one opened HID device
pub trait HidIo: Send + Sync {
    /// Write an output report (first byte is the report ID)
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read an input report, waiting at most `timeout_ms` (-1 blocks)
    ///
    /// Returns 0 on timeout.
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;

    /// Send a feature report (first byte is the report ID)
    fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Read a feature report; `buf[0]` selects the report ID
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// [`HidIo`] over a hidapi device
///
/// The hardware connection is released when this value is dropped.
pub struct HidApiDevice {
    device: Mutex<HidDevice>,
    on_disconnect: Option<Box<dyn Fn() + Send + Sync>>,
}

impl HidApiDevice {
    pub fn new(device: HidDevice) -> Self {
        Self {
            device: Mutex::new(device),
            on_disconnect: None,
        }
    }

    /// Hook run whenever an operation fails because the hardware is gone
    pub fn on_disconnect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Box::new(hook));
        self
    }

    fn check<T>(&self, result: hidapi::HidResult<T>) -> Result<T, TransportError> {
        result.map_err(|e| {
            let err = TransportError::from(e);
            if err.is_disconnected() {
                if let Some(hook) = &self.on_disconnect {
                    hook();
                }
            }
            err
        })
    }
}

impl HidIo for HidApiDevice {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let result = self.device.lock().write(data);
        self.check(result)
    }

    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        let result = self.device.lock().read_timeout(buf, timeout_ms);
        self.check(result)
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError> {
        let result = self.device.lock().send_feature_report(data);
        self.check(result)
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let result = self.device.lock().get_feature_report(buf);
        self.check(result)
    }
}

/// Device-class specific payload carried by a [`DeviceHandle`]
pub trait DeviceCapability: Send + Sync + 'static {
    /// Release the hardware connection
    ///
    /// Called exactly once, when the owning handle is finalized.
    fn close(&self);
}

/// One device family (gamepads, editing consoles, ...)
///
/// The lifecycle manager is generic over this trait and never inspects the
/// concrete capability type.
pub trait DeviceFamily: Send + Sync + 'static {
    type Capability: DeviceCapability;

    /// Short name used in logs and thread names
    fn name(&self) -> &'static str;

    /// Devices this family wants to hear about
    fn match_criteria(&self) -> Vec<MatchCriterion>;

    /// Build the capability for a freshly opened device
    ///
    /// An error here means the device is skipped (not registered, no event).
    fn attach(
        &self,
        descriptor: &DeviceDescriptor,
        io: Box<dyn HidIo>,
    ) -> Result<Self::Capability, TransportError>;
}

/// One opened, registered hardware connection
pub struct DeviceHandle<C: DeviceCapability> {
    descriptor: DeviceDescriptor,
    open: AtomicBool,
    capability: C,
}

impl<C: DeviceCapability> DeviceHandle<C> {
    pub fn new(descriptor: DeviceDescriptor, capability: C) -> Self {
        Self {
            descriptor,
            open: AtomicBool::new(true),
            capability,
        }
    }

    pub fn hardware_ref(&self) -> &HardwareRef {
        &self.descriptor.hardware_ref
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Capability object, or `Closed` once the handle has been finalized
    pub fn capability(&self) -> Result<&C, TransportError> {
        if self.is_open() {
            Ok(&self.capability)
        } else {
            Err(TransportError::Closed)
        }
    }

    /// Finalize the handle, releasing the hardware
    ///
    /// Returns `true` if this call closed it, `false` if it was already closed.
    pub fn close(&self) -> bool {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!("Closing device {}", self.descriptor.hardware_ref);
            self.capability.close();
            true
        } else {
            false
        }
    }
}

impl<C: DeviceCapability> Drop for DeviceHandle<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: DeviceCapability> std::fmt::Debug for DeviceHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("hardware_ref", &self.descriptor.hardware_ref)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingCapability {
        closes: Arc<AtomicUsize>,
    }

    impl DeviceCapability for CountingCapability {
        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn handle(closes: &Arc<AtomicUsize>) -> DeviceHandle<CountingCapability> {
        DeviceHandle::new(
            DeviceDescriptor::new("dev-a", 1, 2),
            CountingCapability {
                closes: Arc::clone(closes),
            },
        )
    }

    #[test]
    fn test_close_is_idempotent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let h = handle(&closes);
        assert!(h.is_open());
        assert!(h.close());
        assert!(!h.close());
        assert!(!h.is_open());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_closes_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let h = handle(&closes);
            h.close();
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        drop(handle(&closes));
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_capability_refused_after_close() {
        let closes = Arc::new(AtomicUsize::new(0));
        let h = handle(&closes);
        assert!(h.capability().is_ok());
        h.close();
        assert!(matches!(h.capability(), Err(TransportError::Closed)));
    }
}
