//! Device registry - the live set of connected devices
//!
//! Insertion-ordered and keyed by hardware reference. At most one handle per
//! hardware reference is held at any time; a second insert for the same
//! reference evicts the stale entry (last-seen wins).

use std::sync::Arc;

use crate::device::{DeviceCapability, DeviceHandle};
use crate::types::HardwareRef;

/// Registry of live device handles
pub struct DeviceRegistry<C: DeviceCapability> {
    devices: Vec<Arc<DeviceHandle<C>>>,
}

impl<C: DeviceCapability> DeviceRegistry<C> {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    fn position(&self, hardware_ref: &HardwareRef) -> Option<usize> {
        self.devices
            .iter()
            .position(|d| d.hardware_ref() == hardware_ref)
    }

    /// Insert a handle, returning the stale entry it displaced (if any)
    ///
    /// The caller owns finalizing the returned handle.
    pub fn insert(&mut self, handle: Arc<DeviceHandle<C>>) -> Option<Arc<DeviceHandle<C>>> {
        let stale = self
            .position(handle.hardware_ref())
            .map(|idx| self.devices.remove(idx));
        self.devices.push(handle);
        stale
    }

    /// Remove and return the handle for `hardware_ref`
    pub fn remove(&mut self, hardware_ref: &HardwareRef) -> Option<Arc<DeviceHandle<C>>> {
        self.position(hardware_ref).map(|idx| self.devices.remove(idx))
    }

    /// Remove every handle, in insertion order
    pub fn drain_all(&mut self) -> Vec<Arc<DeviceHandle<C>>> {
        std::mem::take(&mut self.devices)
    }

    pub fn get(&self, hardware_ref: &HardwareRef) -> Option<&Arc<DeviceHandle<C>>> {
        self.devices.iter().find(|d| d.hardware_ref() == hardware_ref)
    }

    pub fn contains(&self, hardware_ref: &HardwareRef) -> bool {
        self.position(hardware_ref).is_some()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeviceHandle<C>>> {
        self.devices.iter()
    }
}

impl<C: DeviceCapability> Default for DeviceRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceDescriptor;

    struct Nop;

    impl DeviceCapability for Nop {
        fn close(&self) {}
    }

    fn handle(id: &str) -> Arc<DeviceHandle<Nop>> {
        Arc::new(DeviceHandle::new(DeviceDescriptor::new(id, 1, 2), Nop))
    }

    fn refs(reg: &DeviceRegistry<Nop>) -> Vec<String> {
        reg.iter().map(|d| d.hardware_ref().to_string()).collect()
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut reg = DeviceRegistry::new();
        assert!(reg.insert(handle("a")).is_none());
        assert!(reg.insert(handle("b")).is_none());
        assert!(reg.insert(handle("c")).is_none());
        assert_eq!(refs(&reg), ["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_insert_evicts_stale() {
        let mut reg = DeviceRegistry::new();
        let first = handle("a");
        reg.insert(Arc::clone(&first));
        reg.insert(handle("b"));

        let second = handle("a");
        let stale = reg.insert(Arc::clone(&second)).expect("stale entry");
        assert!(Arc::ptr_eq(&stale, &first));
        assert_eq!(reg.len(), 2);
        // Newest entry goes to the back
        assert_eq!(refs(&reg), ["b", "a"]);
        assert!(Arc::ptr_eq(reg.get(&"a".into()).unwrap(), &second));
    }

    #[test]
    fn test_remove_unknown_is_none() {
        let mut reg = DeviceRegistry::new();
        reg.insert(handle("a"));
        assert!(reg.remove(&"zzz".into()).is_none());
        assert_eq!(reg.len(), 1);
        assert!(reg.remove(&"a".into()).is_some());
        assert!(reg.is_empty());
        assert!(reg.remove(&"a".into()).is_none());
    }

    #[test]
    fn test_drain_all_in_insertion_order() {
        let mut reg = DeviceRegistry::new();
        for id in ["x", "y", "z"] {
            reg.insert(handle(id));
        }
        let drained: Vec<_> = reg
            .drain_all()
            .iter()
            .map(|d| d.hardware_ref().to_string())
            .collect();
        assert_eq!(drained, ["x", "y", "z"]);
        assert!(reg.is_empty());
        assert!(!reg.contains(&"x".into()));
    }
}
