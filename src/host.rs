//! Scripting-host facade over [`HidManager`]
//!
//! Hosts expect plain boolean results. Failures are logged by the manager
//! where they happen, so this layer only maps them.

use std::sync::Arc;

use hidhost_transport::{
    DeviceDescriptor, DeviceEvent, DeviceFamily, DeviceHandle, HidApiBackend, HidBackend,
    HidManager, ManagerState,
};
use serde::Serialize;

/// A discovery event flattened for forwarding off the notification thread
#[derive(Debug, Clone, Serialize)]
pub struct HostEvent {
    pub family: &'static str,
    pub event: DeviceEvent,
    pub device: DeviceDescriptor,
}

/// One device family as seen from the scripting host
pub struct HostManager<F: DeviceFamily, B: HidBackend = HidApiBackend> {
    manager: HidManager<F, B>,
}

impl<F: DeviceFamily, B: HidBackend> HostManager<F, B> {
    pub fn new(family: F, backend: Arc<B>) -> Self {
        Self {
            manager: HidManager::new(family, backend),
        }
    }

    pub fn name(&self) -> &'static str {
        self.manager.family().name()
    }

    /// `true` once notifications are flowing
    pub fn start(&self) -> bool {
        self.manager.start().is_ok()
    }

    /// `true` unless closing the OS session reported an error
    pub fn stop(&self) -> bool {
        self.manager.stop().is_ok()
    }

    pub fn is_running(&self) -> bool {
        self.manager.state() == ManagerState::Running
    }

    pub fn register_discovery_callback<Cb>(&self, callback: Cb)
    where
        Cb: Fn(DeviceEvent, &Arc<DeviceHandle<F::Capability>>) + Send + Sync + 'static,
    {
        self.manager.register_discovery_callback(callback);
    }

    /// Forward every discovery event through `forward`
    pub fn forward_events<Tx>(&self, forward: Tx)
    where
        Tx: Fn(HostEvent) + Send + Sync + 'static,
    {
        let family = self.name();
        self.manager.register_discovery_callback(move |event, handle| {
            forward(HostEvent {
                family,
                event,
                device: handle.descriptor().clone(),
            });
        });
    }

    pub fn clear_discovery_callback(&self) {
        self.manager.clear_discovery_callback();
    }

    /// Release everything; called by the host when its object is collected
    pub fn do_gc(&self) {
        self.manager.do_gc();
    }

    pub fn devices(&self) -> Vec<Arc<DeviceHandle<F::Capability>>> {
        self.manager.devices()
    }

    pub fn manager(&self) -> &HidManager<F, B> {
        &self.manager
    }
}
