//! HID manager - device lifecycle and event dispatch
//!
//! One manager per device family. It owns a [`HidSession`] and a
//! [`DeviceRegistry`], turns raw matched/removed notifications into registry
//! changes and forwards them to a single host discovery callback.
//!
//! ## Locking
//! - `inner` (state lock): running flag, registry and callback slot. Never
//!   held while host code runs.
//! - `dispatch` (re-entrant): held for the whole of each notification,
//!   including the host callback. `stop` takes it after closing the session,
//!   so once `stop` returns no callback is running or can start.
//! - `session`: serializes `start`/`stop`. Notifications never take it, and
//!   `start` only tries it.

use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error, info, warn};

use crate::device::{DeviceCapability, DeviceFamily, DeviceHandle};
use crate::device_registry::DeviceRegistry;
use crate::error::TransportError;
use crate::session::HidSession;
use crate::types::{DeviceDescriptor, DeviceEvent, HardwareRef, ManagerState};
use crate::{HidBackend, MatchedCallback, RemovedCallback};

/// Host callback invoked on connect/disconnect
///
/// The handle reference is transient: it is only guaranteed open for the
/// duration of a `Connected` event and until the matching `Disconnected`.
pub type DiscoveryCallback<C> = Arc<dyn Fn(DeviceEvent, &Arc<DeviceHandle<C>>) + Send + Sync>;

struct Inner<C: DeviceCapability> {
    state: ManagerState,
    registry: DeviceRegistry<C>,
    callback: Option<DiscoveryCallback<C>>,
}

/// State reachable from notification sinks
struct Shared<F: DeviceFamily, B: HidBackend> {
    family: F,
    backend: Arc<B>,
    inner: Mutex<Inner<F::Capability>>,
    dispatch: ReentrantMutex<()>,
}

/// Lifecycle controller for one device family
pub struct HidManager<F: DeviceFamily, B: HidBackend> {
    shared: Arc<Shared<F, B>>,
    session: Mutex<HidSession<B>>,
}

impl<F: DeviceFamily, B: HidBackend> HidManager<F, B> {
    /// Create a stopped manager; no OS resource is acquired until `start`
    pub fn new(family: F, backend: Arc<B>) -> Self {
        let session = HidSession::new(Arc::clone(&backend), family.name());
        Self {
            shared: Arc::new(Shared {
                family,
                backend,
                inner: Mutex::new(Inner {
                    state: ManagerState::Stopped,
                    registry: DeviceRegistry::new(),
                    callback: None,
                }),
                dispatch: ReentrantMutex::new(()),
            }),
            session: Mutex::new(session),
        }
    }

    pub fn family(&self) -> &F {
        &self.shared.family
    }

    pub fn state(&self) -> ManagerState {
        self.shared.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ManagerState::Running
    }

    /// Snapshot of connected devices in connection order
    pub fn devices(&self) -> Vec<Arc<DeviceHandle<F::Capability>>> {
        self.shared.inner.lock().registry.iter().cloned().collect()
    }

    pub fn device(&self, hardware_ref: &HardwareRef) -> Option<Arc<DeviceHandle<F::Capability>>> {
        self.shared.inner.lock().registry.get(hardware_ref).cloned()
    }

    pub fn device_count(&self) -> usize {
        self.shared.inner.lock().registry.len()
    }

    pub fn has_discovery_callback(&self) -> bool {
        self.shared.inner.lock().callback.is_some()
    }

    /// Register the discovery callback, replacing (and releasing) any previous one
    pub fn register_discovery_callback<Cb>(&self, callback: Cb)
    where
        Cb: Fn(DeviceEvent, &Arc<DeviceHandle<F::Capability>>) + Send + Sync + 'static,
    {
        self.set_discovery_callback(Arc::new(callback));
    }

    /// Install an already shared discovery callback
    pub fn set_discovery_callback(&self, callback: DiscoveryCallback<F::Capability>) {
        let previous = self.shared.inner.lock().callback.replace(callback);
        if previous.is_some() {
            debug!("{}: discovery callback replaced", self.shared.family.name());
        }
        // Released outside the state lock
        drop(previous);
    }

    /// Release the discovery callback; returns whether one was registered
    pub fn clear_discovery_callback(&self) -> bool {
        let previous = self.shared.inner.lock().callback.take();
        previous.is_some()
    }

    /// Open the HID session and start receiving notifications
    ///
    /// Fails with `AlreadyRunning` if the manager is running; the running
    /// session is left untouched. On any other failure the manager stays
    /// stopped.
    ///
    /// Fails with `Busy` instead of waiting while another `start` or `stop`
    /// is in progress. A discovery callback may run on the notification
    /// thread that a concurrent `stop` is joining.
    pub fn start(&self) -> Result<(), TransportError> {
        let name = self.shared.family.name();
        let Some(mut session) = self.session.try_lock() else {
            warn!("{}: start requested while start/stop in progress", name);
            return Err(TransportError::Busy);
        };

        {
            let mut inner = self.shared.inner.lock();
            if inner.state == ManagerState::Running {
                warn!("{}: start requested while already running", name);
                return Err(TransportError::AlreadyRunning);
            }
            // Backends report devices already present while scheduling
            inner.state = ManagerState::Running;
        }

        let criteria = self.shared.family.match_criteria();
        let (matched, removed) = self.notification_sinks();

        match session.open(&criteria, matched, removed) {
            Ok(()) => {
                info!(
                    "{}: HID manager started ({} match criteria)",
                    name,
                    criteria.len()
                );
                Ok(())
            }
            Err(e) => {
                error!("{}: failed to start HID manager: {}", name, e);
                let drained = {
                    let _dispatch = self.shared.dispatch.lock();
                    let mut inner = self.shared.inner.lock();
                    inner.state = ManagerState::Stopped;
                    inner.registry.drain_all()
                };
                for handle in drained {
                    handle.close();
                }
                Err(e)
            }
        }
    }

    /// Close the session and release every device
    ///
    /// A no-op on a stopped manager. No `Disconnected` events fire for the
    /// devices released here. The discovery callback is released too.
    pub fn stop(&self) -> Result<(), TransportError> {
        let name = self.shared.family.name();

        {
            let mut inner = self.shared.inner.lock();
            if inner.state == ManagerState::Stopped {
                return Ok(());
            }
            // Gate first: anything delivered from here on is dropped
            inner.state = ManagerState::Stopped;
        }

        let close_result = self.session.lock().close();
        if let Err(ref e) = close_result {
            error!("{}: closing HID session failed: {}", name, e);
        }

        let (drained, callback) = {
            let _dispatch = self.shared.dispatch.lock();
            let mut inner = self.shared.inner.lock();
            (inner.registry.drain_all(), inner.callback.take())
        };

        let count = drained.len();
        for handle in drained {
            handle.close();
        }
        drop(callback);

        info!("{}: HID manager stopped, released {} devices", name, count);
        close_result
    }

    /// Guaranteed teardown: stop if running and release the callback
    ///
    /// Safe to call any number of times; also run on drop.
    pub fn do_gc(&self) {
        if let Err(e) = self.stop() {
            warn!("{}: teardown error: {}", self.shared.family.name(), e);
        }
        self.clear_discovery_callback();
    }

    /// Sinks handed to the session; they hold the manager state weakly
    fn notification_sinks(&self) -> (MatchedCallback, RemovedCallback) {
        let weak = Arc::downgrade(&self.shared);
        let matched: MatchedCallback = {
            let weak = weak.clone();
            Arc::new(move |descriptor: DeviceDescriptor| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_device_matched(descriptor);
                }
            })
        };
        let removed: RemovedCallback = Arc::new(move |hardware_ref: HardwareRef| {
            if let Some(shared) = weak.upgrade() {
                shared.on_device_removed(hardware_ref);
            }
        });
        (matched, removed)
    }
}

impl<F: DeviceFamily, B: HidBackend> Drop for HidManager<F, B> {
    fn drop(&mut self) {
        self.do_gc();
    }
}

impl<F: DeviceFamily, B: HidBackend> Shared<F, B> {
    fn is_running(&self) -> bool {
        self.inner.lock().state == ManagerState::Running
    }

    fn open_handle(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> Result<DeviceHandle<F::Capability>, TransportError> {
        let io = self.backend.open_device(descriptor)?;
        let capability = self.family.attach(descriptor, io)?;
        Ok(DeviceHandle::new(descriptor.clone(), capability))
    }

    fn on_device_matched(&self, descriptor: DeviceDescriptor) {
        let name = self.family.name();
        let _dispatch = self.dispatch.lock();

        if !self.is_running() {
            debug!("{}: dropping match for {} after stop", name, descriptor.hardware_ref);
            return;
        }

        // One-shot: a failed open is not retried until the device is re-plugged
        let handle = match self.open_handle(&descriptor) {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                warn!(
                    "{}: skipping {} ({}): {}",
                    name,
                    descriptor.display_name(),
                    descriptor.hardware_ref,
                    e
                );
                return;
            }
        };

        let (stale, callback) = {
            let mut inner = self.inner.lock();
            if inner.state != ManagerState::Running {
                drop(inner);
                handle.close();
                return;
            }
            let stale = inner.registry.insert(Arc::clone(&handle));
            (stale, inner.callback.clone())
        };

        if let Some(stale) = stale {
            warn!(
                "{}: duplicate match for {}, replacing stale handle",
                name, descriptor.hardware_ref
            );
            stale.close();
        }

        info!(
            "{}: device connected: {} ({})",
            name,
            descriptor.display_name(),
            descriptor.hardware_ref
        );

        if let Some(callback) = callback {
            callback(DeviceEvent::Connected, &handle);
        }
    }

    fn on_device_removed(&self, hardware_ref: HardwareRef) {
        let name = self.family.name();
        let _dispatch = self.dispatch.lock();

        let (handle, callback) = {
            let mut inner = self.inner.lock();
            if inner.state != ManagerState::Running {
                debug!("{}: dropping removal for {} after stop", name, hardware_ref);
                return;
            }
            let Some(handle) = inner.registry.remove(&hardware_ref) else {
                debug!("{}: removal for unknown device {}", name, hardware_ref);
                return;
            };
            (handle, inner.callback.clone())
        };

        info!(
            "{}: device disconnected: {} ({})",
            name,
            handle.descriptor().display_name(),
            hardware_ref
        );

        if let Some(callback) = callback {
            callback(DeviceEvent::Disconnected, &handle);
        }
        handle.close();
    }
}
