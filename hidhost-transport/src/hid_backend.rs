//! hidapi backend
//!
//! hidapi has no native hot-plug notifications, so each scheduled session runs
//! a dedicated notification thread that refreshes the device list, diffs the
//! matching hardware references against the previous pass and delivers
//! matched/removed notifications.
//!
//! A device unplugged and replugged between two scans usually comes back under
//! the same path, so the path diff alone misses it. Open connections report
//! I/O failures that mean the hardware is gone to a shared [`LossTracker`];
//! the next scan then delivers a removal followed by a fresh match.

use std::collections::{HashMap, HashSet};
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hidapi::HidApi;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::device::{HidApiDevice, HidIo};
use crate::error::TransportError;
use crate::types::{matches_any, DeviceDescriptor, HardwareRef, MatchCriterion};
use crate::{HidBackend, MatchedCallback, RemovedCallback};

/// Default interval between device list refreshes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// HID backend built on hidapi enumeration
///
/// The hidapi context can be shared between backends (one per device family)
/// with [`HidApiBackend::with_api`]; sessions stay independent.
pub struct HidApiBackend {
    api: Arc<Mutex<HidApi>>,
    poll_interval: Duration,
    losses: LossTracker,
}

impl HidApiBackend {
    /// Create a backend with its own hidapi context
    pub fn new() -> Result<Self, TransportError> {
        let api = HidApi::new()?;
        Ok(Self::with_api(Arc::new(Mutex::new(api))))
    }

    /// Create a backend on a shared hidapi context
    pub fn with_api(api: Arc<Mutex<HidApi>>) -> Self {
        Self {
            api,
            poll_interval: DEFAULT_POLL_INTERVAL,
            losses: LossTracker::default(),
        }
    }

    /// Set the interval between device list refreshes
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// List currently connected devices matching `criteria`
    pub fn enumerate(
        &self,
        criteria: &[MatchCriterion],
    ) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let mut api = self.api.lock();
        api.refresh_devices()?;
        let devices = scan(&api, criteria);
        info!("Found {} matching devices", devices.len());
        Ok(devices)
    }
}

/// Collect matching devices, one entry per hardware reference
///
/// Some platforms list one entry per top-level collection for the same path;
/// the first matching entry wins.
fn scan(api: &HidApi, criteria: &[MatchCriterion]) -> Vec<DeviceDescriptor> {
    let mut seen = HashSet::new();
    let mut devices = Vec::new();

    for info in api.device_list() {
        let desc = DeviceDescriptor::from(info);
        if !matches_any(criteria, &desc) {
            continue;
        }
        if seen.insert(desc.hardware_ref.clone()) {
            debug!(
                "Found device: VID={:04X} PID={:04X} usage={:04X}:{:04X} path={}",
                desc.vendor_id, desc.product_id, desc.usage_page, desc.usage, desc.hardware_ref
            );
            devices.push(desc);
        }
    }

    devices
}

/// Per-path loss generations shared by connections and notification threads
#[derive(Clone, Default)]
struct LossTracker {
    generations: Arc<Mutex<HashMap<HardwareRef, u64>>>,
}

impl LossTracker {
    fn generation(&self, hardware_ref: &HardwareRef) -> u64 {
        self.generations
            .lock()
            .get(hardware_ref)
            .copied()
            .unwrap_or(0)
    }

    /// Record a loss seen by a connection opened at generation `opened_at`
    ///
    /// Only the first report per connection counts; a connection that is
    /// already stale cannot invalidate the one that replaced it.
    fn report(&self, hardware_ref: &HardwareRef, opened_at: u64) -> bool {
        let mut generations = self.generations.lock();
        let current = generations.entry(hardware_ref.clone()).or_insert(0);
        if *current == opened_at {
            *current += 1;
            true
        } else {
            false
        }
    }
}

/// Known devices whose connection reported a loss since they were matched
///
/// `seen` holds the generation each device was matched at. Devices present
/// in this scan but not yet known are recorded before delivery, so the
/// connection opened for them starts from the right generation.
fn collect_lost(
    losses: &LossTracker,
    known: &HashSet<HardwareRef>,
    present: &[DeviceDescriptor],
    seen: &mut HashMap<HardwareRef, u64>,
) -> HashSet<HardwareRef> {
    seen.retain(|r, _| known.contains(r));

    let mut lost = HashSet::new();
    for hardware_ref in known {
        let generation = losses.generation(hardware_ref);
        match seen.insert(hardware_ref.clone(), generation) {
            Some(matched_at) if matched_at != generation => {
                lost.insert(hardware_ref.clone());
            }
            _ => {}
        }
    }

    for desc in present {
        seen.entry(desc.hardware_ref.clone())
            .or_insert_with(|| losses.generation(&desc.hardware_ref));
    }
    lost
}

/// Notification thread handle
struct HotplugWorker {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HotplugWorker {
    /// Signal shutdown and wait for the thread to exit
    ///
    /// When called from the notification thread itself (a sink stopping its
    /// own manager) the thread is detached instead; it exits after the
    /// current sink returns and delivers nothing further.
    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let Some(handle) = self.thread.take() else {
            return;
        };

        if handle.thread().id() == thread::current().id() {
            debug!("Hotplug worker stopped from its own thread, detaching");
            return;
        }

        handle.thread().unpark();
        if handle.join().is_err() {
            warn!("Hotplug worker thread panicked");
        }
    }
}

impl Drop for HotplugWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Backend manager object for [`HidApiBackend`]
pub struct HidApiSession {
    label: &'static str,
    criteria: Vec<MatchCriterion>,
    matched: Option<MatchedCallback>,
    removed: Option<RemovedCallback>,
    worker: Option<HotplugWorker>,
}

impl HidApiSession {
    pub fn is_scheduled(&self) -> bool {
        self.worker.is_some()
    }
}

impl HidBackend for HidApiBackend {
    type Session = HidApiSession;

    fn create_session(
        &self,
        label: &'static str,
        criteria: &[MatchCriterion],
    ) -> Result<HidApiSession, TransportError> {
        if criteria.is_empty() {
            return Err(TransportError::SessionOpen(format!(
                "{label}: no match criteria"
            )));
        }

        Ok(HidApiSession {
            label,
            criteria: criteria.to_vec(),
            matched: None,
            removed: None,
            worker: None,
        })
    }

    fn register_matched(
        &self,
        session: &mut HidApiSession,
        callback: MatchedCallback,
    ) -> Result<(), TransportError> {
        session.matched = Some(callback);
        Ok(())
    }

    fn register_removed(
        &self,
        session: &mut HidApiSession,
        callback: RemovedCallback,
    ) -> Result<(), TransportError> {
        session.removed = Some(callback);
        Ok(())
    }

    fn schedule(&self, session: &mut HidApiSession) -> Result<(), TransportError> {
        if session.worker.is_some() {
            return Err(TransportError::Internal(format!(
                "{}: session already scheduled",
                session.label
            )));
        }

        let (Some(matched), Some(removed)) = (session.matched.clone(), session.removed.clone())
        else {
            return Err(TransportError::Internal(format!(
                "{}: notification callbacks not registered",
                session.label
            )));
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_ctx = HotplugLoop {
            label: session.label,
            api: Arc::clone(&self.api),
            criteria: session.criteria.clone(),
            matched,
            removed,
            shutdown: Arc::clone(&shutdown),
            interval: self.poll_interval,
            losses: self.losses.clone(),
        };

        let thread = thread::Builder::new()
            .name(format!("{}-hotplug", session.label))
            .spawn(move || loop_ctx.run())
            .map_err(|e| {
                TransportError::SessionOpen(format!(
                    "{}: failed to spawn hotplug thread: {}",
                    session.label, e
                ))
            })?;

        session.worker = Some(HotplugWorker {
            shutdown,
            thread: Some(thread),
        });
        Ok(())
    }

    fn unschedule(&self, session: &mut HidApiSession) {
        if let Some(mut worker) = session.worker.take() {
            worker.stop();
        }
    }

    fn unregister_callbacks(&self, session: &mut HidApiSession) {
        session.matched = None;
        session.removed = None;
    }

    fn release_session(&self, session: HidApiSession) {
        debug!("{}: releasing hidapi session", session.label);
        drop(session);
    }

    fn open_device(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn HidIo>, TransportError> {
        let path = descriptor.hardware_ref.as_str();
        let c_path = CString::new(path).map_err(|e| TransportError::DeviceOpen {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let hardware_ref = descriptor.hardware_ref.clone();
        let opened_at = self.losses.generation(&hardware_ref);

        let api = self.api.lock();
        let device = api.open_path(&c_path).map_err(|e| match TransportError::from(e) {
            TransportError::HidPermissionDenied(msg) => TransportError::HidPermissionDenied(msg),
            other => TransportError::DeviceOpen {
                path: path.to_string(),
                reason: other.to_string(),
            },
        })?;

        let losses = self.losses.clone();
        let device = HidApiDevice::new(device).on_disconnect(move || {
            if losses.report(&hardware_ref, opened_at) {
                warn!("Connection to {} lost, rescanning", hardware_ref);
            }
        });
        Ok(Box::new(device))
    }
}

/// State owned by one notification thread
struct HotplugLoop {
    label: &'static str,
    api: Arc<Mutex<HidApi>>,
    criteria: Vec<MatchCriterion>,
    matched: MatchedCallback,
    removed: RemovedCallback,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
    losses: LossTracker,
}

impl HotplugLoop {
    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn run(self) {
        debug!("{} hotplug thread started", self.label);
        let mut known: HashSet<HardwareRef> = HashSet::new();
        let mut seen: HashMap<HardwareRef, u64> = HashMap::new();

        while !self.stopping() {
            // The api lock must be released before delivering: sinks open devices
            let present = {
                let mut api = self.api.lock();
                match api.refresh_devices() {
                    Ok(()) => Some(scan(&api, &self.criteria)),
                    Err(e) => {
                        warn!("{} device refresh failed: {}", self.label, e);
                        None
                    }
                }
            };

            if let Some(present) = present {
                let lost = collect_lost(&self.losses, &known, &present, &mut seen);
                self.deliver(&mut known, present, &lost);
            }

            if self.stopping() {
                break;
            }
            thread::park_timeout(self.interval);
        }

        debug!("{} hotplug thread exiting", self.label);
    }

    fn deliver(
        &self,
        known: &mut HashSet<HardwareRef>,
        present: Vec<DeviceDescriptor>,
        lost: &HashSet<HardwareRef>,
    ) {
        deliver_changes(
            self.label,
            known,
            present,
            lost,
            &self.matched,
            &self.removed,
            &self.shutdown,
        );
    }
}

/// Diff one scan against the known set and deliver the changes
///
/// Devices in `lost` are removed even if still present and then matched
/// again. Removals go out before matches. Delivery stops as soon as
/// `shutdown` is set.
fn deliver_changes(
    label: &str,
    known: &mut HashSet<HardwareRef>,
    present: Vec<DeviceDescriptor>,
    lost: &HashSet<HardwareRef>,
    matched: &MatchedCallback,
    removed: &RemovedCallback,
    shutdown: &AtomicBool,
) {
    let present_refs: HashSet<&HardwareRef> = present.iter().map(|d| &d.hardware_ref).collect();
    let gone: Vec<HardwareRef> = known
        .iter()
        .filter(|r| !present_refs.contains(r) || lost.contains(*r))
        .cloned()
        .collect();

    for hardware_ref in gone {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        known.remove(&hardware_ref);
        debug!("{} device removed: {}", label, hardware_ref);
        removed(hardware_ref);
    }

    for desc in present {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        if known.insert(desc.hardware_ref.clone()) {
            debug!("{} device matched: {}", label, desc.hardware_ref);
            matched(desc);
        }
    }
}
