//! HID subsystem session - the bridge to the OS HID layer
//!
//! Opening a session creates the backend manager object, installs the match
//! criteria, registers the matched/removed sinks and schedules delivery. Any
//! failing step rolls back what was already done, so a failed `open` leaves
//! nothing behind. `close` is idempotent.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::TransportError;
use crate::types::MatchCriterion;
use crate::{HidBackend, MatchedCallback, RemovedCallback};

/// One OS-level HID manager plus its installed criteria and sinks
pub struct HidSession<B: HidBackend> {
    backend: Arc<B>,
    /// Name used in logs
    label: &'static str,
    /// Backend object, present while open
    session: Option<B::Session>,
    /// Criteria installed by the last successful open
    criteria: Vec<MatchCriterion>,
}

impl<B: HidBackend> HidSession<B> {
    pub fn new(backend: Arc<B>, label: &'static str) -> Self {
        Self {
            backend,
            label,
            session: None,
            criteria: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Criteria installed on the open session (empty when closed)
    pub fn criteria(&self) -> &[MatchCriterion] {
        &self.criteria
    }

    /// Open the session and start notification delivery
    pub fn open(
        &mut self,
        criteria: &[MatchCriterion],
        matched: MatchedCallback,
        removed: RemovedCallback,
    ) -> Result<(), TransportError> {
        if self.session.is_some() {
            return Err(TransportError::SessionAlreadyOpen);
        }

        let backend = &self.backend;
        let mut session = backend.create_session(self.label, criteria)?;

        if let Err(e) = backend.register_matched(&mut session, matched) {
            warn!("{}: registering matched callback failed: {}", self.label, e);
            backend.release_session(session);
            return Err(e);
        }

        if let Err(e) = backend.register_removed(&mut session, removed) {
            warn!("{}: registering removed callback failed: {}", self.label, e);
            backend.unregister_callbacks(&mut session);
            backend.release_session(session);
            return Err(e);
        }

        if let Err(e) = backend.schedule(&mut session) {
            warn!("{}: scheduling session failed: {}", self.label, e);
            backend.unregister_callbacks(&mut session);
            backend.release_session(session);
            return Err(e);
        }

        debug!(
            "{}: session open with {} criteria",
            self.label,
            criteria.len()
        );
        self.session = Some(session);
        self.criteria = criteria.to_vec();
        Ok(())
    }

    /// Stop delivery, unregister sinks and release the backend object
    ///
    /// Once this returns no sink is running or will run again. Closing a
    /// closed session is a no-op.
    pub fn close(&mut self) -> Result<(), TransportError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        self.backend.unschedule(&mut session);
        self.backend.unregister_callbacks(&mut session);
        self.backend.release_session(session);
        self.criteria.clear();
        debug!("{}: session closed", self.label);
        Ok(())
    }
}

impl<B: HidBackend> Drop for HidSession<B> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HidIo;
    use crate::types::DeviceDescriptor;
    use parking_lot::Mutex;

    /// Backend that records calls and can fail at a chosen step
    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<&'static str>>,
        fail_at: Option<&'static str>,
    }

    impl RecordingBackend {
        fn failing_at(step: &'static str) -> Self {
            Self {
                fail_at: Some(step),
                ..Default::default()
            }
        }

        fn step(&self, name: &'static str) -> Result<(), TransportError> {
            self.calls.lock().push(name);
            if self.fail_at == Some(name) {
                Err(TransportError::SessionOpen(format!("{name} refused")))
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    impl HidBackend for RecordingBackend {
        type Session = ();

        fn create_session(
            &self,
            _label: &'static str,
            _criteria: &[MatchCriterion],
        ) -> Result<(), TransportError> {
            self.step("create")
        }

        fn register_matched(
            &self,
            _session: &mut (),
            _callback: MatchedCallback,
        ) -> Result<(), TransportError> {
            self.step("matched")
        }

        fn register_removed(
            &self,
            _session: &mut (),
            _callback: RemovedCallback,
        ) -> Result<(), TransportError> {
            self.step("removed")
        }

        fn schedule(&self, _session: &mut ()) -> Result<(), TransportError> {
            self.step("schedule")
        }

        fn unschedule(&self, _session: &mut ()) {
            self.calls.lock().push("unschedule");
        }

        fn unregister_callbacks(&self, _session: &mut ()) {
            self.calls.lock().push("unregister");
        }

        fn release_session(&self, _session: ()) {
            self.calls.lock().push("release");
        }

        fn open_device(
            &self,
            descriptor: &DeviceDescriptor,
        ) -> Result<Box<dyn HidIo>, TransportError> {
            Err(TransportError::DeviceNotFound(
                descriptor.hardware_ref.to_string(),
            ))
        }
    }

    fn sinks() -> (MatchedCallback, RemovedCallback) {
        (
            Arc::new(|_: DeviceDescriptor| {}),
            Arc::new(|_: crate::types::HardwareRef| {}),
        )
    }

    fn open(session: &mut HidSession<RecordingBackend>) -> Result<(), TransportError> {
        let (m, r) = sinks();
        session.open(&[MatchCriterion::usage(1, 5)], m, r)
    }

    #[test]
    fn test_open_close_sequence() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = HidSession::new(Arc::clone(&backend), "test");
        open(&mut session).unwrap();
        assert!(session.is_open());
        assert_eq!(session.criteria(), &[MatchCriterion::usage(1, 5)]);

        session.close().unwrap();
        assert!(!session.is_open());
        assert!(session.criteria().is_empty());
        assert_eq!(
            backend.calls(),
            [
                "create",
                "matched",
                "removed",
                "schedule",
                "unschedule",
                "unregister",
                "release"
            ]
        );
    }

    #[test]
    fn test_double_open_fails_without_side_effects() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = HidSession::new(Arc::clone(&backend), "test");
        open(&mut session).unwrap();
        let before = backend.calls().len();

        assert!(matches!(
            open(&mut session),
            Err(TransportError::SessionAlreadyOpen)
        ));
        assert_eq!(backend.calls().len(), before);
        assert!(session.is_open());
    }

    #[test]
    fn test_close_when_closed_is_noop() {
        let backend = Arc::new(RecordingBackend::default());
        let mut session = HidSession::new(Arc::clone(&backend), "test");
        session.close().unwrap();
        session.close().unwrap();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_create_failure_leaves_nothing() {
        let backend = Arc::new(RecordingBackend::failing_at("create"));
        let mut session = HidSession::new(Arc::clone(&backend), "test");
        assert!(open(&mut session).is_err());
        assert!(!session.is_open());
        assert_eq!(backend.calls(), ["create"]);
    }

    #[test]
    fn test_partial_registration_rolls_back() {
        let backend = Arc::new(RecordingBackend::failing_at("removed"));
        let mut session = HidSession::new(Arc::clone(&backend), "test");
        assert!(open(&mut session).is_err());
        assert!(!session.is_open());
        assert_eq!(
            backend.calls(),
            ["create", "matched", "removed", "unregister", "release"]
        );
    }

    #[test]
    fn test_schedule_failure_rolls_back() {
        let backend = Arc::new(RecordingBackend::failing_at("schedule"));
        let mut session = HidSession::new(Arc::clone(&backend), "test");
        assert!(open(&mut session).is_err());
        assert_eq!(
            backend.calls(),
            ["create", "matched", "removed", "schedule", "unregister", "release"]
        );

        // Dropping a session that never opened touches nothing
        drop(session);
        assert_eq!(backend.calls().len(), 6);
    }

    #[test]
    fn test_drop_closes_open_session() {
        let backend = Arc::new(RecordingBackend::default());
        {
            let mut session = HidSession::new(Arc::clone(&backend), "test");
            open(&mut session).unwrap();
        }
        assert_eq!(
            &backend.calls()[4..],
            ["unschedule", "unregister", "release"]
        );
    }
}
