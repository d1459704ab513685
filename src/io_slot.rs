//! Shared hardware connection slot for device capabilities

use std::sync::Arc;

use hidhost_transport::{HidIo, TransportError};
use parking_lot::Mutex;

/// Holds the opened connection until `release` empties the slot
///
/// I/O runs on a clone of the connection taken under the lock, so a blocked
/// read never holds up `release`. The connection is dropped when the last
/// in-flight operation finishes.
pub(crate) struct IoSlot {
    io: Mutex<Option<Arc<dyn HidIo>>>,
}

impl IoSlot {
    pub(crate) fn new(io: Box<dyn HidIo>) -> Self {
        Self {
            io: Mutex::new(Some(Arc::from(io))),
        }
    }

    /// Run `f` against the connection, or fail with `Closed` once released
    pub(crate) fn with<T>(
        &self,
        f: impl FnOnce(&dyn HidIo) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let io = self.io.lock().clone().ok_or(TransportError::Closed)?;
        f(io.as_ref())
    }

    /// Empty the slot; returns false if it was already empty
    pub(crate) fn release(&self) -> bool {
        let io = self.io.lock().take();
        io.is_some()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.io.lock().is_some()
    }
}
