//! Append-only sink for non-fatal warnings.
//!
//! Every clamp or guard decision in the tunneling code records a message here
//! so that it can be surfaced at the end of a run. Entries are also forwarded
//! to the `log` facade at warn level.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Cloneable handle to a shared list of warning messages.
///
/// Clones share storage. A poisoned lock is recovered rather than propagated,
/// so recording a warning never panics.
#[derive(Debug, Clone, Default)]
pub struct WarningLog {
    entries: Arc<Mutex<Vec<String>>>,
}

static GLOBAL_WARNINGS: OnceLock<WarningLog> = OnceLock::new();

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide log shared by components that were not given their own.
    pub fn global() -> &'static WarningLog {
        GLOBAL_WARNINGS.get_or_init(WarningLog::new)
    }

    pub fn log_warning(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let log = WarningLog::new();
        let other = log.clone();
        other.log_warning("first");
        log.log_warning(String::from("second"));
        assert_eq!(log.entries(), vec!["first".to_string(), "second".to_string()]);
        assert_eq!(other.len(), 2);
    }

    #[test]
    fn drain_empties_the_log() {
        let log = WarningLog::new();
        log.log_warning("clamped");
        assert_eq!(log.drain(), vec!["clamped".to_string()]);
        assert!(log.is_empty());
    }

    #[test]
    fn global_log_is_a_single_instance() {
        let a = WarningLog::global() as *const WarningLog;
        let b = WarningLog::global() as *const WarningLog;
        assert_eq!(a, b);
    }
}
