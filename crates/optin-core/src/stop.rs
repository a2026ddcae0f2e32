//! Cooperative stop signal.
//!
//! A single predicate shared by every subsystem, polled at step boundaries,
//! before LLM calls and before navigation. Stops come from an explicit
//! [`StopSignal::request_stop`] call or from the presence of the well-known
//! stop file in the app-data directory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cooperative stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    stop_file: Option<PathBuf>,
}

impl StopSignal {
    /// A stop signal with no file backing (explicit stops only).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A stop signal that also honours the given stop file.
    #[must_use]
    pub fn with_stop_file(path: impl Into<PathBuf>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            stop_file: Some(path.into()),
        }
    }

    /// Request a graceful stop.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested, by flag or by stop file.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(path) = &self.stop_file {
            if path.exists() {
                tracing::info!("Stop signal file present: {}", path.display());
                self.flag.store(true, Ordering::SeqCst);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_stop() {
        let stop = StopSignal::new();
        assert!(!stop.is_stopped());
        stop.request_stop();
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_clones_share_state() {
        let stop = StopSignal::new();
        let other = stop.clone();
        other.request_stop();
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_stop_file() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let path = tmp.path().join("stop_signal.txt");
        let stop = StopSignal::with_stop_file(&path);
        assert!(!stop.is_stopped());

        std::fs::write(&path, "stop").expect("write stop file");
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_stop_latches_after_file_seen() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let path = tmp.path().join("stop_signal.txt");
        let stop = StopSignal::with_stop_file(&path);

        std::fs::write(&path, "stop").expect("write stop file");
        assert!(stop.is_stopped());

        // Removing the file does not un-stop a signalled run
        std::fs::remove_file(&path).expect("remove stop file");
        assert!(stop.is_stopped());
    }
}
