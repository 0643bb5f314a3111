use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, OnceLock};

type ProgressSink = Arc<dyn Fn(String) + Send + Sync + 'static>;

static PROGRESS_SINK: OnceLock<Mutex<Option<ProgressSink>>> = OnceLock::new();
static CANCELLATION_REQUESTED: AtomicBool = AtomicBool::new(false);
static CANCELLATION_REASON: OnceLock<Mutex<Option<String>>> = OnceLock::new();
static ACTIVE_CHILDREN: OnceLock<Mutex<HashMap<String, ActiveChild>>> = OnceLock::new();

#[derive(Debug, Clone)]
struct ActiveChild {
    pid: u32,
    label: String,
}

/// Guard that unregisters a solver child from the kill registry when dropped.
pub struct ActiveChildGuard {
    key: String,
}

impl ActiveChildGuard {
    pub fn new(key: String) -> Self {
        Self { key }
    }
}

impl Drop for ActiveChildGuard {
    fn drop(&mut self) {
        unregister_active_child(&self.key);
    }
}

pub fn log_progress(message: impl AsRef<str>) {
    emit_progress_line(format!("progress {}", message.as_ref()));
}

fn emit_progress_line(line: String) {
    let lock = PROGRESS_SINK.get_or_init(|| Mutex::new(None));
    match lock.lock() {
        Ok(guard) => {
            if let Some(sink) = guard.as_ref() {
                sink(line);
            } else {
                eprintln!("{line}");
            }
        }
        Err(_) => {
            eprintln!("{line}");
        }
    }
}

pub fn install_progress_sink(sink: Arc<dyn Fn(String) + Send + Sync + 'static>) {
    let lock = PROGRESS_SINK.get_or_init(|| Mutex::new(None));
    if let Ok(mut guard) = lock.lock() {
        *guard = Some(sink);
    }
}

pub fn clear_progress_sink() {
    let lock = PROGRESS_SINK.get_or_init(|| Mutex::new(None));
    if let Ok(mut guard) = lock.lock() {
        *guard = None;
    }
}

pub fn reset_cancellation() {
    CANCELLATION_REQUESTED.store(false, AtomicOrdering::SeqCst);
    let lock = CANCELLATION_REASON.get_or_init(|| Mutex::new(None));
    if let Ok(mut guard) = lock.lock() {
        *guard = None;
    }
}

pub fn request_cancellation(reason: impl Into<String>) {
    let reason = reason.into();
    CANCELLATION_REQUESTED.store(true, AtomicOrdering::SeqCst);
    let lock = CANCELLATION_REASON.get_or_init(|| Mutex::new(None));
    if let Ok(mut guard) = lock.lock()
        && guard.is_none()
    {
        *guard = Some(reason.clone());
    }
    log_progress(format!(
        "phase=pipeline status=cancel-requested reason={}",
        compact_reason(&reason, 240)
    ));
    stop_active_children(&reason);
}

pub fn cancellation_requested() -> bool {
    CANCELLATION_REQUESTED.load(AtomicOrdering::SeqCst)
}

pub fn cancellation_reason() -> String {
    let lock = CANCELLATION_REASON.get_or_init(|| Mutex::new(None));
    if let Ok(guard) = lock.lock()
        && let Some(reason) = guard.as_ref()
    {
        return reason.clone();
    }
    "unknown".to_string()
}

pub fn install_ctrlc_handler() {
    let result = ctrlc::set_handler(|| {
        request_cancellation("interrupt signal received");
    });
    if let Err(err) = result {
        log_progress(format!(
            "phase=pipeline status=ctrlc-handler-unavailable detail={err}"
        ));
    }
}

pub fn register_active_child(key: &str, pid: u32, label: &str) -> ActiveChildGuard {
    let lock = ACTIVE_CHILDREN.get_or_init(|| Mutex::new(HashMap::new()));
    if let Ok(mut guard) = lock.lock() {
        guard.insert(
            key.to_string(),
            ActiveChild {
                pid,
                label: label.to_string(),
            },
        );
    }
    ActiveChildGuard::new(key.to_string())
}

fn unregister_active_child(key: &str) {
    let lock = ACTIVE_CHILDREN.get_or_init(|| Mutex::new(HashMap::new()));
    if let Ok(mut guard) = lock.lock() {
        guard.remove(key);
    }
}

/// Terminates every registered solver child. Used on cancellation and on a
/// fatal job crash so the pipeline never leaves resolver processes behind.
pub fn stop_active_children(reason: &str) {
    let snapshot: Vec<(String, ActiveChild)> = {
        let lock = ACTIVE_CHILDREN.get_or_init(|| Mutex::new(HashMap::new()));
        match lock.lock() {
            Ok(guard) => guard
                .iter()
                .map(|(key, child)| (key.clone(), child.clone()))
                .collect(),
            Err(_) => Vec::new(),
        }
    };

    for (key, child) in snapshot {
        log_progress(format!(
            "phase=pipeline status=stopping-child key={} pid={} label={} reason={}",
            key,
            child.pid,
            child.label,
            compact_reason(reason, 120)
        ));
        #[cfg(unix)]
        {
            let _ = std::process::Command::new("kill")
                .arg(child.pid.to_string())
                .status();
        }
        unregister_active_child(&key);
    }
}

/// Tests that touch the process-wide cancellation flag, directly or by
/// running resolver jobs, serialize on this lock so they can't trip each
/// other.
#[cfg(test)]
pub(crate) fn test_serial_guard() -> std::sync::MutexGuard<'static, ()> {
    static SERIAL: Mutex<()> = Mutex::new(());
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn compact_reason(reason: &str, limit: usize) -> String {
    let flat = reason.replace(['\n', '\r'], " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(limit).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_reason_flattens_and_truncates() {
        assert_eq!(compact_reason("plain", 40), "plain");
        assert_eq!(compact_reason("two\nlines", 40), "two lines");
        let long = "x".repeat(50);
        let compacted = compact_reason(&long, 10);
        assert_eq!(compacted, format!("{}...", "x".repeat(10)));
    }

    #[test]
    fn installed_sink_receives_progress_lines() {
        let _serial = test_serial_guard();
        let captured: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let captured_clone = Arc::clone(&captured);
        install_progress_sink(Arc::new(move |line| {
            if let Ok(mut lines) = captured_clone.lock() {
                lines.push(line);
            }
        }));

        log_progress("phase=test status=hello");
        clear_progress_sink();
        log_progress("phase=test status=after-clear");

        // Other tests may log concurrently, so only check our own lines.
        let lines = captured.lock().expect("captured lines");
        assert!(
            lines
                .iter()
                .any(|line| line == "progress phase=test status=hello")
        );
        assert!(
            !lines
                .iter()
                .any(|line| line.contains("status=after-clear"))
        );
    }

    #[test]
    fn cancellation_round_trip() {
        let _serial = test_serial_guard();
        reset_cancellation();
        assert!(!cancellation_requested());
        request_cancellation("test reason");
        assert!(cancellation_requested());
        assert_eq!(cancellation_reason(), "test reason");
        reset_cancellation();
        assert!(!cancellation_requested());
    }
}
