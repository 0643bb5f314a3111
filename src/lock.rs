use anyhow::{Context, Result, bail};
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const LOCK_FILE_NAME: &str = ".packset.lock";
const STATE_FILE_NAME: &str = ".packset-session.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionState {
    pid: u32,
    configs_dir: String,
    started_at_utc: String,
}

/// Exclusive hold on one output directory for the duration of a run. Two
/// concurrent runs would race on the root-log cache generations and the
/// output files, so the second one is refused with a pointer at the
/// first.
#[derive(Debug)]
pub struct SessionGuard {
    _lock_file: fs::File,
    state_file: PathBuf,
}

impl SessionGuard {
    pub fn acquire(output_dir: &Path, configs_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("creating output directory {}", output_dir.display()))?;

        let lock_path = output_dir.join(LOCK_FILE_NAME);
        let state_file = output_dir.join(STATE_FILE_NAME);
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("opening lock file {}", lock_path.display()))?;

        if let Err(err) = lock_file.try_lock_exclusive() {
            if err.kind() == ErrorKind::WouldBlock {
                let owner = fs::read_to_string(&state_file)
                    .ok()
                    .and_then(|raw| serde_json::from_str::<SessionState>(&raw).ok())
                    .map(|state| {
                        format!(
                            "pid={} configs={} started={}",
                            state.pid, state.configs_dir, state.started_at_utc
                        )
                    })
                    .unwrap_or_else(|| "unknown".to_string());
                bail!(
                    "output directory {} is already in use: {owner}",
                    output_dir.display()
                );
            }
            return Err(err)
                .with_context(|| format!("acquiring session lock {}", lock_path.display()));
        }

        let state = SessionState {
            pid: std::process::id(),
            configs_dir: configs_dir.display().to_string(),
            started_at_utc: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        let serialized = serde_json::to_string(&state).context("serializing session state")?;
        fs::write(&state_file, serialized)
            .with_context(|| format!("writing session state {}", state_file.display()))?;

        Ok(SessionGuard {
            _lock_file: lock_file,
            state_file,
        })
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.state_file);
    }
}
