use crate::progress::{cancellation_requested, cancellation_reason, log_progress, stop_active_children};
use crate::solver::{ResolveOutcome, ResolveRequest, Solver, child_total_window, poll_delay_for};
use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

/// One resolver job. Jobs sharing a `(repo_id, arch)` group run in
/// submission order so the backend's metadata caches get reused; distinct
/// groups run concurrently subject to the global subprocess cap.
#[derive(Debug, Clone)]
pub struct ResolveJob {
    pub key: String,
    pub workload_conf_id: String,
    pub env_conf_id: String,
    pub repo_id: String,
    pub arch: String,
    pub request: ResolveRequest,
}

enum JobReport {
    Done(String, ResolveOutcome),
    Crashed {
        key: String,
        workload_conf_id: String,
        env_conf_id: String,
        repo_id: String,
        arch: String,
        detail: String,
    },
}

struct SlotBudget {
    slots: Mutex<usize>,
    freed: Condvar,
}

impl SlotBudget {
    fn new(max: usize) -> Self {
        SlotBudget {
            slots: Mutex::new(max),
            freed: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *slots == 0 {
            slots = match self.freed.wait(slots) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        *slots -= 1;
    }

    fn release(&self) {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slots += 1;
        drop(slots);
        self.freed.notify_one();
    }
}

/// Runs all jobs and returns their outcomes keyed by job key. A job that
/// produces no result within the watchdog window is a crash, which aborts
/// the whole pipeline: partial results are never returned.
pub fn run_resolve_jobs(
    solver: &Arc<dyn Solver>,
    jobs: Vec<ResolveJob>,
    max_subprocesses: usize,
) -> Result<BTreeMap<String, ResolveOutcome>> {
    run_resolve_jobs_with_timeout(solver, jobs, max_subprocesses, child_total_window())
}

fn run_resolve_jobs_with_timeout(
    solver: &Arc<dyn Solver>,
    jobs: Vec<ResolveJob>,
    max_subprocesses: usize,
    job_timeout: Duration,
) -> Result<BTreeMap<String, ResolveOutcome>> {
    let total = jobs.len();
    if total == 0 {
        return Ok(BTreeMap::new());
    }

    // Group by (repo, arch), keeping submission order within each group.
    let mut groups: BTreeMap<(String, String), Vec<ResolveJob>> = BTreeMap::new();
    for job in jobs {
        groups
            .entry((job.repo_id.clone(), job.arch.clone()))
            .or_default()
            .push(job);
    }

    log_progress(format!(
        "phase=resolve-queue status=initialized jobs={} groups={} max_subprocesses={}",
        total,
        groups.len(),
        max_subprocesses
    ));

    let budget = Arc::new(SlotBudget::new(max_subprocesses.max(1)));
    let counter = Arc::new(AtomicUsize::new(0));
    let (report_tx, report_rx) = mpsc::channel::<JobReport>();

    let mut group_handles = Vec::new();
    for ((repo_id, arch), group_jobs) in groups {
        let budget = Arc::clone(&budget);
        let counter = Arc::clone(&counter);
        let report_tx = report_tx.clone();
        let solver = Arc::clone(solver);

        group_handles.push(thread::spawn(move || {
            for job in group_jobs {
                if cancellation_requested() {
                    break;
                }
                budget.acquire();

                let current = counter.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                log_progress(format!(
                    "phase=resolve-queue status=dispatch job={} group={repo_id}-{arch} progress={current}/{total}",
                    job.key
                ));

                let report = run_one_job(&solver, &job, job_timeout);
                budget.release();
                if report_tx.send(report).is_err() {
                    break;
                }
            }
        }));
    }
    drop(report_tx);

    let mut results: BTreeMap<String, ResolveOutcome> = BTreeMap::new();
    let mut crash: Option<String> = None;

    for report in report_rx {
        match report {
            JobReport::Done(key, outcome) => {
                results.insert(key, outcome);
            }
            JobReport::Crashed {
                key,
                workload_conf_id,
                env_conf_id,
                repo_id,
                arch,
                detail,
            } => {
                log_progress(format!(
                    "phase=resolve-queue status=job-crashed job={key} workload_conf={workload_conf_id} env_conf={env_conf_id} repo={repo_id} arch={arch} detail={}",
                    crate::progress::compact_reason(&detail, 300)
                ));
                crash = Some(format!(
                    "analysis error: resolver job produced no result \
                     (workload_conf: {workload_conf_id}, env_conf: {env_conf_id}, \
                     repo: {repo_id}, arch: {arch}): {detail}"
                ));
                // A single crash is fatal. Stop feeding the queue and take
                // down whatever is still running.
                crate::progress::request_cancellation(detail);
                break;
            }
        }
    }

    for handle in group_handles {
        let _ = handle.join();
    }

    if let Some(message) = crash {
        stop_active_children("resolver job crashed");
        bail!(message);
    }

    if cancellation_requested() {
        bail!("analysis error: cancelled: {}", cancellation_reason());
    }

    if results.len() != total {
        bail!(
            "analysis error: resolver queue finished with {} of {total} results",
            results.len()
        );
    }

    Ok(results)
}

/// Executes one job on a worker thread and waits for its result under the
/// escalating poll schedule. The subprocess backend enforces the same
/// window on its child; this guard also catches a wedged in-process
/// backend.
fn run_one_job(solver: &Arc<dyn Solver>, job: &ResolveJob, job_timeout: Duration) -> JobReport {
    let (result_tx, result_rx) = mpsc::channel::<Result<ResolveOutcome>>();
    let worker_solver = Arc::clone(solver);
    let request = job.request.clone();
    thread::spawn(move || {
        let outcome = worker_solver.resolve(&request);
        let _ = result_tx.send(outcome);
    });

    let started = Instant::now();
    loop {
        let elapsed = started.elapsed();
        if elapsed >= job_timeout {
            return crashed_report(job, format!("no result within {}s", job_timeout.as_secs()));
        }
        let delay = poll_delay_for(elapsed).min(job_timeout - elapsed);
        match result_rx.recv_timeout(delay) {
            Ok(Ok(outcome)) => {
                return JobReport::Done(job.key.clone(), outcome);
            }
            Ok(Err(err)) => {
                return crashed_report(job, format!("{err:#}"));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return crashed_report(job, "worker thread died".to_string());
            }
        }
    }
}

fn crashed_report(job: &ResolveJob, detail: String) -> JobReport {
    JobReport::Crashed {
        key: job.key.clone(),
        workload_conf_id: job.workload_conf_id.clone(),
        env_conf_id: job.env_conf_id.clone(),
        repo_id: job.repo_id.clone(),
        arch: job.arch.clone(),
        detail,
    }
}
