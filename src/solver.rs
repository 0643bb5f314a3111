use crate::config::{RepoChildRepo, RepoConfig};
use crate::data::{PackageRecord, PkgRelations};
use crate::progress::{log_progress, register_active_child};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Escalating wait schedule for solver children: a fine window for the
/// common fast case, then medium, then coarse. Totals roughly 222 seconds.
pub const CHILD_POLL_WINDOWS: [(u32, Duration); 3] = [
    (19, Duration::from_millis(100)),
    (19, Duration::from_secs(1)),
    (19, Duration::from_secs(10)),
];

pub fn child_total_window() -> Duration {
    CHILD_POLL_WINDOWS
        .iter()
        .map(|(count, delay)| *delay * *count)
        .sum()
}

/// Poll delay appropriate for how long a child has been running already.
pub fn poll_delay_for(elapsed: Duration) -> Duration {
    let mut window_end = Duration::ZERO;
    for (count, delay) in CHILD_POLL_WINDOWS {
        window_end += delay * count;
        if elapsed < window_end {
            return delay;
        }
    }
    CHILD_POLL_WINDOWS[CHILD_POLL_WINDOWS.len() - 1].1
}

const MAX_REPO_DOWNLOAD_TRIES: u32 = 10;

///////////////////////////////////////////////////////////////////////////////
// Requests and outcomes
///////////////////////////////////////////////////////////////////////////////

/// One child repository handed to the solver backend, already filtered by
/// its `limit_arches` whitelist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverRepo {
    pub id: String,
    pub name: String,
    pub baseurl: String,
    pub priority: u32,
    pub exclude: Option<String>,
}

pub fn solver_repos_for(repo: &RepoConfig, arch: &str) -> Vec<SolverRepo> {
    repo.source
        .repos
        .values()
        .filter(|child| match &child.limit_arches {
            Some(limit) => limit.iter().any(|a| a == arch),
            None => true,
        })
        .map(|child| SolverRepo {
            id: child.id.clone(),
            name: child.name.clone(),
            baseurl: child.baseurl.clone(),
            priority: child.priority,
            exclude: child.exclude.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    #[serde(rename = "repo-download")]
    RepoDownload,
    #[serde(rename = "depsolve")]
    DepSolve,
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "transaction")]
    Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Successful resolution. Names the solver could not mark for install are
/// reported here rather than failing the resolve; the caller decides
/// whether they are hard errors or warnings (workload `strict` option).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveSuccess {
    pub env_pkg_ids: Vec<String>,
    pub added_pkg_ids: Vec<String>,
    pub relations: BTreeMap<String, PkgRelations>,
    pub not_found_pkgs: Vec<String>,
    pub not_found_placeholder_deps: Vec<String>,
    pub not_found_groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResolveOutcome {
    Success(ResolveSuccess),
    Failure(ResolveFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolveOp {
    /// Resolve and write the resulting install set into a fresh fake root.
    #[serde(rename = "create-env")]
    CreateEnv,
    /// Load an existing fake root (or an empty one), mark the required
    /// packages, and resolve without writing anything back.
    #[serde(rename = "resolve-workload")]
    ResolveWorkload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub op: ResolveOp,
    pub repo_id: String,
    pub arch: String,
    pub releasever: String,
    /// Name of the fake install root, unique per (env conf, repo, arch).
    pub root_id: String,
    pub repos: Vec<SolverRepo>,
    /// Whether the fake root has content that should be loaded as the
    /// already-installed base.
    pub load_system_repo: bool,
    pub packages: Vec<String>,
    pub groups: Vec<String>,
    /// Requires of package placeholders, resolved like packages but
    /// reported separately when missing.
    pub placeholder_requires: Vec<String>,
    pub install_weak_deps: bool,
    pub include_docs: bool,
    /// The recommended-by relation is skipped during buildroot analysis.
    pub want_recommends: bool,
}

///////////////////////////////////////////////////////////////////////////////
// The facade
///////////////////////////////////////////////////////////////////////////////

pub trait Solver: Send + Sync {
    /// Lists every package visible in the repo on the arch, modular streams
    /// included. Fails with a repo-download error after 10 tries.
    fn list_all_packages(
        &self,
        repo: &RepoConfig,
        arch: &str,
    ) -> Result<BTreeMap<String, PackageRecord>>;

    fn resolve(&self, request: &ResolveRequest) -> Result<ResolveOutcome>;
}

///////////////////////////////////////////////////////////////////////////////
// Subprocess backend
//
// Every invocation runs the configured backend command in a fresh child
// process with a JSON request on stdin and one JSON document on stdout.
// The solver library leaks memory and file descriptors, so the child is
// the isolation boundary.
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct SubprocessSolver {
    pub command: String,
    pub dnf_cache_dir: PathBuf,
    pub install_roots_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct BackendRequest<'a> {
    op: &'a str,
    cache_dir: String,
    install_root: Option<String>,
    repo_id: &'a str,
    arch: &'a str,
    releasever: &'a str,
    repos: &'a [SolverRepo],
    module_hotfixes: bool,
    load_system_repo: bool,
    packages: &'a [String],
    groups: &'a [String],
    placeholder_requires: &'a [String],
    install_weak_deps: bool,
    include_docs: bool,
    want_recommends: bool,
}

#[derive(Debug, Deserialize)]
struct BackendPkg {
    name: String,
    evr: String,
    arch: String,
    #[serde(default)]
    installsize: u64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    summary: String,
    source_name: String,
    sourcerpm: String,
    reponame: String,
}

#[derive(Debug, Deserialize)]
struct BackendRelations {
    #[serde(default)]
    required_by: Vec<String>,
    #[serde(default)]
    recommended_by: Vec<String>,
    #[serde(default)]
    suggested_by: Vec<String>,
    #[serde(default)]
    source_name: String,
    #[serde(default)]
    reponame: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackendResponse {
    ok: bool,
    #[serde(default)]
    failure_kind: Option<FailureKind>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    pkgs: Vec<BackendPkg>,
    #[serde(default)]
    env_pkg_ids: Vec<String>,
    #[serde(default)]
    added_pkg_ids: Vec<String>,
    #[serde(default)]
    relations: BTreeMap<String, BackendRelations>,
    #[serde(default)]
    not_found_pkgs: Vec<String>,
    #[serde(default)]
    not_found_placeholder_deps: Vec<String>,
    #[serde(default)]
    not_found_groups: Vec<String>,
}

impl SubprocessSolver {
    fn cache_dir_for(&self, repo_id: &str, arch: &str) -> String {
        self.dnf_cache_dir
            .join(format!("dnf_cachedir-{repo_id}-{arch}"))
            .to_string_lossy()
            .to_string()
    }

    fn install_root_for(&self, root_id: &str) -> String {
        self.install_roots_dir
            .join(root_id)
            .to_string_lossy()
            .to_string()
    }

    /// Runs one backend child to completion under the escalating poll
    /// schedule. A child that neither exits nor gets killed within the
    /// total window counts as a crash.
    fn run_child(&self, label: &str, request: &BackendRequest) -> Result<BackendResponse> {
        let request_json = serde_json::to_string(request)
            .context("serializing solver backend request")?;

        let mut child = Command::new(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning solver backend '{}'", self.command))?;

        let child_key = format!("solver-{}-{}", label, child.id());
        let _child_guard = register_active_child(&child_key, child.id(), label);

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request_json.as_bytes())
                .context("writing solver backend request")?;
        }

        // Drain stdout on a separate thread so a large response can't fill
        // the pipe and wedge the child before it exits.
        let mut stdout = child
            .stdout
            .take()
            .context("capturing solver backend stdout")?;
        let (tx, rx) = mpsc::channel::<std::io::Result<Vec<u8>>>();
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let result = stdout.read_to_end(&mut buffer).map(|_| buffer);
            let _ = tx.send(result);
        });

        let started = Instant::now();
        let total_window = child_total_window();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        bail!(
                            "analysis error: solver backend exited with {status} for {label}"
                        );
                    }
                    break;
                }
                Ok(None) => {
                    let elapsed = started.elapsed();
                    if elapsed >= total_window {
                        let _ = child.kill();
                        let _ = child.wait();
                        bail!(
                            "analysis error: solver backend produced no result within {}s for {label}",
                            total_window.as_secs()
                        );
                    }
                    thread::sleep(poll_delay_for(elapsed));
                }
                Err(err) => {
                    let _ = child.kill();
                    return Err(err).context("waiting for solver backend child");
                }
            }
        }

        let output = rx
            .recv_timeout(Duration::from_secs(30))
            .context("collecting solver backend output")?
            .context("reading solver backend output")?;

        serde_json::from_slice(&output).context("parsing solver backend response")
    }
}

impl Solver for SubprocessSolver {
    fn list_all_packages(
        &self,
        repo: &RepoConfig,
        arch: &str,
    ) -> Result<BTreeMap<String, PackageRecord>> {
        let repos = solver_repos_for(repo, arch);
        let request = BackendRequest {
            op: "list-packages",
            cache_dir: self.cache_dir_for(&repo.id, arch),
            install_root: Some(self.install_root_for(&format!(
                "dnf_generic_installroot-{}-{}",
                repo.id, arch
            ))),
            repo_id: &repo.id,
            arch,
            releasever: &repo.source.releasever,
            repos: &repos,
            module_hotfixes: true,
            load_system_repo: false,
            packages: &[],
            groups: &[],
            placeholder_requires: &[],
            install_weak_deps: false,
            include_docs: true,
            want_recommends: false,
        };

        let label = format!("list-{}-{}", repo.id, arch);
        let mut attempts = 0;
        let response = loop {
            attempts += 1;
            let response = self.run_child(&label, &request)?;
            if response.ok {
                break response;
            }
            if response.failure_kind == Some(FailureKind::RepoDownload)
                && attempts < MAX_REPO_DOWNLOAD_TRIES
            {
                log_progress(format!(
                    "phase=repos status=retrying-repodata repo={} arch={arch} attempt={attempts}",
                    repo.id
                ));
                continue;
            }
            bail!(
                "repo download error: failed to download repodata while analyzing repo '{} ({})' {arch}: {}",
                repo.name,
                repo.id,
                response.message.unwrap_or_default()
            );
        };

        Ok(build_package_records(&response.pkgs, repo))
    }

    fn resolve(&self, request: &ResolveRequest) -> Result<ResolveOutcome> {
        let op = match request.op {
            ResolveOp::CreateEnv => "create-env",
            ResolveOp::ResolveWorkload => "resolve-workload",
        };
        let backend_request = BackendRequest {
            op,
            cache_dir: self.cache_dir_for(&request.repo_id, &request.arch),
            install_root: Some(self.install_root_for(&request.root_id)),
            repo_id: &request.repo_id,
            arch: &request.arch,
            releasever: &request.releasever,
            repos: &request.repos,
            module_hotfixes: false,
            load_system_repo: request.load_system_repo,
            packages: &request.packages,
            groups: &request.groups,
            placeholder_requires: &request.placeholder_requires,
            install_weak_deps: request.install_weak_deps,
            include_docs: request.include_docs,
            want_recommends: request.want_recommends,
        };

        let label = format!("{op}-{}", request.root_id);
        let response = self.run_child(&label, &backend_request)?;

        if !response.ok {
            let kind = response.failure_kind.unwrap_or(FailureKind::DepSolve);
            return Ok(ResolveOutcome::Failure(ResolveFailure {
                kind,
                message: response.message.unwrap_or_default(),
            }));
        }

        let mut relations: BTreeMap<String, PkgRelations> = BTreeMap::new();
        for (pkg_id, backend_relations) in response.relations {
            let mut required_by = backend_relations.required_by;
            let mut recommended_by = backend_relations.recommended_by;
            let mut suggested_by = backend_relations.suggested_by;
            required_by.sort();
            recommended_by.sort();
            suggested_by.sort();
            relations.insert(
                pkg_id,
                PkgRelations {
                    required_by,
                    recommended_by,
                    suggested_by,
                    source_name: backend_relations.source_name,
                    reponame: backend_relations.reponame,
                },
            );
        }

        Ok(ResolveOutcome::Success(ResolveSuccess {
            env_pkg_ids: response.env_pkg_ids,
            added_pkg_ids: response.added_pkg_ids,
            relations,
            not_found_pkgs: response.not_found_pkgs,
            not_found_placeholder_deps: response.not_found_placeholder_deps,
            not_found_groups: response.not_found_groups,
        }))
    }
}

/// Folds the per-reponame package listing into one record per NEVRA and
/// computes `highest_priority_reponames` from the repo config priorities.
/// Lower priority numbers win.
fn build_package_records(
    pkgs: &[BackendPkg],
    repo: &RepoConfig,
) -> BTreeMap<String, PackageRecord> {
    let repo_priorities: BTreeMap<&str, u32> = repo
        .source
        .repos
        .values()
        .map(|child: &RepoChildRepo| (child.name.as_str(), child.priority))
        .collect();

    let mut records: BTreeMap<String, PackageRecord> = BTreeMap::new();
    for pkg in pkgs {
        let nevra = format!("{}-{}.{}", pkg.name, pkg.evr, pkg.arch);
        let record = records.entry(nevra.clone()).or_insert_with(|| PackageRecord {
            id: nevra.clone(),
            name: pkg.name.clone(),
            evr: pkg.evr.clone(),
            nevr: format!("{}-{}", pkg.name, pkg.evr),
            arch: pkg.arch.clone(),
            installsize: pkg.installsize,
            description: pkg.description.clone(),
            summary: pkg.summary.clone(),
            source_name: pkg.source_name.clone(),
            sourcerpm: pkg.sourcerpm.clone(),
            reponame: pkg.reponame.clone(),
            all_reponames: BTreeSet::new(),
            highest_priority_reponames: BTreeSet::new(),
        });
        record.all_reponames.insert(pkg.reponame.clone());
    }

    for record in records.values_mut() {
        let highest_priority = record
            .all_reponames
            .iter()
            .filter_map(|reponame| repo_priorities.get(reponame.as_str()))
            .min()
            .copied();
        if let Some(priority) = highest_priority {
            record.highest_priority_reponames = record
                .all_reponames
                .iter()
                .filter(|reponame| repo_priorities.get(reponame.as_str()) == Some(&priority))
                .cloned()
                .collect();
        }
    }

    records
}

///////////////////////////////////////////////////////////////////////////////
// Test double
///////////////////////////////////////////////////////////////////////////////

/// In-process solver used by pipeline tests. Catalogs are keyed by
/// (repo_id, arch); resolve outcomes come from a caller-provided closure.
#[cfg(test)]
pub struct FakeSolver {
    pub catalogs: BTreeMap<(String, String), BTreeMap<String, PackageRecord>>,
    #[allow(clippy::type_complexity)]
    pub resolver: Box<dyn Fn(&ResolveRequest) -> ResolveOutcome + Send + Sync>,
}

#[cfg(test)]
impl FakeSolver {
    pub fn empty() -> Self {
        FakeSolver {
            catalogs: BTreeMap::new(),
            resolver: Box::new(|_| ResolveOutcome::Success(ResolveSuccess::default())),
        }
    }
}

#[cfg(test)]
impl Solver for FakeSolver {
    fn list_all_packages(
        &self,
        repo: &RepoConfig,
        arch: &str,
    ) -> Result<BTreeMap<String, PackageRecord>> {
        match self.catalogs.get(&(repo.id.clone(), arch.to_string())) {
            Some(catalog) => Ok(catalog.clone()),
            None => bail!(
                "repo download error: no catalog for repo '{}' {arch}",
                repo.id
            ),
        }
    }

    fn resolve(&self, request: &ResolveRequest) -> Result<ResolveOutcome> {
        Ok((self.resolver)(request))
    }
}

#[cfg(test)]
pub fn make_test_pkg(name: &str, evr: &str, arch: &str, source_name: &str) -> PackageRecord {
    PackageRecord {
        id: format!("{name}-{evr}.{arch}"),
        name: name.to_string(),
        evr: evr.to_string(),
        nevr: format!("{name}-{evr}"),
        arch: arch.to_string(),
        installsize: 1024,
        description: format!("{name} package"),
        summary: format!("{name} package"),
        source_name: source_name.to_string(),
        sourcerpm: format!("{source_name}-{evr}.src.rpm"),
        reponame: "base".to_string(),
        all_reponames: BTreeSet::from(["base".to_string()]),
        highest_priority_reponames: BTreeSet::from(["base".to_string()]),
    }
}
