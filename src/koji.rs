use crate::data::pkg_id_to_name;
use crate::progress::log_progress;
use crate::rootlog::get_build_deps_from_root_log;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::time::Duration;

const MAX_TRIES: u32 = 10;
const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Rotating fake build-requires for development runs. Keeps the buildroot
/// fixed point at three passes at most without talking to a build service.
pub fn dev_fake_build_requires(srpm_id: &str) -> Vec<String> {
    let name = pkg_id_to_name(srpm_id);
    if ["bash", "make", "unzip"].contains(&name) {
        return vec![
            "gawk".to_string(),
            "xz".to_string(),
            "findutils".to_string(),
        ];
    }
    if ["gawk", "xz", "findutils"].contains(&name) {
        return vec!["cpio".to_string(), "diffutils".to_string()];
    }
    vec![
        "bash".to_string(),
        "make".to_string(),
        "unzip".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildLogEntry {
    pub name: String,
    pub dir: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
struct RpmRecord {
    build_id: u64,
}

#[derive(Debug, Deserialize)]
struct ApiResult<T> {
    result: T,
}

/// Picks the `root.log` belonging to the build on the given arch. Noarch
/// builds keep their log under `noarch`.
pub fn choose_root_log_path(logs: &[BuildLogEntry], arch: &str) -> Option<String> {
    let mut chosen = None;
    for log in logs {
        if log.name == "root.log" && (log.dir == arch || log.dir == "noarch") {
            chosen = Some(log.path.clone());
        }
    }
    chosen
}

/// Client for one build-service instance. The RPC endpoint answers method
/// calls posted as JSON; log files are plain HTTP downloads under the
/// files URL.
pub struct KojiClient {
    api_url: String,
    files_url: String,
    http: reqwest::blocking::Client,
}

impl KojiClient {
    pub fn new(api_url: &str, files_url: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("building the build-service HTTP client")?;
        Ok(KojiClient {
            api_url: api_url.to_string(),
            files_url: files_url.to_string(),
            http,
        })
    }

    fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let response: ApiResult<T> = self
            .http
            .post(&self.api_url)
            .json(&serde_json::json!({
                "method": method,
                "params": params,
            }))
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("calling build-service method {method}"))?
            .json()
            .with_context(|| format!("parsing build-service response for {method}"))?;
        Ok(response.result)
    }

    fn locate_root_log(&self, srpm_id: &str, arch: &str) -> Result<Option<String>> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let located = self
                .call::<RpmRecord>(
                    "getRPM",
                    serde_json::json!([format!("{srpm_id}.src")]),
                )
                .and_then(|rpm| {
                    self.call::<Vec<BuildLogEntry>>(
                        "getBuildLogs",
                        serde_json::json!([rpm.build_id]),
                    )
                });
            match located {
                Ok(logs) => return Ok(choose_root_log_path(&logs, arch)),
                Err(err) => {
                    if attempts >= MAX_TRIES {
                        bail!(
                            "koji root log error: could not talk to the build service API: {err:#}"
                        );
                    }
                    log_progress(format!(
                        "phase=buildroot status=retrying-api srpm={srpm_id} arch={arch} attempt={attempts}"
                    ));
                }
            }
        }
    }

    fn download_root_log(&self, log_path: &str) -> Result<String> {
        let url = format!("{}/{}", self.files_url, log_path);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let downloaded = self
                .http
                .get(&url)
                .send()
                .and_then(reqwest::blocking::Response::error_for_status)
                .and_then(reqwest::blocking::Response::text);
            match downloaded {
                Ok(text) => return Ok(text),
                Err(err) => {
                    if attempts >= MAX_TRIES {
                        bail!("koji root log error: could not get a root.log file: {err:#}");
                    }
                    log_progress(format!(
                        "phase=buildroot status=retrying-root-log url={url} attempt={attempts}"
                    ));
                }
            }
        }
    }

    /// The directly installed build dependencies of one source package on
    /// one arch, extracted from its build's root.log. A build without a
    /// log for the arch contributes nothing (that is not an error).
    pub fn get_direct_build_requires(&self, srpm_id: &str, arch: &str) -> Result<Vec<String>> {
        // Shim gets tagged from wherever; its build scheduling is too
        // irregular to chase root logs for.
        if pkg_id_to_name(srpm_id) == "shim" {
            log_progress(format!(
                "phase=buildroot status=skipping-shim srpm={srpm_id} arch={arch}"
            ));
            return Ok(Vec::new());
        }

        let Some(log_path) = self.locate_root_log(srpm_id, arch)? else {
            return Ok(Vec::new());
        };

        let root_log = self.download_root_log(&log_path)?;
        get_build_deps_from_root_log(&root_log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_buildroot_rotation_is_bounded() {
        // bash -> {gawk, xz, findutils} -> {cpio, diffutils} -> {bash, ...}
        // The set of names reachable from any start is finite and repeats
        // after three hops, so the fixed point converges quickly.
        let first = dev_fake_build_requires("bash-5.2-1.fc40");
        assert_eq!(first, vec!["gawk", "xz", "findutils"]);
        let second = dev_fake_build_requires("gawk-5.3-1.fc40");
        assert_eq!(second, vec!["cpio", "diffutils"]);
        let third = dev_fake_build_requires("cpio-2.15-1.fc40");
        assert_eq!(third, vec!["bash", "make", "unzip"]);
    }

    #[test]
    fn root_log_selection_prefers_arch_or_noarch() {
        let logs = vec![
            BuildLogEntry {
                name: "build.log".to_string(),
                dir: "x86_64".to_string(),
                path: "tasks/1/build.log".to_string(),
            },
            BuildLogEntry {
                name: "root.log".to_string(),
                dir: "aarch64".to_string(),
                path: "tasks/1/aarch64/root.log".to_string(),
            },
            BuildLogEntry {
                name: "root.log".to_string(),
                dir: "x86_64".to_string(),
                path: "tasks/1/x86_64/root.log".to_string(),
            },
        ];
        assert_eq!(
            choose_root_log_path(&logs, "x86_64"),
            Some("tasks/1/x86_64/root.log".to_string())
        );
        assert_eq!(
            choose_root_log_path(&logs, "aarch64"),
            Some("tasks/1/aarch64/root.log".to_string())
        );
        assert_eq!(choose_root_log_path(&logs, "s390x"), None);

        let noarch = vec![BuildLogEntry {
            name: "root.log".to_string(),
            dir: "noarch".to_string(),
            path: "tasks/2/noarch/root.log".to_string(),
        }];
        assert_eq!(
            choose_root_log_path(&noarch, "s390x"),
            Some("tasks/2/noarch/root.log".to_string())
        );
    }
}
