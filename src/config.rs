use crate::progress::log_progress;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ALLOWED_ARCHES: [&str; 4] = ["aarch64", "ppc64le", "s390x", "x86_64"];
pub const DEFAULT_MAX_SUBPROCESSES: usize = 10;
pub const DEFAULT_SOLVER_COMMAND: &str = "packset-solver-backend";

/// Runtime settings assembled from the CLI and built-in defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub configs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub use_cache: bool,
    pub dev_buildroot: bool,
    pub dnf_cache_dir_override: Option<PathBuf>,
    pub solver_command: String,
    pub max_subprocesses: usize,
    pub allowed_arches: Vec<String>,
    /// Packages known to be uninstallable that are silently skipped when a
    /// workload requires them.
    pub uninstallable_packages: Vec<String>,
    /// Maintainer names that are never elected as best maintainers.
    pub skipped_maintainers: Vec<String>,
    pub root_log_deps_cache_path: PathBuf,
    pub strict: bool,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.allowed_arches.is_empty() {
            bail!("settings error: allowed_arches is not configured");
        }
        if self.max_subprocesses == 0 {
            bail!("settings error: max_subprocesses must be at least 1");
        }
        Ok(())
    }
}

///////////////////////////////////////////////////////////////////////////////
// Config records
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoChildRepo {
    pub id: String,
    pub name: String,
    pub baseurl: String,
    pub priority: u32,
    pub exclude: Option<String>,
    pub limit_arches: Option<Vec<String>>,
    pub koji_api_url: Option<String>,
    pub koji_files_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoSource {
    pub releasever: String,
    pub architectures: Vec<String>,
    pub repos: BTreeMap<String, RepoChildRepo>,
    pub composeinfo: Option<String>,
    pub base_buildroot_override: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub maintainer: String,
    pub source: RepoSource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub maintainer: String,
    pub repositories: Vec<String>,
    pub packages: Vec<String>,
    pub labels: Vec<String>,
    pub arch_packages: BTreeMap<String, Vec<String>>,
    pub options: Vec<String>,
    pub groups: Vec<String>,
}

impl EnvConfig {
    pub fn include_weak_deps(&self) -> bool {
        self.options.iter().any(|o| o == "include-weak-deps")
    }

    pub fn include_docs(&self) -> bool {
        self.options.iter().any(|o| o == "include-docs")
    }

    pub fn arch_packages_for(&self, arch: &str) -> &[String] {
        self.arch_packages
            .get(arch)
            .map(|pkgs| pkgs.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self, arch: &str) -> bool {
        self.packages.is_empty()
            && self.arch_packages_for(arch).is_empty()
            && self.groups.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaceholderPkg {
    pub name: String,
    pub description: String,
    pub requires: Vec<String>,
    pub limit_arches: Vec<String>,
    pub srpm: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaceholderSrpm {
    pub name: String,
    pub buildrequires: Vec<String>,
    pub limit_arches: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackagePlaceholders {
    pub pkgs: BTreeMap<String, PlaceholderPkg>,
    pub srpms: BTreeMap<String, PlaceholderSrpm>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub maintainer: String,
    pub labels: Vec<String>,
    pub packages: Vec<String>,
    pub arch_packages: BTreeMap<String, Vec<String>>,
    pub options: Vec<String>,
    pub groups: Vec<String>,
    pub package_placeholders: PackagePlaceholders,
}

impl WorkloadConfig {
    pub fn strict(&self) -> bool {
        self.options.iter().any(|o| o == "strict")
    }

    pub fn include_weak_deps(&self) -> bool {
        self.options.iter().any(|o| o == "include-weak-deps")
    }

    pub fn include_docs(&self) -> bool {
        self.options.iter().any(|o| o == "include-docs")
    }

    pub fn arch_packages_for(&self, arch: &str) -> &[String] {
        self.arch_packages
            .get(arch)
            .map(|pkgs| pkgs.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the package name is explicitly required, either globally or
    /// on the given arch.
    pub fn requires_pkg_name(&self, name: &str, arch: &str) -> bool {
        self.packages.iter().any(|p| p == name)
            || self.arch_packages_for(arch).iter().any(|p| p == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub maintainer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewType {
    #[serde(rename = "compose")]
    Compose,
    #[serde(rename = "addon")]
    Addon,
}

impl Default for ViewType {
    fn default() -> Self {
        ViewType::Compose
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildrootStrategy {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "root_logs")]
    RootLogs,
}

impl Default for BuildrootStrategy {
    fn default() -> Self {
        BuildrootStrategy::None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewConfig {
    pub id: String,
    pub view_type: ViewType,
    pub name: String,
    pub description: String,
    pub maintainer: String,
    pub labels: Vec<String>,
    pub repository: String,
    pub base_view_id: Option<String>,
    pub buildroot_strategy: BuildrootStrategy,
    pub architectures: Vec<String>,
    pub unwanted_packages: Vec<String>,
    pub unwanted_arch_packages: BTreeMap<String, Vec<String>>,
    pub unwanted_source_packages: Vec<String>,
}

impl ViewConfig {
    pub fn wants_buildroot(&self) -> bool {
        self.view_type == ViewType::Compose
            && self.buildroot_strategy == BuildrootStrategy::RootLogs
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnwantedConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub maintainer: String,
    pub labels: Vec<String>,
    pub unwanted_packages: Vec<String>,
    pub unwanted_arch_packages: BTreeMap<String, Vec<String>>,
    pub unwanted_source_packages: Vec<String>,
    pub unwanted_arch_source_packages: BTreeMap<String, Vec<String>>,
}

/// Legacy buildroot override document. Accepted so old config trees load,
/// but the analyzer derives buildroot contents from root logs only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildrootLegacyConfig {
    pub id: String,
    pub maintainer: String,
    pub view_id: String,
    pub base_buildroot: BTreeMap<String, Vec<String>>,
    pub source_packages: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyPkgRelation {
    pub source_name: String,
    pub required_by: Vec<String>,
}

/// Legacy precomputed buildroot relations (JSON side input).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildrootPkgRelationsDoc {
    pub id: String,
    pub view_id: String,
    pub arch: String,
    pub pkg_relations: BTreeMap<String, LegacyPkgRelation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configs {
    pub repos: BTreeMap<String, RepoConfig>,
    pub envs: BTreeMap<String, EnvConfig>,
    pub workloads: BTreeMap<String, WorkloadConfig>,
    pub labels: BTreeMap<String, LabelConfig>,
    pub views: BTreeMap<String, ViewConfig>,
    pub unwanteds: BTreeMap<String, UnwantedConfig>,
    pub buildroots: BTreeMap<String, BuildrootLegacyConfig>,
    pub buildroot_pkg_relations: BTreeMap<String, BuildrootPkgRelationsDoc>,
}

///////////////////////////////////////////////////////////////////////////////
// Loading
///////////////////////////////////////////////////////////////////////////////

const KNOWN_DOCUMENT_TAGS: [&str; 18] = [
    "content-resolver-buildroot",
    "content-resolver-compose-view",
    "content-resolver-environment",
    "content-resolver-label",
    "content-resolver-repository",
    "content-resolver-unwanted",
    "content-resolver-view",
    "content-resolver-view-addon",
    "content-resolver-workload",
    "feedback-pipeline-buildroot",
    "feedback-pipeline-compose-view",
    "feedback-pipeline-environment",
    "feedback-pipeline-label",
    "feedback-pipeline-repository",
    "feedback-pipeline-unwanted",
    "feedback-pipeline-view",
    "feedback-pipeline-view-addon",
    "feedback-pipeline-workload",
];

fn tag_matches(tag: &str, suffix: &str) -> bool {
    tag == format!("content-resolver-{suffix}") || tag == format!("feedback-pipeline-{suffix}")
}

fn data_of(document: &Value) -> Result<&Value> {
    document
        .get("data")
        .ok_or_else(|| anyhow::anyhow!("missing 'data' field"))
}

fn mandatory_str(data: &Value, key: &str, file: &str) -> Result<String> {
    match data.get(key).and_then(Value::as_str) {
        Some(s) => Ok(s.to_string()),
        None => bail!("config error: '{file}' - missing mandatory field '{key}'"),
    }
}

fn str_list(value: Option<&Value>) -> Vec<String> {
    let Some(seq) = value.and_then(Value::as_sequence) else {
        return Vec::new();
    };
    seq.iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

fn mandatory_str_list(data: &Value, key: &str, file: &str) -> Result<Vec<String>> {
    if data.get(key).is_none() {
        bail!("config error: '{file}' - missing mandatory field '{key}'");
    }
    Ok(str_list(data.get(key)))
}

/// Per-arch package lists; unknown arches are logged and skipped, known
/// arches always get an entry so lookups never miss.
fn arch_str_lists(
    data: &Value,
    key: &str,
    file: &str,
    allowed_arches: &[String],
) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for arch in allowed_arches {
        out.insert(arch.clone(), Vec::new());
    }
    let Some(mapping) = data.get(key).and_then(Value::as_mapping) else {
        return out;
    };
    for (arch_value, pkgs) in mapping {
        let Some(arch) = arch_value.as_str() else {
            continue;
        };
        if !allowed_arches.iter().any(|a| a == arch) {
            log_progress(format!(
                "phase=configs status=unsupported-arch file={file} arch={arch}"
            ));
            continue;
        }
        out.insert(arch.to_string(), str_list(Some(pkgs)));
    }
    out
}

fn options_subset(data: &Value, accepted: &[&str]) -> Vec<String> {
    let listed = str_list(data.get("options"));
    accepted
        .iter()
        .filter(|accepted_option| listed.iter().any(|o| o == *accepted_option))
        .map(|o| o.to_string())
        .collect()
}

fn load_config_repo_v2(
    document_id: &str,
    document: &Value,
    settings: &Settings,
) -> Result<RepoConfig> {
    let data = data_of(document)
        .with_context(|| format!("config error: '{document_id}' - missing 'data'"))?;

    let mut config = RepoConfig {
        id: document_id.to_string(),
        name: mandatory_str(data, "name", document_id)?,
        description: mandatory_str(data, "description", document_id)?,
        maintainer: mandatory_str(data, "maintainer", document_id)?,
        ..RepoConfig::default()
    };

    let Some(source) = data.get("source") else {
        bail!("config error: '{document_id}' - missing mandatory field 'source'");
    };

    config.source.releasever = mandatory_str(source, "releasever", document_id)?;

    for arch in str_list(source.get("architectures")) {
        if !settings.allowed_arches.iter().any(|a| *a == arch) {
            log_progress(format!(
                "phase=configs status=unsupported-arch file={document_id} arch={arch}"
            ));
            continue;
        }
        config.source.architectures.push(arch);
    }

    let Some(repos) = source.get("repos").and_then(Value::as_mapping) else {
        bail!("config error: '{document_id}' - missing mandatory field 'source.repos'");
    };
    for (repo_id_value, repo_data) in repos {
        let Some(repo_id) = repo_id_value.as_str() else {
            continue;
        };
        let Some(baseurl) = repo_data.get("baseurl").and_then(Value::as_str) else {
            bail!("config error: '{document_id}' - repo '{repo_id}' doesn't list baseurl");
        };
        let child = RepoChildRepo {
            id: repo_id.to_string(),
            name: repo_data
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(repo_id)
                .to_string(),
            baseurl: baseurl.to_string(),
            priority: repo_data
                .get("priority")
                .and_then(Value::as_u64)
                .unwrap_or(100) as u32,
            exclude: repo_data
                .get("exclude")
                .and_then(Value::as_str)
                .map(str::to_string),
            limit_arches: repo_data
                .get("limit_arches")
                .and_then(Value::as_sequence)
                .map(|_| str_list(repo_data.get("limit_arches"))),
            koji_api_url: repo_data
                .get("koji_api_url")
                .and_then(Value::as_str)
                .map(str::to_string),
            koji_files_url: repo_data
                .get("koji_files_url")
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        config.source.repos.insert(repo_id.to_string(), child);
    }

    config.source.composeinfo = source
        .get("composeinfo")
        .and_then(Value::as_str)
        .map(str::to_string);
    config.source.base_buildroot_override = str_list(source.get("base_buildroot_override"));

    Ok(config)
}

fn load_config_env(document_id: &str, document: &Value, settings: &Settings) -> Result<EnvConfig> {
    let data = data_of(document)
        .with_context(|| format!("config error: '{document_id}' - missing 'data'"))?;

    Ok(EnvConfig {
        id: document_id.to_string(),
        name: mandatory_str(data, "name", document_id)?,
        description: mandatory_str(data, "description", document_id)?,
        maintainer: mandatory_str(data, "maintainer", document_id)?,
        repositories: mandatory_str_list(data, "repositories", document_id)?,
        packages: mandatory_str_list(data, "packages", document_id)?,
        labels: mandatory_str_list(data, "labels", document_id)?,
        arch_packages: arch_str_lists(data, "arch_packages", document_id, &settings.allowed_arches),
        options: options_subset(data, &["include-docs", "include-weak-deps"]),
        groups: str_list(data.get("groups")),
    })
}

fn load_config_workload(
    document_id: &str,
    document: &Value,
    settings: &Settings,
) -> Result<WorkloadConfig> {
    let data = data_of(document)
        .with_context(|| format!("config error: '{document_id}' - missing 'data'"))?;

    if let Some(mapping) = data.as_mapping() {
        for key_value in mapping.keys() {
            let Some(key) = key_value.as_str() else {
                continue;
            };
            if ![
                "arch_packages",
                "description",
                "groups",
                "labels",
                "maintainer",
                "name",
                "options",
                "package_placeholders",
                "packages",
            ]
            .contains(&key)
            {
                bail!("config error: '{document_id}' - unknown key '{key}' in 'data'");
            }
        }
    }

    let mut config = WorkloadConfig {
        id: document_id.to_string(),
        name: mandatory_str(data, "name", document_id)?,
        description: mandatory_str(data, "description", document_id)?,
        maintainer: mandatory_str(data, "maintainer", document_id)?,
        labels: mandatory_str_list(data, "labels", document_id)?,
        packages: str_list(data.get("packages")),
        arch_packages: arch_str_lists(data, "arch_packages", document_id, &settings.allowed_arches),
        options: options_subset(data, &["include-docs", "include-weak-deps", "strict"]),
        groups: str_list(data.get("groups")),
        ..WorkloadConfig::default()
    };

    if let Some(placeholders) = data.get("package_placeholders").and_then(Value::as_sequence) {
        for srpm in placeholders {
            let Some(srpm_name) = srpm.get("srpm_name").and_then(Value::as_str) else {
                continue;
            };
            if srpm_name.is_empty() {
                continue;
            }

            let build_dependencies = str_list(srpm.get("build_dependencies"));
            let limit_arches = str_list(srpm.get("limit_arches"));
            let mut all_rpm_arches: BTreeSet<String> = BTreeSet::new();

            if let Some(rpms) = srpm.get("rpms").and_then(Value::as_sequence) {
                for rpm in rpms {
                    let Some(rpm_name) = rpm.get("rpm_name").and_then(Value::as_str) else {
                        continue;
                    };
                    let description = rpm
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("Description not provided.")
                        .to_string();
                    let dependencies = str_list(rpm.get("dependencies"));
                    let mut rpm_limit_arches = str_list(rpm.get("limit_arches"));

                    if !limit_arches.is_empty() && !rpm_limit_arches.is_empty() {
                        rpm_limit_arches.retain(|arch| limit_arches.contains(arch));
                    } else if !limit_arches.is_empty() {
                        rpm_limit_arches = limit_arches.clone();
                    }
                    all_rpm_arches.extend(rpm_limit_arches.iter().cloned());

                    config.package_placeholders.pkgs.insert(
                        rpm_name.to_string(),
                        PlaceholderPkg {
                            name: rpm_name.to_string(),
                            description,
                            requires: dependencies,
                            limit_arches: rpm_limit_arches,
                            srpm: srpm_name.to_string(),
                        },
                    );
                }
            }

            let srpm_limit_arches = if limit_arches.is_empty() && !all_rpm_arches.is_empty() {
                all_rpm_arches.into_iter().collect()
            } else {
                limit_arches
            };

            config.package_placeholders.srpms.insert(
                srpm_name.to_string(),
                PlaceholderSrpm {
                    name: srpm_name.to_string(),
                    buildrequires: build_dependencies,
                    limit_arches: srpm_limit_arches,
                },
            );
        }
    }

    Ok(config)
}

fn load_config_label(document_id: &str, document: &Value) -> Result<LabelConfig> {
    let data = data_of(document)
        .with_context(|| format!("config error: '{document_id}' - missing 'data'"))?;
    Ok(LabelConfig {
        id: document_id.to_string(),
        name: mandatory_str(data, "name", document_id)?,
        description: mandatory_str(data, "description", document_id)?,
        maintainer: mandatory_str(data, "maintainer", document_id)?,
    })
}

fn load_config_view(
    document_id: &str,
    document: &Value,
    settings: &Settings,
    view_type: ViewType,
) -> Result<ViewConfig> {
    let data = data_of(document)
        .with_context(|| format!("config error: '{document_id}' - missing 'data'"))?;

    let mut config = ViewConfig {
        id: document_id.to_string(),
        view_type,
        name: mandatory_str(data, "name", document_id)?,
        description: mandatory_str(data, "description", document_id)?,
        maintainer: mandatory_str(data, "maintainer", document_id)?,
        labels: mandatory_str_list(data, "labels", document_id)?,
        repository: mandatory_str(data, "repository", document_id)?,
        ..ViewConfig::default()
    };

    config.architectures = str_list(data.get("architectures"));

    if view_type == ViewType::Addon {
        config.base_view_id = Some(mandatory_str(data, "base_view_id", document_id)?);
    } else {
        if let Some("root_logs") = data.get("buildroot_strategy").and_then(Value::as_str) {
            config.buildroot_strategy = BuildrootStrategy::RootLogs;
        }
        if config.architectures.is_empty() {
            config.architectures = settings.allowed_arches.clone();
        }
    }

    config.unwanted_packages = str_list(data.get("unwanted_packages"));
    config.unwanted_arch_packages = arch_str_lists(
        data,
        "unwanted_arch_packages",
        document_id,
        &settings.allowed_arches,
    );
    config.unwanted_source_packages = str_list(data.get("unwanted_source_packages"));

    Ok(config)
}

fn load_config_unwanted(
    document_id: &str,
    document: &Value,
    settings: &Settings,
) -> Result<UnwantedConfig> {
    let data = data_of(document)
        .with_context(|| format!("config error: '{document_id}' - missing 'data'"))?;

    if let Some(mapping) = data.as_mapping() {
        for key_value in mapping.keys() {
            let Some(key) = key_value.as_str() else {
                continue;
            };
            if ![
                "description",
                "labels",
                "maintainer",
                "name",
                "unwanted_arch_packages",
                "unwanted_arch_source_packages",
                "unwanted_packages",
                "unwanted_source_packages",
            ]
            .contains(&key)
            {
                bail!("config error: '{document_id}' - unknown key '{key}' in 'data'");
            }
        }
    }

    Ok(UnwantedConfig {
        id: document_id.to_string(),
        name: mandatory_str(data, "name", document_id)?,
        description: mandatory_str(data, "description", document_id)?,
        maintainer: mandatory_str(data, "maintainer", document_id)?,
        labels: mandatory_str_list(data, "labels", document_id)?,
        unwanted_packages: str_list(data.get("unwanted_packages")),
        unwanted_arch_packages: arch_str_lists(
            data,
            "unwanted_arch_packages",
            document_id,
            &settings.allowed_arches,
        ),
        unwanted_source_packages: str_list(data.get("unwanted_source_packages")),
        unwanted_arch_source_packages: arch_str_lists(
            data,
            "unwanted_arch_source_packages",
            document_id,
            &settings.allowed_arches,
        ),
    })
}

fn load_config_buildroot(
    document_id: &str,
    document: &Value,
    settings: &Settings,
) -> Result<BuildrootLegacyConfig> {
    let data = data_of(document)
        .with_context(|| format!("config error: '{document_id}' - missing 'data'"))?;

    let mut config = BuildrootLegacyConfig {
        id: document_id.to_string(),
        maintainer: mandatory_str(data, "maintainer", document_id)?,
        view_id: mandatory_str(data, "view_id", document_id)?,
        base_buildroot: arch_str_lists(data, "base_buildroot", document_id, &settings.allowed_arches),
        ..BuildrootLegacyConfig::default()
    };

    for arch in &settings.allowed_arches {
        config.source_packages.insert(arch.clone(), BTreeMap::new());
    }
    if let Some(source_packages) = data.get("source_packages").and_then(Value::as_mapping) {
        for (arch_value, srpms) in source_packages {
            let Some(arch) = arch_value.as_str() else {
                continue;
            };
            if !settings.allowed_arches.iter().any(|a| a == arch) {
                log_progress(format!(
                    "phase=configs status=unsupported-arch file={document_id} arch={arch}"
                ));
                continue;
            }
            let Some(srpms) = srpms.as_mapping() else {
                continue;
            };
            for (srpm_name_value, srpm_data) in srpms {
                let Some(srpm_name) = srpm_name_value.as_str() else {
                    continue;
                };
                let requires = str_list(srpm_data.get("requires"));
                if let Some(per_arch) = config.source_packages.get_mut(arch) {
                    per_arch.insert(srpm_name.to_string(), requires);
                }
            }
        }
    }

    Ok(config)
}

fn load_json_buildroot_pkg_relations(
    document_id: &str,
    document: &serde_json::Value,
    settings: &Settings,
) -> Result<BuildrootPkgRelationsDoc> {
    let Some(data) = document.get("data") else {
        bail!("config error: '{document_id}' - missing 'data'");
    };

    let Some(view_id) = data.get("view_id").and_then(serde_json::Value::as_str) else {
        bail!("config error: '{document_id}' - missing mandatory field 'view_id'");
    };
    let Some(arch) = data.get("arch").and_then(serde_json::Value::as_str) else {
        bail!("config error: '{document_id}' - missing mandatory field 'arch'");
    };
    if !settings.allowed_arches.iter().any(|a| a == arch) {
        bail!("config error: '{document_id}' - lists an unsupported architecture: {arch}");
    }

    let mut pkg_relations = BTreeMap::new();
    if let Some(pkgs) = data.get("pkgs").and_then(serde_json::Value::as_object) {
        for (nevra, relation) in pkgs {
            let source_name = relation
                .get("source_name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            let required_by = relation
                .get("required_by")
                .and_then(serde_json::Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(serde_json::Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            pkg_relations.insert(
                nevra.clone(),
                LegacyPkgRelation {
                    source_name,
                    required_by,
                },
            );
        }
    }

    Ok(BuildrootPkgRelationsDoc {
        id: document_id.to_string(),
        view_id: view_id.to_string(),
        arch: arch.to_string(),
        pkg_relations,
    })
}

/// Loads and validates every config document in the configs directory.
pub fn get_configs(settings: &Settings) -> Result<Configs> {
    settings.validate()?;

    let mut configs = Configs::default();
    let mut serious_error_messages: BTreeSet<String> = BTreeSet::new();

    log_progress("phase=configs status=loading-yaml");

    let mut entries: Vec<PathBuf> = fs::read_dir(&settings.configs_dir)
        .with_context(|| {
            format!(
                "reading configs directory {}",
                settings.configs_dir.display()
            )
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in &entries {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(document_id) = file_name.strip_suffix(".yaml") else {
            continue;
        };

        match load_yaml_document(path, document_id, settings, &mut configs) {
            Ok(()) => {}
            Err(err) => {
                serious_error_messages.insert(format!("{err:#}"));
            }
        }
    }

    report_config_errors(&serious_error_messages, settings)?;

    log_progress("phase=configs status=loading-json");
    let mut serious_error_messages: BTreeSet<String> = BTreeSet::new();

    for path in &entries {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(document_id) = file_name.strip_suffix(".json") else {
            continue;
        };

        match load_json_document(path, document_id, settings, &mut configs) {
            Ok(()) => {}
            Err(err) => {
                serious_error_messages.insert(format!("{err:#}"));
            }
        }
    }

    report_config_errors(&serious_error_messages, settings)?;

    cross_validate(&mut configs, settings);

    log_progress(format!(
        "phase=configs status=loaded repos={} envs={} workloads={} views={} unwanteds={} buildroots={} buildroot_pkg_relations={}",
        configs.repos.len(),
        configs.envs.len(),
        configs.workloads.len(),
        configs.views.len(),
        configs.unwanteds.len(),
        configs.buildroots.len(),
        configs.buildroot_pkg_relations.len(),
    ));

    Ok(configs)
}

fn load_yaml_document(
    path: &Path,
    document_id: &str,
    settings: &Settings,
    configs: &mut Configs,
) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("config error: reading '{}'", path.display()))?;
    let document: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("config error: '{document_id}' - invalid YAML"))?;

    let Some(tag) = document.get("document").and_then(Value::as_str) else {
        bail!("config error: '{document_id}' - doesn't specify the 'document' field");
    };
    if document.get("version").is_none() {
        bail!("config error: '{document_id}' - doesn't specify the 'version' field");
    }

    if !KNOWN_DOCUMENT_TAGS.contains(&tag) {
        bail!("config error: '{document_id}' - unknown document type: {tag}");
    }

    if tag_matches(tag, "repository") {
        let version = document.get("version").and_then(Value::as_u64).unwrap_or(0);
        if version != 2 {
            bail!("config error: '{document_id}' - repo v{version} is not supported, use v2");
        }
        let config = load_config_repo_v2(document_id, &document, settings)?;
        configs.repos.insert(document_id.to_string(), config);
    } else if tag_matches(tag, "environment") {
        let config = load_config_env(document_id, &document, settings)?;
        configs.envs.insert(document_id.to_string(), config);
    } else if tag_matches(tag, "workload") {
        let config = load_config_workload(document_id, &document, settings)?;
        configs.workloads.insert(document_id.to_string(), config);
    } else if tag_matches(tag, "label") {
        let config = load_config_label(document_id, &document)?;
        configs.labels.insert(document_id.to_string(), config);
    } else if tag_matches(tag, "view") || tag_matches(tag, "compose-view") {
        let config = load_config_view(document_id, &document, settings, ViewType::Compose)?;
        configs.views.insert(document_id.to_string(), config);
    } else if tag_matches(tag, "view-addon") {
        let config = load_config_view(document_id, &document, settings, ViewType::Addon)?;
        configs.views.insert(document_id.to_string(), config);
    } else if tag_matches(tag, "unwanted") {
        let config = load_config_unwanted(document_id, &document, settings)?;
        configs.unwanteds.insert(document_id.to_string(), config);
    } else if tag_matches(tag, "buildroot") {
        let config = load_config_buildroot(document_id, &document, settings)?;
        configs.buildroots.insert(document_id.to_string(), config);
    }

    Ok(())
}

fn load_json_document(
    path: &Path,
    document_id: &str,
    settings: &Settings,
    configs: &mut Configs,
) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("config error: reading '{}'", path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("config error: '{document_id}' - invalid JSON"))?;

    let Some(document_type) = document
        .get("document_type")
        .and_then(serde_json::Value::as_str)
    else {
        bail!("config error: '{document_id}' - doesn't specify the 'document_type' field");
    };
    if document.get("version").is_none() {
        bail!("config error: '{document_id}' - doesn't specify the 'version' field");
    }

    if document_type == "buildroot-binary-relations" {
        let config = load_json_buildroot_pkg_relations(document_id, &document, settings)?;
        configs
            .buildroot_pkg_relations
            .insert(document_id.to_string(), config);
    }

    Ok(())
}

fn report_config_errors(messages: &BTreeSet<String>, settings: &Settings) -> Result<()> {
    if messages.is_empty() {
        return Ok(());
    }
    for message in messages {
        log_progress(format!(
            "phase=configs status=error detail={}",
            crate::progress::compact_reason(message, 400)
        ));
    }
    if settings.strict {
        bail!("config error: config file errors encountered in strict mode");
    }
    Ok(())
}

/// Cross-document validation. Invalid views are removed, view architecture
/// lists are trimmed to what their repository (or base view) supports.
fn cross_validate(configs: &mut Configs, settings: &Settings) {
    // Views referencing non-existing repos
    let bad_view_ids: Vec<String> = configs
        .views
        .iter()
        .filter(|(_, view)| {
            view.view_type == ViewType::Compose && !configs.repos.contains_key(&view.repository)
        })
        .map(|(id, _)| id.clone())
        .collect();
    for view_id in bad_view_ids {
        log_progress(format!(
            "phase=configs status=removing-view view={view_id} reason=non-existing-repository"
        ));
        configs.views.remove(&view_id);
    }

    // Addon views referencing non-existing or non-compose base views
    let bad_addon_ids: Vec<String> = configs
        .views
        .iter()
        .filter(|(_, view)| {
            if view.view_type != ViewType::Addon {
                return false;
            }
            match view
                .base_view_id
                .as_ref()
                .and_then(|base_id| configs.views.get(base_id))
            {
                Some(base_view) => base_view.view_type != ViewType::Compose,
                None => true,
            }
        })
        .map(|(id, _)| id.clone())
        .collect();
    for view_id in bad_addon_ids {
        log_progress(format!(
            "phase=configs status=removing-view view={view_id} reason=invalid-base-view"
        ));
        configs.views.remove(&view_id);
    }

    // Compose view arches, trimmed to the repo's arches
    let mut compose_arches: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (view_id, view) in &configs.views {
        if view.view_type != ViewType::Compose {
            continue;
        }
        let mut arches = view.architectures.clone();
        if arches.is_empty() {
            arches = settings.allowed_arches.clone();
        }
        let repo_arches = configs
            .repos
            .get(&view.repository)
            .map(|repo| repo.source.architectures.clone())
            .unwrap_or_default();
        arches.retain(|arch| repo_arches.contains(arch));
        arches.sort();
        arches.dedup();
        compose_arches.insert(view_id.clone(), arches);
    }
    for (view_id, arches) in compose_arches {
        if let Some(view) = configs.views.get_mut(&view_id) {
            view.architectures = arches;
        }
    }

    // Addon view arches, trimmed to the base view's arches
    let mut addon_arches: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (view_id, view) in &configs.views {
        if view.view_type != ViewType::Addon {
            continue;
        }
        let mut arches = view.architectures.clone();
        if arches.is_empty() {
            arches = settings.allowed_arches.clone();
        }
        let base_arches = view
            .base_view_id
            .as_ref()
            .and_then(|base_id| configs.views.get(base_id))
            .map(|base| base.architectures.clone())
            .unwrap_or_default();
        arches.retain(|arch| base_arches.contains(arch));
        arches.sort();
        arches.dedup();
        addon_arches.insert(view_id.clone(), arches);
    }
    for (view_id, arches) in addon_arches {
        if let Some(view) = configs.views.get_mut(&view_id) {
            view.architectures = arches;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_settings(configs_dir: &Path) -> Settings {
        Settings {
            configs_dir: configs_dir.to_path_buf(),
            output_dir: PathBuf::from("/tmp/packset-test-out"),
            use_cache: false,
            dev_buildroot: false,
            dnf_cache_dir_override: None,
            solver_command: DEFAULT_SOLVER_COMMAND.to_string(),
            max_subprocesses: DEFAULT_MAX_SUBPROCESSES,
            allowed_arches: DEFAULT_ALLOWED_ARCHES
                .iter()
                .map(|a| a.to_string())
                .collect(),
            uninstallable_packages: vec!["glibc32".to_string()],
            skipped_maintainers: Vec::new(),
            root_log_deps_cache_path: PathBuf::from("cache_root_log_deps.json"),
            strict: false,
        }
    }

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = fs::File::create(dir.join(name)).expect("creating test config file");
        file.write_all(contents.as_bytes())
            .expect("writing test config file");
    }

    const REPO_YAML: &str = r#"
document: content-resolver-repository
version: 2
data:
  name: Test Repo
  description: A test repository
  maintainer: tester
  source:
    releasever: "40"
    architectures:
      - x86_64
      - aarch64
      - mips64
    repos:
      base:
        baseurl: https://example.com/repo/$basearch
        priority: 10
        koji_api_url: https://koji.example.com/kojihub
        koji_files_url: https://koji.example.com/files
      extras:
        baseurl: https://example.com/extras/$basearch
        limit_arches:
          - x86_64
"#;

    const ENV_YAML: &str = r#"
document: content-resolver-environment
version: 1
data:
  name: Minimal Env
  description: Minimal environment
  maintainer: tester
  repositories:
    - test-repo
  packages:
    - bash
  labels:
    - test-label
  options:
    - include-weak-deps
    - bogus-option
"#;

    const WORKLOAD_YAML: &str = r#"
document: content-resolver-workload
version: 1
data:
  name: Test Workload
  description: A workload
  maintainer: tester
  labels:
    - test-label
  packages:
    - nano
  arch_packages:
    x86_64:
      - grub2-pc
  options:
    - strict
  package_placeholders:
    - srpm_name: fictional
      build_dependencies:
        - gcc
      rpms:
        - rpm_name: fictional-bin
          dependencies:
            - bash
          limit_arches:
            - x86_64
"#;

    const VIEW_YAML: &str = r#"
document: content-resolver-view
version: 1
data:
  name: Test View
  description: A view
  maintainer: tester
  labels:
    - test-label
  repository: test-repo
  buildroot_strategy: root_logs
"#;

    #[test]
    fn loads_a_minimal_config_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "test-repo.yaml", REPO_YAML);
        write_file(dir.path(), "test-env.yaml", ENV_YAML);
        write_file(dir.path(), "test-workload.yaml", WORKLOAD_YAML);
        write_file(dir.path(), "test-view.yaml", VIEW_YAML);

        let settings = test_settings(dir.path());
        let configs = get_configs(&settings).expect("configs should load");

        let repo = &configs.repos["test-repo"];
        assert_eq!(repo.name, "Test Repo");
        // mips64 is not in allowed_arches and gets dropped
        assert_eq!(repo.source.architectures, vec!["x86_64", "aarch64"]);
        assert_eq!(repo.source.repos["base"].priority, 10);
        assert_eq!(repo.source.repos["extras"].priority, 100);
        assert_eq!(
            repo.source.repos["extras"].limit_arches,
            Some(vec!["x86_64".to_string()])
        );

        let env = &configs.envs["test-env"];
        assert_eq!(env.options, vec!["include-weak-deps"]);
        assert!(env.include_weak_deps());
        assert!(!env.include_docs());

        let workload = &configs.workloads["test-workload"];
        assert!(workload.strict());
        assert!(workload.requires_pkg_name("nano", "aarch64"));
        assert!(workload.requires_pkg_name("grub2-pc", "x86_64"));
        assert!(!workload.requires_pkg_name("grub2-pc", "aarch64"));
        let placeholder = &workload.package_placeholders.pkgs["fictional-bin"];
        assert_eq!(placeholder.srpm, "fictional");
        assert_eq!(placeholder.limit_arches, vec!["x86_64"]);
        // srpm inherits the union of its rpms' arches when it has none
        let srpm_placeholder = &workload.package_placeholders.srpms["fictional"];
        assert_eq!(srpm_placeholder.limit_arches, vec!["x86_64"]);

        let view = &configs.views["test-view"];
        assert_eq!(view.view_type, ViewType::Compose);
        assert!(view.wants_buildroot());
        // empty architectures default to allowed, then trim to repo arches
        assert_eq!(view.architectures, vec!["aarch64", "x86_64"]);
    }

    #[test]
    fn rejects_unknown_workload_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "bad-workload.yaml",
            r#"
document: content-resolver-workload
version: 1
data:
  name: Bad
  description: Bad
  maintainer: tester
  labels: []
  nonsense_key: true
"#,
        );
        let settings = test_settings(dir.path());
        let configs = get_configs(&settings).expect("non-strict load should succeed");
        assert!(configs.workloads.is_empty());

        let mut strict_settings = test_settings(dir.path());
        strict_settings.strict = true;
        assert!(get_configs(&strict_settings).is_err());
    }

    #[test]
    fn unknown_document_tag_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "mystery.yaml",
            "document: mystery-document\nversion: 1\ndata: {}\n",
        );
        let mut settings = test_settings(dir.path());
        settings.strict = true;
        assert!(get_configs(&settings).is_err());
    }

    #[test]
    fn addon_arches_are_limited_by_base_view() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "test-repo.yaml", REPO_YAML);
        write_file(dir.path(), "base-view.yaml", VIEW_YAML.replace("Test View", "Base").as_str());
        write_file(
            dir.path(),
            "addon-view.yaml",
            r#"
document: content-resolver-view-addon
version: 1
data:
  name: Addon
  description: An addon
  maintainer: tester
  labels:
    - addon-label
  repository: test-repo
  base_view_id: base-view
"#,
        );
        let settings = test_settings(dir.path());
        let configs = get_configs(&settings).expect("configs should load");
        let addon = &configs.views["addon-view"];
        assert_eq!(addon.view_type, ViewType::Addon);
        assert_eq!(addon.architectures, vec!["aarch64", "x86_64"]);
    }

    #[test]
    fn empty_allowed_arches_is_a_settings_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = test_settings(dir.path());
        settings.allowed_arches.clear();
        assert!(settings.validate().is_err());
    }
}
