use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

///////////////////////////////////////////////////////////////////////////////
// Identifiers
//
// Configs:
//   TYPE:           KEY:          ID:
// - repo            repos         repo_id
// - env_conf        envs          env_id
// - workload_conf   workloads     workload_id
// - view_conf       views         view_id
//
// Data:
//   TYPE:       KEY:                ID:
// - pkg         pkgs/repo_id/arch   NEVRA
// - env         envs                env_conf_id:repo_id:arch
// - workload    workloads           workload_conf_id:env_conf_id:repo_id:arch
// - view        views               view_conf_id:arch
///////////////////////////////////////////////////////////////////////////////

pub fn env_id(env_conf_id: &str, repo_id: &str, arch: &str) -> String {
    format!("{env_conf_id}:{repo_id}:{arch}")
}

pub fn workload_id(
    workload_conf_id: &str,
    env_conf_id: &str,
    repo_id: &str,
    arch: &str,
) -> String {
    format!("{workload_conf_id}:{env_conf_id}:{repo_id}:{arch}")
}

pub fn view_id(view_conf_id: &str, arch: &str) -> String {
    format!("{view_conf_id}:{arch}")
}

/// The name part of a `name-evr.arch` or `name-evr` id, i.e. everything
/// before the last two dashes.
pub fn pkg_id_to_name(pkg_id: &str) -> &str {
    let mut cut = pkg_id.len();
    let mut dashes = 0;
    for (idx, byte) in pkg_id.bytes().enumerate().rev() {
        if byte == b'-' {
            cut = idx;
            dashes += 1;
            if dashes == 2 {
                break;
            }
        }
    }
    &pkg_id[..cut]
}

pub fn workload_id_to_conf_id(workload_id: &str) -> &str {
    workload_id.split(':').next().unwrap_or(workload_id)
}

pub fn pkg_placeholder_name_to_id(placeholder_name: &str) -> String {
    format!("{placeholder_name}-000-placeholder.placeholder")
}

pub fn pkg_placeholder_name_to_nevr(placeholder_name: &str) -> String {
    format!("{placeholder_name}-000-placeholder")
}

pub fn srpm_id_from_sourcerpm(sourcerpm: &str) -> &str {
    sourcerpm.strip_suffix(".src.rpm").unwrap_or(sourcerpm)
}

/// Turns a build-service URL into a stable identifier: protocol stripped,
/// trailing slash stripped, everything non-alphanumeric replaced with `-`.
pub fn url_to_id(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let stripped = stripped.strip_suffix('/').unwrap_or(stripped);
    stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

///////////////////////////////////////////////////////////////////////////////
// Packages
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: String,
    pub name: String,
    pub evr: String,
    pub nevr: String,
    pub arch: String,
    pub installsize: u64,
    pub description: String,
    pub summary: String,
    pub source_name: String,
    pub sourcerpm: String,
    pub reponame: String,
    pub all_reponames: BTreeSet<String>,
    pub highest_priority_reponames: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PkgRelations {
    pub required_by: Vec<String>,
    pub recommended_by: Vec<String>,
    pub suggested_by: Vec<String>,
    pub source_name: String,
    pub reponame: Option<String>,
}

///////////////////////////////////////////////////////////////////////////////
// Environments and workloads
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvErrors {
    pub non_existing_pkgs: Vec<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvResult {
    pub env_conf_id: String,
    pub repo_id: String,
    pub arch: String,
    pub pkg_ids: Vec<String>,
    pub pkg_relations: BTreeMap<String, PkgRelations>,
    pub errors: EnvErrors,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadErrors {
    pub non_existing_pkgs: Vec<String>,
    pub non_existing_placeholder_deps: Vec<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadWarnings {
    pub non_existing_pkgs: Vec<String>,
    pub non_existing_placeholder_deps: Vec<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadResult {
    pub workload_conf_id: String,
    pub env_conf_id: String,
    pub repo_id: String,
    pub arch: String,
    pub pkg_env_ids: Vec<String>,
    pub pkg_added_ids: Vec<String>,
    pub pkg_placeholder_ids: Vec<String>,
    pub srpm_placeholder_names: Vec<String>,
    pub pkg_relations: BTreeMap<String, PkgRelations>,
    pub labels: Vec<String>,
    pub errors: WorkloadErrors,
    pub warnings: WorkloadWarnings,
    pub succeeded: bool,
    pub env_succeeded: bool,
}

impl WorkloadResult {
    /// Stub emitted when the backing environment failed to resolve. The
    /// workload is never submitted to the solver in that case.
    pub fn failed_env_stub(
        workload_conf_id: &str,
        env_conf_id: &str,
        repo_id: &str,
        arch: &str,
    ) -> Self {
        WorkloadResult {
            workload_conf_id: workload_conf_id.to_string(),
            env_conf_id: env_conf_id.to_string(),
            repo_id: repo_id.to_string(),
            arch: arch.to_string(),
            errors: WorkloadErrors {
                message: Some(
                    "Failed to analyze this workload because of an error while analyzing \
                     the environment. Please see the associated environment results for \
                     a detailed error message."
                        .to_string(),
                ),
                ..WorkloadErrors::default()
            },
            succeeded: false,
            env_succeeded: false,
            ..WorkloadResult::default()
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
// Views
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelSets {
    pub all: BTreeSet<String>,
    pub req: BTreeSet<String>,
    pub dep: BTreeSet<String>,
    pub env: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewPkg {
    pub id: String,
    pub name: String,
    pub evr: String,
    pub nevr: String,
    pub arch: String,
    pub installsize: u64,
    pub description: String,
    pub summary: String,
    pub source_name: String,
    pub sourcerpm: String,
    pub reponame: String,
    pub all_reponames: BTreeSet<String>,
    pub highest_priority_reponames: BTreeSet<String>,
    pub view_arch: String,
    pub placeholder: bool,

    pub in_workload_ids_all: BTreeSet<String>,
    pub in_workload_ids_req: BTreeSet<String>,
    pub in_workload_ids_dep: BTreeSet<String>,
    pub in_workload_ids_env: BTreeSet<String>,

    pub in_buildroot_of_srpm_id_all: BTreeSet<String>,
    pub in_buildroot_of_srpm_id_req: BTreeSet<String>,
    pub in_buildroot_of_srpm_id_dep: BTreeSet<String>,
    pub in_buildroot_of_srpm_id_env: BTreeSet<String>,

    pub unwanted_completely_in_list_ids: BTreeSet<String>,
    pub unwanted_buildroot_in_list_ids: BTreeSet<String>,

    // level[0] mirrors the in_workload_ids_* sets, level[1..] mirror the
    // per-level buildroot additions. Kept in sync by the add_* methods.
    pub level: Vec<LevelSets>,

    pub required_by: BTreeSet<String>,
    pub recommended_by: BTreeSet<String>,
    pub suggested_by: BTreeSet<String>,
}

impl ViewPkg {
    pub fn from_record(pkg: &PackageRecord, view_arch: &str, level: usize) -> Self {
        let mut view_pkg = ViewPkg {
            id: pkg.id.clone(),
            name: pkg.name.clone(),
            evr: pkg.evr.clone(),
            nevr: pkg.nevr.clone(),
            arch: pkg.arch.clone(),
            installsize: pkg.installsize,
            description: pkg.description.clone(),
            summary: pkg.summary.clone(),
            source_name: pkg.source_name.clone(),
            sourcerpm: pkg.sourcerpm.clone(),
            reponame: pkg.reponame.clone(),
            all_reponames: pkg.all_reponames.clone(),
            highest_priority_reponames: pkg.highest_priority_reponames.clone(),
            view_arch: view_arch.to_string(),
            placeholder: false,
            ..ViewPkg::default()
        };
        view_pkg.ensure_levels(level);
        view_pkg
    }

    pub fn placeholder(name: &str, description: &str, srpm_name: &str, view_arch: &str) -> Self {
        let mut view_pkg = ViewPkg {
            id: pkg_placeholder_name_to_id(name),
            name: name.to_string(),
            evr: "000-placeholder".to_string(),
            nevr: pkg_placeholder_name_to_nevr(name),
            arch: "placeholder".to_string(),
            installsize: 0,
            description: description.to_string(),
            summary: description.to_string(),
            source_name: srpm_name.to_string(),
            sourcerpm: format!("{srpm_name}-000-placeholder"),
            reponame: "n/a".to_string(),
            view_arch: view_arch.to_string(),
            placeholder: true,
            ..ViewPkg::default()
        };
        view_pkg.ensure_levels(0);
        view_pkg
    }

    /// Makes sure `level[0..=level]` exist.
    pub fn ensure_levels(&mut self, level: usize) {
        while self.level.len() <= level {
            self.level.push(LevelSets::default());
        }
    }

    pub fn add_workload_all(&mut self, workload_id: &str) {
        self.in_workload_ids_all.insert(workload_id.to_string());
        self.level[0].all.insert(workload_id.to_string());
    }

    pub fn add_workload_req(&mut self, workload_id: &str) {
        self.in_workload_ids_req.insert(workload_id.to_string());
        self.level[0].req.insert(workload_id.to_string());
    }

    pub fn add_workload_dep(&mut self, workload_id: &str) {
        self.in_workload_ids_dep.insert(workload_id.to_string());
        self.level[0].dep.insert(workload_id.to_string());
    }

    pub fn add_workload_env(&mut self, workload_id: &str) {
        self.in_workload_ids_env.insert(workload_id.to_string());
        self.level[0].env.insert(workload_id.to_string());
    }

    pub fn add_buildroot_all(&mut self, srpm_id: &str, level: usize) {
        self.ensure_levels(level);
        self.in_buildroot_of_srpm_id_all.insert(srpm_id.to_string());
        self.level[level].all.insert(srpm_id.to_string());
    }

    pub fn add_buildroot_req(&mut self, srpm_id: &str, level: usize) {
        self.ensure_levels(level);
        self.in_buildroot_of_srpm_id_req.insert(srpm_id.to_string());
        self.level[level].req.insert(srpm_id.to_string());
    }

    pub fn add_buildroot_dep(&mut self, srpm_id: &str, level: usize) {
        self.ensure_levels(level);
        self.in_buildroot_of_srpm_id_dep.insert(srpm_id.to_string());
        self.level[level].dep.insert(srpm_id.to_string());
    }

    pub fn add_buildroot_env(&mut self, srpm_id: &str, level: usize) {
        self.ensure_levels(level);
        self.in_buildroot_of_srpm_id_env.insert(srpm_id.to_string());
        self.level[level].env.insert(srpm_id.to_string());
    }

    pub fn add_relations(&mut self, relations: &PkgRelations) {
        self.required_by
            .extend(relations.required_by.iter().cloned());
        self.recommended_by
            .extend(relations.recommended_by.iter().cloned());
        self.suggested_by
            .extend(relations.suggested_by.iter().cloned());
    }

    pub fn srpm_id(&self) -> String {
        srpm_id_from_sourcerpm(&self.sourcerpm).to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewSrpm {
    pub id: String,
    pub name: String,
    pub reponame: Option<String>,
    pub pkg_ids: BTreeSet<String>,
    pub placeholder: bool,
    pub placeholder_directly_required_pkg_names: Vec<String>,

    pub in_workload_ids_all: BTreeSet<String>,
    pub in_workload_ids_req: BTreeSet<String>,
    pub in_workload_ids_dep: BTreeSet<String>,
    pub in_workload_ids_env: BTreeSet<String>,

    pub in_buildroot_of_srpm_id_all: BTreeSet<String>,
    pub in_buildroot_of_srpm_id_req: BTreeSet<String>,
    pub in_buildroot_of_srpm_id_dep: BTreeSet<String>,
    pub in_buildroot_of_srpm_id_env: BTreeSet<String>,

    pub unwanted_completely_in_list_ids: BTreeSet<String>,
    pub unwanted_buildroot_in_list_ids: BTreeSet<String>,

    pub level: Vec<LevelSets>,
}

impl ViewSrpm {
    pub fn from_pkg(pkg: &ViewPkg, level: usize) -> Self {
        let mut srpm = ViewSrpm {
            id: pkg.srpm_id(),
            name: pkg.source_name.clone(),
            reponame: if pkg.reponame == "n/a" {
                None
            } else {
                Some(pkg.reponame.clone())
            },
            placeholder: false,
            ..ViewSrpm::default()
        };
        srpm.ensure_levels(level);
        srpm
    }

    pub fn placeholder(srpm_name: &str) -> Self {
        let mut srpm = ViewSrpm {
            id: pkg_placeholder_name_to_nevr(srpm_name),
            name: srpm_name.to_string(),
            reponame: None,
            placeholder: true,
            ..ViewSrpm::default()
        };
        srpm.ensure_levels(0);
        srpm
    }

    pub fn ensure_levels(&mut self, level: usize) {
        while self.level.len() <= level {
            self.level.push(LevelSets::default());
        }
    }

    /// Folds one of its binary packages' workload sets into this source
    /// entry (runtime assembly only, so level 0).
    pub fn absorb_pkg_workloads(&mut self, pkg: &ViewPkg) {
        self.pkg_ids.insert(pkg.id.clone());
        for id in &pkg.in_workload_ids_all {
            self.in_workload_ids_all.insert(id.clone());
            self.level[0].all.insert(id.clone());
        }
        for id in &pkg.in_workload_ids_req {
            self.in_workload_ids_req.insert(id.clone());
            self.level[0].req.insert(id.clone());
        }
        for id in &pkg.in_workload_ids_dep {
            self.in_workload_ids_dep.insert(id.clone());
            self.level[0].dep.insert(id.clone());
        }
        for id in &pkg.in_workload_ids_env {
            self.in_workload_ids_env.insert(id.clone());
            self.level[0].env.insert(id.clone());
        }
    }

    /// Folds one of its binary packages' buildroot sets for one level into
    /// this source entry.
    pub fn absorb_pkg_buildroot(&mut self, pkg: &ViewPkg, level: usize) {
        self.ensure_levels(level);
        self.pkg_ids.insert(pkg.id.clone());
        self.in_buildroot_of_srpm_id_all
            .extend(pkg.in_buildroot_of_srpm_id_all.iter().cloned());
        self.in_buildroot_of_srpm_id_req
            .extend(pkg.in_buildroot_of_srpm_id_req.iter().cloned());
        self.in_buildroot_of_srpm_id_dep
            .extend(pkg.in_buildroot_of_srpm_id_dep.iter().cloned());
        self.in_buildroot_of_srpm_id_env
            .extend(pkg.in_buildroot_of_srpm_id_env.iter().cloned());
        if let Some(pkg_level) = pkg.level.get(level) {
            self.level[level].all.extend(pkg_level.all.iter().cloned());
            self.level[level].req.extend(pkg_level.req.iter().cloned());
            self.level[level].dep.extend(pkg_level.dep.iter().cloned());
            self.level[level].env.extend(pkg_level.env.iter().cloned());
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    pub view_conf_id: String,
    pub arch: String,
    pub workload_ids: Vec<String>,
    pub pkgs: BTreeMap<String, ViewPkg>,
    pub source_pkgs: BTreeMap<String, ViewSrpm>,
}

///////////////////////////////////////////////////////////////////////////////
// Buildroot
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KojiUrls {
    pub api: String,
    pub files: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KojiSrpm {
    pub id: String,
    pub directly_required_pkg_names: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildrootSrpm {
    pub id: String,
    pub koji_id: Option<String>,
    pub directly_required_pkg_names: BTreeSet<String>,
    pub pkg_relations: BTreeMap<String, PkgRelations>,
    pub pkg_env_ids: BTreeSet<String>,
    pub pkg_added_ids: BTreeSet<String>,
    pub errors: WorkloadErrors,
    pub warnings: WorkloadWarnings,
    pub succeeded: bool,
    pub queued: bool,
    pub processed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildGroup {
    pub generated_id: String,
    pub env: EnvResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildrootData {
    /// koji_id -> arch -> srpm_id
    pub koji_srpms: BTreeMap<String, BTreeMap<String, BTreeMap<String, KojiSrpm>>>,
    pub koji_urls: BTreeMap<String, KojiUrls>,
    /// repo_id -> arch -> srpm_id
    pub srpms: BTreeMap<String, BTreeMap<String, BTreeMap<String, BuildrootSrpm>>>,
    /// repo_id -> arch
    pub build_groups: BTreeMap<String, BTreeMap<String, BuildGroup>>,
}

///////////////////////////////////////////////////////////////////////////////
// Cross-arch aggregation
///////////////////////////////////////////////////////////////////////////////

pub type Score = (u32, u32);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintainerDetail {
    pub reasons: BTreeSet<(String, String, String)>,
    pub locations: BTreeSet<String>,
}

pub type MaintainerRecommendation = BTreeMap<String, BTreeSet<Score>>;
pub type MaintainerRecommendationDetails =
    BTreeMap<u32, BTreeMap<u32, BTreeMap<String, MaintainerDetail>>>;

pub const LEVEL_NUMBER_UNSET: u32 = 999;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationsRollup {
    pub in_workload_ids_all: BTreeSet<String>,
    pub in_workload_ids_req: BTreeSet<String>,
    pub in_workload_ids_dep: BTreeSet<String>,
    pub in_workload_ids_env: BTreeSet<String>,

    pub in_workload_conf_ids_all: BTreeSet<String>,
    pub in_workload_conf_ids_req: BTreeSet<String>,
    pub in_workload_conf_ids_dep: BTreeSet<String>,
    pub in_workload_conf_ids_env: BTreeSet<String>,

    pub in_buildroot_of_srpm_id_all: BTreeSet<String>,
    pub in_buildroot_of_srpm_id_req: BTreeSet<String>,
    pub in_buildroot_of_srpm_id_dep: BTreeSet<String>,
    pub in_buildroot_of_srpm_id_env: BTreeSet<String>,

    pub in_buildroot_of_srpm_name_all: BTreeMap<String, BTreeSet<String>>,
    pub in_buildroot_of_srpm_name_req: BTreeMap<String, BTreeSet<String>>,
    pub in_buildroot_of_srpm_name_dep: BTreeMap<String, BTreeSet<String>>,
    pub in_buildroot_of_srpm_name_env: BTreeMap<String, BTreeSet<String>>,

    pub unwanted_completely_in_list_ids: BTreeSet<String>,
    pub unwanted_buildroot_in_list_ids: BTreeSet<String>,

    pub level_number: u32,
    pub level: Vec<LevelSets>,

    pub maintainer_recommendation: MaintainerRecommendation,
    pub maintainer_recommendation_details: MaintainerRecommendationDetails,
    pub best_maintainers: BTreeSet<String>,
}

impl Default for RelationsRollup {
    fn default() -> Self {
        RelationsRollup {
            in_workload_ids_all: BTreeSet::new(),
            in_workload_ids_req: BTreeSet::new(),
            in_workload_ids_dep: BTreeSet::new(),
            in_workload_ids_env: BTreeSet::new(),
            in_workload_conf_ids_all: BTreeSet::new(),
            in_workload_conf_ids_req: BTreeSet::new(),
            in_workload_conf_ids_dep: BTreeSet::new(),
            in_workload_conf_ids_env: BTreeSet::new(),
            in_buildroot_of_srpm_id_all: BTreeSet::new(),
            in_buildroot_of_srpm_id_req: BTreeSet::new(),
            in_buildroot_of_srpm_id_dep: BTreeSet::new(),
            in_buildroot_of_srpm_id_env: BTreeSet::new(),
            in_buildroot_of_srpm_name_all: BTreeMap::new(),
            in_buildroot_of_srpm_name_req: BTreeMap::new(),
            in_buildroot_of_srpm_name_dep: BTreeMap::new(),
            in_buildroot_of_srpm_name_env: BTreeMap::new(),
            unwanted_completely_in_list_ids: BTreeSet::new(),
            unwanted_buildroot_in_list_ids: BTreeSet::new(),
            level_number: LEVEL_NUMBER_UNSET,
            level: Vec::new(),
            maintainer_recommendation: BTreeMap::new(),
            maintainer_recommendation_details: BTreeMap::new(),
            best_maintainers: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyOfRollup {
    pub dependency_of_pkg_nevrs: BTreeSet<String>,
    pub hard_dependency_of_pkg_nevrs: BTreeSet<String>,
    pub weak_dependency_of_pkg_nevrs: BTreeSet<String>,
    pub dependency_of_pkg_names: BTreeMap<String, BTreeSet<String>>,
    pub hard_dependency_of_pkg_names: BTreeMap<String, BTreeSet<String>>,
    pub weak_dependency_of_pkg_names: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "env")]
    Env,
    #[serde(rename = "req")]
    Req,
    #[serde(rename = "dep")]
    Dep,
    #[serde(rename = "build_base")]
    BuildBase,
    #[serde(rename = "build_level_1")]
    BuildLevel1,
    #[serde(rename = "build_level_2_plus")]
    BuildLevel2Plus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PkgByName {
    pub name: String,
    pub placeholder: bool,
    pub source_name: String,
    /// nevr -> arches it exists on
    pub nevrs: BTreeMap<String, BTreeSet<String>>,
    pub arches: BTreeSet<String>,
    pub highest_priority_reponames_per_arch: BTreeMap<String, BTreeSet<String>>,
    pub rollup: RelationsRollup,
    pub dependants: DependencyOfRollup,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PkgByNevr {
    pub name: String,
    pub placeholder: bool,
    pub evr: String,
    pub source_name: String,
    pub arches: BTreeSet<String>,
    /// basearch -> set of package arches (e.g. x86_64 -> {x86_64, i686})
    pub arches_arches: BTreeMap<String, BTreeSet<String>>,
    pub reponame_per_arch: BTreeMap<String, String>,
    pub highest_priority_reponames_per_arch: BTreeMap<String, BTreeSet<String>>,
    pub category: Option<Category>,
    pub rollup: RelationsRollup,
    pub dependants: DependencyOfRollup,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SrpmByName {
    pub name: String,
    pub placeholder: bool,
    pub buildroot_succeeded: bool,
    pub buildroot_no_warnings: bool,
    pub errors: BTreeMap<String, WorkloadErrors>,
    pub warnings: BTreeMap<String, WorkloadWarnings>,
    pub pkg_names: BTreeSet<String>,
    pub pkg_nevrs: BTreeSet<String>,
    pub arches: BTreeSet<String>,
    pub category: Option<Category>,
    pub rollup: RelationsRollup,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadRollup {
    pub workload_conf_id: String,
    pub name: String,
    pub maintainer: String,
    pub succeeded: bool,
    pub no_warnings: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryNumbers {
    pub runtime: u64,
    pub env: u64,
    pub req: u64,
    pub dep: u64,
    pub build: u64,
    pub build_base: u64,
    pub build_level_1: u64,
    pub build_level_2_plus: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewNumbers {
    pub pkgs: CategoryNumbers,
    pub srpms: CategoryNumbers,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewAllArches {
    pub id: String,
    pub has_buildroot: bool,
    pub everything_succeeded: bool,
    pub no_warnings: bool,
    pub workloads: BTreeMap<String, WorkloadRollup>,
    pub pkgs_by_name: BTreeMap<String, PkgByName>,
    pub pkgs_by_nevr: BTreeMap<String, PkgByNevr>,
    pub source_pkgs_by_name: BTreeMap<String, SrpmByName>,
    pub numbers: ViewNumbers,
}

///////////////////////////////////////////////////////////////////////////////
// The whole analyzed data set
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoData {
    pub compose_date: Option<String>,
    pub compose_days_ago: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzedData {
    /// repo_id -> arch -> nevra
    pub pkgs: BTreeMap<String, BTreeMap<String, BTreeMap<String, PackageRecord>>>,
    pub repos: BTreeMap<String, RepoData>,
    pub envs: BTreeMap<String, EnvResult>,
    pub workloads: BTreeMap<String, WorkloadResult>,
    pub views: BTreeMap<String, View>,
    pub buildroot: BuildrootData,
    pub views_all_arches: BTreeMap<String, ViewAllArches>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkg_id_to_name_strips_evr_and_arch() {
        assert_eq!(pkg_id_to_name("bash-5.2.26-3.fc40.x86_64"), "bash");
        assert_eq!(pkg_id_to_name("bash-5.2.26-3.fc40"), "bash");
        assert_eq!(pkg_id_to_name("glibc-all-langpacks-2.38-1"), "glibc-all-langpacks");
        assert_eq!(pkg_id_to_name("nodashes"), "nodashes");
        assert_eq!(pkg_id_to_name("one-dash"), "one");
    }

    #[test]
    fn placeholder_ids_are_stable() {
        assert_eq!(
            pkg_placeholder_name_to_id("mytool"),
            "mytool-000-placeholder.placeholder"
        );
        assert_eq!(pkg_placeholder_name_to_nevr("mytool"), "mytool-000-placeholder");
    }

    #[test]
    fn srpm_id_strips_src_rpm_suffix() {
        assert_eq!(srpm_id_from_sourcerpm("bash-5.2.26-3.fc40.src.rpm"), "bash-5.2.26-3.fc40");
        assert_eq!(srpm_id_from_sourcerpm("mytool-000-placeholder"), "mytool-000-placeholder");
    }

    #[test]
    fn url_to_id_normalizes() {
        assert_eq!(
            url_to_id("https://koji.fedoraproject.org/kojihub/"),
            "koji-fedoraproject-org-kojihub"
        );
        assert_eq!(url_to_id("http://example.com"), "example-com");
    }

    #[test]
    fn view_pkg_levels_stay_in_sync_with_aggregates() {
        let record = PackageRecord {
            id: "bash-5.2-1.x86_64".to_string(),
            name: "bash".to_string(),
            evr: "5.2-1".to_string(),
            nevr: "bash-5.2-1".to_string(),
            arch: "x86_64".to_string(),
            sourcerpm: "bash-5.2-1.src.rpm".to_string(),
            source_name: "bash".to_string(),
            ..PackageRecord::default()
        };
        let mut pkg = ViewPkg::from_record(&record, "x86_64", 0);
        pkg.add_workload_all("w:e:r:x86_64");
        pkg.add_workload_req("w:e:r:x86_64");
        assert!(pkg.level[0].all.contains("w:e:r:x86_64"));
        assert!(pkg.level[0].req.contains("w:e:r:x86_64"));

        pkg.add_buildroot_all("gcc-13-1.fc40", 2);
        pkg.add_buildroot_dep("gcc-13-1.fc40", 2);
        assert_eq!(pkg.level.len(), 3);
        assert!(pkg.level[1].all.is_empty());
        assert!(pkg.level[2].all.contains("gcc-13-1.fc40"));
        assert!(pkg.in_buildroot_of_srpm_id_all.contains("gcc-13-1.fc40"));
        assert!(pkg.in_buildroot_of_srpm_id_dep.contains("gcc-13-1.fc40"));
        assert_eq!(pkg.srpm_id(), "bash-5.2-1");
    }

    #[test]
    fn failed_env_stub_is_empty_and_failed() {
        let stub = WorkloadResult::failed_env_stub("w", "e", "r", "x86_64");
        assert!(!stub.succeeded);
        assert!(!stub.env_succeeded);
        assert!(stub.pkg_env_ids.is_empty());
        assert!(stub.pkg_added_ids.is_empty());
        assert!(stub.errors.message.is_some());
    }
}
