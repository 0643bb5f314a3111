use crate::config::{Configs, Settings};
use crate::data::{AnalyzedData, pkg_id_to_name, pkg_placeholder_name_to_nevr, view_id};
use anyhow::{Result, bail};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Which id coordinate to project matching results onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPart {
    WorkloadConfIds,
    EnvConfIds,
    RepoIds,
    Arches,
}

/// Which flat list to produce from a view's packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgList {
    Ids,
    Nevrs,
    BinaryNames,
    SourceNvrs,
    SourceNames,
}

/// One package as the report writers see it, with query decorations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryPkg {
    pub id: String,
    pub name: String,
    pub evr: String,
    pub arch: String,
    pub installsize: u64,
    pub description: String,
    pub summary: String,
    pub source_name: String,
    pub sourcerpm: String,
    pub q_arch: String,
    pub q_in: BTreeSet<String>,
    pub q_required_in: BTreeSet<String>,
    pub q_dep_in: BTreeSet<String>,
    pub q_env_in: BTreeSet<String>,
    pub q_maintainers: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildrootPkgQuery {
    pub required_by: BTreeSet<String>,
    pub base_buildroot: bool,
    pub srpm_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnwantedPkgQuery {
    pub name: String,
    pub unwanted_in_view: bool,
    pub unwanted_list_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintainerEntry {
    pub name: String,
    pub all_succeeded: bool,
}

/// Read-only query layer over the analyzed data. Results are memoized
/// where they get hit repeatedly by the writers; that is sound because
/// the data is immutable once analysis finishes.
pub struct Query<'a> {
    pub data: &'a AnalyzedData,
    pub configs: &'a Configs,
    pub settings: &'a Settings,
    workloads_memo: Mutex<BTreeMap<String, Vec<String>>>,
    envs_memo: Mutex<BTreeMap<String, Vec<String>>>,
    view_pkgs_memo: Mutex<BTreeMap<String, Vec<QueryPkg>>>,
}

fn memo_key(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .map(|part| part.unwrap_or("*"))
        .collect::<Vec<_>>()
        .join("|")
}

fn matches(filter: Option<&str>, value: &str) -> bool {
    filter.is_none_or(|wanted| wanted == value)
}

impl<'a> Query<'a> {
    pub fn new(data: &'a AnalyzedData, configs: &'a Configs, settings: &'a Settings) -> Self {
        Query {
            data,
            configs,
            settings,
            workloads_memo: Mutex::new(BTreeMap::new()),
            envs_memo: Mutex::new(BTreeMap::new()),
            view_pkgs_memo: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn size(num: f64) -> String {
        let mut num = num;
        for unit in ["", "k", "M", "G"] {
            if num.abs() < 1024.0 {
                return format!("{num:.1} {unit}B");
            }
            num /= 1024.0;
        }
        format!("{num:.1} TB")
    }

    pub fn url_slug_id(id: &str) -> String {
        id.replace(':', "--")
    }

    ///////////////////////////////////////////////////////////////////////
    // Workload and env filters
    ///////////////////////////////////////////////////////////////////////

    /// All workload ids matching the given coordinates; `None` matches
    /// anything.
    pub fn workloads(
        &self,
        workload_conf_id: Option<&str>,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> Vec<String> {
        let key = memo_key(&[workload_conf_id, env_conf_id, repo_id, arch]);
        if let Ok(memo) = self.workloads_memo.lock()
            && let Some(hit) = memo.get(&key)
        {
            return hit.clone();
        }

        let mut matching: Vec<String> = Vec::new();
        for (id, workload) in &self.data.workloads {
            if matches(workload_conf_id, &workload.workload_conf_id)
                && matches(env_conf_id, &workload.env_conf_id)
                && matches(repo_id, &workload.repo_id)
                && matches(arch, &workload.arch)
            {
                matching.push(id.clone());
            }
        }

        if let Ok(mut memo) = self.workloads_memo.lock() {
            memo.insert(key, matching.clone());
        }
        matching
    }

    pub fn workloads_exist(
        &self,
        workload_conf_id: Option<&str>,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> bool {
        !self
            .workloads(workload_conf_id, env_conf_id, repo_id, arch)
            .is_empty()
    }

    /// Like `workloads`, but projected onto one id coordinate.
    pub fn workloads_project(
        &self,
        workload_conf_id: Option<&str>,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
        part: IdPart,
    ) -> Vec<String> {
        let mut projected: BTreeSet<String> = BTreeSet::new();
        for id in self.workloads(workload_conf_id, env_conf_id, repo_id, arch) {
            let workload = &self.data.workloads[&id];
            let value = match part {
                IdPart::WorkloadConfIds => &workload.workload_conf_id,
                IdPart::EnvConfIds => &workload.env_conf_id,
                IdPart::RepoIds => &workload.repo_id,
                IdPart::Arches => &workload.arch,
            };
            projected.insert(value.clone());
        }
        projected.into_iter().collect()
    }

    pub fn envs(
        &self,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> Vec<String> {
        let key = memo_key(&[env_conf_id, repo_id, arch]);
        if let Ok(memo) = self.envs_memo.lock()
            && let Some(hit) = memo.get(&key)
        {
            return hit.clone();
        }

        let mut matching: Vec<String> = Vec::new();
        for (id, env) in &self.data.envs {
            if matches(env_conf_id, &env.env_conf_id)
                && matches(repo_id, &env.repo_id)
                && matches(arch, &env.arch)
            {
                matching.push(id.clone());
            }
        }

        if let Ok(mut memo) = self.envs_memo.lock() {
            memo.insert(key, matching.clone());
        }
        matching
    }

    pub fn envs_exist(
        &self,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> bool {
        !self.envs(env_conf_id, repo_id, arch).is_empty()
    }

    pub fn envs_project(
        &self,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
        part: IdPart,
    ) -> Result<Vec<String>> {
        let mut projected: BTreeSet<String> = BTreeSet::new();
        for id in self.envs(env_conf_id, repo_id, arch) {
            let env = &self.data.envs[&id];
            let value = match part {
                IdPart::EnvConfIds => &env.env_conf_id,
                IdPart::RepoIds => &env.repo_id,
                IdPart::Arches => &env.arch,
                IdPart::WorkloadConfIds => {
                    bail!("envs can't be projected onto workload conf ids")
                }
            };
            projected.insert(value.clone());
        }
        Ok(projected.into_iter().collect())
    }

    ///////////////////////////////////////////////////////////////////////
    // Package lists with decorations
    ///////////////////////////////////////////////////////////////////////

    pub fn workload_pkgs(
        &self,
        workload_conf_id: Option<&str>,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> Vec<QueryPkg> {
        let mut pkgs: BTreeMap<String, QueryPkg> = BTreeMap::new();

        for this_workload_id in self.workloads(workload_conf_id, env_conf_id, repo_id, arch) {
            let workload = &self.data.workloads[&this_workload_id];
            let Some(workload_conf) = self.configs.workloads.get(&workload.workload_conf_id)
            else {
                continue;
            };
            let Some(catalog) = self
                .data
                .pkgs
                .get(&workload.repo_id)
                .and_then(|by_arch| by_arch.get(&workload.arch))
            else {
                continue;
            };

            for pkg_id in &workload.pkg_env_ids {
                let Some(record) = catalog.get(pkg_id) else {
                    continue;
                };
                let entry = pkgs.entry(pkg_id.clone()).or_insert_with(|| QueryPkg {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    evr: record.evr.clone(),
                    arch: record.arch.clone(),
                    installsize: record.installsize,
                    description: record.description.clone(),
                    summary: record.summary.clone(),
                    source_name: record.source_name.clone(),
                    sourcerpm: record.sourcerpm.clone(),
                    q_arch: workload.arch.clone(),
                    ..QueryPkg::default()
                });
                entry.q_in.insert(this_workload_id.clone());
                entry.q_env_in.insert(this_workload_id.clone());
                if workload_conf.requires_pkg_name(&entry.name, &workload.arch) {
                    entry.q_required_in.insert(this_workload_id.clone());
                }
            }

            for pkg_id in &workload.pkg_added_ids {
                let Some(record) = catalog.get(pkg_id) else {
                    continue;
                };
                let entry = pkgs.entry(pkg_id.clone()).or_insert_with(|| QueryPkg {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    evr: record.evr.clone(),
                    arch: record.arch.clone(),
                    installsize: record.installsize,
                    description: record.description.clone(),
                    summary: record.summary.clone(),
                    source_name: record.source_name.clone(),
                    sourcerpm: record.sourcerpm.clone(),
                    q_arch: workload.arch.clone(),
                    ..QueryPkg::default()
                });
                entry.q_in.insert(this_workload_id.clone());
                if workload_conf.requires_pkg_name(&entry.name, &workload.arch) {
                    entry.q_required_in.insert(this_workload_id.clone());
                } else {
                    entry.q_dep_in.insert(this_workload_id.clone());
                }
                entry.q_maintainers.insert(workload_conf.maintainer.clone());
            }

            for placeholder_id in &workload.pkg_placeholder_ids {
                let placeholder_name = pkg_id_to_name(placeholder_id);
                let Some(placeholder) = workload_conf
                    .package_placeholders
                    .pkgs
                    .get(placeholder_name)
                else {
                    continue;
                };
                let entry = pkgs
                    .entry(placeholder_id.clone())
                    .or_insert_with(|| QueryPkg {
                        id: placeholder_id.clone(),
                        name: placeholder.name.clone(),
                        evr: "000-placeholder".to_string(),
                        arch: "placeholder".to_string(),
                        installsize: 0,
                        description: placeholder.description.clone(),
                        summary: placeholder.description.clone(),
                        source_name: placeholder.srpm.clone(),
                        sourcerpm: pkg_placeholder_name_to_nevr(&placeholder.srpm),
                        q_arch: workload.arch.clone(),
                        ..QueryPkg::default()
                    });
                entry.q_in.insert(this_workload_id.clone());
                entry.q_required_in.insert(this_workload_id.clone());
                entry.q_maintainers.insert(workload_conf.maintainer.clone());
            }
        }

        pkgs.into_values().collect()
    }

    pub fn env_pkgs(
        &self,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> Vec<QueryPkg> {
        let mut pkgs: BTreeMap<String, QueryPkg> = BTreeMap::new();

        for this_env_id in self.envs(env_conf_id, repo_id, arch) {
            let env = &self.data.envs[&this_env_id];
            let Some(env_conf) = self.configs.envs.get(&env.env_conf_id) else {
                continue;
            };
            let Some(catalog) = self
                .data
                .pkgs
                .get(&env.repo_id)
                .and_then(|by_arch| by_arch.get(&env.arch))
            else {
                continue;
            };

            for pkg_id in &env.pkg_ids {
                let Some(record) = catalog.get(pkg_id) else {
                    continue;
                };
                let entry = pkgs.entry(pkg_id.clone()).or_insert_with(|| QueryPkg {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    evr: record.evr.clone(),
                    arch: record.arch.clone(),
                    installsize: record.installsize,
                    description: record.description.clone(),
                    summary: record.summary.clone(),
                    source_name: record.source_name.clone(),
                    sourcerpm: record.sourcerpm.clone(),
                    q_arch: env.arch.clone(),
                    ..QueryPkg::default()
                });
                entry.q_in.insert(this_env_id.clone());
                let required = env_conf.packages.iter().any(|p| *p == entry.name)
                    || env_conf
                        .arch_packages_for(&env.arch)
                        .iter()
                        .any(|p| *p == entry.name);
                if required {
                    entry.q_required_in.insert(this_env_id.clone());
                }
            }
        }

        pkgs.into_values().collect()
    }

    pub fn workload_size(
        &self,
        workload_conf_id: Option<&str>,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> u64 {
        self.workload_pkgs(workload_conf_id, env_conf_id, repo_id, arch)
            .iter()
            .map(|pkg| pkg.installsize)
            .sum()
    }

    pub fn env_size(
        &self,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> u64 {
        self.env_pkgs(env_conf_id, repo_id, arch)
            .iter()
            .map(|pkg| pkg.installsize)
            .sum()
    }

    ///////////////////////////////////////////////////////////////////////
    // Views
    ///////////////////////////////////////////////////////////////////////

    pub fn arches_in_view(&self, view_conf_id: &str) -> Vec<String> {
        let Some(view_conf) = self.configs.views.get(view_conf_id) else {
            return Vec::new();
        };
        if view_conf.architectures.is_empty() {
            return self.settings.allowed_arches.clone();
        }
        let mut arches = view_conf.architectures.clone();
        arches.sort();
        arches
    }

    pub fn workloads_in_view(
        &self,
        view_conf_id: &str,
        arch: Option<&str>,
        maintainer: Option<&str>,
    ) -> Vec<String> {
        let Some(view_conf) = self.configs.views.get(view_conf_id) else {
            return Vec::new();
        };
        if let Some(wanted_arch) = arch
            && !self.arches_in_view(view_conf_id).iter().any(|a| a == wanted_arch)
        {
            return Vec::new();
        }

        let mut matching: BTreeSet<String> = BTreeSet::new();
        for this_workload_id in
            self.workloads(None, None, Some(view_conf.repository.as_str()), arch)
        {
            let workload = &self.data.workloads[&this_workload_id];
            if let Some(wanted_maintainer) = maintainer {
                let conf_maintainer = self
                    .configs
                    .workloads
                    .get(&workload.workload_conf_id)
                    .map(|conf| conf.maintainer.as_str());
                if conf_maintainer != Some(wanted_maintainer) {
                    continue;
                }
            }
            if workload
                .labels
                .iter()
                .any(|label| view_conf.labels.contains(label))
            {
                matching.insert(this_workload_id);
            }
        }
        matching.into_iter().collect()
    }

    pub fn pkgs_in_view(
        &self,
        view_conf_id: &str,
        arch: &str,
        maintainer: Option<&str>,
    ) -> Vec<QueryPkg> {
        let key = format!("{view_conf_id}|{arch}|{}", maintainer.unwrap_or("*"));
        if let Ok(memo) = self.view_pkgs_memo.lock()
            && let Some(hit) = memo.get(&key)
        {
            return hit.clone();
        }

        let mut pkgs: BTreeMap<String, QueryPkg> = BTreeMap::new();
        let repo_id = self
            .configs
            .views
            .get(view_conf_id)
            .map(|view_conf| view_conf.repository.clone())
            .unwrap_or_default();

        for this_workload_id in self.workloads_in_view(view_conf_id, Some(arch), None) {
            let workload = &self.data.workloads[&this_workload_id];
            let Some(workload_conf) = self.configs.workloads.get(&workload.workload_conf_id)
            else {
                continue;
            };
            let Some(catalog) = self
                .data
                .pkgs
                .get(&repo_id)
                .and_then(|by_arch| by_arch.get(arch))
            else {
                continue;
            };

            for pkg_id in &workload.pkg_env_ids {
                let Some(record) = catalog.get(pkg_id) else {
                    continue;
                };
                let entry = pkgs.entry(pkg_id.clone()).or_insert_with(|| QueryPkg {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    evr: record.evr.clone(),
                    arch: record.arch.clone(),
                    installsize: record.installsize,
                    description: record.description.clone(),
                    summary: record.summary.clone(),
                    source_name: record.source_name.clone(),
                    sourcerpm: record.sourcerpm.clone(),
                    q_arch: arch.to_string(),
                    ..QueryPkg::default()
                });
                entry.q_in.insert(this_workload_id.clone());
                entry.q_env_in.insert(this_workload_id.clone());
                if workload_conf.requires_pkg_name(&entry.name, arch) {
                    entry.q_required_in.insert(this_workload_id.clone());
                }
            }

            for pkg_id in &workload.pkg_added_ids {
                let Some(record) = catalog.get(pkg_id) else {
                    continue;
                };
                let entry = pkgs.entry(pkg_id.clone()).or_insert_with(|| QueryPkg {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    evr: record.evr.clone(),
                    arch: record.arch.clone(),
                    installsize: record.installsize,
                    description: record.description.clone(),
                    summary: record.summary.clone(),
                    source_name: record.source_name.clone(),
                    sourcerpm: record.sourcerpm.clone(),
                    q_arch: arch.to_string(),
                    ..QueryPkg::default()
                });
                entry.q_in.insert(this_workload_id.clone());
                if workload_conf.requires_pkg_name(&entry.name, arch) {
                    entry.q_required_in.insert(this_workload_id.clone());
                } else {
                    entry.q_dep_in.insert(this_workload_id.clone());
                }
                entry.q_maintainers.insert(workload_conf.maintainer.clone());
            }

            for placeholder_id in &workload.pkg_placeholder_ids {
                let placeholder_name = pkg_id_to_name(placeholder_id);
                let Some(placeholder) = workload_conf
                    .package_placeholders
                    .pkgs
                    .get(placeholder_name)
                else {
                    continue;
                };
                let entry = pkgs
                    .entry(placeholder_id.clone())
                    .or_insert_with(|| QueryPkg {
                        id: placeholder_id.clone(),
                        name: placeholder.name.clone(),
                        evr: "000-placeholder".to_string(),
                        arch: "placeholder".to_string(),
                        installsize: 0,
                        description: placeholder.description.clone(),
                        summary: placeholder.description.clone(),
                        source_name: placeholder.srpm.clone(),
                        sourcerpm: pkg_placeholder_name_to_nevr(&placeholder.srpm),
                        q_arch: arch.to_string(),
                        ..QueryPkg::default()
                    });
                entry.q_in.insert(this_workload_id.clone());
                entry.q_required_in.insert(this_workload_id.clone());
                entry.q_maintainers.insert(workload_conf.maintainer.clone());
            }
        }

        // Addon views subtract their base view's packages.
        if let Some(view_conf) = self.configs.views.get(view_conf_id)
            && let Some(base_view_id) = &view_conf.base_view_id
        {
            let base_ids: BTreeSet<String> = self
                .pkgs_in_view(base_view_id, arch, None)
                .into_iter()
                .map(|pkg| pkg.id)
                .collect();
            pkgs.retain(|pkg_id, _| !base_ids.contains(pkg_id));
        }

        // The maintainer filter applies last so the q_* fields keep the
        // whole view as their context.
        if let Some(wanted_maintainer) = maintainer {
            pkgs.retain(|_, pkg| pkg.q_maintainers.contains(wanted_maintainer));
        }

        let result: Vec<QueryPkg> = pkgs.into_values().collect();
        if let Ok(mut memo) = self.view_pkgs_memo.lock() {
            memo.insert(key, result.clone());
        }
        result
    }

    pub fn pkgs_in_view_list(&self, view_conf_id: &str, arch: &str, kind: PkgList) -> Vec<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();
        for pkg in self.pkgs_in_view(view_conf_id, arch, None) {
            let value = match kind {
                PkgList::Ids => pkg.id.clone(),
                PkgList::Nevrs => format!("{}-{}", pkg.name, pkg.evr),
                PkgList::BinaryNames => pkg.name.clone(),
                PkgList::SourceNvrs => pkg.sourcerpm.clone(),
                PkgList::SourceNames => pkg.source_name.clone(),
            };
            names.insert(value);
        }
        names.into_iter().collect()
    }

    /// Buildroot contents described by the deprecated buildroot override
    /// documents. Views without one produce an empty table.
    pub fn view_buildroot_pkgs(
        &self,
        view_conf_id: &str,
        arch: &str,
    ) -> BTreeMap<String, BuildrootPkgQuery> {
        let mut pkgs: BTreeMap<String, BuildrootPkgQuery> = BTreeMap::new();

        let Some(buildroot_conf) = self
            .configs
            .buildroots
            .values()
            .find(|conf| conf.view_id == view_conf_id)
        else {
            return pkgs;
        };

        if let Some(base_buildroot) = buildroot_conf.base_buildroot.get(arch) {
            for pkg_name in base_buildroot {
                pkgs.entry(pkg_name.clone()).or_insert_with(|| {
                    BuildrootPkgQuery {
                        base_buildroot: true,
                        ..BuildrootPkgQuery::default()
                    }
                });
            }
        }
        if let Some(source_packages) = buildroot_conf.source_packages.get(arch) {
            for (srpm_name, requires) in source_packages {
                for pkg_name in requires {
                    pkgs.entry(pkg_name.clone())
                        .or_default()
                        .required_by
                        .insert(srpm_name.clone());
                }
            }
        }

        for relations_doc in self.configs.buildroot_pkg_relations.values() {
            if relations_doc.view_id != view_conf_id || relations_doc.arch != arch {
                continue;
            }
            for (pkg_id, relation) in &relations_doc.pkg_relations {
                let pkg_name = pkg_id_to_name(pkg_id);
                if let Some(entry) = pkgs.get_mut(pkg_name)
                    && entry.srpm_name.is_none()
                {
                    entry.srpm_name = Some(relation.source_name.clone());
                }
            }
        }

        pkgs
    }

    ///////////////////////////////////////////////////////////////////////
    // Success and warning flags
    ///////////////////////////////////////////////////////////////////////

    pub fn workload_succeeded(
        &self,
        workload_conf_id: Option<&str>,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> bool {
        self.workloads(workload_conf_id, env_conf_id, repo_id, arch)
            .iter()
            .all(|id| self.data.workloads[id].succeeded)
    }

    pub fn workload_warnings(
        &self,
        workload_conf_id: Option<&str>,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> bool {
        self.workloads(workload_conf_id, env_conf_id, repo_id, arch)
            .iter()
            .any(|id| self.data.workloads[id].warnings.message.is_some())
    }

    pub fn env_succeeded(
        &self,
        env_conf_id: Option<&str>,
        repo_id: Option<&str>,
        arch: Option<&str>,
    ) -> bool {
        self.envs(env_conf_id, repo_id, arch)
            .iter()
            .all(|id| self.data.envs[id].succeeded)
    }

    pub fn view_succeeded(
        &self,
        view_conf_id: &str,
        arch: Option<&str>,
        maintainer: Option<&str>,
    ) -> bool {
        self.workloads_in_view(view_conf_id, arch, maintainer)
            .iter()
            .all(|id| self.data.workloads[id].succeeded)
    }

    ///////////////////////////////////////////////////////////////////////
    // Unwanted, placeholders, maintainers
    ///////////////////////////////////////////////////////////////////////

    fn srpm_name_to_rpm_names(&self, srpm_name: &str, repo_id: &str) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();
        if let Some(by_arch) = self.data.pkgs.get(repo_id) {
            for catalog in by_arch.values() {
                for record in catalog.values() {
                    if record.source_name == srpm_name {
                        names.insert(record.name.clone());
                    }
                }
            }
        }
        names
    }

    /// Unwanted packages relevant to one view: the view's own confirmed
    /// lists plus label-matched exclusion-list proposals.
    pub fn view_unwanted_pkgs(
        &self,
        view_conf_id: &str,
        arch: Option<&str>,
    ) -> BTreeMap<String, UnwantedPkgQuery> {
        let mut unwanted: BTreeMap<String, UnwantedPkgQuery> = BTreeMap::new();
        let Some(view_conf) = self.configs.views.get(view_conf_id) else {
            return unwanted;
        };
        let repo_id = &view_conf.repository;

        let arches: Vec<String> = match arch {
            Some(arch) => vec![arch.to_string()],
            None => self.settings.allowed_arches.clone(),
        };

        // Confirmed: named directly by the view config.
        for pkg_name in &view_conf.unwanted_packages {
            unwanted.insert(
                pkg_name.clone(),
                UnwantedPkgQuery {
                    name: pkg_name.clone(),
                    unwanted_in_view: true,
                    unwanted_list_ids: Vec::new(),
                },
            );
        }
        for this_arch in &arches {
            if let Some(arch_pkgs) = view_conf.unwanted_arch_packages.get(this_arch) {
                for pkg_name in arch_pkgs {
                    unwanted.entry(pkg_name.clone()).or_insert_with(|| {
                        UnwantedPkgQuery {
                            name: pkg_name.clone(),
                            unwanted_in_view: true,
                            unwanted_list_ids: Vec::new(),
                        }
                    });
                }
            }
        }
        for srpm_name in &view_conf.unwanted_source_packages {
            for pkg_name in self.srpm_name_to_rpm_names(srpm_name, repo_id) {
                unwanted.entry(pkg_name.clone()).or_insert_with(|| {
                    UnwantedPkgQuery {
                        name: pkg_name.clone(),
                        unwanted_in_view: true,
                        unwanted_list_ids: Vec::new(),
                    }
                });
            }
        }

        // Proposals: label-matched exclusion lists.
        let mut unwanted_conf_ids: BTreeSet<String> = BTreeSet::new();
        for view_label in &view_conf.labels {
            for (unwanted_conf_id, unwanted_conf) in &self.configs.unwanteds {
                if unwanted_conf.labels.iter().any(|label| label == view_label) {
                    unwanted_conf_ids.insert(unwanted_conf_id.clone());
                }
            }
        }

        for unwanted_conf_id in &unwanted_conf_ids {
            let unwanted_conf = &self.configs.unwanteds[unwanted_conf_id];
            let mut proposed_names: BTreeSet<String> =
                unwanted_conf.unwanted_packages.iter().cloned().collect();
            for this_arch in &arches {
                if let Some(arch_pkgs) = unwanted_conf.unwanted_arch_packages.get(this_arch) {
                    proposed_names.extend(arch_pkgs.iter().cloned());
                }
            }
            for srpm_name in &unwanted_conf.unwanted_source_packages {
                proposed_names.extend(self.srpm_name_to_rpm_names(srpm_name, repo_id));
            }

            for pkg_name in proposed_names {
                let entry = unwanted.entry(pkg_name.clone()).or_insert_with(|| {
                    UnwantedPkgQuery {
                        name: pkg_name.clone(),
                        unwanted_in_view: false,
                        unwanted_list_ids: Vec::new(),
                    }
                });
                entry.unwanted_list_ids.push(unwanted_conf_id.clone());
            }
        }

        unwanted
    }

    /// Placeholder source packages contributed by the view's workloads,
    /// with their build requires unioned. Placeholders limited to other
    /// arches don't show up.
    pub fn view_placeholder_srpms(
        &self,
        view_conf_id: &str,
        arch: &str,
    ) -> BTreeMap<String, BTreeSet<String>> {
        let mut placeholder_srpms: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for this_workload_id in self.workloads_in_view(view_conf_id, Some(arch), None) {
            let workload = &self.data.workloads[&this_workload_id];
            let Some(workload_conf) = self.configs.workloads.get(&workload.workload_conf_id)
            else {
                continue;
            };
            for placeholder in workload_conf.package_placeholders.srpms.values() {
                if !placeholder.limit_arches.is_empty()
                    && !placeholder.limit_arches.iter().any(|a| a == arch)
                {
                    continue;
                }
                placeholder_srpms
                    .entry(placeholder.name.clone())
                    .or_default()
                    .extend(placeholder.buildrequires.iter().cloned());
            }
        }

        placeholder_srpms
    }

    pub fn view_maintainers(&self, view_conf_id: &str, arch: Option<&str>) -> BTreeSet<String> {
        let mut maintainers: BTreeSet<String> = BTreeSet::new();
        for this_workload_id in self.workloads_in_view(view_conf_id, arch, None) {
            let workload = &self.data.workloads[&this_workload_id];
            if let Some(workload_conf) = self.configs.workloads.get(&workload.workload_conf_id) {
                maintainers.insert(workload_conf.maintainer.clone());
            }
        }
        maintainers
    }

    /// Everyone who maintains a workload or an env, with a rolled-up
    /// everything-they-own-succeeded flag.
    pub fn maintainers(&self) -> BTreeMap<String, MaintainerEntry> {
        let mut maintainers: BTreeMap<String, MaintainerEntry> = BTreeMap::new();

        for id in self.workloads(None, None, None, None) {
            let workload = &self.data.workloads[&id];
            let Some(workload_conf) = self.configs.workloads.get(&workload.workload_conf_id)
            else {
                continue;
            };
            let entry = maintainers
                .entry(workload_conf.maintainer.clone())
                .or_insert_with(|| MaintainerEntry {
                    name: workload_conf.maintainer.clone(),
                    all_succeeded: true,
                });
            if !workload.succeeded {
                entry.all_succeeded = false;
            }
        }

        for id in self.envs(None, None, None) {
            let env = &self.data.envs[&id];
            let Some(env_conf) = self.configs.envs.get(&env.env_conf_id) else {
                continue;
            };
            let entry = maintainers
                .entry(env_conf.maintainer.clone())
                .or_insert_with(|| MaintainerEntry {
                    name: env_conf.maintainer.clone(),
                    all_succeeded: true,
                });
            if !env.succeeded {
                entry.all_succeeded = false;
            }
        }

        maintainers
    }

    /// The per-arch view data, when it exists.
    pub fn view(&self, view_conf_id: &str, arch: &str) -> Option<&crate::data::View> {
        self.data.views.get(&view_id(view_conf_id, arch))
    }
}
