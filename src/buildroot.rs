use crate::analyzer::{analyze_env, workload_request, workload_result_from_outcome};
use crate::config::{
    Configs, EnvConfig, PackagePlaceholders, RepoConfig, Settings, WorkloadConfig,
};
use crate::data::{
    AnalyzedData, BuildGroup, BuildrootSrpm, KojiSrpm, KojiUrls, View, ViewPkg, ViewSrpm,
    srpm_id_from_sourcerpm, url_to_id, view_id, workload_id,
};
use crate::koji::{KojiClient, dev_fake_build_requires};
use crate::progress::log_progress;
use crate::runner::{ResolveJob, run_resolve_jobs};
use crate::solver::Solver;
use anyhow::{Context, Result, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

///////////////////////////////////////////////////////////////////////////////
// Root-log dependency cache
///////////////////////////////////////////////////////////////////////////////

type CacheMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>;

/// Two generations: "current" is read from disk and never written,
/// "next" collects this run's results and replaces the file atomically on
/// success. A stale cache therefore never reinforces itself.
#[derive(Debug, Default)]
pub struct RootLogCache {
    pub current: CacheMap,
    pub next: CacheMap,
}

impl RootLogCache {
    pub fn load(path: &Path) -> Self {
        let current = fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        RootLogCache {
            current,
            next: CacheMap::default(),
        }
    }

    pub fn lookup(&self, koji_id: &str, arch: &str, srpm_id: &str) -> Option<&Vec<String>> {
        let current_hit = self
            .current
            .get(koji_id)
            .and_then(|by_arch| by_arch.get(arch))
            .and_then(|by_srpm| by_srpm.get(srpm_id));
        if current_hit.is_some() {
            return current_hit;
        }
        self.next
            .get(koji_id)
            .and_then(|by_arch| by_arch.get(arch))
            .and_then(|by_srpm| by_srpm.get(srpm_id))
    }

    pub fn store(&mut self, koji_id: &str, arch: &str, srpm_id: &str, names: Vec<String>) {
        self.next
            .entry(koji_id.to_string())
            .or_default()
            .entry(arch.to_string())
            .or_default()
            .insert(srpm_id.to_string(), names);
    }

    pub fn write_next(&self, path: &Path) -> Result<()> {
        let serialized =
            serde_json::to_string(&self.next).context("serializing the root-log cache")?;
        let tmp_path = path.with_extension("json.next");
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

///////////////////////////////////////////////////////////////////////////////
// Buildroot analysis
///////////////////////////////////////////////////////////////////////////////

fn koji_coords_for(repo: &RepoConfig, reponame: &str) -> Result<(String, String)> {
    let child = repo
        .source
        .repos
        .get(reponame)
        .or_else(|| {
            repo.source
                .repos
                .values()
                .find(|child| child.name == reponame)
        })
        .with_context(|| {
            format!(
                "koji root log error: repo '{}' has no child repo named '{reponame}'",
                repo.id
            )
        })?;
    let api = child.koji_api_url.clone().with_context(|| {
        format!(
            "koji root log error: child repo '{reponame}' of '{}' has no koji_api_url",
            repo.id
        )
    })?;
    let files = child.koji_files_url.clone().with_context(|| {
        format!(
            "koji root log error: child repo '{reponame}' of '{}' has no koji_files_url",
            repo.id
        )
    })?;
    Ok((api, files))
}

fn init_buildroot_srpm(
    data: &mut AnalyzedData,
    repo: &RepoConfig,
    arch: &str,
    srpm_id: &str,
    reponame: Option<&str>,
    placeholder_requires: Option<&[String]>,
) -> Result<()> {
    let mut koji_id = None;
    let mut directly_required: BTreeSet<String> = BTreeSet::new();

    match placeholder_requires {
        Some(requires) => {
            directly_required.extend(requires.iter().cloned());
        }
        None => {
            let reponame = reponame.context(
                "koji root log error: source package without a reponame in a root_logs view",
            )?;
            let (api_url, files_url) = koji_coords_for(repo, reponame)?;
            let this_koji_id = url_to_id(&api_url);

            data.buildroot
                .koji_urls
                .entry(this_koji_id.clone())
                .or_insert_with(|| KojiUrls {
                    api: api_url,
                    files: files_url,
                });

            let koji_entry = data
                .buildroot
                .koji_srpms
                .entry(this_koji_id.clone())
                .or_default()
                .entry(arch.to_string())
                .or_default()
                .entry(srpm_id.to_string())
                .or_insert_with(|| KojiSrpm {
                    id: srpm_id.to_string(),
                    directly_required_pkg_names: BTreeSet::new(),
                });
            directly_required = koji_entry.directly_required_pkg_names.clone();
            koji_id = Some(this_koji_id);
        }
    }

    data.buildroot
        .srpms
        .entry(repo.id.clone())
        .or_default()
        .entry(arch.to_string())
        .or_default()
        .entry(srpm_id.to_string())
        .or_insert_with(|| BuildrootSrpm {
            id: srpm_id.to_string(),
            koji_id,
            directly_required_pkg_names: directly_required,
            ..BuildrootSrpm::default()
        });

    Ok(())
}

/// Seeds the buildroot scope with every source package of one view.
fn populate_buildroot_with_view_srpms(
    configs: &Configs,
    data: &mut AnalyzedData,
    view_conf_id: &str,
    arch: &str,
) -> Result<()> {
    let this_view_id = view_id(view_conf_id, arch);
    let view_conf = &configs.views[view_conf_id];
    let repo = configs
        .repos
        .get(&view_conf.repository)
        .context("view references a missing repository")?;

    log_progress(format!(
        "phase=buildroot status=collecting-srpms view={view_conf_id} arch={arch}"
    ));

    let seeds: Vec<(String, bool, Option<String>, Vec<String>)> = {
        let view = data
            .views
            .get(&this_view_id)
            .context("buildroot requested for a view that was never assembled")?;
        view.source_pkgs
            .values()
            .map(|srpm| {
                (
                    srpm.id.clone(),
                    srpm.placeholder,
                    srpm.reponame.clone(),
                    srpm.placeholder_directly_required_pkg_names.clone(),
                )
            })
            .collect()
    };

    for (srpm_id, placeholder, reponame, placeholder_requires) in seeds {
        if placeholder {
            init_buildroot_srpm(
                data,
                repo,
                arch,
                &srpm_id,
                None,
                Some(placeholder_requires.as_slice()),
            )?;
        } else {
            init_buildroot_srpm(data, repo, arch, &srpm_id, reponame.as_deref(), None)?;
        }
    }

    Ok(())
}

/// Resolves the base build group for every (repo, arch) in buildroot
/// scope. Failure here makes the whole run unusable.
fn analyze_build_groups(
    solver: &Arc<dyn Solver>,
    configs: &Configs,
    data: &mut AnalyzedData,
) -> Result<()> {
    let targets: Vec<(String, String)> = data
        .buildroot
        .srpms
        .iter()
        .flat_map(|(repo_id, by_arch)| {
            by_arch
                .keys()
                .map(|arch| (repo_id.clone(), arch.clone()))
                .collect::<Vec<_>>()
        })
        .collect();

    for (repo_id, arch) in targets {
        let repo = configs
            .repos
            .get(&repo_id)
            .context("buildroot scope references a missing repository")?;
        let generated_id = format!("buildroot-base-env-{repo_id}-{arch}");

        let mut fake_env_conf = EnvConfig {
            id: generated_id.clone(),
            ..EnvConfig::default()
        };
        if repo.source.base_buildroot_override.is_empty() {
            fake_env_conf.groups = vec!["build".to_string()];
        } else {
            fake_env_conf.packages = repo.source.base_buildroot_override.clone();
        }

        log_progress(format!(
            "phase=buildroot status=resolving-build-group repo={repo_id} arch={arch}"
        ));
        let env = analyze_env(solver, &fake_env_conf, repo, &arch, false)?;
        if !env.succeeded {
            bail!(
                "build group analysis error: the base build group failed to resolve for {repo_id} {arch}: {}",
                env.errors.message.clone().unwrap_or_default()
            );
        }

        data.buildroot
            .build_groups
            .entry(repo_id)
            .or_default()
            .insert(arch, BuildGroup { generated_id, env });
    }

    Ok(())
}

/// Fills in direct build-requires from root logs, consulting the
/// two-generation cache first. Idempotent: sources that already have
/// their requires are skipped.
fn resolve_srpms_using_root_logs(
    settings: &Settings,
    data: &mut AnalyzedData,
    cache: &mut RootLogCache,
    pass_counter: u32,
) -> Result<()> {
    log_progress(format!(
        "phase=buildroot status=resolving-root-logs pass={pass_counter}"
    ));

    let mut clients: BTreeMap<String, KojiClient> = BTreeMap::new();

    let koji_ids: Vec<String> = data.buildroot.koji_srpms.keys().cloned().collect();
    for koji_id in koji_ids {
        let arches: Vec<String> = data.buildroot.koji_srpms[&koji_id].keys().cloned().collect();
        for arch in arches {
            let srpm_ids: Vec<String> = data.buildroot.koji_srpms[&koji_id][&arch]
                .keys()
                .cloned()
                .collect();
            for srpm_id in srpm_ids {
                let already_done = !data.buildroot.koji_srpms[&koji_id][&arch][&srpm_id]
                    .directly_required_pkg_names
                    .is_empty();
                if already_done {
                    continue;
                }

                let names = if let Some(cached) = cache.lookup(&koji_id, &arch, &srpm_id) {
                    cached.clone()
                } else if settings.dev_buildroot {
                    dev_fake_build_requires(&srpm_id)
                } else {
                    let urls = data
                        .buildroot
                        .koji_urls
                        .get(&koji_id)
                        .context("koji id without recorded urls")?;
                    if !clients.contains_key(&koji_id) {
                        clients.insert(koji_id.clone(), KojiClient::new(&urls.api, &urls.files)?);
                    }
                    log_progress(format!(
                        "phase=buildroot status=fetching-root-log srpm={srpm_id} arch={arch} pass={pass_counter}"
                    ));
                    clients[&koji_id].get_direct_build_requires(&srpm_id, &arch)?
                };

                cache.store(&koji_id, &arch, &srpm_id, names.clone());
                if let Some(entry) = data
                    .buildroot
                    .koji_srpms
                    .get_mut(&koji_id)
                    .and_then(|by_arch| by_arch.get_mut(&arch))
                    .and_then(|by_srpm| by_srpm.get_mut(&srpm_id))
                {
                    entry.directly_required_pkg_names.extend(names);
                }
            }
        }
    }

    // The repo-side entries mirror the koji-side requires.
    let repo_ids: Vec<String> = data.buildroot.srpms.keys().cloned().collect();
    for repo_id in repo_ids {
        let arches: Vec<String> = data.buildroot.srpms[&repo_id].keys().cloned().collect();
        for arch in arches {
            let srpm_ids: Vec<String> = data.buildroot.srpms[&repo_id][&arch]
                .keys()
                .cloned()
                .collect();
            for srpm_id in srpm_ids {
                let koji_id = data.buildroot.srpms[&repo_id][&arch][&srpm_id]
                    .koji_id
                    .clone();
                let Some(koji_id) = koji_id else {
                    continue;
                };
                let Some(names) = data
                    .buildroot
                    .koji_srpms
                    .get(&koji_id)
                    .and_then(|by_arch| by_arch.get(&arch))
                    .and_then(|by_srpm| by_srpm.get(&srpm_id))
                    .map(|entry| entry.directly_required_pkg_names.clone())
                else {
                    continue;
                };
                if let Some(entry) = data
                    .buildroot
                    .srpms
                    .get_mut(&repo_id)
                    .and_then(|by_arch| by_arch.get_mut(&arch))
                    .and_then(|by_srpm| by_srpm.get_mut(&srpm_id))
                {
                    entry.directly_required_pkg_names.extend(names);
                }
            }
        }
    }

    Ok(())
}

/// Resolves the buildroot of every source not yet processed: its direct
/// build-requires on top of the base build group, exactly like a workload
/// on top of its environment.
fn analyze_srpm_buildroots(
    solver: &Arc<dyn Solver>,
    configs: &Configs,
    settings: &Settings,
    data: &mut AnalyzedData,
    pass_counter: u32,
) -> Result<()> {
    log_progress(format!(
        "phase=buildroot status=resolving-srpm-buildroots pass={pass_counter}"
    ));

    struct FakeJob {
        repo_id: String,
        arch: String,
        srpm_id: String,
        workload_conf: WorkloadConfig,
        env_conf: EnvConfig,
    }

    let mut fake_jobs: Vec<FakeJob> = Vec::new();
    let mut jobs: Vec<ResolveJob> = Vec::new();

    for (repo_id, by_arch) in &data.buildroot.srpms {
        for (arch, by_srpm) in by_arch {
            for (srpm_id, srpm) in by_srpm {
                if srpm.queued || srpm.processed {
                    continue;
                }
                let repo = configs
                    .repos
                    .get(repo_id)
                    .context("buildroot scope references a missing repository")?;
                let build_group = data
                    .buildroot
                    .build_groups
                    .get(repo_id)
                    .and_then(|by_arch| by_arch.get(arch))
                    .context("buildroot resolve without a build group")?;

                let workload_conf = WorkloadConfig {
                    id: srpm_id.clone(),
                    packages: srpm.directly_required_pkg_names.iter().cloned().collect(),
                    package_placeholders: PackagePlaceholders::default(),
                    ..WorkloadConfig::default()
                };
                // Only needs to look non-empty so the build-group root is
                // loaded as the installed base.
                let env_conf = EnvConfig {
                    id: build_group.generated_id.clone(),
                    packages: vec!["bash".to_string()],
                    ..EnvConfig::default()
                };

                let key = workload_id(srpm_id, &env_conf.id, repo_id, arch);
                jobs.push(ResolveJob {
                    key,
                    workload_conf_id: srpm_id.clone(),
                    env_conf_id: env_conf.id.clone(),
                    repo_id: repo_id.clone(),
                    arch: arch.clone(),
                    request: workload_request(&workload_conf, &env_conf, repo, arch, false),
                });
                fake_jobs.push(FakeJob {
                    repo_id: repo_id.clone(),
                    arch: arch.clone(),
                    srpm_id: srpm_id.clone(),
                    workload_conf,
                    env_conf,
                });
            }
        }
    }

    for fake_job in &fake_jobs {
        if let Some(entry) = data
            .buildroot
            .srpms
            .get_mut(&fake_job.repo_id)
            .and_then(|by_arch| by_arch.get_mut(&fake_job.arch))
            .and_then(|by_srpm| by_srpm.get_mut(&fake_job.srpm_id))
        {
            entry.queued = true;
        }
    }

    let outcomes = run_resolve_jobs(solver, jobs, settings.max_subprocesses)?;

    for fake_job in fake_jobs {
        let key = workload_id(
            &fake_job.srpm_id,
            &fake_job.env_conf.id,
            &fake_job.repo_id,
            &fake_job.arch,
        );
        let outcome = outcomes
            .get(&key)
            .context("buildroot resolve result missing")?;
        let fake_workload = workload_result_from_outcome(
            &fake_job.workload_conf,
            &fake_job.env_conf,
            &fake_job.repo_id,
            &fake_job.arch,
            outcome,
            settings,
        );
        if let Some(entry) = data
            .buildroot
            .srpms
            .get_mut(&fake_job.repo_id)
            .and_then(|by_arch| by_arch.get_mut(&fake_job.arch))
            .and_then(|by_srpm| by_srpm.get_mut(&fake_job.srpm_id))
        {
            entry.succeeded = fake_workload.succeeded;
            entry.pkg_relations = fake_workload.pkg_relations;
            entry.pkg_env_ids = fake_workload.pkg_env_ids.into_iter().collect();
            entry.pkg_added_ids = fake_workload.pkg_added_ids.into_iter().collect();
            entry.errors = fake_workload.errors;
            entry.warnings = fake_workload.warnings;
            entry.processed = true;
        }
    }

    Ok(())
}

/// Adds any source package whose binaries showed up in a buildroot
/// resolve but which isn't in scope yet. Returns how many were added.
fn expand_buildroot_srpms(configs: &Configs, data: &mut AnalyzedData) -> Result<u64> {
    let mut counter = 0u64;

    let repo_ids: Vec<String> = data.buildroot.srpms.keys().cloned().collect();
    for repo_id in repo_ids {
        let repo = configs
            .repos
            .get(&repo_id)
            .context("buildroot scope references a missing repository")?
            .clone();
        let arches: Vec<String> = data.buildroot.srpms[&repo_id].keys().cloned().collect();
        for arch in arches {
            let known_srpm_ids: BTreeSet<String> = data.buildroot.srpms[&repo_id][&arch]
                .keys()
                .cloned()
                .collect();

            let mut discovered: BTreeMap<String, String> = BTreeMap::new();
            for srpm_id in &known_srpm_ids {
                let pkg_ids: Vec<String> = data.buildroot.srpms[&repo_id][&arch][srpm_id]
                    .pkg_relations
                    .keys()
                    .cloned()
                    .collect();
                for pkg_id in pkg_ids {
                    let record = data
                        .pkgs
                        .get(&repo_id)
                        .and_then(|by_arch| by_arch.get(&arch))
                        .and_then(|catalog| catalog.get(&pkg_id))
                        .with_context(|| {
                            format!("package {pkg_id} missing from repo catalog")
                        })?;
                    let new_srpm_id = srpm_id_from_sourcerpm(&record.sourcerpm).to_string();
                    if known_srpm_ids.contains(&new_srpm_id)
                        || discovered.contains_key(&new_srpm_id)
                    {
                        continue;
                    }
                    discovered.insert(new_srpm_id, record.reponame.clone());
                }
            }

            for (new_srpm_id, reponame) in discovered {
                counter += 1;
                init_buildroot_srpm(data, &repo, &arch, &new_srpm_id, Some(reponame.as_str()), None)?;
            }
        }
    }

    log_progress(format!(
        "phase=buildroot status=expanded new_srpms={counter}"
    ));
    Ok(counter)
}

/// Merges the resolved buildroots back into one view, level by level,
/// until no new source package appears.
fn add_buildroot_to_view(
    configs: &Configs,
    data: &mut AnalyzedData,
    view_conf_id: &str,
    arch: &str,
) -> Result<()> {
    let this_view_id = view_id(view_conf_id, arch);
    let repo_id = configs.views[view_conf_id].repository.clone();

    let mut view: View = data
        .views
        .remove(&this_view_id)
        .context("buildroot merge requested for a view that was never assembled")?;

    log_progress(format!(
        "phase=buildroot status=merging-into-view view={this_view_id}"
    ));

    let empty = BTreeMap::new();
    let buildroot_srpms = data
        .buildroot
        .srpms
        .get(&repo_id)
        .and_then(|by_arch| by_arch.get(arch))
        .unwrap_or(&empty);
    let catalog = data
        .pkgs
        .get(&repo_id)
        .and_then(|by_arch| by_arch.get(arch))
        .context("view repository has no package catalog for this arch")?;

    let mut srpm_ids_to_process: BTreeSet<String> = view.source_pkgs.keys().cloned().collect();
    let mut level = 0usize;

    loop {
        level += 1;
        let mut added_pkg_ids: BTreeSet<String> = BTreeSet::new();

        for buildroot_srpm_id in &srpm_ids_to_process {
            let Some(buildroot_srpm) = buildroot_srpms.get(buildroot_srpm_id) else {
                continue;
            };

            for pkg_id in &buildroot_srpm.pkg_env_ids {
                added_pkg_ids.insert(pkg_id.clone());
                let record = catalog
                    .get(pkg_id)
                    .with_context(|| format!("package {pkg_id} missing from repo catalog"))?;
                let pkg = view
                    .pkgs
                    .entry(pkg_id.clone())
                    .or_insert_with(|| ViewPkg::from_record(record, arch, level));
                pkg.add_buildroot_all(buildroot_srpm_id, level);
                pkg.add_buildroot_env(buildroot_srpm_id, level);
                if buildroot_srpm
                    .directly_required_pkg_names
                    .contains(&pkg.name)
                {
                    pkg.add_buildroot_req(buildroot_srpm_id, level);
                }
                if let Some(relations) = buildroot_srpm.pkg_relations.get(pkg_id) {
                    pkg.add_relations(relations);
                }
            }

            for pkg_id in &buildroot_srpm.pkg_added_ids {
                added_pkg_ids.insert(pkg_id.clone());
                let record = catalog
                    .get(pkg_id)
                    .with_context(|| format!("package {pkg_id} missing from repo catalog"))?;
                let pkg = view
                    .pkgs
                    .entry(pkg_id.clone())
                    .or_insert_with(|| ViewPkg::from_record(record, arch, level));
                pkg.add_buildroot_all(buildroot_srpm_id, level);
                if buildroot_srpm
                    .directly_required_pkg_names
                    .contains(&pkg.name)
                {
                    pkg.add_buildroot_req(buildroot_srpm_id, level);
                } else {
                    pkg.add_buildroot_dep(buildroot_srpm_id, level);
                }
                if let Some(relations) = buildroot_srpm.pkg_relations.get(pkg_id) {
                    pkg.add_relations(relations);
                }
            }
        }

        srpm_ids_to_process = BTreeSet::new();

        for pkg_id in &added_pkg_ids {
            let pkg = view.pkgs[pkg_id].clone();
            let srpm_id = pkg.srpm_id();
            if !view.source_pkgs.contains_key(&srpm_id) {
                view.source_pkgs
                    .insert(srpm_id.clone(), ViewSrpm::from_pkg(&pkg, level));
                srpm_ids_to_process.insert(srpm_id.clone());
            }
            if let Some(srpm) = view.source_pkgs.get_mut(&srpm_id) {
                srpm.absorb_pkg_buildroot(&pkg, level);
            }
        }

        log_progress(format!(
            "phase=buildroot status=view-pass view={this_view_id} level={level} added_pkgs={} added_srpms={}",
            added_pkg_ids.len(),
            srpm_ids_to_process.len()
        ));

        if srpm_ids_to_process.is_empty() {
            break;
        }
    }

    data.views.insert(this_view_id, view);
    Ok(())
}

/// The whole buildroot stage: collect sources from root_logs views,
/// resolve the base build groups, then iterate root-log fetching,
/// buildroot resolution, and scope expansion to a fixed point; finally
/// merge the levels into the views.
pub fn analyze_buildroot(
    solver: &Arc<dyn Solver>,
    configs: &Configs,
    settings: &Settings,
    data: &mut AnalyzedData,
) -> Result<()> {
    let mut root_log_views: Vec<(String, String)> = Vec::new();
    for view_conf in configs.views.values() {
        if !view_conf.wants_buildroot() {
            continue;
        }
        for arch in &view_conf.architectures {
            root_log_views.push((view_conf.id.clone(), arch.clone()));
        }
    }

    if root_log_views.is_empty() {
        log_progress("phase=buildroot status=skipped reason=no-root-logs-views");
        return Ok(());
    }

    for (view_conf_id, arch) in &root_log_views {
        populate_buildroot_with_view_srpms(configs, data, view_conf_id, arch)?;
    }

    analyze_build_groups(solver, configs, data)?;

    let mut cache = RootLogCache::load(&settings.root_log_deps_cache_path);

    let mut pass_counter = 0u32;
    loop {
        pass_counter += 1;
        resolve_srpms_using_root_logs(settings, data, &mut cache, pass_counter)?;
        analyze_srpm_buildroots(solver, configs, settings, data, pass_counter)?;
        let new_srpms = expand_buildroot_srpms(configs, data)?;
        if new_srpms == 0 {
            log_progress(format!(
                "phase=buildroot status=fixed-point-reached passes={pass_counter}"
            ));
            break;
        }
    }

    cache
        .write_next(&settings.root_log_deps_cache_path)
        .context("writing the root-log cache")?;

    for (view_conf_id, arch) in &root_log_views {
        add_buildroot_to_view(configs, data, view_conf_id, arch)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RepoChildRepo, RepoSource, ViewConfig, ViewType, WorkloadConfig};
    use crate::data::{PackageRecord, WorkloadResult};
    use crate::progress::reset_cancellation;
    use crate::solver::{
        FakeSolver, ResolveOutcome, ResolveRequest, ResolveSuccess, make_test_pkg,
    };
    use crate::views::analyze_views;
    use std::sync::Arc;

    fn test_repo() -> RepoConfig {
        let mut repos = BTreeMap::new();
        repos.insert(
            "base".to_string(),
            RepoChildRepo {
                id: "base".to_string(),
                name: "base".to_string(),
                baseurl: "https://example.com/base".to_string(),
                priority: 10,
                koji_api_url: Some("https://koji.example.com/kojihub".to_string()),
                koji_files_url: Some("https://koji.example.com/files".to_string()),
                ..RepoChildRepo::default()
            },
        );
        RepoConfig {
            id: "test-repo".to_string(),
            name: "Test Repo".to_string(),
            source: RepoSource {
                releasever: "40".to_string(),
                architectures: vec!["x86_64".to_string()],
                repos,
                ..RepoSource::default()
            },
            ..RepoConfig::default()
        }
    }

    fn test_settings(dir: &Path) -> Settings {
        Settings {
            configs_dir: dir.to_path_buf(),
            output_dir: dir.to_path_buf(),
            use_cache: false,
            dev_buildroot: true,
            dnf_cache_dir_override: None,
            solver_command: "unused".to_string(),
            max_subprocesses: 2,
            allowed_arches: vec!["x86_64".to_string()],
            uninstallable_packages: Vec::new(),
            skipped_maintainers: Vec::new(),
            root_log_deps_cache_path: dir.join("cache_root_log_deps.json"),
            strict: false,
        }
    }

    fn insert_catalog_pkg(data: &mut AnalyzedData, pkg: PackageRecord) {
        data.pkgs
            .entry("test-repo".to_string())
            .or_default()
            .entry("x86_64".to_string())
            .or_default()
            .insert(pkg.id.clone(), pkg);
    }

    /// Catalog where every dev-fake build-require resolves to a package of
    /// a source with the same name, so the rotating lists close quickly.
    fn dev_fixture() -> (Configs, AnalyzedData) {
        let mut configs = Configs::default();
        configs.repos.insert("test-repo".to_string(), test_repo());
        configs.workloads.insert(
            "w1".to_string(),
            WorkloadConfig {
                id: "w1".to_string(),
                maintainer: "alice".to_string(),
                labels: vec!["L1".to_string()],
                packages: vec!["bash".to_string()],
                ..WorkloadConfig::default()
            },
        );
        configs.views.insert(
            "v1".to_string(),
            ViewConfig {
                id: "v1".to_string(),
                view_type: ViewType::Compose,
                labels: vec!["L1".to_string()],
                repository: "test-repo".to_string(),
                buildroot_strategy: crate::config::BuildrootStrategy::RootLogs,
                architectures: vec!["x86_64".to_string()],
                ..ViewConfig::default()
            },
        );

        let mut data = AnalyzedData::default();
        for name in [
            "bash",
            "make",
            "unzip",
            "gawk",
            "xz",
            "findutils",
            "cpio",
            "diffutils",
        ] {
            insert_catalog_pkg(&mut data, make_test_pkg(name, "1.0-1", "x86_64", name));
        }

        data.workloads.insert(
            "w1:e1:test-repo:x86_64".to_string(),
            WorkloadResult {
                workload_conf_id: "w1".to_string(),
                env_conf_id: "e1".to_string(),
                repo_id: "test-repo".to_string(),
                arch: "x86_64".to_string(),
                pkg_added_ids: vec!["bash-1.0-1.x86_64".to_string()],
                labels: vec!["L1".to_string()],
                succeeded: true,
                env_succeeded: true,
                ..WorkloadResult::default()
            },
        );

        (configs, data)
    }

    /// Resolver that installs exactly the requested package names from the
    /// fixture catalog (each name maps to "name-1.0-1.x86_64").
    fn name_echo_solver() -> Arc<dyn Solver> {
        Arc::new(FakeSolver {
            catalogs: BTreeMap::new(),
            resolver: Box::new(|request: &ResolveRequest| {
                let mut success = ResolveSuccess::default();
                for name in &request.packages {
                    let pkg_id = format!("{name}-1.0-1.x86_64");
                    success.added_pkg_ids.push(pkg_id.clone());
                    success.relations.insert(
                        pkg_id,
                        crate::data::PkgRelations {
                            source_name: name.clone(),
                            ..crate::data::PkgRelations::default()
                        },
                    );
                }
                ResolveOutcome::Success(success)
            }),
        })
    }

    #[test]
    fn dev_buildroot_reaches_a_fixed_point_within_three_passes() {
        let _serial = crate::progress::test_serial_guard();
        reset_cancellation();
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(dir.path());
        let (configs, mut data) = dev_fixture();

        analyze_views(&configs, &mut data).expect("views should assemble");
        let solver = name_echo_solver();
        analyze_buildroot(&solver, &configs, &settings, &mut data)
            .expect("buildroot analysis should succeed");

        // bash -> gawk/xz/findutils -> cpio/diffutils -> bash/make/unzip,
        // all of which are already in scope by then.
        let srpms = &data.buildroot.srpms["test-repo"]["x86_64"];
        for name in ["bash", "gawk", "xz", "findutils", "cpio", "diffutils"] {
            assert!(
                srpms.contains_key(&format!("{name}-1.0-1")),
                "{name} should be in buildroot scope"
            );
        }

        let view = &data.views["v1:x86_64"];
        // Scenario: pkgs from bash's buildroot are level 1, from gawk's
        // buildroot level <= 2, and so on.
        let gawk = &view.pkgs["gawk-1.0-1.x86_64"];
        assert!(gawk.in_buildroot_of_srpm_id_all.contains("bash-1.0-1"));
        assert!(gawk.in_buildroot_of_srpm_id_req.contains("bash-1.0-1"));
        assert!(!gawk.level[1].all.is_empty());

        let cpio = &view.pkgs["cpio-1.0-1.x86_64"];
        assert!(cpio.in_buildroot_of_srpm_id_all.contains("gawk-1.0-1"));
        let cpio_first_level = cpio
            .level
            .iter()
            .position(|level| !level.all.is_empty())
            .expect("cpio should appear on some level");
        assert!(cpio_first_level <= 2);

        // Termination invariant: every binary of every resolved buildroot
        // records its buildroot srpm.
        for (srpm_id, srpm) in srpms {
            for pkg_id in srpm.pkg_added_ids.iter().chain(&srpm.pkg_env_ids) {
                let pkg = &view.pkgs[pkg_id];
                assert!(pkg.in_buildroot_of_srpm_id_all.contains(srpm_id));
            }
        }

        // The cache was written with the next generation.
        assert!(settings.root_log_deps_cache_path.exists());
        let cache = RootLogCache::load(&settings.root_log_deps_cache_path);
        assert!(!cache.current.is_empty());
    }

    #[test]
    fn root_log_cache_reads_current_before_next() {
        let mut cache = RootLogCache::default();
        cache
            .current
            .entry("koji".to_string())
            .or_default()
            .entry("x86_64".to_string())
            .or_default()
            .insert("bash-1.0-1".to_string(), vec!["gcc".to_string()]);
        cache.store("koji", "x86_64", "make-1.0-1", vec!["sed".to_string()]);

        assert_eq!(
            cache.lookup("koji", "x86_64", "bash-1.0-1"),
            Some(&vec!["gcc".to_string()])
        );
        assert_eq!(
            cache.lookup("koji", "x86_64", "make-1.0-1"),
            Some(&vec!["sed".to_string()])
        );
        assert_eq!(cache.lookup("koji", "x86_64", "unknown-1.0-1"), None);
    }

    #[test]
    fn cache_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache_root_log_deps.json");
        let mut cache = RootLogCache::default();
        cache.store("koji", "x86_64", "bash-1.0-1", vec!["gcc".to_string()]);
        cache.write_next(&path).expect("cache should write");

        let reloaded = RootLogCache::load(&path);
        assert_eq!(
            reloaded.lookup("koji", "x86_64", "bash-1.0-1"),
            Some(&vec!["gcc".to_string()])
        );
        assert!(reloaded.next.is_empty());
    }

    #[test]
    fn build_group_failure_is_fatal() {
        let _serial = crate::progress::test_serial_guard();
        reset_cancellation();
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = test_settings(dir.path());
        let (configs, mut data) = dev_fixture();
        analyze_views(&configs, &mut data).expect("views should assemble");

        let solver: Arc<dyn Solver> = Arc::new(FakeSolver {
            catalogs: BTreeMap::new(),
            resolver: Box::new(|_| {
                ResolveOutcome::Failure(crate::solver::ResolveFailure {
                    kind: crate::solver::FailureKind::DepSolve,
                    message: "no build group".to_string(),
                })
            }),
        });
        let err = analyze_buildroot(&solver, &configs, &settings, &mut data)
            .expect_err("build group failure must abort");
        assert!(format!("{err:#}").contains("build group analysis error"));
    }
}
