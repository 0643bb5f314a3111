use crate::config::{Configs, EnvConfig, PlaceholderPkg, RepoConfig, Settings, WorkloadConfig};
use crate::data::{
    AnalyzedData, EnvResult, PkgRelations, RepoData, WorkloadResult, env_id,
    pkg_id_to_name, pkg_placeholder_name_to_id, workload_id,
};
use crate::progress::log_progress;
use crate::runner::{ResolveJob, run_resolve_jobs};
use crate::solver::{ResolveOp, ResolveOutcome, ResolveRequest, Solver, solver_repos_for};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

///////////////////////////////////////////////////////////////////////////////
// Repos
///////////////////////////////////////////////////////////////////////////////

/// Lists every package of every repo on every arch the repo supports, and
/// reads the optional compose metadata.
pub fn analyze_repos(
    solver: &Arc<dyn Solver>,
    configs: &Configs,
    data: &mut AnalyzedData,
) -> Result<()> {
    let mut targets: Vec<(&RepoConfig, String)> = Vec::new();
    for repo in configs.repos.values() {
        for arch in &repo.source.architectures {
            targets.push((repo, arch.clone()));
        }
    }

    let catalogs: Vec<Result<((String, String), _)>> = targets
        .par_iter()
        .map(|(repo, arch)| {
            log_progress(format!(
                "phase=repos status=analyzing repo={} arch={arch}",
                repo.id
            ));
            let pkgs = solver.list_all_packages(repo, arch)?;
            log_progress(format!(
                "phase=repos status=done repo={} arch={arch} pkgs={}",
                repo.id,
                pkgs.len()
            ));
            Ok(((repo.id.clone(), arch.clone()), pkgs))
        })
        .collect();

    for catalog in catalogs {
        let ((repo_id, arch), pkgs) = catalog?;
        data.pkgs.entry(repo_id).or_default().insert(arch, pkgs);
    }

    for repo in configs.repos.values() {
        data.pkgs.entry(repo.id.clone()).or_default();
        let mut repo_data = RepoData::default();
        if let Some(composeinfo_url) = &repo.source.composeinfo {
            read_composeinfo(composeinfo_url, &mut repo_data);
        }
        data.repos.insert(repo.id.clone(), repo_data);
    }

    Ok(())
}

/// Best effort: any failure leaves the compose date unset.
fn read_composeinfo(url: &str, repo_data: &mut RepoData) {
    let fetched = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .and_then(|client| client.get(url).send())
        .and_then(reqwest::blocking::Response::error_for_status);
    let Ok(response) = fetched else {
        return;
    };
    let Ok(composeinfo) = response.json::<serde_json::Value>() else {
        return;
    };
    let Some(date_raw) = composeinfo
        .get("payload")
        .and_then(|payload| payload.get("compose"))
        .and_then(|compose| compose.get("date"))
        .and_then(serde_json::Value::as_str)
    else {
        return;
    };
    let Ok(compose_date) = NaiveDate::parse_from_str(date_raw, "%Y%m%d") else {
        return;
    };
    repo_data.compose_date = Some(compose_date.format("%Y-%m-%d").to_string());
    repo_data.compose_days_ago = (Local::now().date_naive() - compose_date).num_days();
}

///////////////////////////////////////////////////////////////////////////////
// Environments
///////////////////////////////////////////////////////////////////////////////

/// Resolves one environment into a fresh fake root.
pub fn analyze_env(
    solver: &Arc<dyn Solver>,
    env_conf: &EnvConfig,
    repo: &RepoConfig,
    arch: &str,
    want_recommends: bool,
) -> Result<EnvResult> {
    let mut env = EnvResult {
        env_conf_id: env_conf.id.clone(),
        repo_id: repo.id.clone(),
        arch: arch.to_string(),
        succeeded: true,
        ..EnvResult::default()
    };

    let mut packages = env_conf.packages.clone();
    packages.extend(env_conf.arch_packages_for(arch).iter().cloned());

    let request = ResolveRequest {
        op: ResolveOp::CreateEnv,
        repo_id: repo.id.clone(),
        arch: arch.to_string(),
        releasever: repo.source.releasever.clone(),
        root_id: format!("dnf_env_installroot-{}-{}-{arch}", env_conf.id, repo.id),
        repos: solver_repos_for(repo, arch),
        load_system_repo: false,
        packages,
        groups: env_conf.groups.clone(),
        placeholder_requires: Vec::new(),
        install_weak_deps: env_conf.include_weak_deps(),
        include_docs: env_conf.include_docs(),
        want_recommends,
    };

    match solver.resolve(&request)? {
        ResolveOutcome::Failure(failure) => {
            log_progress(format!(
                "phase=envs status=failed env={} repo={} arch={arch} detail={}",
                env_conf.id,
                repo.id,
                crate::progress::compact_reason(&failure.message, 240)
            ));
            env.succeeded = false;
            env.errors.message = Some(failure.message);
        }
        ResolveOutcome::Success(success) => {
            env.errors.non_existing_pkgs = success
                .not_found_pkgs
                .iter()
                .chain(success.not_found_groups.iter())
                .cloned()
                .collect();
            let mut pkg_ids: Vec<String> = success
                .env_pkg_ids
                .iter()
                .chain(success.added_pkg_ids.iter())
                .cloned()
                .collect();
            pkg_ids.sort();
            pkg_ids.dedup();
            env.pkg_ids = pkg_ids;
            env.pkg_relations = success.relations;
        }
    }

    Ok(env)
}

/// Resolves all environments: the cross-product of env configs, the repos
/// each lists, and the arches each repo supports.
pub fn analyze_envs(
    solver: &Arc<dyn Solver>,
    configs: &Configs,
    data: &mut AnalyzedData,
) -> Result<()> {
    for env_conf in configs.envs.values() {
        for repo_id in &env_conf.repositories {
            let Some(repo) = configs.repos.get(repo_id) else {
                log_progress(format!(
                    "phase=envs status=skipping-unknown-repo env={} repo={repo_id}",
                    env_conf.id
                ));
                continue;
            };
            for arch in &repo.source.architectures {
                log_progress(format!(
                    "phase=envs status=analyzing env={} repo={repo_id} arch={arch}",
                    env_conf.id
                ));
                let env = analyze_env(solver, env_conf, repo, arch, true)?;
                data.envs.insert(env_id(&env_conf.id, repo_id, arch), env);
            }
        }
    }
    Ok(())
}

///////////////////////////////////////////////////////////////////////////////
// Workloads
///////////////////////////////////////////////////////////////////////////////

/// Workload-to-environment matching: a workload runs in every env that
/// shares at least one label with it.
pub fn workload_env_map(configs: &Configs) -> BTreeMap<String, BTreeSet<String>> {
    let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (workload_conf_id, workload_conf) in &configs.workloads {
        let envs = map.entry(workload_conf_id.clone()).or_default();
        for label in &workload_conf.labels {
            for (env_conf_id, env_conf) in &configs.envs {
                if env_conf.labels.iter().any(|env_label| env_label == label) {
                    envs.insert(env_conf_id.clone());
                }
            }
        }
    }
    map
}

/// Placeholder binaries applicable on the arch (no whitelist, or the arch
/// is whitelisted).
pub fn placeholder_pkgs_for_arch<'a>(
    workload_conf: &'a WorkloadConfig,
    arch: &str,
) -> Vec<&'a PlaceholderPkg> {
    workload_conf
        .package_placeholders
        .pkgs
        .values()
        .filter(|placeholder| {
            placeholder.limit_arches.is_empty()
                || placeholder.limit_arches.iter().any(|a| a == arch)
        })
        .collect()
}

pub fn placeholder_srpm_names_for_arch(workload_conf: &WorkloadConfig, arch: &str) -> Vec<String> {
    workload_conf
        .package_placeholders
        .srpms
        .values()
        .filter(|placeholder| {
            placeholder.limit_arches.is_empty()
                || placeholder.limit_arches.iter().any(|a| a == arch)
        })
        .map(|placeholder| placeholder.name.clone())
        .collect()
}

/// Builds the resolve request for one workload on one env root.
pub fn workload_request(
    workload_conf: &WorkloadConfig,
    env_conf: &EnvConfig,
    repo: &RepoConfig,
    arch: &str,
    want_recommends: bool,
) -> ResolveRequest {
    let mut packages = workload_conf.packages.clone();
    packages.extend(workload_conf.arch_packages_for(arch).iter().cloned());

    let placeholder_requires: Vec<String> = placeholder_pkgs_for_arch(workload_conf, arch)
        .iter()
        .flat_map(|placeholder| placeholder.requires.iter().cloned())
        .collect();

    ResolveRequest {
        op: ResolveOp::ResolveWorkload,
        repo_id: repo.id.clone(),
        arch: arch.to_string(),
        releasever: repo.source.releasever.clone(),
        root_id: format!("dnf_env_installroot-{}-{}-{arch}", env_conf.id, repo.id),
        repos: solver_repos_for(repo, arch),
        load_system_repo: !env_conf.is_empty(arch),
        packages,
        groups: workload_conf.groups.clone(),
        placeholder_requires,
        install_weak_deps: workload_conf.include_weak_deps(),
        include_docs: workload_conf.include_docs(),
        want_recommends,
    }
}

fn missing_message(errors_or_warnings: (&[String], &[String]), skipped: bool) -> Option<String> {
    let (pkgs, placeholder_deps) = errors_or_warnings;
    if pkgs.is_empty() && placeholder_deps.is_empty() {
        return None;
    }
    let suffix = if skipped { " (and were skipped)" } else { "" };
    let mut lines = Vec::new();
    if !pkgs.is_empty() {
        lines.push(format!(
            "The following required packages are not available{suffix}:"
        ));
        for pkg_name in pkgs {
            lines.push(format!("  - {pkg_name}"));
        }
    }
    if !placeholder_deps.is_empty() {
        lines.push(format!(
            "The following dependencies of package placeholders are not available{suffix}:"
        ));
        for pkg_name in placeholder_deps {
            lines.push(format!("  - {pkg_name}"));
        }
    }
    Some(lines.join("\n"))
}

/// Turns a solver outcome into the workload result, classifying missing
/// packages as errors or warnings based on the workload's `strict` option.
pub fn workload_result_from_outcome(
    workload_conf: &WorkloadConfig,
    env_conf: &EnvConfig,
    repo_id: &str,
    arch: &str,
    outcome: &ResolveOutcome,
    settings: &Settings,
) -> WorkloadResult {
    let mut workload = WorkloadResult {
        workload_conf_id: workload_conf.id.clone(),
        env_conf_id: env_conf.id.clone(),
        repo_id: repo_id.to_string(),
        arch: arch.to_string(),
        succeeded: true,
        env_succeeded: true,
        ..WorkloadResult::default()
    };

    // A workload only carries labels both it and its env agree on.
    workload.labels = workload_conf
        .labels
        .iter()
        .filter(|label| env_conf.labels.contains(label))
        .cloned()
        .collect();

    let success = match outcome {
        ResolveOutcome::Failure(failure) => {
            workload.succeeded = false;
            workload.errors.message = Some(failure.message.clone());
            return workload;
        }
        ResolveOutcome::Success(success) => success,
    };

    let strict = workload_conf.strict();
    for pkg_name in &success.not_found_pkgs {
        if settings.uninstallable_packages.iter().any(|p| p == pkg_name) {
            continue;
        }
        if strict {
            workload.errors.non_existing_pkgs.push(pkg_name.clone());
        } else {
            workload.warnings.non_existing_pkgs.push(pkg_name.clone());
        }
    }
    for pkg_name in &success.not_found_placeholder_deps {
        if strict {
            workload
                .errors
                .non_existing_placeholder_deps
                .push(pkg_name.clone());
        } else {
            workload
                .warnings
                .non_existing_placeholder_deps
                .push(pkg_name.clone());
        }
    }
    // A missing group always fails the workload.
    workload
        .errors
        .non_existing_pkgs
        .extend(success.not_found_groups.iter().cloned());

    if !workload.errors.non_existing_pkgs.is_empty()
        || !workload.errors.non_existing_placeholder_deps.is_empty()
    {
        workload.errors.message = missing_message(
            (
                &workload.errors.non_existing_pkgs,
                &workload.errors.non_existing_placeholder_deps,
            ),
            false,
        );
        workload.succeeded = false;
        // Failed workloads keep empty package sets.
        return workload;
    }

    workload.warnings.message = missing_message(
        (
            &workload.warnings.non_existing_pkgs,
            &workload.warnings.non_existing_placeholder_deps,
        ),
        true,
    );

    workload.pkg_env_ids = success.env_pkg_ids.clone();
    workload.pkg_added_ids = success.added_pkg_ids.clone();
    workload.pkg_env_ids.sort();
    workload.pkg_added_ids.sort();
    workload.pkg_relations = success.relations.clone();

    // The analysis succeeded, so placeholders join the result. Their
    // relations entries are empty, and any resolved package a placeholder
    // requires gets the placeholder recorded as a dependent.
    let placeholders = placeholder_pkgs_for_arch(workload_conf, arch);
    for placeholder in &placeholders {
        let placeholder_id = pkg_placeholder_name_to_id(&placeholder.name);
        workload.pkg_placeholder_ids.push(placeholder_id.clone());
        workload
            .pkg_relations
            .insert(placeholder_id, PkgRelations::default());
    }
    for placeholder in &placeholders {
        let placeholder_id = pkg_placeholder_name_to_id(&placeholder.name);
        let mut dependents: Vec<String> = Vec::new();
        for pkg_id in workload.pkg_relations.keys() {
            if placeholder
                .requires
                .iter()
                .any(|required| required == pkg_id_to_name(pkg_id))
            {
                dependents.push(pkg_id.clone());
            }
        }
        for pkg_id in dependents {
            if let Some(relations) = workload.pkg_relations.get_mut(&pkg_id) {
                relations.required_by.push(placeholder_id.clone());
                relations.required_by.sort();
                relations.required_by.dedup();
            }
        }
    }
    workload.srpm_placeholder_names = placeholder_srpm_names_for_arch(workload_conf, arch);

    workload
}

/// Resolves every workload in every matching env on every repo and arch.
/// Workloads whose env failed become stubs without ever hitting the
/// solver.
pub fn analyze_workloads(
    solver: &Arc<dyn Solver>,
    configs: &Configs,
    settings: &Settings,
    data: &mut AnalyzedData,
) -> Result<()> {
    let env_map = workload_env_map(configs);

    let mut jobs: Vec<ResolveJob> = Vec::new();
    let mut job_meta: BTreeMap<String, (String, String, String, String)> = BTreeMap::new();

    for (workload_conf_id, workload_conf) in &configs.workloads {
        let Some(env_conf_ids) = env_map.get(workload_conf_id) else {
            continue;
        };
        for env_conf_id in env_conf_ids {
            let env_conf = configs
                .envs
                .get(env_conf_id)
                .context("workload env map references a missing env")?;
            for repo_id in &env_conf.repositories {
                let Some(repo) = configs.repos.get(repo_id) else {
                    continue;
                };
                for arch in &repo.source.architectures {
                    let this_workload_id =
                        workload_id(workload_conf_id, env_conf_id, repo_id, arch);
                    let this_env_id = env_id(env_conf_id, repo_id, arch);

                    let env_succeeded = data
                        .envs
                        .get(&this_env_id)
                        .map(|env| env.succeeded)
                        .unwrap_or(false);
                    if !env_succeeded {
                        data.workloads.insert(
                            this_workload_id,
                            WorkloadResult::failed_env_stub(
                                workload_conf_id,
                                env_conf_id,
                                repo_id,
                                arch,
                            ),
                        );
                        continue;
                    }

                    job_meta.insert(
                        this_workload_id.clone(),
                        (
                            workload_conf_id.clone(),
                            env_conf_id.clone(),
                            repo_id.clone(),
                            arch.clone(),
                        ),
                    );
                    jobs.push(ResolveJob {
                        key: this_workload_id,
                        workload_conf_id: workload_conf_id.clone(),
                        env_conf_id: env_conf_id.clone(),
                        repo_id: repo_id.clone(),
                        arch: arch.clone(),
                        request: workload_request(workload_conf, env_conf, repo, arch, true),
                    });
                }
            }
        }
    }

    let outcomes = run_resolve_jobs(solver, jobs, settings.max_subprocesses)?;

    for (key, outcome) in &outcomes {
        let (workload_conf_id, env_conf_id, repo_id, arch) = job_meta
            .get(key)
            .context("resolver returned a result for an unknown job")?;
        let workload_conf = &configs.workloads[workload_conf_id];
        let env_conf = &configs.envs[env_conf_id];
        data.workloads.insert(
            key.clone(),
            workload_result_from_outcome(workload_conf, env_conf, repo_id, arch, outcome, settings),
        );
    }

    log_progress(format!(
        "phase=workloads status=done workloads={}",
        data.workloads.len()
    ));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{FakeSolver, ResolveFailure, ResolveSuccess};

    fn env_conf(id: &str, labels: &[&str]) -> EnvConfig {
        EnvConfig {
            id: id.to_string(),
            name: id.to_string(),
            maintainer: "env-maint".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            repositories: vec!["test-repo".to_string()],
            ..EnvConfig::default()
        }
    }

    fn workload_conf(id: &str, labels: &[&str]) -> WorkloadConfig {
        WorkloadConfig {
            id: id.to_string(),
            name: id.to_string(),
            maintainer: "workload-maint".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            packages: vec!["nano".to_string()],
            ..WorkloadConfig::default()
        }
    }

    fn test_settings() -> Settings {
        Settings {
            configs_dir: "/tmp".into(),
            output_dir: "/tmp".into(),
            use_cache: false,
            dev_buildroot: false,
            dnf_cache_dir_override: None,
            solver_command: "unused".to_string(),
            max_subprocesses: 2,
            allowed_arches: vec!["x86_64".to_string()],
            uninstallable_packages: vec!["glibc32".to_string()],
            skipped_maintainers: Vec::new(),
            root_log_deps_cache_path: "/tmp/cache_root_log_deps.json".into(),
            strict: false,
        }
    }

    #[test]
    fn workloads_map_to_envs_by_label_intersection() {
        let mut configs = Configs::default();
        configs
            .workloads
            .insert("w1".to_string(), workload_conf("w1", &["L1"]));
        configs.envs.insert("e1".to_string(), env_conf("e1", &["L1", "L2"]));
        configs.envs.insert("e2".to_string(), env_conf("e2", &["L2"]));

        let map = workload_env_map(&configs);
        assert_eq!(map["w1"], BTreeSet::from(["e1".to_string()]));
    }

    #[test]
    fn missing_pkgs_fail_strict_workloads_and_warn_otherwise() {
        let settings = test_settings();
        let env = env_conf("e1", &["L1"]);
        let outcome = ResolveOutcome::Success(ResolveSuccess {
            env_pkg_ids: vec!["bash-5.2-1.x86_64".to_string()],
            added_pkg_ids: vec!["nano-7.2-1.x86_64".to_string()],
            not_found_pkgs: vec!["no-such-pkg".to_string(), "glibc32".to_string()],
            ..ResolveSuccess::default()
        });

        let mut strict_conf = workload_conf("w1", &["L1"]);
        strict_conf.options = vec!["strict".to_string()];
        let strict_result = workload_result_from_outcome(
            &strict_conf,
            &env,
            "test-repo",
            "x86_64",
            &outcome,
            &settings,
        );
        assert!(!strict_result.succeeded);
        assert_eq!(strict_result.errors.non_existing_pkgs, vec!["no-such-pkg"]);
        assert!(strict_result.pkg_env_ids.is_empty());
        assert!(strict_result.pkg_added_ids.is_empty());

        let lenient_conf = workload_conf("w1", &["L1"]);
        let lenient_result = workload_result_from_outcome(
            &lenient_conf,
            &env,
            "test-repo",
            "x86_64",
            &outcome,
            &settings,
        );
        assert!(lenient_result.succeeded);
        // glibc32 is on the uninstallable allowlist and is skipped silently
        assert_eq!(lenient_result.warnings.non_existing_pkgs, vec!["no-such-pkg"]);
        assert!(lenient_result.warnings.message.is_some());
        assert_eq!(lenient_result.pkg_env_ids, vec!["bash-5.2-1.x86_64"]);
        assert_eq!(lenient_result.pkg_added_ids, vec!["nano-7.2-1.x86_64"]);
    }

    #[test]
    fn workload_labels_are_the_env_intersection() {
        let settings = test_settings();
        let env = env_conf("e1", &["L1", "L3"]);
        let conf = workload_conf("w1", &["L1", "L2"]);
        let outcome = ResolveOutcome::Success(ResolveSuccess::default());
        let result =
            workload_result_from_outcome(&conf, &env, "test-repo", "x86_64", &outcome, &settings);
        assert_eq!(result.labels, vec!["L1"]);
    }

    #[test]
    fn resolve_failure_is_recorded_not_fatal() {
        let settings = test_settings();
        let env = env_conf("e1", &["L1"]);
        let conf = workload_conf("w1", &["L1"]);
        let outcome = ResolveOutcome::Failure(ResolveFailure {
            kind: crate::solver::FailureKind::DepSolve,
            message: "nothing provides libfoo".to_string(),
        });
        let result =
            workload_result_from_outcome(&conf, &env, "test-repo", "x86_64", &outcome, &settings);
        assert!(!result.succeeded);
        assert!(result.env_succeeded);
        assert_eq!(
            result.errors.message.as_deref(),
            Some("nothing provides libfoo")
        );
    }

    #[test]
    fn placeholders_join_successful_results_and_their_requires_point_back() {
        let settings = test_settings();
        let env = env_conf("e1", &["L1"]);
        let mut conf = workload_conf("w1", &["L1"]);
        conf.package_placeholders.pkgs.insert(
            "fictional-bin".to_string(),
            PlaceholderPkg {
                name: "fictional-bin".to_string(),
                description: "a fictional binary".to_string(),
                requires: vec!["nano".to_string()],
                limit_arches: Vec::new(),
                srpm: "fictional".to_string(),
            },
        );
        conf.package_placeholders.srpms.insert(
            "fictional".to_string(),
            crate::config::PlaceholderSrpm {
                name: "fictional".to_string(),
                buildrequires: vec!["gcc".to_string()],
                limit_arches: vec!["aarch64".to_string()],
            },
        );

        let mut relations = BTreeMap::new();
        relations.insert(
            "nano-7.2-1.x86_64".to_string(),
            PkgRelations {
                source_name: "nano".to_string(),
                ..PkgRelations::default()
            },
        );
        let outcome = ResolveOutcome::Success(ResolveSuccess {
            added_pkg_ids: vec!["nano-7.2-1.x86_64".to_string()],
            relations,
            ..ResolveSuccess::default()
        });

        let result =
            workload_result_from_outcome(&conf, &env, "test-repo", "x86_64", &outcome, &settings);
        assert_eq!(
            result.pkg_placeholder_ids,
            vec!["fictional-bin-000-placeholder.placeholder"]
        );
        // The srpm placeholder is limited to aarch64, so it's absent here
        assert!(result.srpm_placeholder_names.is_empty());
        let nano_relations = &result.pkg_relations["nano-7.2-1.x86_64"];
        assert!(
            nano_relations
                .required_by
                .contains(&"fictional-bin-000-placeholder.placeholder".to_string())
        );
        // The placeholder itself has an (empty) relations entry
        assert!(
            result
                .pkg_relations
                .contains_key("fictional-bin-000-placeholder.placeholder")
        );
    }

    #[test]
    fn failed_envs_produce_workload_stubs_without_jobs() {
        let mut configs = Configs::default();
        configs
            .workloads
            .insert("w1".to_string(), workload_conf("w1", &["L1"]));
        configs.envs.insert("e1".to_string(), env_conf("e1", &["L1"]));
        configs.repos.insert(
            "test-repo".to_string(),
            RepoConfig {
                id: "test-repo".to_string(),
                source: crate::config::RepoSource {
                    releasever: "40".to_string(),
                    architectures: vec!["x86_64".to_string()],
                    ..crate::config::RepoSource::default()
                },
                ..RepoConfig::default()
            },
        );

        let mut data = AnalyzedData::default();
        data.envs.insert(
            "e1:test-repo:x86_64".to_string(),
            EnvResult {
                env_conf_id: "e1".to_string(),
                repo_id: "test-repo".to_string(),
                arch: "x86_64".to_string(),
                succeeded: false,
                ..EnvResult::default()
            },
        );

        let solver: Arc<dyn Solver> = Arc::new(FakeSolver {
            catalogs: BTreeMap::new(),
            resolver: Box::new(|_| {
                panic!("no job should be submitted for a failed env");
            }),
        });
        let settings = test_settings();
        analyze_workloads(&solver, &configs, &settings, &mut data)
            .expect("workload analysis should succeed");

        let stub = &data.workloads["w1:e1:test-repo:x86_64"];
        assert!(!stub.succeeded);
        assert!(!stub.env_succeeded);
        assert!(stub.pkg_added_ids.is_empty());
    }
}
