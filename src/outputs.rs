use crate::config::{Configs, Settings};
use crate::data::AnalyzedData;
use crate::progress::log_progress;
use crate::query::Query;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

pub fn dump_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let serialized = serde_json::to_string(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    fs::write(path, serialized).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Writes the cache pair that `--use-cache` reads back.
pub fn write_caches(settings: &Settings, configs: &Configs, data: &AnalyzedData) -> Result<()> {
    dump_json(&settings.output_dir.join("cache_configs.json"), configs)?;
    dump_json(&settings.output_dir.join("cache_data.json"), data)?;
    Ok(())
}

pub fn load_caches(settings: &Settings) -> Result<(Configs, AnalyzedData)> {
    let configs = load_json(&settings.output_dir.join("cache_configs.json"))?;
    let data = load_json(&settings.output_dir.join("cache_data.json"))?;
    Ok((configs, data))
}

fn write_txt_list(output_dir: &Path, file_name: &str, lines: &BTreeSet<String>) -> Result<()> {
    let path = output_dir.join(format!("{}.txt", file_name.replace(':', "--")));
    let contents = lines.iter().cloned().collect::<Vec<_>>().join("\n");
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

const VIEW_LIST_NAMES: [&str; 15] = [
    "view-all-binary-package-list",
    "view-all-binary-package-nevr-list",
    "view-all-binary-package-name-list",
    "view-all-source-package-list",
    "view-all-source-package-name-list",
    "view-binary-package-list",
    "view-binary-package-nevr-list",
    "view-binary-package-name-list",
    "view-source-package-list",
    "view-source-package-name-list",
    "view-buildroot-package-list",
    "view-buildroot-package-nevr-list",
    "view-buildroot-package-name-list",
    "view-buildroot-source-package-list",
    "view-buildroot-source-package-name-list",
];

/// The plain-text package lists per view: everything, the runtime subset,
/// and the buildroot subset, as binary NEVRAs/NEVRs/names and source
/// NVRs/names, per arch and unioned across arches.
fn generate_view_lists(query: &Query) -> Result<()> {
    let output_dir = &query.settings.output_dir;

    for (view_conf_id, view_conf) in &query.configs.views {
        let mut all_arches_lists: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();

        for arch in &view_conf.architectures {
            let mut lists: BTreeMap<&str, BTreeSet<String>> = VIEW_LIST_NAMES
                .iter()
                .map(|name| (*name, BTreeSet::new()))
                .collect();

            if let Some(view) = query.view(view_conf_id, arch) {
                for (pkg_id, pkg) in &view.pkgs {
                    let srpm_id = pkg.srpm_id();

                    let mut add = |list_name: &str, value: String| {
                        if let Some(list) = lists.get_mut(list_name) {
                            list.insert(value);
                        }
                    };

                    add("view-all-binary-package-list", pkg_id.clone());
                    add("view-all-binary-package-nevr-list", pkg.nevr.clone());
                    add("view-all-binary-package-name-list", pkg.name.clone());
                    add("view-all-source-package-list", srpm_id.clone());
                    add("view-all-source-package-name-list", pkg.source_name.clone());

                    if !pkg.in_workload_ids_all.is_empty() {
                        add("view-binary-package-list", pkg_id.clone());
                        add("view-binary-package-nevr-list", pkg.nevr.clone());
                        add("view-binary-package-name-list", pkg.name.clone());
                        add("view-source-package-list", srpm_id.clone());
                        add("view-source-package-name-list", pkg.source_name.clone());
                    } else {
                        add("view-buildroot-package-list", pkg_id.clone());
                        add("view-buildroot-package-nevr-list", pkg.nevr.clone());
                        add("view-buildroot-package-name-list", pkg.name.clone());
                        add("view-buildroot-source-package-list", srpm_id.clone());
                        add("view-buildroot-source-package-name-list", pkg.source_name.clone());
                    }
                }
            }

            for (list_name, list_content) in &lists {
                write_txt_list(
                    output_dir,
                    &format!("{list_name}--{view_conf_id}--{arch}"),
                    list_content,
                )?;
                all_arches_lists
                    .entry(list_name)
                    .or_default()
                    .extend(list_content.iter().cloned());
            }
        }

        for (list_name, list_content) in &all_arches_lists {
            write_txt_list(
                output_dir,
                &format!("{list_name}--{view_conf_id}"),
                list_content,
            )?;
        }
    }

    Ok(())
}

fn generate_env_json_files(query: &Query) -> Result<()> {
    let output_dir = &query.settings.output_dir;

    for (env_conf_id, env_conf) in &query.configs.envs {
        let conf_output = serde_json::json!({
            "id": env_conf_id,
            "type": "env_conf",
            "data": env_conf,
        });
        dump_json(
            &output_dir.join(format!("env-conf--{}.json", Query::url_slug_id(env_conf_id))),
            &conf_output,
        )?;

        for env_id in query.envs(Some(env_conf_id.as_str()), None, None) {
            let env = &query.data.envs[&env_id];
            let size = query.env_size(Some(env_conf_id.as_str()), Some(env.repo_id.as_str()), Some(env.arch.as_str()));
            let output = serde_json::json!({
                "id": env_id,
                "type": "env",
                "data": env,
                "pkg_query": query.env_pkgs(Some(env_conf_id.as_str()), Some(env.repo_id.as_str()), Some(env.arch.as_str())),
                "size": Query::size(size as f64),
            });
            dump_json(
                &output_dir.join(format!("env--{}.json", Query::url_slug_id(&env_id))),
                &output,
            )?;
        }
    }

    Ok(())
}

fn generate_workload_json_files(query: &Query) -> Result<()> {
    let output_dir = &query.settings.output_dir;

    for (workload_conf_id, workload_conf) in &query.configs.workloads {
        let conf_output = serde_json::json!({
            "id": workload_conf_id,
            "type": "workload_conf",
            "data": workload_conf,
        });
        dump_json(
            &output_dir.join(format!(
                "workload-conf--{}.json",
                Query::url_slug_id(workload_conf_id)
            )),
            &conf_output,
        )?;

        for workload_id in query.workloads(Some(workload_conf_id.as_str()), None, None, None) {
            let workload = &query.data.workloads[&workload_id];
            let size = query.workload_size(
                Some(workload_conf_id.as_str()),
                Some(workload.env_conf_id.as_str()),
                Some(workload.repo_id.as_str()),
                Some(workload.arch.as_str()),
            );
            let output = serde_json::json!({
                "id": workload_id,
                "type": "workload",
                "data": workload,
                "pkg_query": query.workload_pkgs(
                    Some(workload_conf_id.as_str()),
                    Some(workload.env_conf_id.as_str()),
                    Some(workload.repo_id.as_str()),
                    Some(workload.arch.as_str()),
                ),
                "size": Query::size(size as f64),
            });
            dump_json(
                &output_dir.join(format!("workload--{}.json", Query::url_slug_id(&workload_id))),
                &output,
            )?;
        }
    }

    Ok(())
}

fn generate_view_json_files(query: &Query) -> Result<()> {
    let output_dir = &query.settings.output_dir;

    for view_conf_id in query.configs.views.keys() {
        let Some(view_all_arches) = query.data.views_all_arches.get(view_conf_id) else {
            continue;
        };
        let slug = Query::url_slug_id(view_conf_id);

        let mut pkgs = serde_json::Map::new();
        for (nevr, pkg) in &view_all_arches.pkgs_by_nevr {
            pkgs.insert(
                nevr.clone(),
                serde_json::json!({
                    "name": pkg.name,
                    "source_name": pkg.source_name,
                    "arches_arches": pkg.arches_arches,
                    "placeholder": pkg.placeholder,
                    "hard_dependency_of_pkg_nevrs": pkg.dependants.hard_dependency_of_pkg_nevrs,
                    "weak_dependency_of_pkg_nevrs": pkg.dependants.weak_dependency_of_pkg_nevrs,
                    "in_workload_conf_ids_req": pkg.rollup.in_workload_conf_ids_req,
                    "level_number": pkg.rollup.level_number,
                }),
            );
        }
        dump_json(
            &output_dir.join(format!("view-packages--{slug}.json")),
            &serde_json::json!({ "id": view_conf_id, "pkgs": pkgs }),
        )?;

        let mut srpms = serde_json::Map::new();
        for (srpm_name, srpm) in &view_all_arches.source_pkgs_by_name {
            srpms.insert(
                srpm_name.clone(),
                serde_json::json!({
                    "name": srpm.name,
                    "arches": srpm.arches,
                    "best_maintainers": srpm.rollup.best_maintainers,
                    "level_number": srpm.rollup.level_number,
                    "in_workload_conf_ids_env": srpm.rollup.in_workload_conf_ids_env,
                    "in_workload_conf_ids_req": srpm.rollup.in_workload_conf_ids_req,
                    "in_workload_conf_ids_dep": srpm.rollup.in_workload_conf_ids_dep,
                    "in_buildroot_of_srpm_name_req": srpm.rollup.in_buildroot_of_srpm_name_req,
                    "in_buildroot_of_srpm_name_dep": srpm.rollup.in_buildroot_of_srpm_name_dep,
                }),
            );
        }
        dump_json(
            &output_dir.join(format!("view-sources--{slug}.json")),
            &serde_json::json!({ "id": view_conf_id, "srpms": srpms }),
        )?;

        dump_json(
            &output_dir.join(format!("view-workloads--{slug}.json")),
            &serde_json::json!({
                "id": view_conf_id,
                "workloads": view_all_arches.workloads,
            }),
        )?;
    }

    Ok(())
}

/// Navigation indices: which env/repo/arch combinations each workload and
/// env config actually resolved into, with rolled-up success flags.
fn generate_index_files(query: &Query) -> Result<()> {
    use crate::query::IdPart;

    let output_dir = &query.settings.output_dir;

    let mut workload_index = serde_json::Map::new();
    for workload_conf_id in query.configs.workloads.keys() {
        if !query.workloads_exist(Some(workload_conf_id.as_str()), None, None, None) {
            continue;
        }
        workload_index.insert(
            workload_conf_id.clone(),
            serde_json::json!({
                "env_conf_ids": query.workloads_project(
                    Some(workload_conf_id.as_str()), None, None, None, IdPart::EnvConfIds),
                "repo_ids": query.workloads_project(
                    Some(workload_conf_id.as_str()), None, None, None, IdPart::RepoIds),
                "arches": query.workloads_project(
                    Some(workload_conf_id.as_str()), None, None, None, IdPart::Arches),
                "succeeded": query.workload_succeeded(
                    Some(workload_conf_id.as_str()), None, None, None),
                "has_warnings": query.workload_warnings(
                    Some(workload_conf_id.as_str()), None, None, None),
            }),
        );
    }
    dump_json(
        &output_dir.join("workload-index.json"),
        &serde_json::json!({
            "workload_conf_ids": query.workloads_project(
                None, None, None, None, IdPart::WorkloadConfIds),
            "workloads": workload_index,
        }),
    )?;

    let mut env_index = serde_json::Map::new();
    for env_conf_id in query.configs.envs.keys() {
        if !query.envs_exist(Some(env_conf_id.as_str()), None, None) {
            continue;
        }
        env_index.insert(
            env_conf_id.clone(),
            serde_json::json!({
                "repo_ids": query.envs_project(Some(env_conf_id.as_str()), None, None, IdPart::RepoIds)?,
                "arches": query.envs_project(Some(env_conf_id.as_str()), None, None, IdPart::Arches)?,
                "succeeded": query.env_succeeded(Some(env_conf_id.as_str()), None, None),
            }),
        );
    }
    dump_json(&output_dir.join("env-index.json"), &env_index)?;

    Ok(())
}

/// Per-view-per-arch summaries for the page writers: membership lists,
/// maintainers, unwanted proposals, placeholders, and the legacy
/// buildroot override contents.
fn generate_view_summary_files(query: &Query) -> Result<()> {
    use crate::query::PkgList;

    let output_dir = &query.settings.output_dir;

    for view_conf_id in query.configs.views.keys() {
        for arch in query.arches_in_view(view_conf_id) {
            if query.view(view_conf_id, &arch).is_none() {
                continue;
            }
            let output = serde_json::json!({
                "id": view_conf_id,
                "arch": arch,
                "succeeded": query.view_succeeded(view_conf_id, Some(arch.as_str()), None),
                "workload_ids": query.workloads_in_view(view_conf_id, Some(arch.as_str()), None),
                "maintainers": query.view_maintainers(view_conf_id, Some(arch.as_str())),
                "unwanted_pkgs": query.view_unwanted_pkgs(view_conf_id, Some(arch.as_str())),
                "placeholder_srpms": query.view_placeholder_srpms(view_conf_id, &arch),
                "buildroot_override_pkgs": query.view_buildroot_pkgs(view_conf_id, &arch),
                "binary_names": query.pkgs_in_view_list(view_conf_id, &arch, PkgList::BinaryNames),
                "source_names": query.pkgs_in_view_list(view_conf_id, &arch, PkgList::SourceNames),
            });
            dump_json(
                &output_dir.join(format!(
                    "view-summary--{}--{arch}.json",
                    Query::url_slug_id(view_conf_id)
                )),
                &output,
            )?;
        }
    }

    Ok(())
}

/// Everything the report writers consume: the view lists, the per-entity
/// JSON files, and the maintainers rollup.
pub fn generate_data_files(query: &Query) -> Result<()> {
    log_progress("phase=outputs status=generating-view-lists");
    generate_view_lists(query)?;
    log_progress("phase=outputs status=generating-env-json");
    generate_env_json_files(query)?;
    log_progress("phase=outputs status=generating-workload-json");
    generate_workload_json_files(query)?;
    log_progress("phase=outputs status=generating-view-json");
    generate_view_json_files(query)?;
    log_progress("phase=outputs status=generating-indices");
    generate_index_files(query)?;
    log_progress("phase=outputs status=generating-view-summaries");
    generate_view_summary_files(query)?;
    log_progress("phase=outputs status=generating-maintainers-json");
    dump_json(
        &query.settings.output_dir.join("maintainers.json"),
        &query.maintainers(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ViewConfig, ViewType, WorkloadConfig};
    use crate::data::WorkloadResult;
    use crate::solver::make_test_pkg;

    fn fixture(output_dir: &Path) -> (Configs, AnalyzedData, Settings) {
        let mut configs = Configs::default();
        configs.workloads.insert(
            "w1".to_string(),
            WorkloadConfig {
                id: "w1".to_string(),
                maintainer: "alice".to_string(),
                labels: vec!["L1".to_string()],
                packages: vec!["nano".to_string()],
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
                architectures: vec!["x86_64".to_string()],
                ..ViewConfig::default()
            },
        );

        let mut data = AnalyzedData::default();
        let catalog = data
            .pkgs
            .entry("test-repo".to_string())
            .or_default()
            .entry("x86_64".to_string())
            .or_default();
        for pkg in [make_test_pkg("nano", "7.2-1", "x86_64", "nano")] {
            catalog.insert(pkg.id.clone(), pkg);
        }
        data.workloads.insert(
            "w1:e1:test-repo:x86_64".to_string(),
            WorkloadResult {
                workload_conf_id: "w1".to_string(),
                env_conf_id: "e1".to_string(),
                repo_id: "test-repo".to_string(),
                arch: "x86_64".to_string(),
                pkg_added_ids: vec!["nano-7.2-1.x86_64".to_string()],
                labels: vec!["L1".to_string()],
                succeeded: true,
                env_succeeded: true,
                ..WorkloadResult::default()
            },
        );
        crate::views::analyze_views(&configs, &mut data).expect("views should assemble");
        crate::allarches::generate_views_all_arches(&configs, &mut data)
            .expect("aggregation should succeed");

        let settings = Settings {
            configs_dir: output_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            use_cache: false,
            dev_buildroot: false,
            dnf_cache_dir_override: None,
            solver_command: "unused".to_string(),
            max_subprocesses: 1,
            allowed_arches: vec!["x86_64".to_string()],
            uninstallable_packages: Vec::new(),
            skipped_maintainers: Vec::new(),
            root_log_deps_cache_path: output_dir.join("cache_root_log_deps.json"),
            strict: false,
        };
        (configs, data, settings)
    }

    #[test]
    fn caches_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (configs, data, settings) = fixture(dir.path());

        write_caches(&settings, &configs, &data).expect("caches should write");
        let (reloaded_configs, reloaded_data) =
            load_caches(&settings).expect("caches should reload");

        assert_eq!(reloaded_configs.workloads.len(), configs.workloads.len());
        assert_eq!(reloaded_data.workloads.len(), data.workloads.len());
        // The reloaded data serializes to the same bytes: a full fidelity
        // round trip.
        assert_eq!(
            serde_json::to_string(&data).expect("serialize"),
            serde_json::to_string(&reloaded_data).expect("serialize reloaded"),
        );
    }

    #[test]
    fn view_lists_split_runtime_and_buildroot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (configs, mut data, settings) = fixture(dir.path());

        // Mark one pkg as buildroot-only by clearing its workload sets.
        let buildroot_pkg = make_test_pkg("gcc", "14.1-1", "x86_64", "gcc");
        if let Some(catalog) = data
            .pkgs
            .get_mut("test-repo")
            .and_then(|by_arch| by_arch.get_mut("x86_64"))
        {
            catalog.insert(buildroot_pkg.id.clone(), buildroot_pkg.clone());
        }
        if let Some(view) = data.views.get_mut("v1:x86_64") {
            let mut pkg = crate::data::ViewPkg::from_record(&buildroot_pkg, "x86_64", 1);
            pkg.add_buildroot_all("nano-7.2-1", 1);
            view.pkgs.insert(pkg.id.clone(), pkg);
        }

        let query = Query::new(&data, &configs, &settings);
        generate_data_files(&query).expect("outputs should generate");

        let runtime_list = fs::read_to_string(
            dir.path().join("view-binary-package-name-list--v1--x86_64.txt"),
        )
        .expect("runtime list");
        assert_eq!(runtime_list.trim(), "nano");

        let buildroot_list = fs::read_to_string(
            dir.path().join("view-buildroot-package-name-list--v1--x86_64.txt"),
        )
        .expect("buildroot list");
        assert_eq!(buildroot_list.trim(), "gcc");

        let all_list = fs::read_to_string(
            dir.path().join("view-all-binary-package-name-list--v1.txt"),
        )
        .expect("all-arch union list");
        assert_eq!(all_list.trim(), "gcc\nnano");

        assert!(dir.path().join("view-packages--v1.json").exists());
        assert!(dir.path().join("view-sources--v1.json").exists());
        assert!(dir.path().join("view-workloads--v1.json").exists());
        assert!(dir.path().join("view-summary--v1--x86_64.json").exists());
        assert!(dir.path().join("workload-index.json").exists());
        assert!(dir.path().join("env-index.json").exists());
        assert!(dir.path().join("maintainers.json").exists());
        assert!(
            dir.path()
                .join("workload--w1--e1--test-repo--x86_64.json")
                .exists()
        );

        let workload_index =
            fs::read_to_string(dir.path().join("workload-index.json")).expect("index");
        assert!(workload_index.contains("\"arches\":[\"x86_64\"]"));
    }

    #[test]
    fn identical_runs_produce_identical_view_json() {
        let dir_a = tempfile::tempdir().expect("tempdir");
        let (configs, data, settings_a) = fixture(dir_a.path());
        let query_a = Query::new(&data, &configs, &settings_a);
        generate_data_files(&query_a).expect("first run");

        let dir_b = tempfile::tempdir().expect("tempdir");
        let (configs_b, data_b, settings_b) = fixture(dir_b.path());
        let query_b = Query::new(&data_b, &configs_b, &settings_b);
        generate_data_files(&query_b).expect("second run");

        let a = fs::read_to_string(dir_a.path().join("view-packages--v1.json")).expect("a");
        let b = fs::read_to_string(dir_b.path().join("view-packages--v1.json")).expect("b");
        assert_eq!(a, b);
    }
}
