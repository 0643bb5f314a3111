use crate::config::Configs;
use crate::data::{
    AnalyzedData, Category, DependencyOfRollup, LevelSets, PkgByName, PkgByNevr,
    RelationsRollup, SrpmByName, View, ViewAllArches, ViewPkg, ViewSrpm, WorkloadRollup,
    pkg_id_to_name, view_id, workload_id_to_conf_id,
};
use crate::progress::log_progress;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

struct RollupSource<'a> {
    workload_all: &'a BTreeSet<String>,
    workload_req: &'a BTreeSet<String>,
    workload_dep: &'a BTreeSet<String>,
    workload_env: &'a BTreeSet<String>,
    buildroot_all: &'a BTreeSet<String>,
    buildroot_req: &'a BTreeSet<String>,
    buildroot_dep: &'a BTreeSet<String>,
    buildroot_env: &'a BTreeSet<String>,
    unwanted_completely: &'a BTreeSet<String>,
    unwanted_buildroot: &'a BTreeSet<String>,
    level: &'a [LevelSets],
}

impl<'a> From<&'a ViewPkg> for RollupSource<'a> {
    fn from(pkg: &'a ViewPkg) -> Self {
        RollupSource {
            workload_all: &pkg.in_workload_ids_all,
            workload_req: &pkg.in_workload_ids_req,
            workload_dep: &pkg.in_workload_ids_dep,
            workload_env: &pkg.in_workload_ids_env,
            buildroot_all: &pkg.in_buildroot_of_srpm_id_all,
            buildroot_req: &pkg.in_buildroot_of_srpm_id_req,
            buildroot_dep: &pkg.in_buildroot_of_srpm_id_dep,
            buildroot_env: &pkg.in_buildroot_of_srpm_id_env,
            unwanted_completely: &pkg.unwanted_completely_in_list_ids,
            unwanted_buildroot: &pkg.unwanted_buildroot_in_list_ids,
            level: &pkg.level,
        }
    }
}

impl<'a> From<&'a ViewSrpm> for RollupSource<'a> {
    fn from(srpm: &'a ViewSrpm) -> Self {
        RollupSource {
            workload_all: &srpm.in_workload_ids_all,
            workload_req: &srpm.in_workload_ids_req,
            workload_dep: &srpm.in_workload_ids_dep,
            workload_env: &srpm.in_workload_ids_env,
            buildroot_all: &srpm.in_buildroot_of_srpm_id_all,
            buildroot_req: &srpm.in_buildroot_of_srpm_id_req,
            buildroot_dep: &srpm.in_buildroot_of_srpm_id_dep,
            buildroot_env: &srpm.in_buildroot_of_srpm_id_env,
            unwanted_completely: &srpm.unwanted_completely_in_list_ids,
            unwanted_buildroot: &srpm.unwanted_buildroot_in_list_ids,
            level: &srpm.level,
        }
    }
}

fn populate_scope(
    workload_ids: &mut BTreeSet<String>,
    workload_conf_ids: &mut BTreeSet<String>,
    buildroot_ids: &mut BTreeSet<String>,
    buildroot_names: &mut BTreeMap<String, BTreeSet<String>>,
    src_workload: &BTreeSet<String>,
    src_buildroot: &BTreeSet<String>,
) {
    workload_ids.extend(src_workload.iter().cloned());
    for this_workload_id in src_workload {
        workload_conf_ids.insert(workload_id_to_conf_id(this_workload_id).to_string());
    }
    buildroot_ids.extend(src_buildroot.iter().cloned());
    for srpm_id in src_buildroot {
        buildroot_names
            .entry(pkg_id_to_name(srpm_id).to_string())
            .or_default()
            .insert(srpm_id.clone());
    }
}

/// Folds one arch-specific entity into the all-arches rollup.
fn populate_rollup(rollup: &mut RelationsRollup, src: &RollupSource) {
    rollup
        .unwanted_completely_in_list_ids
        .extend(src.unwanted_completely.iter().cloned());
    rollup
        .unwanted_buildroot_in_list_ids
        .extend(src.unwanted_buildroot.iter().cloned());

    populate_scope(
        &mut rollup.in_workload_ids_all,
        &mut rollup.in_workload_conf_ids_all,
        &mut rollup.in_buildroot_of_srpm_id_all,
        &mut rollup.in_buildroot_of_srpm_name_all,
        src.workload_all,
        src.buildroot_all,
    );
    populate_scope(
        &mut rollup.in_workload_ids_req,
        &mut rollup.in_workload_conf_ids_req,
        &mut rollup.in_buildroot_of_srpm_id_req,
        &mut rollup.in_buildroot_of_srpm_name_req,
        src.workload_req,
        src.buildroot_req,
    );
    populate_scope(
        &mut rollup.in_workload_ids_dep,
        &mut rollup.in_workload_conf_ids_dep,
        &mut rollup.in_buildroot_of_srpm_id_dep,
        &mut rollup.in_buildroot_of_srpm_name_dep,
        src.workload_dep,
        src.buildroot_dep,
    );
    populate_scope(
        &mut rollup.in_workload_ids_env,
        &mut rollup.in_workload_conf_ids_env,
        &mut rollup.in_buildroot_of_srpm_id_env,
        &mut rollup.in_buildroot_of_srpm_name_env,
        src.workload_env,
        src.buildroot_env,
    );

    for (level_idx, level_sets) in src.level.iter().enumerate() {
        if !level_sets.all.is_empty() && (level_idx as u32) < rollup.level_number {
            rollup.level_number = level_idx as u32;
        }
        while rollup.level.len() <= level_idx {
            rollup.level.push(LevelSets::default());
        }
        rollup.level[level_idx]
            .all
            .extend(level_sets.all.iter().cloned());
        rollup.level[level_idx]
            .req
            .extend(level_sets.req.iter().cloned());
        rollup.level[level_idx]
            .dep
            .extend(level_sets.dep.iter().cloned());
        rollup.level[level_idx]
            .env
            .extend(level_sets.env.iter().cloned());
    }
}

/// Records which packages in the view depend on this one, keyed both by
/// nevr and by name. Edges into the base view of an addon are skipped.
fn populate_dependants(dependants: &mut DependencyOfRollup, pkg: &ViewPkg, view: &View) {
    for dependent_id in &pkg.required_by {
        let Some(dependent) = view.pkgs.get(dependent_id) else {
            continue;
        };
        dependants
            .hard_dependency_of_pkg_nevrs
            .insert(dependent.nevr.clone());
        dependants
            .hard_dependency_of_pkg_names
            .entry(dependent.name.clone())
            .or_default()
            .insert(dependent.nevr.clone());
    }

    for dependent_id in pkg.recommended_by.iter().chain(&pkg.suggested_by) {
        let Some(dependent) = view.pkgs.get(dependent_id) else {
            continue;
        };
        dependants
            .weak_dependency_of_pkg_nevrs
            .insert(dependent.nevr.clone());
        dependants
            .weak_dependency_of_pkg_names
            .entry(dependent.name.clone())
            .or_default()
            .insert(dependent.nevr.clone());
    }

    dependants.dependency_of_pkg_nevrs = dependants
        .hard_dependency_of_pkg_nevrs
        .union(&dependants.weak_dependency_of_pkg_nevrs)
        .cloned()
        .collect();
    for (name, nevrs) in dependants
        .hard_dependency_of_pkg_names
        .iter()
        .chain(&dependants.weak_dependency_of_pkg_names)
    {
        dependants
            .dependency_of_pkg_names
            .entry(name.clone())
            .or_default()
            .extend(nevrs.iter().cloned());
    }
}

/// First matching category wins: runtime membership beats buildroot
/// membership, and the buildroot split depends on the lowest level the
/// entity appears on.
pub fn category_for(rollup: &RelationsRollup) -> Option<Category> {
    if !rollup.in_workload_ids_env.is_empty() {
        return Some(Category::Env);
    }
    if !rollup.in_workload_ids_req.is_empty() {
        return Some(Category::Req);
    }
    if !rollup.in_workload_ids_dep.is_empty() {
        return Some(Category::Dep);
    }
    if !rollup.in_buildroot_of_srpm_id_env.is_empty() {
        return Some(Category::BuildBase);
    }
    if !rollup.in_buildroot_of_srpm_id_req.is_empty()
        || !rollup.in_buildroot_of_srpm_id_dep.is_empty()
    {
        if rollup.level_number == 1 {
            return Some(Category::BuildLevel1);
        }
        if rollup.level_number > 1 {
            return Some(Category::BuildLevel2Plus);
        }
    }
    None
}

fn count_category(numbers: &mut crate::data::CategoryNumbers, category: Option<Category>) {
    match category {
        Some(Category::Env) => numbers.env += 1,
        Some(Category::Req) => numbers.req += 1,
        Some(Category::Dep) => numbers.dep += 1,
        Some(Category::BuildBase) => numbers.build_base += 1,
        Some(Category::BuildLevel1) => numbers.build_level_1 += 1,
        Some(Category::BuildLevel2Plus) => numbers.build_level_2_plus += 1,
        None => {}
    }
}

/// Merges the per-arch views of every view config into one all-arches
/// structure with three indices: binary name, binary nevr, source name.
pub fn generate_views_all_arches(configs: &Configs, data: &mut AnalyzedData) -> Result<()> {
    let mut views_all_arches: BTreeMap<String, ViewAllArches> = BTreeMap::new();

    for (view_conf_id, view_conf) in &configs.views {
        log_progress(format!(
            "phase=views-all-arches status=generating view={view_conf_id}"
        ));

        let mut vaa = ViewAllArches {
            id: view_conf_id.clone(),
            has_buildroot: view_conf.wants_buildroot(),
            everything_succeeded: true,
            no_warnings: true,
            ..ViewAllArches::default()
        };

        for arch in &view_conf.architectures {
            let this_view_id = view_id(view_conf_id, arch);
            let Some(view) = data.views.get(&this_view_id) else {
                continue;
            };

            // Workloads
            for this_workload_id in &view.workload_ids {
                let Some(workload) = data.workloads.get(this_workload_id) else {
                    continue;
                };
                let Some(workload_conf) = configs.workloads.get(&workload.workload_conf_id)
                else {
                    continue;
                };

                let entry = vaa
                    .workloads
                    .entry(workload.workload_conf_id.clone())
                    .or_insert_with(|| WorkloadRollup {
                        workload_conf_id: workload.workload_conf_id.clone(),
                        name: workload_conf.name.clone(),
                        maintainer: workload_conf.maintainer.clone(),
                        succeeded: true,
                        no_warnings: true,
                    });
                if !workload.succeeded {
                    entry.succeeded = false;
                    vaa.everything_succeeded = false;
                }
                if workload.warnings.message.is_some() {
                    entry.no_warnings = false;
                    vaa.no_warnings = false;
                }
            }

            // Binary packages, indexed by name and by nevr
            for pkg in view.pkgs.values() {
                let by_name = vaa
                    .pkgs_by_name
                    .entry(pkg.name.clone())
                    .or_insert_with(|| PkgByName {
                        name: pkg.name.clone(),
                        placeholder: pkg.placeholder,
                        source_name: pkg.source_name.clone(),
                        ..PkgByName::default()
                    });
                by_name
                    .nevrs
                    .entry(pkg.nevr.clone())
                    .or_default()
                    .insert(arch.clone());
                by_name.arches.insert(arch.clone());
                by_name
                    .highest_priority_reponames_per_arch
                    .entry(arch.clone())
                    .or_default()
                    .extend(pkg.highest_priority_reponames.iter().cloned());
                populate_rollup(&mut by_name.rollup, &RollupSource::from(pkg));
                populate_dependants(&mut by_name.dependants, pkg, view);

                let by_nevr = vaa
                    .pkgs_by_nevr
                    .entry(pkg.nevr.clone())
                    .or_insert_with(|| PkgByNevr {
                        name: pkg.name.clone(),
                        placeholder: pkg.placeholder,
                        evr: pkg.evr.clone(),
                        source_name: pkg.source_name.clone(),
                        ..PkgByNevr::default()
                    });
                by_nevr.arches.insert(arch.clone());
                by_nevr
                    .arches_arches
                    .entry(arch.clone())
                    .or_default()
                    .insert(pkg.arch.clone());
                by_nevr
                    .reponame_per_arch
                    .insert(arch.clone(), pkg.reponame.clone());
                by_nevr
                    .highest_priority_reponames_per_arch
                    .insert(arch.clone(), pkg.highest_priority_reponames.clone());
                populate_rollup(&mut by_nevr.rollup, &RollupSource::from(pkg));
                populate_dependants(&mut by_nevr.dependants, pkg, view);
            }

            // Source packages by name
            for srpm in view.source_pkgs.values() {
                let entry = vaa
                    .source_pkgs_by_name
                    .entry(srpm.name.clone())
                    .or_insert_with(|| SrpmByName {
                        name: srpm.name.clone(),
                        placeholder: srpm.placeholder,
                        buildroot_succeeded: true,
                        buildroot_no_warnings: true,
                        ..SrpmByName::default()
                    });

                if vaa.has_buildroot
                    && let Some(buildroot_srpm) = data
                        .buildroot
                        .srpms
                        .get(&view_conf.repository)
                        .and_then(|by_arch| by_arch.get(arch))
                        .and_then(|by_srpm| by_srpm.get(&srpm.id))
                {
                    if !buildroot_srpm.succeeded {
                        vaa.everything_succeeded = false;
                        entry.buildroot_succeeded = false;
                        entry
                            .errors
                            .insert(arch.clone(), buildroot_srpm.errors.clone());
                    }
                    if buildroot_srpm.warnings.message.is_some() {
                        vaa.no_warnings = false;
                        entry.buildroot_no_warnings = false;
                        entry
                            .warnings
                            .insert(arch.clone(), buildroot_srpm.warnings.clone());
                    }
                }

                entry.arches.insert(arch.clone());
                populate_rollup(&mut entry.rollup, &RollupSource::from(srpm));
            }

            // Binary names and nevrs onto their source packages
            for pkg in view.pkgs.values() {
                if let Some(entry) = vaa.source_pkgs_by_name.get_mut(&pkg.source_name) {
                    entry.pkg_names.insert(pkg.name.clone());
                    entry.pkg_nevrs.insert(pkg.nevr.clone());
                }
            }
        }

        // Categories and counts
        let mut nevr_categories: BTreeMap<String, Option<Category>> = BTreeMap::new();
        for (nevr, pkg) in &vaa.pkgs_by_nevr {
            nevr_categories.insert(nevr.clone(), category_for(&pkg.rollup));
        }
        for (nevr, category) in nevr_categories {
            count_category(&mut vaa.numbers.pkgs, category);
            if let Some(pkg) = vaa.pkgs_by_nevr.get_mut(&nevr) {
                pkg.category = category;
            }
        }
        vaa.numbers.pkgs.runtime =
            vaa.numbers.pkgs.env + vaa.numbers.pkgs.req + vaa.numbers.pkgs.dep;
        vaa.numbers.pkgs.build = vaa.numbers.pkgs.build_base
            + vaa.numbers.pkgs.build_level_1
            + vaa.numbers.pkgs.build_level_2_plus;

        let mut srpm_categories: BTreeMap<String, Option<Category>> = BTreeMap::new();
        for (name, srpm) in &vaa.source_pkgs_by_name {
            srpm_categories.insert(name.clone(), category_for(&srpm.rollup));
        }
        for (name, category) in srpm_categories {
            count_category(&mut vaa.numbers.srpms, category);
            if let Some(srpm) = vaa.source_pkgs_by_name.get_mut(&name) {
                srpm.category = category;
            }
        }
        vaa.numbers.srpms.runtime =
            vaa.numbers.srpms.env + vaa.numbers.srpms.req + vaa.numbers.srpms.dep;
        vaa.numbers.srpms.build = vaa.numbers.srpms.build_base
            + vaa.numbers.srpms.build_level_1
            + vaa.numbers.srpms.build_level_2_plus;

        views_all_arches.insert(view_conf_id.clone(), vaa);
    }

    data.views_all_arches = views_all_arches;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ViewConfig, ViewType, WorkloadConfig};
    use crate::data::{LEVEL_NUMBER_UNSET, WorkloadResult};
    use crate::solver::make_test_pkg;

    fn fixture_with_two_arches() -> (Configs, AnalyzedData) {
        let mut configs = Configs::default();
        configs.workloads.insert(
            "w1".to_string(),
            WorkloadConfig {
                id: "w1".to_string(),
                name: "Workload One".to_string(),
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
                architectures: vec!["aarch64".to_string(), "x86_64".to_string()],
                ..ViewConfig::default()
            },
        );

        let mut data = AnalyzedData::default();
        for arch in ["x86_64", "aarch64"] {
            data.pkgs
                .entry("test-repo".to_string())
                .or_default()
                .entry(arch.to_string())
                .or_default()
                .extend([make_test_pkg("nano", "7.2-1", arch, "nano")].map(|p| (p.id.clone(), p)));

            let workload_key = format!("w1:e1:test-repo:{arch}");
            data.workloads.insert(
                workload_key,
                WorkloadResult {
                    workload_conf_id: "w1".to_string(),
                    env_conf_id: "e1".to_string(),
                    repo_id: "test-repo".to_string(),
                    arch: arch.to_string(),
                    pkg_added_ids: vec![format!("nano-7.2-1.{arch}")],
                    labels: vec!["L1".to_string()],
                    succeeded: arch == "x86_64",
                    env_succeeded: true,
                    ..WorkloadResult::default()
                },
            );
        }

        crate::views::analyze_views(&configs, &mut data).expect("views should assemble");
        (configs, data)
    }

    #[test]
    fn rows_union_across_arches_and_flags_roll_up() {
        let (configs, mut data) = fixture_with_two_arches();
        generate_views_all_arches(&configs, &mut data).expect("aggregation should succeed");

        let vaa = &data.views_all_arches["v1"];
        // One arch's workload failed, so the rollup is marked
        assert!(!vaa.everything_succeeded);
        assert!(!vaa.workloads["w1"].succeeded);

        let by_name = &vaa.pkgs_by_name["nano"];
        assert_eq!(
            by_name.arches,
            BTreeSet::from(["aarch64".to_string(), "x86_64".to_string()])
        );
        assert_eq!(by_name.nevrs["nano-7.2-1"].len(), 2);
        assert_eq!(by_name.rollup.in_workload_conf_ids_req, BTreeSet::from(["w1".to_string()]));

        let by_nevr = &vaa.pkgs_by_nevr["nano-7.2-1"];
        assert_eq!(by_nevr.category, Some(Category::Req));
        assert_eq!(by_nevr.rollup.level_number, 0);
        assert_eq!(
            by_nevr.arches_arches["x86_64"],
            BTreeSet::from(["x86_64".to_string()])
        );

        let srpm = &vaa.source_pkgs_by_name["nano"];
        assert_eq!(srpm.category, Some(Category::Req));
        assert!(srpm.pkg_nevrs.contains("nano-7.2-1"));

        assert_eq!(vaa.numbers.pkgs.req, 1);
        assert_eq!(vaa.numbers.pkgs.runtime, 1);
        assert_eq!(vaa.numbers.srpms.req, 1);
    }

    #[test]
    fn category_ordering_prefers_runtime_over_buildroot() {
        let mut rollup = RelationsRollup::default();
        assert_eq!(category_for(&rollup), None);

        rollup
            .in_buildroot_of_srpm_id_dep
            .insert("some-srpm-1.0-1".to_string());
        rollup.level_number = 2;
        assert_eq!(category_for(&rollup), Some(Category::BuildLevel2Plus));

        rollup.level_number = 1;
        assert_eq!(category_for(&rollup), Some(Category::BuildLevel1));

        rollup
            .in_buildroot_of_srpm_id_env
            .insert("other-srpm-1.0-1".to_string());
        assert_eq!(category_for(&rollup), Some(Category::BuildBase));

        rollup.in_workload_ids_dep.insert("w:e:r:a".to_string());
        assert_eq!(category_for(&rollup), Some(Category::Dep));

        rollup.in_workload_ids_req.insert("w:e:r:a".to_string());
        assert_eq!(category_for(&rollup), Some(Category::Req));

        rollup.in_workload_ids_env.insert("w:e:r:a".to_string());
        assert_eq!(category_for(&rollup), Some(Category::Env));
    }

    #[test]
    fn level_number_is_the_lowest_populated_level() {
        let mut rollup = RelationsRollup::default();
        assert_eq!(rollup.level_number, LEVEL_NUMBER_UNSET);

        // level 0 exists but is empty; level 1 has content
        let mut level1 = LevelSets::default();
        level1.all.insert("srpm-1.0-1".to_string());
        let pkg_level = vec![LevelSets::default(), level1];

        let workload_sets = BTreeSet::new();
        let buildroot_all = BTreeSet::from(["srpm-1.0-1".to_string()]);
        let empty = BTreeSet::new();
        let src = RollupSource {
            workload_all: &workload_sets,
            workload_req: &empty,
            workload_dep: &empty,
            workload_env: &empty,
            buildroot_all: &buildroot_all,
            buildroot_req: &empty,
            buildroot_dep: &empty,
            buildroot_env: &empty,
            unwanted_completely: &empty,
            unwanted_buildroot: &empty,
            level: &pkg_level,
        };
        populate_rollup(&mut rollup, &src);
        assert_eq!(rollup.level_number, 1);
        assert_eq!(rollup.level.len(), 2);
    }
}
