use crate::config::{Configs, ViewConfig, ViewType};
use crate::data::{
    AnalyzedData, View, ViewPkg, ViewSrpm, pkg_id_to_name, pkg_placeholder_name_to_nevr, view_id,
};
use crate::progress::log_progress;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Builds one per-arch view: the label-selected workloads joined into a
/// binary-package table with env/req/dep classification, then an index of
/// their source packages.
fn assemble_view(
    view_conf: &ViewConfig,
    arch: &str,
    configs: &Configs,
    data: &AnalyzedData,
    views: &BTreeMap<String, View>,
) -> Result<View> {
    let this_view_id = view_id(&view_conf.id, arch);
    let repo_id = &view_conf.repository;

    log_progress(format!(
        "phase=views status=analyzing view={} arch={arch}",
        view_conf.id
    ));

    let mut view = View {
        id: this_view_id,
        view_conf_id: view_conf.id.clone(),
        arch: arch.to_string(),
        ..View::default()
    };

    // Workloads join views by repo, arch, and shared label.
    for (workload_id, workload) in &data.workloads {
        if workload.repo_id != *repo_id || workload.arch != arch {
            continue;
        }
        if !workload
            .labels
            .iter()
            .any(|label| view_conf.labels.contains(label))
        {
            continue;
        }
        view.workload_ids.push(workload_id.clone());
    }

    for workload_id in &view.workload_ids {
        let workload = &data.workloads[workload_id];
        let workload_conf = configs
            .workloads
            .get(&workload.workload_conf_id)
            .context("workload result references a missing workload config")?;
        let catalog = data
            .pkgs
            .get(repo_id)
            .and_then(|by_arch| by_arch.get(arch))
            .context("view repository has no package catalog for this arch")?;

        for pkg_id in &workload.pkg_env_ids {
            let record = catalog
                .get(pkg_id)
                .with_context(|| format!("package {pkg_id} missing from repo catalog"))?;
            let pkg = view
                .pkgs
                .entry(pkg_id.clone())
                .or_insert_with(|| ViewPkg::from_record(record, arch, 0));
            pkg.add_workload_all(workload_id);
            pkg.add_workload_env(workload_id);
            if workload_conf.requires_pkg_name(&pkg.name, arch) {
                pkg.add_workload_req(workload_id);
            }
            if let Some(relations) = workload.pkg_relations.get(pkg_id) {
                pkg.add_relations(relations);
            }
        }

        for pkg_id in &workload.pkg_added_ids {
            let record = catalog
                .get(pkg_id)
                .with_context(|| format!("package {pkg_id} missing from repo catalog"))?;
            let pkg = view
                .pkgs
                .entry(pkg_id.clone())
                .or_insert_with(|| ViewPkg::from_record(record, arch, 0));
            pkg.add_workload_all(workload_id);
            if workload_conf.requires_pkg_name(&pkg.name, arch) {
                pkg.add_workload_req(workload_id);
            } else {
                pkg.add_workload_dep(workload_id);
            }
            if let Some(relations) = workload.pkg_relations.get(pkg_id) {
                pkg.add_relations(relations);
            }
        }

        // Fictional packages: always counted as required.
        for placeholder_id in &workload.pkg_placeholder_ids {
            let placeholder_name = pkg_id_to_name(placeholder_id);
            let Some(placeholder) = workload_conf
                .package_placeholders
                .pkgs
                .get(placeholder_name)
            else {
                continue;
            };
            let pkg = view.pkgs.entry(placeholder_id.clone()).or_insert_with(|| {
                ViewPkg::placeholder(
                    &placeholder.name,
                    &placeholder.description,
                    &placeholder.srpm,
                    arch,
                )
            });
            pkg.add_workload_all(workload_id);
            pkg.add_workload_req(workload_id);
        }

        for srpm_name in &workload.srpm_placeholder_names {
            let srpm_id = pkg_placeholder_name_to_nevr(srpm_name);
            let entry = view
                .source_pkgs
                .entry(srpm_id)
                .or_insert_with(|| ViewSrpm::placeholder(srpm_name));
            entry.placeholder = true;
            if let Some(placeholder) = workload_conf.package_placeholders.srpms.get(srpm_name) {
                entry.placeholder_directly_required_pkg_names =
                    placeholder.buildrequires.clone();
            }
        }
    }

    // An addon only keeps what its base view doesn't already have.
    if view_conf.view_type == ViewType::Addon
        && let Some(base_view_conf_id) = &view_conf.base_view_id
    {
        let base_view_id = view_id(base_view_conf_id, arch);
        if let Some(base_view) = views.get(&base_view_id) {
            view.pkgs.retain(|pkg_id, _| !base_view.pkgs.contains_key(pkg_id));
        }
    }

    // Group the binaries by source package.
    let pkg_ids: Vec<String> = view.pkgs.keys().cloned().collect();
    for pkg_id in pkg_ids {
        let pkg = view.pkgs[&pkg_id].clone();
        let srpm_id = pkg.srpm_id();
        let entry = view
            .source_pkgs
            .entry(srpm_id)
            .or_insert_with(|| ViewSrpm::from_pkg(&pkg, 0));
        entry.absorb_pkg_workloads(&pkg);
    }

    log_progress(format!(
        "phase=views status=done view={} arch={arch} workloads={} pkgs={} source_pkgs={}",
        view_conf.id,
        view.workload_ids.len(),
        view.pkgs.len(),
        view.source_pkgs.len()
    ));

    Ok(view)
}

/// Assembles all views. Compose views go first so addons can subtract
/// against them.
pub fn analyze_views(configs: &Configs, data: &mut AnalyzedData) -> Result<()> {
    let mut views: BTreeMap<String, View> = BTreeMap::new();

    for view_conf in configs.views.values() {
        if view_conf.view_type != ViewType::Compose {
            continue;
        }
        for arch in &view_conf.architectures {
            let view = assemble_view(view_conf, arch, configs, data, &views)?;
            views.insert(view.id.clone(), view);
        }
    }

    for view_conf in configs.views.values() {
        if view_conf.view_type != ViewType::Addon {
            continue;
        }
        for arch in &view_conf.architectures {
            let view = assemble_view(view_conf, arch, configs, data, &views)?;
            views.insert(view.id.clone(), view);
        }
    }

    data.views = views;
    Ok(())
}

///////////////////////////////////////////////////////////////////////////////
// Unwanted packages
///////////////////////////////////////////////////////////////////////////////

/// Marks packages and sources named by label-matched unwanted lists.
fn add_unwanted_packages_to_view(view: &mut View, view_conf: &ViewConfig, configs: &Configs) {
    let arch = view.arch.clone();

    let mut unwanted_conf_ids: BTreeSet<String> = BTreeSet::new();
    for view_label in &view_conf.labels {
        for (unwanted_conf_id, unwanted) in &configs.unwanteds {
            if unwanted.labels.iter().any(|label| label == view_label) {
                unwanted_conf_ids.insert(unwanted_conf_id.clone());
            }
        }
    }

    let mut pkgs_unwanted_completely: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut srpms_unwanted_completely: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for unwanted_conf_id in &unwanted_conf_ids {
        let unwanted_conf = &configs.unwanteds[unwanted_conf_id];

        for pkg_name in &unwanted_conf.unwanted_packages {
            pkgs_unwanted_completely
                .entry(pkg_name.clone())
                .or_default()
                .insert(unwanted_conf_id.clone());
        }
        if let Some(arch_pkgs) = unwanted_conf.unwanted_arch_packages.get(&arch) {
            for pkg_name in arch_pkgs {
                pkgs_unwanted_completely
                    .entry(pkg_name.clone())
                    .or_default()
                    .insert(unwanted_conf_id.clone());
            }
        }
        for srpm_name in &unwanted_conf.unwanted_source_packages {
            srpms_unwanted_completely
                .entry(srpm_name.clone())
                .or_default()
                .insert(unwanted_conf_id.clone());
        }
        if let Some(arch_srpms) = unwanted_conf.unwanted_arch_source_packages.get(&arch) {
            for srpm_name in arch_srpms {
                srpms_unwanted_completely
                    .entry(srpm_name.clone())
                    .or_default()
                    .insert(unwanted_conf_id.clone());
            }
        }
    }

    for pkg in view.pkgs.values_mut() {
        if let Some(list_ids) = pkgs_unwanted_completely.get(&pkg.name) {
            pkg.unwanted_completely_in_list_ids
                .extend(list_ids.iter().cloned());
        }
        if let Some(list_ids) = srpms_unwanted_completely.get(&pkg.source_name) {
            pkg.unwanted_completely_in_list_ids
                .extend(list_ids.iter().cloned());
        }
    }

    for srpm in view.source_pkgs.values_mut() {
        if let Some(list_ids) = srpms_unwanted_completely.get(&srpm.name) {
            srpm.unwanted_completely_in_list_ids
                .extend(list_ids.iter().cloned());
        }
    }
}

pub fn add_unwanted_packages_to_views(configs: &Configs, data: &mut AnalyzedData) {
    log_progress("phase=unwanted status=marking");
    for view_conf in configs.views.values() {
        for arch in &view_conf.architectures {
            let this_view_id = view_id(&view_conf.id, arch);
            if let Some(mut view) = data.views.remove(&this_view_id) {
                add_unwanted_packages_to_view(&mut view, view_conf, configs);
                data.views.insert(this_view_id, view);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{UnwantedConfig, WorkloadConfig};
    use crate::data::{PackageRecord, WorkloadResult};
    use crate::solver::make_test_pkg;

    fn insert_catalog_pkg(data: &mut AnalyzedData, repo: &str, arch: &str, pkg: PackageRecord) {
        data.pkgs
            .entry(repo.to_string())
            .or_default()
            .entry(arch.to_string())
            .or_default()
            .insert(pkg.id.clone(), pkg);
    }

    fn workload_with_pkgs(
        conf_id: &str,
        labels: &[&str],
        env_ids: &[&str],
        added_ids: &[&str],
    ) -> WorkloadResult {
        WorkloadResult {
            workload_conf_id: conf_id.to_string(),
            env_conf_id: "e1".to_string(),
            repo_id: "test-repo".to_string(),
            arch: "x86_64".to_string(),
            pkg_env_ids: env_ids.iter().map(|s| s.to_string()).collect(),
            pkg_added_ids: added_ids.iter().map(|s| s.to_string()).collect(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            succeeded: true,
            env_succeeded: true,
            ..WorkloadResult::default()
        }
    }

    fn test_fixture() -> (Configs, AnalyzedData) {
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
        insert_catalog_pkg(
            &mut data,
            "test-repo",
            "x86_64",
            make_test_pkg("bash", "5.2-1", "x86_64", "bash"),
        );
        insert_catalog_pkg(
            &mut data,
            "test-repo",
            "x86_64",
            make_test_pkg("nano", "7.2-1", "x86_64", "nano"),
        );
        insert_catalog_pkg(
            &mut data,
            "test-repo",
            "x86_64",
            make_test_pkg("ncurses-libs", "6.4-1", "x86_64", "ncurses"),
        );

        data.workloads.insert(
            "w1:e1:test-repo:x86_64".to_string(),
            workload_with_pkgs(
                "w1",
                &["L1"],
                &["bash-5.2-1.x86_64"],
                &["nano-7.2-1.x86_64", "ncurses-libs-6.4-1.x86_64"],
            ),
        );

        (configs, data)
    }

    #[test]
    fn view_selects_workloads_by_label_and_classifies_pkgs() {
        let (configs, mut data) = test_fixture();
        analyze_views(&configs, &mut data).expect("views should assemble");

        let view = &data.views["v1:x86_64"];
        assert_eq!(view.workload_ids, vec!["w1:e1:test-repo:x86_64"]);

        let bash = &view.pkgs["bash-5.2-1.x86_64"];
        assert!(bash.in_workload_ids_env.contains("w1:e1:test-repo:x86_64"));
        assert!(bash.in_workload_ids_req.is_empty());

        let nano = &view.pkgs["nano-7.2-1.x86_64"];
        assert!(nano.in_workload_ids_req.contains("w1:e1:test-repo:x86_64"));
        assert!(nano.in_workload_ids_dep.is_empty());

        let ncurses = &view.pkgs["ncurses-libs-6.4-1.x86_64"];
        assert!(ncurses.in_workload_ids_dep.contains("w1:e1:test-repo:x86_64"));

        // req and dep partition the added set; env can overlap req only
        for pkg in view.pkgs.values() {
            assert!(pkg.in_workload_ids_req.is_disjoint(&pkg.in_workload_ids_dep));
            assert!(pkg.in_workload_ids_env.is_disjoint(&pkg.in_workload_ids_dep));
            for id in pkg
                .in_workload_ids_req
                .iter()
                .chain(&pkg.in_workload_ids_dep)
                .chain(&pkg.in_workload_ids_env)
            {
                assert!(pkg.in_workload_ids_all.contains(id));
            }
        }

        // source index groups by source nvr
        assert!(view.source_pkgs.contains_key("nano-7.2-1"));
        assert!(view.source_pkgs.contains_key("ncurses-6.4-1"));
        let nano_srpm = &view.source_pkgs["nano-7.2-1"];
        assert!(nano_srpm.pkg_ids.contains("nano-7.2-1.x86_64"));
        assert!(
            nano_srpm
                .in_workload_ids_req
                .contains("w1:e1:test-repo:x86_64")
        );
    }

    #[test]
    fn addon_views_subtract_their_base() {
        let (mut configs, mut data) = test_fixture();

        // The addon workload pulls in nano (also in base) and a unique pkg.
        insert_catalog_pkg(
            &mut data,
            "test-repo",
            "x86_64",
            make_test_pkg("htop", "3.3-1", "x86_64", "htop"),
        );
        configs.workloads.insert(
            "w2".to_string(),
            WorkloadConfig {
                id: "w2".to_string(),
                maintainer: "bob".to_string(),
                labels: vec!["L2".to_string()],
                packages: vec!["htop".to_string()],
                ..WorkloadConfig::default()
            },
        );
        data.workloads.insert(
            "w2:e1:test-repo:x86_64".to_string(),
            workload_with_pkgs(
                "w2",
                &["L2"],
                &[],
                &["htop-3.3-1.x86_64", "nano-7.2-1.x86_64"],
            ),
        );
        configs.views.insert(
            "v2".to_string(),
            ViewConfig {
                id: "v2".to_string(),
                view_type: ViewType::Addon,
                labels: vec!["L2".to_string()],
                repository: "test-repo".to_string(),
                base_view_id: Some("v1".to_string()),
                architectures: vec!["x86_64".to_string()],
                ..ViewConfig::default()
            },
        );

        analyze_views(&configs, &mut data).expect("views should assemble");

        let base = &data.views["v1:x86_64"];
        let addon = &data.views["v2:x86_64"];
        assert!(base.pkgs.contains_key("nano-7.2-1.x86_64"));
        assert!(addon.pkgs.contains_key("htop-3.3-1.x86_64"));
        assert!(!addon.pkgs.contains_key("nano-7.2-1.x86_64"));
        for pkg_id in addon.pkgs.keys() {
            assert!(!base.pkgs.contains_key(pkg_id));
        }
    }

    #[test]
    fn unwanted_lists_mark_by_label_intersection() {
        let (mut configs, mut data) = test_fixture();
        configs.unwanteds.insert(
            "u1".to_string(),
            UnwantedConfig {
                id: "u1".to_string(),
                labels: vec!["L1".to_string()],
                unwanted_packages: vec!["nano".to_string()],
                unwanted_source_packages: vec!["ncurses".to_string()],
                ..UnwantedConfig::default()
            },
        );
        configs.unwanteds.insert(
            "u2".to_string(),
            UnwantedConfig {
                id: "u2".to_string(),
                labels: vec!["other-label".to_string()],
                unwanted_packages: vec!["bash".to_string()],
                ..UnwantedConfig::default()
            },
        );

        analyze_views(&configs, &mut data).expect("views should assemble");
        add_unwanted_packages_to_views(&configs, &mut data);

        let view = &data.views["v1:x86_64"];
        let nano = &view.pkgs["nano-7.2-1.x86_64"];
        assert!(nano.unwanted_completely_in_list_ids.contains("u1"));
        // u2's label doesn't intersect the view's
        let bash = &view.pkgs["bash-5.2-1.x86_64"];
        assert!(bash.unwanted_completely_in_list_ids.is_empty());
        // binaries inherit source unwantedness, and the srpm entry is marked
        let ncurses = &view.pkgs["ncurses-libs-6.4-1.x86_64"];
        assert!(ncurses.unwanted_completely_in_list_ids.contains("u1"));
        let ncurses_srpm = &view.source_pkgs["ncurses-6.4-1"];
        assert!(ncurses_srpm.unwanted_completely_in_list_ids.contains("u1"));
    }
}
