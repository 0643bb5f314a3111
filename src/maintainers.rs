use crate::config::{Configs, Settings, ViewType};
use crate::data::{AnalyzedData, ViewAllArches, workload_id_to_conf_id};
use crate::progress::log_progress;
use std::collections::BTreeSet;

// Packages sit on one or more levels: level 0 is runtime, each further
// level is the build dependencies of the previous one. Within a level,
// sublevel 0 is "explicitly required" (or "direct build dependency"), and
// each further sublevel is one runtime-dependency hop below. A score is
// the (level, sublevel) pair; lower is closer to something a human asked
// for.

struct PlannedAssignment {
    pkg_name: String,
    maintainer: String,
    locations: BTreeSet<String>,
    reason: Option<(String, String, String)>,
}

fn apply_assignment(
    vaa: &mut ViewAllArches,
    planned: PlannedAssignment,
    level: u32,
    sublevel: u32,
) {
    let Some(pkg) = vaa.pkgs_by_name.get_mut(&planned.pkg_name) else {
        return;
    };
    pkg.rollup
        .maintainer_recommendation
        .entry(planned.maintainer.clone())
        .or_default()
        .insert((level, sublevel));
    let detail = pkg
        .rollup
        .maintainer_recommendation_details
        .entry(level)
        .or_default()
        .entry(sublevel)
        .or_default()
        .entry(planned.maintainer)
        .or_default();
    detail.locations.extend(planned.locations);
    if let Some(reason) = planned.reason {
        detail.reasons.insert(reason);
    }
}

/// Seeds score (0,0): every explicitly required binary belongs to the
/// maintainers of the workloads requiring it.
fn seed_required_packages(configs: &Configs, vaa: &mut ViewAllArches) {
    for pkg in vaa.pkgs_by_name.values_mut() {
        let workload_ids: Vec<String> =
            pkg.rollup.in_workload_ids_req.iter().cloned().collect();
        for this_workload_id in workload_ids {
            let workload_conf_id = workload_id_to_conf_id(&this_workload_id).to_string();
            let Some(workload_conf) = configs.workloads.get(&workload_conf_id) else {
                continue;
            };
            let maintainer = workload_conf.maintainer.clone();
            pkg.rollup
                .maintainer_recommendation
                .entry(maintainer.clone())
                .or_default()
                .insert((0, 0));
            let detail = pkg
                .rollup
                .maintainer_recommendation_details
                .entry(0)
                .or_default()
                .entry(0)
                .or_default()
                .entry(maintainer)
                .or_default();
            detail.locations.insert(workload_conf_id);
        }
    }
}

/// Score (level, 0) for level >= 1: binaries pulled in as direct build
/// requires inherit the maintainers their buildroot srpms earned on the
/// previous level, at that srpm's best (lowest) sublevel.
fn plan_build_dep_seeds(
    vaa: &ViewAllArches,
    level: u32,
    previous_level_srpms: &BTreeSet<String>,
    level_change_detection: &mut BTreeSet<(String, String)>,
    level_changes_made: &mut bool,
) -> Vec<PlannedAssignment> {
    let prev_level = level - 1;
    let mut planned = Vec::new();

    for (pkg_name, pkg) in &vaa.pkgs_by_name {
        // A package already owned on a previous level isn't chased further.
        if previous_level_srpms.contains(&pkg.source_name) {
            continue;
        }

        for buildroot_srpm_name in pkg.rollup.in_buildroot_of_srpm_name_req.keys() {
            let Some(buildroot_srpm) = vaa.source_pkgs_by_name.get(buildroot_srpm_name) else {
                continue;
            };

            let mut prev_sublevels: BTreeSet<u32> = BTreeSet::new();
            for scores in buildroot_srpm.rollup.maintainer_recommendation.values() {
                for (score_level, score_sublevel) in scores {
                    if *score_level == prev_level {
                        prev_sublevels.insert(*score_sublevel);
                    }
                }
            }
            let Some(&best_sublevel) = prev_sublevels.iter().next() else {
                continue;
            };
            let score_needed = (prev_level, best_sublevel);

            for (maintainer, scores) in &buildroot_srpm.rollup.maintainer_recommendation {
                if !scores.contains(&score_needed) {
                    continue;
                }
                if level_change_detection
                    .insert((buildroot_srpm_name.clone(), pkg_name.clone()))
                {
                    *level_changes_made = true;
                }
                planned.push(PlannedAssignment {
                    pkg_name: pkg_name.clone(),
                    maintainer: maintainer.clone(),
                    locations: BTreeSet::from([buildroot_srpm_name.clone()]),
                    reason: None,
                });
            }
        }
    }

    planned
}

/// Score (level, sublevel) for sublevel >= 1: a package inherits the
/// maintainers of the packages that require it at the previous sublevel.
fn plan_runtime_hops(
    vaa: &ViewAllArches,
    level: u32,
    prev_sublevel: u32,
    previous_level_srpms: &BTreeSet<String>,
    sublevel_change_detection: &mut BTreeSet<(String, String, String)>,
    sublevel_changes_made: &mut bool,
) -> Vec<PlannedAssignment> {
    let prev_score = (level, prev_sublevel);
    let mut planned = Vec::new();

    for (pkg_name, pkg) in &vaa.pkgs_by_name {
        if previous_level_srpms.contains(&pkg.source_name) {
            continue;
        }

        for superior_pkg_name in pkg.dependants.hard_dependency_of_pkg_names.keys() {
            let Some(superior_pkg) = vaa.pkgs_by_name.get(superior_pkg_name) else {
                continue;
            };
            let superior_srpm_name = superior_pkg.source_name.clone();

            for (maintainer, scores) in &superior_pkg.rollup.maintainer_recommendation {
                if !scores.contains(&prev_score) {
                    continue;
                }
                let detection_tuple = (
                    superior_pkg_name.clone(),
                    pkg_name.clone(),
                    maintainer.clone(),
                );
                if !sublevel_change_detection.insert(detection_tuple) {
                    continue;
                }
                *sublevel_changes_made = true;

                // The dependent inherits the superior's locations from one
                // sublevel up, plus a concrete reason edge.
                let locations = superior_pkg
                    .rollup
                    .maintainer_recommendation_details
                    .get(&level)
                    .and_then(|by_sublevel| by_sublevel.get(&prev_sublevel))
                    .and_then(|by_maintainer| by_maintainer.get(maintainer))
                    .map(|detail| detail.locations.clone())
                    .unwrap_or_default();
                planned.push(PlannedAssignment {
                    pkg_name: pkg_name.clone(),
                    maintainer: maintainer.clone(),
                    locations,
                    reason: Some((
                        superior_pkg_name.clone(),
                        superior_srpm_name.clone(),
                        pkg_name.clone(),
                    )),
                });
            }
        }
    }

    planned
}

/// Copies every binary's recommendations onto its source package and
/// returns the source names that now have at least one maintainer.
fn propagate_to_source_packages(vaa: &mut ViewAllArches) -> BTreeSet<String> {
    let mut owned_srpm_names: BTreeSet<String> = BTreeSet::new();
    let pkgs = &vaa.pkgs_by_name;
    let srpms = &mut vaa.source_pkgs_by_name;

    for pkg in pkgs.values() {
        if pkg.rollup.maintainer_recommendation.is_empty() {
            continue;
        }
        owned_srpm_names.insert(pkg.source_name.clone());

        let Some(srpm) = srpms.get_mut(&pkg.source_name) else {
            continue;
        };
        for (maintainer, scores) in &pkg.rollup.maintainer_recommendation {
            srpm.rollup
                .maintainer_recommendation
                .entry(maintainer.clone())
                .or_default()
                .extend(scores.iter().cloned());
        }
        for (level, by_sublevel) in &pkg.rollup.maintainer_recommendation_details {
            for (sublevel, by_maintainer) in by_sublevel {
                for (maintainer, detail) in by_maintainer {
                    let srpm_detail = srpm
                        .rollup
                        .maintainer_recommendation_details
                        .entry(*level)
                        .or_default()
                        .entry(*sublevel)
                        .or_default()
                        .entry(maintainer.clone())
                        .or_default();
                    srpm_detail.reasons.extend(detail.reasons.iter().cloned());
                    srpm_detail
                        .locations
                        .extend(detail.locations.iter().cloned());
                }
            }
        }
    }

    owned_srpm_names
}

/// Elects the best maintainers per source package: the lowest (level,
/// sublevel) coordinate wins, and within it the maintainers with the most
/// qualifying dependencies. Ties elect everyone tied.
pub(crate) fn elect_best_maintainers(vaa: &mut ViewAllArches, skipped_maintainers: &[String]) {
    for srpm in vaa.source_pkgs_by_name.values_mut() {
        let details = &srpm.rollup.maintainer_recommendation_details;
        if details.is_empty() {
            continue;
        }
        let Some((&lowest_level, by_sublevel)) = details.iter().next() else {
            continue;
        };
        let Some((&lowest_sublevel, candidates)) = by_sublevel.iter().next() else {
            continue;
        };

        let mut highest_count = 0usize;
        let mut best_maintainers: BTreeSet<String> = BTreeSet::new();
        for (maintainer, detail) in candidates {
            if skipped_maintainers.iter().any(|m| m == maintainer) {
                continue;
            }
            // Direct build dependencies count the srpms that need them;
            // everything else counts the runtime require edges.
            let count = if lowest_level > 0 && lowest_sublevel == 0 {
                detail.locations.len()
            } else {
                detail.reasons.len()
            };
            if count > highest_count {
                highest_count = count;
                best_maintainers.clear();
            }
            if count == highest_count {
                best_maintainers.insert(maintainer.clone());
            }
        }
        srpm.rollup.best_maintainers.extend(best_maintainers);
    }
}

fn recommend_for_view(configs: &Configs, settings: &Settings, vaa: &mut ViewAllArches) {
    seed_required_packages(configs, vaa);

    let mut level: u32 = 0;
    let mut sublevel: u32;
    let mut previous_level_srpms: BTreeSet<String> = BTreeSet::new();
    let mut level_changes_made = true;
    let mut level_change_detection: BTreeSet<(String, String)> = BTreeSet::new();

    while level_changes_made {
        if level > 0 {
            level_changes_made = false;
            let planned = plan_build_dep_seeds(
                vaa,
                level,
                &previous_level_srpms,
                &mut level_change_detection,
                &mut level_changes_made,
            );
            for assignment in planned {
                apply_assignment(vaa, assignment, level, 0);
            }
        }

        // Walk runtime dependencies sublevel by sublevel until nothing new
        // gets assigned.
        sublevel = 0;
        let mut sublevel_changes_made = true;
        let mut sublevel_change_detection: BTreeSet<(String, String, String)> = BTreeSet::new();
        while sublevel_changes_made {
            sublevel_changes_made = false;
            let prev_sublevel = sublevel;
            sublevel += 1;

            let planned = plan_runtime_hops(
                vaa,
                level,
                prev_sublevel,
                &previous_level_srpms,
                &mut sublevel_change_detection,
                &mut sublevel_changes_made,
            );
            for assignment in planned {
                apply_assignment(vaa, assignment, level, sublevel);
            }
        }

        let owned = propagate_to_source_packages(vaa);
        previous_level_srpms.extend(owned);

        level += 1;
    }

    elect_best_maintainers(vaa, &settings.skipped_maintainers);
}

/// Ownership recommendation across all non-addon views.
pub fn recommend_maintainers(configs: &Configs, settings: &Settings, data: &mut AnalyzedData) {
    for (view_conf_id, view_conf) in &configs.views {
        if view_conf.view_type == ViewType::Addon {
            continue;
        }
        let Some(mut vaa) = data.views_all_arches.remove(view_conf_id) else {
            continue;
        };
        log_progress(format!(
            "phase=maintainers status=recommending view={view_conf_id}"
        ));
        recommend_for_view(configs, settings, &mut vaa);
        data.views_all_arches.insert(view_conf_id.clone(), vaa);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadConfig;
    use crate::data::{MaintainerDetail, PkgByName, SrpmByName};

    fn pkg_by_name(name: &str, source_name: &str) -> PkgByName {
        PkgByName {
            name: name.to_string(),
            source_name: source_name.to_string(),
            ..PkgByName::default()
        }
    }

    fn srpm_by_name(name: &str) -> SrpmByName {
        SrpmByName {
            name: name.to_string(),
            ..SrpmByName::default()
        }
    }

    fn configs_with_workload(conf_id: &str, maintainer: &str) -> Configs {
        let mut configs = Configs::default();
        configs.workloads.insert(
            conf_id.to_string(),
            WorkloadConfig {
                id: conf_id.to_string(),
                maintainer: maintainer.to_string(),
                ..WorkloadConfig::default()
            },
        );
        configs
    }

    fn test_settings() -> Settings {
        Settings {
            configs_dir: "/tmp".into(),
            output_dir: "/tmp".into(),
            use_cache: false,
            dev_buildroot: false,
            dnf_cache_dir_override: None,
            solver_command: "unused".to_string(),
            max_subprocesses: 1,
            allowed_arches: vec!["x86_64".to_string()],
            uninstallable_packages: Vec::new(),
            skipped_maintainers: Vec::new(),
            root_log_deps_cache_path: "/tmp/cache_root_log_deps.json".into(),
            strict: false,
        }
    }

    #[test]
    fn required_packages_seed_their_workload_maintainers() {
        let configs = configs_with_workload("w1", "alice");
        let settings = test_settings();

        let mut vaa = ViewAllArches::default();
        let mut nano = pkg_by_name("nano", "nano");
        nano.rollup
            .in_workload_ids_req
            .insert("w1:e1:repo:x86_64".to_string());
        vaa.pkgs_by_name.insert("nano".to_string(), nano);
        vaa.source_pkgs_by_name
            .insert("nano".to_string(), srpm_by_name("nano"));

        recommend_for_view(&configs, &settings, &mut vaa);

        let nano = &vaa.pkgs_by_name["nano"];
        assert_eq!(
            nano.rollup.maintainer_recommendation["alice"],
            BTreeSet::from([(0, 0)])
        );
        let detail = &nano.rollup.maintainer_recommendation_details[&0][&0]["alice"];
        assert_eq!(detail.locations, BTreeSet::from(["w1".to_string()]));

        let srpm = &vaa.source_pkgs_by_name["nano"];
        assert!(srpm.rollup.maintainer_recommendation.contains_key("alice"));
        assert_eq!(srpm.rollup.best_maintainers, BTreeSet::from(["alice".to_string()]));
    }

    #[test]
    fn runtime_dependencies_inherit_one_sublevel_down() {
        let configs = configs_with_workload("w1", "alice");
        let settings = test_settings();

        let mut vaa = ViewAllArches::default();
        // nano is required; ncurses-libs is a hard dependency of nano.
        let mut nano = pkg_by_name("nano", "nano");
        nano.rollup
            .in_workload_ids_req
            .insert("w1:e1:repo:x86_64".to_string());
        vaa.pkgs_by_name.insert("nano".to_string(), nano);

        let mut ncurses = pkg_by_name("ncurses-libs", "ncurses");
        ncurses
            .dependants
            .hard_dependency_of_pkg_names
            .entry("nano".to_string())
            .or_default()
            .insert("nano-7.2-1".to_string());
        vaa.pkgs_by_name.insert("ncurses-libs".to_string(), ncurses);

        vaa.source_pkgs_by_name
            .insert("nano".to_string(), srpm_by_name("nano"));
        vaa.source_pkgs_by_name
            .insert("ncurses".to_string(), srpm_by_name("ncurses"));

        recommend_for_view(&configs, &settings, &mut vaa);

        let ncurses = &vaa.pkgs_by_name["ncurses-libs"];
        assert_eq!(
            ncurses.rollup.maintainer_recommendation["alice"],
            BTreeSet::from([(0, 1)])
        );
        let detail = &ncurses.rollup.maintainer_recommendation_details[&0][&1]["alice"];
        assert_eq!(detail.locations, BTreeSet::from(["w1".to_string()]));
        assert_eq!(
            detail.reasons,
            BTreeSet::from([(
                "nano".to_string(),
                "nano".to_string(),
                "ncurses-libs".to_string()
            )])
        );

        let srpm = &vaa.source_pkgs_by_name["ncurses"];
        assert_eq!(srpm.rollup.best_maintainers, BTreeSet::from(["alice".to_string()]));
    }

    #[test]
    fn direct_build_requires_seed_the_next_level() {
        let configs = configs_with_workload("w1", "alice");
        let settings = test_settings();

        let mut vaa = ViewAllArches::default();
        // nano is required at runtime; gcc is a direct build require of the
        // nano source package.
        let mut nano = pkg_by_name("nano", "nano");
        nano.rollup
            .in_workload_ids_req
            .insert("w1:e1:repo:x86_64".to_string());
        vaa.pkgs_by_name.insert("nano".to_string(), nano);

        let mut gcc = pkg_by_name("gcc", "gcc");
        gcc.rollup
            .in_buildroot_of_srpm_name_req
            .entry("nano".to_string())
            .or_default()
            .insert("nano-7.2-1".to_string());
        vaa.pkgs_by_name.insert("gcc".to_string(), gcc);

        vaa.source_pkgs_by_name
            .insert("nano".to_string(), srpm_by_name("nano"));
        vaa.source_pkgs_by_name
            .insert("gcc".to_string(), srpm_by_name("gcc"));

        recommend_for_view(&configs, &settings, &mut vaa);

        let gcc = &vaa.pkgs_by_name["gcc"];
        assert_eq!(
            gcc.rollup.maintainer_recommendation["alice"],
            BTreeSet::from([(1, 0)])
        );
        let detail = &gcc.rollup.maintainer_recommendation_details[&1][&0]["alice"];
        assert_eq!(detail.locations, BTreeSet::from(["nano".to_string()]));

        let srpm = &vaa.source_pkgs_by_name["gcc"];
        assert_eq!(srpm.rollup.best_maintainers, BTreeSet::from(["alice".to_string()]));
    }

    #[test]
    fn election_breaks_ties_by_qualifying_count() {
        let mut vaa = ViewAllArches::default();
        let mut srpm = srpm_by_name("x");
        let details = srpm
            .rollup
            .maintainer_recommendation_details
            .entry(0)
            .or_default()
            .entry(0)
            .or_default();
        details.insert(
            "alice".to_string(),
            MaintainerDetail {
                reasons: BTreeSet::from([(
                    "a".to_string(),
                    "b".to_string(),
                    "c".to_string(),
                )]),
                locations: BTreeSet::new(),
            },
        );
        details.insert(
            "bob".to_string(),
            MaintainerDetail {
                reasons: BTreeSet::from([
                    ("d".to_string(), "e".to_string(), "f".to_string()),
                    ("g".to_string(), "h".to_string(), "i".to_string()),
                ]),
                locations: BTreeSet::new(),
            },
        );
        vaa.source_pkgs_by_name.insert("x".to_string(), srpm);

        elect_best_maintainers(&mut vaa, &[]);
        assert_eq!(
            vaa.source_pkgs_by_name["x"].rollup.best_maintainers,
            BTreeSet::from(["bob".to_string()])
        );
    }

    #[test]
    fn election_prefers_the_lowest_score_coordinate() {
        let mut vaa = ViewAllArches::default();
        let mut srpm = srpm_by_name("x");
        // carol is at (0,2), dave at (1,0): carol's level is lower and wins
        srpm.rollup
            .maintainer_recommendation_details
            .entry(0)
            .or_default()
            .entry(2)
            .or_default()
            .insert(
                "carol".to_string(),
                MaintainerDetail {
                    reasons: BTreeSet::from([(
                        "a".to_string(),
                        "b".to_string(),
                        "c".to_string(),
                    )]),
                    locations: BTreeSet::new(),
                },
            );
        srpm.rollup
            .maintainer_recommendation_details
            .entry(1)
            .or_default()
            .entry(0)
            .or_default()
            .insert(
                "dave".to_string(),
                MaintainerDetail {
                    reasons: BTreeSet::new(),
                    locations: BTreeSet::from(["s1".to_string(), "s2".to_string()]),
                },
            );
        vaa.source_pkgs_by_name.insert("x".to_string(), srpm);

        elect_best_maintainers(&mut vaa, &[]);
        assert_eq!(
            vaa.source_pkgs_by_name["x"].rollup.best_maintainers,
            BTreeSet::from(["carol".to_string()])
        );
    }

    #[test]
    fn skipped_maintainers_are_never_elected() {
        let configs = configs_with_workload("w1", "bot-account");
        let mut settings = test_settings();
        settings.skipped_maintainers = vec!["bot-account".to_string()];

        let mut vaa = ViewAllArches::default();
        let mut nano = pkg_by_name("nano", "nano");
        nano.rollup
            .in_workload_ids_req
            .insert("w1:e1:repo:x86_64".to_string());
        vaa.pkgs_by_name.insert("nano".to_string(), nano);
        vaa.source_pkgs_by_name
            .insert("nano".to_string(), srpm_by_name("nano"));

        recommend_for_view(&configs, &settings, &mut vaa);
        assert!(
            vaa.source_pkgs_by_name["nano"]
                .rollup
                .best_maintainers
                .is_empty()
        );
    }
}
