use crate::config::{
    DEFAULT_ALLOWED_ARCHES, DEFAULT_MAX_SUBPROCESSES, DEFAULT_SOLVER_COMMAND, Settings,
};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "packset",
    version,
    about = "Plan distribution package sets across workloads, views, and buildroots"
)]
pub struct Cli {
    /// Directory with YAML configuration files. Only files ending with
    /// '.yaml' (and '.json' side inputs) are accepted.
    pub configs: PathBuf,

    /// Directory to contain the output.
    pub output: PathBuf,

    /// Load configs and analyzed data from the on-disk cache files in the
    /// output directory and skip the analysis stage entirely.
    #[arg(long)]
    pub use_cache: bool,

    /// The buildroot grows quickly. Use a small fake one for development.
    #[arg(long)]
    pub dev_buildroot: bool,

    /// Override the shared solver metadata cache directory. Defaults to a
    /// temporary directory removed when the run finishes.
    #[arg(long)]
    pub dnf_cache_dir: Option<PathBuf>,

    /// Maximum number of concurrent solver child processes.
    #[arg(long, default_value_t = DEFAULT_MAX_SUBPROCESSES)]
    pub max_subprocesses: usize,

    /// Solver backend command executed for each resolver child.
    #[arg(long, default_value = DEFAULT_SOLVER_COMMAND)]
    pub solver_command: String,

    /// Treat configuration file errors as fatal instead of skipping the
    /// offending files.
    #[arg(long)]
    pub strict: bool,
}

impl Cli {
    pub fn settings(&self) -> Settings {
        Settings {
            configs_dir: self.configs.clone(),
            output_dir: self.output.clone(),
            use_cache: self.use_cache,
            dev_buildroot: self.dev_buildroot,
            dnf_cache_dir_override: self.dnf_cache_dir.clone(),
            solver_command: self.solver_command.clone(),
            max_subprocesses: self.max_subprocesses,
            allowed_arches: DEFAULT_ALLOWED_ARCHES
                .iter()
                .map(|arch| arch.to_string())
                .collect(),
            uninstallable_packages: vec!["glibc32".to_string()],
            skipped_maintainers: Vec::new(),
            root_log_deps_cache_path: self.output.join("cache_root_log_deps.json"),
            strict: self.strict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::try_parse_from(["packset", "/etc/packset/configs", "/srv/packset/out"])
            .expect("defaults should parse");

        assert_eq!(cli.configs, PathBuf::from("/etc/packset/configs"));
        assert_eq!(cli.output, PathBuf::from("/srv/packset/out"));
        assert!(!cli.use_cache);
        assert!(!cli.dev_buildroot);
        assert!(cli.dnf_cache_dir.is_none());
        assert_eq!(cli.max_subprocesses, 10);
        assert_eq!(cli.solver_command, "packset-solver-backend");
        assert!(!cli.strict);

        let settings = cli.settings();
        assert_eq!(settings.allowed_arches.len(), 4);
        assert_eq!(settings.uninstallable_packages, vec!["glibc32"]);
        assert_eq!(
            settings.root_log_deps_cache_path,
            PathBuf::from("/srv/packset/out/cache_root_log_deps.json")
        );
        settings.validate().expect("default settings are valid");
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "packset",
            "configs",
            "out",
            "--use-cache",
            "--dev-buildroot",
            "--dnf-cache-dir",
            "/var/cache/packset-dnf",
            "--max-subprocesses",
            "4",
            "--solver-command",
            "/usr/libexec/packset/solver",
            "--strict",
        ])
        .expect("overrides should parse");

        assert!(cli.use_cache);
        assert!(cli.dev_buildroot);
        assert_eq!(cli.dnf_cache_dir, Some(PathBuf::from("/var/cache/packset-dnf")));
        assert_eq!(cli.max_subprocesses, 4);
        assert_eq!(cli.solver_command, "/usr/libexec/packset/solver");
        assert!(cli.strict);

        let settings = cli.settings();
        assert!(settings.use_cache);
        assert!(settings.dev_buildroot);
        assert_eq!(
            settings.dnf_cache_dir_override,
            Some(PathBuf::from("/var/cache/packset-dnf"))
        );
    }

    #[test]
    fn both_positional_arguments_are_required() {
        assert!(Cli::try_parse_from(["packset"]).is_err());
        assert!(Cli::try_parse_from(["packset", "configs-only"]).is_err());
    }
}
