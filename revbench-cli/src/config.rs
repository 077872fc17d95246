//! Orchestrator configuration
//!
//! Settings come from an optional `revbench.toml` discovered by walking up
//! from the current directory; every field has a default so the file is only
//! needed when the project layout or build tool differs from the defaults.
//!
//! ```toml
//! [projects]
//! engine_dir = "engine"
//! bench_dir = "benchmarks"
//!
//! [build]
//! command = "cargo"
//! args = ["build", "--release"]
//! artifact = "target/release/benchmarks"
//!
//! [output]
//! path = "revbench.csv"
//! ```

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file name searched for in the current directory and its ancestors.
pub const CONFIG_FILE: &str = "revbench.toml";

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Project directory layout under the base path.
    pub projects: ProjectsConfig,
    /// Build-tool invocation.
    pub build: BuildConfig,
    /// Output locations.
    pub output: OutputConfig,
}

/// The two sibling project directories expected under the base path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectsConfig {
    /// Engine project directory, relative to the base path.
    pub engine_dir: String,
    /// Benchmark-executable project directory, relative to the base path.
    pub bench_dir: String,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            engine_dir: "engine".to_string(),
            bench_dir: "benchmarks".to_string(),
        }
    }
}

/// How to compile one project directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Build tool executable.
    pub command: String,
    /// Arguments requesting a release build.
    pub args: Vec<String>,
    /// Optional dependency-restore command run in each project directory
    /// before building (empty = skip the restore step).
    pub restore_command: String,
    /// Arguments for the restore command.
    pub restore_args: Vec<String>,
    /// Path of the runnable benchmark artifact, relative to the benchmark
    /// project directory.
    pub artifact: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: "cargo".to_string(),
            args: vec!["build".to_string(), "--release".to_string()],
            restore_command: String::new(),
            restore_args: Vec::new(),
            artifact: "target/release/benchmarks".to_string(),
        }
    }
}

/// Output file locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Final aggregate matrix, written to the current directory.
    pub path: String,
    /// Per-revision result file the benchmark process writes into its
    /// working directory.
    pub result_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "revbench.csv".to_string(),
            result_file: "benchmarks.csv".to_string(),
        }
    }
}

/// Find the nearest `revbench.toml` at or above `start`.
pub fn discover(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        let candidate = d.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent();
    }
    None
}

/// Load the nearest config file, or defaults when none exists.
pub fn load(start: &Path) -> anyhow::Result<Config> {
    match discover(start) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config = toml::from_str(&text)
                .with_context(|| format!("invalid config in {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_cargo_workspace_layout() {
        let config = Config::default();
        assert_eq!(config.projects.engine_dir, "engine");
        assert_eq!(config.projects.bench_dir, "benchmarks");
        assert_eq!(config.build.command, "cargo");
        assert_eq!(config.build.args, vec!["build", "--release"]);
        assert_eq!(config.output.result_file, "benchmarks.csv");
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config: Config = toml::from_str(
            r#"
            [projects]
            engine_dir = "core"

            [build]
            command = "dotnet"
            args = ["build", "-c", "Release"]
            restore_command = "dotnet"
            restore_args = ["restore"]
            "#,
        )
        .unwrap();
        assert_eq!(config.projects.engine_dir, "core");
        assert_eq!(config.projects.bench_dir, "benchmarks");
        assert_eq!(config.build.command, "dotnet");
        assert_eq!(config.build.restore_command, "dotnet");
        assert_eq!(config.output.path, "revbench.csv");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Config, _> = toml::from_str("[outputs]\npath = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn discover_walks_up_to_an_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "").unwrap();

        let found = discover(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE));
    }
}
