use crate::aggregate::{CollectOptions, FileErrorPolicy};
use crate::cli::Cli;
use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_CONTEXT, DEFAULT_FETCH_WORKERS,
    DEFAULT_MAX_DIFF_BYTES, GIT_PROGRAM, GIT_TIMEOUT_SECS,
};
use crate::source::Backend;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// settings file contents, every key optional
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub max_diff_bytes: Option<usize>,
    pub on_file_error: Option<FileErrorPolicy>,
    pub jobs: Option<usize>,
    pub backend: Option<Backend>,
    pub context_lines: Option<u32>,
    pub git_program: Option<String>,
    pub git_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// `<config dir>/staged-diff/config.json`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// load the settings file; a missing default file means defaults
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    match explicit {
        Some(path) => read(path),
        None => match default_path() {
            Some(path) if path.is_file() => read(&path),
            _ => Ok(FileConfig::default()),
        },
    }
}

fn read(path: &Path) -> Result<FileConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid config file {}", path.display()))
}

/// effective settings: command line, then settings file, then defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub repo: PathBuf,
    pub collect: CollectOptions,
    pub backend: Backend,
    pub context_lines: u32,
    pub git_program: String,
    pub git_timeout: Duration,
    pub timeout: Option<Duration>,
}

impl Settings {
    pub fn resolve(cli: &Cli, file: FileConfig) -> Self {
        let max_diff_bytes = cli
            .max_diff_bytes
            .or(file.max_diff_bytes)
            .unwrap_or(DEFAULT_MAX_DIFF_BYTES);

        Self {
            repo: cli.repo.clone(),
            collect: CollectOptions {
                max_diff_bytes: (max_diff_bytes > 0).then_some(max_diff_bytes),
                on_file_error: cli.on_file_error.or(file.on_file_error).unwrap_or_default(),
                jobs: cli.jobs.or(file.jobs).unwrap_or(DEFAULT_FETCH_WORKERS),
            },
            backend: cli.backend.or(file.backend).unwrap_or_default(),
            context_lines: cli
                .context_lines
                .or(file.context_lines)
                .unwrap_or(DEFAULT_CONTEXT),
            git_program: file.git_program.unwrap_or_else(|| GIT_PROGRAM.to_string()),
            git_timeout: Duration::from_secs(file.git_timeout_secs.unwrap_or(GIT_TIMEOUT_SECS)),
            timeout: cli.timeout.or(file.timeout_secs).map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("staged-diff").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&parse(&["diff"]), FileConfig::default());
        assert_eq!(settings.collect, CollectOptions::default());
        assert_eq!(settings.backend, Backend::Libgit2);
        assert_eq!(settings.context_lines, DEFAULT_CONTEXT);
        assert_eq!(settings.git_program, GIT_PROGRAM);
        assert_eq!(settings.git_timeout, Duration::from_secs(GIT_TIMEOUT_SECS));
        assert_eq!(settings.timeout, None);
    }

    #[test]
    fn test_file_overrides_defaults_and_cli_overrides_file() {
        let file: FileConfig = serde_json::from_str(
            r#"{"jobs": 2, "backend": "git", "on_file_error": "abort-all", "timeout_secs": 9}"#,
        )
        .unwrap();
        let settings = Settings::resolve(&parse(&["diff", "--jobs", "5"]), file);
        assert_eq!(settings.collect.jobs, 5);
        assert_eq!(settings.backend, Backend::Git);
        assert_eq!(settings.collect.on_file_error, FileErrorPolicy::AbortAll);
        assert_eq!(settings.timeout, Some(Duration::from_secs(9)));
    }

    #[test]
    fn test_zero_max_diff_bytes_disables_cap() {
        let settings = Settings::resolve(
            &parse(&["diff", "--max-diff-bytes", "0"]),
            FileConfig::default(),
        );
        assert_eq!(settings.collect.max_diff_bytes, None);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result = serde_json::from_str::<FileConfig>(r#"{"max_bytes": 10}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"max_diff_bytes": 4096, "context_lines": 1}"#).unwrap();

        let file = load(Some(&path)).unwrap();
        assert_eq!(file.max_diff_bytes, Some(4096));
        assert_eq!(file.context_lines, Some(1));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = load(Some(&temp_dir.path().join("nope.json"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
