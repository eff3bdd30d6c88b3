use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "codelab", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file, built-in defaults are used when omitted
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Whether to flush the existing database
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let Some(path) = &self.config_path else {
            return Ok(Config::default());
        };
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open config file {path}"))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).with_context(|| format!("Failed to parse config file {path}"))
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub runner: RunnerConfig,
    pub sources: SourcesConfig,
    pub database: DatabaseConfig,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

/// Settings for the Go toolchain and the ephemeral workspaces it runs in
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RunnerConfig {
    pub go_binary: PathBuf,
    pub timeout: MilliSecond,
    pub version_check_timeout: MilliSecond,
    /// Directory under which workspaces are created, the system temp dir if unset
    pub workspace_root: Option<PathBuf>,
    pub workspace_prefix: String,
    pub module_name: String,
    pub go_version: String,
    pub env: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            go_binary: PathBuf::from("go"),
            timeout: MilliSecond(6000),
            version_check_timeout: MilliSecond(3000),
            workspace_root: None,
            workspace_prefix: "go-run-".to_string(),
            module_name: "codelab/sandbox".to_string(),
            go_version: "1.21".to_string(),
            env: BTreeMap::from([("GOTOOLCHAIN".to_string(), "local".to_string())]),
        }
    }
}

impl RunnerConfig {
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SourcesConfig {
    pub api_base: String,
    pub github_token: Option<String>,
    pub user_agent: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            github_token: None,
            user_agent: "codelab-runner".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Location of the SQLite file, the platform data directory if unset
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

impl From<MilliSecond> for Duration {
    fn from(value: MilliSecond) -> Self {
        Duration::from_millis(value.0)
    }
}
