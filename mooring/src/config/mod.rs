use std::{path::Path, path::PathBuf, time::Duration};

use mooring_core::{
    config::{ContainerConfig, RuntimeConfig},
    define_const,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

mod extractor;

const DEFAULT_DEPLOYMENT_DIRECTORY: &str = "deployments";
const DEFAULT_SCAN_INTERVAL_SEC: u64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub appclient: AppClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScannerConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_scan_interval_sec")]
    pub scan_interval_sec: u64,
    // rescan every interval; otherwise scan once at boot
    #[serde(default = "default_scanner_enabled")]
    pub enabled: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            scan_interval_sec: default_scan_interval_sec(),
            enabled: default_scanner_enabled(),
        }
    }
}

impl ScannerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_sec)
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from(DEFAULT_DEPLOYMENT_DIRECTORY)
}

define_const!(default_scan_interval_sec, DEFAULT_SCAN_INTERVAL_SEC, u64);
define_const!(default_scanner_enabled, true, bool);

/// Boots the server as an application client container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppClientConfig {
    #[serde(default)]
    pub enabled: bool,
    pub deployment: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file_content = mooring_core::util::file_read_sync(path)?;
        parse_from_slice(&file_content)
    }

    /// Command line values win over the file. Naming a client deployment or
    /// passing client arguments turns application client mode on.
    pub fn merge_args(&mut self, deployment: Option<String>, args: Vec<String>) {
        if deployment.is_some() {
            self.appclient.deployment = deployment;
            self.appclient.enabled = true;
        }
        if !args.is_empty() {
            self.appclient.args = args;
            self.appclient.enabled = true;
        }
    }
}

pub fn parse_from_slice<T: DeserializeOwned>(content: &[u8]) -> anyhow::Result<T> {
    // read first non-space u8
    let is_json = match content
        .iter()
        .find(|&&b| b != b' ' && b != b'\r' && b != b'\n' && b != b'\t')
    {
        Some(first) => *first == b'{',
        None => false,
    };
    match is_json {
        true => serde_json::from_slice::<T>(content).map_err(Into::into),
        false => toml::from_str::<T>(&String::from_utf8_lossy(content)).map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{parse_from_slice, Config};

    #[test]
    fn test_parse_toml() {
        let config: Config = parse_from_slice(
            br#"
[runtime]
worker_threads = 2

[scanner]
directory = "/srv/deployments"
enabled = false

[appclient]
enabled = true
deployment = "client.jar"
args = ["--name", "world"]
"#,
        )
        .unwrap();
        assert_eq!(2, config.runtime.worker_threads);
        assert_eq!(PathBuf::from("/srv/deployments"), config.scanner.directory);
        assert_eq!(5, config.scanner.scan_interval().as_secs());
        assert!(!config.scanner.enabled);
        assert!(config.appclient.enabled);
        assert_eq!(Some("client.jar"), config.appclient.deployment.as_deref());
        assert_eq!(30, config.container.shutdown_timeout().as_secs());
    }

    #[test]
    fn test_parse_json_and_empty() {
        let config: Config =
            parse_from_slice(br#"  {"container": {"shutdown_timeout_sec": 3}}"#).unwrap();
        assert_eq!(3, config.container.shutdown_timeout_sec);
        assert!(config.scanner.enabled);

        let config: Config = parse_from_slice(b"").unwrap();
        assert_eq!(PathBuf::from("deployments"), config.scanner.directory);
        assert!(!config.appclient.enabled);
    }

    #[test]
    fn test_args_enable_appclient() {
        let mut config = Config::default();
        config.merge_args(None, Vec::new());
        assert!(!config.appclient.enabled);

        config.merge_args(None, vec!["-v".to_string()]);
        assert!(config.appclient.enabled);
        assert_eq!(vec!["-v".to_string()], config.appclient.args);
        assert_eq!(None, config.appclient.deployment);
    }
}
