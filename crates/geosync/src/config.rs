use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// A single upstream geo database file and the name it is cached under.
///
/// The configured list is fixed for the process lifetime; order is
/// preserved for processing and log readability.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeoFileSpec {
    pub url: String,
    pub filename: String,
}

impl GeoFileSpec {
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
        }
    }
}

/// Built-in registry of upstream geo files.
pub fn default_files() -> Vec<GeoFileSpec> {
    vec![
        GeoFileSpec::new(
            "https://github.com/Loyalsoldier/v2ray-rules-dat/releases/latest/download/geoip.dat",
            "geoip.dat",
        ),
        GeoFileSpec::new(
            "https://github.com/Loyalsoldier/v2ray-rules-dat/releases/latest/download/geosite.dat",
            "geosite.dat",
        ),
        GeoFileSpec::new(
            "https://github.com/runetfreedom/russia-v2ray-rules-dat/releases/latest/download/geoip.dat",
            "geoip_RU.dat",
        ),
        GeoFileSpec::new(
            "https://github.com/runetfreedom/russia-v2ray-rules-dat/releases/latest/download/geosite.dat",
            "geosite_RU.dat",
        ),
    ]
}

/// Daemon configuration. Compiled-in defaults match the production
/// deployment; any field can be overridden from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Ordered list of files to keep in sync.
    pub files: Vec<GeoFileSpec>,
    /// Logical name of the managed container.
    pub container_name: String,
    /// Directory inside the container that receives the files.
    pub container_dir: String,
    /// Name of the in-container process to signal after an upload.
    pub process_name: String,
    /// Persistent local cache directory.
    pub cache_dir: PathBuf,
    /// Base synchronization interval.
    pub interval_secs: u64,
    /// Upper bound for the random jitter added to each interval.
    pub max_jitter_secs: u64,
    /// Timeout for metadata-only remote size probes.
    pub probe_timeout_secs: u64,
    /// Timeout for full streaming downloads.
    pub download_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            files: default_files(),
            container_name: "3x-ui".into(),
            container_dir: "/app/bin".into(),
            process_name: "xray-linux".into(),
            cache_dir: PathBuf::from("/app/geo"),
            interval_secs: 18 * 60 * 60,
            max_jitter_secs: 5 * 60,
            probe_timeout_secs: 30,
            download_timeout_secs: 60,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Load from the file named by `GEOSYNC_CONFIG`, falling back to
    /// defaults when the variable is unset.
    pub fn from_env() -> Self {
        match std::env::var("GEOSYNC_CONFIG") {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => Self::default(),
        }
    }

    /// Load from a TOML file. A missing or malformed file logs a warning
    /// and falls back to defaults rather than failing.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(
                        "failed to parse config at {}, using defaults: {e}",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "could not read config at {}, using defaults: {e}",
                    path.display()
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_four_files() {
        let files = default_files();
        assert_eq!(files.len(), 4);
        assert_eq!(files[0].filename, "geoip.dat");
        assert_eq!(files[1].filename, "geosite.dat");
        assert_eq!(files[2].filename, "geoip_RU.dat");
        assert_eq!(files[3].filename, "geosite_RU.dat");
    }

    #[test]
    fn defaults_target_the_xray_container() {
        let config = SyncConfig::default();
        assert_eq!(config.container_name, "3x-ui");
        assert_eq!(config.container_dir, "/app/bin");
        assert_eq!(config.process_name, "xray-linux");
        assert_eq!(config.interval_secs, 64_800);
        assert_eq!(config.max_jitter_secs, 300);
    }

    #[test]
    fn partial_toml_overrides_keep_remaining_defaults() {
        let toml_str = r#"
container_name = "proxy"
interval_secs = 3600

[[files]]
url = "https://example.com/geoip.dat"
filename = "geoip.dat"
"#;
        let config: SyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.container_name, "proxy");
        assert_eq!(config.interval_secs, 3600);
        assert_eq!(config.files.len(), 1);
        // untouched fields keep their defaults
        assert_eq!(config.process_name, "xray-linux");
        assert_eq!(config.cache_dir, PathBuf::from("/app/geo"));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geosync.toml");
        std::fs::write(&path, "not [valid toml").unwrap();

        let config = SyncConfig::load(&path);
        assert_eq!(config.container_name, "3x-ui");
        assert_eq!(config.files.len(), 4);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = SyncConfig::load(Path::new("/nonexistent/geosync.toml"));
        assert_eq!(config.files.len(), 4);
    }
}
