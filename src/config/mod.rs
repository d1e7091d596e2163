// src/config/mod.rs
pub mod duration;
mod models;

pub use duration::{parse_duration, DurationError};
pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML, JSON or TOML by extension), with
/// `ROUTER_*` environment variables layered on top.
///
/// `ROUTER_HOSTS` takes a comma separated list; nested keys use `__`,
/// e.g. `ROUTER_FORWARD__TIMEOUT=3s`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let settings = ::config::Config::builder()
        .add_source(::config::File::from(path))
        .add_source(
            ::config::Environment::with_prefix("ROUTER")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("hosts")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: Config = settings
        .try_deserialize()
        .context("Failed to parse config")?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write_config(extension: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "router-config-{}.{}",
            uuid::Uuid::new_v4(),
            extension
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_yaml_with_defaults() {
        let path = write_config(
            "yml",
            "hosts:\n  - http://localhost:8081\n  - http://localhost:8082\nhealth_check_interval: 5s\n",
        );

        let config = load_config(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.hosts[1].as_str(), "http://localhost:8082/");
        assert_eq!(config.health_check_interval, Duration::from_secs(5));
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.health_check.path, "/health");
        assert_eq!(config.health_check.timeout, Duration::from_secs(1));
        assert_eq!(config.forward.path, "/echo");
        assert_eq!(config.forward.timeout, Duration::from_secs(2));
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_load_json_with_overrides() {
        let path = write_config(
            "json",
            r#"{
                "listen": "127.0.0.1:9000",
                "hosts": ["http://localhost:8081"],
                "health_check_interval": 10,
                "forward": { "timeout": "500ms" },
                "metrics": { "enabled": true, "port": 9100 }
            }"#,
        );

        let config = load_config(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.health_check_interval, Duration::from_secs(10));
        assert_eq!(config.forward.timeout, Duration::from_millis(500));
        assert_eq!(config.forward.path, "/echo");
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9100);
        assert_eq!(config.metrics.path, "/metrics");
    }

    #[test]
    fn test_empty_hosts_rejected() {
        let path = write_config("yml", "hosts: []\nhealth_check_interval: 5s\n");

        let err = load_config(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(err.to_string().contains("at least one host"));
    }

    #[test]
    fn test_duplicate_hosts_rejected() {
        let path = write_config(
            "yml",
            "hosts:\n  - http://localhost:8081\n  - http://localhost:8081/\nhealth_check_interval: 5s\n",
        );

        let err = load_config(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_bad_interval_rejected() {
        let path = write_config(
            "yml",
            "hosts:\n  - http://localhost:8081\nhealth_check_interval: soon\n",
        );

        assert!(load_config(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config("/nonexistent/router-config.yml").is_err());
    }
}
