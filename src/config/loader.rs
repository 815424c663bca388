use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::DispatcherConfig;

/// Load configuration from a file using the config crate
/// Supports TOML (default), YAML and JSON. Unknown keys are an error.
pub async fn load_config(config_path: &str) -> Result<DispatcherConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<DispatcherConfig> {
    let config_path = Path::new(config_path);

    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let dispatcher_config: DispatcherConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(dispatcher_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
listen = "127.0.0.1:8402"
path = "/"
forward = ["http://10.0.0.1:80", "http://10.0.0.2:80"]
circular_prevention = "X-Dispatched"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen, "127.0.0.1:8402");
        assert_eq!(config.path, "/");
        assert_eq!(config.forward.len(), 2);
        assert_eq!(config.circular_prevention, "X-Dispatched");
        assert_eq!(config.upstream_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_missing_keys_fall_back_to_defaults() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "forward = [\"http://origin:8080\"]\n").unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen, "[::1]:44046");
        assert_eq!(config.path, "/.well-known/acme-challenge/");
        assert_eq!(config.circular_prevention, "X-ACME-Dispatcher");
    }

    #[tokio::test]
    async fn test_unknown_key_is_rejected() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            temp_file,
            "forward = [\"http://origin:8080\"]\nretries = 3\n"
        )
        .unwrap();

        let result = load_config(temp_file.path().to_str().unwrap()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let json_content = r#"
{
  "listen": "0.0.0.0:8080",
  "forward": ["http://a:80", "http://b:80"],
  "idempotent_only": true
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert!(config.idempotent_only);
    }
}
