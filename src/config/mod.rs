// ABOUTME: Configuration types and parsing for gantry.yml.
// ABOUTME: Handles YAML parsing, env var interpolation, and the init template.

mod env_value;
mod healthcheck;
mod launcher;
mod registry;
mod restart_policy;
mod secret;
mod source;
mod stop;

pub use env_value::{EnvValue, resolve_env_map};
pub use healthcheck::HealthcheckConfig;
pub use launcher::LauncherConfig;
pub use registry::RegistryConfig;
pub use restart_policy::RestartPolicy;
pub use secret::SecretConfig;
pub use source::SourceConfig;
pub use stop::StopConfig;

use crate::error::{Error, Result};
use crate::types::{ImageRef, ServiceName};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "gantry.yml";
pub const CONFIG_FILENAME_ALT: &str = "gantry.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".gantry/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_service_name")]
    pub service: ServiceName,

    /// Repository the built image is tagged under. Tags are assigned per
    /// run (build number + latest), so a fixed tag here is rejected.
    #[serde(deserialize_with = "deserialize_image_repo")]
    pub image: ImageRef,

    pub source: SourceConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub secret: Option<SecretConfig>,

    #[serde(default)]
    pub registry: Option<RegistryConfig>,

    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default)]
    pub healthcheck: Option<HealthcheckConfig>,

    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub health_timeout: Duration,

    #[serde(default)]
    pub restart: RestartPolicy,

    #[serde(default)]
    pub stop: Option<StopConfig>,

    #[serde(default)]
    pub launcher: Option<LauncherConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Build context directory, relative to the workspace.
    #[serde(default = "default_context")]
    pub context: String,

    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            context: default_context(),
            dockerfile: default_dockerfile(),
        }
    }
}

fn default_context() -> String {
    ".".to_string()
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(120)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Graceful stop timeout for the previous instance.
    pub fn stop_timeout(&self) -> Duration {
        self.stop
            .as_ref()
            .map(|s| s.timeout)
            .unwrap_or_else(|| StopConfig::default().timeout)
    }
}

pub fn init_config(
    dir: &Path,
    service: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let service = match service {
        Some(s) => ServiceName::new(s).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        None => ServiceName::new("my-app").map_err(|e| Error::InvalidConfig(e.to_string()))?,
    };

    let image = match image {
        Some(i) => {
            let parsed = ImageRef::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?;
            if parsed.tag().is_some() {
                return Err(Error::InvalidConfig(
                    "image must be a repository without a tag".to_string(),
                ));
            }
            parsed
        }
        None => ImageRef::parse("registry.example.com/team/my-app")
            .map_err(|e| Error::InvalidConfig(e.to_string()))?,
    };

    let yaml = generate_template_yaml(&service, &image);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(service: &ServiceName, image: &ImageRef) -> String {
    format!(
        r#"service: {service}
image: {image}

source:
  url: https://git.example.com/team/{service}.git
  branch: main

secret:
  source:
    env: SECRET_ENV_FILE
  target: .env

registry:
  server: {registry}
  username:
    env: REGISTRY_USER
  password:
    env: REGISTRY_PASS

ports:
  - "8501:8501"

restart: always
"#,
        service = service,
        image = image,
        registry = image.registry().unwrap_or("registry.example.com"),
    )
}

// Custom deserializers

fn deserialize_service_name<'de, D>(deserializer: D) -> std::result::Result<ServiceName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ServiceName::new(&s).map_err(serde::de::Error::custom)
}

fn deserialize_image_repo<'de, D>(deserializer: D) -> std::result::Result<ImageRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let parsed = ImageRef::parse(&s).map_err(serde::de::Error::custom)?;
    if parsed.tag().is_some() || parsed.digest().is_some() {
        return Err(serde::de::Error::custom(
            "image must be a repository path; tags are assigned per build",
        ));
    }
    Ok(parsed)
}
