// ABOUTME: Container registry credentials configuration.
// ABOUTME: Username and password are env references resolved only at publish time.

use super::env_value::EnvValue;
use crate::error::Result;
use crate::runtime::RegistryAuth;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Registry server address, e.g. "registry.example.com".
    #[serde(default)]
    pub server: Option<String>,

    pub username: EnvValue,

    pub password: EnvValue,
}

impl RegistryConfig {
    /// Resolve credentials from the environment.
    ///
    /// Called inside the publish stage so the resolved secret lives no
    /// longer than the push itself; bollard sends it per request and
    /// nothing is cached on the host afterwards.
    pub fn auth(&self) -> Result<RegistryAuth> {
        Ok(RegistryAuth {
            username: self.username.resolve()?,
            password: self.password.resolve()?,
            server: self.server.clone(),
        })
    }
}
