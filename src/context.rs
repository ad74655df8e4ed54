//! Per-invocation access to configuration and credentials.
//!
//! Commands never read the process environment or the keychain directly.
//! Instead the caller hands a [`ProviderContext`] to each invocation, which
//! keeps resolution order explicit and lets tests inject fakes. Nothing here
//! caches: every lookup goes back to its source so rotated credentials and
//! redirected base URLs take effect on the next call.

use crate::error::EngineError;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Keychain service name under which all provider secrets are stored.
pub const KEYRING_SERVICE: &str = "api-cli";

/// Environment variable selecting where secrets are read from.
pub const SECRETS_BACKEND_ENV_VAR: &str = "API_SECRETS_BACKEND";

/// Source of non-secret configuration values.
pub trait EnvSource: Send + Sync {
    /// Returns the value of `name`, treating an empty value as absent.
    fn read_env(&self, name: &str) -> Option<String>;
}

/// Source of credentials.
pub trait SecretSource: Send + Sync {
    /// Returns the secret `name` or fails with
    /// [`EngineError::MissingCredential`] when it is not stored.
    fn read_secret(&self, name: &str) -> Result<String, EngineError>;
}

/// Profile-level environment values layered over the process environment.
///
/// A non-empty profile value wins; otherwise the process variable is used.
#[derive(Debug, Clone, Default)]
pub struct ProfileEnv {
    values: BTreeMap<String, String>,
    inherit_process: bool,
}

impl ProfileEnv {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            inherit_process: true,
        }
    }

    /// Only the given values are visible; the process environment is ignored.
    pub fn isolated<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            inherit_process: false,
        }
    }
}

impl EnvSource for ProfileEnv {
    fn read_env(&self, name: &str) -> Option<String> {
        if let Some(value) = self.values.get(name).filter(|v| !v.is_empty()) {
            return Some(value.clone());
        }
        if !self.inherit_process {
            return None;
        }
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// Secret resolution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsBackend {
    /// OS keychain via `keyring`.
    Keychain,
    /// Process environment variable `<PROVIDER>_<NAME>`.
    Environment,
}

impl SecretsBackend {
    fn from_env_var(raw: Option<String>) -> Self {
        match raw.unwrap_or_default().trim().to_ascii_lowercase().as_str() {
            "env" => Self::Environment,
            _ => Self::Keychain,
        }
    }
}

/// Determine the currently configured secrets backend.
pub fn secrets_backend() -> SecretsBackend {
    SecretsBackend::from_env_var(std::env::var(SECRETS_BACKEND_ENV_VAR).ok())
}

/// Opens the secret store selected by [`secrets_backend`].
pub fn open_secret_store(provider: &str, profile: &str) -> Box<dyn SecretSource> {
    match secrets_backend() {
        SecretsBackend::Keychain => Box::new(KeyringSecrets::new(provider, profile)),
        SecretsBackend::Environment => Box::new(EnvSecrets::new(provider)),
    }
}

/// Secrets kept in the OS keychain, scoped by provider and profile.
#[derive(Debug, Clone)]
pub struct KeyringSecrets {
    provider: String,
    profile: String,
}

impl KeyringSecrets {
    pub fn new(provider: &str, profile: &str) -> Self {
        Self {
            provider: provider.to_string(),
            profile: profile.to_string(),
        }
    }

    fn account(&self, name: &str) -> String {
        format!("{}/{}/{}", self.provider, self.profile, name)
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry, EngineError> {
        keyring::Entry::new(KEYRING_SERVICE, &self.account(name)).map_err(|e| EngineError::Secret {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    pub fn store(&self, name: &str, value: &str) -> Result<(), EngineError> {
        self.entry(name)?.set_password(value).map_err(|e| EngineError::Secret {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        debug!("Stored secret '{}' for {}/{}", name, self.provider, self.profile);
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<(), EngineError> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(EngineError::Secret {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

impl SecretSource for KeyringSecrets {
    fn read_secret(&self, name: &str) -> Result<String, EngineError> {
        match self.entry(name)?.get_password() {
            Ok(value) if !value.is_empty() => Ok(value),
            Ok(_) | Err(keyring::Error::NoEntry) => Err(EngineError::missing_credential(name)),
            Err(e) => Err(EngineError::Secret {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Secrets read from process environment variables, for keychain-free CI.
#[derive(Debug, Clone)]
pub struct EnvSecrets {
    provider: String,
}

impl EnvSecrets {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
        }
    }

    /// `replicate` + `token` → `REPLICATE_TOKEN`.
    pub fn variable_name(&self, name: &str) -> String {
        format!("{}_{}", self.provider, name)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl SecretSource for EnvSecrets {
    fn read_secret(&self, name: &str) -> Result<String, EngineError> {
        std::env::var(self.variable_name(name))
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EngineError::missing_credential(name))
    }
}

/// In-memory secrets for tests and embedding hosts.
#[derive(Debug, Clone, Default)]
pub struct MemorySecrets {
    values: HashMap<String, String>,
}

impl MemorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

impl SecretSource for MemorySecrets {
    fn read_secret(&self, name: &str) -> Result<String, EngineError> {
        self.values
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| EngineError::missing_credential(name))
    }
}

/// Explicit environment and secret access handed to one invocation.
pub struct ProviderContext {
    env: Box<dyn EnvSource>,
    secrets: Box<dyn SecretSource>,
}

impl ProviderContext {
    pub fn new(env: Box<dyn EnvSource>, secrets: Box<dyn SecretSource>) -> Self {
        Self { env, secrets }
    }

    pub fn env(&self, name: &str) -> Option<String> {
        self.env.read_env(name)
    }

    pub fn secret(&self, name: &str) -> Result<String, EngineError> {
        self.secrets.read_secret(name)
    }
}
