use anyhow::{Context, Result, anyhow, bail};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "API_CONFIG_DIR";
pub const DEFAULT_PROFILE: &str = "default";

/// Resolve the configuration directory: explicit flag, then `API_CONFIG_DIR`,
/// then the platform config dir.
pub fn base_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let platform = config_dir().ok_or_else(|| anyhow!("Could not find a configuration directory"))?;
    Ok(platform.join("api"))
}

pub fn ensure_layout(base: &Path) -> Result<()> {
    let profiles = base.join("profiles");
    fs::create_dir_all(&profiles).with_context(|| format!("creating {}", profiles.display()))?;
    Ok(())
}

pub fn profiles_path(base: &Path, provider: &str) -> PathBuf {
    base.join("profiles").join(format!("{}.toml", provider))
}

/// One named profile. Secret values live in the secret store; only names are kept here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Profiles of one provider, stored as `profiles/<provider>.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profiles {
    #[serde(default = "default_profile_name")]
    pub default: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

fn default_profile_name() -> String {
    DEFAULT_PROFILE.to_string()
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            default: default_profile_name(),
            profiles: BTreeMap::from([(DEFAULT_PROFILE.to_string(), Profile::default())]),
        }
    }
}

impl Profiles {
    /// Load a provider's profiles; a missing file yields a single `default` profile.
    pub fn load(base: &Path, provider: &str) -> Result<Self> {
        let path = profiles_path(base, provider);
        if !path.exists() {
            debug!("No profiles file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let mut profiles: Profiles = toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        if profiles.profiles.is_empty() {
            profiles.profiles.insert(profiles.default.clone(), Profile::default());
        }
        info!("Loaded {} profiles from: {}", profiles.profiles.len(), path.display());
        Ok(profiles)
    }

    pub fn save(&self, base: &Path, provider: &str) -> Result<()> {
        ensure_layout(base)?;
        let path = profiles_path(base, provider);
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        info!("Saved profiles to: {}", path.display());
        Ok(())
    }

    /// Picks the profile for an invocation.
    ///
    /// An explicit name must exist. Without one, the default profile is used
    /// when present, then the only profile; anything else is ambiguous.
    pub fn resolve(&self, requested: Option<&str>) -> Result<(&str, &Profile)> {
        if let Some(name) = requested {
            return self
                .profiles
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v))
                .ok_or_else(|| anyhow!("unknown profile '{}'", name));
        }
        if let Some((name, profile)) = self.profiles.get_key_value(&self.default) {
            return Ok((name.as_str(), profile));
        }
        let mut all = self.profiles.iter();
        match (all.next(), all.next()) {
            (Some((name, profile)), None) => Ok((name.as_str(), profile)),
            (None, _) => bail!("no profiles configured"),
            _ => bail!("multiple profiles exist; pass --profile"),
        }
    }

    pub fn add(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            bail!("profile name must not be empty");
        }
        if self.profiles.contains_key(name) {
            bail!("profile '{}' already exists", name);
        }
        self.profiles.insert(name.to_string(), Profile::default());
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Profile> {
        if name == self.default {
            bail!("cannot remove the default profile '{}'", name);
        }
        self.profiles
            .remove(name)
            .ok_or_else(|| anyhow!("unknown profile '{}'", name))
    }

    fn profile_mut(&mut self, name: &str) -> Result<&mut Profile> {
        self.profiles
            .get_mut(name)
            .ok_or_else(|| anyhow!("unknown profile '{}'", name))
    }

    /// Records that a secret named `secret` is stored for the profile.
    pub fn upsert_secret(&mut self, profile: &str, secret: &str) -> Result<()> {
        let entry = self.profile_mut(profile)?;
        if !entry.secrets.iter().any(|s| s == secret) {
            entry.secrets.push(secret.to_string());
            entry.secrets.sort();
        }
        Ok(())
    }

    pub fn remove_secret(&mut self, profile: &str, secret: &str) -> Result<bool> {
        let entry = self.profile_mut(profile)?;
        let before = entry.secrets.len();
        entry.secrets.retain(|s| s != secret);
        Ok(entry.secrets.len() != before)
    }

    pub fn upsert_env(&mut self, profile: &str, key: &str, value: &str) -> Result<()> {
        if key.trim().is_empty() {
            bail!("environment key must not be empty");
        }
        self.profile_mut(profile)?
            .env
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_env(&mut self, profile: &str, key: &str) -> Result<bool> {
        Ok(self.profile_mut(profile)?.env.remove(key).is_some())
    }
}

pub fn show_config_info(base: &Path, provider: &str) -> Result<()> {
    let path = profiles_path(base, provider);
    println!("Configuration directory: {}", base.display());
    println!("Profiles file: {}", path.display());
    if !path.exists() {
        println!("Status: Not found (using defaults)");
    }

    let profiles = Profiles::load(base, provider)?;
    for (name, profile) in &profiles.profiles {
        let marker = if *name == profiles.default { " (default)" } else { "" };
        println!("\n{}{}", name, marker);
        println!(
            "  secrets: {}",
            if profile.secrets.is_empty() { "-".to_string() } else { profile.secrets.join(", ") }
        );
        for key in profile.env.keys() {
            println!("  env: {}", key);
        }
    }
    Ok(())
}
