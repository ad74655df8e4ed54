//! Provider and command lookup.

use crate::catalog;
use crate::error::EngineError;
use crate::schema::{CommandDescriptor, ProviderSpec};
use indexmap::IndexMap;
use tracing::debug;

/// Command used when the caller names only a provider.
pub const DEFAULT_COMMAND: &str = "default";

/// Documentation for one command, as shown by `inspect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDoc {
    pub name: String,
    pub description: String,
    pub args: Vec<String>,
}

/// Read-only map of providers, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    providers: IndexMap<String, ProviderSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in catalog.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for provider in catalog::builtin_providers() {
            registry.register(provider);
        }
        registry
    }

    /// Adds a provider, replacing any previous one with the same name.
    pub fn register(&mut self, provider: ProviderSpec) {
        debug!("Registered provider '{}' with {} commands", provider.name, provider.commands.len());
        self.providers.insert(provider.name.clone(), provider);
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn provider(&self, name: &str) -> Result<&ProviderSpec, EngineError> {
        self.providers
            .get(name)
            .ok_or_else(|| EngineError::UnknownProvider(name.to_string()))
    }

    pub fn command(&self, provider: &str, command: &str) -> Result<(&ProviderSpec, &CommandDescriptor), EngineError> {
        let spec = self.provider(provider)?;
        let descriptor = spec.commands.get(command).ok_or_else(|| EngineError::UnknownCommand {
            provider: provider.to_string(),
            command: command.to_string(),
        })?;
        Ok((spec, descriptor))
    }

    pub fn describe(&self, provider: &str) -> Result<Vec<CommandDoc>, EngineError> {
        Ok(self
            .provider(provider)?
            .commands
            .values()
            .map(|c| CommandDoc {
                name: c.name.clone(),
                description: c.description.clone(),
                args: c.args.clone(),
            })
            .collect())
    }
}

/// Splits CLI words into `(provider, command, remaining)`.
///
/// `alpaca.orders.list k=v` and `alpaca orders.list k=v` are equivalent; a
/// lone provider, or one followed only by `key=value` words, targets
/// [`DEFAULT_COMMAND`].
pub fn split_target(words: &[String]) -> Option<(String, String, &[String])> {
    let (first, rest) = words.split_first()?;
    if let Some((provider, command)) = first.split_once('.') {
        return Some((provider.to_string(), command.to_string(), rest));
    }
    match rest.split_first() {
        Some((command, tail)) if !command.contains('=') => Some((first.clone(), command.clone(), tail)),
        _ => Some((first.clone(), DEFAULT_COMMAND.to_string(), rest)),
    }
}
