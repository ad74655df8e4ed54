//! Built-in providers.
//!
//! Each submodule is pure data: a [`ProviderSpec`] listing base URLs,
//! authentication and command field declarations.

use crate::schema::ProviderSpec;

mod alpaca;
mod openrouter;
mod perplexity;
mod replicate;

/// All providers shipped with the binary, in listing order.
pub fn builtin_providers() -> Vec<ProviderSpec> {
    vec![
        alpaca::provider(),
        openrouter::provider(),
        perplexity::provider(),
        replicate::provider(),
    ]
}
