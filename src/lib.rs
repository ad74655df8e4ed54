//! apicall - declarative command execution for HTTP/JSON APIs.
//!
//! Providers are described as data: base URLs, an auth scheme and a list of
//! commands whose query, body and headers are declared field by field. A
//! generic engine turns a flat `key=value` parameter bag into a concrete
//! request, sends it, and for long-running jobs polls until they settle.
//!
//! # Architecture
//!
//! - [`params`] - Parameter bag and field normalization
//! - [`schema`] - Provider and command descriptors
//! - [`template`] - Request assembly (URL, query, headers, body)
//! - [`poller`] - Long-running-operation state machine and driver
//! - [`registry`] - Provider/command lookup over the built-in catalog
//! - [`engine`] - Invocation entry point
//! - [`context`] - Environment and secret sources for one invocation
//! - [`http_client`] - HTTP transport abstraction
//! - [`providers`] - Clock abstraction
//! - [`config`] - Profile storage for the CLI
//! - [`error`] - Engine error type
//!
//! # Example
//!
//! ```no_run
//! use apicall::context::{MemorySecrets, ProfileEnv, ProviderContext};
//! use apicall::engine::Engine;
//! use apicall::http_client::ReqwestTransport;
//! use apicall::params::ParameterBag;
//! use apicall::providers::SystemClock;
//! use apicall::registry::Registry;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::new(
//!         Registry::builtin(),
//!         Box::new(ReqwestTransport::default()),
//!         Box::new(SystemClock::new()),
//!     );
//!     let ctx = ProviderContext::new(
//!         Box::new(ProfileEnv::default()),
//!         Box::new(MemorySecrets::new().with("token", "r8_...")),
//!     );
//!     let bag = ParameterBag::new().with("id", "abc123").with("timeout_s", "60");
//!     let output = engine.invoke("replicate", "predictions.wait", &bag, &ctx).await?;
//!     println!("{}", output.render_text());
//!     Ok(())
//! }
//! ```

mod catalog;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod http_client;
pub mod params;
pub mod poller;
pub mod providers;
pub mod registry;
pub mod schema;
pub mod template;
