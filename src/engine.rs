//! Invocation entry point.
//!
//! [`Engine::invoke`] resolves a command, templates its request, sends it
//! and, for job commands, polls the status endpoint until the job settles.
//! Each invocation is independent: the only shared state is the read-only
//! registry, and everything environment- or credential-dependent comes from
//! the [`ProviderContext`] passed in.

use crate::context::ProviderContext;
use crate::error::EngineError;
use crate::http_client::{HttpResponse, Transport};
use crate::params::{ParameterBag, parse_number};
use crate::poller::{JobFetcher, JobState, PollConfig, PollOutcome, poll_until_terminal};
use crate::providers::Clock;
use crate::registry::Registry;
use crate::schema::{CommandDescriptor, PollSpec, ProviderSpec, ResponseMode};
use crate::template::{RequestTemplate, build_request, build_status_request};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What an invocation hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// The full response of a [`ResponseMode::Raw`] command.
    Response(HttpResponse),
    /// The parsed body of a [`ResponseMode::Json`] command (`null` if not JSON).
    Json(Value),
    /// The last observed state of a polled job.
    Job(PollOutcome),
}

impl CommandOutput {
    /// JSON view of the result.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Response(response) => response
                .json
                .clone()
                .unwrap_or_else(|| Value::String(response.body.clone())),
            Self::Json(value) => value.clone(),
            Self::Job(outcome) => outcome.state.payload.clone(),
        }
    }

    /// Text view of the result: raw body for plain responses, pretty JSON otherwise.
    pub fn render_text(&self) -> String {
        match self {
            Self::Response(response) => response.body.clone(),
            other => serde_json::to_string_pretty(&other.to_json()).unwrap_or_default(),
        }
    }

    /// True when a polled job was still not terminal at the deadline.
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::Job(outcome) if outcome.timed_out)
    }
}

pub struct Engine {
    registry: Registry,
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
}

impl Engine {
    pub fn new(registry: Registry, transport: Box<dyn Transport>, clock: Box<dyn Clock>) -> Self {
        Self {
            registry,
            transport,
            clock,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Builds the request a command would send, without sending it.
    pub fn prepare(
        &self,
        provider: &str,
        command: &str,
        bag: &ParameterBag,
        ctx: &ProviderContext,
    ) -> Result<RequestTemplate, EngineError> {
        let (provider_spec, descriptor) = self.registry.command(provider, command)?;
        build_request(provider_spec, descriptor, bag, ctx)
    }

    pub async fn invoke(
        &self,
        provider: &str,
        command: &str,
        bag: &ParameterBag,
        ctx: &ProviderContext,
    ) -> Result<CommandOutput, EngineError> {
        let (provider_spec, descriptor) = self.registry.command(provider, command)?;
        info!("Invoking {}.{} with {} params", provider, command, bag.len());

        if let Some(poll) = &descriptor.poll {
            return self.run_poll(provider_spec, descriptor, poll, bag, ctx).await;
        }

        let request = build_request(provider_spec, descriptor, bag, ctx)?;
        let response = self.transport.send(&request).await?;
        info!("{}.{} answered {}", provider, command, response.status);

        Ok(match descriptor.response {
            ResponseMode::Raw => CommandOutput::Response(response),
            ResponseMode::Json => CommandOutput::Json(response.json.unwrap_or(Value::Null)),
        })
    }

    async fn run_poll(
        &self,
        provider: &ProviderSpec,
        command: &CommandDescriptor,
        poll: &PollSpec,
        bag: &ParameterBag,
        ctx: &ProviderContext,
    ) -> Result<CommandOutput, EngineError> {
        let config = poll_config(bag, poll)?;
        // Fails on a missing id or credential before anything is sent.
        build_status_request(provider, command, &poll.path, bag, ctx)?;
        debug!(
            "Polling {}.{} every {:?} for up to {:?}",
            provider.name, command.name, config.interval, config.timeout
        );

        let fetcher = StatusFetcher {
            transport: self.transport.as_ref(),
            provider,
            command,
            poll,
            bag,
            ctx,
        };
        let outcome = poll_until_terminal(&fetcher, self.clock.as_ref(), config).await?;
        if outcome.timed_out {
            warn!(
                "{}.{} still {:?} after {:?}",
                provider.name, command.name, outcome.state.status, config.timeout
            );
        }
        Ok(CommandOutput::Job(outcome))
    }
}

/// Reads the poll interval (milliseconds) and timeout (seconds) parameters.
fn poll_config(bag: &ParameterBag, poll: &PollSpec) -> Result<PollConfig, EngineError> {
    let interval = duration_param(bag, &poll.interval_param, 1.0)?;
    let timeout = duration_param(bag, &poll.timeout_param, 1000.0)?;
    Ok(PollConfig::new(interval, timeout))
}

fn duration_param(bag: &ParameterBag, name: &str, millis_per_unit: f64) -> Result<Option<Duration>, EngineError> {
    let Some(raw) = bag.get(name) else {
        return Ok(None);
    };
    let amount = parse_number(name, raw)?.as_f64().unwrap_or_default();
    if amount < 0.0 {
        return Err(EngineError::validation(name, raw, "must not be negative"));
    }
    // Round up so a positive value never collapses to zero and picks up the default.
    Ok(Some(Duration::from_millis((amount * millis_per_unit).ceil() as u64)))
}

struct StatusFetcher<'a> {
    transport: &'a dyn Transport,
    provider: &'a ProviderSpec,
    command: &'a CommandDescriptor,
    poll: &'a PollSpec,
    bag: &'a ParameterBag,
    ctx: &'a ProviderContext,
}

#[async_trait]
impl JobFetcher for StatusFetcher<'_> {
    async fn fetch(&self) -> Result<JobState, EngineError> {
        // Re-templated per fetch so rotated credentials are picked up.
        let request = build_status_request(self.provider, self.command, &self.poll.path, self.bag, self.ctx)?;
        let response = self.transport.send(&request).await?;
        let payload = response.json.unwrap_or(Value::Null);
        Ok(JobState::from_payload(payload, &self.poll.status_field))
    }
}
