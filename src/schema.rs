//! Declarative command schema.
//!
//! A provider is described once, at load time, as data: where its base URLs
//! come from, how it authenticates, and for each command which parameters
//! feed the path, query, body and headers. A single generic templater
//! ([`crate::template`]) turns any of these descriptors into a request.

use crate::params::FieldSpec;
use indexmap::IndexMap;
use reqwest::Method;

/// Identifier of the base URL commands use unless they pick another.
pub const PRIMARY_BASE: &str = "api";

/// Base URL resolved per call: primary env var, then legacy alias, then default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrlSpec {
    pub env: String,
    pub alias_env: Option<String>,
    pub default: String,
}

impl BaseUrlSpec {
    pub fn new(env: &str, default: &str) -> Self {
        Self {
            env: env.to_string(),
            alias_env: None,
            default: default.to_string(),
        }
    }

    pub fn alias(mut self, env: &str) -> Self {
        self.alias_env = Some(env.to_string());
        self
    }
}

/// How credentials are turned into headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    /// `Authorization: Bearer <secret>`.
    Bearer { secret: String },
    /// One header per `(header name, secret name)` pair.
    Headers(Vec<(String, String)>),
}

/// Provider-wide authentication: credentials plus optional metadata headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSpec {
    pub scheme: AuthScheme,
    /// `(header name, env var)`; sent only when the variable is set and non-empty.
    pub metadata: Vec<(String, String)>,
}

impl AuthSpec {
    pub fn none() -> Self {
        Self {
            scheme: AuthScheme::None,
            metadata: Vec::new(),
        }
    }

    pub fn bearer(secret: &str) -> Self {
        Self {
            scheme: AuthScheme::Bearer {
                secret: secret.to_string(),
            },
            metadata: Vec::new(),
        }
    }

    pub fn headers(pairs: &[(&str, &str)]) -> Self {
        Self {
            scheme: AuthScheme::Headers(
                pairs
                    .iter()
                    .map(|(header, secret)| (header.to_string(), secret.to_string()))
                    .collect(),
            ),
            metadata: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, header: &str, env: &str) -> Self {
        self.metadata.push((header.to_string(), env.to_string()));
        self
    }
}

/// Where a command-specific header gets its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSource {
    /// Raw parameter value, sent as-is.
    Param(String),
    /// Server-side wait budget: `"true"` becomes `wait=60`, `"false"` is
    /// dropped, anything else becomes `wait=<value>`.
    PreferWait(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSpec {
    pub name: String,
    pub source: HeaderSource,
}

impl HeaderSpec {
    pub fn param(name: &str, param: &str) -> Self {
        Self {
            name: name.to_string(),
            source: HeaderSource::Param(param.to_string()),
        }
    }

    pub fn prefer_wait(param: &str) -> Self {
        Self {
            name: "Prefer".to_string(),
            source: HeaderSource::PreferWait(param.to_string()),
        }
    }
}

/// What the caller receives after a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Status, headers, body text and parsed JSON.
    Raw,
    /// Only the parsed JSON body.
    Json,
}

/// Turns a command into a poll loop over a job-status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    /// Status endpoint path template, e.g. `/predictions/{id}`.
    pub path: String,
    /// Top-level field of the status payload holding the job status.
    pub status_field: String,
    /// Parameter holding the poll interval in milliseconds.
    pub interval_param: String,
    /// Parameter holding the overall timeout in seconds.
    pub timeout_param: String,
}

impl PollSpec {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            status_field: "status".to_string(),
            interval_param: "poll_ms".to_string(),
            timeout_param: "timeout_s".to_string(),
        }
    }
}

/// Static description of one invocable operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    /// Accepted parameter names, for documentation. Unknown keys are ignored.
    pub args: Vec<String>,
    pub method: Method,
    pub base: String,
    /// Path template; `{name}` segments are filled from the parameter bag.
    pub path: String,
    pub query: Vec<FieldSpec>,
    /// `None` sends no body at all; `Some` always sends a JSON object.
    pub body: Option<Vec<FieldSpec>>,
    pub headers: Vec<HeaderSpec>,
    pub response: ResponseMode,
    pub poll: Option<PollSpec>,
}

impl CommandDescriptor {
    pub fn new(name: &str, description: &str, method: Method, path: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            args: Vec::new(),
            method,
            base: PRIMARY_BASE.to_string(),
            path: path.to_string(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            response: ResponseMode::Raw,
            poll: None,
        }
    }

    pub fn get(name: &str, description: &str, path: &str) -> Self {
        Self::new(name, description, Method::GET, path)
    }

    pub fn post(name: &str, description: &str, path: &str) -> Self {
        Self::new(name, description, Method::POST, path)
    }

    pub fn patch(name: &str, description: &str, path: &str) -> Self {
        Self::new(name, description, Method::PATCH, path)
    }

    pub fn delete(name: &str, description: &str, path: &str) -> Self {
        Self::new(name, description, Method::DELETE, path)
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn base(mut self, base: &str) -> Self {
        self.base = base.to_string();
        self
    }

    pub fn query(mut self, fields: Vec<FieldSpec>) -> Self {
        self.query = fields;
        self
    }

    pub fn body(mut self, fields: Vec<FieldSpec>) -> Self {
        self.body = Some(fields);
        self
    }

    pub fn header(mut self, header: HeaderSpec) -> Self {
        self.headers.push(header);
        self
    }

    pub fn json_response(mut self) -> Self {
        self.response = ResponseMode::Json;
        self
    }

    pub fn poll(mut self, poll: PollSpec) -> Self {
        self.poll = Some(poll);
        self
    }
}

/// A provider: base URLs, authentication and its commands in declaration order.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub name: String,
    pub bases: IndexMap<String, BaseUrlSpec>,
    pub auth: AuthSpec,
    pub commands: IndexMap<String, CommandDescriptor>,
}

impl ProviderSpec {
    pub fn new(name: &str, primary: BaseUrlSpec) -> Self {
        let mut bases = IndexMap::new();
        bases.insert(PRIMARY_BASE.to_string(), primary);
        Self {
            name: name.to_string(),
            bases,
            auth: AuthSpec::none(),
            commands: IndexMap::new(),
        }
    }

    pub fn base(mut self, id: &str, spec: BaseUrlSpec) -> Self {
        self.bases.insert(id.to_string(), spec);
        self
    }

    pub fn auth(mut self, auth: AuthSpec) -> Self {
        self.auth = auth;
        self
    }

    pub fn command(mut self, command: CommandDescriptor) -> Self {
        self.commands.insert(command.name.clone(), command);
        self
    }
}
