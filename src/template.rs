//! Request templating.
//!
//! Building a [`RequestTemplate`] is a pure function of the command
//! descriptor, the parameter bag and the [`ProviderContext`]. Nothing here
//! touches the network, so every rule (URL precedence, query ordering,
//! header merging, body omission) is testable in isolation.

use crate::context::ProviderContext;
use crate::error::EngineError;
use crate::params::{FieldSpec, ParameterBag, build_object, normalize_field};
use crate::schema::{AuthScheme, AuthSpec, BaseUrlSpec, CommandDescriptor, HeaderSource, HeaderSpec, ProviderSpec};
use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A fully assembled request that has not been sent yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    pub method: Method,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: Option<Value>,
}

impl RequestTemplate {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Resolves a base URL: env override, then legacy alias, then compiled default.
///
/// Read on every call, never cached.
pub fn resolve_base_url(spec: &BaseUrlSpec, ctx: &ProviderContext) -> String {
    let resolved = ctx
        .env(&spec.env)
        .or_else(|| spec.alias_env.as_deref().and_then(|alias| ctx.env(alias)))
        .unwrap_or_else(|| spec.default.clone());
    resolved.trim_end_matches('/').to_string()
}

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

/// Renders a normalized value for a URL; `None` when it must be skipped.
pub fn render_query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(render_query_value)
                .collect::<Vec<_>>()
                .join(",");
            (!joined.is_empty()).then_some(joined)
        }
        other => Some(other.to_string()),
    }
}

/// Joins `pairs` in the given order into `?k=v&...`, or `""` when none survive.
pub fn build_query_string(pairs: &[(String, Value)]) -> String {
    let parts: Vec<String> = pairs
        .iter()
        .filter_map(|(key, value)| {
            render_query_value(value).map(|v| format!("{}={}", encode_component(key), encode_component(&v)))
        })
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

/// Normalizes query fields in declaration order.
pub fn query_pairs(
    bag: &ParameterBag,
    specs: &[FieldSpec],
    ctx: &ProviderContext,
) -> Result<Vec<(String, Value)>, EngineError> {
    let mut pairs = Vec::with_capacity(specs.len());
    for spec in specs {
        if let Some(value) = normalize_field(bag, spec, ctx)? {
            pairs.push((spec.key.clone(), value));
        }
    }
    Ok(pairs)
}

/// Fills `{name}` placeholders with percent-encoded parameter values.
pub fn expand_path(template: &str, bag: &ParameterBag) -> Result<String, EngineError> {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let value = bag
            .get(name)
            .ok_or_else(|| EngineError::validation(name, "", "required path parameter is missing"))?;
        expanded.push_str(&rest[..start]);
        expanded.push_str(&encode_component(value));
        rest = &rest[start + len + 1..];
    }
    expanded.push_str(rest);
    Ok(expanded)
}

/// Inserts or overrides a header, matching existing names case-insensitively.
pub fn merge_header(headers: &mut IndexMap<String, String>, name: &str, value: String) {
    let existing = headers.keys().find(|key| key.eq_ignore_ascii_case(name)).cloned();
    match existing {
        Some(key) => {
            headers.insert(key, value);
        }
        None => {
            headers.insert(name.to_string(), value);
        }
    }
}

/// Credential headers from secret storage plus optional env metadata headers.
pub fn auth_headers(auth: &AuthSpec, ctx: &ProviderContext) -> Result<IndexMap<String, String>, EngineError> {
    let mut headers = IndexMap::new();
    match &auth.scheme {
        AuthScheme::None => {}
        AuthScheme::Bearer { secret } => {
            headers.insert("Authorization".to_string(), format!("Bearer {}", ctx.secret(secret)?));
        }
        AuthScheme::Headers(pairs) => {
            for (header, secret) in pairs {
                headers.insert(header.clone(), ctx.secret(secret)?);
            }
        }
    }
    for (header, env) in &auth.metadata {
        if let Some(value) = ctx.env(env) {
            headers.insert(header.clone(), value);
        }
    }
    Ok(headers)
}

fn command_header_value(spec: &HeaderSpec, bag: &ParameterBag) -> Option<String> {
    match &spec.source {
        HeaderSource::Param(param) => bag.get(param).map(str::to_string),
        HeaderSource::PreferWait(param) => match bag.get(param)? {
            "true" => Some("wait=60".to_string()),
            // An explicit opt-out sends no Prefer header at all, not `wait=false`.
            "false" => None,
            seconds => Some(format!("wait={}", seconds)),
        },
    }
}

/// Everything needed to assemble one request, independent of where it came from.
pub struct RequestParts<'a> {
    pub method: Method,
    pub base: &'a BaseUrlSpec,
    pub path: &'a str,
    pub query: &'a [FieldSpec],
    pub body: Option<&'a [FieldSpec]>,
    pub headers: &'a [HeaderSpec],
}

/// Assembles a request: URL, then body, then headers in merge order
/// (content type, auth, command-specific), later keys overriding earlier ones.
pub fn assemble(
    parts: RequestParts<'_>,
    auth: &AuthSpec,
    bag: &ParameterBag,
    ctx: &ProviderContext,
) -> Result<RequestTemplate, EngineError> {
    let path = expand_path(parts.path, bag)?;
    let query = build_query_string(&query_pairs(bag, parts.query, ctx)?);
    let body = match parts.body {
        Some(fields) => Some(Value::Object(build_object(bag, fields, ctx)?)),
        None => None,
    };

    let mut headers = IndexMap::new();
    if body.is_some() {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }
    for (name, value) in auth_headers(auth, ctx)? {
        merge_header(&mut headers, &name, value);
    }
    for spec in parts.headers {
        if let Some(value) = command_header_value(spec, bag) {
            merge_header(&mut headers, &spec.name, value);
        }
    }

    let url = format!("{}{}{}", resolve_base_url(parts.base, ctx), path, query);
    debug!("Assembled {} {}", parts.method, url);
    Ok(RequestTemplate {
        method: parts.method,
        url,
        headers,
        body,
    })
}

fn base_for<'a>(provider: &'a ProviderSpec, id: &str) -> Result<&'a BaseUrlSpec, EngineError> {
    provider.bases.get(id).ok_or_else(|| EngineError::UnknownProvider(format!("{} (base '{}')", provider.name, id)))
}

/// Builds the request a command issues.
pub fn build_request(
    provider: &ProviderSpec,
    command: &CommandDescriptor,
    bag: &ParameterBag,
    ctx: &ProviderContext,
) -> Result<RequestTemplate, EngineError> {
    let parts = RequestParts {
        method: command.method.clone(),
        base: base_for(provider, &command.base)?,
        path: &command.path,
        query: &command.query,
        body: command.body.as_deref(),
        headers: &command.headers,
    };
    assemble(parts, &provider.auth, bag, ctx)
}

/// Builds the bodiless GET a poll command issues against its status endpoint.
pub fn build_status_request(
    provider: &ProviderSpec,
    command: &CommandDescriptor,
    status_path: &str,
    bag: &ParameterBag,
    ctx: &ProviderContext,
) -> Result<RequestTemplate, EngineError> {
    let parts = RequestParts {
        method: Method::GET,
        base: base_for(provider, &command.base)?,
        path: status_path,
        query: &[],
        body: None,
        headers: &[],
    };
    assemble(parts, &provider.auth, bag, ctx)
}
