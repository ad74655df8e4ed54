//! Parameter normalization.
//!
//! Callers hand every command a flat bag of string values. A [`FieldSpec`]
//! declares how one of those strings becomes a typed JSON value and what
//! happens when it is missing. A field that resolves to `None` is omitted:
//! its key never appears in the generated body or query, not even as `null`.

use crate::context::ProviderContext;
use crate::error::EngineError;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Raw, string-valued parameters supplied by the caller.
///
/// Empty strings are indistinguishable from absent keys for every lookup
/// made through [`ParameterBag::get`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterBag {
    values: HashMap<String, String>,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the raw value when present and non-empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl From<HashMap<String, String>> for ParameterBag {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

/// What a boolean field does when its parameter is absent.
///
/// There is no crate-wide default; each boolean field picks one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolPolicy {
    /// Absent yields `false`.
    FalseWhenAbsent,
    /// Absent omits the field.
    OmitWhenAbsent,
}

/// How a raw string is coerced.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Passed through unchanged.
    String,
    /// Parsed as an integer when possible, else as a finite float.
    Number,
    /// Only the literal `"true"` is true.
    Bool(BoolPolicy),
    /// The raw value is itself a JSON document.
    Json,
    /// Comma-separated list of strings.
    List,
    /// Chat transcript: a JSON `messages` array, or one assembled from the
    /// `system` and `q` parameters.
    Messages,
}

/// Where to look when a field's own parameter is absent, tried in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    /// Another parameter, coerced with its own kind.
    Param(String, FieldKind),
    /// An environment value, sent as a string.
    Env(String),
    /// A literal default.
    Value(Value),
}

/// Declaration of one body or query field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Key read from the [`ParameterBag`].
    pub param: String,
    /// Key written to the outgoing body or query.
    pub key: String,
    pub kind: FieldKind,
    pub fallbacks: Vec<Fallback>,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            param: name.to_string(),
            key: name.to_string(),
            kind,
            fallbacks: Vec::new(),
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn flag(name: &str, policy: BoolPolicy) -> Self {
        Self::new(name, FieldKind::Bool(policy))
    }

    pub fn json(name: &str) -> Self {
        Self::new(name, FieldKind::Json)
    }

    pub fn list(name: &str) -> Self {
        Self::new(name, FieldKind::List)
    }

    pub fn messages() -> Self {
        Self::new("messages", FieldKind::Messages)
    }

    /// Writes the value under `key` instead of the parameter name.
    pub fn key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn or_param(mut self, name: &str, kind: FieldKind) -> Self {
        self.fallbacks.push(Fallback::Param(name.to_string(), kind));
        self
    }

    pub fn or_env(mut self, var: &str) -> Self {
        self.fallbacks.push(Fallback::Env(var.to_string()));
        self
    }

    pub fn or_value(mut self, value: impl Into<Value>) -> Self {
        self.fallbacks.push(Fallback::Value(value.into()));
        self
    }
}

/// Resolves one field, returning `None` when it must be omitted.
pub fn normalize_field(
    bag: &ParameterBag,
    spec: &FieldSpec,
    ctx: &ProviderContext,
) -> Result<Option<Value>, EngineError> {
    if let Some(value) = coerce(bag, &spec.param, &spec.kind)? {
        return Ok(Some(value));
    }
    for fallback in &spec.fallbacks {
        match fallback {
            Fallback::Param(name, kind) => {
                if let Some(value) = coerce(bag, name, kind)? {
                    return Ok(Some(value));
                }
            }
            Fallback::Env(var) => {
                if let Some(value) = ctx.env(var) {
                    return Ok(Some(Value::String(value)));
                }
            }
            Fallback::Value(value) => return Ok(Some(value.clone())),
        }
    }
    Ok(None)
}

/// Builds a JSON object from `specs`, leaving out every omitted field.
pub fn build_object(
    bag: &ParameterBag,
    specs: &[FieldSpec],
    ctx: &ProviderContext,
) -> Result<Map<String, Value>, EngineError> {
    let mut object = Map::new();
    for spec in specs {
        if let Some(value) = normalize_field(bag, spec, ctx)? {
            object.insert(spec.key.clone(), value);
        }
    }
    Ok(object)
}

fn coerce(bag: &ParameterBag, name: &str, kind: &FieldKind) -> Result<Option<Value>, EngineError> {
    let raw = bag.get(name);
    match kind {
        FieldKind::String => Ok(raw.map(|r| Value::String(r.to_string()))),
        FieldKind::Number => raw.map(|r| parse_number(name, r)).transpose(),
        FieldKind::Bool(policy) => Ok(match (raw, policy) {
            (Some(r), _) => Some(Value::Bool(r == "true")),
            (None, BoolPolicy::FalseWhenAbsent) => Some(Value::Bool(false)),
            (None, BoolPolicy::OmitWhenAbsent) => None,
        }),
        FieldKind::Json => raw.map(|r| parse_json(name, r)).transpose(),
        FieldKind::List => Ok(raw.map(split_list)),
        FieldKind::Messages => build_messages(bag, name).map(Some),
    }
}

/// Parses a numeric parameter without ever substituting zero.
pub fn parse_number(field: &str, raw: &str) -> Result<Value, EngineError> {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Ok(Value::from(int));
    }
    match trimmed.parse::<f64>() {
        Ok(float) if float.is_finite() => Ok(Value::from(float)),
        _ => Err(EngineError::validation(field, raw, "expected a number")),
    }
}

pub fn parse_json(field: &str, raw: &str) -> Result<Value, EngineError> {
    serde_json::from_str(raw).map_err(|e| EngineError::validation(field, raw, format!("malformed JSON: {}", e)))
}

fn split_list(raw: &str) -> Value {
    Value::Array(
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(item.to_string()))
            .collect(),
    )
}

fn build_messages(bag: &ParameterBag, name: &str) -> Result<Value, EngineError> {
    if let Some(raw) = bag.get(name) {
        return parse_json(name, raw);
    }
    let mut messages = Vec::new();
    if let Some(system) = bag.get("system") {
        messages.push(json!({"role": "system", "content": system}));
    }
    if let Some(q) = bag.get("q") {
        messages.push(json!({"role": "user", "content": q}));
    }
    Ok(Value::Array(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MemorySecrets, ProfileEnv};

    fn ctx() -> ProviderContext {
        ProviderContext::new(Box::new(ProfileEnv::isolated([("DEFAULT_MODEL", "env-model")])), Box::new(MemorySecrets::new()))
    }

    fn resolve(bag: &ParameterBag, spec: FieldSpec) -> Result<Option<Value>, EngineError> {
        normalize_field(bag, &spec, &ctx())
    }

    #[test]
    fn test_empty_value_is_absent() {
        let bag = ParameterBag::new().with("country", "");
        assert_eq!(bag.get("country"), None);
        assert_eq!(resolve(&bag, FieldSpec::string("country")).unwrap(), None);
    }

    #[test]
    fn test_number_parses_float_exactly() {
        let bag = ParameterBag::new().with("temperature", "0.7");
        assert_eq!(resolve(&bag, FieldSpec::number("temperature")).unwrap(), Some(json!(0.7)));
    }

    #[test]
    fn test_number_keeps_integers_integral() {
        let bag = ParameterBag::new().with("max_tokens", "256");
        let value = resolve(&bag, FieldSpec::number("max_tokens")).unwrap().unwrap();
        assert_eq!(value, json!(256));
        assert!(value.is_i64());
    }

    #[test]
    fn test_number_absent_is_omitted() {
        assert_eq!(resolve(&ParameterBag::new(), FieldSpec::number("limit")).unwrap(), None);
    }

    #[test]
    fn test_bad_number_is_validation_error() {
        let bag = ParameterBag::new().with("qty", "ten");
        match resolve(&bag, FieldSpec::number("qty")) {
            Err(EngineError::Validation { field, raw, .. }) => {
                assert_eq!(field, "qty");
                assert_eq!(raw, "ten");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_number_is_rejected() {
        let bag = ParameterBag::new().with("top_p", "inf");
        assert!(matches!(
            resolve(&bag, FieldSpec::number("top_p")),
            Err(EngineError::Validation { .. })
        ));
    }

    #[test]
    fn test_bool_policies() {
        let empty = ParameterBag::new();
        assert_eq!(
            resolve(&empty, FieldSpec::flag("stream", BoolPolicy::FalseWhenAbsent)).unwrap(),
            Some(json!(false))
        );
        assert_eq!(resolve(&empty, FieldSpec::flag("nested", BoolPolicy::OmitWhenAbsent)).unwrap(), None);

        let yes = ParameterBag::new().with("stream", "true");
        assert_eq!(
            resolve(&yes, FieldSpec::flag("stream", BoolPolicy::OmitWhenAbsent)).unwrap(),
            Some(json!(true))
        );

        let other = ParameterBag::new().with("stream", "yes");
        assert_eq!(
            resolve(&other, FieldSpec::flag("stream", BoolPolicy::OmitWhenAbsent)).unwrap(),
            Some(json!(false))
        );
    }

    #[test]
    fn test_json_field_parses() {
        let bag = ParameterBag::new().with("search_domain_filter", r#"["arxiv.org","nature.com"]"#);
        assert_eq!(
            resolve(&bag, FieldSpec::json("search_domain_filter")).unwrap(),
            Some(json!(["arxiv.org", "nature.com"]))
        );
    }

    #[test]
    fn test_malformed_json_names_field() {
        let bag = ParameterBag::new().with("take_profit", "{bad");
        match resolve(&bag, FieldSpec::json("take_profit")) {
            Err(EngineError::Validation { field, raw, reason }) => {
                assert_eq!(field, "take_profit");
                assert_eq!(raw, "{bad");
                assert!(reason.starts_with("malformed JSON"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_list_splits_on_comma() {
        let bag = ParameterBag::new().with("symbols", "AAPL, MSFT,,TSLA");
        assert_eq!(
            resolve(&bag, FieldSpec::list("symbols")).unwrap(),
            Some(json!(["AAPL", "MSFT", "TSLA"]))
        );
        assert_eq!(resolve(&ParameterBag::new(), FieldSpec::list("symbols")).unwrap(), None);
    }

    #[test]
    fn test_fallback_chain_order() {
        let spec = FieldSpec::string("model").or_env("DEFAULT_MODEL").or_value("compiled-model");
        assert_eq!(
            resolve(&ParameterBag::new().with("model", "explicit"), spec.clone()).unwrap(),
            Some(json!("explicit"))
        );
        assert_eq!(resolve(&ParameterBag::new(), spec).unwrap(), Some(json!("env-model")));

        let literal = FieldSpec::string("model").or_env("UNSET_MODEL").or_value("compiled-model");
        assert_eq!(resolve(&ParameterBag::new(), literal).unwrap(), Some(json!("compiled-model")));
    }

    #[test]
    fn test_param_fallback_uses_its_own_kind() {
        let spec = FieldSpec::string("q").key("query").or_param("query", FieldKind::Json).or_value("");
        let bag = ParameterBag::new().with("query", r#"["a","b"]"#);
        assert_eq!(resolve(&bag, spec.clone()).unwrap(), Some(json!(["a", "b"])));
        assert_eq!(resolve(&ParameterBag::new(), spec).unwrap(), Some(json!("")));
    }

    #[test]
    fn test_messages_from_q_and_system() {
        let bag = ParameterBag::new().with("q", "hello").with("system", "be brief");
        assert_eq!(
            resolve(&bag, FieldSpec::messages()).unwrap(),
            Some(json!([
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"}
            ]))
        );
    }

    #[test]
    fn test_explicit_messages_win() {
        let bag = ParameterBag::new()
            .with("q", "ignored")
            .with("messages", r#"[{"role":"user","content":"hi"}]"#);
        assert_eq!(
            resolve(&bag, FieldSpec::messages()).unwrap(),
            Some(json!([{"role": "user", "content": "hi"}]))
        );
    }

    #[test]
    fn test_build_object_omits_absent_keys() {
        let specs = vec![
            FieldSpec::string("symbol"),
            FieldSpec::number("qty"),
            FieldSpec::number("notional"),
            FieldSpec::json("stop_loss"),
        ];
        let bag = ParameterBag::new().with("symbol", "AAPL").with("notional", "250.5");
        let object = build_object(&bag, &specs, &ctx()).unwrap();
        assert_eq!(Value::Object(object), json!({"symbol": "AAPL", "notional": 250.5}));
    }

    #[test]
    fn test_build_object_stops_at_first_invalid_field() {
        let specs = vec![FieldSpec::number("limit"), FieldSpec::json("filter")];
        let bag = ParameterBag::new().with("limit", "5").with("filter", "{bad");
        assert!(matches!(
            build_object(&bag, &specs, &ctx()),
            Err(EngineError::Validation { ref field, .. }) if field == "filter"
        ));
    }

    #[test]
    fn test_bag_from_iterator() {
        let bag: ParameterBag = [("a", "1"), ("b", "")].into_iter().collect();
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.get("a"), Some("1"));
        assert_eq!(bag.get("b"), None);
    }
}
