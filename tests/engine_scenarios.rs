use apicall::context::{MemorySecrets, ProfileEnv, ProviderContext, SecretSource};
use apicall::engine::{CommandOutput, Engine};
use apicall::error::EngineError;
use apicall::http_client::{HttpResponse, Transport};
use apicall::params::ParameterBag;
use apicall::poller::JobStatus;
use apicall::providers::{Clock, SystemClock};
use apicall::registry::Registry;
use apicall::template::RequestTemplate;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Records every request and answers from a queue, then with `fallback`.
#[derive(Clone, Default)]
struct RecordingTransport {
    sent: Arc<Mutex<Vec<RequestTemplate>>>,
    responses: Arc<Mutex<VecDeque<Result<HttpResponse, EngineError>>>>,
    fallback: Option<String>,
}

impl RecordingTransport {
    fn answering(bodies: &[Value]) -> Self {
        let transport = Self::default();
        for body in bodies {
            transport.push(Ok(HttpResponse::new(200, body.to_string())));
        }
        transport
    }

    fn repeating(body: Value) -> Self {
        Self {
            fallback: Some(body.to_string()),
            ..Self::default()
        }
    }

    fn push(&self, response: Result<HttpResponse, EngineError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn sent(&self) -> Vec<RequestTemplate> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: &RequestTemplate) -> Result<HttpResponse, EngineError> {
        self.sent.lock().unwrap().push(request.clone());
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }
        Ok(HttpResponse::new(200, self.fallback.clone().unwrap_or_else(|| "{}".to_string())))
    }
}

/// Clock whose time only moves when the poller sleeps.
#[derive(Clone, Default)]
struct ManualClock {
    now: Arc<AtomicU64>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

#[async_trait]
impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.now.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

/// Secret source whose value can change between reads.
#[derive(Clone)]
struct RotatingSecret(Arc<Mutex<String>>);

impl SecretSource for RotatingSecret {
    fn read_secret(&self, _name: &str) -> Result<String, EngineError> {
        Ok(self.0.lock().unwrap().clone())
    }
}

fn engine_with(transport: &RecordingTransport, clock: Box<dyn Clock>) -> Engine {
    Engine::new(Registry::builtin(), Box::new(transport.clone()), clock)
}

fn context(env: &[(&str, &str)], secrets: MemorySecrets) -> ProviderContext {
    ProviderContext::new(Box::new(ProfileEnv::isolated(env.iter().copied())), Box::new(secrets))
}

fn token() -> MemorySecrets {
    MemorySecrets::new().with("token", "t0k")
}

#[tokio::test]
async fn test_openrouter_chat_body() {
    let transport = RecordingTransport::answering(&[json!({"choices": []})]);
    let engine = engine_with(&transport, Box::new(ManualClock::default()));
    let bag = ParameterBag::new().with("q", "hello").with("temperature", "0.5");

    engine
        .invoke("openrouter", "chat", &bag, &context(&[("OPENROUTER_TITLE", "demo")], token()))
        .await
        .unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let request = &sent[0];
    assert_eq!(request.method, reqwest::Method::POST);
    assert_eq!(request.url, "https://openrouter.ai/api/v1/chat/completions");
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("Authorization"), Some("Bearer t0k"));
    assert_eq!(request.header("X-Title"), Some("demo"));
    assert_eq!(request.header("HTTP-Referer"), None);

    let body = request.body.as_ref().unwrap();
    assert_eq!(body["messages"], json!([{"role": "user", "content": "hello"}]));
    assert_eq!(body["temperature"], json!(0.5));
    assert_eq!(body["model"], json!("openai/gpt-4o-mini"));
    assert_eq!(body["stream"], json!(false));
    assert!(body.get("system").is_none());
    assert!(body.get("top_p").is_none());
}

#[tokio::test]
async fn test_alpaca_order_defaults() {
    let transport = RecordingTransport::answering(&[json!({"id": "o1"})]);
    let engine = engine_with(&transport, Box::new(ManualClock::default()));
    let secrets = MemorySecrets::new().with("key", "K").with("secret", "S");
    let bag = ParameterBag::new().with("symbol", "AAPL").with("notional", "100");

    let output = engine
        .invoke("alpaca", "orders.create", &bag, &context(&[], secrets))
        .await
        .unwrap();
    assert_eq!(output.to_json(), json!({"id": "o1"}));

    let request = &transport.sent()[0];
    assert_eq!(request.url, "https://paper-api.alpaca.markets/v2/orders");
    assert_eq!(request.header("APCA-API-KEY-ID"), Some("K"));
    assert_eq!(request.header("APCA-API-SECRET-KEY"), Some("S"));
    let body = request.body.as_ref().unwrap();
    assert_eq!(body["side"], json!("buy"));
    assert_eq!(body["type"], json!("market"));
    assert_eq!(body["time_in_force"], json!("day"));
    assert_eq!(body["notional"], json!("100"));
    assert_eq!(body["extended_hours"], json!(false));
    assert!(body.get("qty").is_none());
    assert!(body.get("take_profit").is_none());
}

#[tokio::test]
async fn test_alpaca_base_url_precedence() {
    let transport = RecordingTransport::default();
    let engine = engine_with(&transport, Box::new(ManualClock::default()));
    let secrets = || MemorySecrets::new().with("key", "K").with("secret", "S");
    let bag = ParameterBag::new();

    let cases: [(&[(&str, &str)], &str); 3] = [
        (
            &[("ALPACA_BASE_URL", "https://primary.test/"), ("ALPACA_ENDPOINT", "https://alias.test")],
            "https://primary.test/v2/clock",
        ),
        (&[("ALPACA_ENDPOINT", "https://alias.test")], "https://alias.test/v2/clock"),
        (&[], "https://paper-api.alpaca.markets/v2/clock"),
    ];
    for (env, expected) in cases {
        engine.invoke("alpaca", "clock", &bag, &context(env, secrets())).await.unwrap();
        assert_eq!(transport.sent().last().unwrap().url, expected);
    }

    engine
        .invoke("alpaca", "data.stocks.quote", &bag.clone().with("symbol", "MSFT"), &context(&[], secrets()))
        .await
        .unwrap();
    assert_eq!(
        transport.sent().last().unwrap().url,
        "https://data.alpaca.markets/v2/stocks/MSFT/quotes/latest"
    );
}

#[tokio::test]
async fn test_replicate_wait_with_real_clock() {
    let transport = RecordingTransport::answering(&[
        json!({"id": "p1", "status": "pending"}),
        json!({"id": "p1", "status": "pending"}),
        json!({"id": "p1", "status": "succeeded", "output": "done"}),
    ]);
    let engine = engine_with(&transport, Box::new(SystemClock::new()));
    let bag = ParameterBag::new().with("id", "p1").with("poll_ms", "10");

    let started = Instant::now();
    let output = engine
        .invoke("replicate", "predictions.wait", &bag, &context(&[], token()))
        .await
        .unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(20), "finished too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(200), "slept more than expected: {:?}", elapsed);

    let CommandOutput::Job(outcome) = output else {
        panic!("expected a job outcome");
    };
    assert_eq!(outcome.state.status, JobStatus::Succeeded);
    assert!(!outcome.timed_out);
    assert_eq!(outcome.state.payload["output"], json!("done"));
    assert_eq!(transport.sent().len(), 3);
}

#[tokio::test]
async fn test_poll_first_terminal_fetch_does_not_sleep() {
    let transport = RecordingTransport::answering(&[json!({"status": "failed", "error": "oom"})]);
    let clock = ManualClock::default();
    let engine = engine_with(&transport, Box::new(clock.clone()));
    let bag = ParameterBag::new().with("id", "p1");

    let output = engine
        .invoke("replicate", "predictions.wait", &bag, &context(&[], token()))
        .await
        .unwrap();
    assert_eq!(output.to_json()["error"], json!("oom"));
    assert!(clock.sleeps.lock().unwrap().is_empty());
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn test_poll_never_terminal_is_bounded() {
    let transport = RecordingTransport::repeating(json!({"status": "processing"}));
    let clock = ManualClock::default();
    let engine = engine_with(&transport, Box::new(clock.clone()));
    let bag = ParameterBag::new()
        .with("id", "p1")
        .with("poll_ms", "1000")
        .with("timeout_s", "3");

    let output = engine
        .invoke("replicate", "predictions.wait", &bag, &context(&[], token()))
        .await
        .unwrap();
    assert!(output.timed_out());
    assert!(transport.sent().len() <= 4);
    assert!(clock
        .sleeps
        .lock()
        .unwrap()
        .iter()
        .all(|d| *d == Duration::from_millis(1000)));
}

#[tokio::test]
async fn test_poll_transport_error_propagates() {
    let transport = RecordingTransport::answering(&[json!({"status": "starting"})]);
    transport.push(Err(EngineError::Transport {
        status: Some(502),
        message: "Bad Gateway".to_string(),
        body: None,
    }));
    let engine = engine_with(&transport, Box::new(ManualClock::default()));

    let err = engine
        .invoke("replicate", "predictions.wait", &ParameterBag::new().with("id", "p1"), &context(&[], token()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert_eq!(transport.sent().len(), 2);
}

/// Clock that rotates the secret every time the poller sleeps.
struct RotatingClock {
    inner: ManualClock,
    secret: RotatingSecret,
}

#[async_trait]
impl Clock for RotatingClock {
    fn now_millis(&self) -> u64 {
        self.inner.now_millis()
    }

    async fn sleep(&self, duration: Duration) {
        *self.secret.0.lock().unwrap() = "rotated".to_string();
        self.inner.sleep(duration).await;
    }
}

#[tokio::test]
async fn test_poll_rereads_rotated_credentials() {
    let transport = RecordingTransport::answering(&[json!({"status": "running"}), json!({"status": "succeeded"})]);
    let secret = RotatingSecret(Arc::new(Mutex::new("original".to_string())));
    let clock = RotatingClock {
        inner: ManualClock::default(),
        secret: secret.clone(),
    };
    let engine = engine_with(&transport, Box::new(clock));
    let ctx = ProviderContext::new(
        Box::new(ProfileEnv::isolated(Vec::<(String, String)>::new())),
        Box::new(secret),
    );

    let bag = ParameterBag::new().with("id", "p1").with("poll_ms", "1");
    engine.invoke("replicate", "predictions.wait", &bag, &ctx).await.unwrap();
    let headers: Vec<String> = transport
        .sent()
        .iter()
        .map(|r| r.header("Authorization").unwrap_or_default().to_string())
        .collect();
    assert_eq!(headers, ["Bearer original", "Bearer rotated"]);
}

#[tokio::test]
async fn test_malformed_json_sends_nothing() {
    let transport = RecordingTransport::default();
    let engine = engine_with(&transport, Box::new(ManualClock::default()));
    let bag = ParameterBag::new().with("version", "v1").with("input", "{bad");

    let err = engine
        .invoke("replicate", "predictions.create", &bag, &context(&[], token()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "input"));
    assert!(err.to_string().contains("malformed JSON"));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_missing_credential_sends_nothing() {
    let transport = RecordingTransport::default();
    let engine = engine_with(&transport, Box::new(ManualClock::default()));

    let err = engine
        .invoke("perplexity", "ask", &ParameterBag::new().with("q", "hi"), &context(&[], MemorySecrets::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingCredential { ref name } if name == "token"));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_replicate_create_headers() {
    let transport = RecordingTransport::answering(&[json!({"id": "p1"})]);
    let engine = engine_with(&transport, Box::new(ManualClock::default()));
    let bag = ParameterBag::new()
        .with("version", "v1")
        .with("input", r#"{"prompt":"a cat"}"#)
        .with("wait", "true")
        .with("cancel_after", "5m");

    engine
        .invoke("replicate", "predictions.create", &bag, &context(&[], token()))
        .await
        .unwrap();
    let request = &transport.sent()[0];
    assert_eq!(request.header("prefer"), Some("wait=60"));
    assert_eq!(request.header("Cancel-After"), Some("5m"));
    assert_eq!(request.body.as_ref().unwrap()["input"], json!({"prompt": "a cat"}));
}

#[tokio::test]
async fn test_perplexity_search_query_forms() {
    let transport = RecordingTransport::default();
    let engine = engine_with(&transport, Box::new(ManualClock::default()));

    let text = ParameterBag::new().with("q", "rust async");
    engine.invoke("perplexity", "search", &text, &context(&[], token())).await.unwrap();
    let batch = ParameterBag::new().with("query", r#"["a","b"]"#).with("max_results", "3");
    engine.invoke("perplexity", "search", &batch, &context(&[], token())).await.unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0].body.as_ref().unwrap()["query"], json!("rust async"));
    assert_eq!(sent[1].body.as_ref().unwrap()["query"], json!(["a", "b"]));
    assert_eq!(sent[1].body.as_ref().unwrap()["max_results"], json!(3));
}

#[tokio::test]
async fn test_query_string_encoding() {
    let transport = RecordingTransport::default();
    let engine = engine_with(&transport, Box::new(ManualClock::default()));
    let bag = ParameterBag::new().with("q", "flux & friends").with("limit", "5");

    engine.invoke("replicate", "search", &bag, &context(&[], token())).await.unwrap();
    assert_eq!(
        transport.sent()[0].url,
        "https://api.replicate.com/v1/search?query=flux%20%26%20friends&limit=5"
    );
    assert!(transport.sent()[0].body.is_none());
}

#[tokio::test]
async fn test_perplexity_default_command_matches_ask() {
    let transport = RecordingTransport::default();
    let engine = engine_with(&transport, Box::new(ManualClock::default()));
    let args = vec!["perplexity".to_string(), "q=hi".to_string()];
    let (provider, command, _) = apicall::registry::split_target(&args).unwrap();
    let bag = ParameterBag::new().with("q", "hi");

    engine.invoke(&provider, &command, &bag, &context(&[], token())).await.unwrap();
    engine.invoke("perplexity", "ask", &bag, &context(&[], token())).await.unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0], sent[1]);
    assert_eq!(sent[0].url, "https://api.perplexity.ai/chat/completions");
    assert_eq!(sent[0].body.as_ref().unwrap()["model"], json!("sonar-pro"));
}
