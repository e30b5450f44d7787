//! Tests for scopebus-llm: request types, QueryClient single-flight and failure
//! recovery, FireTrigger, and the Ollama provider against a mock server

use scopebus_llm::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Test backends
// ---------------------------------------------------------------------------

/// Answers with `reply` once released.
struct GatedBackend {
    reply: String,
    release: Arc<Notify>,
    calls: AtomicUsize,
}

impl GatedBackend {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            release: Arc::new(Notify::new()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl QueryBackend for GatedBackend {
    fn name(&self) -> &str { "gated" }
    fn model(&self) -> &str { "test-model" }

    async fn query(&self, request: QueryRequest) -> QueryResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(format!("{}: {}", self.reply, request.prompt))
    }
}

struct FailingBackend;

#[async_trait::async_trait]
impl QueryBackend for FailingBackend {
    fn name(&self) -> &str { "failing" }
    fn model(&self) -> &str { "test-model" }

    async fn query(&self, _request: QueryRequest) -> QueryResult<String> {
        Err(QueryError::RequestFailed { status: 503, body: "unavailable".into() })
    }
}

struct PanickingBackend;

#[async_trait::async_trait]
impl QueryBackend for PanickingBackend {
    fn name(&self) -> &str { "panicking" }
    fn model(&self) -> &str { "test-model" }

    async fn query(&self, _request: QueryRequest) -> QueryResult<String> {
        panic!("backend exploded");
    }
}

struct EchoBackend;

#[async_trait::async_trait]
impl QueryBackend for EchoBackend {
    fn name(&self) -> &str { "echo" }
    fn model(&self) -> &str { "test-model" }

    async fn query(&self, request: QueryRequest) -> QueryResult<String> {
        Ok(request.prompt)
    }
}

fn wait_idle(client: &QueryClient) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while client.is_pending() {
        assert!(Instant::now() < deadline, "query never completed");
        std::thread::sleep(Duration::from_millis(5));
    }
}

// ===========================================================================
// QueryRequest / GenerateRequest
// ===========================================================================

#[test]
fn query_request_empty_system_is_none() {
    let req = QueryRequest::new("hi").with_system("");
    assert!(req.system.is_none());
    let req = QueryRequest::new("hi").with_system("be brief");
    assert_eq!(req.system.as_deref(), Some("be brief"));
}

#[test]
fn generate_request_omits_empty_fields() {
    let body = GenerateRequest::from_query("llama3.2:3b", QueryRequest::new("a dreamy landscape"));
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["model"], "llama3.2:3b");
    assert_eq!(json["prompt"], "a dreamy landscape");
    assert_eq!(json["stream"], false);
    assert!(json.get("system").is_none());
    assert!(json.get("images").is_none());
}

#[test]
fn generate_request_carries_images() {
    let req = QueryRequest::new("describe").with_image("AAAA");
    let json = serde_json::to_value(GenerateRequest::from_query("llava:7b", req)).unwrap();
    assert_eq!(json["images"], serde_json::json!(["AAAA"]));
}

// ===========================================================================
// QueryClient
// ===========================================================================

#[test]
fn client_last_response_empty_before_first_completion() {
    let client = QueryClient::new(Arc::new(EchoBackend)).unwrap();
    assert_eq!(client.last_response(), "");
    assert!(!client.is_pending());
    assert!(client.should_send(Duration::from_secs(3), Instant::now()));
}

#[test]
fn client_single_flight() {
    let backend = GatedBackend::new("caption");
    let client = QueryClient::new(backend.clone()).unwrap();

    assert!(client.fire_async(QueryRequest::new("one"), None));
    assert!(client.is_pending());
    assert!(!client.fire_async(QueryRequest::new("two"), None));
    let far_future = Instant::now() + Duration::from_secs(3600);
    assert!(!client.should_send(Duration::ZERO, far_future));
    assert_eq!(client.last_response(), "");

    backend.release.notify_one();
    wait_idle(&client);

    assert_eq!(client.last_response(), "caption: one");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.stats(), QueryStats { fired: 1, completed: 1, failed: 0 });
}

#[test]
fn client_interval_gates_next_fire() {
    let client = QueryClient::new(Arc::new(EchoBackend)).unwrap();
    let interval = Duration::from_secs(3);
    assert!(client.fire_async(QueryRequest::new("a"), None));
    wait_idle(&client);

    let fired = client.last_fire().unwrap();
    assert!(!client.should_send(interval, fired + Duration::from_millis(2999)));
    assert!(client.should_send(interval, fired + interval));
}

#[test]
fn client_failure_keeps_last_response_and_reopens_window() {
    let client = QueryClient::new(Arc::new(FailingBackend)).unwrap();
    let interval = Duration::from_secs(5);
    let before = client.last_response();

    assert!(client.fire_async(QueryRequest::new("x"), None));
    wait_idle(&client);

    assert_eq!(client.last_response(), before);
    let fired = client.last_fire().unwrap();
    assert!(!client.should_send(interval, fired));
    assert!(client.should_send(interval, fired + interval));
    assert_eq!(client.stats().failed, 1);
}

#[test]
fn client_failure_after_success_keeps_previous_text() {
    let echo = QueryClient::new(Arc::new(EchoBackend)).unwrap();
    echo.fire_async(QueryRequest::new("kept"), None);
    wait_idle(&echo);
    assert_eq!(echo.last_response(), "kept");

    let failing = QueryClient::new(Arc::new(FailingBackend)).unwrap();
    failing.fire_async(QueryRequest::new("lost"), None);
    wait_idle(&failing);
    assert_eq!(failing.last_response(), "");
}

#[test]
fn client_callback_receives_response() {
    let client = QueryClient::new(Arc::new(EchoBackend)).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client.fire_async(
        QueryRequest::new("hello"),
        Some(Box::new(move |text: &str| sink.lock().unwrap().push(text.to_string()))),
    );
    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "callback never ran");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
}

#[test]
fn client_callback_skipped_on_failure() {
    let client = QueryClient::new(Arc::new(FailingBackend)).unwrap();
    let called = Arc::new(AtomicUsize::new(0));
    let counter = called.clone();
    client.fire_async(
        QueryRequest::new("x"),
        Some(Box::new(move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
    );
    wait_idle(&client);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(called.load(Ordering::SeqCst), 0);
}

#[test]
fn client_panicking_backend_returns_to_idle() {
    let client = QueryClient::new(Arc::new(PanickingBackend)).unwrap();
    assert!(client.fire_async(QueryRequest::new("boom"), None));
    wait_idle(&client);
    assert_eq!(client.last_response(), "");
    assert!(client.fire_async(QueryRequest::new("again"), None));
}

#[tokio::test]
async fn client_runs_queries_under_current_thread_runtime() {
    // the frame loop blocks its own thread, so the query must run elsewhere
    let client = QueryClient::new(Arc::new(EchoBackend)).unwrap();
    assert!(client.fire_async(QueryRequest::new("hello"), None));

    let deadline = Instant::now() + Duration::from_secs(2);
    while client.is_pending() {
        assert!(Instant::now() < deadline, "query stuck in flight");
        std::thread::sleep(Duration::from_millis(33));
    }
    assert_eq!(client.last_response(), "hello");
    assert!(client.should_send(Duration::ZERO, Instant::now()));
}

#[test]
fn client_drop_does_not_wait_for_in_flight_query() {
    let backend = GatedBackend::new("never");
    let client = QueryClient::new(backend).unwrap();
    client.fire_async(QueryRequest::new("stuck"), None);
    let started = Instant::now();
    drop(client);
    assert!(started.elapsed() < Duration::from_secs(1));
}

// ===========================================================================
// FireTrigger
// ===========================================================================

#[test]
fn trigger_fires_first_text_immediately() {
    let client = QueryClient::new(Arc::new(EchoBackend)).unwrap();
    let mut trigger = FireTrigger::new(Duration::from_secs(1));
    let now = Instant::now();
    assert_eq!(
        trigger.poll(&client, "a dreamy landscape", Duration::from_secs(5), now),
        Some("a dreamy landscape".to_string())
    );
    assert_eq!(trigger.last_fired(), Some("a dreamy landscape"));
}

#[test]
fn trigger_waits_for_settle_then_fires_on_change() {
    let client = QueryClient::new(Arc::new(EchoBackend)).unwrap();
    let interval = Duration::from_secs(60);
    let mut trigger = FireTrigger::new(Duration::from_secs(1));
    let t0 = Instant::now();

    let text = trigger.poll(&client, "a cat", interval, t0).unwrap();
    client.fire_async(QueryRequest::new(text), None);
    wait_idle(&client);

    // unchanged text inside the interval
    assert_eq!(trigger.poll(&client, "a cat", interval, t0 + Duration::from_millis(100)), None);
    // edit in progress
    assert_eq!(trigger.poll(&client, "a dog", interval, t0 + Duration::from_millis(200)), None);
    assert_eq!(trigger.poll(&client, "a dog", interval, t0 + Duration::from_millis(900)), None);
    // settled: fires well before the interval
    assert_eq!(
        trigger.poll(&client, "a dog", interval, t0 + Duration::from_millis(1200)),
        Some("a dog".to_string())
    );
}

#[test]
fn trigger_never_fires_while_in_flight() {
    let backend = GatedBackend::new("r");
    let client = QueryClient::new(backend.clone()).unwrap();
    let mut trigger = FireTrigger::new(Duration::ZERO);
    let t0 = Instant::now();

    let text = trigger.poll(&client, "one", Duration::ZERO, t0).unwrap();
    client.fire_async(QueryRequest::new(text), None);
    assert_eq!(trigger.poll(&client, "two", Duration::ZERO, t0), None);

    backend.release.notify_one();
    wait_idle(&client);
    assert_eq!(trigger.poll(&client, "two", Duration::ZERO, t0), Some("two".to_string()));
}

#[test]
fn trigger_refires_same_text_on_interval() {
    let client = QueryClient::new(Arc::new(EchoBackend)).unwrap();
    let interval = Duration::from_secs(5);
    let mut trigger = FireTrigger::new(Duration::from_secs(1));
    let t0 = Instant::now();

    let text = trigger.poll(&client, "loop", interval, t0).unwrap();
    client.fire_async(QueryRequest::new(text), None);
    wait_idle(&client);
    let fired = client.last_fire().unwrap();

    assert_eq!(trigger.poll(&client, "loop", interval, fired + Duration::from_secs(1)), None);
    assert_eq!(
        trigger.poll(&client, "loop", interval, fired + interval),
        Some("loop".to_string())
    );
}

#[test]
fn trigger_skips_empty_text() {
    let client = QueryClient::new(Arc::new(EchoBackend)).unwrap();
    let mut trigger = FireTrigger::new(Duration::ZERO);
    assert_eq!(trigger.poll(&client, "", Duration::ZERO, Instant::now()), None);
}

// ===========================================================================
// OllamaProvider (mock server)
// ===========================================================================

mod mock {
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    pub type Captured = Arc<Mutex<Option<Value>>>;

    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    pub async fn ok_server(reply: &'static str) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(
                "/api/generate",
                post(
                    move |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                        *captured.lock().unwrap() = Some(body);
                        Json(json!({"model": "llava:7b", "response": reply, "done": true}))
                    },
                ),
            )
            .with_state(captured.clone());
        (serve(router).await, captured)
    }

    pub async fn status_server(status: StatusCode) -> String {
        let router = Router::new().route(
            "/api/generate",
            post(move || async move { (status, "model not found") }),
        );
        serve(router).await
    }

    pub async fn garbage_server() -> String {
        let router = Router::new().route("/api/generate", post(|| async { "not json" }));
        serve(router).await
    }
}

#[tokio::test]
async fn ollama_returns_trimmed_response() {
    let (url, captured) = mock::ok_server("  a cat on a couch \n").await;
    let provider = OllamaProvider::new(url, "llava:7b").unwrap();
    assert_eq!(provider.name(), "ollama");
    assert_eq!(provider.model(), "llava:7b");

    let text = provider
        .query(QueryRequest::new("Describe this image.").with_image("QUJD").with_system("terse"))
        .await
        .unwrap();
    assert_eq!(text, "a cat on a couch");

    let body = captured.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], "llava:7b");
    assert_eq!(body["prompt"], "Describe this image.");
    assert_eq!(body["stream"], false);
    assert_eq!(body["system"], "terse");
    assert_eq!(body["images"][0], "QUJD");
}

#[tokio::test]
async fn ollama_trailing_slash_in_base_url() {
    let (url, _) = mock::ok_server("ok").await;
    let provider = OllamaProvider::new(format!("{}/", url), "m").unwrap();
    assert_eq!(provider.query(QueryRequest::new("x")).await.unwrap(), "ok");
}

#[tokio::test]
async fn ollama_non_success_status_fails() {
    let url = mock::status_server(axum::http::StatusCode::NOT_FOUND).await;
    let provider = OllamaProvider::new(url, "missing").unwrap();
    match provider.query(QueryRequest::new("x")).await {
        Err(QueryError::RequestFailed { status, body }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "model not found");
        }
        other => panic!("Expected RequestFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn ollama_malformed_body_fails() {
    let url = mock::garbage_server().await;
    let provider = OllamaProvider::new(url, "m").unwrap();
    assert!(matches!(
        provider.query(QueryRequest::new("x")).await,
        Err(QueryError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn ollama_connection_refused_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let provider =
        OllamaProvider::with_timeout(format!("http://{}", addr), "m", Duration::from_secs(2)).unwrap();
    assert!(matches!(
        provider.query(QueryRequest::new("x")).await,
        Err(QueryError::NetworkError(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_over_ollama_updates_last_response() {
    let (url, _) = mock::ok_server("a neon city at night").await;
    let provider = OllamaProvider::new(url, "llama3.2:3b").unwrap();
    let client = QueryClient::new(Arc::new(provider)).unwrap();

    assert!(client.fire_async(QueryRequest::new("rewrite"), None));
    let deadline = Instant::now() + Duration::from_secs(5);
    while client.is_pending() {
        assert!(Instant::now() < deadline, "query never completed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.last_response(), "a neon city at night");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_over_failing_ollama_stays_empty() {
    let url = mock::status_server(axum::http::StatusCode::INTERNAL_SERVER_ERROR).await;
    let provider = OllamaProvider::new(url, "m").unwrap();
    let client = QueryClient::new(Arc::new(provider)).unwrap();

    client.fire_async(QueryRequest::new("x"), None);
    let deadline = Instant::now() + Duration::from_secs(5);
    while client.is_pending() {
        assert!(Instant::now() < deadline, "query never completed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.last_response(), "");
    assert_eq!(client.stats().failed, 1);
}
