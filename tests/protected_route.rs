//! Router-level tests for the API key gate.
//!
//! The key authority is replaced by a stub that returns a fixed verdict and
//! records every call, so each test can assert both the HTTP outcome and how
//! many times (and with what) the authority was consulted.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::{Body, to_bytes},
    http::{HeaderValue, Request, StatusCode, header},
    response::Response,
    routing::get,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use unkey_gate::{
    app::build_router,
    middleware::auth::{AuthGate, RejectReason, gate},
    services::auth::{KeyVerifier, Verdict, VerificationRequest, VerifyError},
    state::AppState,
};

#[derive(Clone, Copy)]
enum Answer {
    Valid,
    Invalid,
    Fault,
}

struct StubVerifier {
    answer: Answer,
    calls: Mutex<Vec<VerificationRequest>>,
}

impl StubVerifier {
    fn new(answer: Answer) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<VerificationRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyVerifier for StubVerifier {
    fn backend_name(&self) -> &'static str {
        "stub"
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<Verdict, VerifyError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.answer {
            Answer::Valid => Ok(Verdict::Valid),
            Answer::Invalid => Ok(Verdict::Invalid {
                code: Some("NOT_FOUND".into()),
            }),
            Answer::Fault => Err(VerifyError::Timeout),
        }
    }
}

fn app_with(verifier: Arc<StubVerifier>) -> Router {
    let gate = AuthGate::new(verifier, "api_test");
    build_router(AppState::new(gate))
}

fn get_request(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn json_body(res: Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_header_is_401_and_authority_is_not_called() {
    let verifier = StubVerifier::new(Answer::Valid);
    let app = app_with(verifier.clone());

    let res = send(&app, get_request("/protected", None)).await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(res).await, json!({ "error": "API key missing" }));
    assert!(verifier.calls().is_empty());
}

#[tokio::test]
async fn valid_key_reaches_the_protected_handler() {
    let verifier = StubVerifier::new(Answer::Valid);
    let app = app_with(verifier.clone());

    let res = send(&app, get_request("/protected", Some("Bearer good-token"))).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        json_body(res).await,
        json!({ "message": "This is a protected route" })
    );

    let calls = verifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].credential.as_str(), "good-token");
    assert_eq!(&*calls[0].authority_scope, "api_test");
}

#[tokio::test]
async fn invalid_key_is_403() {
    let verifier = StubVerifier::new(Answer::Invalid);
    let app = app_with(verifier.clone());

    let res = send(&app, get_request("/protected", Some("Bearer bad-token"))).await;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(res).await, json!({ "error": "Invalid API key" }));
    assert_eq!(verifier.calls().len(), 1);
}

#[tokio::test]
async fn non_ascii_key_is_judged_by_the_authority() {
    let verifier = StubVerifier::new(Answer::Invalid);
    let app = app_with(verifier.clone());
    let value = HeaderValue::from_bytes(b"Bearer caf\xe9").unwrap();
    let req = Request::builder()
        .uri("/protected")
        .header(header::AUTHORIZATION, value)
        .body(Body::empty())
        .unwrap();

    let res = send(&app, req).await;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(res).await, json!({ "error": "Invalid API key" }));
    let calls = verifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].credential.as_str(), "caf\u{e9}");
}

#[tokio::test]
async fn authority_fault_looks_like_a_rejection_to_the_caller() {
    let app = app_with(StubVerifier::new(Answer::Fault));

    let res = send(&app, get_request("/protected", Some("Bearer any-token"))).await;

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(res).await, json!({ "error": "Invalid API key" }));
}

#[tokio::test]
async fn fault_and_rejection_are_distinguishable_for_operators() {
    let rejected = send(
        &app_with(StubVerifier::new(Answer::Invalid)),
        get_request("/protected", Some("Bearer bad-token")),
    )
    .await;
    let faulted = send(
        &app_with(StubVerifier::new(Answer::Fault)),
        get_request("/protected", Some("Bearer bad-token")),
    )
    .await;

    assert_eq!(rejected.status(), faulted.status());
    assert_eq!(
        rejected.extensions().get::<RejectReason>(),
        Some(&RejectReason::RejectedCredential)
    );
    assert_eq!(
        faulted.extensions().get::<RejectReason>(),
        Some(&RejectReason::AuthorityFault)
    );
}

#[tokio::test]
async fn public_root_bypasses_the_gate() {
    let verifier = StubVerifier::new(Answer::Invalid);
    let app = app_with(verifier.clone());

    for auth in [None, Some("Bearer bad-token"), Some("garbage")] {
        let res = send(&app, get_request("/", auth)).await;
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Hello Hono!");
    }

    let res = send(&app, get_request("/health", None)).await;
    assert_eq!(res.status(), StatusCode::OK);

    assert!(verifier.calls().is_empty());
}

#[tokio::test]
async fn unknown_path_is_404_not_401() {
    let verifier = StubVerifier::new(Answer::Valid);
    let app = app_with(verifier.clone());

    let res = send(&app, get_request("/nope", None)).await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(verifier.calls().is_empty());
}

#[tokio::test]
async fn repeated_requests_get_the_same_answer() {
    let rejecting = app_with(StubVerifier::new(Answer::Invalid));
    for _ in 0..2 {
        let res = send(&rejecting, get_request("/protected", Some("Bearer bad-token"))).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    let verifier = StubVerifier::new(Answer::Valid);
    let accepting = app_with(verifier.clone());
    for _ in 0..2 {
        let res = send(&accepting, get_request("/protected", Some("Bearer good-token"))).await;
        assert_eq!(res.status(), StatusCode::OK);
    }
    // Nothing is cached: every request asks the authority.
    assert_eq!(verifier.calls().len(), 2);
}

#[tokio::test]
async fn response_carries_a_request_id() {
    let app = app_with(StubVerifier::new(Answer::Valid));

    let res = send(&app, get_request("/protected", None)).await;

    assert!(res.headers().contains_key("x-request-id"));
}

// Gate applied to a handler that counts invocations and returns a
// distinctive response, to check "exactly once" and "unmodified".
fn counting_app(verifier: Arc<StubVerifier>, hits: Arc<AtomicUsize>) -> Router {
    let handler = move || {
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            (
                StatusCode::ACCEPTED,
                [("x-handler", "yes")],
                Json(json!({ "handled": true })),
            )
        }
    };

    let state = AppState::new(AuthGate::new(verifier, "api_test"));
    let router = Router::new().route("/guarded", get(handler));
    gate::apply(router, state.clone()).with_state(state)
}

#[tokio::test]
async fn handler_runs_exactly_once_and_its_response_is_untouched() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = counting_app(StubVerifier::new(Answer::Valid), hits.clone());

    let res = send(&app, get_request("/guarded", Some("Bearer good-token"))).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(res.headers()["x-handler"], "yes");
    assert!(res.extensions().get::<RejectReason>().is_none());
    assert_eq!(json_body(res).await, json!({ "handled": true }));
}

#[tokio::test]
async fn handler_never_runs_without_a_valid_verdict() {
    for (answer, auth) in [
        (Answer::Valid, None),
        (Answer::Invalid, Some("Bearer bad-token")),
        (Answer::Fault, Some("Bearer bad-token")),
    ] {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = counting_app(StubVerifier::new(answer), hits.clone());

        let res = send(&app, get_request("/guarded", auth)).await;

        assert!(res.status().is_client_error());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}

// Verification that never completes; flags when its future is dropped.
struct HangingVerifier {
    dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyVerifier for HangingVerifier {
    fn backend_name(&self) -> &'static str {
        "hanging"
    }

    async fn verify(&self, _request: &VerificationRequest) -> Result<Verdict, VerifyError> {
        let _flag = DropFlag(self.dropped.clone());
        std::future::pending::<()>().await;
        Ok(Verdict::Valid)
    }
}

#[tokio::test]
async fn abandoned_request_cancels_verification_without_proceeding() {
    let dropped = Arc::new(AtomicBool::new(false));
    let hits = Arc::new(AtomicUsize::new(0));

    let handler = {
        let hits = hits.clone();
        move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "handled"
            }
        }
    };
    let verifier = Arc::new(HangingVerifier {
        dropped: dropped.clone(),
    });
    let state = AppState::new(AuthGate::new(verifier, "api_test"));
    let app = gate::apply(Router::new().route("/guarded", get(handler)), state.clone())
        .with_state(state);

    // The caller gives up while the gate is waiting on the authority.
    let in_flight = app.oneshot(get_request("/guarded", Some("Bearer good-token")));
    let outcome = tokio::time::timeout(Duration::from_millis(50), in_flight).await;

    assert!(outcome.is_err());
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
