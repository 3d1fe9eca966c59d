//! Router selection, circuit behavior, filtering, and persistence,
//! exercised through the public API with a scripted backend.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use gateway::{
    AlwaysFailingBackend, BackendFailure, CircuitSnapshot, CircuitState, ContentFilter,
    FilterVerdict, GatewayConfig, GatewayError, HangingBackend, InMemoryStore, JsonFileStore,
    Message, MockBackend, ModelId, Provider, Router, StateStore, summarize_decisions,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn conversation() -> Vec<Message> {
    vec![Message::user("hello there")]
}

#[tokio::test]
async fn economy_intent_routes_to_cheapest() {
    init_tracing();
    let backend = Arc::new(MockBackend::new().with_content("hi"));
    let router = Router::new(
        GatewayConfig::default(),
        backend.clone(),
        Arc::new(InMemoryStore::new()),
    );

    let outcome = router.route("what time is it", &conversation()).await.unwrap();

    // Flash is the cheapest model in the catalog.
    assert_eq!(outcome.decision.model_selected, ModelId::Flash);
    assert_eq!(outcome.decision.model_used, ModelId::Flash);
    assert!(!outcome.decision.overridden);
}

#[tokio::test]
async fn premium_intent_skips_cheap_models() {
    init_tracing();
    let backend = Arc::new(MockBackend::new().with_content("plan"));
    let router = Router::new(
        GatewayConfig::default(),
        backend.clone(),
        Arc::new(InMemoryStore::new()),
    );

    let outcome = router
        .route("design a distributed migration plan", &conversation())
        .await
        .unwrap();

    // Cheapest premium-tier model is Grok3 at 5.00.
    assert_eq!(outcome.decision.model_selected, ModelId::Grok3);
}

#[tokio::test]
async fn disabled_provider_excluded() {
    init_tracing();
    let config = GatewayConfig {
        available_providers: vec![Provider::Anthropic, Provider::Google],
        ..Default::default()
    };
    let backend = Arc::new(MockBackend::new().with_content("plan"));
    let router = Router::new(config, backend.clone(), Arc::new(InMemoryStore::new()));

    let outcome = router
        .route("audit this security design", &conversation())
        .await
        .unwrap();

    // With xAI disabled the cheapest premium model is Opus.
    assert_eq!(outcome.decision.model_selected, ModelId::Opus);
}

#[tokio::test]
async fn no_eligible_model_makes_no_calls() {
    init_tracing();
    // Google-only catalog has no premium-tier model.
    let config = GatewayConfig {
        available_providers: vec![Provider::Google],
        fallback_model: ModelId::GeminiPro,
        ..Default::default()
    };
    let backend = Arc::new(MockBackend::new());
    let router = Router::new(config, backend.clone(), Arc::new(InMemoryStore::new()));

    let err = router
        .route("architect a distributed system", &conversation())
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::NoEligibleModel { .. }));
    assert_eq!(backend.call_count(), 0);
    // Nothing is charged to any circuit either.
    for model in ModelId::all().iter().copied() {
        assert_eq!(router.breaker().failure_count(model), 0);
    }
}

#[tokio::test]
async fn repeated_failures_trip_circuit_and_divert() {
    init_tracing();
    let backend = Arc::new(AlwaysFailingBackend::new(BackendFailure::with_status(
        "overloaded",
        503,
    )));
    let router = Router::new(
        GatewayConfig::default(),
        backend,
        Arc::new(InMemoryStore::new()),
    );

    for _ in 0..3 {
        let err = router.route("quick question", &conversation()).await.unwrap_err();
        assert!(matches!(err, GatewayError::TransientBackend { model, .. } if model == ModelId::Flash));
    }
    assert_eq!(router.breaker().state(ModelId::Flash), CircuitState::Open);

    // The next request diverts to the next-cheapest eligible model.
    let err = router.route("quick question", &conversation()).await.unwrap_err();
    assert!(matches!(err, GatewayError::TransientBackend { model, .. } if model == ModelId::Haiku));
}

#[tokio::test]
async fn blocked_content_short_circuits() {
    init_tracing();
    struct BlockEverything;
    impl ContentFilter for BlockEverything {
        fn check(&self, _intent: &str, _conversation: &[Message]) -> FilterVerdict {
            FilterVerdict::blocked(2)
        }
    }

    let backend = Arc::new(MockBackend::new());
    let store = Arc::new(InMemoryStore::new());
    let router = Router::new(GatewayConfig::default(), backend.clone(), store.clone())
        .with_filter(Box::new(BlockEverything));

    let err = router.route("anything", &conversation()).await.unwrap_err();

    assert!(matches!(err, GatewayError::BlockedContent { categories: 2 }));
    assert_eq!(backend.call_count(), 0);
    assert!(store.recent_decisions(10).unwrap().is_empty());
}

#[tokio::test]
async fn decisions_recorded_on_success_only() {
    init_tracing();
    let backend = Arc::new(
        MockBackend::new()
            .with_content("first")
            .with_failure(BackendFailure::with_status("overloaded", 503))
            .with_content("third"),
    );
    let store = Arc::new(InMemoryStore::new());
    let router = Router::new(GatewayConfig::default(), backend, store.clone());

    router.route("hello", &conversation()).await.unwrap();
    router.route("hello", &conversation()).await.unwrap_err();
    router.route("hello", &conversation()).await.unwrap();

    let decisions = store.recent_decisions(10).unwrap();
    assert_eq!(decisions.len(), 2);

    let summary = summarize_decisions(&decisions);
    assert_eq!(summary.total_requests, 2);
    assert_eq!(summary.overrides, 0);
    assert_eq!(summary.requests_by_model[&ModelId::Flash], 2);
}

#[tokio::test]
async fn circuit_state_survives_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let backend = Arc::new(AlwaysFailingBackend::new(BackendFailure::with_status(
            "overloaded",
            503,
        )));
        let store = Arc::new(JsonFileStore::open(&path).unwrap());
        let router = Router::new(GatewayConfig::default(), backend, store);
        for _ in 0..3 {
            let _ = router.route("quick question", &conversation()).await;
        }
        assert_eq!(router.breaker().state(ModelId::Flash), CircuitState::Open);
    }

    // A fresh router over the same store starts with the circuit open and
    // routes around the tripped model.
    let backend = Arc::new(MockBackend::new().with_content("ok"));
    let store = Arc::new(JsonFileStore::open(&path).unwrap());
    let router = Router::new(GatewayConfig::default(), backend, store);

    assert_eq!(router.breaker().state(ModelId::Flash), CircuitState::Open);
    let outcome = router.route("quick question", &conversation()).await.unwrap();
    assert_eq!(outcome.decision.model_selected, ModelId::Haiku);
}

#[tokio::test]
async fn hydrated_open_circuit_respected() {
    init_tracing();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let store = Arc::new(InMemoryStore::new());
    store
        .put_circuit(
            ModelId::Flash,
            CircuitSnapshot {
                state: CircuitState::Open,
                failure_count: 3,
                opened_at_secs: Some(now),
            },
        )
        .unwrap();

    let backend = Arc::new(MockBackend::new().with_content("ok"));
    let router = Router::new(GatewayConfig::default(), backend, store);

    let outcome = router.route("quick question", &conversation()).await.unwrap();
    assert_eq!(outcome.decision.model_selected, ModelId::Haiku);
}

#[tokio::test]
async fn success_persists_circuit_snapshot() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let backend = Arc::new(MockBackend::new().with_content("ok"));
    let router = Router::new(GatewayConfig::default(), backend, store.clone());

    router.route("quick question", &conversation()).await.unwrap();

    let snapshot = store.get_circuit(ModelId::Flash).unwrap().unwrap();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn timed_out_call_charged_to_circuit() {
    init_tracing();
    let config = GatewayConfig {
        call_timeout_secs: 1,
        ..Default::default()
    };
    let store = Arc::new(InMemoryStore::new());
    let router = Router::new(config, Arc::new(HangingBackend), store.clone());

    let err = router.route("quick question", &conversation()).await.unwrap_err();

    match err {
        GatewayError::TransientBackend { model, failure } => {
            assert_eq!(model, ModelId::Flash);
            assert!(failure.timed_out);
        }
        other => panic!("expected transient error, got {other}"),
    }
    // The abandoned call counts against the model and the persisted
    // snapshot reflects it.
    assert_eq!(router.breaker().failure_count(ModelId::Flash), 1);
    let snapshot = store.get_circuit(ModelId::Flash).unwrap().unwrap();
    assert_eq!(snapshot.failure_count, 1);
}

#[tokio::test]
async fn half_open_probe_success_restores_model() {
    init_tracing();
    // Zero cooldown so the tripped circuit is immediately probeable.
    let config = GatewayConfig {
        failure_threshold: 1,
        cooldown_secs: 0,
        ..Default::default()
    };
    let store = Arc::new(InMemoryStore::new());
    let backend = Arc::new(
        MockBackend::new()
            .with_failure(BackendFailure::with_status("overloaded", 503))
            .with_content("back again"),
    );
    let router = Router::new(config, backend.clone(), store);

    router.route("quick question", &conversation()).await.unwrap_err();
    // Cooldown already elapsed; the next request is the probe.
    let outcome = router.route("quick question", &conversation()).await.unwrap();

    assert_eq!(outcome.decision.model_used, ModelId::Flash);
    assert_eq!(router.breaker().state(ModelId::Flash), CircuitState::Closed);
}
