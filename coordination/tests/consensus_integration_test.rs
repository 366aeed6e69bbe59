//! Quorum voting and race dispatch over scripted instances.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ScriptedProvider;
use polish_coordination::{
    ConsensusEngine, EventBus, EventFilter, Instance, InstanceRouter, PolishEvent, ProviderError,
    RouterConfig, RouterError, SharedProvider,
};

fn router_over(
    providers: &[Arc<ScriptedProvider>],
    bus: Option<Arc<EventBus>>,
) -> Arc<InstanceRouter> {
    let instances = providers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let handle: SharedProvider = p.clone();
            Instance::new(format!("voter-{}", i + 1), "voter", "scripted", handle)
        })
        .collect();
    InstanceRouter::new(instances, RouterConfig::new(1, Duration::ZERO), bus, "vote").shared()
}

fn fixed(name: &str, reply: &str) -> Arc<ScriptedProvider> {
    let reply = reply.to_string();
    ScriptedProvider::new(name, move |_| Ok(reply.clone()))
}

#[tokio::test]
async fn test_quorum_majority_wins() {
    let voters = [
        fixed("a", "Добро јутро"),
        fixed("b", "Јутро"),
        fixed("c", "Добро јутро"),
    ];
    let bus = EventBus::new().shared();
    let mut consensus_events =
        bus.subscribe_filtered(EventFilter::new().types(vec!["consensus_reached"]));
    let engine = ConsensusEngine::new(router_over(&voters, Some(bus.clone())), Some(bus), "vote");

    let outcome = engine
        .translate_with_consensus("Good morning", "greeting", 3)
        .await
        .unwrap();

    assert_eq!(outcome.text, "Добро јутро");
    assert_eq!(outcome.agreement, 2);
    assert_eq!(outcome.consulted, 3);
    assert!(!outcome.fell_back);
    assert!(voters.iter().all(|v| v.calls() == 1));

    let event = consensus_events.recv().await.unwrap();
    assert!(matches!(event, PolishEvent::ConsensusReached { agreement: 2, .. }));
}

#[tokio::test]
async fn test_quorum_capped_at_instance_count() {
    let voters = [fixed("a", "x"), fixed("b", "x")];
    let engine = ConsensusEngine::new(router_over(&voters, None), None, "vote");

    let outcome = engine.translate_with_consensus("t", "", 5).await.unwrap();
    assert_eq!(outcome.consulted, 2);
    assert_eq!(outcome.agreement, 2);
}

#[tokio::test]
async fn test_quorum_uses_first_k_instances() {
    let voters = [fixed("a", "x"), fixed("b", "y"), fixed("c", "z")];
    let engine = ConsensusEngine::new(router_over(&voters, None), None, "vote");

    let outcome = engine.translate_with_consensus("t", "", 2).await.unwrap();
    assert_eq!(outcome.consulted, 2);
    assert_eq!(outcome.agreement, 1);
    assert_eq!(voters[2].calls(), 0);
}

#[tokio::test]
async fn test_quorum_falls_back_to_race() {
    // The only vote fails, so the race path answers.
    let flaky = {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        ScriptedProvider::new("flaky", move |_| {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(ProviderError::Timeout(Duration::from_secs(30)))
            } else {
                Ok("late answer".to_string())
            }
        })
    };
    let engine = ConsensusEngine::new(router_over(&[flaky.clone()], None), None, "vote");

    let outcome = engine.translate_with_consensus("t", "", 2).await.unwrap();
    assert!(outcome.fell_back);
    assert_eq!(outcome.text, "late answer");
    assert_eq!(flaky.calls(), 2);
}

#[tokio::test]
async fn test_zero_agreement_uses_race() {
    let voters = [fixed("a", "only")];
    let engine = ConsensusEngine::new(router_over(&voters, None), None, "vote");

    let outcome = engine.translate_with_consensus("t", "", 0).await.unwrap();
    assert!(outcome.fell_back);
    assert_eq!(outcome.text, "only");
}

#[tokio::test]
async fn test_race_exhaustion_wraps_last_error() {
    let voters = [
        ScriptedProvider::failing("a", ProviderError::Auth("bad key".into())),
        ScriptedProvider::failing("b", ProviderError::Request("502".into())),
    ];
    let engine = ConsensusEngine::new(router_over(&voters, None), None, "vote");

    let err = engine.translate_with_retry("t", "").await.unwrap_err();
    match err {
        RouterError::Exhausted { instances, last, .. } => {
            assert_eq!(instances, 2);
            assert!(last.is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
}
