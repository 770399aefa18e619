//! End-to-end consensus flow across agents connected by the loopback feed
//!
//! The requesting agent broadcasts CONSENSUS_REQUIRED; panel agents receive
//! it through their own buses, acknowledge, and vote; the requester observes
//! the finalized outcome through the durable store.

use std::sync::Arc;
use std::time::Duration;

use conclave::config::{BusConfig, ConsensusConfig};
use conclave::consensus::{
    ConsensusManager, ConsensusOptions, ConsensusStatus, ConsensusType, ConsensusWait,
    SharedConsensusManager, VOTE_APPROVE, VOTE_REJECT,
};
use conclave::events::{BusRegistry, EventKind, EventPayload, FnHandler, SharedAgentEventBus};
use conclave::feed::LoopbackFeed;
use conclave::store::{DurableStore, EventQuery, MemoryDurableStore};

struct Fixture {
    registry: Arc<BusRegistry>,
    store: Arc<MemoryDurableStore>,
    requester: SharedAgentEventBus,
    consensus: SharedConsensusManager,
}

async fn wire(consensus_config: ConsensusConfig) -> Fixture {
    let store = MemoryDurableStore::new().shared();
    let feed = LoopbackFeed::new().shared();
    let bus_config = BusConfig::default()
        .with_persist_retry_delay(Duration::from_millis(1))
        .with_consensus_poll_interval(Duration::from_millis(5));
    let registry = BusRegistry::new(store.clone(), bus_config)
        .with_feed(feed)
        .shared();

    let requester = registry.register_agent("VALIDATION").await;
    let consensus =
        ConsensusManager::new(store.clone(), requester.clone(), consensus_config).shared();
    requester.attach_consensus(consensus.clone()).await;

    Fixture {
        registry,
        store,
        requester,
        consensus,
    }
}

/// Subscribe an agent that votes whenever a consensus broadcast reaches it
async fn voting_agent(fixture: &Fixture, agent: &'static str, vote: &'static str) {
    let bus = fixture.registry.register_agent(agent).await;
    let manager = fixture.consensus.clone();
    bus.subscribe(
        EventKind::ConsensusRequired,
        FnHandler::arc(move |event| {
            let manager = manager.clone();
            async move {
                if let EventPayload::ConsensusBroadcast { request_id, .. } = &event.payload {
                    manager
                        .cast_vote(request_id, agent, vote, Some("integration vote".to_string()))
                        .await?;
                }
                Ok(())
            }
        }),
        Default::default(),
    )
    .await;
}

#[tokio::test]
async fn consensus_reached_across_feed() {
    let fixture = wire(ConsensusConfig::default()).await;

    voting_agent(&fixture, "LEAD", VOTE_APPROVE).await;
    voting_agent(&fixture, "PLAN", VOTE_APPROVE).await;
    voting_agent(&fixture, "SECURITY", VOTE_REJECT).await;

    let wait = fixture
        .requester
        .request_consensus(
            ConsensusOptions::new(
                "Proceed with implementation?",
                vec!["LEAD".into(), "PLAN".into(), "SECURITY".into()],
                ConsensusType::SimpleMajority,
            )
            .with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    match wait {
        ConsensusWait::Resolved {
            reached,
            votes,
            status,
        } => {
            assert!(reached);
            assert_eq!(status, ConsensusStatus::Approved);
            assert!(votes.len() >= 2);
            assert!(votes.values().all(|v| v.reason.is_some()));
        }
        ConsensusWait::TimedOut => panic!("consensus should have resolved"),
    }

    fixture.registry.shutdown().await;
}

#[tokio::test]
async fn broadcast_is_acknowledged_on_receipt() {
    let fixture = wire(ConsensusConfig::default()).await;

    // Panel members that never vote still acknowledge the broadcast
    fixture.registry.register_agent("LEAD").await;
    fixture.registry.register_agent("PLAN").await;

    let requester = fixture.requester.clone();
    tokio::spawn(async move {
        let _ = requester
            .request_consensus(
                ConsensusOptions::new(
                    "Anyone listening?",
                    vec!["LEAD".into(), "PLAN".into()],
                    ConsensusType::SimpleMajority,
                )
                .with_timeout(Duration::from_millis(200)),
            )
            .await;
    });

    // Give the feed intake tasks time to deliver and acknowledge
    tokio::time::sleep(Duration::from_millis(100)).await;

    let broadcasts = fixture
        .store
        .query_events(&EventQuery::default().kind(EventKind::ConsensusRequired))
        .await
        .unwrap();
    assert_eq!(broadcasts.len(), 1);
    assert!(broadcasts[0].requires_ack);

    let acks = fixture.store.acknowledgments(&broadcasts[0].id).await;
    assert_eq!(acks, vec!["LEAD", "PLAN"]);

    fixture.registry.shutdown().await;
}

#[tokio::test]
async fn silent_panel_times_out_to_rejection() {
    let fixture = wire(ConsensusConfig::default()).await;

    // Registered but voteless panel
    fixture.registry.register_agent("LEAD").await;
    fixture.registry.register_agent("PLAN").await;

    let wait = fixture
        .requester
        .request_consensus(
            ConsensusOptions::new(
                "Anyone there?",
                vec!["LEAD".into(), "PLAN".into()],
                ConsensusType::SimpleMajority,
            )
            .with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap();

    // The dead-man timer finalized with no votes: resolved, not reached
    match wait {
        ConsensusWait::Resolved {
            reached, status, ..
        } => {
            assert!(!reached);
            assert_eq!(status, ConsensusStatus::Rejected);
        }
        ConsensusWait::TimedOut => panic!("timer should have finalized the request"),
    }

    fixture.registry.shutdown().await;
}

#[tokio::test]
async fn security_veto_under_weighted_voting() {
    let fixture = wire(ConsensusConfig::default()).await;

    // SECURITY carries weight 2.0; its rejection balances two approvals
    voting_agent(&fixture, "LEAD", VOTE_APPROVE).await;
    voting_agent(&fixture, "PLAN", VOTE_APPROVE).await;
    voting_agent(&fixture, "SECURITY", VOTE_REJECT).await;

    let wait = fixture
        .requester
        .request_consensus(
            ConsensusOptions::new(
                "Ship without the security fixes?",
                vec!["LEAD".into(), "PLAN".into(), "SECURITY".into()],
                ConsensusType::Weighted,
            )
            // Full participation required so the early approvals cannot
            // finalize before the SECURITY vote lands
            .with_min_participation(1.0)
            .with_timeout(Duration::from_millis(500)),
        )
        .await
        .unwrap();

    // Approval weight 2.0 of 4.0 total is exactly 0.5, not a majority
    match wait {
        ConsensusWait::Resolved {
            reached, status, ..
        } => {
            assert!(!reached);
            assert_eq!(status, ConsensusStatus::Rejected);
        }
        ConsensusWait::TimedOut => panic!("request should have finalized"),
    }

    fixture.registry.shutdown().await;
}

#[tokio::test]
async fn resolution_event_is_broadcast() {
    let fixture = wire(ConsensusConfig::default()).await;

    voting_agent(&fixture, "LEAD", VOTE_APPROVE).await;
    voting_agent(&fixture, "PLAN", VOTE_APPROVE).await;

    fixture
        .requester
        .request_consensus(
            ConsensusOptions::new(
                "Quick check",
                vec!["LEAD".into(), "PLAN".into()],
                ConsensusType::Unanimous,
            )
            .with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    let resolutions = fixture
        .store
        .query_events(&EventQuery::default().kind(EventKind::ConsensusResolved))
        .await
        .unwrap();
    assert_eq!(resolutions.len(), 1);

    match &resolutions[0].payload {
        EventPayload::ConsensusOutcome { approved, .. } => assert!(approved),
        other => panic!("unexpected payload: {:?}", other),
    }

    fixture.registry.shutdown().await;
}
