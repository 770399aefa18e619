//! Demonstration driver for the coordination core
//!
//! Wires a handful of agents over the in-memory store and loopback feed,
//! then walks the main flows: subscription and publishing, checkpoint
//! creation, a consensus round with simulated voters, and event history.
//!
//! # Usage
//!
//! ```bash
//! conclave
//! conclave --agent VALIDATION --consensus-timeout-ms 5000
//! RUST_LOG=conclave=debug conclave
//! ```

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::info;

use conclave::checkpoint::CheckpointManager;
use conclave::config::{BusConfig, CheckpointConfig, ConsensusConfig};
use conclave::consensus::{ConsensusManager, ConsensusOptions, ConsensusType, ConsensusWait};
use conclave::events::{
    BusRegistry, Correlation, EventKind, EventPayload, FnHandler, PublishOptions,
};
use conclave::feed::LoopbackFeed;
use conclave::store::{
    DurableStore, EventQuery, MemoryDurableStore, MemoryFallbackStore, TieredStore,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Agent code the demonstration publishes as
    #[arg(long, default_value = "VALIDATION")]
    agent: String,

    /// Voting window for the demonstration consensus round
    #[arg(long, default_value_t = 5000)]
    consensus_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("conclave=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Shared collaborators: durable store and cross-process feed
    let durable = MemoryDurableStore::new().shared();
    let feed = LoopbackFeed::new().shared();
    let bus_config = BusConfig::default().with_consensus_poll_interval(Duration::from_millis(200));
    let registry = BusRegistry::new(durable.clone(), bus_config)
        .with_feed(feed)
        .shared();

    // Register the demonstration agent; the voting panel registers below
    let bus = registry.register_agent(&args.agent).await;
    let panel = ["LEAD", "PLAN", "SECURITY"];

    // Subscribe to findings
    bus.subscribe(
        EventKind::FindingDetected,
        FnHandler::arc(|event| async move {
            info!(action = %event.action, "finding observed");
            Ok(())
        }),
        Default::default(),
    )
    .await;

    let correlation = Correlation::directive("SD-DEMO-001").with_phase("LEAD_TO_PLAN");

    // Publish lifecycle and discovery events
    bus.publish(
        EventKind::AnalysisStart,
        "Beginning codebase validation",
        EventPayload::Analysis {
            summary: "scanning src/components".to_string(),
            detail: json!({"patterns": ["dashboard", "user interface"]}),
        },
        PublishOptions {
            correlation: correlation.clone(),
            ..PublishOptions::default()
        },
    )
    .await;

    bus.publish(
        EventKind::FindingDetected,
        "Found existing dashboard implementation",
        EventPayload::Finding {
            description: "duplicate implementation".to_string(),
            confidence: 0.95,
            detail: json!({"location": "src/components/Dashboard.tsx"}),
        },
        PublishOptions {
            priority: conclave::events::Priority::High,
            target_agents: vec!["LEAD".to_string(), "PLAN".to_string()],
            correlation: correlation.clone(),
            ..PublishOptions::default()
        },
    )
    .await;

    // Checkpoint mid-analysis
    let tiered = TieredStore::new(durable.clone(), MemoryFallbackStore::new().shared());
    let checkpoints = CheckpointManager::new(
        "wf-demo",
        args.agent.clone(),
        tiered,
        bus.clone(),
        CheckpointConfig::default(),
    )
    .shared();
    bus.attach_checkpoints(checkpoints.clone()).await;

    let checkpoint = bus
        .create_checkpoint(
            "ANALYZE",
            json!({"files_analyzed": 42, "findings": 3}),
            json!({}),
        )
        .await?;
    info!(checkpoint_id = %checkpoint.id, "mid-analysis checkpoint created");

    // Consensus round with simulated voters
    let consensus = ConsensusManager::new(
        durable.clone(),
        bus.clone(),
        ConsensusConfig::default(),
    )
    .shared();
    bus.attach_consensus(consensus.clone()).await;

    // Panel agents vote as soon as the broadcast reaches them over the feed
    for (agent, vote) in [("LEAD", "APPROVE"), ("PLAN", "APPROVE"), ("SECURITY", "REJECT")] {
        let agent_bus = registry.register_agent(agent).await;
        let voter = consensus.clone();
        agent_bus
            .subscribe(
                EventKind::ConsensusRequired,
                FnHandler::arc(move |event| {
                    let voter = voter.clone();
                    async move {
                        if let EventPayload::ConsensusBroadcast { request_id, .. } = &event.payload
                        {
                            let evaluation = voter
                                .cast_vote(request_id, agent, vote, Some("demo vote".to_string()))
                                .await?;
                            info!(
                                agent,
                                vote,
                                approval_rate = evaluation.approval_rate,
                                "vote cast"
                            );
                        }
                        Ok(())
                    }
                }),
                Default::default(),
            )
            .await;
    }

    let wait = bus
        .request_consensus(
            ConsensusOptions::new(
                "Proceed with implementation given existing code?",
                panel.iter().map(|a| a.to_string()).collect(),
                ConsensusType::SimpleMajority,
            )
            .with_timeout(Duration::from_millis(args.consensus_timeout_ms))
            // Wait for the whole panel so every vote shows up in the result
            .with_min_participation(1.0)
            .with_correlation(correlation),
        )
        .await?;

    match wait {
        ConsensusWait::Resolved {
            reached,
            votes,
            status,
        } => info!(reached, %status, votes = votes.len(), "consensus resolved"),
        ConsensusWait::TimedOut => info!("consensus wait timed out"),
    }

    // Event history
    let recent = durable
        .query_events(&EventQuery::default().limit(5))
        .await?;
    for event in &recent {
        info!(kind = %event.kind, action = %event.action, "history");
    }

    registry.shutdown().await;
    Ok(())
}
