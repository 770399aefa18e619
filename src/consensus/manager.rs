//! Consensus manager
//!
//! Tracks active voting rounds, validates and records votes, evaluates the
//! configured algorithm, and finalizes each request exactly once — either
//! when the votes decide it or when the timeout timer fires. Timers are
//! explicit task handles, aborted on early finalization so none outlive the
//! request they guard.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConsensusConfig;
use crate::events::{AgentEventBus, EventKind, EventPayload, Priority, PublishOptions};
use crate::store::{DurableStore, SharedDurableStore};

use super::types::{
    ConsensusEvaluation, ConsensusOptions, ConsensusRequest, ConsensusStatus, ConsensusType, Vote,
    VOTE_ABSTAIN,
};

/// Error type for consensus operations
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("unknown consensus request: {0}")]
    UnknownRequest(String),

    #[error("request {0} is already finalized")]
    AlreadyFinalized(String),

    #[error("agent {agent} is not a target of request {request_id}")]
    UnauthorizedVoter { request_id: String, agent: String },

    #[error("agent {agent} already voted on request {request_id}")]
    DuplicateVote { request_id: String, agent: String },

    #[error("vote option {0:?} is not allowed for this request")]
    InvalidOption(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Shared reference to a consensus manager
pub type SharedConsensusManager = Arc<ConsensusManager>;

/// What triggered a finalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeCause {
    /// The recorded votes decided the outcome
    Votes,
    /// The voting window elapsed
    Timeout,
}

impl std::fmt::Display for FinalizeCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalizeCause::Votes => write!(f, "votes"),
            FinalizeCause::Timeout => write!(f, "timeout"),
        }
    }
}

/// Multi-algorithm voting coordinator
pub struct ConsensusManager {
    store: SharedDurableStore,
    bus: Arc<AgentEventBus>,
    weights: super::types::WeightTable,
    config: ConsensusConfig,
    active: Mutex<HashMap<String, ConsensusRequest>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ConsensusManager {
    /// Create a new consensus manager
    pub fn new(store: SharedDurableStore, bus: Arc<AgentEventBus>, config: ConsensusConfig) -> Self {
        Self {
            store,
            bus,
            weights: super::types::WeightTable::default(),
            config,
            active: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the voting weight table
    pub fn with_weights(mut self, weights: super::types::WeightTable) -> Self {
        self.weights = weights;
        self
    }

    /// Create a shared reference to this manager
    pub fn shared(self) -> SharedConsensusManager {
        Arc::new(self)
    }

    /// Number of requests currently awaiting finalization
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// The defaults applied to unset request options
    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    // =========================================================================
    // Request lifecycle
    // =========================================================================

    /// Create a voting round, broadcast it to the target agents, and schedule
    /// the timeout timer
    pub async fn create_request(self: &Arc<Self>, options: ConsensusOptions) -> String {
        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let request = ConsensusRequest {
            id: ConsensusRequest::new_id(),
            question: options.question,
            target_agents: options.target_agents,
            consensus_type: options.consensus_type,
            allowed_options: options
                .options
                .unwrap_or_else(|| self.config.default_options.clone()),
            threshold: options.threshold.unwrap_or(self.config.default_threshold),
            timeout_ms: timeout.as_millis() as u64,
            min_participation: options
                .min_participation
                .unwrap_or(self.config.default_min_participation),
            quorum: options.quorum.unwrap_or(self.config.default_quorum),
            votes: Default::default(),
            status: ConsensusStatus::Pending,
            correlation: options.correlation,
            created_at: Utc::now(),
            finalized_at: None,
        };
        let request_id = request.id.clone();

        self.active
            .lock()
            .await
            .insert(request_id.clone(), request.clone());
        self.persist(&request).await;

        info!(
            request_id = %request_id,
            consensus_type = %request.consensus_type,
            targets = request.target_agents.len(),
            "consensus request created"
        );

        self.bus
            .publish(
                EventKind::ConsensusRequired,
                format!("Consensus requested: {}", request.question),
                EventPayload::ConsensusBroadcast {
                    request_id: request_id.clone(),
                    question: request.question.clone(),
                    options: request.allowed_options.clone(),
                    timeout_ms: request.timeout_ms,
                    threshold: request.threshold,
                },
                PublishOptions {
                    priority: Priority::High,
                    target_agents: request.target_agents.clone(),
                    requires_ack: true,
                    correlation: request.correlation.clone(),
                },
            )
            .await;

        // Dead-man timer: forces a decision if voting never concludes. The
        // handle is retained so an early finalization can abort it.
        let manager = Arc::clone(self);
        let timer_id = request_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // Drop our own handle first so finalize does not abort the task
            // that is running it
            manager.timers.lock().await.remove(&timer_id);
            manager.finalize(&timer_id, FinalizeCause::Timeout).await;
        });
        self.timers.lock().await.insert(request_id.clone(), handle);

        request_id
    }

    /// Record an agent's vote
    ///
    /// Rejections (unauthorized voter, duplicate vote, disallowed option,
    /// finalized request) come back as typed errors without mutating the
    /// request. A decisive vote triggers finalization.
    pub async fn cast_vote(
        &self,
        request_id: &str,
        agent_code: &str,
        vote: &str,
        reason: Option<String>,
    ) -> ConsensusResult<ConsensusEvaluation> {
        self.adopt(request_id).await?;

        let (snapshot, evaluation, finalize_now) = {
            let mut active = self.active.lock().await;
            let request = active
                .get_mut(request_id)
                .ok_or_else(|| ConsensusError::UnknownRequest(request_id.to_string()))?;

            if request.status.is_terminal() {
                return Err(ConsensusError::AlreadyFinalized(request_id.to_string()));
            }
            if !request.authorizes(agent_code) {
                return Err(ConsensusError::UnauthorizedVoter {
                    request_id: request_id.to_string(),
                    agent: agent_code.to_string(),
                });
            }
            if request.has_voted(agent_code) {
                return Err(ConsensusError::DuplicateVote {
                    request_id: request_id.to_string(),
                    agent: agent_code.to_string(),
                });
            }
            if !request.allows_option(vote) {
                return Err(ConsensusError::InvalidOption(vote.to_string()));
            }

            let weight = self.weights.weight_for(agent_code);
            request.votes.insert(
                agent_code.to_string(),
                Vote {
                    vote: vote.to_string(),
                    weight,
                    reason,
                    timestamp: Utc::now(),
                },
            );

            let evaluation = evaluate_request(request);
            let finalize_now = evaluation.reached
                || (!request.is_open_panel()
                    && evaluation.votes_cast == evaluation.target_count
                    && evaluation.meets_participation);
            (request.clone(), evaluation, finalize_now)
        };

        self.persist(&snapshot).await;

        debug!(
            request_id,
            agent = agent_code,
            vote,
            participation = evaluation.participation,
            approval_rate = evaluation.approval_rate,
            "vote recorded"
        );

        if finalize_now {
            self.finalize(request_id, FinalizeCause::Votes).await;
        }

        Ok(evaluation)
    }

    /// Evaluate a request without mutating it
    ///
    /// Idempotent absent new votes.
    pub async fn evaluate(&self, request_id: &str) -> ConsensusResult<ConsensusEvaluation> {
        let active = self.active.lock().await;
        if let Some(request) = active.get(request_id) {
            return Ok(evaluate_request(request));
        }
        drop(active);

        match self.store.get_request(request_id).await {
            Ok(Some(request)) => Ok(evaluate_request(&request)),
            Ok(None) => Err(ConsensusError::UnknownRequest(request_id.to_string())),
            Err(error) => Err(ConsensusError::Store(error.to_string())),
        }
    }

    /// Current status of a request, from the active set or the durable store
    pub async fn status(&self, request_id: &str) -> ConsensusResult<ConsensusStatus> {
        if let Some(request) = self.active.lock().await.get(request_id) {
            return Ok(request.status);
        }

        match self.store.get_request(request_id).await {
            Ok(Some(request)) => Ok(request.status),
            Ok(None) => Err(ConsensusError::UnknownRequest(request_id.to_string())),
            Err(error) => Err(ConsensusError::Store(error.to_string())),
        }
    }

    /// Finalize a request exactly once
    ///
    /// The status check-and-set under the active-set lock is the guard that
    /// keeps a vote-triggered and a timer-triggered finalization from both
    /// committing. Returns the terminal status, or `None` if another path
    /// already finalized the request.
    pub async fn finalize(
        &self,
        request_id: &str,
        cause: FinalizeCause,
    ) -> Option<ConsensusStatus> {
        let (snapshot, evaluation) = {
            let mut active = self.active.lock().await;
            let request = active.get_mut(request_id)?;
            if request.status.is_terminal() {
                return None;
            }

            let evaluation = evaluate_request(request);
            request.status = if evaluation.reached {
                ConsensusStatus::Approved
            } else {
                ConsensusStatus::Rejected
            };
            request.finalized_at = Some(Utc::now());

            let snapshot = request.clone();
            active.remove(request_id);
            (snapshot, evaluation)
        };

        if let Some(handle) = self.timers.lock().await.remove(request_id) {
            handle.abort();
        }

        self.persist(&snapshot).await;

        info!(
            request_id,
            status = %snapshot.status,
            cause = %cause,
            votes = snapshot.votes.len(),
            approval_rate = evaluation.approval_rate,
            "consensus finalized"
        );

        self.bus
            .publish(
                EventKind::ConsensusResolved,
                format!("Consensus {}: {}", snapshot.status, snapshot.question),
                EventPayload::ConsensusOutcome {
                    request_id: request_id.to_string(),
                    approved: snapshot.status == ConsensusStatus::Approved,
                    approval_rate: evaluation.approval_rate,
                    participation: evaluation.participation,
                },
                PublishOptions {
                    priority: Priority::High,
                    correlation: snapshot.correlation.clone(),
                    ..PublishOptions::default()
                },
            )
            .await;

        Some(snapshot.status)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Ensure a request is in the active set, re-adopting a pending request
    /// from the durable store after a process restart
    async fn adopt(&self, request_id: &str) -> ConsensusResult<()> {
        if self.active.lock().await.contains_key(request_id) {
            return Ok(());
        }

        match self.store.get_request(request_id).await {
            Ok(Some(request)) if request.status.is_terminal() => {
                Err(ConsensusError::AlreadyFinalized(request_id.to_string()))
            }
            Ok(Some(request)) => {
                debug!(request_id, "re-adopted pending request from durable store");
                self.active
                    .lock()
                    .await
                    .entry(request_id.to_string())
                    .or_insert(request);
                Ok(())
            }
            Ok(None) => Err(ConsensusError::UnknownRequest(request_id.to_string())),
            Err(error) => Err(ConsensusError::Store(error.to_string())),
        }
    }

    /// Persist a request snapshot, best-effort
    async fn persist(&self, request: &ConsensusRequest) {
        if let Err(error) = self.store.put_request(request).await {
            warn!(request_id = %request.id, "consensus persist failed: {}", error);
        }
    }
}

/// Apply the request's voting algorithm to its recorded votes
fn evaluate_request(request: &ConsensusRequest) -> ConsensusEvaluation {
    let target_count = request.target_count();
    let votes_cast = request.votes.len();
    let participation = if target_count == 0 {
        0.0
    } else {
        votes_cast as f64 / target_count as f64
    };
    let meets_participation = votes_cast > 0 && participation >= request.min_participation;

    let mut approvals = 0usize;
    let mut abstains = 0usize;
    let mut approval_weight = 0.0f64;
    let mut decisive_weight = 0.0f64;
    for vote in request.votes.values() {
        if vote.vote == VOTE_ABSTAIN {
            abstains += 1;
            continue;
        }
        decisive_weight += vote.weight;
        if vote.is_approval() {
            approvals += 1;
            approval_weight += vote.weight;
        }
    }
    let non_abstain = votes_cast - abstains;

    let approval_rate = match request.consensus_type {
        ConsensusType::Weighted => {
            if decisive_weight > 0.0 {
                approval_weight / decisive_weight
            } else {
                0.0
            }
        }
        _ => {
            if non_abstain > 0 {
                approvals as f64 / non_abstain as f64
            } else {
                0.0
            }
        }
    };

    let rule_met = match request.consensus_type {
        ConsensusType::SimpleMajority => approval_rate > 0.5,
        ConsensusType::SuperMajority => approval_rate >= 0.66,
        ConsensusType::Unanimous => non_abstain > 0 && approvals == non_abstain,
        ConsensusType::Weighted => approval_rate > 0.5,
        ConsensusType::Quorum => participation >= request.quorum && approval_rate > 0.5,
    };

    ConsensusEvaluation {
        participation,
        approval_rate,
        votes_cast,
        target_count,
        meets_participation,
        reached: meets_participation && rule_met && approval_rate >= request.threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::consensus::types::{WeightTable, VOTE_APPROVE, VOTE_REJECT};
    use crate::events::AgentEventBus;
    use crate::store::MemoryDurableStore;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn manager_fixture() -> (SharedConsensusManager, Arc<MemoryDurableStore>) {
        let store = MemoryDurableStore::new().shared();
        let bus = AgentEventBus::new(
            "LEAD",
            store.clone(),
            BusConfig::default().with_persist_retry_delay(Duration::from_millis(1)),
        )
        .shared();
        let manager =
            ConsensusManager::new(store.clone(), bus, ConsensusConfig::default()).shared();
        (manager, store)
    }

    fn request_with_votes(
        consensus_type: ConsensusType,
        targets: Vec<&str>,
        votes: Vec<(&str, &str, f64)>,
    ) -> ConsensusRequest {
        let mut vote_map = BTreeMap::new();
        for (agent, vote, weight) in votes {
            vote_map.insert(
                agent.to_string(),
                Vote {
                    vote: vote.to_string(),
                    weight,
                    reason: None,
                    timestamp: Utc::now(),
                },
            );
        }
        ConsensusRequest {
            id: ConsensusRequest::new_id(),
            question: "Proceed?".to_string(),
            target_agents: targets.into_iter().map(String::from).collect(),
            consensus_type,
            allowed_options: vec![
                VOTE_APPROVE.to_string(),
                VOTE_REJECT.to_string(),
                VOTE_ABSTAIN.to_string(),
            ],
            threshold: 0.5,
            timeout_ms: 60_000,
            min_participation: 0.5,
            quorum: 0.67,
            votes: vote_map,
            status: ConsensusStatus::Pending,
            correlation: Default::default(),
            created_at: Utc::now(),
            finalized_at: None,
        }
    }

    #[test]
    fn test_simple_majority_boundary_rejects() {
        // Participation 2/3 = 0.667 clears 0.5; approval rate is exactly 0.5,
        // which is not strictly greater than 0.5
        let request = request_with_votes(
            ConsensusType::SimpleMajority,
            vec!["A", "B", "C"],
            vec![("A", VOTE_APPROVE, 1.0), ("B", VOTE_REJECT, 1.0)],
        );
        let evaluation = evaluate_request(&request);

        assert!(evaluation.meets_participation);
        assert!((evaluation.approval_rate - 0.5).abs() < 1e-9);
        assert!(!evaluation.reached);
    }

    #[test]
    fn test_simple_majority_two_of_three() {
        let request = request_with_votes(
            ConsensusType::SimpleMajority,
            vec!["A", "B", "C"],
            vec![("A", VOTE_APPROVE, 1.0), ("B", VOTE_APPROVE, 1.0)],
        );
        assert!(evaluate_request(&request).reached);
    }

    #[test]
    fn test_abstains_excluded_from_rate() {
        let request = request_with_votes(
            ConsensusType::SimpleMajority,
            vec!["A", "B", "C"],
            vec![
                ("A", VOTE_APPROVE, 1.0),
                ("B", VOTE_ABSTAIN, 1.0),
                ("C", VOTE_ABSTAIN, 1.0),
            ],
        );
        let evaluation = evaluate_request(&request);
        assert!((evaluation.approval_rate - 1.0).abs() < 1e-9);
        assert!(evaluation.reached);
    }

    #[test]
    fn test_super_majority_at_boundary() {
        // 2/3 = 0.667 >= 0.66
        let request = request_with_votes(
            ConsensusType::SuperMajority,
            vec!["A", "B", "C"],
            vec![
                ("A", VOTE_APPROVE, 1.0),
                ("B", VOTE_APPROVE, 1.0),
                ("C", VOTE_REJECT, 1.0),
            ],
        );
        assert!(evaluate_request(&request).reached);
    }

    #[test]
    fn test_unanimous_single_reject_forces_rejection() {
        let request = request_with_votes(
            ConsensusType::Unanimous,
            vec!["A", "B", "C", "D"],
            vec![
                ("A", VOTE_APPROVE, 1.0),
                ("B", VOTE_APPROVE, 1.0),
                ("C", VOTE_APPROVE, 1.0),
                ("D", VOTE_REJECT, 1.0),
            ],
        );
        assert!(!evaluate_request(&request).reached);
    }

    #[test]
    fn test_unanimous_abstains_do_not_block() {
        let request = request_with_votes(
            ConsensusType::Unanimous,
            vec!["A", "B", "C"],
            vec![
                ("A", VOTE_APPROVE, 1.0),
                ("B", VOTE_APPROVE, 1.0),
                ("C", VOTE_ABSTAIN, 1.0),
            ],
        );
        assert!(evaluate_request(&request).reached);
    }

    #[test]
    fn test_unanimous_all_abstain_not_reached() {
        let request = request_with_votes(
            ConsensusType::Unanimous,
            vec!["A", "B"],
            vec![("A", VOTE_ABSTAIN, 1.0), ("B", VOTE_ABSTAIN, 1.0)],
        );
        assert!(!evaluate_request(&request).reached);
    }

    #[test]
    fn test_weighted_security_outweighs() {
        // SECURITY approval at 2.0 against two 1.0 rejections: 2.0/4.0 = 0.5,
        // not strictly greater than 0.5
        let rejected = request_with_votes(
            ConsensusType::Weighted,
            vec!["SECURITY", "A", "B"],
            vec![
                ("SECURITY", VOTE_APPROVE, 2.0),
                ("A", VOTE_REJECT, 1.0),
                ("B", VOTE_REJECT, 1.0),
            ],
        );
        assert!(!evaluate_request(&rejected).reached);

        // One more unit of approval weight tips it
        let approved = request_with_votes(
            ConsensusType::Weighted,
            vec!["SECURITY", "A", "B", "C"],
            vec![
                ("SECURITY", VOTE_APPROVE, 2.0),
                ("C", VOTE_APPROVE, 1.0),
                ("A", VOTE_REJECT, 1.0),
                ("B", VOTE_REJECT, 1.0),
            ],
        );
        assert!(evaluate_request(&approved).reached);
    }

    #[test]
    fn test_weighted_rate_monotone_in_approval_weight() {
        let base = request_with_votes(
            ConsensusType::Weighted,
            vec!["A", "B", "C"],
            vec![
                ("A", VOTE_APPROVE, 1.0),
                ("B", VOTE_REJECT, 1.0),
                ("C", VOTE_REJECT, 1.0),
            ],
        );
        let boosted = request_with_votes(
            ConsensusType::Weighted,
            vec!["A", "B", "C"],
            vec![
                ("A", VOTE_APPROVE, 2.5),
                ("B", VOTE_REJECT, 1.0),
                ("C", VOTE_REJECT, 1.0),
            ],
        );

        assert!(
            evaluate_request(&boosted).approval_rate >= evaluate_request(&base).approval_rate
        );
    }

    #[test]
    fn test_quorum_gates_on_participation() {
        // 2 of 4 voted: participation 0.5 is below the 0.67 quorum
        let below = request_with_votes(
            ConsensusType::Quorum,
            vec!["A", "B", "C", "D"],
            vec![("A", VOTE_APPROVE, 1.0), ("B", VOTE_APPROVE, 1.0)],
        );
        assert!(!evaluate_request(&below).reached);

        // 3 of 4 voted: 0.75 clears the quorum, simple majority applies
        let above = request_with_votes(
            ConsensusType::Quorum,
            vec!["A", "B", "C", "D"],
            vec![
                ("A", VOTE_APPROVE, 1.0),
                ("B", VOTE_APPROVE, 1.0),
                ("C", VOTE_REJECT, 1.0),
            ],
        );
        assert!(evaluate_request(&above).reached);
    }

    #[test]
    fn test_below_min_participation_not_finalizable() {
        let request = request_with_votes(
            ConsensusType::SimpleMajority,
            vec!["A", "B", "C", "D", "E"],
            vec![("A", VOTE_APPROVE, 1.0)],
        );
        let evaluation = evaluate_request(&request);
        assert!(!evaluation.meets_participation);
        assert!(!evaluation.reached);
    }

    #[test]
    fn test_evaluation_idempotent() {
        let request = request_with_votes(
            ConsensusType::SimpleMajority,
            vec!["A", "B", "C"],
            vec![("A", VOTE_APPROVE, 1.0), ("B", VOTE_REJECT, 1.0)],
        );
        assert_eq!(evaluate_request(&request), evaluate_request(&request));
    }

    #[tokio::test]
    async fn test_vote_validations() {
        let (manager, _store) = manager_fixture();
        let request_id = manager
            .create_request(ConsensusOptions::new(
                "Proceed with implementation?",
                vec!["LEAD".into(), "PLAN".into(), "SECURITY".into()],
                ConsensusType::SimpleMajority,
            ))
            .await;

        // Unauthorized voter
        let result = manager
            .cast_vote(&request_id, "INTRUDER", VOTE_APPROVE, None)
            .await;
        assert!(matches!(
            result,
            Err(ConsensusError::UnauthorizedVoter { .. })
        ));

        // Disallowed option
        let result = manager.cast_vote(&request_id, "LEAD", "MAYBE", None).await;
        assert!(matches!(result, Err(ConsensusError::InvalidOption(_))));

        // First vote lands, repeat is rejected without mutation
        manager
            .cast_vote(&request_id, "LEAD", VOTE_APPROVE, None)
            .await
            .unwrap();
        let result = manager
            .cast_vote(&request_id, "LEAD", VOTE_REJECT, None)
            .await;
        assert!(matches!(result, Err(ConsensusError::DuplicateVote { .. })));

        let evaluation = manager.evaluate(&request_id).await.unwrap();
        assert_eq!(evaluation.votes_cast, 1);
    }

    #[tokio::test]
    async fn test_votes_finalize_request() {
        let (manager, store) = manager_fixture();
        let request_id = manager
            .create_request(
                ConsensusOptions::new(
                    "Ship it?",
                    vec!["LEAD".into(), "PLAN".into(), "EXEC".into()],
                    ConsensusType::SimpleMajority,
                )
                .with_timeout(Duration::from_secs(30)),
            )
            .await;

        manager
            .cast_vote(&request_id, "LEAD", VOTE_APPROVE, None)
            .await
            .unwrap();
        manager
            .cast_vote(&request_id, "PLAN", VOTE_APPROVE, Some("looks good".into()))
            .await
            .unwrap();

        // Two approvals of three targets reach majority and finalize
        assert_eq!(
            manager.status(&request_id).await.unwrap(),
            ConsensusStatus::Approved
        );
        assert_eq!(manager.active_count().await, 0);

        // Finalization persisted and the timer was torn down
        let stored = store.get_request(&request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConsensusStatus::Approved);
        assert!(manager.timers.lock().await.is_empty());

        // Late vote is rejected by the finalize-once guard
        let late = manager
            .cast_vote(&request_id, "EXEC", VOTE_REJECT, None)
            .await;
        assert!(matches!(late, Err(ConsensusError::AlreadyFinalized(_))));
    }

    #[tokio::test]
    async fn test_timeout_forces_rejection() {
        let (manager, store) = manager_fixture();
        let request_id = manager
            .create_request(
                ConsensusOptions::new(
                    "Anyone there?",
                    vec!["LEAD".into(), "PLAN".into()],
                    ConsensusType::SimpleMajority,
                )
                .with_timeout(Duration::from_millis(30)),
            )
            .await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        let stored = store.get_request(&request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConsensusStatus::Rejected);
        assert_eq!(manager.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_finalize_commits_once() {
        let (manager, _store) = manager_fixture();
        let request_id = manager
            .create_request(ConsensusOptions::new(
                "Double finalize?",
                vec!["LEAD".into()],
                ConsensusType::SimpleMajority,
            ))
            .await;

        let first = manager.finalize(&request_id, FinalizeCause::Timeout).await;
        let second = manager.finalize(&request_id, FinalizeCause::Votes).await;

        assert_eq!(first, Some(ConsensusStatus::Rejected));
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_weights_applied_at_cast() {
        let (manager, _store) = manager_fixture();
        let manager = Arc::new(
            ConsensusManager::new(
                manager.store.clone(),
                manager.bus.clone(),
                ConsensusConfig::default(),
            )
            .with_weights(WeightTable::default().with_weight("DESIGN", 1.25)),
        );

        let request_id = manager
            .create_request(ConsensusOptions::new(
                "Weight check",
                vec!["SECURITY".into(), "DESIGN".into(), "EXEC".into()],
                ConsensusType::Weighted,
            ))
            .await;

        manager
            .cast_vote(&request_id, "SECURITY", VOTE_APPROVE, None)
            .await
            .unwrap();

        let active = manager.active.lock().await;
        let request = active.get(&request_id).unwrap();
        assert_eq!(request.votes.get("SECURITY").unwrap().weight, 2.0);
    }
}
