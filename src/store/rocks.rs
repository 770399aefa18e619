//! RocksDB-backed durable store
//!
//! Column families separate events, consensus requests, checkpoints,
//! acknowledgments, and audit rows while sharing one database instance.
//! Values are serialized as JSON for debuggability.

use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{de::DeserializeOwned, Serialize};

use crate::checkpoint::Checkpoint;
use crate::consensus::ConsensusRequest;
use crate::events::AgentEvent;

use super::durable::{DurableStore, EventQuery, StoreError, StoreResult, ValidationAudit};

/// Column family for events
const CF_EVENTS: &str = "events";

/// Column family for event acknowledgments
const CF_ACKS: &str = "acks";

/// Column family for consensus requests
const CF_REQUESTS: &str = "requests";

/// Column family for checkpoints
const CF_CHECKPOINTS: &str = "checkpoints";

/// Column family for validation audit rows
const CF_AUDITS: &str = "audits";

/// All column family names
const ALL_CFS: &[&str] = &[CF_EVENTS, CF_ACKS, CF_REQUESTS, CF_CHECKPOINTS, CF_AUDITS];

/// Key prefixes for compound keys
mod keys {
    /// Event key, timestamp-first so iteration is chronological
    pub fn event(timestamp_nanos: i64, event_id: &str) -> String {
        format!("evt:{:020}:{}", timestamp_nanos, event_id)
    }

    /// Acknowledgment key
    pub fn ack(event_id: &str, agent_code: &str) -> String {
        format!("ack:{}:{}", event_id, agent_code)
    }

    /// Consensus request key
    pub fn request(request_id: &str) -> String {
        format!("req:{}", request_id)
    }

    /// Checkpoint key
    pub fn checkpoint(checkpoint_id: &str) -> String {
        format!("chk:{}", checkpoint_id)
    }

    /// Audit key
    pub fn audit(timestamp_nanos: i64, agent_code: &str) -> String {
        format!("aud:{:020}:{}", timestamp_nanos, agent_code)
    }
}

/// RocksDB implementation of [`DurableStore`]
pub struct RocksDurableStore {
    db: RwLock<DB>,
    path: PathBuf,
}

impl RocksDurableStore {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    /// The database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
        let db = self
            .db
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Unavailable(format!("missing column family {}", cf_name)))?;

        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        db.put_cf(&cf, key.as_bytes(), bytes)
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        let db = self
            .db
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Unavailable(format!("missing column family {}", cf_name)))?;

        match db
            .get_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
        {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, cf_name: &str, key: &str) -> StoreResult<()> {
        let db = self
            .db
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Unavailable(format!("missing column family {}", cf_name)))?;

        db.delete_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str, prefix: &str) -> StoreResult<Vec<T>> {
        let db = self
            .db
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Unavailable(format!("missing column family {}", cf_name)))?;

        let mut values = Vec::new();
        let iter = db.prefix_iterator_cf(&cf, prefix.as_bytes());
        for result in iter {
            let (key, bytes) = result.map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let key_str = String::from_utf8_lossy(&key);
            if !key_str.starts_with(prefix) {
                break;
            }
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            values.push(value);
        }
        Ok(values)
    }
}

#[async_trait]
impl DurableStore for RocksDurableStore {
    async fn append_event(&self, event: &AgentEvent) -> StoreResult<()> {
        let timestamp_nanos = event.timestamp.timestamp_nanos_opt().unwrap_or(0);
        self.put(CF_EVENTS, &keys::event(timestamp_nanos, &event.id), event)
    }

    async fn acknowledge_event(&self, event_id: &str, agent_code: &str) -> StoreResult<()> {
        self.put(CF_ACKS, &keys::ack(event_id, agent_code), &agent_code)
    }

    async fn query_events(&self, query: &EventQuery) -> StoreResult<Vec<AgentEvent>> {
        let mut events: Vec<AgentEvent> = self
            .scan::<AgentEvent>(CF_EVENTS, "evt:")?
            .into_iter()
            .filter(|e| query.matches(e))
            .collect();

        // Keys are chronological; queries return newest first
        events.reverse();
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn put_request(&self, request: &ConsensusRequest) -> StoreResult<()> {
        self.put(CF_REQUESTS, &keys::request(&request.id), request)
    }

    async fn get_request(&self, request_id: &str) -> StoreResult<Option<ConsensusRequest>> {
        self.get(CF_REQUESTS, &keys::request(request_id))
    }

    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        self.put(CF_CHECKPOINTS, &keys::checkpoint(&checkpoint.id), checkpoint)
    }

    async fn get_checkpoint(&self, checkpoint_id: &str) -> StoreResult<Option<Checkpoint>> {
        self.get(CF_CHECKPOINTS, &keys::checkpoint(checkpoint_id))
    }

    async fn list_checkpoints(
        &self,
        workflow_id: &str,
        agent_code: &str,
    ) -> StoreResult<Vec<Checkpoint>> {
        let mut checkpoints: Vec<Checkpoint> = self
            .scan::<Checkpoint>(CF_CHECKPOINTS, "chk:")?
            .into_iter()
            .filter(|c| c.workflow_id == workflow_id && c.agent_code == agent_code)
            .collect();

        checkpoints.sort_by_key(|c| c.sequence);
        Ok(checkpoints)
    }

    async fn delete_checkpoint(&self, checkpoint_id: &str) -> StoreResult<()> {
        self.delete(CF_CHECKPOINTS, &keys::checkpoint(checkpoint_id))
    }

    async fn record_validation(&self, audit: &ValidationAudit) -> StoreResult<()> {
        let timestamp_nanos = audit.recorded_at.timestamp_nanos_opt().unwrap_or(0);
        self.put(
            CF_AUDITS,
            &keys::audit(timestamp_nanos, &audit.agent_code),
            audit,
        )
    }
}
