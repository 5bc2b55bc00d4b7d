//! Storage contracts. The host application owns the durable backend
//! (IndexedDB, SQLite, whatever); the core only states the operations it
//! needs and ships in-memory reference implementations.
//!
//! Writes on the same conversation id (or pending id) MUST be serialized by
//! the implementation; operations on distinct keys may run concurrently.

pub mod memory;

use thiserror::Error;

use verbeth_protocol::ratchet::{RatchetSession, TopicMatch};

use crate::outbox::PendingOutbound;

pub use memory::{MemoryPendingStore, MemorySessionStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// KV contract for ratchet sessions
pub trait SessionStore {
    fn get_by_conversation_id(&self, id: &[u8; 32]) -> Result<Option<RatchetSession>>;

    /// Lookup across current, next and grace-period previous inbound topics.
    /// Implementations typically maintain a secondary index.
    fn get_by_inbound_topic(
        &mut self,
        topic: &[u8; 32],
        now_ms: i64,
    ) -> Result<Option<(RatchetSession, TopicMatch)>>;

    /// Full replacement by conversation id
    fn save(&mut self, session: RatchetSession) -> Result<()>;

    fn delete(&mut self, id: &[u8; 32]) -> Result<()>;
}

/// KV contract for pending outbound records
pub trait PendingStore {
    fn create(&mut self, record: PendingOutbound) -> Result<()>;
    fn mark_submitted(&mut self, id: &str, tx_hash: &str) -> Result<()>;
    fn mark_failed(&mut self, id: &str) -> Result<()>;
    fn get_by_tx_hash(&self, tx_hash: &str) -> Result<Option<PendingOutbound>>;
    fn get_by_conversation_id(&self, id: &[u8; 32]) -> Result<Vec<PendingOutbound>>;
    /// Remove and return a record, e.g. on confirmation
    fn finalize(&mut self, id: &str) -> Result<Option<PendingOutbound>>;
    fn delete(&mut self, id: &str) -> Result<()>;
}
