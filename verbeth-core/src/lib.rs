//! VerbEth core orchestration.
//!
//! Everything around the pure protocol SDK that a host application wires up:
//! the session and pending-outbound store contracts (with in-memory reference
//! implementations), the ingress router that dispatches log events by topic,
//! and the outbound commit coordinator with its burned-slot discipline.

pub mod outbox;
pub mod router;
pub mod store;

pub use outbox::{
    OutboundCoordinator, OutboundStatus, OutboxError, PendingOutbound, PreparedOutbound,
    QueueAdvance, TransactionSubmitter,
};
pub use router::{InboundMessage, IncomingHandshake, IngressRouter, RouterError};
pub use store::{
    MemoryPendingStore, MemorySessionStore, PendingStore, SessionStore, StoreError,
};

/// Wall-clock milliseconds. The protocol crate never reads a clock; hosts
/// without their own time discipline feed this into the `now_ms` parameters.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
