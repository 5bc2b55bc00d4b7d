//! In-memory reference stores. Useful for tests and as a template for real
//! backends; a production deployment persists to disk behind the same traits.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;

use verbeth_protocol::ratchet::{matches_session_topic, RatchetSession, TopicMatch};

use crate::outbox::{OutboundStatus, PendingOutbound};

use super::{PendingStore, Result, SessionStore};

const TOPIC_INDEX_CAPACITY: usize = 4096;

/// Sessions keyed by conversation id, with an LRU topic → conversation index
/// so steady-state inbound dispatch avoids the full scan.
pub struct MemorySessionStore {
    sessions: HashMap<[u8; 32], RatchetSession>,
    topic_index: LruCache<[u8; 32], [u8; 32]>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            topic_index: LruCache::new(
                NonZeroUsize::new(TOPIC_INDEX_CAPACITY).expect("nonzero capacity"),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn index_session_topics(&mut self, session: &RatchetSession) {
        self.topic_index
            .put(session.current_topic_inbound, session.conversation_id);
        if let Some(next) = session.next_topic_inbound {
            self.topic_index.put(next, session.conversation_id);
        }
        if let Some(previous) = session.previous_topic_inbound {
            self.topic_index.put(previous, session.conversation_id);
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn get_by_conversation_id(&self, id: &[u8; 32]) -> Result<Option<RatchetSession>> {
        Ok(self.sessions.get(id).cloned())
    }

    fn get_by_inbound_topic(
        &mut self,
        topic: &[u8; 32],
        now_ms: i64,
    ) -> Result<Option<(RatchetSession, TopicMatch)>> {
        // Fast path: the index points at a candidate, re-check before trusting
        if let Some(conversation_id) = self.topic_index.get(topic).copied() {
            if let Some(session) = self.sessions.get(&conversation_id) {
                if let Some(matched) = matches_session_topic(session, topic, now_ms) {
                    return Ok(Some((session.clone(), matched)));
                }
            }
        }

        // Slow path: scan and refresh the index
        let found = self
            .sessions
            .values()
            .find_map(|s| matches_session_topic(s, topic, now_ms).map(|m| (s.clone(), m)));
        if let Some((ref session, _)) = found {
            self.index_session_topics(session);
        }
        Ok(found)
    }

    fn save(&mut self, session: RatchetSession) -> Result<()> {
        self.index_session_topics(&session);
        self.sessions.insert(session.conversation_id, session);
        Ok(())
    }

    fn delete(&mut self, id: &[u8; 32]) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

/// Pending outbound records keyed by id, with a tx-hash lookup
pub struct MemoryPendingStore {
    records: HashMap<String, PendingOutbound>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryPendingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingStore for MemoryPendingStore {
    fn create(&mut self, record: PendingOutbound) -> Result<()> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    fn mark_submitted(&mut self, id: &str, tx_hash: &str) -> Result<()> {
        if let Some(record) = self.records.get_mut(id) {
            record.status = OutboundStatus::Submitted;
            record.tx_hash = Some(tx_hash.to_string());
        }
        Ok(())
    }

    fn mark_failed(&mut self, id: &str) -> Result<()> {
        if let Some(record) = self.records.get_mut(id) {
            record.status = OutboundStatus::Failed;
        }
        Ok(())
    }

    fn get_by_tx_hash(&self, tx_hash: &str) -> Result<Option<PendingOutbound>> {
        Ok(self
            .records
            .values()
            .find(|r| r.tx_hash.as_deref() == Some(tx_hash))
            .cloned())
    }

    fn get_by_conversation_id(&self, id: &[u8; 32]) -> Result<Vec<PendingOutbound>> {
        let mut records: Vec<PendingOutbound> = self
            .records
            .values()
            .filter(|r| &r.conversation_id == id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn finalize(&mut self, id: &str) -> Result<Option<PendingOutbound>> {
        Ok(self.records.remove(id))
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        self.records.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::session_pair;
    use verbeth_protocol::config::ProtocolConfig;
    use verbeth_protocol::ratchet::{ratchet_decrypt, ratchet_encrypt};

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_save_and_get_by_conversation_id() {
        let pair = session_pair();
        let mut store = MemorySessionStore::new();
        assert!(store.is_empty());

        store.save(pair.alice.clone()).unwrap();
        assert_eq!(store.len(), 1);

        let loaded = store
            .get_by_conversation_id(&pair.alice.conversation_id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.my_address, pair.alice.my_address);
        assert!(store.get_by_conversation_id(&[0u8; 32]).unwrap().is_none());

        store.delete(&pair.alice.conversation_id).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_is_full_replacement() {
        let pair = session_pair();
        let mut store = MemorySessionStore::new();
        store.save(pair.alice.clone()).unwrap();

        let cfg = ProtocolConfig::default();
        let out = ratchet_encrypt(&pair.alice, b"m", &pair.alice_ed_secret, &cfg, NOW).unwrap();
        store.save(out.session).unwrap();

        let loaded = store
            .get_by_conversation_id(&pair.alice.conversation_id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.sending_msg_number, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_topic_lookup_current_and_next() {
        let pair = session_pair();
        let mut store = MemorySessionStore::new();
        store.save(pair.alice.clone()).unwrap();

        let (_, matched) = store
            .get_by_inbound_topic(&pair.alice.current_topic_inbound, NOW)
            .unwrap()
            .unwrap();
        assert_eq!(matched, TopicMatch::Current);

        let next = pair.alice.next_topic_inbound.unwrap();
        let (_, matched) = store.get_by_inbound_topic(&next, NOW).unwrap().unwrap();
        assert_eq!(matched, TopicMatch::Next);

        assert!(store.get_by_inbound_topic(&[0xfe; 32], NOW).unwrap().is_none());
    }

    #[test]
    fn test_topic_lookup_previous_respects_grace() {
        let pair = session_pair();
        let cfg = ProtocolConfig::default();

        // Drive Alice through a full step so she has a previous topic
        let m1 = ratchet_encrypt(&pair.alice, b"m1", &pair.alice_ed_secret, &cfg, NOW).unwrap();
        let bob = ratchet_decrypt(&pair.bob, &m1.header, &m1.ciphertext, &cfg, NOW)
            .unwrap()
            .session;
        let m2 = ratchet_encrypt(&bob, b"m2", &pair.bob_ed_secret, &cfg, NOW).unwrap();
        let alice = ratchet_decrypt(&m1.session, &m2.header, &m2.ciphertext, &cfg, NOW)
            .unwrap()
            .session;

        let previous = alice.previous_topic_inbound.unwrap();
        let mut store = MemorySessionStore::new();
        store.save(alice).unwrap();

        let (_, matched) = store
            .get_by_inbound_topic(&previous, NOW + 1)
            .unwrap()
            .unwrap();
        assert_eq!(matched, TopicMatch::Previous);
        assert!(store
            .get_by_inbound_topic(&previous, NOW + cfg.topic_grace_ms + 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_topic_index_survives_rotation() {
        let pair = session_pair();
        let cfg = ProtocolConfig::default();
        let mut store = MemorySessionStore::new();
        store.save(pair.bob.clone()).unwrap();

        // Warm the index on the epoch-0 topic
        assert!(store
            .get_by_inbound_topic(&pair.bob.current_topic_inbound, NOW)
            .unwrap()
            .is_some());

        // Rotate Bob via a real decrypt, then look up the rotated next topic
        let m1 = ratchet_encrypt(&pair.alice, b"m1", &pair.alice_ed_secret, &cfg, NOW).unwrap();
        let bob = ratchet_decrypt(&pair.bob, &m1.header, &m1.ciphertext, &cfg, NOW)
            .unwrap()
            .session;
        let rotated_next = bob.next_topic_inbound.unwrap();
        store.save(bob).unwrap();

        let (_, matched) = store
            .get_by_inbound_topic(&rotated_next, NOW)
            .unwrap()
            .unwrap();
        assert_eq!(matched, TopicMatch::Next);
    }

    #[test]
    fn test_pending_store_lifecycle() {
        let pair = session_pair();
        let mut store = MemoryPendingStore::new();

        let record = PendingOutbound {
            id: "p-1".to_string(),
            conversation_id: pair.alice.conversation_id,
            topic: [1u8; 32],
            payload: vec![1, 2, 3],
            plaintext: "hello".to_string(),
            session_before: pair.alice.clone(),
            session_after: pair.alice.clone(),
            created_at: NOW,
            tx_hash: None,
            status: OutboundStatus::Preparing,
        };
        store.create(record).unwrap();

        store.mark_submitted("p-1", "0xabc").unwrap();
        let loaded = store.get_by_tx_hash("0xabc").unwrap().unwrap();
        assert_eq!(loaded.status, OutboundStatus::Submitted);
        assert_eq!(loaded.tx_hash.as_deref(), Some("0xabc"));

        let by_conversation = store
            .get_by_conversation_id(&pair.alice.conversation_id)
            .unwrap();
        assert_eq!(by_conversation.len(), 1);

        let finalized = store.finalize("p-1").unwrap().unwrap();
        assert_eq!(finalized.plaintext, "hello");
        assert!(store.is_empty());
        assert!(store.finalize("p-1").unwrap().is_none());
    }

    #[test]
    fn test_pending_store_orders_by_creation() {
        let pair = session_pair();
        let mut store = MemoryPendingStore::new();

        for (i, at) in [(1u8, 300i64), (2, 100), (3, 200)] {
            store
                .create(PendingOutbound {
                    id: format!("p-{}", i),
                    conversation_id: pair.alice.conversation_id,
                    topic: [i; 32],
                    payload: vec![],
                    plaintext: String::new(),
                    session_before: pair.alice.clone(),
                    session_after: pair.alice.clone(),
                    created_at: at,
                    tx_hash: None,
                    status: OutboundStatus::Preparing,
                })
                .unwrap();
        }

        let records = store
            .get_by_conversation_id(&pair.alice.conversation_id)
            .unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p-2", "p-3", "p-1"]);
    }
}
