//! Recognized protocol options. Everything has a safe default; callers
//! override fields individually.

/// Accepted binding-message version string
pub const BINDING_VERSION: &str = "1";
/// Accepted binding-message context
pub const BINDING_CONTEXT: &str = "verbeth";

/// Tunable limits for the session engine
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Per-session skipped-key capacity; oldest entries are evicted on overflow
    pub max_stored_skipped_keys: usize,
    /// Skipped-key expiry in milliseconds; pruning is caller-scheduled
    pub skipped_key_ttl_ms: i64,
    /// How long a previous-epoch inbound topic remains listenable
    pub topic_grace_ms: i64,
    /// Per-decrypt skip bound, mitigating gap attacks
    pub max_skip_on_decrypt: u32,
    /// Reject handshakes that carry no KEM material
    pub hybrid_required: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_stored_skipped_keys: 1000,
            skipped_key_ttl_ms: 7 * 24 * 60 * 60 * 1000,
            topic_grace_ms: 5 * 60 * 1000,
            max_skip_on_decrypt: 1000,
            hybrid_required: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ProtocolConfig::default();
        assert_eq!(cfg.max_stored_skipped_keys, 1000);
        assert_eq!(cfg.skipped_key_ttl_ms, 604_800_000);
        assert_eq!(cfg.topic_grace_ms, 300_000);
        assert_eq!(cfg.max_skip_on_decrypt, 1000);
        assert!(cfg.hybrid_required);
    }
}
