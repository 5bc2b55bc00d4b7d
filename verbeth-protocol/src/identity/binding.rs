//! The key-binding message: a line-oriented, human-readable statement the
//! wallet signs, tying the identity public keys to the wallet address.
//!
//! Layout is one key-value pair per line after the header:
//!
//! ```text
//! VerbEth Key Binding v1
//! address: 0x…
//! x25519: 0x<64 hex>
//! ed25519: 0x<64 hex>
//! context: verbeth
//! version: 1
//! chainId: 8453
//! rpId: verbeth.xyz
//! ```

use std::collections::HashMap;

use crate::config::{BINDING_CONTEXT, BINDING_VERSION};
use crate::crypto::constant_time::eq_slices;

use super::{BindingContext, BindingExpectations};

const BINDING_HEADER: &str = "VerbEth Key Binding v1";

/// Parsed binding-message fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingFields {
    pub address: String,
    pub x25519: String,
    pub ed25519: String,
    pub context: String,
    pub version: String,
    pub chain_id: Option<u64>,
    pub rp_id: Option<String>,
}

/// Render the binding message for signing
pub fn build_binding_message(
    address: &str,
    x25519_pub: &[u8; 32],
    ed_pub: &[u8; 32],
    ctx: &BindingContext,
) -> String {
    format!(
        "{header}\naddress: {address}\nx25519: 0x{x}\ned25519: 0x{ed}\ncontext: {context}\nversion: {version}\nchainId: {chain_id}\nrpId: {rp_id}",
        header = BINDING_HEADER,
        address = address.to_ascii_lowercase(),
        x = hex::encode(x25519_pub),
        ed = hex::encode(ed_pub),
        context = BINDING_CONTEXT,
        version = BINDING_VERSION,
        chain_id = ctx.chain_id,
        rp_id = ctx.rp_id,
    )
}

/// Parse a binding message. Returns `None` on any structural defect: missing
/// header, malformed line, or missing mandatory field.
pub fn parse_binding_message(message: &str) -> Option<BindingFields> {
    let mut lines = message.lines();

    if lines.next()? != BINDING_HEADER {
        return None;
    }

    let mut fields: HashMap<&str, &str> = HashMap::new();
    for line in lines {
        let (key, value) = line.split_once(": ")?;
        if fields.insert(key, value).is_some() {
            // Duplicate keys are a forgery smell
            return None;
        }
    }

    let chain_id = match fields.get("chainId") {
        Some(raw) => Some(raw.parse::<u64>().ok()?),
        None => None,
    };

    Some(BindingFields {
        address: (*fields.get("address")?).to_string(),
        x25519: (*fields.get("x25519")?).to_string(),
        ed25519: (*fields.get("ed25519")?).to_string(),
        context: (*fields.get("context")?).to_string(),
        version: (*fields.get("version")?).to_string(),
        chain_id,
        rp_id: fields.get("rpId").map(|s| s.to_string()),
    })
}

impl BindingFields {
    /// Check the parsed fields against the expected identity
    pub fn matches(
        &self,
        address: &str,
        expected_x25519_pub: &[u8; 32],
        expected_ed_pub: &[u8; 32],
        expectations: &BindingExpectations,
    ) -> bool {
        if self.address != address.to_ascii_lowercase() {
            return false;
        }
        if self.context != BINDING_CONTEXT || self.version != BINDING_VERSION {
            return false;
        }

        let expected_x = format!("0x{}", hex::encode(expected_x25519_pub));
        let expected_ed = format!("0x{}", hex::encode(expected_ed_pub));
        if !eq_slices(self.x25519.as_bytes(), expected_x.as_bytes()) {
            return false;
        }
        if !eq_slices(self.ed25519.as_bytes(), expected_ed.as_bytes()) {
            return false;
        }

        if let Some(expected_chain) = expectations.chain_id {
            if self.chain_id != Some(expected_chain) {
                return false;
            }
        }
        if let Some(ref expected_rp) = expectations.rp_id {
            if self.rp_id.as_deref() != Some(expected_rp.as_str()) {
                return false;
            }
        }

        true
    }
}
