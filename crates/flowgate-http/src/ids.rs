// flowgate-http/src/ids.rs
// ============================================================================
// Module: Session Id Generation
// Description: Cryptographically random session id issuance for `init`.
// Purpose: The HTTP layer is the only place a fresh SessionId is minted;
//          every other caller (submit/state/cancel) echoes one back.
// Dependencies: rand
// ============================================================================

use rand::rngs::OsRng;
use rand::RngCore;

use flowgate_core::core::identifiers::SessionId;

/// Generates a fresh, unguessable session id of the form `flow_{32 hex chars}`.
#[must_use]
pub fn generate_session_id() -> SessionId {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let mut hex = String::with_capacity(37);
    hex.push_str("flow_");
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
    }
    SessionId::from(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_the_expected_prefix_and_length() {
        let id = generate_session_id();
        assert!(id.as_str().starts_with("flow_"));
        assert_eq!(id.as_str().len(), 5 + 32);
    }

    #[test]
    fn generated_ids_are_not_trivially_repeated() {
        let first = generate_session_id();
        let second = generate_session_id();
        assert_ne!(first.as_str(), second.as_str());
    }
}
