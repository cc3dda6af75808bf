//! Role-claim extraction from compact bearer tokens.
//!
//! Tokens are JWT-shaped: dot-separated segments with a base64-encoded JSON
//! payload in the middle. Only the `role` claim is read here; anything that
//! fails to decode yields no role, and callers treat "no role" as a denied
//! permission check.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};

use permsync_core::Role;

const BEARER_PREFIX: &str = "Bearer ";

/// Strip an optional `Bearer ` prefix from an Authorization-style value.
pub fn strip_bearer(token: &str) -> &str {
    token.strip_prefix(BEARER_PREFIX).unwrap_or(token)
}

/// Extract the `role` claim from a compact token.
///
/// Returns `None` for anything that is not a decodable token with a string
/// `role` claim: too few segments, invalid base64, invalid JSON, or a
/// missing/non-string claim.
pub fn role_from_token(token: &str) -> Option<Role> {
    let token = strip_bearer(token);

    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload_b64 = segments.next()?;

    let payload = decode_segment(payload_b64)?;
    let claims: serde_json::Value = serde_json::from_slice(&payload).ok()?;

    let role = claims.get("role")?.as_str()?;
    if role.is_empty() {
        return None;
    }

    Some(Role::new(role))
}

/// Tokens in the wild carry both base64url (JWT compact form) and standard
/// base64 payloads; accept either, unpadded or padded.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint_token(claims: serde_json::Value) -> String {
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("header.{payload}.signature")
    }

    #[test]
    fn extracts_role_claim() {
        let token = mint_token(serde_json::json!({"sub": "u1", "role": "admin"}));
        assert_eq!(role_from_token(&token), Some(Role::new("ADMIN")));
    }

    #[test]
    fn strips_bearer_prefix() {
        let token = mint_token(serde_json::json!({"role": "editor"}));
        let bearer = format!("Bearer {token}");
        assert_eq!(role_from_token(&bearer), Some(Role::new("EDITOR")));
    }

    #[test]
    fn missing_claim_yields_no_role() {
        let token = mint_token(serde_json::json!({"sub": "u1"}));
        assert_eq!(role_from_token(&token), None);
    }

    #[test]
    fn non_string_claim_yields_no_role() {
        let token = mint_token(serde_json::json!({"role": 42}));
        assert_eq!(role_from_token(&token), None);
    }

    #[test]
    fn malformed_tokens_yield_no_role() {
        assert_eq!(role_from_token(""), None);
        assert_eq!(role_from_token("no-segments"), None);
        assert_eq!(role_from_token("header.!!!not-base64!!!.sig"), None);
        assert_eq!(role_from_token("header.bm90LWpzb24.sig"), None);
    }

    #[test]
    fn accepts_padded_standard_base64_payloads() {
        let payload =
            base64::engine::general_purpose::STANDARD.encode(r#"{"role":"viewer"}"#);
        let token = format!("header.{payload}.sig");
        assert_eq!(role_from_token(&token), Some(Role::new("VIEWER")));
    }
}
