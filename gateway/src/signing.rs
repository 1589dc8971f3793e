//! Request-signing canonicalization and local HMAC verification: builds the
//! same canonical string on both signer and verifier sides, then compares
//! signatures in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Lex-sorts query parameters, then joins `key=value` pairs with `&`. Each
/// key's multiple values are sorted lexicographically among themselves before
/// the pairs are flattened.
pub fn canonical_query(pairs: &[(String, String)]) -> String {
    let mut grouped: std::collections::BTreeMap<&str, Vec<&str>> = std::collections::BTreeMap::new();
    for (k, v) in pairs {
        grouped.entry(k.as_str()).or_default().push(v.as_str());
    }
    let mut parts = Vec::new();
    for (k, mut values) in grouped {
        values.sort_unstable();
        for v in values {
            parts.push(format!("{k}={v}"));
        }
    }
    parts.join("&")
}

/// `timestamp \n nonce \n UPPER(method) \n path \n canonicalQuery`
pub fn canonical_string(timestamp_ms: i64, nonce: &str, method: &str, path: &str, canonical_query: &str) -> String {
    format!("{timestamp_ms}\n{nonce}\n{}\n{path}\n{canonical_query}", method.to_ascii_uppercase())
}

pub fn sign_hmac_sha256_hex(secret: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison against an attacker-supplied hex signature.
pub fn verify_signature(secret: &str, message: &str, signature_hex: &str) -> bool {
    let expected = sign_hmac_sha256_hex(secret, message);
    let expected_bytes = expected.as_bytes();
    let given_bytes = signature_hex.as_bytes();
    expected_bytes.len() == given_bytes.len() && expected_bytes.ct_eq(given_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_query_is_lex_sorted_regardless_of_input_order() {
        let a = canonical_query(&[("b".into(), "2".into()), ("a".into(), "1".into())]);
        let b = canonical_query(&[("a".into(), "1".into()), ("b".into(), "2".into())]);
        assert_eq!(a, b);
        assert_eq!(a, "a=1&b=2");
    }

    #[test]
    fn canonical_query_sorts_multi_valued_keys() {
        let q = canonical_query(&[("a".into(), "2".into()), ("a".into(), "1".into())]);
        assert_eq!(q, "a=1&a=2");
    }

    #[test]
    fn signature_is_deterministic_and_verifiable() {
        let secret = "s3cr3t";
        let msg = canonical_string(1_700_000_000_000, "nonce1", "get", "/v1/order", "symbol=BTC_USDT");
        let sig = sign_hmac_sha256_hex(secret, &msg);
        assert!(verify_signature(secret, &msg, &sig));
        assert!(!verify_signature(secret, &msg, "deadbeef"));
    }

    #[test]
    fn method_is_uppercased_in_canonical_string() {
        let msg = canonical_string(1, "n", "get", "/p", "");
        assert!(msg.contains("\nGET\n"));
    }
}
