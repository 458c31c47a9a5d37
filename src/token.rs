//! `rpctoken` generation for the VMS API.
//!
//! A publication shared secret looks like `<token id>-<seed>`. The token sent
//! with every request is `<token id>-<code>`, where `<code>` is the hex
//! HMAC-SHA1 of the current 120 second time step keyed with the seed.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{ImporterError, Result};

/// Width of one token validity window.
pub const TOKEN_STEP_SECONDS: i64 = 120;

type HmacSha1 = Hmac<Sha1>;

/// Time step a token generated at `now` belongs to. Two instants produce the
/// same token iff they share a step.
pub fn step_counter(now: DateTime<Utc>) -> u64 {
    now.timestamp().div_euclid(TOKEN_STEP_SECONDS).max(0) as u64
}

pub fn generate_token(shared_secret: &str, now: DateTime<Utc>) -> Result<String> {
    let (token_id, seed) = split_shared_secret(shared_secret)?;
    let code = counter_code(seed, step_counter(now))?;
    Ok(format!("{token_id}-{code}"))
}

/// Splits on the first `-`. The seed itself may contain further dashes.
pub fn split_shared_secret(shared_secret: &str) -> Result<(&str, &str)> {
    match shared_secret.split_once('-') {
        Some((id, seed)) if !id.is_empty() && !seed.is_empty() => Ok((id, seed)),
        _ => Err(ImporterError::Configuration(
            "shared secret must have the form <token id>-<seed>".into(),
        )),
    }
}

fn counter_code(seed: &str, counter: u64) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(seed.as_bytes())
        .map_err(|err| ImporterError::Configuration(format!("invalid token seed: {err}")))?;
    mac.update(&counter.to_be_bytes());
    Ok(to_hex(&mac.finalize().into_bytes()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // RFC 4226 appendix D secret; the intermediate HMAC values are published there.
    const SECRET: &str = "42-12345678901234567890";

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    #[test]
    fn generate_token_matches_rfc4226_hmac() {
        assert_eq!(
            generate_token(SECRET, at(0)).unwrap(),
            "42-cc93cf18508d94934c64b65d8ba7667fb7cde4b0"
        );
        assert_eq!(
            generate_token(SECRET, at(TOKEN_STEP_SECONDS)).unwrap(),
            "42-75a48a19d4cbe100644e8ac1397eea747a2d33ab"
        );
    }

    #[test]
    fn tokens_are_stable_within_a_step() {
        let start = 1_700_000_040;
        assert_eq!(start % TOKEN_STEP_SECONDS, 0);
        let first = generate_token(SECRET, at(start)).unwrap();
        let last = generate_token(SECRET, at(start + TOKEN_STEP_SECONDS - 1)).unwrap();
        let next = generate_token(SECRET, at(start + TOKEN_STEP_SECONDS)).unwrap();
        assert_eq!(first, last);
        assert_ne!(first, next);
        assert_eq!(step_counter(at(start)) + 1, step_counter(at(start + 120)));
    }

    #[test]
    fn seed_may_contain_dashes() {
        let (id, seed) = split_shared_secret("7-ab-cd").unwrap();
        assert_eq!(id, "7");
        assert_eq!(seed, "ab-cd");
    }

    #[test]
    fn malformed_secret_is_a_configuration_error() {
        for secret in ["nodash", "-seed", "id-", ""] {
            let err = generate_token(secret, at(0)).unwrap_err();
            assert!(matches!(err, ImporterError::Configuration(_)), "{secret}");
        }
    }
}
