//! # Domain Invariants
//!
//! Business rules that must always hold true.

use super::errors::ActionError;
use super::value_objects::Timestamp;

/// Maximum message length in Unicode code points, after trimming.
pub const MAX_MESSAGE_CHARS: usize = 280;

/// Largest token decimals whose unit `10^decimals` fits in a `uint256`.
pub const MAX_TOKEN_DECIMALS: u8 = 77;

/// Default fast poll (balance/allowance) interval.
pub const DEFAULT_BALANCE_POLL_MS: u64 = 5_000;

/// Default price poll interval.
pub const DEFAULT_PRICE_POLL_MS: u64 = 60_000;

/// Default delay before reconciling balances after a successful post.
pub const DEFAULT_POST_REFRESH_DELAY_MS: u64 = 3_000;

/// Default consecutive recovery failures before the feed is unavailable.
pub const DEFAULT_FEED_FAILURE_THRESHOLD: u32 = 3;

/// Invariant: a message body is 1-280 code points after trimming.
///
/// Returns the trimmed body.
pub fn validate_message_body(raw: &str) -> Result<String, ActionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ActionError::EmptyMessage);
    }

    let len = trimmed.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(ActionError::MessageTooLong {
            len,
            max: MAX_MESSAGE_CHARS,
        });
    }

    Ok(trimmed.to_string())
}

/// Invariant: snapshots are last-writer-wins by issue time.
///
/// A reading issued at `candidate` replaces one issued at `current` unless it
/// was issued strictly earlier.
pub fn invariant_fresher(candidate: Timestamp, current: Option<Timestamp>) -> bool {
    match current {
        Some(held) => candidate >= held,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_trims_whitespace() {
        assert_eq!(validate_message_body("  gm  \n").unwrap(), "gm");
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert_eq!(validate_message_body(""), Err(ActionError::EmptyMessage));
        assert_eq!(validate_message_body(" \t\n "), Err(ActionError::EmptyMessage));
    }

    #[test]
    fn test_validate_length_boundary() {
        let exact = "a".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_message_body(&exact).is_ok());

        let over = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(
            validate_message_body(&over),
            Err(ActionError::MessageTooLong { len: 281, max: 280 })
        );
    }

    #[test]
    fn test_validate_counts_code_points_not_bytes() {
        // 280 four-byte code points is 1120 bytes but still valid.
        let emoji = "🔥".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_message_body(&emoji).is_ok());
    }

    #[test]
    fn test_validate_surrounding_whitespace_not_counted() {
        let padded = format!("   {}   ", "b".repeat(MAX_MESSAGE_CHARS));
        assert!(validate_message_body(&padded).is_ok());
    }

    #[test]
    fn test_fresher_rule() {
        assert!(invariant_fresher(10, None));
        assert!(invariant_fresher(10, Some(10)));
        assert!(invariant_fresher(11, Some(10)));
        assert!(!invariant_fresher(9, Some(10)));
    }
}
