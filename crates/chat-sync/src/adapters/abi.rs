//! # ABI Codec
//!
//! The handful of Solidity ABI shapes the chat contracts use: static
//! `address` / `uint256` words, one dynamic `string`, and the
//! `MessagePosted` event.

use primitive_types::U256;
use sha3::{Digest, Keccak256};

use tracing::warn;

use crate::domain::{Address, ChatMessageEvent, SyncError, SyncResult, MAX_MESSAGE_CHARS};
use crate::ports::ContractCall;

/// `event MessagePosted(address indexed sender, string message, uint256 burnAmount, uint256 timestamp)`
pub const MESSAGE_POSTED_SIGNATURE: &str = "MessagePosted(address,string,uint256,uint256)";

const WORD: usize = 32;

/// Keccak-256 of `data`.
pub fn keccak(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// 4-byte function selector.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// `topic0` of `MessagePosted`.
pub fn message_posted_topic() -> [u8; 32] {
    keccak(MESSAGE_POSTED_SIGNATURE.as_bytes())
}

/// Left-pad an address into a topic / word.
pub fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn u256_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; WORD];
    value.to_big_endian(&mut word);
    word
}

fn signature(call: &ContractCall) -> &'static str {
    match call {
        ContractCall::BalanceOf { .. } => "balanceOf(address)",
        ContractCall::Allowance { .. } => "allowance(address,address)",
        ContractCall::Approve { .. } => "approve(address,uint256)",
        ContractCall::MessageCost => "messageCost()",
        ContractCall::TotalMessages => "totalMessages()",
        ContractCall::TotalBurned => "totalBurned()",
        ContractCall::PostMessage { .. } => "postMessage(string)",
    }
}

/// Calldata for `call`.
pub fn encode_call(call: &ContractCall) -> Vec<u8> {
    let mut out = selector(signature(call)).to_vec();
    match call {
        ContractCall::BalanceOf { owner } => out.extend_from_slice(&address_word(owner)),
        ContractCall::Allowance { owner, spender } => {
            out.extend_from_slice(&address_word(owner));
            out.extend_from_slice(&address_word(spender));
        }
        ContractCall::Approve { spender, amount } => {
            out.extend_from_slice(&address_word(spender));
            out.extend_from_slice(&u256_word(*amount));
        }
        ContractCall::MessageCost | ContractCall::TotalMessages | ContractCall::TotalBurned => {}
        ContractCall::PostMessage { body } => {
            // Single dynamic argument: head is the offset of its tail
            out.extend_from_slice(&u256_word(U256::from(WORD)));
            out.extend_from_slice(&encode_string_tail(body));
        }
    }
    out
}

fn encode_string_tail(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(WORD + padded);
    out.extend_from_slice(&u256_word(U256::from(bytes.len())));
    out.extend_from_slice(bytes);
    out.resize(WORD + padded, 0);
    out
}

fn word_at(data: &[u8], index: usize, what: &str) -> SyncResult<U256> {
    let start = index * WORD;
    data.get(start..start + WORD)
        .map(U256::from_big_endian)
        .ok_or_else(|| SyncError::decode(what, format!("missing word {index}")))
}

fn to_usize(value: U256, what: &str) -> SyncResult<usize> {
    if value > U256::from(usize::MAX) {
        return Err(SyncError::decode(what, "offset out of range"));
    }
    Ok(value.as_usize())
}

/// Decode a single `uint256` return value.
pub fn decode_u256(data: &[u8]) -> SyncResult<U256> {
    word_at(data, 0, "uint256 return")
}

fn decode_string_at(data: &[u8], offset: usize) -> SyncResult<String> {
    let len_end = offset
        .checked_add(WORD)
        .ok_or_else(|| SyncError::decode("string", "offset overflow"))?;
    let len = data
        .get(offset..len_end)
        .map(U256::from_big_endian)
        .ok_or_else(|| SyncError::decode("string", "missing length"))?;
    let len = to_usize(len, "string")?;
    let end = len_end
        .checked_add(len)
        .ok_or_else(|| SyncError::decode("string", "length overflow"))?;
    let bytes = data
        .get(len_end..end)
        .ok_or_else(|| SyncError::decode("string", "truncated data"))?;
    // Malformed UTF-8 from the contract becomes U+FFFD
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Cut `body` to the message limit.
fn clamp_body(body: String, block_number: u64, log_index: u32) -> String {
    let chars = body.chars().count();
    if chars <= MAX_MESSAGE_CHARS {
        return body;
    }
    warn!(
        block = block_number,
        log_index,
        chars,
        "[chat-sync] Over-length message body truncated"
    );
    body.chars().take(MAX_MESSAGE_CHARS).collect()
}

/// Decode a `MessagePosted` log.
pub fn decode_message_posted(
    block_number: u64,
    log_index: u32,
    topics: &[[u8; 32]],
    data: &[u8],
) -> SyncResult<ChatMessageEvent> {
    let topic0 = topics
        .first()
        .ok_or_else(|| SyncError::decode("MessagePosted", "no topics"))?;
    if *topic0 != message_posted_topic() {
        return Err(SyncError::decode("MessagePosted", "unexpected topic0"));
    }
    let sender_topic = topics
        .get(1)
        .ok_or_else(|| SyncError::decode("MessagePosted", "missing indexed sender"))?;
    let mut sender = [0u8; 20];
    sender.copy_from_slice(&sender_topic[12..]);

    let offset = to_usize(word_at(data, 0, "MessagePosted")?, "MessagePosted")?;
    let burn_amount = word_at(data, 1, "MessagePosted")?;
    let timestamp = word_at(data, 2, "MessagePosted")?;
    if timestamp > U256::from(u64::MAX) {
        return Err(SyncError::decode("MessagePosted", "timestamp out of range"));
    }

    Ok(ChatMessageEvent {
        block_number,
        log_index,
        sender: Address(sender),
        body: clamp_body(decode_string_at(data, offset)?, block_number, log_index),
        burn_amount,
        posted_at: timestamp.as_u64(),
    })
}

/// ABI data of a `MessagePosted` log.
pub fn encode_message_posted_data(body: &str, burn_amount: U256, timestamp: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&u256_word(U256::from(3 * WORD)));
    out.extend_from_slice(&u256_word(burn_amount));
    out.extend_from_slice(&u256_word(U256::from(timestamp)));
    out.extend_from_slice(&encode_string_tail(body));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
        assert_eq!(hex::encode(selector("approve(address,uint256)")), "095ea7b3");
        assert_eq!(hex::encode(selector("allowance(address,address)")), "dd62ed3e");
    }

    #[test]
    fn test_encode_approve() {
        let data = encode_call(&ContractCall::Approve {
            spender: Address([0xcc; 20]),
            amount: U256::from(100u64),
        });
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], &selector("approve(address,uint256)"));
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], &[0xcc; 20]);
        assert_eq!(data[67], 100);
    }

    #[test]
    fn test_encode_post_message() {
        let data = encode_call(&ContractCall::PostMessage {
            body: "gm".to_string(),
        });
        // selector, offset, length, one padded word
        assert_eq!(data.len(), 4 + 96);
        assert_eq!(data[35], 0x20);
        assert_eq!(data[67], 2);
        assert_eq!(&data[68..70], b"gm");
        assert!(data[70..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encode_no_args() {
        assert_eq!(encode_call(&ContractCall::MessageCost).len(), 4);
    }

    #[test]
    fn test_decode_message_posted() {
        let sender = Address([0xab; 20]);
        let body = "hello from a message long enough to span two words";
        let data = encode_message_posted_data(body, U256::from(1_000u64), 1_700_000_000);
        let topics = [message_posted_topic(), address_word(&sender)];

        let event = decode_message_posted(12, 3, &topics, &data).unwrap();
        assert_eq!(event.sender, sender);
        assert_eq!(event.body, body);
        assert_eq!(event.burn_amount, U256::from(1_000u64));
        assert_eq!(event.posted_at, 1_700_000_000);
        assert_eq!(event.key().block_number, 12);
    }

    #[test]
    fn test_decode_rejects_wrong_topic() {
        let data = encode_message_posted_data("x", U256::one(), 1);
        let topics = [[0u8; 32], address_word(&Address::ZERO)];
        assert!(decode_message_posted(1, 0, &topics, &data).is_err());
    }

    #[test]
    fn test_decode_rejects_truncated_string() {
        let mut data = encode_message_posted_data("hello", U256::one(), 1);
        data.truncate(4 * WORD + 2);
        let topics = [message_posted_topic(), address_word(&Address::ZERO)];
        assert!(matches!(
            decode_message_posted(1, 0, &topics, &data),
            Err(SyncError::Decode { .. })
        ));
    }

    #[test]
    fn test_decode_invalid_utf8_body_lossily() {
        let mut data = encode_message_posted_data("abc", U256::one(), 1);
        data[4 * WORD..4 * WORD + 3].copy_from_slice(&[0xff, 0xfe, 0x41]);
        let topics = [message_posted_topic(), address_word(&Address::ZERO)];

        let event = decode_message_posted(1, 0, &topics, &data).unwrap();
        assert_eq!(event.body, "\u{fffd}\u{fffd}A");
    }

    #[test]
    fn test_decode_truncates_over_length_body() {
        let long = "é".repeat(MAX_MESSAGE_CHARS + 20);
        let data = encode_message_posted_data(&long, U256::one(), 1);
        let topics = [message_posted_topic(), address_word(&Address::ZERO)];

        let event = decode_message_posted(1, 0, &topics, &data).unwrap();
        assert_eq!(event.body.chars().count(), MAX_MESSAGE_CHARS);
        assert!(event.body.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_decode_u256() {
        let word = u256_word(U256::from(42u64));
        assert_eq!(decode_u256(&word).unwrap(), U256::from(42u64));
        assert!(decode_u256(&[]).is_err());
    }
}
