//! Minimal ABI helpers: event-topic constants, 32-byte word decoding, and
//! the claim-call argument decoder.
//!
//! The contract surface is three events plus one call argument, so a full
//! ABI library is not pulled in; everything here is fixed-layout word
//! slicing.

use sha3::{Digest, Keccak256};

/// Keccak-256 of a canonical signature, hex with `0x` prefix.
pub fn event_topic(signature: &str) -> String {
    let digest = Keccak256::digest(signature.as_bytes());
    format!("0x{}", hex::encode(digest))
}

/// First four bytes of the signature hash, hex with `0x` prefix.
pub fn selector(signature: &str) -> String {
    let digest = Keccak256::digest(signature.as_bytes());
    format!("0x{}", hex::encode(&digest[..4]))
}

/// topic0 values for the contract's event surface.
#[derive(Debug, Clone)]
pub struct EventTopics {
    pub claimed: String,
    pub referral_reward: String,
    pub cooldown_reset: String,
    pub transfer: String,
}

impl EventTopics {
    pub fn standard() -> Self {
        Self {
            claimed: event_topic("Claimed(address,uint256)"),
            referral_reward: event_topic("ReferralReward(address,uint256)"),
            cooldown_reset: event_topic("CooldownReset(address)"),
            transfer: event_topic("Transfer(address,address,uint256)"),
        }
    }

    /// The three claim-contract topics, for the scanner's log filter.
    pub fn scan_topics(&self) -> Vec<String> {
        vec![
            self.claimed.clone(),
            self.referral_reward.clone(),
            self.cooldown_reset.clone(),
        ]
    }
}

/// The address packed into a 32-byte topic or word (last 20 bytes),
/// lowercase `0x`-prefixed.
pub fn word_address(word: &str) -> String {
    let s = word.strip_prefix("0x").unwrap_or(word);
    let start = s.len().saturating_sub(40);
    format!("0x{}", s[start..].to_ascii_lowercase())
}

/// Split ABI-encoded data into 64-hex-char words.
pub fn data_words(data: &str) -> Vec<String> {
    let s = data.strip_prefix("0x").unwrap_or(data);
    s.as_bytes()
        .chunks(64)
        .map(|c| String::from_utf8_lossy(c).to_string())
        .collect()
}

/// Decode a uint256 word as u128. Honest claim and transfer amounts stay
/// far below 2^128 wei; a value above that saturates to `u128::MAX` so it
/// fails amount comparisons instead of decoding to an arbitrary remainder.
pub fn word_u128(word: &str) -> u128 {
    let s = word.strip_prefix("0x").unwrap_or(word);
    if s.len() > 32 {
        let (high, low) = s.split_at(s.len() - 32);
        if high.bytes().any(|b| b != b'0') {
            return u128::MAX;
        }
        return u128::from_str_radix(low, 16).unwrap_or(0);
    }
    u128::from_str_radix(s, 16).unwrap_or(0)
}

/// Zero address check against any word width.
pub fn is_zero_address(addr: &str) -> bool {
    addr.strip_prefix("0x")
        .unwrap_or(addr)
        .chars()
        .all(|c| c == '0')
}

/// Decode the referrer argument of a `claim(address)` call. Returns `None`
/// for other selectors, truncated input, or a zero referrer.
pub fn claim_call_referrer(input: &str) -> Option<String> {
    let claim_selector = selector("claim(address)");
    let s = input.strip_prefix("0x").unwrap_or(input);
    let sel = claim_selector.strip_prefix("0x").unwrap_or(&claim_selector);
    if !s.to_ascii_lowercase().starts_with(sel) || s.len() < 8 + 64 {
        return None;
    }
    let arg = &s[8..8 + 64];
    let addr = word_address(arg);
    if is_zero_address(&addr) {
        None
    } else {
        Some(addr)
    }
}

/// ABI-encode a `balanceOf(address)` call.
pub fn balance_of_call(address: &str) -> String {
    let sel = selector("balanceOf(address)");
    let addr = address.strip_prefix("0x").unwrap_or(address);
    format!("{sel}{:0>64}", addr.to_ascii_lowercase())
}

/// Convert a wei amount to display units.
pub fn wei_to_tokens(wei: u128, decimals: u32) -> f64 {
    wei as f64 / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_topic_matches_known_hash() {
        // canonical ERC-20 Transfer topic0
        assert_eq!(
            event_topic("Transfer(address,address,uint256)"),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn topic_address_extraction() {
        let topic = "0x000000000000000000000000a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0";
        assert_eq!(
            word_address(topic),
            "0xa1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0"
        );
    }

    #[test]
    fn amount_word_decoding() {
        let word = "0x0000000000000000000000000000000000000000000000004563918244f40000";
        assert_eq!(word_u128(word), 5_000_000_000_000_000_000);
        assert_eq!(wei_to_tokens(word_u128(word), 18), 5.0);
    }

    #[test]
    fn oversized_amount_saturates() {
        // 2^128, one above the representable range
        let word = "0x0000000000000000000000000000000100000000000000000000000000000000";
        assert_eq!(word_u128(word), u128::MAX);

        let max = format!("0x{}{}", "0".repeat(32), "f".repeat(32));
        assert_eq!(word_u128(&max), u128::MAX);
    }

    #[test]
    fn claim_referrer_decoding() {
        let referrer = "00000000000000000000000011223344556677889900aabbccddeeff00112233";
        let sel = selector("claim(address)");
        let input = format!("{sel}{referrer}");
        assert_eq!(
            claim_call_referrer(&input).as_deref(),
            Some("0x11223344556677889900aabbccddeeff00112233")
        );
    }

    #[test]
    fn claim_referrer_zero_is_none() {
        let sel = selector("claim(address)");
        let input = format!("{sel}{}", "0".repeat(64));
        assert_eq!(claim_call_referrer(&input), None);
    }

    #[test]
    fn claim_referrer_wrong_selector_is_none() {
        let input = format!("0xdeadbeef{}", "1".repeat(64));
        assert_eq!(claim_call_referrer(&input), None);
    }

    #[test]
    fn balance_of_encoding() {
        let data = balance_of_call("0x11223344556677889900aabbccddeeff00112233");
        assert!(data.starts_with(&selector("balanceOf(address)")));
        assert_eq!(data.len(), 10 + 64);
        assert!(data.ends_with("11223344556677889900aabbccddeeff00112233"));
    }
}
