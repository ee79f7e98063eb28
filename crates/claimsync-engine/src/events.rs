//! Log decoding for the claim contract's three event types.

use claimsync_chain::abi::{self, EventTopics};
use claimsync_chain::RawLog;

/// Position of a decoded event in the chain.
#[derive(Debug, Clone)]
pub struct LogMeta {
    pub tx_hash: String,
    pub block_number: u64,
}

/// A decoded claim-contract event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractEvent {
    Claimed { user: String, amount_wei: u128 },
    ReferralReward { referrer: String, amount_wei: u128 },
    CooldownReset { referrer: String },
}

impl ContractEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Claimed { .. } => "Claimed",
            Self::ReferralReward { .. } => "ReferralReward",
            Self::CooldownReset { .. } => "CooldownReset",
        }
    }
}

/// Decodes raw logs emitted by the configured contract.
pub struct EventDecoder {
    topics: EventTopics,
    contract: String,
}

impl EventDecoder {
    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            topics: EventTopics::standard(),
            contract: contract.into(),
        }
    }

    pub fn topics(&self) -> &EventTopics {
        &self.topics
    }

    /// Decode one log. Returns `None` for logs from other contracts,
    /// removed logs, or unrecognized event signatures.
    pub fn decode(&self, log: &RawLog) -> Option<(ContractEvent, LogMeta)> {
        if log.is_removed() || !log.address.eq_ignore_ascii_case(&self.contract) {
            return None;
        }
        let topic0 = log.topics.first()?;

        let event = if topic0.eq_ignore_ascii_case(&self.topics.claimed) {
            ContractEvent::Claimed {
                user: abi::word_address(log.topics.get(1)?),
                amount_wei: abi::word_u128(abi::data_words(&log.data).first()?),
            }
        } else if topic0.eq_ignore_ascii_case(&self.topics.referral_reward) {
            ContractEvent::ReferralReward {
                referrer: abi::word_address(log.topics.get(1)?),
                amount_wei: abi::word_u128(abi::data_words(&log.data).first()?),
            }
        } else if topic0.eq_ignore_ascii_case(&self.topics.cooldown_reset) {
            ContractEvent::CooldownReset {
                referrer: abi::word_address(log.topics.get(1)?),
            }
        } else {
            return None;
        };

        let meta = LogMeta {
            tx_hash: log.tx_hash.clone()?,
            block_number: log.block_number_u64(),
        };
        Some((event, meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0xc0ffee254729296a45a3885639ac7e10f9d54979";
    const USER: &str = "0x11223344556677889900aabbccddeeff00112233";

    fn log(topic0: &str, subject: &str, data: &str) -> RawLog {
        serde_json::from_value(serde_json::json!({
            "address": CONTRACT,
            "topics": [
                topic0,
                format!("0x{:0>64}", subject.trim_start_matches("0x")),
            ],
            "data": data,
            "blockNumber": "0x3b6",
            "transactionHash": "0xfeed",
            "logIndex": "0x0",
        }))
        .unwrap()
    }

    #[test]
    fn decodes_claimed() {
        let decoder = EventDecoder::new(CONTRACT);
        let amount = "0x0000000000000000000000000000000000000000000000004563918244f40000";
        let (event, meta) = decoder
            .decode(&log(&decoder.topics().claimed.clone(), USER, amount))
            .unwrap();
        assert_eq!(
            event,
            ContractEvent::Claimed {
                user: USER.into(),
                amount_wei: 5_000_000_000_000_000_000,
            }
        );
        assert_eq!(meta.block_number, 950);
        assert_eq!(meta.tx_hash, "0xfeed");
    }

    #[test]
    fn decodes_cooldown_reset() {
        let decoder = EventDecoder::new(CONTRACT);
        let (event, _) = decoder
            .decode(&log(&decoder.topics().cooldown_reset.clone(), USER, "0x"))
            .unwrap();
        assert_eq!(event, ContractEvent::CooldownReset { referrer: USER.into() });
        assert_eq!(event.kind(), "CooldownReset");
    }

    #[test]
    fn foreign_contract_ignored() {
        let decoder = EventDecoder::new("0x0000000000000000000000000000000000000001");
        let topic = decoder.topics().claimed.clone();
        assert!(decoder.decode(&log(&topic, USER, "0x0")).is_none());
    }

    #[test]
    fn unknown_signature_ignored() {
        let decoder = EventDecoder::new(CONTRACT);
        assert!(decoder
            .decode(&log(&decoder.topics().transfer.clone(), USER, "0x0"))
            .is_none());
    }
}
