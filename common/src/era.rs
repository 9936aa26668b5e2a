use crate::{
    crypto::Hash,
    ledger::{LedgerSequence, ProtocolVersion},
    network::Network,
    time::TimestampMicros,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EraStatus {
    Active,
    Frozen,
}

// A contiguous range of ledgers covered by one schema version of the
// datasets. At most one active era per network; `ledger_end` is None
// exactly while the era is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Era {
    pub era_id: String,
    pub network: Network,
    pub version_label: String,
    pub ledger_start: LedgerSequence,
    pub ledger_end: Option<LedgerSequence>,
    pub protocol_min: Option<ProtocolVersion>,
    pub protocol_max: Option<ProtocolVersion>,
    pub status: EraStatus,
    pub schema_epoch: u32,
    pub pas_chain_head: Option<Hash>,
    pub created_at: TimestampMicros,
    pub frozen_at: Option<TimestampMicros>,
}

impl Era {
    pub fn is_active(&self) -> bool {
        matches!(self.status, EraStatus::Active)
    }

    // Whether the given ledger falls into [ledger_start, ledger_end]
    // with an open upper bound while the era is active
    pub fn covers_ledger(&self, ledger: LedgerSequence) -> bool {
        if ledger < self.ledger_start {
            return false;
        }
        match self.ledger_end {
            Some(end) => ledger <= end,
            None => true,
        }
    }

    pub fn covers_protocol(&self, protocol: ProtocolVersion) -> bool {
        if let Some(min) = self.protocol_min {
            if protocol < min {
                return false;
            }
        }
        match self.protocol_max {
            Some(max) => protocol <= max,
            None => self.protocol_min.is_some(),
        }
    }

    // Freeze the era at the given boundary; idempotent on re-freeze
    pub fn freeze(&mut self, ledger_end: LedgerSequence, at: TimestampMicros) {
        self.ledger_end = Some(ledger_end);
        self.status = EraStatus::Frozen;
        self.frozen_at.get_or_insert(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn era(start: u32, end: Option<u32>) -> Era {
        Era {
            era_id: "mainnet-1".to_owned(),
            network: Network::Mainnet,
            version_label: "v1".to_owned(),
            ledger_start: start,
            ledger_end: end,
            protocol_min: Some(20),
            protocol_max: end.map(|_| 21),
            status: if end.is_some() {
                EraStatus::Frozen
            } else {
                EraStatus::Active
            },
            schema_epoch: 1,
            pas_chain_head: None,
            created_at: 0,
            frozen_at: None,
        }
    }

    #[test]
    fn test_covers_ledger_open_ended() {
        let active = era(100, None);
        assert!(!active.covers_ledger(99));
        assert!(active.covers_ledger(100));
        assert!(active.covers_ledger(u32::MAX));
    }

    #[test]
    fn test_covers_ledger_bounded() {
        let frozen = era(1, Some(99));
        assert!(frozen.covers_ledger(1));
        assert!(frozen.covers_ledger(99));
        assert!(!frozen.covers_ledger(100));
    }

    #[test]
    fn test_covers_protocol() {
        let frozen = era(1, Some(99));
        assert!(frozen.covers_protocol(20));
        assert!(frozen.covers_protocol(21));
        assert!(!frozen.covers_protocol(22));

        let active = era(100, None);
        assert!(active.covers_protocol(25));
        assert!(!active.covers_protocol(19));
    }

    #[test]
    fn test_freeze_is_idempotent() {
        let mut e = era(1, None);
        e.freeze(50, 1000);
        e.freeze(50, 2000);
        assert_eq!(e.frozen_at, Some(1000));
        assert_eq!(e.ledger_end, Some(50));
        assert_eq!(e.status, EraStatus::Frozen);
    }
}
