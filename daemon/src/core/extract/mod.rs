mod contract;
mod ledger;
mod op;
mod state;
mod transfer;
mod tx;

pub use contract::{ContractCodeExtractor, ContractDataExtractor, ContractEventExtractor, TtlExtractor};
pub use ledger::LedgerExtractor;
pub use op::{EffectExtractor, OperationExtractor, TradeExtractor};
pub use state::{
    AccountExtractor, ClaimableBalanceExtractor, LiquidityPoolExtractor, OfferExtractor,
    TrustlineExtractor,
};
pub use transfer::TokenTransferExtractor;
pub use tx::TransactionExtractor;

use crate::core::error::PipelineError;
use log::warn;
use lumenlake_common::{
    ledger::{LedgerClose, LedgerSequence, RawLedger},
    network::Network,
    rows::{Row, RowKind, RowMeta},
};
use std::collections::HashMap;

// Deterministic inputs of extraction: nothing in here may come from a
// clock or from randomness. Rows produced from the same raw ledger and
// the same config are byte-identical.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub network: Network,
    pub passphrase: String,
    pub era_id: String,
    pub version_label: String,
    pub ledger_range_size: LedgerSequence,
}

impl ExtractConfig {
    pub fn new(
        network: Network,
        era_id: impl Into<String>,
        version_label: impl Into<String>,
        ledger_range_size: LedgerSequence,
    ) -> Self {
        Self {
            network,
            passphrase: network.passphrase().to_owned(),
            era_id: era_id.into(),
            version_label: version_label.into(),
            ledger_range_size,
        }
    }

    pub fn row_meta(&self, raw: &RawLedger) -> RowMeta {
        RowMeta {
            ledger_sequence: raw.sequence,
            closed_at: raw.close_time,
            ledger_range: (raw.sequence / self.ledger_range_size) * self.ledger_range_size,
            era_id: self.era_id.clone(),
            version_label: self.version_label.clone(),
        }
    }
}

// Everything an extractor sees for one ledger. The payload is decoded
// once by the registry and shared.
pub struct ExtractContext<'a> {
    pub raw: &'a RawLedger,
    pub close: &'a LedgerClose,
    pub config: &'a ExtractConfig,
}

impl ExtractContext<'_> {
    pub fn meta(&self) -> RowMeta {
        self.config.row_meta(self.raw)
    }
}

// A pure function from one decoded ledger to the rows of one dataset
pub trait Extractor: Send + Sync {
    fn kind(&self) -> RowKind;

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError>;
}

// Unset optional strings become NULL columns, never empty strings
pub(crate) fn normalize_opt(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[derive(Debug)]
pub struct ExtractOutput {
    pub tables: HashMap<RowKind, Vec<Row>>,
    pub decode_errors: usize,
}

impl ExtractOutput {
    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

// The set of enabled extractors, applied per raw ledger by the workers
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new(kinds: &[RowKind]) -> Self {
        let extractors = kinds.iter().map(|kind| build_extractor(*kind)).collect();
        Self { extractors }
    }

    pub fn kinds(&self) -> Vec<RowKind> {
        self.extractors.iter().map(|e| e.kind()).collect()
    }

    // Decode the payload once, then run every enabled extractor. A failing
    // extractor is logged and skipped; the successfully decoded subset is
    // returned. A ledger where nothing decodes is malformed.
    pub fn extract(
        &self,
        raw: &RawLedger,
        config: &ExtractConfig,
    ) -> Result<ExtractOutput, PipelineError> {
        let close = raw
            .decode()
            .map_err(|_| PipelineError::MalformedLedger(raw.sequence))?;
        let ctx = ExtractContext {
            raw,
            close: &close,
            config,
        };

        let mut tables = HashMap::with_capacity(self.extractors.len());
        let mut decode_errors = 0;

        for extractor in &self.extractors {
            match extractor.extract(&ctx) {
                Ok(rows) => {
                    tables.insert(extractor.kind(), rows);
                }
                Err(e) => {
                    decode_errors += 1;
                    metrics::counter!("lumenlake_decode_errors").increment(1);
                    warn!(
                        "extractor {} failed on ledger {}: {}",
                        extractor.kind(),
                        raw.sequence,
                        e
                    );
                }
            }
        }

        let output = ExtractOutput {
            tables,
            decode_errors,
        };
        if output.tables.is_empty() && decode_errors > 0 {
            return Err(PipelineError::MalformedLedger(raw.sequence));
        }
        Ok(output)
    }
}

fn build_extractor(kind: RowKind) -> Box<dyn Extractor> {
    match kind {
        RowKind::Ledgers => Box::new(LedgerExtractor),
        RowKind::Transactions => Box::new(TransactionExtractor),
        RowKind::Operations => Box::new(OperationExtractor),
        RowKind::Effects => Box::new(EffectExtractor),
        RowKind::Trades => Box::new(TradeExtractor),
        RowKind::ContractEvents => Box::new(ContractEventExtractor),
        RowKind::ContractData => Box::new(ContractDataExtractor),
        RowKind::ContractCode => Box::new(ContractCodeExtractor),
        RowKind::Accounts => Box::new(AccountExtractor),
        RowKind::Trustlines => Box::new(TrustlineExtractor),
        RowKind::Offers => Box::new(OfferExtractor),
        RowKind::ClaimableBalances => Box::new(ClaimableBalanceExtractor),
        RowKind::LiquidityPools => Box::new(LiquidityPoolExtractor),
        RowKind::TokenTransfers => Box::new(TokenTransferExtractor),
        RowKind::Ttl => Box::new(TtlExtractor),
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use lumenlake_common::{
        crypto::hash,
        ledger::{
            AccountEntry, Asset, ChangeKind, ContractEventKind, ContractEventRecord, EffectKind,
            EffectRecord, LedgerClose, LedgerEntry, Memo, MemoType, OpKind, OpRecord, StateChange,
            TradeRecord, TransferKind, TransferRecord, TrustlineEntry, TxEnvelope,
        },
    };

    pub fn config() -> ExtractConfig {
        ExtractConfig::new(Network::Testnet, "testnet-001", "v1", 10_000)
    }

    pub fn payment_op(amount: i64, destination: &str) -> OpRecord {
        OpRecord {
            kind: OpKind::Payment,
            source_account: None,
            destination: Some(destination.to_owned()),
            asset: Some(Asset::Native),
            amount: Some(amount),
            successful: true,
            effects: vec![
                EffectRecord {
                    kind: EffectKind::AccountDebited,
                    account: "GSRC".to_owned(),
                    asset: Some(Asset::Native),
                    amount: Some(amount),
                },
                EffectRecord {
                    kind: EffectKind::AccountCredited,
                    account: destination.to_owned(),
                    asset: Some(Asset::Native),
                    amount: Some(amount),
                },
            ],
            trades: Vec::new(),
            transfers: vec![TransferRecord {
                kind: TransferKind::Transfer,
                from: Some("GSRC".to_owned()),
                to: Some(destination.to_owned()),
                asset: Asset::Native,
                amount,
            }],
        }
    }

    pub fn offer_op() -> OpRecord {
        OpRecord {
            kind: OpKind::ManageSellOffer,
            source_account: Some("GMKT".to_owned()),
            destination: None,
            asset: Some(Asset::credit("USD", "GISS")),
            amount: Some(500),
            successful: true,
            effects: vec![EffectRecord {
                kind: EffectKind::Trade,
                account: "GMKT".to_owned(),
                asset: Some(Asset::credit("USD", "GISS")),
                amount: Some(500),
            }],
            trades: vec![TradeRecord {
                base_account: "GMKT".to_owned(),
                base_asset: Asset::Native,
                base_amount: 100,
                counter_account: "GTKR".to_owned(),
                counter_asset: Asset::credit("USD", "GISS"),
                counter_amount: 500,
                price_n: 5,
                price_d: 1,
            }],
            transfers: Vec::new(),
        }
    }

    pub fn sample_tx(suffix: &[u8]) -> TxEnvelope {
        TxEnvelope {
            tx_hash: hash(suffix),
            source_account: "GSRC".to_owned(),
            account_sequence: 100,
            max_fee: 200,
            fee_charged: 100,
            successful: true,
            memo: Some(Memo {
                memo_type: MemoType::Text,
                value: Some("memo".to_owned()),
            }),
            operations: vec![payment_op(1_000, "GDST"), offer_op()],
            events: vec![ContractEventRecord {
                contract_id: hash(b"contract"),
                kind: ContractEventKind::Contract,
                topics: vec!["\"transfer\"".to_owned()],
                data: "{\"amount\":7}".to_owned(),
                in_successful_call: true,
            }],
            changes: vec![
                StateChange {
                    order: 0,
                    kind: ChangeKind::Updated,
                    entry: LedgerEntry::Account(AccountEntry {
                        account_id: "GSRC".to_owned(),
                        balance: 9_000,
                        sequence: 101,
                        num_subentries: 1,
                        inflation_dest: None,
                        home_domain: Some("example.org".to_owned()),
                        flags: 0,
                    }),
                },
                StateChange {
                    order: 1,
                    kind: ChangeKind::Updated,
                    entry: LedgerEntry::Account(AccountEntry {
                        account_id: "GSRC".to_owned(),
                        balance: 8_500,
                        sequence: 101,
                        num_subentries: 1,
                        inflation_dest: None,
                        home_domain: Some("example.org".to_owned()),
                        flags: 0,
                    }),
                },
                StateChange {
                    order: 2,
                    kind: ChangeKind::Removed,
                    entry: LedgerEntry::Trustline(TrustlineEntry {
                        account_id: "GDST".to_owned(),
                        asset: Asset::credit("USD", "GISS"),
                        balance: 0,
                        limit: 10_000,
                        buying_liabilities: 0,
                        selling_liabilities: 0,
                        authorized: true,
                    }),
                },
            ],
        }
    }

    pub fn sample_raw(sequence: u32) -> RawLedger {
        let close = LedgerClose {
            ledger_hash: hash(&sequence.to_be_bytes()),
            previous_hash: hash(&sequence.wrapping_sub(1).to_be_bytes()),
            total_coins: 1_000_000_000,
            fee_pool: 5_000,
            base_fee: 100,
            base_reserve: 5_000_000,
            max_tx_set_size: 1_000,
            transactions: vec![sample_tx(&sequence.to_be_bytes())],
        };
        close.to_raw(sequence, 1_700_000_000_000_000 + sequence as u64, 21)
    }
}
