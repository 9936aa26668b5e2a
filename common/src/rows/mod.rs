mod schema;
mod types;

pub use schema::{Column, ColumnType, SchemaDef, Value, CARRIER_COLUMNS};
pub use types::*;

use crate::{
    crypto::Hash,
    dataset::{Grain, Tier},
    ledger::LedgerSequence,
    time::TimestampMicros,
};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

// One variant per dataset the pipeline emits
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Ledgers,
    Transactions,
    Operations,
    Effects,
    Trades,
    ContractEvents,
    ContractData,
    ContractCode,
    Accounts,
    Trustlines,
    Offers,
    ClaimableBalances,
    LiquidityPools,
    TokenTransfers,
    Ttl,
}

impl RowKind {
    pub fn all() -> Vec<RowKind> {
        RowKind::iter().collect()
    }

    // Dataset name as used in storage paths and the catalog
    pub fn dataset_name(&self) -> String {
        self.to_string()
    }

    pub const fn grain(&self) -> Grain {
        match self {
            RowKind::Ledgers
            | RowKind::Transactions
            | RowKind::Operations
            | RowKind::Effects
            | RowKind::Trades
            | RowKind::ContractEvents
            | RowKind::TokenTransfers => Grain::Event,
            RowKind::ContractData
            | RowKind::ContractCode
            | RowKind::Accounts
            | RowKind::Trustlines
            | RowKind::Offers
            | RowKind::ClaimableBalances
            | RowKind::LiquidityPools
            | RowKind::Ttl => Grain::Snapshot,
        }
    }

    // Derived datasets land in silver, raw extractions in bronze
    pub const fn tier(&self) -> Tier {
        match self {
            RowKind::Trades | RowKind::TokenTransfers => Tier::Silver,
            _ => Tier::Bronze,
        }
    }

    fn specific_columns(&self) -> &'static [Column] {
        match self {
            RowKind::Ledgers => LedgerRow::COLUMNS,
            RowKind::Transactions => TransactionRow::COLUMNS,
            RowKind::Operations => OperationRow::COLUMNS,
            RowKind::Effects => EffectRow::COLUMNS,
            RowKind::Trades => TradeRow::COLUMNS,
            RowKind::ContractEvents => ContractEventRow::COLUMNS,
            RowKind::ContractData => ContractDataRow::COLUMNS,
            RowKind::ContractCode => ContractCodeRow::COLUMNS,
            RowKind::Accounts => AccountRow::COLUMNS,
            RowKind::Trustlines => TrustlineRow::COLUMNS,
            RowKind::Offers => OfferRow::COLUMNS,
            RowKind::ClaimableBalances => ClaimableBalanceRow::COLUMNS,
            RowKind::LiquidityPools => LiquidityPoolRow::COLUMNS,
            RowKind::TokenTransfers => TokenTransferRow::COLUMNS,
            RowKind::Ttl => TtlRow::COLUMNS,
        }
    }

    const fn static_dataset_name(&self) -> &'static str {
        match self {
            RowKind::Ledgers => "ledgers",
            RowKind::Transactions => "transactions",
            RowKind::Operations => "operations",
            RowKind::Effects => "effects",
            RowKind::Trades => "trades",
            RowKind::ContractEvents => "contract_events",
            RowKind::ContractData => "contract_data",
            RowKind::ContractCode => "contract_code",
            RowKind::Accounts => "accounts",
            RowKind::Trustlines => "trustlines",
            RowKind::Offers => "offers",
            RowKind::ClaimableBalances => "claimable_balances",
            RowKind::LiquidityPools => "liquidity_pools",
            RowKind::TokenTransfers => "token_transfers",
            RowKind::Ttl => "ttl",
        }
    }

    pub fn schema(&self) -> &'static SchemaDef {
        &SCHEMAS[self]
    }

    pub fn schema_hash(&self) -> Hash {
        self.schema().schema_hash()
    }
}

lazy_static! {
    static ref SCHEMAS: HashMap<RowKind, SchemaDef> = RowKind::iter()
        .map(|kind| {
            (
                kind,
                SchemaDef::new(kind.static_dataset_name(), kind.specific_columns()),
            )
        })
        .collect();
}

// Carrier fields stamped on every row by the extraction stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMeta {
    pub ledger_sequence: LedgerSequence,
    pub closed_at: TimestampMicros,
    pub ledger_range: LedgerSequence,
    pub era_id: String,
    pub version_label: String,
}

impl RowMeta {
    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::U32(self.ledger_sequence),
            Value::Timestamp(self.closed_at),
            Value::U32(self.ledger_range),
            Value::Str(self.era_id.clone()),
            Value::Str(self.version_label.clone()),
        ]
    }
}

// A typed row of exactly one dataset. Tagged variants rather than trait
// objects so rows can cross channels and land in sled without boxing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Row {
    Ledger(RowMeta, LedgerRow),
    Transaction(RowMeta, TransactionRow),
    Operation(RowMeta, OperationRow),
    Effect(RowMeta, EffectRow),
    Trade(RowMeta, TradeRow),
    ContractEvent(RowMeta, ContractEventRow),
    ContractData(RowMeta, ContractDataRow),
    ContractCode(RowMeta, ContractCodeRow),
    Account(RowMeta, AccountRow),
    Trustline(RowMeta, TrustlineRow),
    Offer(RowMeta, OfferRow),
    ClaimableBalance(RowMeta, ClaimableBalanceRow),
    LiquidityPool(RowMeta, LiquidityPoolRow),
    TokenTransfer(RowMeta, TokenTransferRow),
    Ttl(RowMeta, TtlRow),
}

impl Row {
    pub fn kind(&self) -> RowKind {
        match self {
            Row::Ledger(..) => RowKind::Ledgers,
            Row::Transaction(..) => RowKind::Transactions,
            Row::Operation(..) => RowKind::Operations,
            Row::Effect(..) => RowKind::Effects,
            Row::Trade(..) => RowKind::Trades,
            Row::ContractEvent(..) => RowKind::ContractEvents,
            Row::ContractData(..) => RowKind::ContractData,
            Row::ContractCode(..) => RowKind::ContractCode,
            Row::Account(..) => RowKind::Accounts,
            Row::Trustline(..) => RowKind::Trustlines,
            Row::Offer(..) => RowKind::Offers,
            Row::ClaimableBalance(..) => RowKind::ClaimableBalances,
            Row::LiquidityPool(..) => RowKind::LiquidityPools,
            Row::TokenTransfer(..) => RowKind::TokenTransfers,
            Row::Ttl(..) => RowKind::Ttl,
        }
    }

    pub fn meta(&self) -> &RowMeta {
        match self {
            Row::Ledger(meta, _)
            | Row::Transaction(meta, _)
            | Row::Operation(meta, _)
            | Row::Effect(meta, _)
            | Row::Trade(meta, _)
            | Row::ContractEvent(meta, _)
            | Row::ContractData(meta, _)
            | Row::ContractCode(meta, _)
            | Row::Account(meta, _)
            | Row::Trustline(meta, _)
            | Row::Offer(meta, _)
            | Row::ClaimableBalance(meta, _)
            | Row::LiquidityPool(meta, _)
            | Row::TokenTransfer(meta, _)
            | Row::Ttl(meta, _) => meta,
        }
    }

    pub fn ledger_sequence(&self) -> LedgerSequence {
        self.meta().ledger_sequence
    }

    // Natural key for event rows, entity id for snapshot rows. Unique per
    // (dataset, ledger) in either case; snapshot keys combine with the
    // ledger sequence to form the full snapshot identity.
    pub fn key(&self) -> String {
        match self {
            Row::Ledger(meta, _) => meta.ledger_sequence.to_string(),
            Row::Transaction(_, row) => row.tx_hash.to_hex(),
            Row::Operation(_, row) => format!("{}:{}", row.tx_hash, row.op_index),
            Row::Effect(_, row) => {
                format!("{}:{}:{}", row.tx_hash, row.op_index, row.effect_index)
            }
            Row::Trade(_, row) => format!("{}:{}:{}", row.tx_hash, row.op_index, row.trade_index),
            Row::ContractEvent(_, row) => format!("{}:{}", row.tx_hash, row.event_index),
            Row::ContractData(_, row) => format!("{}|{}", row.contract_id, row.key_hash),
            Row::ContractCode(_, row) => row.code_hash.to_hex(),
            Row::Account(_, row) => row.account_id.clone(),
            Row::Trustline(_, row) => format!("{}|{}", row.account_id, row.asset),
            Row::Offer(_, row) => row.offer_id.to_string(),
            Row::ClaimableBalance(_, row) => row.balance_id.to_hex(),
            Row::LiquidityPool(_, row) => row.pool_id.to_hex(),
            Row::TokenTransfer(_, row) => {
                format!("{}:{}:{}", row.tx_hash, row.op_index, row.transfer_index)
            }
            Row::Ttl(_, row) => row.key_hash.to_hex(),
        }
    }

    // All cell values, carrier columns first, aligned with the schema
    pub fn values(&self) -> Vec<Value> {
        let (meta, mut specific) = match self {
            Row::Ledger(meta, row) => (meta, row.values()),
            Row::Transaction(meta, row) => (meta, row.values()),
            Row::Operation(meta, row) => (meta, row.values()),
            Row::Effect(meta, row) => (meta, row.values()),
            Row::Trade(meta, row) => (meta, row.values()),
            Row::ContractEvent(meta, row) => (meta, row.values()),
            Row::ContractData(meta, row) => (meta, row.values()),
            Row::ContractCode(meta, row) => (meta, row.values()),
            Row::Account(meta, row) => (meta, row.values()),
            Row::Trustline(meta, row) => (meta, row.values()),
            Row::Offer(meta, row) => (meta, row.values()),
            Row::ClaimableBalance(meta, row) => (meta, row.values()),
            Row::LiquidityPool(meta, row) => (meta, row.values()),
            Row::TokenTransfer(meta, row) => (meta, row.values()),
            Row::Ttl(meta, row) => (meta, row.values()),
        };

        let mut values = meta.values();
        values.append(&mut specific);
        values
    }
}
