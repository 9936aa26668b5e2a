use super::schema::{Column, ColumnType, Value};
use crate::crypto::Hash;
use serde::{Deserialize, Serialize};

// One row per closed ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub ledger_hash: Hash,
    pub previous_hash: Hash,
    pub protocol_version: u16,
    pub transaction_count: u32,
    pub operation_count: u32,
    pub successful_tx_count: u32,
    pub failed_tx_count: u32,
    pub total_coins: u64,
    pub fee_pool: u64,
    pub base_fee: u32,
    pub base_reserve: u32,
    pub max_tx_set_size: u32,
}

impl LedgerRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("ledger_hash", ColumnType::Hash32),
        Column::new("previous_hash", ColumnType::Hash32),
        Column::new("protocol_version", ColumnType::U16),
        Column::new("transaction_count", ColumnType::U32),
        Column::new("operation_count", ColumnType::U32),
        Column::new("successful_tx_count", ColumnType::U32),
        Column::new("failed_tx_count", ColumnType::U32),
        Column::new("total_coins", ColumnType::U64),
        Column::new("fee_pool", ColumnType::U64),
        Column::new("base_fee", ColumnType::U32),
        Column::new("base_reserve", ColumnType::U32),
        Column::new("max_tx_set_size", ColumnType::U32),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.ledger_hash.clone()),
            Value::Hash(self.previous_hash.clone()),
            Value::U16(self.protocol_version),
            Value::U32(self.transaction_count),
            Value::U32(self.operation_count),
            Value::U32(self.successful_tx_count),
            Value::U32(self.failed_tx_count),
            Value::U64(self.total_coins),
            Value::U64(self.fee_pool),
            Value::U32(self.base_fee),
            Value::U32(self.base_reserve),
            Value::U32(self.max_tx_set_size),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub tx_hash: Hash,
    pub application_order: u32,
    pub source_account: String,
    pub account_sequence: u64,
    pub max_fee: u32,
    pub fee_charged: u32,
    pub operation_count: u32,
    pub successful: bool,
    pub memo_type: Option<String>,
    pub memo: Option<String>,
}

impl TransactionRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("tx_hash", ColumnType::Hash32),
        Column::new("application_order", ColumnType::U32),
        Column::new("source_account", ColumnType::Str),
        Column::new("account_sequence", ColumnType::U64),
        Column::new("max_fee", ColumnType::U32),
        Column::new("fee_charged", ColumnType::U32),
        Column::new("operation_count", ColumnType::U32),
        Column::new("successful", ColumnType::Bool),
        Column::nullable("memo_type", ColumnType::Str),
        Column::nullable("memo", ColumnType::Str),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.tx_hash.clone()),
            Value::U32(self.application_order),
            Value::Str(self.source_account.clone()),
            Value::U64(self.account_sequence),
            Value::U32(self.max_fee),
            Value::U32(self.fee_charged),
            Value::U32(self.operation_count),
            Value::Bool(self.successful),
            Value::opt_str(self.memo_type.clone()),
            Value::opt_str(self.memo.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRow {
    pub tx_hash: Hash,
    pub op_index: u32,
    pub op_type: String,
    pub source_account: String,
    pub destination: Option<String>,
    pub asset: Option<String>,
    pub amount: Option<i64>,
    pub successful: bool,
}

impl OperationRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("tx_hash", ColumnType::Hash32),
        Column::new("op_index", ColumnType::U32),
        Column::new("op_type", ColumnType::Str),
        Column::new("source_account", ColumnType::Str),
        Column::nullable("destination", ColumnType::Str),
        Column::nullable("asset", ColumnType::Str),
        Column::nullable("amount", ColumnType::I64),
        Column::new("successful", ColumnType::Bool),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.tx_hash.clone()),
            Value::U32(self.op_index),
            Value::Str(self.op_type.clone()),
            Value::Str(self.source_account.clone()),
            Value::opt_str(self.destination.clone()),
            Value::opt_str(self.asset.clone()),
            Value::opt_i64(self.amount),
            Value::Bool(self.successful),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectRow {
    pub tx_hash: Hash,
    pub op_index: u32,
    pub effect_index: u32,
    pub effect_type: String,
    pub account: String,
    pub asset: Option<String>,
    pub amount: Option<i64>,
}

impl EffectRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("tx_hash", ColumnType::Hash32),
        Column::new("op_index", ColumnType::U32),
        Column::new("effect_index", ColumnType::U32),
        Column::new("effect_type", ColumnType::Str),
        Column::new("account", ColumnType::Str),
        Column::nullable("asset", ColumnType::Str),
        Column::nullable("amount", ColumnType::I64),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.tx_hash.clone()),
            Value::U32(self.op_index),
            Value::U32(self.effect_index),
            Value::Str(self.effect_type.clone()),
            Value::Str(self.account.clone()),
            Value::opt_str(self.asset.clone()),
            Value::opt_i64(self.amount),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRow {
    pub tx_hash: Hash,
    pub op_index: u32,
    pub trade_index: u32,
    pub base_account: String,
    pub base_asset: String,
    pub base_amount: i64,
    pub counter_account: String,
    pub counter_asset: String,
    pub counter_amount: i64,
    pub price_n: u32,
    pub price_d: u32,
}

impl TradeRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("tx_hash", ColumnType::Hash32),
        Column::new("op_index", ColumnType::U32),
        Column::new("trade_index", ColumnType::U32),
        Column::new("base_account", ColumnType::Str),
        Column::new("base_asset", ColumnType::Str),
        Column::new("base_amount", ColumnType::I64),
        Column::new("counter_account", ColumnType::Str),
        Column::new("counter_asset", ColumnType::Str),
        Column::new("counter_amount", ColumnType::I64),
        Column::new("price_n", ColumnType::U32),
        Column::new("price_d", ColumnType::U32),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.tx_hash.clone()),
            Value::U32(self.op_index),
            Value::U32(self.trade_index),
            Value::Str(self.base_account.clone()),
            Value::Str(self.base_asset.clone()),
            Value::I64(self.base_amount),
            Value::Str(self.counter_account.clone()),
            Value::Str(self.counter_asset.clone()),
            Value::I64(self.counter_amount),
            Value::U32(self.price_n),
            Value::U32(self.price_d),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEventRow {
    pub contract_id: Hash,
    pub tx_hash: Hash,
    pub event_index: u32,
    pub event_type: String,
    // JSON array of rendered topic values
    pub topics: String,
    pub data: String,
    pub in_successful_call: bool,
}

impl ContractEventRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("contract_id", ColumnType::Hash32),
        Column::new("tx_hash", ColumnType::Hash32),
        Column::new("event_index", ColumnType::U32),
        Column::new("event_type", ColumnType::Str),
        Column::new("topics", ColumnType::Str),
        Column::new("data", ColumnType::Str),
        Column::new("in_successful_call", ColumnType::Bool),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.contract_id.clone()),
            Value::Hash(self.tx_hash.clone()),
            Value::U32(self.event_index),
            Value::Str(self.event_type.clone()),
            Value::Str(self.topics.clone()),
            Value::Str(self.data.clone()),
            Value::Bool(self.in_successful_call),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDataRow {
    pub contract_id: Hash,
    pub key_hash: Hash,
    pub durability: String,
    pub value: Option<String>,
    pub deleted: bool,
}

impl ContractDataRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("contract_id", ColumnType::Hash32),
        Column::new("key_hash", ColumnType::Hash32),
        Column::new("durability", ColumnType::Str),
        Column::nullable("value", ColumnType::Str),
        Column::new("deleted", ColumnType::Bool),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.contract_id.clone()),
            Value::Hash(self.key_hash.clone()),
            Value::Str(self.durability.clone()),
            Value::opt_str(self.value.clone()),
            Value::Bool(self.deleted),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCodeRow {
    pub code_hash: Hash,
    pub wasm_size: u32,
    pub deleted: bool,
}

impl ContractCodeRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("code_hash", ColumnType::Hash32),
        Column::new("wasm_size", ColumnType::U32),
        Column::new("deleted", ColumnType::Bool),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.code_hash.clone()),
            Value::U32(self.wasm_size),
            Value::Bool(self.deleted),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRow {
    pub account_id: String,
    pub balance: i64,
    pub sequence: u64,
    pub num_subentries: u32,
    pub inflation_dest: Option<String>,
    pub home_domain: Option<String>,
    pub flags: u32,
    pub deleted: bool,
}

impl AccountRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("account_id", ColumnType::Str),
        Column::new("balance", ColumnType::I64),
        Column::new("sequence", ColumnType::U64),
        Column::new("num_subentries", ColumnType::U32),
        Column::nullable("inflation_dest", ColumnType::Str),
        Column::nullable("home_domain", ColumnType::Str),
        Column::new("flags", ColumnType::U32),
        Column::new("deleted", ColumnType::Bool),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Str(self.account_id.clone()),
            Value::I64(self.balance),
            Value::U64(self.sequence),
            Value::U32(self.num_subentries),
            Value::opt_str(self.inflation_dest.clone()),
            Value::opt_str(self.home_domain.clone()),
            Value::U32(self.flags),
            Value::Bool(self.deleted),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustlineRow {
    pub account_id: String,
    pub asset: String,
    pub balance: i64,
    pub limit: i64,
    pub buying_liabilities: i64,
    pub selling_liabilities: i64,
    pub authorized: bool,
    pub deleted: bool,
}

impl TrustlineRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("account_id", ColumnType::Str),
        Column::new("asset", ColumnType::Str),
        Column::new("balance", ColumnType::I64),
        Column::new("limit", ColumnType::I64),
        Column::new("buying_liabilities", ColumnType::I64),
        Column::new("selling_liabilities", ColumnType::I64),
        Column::new("authorized", ColumnType::Bool),
        Column::new("deleted", ColumnType::Bool),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Str(self.account_id.clone()),
            Value::Str(self.asset.clone()),
            Value::I64(self.balance),
            Value::I64(self.limit),
            Value::I64(self.buying_liabilities),
            Value::I64(self.selling_liabilities),
            Value::Bool(self.authorized),
            Value::Bool(self.deleted),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRow {
    pub offer_id: u64,
    pub seller_id: String,
    pub selling_asset: String,
    pub buying_asset: String,
    pub amount: i64,
    pub price_n: u32,
    pub price_d: u32,
    pub flags: u32,
    pub deleted: bool,
}

impl OfferRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("offer_id", ColumnType::U64),
        Column::new("seller_id", ColumnType::Str),
        Column::new("selling_asset", ColumnType::Str),
        Column::new("buying_asset", ColumnType::Str),
        Column::new("amount", ColumnType::I64),
        Column::new("price_n", ColumnType::U32),
        Column::new("price_d", ColumnType::U32),
        Column::new("flags", ColumnType::U32),
        Column::new("deleted", ColumnType::Bool),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::U64(self.offer_id),
            Value::Str(self.seller_id.clone()),
            Value::Str(self.selling_asset.clone()),
            Value::Str(self.buying_asset.clone()),
            Value::I64(self.amount),
            Value::U32(self.price_n),
            Value::U32(self.price_d),
            Value::U32(self.flags),
            Value::Bool(self.deleted),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimableBalanceRow {
    pub balance_id: Hash,
    pub asset: String,
    pub amount: i64,
    pub sponsor: Option<String>,
    pub claimants: u32,
    pub deleted: bool,
}

impl ClaimableBalanceRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("balance_id", ColumnType::Hash32),
        Column::new("asset", ColumnType::Str),
        Column::new("amount", ColumnType::I64),
        Column::nullable("sponsor", ColumnType::Str),
        Column::new("claimants", ColumnType::U32),
        Column::new("deleted", ColumnType::Bool),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.balance_id.clone()),
            Value::Str(self.asset.clone()),
            Value::I64(self.amount),
            Value::opt_str(self.sponsor.clone()),
            Value::U32(self.claimants),
            Value::Bool(self.deleted),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPoolRow {
    pub pool_id: Hash,
    pub fee_bp: u32,
    pub asset_a: String,
    pub asset_b: String,
    pub reserve_a: i64,
    pub reserve_b: i64,
    pub total_shares: i64,
    pub trustline_count: u64,
    pub deleted: bool,
}

impl LiquidityPoolRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("pool_id", ColumnType::Hash32),
        Column::new("fee_bp", ColumnType::U32),
        Column::new("asset_a", ColumnType::Str),
        Column::new("asset_b", ColumnType::Str),
        Column::new("reserve_a", ColumnType::I64),
        Column::new("reserve_b", ColumnType::I64),
        Column::new("total_shares", ColumnType::I64),
        Column::new("trustline_count", ColumnType::U64),
        Column::new("deleted", ColumnType::Bool),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.pool_id.clone()),
            Value::U32(self.fee_bp),
            Value::Str(self.asset_a.clone()),
            Value::Str(self.asset_b.clone()),
            Value::I64(self.reserve_a),
            Value::I64(self.reserve_b),
            Value::I64(self.total_shares),
            Value::U64(self.trustline_count),
            Value::Bool(self.deleted),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransferRow {
    pub tx_hash: Hash,
    pub op_index: u32,
    pub transfer_index: u32,
    pub transfer_type: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub asset: String,
    pub amount: i64,
}

impl TokenTransferRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("tx_hash", ColumnType::Hash32),
        Column::new("op_index", ColumnType::U32),
        Column::new("transfer_index", ColumnType::U32),
        Column::new("transfer_type", ColumnType::Str),
        Column::nullable("from", ColumnType::Str),
        Column::nullable("to", ColumnType::Str),
        Column::new("asset", ColumnType::Str),
        Column::new("amount", ColumnType::I64),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.tx_hash.clone()),
            Value::U32(self.op_index),
            Value::U32(self.transfer_index),
            Value::Str(self.transfer_type.clone()),
            Value::opt_str(self.from.clone()),
            Value::opt_str(self.to.clone()),
            Value::Str(self.asset.clone()),
            Value::I64(self.amount),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlRow {
    pub key_hash: Hash,
    pub live_until_ledger: u32,
    pub deleted: bool,
}

impl TtlRow {
    pub const COLUMNS: &'static [Column] = &[
        Column::new("key_hash", ColumnType::Hash32),
        Column::new("live_until_ledger", ColumnType::U32),
        Column::new("deleted", ColumnType::Bool),
    ];

    pub fn values(&self) -> Vec<Value> {
        vec![
            Value::Hash(self.key_hash.clone()),
            Value::U32(self.live_until_ledger),
            Value::Bool(self.deleted),
        ]
    }
}
