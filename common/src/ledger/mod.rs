mod asset;
mod entry;

pub use asset::Asset;
pub use entry::{
    AccountEntry, ChangeKind, ClaimableBalanceEntry, ContractCodeEntry, ContractDataEntry,
    Durability, LedgerEntry, LiquidityPoolEntry, OfferEntry, StateChange, TrustlineEntry, TtlEntry,
};

use crate::{
    crypto::Hash,
    serializer::{Reader, ReaderError, Serializer, Writer},
    time::TimestampMicros,
};
use serde::{Deserialize, Serialize};
use strum::Display;

pub type LedgerSequence = u32;
pub type ProtocolVersion = u16;

// One raw ledger as delivered by the upstream stream. The payload is an
// encoded LedgerClose; decoding it is the extractors' job, the transport
// layers treat it as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLedger {
    pub sequence: LedgerSequence,
    pub payload: Vec<u8>,
    // Ledger close time, UTC microseconds, authoritative for all rows
    pub close_time: TimestampMicros,
    pub protocol: ProtocolVersion,
}

impl RawLedger {
    pub fn decode(&self) -> Result<LedgerClose, ReaderError> {
        LedgerClose::from_bytes(&self.payload)
    }
}

impl Serializer for RawLedger {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&self.sequence);
        self.payload.write(writer);
        writer.write_u64(&self.close_time);
        writer.write_u16(self.protocol);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            sequence: reader.read_u32()?,
            payload: Vec::read(reader)?,
            close_time: reader.read_u64()?,
            protocol: reader.read_u16()?,
        })
    }
}

// Decoded close metadata of one ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerClose {
    pub ledger_hash: Hash,
    pub previous_hash: Hash,
    pub total_coins: u64,
    pub fee_pool: u64,
    pub base_fee: u32,
    pub base_reserve: u32,
    pub max_tx_set_size: u32,
    pub transactions: Vec<TxEnvelope>,
}

impl LedgerClose {
    // Wrap into a raw ledger frame for the wire or for tests
    pub fn to_raw(
        &self,
        sequence: LedgerSequence,
        close_time: TimestampMicros,
        protocol: ProtocolVersion,
    ) -> RawLedger {
        RawLedger {
            sequence,
            payload: self.to_bytes(),
            close_time,
            protocol,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEnvelope {
    pub tx_hash: Hash,
    pub source_account: String,
    pub account_sequence: u64,
    pub max_fee: u32,
    pub fee_charged: u32,
    pub successful: bool,
    pub memo: Option<Memo>,
    pub operations: Vec<OpRecord>,
    pub events: Vec<ContractEventRecord>,
    pub changes: Vec<StateChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    pub memo_type: MemoType,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemoType {
    Text,
    Id,
    Hash,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    CreateAccount,
    Payment,
    PathPayment,
    ManageSellOffer,
    ManageBuyOffer,
    ChangeTrust,
    AllowTrust,
    AccountMerge,
    ManageData,
    CreateClaimableBalance,
    ClaimClaimableBalance,
    LiquidityPoolDeposit,
    LiquidityPoolWithdraw,
    InvokeContract,
    UploadContractCode,
    ExtendTtl,
}

// One operation with its applied results. Optional fields stay None when
// the operation kind has no use for them; downstream columns keep the NULL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpRecord {
    pub kind: OpKind,
    pub source_account: Option<String>,
    pub destination: Option<String>,
    pub asset: Option<Asset>,
    pub amount: Option<i64>,
    pub successful: bool,
    pub effects: Vec<EffectRecord>,
    pub trades: Vec<TradeRecord>,
    pub transfers: Vec<TransferRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    AccountCreated,
    AccountRemoved,
    AccountCredited,
    AccountDebited,
    TrustlineCreated,
    TrustlineUpdated,
    TrustlineRemoved,
    OfferCreated,
    OfferUpdated,
    OfferRemoved,
    Trade,
    ClaimableBalanceCreated,
    ClaimableBalanceClaimed,
    LiquidityPoolDeposited,
    LiquidityPoolWithdrew,
    DataCreated,
    DataUpdated,
    DataRemoved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectRecord {
    pub kind: EffectKind,
    pub account: String,
    pub asset: Option<Asset>,
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub base_account: String,
    pub base_asset: Asset,
    pub base_amount: i64,
    pub counter_account: String,
    pub counter_asset: Asset,
    pub counter_amount: i64,
    pub price_n: u32,
    pub price_d: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Transfer,
    Mint,
    Burn,
    Clawback,
    Fee,
}

// A movement of value derived from an operation or a contract event.
// Mints have no `from`, burns and fees have no `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub kind: TransferKind,
    pub from: Option<String>,
    pub to: Option<String>,
    pub asset: Asset,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContractEventKind {
    Contract,
    System,
    Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEventRecord {
    pub contract_id: Hash,
    pub kind: ContractEventKind,
    // Topics and data pre-rendered as JSON text by the upstream decoder
    pub topics: Vec<String>,
    pub data: String,
    pub in_successful_call: bool,
}

impl Serializer for MemoType {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(match self {
            MemoType::Text => 0,
            MemoType::Id => 1,
            MemoType::Hash => 2,
            MemoType::Return => 3,
        });
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => MemoType::Text,
            1 => MemoType::Id,
            2 => MemoType::Hash,
            3 => MemoType::Return,
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for Memo {
    fn write(&self, writer: &mut Writer) {
        self.memo_type.write(writer);
        self.value.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            memo_type: MemoType::read(reader)?,
            value: Option::read(reader)?,
        })
    }
}

impl Serializer for OpKind {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self as u8);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => OpKind::CreateAccount,
            1 => OpKind::Payment,
            2 => OpKind::PathPayment,
            3 => OpKind::ManageSellOffer,
            4 => OpKind::ManageBuyOffer,
            5 => OpKind::ChangeTrust,
            6 => OpKind::AllowTrust,
            7 => OpKind::AccountMerge,
            8 => OpKind::ManageData,
            9 => OpKind::CreateClaimableBalance,
            10 => OpKind::ClaimClaimableBalance,
            11 => OpKind::LiquidityPoolDeposit,
            12 => OpKind::LiquidityPoolWithdraw,
            13 => OpKind::InvokeContract,
            14 => OpKind::UploadContractCode,
            15 => OpKind::ExtendTtl,
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for EffectKind {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self as u8);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => EffectKind::AccountCreated,
            1 => EffectKind::AccountRemoved,
            2 => EffectKind::AccountCredited,
            3 => EffectKind::AccountDebited,
            4 => EffectKind::TrustlineCreated,
            5 => EffectKind::TrustlineUpdated,
            6 => EffectKind::TrustlineRemoved,
            7 => EffectKind::OfferCreated,
            8 => EffectKind::OfferUpdated,
            9 => EffectKind::OfferRemoved,
            10 => EffectKind::Trade,
            11 => EffectKind::ClaimableBalanceCreated,
            12 => EffectKind::ClaimableBalanceClaimed,
            13 => EffectKind::LiquidityPoolDeposited,
            14 => EffectKind::LiquidityPoolWithdrew,
            15 => EffectKind::DataCreated,
            16 => EffectKind::DataUpdated,
            17 => EffectKind::DataRemoved,
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for EffectRecord {
    fn write(&self, writer: &mut Writer) {
        self.kind.write(writer);
        writer.write_string(&self.account);
        self.asset.write(writer);
        self.amount.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            kind: EffectKind::read(reader)?,
            account: reader.read_string()?,
            asset: Option::read(reader)?,
            amount: Option::read(reader)?,
        })
    }
}

impl Serializer for TradeRecord {
    fn write(&self, writer: &mut Writer) {
        writer.write_string(&self.base_account);
        self.base_asset.write(writer);
        self.base_amount.write(writer);
        writer.write_string(&self.counter_account);
        self.counter_asset.write(writer);
        self.counter_amount.write(writer);
        writer.write_u32(&self.price_n);
        writer.write_u32(&self.price_d);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            base_account: reader.read_string()?,
            base_asset: Asset::read(reader)?,
            base_amount: i64::read(reader)?,
            counter_account: reader.read_string()?,
            counter_asset: Asset::read(reader)?,
            counter_amount: i64::read(reader)?,
            price_n: reader.read_u32()?,
            price_d: reader.read_u32()?,
        })
    }
}

impl Serializer for TransferKind {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self as u8);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => TransferKind::Transfer,
            1 => TransferKind::Mint,
            2 => TransferKind::Burn,
            3 => TransferKind::Clawback,
            4 => TransferKind::Fee,
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for TransferRecord {
    fn write(&self, writer: &mut Writer) {
        self.kind.write(writer);
        self.from.write(writer);
        self.to.write(writer);
        self.asset.write(writer);
        self.amount.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            kind: TransferKind::read(reader)?,
            from: Option::read(reader)?,
            to: Option::read(reader)?,
            asset: Asset::read(reader)?,
            amount: i64::read(reader)?,
        })
    }
}

impl Serializer for ContractEventKind {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self as u8);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => ContractEventKind::Contract,
            1 => ContractEventKind::System,
            2 => ContractEventKind::Diagnostic,
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for ContractEventRecord {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.contract_id);
        self.kind.write(writer);
        self.topics.write(writer);
        writer.write_string(&self.data);
        writer.write_bool(self.in_successful_call);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            contract_id: reader.read_hash()?,
            kind: ContractEventKind::read(reader)?,
            topics: Vec::read(reader)?,
            data: reader.read_string()?,
            in_successful_call: reader.read_bool()?,
        })
    }
}

impl Serializer for OpRecord {
    fn write(&self, writer: &mut Writer) {
        self.kind.write(writer);
        self.source_account.write(writer);
        self.destination.write(writer);
        self.asset.write(writer);
        self.amount.write(writer);
        writer.write_bool(self.successful);
        self.effects.write(writer);
        self.trades.write(writer);
        self.transfers.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            kind: OpKind::read(reader)?,
            source_account: Option::read(reader)?,
            destination: Option::read(reader)?,
            asset: Option::read(reader)?,
            amount: Option::read(reader)?,
            successful: reader.read_bool()?,
            effects: Vec::read(reader)?,
            trades: Vec::read(reader)?,
            transfers: Vec::read(reader)?,
        })
    }
}

impl Serializer for TxEnvelope {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.tx_hash);
        writer.write_string(&self.source_account);
        writer.write_u64(&self.account_sequence);
        writer.write_u32(&self.max_fee);
        writer.write_u32(&self.fee_charged);
        writer.write_bool(self.successful);
        self.memo.write(writer);
        self.operations.write(writer);
        self.events.write(writer);
        self.changes.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            tx_hash: reader.read_hash()?,
            source_account: reader.read_string()?,
            account_sequence: reader.read_u64()?,
            max_fee: reader.read_u32()?,
            fee_charged: reader.read_u32()?,
            successful: reader.read_bool()?,
            memo: Option::read(reader)?,
            operations: Vec::read(reader)?,
            events: Vec::read(reader)?,
            changes: Vec::read(reader)?,
        })
    }
}

impl Serializer for LedgerClose {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.ledger_hash);
        writer.write_hash(&self.previous_hash);
        writer.write_u64(&self.total_coins);
        writer.write_u64(&self.fee_pool);
        writer.write_u32(&self.base_fee);
        writer.write_u32(&self.base_reserve);
        writer.write_u32(&self.max_tx_set_size);
        self.transactions.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            ledger_hash: reader.read_hash()?,
            previous_hash: reader.read_hash()?,
            total_coins: reader.read_u64()?,
            fee_pool: reader.read_u64()?,
            base_fee: reader.read_u32()?,
            base_reserve: reader.read_u32()?,
            max_tx_set_size: reader.read_u32()?,
            transactions: Vec::read(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash;

    fn sample_close() -> LedgerClose {
        LedgerClose {
            ledger_hash: hash(b"ledger"),
            previous_hash: hash(b"prev"),
            total_coins: 1_000_000,
            fee_pool: 500,
            base_fee: 100,
            base_reserve: 5000,
            max_tx_set_size: 100,
            transactions: vec![TxEnvelope {
                tx_hash: hash(b"tx"),
                source_account: "GSRC".to_owned(),
                account_sequence: 42,
                max_fee: 200,
                fee_charged: 100,
                successful: true,
                memo: Some(Memo {
                    memo_type: MemoType::Text,
                    value: Some("hello".to_owned()),
                }),
                operations: vec![OpRecord {
                    kind: OpKind::Payment,
                    source_account: None,
                    destination: Some("GDST".to_owned()),
                    asset: Some(Asset::Native),
                    amount: Some(1_000),
                    successful: true,
                    effects: vec![EffectRecord {
                        kind: EffectKind::AccountCredited,
                        account: "GDST".to_owned(),
                        asset: Some(Asset::Native),
                        amount: Some(1_000),
                    }],
                    trades: Vec::new(),
                    transfers: vec![TransferRecord {
                        kind: TransferKind::Transfer,
                        from: Some("GSRC".to_owned()),
                        to: Some("GDST".to_owned()),
                        asset: Asset::Native,
                        amount: 1_000,
                    }],
                }],
                events: Vec::new(),
                changes: vec![StateChange {
                    order: 0,
                    kind: ChangeKind::Updated,
                    entry: LedgerEntry::Account(AccountEntry {
                        account_id: "GDST".to_owned(),
                        balance: 2_000,
                        sequence: 7,
                        num_subentries: 0,
                        inflation_dest: None,
                        home_domain: None,
                        flags: 0,
                    }),
                }],
            }],
        }
    }

    #[test]
    fn test_ledger_close_roundtrip() {
        let close = sample_close();
        let restored = LedgerClose::from_bytes(&close.to_bytes()).unwrap();
        assert_eq!(close, restored);
    }

    #[test]
    fn test_raw_ledger_roundtrip() {
        let raw = sample_close().to_raw(12, 1_700_000_000_000_000, 21);
        let restored = RawLedger::from_bytes(&Serializer::to_bytes(&raw)).unwrap();
        assert_eq!(raw, restored);
        assert_eq!(restored.decode().unwrap(), sample_close());
    }
}
