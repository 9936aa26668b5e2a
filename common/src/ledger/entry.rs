use super::Asset;
use crate::{
    crypto::Hash,
    serializer::{Reader, ReaderError, Serializer, Writer},
};
use serde::{Deserialize, Serialize};
use strum::Display;

// One state transition applied by a ledger. `order` is the apply order
// within the ledger and drives last-write-wins deduplication downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub order: u32,
    pub kind: ChangeKind,
    pub entry: LedgerEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Removed,
}

impl ChangeKind {
    pub fn is_removed(&self) -> bool {
        matches!(self, ChangeKind::Removed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntry {
    Account(AccountEntry),
    Trustline(TrustlineEntry),
    Offer(OfferEntry),
    ClaimableBalance(ClaimableBalanceEntry),
    LiquidityPool(LiquidityPoolEntry),
    ContractData(ContractDataEntry),
    ContractCode(ContractCodeEntry),
    Ttl(TtlEntry),
}

impl LedgerEntry {
    // Stable identity of the entity this entry describes, the snapshot key
    pub fn entity_id(&self) -> String {
        match self {
            LedgerEntry::Account(e) => e.account_id.clone(),
            LedgerEntry::Trustline(e) => format!("{}|{}", e.account_id, e.asset.canonical()),
            LedgerEntry::Offer(e) => e.offer_id.to_string(),
            LedgerEntry::ClaimableBalance(e) => e.balance_id.to_hex(),
            LedgerEntry::LiquidityPool(e) => e.pool_id.to_hex(),
            LedgerEntry::ContractData(e) => format!("{}|{}", e.contract_id, e.key_hash),
            LedgerEntry::ContractCode(e) => e.code_hash.to_hex(),
            LedgerEntry::Ttl(e) => e.key_hash.to_hex(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account_id: String,
    pub balance: i64,
    pub sequence: u64,
    pub num_subentries: u32,
    pub inflation_dest: Option<String>,
    pub home_domain: Option<String>,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustlineEntry {
    pub account_id: String,
    pub asset: Asset,
    pub balance: i64,
    pub limit: i64,
    pub buying_liabilities: i64,
    pub selling_liabilities: i64,
    pub authorized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEntry {
    pub offer_id: u64,
    pub seller_id: String,
    pub selling: Asset,
    pub buying: Asset,
    pub amount: i64,
    pub price_n: u32,
    pub price_d: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimableBalanceEntry {
    pub balance_id: Hash,
    pub asset: Asset,
    pub amount: i64,
    pub sponsor: Option<String>,
    pub claimants: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPoolEntry {
    pub pool_id: Hash,
    pub fee_bp: u32,
    pub asset_a: Asset,
    pub asset_b: Asset,
    pub reserve_a: i64,
    pub reserve_b: i64,
    pub total_shares: i64,
    pub trustline_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDataEntry {
    pub contract_id: Hash,
    pub key_hash: Hash,
    pub durability: Durability,
    // Rendered JSON value of the stored entry
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    Temporary,
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCodeEntry {
    pub code_hash: Hash,
    pub wasm_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlEntry {
    pub key_hash: Hash,
    pub live_until_ledger: u32,
}

impl Serializer for ChangeKind {
    fn write(&self, writer: &mut Writer) {
        let id: u8 = match self {
            ChangeKind::Created => 0,
            ChangeKind::Updated => 1,
            ChangeKind::Removed => 2,
        };
        writer.write_u8(id);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            0 => Ok(ChangeKind::Created),
            1 => Ok(ChangeKind::Updated),
            2 => Ok(ChangeKind::Removed),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for Durability {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(match self {
            Durability::Temporary => 0,
            Durability::Persistent => 1,
        });
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            0 => Ok(Durability::Temporary),
            1 => Ok(Durability::Persistent),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for AccountEntry {
    fn write(&self, writer: &mut Writer) {
        writer.write_string(&self.account_id);
        self.balance.write(writer);
        writer.write_u64(&self.sequence);
        writer.write_u32(&self.num_subentries);
        self.inflation_dest.write(writer);
        self.home_domain.write(writer);
        writer.write_u32(&self.flags);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            account_id: reader.read_string()?,
            balance: i64::read(reader)?,
            sequence: reader.read_u64()?,
            num_subentries: reader.read_u32()?,
            inflation_dest: Option::read(reader)?,
            home_domain: Option::read(reader)?,
            flags: reader.read_u32()?,
        })
    }
}

impl Serializer for TrustlineEntry {
    fn write(&self, writer: &mut Writer) {
        writer.write_string(&self.account_id);
        self.asset.write(writer);
        self.balance.write(writer);
        self.limit.write(writer);
        self.buying_liabilities.write(writer);
        self.selling_liabilities.write(writer);
        writer.write_bool(self.authorized);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            account_id: reader.read_string()?,
            asset: Asset::read(reader)?,
            balance: i64::read(reader)?,
            limit: i64::read(reader)?,
            buying_liabilities: i64::read(reader)?,
            selling_liabilities: i64::read(reader)?,
            authorized: reader.read_bool()?,
        })
    }
}

impl Serializer for OfferEntry {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.offer_id);
        writer.write_string(&self.seller_id);
        self.selling.write(writer);
        self.buying.write(writer);
        self.amount.write(writer);
        writer.write_u32(&self.price_n);
        writer.write_u32(&self.price_d);
        writer.write_u32(&self.flags);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            offer_id: reader.read_u64()?,
            seller_id: reader.read_string()?,
            selling: Asset::read(reader)?,
            buying: Asset::read(reader)?,
            amount: i64::read(reader)?,
            price_n: reader.read_u32()?,
            price_d: reader.read_u32()?,
            flags: reader.read_u32()?,
        })
    }
}

impl Serializer for ClaimableBalanceEntry {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.balance_id);
        self.asset.write(writer);
        self.amount.write(writer);
        self.sponsor.write(writer);
        writer.write_u32(&self.claimants);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            balance_id: reader.read_hash()?,
            asset: Asset::read(reader)?,
            amount: i64::read(reader)?,
            sponsor: Option::read(reader)?,
            claimants: reader.read_u32()?,
        })
    }
}

impl Serializer for LiquidityPoolEntry {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.pool_id);
        writer.write_u32(&self.fee_bp);
        self.asset_a.write(writer);
        self.asset_b.write(writer);
        self.reserve_a.write(writer);
        self.reserve_b.write(writer);
        self.total_shares.write(writer);
        writer.write_u64(&self.trustline_count);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            pool_id: reader.read_hash()?,
            fee_bp: reader.read_u32()?,
            asset_a: Asset::read(reader)?,
            asset_b: Asset::read(reader)?,
            reserve_a: i64::read(reader)?,
            reserve_b: i64::read(reader)?,
            total_shares: i64::read(reader)?,
            trustline_count: reader.read_u64()?,
        })
    }
}

impl Serializer for ContractDataEntry {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.contract_id);
        writer.write_hash(&self.key_hash);
        self.durability.write(writer);
        writer.write_string(&self.value);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            contract_id: reader.read_hash()?,
            key_hash: reader.read_hash()?,
            durability: Durability::read(reader)?,
            value: reader.read_string()?,
        })
    }
}

impl Serializer for ContractCodeEntry {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.code_hash);
        writer.write_u32(&self.wasm_size);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            code_hash: reader.read_hash()?,
            wasm_size: reader.read_u32()?,
        })
    }
}

impl Serializer for TtlEntry {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.key_hash);
        writer.write_u32(&self.live_until_ledger);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            key_hash: reader.read_hash()?,
            live_until_ledger: reader.read_u32()?,
        })
    }
}

impl Serializer for LedgerEntry {
    fn write(&self, writer: &mut Writer) {
        match self {
            LedgerEntry::Account(e) => {
                writer.write_u8(0);
                e.write(writer);
            }
            LedgerEntry::Trustline(e) => {
                writer.write_u8(1);
                e.write(writer);
            }
            LedgerEntry::Offer(e) => {
                writer.write_u8(2);
                e.write(writer);
            }
            LedgerEntry::ClaimableBalance(e) => {
                writer.write_u8(3);
                e.write(writer);
            }
            LedgerEntry::LiquidityPool(e) => {
                writer.write_u8(4);
                e.write(writer);
            }
            LedgerEntry::ContractData(e) => {
                writer.write_u8(5);
                e.write(writer);
            }
            LedgerEntry::ContractCode(e) => {
                writer.write_u8(6);
                e.write(writer);
            }
            LedgerEntry::Ttl(e) => {
                writer.write_u8(7);
                e.write(writer);
            }
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => LedgerEntry::Account(AccountEntry::read(reader)?),
            1 => LedgerEntry::Trustline(TrustlineEntry::read(reader)?),
            2 => LedgerEntry::Offer(OfferEntry::read(reader)?),
            3 => LedgerEntry::ClaimableBalance(ClaimableBalanceEntry::read(reader)?),
            4 => LedgerEntry::LiquidityPool(LiquidityPoolEntry::read(reader)?),
            5 => LedgerEntry::ContractData(ContractDataEntry::read(reader)?),
            6 => LedgerEntry::ContractCode(ContractCodeEntry::read(reader)?),
            7 => LedgerEntry::Ttl(TtlEntry::read(reader)?),
            _ => return Err(ReaderError::InvalidValue),
        })
    }
}

impl Serializer for StateChange {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&self.order);
        self.kind.write(writer);
        self.entry.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            order: reader.read_u32()?,
            kind: ChangeKind::read(reader)?,
            entry: LedgerEntry::read(reader)?,
        })
    }
}
