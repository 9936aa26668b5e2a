use super::{ExtractContext, Extractor};
use crate::core::error::PipelineError;
use indexmap::IndexMap;
use lumenlake_common::{
    ledger::LedgerEntry,
    rows::{ContractCodeRow, ContractDataRow, ContractEventRow, Row, RowKind, TtlRow},
};

// Contract events keyed by (tx_hash, event_index) within the transaction
pub struct ContractEventExtractor;

impl Extractor for ContractEventExtractor {
    fn kind(&self) -> RowKind {
        RowKind::ContractEvents
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        let mut rows = Vec::new();

        for tx in &ctx.close.transactions {
            for (event_index, event) in tx.events.iter().enumerate() {
                let topics = serde_json::to_string(&event.topics)?;
                rows.push(Row::ContractEvent(
                    ctx.meta(),
                    ContractEventRow {
                        contract_id: event.contract_id.clone(),
                        tx_hash: tx.tx_hash.clone(),
                        event_index: event_index as u32,
                        event_type: event.kind.to_string(),
                        topics,
                        data: event.data.clone(),
                        in_successful_call: event.in_successful_call,
                    },
                ));
            }
        }

        Ok(rows)
    }
}

// Contract storage entries, last write per (contract_id, key_hash).
// Removed entries become tombstones with a NULL value.
pub struct ContractDataExtractor;

impl Extractor for ContractDataExtractor {
    fn kind(&self) -> RowKind {
        RowKind::ContractData
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        let mut rows: IndexMap<String, Row> = IndexMap::new();

        for tx in &ctx.close.transactions {
            for change in &tx.changes {
                if let LedgerEntry::ContractData(data) = &change.entry {
                    let deleted = change.kind.is_removed();
                    rows.insert(
                        change.entry.entity_id(),
                        Row::ContractData(
                            ctx.meta(),
                            ContractDataRow {
                                contract_id: data.contract_id.clone(),
                                key_hash: data.key_hash.clone(),
                                durability: data.durability.to_string(),
                                value: if deleted { None } else { Some(data.value.clone()) },
                                deleted,
                            },
                        ),
                    );
                }
            }
        }

        Ok(rows.into_values().collect())
    }
}

pub struct ContractCodeExtractor;

impl Extractor for ContractCodeExtractor {
    fn kind(&self) -> RowKind {
        RowKind::ContractCode
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        let mut rows: IndexMap<String, Row> = IndexMap::new();

        for tx in &ctx.close.transactions {
            for change in &tx.changes {
                if let LedgerEntry::ContractCode(code) = &change.entry {
                    rows.insert(
                        change.entry.entity_id(),
                        Row::ContractCode(
                            ctx.meta(),
                            ContractCodeRow {
                                code_hash: code.code_hash.clone(),
                                wasm_size: code.wasm_size,
                                deleted: change.kind.is_removed(),
                            },
                        ),
                    );
                }
            }
        }

        Ok(rows.into_values().collect())
    }
}

pub struct TtlExtractor;

impl Extractor for TtlExtractor {
    fn kind(&self) -> RowKind {
        RowKind::Ttl
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        let mut rows: IndexMap<String, Row> = IndexMap::new();

        for tx in &ctx.close.transactions {
            for change in &tx.changes {
                if let LedgerEntry::Ttl(ttl) = &change.entry {
                    rows.insert(
                        change.entry.entity_id(),
                        Row::Ttl(
                            ctx.meta(),
                            TtlRow {
                                key_hash: ttl.key_hash.clone(),
                                live_until_ledger: ttl.live_until_ledger,
                                deleted: change.kind.is_removed(),
                            },
                        ),
                    );
                }
            }
        }

        Ok(rows.into_values().collect())
    }
}
