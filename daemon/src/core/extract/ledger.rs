use super::{ExtractContext, Extractor};
use crate::core::error::PipelineError;
use lumenlake_common::rows::{LedgerRow, Row, RowKind};

// One row per closed ledger with the close metadata and tx/op tallies
pub struct LedgerExtractor;

impl Extractor for LedgerExtractor {
    fn kind(&self) -> RowKind {
        RowKind::Ledgers
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        let close = ctx.close;

        let transaction_count = close.transactions.len() as u32;
        let operation_count = close
            .transactions
            .iter()
            .map(|tx| tx.operations.len() as u32)
            .sum();
        let successful_tx_count = close
            .transactions
            .iter()
            .filter(|tx| tx.successful)
            .count() as u32;

        let row = LedgerRow {
            ledger_hash: close.ledger_hash.clone(),
            previous_hash: close.previous_hash.clone(),
            protocol_version: ctx.raw.protocol,
            transaction_count,
            operation_count,
            successful_tx_count,
            failed_tx_count: transaction_count - successful_tx_count,
            total_coins: close.total_coins,
            fee_pool: close.fee_pool,
            base_fee: close.base_fee,
            base_reserve: close.base_reserve,
            max_tx_set_size: close.max_tx_set_size,
        };

        Ok(vec![Row::Ledger(ctx.meta(), row)])
    }
}
