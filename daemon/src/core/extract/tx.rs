use super::{normalize_opt, ExtractContext, Extractor};
use crate::core::error::PipelineError;
use lumenlake_common::rows::{Row, RowKind, TransactionRow};

// One row per transaction in application order
pub struct TransactionExtractor;

impl Extractor for TransactionExtractor {
    fn kind(&self) -> RowKind {
        RowKind::Transactions
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        let mut rows = Vec::with_capacity(ctx.close.transactions.len());

        for (order, tx) in ctx.close.transactions.iter().enumerate() {
            let (memo_type, memo) = match &tx.memo {
                Some(memo) => (
                    Some(memo.memo_type.to_string()),
                    normalize_opt(memo.value.clone()),
                ),
                None => (None, None),
            };

            rows.push(Row::Transaction(
                ctx.meta(),
                TransactionRow {
                    tx_hash: tx.tx_hash.clone(),
                    application_order: order as u32,
                    source_account: tx.source_account.clone(),
                    account_sequence: tx.account_sequence,
                    max_fee: tx.max_fee,
                    fee_charged: tx.fee_charged,
                    operation_count: tx.operations.len() as u32,
                    successful: tx.successful,
                    memo_type,
                    memo,
                },
            ));
        }

        Ok(rows)
    }
}
