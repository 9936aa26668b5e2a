use super::{ExtractContext, Extractor};
use crate::core::error::PipelineError;
use lumenlake_common::{
    ledger::{Asset, TransferKind},
    rows::{Row, RowKind, TokenTransferRow},
};

// Derived movements of value: the transfer records attached to each
// operation, plus one fee transfer per transaction that paid one. The fee
// row uses op_index = operation count, one past any real operation, so
// the (tx_hash, op_index, transfer_index) key never collides.
pub struct TokenTransferExtractor;

impl Extractor for TokenTransferExtractor {
    fn kind(&self) -> RowKind {
        RowKind::TokenTransfers
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        let mut rows = Vec::new();

        for tx in &ctx.close.transactions {
            for (op_index, op) in tx.operations.iter().enumerate() {
                for (transfer_index, transfer) in op.transfers.iter().enumerate() {
                    rows.push(Row::TokenTransfer(
                        ctx.meta(),
                        TokenTransferRow {
                            tx_hash: tx.tx_hash.clone(),
                            op_index: op_index as u32,
                            transfer_index: transfer_index as u32,
                            transfer_type: transfer.kind.to_string(),
                            from: transfer.from.clone(),
                            to: transfer.to.clone(),
                            asset: transfer.asset.canonical(),
                            amount: transfer.amount,
                        },
                    ));
                }
            }

            if tx.fee_charged > 0 {
                rows.push(Row::TokenTransfer(
                    ctx.meta(),
                    TokenTransferRow {
                        tx_hash: tx.tx_hash.clone(),
                        op_index: tx.operations.len() as u32,
                        transfer_index: 0,
                        transfer_type: TransferKind::Fee.to_string(),
                        from: Some(tx.source_account.clone()),
                        to: None,
                        asset: Asset::Native.canonical(),
                        amount: tx.fee_charged as i64,
                    },
                ));
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{config, sample_raw};
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_transfers_include_fee_row() {
        let raw = sample_raw(2);
        let close = raw.decode().unwrap();
        let ctx = ExtractContext {
            raw: &raw,
            close: &close,
            config: &config(),
        };

        let rows = TokenTransferExtractor.extract(&ctx).unwrap();
        // One payment transfer plus the fee
        assert_eq!(rows.len(), 2);

        let keys: HashSet<String> = rows.iter().map(|row| row.key()).collect();
        assert_eq!(keys.len(), rows.len());

        match &rows[1] {
            Row::TokenTransfer(_, fee) => {
                assert_eq!(fee.transfer_type, "fee");
                assert_eq!(fee.op_index, 2);
                assert_eq!(fee.to, None);
                assert_eq!(fee.asset, "native");
                assert_eq!(fee.amount, 100);
            }
            other => panic!("unexpected row {:?}", other),
        }
    }

    #[test]
    fn test_mint_has_no_from() {
        let raw = sample_raw(2);
        let close = raw.decode().unwrap();
        let ctx = ExtractContext {
            raw: &raw,
            close: &close,
            config: &config(),
        };

        let rows = TokenTransferExtractor.extract(&ctx).unwrap();
        match &rows[0] {
            Row::TokenTransfer(_, transfer) => {
                assert_eq!(transfer.transfer_type, "transfer");
                assert_eq!(transfer.from.as_deref(), Some("GSRC"));
                assert_eq!(transfer.to.as_deref(), Some("GDST"));
            }
            other => panic!("unexpected row {:?}", other),
        }
    }
}
