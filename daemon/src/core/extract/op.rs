use super::{normalize_opt, ExtractContext, Extractor};
use crate::core::error::PipelineError;
use lumenlake_common::rows::{EffectRow, OperationRow, Row, RowKind, TradeRow};

// Operations keyed by (tx_hash, op_index). The source account falls back
// to the transaction source when the operation has none of its own.
pub struct OperationExtractor;

impl Extractor for OperationExtractor {
    fn kind(&self) -> RowKind {
        RowKind::Operations
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        let mut rows = Vec::new();

        for tx in &ctx.close.transactions {
            for (op_index, op) in tx.operations.iter().enumerate() {
                let source_account = op
                    .source_account
                    .clone()
                    .unwrap_or_else(|| tx.source_account.clone());

                rows.push(Row::Operation(
                    ctx.meta(),
                    OperationRow {
                        tx_hash: tx.tx_hash.clone(),
                        op_index: op_index as u32,
                        op_type: op.kind.to_string(),
                        source_account,
                        destination: normalize_opt(op.destination.clone()),
                        asset: op.asset.as_ref().map(|a| a.canonical()),
                        amount: op.amount,
                        successful: tx.successful && op.successful,
                    },
                ));
            }
        }

        Ok(rows)
    }
}

// Effects keyed by (tx_hash, op_index, effect_index)
pub struct EffectExtractor;

impl Extractor for EffectExtractor {
    fn kind(&self) -> RowKind {
        RowKind::Effects
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        let mut rows = Vec::new();

        for tx in &ctx.close.transactions {
            for (op_index, op) in tx.operations.iter().enumerate() {
                for (effect_index, effect) in op.effects.iter().enumerate() {
                    rows.push(Row::Effect(
                        ctx.meta(),
                        EffectRow {
                            tx_hash: tx.tx_hash.clone(),
                            op_index: op_index as u32,
                            effect_index: effect_index as u32,
                            effect_type: effect.kind.to_string(),
                            account: effect.account.clone(),
                            asset: effect.asset.as_ref().map(|a| a.canonical()),
                            amount: effect.amount,
                        },
                    ));
                }
            }
        }

        Ok(rows)
    }
}

// Trades keyed by (tx_hash, op_index, trade_index)
pub struct TradeExtractor;

impl Extractor for TradeExtractor {
    fn kind(&self) -> RowKind {
        RowKind::Trades
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        let mut rows = Vec::new();

        for tx in &ctx.close.transactions {
            for (op_index, op) in tx.operations.iter().enumerate() {
                for (trade_index, trade) in op.trades.iter().enumerate() {
                    rows.push(Row::Trade(
                        ctx.meta(),
                        TradeRow {
                            tx_hash: tx.tx_hash.clone(),
                            op_index: op_index as u32,
                            trade_index: trade_index as u32,
                            base_account: trade.base_account.clone(),
                            base_asset: trade.base_asset.canonical(),
                            base_amount: trade.base_amount,
                            counter_account: trade.counter_account.clone(),
                            counter_asset: trade.counter_asset.canonical(),
                            counter_amount: trade.counter_amount,
                            price_n: trade.price_n,
                            price_d: trade.price_d,
                        },
                    ));
                }
            }
        }

        Ok(rows)
    }
}
