use super::{normalize_opt, ExtractContext, Extractor};
use crate::core::error::PipelineError;
use indexmap::IndexMap;
use lumenlake_common::{
    ledger::{ChangeKind, LedgerEntry},
    rows::{
        AccountRow, ClaimableBalanceRow, LiquidityPoolRow, OfferRow, Row, RowKind, TrustlineRow,
    },
};

// Snapshot extractors walk the state changes of a ledger in apply order
// and keep the last write per entity. A ledger touching the same key
// several times emits exactly one row: the final state, or a tombstone
// when the last change removed the entry.
fn last_writes<'a, F>(
    ctx: &'a ExtractContext<'_>,
    mut build: F,
) -> Vec<Row>
where
    F: FnMut(&'a LedgerEntry, ChangeKind) -> Option<(String, Row)>,
{
    let mut rows: IndexMap<String, Row> = IndexMap::new();

    for tx in &ctx.close.transactions {
        for change in &tx.changes {
            if let Some((entity_id, row)) = build(&change.entry, change.kind) {
                // Replaces the value, keeps first-seen emit order
                rows.insert(entity_id, row);
            }
        }
    }

    rows.into_values().collect()
}

pub struct AccountExtractor;

impl Extractor for AccountExtractor {
    fn kind(&self) -> RowKind {
        RowKind::Accounts
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        Ok(last_writes(ctx, |entry, kind| match entry {
            LedgerEntry::Account(account) => Some((
                entry.entity_id(),
                Row::Account(
                    ctx.meta(),
                    AccountRow {
                        account_id: account.account_id.clone(),
                        balance: account.balance,
                        sequence: account.sequence,
                        num_subentries: account.num_subentries,
                        inflation_dest: normalize_opt(account.inflation_dest.clone()),
                        home_domain: normalize_opt(account.home_domain.clone()),
                        flags: account.flags,
                        deleted: kind.is_removed(),
                    },
                ),
            )),
            _ => None,
        }))
    }
}

pub struct TrustlineExtractor;

impl Extractor for TrustlineExtractor {
    fn kind(&self) -> RowKind {
        RowKind::Trustlines
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        Ok(last_writes(ctx, |entry, kind| match entry {
            LedgerEntry::Trustline(trustline) => Some((
                entry.entity_id(),
                Row::Trustline(
                    ctx.meta(),
                    TrustlineRow {
                        account_id: trustline.account_id.clone(),
                        asset: trustline.asset.canonical(),
                        balance: trustline.balance,
                        limit: trustline.limit,
                        buying_liabilities: trustline.buying_liabilities,
                        selling_liabilities: trustline.selling_liabilities,
                        authorized: trustline.authorized,
                        deleted: kind.is_removed(),
                    },
                ),
            )),
            _ => None,
        }))
    }
}

pub struct OfferExtractor;

impl Extractor for OfferExtractor {
    fn kind(&self) -> RowKind {
        RowKind::Offers
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        Ok(last_writes(ctx, |entry, kind| match entry {
            LedgerEntry::Offer(offer) => Some((
                entry.entity_id(),
                Row::Offer(
                    ctx.meta(),
                    OfferRow {
                        offer_id: offer.offer_id,
                        seller_id: offer.seller_id.clone(),
                        selling_asset: offer.selling.canonical(),
                        buying_asset: offer.buying.canonical(),
                        amount: offer.amount,
                        price_n: offer.price_n,
                        price_d: offer.price_d,
                        flags: offer.flags,
                        deleted: kind.is_removed(),
                    },
                ),
            )),
            _ => None,
        }))
    }
}

pub struct ClaimableBalanceExtractor;

impl Extractor for ClaimableBalanceExtractor {
    fn kind(&self) -> RowKind {
        RowKind::ClaimableBalances
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        Ok(last_writes(ctx, |entry, kind| match entry {
            LedgerEntry::ClaimableBalance(balance) => Some((
                entry.entity_id(),
                Row::ClaimableBalance(
                    ctx.meta(),
                    ClaimableBalanceRow {
                        balance_id: balance.balance_id.clone(),
                        asset: balance.asset.canonical(),
                        amount: balance.amount,
                        sponsor: normalize_opt(balance.sponsor.clone()),
                        claimants: balance.claimants,
                        deleted: kind.is_removed(),
                    },
                ),
            )),
            _ => None,
        }))
    }
}

pub struct LiquidityPoolExtractor;

impl Extractor for LiquidityPoolExtractor {
    fn kind(&self) -> RowKind {
        RowKind::LiquidityPools
    }

    fn extract(&self, ctx: &ExtractContext<'_>) -> Result<Vec<Row>, PipelineError> {
        Ok(last_writes(ctx, |entry, kind| match entry {
            LedgerEntry::LiquidityPool(pool) => Some((
                entry.entity_id(),
                Row::LiquidityPool(
                    ctx.meta(),
                    LiquidityPoolRow {
                        pool_id: pool.pool_id.clone(),
                        fee_bp: pool.fee_bp,
                        asset_a: pool.asset_a.canonical(),
                        asset_b: pool.asset_b.canonical(),
                        reserve_a: pool.reserve_a,
                        reserve_b: pool.reserve_b,
                        total_shares: pool.total_shares,
                        trustline_count: pool.trustline_count,
                        deleted: kind.is_removed(),
                    },
                ),
            )),
            _ => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{config, sample_raw};
    use super::*;

    fn rows<E: Extractor>(extractor: E) -> Vec<Row> {
        let raw = sample_raw(6);
        let close = raw.decode().unwrap();
        let ctx = ExtractContext {
            raw: &raw,
            close: &close,
            config: &config(),
        };
        extractor.extract(&ctx).unwrap()
    }

    #[test]
    fn test_account_last_write_wins() {
        // The sample ledger updates GSRC twice; only the final balance
        // survives
        let rows = rows(AccountExtractor);
        assert_eq!(rows.len(), 1);
        match &rows[0] {
            Row::Account(_, account) => {
                assert_eq!(account.account_id, "GSRC");
                assert_eq!(account.balance, 8_500);
                assert!(!account.deleted);
            }
            other => panic!("unexpected row {:?}", other),
        }
    }

    #[test]
    fn test_trustline_tombstone_emitted() {
        let rows = rows(TrustlineExtractor);
        assert_eq!(rows.len(), 1);
        match &rows[0] {
            Row::Trustline(_, trustline) => {
                assert!(trustline.deleted);
                assert_eq!(trustline.asset, "USD:GISS");
            }
            other => panic!("unexpected row {:?}", other),
        }
    }

    #[test]
    fn test_unrelated_entries_ignored() {
        assert!(rows(OfferExtractor).is_empty());
        assert!(rows(ClaimableBalanceExtractor).is_empty());
        assert!(rows(LiquidityPoolExtractor).is_empty());
    }
}
