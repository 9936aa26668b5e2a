// SQL text contracts for the external lake engine. The engine is a black
// box: the pipeline only emits the statements, it never parses results.

use super::{LineagePartition, NewPartition};
use lumenlake_common::ledger::LedgerSequence;

pub const DDL_META_ERAS: &str = "\
CREATE TABLE IF NOT EXISTS _meta_eras (
    era_id          VARCHAR PRIMARY KEY,
    network         VARCHAR NOT NULL,
    version_label   VARCHAR NOT NULL,
    ledger_start    BIGINT NOT NULL,
    ledger_end      BIGINT,
    protocol_min    INTEGER,
    protocol_max    INTEGER,
    status          VARCHAR NOT NULL,
    schema_epoch    INTEGER NOT NULL,
    pas_chain_head  VARCHAR,
    created_at      TIMESTAMP NOT NULL,
    frozen_at       TIMESTAMP
)";

pub const DDL_META_DATASETS: &str = "\
CREATE TABLE IF NOT EXISTS _meta_datasets (
    name            VARCHAR PRIMARY KEY,
    tier            VARCHAR NOT NULL,
    grain           VARCHAR NOT NULL,
    schema_hash     VARCHAR NOT NULL,
    compatibility   VARCHAR NOT NULL,
    era_id          VARCHAR NOT NULL,
    version_label   VARCHAR NOT NULL,
    updated_at      TIMESTAMP NOT NULL
)";

pub const DDL_META_LINEAGE: &str = "\
CREATE TABLE IF NOT EXISTS _meta_lineage (
    id              BIGINT PRIMARY KEY,
    dataset         VARCHAR NOT NULL,
    era_id          VARCHAR NOT NULL,
    version_label   VARCHAR NOT NULL,
    ledger_start    BIGINT NOT NULL,
    ledger_end      BIGINT NOT NULL,
    file_path       VARCHAR NOT NULL,
    checksum        VARCHAR NOT NULL,
    row_count       BIGINT NOT NULL,
    bytes           BIGINT NOT NULL,
    pas_verified    BOOLEAN NOT NULL,
    created_at      TIMESTAMP NOT NULL,
    UNIQUE (dataset, era_id, version_label, ledger_start, ledger_end)
)";

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

// Idempotent lineage upsert keyed on the unique range tuple, so a
// retried commit whose upload got a fresh file name is still a no-op
pub fn insert_lineage_sql(partition: &NewPartition) -> String {
    format!(
        "INSERT INTO _meta_lineage \
         (id, dataset, era_id, version_label, ledger_start, ledger_end, file_path, checksum, row_count, bytes, pas_verified, created_at) \
         VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, FALSE, CURRENT_TIMESTAMP) \
         ON CONFLICT (dataset, era_id, version_label, ledger_start, ledger_end) DO NOTHING",
        partition.snapshot_id,
        quote(&partition.dataset),
        quote(&partition.era_id),
        quote(&partition.version_label),
        partition.ledger_start,
        partition.ledger_end,
        quote(&partition.file_path),
        quote(&partition.checksum.to_hex()),
        partition.row_count,
        partition.bytes,
    )
}

// Read filter pinning a query to one (era, version) so a concurrent
// re-ingestion under a newer version label can never leak rows in.
pub fn select_dataset_sql(
    dataset: &str,
    era_id: &str,
    version_label: &str,
    range: Option<(LedgerSequence, LedgerSequence)>,
) -> String {
    let mut sql = format!(
        "SELECT * FROM {} WHERE era_id = {} AND version_label = {}",
        dataset,
        quote(era_id),
        quote(version_label)
    );
    if let Some((start, end)) = range {
        sql.push_str(&format!(
            " AND ledger_sequence BETWEEN {} AND {}",
            start, end
        ));
    }
    sql.push_str(" ORDER BY ledger_sequence");
    sql
}

// Latest-version-wins overlay: one row per partition key, preferring the
// highest (era_id, version_label)
pub fn latest_version_window_sql(
    dataset: &str,
    partition_key: &str,
    range: Option<(LedgerSequence, LedgerSequence)>,
) -> String {
    let range_filter = match range {
        Some((start, end)) => format!(
            " WHERE ledger_sequence BETWEEN {} AND {}",
            start, end
        ),
        None => String::new(),
    };
    format!(
        "SELECT * EXCLUDE (_rn) FROM (\
         SELECT *, ROW_NUMBER() OVER (\
         PARTITION BY {key} ORDER BY era_id DESC, version_label DESC\
         ) AS _rn FROM {dataset}{range_filter}\
         ) WHERE _rn = 1",
        key = partition_key,
        dataset = dataset,
        range_filter = range_filter,
    )
}

// Row used by scenario tooling to re-emit lineage from catalog state
pub fn lineage_values_sql(partition: &LineagePartition) -> String {
    format!(
        "({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
        partition.id,
        quote(&partition.dataset),
        quote(&partition.era_id),
        quote(&partition.version_label),
        partition.ledger_start,
        partition.ledger_end,
        quote(&partition.file_path),
        quote(&partition.checksum.to_hex()),
        partition.row_count,
        partition.bytes,
        partition.pas_verified,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenlake_common::crypto::sha256;

    #[test]
    fn test_insert_lineage_sql_upserts() {
        let partition = NewPartition {
            snapshot_id: 7,
            dataset: "operations".to_owned(),
            era_id: "mainnet-001".to_owned(),
            version_label: "v1".to_owned(),
            ledger_start: 1,
            ledger_end: 10,
            file_path: "operations/ledger_range=0/part-7-x.parquet".to_owned(),
            checksum: sha256(b"x"),
            row_count: 12,
            bytes: 512,
            pas_verified: false,
        };
        let sql = insert_lineage_sql(&partition);
        assert!(sql.contains(
            "ON CONFLICT (dataset, era_id, version_label, ledger_start, ledger_end)"
        ));
        assert!(sql.contains("'operations'"));
    }

    #[test]
    fn test_select_filters_era_and_version() {
        let sql = select_dataset_sql("operations", "mainnet-001", "v1", Some((1, 10)));
        assert!(sql.contains("era_id = 'mainnet-001'"));
        assert!(sql.contains("version_label = 'v1'"));
        assert!(sql.contains("BETWEEN 1 AND 10"));
    }

    #[test]
    fn test_window_orders_by_era_and_version_desc() {
        let sql = latest_version_window_sql("accounts", "account_id", None);
        assert!(sql.contains("PARTITION BY account_id"));
        assert!(sql.contains("ORDER BY era_id DESC, version_label DESC"));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("o'neill"), "'o''neill'");
    }
}
