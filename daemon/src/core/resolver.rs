use crate::{
    config::RESOLVER_CACHE_SIZE,
    core::{
        catalog::{sql, Catalog, LineagePartition},
        error::PipelineError,
    },
};
use log::trace;
use lru::LruCache;
use lumenlake_common::{
    crypto::Hash,
    dataset::Grain,
    era::Era,
    ledger::{LedgerSequence, ProtocolVersion},
    network::Network,
    pas::manifest_hash,
    rows::RowKind,
    time::TimestampMicros,
};
use serde::{Deserialize, Serialize};
use std::{
    num::NonZeroUsize,
    str::FromStr,
    sync::Mutex,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentMode {
    Latest,
    AsOfLedger,
    AsOfProtocol,
    Explicit,
}

// What a reader wants; the resolver turns it into a pinned (era, version)
// plus coverage and an optional deterministic file manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub mode: IntentMode,
    pub network: Network,
    pub ledger: Option<LedgerSequence>,
    pub protocol: Option<ProtocolVersion>,
    pub era_id: Option<String>,
    pub version_label: Option<String>,
    pub range: Option<(LedgerSequence, LedgerSequence)>,
    pub strict_pas: bool,
}

impl Intent {
    pub fn latest(network: Network) -> Self {
        Self {
            mode: IntentMode::Latest,
            network,
            ledger: None,
            protocol: None,
            era_id: None,
            version_label: None,
            range: None,
            strict_pas: false,
        }
    }

    pub fn as_of_ledger(network: Network, ledger: LedgerSequence) -> Self {
        Self {
            mode: IntentMode::AsOfLedger,
            ledger: Some(ledger),
            ..Self::latest(network)
        }
    }

    pub fn as_of_protocol(network: Network, protocol: ProtocolVersion) -> Self {
        Self {
            mode: IntentMode::AsOfProtocol,
            protocol: Some(protocol),
            ..Self::latest(network)
        }
    }

    pub fn explicit(network: Network, era_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            mode: IntentMode::Explicit,
            era_id: Some(era_id.into()),
            version_label: Some(version.into()),
            ..Self::latest(network)
        }
    }

    // Command vocabulary of the query surface: "latest", "as_of_ledger:N",
    // "as_of_protocol:P", "explicit:{era}:{version}"
    pub fn parse_command(command: &str, network: Network) -> Result<Self, PipelineError> {
        let mut parts = command.splitn(3, ':');
        match parts.next() {
            Some("latest") => Ok(Self::latest(network)),
            Some("as_of_ledger") => {
                let ledger = parts
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| PipelineError::Config(format!("bad command: {}", command)))?;
                Ok(Self::as_of_ledger(network, ledger))
            }
            Some("as_of_protocol") => {
                let protocol = parts
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| PipelineError::Config(format!("bad command: {}", command)))?;
                Ok(Self::as_of_protocol(network, protocol))
            }
            Some("explicit") => {
                let era = parts
                    .next()
                    .ok_or_else(|| PipelineError::Config(format!("bad command: {}", command)))?;
                let version = parts
                    .next()
                    .ok_or_else(|| PipelineError::Config(format!("bad command: {}", command)))?;
                Ok(Self::explicit(network, era, version))
            }
            _ => Err(PipelineError::Config(format!("bad command: {}", command))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub committed_ranges: Vec<(LedgerSequence, LedgerSequence)>,
    pub tail_ledger: LedgerSequence,
    pub gaps: Vec<(LedgerSequence, LedgerSequence)>,
    pub last_verified: Option<TimestampMicros>,
    pub total_rows: u64,
}

impl Coverage {
    pub fn is_continuous(&self) -> bool {
        self.gaps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub file: String,
    pub checksum: Hash,
    pub rows: u64,
}

// Deterministic answer to a bounded query: the exact files, their
// checksums and the snapshot frontier at resolution time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadManifest {
    pub files: Vec<ManifestFile>,
    pub total_rows: u64,
    pub snapshot_id: u64,
    pub manifest_checksum: Hash,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedDataset {
    pub dataset: String,
    pub network: Network,
    pub era_id: String,
    pub version_label: String,
    pub schema_hash: Hash,
    pub coverage: Coverage,
    pub manifest: Option<ReadManifest>,
    pub pas_verified: bool,
    // Read filter for the lake engine, pinned to (era_id, version_label)
    pub sql: String,
}

struct CachedCoverage {
    at: Instant,
    generation: u64,
    coverage: Coverage,
}

// Intent-based routing to the right (era, version) with TTL-cached
// coverage. Cache entries also die when the lineage generation moves, so
// a lineage append invalidates instantly.
pub struct Resolver {
    cache: Mutex<LruCache<String, CachedCoverage>>,
    ttl: Duration,
}

impl Resolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(RESOLVER_CACHE_SIZE).expect("cache size"),
            )),
            ttl,
        }
    }

    pub fn resolve(
        &self,
        catalog: &Catalog,
        dataset: &str,
        intent: &Intent,
    ) -> Result<ResolvedDataset, PipelineError> {
        let kind = RowKind::from_str(dataset)
            .map_err(|_| PipelineError::DatasetNotFound(dataset.to_owned()))?;

        let era = self.route(catalog, intent)?;
        let version_label = intent
            .version_label
            .clone()
            .unwrap_or_else(|| era.version_label.clone());

        if intent.mode == IntentMode::Explicit {
            // Exact match required
            if era.version_label != version_label
                && catalog
                    .list_partitions(dataset, Some(&era.era_id), Some(&version_label))?
                    .is_empty()
            {
                return Err(PipelineError::NotFound(format!(
                    "{}/{}",
                    era.era_id, version_label
                )));
            }
        }

        let coverage = self.coverage(catalog, dataset, &era.era_id, &version_label)?;
        let partitions =
            catalog.list_partitions(dataset, Some(&era.era_id), Some(&version_label))?;

        let in_scope: Vec<&LineagePartition> = match intent.range {
            Some((start, end)) => partitions
                .iter()
                .filter(|p| p.overlaps(start, end))
                .collect(),
            None => partitions.iter().collect(),
        };

        let pas_verified = !in_scope.is_empty() && in_scope.iter().all(|p| p.pas_verified);
        if intent.strict_pas && !pas_verified {
            return Err(PipelineError::PasUnverified(format!(
                "{}/{}/{}",
                dataset, era.era_id, version_label
            )));
        }

        // The snapshot frontier at resolution time, so two identical
        // requests resolved against the same lineage answer identically
        let snapshot_id = partitions.iter().map(|p| p.id).max().unwrap_or(0);

        let manifest = intent.range.map(|_| {
            let mut files: Vec<&LineagePartition> = in_scope.clone();
            files.sort_by_key(|p| (p.ledger_start, p.id));

            let entries: Vec<ManifestFile> = files
                .iter()
                .map(|p| ManifestFile {
                    file: p.file_path.clone(),
                    checksum: p.checksum.clone(),
                    rows: p.row_count,
                })
                .collect();
            let pairs: Vec<(String, Hash)> = entries
                .iter()
                .map(|f| (f.file.clone(), f.checksum.clone()))
                .collect();

            ReadManifest {
                total_rows: entries.iter().map(|f| f.rows).sum(),
                manifest_checksum: manifest_hash(&pairs),
                snapshot_id,
                files: entries,
            }
        });

        let sql = match kind.grain() {
            Grain::Snapshot | Grain::Current => sql::latest_version_window_sql(
                dataset,
                entity_columns(kind),
                intent.range,
            ),
            Grain::Event => {
                sql::select_dataset_sql(dataset, &era.era_id, &version_label, intent.range)
            }
        };

        trace!(
            "resolved {} -> {}/{} ({} partitions in scope)",
            dataset,
            era.era_id,
            version_label,
            in_scope.len()
        );

        Ok(ResolvedDataset {
            dataset: dataset.to_owned(),
            network: intent.network,
            era_id: era.era_id,
            version_label,
            schema_hash: kind.schema_hash(),
            coverage,
            manifest,
            pas_verified,
            sql,
        })
    }

    fn route(&self, catalog: &Catalog, intent: &Intent) -> Result<Era, PipelineError> {
        match intent.mode {
            IntentMode::Latest => catalog.active_era(intent.network),
            IntentMode::AsOfLedger => {
                let ledger = intent.ledger.ok_or_else(|| {
                    PipelineError::Config("as_of_ledger without a ledger".to_owned())
                })?;
                catalog.lookup_era_by_ledger(intent.network, ledger)
            }
            IntentMode::AsOfProtocol => {
                let protocol = intent.protocol.ok_or_else(|| {
                    PipelineError::Config("as_of_protocol without a protocol".to_owned())
                })?;
                catalog.lookup_era_by_protocol(intent.network, protocol)
            }
            IntentMode::Explicit => {
                let era_id = intent
                    .era_id
                    .as_deref()
                    .ok_or_else(|| PipelineError::Config("explicit without era".to_owned()))?;
                catalog
                    .get_era(era_id)
                    .map_err(|_| PipelineError::NotFound(era_id.to_owned()))
            }
        }
    }

    // Coverage from lineage, cached per (dataset, era, version)
    fn coverage(
        &self,
        catalog: &Catalog,
        dataset: &str,
        era_id: &str,
        version_label: &str,
    ) -> Result<Coverage, PipelineError> {
        let key = format!("{}|{}|{}", dataset, era_id, version_label);
        let generation = catalog.generation();

        if let Some(entry) = self.cache.lock().expect("resolver cache").get(&key) {
            if entry.at.elapsed() < self.ttl && entry.generation == generation {
                return Ok(entry.coverage.clone());
            }
        }

        let partitions = catalog.list_partitions(dataset, Some(era_id), Some(version_label))?;
        let coverage = compute_coverage(&partitions);

        self.cache.lock().expect("resolver cache").put(
            key,
            CachedCoverage {
                at: Instant::now(),
                generation,
                coverage: coverage.clone(),
            },
        );
        Ok(coverage)
    }
}

// Window key for the latest-version-wins overlay of snapshot datasets
fn entity_columns(kind: RowKind) -> &'static str {
    match kind {
        RowKind::Accounts => "account_id",
        RowKind::Trustlines => "account_id, asset",
        RowKind::Offers => "offer_id",
        RowKind::ClaimableBalances => "balance_id",
        RowKind::LiquidityPools => "pool_id",
        RowKind::ContractData => "contract_id, key_hash",
        RowKind::ContractCode => "code_hash",
        RowKind::Ttl => "key_hash",
        // Event datasets never take the overlay path
        _ => "ledger_sequence",
    }
}

fn compute_coverage(partitions: &[LineagePartition]) -> Coverage {
    let mut ranges: Vec<(LedgerSequence, LedgerSequence)> = partitions
        .iter()
        .map(|p| (p.ledger_start, p.ledger_end))
        .collect();
    ranges.sort();

    // Merge adjacent/overlapping committed ranges
    let mut merged: Vec<(LedgerSequence, LedgerSequence)> = Vec::new();
    for (start, end) in ranges {
        match merged.last_mut() {
            Some((_, last_end)) if start <= last_end.saturating_add(1) => {
                *last_end = (*last_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }

    let mut gaps = Vec::new();
    for window in merged.windows(2) {
        let (_, end) = window[0];
        let (next_start, _) = window[1];
        if next_start > end + 1 {
            gaps.push((end + 1, next_start - 1));
        }
    }

    Coverage {
        tail_ledger: merged.last().map(|(_, end)| *end).unwrap_or(0),
        committed_ranges: merged,
        gaps,
        last_verified: partitions
            .iter()
            .filter(|p| p.pas_verified)
            .map(|p| p.created_at)
            .max(),
        total_rows: partitions.iter().map(|p| p.row_count).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::NewPartition;
    use lumenlake_common::{crypto::sha256, era::EraStatus};

    fn seed_era(catalog: &Catalog, era_id: &str, start: u32, end: Option<u32>) {
        catalog
            .register_era(&Era {
                era_id: era_id.to_owned(),
                network: Network::Mainnet,
                version_label: "v1".to_owned(),
                ledger_start: start,
                ledger_end: end,
                protocol_min: Some(20),
                protocol_max: end.map(|_| 20),
                status: if end.is_some() {
                    EraStatus::Frozen
                } else {
                    EraStatus::Active
                },
                schema_epoch: 1,
                pas_chain_head: None,
                created_at: 0,
                frozen_at: None,
            })
            .unwrap();
    }

    fn seed_partition(
        catalog: &Catalog,
        era_id: &str,
        version: &str,
        start: u32,
        end: u32,
    ) -> u64 {
        let snapshot_id = catalog.reserve_snapshot_id().unwrap();
        catalog
            .append_lineage(NewPartition {
                snapshot_id,
                dataset: "operations".to_owned(),
                era_id: era_id.to_owned(),
                version_label: version.to_owned(),
                ledger_start: start,
                ledger_end: end,
                file_path: format!("operations/ledger_range=0/part-{}-f.parquet", snapshot_id),
                checksum: sha256(&snapshot_id.to_be_bytes()),
                row_count: (end - start + 1) as u64,
                bytes: 100,
                pas_verified: false,
            })
            .unwrap()
    }

    #[test]
    fn test_latest_routes_to_active_era() {
        let catalog = Catalog::temporary().unwrap();
        seed_era(&catalog, "mainnet-001", 1, Some(99));
        seed_era(&catalog, "mainnet-002", 100, None);

        let resolver = Resolver::new(Duration::from_secs(300));
        let resolved = resolver
            .resolve(&catalog, "operations", &Intent::latest(Network::Mainnet))
            .unwrap();
        assert_eq!(resolved.era_id, "mainnet-002");
        assert_eq!(resolved.schema_hash, RowKind::Operations.schema_hash());
    }

    #[test]
    fn test_as_of_ledger_boundary() {
        let catalog = Catalog::temporary().unwrap();
        seed_era(&catalog, "mainnet-001", 1, Some(99));
        seed_era(&catalog, "mainnet-002", 100, None);
        let resolver = Resolver::new(Duration::from_secs(300));

        let e1 = resolver
            .resolve(
                &catalog,
                "operations",
                &Intent::as_of_ledger(Network::Mainnet, 99),
            )
            .unwrap();
        assert_eq!(e1.era_id, "mainnet-001");

        let e2 = resolver
            .resolve(
                &catalog,
                "operations",
                &Intent::as_of_ledger(Network::Mainnet, 100),
            )
            .unwrap();
        assert_eq!(e2.era_id, "mainnet-002");
    }

    #[test]
    fn test_explicit_missing_is_not_found() {
        let catalog = Catalog::temporary().unwrap();
        seed_era(&catalog, "mainnet-001", 1, None);
        let resolver = Resolver::new(Duration::from_secs(300));

        let err = resolver
            .resolve(
                &catalog,
                "operations",
                &Intent::explicit(Network::Mainnet, "mainnet-009", "v1"),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));

        let err = resolver
            .resolve(
                &catalog,
                "operations",
                &Intent::explicit(Network::Mainnet, "mainnet-001", "v9"),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_coverage_reports_gap() {
        let catalog = Catalog::temporary().unwrap();
        seed_era(&catalog, "mainnet-001", 1, None);
        seed_partition(&catalog, "mainnet-001", "v1", 1, 10);
        seed_partition(&catalog, "mainnet-001", "v1", 21, 30);

        let resolver = Resolver::new(Duration::from_secs(300));
        let resolved = resolver
            .resolve(&catalog, "operations", &Intent::latest(Network::Mainnet))
            .unwrap();

        assert_eq!(resolved.coverage.committed_ranges, vec![(1, 10), (21, 30)]);
        assert_eq!(resolved.coverage.gaps, vec![(11, 20)]);
        assert!(!resolved.coverage.is_continuous());
        assert_eq!(resolved.coverage.tail_ledger, 30);
        assert_eq!(resolved.coverage.total_rows, 20);
    }

    #[test]
    fn test_manifest_is_deterministic() {
        let catalog = Catalog::temporary().unwrap();
        seed_era(&catalog, "mainnet-001", 1, None);
        seed_partition(&catalog, "mainnet-001", "v1", 1, 10);
        seed_partition(&catalog, "mainnet-001", "v1", 11, 20);

        let resolver = Resolver::new(Duration::from_secs(300));
        let mut intent = Intent::latest(Network::Mainnet);
        intent.range = Some((1, 20));

        let first = resolver.resolve(&catalog, "operations", &intent).unwrap();
        let second = resolver.resolve(&catalog, "operations", &intent).unwrap();
        let a = first.manifest.unwrap();
        let b = second.manifest.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.files.len(), 2);
        assert_eq!(a.total_rows, 20);
        assert!(a.snapshot_id >= 2);
    }

    #[test]
    fn test_cache_invalidated_on_lineage_append() {
        let catalog = Catalog::temporary().unwrap();
        seed_era(&catalog, "mainnet-001", 1, None);
        seed_partition(&catalog, "mainnet-001", "v1", 1, 10);

        let resolver = Resolver::new(Duration::from_secs(300));
        let before = resolver
            .resolve(&catalog, "operations", &Intent::latest(Network::Mainnet))
            .unwrap();
        assert_eq!(before.coverage.tail_ledger, 10);

        seed_partition(&catalog, "mainnet-001", "v1", 11, 20);
        let after = resolver
            .resolve(&catalog, "operations", &Intent::latest(Network::Mainnet))
            .unwrap();
        assert_eq!(after.coverage.tail_ledger, 20);
    }

    #[test]
    fn test_strict_pas_requires_verified_partitions() {
        let catalog = Catalog::temporary().unwrap();
        seed_era(&catalog, "mainnet-001", 1, None);
        let id = seed_partition(&catalog, "mainnet-001", "v1", 1, 10);

        let resolver = Resolver::new(Duration::from_secs(300));
        let mut intent = Intent::latest(Network::Mainnet);
        intent.strict_pas = true;

        assert!(matches!(
            resolver.resolve(&catalog, "operations", &intent).unwrap_err(),
            PipelineError::PasUnverified(_)
        ));

        catalog.mark_pas_verified(id).unwrap();
        let resolved = resolver.resolve(&catalog, "operations", &intent).unwrap();
        assert!(resolved.pas_verified);
    }

    #[test]
    fn test_sql_pins_era_and_version() {
        let catalog = Catalog::temporary().unwrap();
        seed_era(&catalog, "mainnet-001", 1, None);
        let resolver = Resolver::new(Duration::from_secs(300));

        let events = resolver
            .resolve(&catalog, "operations", &Intent::latest(Network::Mainnet))
            .unwrap();
        assert!(events.sql.contains("era_id = 'mainnet-001'"));
        assert!(events.sql.contains("version_label = 'v1'"));

        let snapshots = resolver
            .resolve(&catalog, "accounts", &Intent::latest(Network::Mainnet))
            .unwrap();
        assert!(snapshots.sql.contains("PARTITION BY account_id"));
    }

    #[test]
    fn test_command_parsing() {
        let latest = Intent::parse_command("latest", Network::Mainnet).unwrap();
        assert_eq!(latest.mode, IntentMode::Latest);

        let as_of = Intent::parse_command("as_of_ledger:42", Network::Mainnet).unwrap();
        assert_eq!(as_of.ledger, Some(42));

        let explicit = Intent::parse_command("explicit:mainnet-001:v2", Network::Mainnet).unwrap();
        assert_eq!(explicit.era_id.as_deref(), Some("mainnet-001"));
        assert_eq!(explicit.version_label.as_deref(), Some("v2"));

        assert!(Intent::parse_command("bogus", Network::Mainnet).is_err());
    }
}
