use crate::crypto::Hash;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// Storage tier of a dataset. Bronze is the raw extraction, silver carries
// derived or enriched streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bronze,
    Silver,
}

// How rows of a dataset relate to ledger time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Grain {
    // One row per logical event, immutable once emitted
    Event,
    // One row per entity per ledger where its state changed
    Snapshot,
    // Latest state only, maintained by overlay at read time
    Current,
}

// Schema evolution contract within a (era, version)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    // Only additive column appends at the end of the schema
    Additive,
    // Any change requires a new version_label
    Frozen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub tier: Tier,
    pub grain: Grain,
    pub schema_hash: Hash,
    pub compatibility: Compatibility,
    pub era_id: String,
    pub version_label: String,
}
