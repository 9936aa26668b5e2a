use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use strum::{Display, EnumIter, IntoEnumIterator};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Source,
    WorkerPool,
    HotWriter,
    Flusher,
    Maintenance,
    Catalog,
    Rpc,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Healthy,
    Degraded,
    Unhealthy,
}

// Component-level health, aggregated for the /health endpoint.
// Worst component state wins overall.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    states: DashMap<Component, ComponentState>,
}

pub type SharedHealth = Arc<HealthRegistry>;

impl HealthRegistry {
    pub fn new() -> SharedHealth {
        let registry = HealthRegistry {
            states: DashMap::new(),
        };
        for component in Component::iter() {
            registry.states.insert(component, ComponentState::Healthy);
        }
        Arc::new(registry)
    }

    pub fn set(&self, component: Component, state: ComponentState) {
        self.states.insert(component, state);
    }

    pub fn get(&self, component: Component) -> ComponentState {
        self.states
            .get(&component)
            .map(|entry| *entry.value())
            .unwrap_or(ComponentState::Unhealthy)
    }

    pub fn overall(&self) -> ComponentState {
        self.states
            .iter()
            .map(|entry| *entry.value())
            .max()
            .unwrap_or(ComponentState::Unhealthy)
    }

    pub fn snapshot(&self) -> HealthReport {
        HealthReport {
            status: self.overall(),
            components: self
                .states
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ComponentState,
    pub components: BTreeMap<Component, ComponentState>,
}
