//! Shipyard in-memory store
//!
//! [`InMemoryStore`] implements every repository trait of `shipyard-core`
//! over process memory:
//! - One `RwLock` guards all relational state, so each trait call is
//!   atomic and reads are point-in-time consistent
//! - Agent leases live in a `DashMap` keyed by agent name
//! - "Now" comes from the injected [`Clock`], so due-ness, staleness and
//!   lease expiry are deterministic in tests
//!
//! Not durable. Suitable for tests and single-process deployments.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod delivery_config;
mod fingerprint;
mod lock;
mod paused;
mod resource;
mod task;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use shipyard_core::{
    ArtifactType, Clock, ConstraintState, DeliveryConfig, DeliveryEvent, PinnedEnvironment,
    Resource, ResourceId, SystemClock, TaskRecord, VetoedVersion,
};

/// In-memory implementation of every repository trait
pub struct InMemoryStore {
    clock: Arc<dyn Clock>,
    inner: RwLock<Inner>,
    leases: DashMap<String, DateTime<Utc>>,
}

/// (config, environment, artifact type, artifact reference)
type EnvArtifactKey = (String, String, ArtifactType, String);

/// (config, environment, artifact reference, version, constraint type)
type ConstraintKey = (String, String, String, String, String);

#[derive(Default)]
struct Inner {
    configs: HashMap<String, ConfigRow>,
    resources: HashMap<ResourceId, ResourceRow>,
    history: HashMap<ResourceId, Vec<DeliveryEvent>>,
    versions: HashMap<(ArtifactType, String), Vec<String>>,
    environments: HashMap<EnvArtifactKey, EnvArtifactState>,
    constraint_states: HashMap<ConstraintKey, ConstraintState>,
    queued: BTreeSet<(String, String, String, String)>,
    paused_applications: HashSet<String>,
    paused_resources: HashSet<ResourceId>,
    fingerprints: HashMap<ResourceId, Fingerprint>,
    tasks: HashMap<String, TaskRecord>,
}

struct ConfigRow {
    config: DeliveryConfig,
    last_checked: Option<DateTime<Utc>>,
}

struct ResourceRow {
    resource: Resource,
    config_name: String,
    last_checked: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct EnvArtifactState {
    approved: Vec<(String, DateTime<Utc>)>,
    deploying: Option<String>,
    current: Option<String>,
    previous: Vec<String>,
    deployed: HashSet<String>,
    vetoed: Vec<VetoedVersion>,
    /// previously deployed version -> the vetoed version it stands in for
    rollback_targets: HashMap<String, String>,
    pin: Option<PinnedEnvironment>,
}

impl EnvArtifactState {
    fn is_vetoed(&self, version: &str) -> bool {
        self.vetoed.iter().any(|v| v.version == version)
    }

    fn is_approved(&self, version: &str) -> bool {
        self.approved.iter().any(|(v, _)| v == version)
    }
}

struct Fingerprint {
    hash: String,
    count: u32,
    action_taken: u32,
}

impl InMemoryStore {
    /// Store on the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store on an injected clock
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: RwLock::new(Inner::default()),
            leases: DashMap::new(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn env_key(config: &str, environment: &str, artifact_type: ArtifactType, reference: &str) -> EnvArtifactKey {
    (
        config.to_string(),
        environment.to_string(),
        artifact_type,
        reference.to_string(),
    )
}

/// Never-checked rows first, then oldest first, then by key
fn due<K: Ord + Clone>(
    rows: impl Iterator<Item = (K, Option<DateTime<Utc>>)>,
    cutoff: DateTime<Utc>,
    limit: usize,
) -> Vec<K> {
    let mut candidates: Vec<(Option<DateTime<Utc>>, K)> = rows
        .filter(|(_, last)| last.map_or(true, |at| at <= cutoff))
        .map(|(key, last)| (last, key))
        .collect();
    candidates.sort();
    candidates.into_iter().take(limit).map(|(_, key)| key).collect()
}

fn cutoff(now: DateTime<Utc>, min_age: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(min_age).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
