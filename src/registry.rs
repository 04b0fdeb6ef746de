//! Single source of truth for which sub-services exist and which are
//! currently eligible to be called.
//!
//! The registry never probes anything itself. Callers report failures with
//! [`ServerRegistry::mark_unhealthy`]; an entry becomes eligible again once
//! the configured cooldown has elapsed.

use std::collections::BTreeSet;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ServicesConfig;

/// Where and how to reach a registered sub-service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub address: String,
    pub capabilities: Vec<String>,
}

impl Endpoint {
    pub fn supports(&self, operation: &str) -> bool {
        self.capabilities.is_empty() || self.capabilities.iter().any(|c| c == operation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("service '{name}' is not registered")]
    NotRegistered { name: String },

    #[error("service '{name}' is unhealthy, eligible again in {retry_in_ms}ms")]
    CoolingDown { name: String, retry_in_ms: u64 },
}

#[derive(Debug)]
struct Entry {
    endpoint: Endpoint,
    unhealthy_since: Option<Instant>,
}

/// Row of [`ServerRegistry::entries`], for display.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryEntry {
    pub endpoint: Endpoint,
    pub healthy: bool,
}

/// Registered sub-services keyed by logical name.
///
/// Mutations lock only the entry's shard, so a `register` or
/// `mark_unhealthy` on one name does not hold up `resolve` of another.
#[derive(Debug)]
pub struct ServerRegistry {
    entries: DashMap<String, Entry>,
    cooldown: Duration,
}

impl ServerRegistry {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            cooldown,
        }
    }

    /// Build a registry pre-populated with every configured sub-service.
    pub fn from_config(services: &ServicesConfig, cooldown: Duration) -> Self {
        let registry = Self::new(cooldown);
        for (name, service) in services.iter() {
            registry.register(name, &service.address, service.capabilities.clone());
        }
        registry
    }

    /// Register or update a sub-service.
    ///
    /// Re-registering the same name replaces its address and capabilities.
    /// An unhealthy mark survives only if the address is unchanged.
    pub fn register(&self, name: &str, address: &str, capabilities: Vec<String>) {
        let endpoint = Endpoint {
            name: name.to_string(),
            address: address.trim_end_matches('/').to_string(),
            capabilities,
        };

        match self.entries.get_mut(name) {
            Some(mut entry) => {
                if entry.endpoint.address != endpoint.address {
                    entry.unhealthy_since = None;
                }
                debug!(service = name, address = %endpoint.address, "updated registration");
                entry.endpoint = endpoint;
            }
            None => {
                info!(service = name, address = %endpoint.address, "registered sub-service");
                self.entries.insert(
                    name.to_string(),
                    Entry {
                        endpoint,
                        unhealthy_since: None,
                    },
                );
            }
        }
    }

    /// Look up an eligible endpoint.
    pub fn resolve(&self, name: &str) -> Result<Endpoint, RegistryError> {
        let mut entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotRegistered {
                name: name.to_string(),
            })?;

        if let Some(since) = entry.unhealthy_since {
            let elapsed = since.elapsed();
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                return Err(RegistryError::CoolingDown {
                    name: name.to_string(),
                    retry_in_ms: remaining.as_millis() as u64,
                });
            }
            debug!(service = name, "cooldown elapsed, service eligible again");
            entry.unhealthy_since = None;
        }

        Ok(entry.endpoint.clone())
    }

    /// Record a failed call. Unknown names are ignored.
    pub fn mark_unhealthy(&self, name: &str) {
        if let Some(mut entry) = self.entries.get_mut(name) {
            warn!(
                service = name,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "marking sub-service unhealthy"
            );
            entry.unhealthy_since = Some(Instant::now());
        }
    }

    /// Names that `resolve` would currently succeed for.
    pub fn healthy_snapshot(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|entry| self.is_eligible(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// All registrations with their current eligibility, sorted by name.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        let mut rows: Vec<RegistryEntry> = self
            .entries
            .iter()
            .map(|entry| RegistryEntry {
                endpoint: entry.endpoint.clone(),
                healthy: self.is_eligible(entry.value()),
            })
            .collect();
        rows.sort_by(|a, b| a.endpoint.name.cmp(&b.endpoint.name));
        rows
    }

    fn is_eligible(&self, entry: &Entry) -> bool {
        entry
            .unhealthy_since
            .is_none_or(|since| since.elapsed() >= self.cooldown)
    }
}
