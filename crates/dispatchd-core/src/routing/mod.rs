//! Routing resolver: `(model, requested_version?, identity_key?) ->
//! (model, version)` via static / canary / A-B strategies.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// One entry in the routing table: how to pick a version for a model
/// when the caller didn't ask for one explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RouteStrategy {
    Static {
        version: String,
    },
    Canary {
        primary: String,
        canary: String,
        canary_percent: u8,
    },
    Ab {
        /// Insertion order matters: ties are broken by walking variants
        /// in the order they appear here.
        variants: Vec<(String, u8)>,
    },
}

/// The full routing table, keyed by model name. Loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingTable {
    #[serde(default)]
    pub routes: HashMap<String, RouteStrategy>,
}

impl RoutingTable {
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("reading routing table: {e}")))?;
        let table: RoutingTable = toml::from_str(&contents)?;
        Ok(table)
    }
}

pub struct RoutingResolver {
    table: RoutingTable,
}

impl RoutingResolver {
    pub fn new(table: RoutingTable) -> Self {
        Self { table }
    }

    /// Resolves `(model, version)`. Explicit `requested_version`
    /// always wins and is returned unvalidated — the registry is the
    /// one that rejects an unknown version.
    pub fn resolve(
        &self,
        model: &str,
        requested_version: Option<&str>,
        identity_key: Option<&str>,
    ) -> Result<(String, String)> {
        if let Some(v) = requested_version {
            if !v.is_empty() {
                return Ok((model.to_string(), v.to_string()));
            }
        }

        let route = self
            .table
            .routes
            .get(model)
            .ok_or_else(|| Error::Routing(format!("no route configured for model {model}")))?;

        let version = match route {
            RouteStrategy::Static { version } => version.clone(),
            RouteStrategy::Canary { primary, canary, canary_percent } => {
                let draw: u8 = rand::thread_rng().gen_range(1..=100);
                if draw < *canary_percent {
                    canary.clone()
                } else {
                    primary.clone()
                }
            }
            RouteStrategy::Ab { variants } => {
                let identity_key = identity_key
                    .ok_or_else(|| Error::Routing(format!("model {model} needs an identity key for A/B routing")))?;
                pick_ab_variant(variants, identity_key)
            }
        };

        Ok((model.to_string(), version))
    }
}

/// Stable-hash the identity key to a bucket in `[0, 99]`, then walk
/// the variants in insertion order accumulating weight until the
/// bucket falls below the running sum. If weights don't sum to 100
/// the final variant silently captures the remainder.
fn pick_ab_variant(variants: &[(String, u8)], identity_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity_key.as_bytes());
    let digest = hasher.finalize();

    // Reduce the 256-bit digest modulo 100 using its low bytes as a
    // big-endian integer, matching a `hash % 100` over the full value.
    let mut bucket: u32 = 0;
    for byte in digest.iter() {
        bucket = (bucket * 256 + *byte as u32) % 100;
    }

    let mut running = 0u32;
    for (version, weight) in variants {
        running += *weight as u32;
        if bucket < running {
            return version.clone();
        }
    }
    // Weights didn't sum to 100 (or summed to less): remainder goes to
    // the last variant.
    variants.last().map(|(v, _)| v.clone()).unwrap_or_default()
}

/// Default fixture table: mirrors the example configuration this
/// system's routing behavior was validated against.
pub fn default_routing_table() -> RoutingTable {
    let mut routes = HashMap::new();
    routes.insert(
        "echo".to_string(),
        RouteStrategy::Canary { primary: "v1".to_string(), canary: "v2".to_string(), canary_percent: 50 },
    );
    routes.insert(
        "classifier".to_string(),
        RouteStrategy::Ab { variants: vec![("v1".to_string(), 50), ("v2".to_string(), 50)] },
    );
    routes.insert("stable_model".to_string(), RouteStrategy::Static { version: "v3".to_string() });
    RoutingTable { routes }
}
