// crates/mesaplane-plugins/src/registry.rs
// ============================================================================
// Module: Plugin Registry
// Description: Loads, health-gates, and routes through out-of-process plugin
//              endpoints bound to the five extension slots.
// Purpose: Let community deployments run with zero plugins while giving
//          operator deployments a uniform load/health/routing protocol.
// Dependencies: mesaplane-core, mesaplane-executors, tokio
// ============================================================================

//! ## Overview
//! [`PluginRegistry`] is a `BTreeMap`-keyed collection of connected plugin
//! endpoints, one per slot, built by [`PluginRegistry::load`] from a set of
//! `{slot, address}` bindings. A background supervisor
//! ([`PluginRegistry::spawn_health_supervisor`]) re-probes every connected
//! plugin on a fixed interval and disables a slot the moment its plugin
//! stops serving; recovery is observed but requires a restart to take
//! effect, matching the core's stated supervision contract.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use mesaplane_core::AccessPolicyPlugin;
use mesaplane_core::AuthPlugin;
use mesaplane_core::CloudCredentialPlugin;
use mesaplane_core::HealthState;
use mesaplane_core::PluginHealth;
use mesaplane_core::PluginSlot;
use mesaplane_executors::ExecutorPlugin;
use url::Url;

use crate::client::HttpPluginClient;

/// Interval between periodic health re-probes of connected plugins.
pub const HEALTH_SUPERVISION_INTERVAL: Duration = Duration::from_secs(30);

/// One `{slot, address}` binding from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginBindingConfig {
    /// Slot name as configured (e.g. `"auth"`); unknown names are skipped.
    pub slot: String,
    /// RPC endpoint base URL.
    pub address: Url,
}

/// Outcome of attempting to load one binding, returned for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Plugin loaded and reported serving.
    Loaded {
        /// Slot filled.
        slot: PluginSlot,
        /// Negotiated protocol version, when reported.
        protocol: Option<u32>,
    },
    /// Plugin reported not-serving at load time; slot left empty.
    NotServing {
        /// Slot that was attempted.
        slot: PluginSlot,
    },
    /// Plugin endpoint could not be reached at load time.
    Unreachable {
        /// Slot that was attempted.
        slot: PluginSlot,
        /// Error detail, for logs only.
        detail: String,
    },
    /// Binding named an unrecognized slot; skipped.
    UnknownSlot {
        /// Raw slot name as configured.
        raw: String,
    },
}

/// A connected plugin endpoint together with its most recently observed health.
struct Connected {
    client: Arc<HttpPluginClient>,
    health: PluginHealth,
}

/// Registry of connected plugin endpoints, keyed by slot.
///
/// # Invariants
/// - Duplicate slot bindings are last-write-wins at load time.
/// - A slot absent from the map behaves per its documented empty-slot default.
pub struct PluginRegistry {
    slots: RwLock<BTreeMap<PluginSlot, Connected>>,
}

impl PluginRegistry {
    /// Loads `bindings`, probing each once with a 5 s deadline.
    ///
    /// Unknown slot names and unreachable/not-serving endpoints are recorded
    /// in the returned outcome list and otherwise leave the slot empty; this
    /// function never fails outright, matching the spec's fail-open load
    /// protocol for a registry with zero or partial plugins.
    pub async fn load(bindings: Vec<PluginBindingConfig>) -> (Self, Vec<LoadOutcome>) {
        let mut slots = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let Some(slot) = PluginSlot::parse(&binding.slot) else {
                outcomes.push(LoadOutcome::UnknownSlot { raw: binding.slot });
                continue;
            };
            let client = match HttpPluginClient::new(slot, binding.address) {
                Ok(client) => Arc::new(client),
                Err(err) => {
                    outcomes.push(LoadOutcome::Unreachable { slot, detail: err.to_string() });
                    continue;
                }
            };
            match client.health_check().await {
                Ok(HealthState::Serving) => {
                    let protocol = client.protocol_version();
                    slots.insert(slot, Connected { client, health: PluginHealth::Serving });
                    outcomes.push(LoadOutcome::Loaded { slot, protocol });
                }
                Ok(HealthState::NotServing) => {
                    outcomes.push(LoadOutcome::NotServing { slot });
                }
                Err(err) => {
                    outcomes.push(LoadOutcome::Unreachable { slot, detail: err.to_string() });
                }
            }
        }
        (Self { slots: RwLock::new(slots) }, outcomes)
    }

    /// Returns the slot's current health, or [`PluginHealth::Disabled`] when
    /// no plugin is connected for it.
    #[must_use]
    pub fn health_of(&self, slot: PluginSlot) -> PluginHealth {
        self.slots
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&slot)
            .map_or(PluginHealth::Disabled, |connected| connected.health)
    }

    /// Returns the connected auth plugin when healthy.
    #[must_use]
    pub fn auth(&self) -> Option<Arc<dyn AuthPlugin>> {
        self.serving_client(PluginSlot::Auth).map(|client| client as Arc<dyn AuthPlugin>)
    }

    /// Returns the connected sharing-policy plugin when healthy.
    #[must_use]
    pub fn sharing(&self) -> Option<Arc<dyn AccessPolicyPlugin>> {
        self.serving_client(PluginSlot::Sharing).map(|client| client as Arc<dyn AccessPolicyPlugin>)
    }

    /// Returns the connected enforcement-policy plugin when healthy.
    #[must_use]
    pub fn enforcement(&self) -> Option<Arc<dyn AccessPolicyPlugin>> {
        self.serving_client(PluginSlot::Enforcement).map(|client| client as Arc<dyn AccessPolicyPlugin>)
    }

    /// Returns the connected cloud-credential plugin when healthy.
    #[must_use]
    pub fn cloud_credential(&self) -> Option<Arc<dyn CloudCredentialPlugin>> {
        self.serving_client(PluginSlot::CloudCredential).map(|client| client as Arc<dyn CloudCredentialPlugin>)
    }

    /// Returns the connected executor plugin when healthy.
    #[must_use]
    pub fn executor(&self) -> Option<Arc<dyn ExecutorPlugin>> {
        self.serving_client(PluginSlot::Executor).map(|client| client as Arc<dyn ExecutorPlugin>)
    }

    fn serving_client(&self, slot: PluginSlot) -> Option<Arc<HttpPluginClient>> {
        let slots = self.slots.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let connected = slots.get(&slot)?;
        (connected.health == PluginHealth::Serving).then(|| Arc::clone(&connected.client))
    }

    /// Re-probes every connected plugin once, updating recorded health.
    ///
    /// `serving -> not-serving` disables the slot for routing immediately.
    /// `not-serving -> serving` is recorded but the spec leaves reactivation
    /// to the next process restart, so this does not re-enable routing.
    pub async fn probe_once(&self) {
        let targets: Vec<(PluginSlot, Arc<HttpPluginClient>)> = {
            let slots = self.slots.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            slots.iter().map(|(slot, connected)| (*slot, Arc::clone(&connected.client))).collect()
        };
        for (slot, client) in targets {
            let observed = client.health_check().await;
            let mut slots = self.slots.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(connected) = slots.get_mut(&slot) {
                connected.health = match observed {
                    Ok(HealthState::Serving) if connected.health == PluginHealth::Serving => {
                        PluginHealth::Serving
                    }
                    Ok(HealthState::Serving) => {
                        tracing::info!(slot = slot.as_str(), "plugin recovered; active after restart");
                        connected.health
                    }
                    Ok(HealthState::NotServing) | Err(_) => {
                        if connected.health == PluginHealth::Serving {
                            tracing::warn!(slot = slot.as_str(), "plugin health probe failed; disabling slot");
                        }
                        PluginHealth::Disabled
                    }
                };
            }
        }
    }

    /// Spawns the periodic health supervisor, re-probing every connected
    /// plugin on [`HEALTH_SUPERVISION_INTERVAL`] until `stop` resolves.
    pub fn spawn_health_supervisor(
        self: &Arc<Self>,
        mut stop: tokio::sync::oneshot::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_SUPERVISION_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => registry.probe_once().await,
                    _ = &mut stop => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use super::*;

    #[tokio::test]
    async fn load_skips_unknown_slot_names() {
        let bindings = vec![PluginBindingConfig {
            slot: "not-a-slot".to_string(),
            address: Url::parse("https://plugin.internal").unwrap(),
        }];
        let (_registry, outcomes) = PluginRegistry::load(bindings).await;
        assert!(matches!(&outcomes[0], LoadOutcome::UnknownSlot { raw } if raw == "not-a-slot"));
    }

    #[tokio::test]
    async fn empty_registry_reports_every_slot_disabled() {
        let (registry, outcomes) = PluginRegistry::load(Vec::new()).await;
        assert!(outcomes.is_empty());
        for slot in PluginSlot::ALL {
            assert_eq!(registry.health_of(slot), PluginHealth::Disabled);
        }
        assert!(registry.auth().is_none());
    }

    #[tokio::test]
    async fn unreachable_binding_leaves_slot_empty() {
        let bindings = vec![PluginBindingConfig {
            slot: "executor".to_string(),
            address: Url::parse("https://127.0.0.1:1/does-not-exist").unwrap(),
        }];
        let (registry, outcomes) = PluginRegistry::load(bindings).await;
        assert!(matches!(&outcomes[0], LoadOutcome::Unreachable { slot, .. } if *slot == PluginSlot::Executor));
        assert!(registry.executor().is_none());
    }
}
