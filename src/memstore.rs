use crate::{ir::NpmNetworkPolicy, keys, translate::Translator};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::runtime::watcher::Event;
use log::{debug, error, info};
use std::collections::{BTreeMap as Map, BTreeSet as Set};
use xxhash_rust::xxh3;

/// Change of a policy's IR, for the dataplane applier.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Update {
    Apply {
        policy: NpmNetworkPolicy,
    },
    Delete {
        key: String,
        #[serde(rename = "policyID")]
        policy_id: String,
    },
}

pub struct PolicyStore {
    translator: Translator,
    /// hash of the last published IR
    policies: Map<keys::Object, u128>,
    /// keys seen since the last Init, while listing
    relisted: Option<Set<keys::Object>>,
    ready: bool,
}

impl PolicyStore {
    pub fn new(translator: Translator) -> Self {
        Self {
            translator,
            policies: Map::new(),
            relisted: None,
            ready: false,
        }
    }

    /// true once the initial list is done
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn ingest(&mut self, event: Event<NetworkPolicy>, updates: &mut Vec<Update>) {
        use Event::*;
        match event {
            Init => {
                self.relisted = Some(Set::new());
                self.ready = false;
            }
            InitApply(np) => {
                let key = self.apply(np, updates);
                if let (Some(key), Some(relisted)) = (key, self.relisted.as_mut()) {
                    relisted.insert(key);
                }
            }
            InitDone => {
                let relisted = self.relisted.take().unwrap_or_default();
                let gone: Vec<_> = (self.policies.keys())
                    .filter(|key| !relisted.contains(key))
                    .cloned()
                    .collect();
                for key in gone {
                    self.delete(key, updates);
                }
                self.ready = true;
            }
            Apply(np) => {
                self.apply(np, updates);
            }
            Delete(np) => match keys::Object::try_from(&np.metadata) {
                Ok(key) => self.delete(key, updates),
                Err(e) => error!("ignoring deleted network policy: {e}"),
            },
        }
    }

    /// Translate a policy, publishing it if its IR changed. Returns its key if it has one.
    fn apply(&mut self, np: NetworkPolicy, updates: &mut Vec<Update>) -> Option<keys::Object> {
        let key = (keys::Object::try_from(&np.metadata))
            .inspect_err(|e| error!("ignoring network policy: {e}"))
            .ok()?;

        let policy = match self.translator.translate(&np) {
            Ok(v) => v,
            Err(e) => {
                // keep what the dataplane has until the policy is fixed
                error!("{key}: translation failed: {e}");
                return Some(key);
            }
        };

        let hash = match serde_json::to_vec(&policy) {
            Ok(v) => xxh3::xxh3_128(&v),
            Err(e) => {
                error!("{key}: failed to serialize: {e}");
                return Some(key);
            }
        };

        if self.policies.get(&key) == Some(&hash) {
            debug!("{key}: unchanged");
            return Some(key);
        }

        info!(
            "{key}: {} sets, {} acls",
            policy.pod_selector_sets.len() + policy.rule_sets.len(),
            policy.acls.len()
        );
        self.policies.insert(key.clone(), hash);
        updates.push(Update::Apply { policy });

        Some(key)
    }

    fn delete(&mut self, key: keys::Object, updates: &mut Vec<Update>) {
        if self.policies.remove(&key).is_none() {
            return;
        }
        info!("{key}: deleted");
        updates.push(Update::Delete {
            policy_id: key.policy_id(),
            key: key.to_string(),
        });
    }
}
