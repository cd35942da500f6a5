use crate::error::{Error, Result};
use crate::ir::{
    AclPolicy, Direction, MatchType, NpmNetworkPolicy, SetCollection, Verdict,
};
use crate::names;
use k8s_openapi::{
    api::networking::v1::{NetworkPolicy, NetworkPolicySpec},
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use log::{debug, error};

pub mod peers;
pub mod ports;
mod rules;


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataplane {
    #[default]
    Linux,
    /// HNS, which has no negative match.
    Windows,
}

#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Dataplane the IR is produced for.
    #[serde(default)]
    pub dataplane: Dataplane,

    /// Translate a peer having both a pod and a namespace selector as the union of both
    /// (pre-1.11 clusters) instead of their intersection.
    #[serde(default)]
    pub legacy_intersection_semantics: bool,

    /// Prefix nested label set names with the policy name.
    #[serde(default)]
    pub qualify_nested_sets: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Translator {
    cfg: Config,
}

/// Translate with the default configuration.
pub fn translate(np: &NetworkPolicy) -> Result<NpmNetworkPolicy> {
    Translator::default().translate(np)
}

impl Translator {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    pub fn translate(&self, np: &NetworkPolicy) -> Result<NpmNetworkPolicy> {
        let name = (np.metadata.name.as_deref()).ok_or(Error::InvalidPolicy("no name"))?;
        let namespace =
            (np.metadata.namespace.as_deref()).ok_or(Error::InvalidPolicy("no namespace"))?;

        let default_spec;
        let spec = match np.spec {
            Some(ref spec) => spec,
            None => {
                default_spec = NetworkPolicySpec::default();
                &default_spec
            }
        };

        let mut builder = Builder::new(&self.cfg, name, namespace);

        // podSelector is optional in recent API versions
        let target: Option<LabelSelector> = spec.pod_selector.clone().into();
        let target = peers::pod_selector_with_ns(
            &target.unwrap_or_default(),
            namespace,
            MatchType::EitherMatch,
            builder.qualifier(),
        )?;

        for direction in builder.directions(spec.policy_types.as_deref()) {
            match direction {
                Direction::Ingress => {
                    let rules = spec.ingress.iter().flatten().map(rules::Rule::from);
                    builder.rules(direction, rules)?;
                }
                Direction::Egress => {
                    let rules = spec.egress.iter().flatten().map(rules::Rule::from);
                    builder.rules(direction, rules)?;
                }
            }
        }

        let policy = NpmNetworkPolicy {
            name: name.to_string(),
            namespace: namespace.to_string(),
            pod_selector_sets: target.sets.into_iter().collect::<SetCollection>().into_vec(),
            pod_selector_list: target.infos,
            rule_sets: builder.rule_sets.into_vec(),
            acls: builder.acls,
        };

        if self.cfg.dataplane == Dataplane::Windows {
            if let Some(info) = policy.set_infos().find(|info| !info.included) {
                return Err(Error::UnsupportedNegativeMatch(info.name.clone()));
            }
        }

        debug!(
            "{}: translated to {} sets and {} acls",
            policy.policy_key(),
            policy.pod_selector_sets.len() + policy.rule_sets.len(),
            policy.acls.len()
        );

        Ok(policy)
    }
}

/// IR of one policy under construction.
struct Builder<'t> {
    cfg: &'t Config,
    name: &'t str,
    namespace: &'t str,
    policy_id: String,
    rule_sets: SetCollection,
    acls: Vec<AclPolicy>,
}

impl<'t> Builder<'t> {
    fn new(cfg: &'t Config, name: &'t str, namespace: &'t str) -> Self {
        Self {
            cfg,
            name,
            namespace,
            policy_id: names::policy_id(namespace, name),
            rule_sets: SetCollection::new(),
            acls: Vec::new(),
        }
    }

    fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    fn qualifier(&self) -> Option<&'t str> {
        self.cfg.qualify_nested_sets.then_some(self.name)
    }

    fn acl(&self, target: Verdict, direction: Direction) -> AclPolicy {
        AclPolicy::new(&self.policy_id, target, direction)
    }

    /// Directions in effect, in declaration order. No declared type means ingress only.
    fn directions(&self, policy_types: Option<&[String]>) -> Vec<Direction> {
        let policy_types = policy_types.unwrap_or_default();
        if policy_types.is_empty() {
            return vec![Direction::Ingress];
        }

        let mut directions = Vec::with_capacity(2);
        for policy_type in policy_types {
            let direction = match policy_type.as_str() {
                "Ingress" => Direction::Ingress,
                "Egress" => Direction::Egress,
                t => {
                    error!("{}: unknown policy type {t:?} (ignored)", self.key());
                    continue;
                }
            };
            if !directions.contains(&direction) {
                directions.push(direction);
            }
        }
        directions
    }
}
