use serde::Serialize;
use std::collections::BTreeSet as Set;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SetType {
    Namespace,
    KeyLabelOfNamespace,
    KeyValueLabelOfNamespace,
    KeyLabelOfPod,
    KeyValueLabelOfPod,
    NestedLabelOfPod,
    #[serde(rename = "CIDRBlocks")]
    CidrBlocks,
    NamedPorts,
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SetType::*;
        f.write_str(match self {
            Namespace => "Namespace",
            KeyLabelOfNamespace => "KeyLabelOfNamespace",
            KeyValueLabelOfNamespace => "KeyValueLabelOfNamespace",
            KeyLabelOfPod => "KeyLabelOfPod",
            KeyValueLabelOfPod => "KeyValueLabelOfPod",
            NestedLabelOfPod => "NestedLabelOfPod",
            CidrBlocks => "CIDRBlocks",
            NamedPorts => "NamedPorts",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedSet {
    pub name: String,
    #[serde(rename = "type")]
    pub set_type: SetType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

impl TranslatedSet {
    pub fn new(name: impl Into<String>, set_type: SetType) -> Self {
        Self {
            name: name.into(),
            set_type,
            members: Vec::new(),
        }
    }

    pub fn with_members(name: impl Into<String>, set_type: SetType, members: Vec<String>) -> Self {
        Self {
            name: name.into(),
            set_type,
            members,
        }
    }
}

/// Where the dataplane consults a set when matching a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchType {
    SrcMatch,
    DstMatch,
    /// destination address and destination port (named ports)
    DstDstMatch,
    EitherMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub set_type: SetType,
    /// false for negated matches (`NotIn`, `DoesNotExist`)
    pub included: bool,
    pub match_type: MatchType,
}

impl SetInfo {
    pub fn new(set: &TranslatedSet, included: bool, match_type: MatchType) -> Self {
        Self {
            name: set.name.clone(),
            set_type: set.set_type,
            included,
            match_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Allowed,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    /// suffix used in IPBlock set names
    pub fn tag(self) -> &'static str {
        match self {
            Self::Ingress => "IN",
            Self::Egress => "OUT",
        }
    }

    /// match type of the peers of a rule in this direction
    pub fn peer_match(self) -> MatchType {
        match self {
            Self::Ingress => MatchType::SrcMatch,
            Self::Egress => MatchType::DstMatch,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ingress => "ingress",
            Self::Egress => "egress",
        })
    }
}

/// Destination ports. `end_port == 0` is a single port, `0-0` is any port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ports {
    pub port: i32,
    pub end_port: i32,
}

impl Ports {
    pub fn is_any(&self) -> bool {
        self.port == 0 && self.end_port == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    #[serde(rename = "SCTP")]
    Sctp,
    #[default]
    #[serde(rename = "")]
    Any,
}

impl Protocol {
    /// Parse a NetworkPolicy protocol, defaulting to TCP.
    pub fn from_policy(v: Option<&str>) -> crate::Result<Self> {
        match v {
            None | Some("TCP") => Ok(Self::Tcp),
            Some("UDP") => Ok(Self::Udp),
            Some("SCTP") => Ok(Self::Sctp),
            Some(v) => Err(crate::Error::UnknownProtocol(v.into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AclPolicy {
    #[serde(rename = "policyID")]
    pub policy_id: String,
    pub target: Verdict,
    pub direction: Direction,
    pub src_list: Vec<SetInfo>,
    pub dst_list: Vec<SetInfo>,
    pub dst_ports: Ports,
    pub protocol: Protocol,
}

impl AclPolicy {
    pub fn new(policy_id: &str, target: Verdict, direction: Direction) -> Self {
        Self {
            policy_id: policy_id.into(),
            target,
            direction,
            src_list: Vec::new(),
            dst_list: Vec::new(),
            dst_ports: Ports::default(),
            protocol: Protocol::Any,
        }
    }

    /// Add the peer predicate: sources for ingress, destinations for egress.
    pub fn add_peer(&mut self, infos: &[SetInfo]) {
        let list = match self.direction {
            Direction::Ingress => &mut self.src_list,
            Direction::Egress => &mut self.dst_list,
        };
        list.extend_from_slice(infos);
    }

    pub fn set_infos(&self) -> impl Iterator<Item = &SetInfo> {
        self.src_list.iter().chain(&self.dst_list)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NpmNetworkPolicy {
    pub name: String,
    pub namespace: String,
    pub pod_selector_sets: Vec<TranslatedSet>,
    pub pod_selector_list: Vec<SetInfo>,
    pub rule_sets: Vec<TranslatedSet>,
    pub acls: Vec<AclPolicy>,
}

impl NpmNetworkPolicy {
    /// `namespace/name`
    pub fn policy_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn policy_id(&self) -> String {
        crate::names::policy_id(&self.namespace, &self.name)
    }

    pub fn sets(&self) -> impl Iterator<Item = &TranslatedSet> {
        self.pod_selector_sets.iter().chain(&self.rule_sets)
    }

    pub fn set_infos(&self) -> impl Iterator<Item = &SetInfo> {
        (self.pod_selector_list.iter()).chain(self.acls.iter().flat_map(|acl| acl.set_infos()))
    }

    /// Set references with no backing set in this policy. Always empty for translator output.
    pub fn unbacked_references(&self) -> Vec<&SetInfo> {
        let sets: Set<_> = self.sets().map(|s| (s.name.as_str(), s.set_type)).collect();
        (self.set_infos())
            .filter(|info| !sets.contains(&(info.name.as_str(), info.set_type)))
            .collect()
    }
}

/// Ordered sets, de-duplicated on `(name, type)`. The first insertion wins.
#[derive(Debug, Default)]
pub struct SetCollection {
    sets: Vec<TranslatedSet>,
    seen: Set<(String, SetType)>,
}

impl SetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, set: TranslatedSet) {
        if self.seen.insert((set.name.clone(), set.set_type)) {
            self.sets.push(set);
        }
    }

    pub fn into_vec(self) -> Vec<TranslatedSet> {
        self.sets
    }
}

impl Extend<TranslatedSet> for SetCollection {
    fn extend<I: IntoIterator<Item = TranslatedSet>>(&mut self, iter: I) {
        for set in iter {
            self.insert(set);
        }
    }
}

impl FromIterator<TranslatedSet> for SetCollection {
    fn from_iter<I: IntoIterator<Item = TranslatedSet>>(iter: I) -> Self {
        let mut sets = Self::new();
        sets.extend(iter);
        sets
    }
}
