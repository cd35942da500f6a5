use crate::error::Result;
use crate::ir::{MatchType, SetInfo, SetType, TranslatedSet};
use crate::names;
use crate::selector::{self, Atom};
use cidr::IpInet;
use k8s_openapi::{
    api::networking::v1::IPBlock, apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use log::error;
use std::collections::BTreeSet as Set;

/// Sets and the references to them forming one peer predicate.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PeerMatch {
    pub sets: Vec<TranslatedSet>,
    pub infos: Vec<SetInfo>,
}

impl PeerMatch {
    fn push_atoms(&mut self, atoms: Vec<Atom>, match_type: MatchType) {
        for atom in atoms {
            let set = TranslatedSet::with_members(atom.name, atom.set_type, atom.members);
            self.infos.push(SetInfo::new(&set, atom.include, match_type));

            // children of a nested set are backed by their own label sets, created first
            for member in &set.members {
                self.sets
                    .push(TranslatedSet::new(member.clone(), SetType::KeyValueLabelOfPod));
            }
            self.sets.push(set);
        }
    }

    fn push(&mut self, set: TranslatedSet, included: bool, match_type: MatchType) {
        self.infos.push(SetInfo::new(&set, included, match_type));
        self.sets.push(set);
    }

    /// Intersection: the clauses of `self` followed by the clauses of `other`.
    pub fn and(mut self, other: &PeerMatch) -> Self {
        self.sets.extend_from_slice(&other.sets);
        self.infos.extend_from_slice(&other.infos);
        self
    }
}

/// Pod selector alone, matching pods of any namespace.
pub fn pod_selector(
    sel: &LabelSelector,
    match_type: MatchType,
    qualifier: Option<&str>,
) -> Result<PeerMatch> {
    let mut peer = PeerMatch::default();
    peer.push_atoms(selector::parse_pod_selector(sel, qualifier)?, match_type);
    Ok(peer)
}

/// Pod selector restricted to `namespace`. An empty selector matches the whole namespace.
pub fn pod_selector_with_ns(
    sel: &LabelSelector,
    namespace: &str,
    match_type: MatchType,
    qualifier: Option<&str>,
) -> Result<PeerMatch> {
    let mut peer = pod_selector(sel, match_type, qualifier)?;
    peer.push(
        TranslatedSet::new(namespace, SetType::Namespace),
        true,
        match_type,
    );
    Ok(peer)
}

/// Namespace selector, which must be flat (see [`selector::flatten_namespace_selector`]).
pub fn namespace_selector(sel: &LabelSelector, match_type: MatchType) -> Result<PeerMatch> {
    let mut peer = PeerMatch::default();
    peer.push_atoms(selector::parse_namespace_selector(sel)?, match_type);
    Ok(peer)
}

/// One peer match per flattened namespace selector.
pub fn namespace_selectors(sel: &LabelSelector, match_type: MatchType) -> Result<Vec<PeerMatch>> {
    (selector::flatten_namespace_selector(Some(sel))?.iter())
        .map(|sel| namespace_selector(sel, match_type))
        .collect()
}

/// Every pod of every namespace.
pub fn allow_all_internal(match_type: MatchType) -> PeerMatch {
    let mut peer = PeerMatch::default();
    peer.push(
        TranslatedSet::new(names::ALL_NAMESPACES, SetType::KeyLabelOfNamespace),
        true,
        match_type,
    );
    peer
}

const SPLIT_V4_ANY: [&str; 2] = ["0.0.0.0/1", "128.0.0.0/1"];

/// CIDR members of the IPBlocks of one rule.
///
/// `0.0.0.0/0` cannot be stored in a set, so it is split in two halves. Excepts get the
/// `nomatch` marker; an except equal to a split half turns that half into an exclusion.
/// A block with an invalid CIDR or except is ignored.
pub fn ip_block_members<'a>(blocks: impl IntoIterator<Item = &'a IPBlock>) -> Vec<String> {
    let mut members = Vec::new();
    let mut seen = Set::new();

    for block in blocks {
        let cidr = match block.cidr.parse::<IpInet>() {
            Ok(v) => v,
            Err(e) => {
                error!("invalid ip block (ignored): {}: {e}", block.cidr);
                continue;
            }
        };
        let except = block.except.as_deref().unwrap_or_default();
        if let Some(e) = (except.iter())
            .find_map(|s| s.parse::<IpInet>().err().map(|e| (s, e)))
        {
            error!("invalid ip block except (block ignored): {}: {}", e.0, e.1);
            continue;
        }

        let split = matches!(&cidr, IpInet::V4(v) if v.network_length() == 0);

        let mut block_members: Vec<String> = if split {
            SPLIT_V4_ANY.iter().map(|s| s.to_string()).collect()
        } else {
            vec![block.cidr.clone()]
        };

        for except in except {
            let half = match split {
                true => SPLIT_V4_ANY.iter().position(|h| *h == except.as_str()),
                false => None,
            };
            match half {
                Some(i) => block_members[i] = names::nomatch(except),
                None => block_members.push(names::nomatch(except)),
            }
        }

        for member in block_members {
            if seen.insert(member.clone()) {
                members.push(member);
            }
        }
    }

    members
}

/// The CIDR set of a rule, if any of its blocks is valid.
pub fn ip_block_set<'a>(
    name: String,
    blocks: impl IntoIterator<Item = &'a IPBlock>,
) -> Option<TranslatedSet> {
    let members = ip_block_members(blocks);
    if members.is_empty() {
        return None;
    }
    Some(TranslatedSet::with_members(
        name,
        SetType::CidrBlocks,
        members,
    ))
}

/// The folded IPBlocks of one rule as a peer predicate.
pub fn ip_blocks<'a>(
    name: String,
    blocks: impl IntoIterator<Item = &'a IPBlock>,
    match_type: MatchType,
) -> Option<PeerMatch> {
    let mut peer = PeerMatch::default();
    peer.push(ip_block_set(name, blocks)?, true, match_type);
    Some(peer)
}
