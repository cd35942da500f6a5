use super::{
    Builder,
    peers::{self, PeerMatch},
    ports::{self, PortRule},
};
use crate::error::Result;
use crate::ir::{Direction, MatchType, Verdict};
use crate::names;
use k8s_openapi::api::networking::v1::{
    NetworkPolicyEgressRule as EgressRule, NetworkPolicyIngressRule as IngressRule,
    NetworkPolicyPeer, NetworkPolicyPort,
};
use log::{debug, error};

/// An ingress or egress rule.
pub(super) struct Rule<'t> {
    ports: &'t [NetworkPolicyPort],
    /// `from` or `to`; `None` when omitted, which differs from an empty list
    peers: Option<&'t [NetworkPolicyPeer]>,
}

impl<'t> From<&'t IngressRule> for Rule<'t> {
    fn from(rule: &'t IngressRule) -> Self {
        Self {
            ports: rule.ports.as_deref().unwrap_or_default(),
            peers: rule.from.as_deref(),
        }
    }
}

impl<'t> From<&'t EgressRule> for Rule<'t> {
    fn from(rule: &'t EgressRule) -> Self {
        Self {
            ports: rule.ports.as_deref().unwrap_or_default(),
            peers: rule.to.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Shape {
    /// matches any traffic, including from/to outside the cluster
    AllowExternal,
    /// matches any pod of the cluster
    AllowAllInternal,
    PortsOnly,
    Peers,
}

fn is_trivial(peer: &NetworkPolicyPeer) -> bool {
    peer.ip_block.is_none() && peer.pod_selector.is_none() && peer.namespace_selector.is_none()
}

impl Rule<'_> {
    pub(super) fn shape(&self) -> Shape {
        let has_ports = !self.ports.is_empty();
        match self.peers {
            None | Some([]) if has_ports => Shape::PortsOnly,
            None | Some([]) => Shape::AllowExternal,
            Some(peers) if !peers.iter().all(is_trivial) => Shape::Peers,
            Some(_) if has_ports => Shape::PortsOnly,
            Some(_) => Shape::AllowAllInternal,
        }
    }
}

impl Builder<'_> {
    /// Translate the rules of one direction, terminated by a default drop unless the only
    /// rule allows everything.
    pub(super) fn rules<'r>(
        &mut self,
        direction: Direction,
        rules: impl IntoIterator<Item = Rule<'r>>,
    ) -> Result<()> {
        let match_type = direction.peer_match();
        let rules: Vec<_> = rules.into_iter().collect();

        for (index, rule) in rules.iter().enumerate() {
            match rule.shape() {
                Shape::AllowExternal => {
                    debug!("{}: {direction} rule {index} allows all", self.key());
                    let acl = self.acl(Verdict::Allowed, direction);
                    self.acls.push(acl);
                }
                Shape::AllowAllInternal => {
                    self.allow(direction, peers::allow_all_internal(match_type), &[]);
                }
                Shape::PortsOnly => {
                    self.allow(direction, PeerMatch::default(), rule.ports);
                }
                Shape::Peers => {
                    self.peers(direction, index, rule)?;
                }
            }
        }

        if matches!(rules.as_slice(), [rule] if rule.shape() == Shape::AllowExternal) {
            return Ok(());
        }

        let acl = self.acl(Verdict::Dropped, direction);
        self.acls.push(acl);
        Ok(())
    }

    fn peers(&mut self, direction: Direction, index: usize, rule: &Rule) -> Result<()> {
        let list = rule.peers.unwrap_or_default();
        let match_type = direction.peer_match();
        let mut ip_blocks_done = false;

        for peer in list {
            if peer.ip_block.is_some() {
                // every IPBlock of the rule goes in the same set, allowed once
                if ip_blocks_done {
                    continue;
                }
                ip_blocks_done = true;

                let name = names::ip_block(self.name, self.namespace, direction, index);
                let blocks = list.iter().filter_map(|p| p.ip_block.as_ref());
                if let Some(matched) = peers::ip_blocks(name, blocks, match_type) {
                    self.allow(direction, matched, rule.ports);
                }
                continue;
            }

            for matched in self.selector_peer(peer, match_type)? {
                self.allow(direction, matched, rule.ports);
            }
        }

        Ok(())
    }

    fn selector_peer(
        &self,
        peer: &NetworkPolicyPeer,
        match_type: MatchType,
    ) -> Result<Vec<PeerMatch>> {
        let qualifier = self.qualifier();

        let (pods, nses) = match (&peer.pod_selector, &peer.namespace_selector) {
            (None, None) => return Ok(Vec::new()),
            (Some(pods), None) => {
                let matched = peers::pod_selector_with_ns(pods, self.namespace, match_type, qualifier)?;
                return Ok(vec![matched]);
            }
            (None, Some(nses)) => return peers::namespace_selectors(nses, match_type),
            (Some(pods), Some(nses)) => (pods, nses),
        };

        if self.cfg.legacy_intersection_semantics {
            let mut matches = vec![peers::pod_selector_with_ns(
                pods,
                self.namespace,
                match_type,
                qualifier,
            )?];
            matches.extend(peers::namespace_selectors(nses, match_type)?);
            return Ok(matches);
        }

        // pods matching the selector in any of the selected namespaces
        let pods = peers::pod_selector(pods, match_type, qualifier)?;
        Ok((peers::namespace_selectors(nses, match_type)?.into_iter())
            .map(|ns| ns.and(&pods))
            .collect())
    }

    /// Allow a peer on each port, or on any port if there is none.
    fn allow(&mut self, direction: Direction, peer: PeerMatch, ports: &[NetworkPolicyPort]) {
        let PeerMatch { sets, infos } = peer;
        self.rule_sets.extend(sets);

        if ports.is_empty() {
            let mut acl = self.acl(Verdict::Allowed, direction);
            acl.add_peer(&infos);
            self.acls.push(acl);
            return;
        }

        for port in ports {
            let rule = match ports::translate_port(port) {
                Ok(v) => v,
                Err(e) => {
                    error!("{}: {direction} port skipped: {e}", self.key());
                    continue;
                }
            };

            let mut acl = self.acl(Verdict::Allowed, direction);
            acl.add_peer(&infos);

            match rule {
                PortRule::Numeric(ports, protocol) => {
                    acl.dst_ports = ports;
                    acl.protocol = protocol;
                }
                PortRule::Named(set, info, protocol) => {
                    self.rule_sets.insert(set);
                    acl.dst_list.push(info);
                    acl.protocol = protocol;
                }
            }

            self.acls.push(acl);
        }
    }
}
