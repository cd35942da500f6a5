use crate::error::{Error, Result};
use crate::ir::{MatchType, Ports, Protocol, SetInfo, SetType, TranslatedSet};
use crate::names;
use k8s_openapi::{
    api::networking::v1::NetworkPolicyPort, apimachinery::pkg::util::intstr::IntOrString,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    Numeric,
    Named,
}

/// A translated port: either a destination port range or a named port set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRule {
    Numeric(Ports, Protocol),
    Named(TranslatedSet, SetInfo, Protocol),
}

/// Integer value of a port; string ports holding a number count as that number.
fn int_value(port: &IntOrString) -> i32 {
    match port {
        IntOrString::Int(v) => *v,
        IntOrString::String(s) => s.parse().unwrap_or(0),
    }
}

fn str_value(port: &IntOrString) -> &str {
    match port {
        IntOrString::Int(_) => "",
        IntOrString::String(s) => s,
    }
}

pub fn port_type(port: &NetworkPolicyPort) -> Result<PortType> {
    let Some(ref p) = port.port else {
        return Ok(PortType::Numeric); // any port
    };
    if int_value(p) != 0 {
        Ok(PortType::Numeric)
    } else if !str_value(p).is_empty() {
        Ok(PortType::Named)
    } else {
        Err(Error::UnknownPortType(format!("{p:?}")))
    }
}

pub fn numeric_port_rule(port: &NetworkPolicyPort) -> Result<(Ports, Protocol)> {
    let protocol = Protocol::from_policy(port.protocol.as_deref())?;
    let ports = Ports {
        port: port.port.as_ref().map_or(0, int_value),
        end_port: port.end_port.unwrap_or(0),
    };
    Ok((ports, protocol))
}

pub fn named_port_rule(port: &NetworkPolicyPort) -> Result<(TranslatedSet, SetInfo, Protocol)> {
    let protocol = Protocol::from_policy(port.protocol.as_deref())?;
    let name = port.port.as_ref().map_or("", str_value);
    let set = TranslatedSet::new(names::named_port(name), SetType::NamedPorts);
    let info = SetInfo::new(&set, true, MatchType::DstDstMatch);
    Ok((set, info, protocol))
}

pub fn translate_port(port: &NetworkPolicyPort) -> Result<PortRule> {
    Ok(match port_type(port)? {
        PortType::Numeric => {
            let (ports, protocol) = numeric_port_rule(port)?;
            PortRule::Numeric(ports, protocol)
        }
        PortType::Named => {
            let (set, info, protocol) = named_port_rule(port)?;
            PortRule::Named(set, info, protocol)
        }
    })
}
