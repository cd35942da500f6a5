use crate::ir::Direction;
use itertools::Itertools;

/// Set matching every namespace (and therefore every pod of the cluster).
pub const ALL_NAMESPACES: &str = "all-namespaces";
/// Prefix of named port sets.
pub const NAMED_PORT_PREFIX: &str = "namedport:";
/// Suffix marking a CIDR member as an exclusion.
pub const NOMATCH: &str = " nomatch";

const POLICY_ID_PREFIX: &str = "azure-acl-";

/// `key:value`
pub fn label(key: &str, value: &str) -> String {
    format!("{key}:{value}")
}

/// `key:v1:v2:...:vN`, values in the given order.
pub fn nested_label(key: &str, values: &[String]) -> String {
    format!("{key}:{}", values.iter().join(":"))
}

/// `policy-key:v1:...:vN`, avoiding collisions of nested sets across policies.
pub fn qualified_nested_label(policy: &str, key: &str, values: &[String]) -> String {
    format!("{policy}-{}", nested_label(key, values))
}

/// `<policy>-in-ns-<ns>-<index><IN|OUT>`
pub fn ip_block(policy: &str, namespace: &str, direction: Direction, index: usize) -> String {
    format!("{policy}-in-ns-{namespace}-{index}{}", direction.tag())
}

pub fn named_port(port_name: &str) -> String {
    format!("{NAMED_PORT_PREFIX}{port_name}")
}

pub fn nomatch(cidr: &str) -> String {
    format!("{cidr}{NOMATCH}")
}

pub fn policy_id(namespace: &str, name: &str) -> String {
    format!("{POLICY_ID_PREFIX}{namespace}-{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet as Set;

    #[test]
    fn test_formats() {
        assert_eq!(label("app", "web"), "app:web");
        assert_eq!(label("app", ""), "app:");
        assert_eq!(
            nested_label("k1", &["v10".into(), "v11".into()]),
            "k1:v10:v11"
        );
        assert_eq!(
            qualified_nested_label("deny", "k1", &["a".into(), "b".into()]),
            "deny-k1:a:b"
        );
        assert_eq!(named_port("http"), "namedport:http");
        assert_eq!(nomatch("10.0.0.0/8"), "10.0.0.0/8 nomatch");
        assert_eq!(policy_id("default", "serve-tcp"), "azure-acl-default-serve-tcp");
    }

    #[test]
    fn test_ip_block_names() {
        assert_eq!(
            ip_block("only-ipblock", "default", Direction::Ingress, 0),
            "only-ipblock-in-ns-default-0IN"
        );
        assert_eq!(
            ip_block("only-ipblock", "default", Direction::Egress, 3),
            "only-ipblock-in-ns-default-3OUT"
        );

        let mut seen = Set::new();
        for policy in ["p", "p-1"] {
            for ns in ["default", "kube-system"] {
                for direction in [Direction::Ingress, Direction::Egress] {
                    for index in 0..12 {
                        assert!(seen.insert(ip_block(policy, ns, direction, index)));
                    }
                }
            }
        }
    }
}
