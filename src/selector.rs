use crate::error::{Error, Result};
use crate::ir::SetType;
use crate::names;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use log::error;
use regex::Regex;
use std::collections::BTreeSet as Set;
use std::fmt;
use std::sync::LazyLock;

pub mod flatten;


pub use flatten::flatten_namespace_selector;

static LABEL_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$").unwrap()
});

pub fn validate_label_value(key: &str, value: &str) -> Result<()> {
    if LABEL_VALUE_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(Error::invalid_values(
            key,
            format!("{value:?} is not a valid label value"),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl Operator {
    pub fn from_kube(op: &str) -> Option<Self> {
        match op {
            "In" => Some(Self::In),
            "NotIn" => Some(Self::NotIn),
            "Exists" => Some(Self::Exists),
            "DoesNotExist" => Some(Self::DoesNotExist),
            _ => None,
        }
    }

    /// false for the negative operators
    pub fn include(self) -> bool {
        matches!(self, Self::In | Self::Exists)
    }

    pub fn has_values(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One clause of a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub include: bool,
    pub set_type: SetType,
    pub name: String,
    /// child set names of a nested set
    pub members: Vec<String>,
}

impl Atom {
    fn new(include: bool, set_type: SetType, name: String) -> Self {
        Self {
            include,
            set_type,
            name,
            members: Vec::new(),
        }
    }
}

/// Atoms de-duplicated on `(name, type, include)`, keeping the first occurrence.
#[derive(Default)]
struct Atoms {
    atoms: Vec<Atom>,
    seen: Set<(String, SetType, bool)>,
}

impl Atoms {
    fn push(&mut self, atom: Atom) {
        if self.seen.insert((atom.name.clone(), atom.set_type, atom.include)) {
            self.atoms.push(atom);
        }
    }
}

/// A validated match expression.
struct Expression<'t> {
    key: &'t str,
    op: Operator,
    values: &'t [String],
}

fn expressions(sel: &LabelSelector) -> Result<Vec<Expression<'_>>> {
    let mut exprs = Vec::new();

    for req in sel.match_expressions.iter().flatten() {
        let Some(op) = Operator::from_kube(&req.operator) else {
            error!(
                "unknown operator {:?} on label {:?} (ignored)",
                req.operator, req.key
            );
            continue;
        };

        let values = req.values.as_deref().unwrap_or_default();
        if op.has_values() {
            if values.is_empty() {
                return Err(Error::invalid_values(
                    &req.key,
                    format!("operator {op} requires at least one value"),
                ));
            }
            for value in values {
                validate_label_value(&req.key, value)?;
            }
        }

        exprs.push(Expression {
            key: &req.key,
            op,
            values,
        });
    }

    Ok(exprs)
}

fn match_labels(sel: &LabelSelector) -> Result<Vec<(&String, &String)>> {
    // matchLabels is a BTreeMap: iteration is sorted by key
    let labels: Vec<_> = sel.match_labels.iter().flatten().collect();
    for (key, value) in &labels {
        validate_label_value(key, value)?;
    }
    Ok(labels)
}

/// Parse a pod selector.
///
/// `qualifier` (the policy name) is prepended to nested set names when given.
pub fn parse_pod_selector(sel: &LabelSelector, qualifier: Option<&str>) -> Result<Vec<Atom>> {
    use SetType::*;

    let mut atoms = Atoms::default();

    for (key, value) in match_labels(sel)? {
        atoms.push(Atom::new(true, KeyValueLabelOfPod, names::label(key, value)));
    }

    for Expression { key, op, values } in expressions(sel)? {
        let include = op.include();
        let atom = match (op, values) {
            (Operator::Exists | Operator::DoesNotExist, _) => {
                Atom::new(include, KeyLabelOfPod, key.to_string())
            }
            (_, [value]) => Atom::new(include, KeyValueLabelOfPod, names::label(key, value)),
            (_, values) => Atom {
                include,
                set_type: NestedLabelOfPod,
                name: match qualifier {
                    Some(policy) => names::qualified_nested_label(policy, key, values),
                    None => names::nested_label(key, values),
                },
                members: values.iter().map(|v| names::label(key, v)).collect(),
            },
        };
        atoms.push(atom);
    }

    Ok(atoms.atoms)
}

/// Parse a namespace selector. Multi-valued expressions must have been flattened first.
///
/// A selector without any clause matches all namespaces.
pub fn parse_namespace_selector(sel: &LabelSelector) -> Result<Vec<Atom>> {
    use SetType::*;

    let mut atoms = Atoms::default();

    for (key, value) in match_labels(sel)? {
        atoms.push(Atom::new(
            true,
            KeyValueLabelOfNamespace,
            names::label(key, value),
        ));
    }

    for Expression { key, op, values } in expressions(sel)? {
        let include = op.include();
        let atom = match (op, values) {
            (Operator::Exists | Operator::DoesNotExist, _) => {
                Atom::new(include, KeyLabelOfNamespace, key.to_string())
            }
            (_, [value]) => Atom::new(include, KeyValueLabelOfNamespace, names::label(key, value)),
            _ => {
                return Err(Error::invalid_values(
                    key,
                    "multi-valued namespace expressions must be flattened",
                ));
            }
        };
        atoms.push(atom);
    }

    if atoms.atoms.is_empty() {
        atoms.push(Atom::new(
            true,
            KeyLabelOfNamespace,
            names::ALL_NAMESPACES.to_string(),
        ));
    }

    Ok(atoms.atoms)
}
