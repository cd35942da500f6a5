use super::{Operator, validate_label_value};
use crate::error::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use log::error;

/// Rewrite a namespace selector as an OR-list of selectors with single-valued expressions only.
///
/// Every multi-valued `In`/`NotIn` expression is zipped with the selectors built so far, so a
/// selector with multi-valued expressions of arities `a1..ak` gives `a1 * ... * ak` selectors.
/// The input is left untouched.
pub fn flatten_namespace_selector(sel: Option<&LabelSelector>) -> Result<Vec<LabelSelector>> {
    let Some(sel) = sel else {
        return Ok(Vec::new());
    };
    let Some(reqs) = (sel.match_expressions.as_ref()).filter(|v| !v.is_empty()) else {
        return Ok(vec![sel.clone()]);
    };

    let mut base_exprs = Vec::with_capacity(reqs.len());
    let mut multi = Vec::new();

    for req in reqs {
        let Some(op) = Operator::from_kube(&req.operator) else {
            error!(
                "unknown operator {:?} on namespace label {:?} (ignored)",
                req.operator, req.key
            );
            continue;
        };

        let values = req.values.as_deref().unwrap_or_default();
        if op.has_values() {
            for value in values {
                validate_label_value(&req.key, value)?;
            }
            if values.len() >= 2 {
                multi.push((req, values));
                continue;
            }
        }
        base_exprs.push(req.clone());
    }

    if multi.is_empty() {
        return Ok(vec![sel.clone()]);
    }

    let mut flattened = vec![LabelSelector {
        match_labels: sel.match_labels.clone(),
        match_expressions: Some(base_exprs),
    }];

    for (req, values) in multi {
        flattened = (flattened.iter())
            .flat_map(|partial| {
                values.iter().map(move |value| {
                    let mut sel = partial.clone();
                    (sel.match_expressions.get_or_insert_with(Vec::new)).push(
                        LabelSelectorRequirement {
                            key: req.key.clone(),
                            operator: req.operator.clone(),
                            values: Some(vec![value.clone()]),
                        },
                    );
                    sel
                })
            })
            .collect();
    }

    Ok(flattened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selector(v: serde_json::Value) -> LabelSelector {
        serde_json::from_value(v).unwrap()
    }

    fn single(key: &str, op: &str, value: &str) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.into(),
            operator: op.into(),
            values: Some(vec![value.into()]),
        }
    }

    #[test]
    fn test_none_and_trivial() {
        assert!(flatten_namespace_selector(None).unwrap().is_empty());

        let sel = selector(json!({"matchLabels": {"team": "a"}}));
        assert_eq!(flatten_namespace_selector(Some(&sel)).unwrap(), vec![sel.clone()]);

        let sel = selector(json!({
            "matchExpressions": [
                {"key": "team", "operator": "In", "values": ["a"]},
                {"key": "env", "operator": "Exists"},
            ]
        }));
        assert_eq!(flatten_namespace_selector(Some(&sel)).unwrap(), vec![sel.clone()]);
    }

    #[test]
    fn test_not_in_two_values() {
        let sel = selector(json!({
            "matchExpressions": [
                {"key": "ns", "operator": "NotIn", "values": ["x", "y"]},
            ]
        }));
        let flat = flatten_namespace_selector(Some(&sel)).unwrap();

        assert_eq!(flat.len(), 2);
        assert_eq!(
            flat[0].match_expressions,
            Some(vec![single("ns", "NotIn", "x")])
        );
        assert_eq!(
            flat[1].match_expressions,
            Some(vec![single("ns", "NotIn", "y")])
        );
    }

    #[test]
    fn test_cardinality_and_base() {
        let sel = selector(json!({
            "matchLabels": {"tier": "backend"},
            "matchExpressions": [
                {"key": "a", "operator": "In", "values": ["1", "2"]},
                {"key": "env", "operator": "Exists"},
                {"key": "b", "operator": "NotIn", "values": ["x", "y", "z"]},
                {"key": "c", "operator": "In", "values": ["only"]},
            ]
        }));
        let original = sel.clone();

        let flat = flatten_namespace_selector(Some(&sel)).unwrap();
        assert_eq!(flat.len(), 6);
        assert_eq!(sel, original, "input must not be mutated");

        let base = vec![
            LabelSelectorRequirement {
                key: "env".into(),
                operator: "Exists".into(),
                values: None,
            },
            single("c", "In", "only"),
        ];

        let mut expected = Vec::new();
        for a in ["1", "2"] {
            for b in ["x", "y", "z"] {
                let mut exprs = base.clone();
                exprs.push(single("a", "In", a));
                exprs.push(single("b", "NotIn", b));
                expected.push(exprs);
            }
        }

        for (sel, exprs) in flat.iter().zip(expected) {
            assert_eq!(sel.match_labels, original.match_labels);
            assert_eq!(sel.match_expressions.as_ref(), Some(&exprs));
        }
    }

    #[test]
    fn test_unknown_operator_dropped() {
        let sel = selector(json!({
            "matchExpressions": [
                {"key": "a", "operator": "Gt", "values": ["1"]},
                {"key": "b", "operator": "In", "values": ["x", "y"]},
            ]
        }));
        let flat = flatten_namespace_selector(Some(&sel)).unwrap();
        assert_eq!(flat.len(), 2);
        for sel in flat {
            let exprs = sel.match_expressions.unwrap();
            assert_eq!(exprs.len(), 1);
            assert_eq!(exprs[0].key, "b");
        }
    }

    #[test]
    fn test_invalid_value() {
        let sel = selector(json!({
            "matchExpressions": [
                {"key": "a", "operator": "In", "values": ["ok", "not ok"]},
            ]
        }));
        assert!(matches!(
            flatten_namespace_selector(Some(&sel)),
            Err(crate::Error::InvalidMatchExpressionValues { .. })
        ));
    }
}
