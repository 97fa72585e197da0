//! Affinity Builder
//!
//! Builds the hard node affinity that pins a workload to one node, and reads
//! the pinned node back out of an existing affinity.

use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
};

/// Node selector operator for set membership
pub const OPERATOR_IN: &str = "In";

/// Required node affinity: `label_key In [node_name]`
///
/// One selector term with one requirement. No preferred terms, no pod
/// (anti-)affinity.
pub fn build_node_affinity(label_key: &str, node_name: &str) -> Affinity {
    Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![NodeSelectorRequirement {
                        key: label_key.to_string(),
                        operator: OPERATOR_IN.to_string(),
                        values: Some(vec![node_name.to_string()]),
                    }]),
                    match_fields: None,
                }],
            }),
            preferred_during_scheduling_ignored_during_execution: None,
        }),
        pod_affinity: None,
        pod_anti_affinity: None,
    }
}

/// Node an affinity requires, if it pins exactly one node on `label_key`
///
/// Scans the required terms for the first `In` requirement on the label
/// with a single value.
pub fn required_node_name<'a>(affinity: &'a Affinity, label_key: &str) -> Option<&'a str> {
    let selector = affinity
        .node_affinity
        .as_ref()?
        .required_during_scheduling_ignored_during_execution
        .as_ref()?;

    selector
        .node_selector_terms
        .iter()
        .filter_map(|term| term.match_expressions.as_ref())
        .flatten()
        .find_map(|req| match req.values.as_deref() {
            Some([node]) if req.key == label_key && req.operator == OPERATOR_IN => {
                Some(node.as_str())
            }
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOSTNAME: &str = "kubernetes.io/hostname";

    #[test]
    fn test_build_single_required_term() {
        let affinity = build_node_affinity(HOSTNAME, "node-a");

        let node_affinity = affinity.node_affinity.as_ref().unwrap();
        assert!(node_affinity
            .preferred_during_scheduling_ignored_during_execution
            .is_none());
        assert!(affinity.pod_affinity.is_none());
        assert!(affinity.pod_anti_affinity.is_none());

        let terms = &node_affinity
            .required_during_scheduling_ignored_during_execution
            .as_ref()
            .unwrap()
            .node_selector_terms;
        assert_eq!(terms.len(), 1);

        let reqs = terms[0].match_expressions.as_ref().unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].key, HOSTNAME);
        assert_eq!(reqs[0].operator, "In");
        assert_eq!(reqs[0].values.as_deref(), Some(&["node-a".to_string()][..]));
    }

    #[test]
    fn test_built_affinity_reads_back() {
        let affinity = build_node_affinity(HOSTNAME, "node-a");
        assert_eq!(required_node_name(&affinity, HOSTNAME), Some("node-a"));
        assert_eq!(required_node_name(&affinity, "topology.kubernetes.io/zone"), None);
    }

    #[test]
    fn test_multi_value_requirement_is_not_a_pin() {
        let mut affinity = build_node_affinity(HOSTNAME, "node-a");
        if let Some(na) = affinity.node_affinity.as_mut() {
            let selector = na
                .required_during_scheduling_ignored_during_execution
                .as_mut()
                .unwrap();
            selector.node_selector_terms[0].match_expressions.as_mut().unwrap()[0].values =
                Some(vec!["node-a".into(), "node-b".into()]);
        }
        assert_eq!(required_node_name(&affinity, HOSTNAME), None);
        assert_eq!(required_node_name(&Affinity::default(), HOSTNAME), None);
    }

    #[test]
    fn test_serializes_to_scheduling_shape() {
        let json = serde_json::to_value(build_node_affinity(HOSTNAME, "node-a")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "nodeAffinity": {
                    "requiredDuringSchedulingIgnoredDuringExecution": {
                        "nodeSelectorTerms": [{
                            "matchExpressions": [{
                                "key": HOSTNAME,
                                "operator": "In",
                                "values": ["node-a"]
                            }]
                        }]
                    }
                }
            })
        );
    }
}
