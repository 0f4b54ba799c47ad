//! Serialized plan format.
//!
//! A plan is a node list in dependency order (children before parents) plus
//! the index of the root. Proxy references use the same indices.
//!
//! ```json
//! { "root": 2,
//!   "nodes": [
//!     { "op": "ref_tbl", "name": "t", "cols": [{"name": "a", "ty": "int"}] },
//!     { "op": "distinct", "children": [0] },
//!     { "op": "project", "proj": [{"new": "x", "old": "a"}], "children": [1] } ] }
//! ```

use super::dag::{Dag, NodeId};
use super::op::Op;
use crate::error::{OptResult, OptimizerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serialized DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub root: usize,
    pub nodes: Vec<PlanNode>,
}

/// One serialized node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    #[serde(flatten)]
    pub op: Op,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<usize>,
}

impl Plan {
    pub fn from_json(text: &str) -> OptResult<Plan> {
        serde_json::from_str(text).map_err(|e| OptimizerError::InvalidPlan(e.to_string()))
    }

    pub fn to_json(&self) -> OptResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| OptimizerError::InvalidPlan(e.to_string()))
    }

    /// Build a DAG from the node list, validating every schema
    pub fn load(&self) -> OptResult<(Dag, NodeId)> {
        let mut dag = Dag::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(&bad) = node.children.iter().find(|&&c| c >= i) {
                return Err(OptimizerError::InvalidPlan(format!(
                    "node {i} references node {bad} which is not defined before it"
                )));
            }
            if let Op::Proxy { exit, base, .. } = &node.op {
                if exit.index() >= i || base.index() >= i {
                    return Err(OptimizerError::InvalidPlan(format!(
                        "proxy {i} references a node defined after it"
                    )));
                }
            }
            let children = node.children.iter().map(|&c| NodeId::from_index(c)).collect();
            dag.add(node.op.clone(), children)?;
        }
        if self.root >= self.nodes.len() {
            return Err(OptimizerError::InvalidPlan(format!(
                "root {} out of range ({} nodes)",
                self.root,
                self.nodes.len()
            )));
        }
        Ok((dag, NodeId::from_index(self.root)))
    }

    /// Serialize the nodes reachable from `root`, dropping garbage slots
    pub fn capture(dag: &Dag, root: NodeId) -> OptResult<Plan> {
        let order = crate::traversal::post_order(dag, root);
        let index: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let lookup = |id: NodeId| {
            index.get(&id).copied().ok_or_else(|| {
                OptimizerError::InvalidPlan(format!("proxy reference {id} is not reachable from the root"))
            })
        };
        let mut nodes = Vec::with_capacity(order.len());
        for &id in &order {
            let node = dag.node(id);
            let op = match &node.op {
                Op::Proxy {
                    exit,
                    base,
                    new_cols,
                    req_cols,
                } => Op::Proxy {
                    exit: NodeId::from_index(lookup(*exit)?),
                    base: NodeId::from_index(lookup(*base)?),
                    new_cols: new_cols.clone(),
                    req_cols: req_cols.clone(),
                },
                op => op.clone(),
            };
            nodes.push(PlanNode {
                op,
                children: node.children.iter().map(|c| index[c]).collect(),
            });
        }
        Ok(Plan {
            root: index[&root],
            nodes,
        })
    }
}
