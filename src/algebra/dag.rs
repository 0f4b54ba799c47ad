//! Arena DAG with stable handles and identity-preserving mutation.
//!
//! Nodes may have several parents. The only content mutation is
//! [`Dag::replace`], which overwrites the slot a handle addresses, so every
//! parent observes the new content without any edge being retargeted.
//! [`Dag::relink`] retargets a single edge and is reserved for fragment
//! rewrites that must split the parents of a node.

use super::column::{Column, NameGenerator, Schema};
use super::op::Op;
use crate::error::{OptResult, OptimizerError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a DAG slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operator node: kind payload, ordered children and output schema
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub op: Op,
    pub children: Vec<NodeId>,
    pub schema: Schema,
}

/// Arena of operator nodes
#[derive(Debug, Clone, Default)]
pub struct Dag {
    nodes: Vec<Node>,
    /// Per-slot revision stamps, bumped whenever a slot is mutated
    revisions: Vec<u64>,
    clock: u64,
    names: NameGenerator,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots (reachable or not)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a node, computing and validating its schema
    pub fn add(&mut self, op: Op, children: Vec<NodeId>) -> OptResult<NodeId> {
        let schema = self.schema_for(&op, &children)?;
        for name in schema.names() {
            self.names.reserve(name);
        }
        self.reserve_payload_names(&op);
        let id = NodeId::from_index(self.nodes.len());
        self.clock += 1;
        self.nodes.push(Node { op, children, schema });
        self.revisions.push(self.clock);
        Ok(id)
    }

    fn schema_for(&self, op: &Op, children: &[NodeId]) -> OptResult<Schema> {
        let mut inputs = Vec::with_capacity(children.len());
        for &c in children {
            inputs.push(&self.get(c)?.schema);
        }
        op.output_schema(&inputs)
    }

    // Names that never show up in a schema (hidden theta-join inputs and
    // results) must stay reserved as well.
    fn reserve_payload_names(&mut self, op: &Op) {
        if let Op::ThetaJoinOpt { preds } = op {
            for p in preds {
                self.names.reserve(&p.left);
                self.names.reserve(&p.right);
                if let Some(res) = &p.res {
                    self.names.reserve(res);
                }
            }
        }
    }

    pub fn get(&self, id: NodeId) -> OptResult<&Node> {
        self.nodes.get(id.index()).ok_or(OptimizerError::UnknownNode(id))
    }

    /// Node content; panics on a handle from another DAG
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn op(&self, id: NodeId) -> &Op {
        &self.nodes[id.index()].op
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// The `i`-th child (0 = left, 1 = right)
    pub fn child(&self, id: NodeId, i: usize) -> NodeId {
        self.nodes[id.index()].children[i]
    }

    pub fn schema(&self, id: NodeId) -> &Schema {
        &self.nodes[id.index()].schema
    }

    pub fn has_col(&self, id: NodeId, col: &Column) -> bool {
        self.schema(id).contains(col)
    }

    pub fn revision(&self, id: NodeId) -> u64 {
        self.revisions[id.index()]
    }

    /// Overwrite the content of slot `id` with the content of `new`.
    ///
    /// Incoming edges of `id` are left untouched, so all parents see the
    /// rewritten operator. `new` must not reach `id`, otherwise the DAG
    /// would become cyclic.
    pub fn replace(&mut self, id: NodeId, new: NodeId) -> OptResult<()> {
        if id == new {
            return Ok(());
        }
        let content = self.get(new)?.clone();
        self.get(id)?;
        if content.children.contains(&id) {
            return Err(OptimizerError::InvalidPlan(format!(
                "replacing {id} with {new} would make {id} its own child"
            )));
        }
        self.nodes[id.index()] = content;
        self.touch(id);
        Ok(())
    }

    /// Retarget every edge `parent -> old` to `parent -> new`
    pub fn relink(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> OptResult<()> {
        self.get(new)?;
        let node = self
            .nodes
            .get_mut(parent.index())
            .ok_or(OptimizerError::UnknownNode(parent))?;
        let mut found = false;
        for c in &mut node.children {
            if *c == old {
                *c = new;
                found = true;
            }
        }
        if !found {
            return Err(OptimizerError::NotAChild { parent, child: old });
        }
        self.touch(parent);
        Ok(())
    }

    /// Replace the operator payload of a slot, keeping its children
    pub fn set_op(&mut self, id: NodeId, op: Op) -> OptResult<()> {
        let children = self.get(id)?.children.clone();
        let schema = self.schema_for(&op, &children)?;
        for name in schema.names() {
            self.names.reserve(name);
        }
        self.reserve_payload_names(&op);
        let node = &mut self.nodes[id.index()];
        node.op = op;
        node.schema = schema;
        self.touch(id);
        Ok(())
    }

    /// Recompute the stored schema of a slot from its current children
    pub fn refresh_schema(&mut self, id: NodeId) -> OptResult<bool> {
        let node = self.get(id)?;
        let schema = self.schema_for(&node.op, &node.children)?;
        if schema == self.nodes[id.index()].schema {
            return Ok(false);
        }
        self.nodes[id.index()].schema = schema;
        self.touch(id);
        Ok(true)
    }

    /// Recompute all schemas below `root` bottom-up, validating every node
    pub fn refresh_schemas(&mut self, root: NodeId) -> OptResult<()> {
        for id in crate::traversal::post_order(self, root) {
            self.refresh_schema(id)?;
        }
        Ok(())
    }

    fn touch(&mut self, id: NodeId) {
        self.clock += 1;
        self.revisions[id.index()] = self.clock;
    }

    /// Fresh column name, unique across the whole DAG
    pub fn fresh(&mut self, base: &Column) -> Column {
        self.names.fresh(base)
    }

    pub fn names(&self) -> &NameGenerator {
        &self.names
    }

    /// Number of nodes reachable from `root`
    pub fn reachable_count(&self, root: NodeId) -> usize {
        crate::traversal::post_order(self, root).len()
    }
}
