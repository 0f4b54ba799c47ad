//! # Property Inference
//!
//! Per-node facts derived from a fixed DAG shape:
//!
//! - `Card`: exact cardinality when it is statically known
//! - `Const`: columns holding a single constant value
//! - `Key`: single columns without duplicate values
//! - `Dom`: value domains and the subdomain relation between them
//! - `CKey`: composite keys
//! - `Set`: whether the output is duplicate-free
//! - `Origin`: unique column identities that survive renaming
//! - `Icols`: columns actually read by some ancestor (top-down)
//!
//! Properties are never maintained incrementally. Every record is stamped
//! with the revision its node had at inference time; nodes created or
//! replaced afterwards answer conservatively. Asking for a kind that was not
//! inferred is a programming error and panics.

mod card;
mod composite_key;
mod constant;
mod domain;
mod icols;
mod key;
mod origin;
mod set;

pub use domain::{DomainGraph, DomainId};
pub use icols::required_from;
pub use origin::OriginId;

use crate::algebra::{Atom, Column, Dag, NodeId};
use crate::traversal::post_order;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Property kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropKind {
    Card,
    Const,
    Key,
    Dom,
    CKey,
    Set,
    Origin,
    Icols,
}

impl PropKind {
    const ALL: [PropKind; 8] = [
        PropKind::Card,
        PropKind::Const,
        PropKind::Key,
        PropKind::Dom,
        PropKind::CKey,
        PropKind::Set,
        PropKind::Origin,
        PropKind::Icols,
    ];

    fn deps(self) -> &'static [PropKind] {
        match self {
            PropKind::Card | PropKind::Const | PropKind::Origin => &[],
            PropKind::Key => &[PropKind::Card, PropKind::Const],
            PropKind::Dom => &[PropKind::Card],
            PropKind::CKey => &[PropKind::Card, PropKind::Const, PropKind::Key],
            PropKind::Set => &[PropKind::Key, PropKind::CKey],
            PropKind::Icols => &[PropKind::Const],
        }
    }
}

/// Inferred properties of one DAG shape
#[derive(Debug, Clone, Default)]
pub struct Properties {
    kinds: HashSet<PropKind>,
    stamps: HashMap<NodeId, u64>,
    card: HashMap<NodeId, u64>,
    consts: HashMap<NodeId, Vec<(Column, Atom)>>,
    keys: HashMap<NodeId, BTreeSet<Column>>,
    doms: HashMap<NodeId, HashMap<Column, DomainId>>,
    domains: DomainGraph,
    ckeys: HashMap<NodeId, Vec<BTreeSet<Column>>>,
    set: HashMap<NodeId, bool>,
    origins: HashMap<NodeId, HashMap<Column, OriginId>>,
    icols: HashMap<NodeId, BTreeSet<Column>>,
}

impl Properties {
    /// Infer the requested kinds (and what they depend on) for every node
    /// reachable from `root`
    pub fn infer(dag: &Dag, root: NodeId, kinds: &[PropKind]) -> Properties {
        let mut wanted: HashSet<PropKind> = HashSet::new();
        let mut pending: Vec<PropKind> = kinds.to_vec();
        while let Some(kind) = pending.pop() {
            if wanted.insert(kind) {
                pending.extend_from_slice(kind.deps());
            }
        }

        let order = post_order(dag, root);
        let mut props = Properties {
            domains: DomainGraph::new(),
            ..Properties::default()
        };
        for &id in &order {
            props.stamps.insert(id, dag.revision(id));
        }
        for kind in PropKind::ALL {
            if !wanted.contains(&kind) {
                continue;
            }
            match kind {
                PropKind::Card => card::infer(dag, &order, &mut props),
                PropKind::Const => constant::infer(dag, &order, &mut props),
                PropKind::Key => key::infer(dag, &order, &mut props),
                PropKind::Dom => domain::infer(dag, &order, &mut props),
                PropKind::CKey => composite_key::infer(dag, &order, &mut props),
                PropKind::Set => set::infer(dag, &order, &mut props),
                PropKind::Origin => origin::infer(dag, &order, &mut props),
                PropKind::Icols => icols::infer(dag, root, &mut props),
            }
            props.kinds.insert(kind);
        }
        tracing::trace!(nodes = order.len(), kinds = ?wanted, "properties_inferred");
        props
    }

    pub fn has(&self, kind: PropKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn require(&self, kind: PropKind) {
        assert!(
            self.kinds.contains(&kind),
            "{kind:?} property queried before its inference ran"
        );
    }

    /// Whether the record of `id` still describes its current content
    pub fn is_current(&self, dag: &Dag, id: NodeId) -> bool {
        id.index() < dag.len() && self.stamps.get(&id) == Some(&dag.revision(id))
    }

    /// Exact cardinality, if statically known
    pub fn card(&self, dag: &Dag, id: NodeId) -> Option<u64> {
        self.require(PropKind::Card);
        if !self.is_current(dag, id) {
            return None;
        }
        self.card.get(&id).copied()
    }

    /// Constant value of a column, if it has one
    pub fn constant(&self, dag: &Dag, id: NodeId, col: &Column) -> Option<&Atom> {
        self.require(PropKind::Const);
        if !self.is_current(dag, id) {
            return None;
        }
        self.consts
            .get(&id)
            .and_then(|cs| cs.iter().find(|(c, _)| c == col).map(|(_, v)| v))
    }

    pub fn is_key(&self, dag: &Dag, id: NodeId, col: &Column) -> bool {
        self.require(PropKind::Key);
        self.is_current(dag, id) && self.keys.get(&id).is_some_and(|k| k.contains(col))
    }

    pub fn keys(&self, dag: &Dag, id: NodeId) -> Vec<Column> {
        self.require(PropKind::Key);
        if !self.is_current(dag, id) {
            return Vec::new();
        }
        self.keys.get(&id).map(|k| k.iter().cloned().collect()).unwrap_or_default()
    }

    /// Domain of a column; `None` for nodes without a current record
    pub fn dom(&self, dag: &Dag, id: NodeId, col: &Column) -> Option<DomainId> {
        self.require(PropKind::Dom);
        if !self.is_current(dag, id) {
            return None;
        }
        self.doms.get(&id).and_then(|d| d.get(col)).copied()
    }

    /// `a` is guaranteed to be a subset of `b`
    pub fn subdom(&self, a: DomainId, b: DomainId) -> bool {
        self.require(PropKind::Dom);
        self.domains.subdom(a, b)
    }

    /// Subdomain test on columns of (possibly different) nodes
    pub fn col_subdom(&self, dag: &Dag, (n1, c1): (NodeId, &Column), (n2, c2): (NodeId, &Column)) -> bool {
        match (self.dom(dag, n1, c1), self.dom(dag, n2, c2)) {
            (Some(a), Some(b)) => self.domains.subdom(a, b),
            _ => false,
        }
    }

    pub fn domains(&self) -> &DomainGraph {
        &self.domains
    }

    pub fn ckeys(&self, dag: &Dag, id: NodeId) -> &[BTreeSet<Column>] {
        self.require(PropKind::CKey);
        if !self.is_current(dag, id) {
            return &[];
        }
        self.ckeys.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Whether some (composite) key of `id` is contained in `cols`
    pub fn has_key_within(&self, dag: &Dag, id: NodeId, cols: &BTreeSet<Column>) -> bool {
        self.ckeys(dag, id).iter().any(|k| k.is_subset(cols))
            || self.keys(dag, id).iter().any(|k| cols.contains(k))
    }

    pub fn is_set(&self, dag: &Dag, id: NodeId) -> bool {
        self.require(PropKind::Set);
        self.is_current(dag, id) && self.set.get(&id).copied().unwrap_or(false)
    }

    pub fn origin(&self, dag: &Dag, id: NodeId, col: &Column) -> Option<OriginId> {
        self.require(PropKind::Origin);
        if !self.is_current(dag, id) {
            return None;
        }
        self.origins.get(&id).and_then(|o| o.get(col)).copied()
    }

    /// Required columns; all output columns for nodes without a record
    pub fn icols(&self, dag: &Dag, id: NodeId) -> BTreeSet<Column> {
        self.require(PropKind::Icols);
        if !self.is_current(dag, id) {
            return dag.schema(id).names().cloned().collect();
        }
        self.icols.get(&id).cloned().unwrap_or_default()
    }

    pub fn is_icol(&self, dag: &Dag, id: NodeId, col: &Column) -> bool {
        self.require(PropKind::Icols);
        if !self.is_current(dag, id) {
            return true;
        }
        self.icols.get(&id).is_some_and(|i| i.contains(col))
    }
}
