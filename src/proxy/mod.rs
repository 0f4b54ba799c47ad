//! # Proxy Introduction
//!
//! Finds fragments delimited by an entry operator (usually an equi-join)
//! and an exit operator (usually a row numbering) and rewrites them so the
//! numbering no longer blocks later phases.
//!
//! ```text
//! semijoin proxy   semijoin/distinct join over rowid(cross) -> numbering per cross input
//! nest proxy       join of two independent branches over one rowid -> nested join
//! step fusion      step joined back to its context numbering -> step_join
//! join proxy       key join over a numbering -> proxy node with relocatable base
//! ```
//!
//! All four share one search protocol, see [`engine`].

mod conflicts;
mod dissolve;
mod engine;
mod join_proxy;
mod nest;
mod semijoin;
mod step_fusion;

pub use dissolve::dissolve;
pub use engine::{intro_proxy_kind, Fragment};
pub use join_proxy::JoinProxy;
pub use nest::NestProxy;
pub use semijoin::SemijoinProxy;
pub use step_fusion::StepFusion;

use crate::algebra::{Column, Dag, NodeId, Op};
use crate::error::OptResult;
use crate::properties::{PropKind, Properties};
use std::collections::HashSet;

/// One kind of proxy rewrite
pub trait ProxyRule {
    fn name(&self) -> &'static str;

    /// Property kinds `is_entry`, `is_exit` and `generate` query
    fn required(&self) -> &'static [PropKind];

    fn is_entry(&self, dag: &Dag, props: &Properties, id: NodeId) -> bool;

    fn is_exit(&self, dag: &Dag, props: &Properties, id: NodeId, entry: NodeId) -> bool;

    /// Rewrite the fragment in place. Returns `Ok(false)` when the rewrite
    /// does not apply; nothing may have been modified in that case except
    /// through equivalence-preserving conflict resolution.
    fn generate(
        &self,
        dag: &mut Dag,
        props: &Properties,
        root: NodeId,
        fragment: Fragment,
        checked: &mut HashSet<NodeId>,
    ) -> OptResult<bool>;
}

/// Run every proxy kind in order. Returns the number of rewrites.
///
/// A successful semijoin proxy ends the phase. When the join proxy
/// introduces proxies, unused columns are pruned right away.
pub fn introduce_proxies(dag: &mut Dag, root: NodeId) -> OptResult<usize> {
    let mut checked = HashSet::new();

    let rewrites = intro_proxy_kind(dag, root, &SemijoinProxy, &mut checked)?;
    if rewrites > 0 {
        return Ok(rewrites);
    }

    checked.clear();
    let mut total = intro_proxy_kind(dag, root, &NestProxy, &mut checked)?;

    checked.clear();
    total += intro_proxy_kind(dag, root, &StepFusion, &mut checked)?;

    checked.clear();
    let proxies = intro_proxy_kind(dag, root, &JoinProxy, &mut checked)?;
    if proxies > 0 {
        total += proxies;
        total += crate::icols::optimize_icols(dag, root)?;
    }
    Ok(total)
}

/// Look through an optional projection, translating `col` to the name it
/// has below it
pub(crate) fn below_project(dag: &Dag, id: NodeId, col: &Column) -> (NodeId, Column) {
    match dag.op(id) {
        Op::Project { proj } => {
            let old = proj
                .iter()
                .find(|p| &p.new == col)
                .map_or_else(|| col.clone(), |p| p.old.clone());
            (dag.child(id, 0), old)
        }
        _ => (id, col.clone()),
    }
}

/// Skip an optional projection
pub(crate) fn skip_project(dag: &Dag, id: NodeId) -> NodeId {
    match dag.op(id) {
        Op::Project { .. } => dag.child(id, 0),
        _ => id,
    }
}
