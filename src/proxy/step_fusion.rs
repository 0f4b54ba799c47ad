//! Step fusion.
//!
//! A location step whose context is a row numbering, joined back against
//! that same numbering on the iteration column, is a duplicate-preserving
//! step in disguise:
//!
//! ```text
//!      join(iter = num)                project
//!       /          \                      |
//!   step(iter)   rowid_num      step_join(item -> item')
//!       |            |                    |
//!   project(iter <- num)             rowid_num
//!       \          /
//!        rowid_num
//! ```

use super::{below_project, Fragment, ProxyRule};
use crate::algebra::{proj, proj_identity, proj_source, Column, Dag, NodeId, Op, ProjPair};
use crate::error::{OptResult, OptimizerError};
use crate::properties::{PropKind, Properties};
use std::collections::HashSet;

pub struct StepFusion;

/// What one side of the entry join computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    /// The numbering itself
    Number(NodeId),
    /// A step whose context iterations come from the numbering
    Step(NodeId),
}

fn classify(dag: &Dag, side: NodeId, att: &Column) -> Option<Side> {
    let (cur, att) = below_project(dag, side, att);
    match dag.op(cur) {
        Op::RowId { res } if *res == att => Some(Side::Number(cur)),
        Op::Step { iter, .. } if *iter == att => {
            let (ctx, att) = below_project(dag, dag.child(cur, 1), &att);
            match dag.op(ctx) {
                Op::RowId { res } if *res == att => Some(Side::Step(ctx)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn is_step_side(dag: &Dag, id: NodeId) -> bool {
    match dag.op(id) {
        Op::Step { .. } => true,
        Op::Project { .. } => matches!(dag.op(dag.child(id, 0)), Op::Step { .. }),
        _ => false,
    }
}

impl ProxyRule for StepFusion {
    fn name(&self) -> &'static str {
        "step_fusion"
    }

    fn required(&self) -> &'static [PropKind] {
        &[]
    }

    fn is_entry(&self, dag: &Dag, _props: &Properties, p: NodeId) -> bool {
        let Op::EqJoin { att1, att2 } = dag.op(p) else {
            return false;
        };
        let left = classify(dag, dag.child(p, 0), att1);
        let right = classify(dag, dag.child(p, 1), att2);
        match (left, right) {
            (Some(Side::Number(n)), Some(Side::Step(m))) | (Some(Side::Step(m)), Some(Side::Number(n))) => n == m,
            _ => false,
        }
    }

    fn is_exit(&self, dag: &Dag, _props: &Properties, p: NodeId, entry: NodeId) -> bool {
        if !matches!(dag.op(p), Op::RowId { .. }) {
            return false;
        }
        let mut cur = dag.child(entry, 0);
        loop {
            match dag.op(cur) {
                Op::RowId { .. } => return cur == p,
                Op::Project { .. } => cur = dag.child(cur, 0),
                Op::Step { .. } => cur = dag.child(cur, 1),
                _ => return false,
            }
        }
    }

    fn generate(
        &self,
        dag: &mut Dag,
        _props: &Properties,
        _root: NodeId,
        fragment: Fragment,
        _checked: &mut HashSet<NodeId>,
    ) -> OptResult<bool> {
        let (entry, exit) = (fragment.entry, fragment.exit);
        if fragment.conflicts.iter().any(|&c| c != entry && c != exit) {
            return Ok(false);
        }
        let num_col = match dag.op(exit) {
            Op::RowId { res } => res.clone(),
            other => {
                return Err(OptimizerError::UnexpectedOperator {
                    node: exit,
                    expected: "rowid",
                    found: other.name(),
                })
            }
        };

        let (l, r) = (dag.child(entry, 0), dag.child(entry, 1));
        let (step_side, cur) = if is_step_side(dag, l) { (l, r) } else { (r, l) };
        let (above, step) = match dag.op(step_side) {
            Op::Project { proj } => (Some(proj.clone()), dag.child(step_side, 0)),
            _ => (None, step_side),
        };
        let Op::Step { axis, test, iter, item } = dag.op(step).clone() else {
            return Err(OptimizerError::UnexpectedOperator {
                node: step,
                expected: "step",
                found: dag.op(step).name(),
            });
        };

        let ctx = dag.child(step, 1);
        let ctx_item = match dag.op(ctx) {
            Op::Project { proj } => proj_source(proj, &item).cloned().unwrap_or_else(|| item.clone()),
            _ => item.clone(),
        };
        let item_res = dag.fresh(&Column::new("item"));

        let mut list: Vec<ProjPair> = match dag.op(cur) {
            Op::Project { proj } => proj.clone(),
            _ => proj_identity(dag.schema(cur).names()),
        };
        let step_pairs = above.unwrap_or_else(|| vec![proj(iter.clone(), iter.clone()), proj(item.clone(), item.clone())]);
        for pair in step_pairs {
            if pair.old == item {
                list.push(proj(pair.new, item_res.clone()));
            } else if pair.old == iter {
                list.push(proj(pair.new, num_col.clone()));
            } else {
                return Err(OptimizerError::MissingColumn {
                    column: pair.old,
                    context: "step_fusion".to_string(),
                });
            }
        }

        let frag = dag.child(step, 0);
        let fused = dag.step_join(frag, exit, axis, &test, ctx_item, item_res)?;
        let result = dag.project(fused, list)?;
        dag.replace(entry, result)?;
        Ok(true)
    }
}
