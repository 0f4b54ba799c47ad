//! # Required-Column Pruning
//!
//! Removes whatever no ancestor reads:
//!
//! - column-producing operators whose result is never required
//! - projection entries and literal/empty table columns nobody requires
//!   (at least one column always survives)
//! - aggregates whose result is unused (a distinct partition remains)
//! - union inputs are narrowed to the columns the union must deliver
//! - distinct over inputs that already have a key column
//! - `cross(A, B)` becomes `B` when `A` is a single row nobody reads from
//!
//! Repeats until a pass changes nothing.

use crate::algebra::{proj, proj_identity, AlgType, Atom, Column, Dag, NodeId, Op, ProjPair, SchemaItem};
use crate::error::OptResult;
use crate::properties::{PropKind, Properties};
use crate::traversal::walk_bottom_up;
use std::collections::BTreeSet;

/// Prune unused columns below `root`. Returns the number of rewrites.
pub fn optimize_icols(dag: &mut Dag, root: NodeId) -> OptResult<usize> {
    let mut total = 0;
    loop {
        let props = Properties::infer(dag, root, &[PropKind::Icols, PropKind::Key, PropKind::Card]);
        let mut rewrites = 0;
        walk_bottom_up(dag, root, |dag, id| {
            let changed = prune(dag, &props, id)?;
            if changed {
                rewrites += 1;
            }
            Ok(changed)
        })?;
        if rewrites == 0 {
            break;
        }
        total += rewrites;
    }
    Ok(total)
}

fn prune(dag: &mut Dag, props: &Properties, id: NodeId) -> OptResult<bool> {
    // nodes created during this pass already match their inputs
    if !props.is_current(dag, id) {
        dag.refresh_schema(id)?;
        return Ok(false);
    }
    let icols = props.icols(dag, id);
    let op = dag.op(id).clone();

    // Children are pruned already. An operator is dropped or has its own
    // payload narrowed before its schema is recomputed, since the inputs
    // may no longer carry the columns it used to read.
    if let Some(res) = op.res() {
        // node constructors stay where they are
        if !op.is_constructor() && !matches!(op, Op::StepJoin { .. }) && !icols.contains(res) {
            let input = dag.child(id, 0);
            tracing::trace!(node = %id, op = op.name(), column = %res, "unused_result");
            dag.replace(id, input)?;
            return Ok(true);
        }
    }
    if let Op::TypeAssert { att, .. } = &op {
        if !icols.contains(att) {
            let input = dag.child(id, 0);
            dag.replace(id, input)?;
            return Ok(true);
        }
    }
    let narrowed = match &op {
        Op::Project { proj } => narrow_project(dag, id, proj, &icols)?,
        Op::DisjUnion => narrow_union(dag, id, &icols)?,
        _ => false,
    };
    dag.refresh_schema(id)?;

    let rewritten = match op {
        Op::LitTbl { cols, tuples } => narrow_literal(dag, id, cols, tuples, &icols)?,
        Op::EmptyTbl { cols } => {
            let keep = kept_positions(&cols, &icols);
            if keep.len() == cols.len() {
                false
            } else {
                let cols = keep.iter().map(|&i| cols[i].clone()).collect();
                dag.set_op(id, Op::EmptyTbl { cols })?;
                true
            }
        }
        Op::Aggr { res, part, .. } if !icols.contains(&res) => {
            let grouping = match part {
                Some(part) => {
                    let input = dag.child(id, 0);
                    let projected = dag.project(input, vec![proj(part.clone(), part)])?;
                    dag.distinct(projected)?
                }
                None => dag.lit_tbl(vec![SchemaItem::new(res, AlgType::Nat)], vec![vec![Atom::Nat(42)]])?,
            };
            dag.replace(id, grouping)?;
            true
        }
        Op::Distinct => {
            let input = dag.child(id, 0);
            if props.keys(dag, input).is_empty() {
                false
            } else {
                dag.replace(id, input)?;
                true
            }
        }
        Op::Cross => {
            let (l, r) = (dag.child(id, 0), dag.child(id, 1));
            if unread_single_row(dag, props, l, &icols) {
                dag.replace(id, r)?;
                true
            } else if unread_single_row(dag, props, r, &icols) {
                dag.replace(id, l)?;
                true
            } else {
                false
            }
        }
        _ => false,
    };
    Ok(narrowed || rewritten)
}

/// A single-row input of `cross` none of whose columns the cross must
/// deliver
fn unread_single_row(dag: &Dag, props: &Properties, side: NodeId, required: &BTreeSet<Column>) -> bool {
    props.card(dag, side) == Some(1) && !dag.schema(side).names().any(|c| required.contains(c))
}

fn narrow_project(dag: &mut Dag, id: NodeId, list: &[ProjPair], icols: &BTreeSet<Column>) -> OptResult<bool> {
    let input = dag.child(id, 0);
    let mut kept: Vec<ProjPair> = list.iter().filter(|p| icols.contains(&p.new)).cloned().collect();
    if kept.is_empty() {
        // one column survives; its old name may be gone from the input
        let Some(first) = list.first() else {
            return Ok(false);
        };
        let old = if dag.has_col(input, &first.old) {
            first.old.clone()
        } else {
            match dag.schema(input).names().next() {
                Some(any) => any.clone(),
                None => return Ok(false),
            }
        };
        kept.push(proj(first.new.clone(), old));
    }
    if kept.as_slice() == list {
        return Ok(false);
    }
    dag.set_op(id, Op::Project { proj: kept })?;
    Ok(true)
}

fn kept_positions(cols: &[SchemaItem], icols: &BTreeSet<Column>) -> Vec<usize> {
    let keep: Vec<usize> = (0..cols.len()).filter(|&i| icols.contains(&cols[i].name)).collect();
    if keep.is_empty() && !cols.is_empty() {
        vec![0]
    } else {
        keep
    }
}

fn narrow_literal(
    dag: &mut Dag,
    id: NodeId,
    cols: Vec<SchemaItem>,
    tuples: Vec<Vec<Atom>>,
    icols: &BTreeSet<Column>,
) -> OptResult<bool> {
    let keep = kept_positions(&cols, icols);
    if keep.len() == cols.len() {
        return Ok(false);
    }
    let tuples = tuples
        .into_iter()
        .map(|t| keep.iter().filter_map(|&i| t.get(i).cloned()).collect())
        .collect();
    let cols = keep.iter().map(|&i| cols[i].clone()).collect();
    dag.set_op(id, Op::LitTbl { cols, tuples })?;
    Ok(true)
}

/// Put a projection on each union input that delivers more than the
/// union must
fn narrow_union(dag: &mut Dag, id: NodeId, icols: &BTreeSet<Column>) -> OptResult<bool> {
    let (l, r) = (dag.child(id, 0), dag.child(id, 1));
    let in_both = |c: &Column| dag.has_col(l, c) && dag.has_col(r, c);
    let mut want: Vec<Column> = dag
        .schema(id)
        .names()
        .filter(|c| icols.contains(*c) && in_both(*c))
        .cloned()
        .collect();
    if want.is_empty() {
        match dag.schema(l).names().find(|c| in_both(*c)) {
            Some(c) => want.push(c.clone()),
            None => return Ok(false),
        }
    }

    let sides = if l == r { vec![l] } else { vec![l, r] };
    let mut changed = false;
    for side in sides {
        if dag.schema(side).len() > want.len() {
            let narrowed = dag.project(side, proj_identity(&want))?;
            dag.relink(id, side, narrowed)?;
            changed = true;
        }
    }
    Ok(changed)
}
