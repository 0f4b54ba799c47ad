//! Moving one internal join below its inputs.
//!
//! Every rewrite rebuilds the plan below the join with fresh-where-needed
//! column names and puts a projection on top that restores the exact
//! output of the join, so no parent ever sees a renamed column.

use crate::algebra::{proj, proj_source, Column, Dag, JoinPred, NodeId, Op, ProjPair};
use crate::error::{OptResult, OptimizerError};
use crate::properties::Properties;
use crate::traversal::{post_order, Mark, Marks};
use std::collections::{HashMap, HashSet};

/// What one attempt did to a join
enum Outcome {
    Stuck,
    /// The join disappeared
    Removed,
    /// The join moved down; `next` are the joins to continue with
    Pushed { next: Vec<NodeId>, counted: bool },
}

/// An internal join seen from the input it is pushed into
struct Side {
    join: NodeId,
    /// 0 when `inner` is the left input
    pos: usize,
    inner: NodeId,
    outer: NodeId,
    inner_list: Vec<ProjPair>,
    outer_list: Vec<ProjPair>,
}

impl Side {
    fn of(dag: &Dag, join: NodeId, pos: usize) -> Option<Side> {
        let Op::InternalJoin { lproj, rproj } = dag.op(join) else {
            return None;
        };
        let (l, r) = (dag.child(join, 0), dag.child(join, 1));
        let side = if pos == 0 {
            Side {
                join,
                pos,
                inner: l,
                outer: r,
                inner_list: lproj.clone(),
                outer_list: rproj.clone(),
            }
        } else {
            Side {
                join,
                pos,
                inner: r,
                outer: l,
                inner_list: rproj.clone(),
                outer_list: lproj.clone(),
            }
        };
        Some(side)
    }

    /// Shared output join column
    fn join_col(&self) -> &Column {
        &self.inner_list[0].new
    }

    fn inner_att(&self) -> &Column {
        &self.inner_list[0].old
    }

    fn outer_att(&self) -> &Column {
        &self.outer_list[0].old
    }

    /// Output names the outer input delivers, the join column included
    fn outer_names(&self) -> HashSet<Column> {
        self.outer_list.iter().map(|p| p.new.clone()).collect()
    }

    /// Internal join of `input`, standing in for the inner input, with the
    /// unchanged outer input
    fn join_with(&self, dag: &mut Dag, input: NodeId, list: Vec<ProjPair>) -> OptResult<NodeId> {
        if self.pos == 0 {
            dag.internal_join(input, self.outer, list, self.outer_list.clone())
        } else {
            dag.internal_join(self.outer, input, self.outer_list.clone(), list)
        }
    }

    /// Overwrite the join with `result`, restoring its output names.
    /// `names` maps every inner column to its name in `result`.
    fn finish(
        &self,
        dag: &mut Dag,
        result: NodeId,
        names: &HashMap<Column, Column>,
        shared: bool,
    ) -> OptResult<()> {
        let outer = self.outer_names();
        let mut list = Vec::with_capacity(dag.schema(self.join).len());
        for out in dag.schema(self.join).names() {
            if outer.contains(out) {
                list.push(proj(out.clone(), out.clone()));
                continue;
            }
            let old = proj_source(&self.inner_list, out).ok_or_else(|| missing(out))?;
            let renamed = names.get(old).ok_or_else(|| missing(old))?;
            list.push(proj(out.clone(), renamed.clone()));
        }
        // a shared result must stay a single slot
        let identity = list.len() == dag.schema(result).len() && list.iter().all(|p| p.new == p.old);
        let top = if identity && !shared {
            result
        } else {
            dag.project(result, list)?
        };
        dag.replace(self.join, top)
    }
}

fn missing(col: &Column) -> OptimizerError {
    OptimizerError::MissingColumn {
        column: col.clone(),
        context: "join_pushdown".to_string(),
    }
}

/// `col` itself unless another output already uses the name
fn bind(dag: &mut Dag, col: &Column, taken: &mut HashSet<Column>) -> Column {
    let name = if taken.contains(col) { dag.fresh(col) } else { col.clone() };
    taken.insert(name.clone());
    name
}

/// Binding list for the input the join moves onto: the inner join column
/// becomes the join column, the other columns are carried along
fn inner_binding(
    dag: &mut Dag,
    side: &Side,
    att: &Column,
    cols: &[Column],
    taken: &mut HashSet<Column>,
    names: &mut HashMap<Column, Column>,
) -> Vec<ProjPair> {
    let mut list = vec![proj(side.join_col().clone(), att.clone())];
    names.insert(att.clone(), side.join_col().clone());
    for col in cols {
        if col == att {
            continue;
        }
        let name = bind(dag, col, taken);
        names.insert(col.clone(), name.clone());
        list.push(proj(name, col.clone()));
    }
    list
}

fn columns(dag: &Dag, id: NodeId) -> Vec<Column> {
    dag.schema(id).names().cloned().collect()
}

/// LEFT on everything below the left input, RIGHT below the right one
fn mark_inputs(dag: &Dag, join: NodeId) -> Marks {
    let mut marks = Marks::new();
    for (i, mark) in [(0, Mark::LEFT), (1, Mark::RIGHT)] {
        for id in post_order(dag, dag.child(join, i)) {
            marks.set(id, mark);
        }
    }
    marks
}

/// Push the join at `p` as far down as it goes. Returns the number of
/// rewrites.
pub(super) fn push_join(dag: &mut Dag, props: &Properties, p: NodeId) -> OptResult<usize> {
    let mut rewrites = 0;
    let mut pending = vec![p];
    while let Some(join) = pending.pop() {
        match push_once(dag, props, join)? {
            Outcome::Stuck => {}
            Outcome::Removed => rewrites += 1,
            Outcome::Pushed { next, counted } => {
                if counted {
                    rewrites += 1;
                }
                pending.extend(next);
            }
        }
    }
    Ok(rewrites)
}

fn push_once(dag: &mut Dag, props: &Properties, p: NodeId) -> OptResult<Outcome> {
    // the right input is tried first
    for pos in [1, 0] {
        let Some(side) = Side::of(dag, p, pos) else {
            return Ok(Outcome::Stuck);
        };

        // a key join of an input with itself only renames
        if side.inner == side.outer
            && side.inner_att() == side.outer_att()
            && props.is_key(dag, side.inner, side.inner_att())
        {
            let mut list = side.inner_list.clone();
            list.extend(side.outer_list[1..].iter().cloned());
            let renamed = dag.project(side.inner, list)?;
            dag.replace(p, renamed)?;
            tracing::trace!(join = %p, "self_join_removed");
            return Ok(Outcome::Removed);
        }

        // every outer row finds exactly one inner row and the inner input
        // has nothing but the join column to offer
        if dag.schema(side.inner).len() == 1
            && props.is_key(dag, side.inner, side.inner_att())
            && props.col_subdom(dag, (side.outer, side.outer_att()), (side.inner, side.inner_att()))
        {
            let mut list = vec![proj(side.join_col().clone(), side.outer_att().clone())];
            list.extend(side.outer_list[1..].iter().cloned());
            list.extend(
                side.inner_list[1..]
                    .iter()
                    .map(|pair| proj(pair.new.clone(), side.outer_att().clone())),
            );
            let kept = dag.project(side.outer, list)?;
            dag.replace(p, kept)?;
            tracing::trace!(join = %p, "filter_free_join_removed");
            return Ok(Outcome::Removed);
        }

        let marks = mark_inputs(dag, p);
        if marks.is(side.inner, Mark::LEFT) && marks.is(side.inner, Mark::RIGHT) {
            continue;
        }

        if let Some(outcome) = push_into(dag, props, &side)? {
            tracing::trace!(join = %p, below = dag.op(side.inner).name(), "join_pushed");
            return Ok(outcome);
        }
    }
    Ok(Outcome::Stuck)
}

fn pushed(next: NodeId) -> Option<Outcome> {
    Some(Outcome::Pushed {
        next: vec![next],
        counted: true,
    })
}

fn push_into(dag: &mut Dag, props: &Properties, side: &Side) -> OptResult<Option<Outcome>> {
    let lp = side.inner;
    let op = dag.op(lp).clone();
    match &op {
        Op::Proxy { .. } | Op::ProxyBase => Err(OptimizerError::ProxyInPushdown(lp)),

        Op::Project { proj: list } => {
            let mut merged = Vec::with_capacity(side.inner_list.len());
            for pair in &side.inner_list {
                let old = proj_source(list, &pair.old).ok_or_else(|| missing(&pair.old))?;
                merged.push(proj(pair.new.clone(), old.clone()));
            }
            let input = dag.child(lp, 0);
            let join = side.join_with(dag, input, merged)?;
            dag.replace(side.join, join)?;
            Ok(pushed(side.join))
        }

        Op::Select { .. } | Op::TypeAssert { .. } | Op::Roots | Op::CondErr { .. } => {
            push_unary(dag, side, &op, false).map(pushed)
        }

        Op::Attach { res, .. }
        | Op::Fun { res, .. }
        | Op::Compare { res, .. }
        | Op::Bool { res, .. }
        | Op::Not { res, .. }
        | Op::Cast { res, .. }
        | Op::TypeTest { res, .. } => {
            if res == side.inner_att() {
                return Ok(None);
            }
            push_unary(dag, side, &op, false).map(pushed)
        }

        Op::RowNum { .. } | Op::RowId { .. } | Op::RowRank { .. } | Op::Rank { .. } | Op::PosSelect { .. } | Op::Distinct => {
            if op.res() == Some(side.inner_att()) || !one_match_per_row(dag, props, side) {
                return Ok(None);
            }
            // numberings seen by other parents must stay one computation
            let pin = matches!(op, Op::RowNum { .. } | Op::RowId { .. });
            push_unary(dag, side, &op, pin).map(pushed)
        }

        Op::Cross | Op::ThetaJoin { .. } => push_product(dag, side, &op).map(pushed),

        Op::SemiJoin { att1, att2 } => {
            let input = dag.child(lp, 0);
            let filter = dag.child(lp, 1);
            let cols = columns(dag, input);
            let mut taken = side.outer_names();
            let mut names = HashMap::new();
            let list = inner_binding(dag, side, side.inner_att(), &cols, &mut taken, &mut names);
            let join = side.join_with(dag, input, list)?;
            let att1 = names.get(att1).cloned().ok_or_else(|| missing(att1))?;
            let result = dag.semijoin(join, filter, att1, att2.clone())?;
            side.finish(dag, result, &names, false)?;
            Ok(pushed(join))
        }

        Op::DisjUnion => {
            let (l, r) = (dag.child(lp, 0), dag.child(lp, 1));
            // appending to the result of a difference gains nothing
            if feeds_on_difference(dag, l) || feeds_on_difference(dag, r) {
                return Ok(None);
            }
            let cols = columns(dag, lp);
            let mut taken = side.outer_names();
            let mut names = HashMap::new();
            let list = inner_binding(dag, side, side.inner_att(), &cols, &mut taken, &mut names);
            let left = side.join_with(dag, l, list.clone())?;
            let right = side.join_with(dag, r, list)?;
            let result = dag.union(left, right)?;
            side.finish(dag, result, &names, false)?;
            Ok(Some(Outcome::Pushed {
                next: vec![left, right],
                counted: true,
            }))
        }

        Op::InternalJoin { lproj, rproj } => push_nested(dag, side, lproj, rproj),

        _ => Ok(None),
    }
}

/// The outer input is key on its join column and holds every inner join
/// value, so each inner row is extended by exactly one outer row
fn one_match_per_row(dag: &Dag, props: &Properties, side: &Side) -> bool {
    props.is_key(dag, side.outer, side.outer_att())
        && props.col_subdom(dag, (side.inner, side.inner_att()), (side.outer, side.outer_att()))
}

fn feeds_on_difference(dag: &Dag, mut cur: NodeId) -> bool {
    loop {
        match dag.op(cur) {
            Op::Project { .. } | Op::Attach { .. } => cur = dag.child(cur, 0),
            Op::Difference => return true,
            _ => return false,
        }
    }
}

/// `op(join(input, outer))` in place of `join(op(input), outer)`. Further
/// inputs of `op` (the condition of `cond_err`) stay where they are.
fn push_unary(dag: &mut Dag, side: &Side, op: &Op, pin: bool) -> OptResult<NodeId> {
    let lp = side.inner;
    let input = dag.child(lp, 0);
    let cols = columns(dag, input);
    let mut taken = side.outer_names();
    let mut names = HashMap::new();
    let list = inner_binding(dag, side, side.inner_att(), &cols, &mut taken, &mut names);
    if let Some(res) = op.res() {
        let name = bind(dag, res, &mut taken);
        names.insert(res.clone(), name);
    }

    let join = side.join_with(dag, input, list)?;
    let mut children = vec![join];
    children.extend_from_slice(&dag.children(lp)[1..]);
    let renamed = op.rename(|c| names.get(c).cloned().unwrap_or_else(|| c.clone()));
    let result = dag.add(renamed, children)?;

    side.finish(dag, result, &names, pin)?;
    if pin {
        let mut list = Vec::with_capacity(dag.schema(lp).len());
        for col in dag.schema(lp).names() {
            let name = names.get(col).ok_or_else(|| missing(col))?;
            list.push(proj(col.clone(), name.clone()));
        }
        let pinned = dag.project(result, list)?;
        dag.replace(lp, pinned)?;
    }
    Ok(join)
}

/// Cross products and theta-joins take the join on the input that holds
/// the join column; the other input is renamed out of the way
fn push_product(dag: &mut Dag, side: &Side, op: &Op) -> OptResult<NodeId> {
    let lp = side.inner;
    let s = usize::from(!dag.has_col(dag.child(lp, 0), side.inner_att()));
    let target = dag.child(lp, s);
    let rest = dag.child(lp, 1 - s);

    let mut taken = side.outer_names();
    let mut names = HashMap::new();
    let target_cols = columns(dag, target);
    let list = inner_binding(dag, side, side.inner_att(), &target_cols, &mut taken, &mut names);
    let mut rest_list = Vec::new();
    for col in columns(dag, rest) {
        let name = bind(dag, &col, &mut taken);
        names.insert(col.clone(), name.clone());
        rest_list.push(proj(name, col));
    }

    let join = side.join_with(dag, target, list)?;
    let rest = if rest_list.iter().all(|p| p.new == p.old) {
        rest
    } else {
        dag.project(rest, rest_list)?
    };
    let rename = |c: &Column| names.get(c).cloned().unwrap_or_else(|| c.clone());
    let op = match op {
        Op::ThetaJoin { preds } => Op::ThetaJoin {
            preds: preds
                .iter()
                .map(|p| JoinPred {
                    comp: p.comp,
                    left: rename(&p.left),
                    right: rename(&p.right),
                })
                .collect(),
        },
        other => other.clone(),
    };
    let children = if s == 0 { vec![join, rest] } else { vec![rest, join] };
    let result = dag.add(op, children)?;
    side.finish(dag, result, &names, false)?;
    Ok(join)
}

/// Re-associate `join(join(A, B), C)` to `join(join(A, C), B)` (or the
/// mirror image), joining `C` with the input the join column comes from.
///
/// Only reported as a rewrite when the lower join moves on afterwards,
/// otherwise two joins could keep trading places.
fn push_nested(dag: &mut Dag, side: &Side, lproj: &[ProjPair], rproj: &[ProjPair]) -> OptResult<Option<Outcome>> {
    let lp = side.inner;
    let att = side.inner_att();
    let (s, col) = if let Some(old) = proj_source(lproj, att) {
        (0, old.clone())
    } else if let Some(old) = proj_source(&rproj[1..], att) {
        (1, old.clone())
    } else {
        return Err(missing(att));
    };
    let (own, other_list) = if s == 0 { (lproj, rproj) } else { (rproj, lproj) };
    let target = dag.child(lp, s);
    let other = dag.child(lp, 1 - s);
    if is_barrier(dag.op(target)) {
        return Ok(None);
    }

    let mut taken = side.outer_names();
    let mut target_names = HashMap::new();
    let target_cols = columns(dag, target);
    let list = inner_binding(dag, side, &col, &target_cols, &mut taken, &mut target_names);
    let lower = side.join_with(dag, target, list)?;

    // the former inner join column, now delivered by the lower join
    let shared = target_names.get(&own[0].old).cloned().ok_or_else(|| missing(&own[0].old))?;
    let mut lower_list = vec![proj(shared.clone(), shared.clone())];
    for name in dag.schema(lower).names() {
        taken.insert(name.clone());
        if name != &shared {
            lower_list.push(proj(name.clone(), name.clone()));
        }
    }
    let mut other_names = HashMap::new();
    let mut upper_other = vec![proj(shared.clone(), other_list[0].old.clone())];
    for col in columns(dag, other) {
        let name = bind(dag, &col, &mut taken);
        other_names.insert(col.clone(), name.clone());
        upper_other.push(proj(name, col));
    }
    let upper = if s == 0 {
        dag.internal_join(lower, other, lower_list, upper_other)?
    } else {
        dag.internal_join(other, lower, upper_other, lower_list)?
    };

    // output names of the nested join in terms of the upper join
    let mut names = HashMap::new();
    names.insert(own[0].new.clone(), shared.clone());
    names.insert(other_list[0].new.clone(), shared);
    for pair in &own[1..] {
        let name = target_names.get(&pair.old).ok_or_else(|| missing(&pair.old))?;
        names.insert(pair.new.clone(), name.clone());
    }
    for pair in &other_list[1..] {
        let name = other_names.get(&pair.old).ok_or_else(|| missing(&pair.old))?;
        names.insert(pair.new.clone(), name.clone());
    }
    side.finish(dag, upper, &names, false)?;
    Ok(Some(Outcome::Pushed {
        next: vec![lower],
        counted: false,
    }))
}

/// Operators no join ever moves below
fn is_barrier(op: &Op) -> bool {
    matches!(
        op,
        Op::LitTbl { .. }
            | Op::EmptyTbl { .. }
            | Op::RefTbl { .. }
            | Op::Intersect
            | Op::Difference
            | Op::Aggr { .. }
            | Op::Step { .. }
            | Op::StepJoin { .. }
            | Op::Serialize { .. }
            | Op::ThetaJoinOpt { .. }
    ) || op.is_constructor()
}
