//! One hoisting step: an operator directly above an internal theta-join
//! trades places with it.

use crate::algebra::{proj, Column, Comparison, Dag, NodeId, Op, ProjPair, SchemaItem, SortKey, TjPred};
use crate::error::{OptResult, OptimizerError};
use crate::properties::{PropKind, Properties};

fn is_tj(dag: &Dag, id: NodeId) -> bool {
    matches!(dag.op(id), Op::ThetaJoinOpt { .. })
}

fn preds_of(dag: &Dag, tj: NodeId) -> OptResult<Vec<TjPred>> {
    match dag.op(tj) {
        Op::ThetaJoinOpt { preds } => Ok(preds.clone()),
        other => Err(OptimizerError::UnexpectedOperator {
            node: tj,
            expected: "thetajoin_opt",
            found: other.name(),
        }),
    }
}

fn has_all(dag: &Dag, id: NodeId, cols: &[Column]) -> bool {
    cols.iter().all(|c| dag.has_col(id, c))
}

/// Inputs of a theta-join after renaming every column in `taken` that
/// either input still carries. Such columns are never visible in the join
/// output, only hidden predicate inputs or shadowed duplicates clash.
fn resolve_conflicts(dag: &mut Dag, tj: NodeId, taken: &[Column]) -> OptResult<(NodeId, NodeId, Vec<TjPred>)> {
    let mut preds = preds_of(dag, tj)?;
    let mut inputs = [dag.child(tj, 0), dag.child(tj, 1)];
    for (side, input) in inputs.iter_mut().enumerate() {
        let names: Vec<Column> = dag.schema(*input).names().cloned().collect();
        if !names.iter().any(|c| taken.contains(c)) {
            continue;
        }
        let mut list = Vec::with_capacity(names.len());
        for name in names {
            if !taken.contains(&name) {
                list.push(proj(name.clone(), name));
                continue;
            }
            let fresh = dag.fresh(&name);
            for p in &mut preds {
                let col = if side == 0 { &mut p.left } else { &mut p.right };
                if *col == name {
                    *col = fresh.clone();
                }
            }
            list.push(proj(fresh, name));
        }
        *input = dag.project(*input, list)?;
    }
    Ok((inputs[0], inputs[1], preds))
}

/// Overwrite `p` with a theta-join over the given inputs
fn rebuild(dag: &mut Dag, p: NodeId, l: NodeId, r: NodeId, preds: Vec<TjPred>) -> OptResult<bool> {
    let tj = dag.thetajoin_opt(l, r, preds)?;
    dag.replace(p, tj)?;
    Ok(true)
}

/// Push the unary operator of `p` into the chosen inputs of its theta-join
/// child. Children of `p` beyond the first are carried along.
fn push_into(dag: &mut Dag, p: NodeId, tj: NodeId, left: bool, right: bool) -> OptResult<bool> {
    let op = dag.op(p).clone();
    push_op(dag, p, tj, op, left, right)
}

fn push_op(dag: &mut Dag, p: NodeId, tj: NodeId, op: Op, left: bool, right: bool) -> OptResult<bool> {
    if !left && !right {
        return Ok(false);
    }
    let taken: Vec<Column> = op.res().cloned().into_iter().collect();
    let (mut l, mut r, preds) = resolve_conflicts(dag, tj, &taken)?;
    let extra = dag.children(p)[1..].to_vec();
    if left {
        let children = std::iter::once(l).chain(extra.iter().copied()).collect();
        l = dag.add(op.clone(), children)?;
    }
    if right {
        let children = std::iter::once(r).chain(extra.iter().copied()).collect();
        r = dag.add(op, children)?;
    }
    rebuild(dag, p, l, r, preds)
}

/// Push into every input that provides all of `cols`
fn push_by_columns(dag: &mut Dag, p: NodeId, tj: NodeId, cols: &[Column]) -> OptResult<bool> {
    let left = has_all(dag, dag.child(tj, 0), cols);
    let right = has_all(dag, dag.child(tj, 1), cols);
    push_into(dag, p, tj, left, right)
}

/// Try to hoist the theta-join below `p` above it
pub(super) fn hoist(dag: &mut Dag, p: NodeId) -> OptResult<bool> {
    let op = dag.op(p).clone();
    let children = dag.children(p).to_vec();
    let Some(&first) = children.first() else {
        return Ok(false);
    };
    match op {
        Op::Attach { .. } if is_tj(dag, first) => push_into(dag, p, first, true, true),
        Op::Fun { ref args, .. } if is_tj(dag, first) => push_by_columns(dag, p, first, args),
        Op::Bool { ref att1, ref att2, .. } if is_tj(dag, first) => {
            push_by_columns(dag, p, first, &[att1.clone(), att2.clone()])
        }
        Op::TypeTest { ref att, .. } | Op::TypeAssert { ref att, .. } | Op::Cast { ref att, .. }
            if is_tj(dag, first) =>
        {
            push_by_columns(dag, p, first, std::slice::from_ref(att))
        }
        Op::Compare {
            comp,
            ref res,
            ref att1,
            ref att2,
        } if is_tj(dag, first) => hoist_compare(dag, p, first, comp, res, att1, att2),
        Op::Not { ref res, ref att } if is_tj(dag, first) => hoist_not(dag, p, first, res, att),
        Op::Select { ref att } if is_tj(dag, first) => hoist_select(dag, p, first, att),
        Op::Select { ref att } if matches!(dag.op(first), Op::EqJoin { .. }) => {
            select_below_eqjoin(dag, p, first, att)
        }
        Op::Project { ref proj } if is_tj(dag, first) => hoist_project(dag, p, first, proj),
        Op::Distinct if is_tj(dag, first) => {
            let preds = preds_of(dag, first)?;
            if !all_visible(&preds) {
                return Ok(false);
            }
            push_into(dag, p, first, true, true)
        }
        Op::RowNum {
            ref res,
            ref sort,
            part: Some(ref part),
        } if is_tj(dag, first) => {
            let numbering = Op::RowNum {
                res: res.clone(),
                sort: sort.clone(),
                part: None,
            };
            hoist_partitioned(dag, p, first, numbering, sort, part)
        }
        Op::PosSelect {
            pos,
            ref sort,
            part: Some(ref part),
        } if is_tj(dag, first) => {
            let selection = Op::PosSelect {
                pos,
                sort: sort.clone(),
                part: None,
            };
            hoist_partitioned(dag, p, first, selection, sort, part)
        }
        Op::Rank { ref sort, .. } | Op::RowRank { ref sort, .. } if is_tj(dag, first) => {
            let (l, r) = (dag.child(first, 0), dag.child(first, 1));
            let (lsort, rsort) = (sort_count(dag, l, sort), sort_count(dag, r, sort));
            if lsort == 0 && rsort == sort.len() {
                push_into(dag, p, first, false, true)
            } else if rsort == 0 && lsort == sort.len() {
                push_into(dag, p, first, true, false)
            } else {
                Ok(false)
            }
        }
        // the error may relate to either input; it stays with the left one
        Op::CondErr { .. } if is_tj(dag, first) => push_into(dag, p, first, true, false),
        Op::SemiJoin { ref att1, .. } if is_tj(dag, first) => {
            let left = dag.has_col(dag.child(first, 0), att1);
            push_into(dag, p, first, left, !left)
        }
        Op::EqJoin { .. } => hoist_eqjoin(dag, p, &op, first, children[1]),
        Op::StepJoin { ref item, ref res, .. } if is_tj(dag, children[1]) => {
            hoist_step_join(dag, p, &op, first, children[1], item, res)
        }
        Op::DisjUnion if is_attach_pair(dag, first, children[1]) => attach_union(dag, p, first, children[1]),
        Op::DisjUnion | Op::Intersect | Op::Difference => hoist_set_op(dag, p, &op, first, children[1]),
        _ => Ok(false),
    }
}

fn all_visible(preds: &[TjPred]) -> bool {
    preds.iter().all(|p| p.left_vis && p.right_vis)
}

fn sort_count(dag: &Dag, id: NodeId, sort: &[SortKey]) -> usize {
    sort.iter().filter(|k| dag.has_col(id, &k.col)).count()
}

/// Numbering and positional selection move into the input that holds all
/// sort columns while the partition column comes from the other input;
/// the partition is dropped.
fn hoist_partitioned(
    dag: &mut Dag,
    p: NodeId,
    tj: NodeId,
    op: Op,
    sort: &[SortKey],
    part: &Column,
) -> OptResult<bool> {
    let (l, r) = (dag.child(tj, 0), dag.child(tj, 1));
    if dag.has_col(l, part) && sort_count(dag, r, sort) == sort.len() {
        push_op(dag, p, tj, op, false, true)
    } else if dag.has_col(r, part) && sort_count(dag, l, sort) == sort.len() {
        push_op(dag, p, tj, op, true, false)
    } else {
        Ok(false)
    }
}

fn hoist_compare(
    dag: &mut Dag,
    p: NodeId,
    tj: NodeId,
    comp: Comparison,
    res: &Column,
    att1: &Column,
    att2: &Column,
) -> OptResult<bool> {
    let operands = [att1.clone(), att2.clone()];
    let (l, r) = (dag.child(tj, 0), dag.child(tj, 1));
    if has_all(dag, l, &operands) || has_all(dag, r, &operands) {
        return push_by_columns(dag, p, tj, &operands);
    }
    // operands from opposite inputs: fold into the predicate list
    let (comp, left, right) = if dag.has_col(l, att1) && dag.has_col(r, att2) {
        (comp, att1.clone(), att2.clone())
    } else if dag.has_col(l, att2) && dag.has_col(r, att1) {
        (comp.swap(), att2.clone(), att1.clone())
    } else {
        return Ok(false);
    };
    let (l, r, mut preds) = resolve_conflicts(dag, tj, std::slice::from_ref(res))?;
    preds.push(TjPred {
        comp,
        left,
        right,
        res: Some(res.clone()),
        persist: false,
        left_vis: true,
        right_vis: true,
        res_vis: true,
    });
    rebuild(dag, p, l, r, preds)
}

fn hoist_not(dag: &mut Dag, p: NodeId, tj: NodeId, res: &Column, att: &Column) -> OptResult<bool> {
    let operand = std::slice::from_ref(att);
    let (l, r) = (dag.child(tj, 0), dag.child(tj, 1));
    if has_all(dag, l, operand) || has_all(dag, r, operand) {
        return push_by_columns(dag, p, tj, operand);
    }
    // negation of a predicate result becomes the negated predicate
    let (l, r, mut preds) = resolve_conflicts(dag, tj, std::slice::from_ref(res))?;
    let Some(base) = preds.iter().find(|pr| pr.res_vis && pr.res.as_ref() == Some(att)).cloned() else {
        return Ok(false);
    };
    preds.push(TjPred {
        comp: base.comp.negate(),
        res: Some(res.clone()),
        persist: false,
        res_vis: true,
        ..base
    });
    rebuild(dag, p, l, r, preds)
}

fn hoist_select(dag: &mut Dag, p: NodeId, tj: NodeId, att: &Column) -> OptResult<bool> {
    let (l, r) = (dag.child(tj, 0), dag.child(tj, 1));
    if dag.has_col(l, att) {
        return push_into(dag, p, tj, true, false);
    }
    if dag.has_col(r, att) {
        return push_into(dag, p, tj, false, true);
    }
    // selection on a predicate result makes the predicate filter
    let mut preds = preds_of(dag, tj)?;
    let mut hit = false;
    for pred in preds.iter_mut().filter(|pr| pr.res_vis && pr.res.as_ref() == Some(att)) {
        pred.persist = true;
        hit = true;
    }
    if !hit {
        return Ok(false);
    }
    rebuild(dag, p, l, r, preds)
}

/// A selection over an equi-join filters the input that holds its column
fn select_below_eqjoin(dag: &mut Dag, p: NodeId, join: NodeId, att: &Column) -> OptResult<bool> {
    let Op::EqJoin { att1, att2 } = dag.op(join).clone() else {
        return Ok(false);
    };
    let (mut l, mut r) = (dag.child(join, 0), dag.child(join, 1));
    if dag.has_col(l, att) {
        l = dag.select(l, att.clone())?;
    } else if dag.has_col(r, att) {
        r = dag.select(r, att.clone())?;
    } else {
        return Ok(false);
    }
    let filtered = dag.eqjoin(l, r, att1, att2)?;
    dag.replace(p, filtered)?;
    Ok(true)
}

/// Split a projection over both inputs. Predicate results and inputs the
/// projection drops become invisible; hidden predicate inputs are carried
/// under fresh names.
fn hoist_project(dag: &mut Dag, p: NodeId, tj: NodeId, list: &[ProjPair]) -> OptResult<bool> {
    let (l, r) = (dag.child(tj, 0), dag.child(tj, 1));
    let target = |old: &Column| list.iter().find(|e| &e.old == old).map(|e| e.new.clone());
    let mut preds = Vec::new();
    for mut pred in preds_of(dag, tj)? {
        if pred.res_vis {
            let res = pred.res.clone();
            let refs = list.iter().filter(|e| Some(&e.old) == res.as_ref()).count();
            match res.as_ref().and_then(|c| target(c)) {
                // a computed column cannot be duplicated in place
                Some(_) if refs > 1 => return Ok(false),
                Some(new) => pred.res = Some(new),
                None => {
                    pred.res_vis = false;
                    pred.res = None;
                    if !pred.persist {
                        continue;
                    }
                }
            }
        }
        if pred.left_vis {
            match target(&pred.left) {
                Some(new) => pred.left = new,
                None => pred.left_vis = false,
            }
        }
        if pred.right_vis {
            match target(&pred.right) {
                Some(new) => pred.right = new,
                None => pred.right_vis = false,
            }
        }
        preds.push(pred);
    }

    let side_list = |input: NodeId| -> Vec<ProjPair> {
        let mut side = Vec::new();
        for name in dag.schema(input).names() {
            side.extend(list.iter().filter(|e| &e.old == name).cloned());
        }
        side
    };
    let mut lists = [side_list(l), side_list(r)];
    for (side, entries) in lists.iter_mut().enumerate() {
        for pred in &mut preds {
            let (col, visible) = if side == 0 {
                (&mut pred.left, pred.left_vis)
            } else {
                (&mut pred.right, pred.right_vis)
            };
            if visible {
                continue;
            }
            match entries.iter().find(|e| e.old == *col) {
                Some(e) => *col = e.new.clone(),
                None => {
                    let fresh = dag.fresh(col);
                    entries.push(proj(fresh.clone(), col.clone()));
                    *col = fresh;
                }
            }
        }
    }
    let [llist, rlist] = lists;
    if llist.is_empty() || rlist.is_empty() {
        return Ok(false);
    }
    let l = dag.project(l, llist)?;
    let r = dag.project(r, rlist)?;
    rebuild(dag, p, l, r, preds)
}

/// An equi-join over a theta-join moves into the input holding its join
/// column; the other input floats up.
fn hoist_eqjoin(dag: &mut Dag, p: NodeId, op: &Op, l: NodeId, r: NodeId) -> OptResult<bool> {
    let Op::EqJoin { att1, att2 } = op else {
        return Ok(false);
    };
    let (tj, other, att, tj_is_left) = if is_tj(dag, l) {
        (l, r, att1, true)
    } else if is_tj(dag, r) {
        (r, l, att2, false)
    } else {
        return Ok(false);
    };
    let taken: Vec<Column> = dag.schema(other).names().cloned().collect();
    let (tl, tr, preds) = resolve_conflicts(dag, tj, &taken)?;
    let into_left = dag.has_col(tl, att);
    let target = if into_left { tl } else { tr };
    let join = if tj_is_left {
        dag.eqjoin(target, other, att1.clone(), att2.clone())?
    } else {
        dag.eqjoin(other, target, att1.clone(), att2.clone())?
    };
    if into_left {
        rebuild(dag, p, join, tr, preds)
    } else {
        rebuild(dag, p, tl, join, preds)
    }
}

fn hoist_step_join(
    dag: &mut Dag,
    p: NodeId,
    op: &Op,
    frag: NodeId,
    tj: NodeId,
    item: &Column,
    res: &Column,
) -> OptResult<bool> {
    let left = dag.has_col(dag.child(tj, 0), item);
    let right = dag.has_col(dag.child(tj, 1), item);
    if !left && !right {
        return Ok(false);
    }
    let (mut l, mut r, preds) = resolve_conflicts(dag, tj, std::slice::from_ref(res))?;
    if left {
        l = dag.add(op.clone(), vec![frag, l])?;
    }
    if right {
        r = dag.add(op.clone(), vec![frag, r])?;
    }
    rebuild(dag, p, l, r, preds)
}

fn is_attach_pair(dag: &Dag, a: NodeId, b: NodeId) -> bool {
    matches!((dag.op(a), dag.op(b)), (Op::Attach { .. }, Op::Attach { .. })) && dag.child(a, 0) == dag.child(b, 0)
}

/// `union(attach(X, c = v1), attach(X, c = v2))` is `X` crossed with the
/// two-row literal table `c: [v1, v2]`
fn attach_union(dag: &mut Dag, p: NodeId, a: NodeId, b: NodeId) -> OptResult<bool> {
    let (Op::Attach { res, value: v1 }, Op::Attach { res: res2, value: v2 }) = (dag.op(a).clone(), dag.op(b).clone())
    else {
        return Ok(false);
    };
    if res != res2 || v1.ty() != v2.ty() {
        return Ok(false);
    }
    let input = dag.child(a, 0);
    let values = dag.lit_tbl(vec![SchemaItem::new(res, v1.ty())], vec![vec![v1], vec![v2]])?;
    rebuild(dag, p, input, values, Vec::new())
}

/// Set operators hoist over two identical theta-joins that share one input
fn hoist_set_op(dag: &mut Dag, p: NodeId, op: &Op, a: NodeId, b: NodeId) -> OptResult<bool> {
    if !is_tj(dag, a) || !is_tj(dag, b) {
        return Ok(false);
    }
    let preds = preds_of(dag, a)?;
    if preds != preds_of(dag, b)? {
        return Ok(false);
    }
    let union = matches!(op, Op::DisjUnion);
    if !union && !all_visible(&preds) {
        return Ok(false);
    }
    let (al, ar, bl, br) = (dag.child(a, 0), dag.child(a, 1), dag.child(b, 0), dag.child(b, 1));
    let shared_left = al == bl || (union && same_projection(dag, al, bl));
    let shared_right = ar == br || (union && same_projection(dag, ar, br));
    // intersect and difference return sets, so the shared input must not
    // carry duplicate rows
    let distinct_rows = |dag: &Dag, id: NodeId| {
        union || !Properties::infer(dag, id, &[PropKind::Key]).keys(dag, id).is_empty()
    };
    if shared_left && same_columns(dag, ar, br) && distinct_rows(dag, al) {
        let merged = dag.add(op.clone(), vec![ar, br])?;
        rebuild(dag, p, al, merged, preds)
    } else if shared_right && same_columns(dag, al, bl) && distinct_rows(dag, ar) {
        let merged = dag.add(op.clone(), vec![al, bl])?;
        rebuild(dag, p, merged, ar, preds)
    } else {
        Ok(false)
    }
}

fn same_projection(dag: &Dag, a: NodeId, b: NodeId) -> bool {
    match (dag.op(a), dag.op(b)) {
        (Op::Project { proj: x }, Op::Project { proj: y }) => x == y && dag.child(a, 0) == dag.child(b, 0),
        _ => false,
    }
}

fn same_columns(dag: &Dag, a: NodeId, b: NodeId) -> bool {
    let (x, y) = (dag.schema(a), dag.schema(b));
    x.len() == y.len() && x.names().all(|c| y.contains(c))
}
