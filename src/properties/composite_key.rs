//! Composite keys: column sets whose combined values are unique.

use super::Properties;
use crate::algebra::{Column, Dag, NodeId, Op};
use std::collections::BTreeSet;

type CKey = BTreeSet<Column>;

pub(super) fn infer(dag: &Dag, order: &[NodeId], props: &mut Properties) {
    for &id in order {
        let ckeys = minimize(ckeys_of(dag, id, props));
        if !ckeys.is_empty() {
            props.ckeys.insert(id, ckeys);
        }
    }
}

/// Drop duplicates and supersets of other keys
fn minimize(mut ckeys: Vec<CKey>) -> Vec<CKey> {
    ckeys.retain(|k| !k.is_empty());
    ckeys.sort_by_key(|k| k.len());
    let mut out: Vec<CKey> = Vec::new();
    for k in ckeys {
        if !out.iter().any(|o| o.is_subset(&k)) {
            out.push(k);
        }
    }
    out
}

/// Pairwise unions of the keys of two join inputs
fn combine(left: &[CKey], right: &[CKey]) -> Vec<CKey> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            out.push(l.union(r).cloned().collect());
        }
    }
    out
}

fn ckeys_of(dag: &Dag, id: NodeId, props: &Properties) -> Vec<CKey> {
    let empty: Vec<CKey> = Vec::new();
    let child = |i: usize| props.ckeys.get(&dag.child(id, i)).unwrap_or(&empty);
    let single = |col: &Column| -> CKey { [col.clone()].into() };
    let is_const = |n: NodeId, col: &Column| props.consts.get(&n).is_some_and(|cs| cs.iter().any(|(c, _)| c == col));
    let single_row = props.card.get(&id) == Some(&1);

    // single-column keys are composite keys as well
    let mut ckeys: Vec<CKey> = props
        .keys
        .get(&id)
        .map(|ks| ks.iter().map(single).collect())
        .unwrap_or_default();

    match dag.op(id) {
        Op::LitTbl { cols, tuples } => {
            let distinct = tuples
                .iter()
                .enumerate()
                .all(|(i, t)| tuples[i + 1..].iter().all(|u| u != t));
            if distinct {
                ckeys.push(cols.iter().map(|c| c.name.clone()).collect());
            }
        }
        Op::EmptyTbl { .. } => {}
        Op::RefTbl { keys, .. } => ckeys.extend(keys.iter().map(|k| k.iter().cloned().collect())),

        Op::Attach { res, .. }
        | Op::Fun { res, .. }
        | Op::Compare { res, .. }
        | Op::Bool { res, .. }
        | Op::Not { res, .. }
        | Op::RowRank { res, .. }
        | Op::Rank { res, .. }
        | Op::TypeTest { res, .. }
        | Op::Cast { res, .. }
        | Op::DocTbl { res, .. } => {
            ckeys.extend(child(0).iter().cloned());
            if single_row {
                ckeys.push(single(res));
            }
        }
        Op::RowNum { res, part, .. } => {
            ckeys.extend(child(0).iter().cloned());
            match part {
                Some(part) => ckeys.push([part.clone(), res.clone()].into()),
                None => ckeys.push(single(res)),
            }
        }
        Op::RowId { res } => {
            ckeys.extend(child(0).iter().cloned());
            ckeys.push(single(res));
        }

        Op::Project { proj } => {
            // a key survives when each of its columns is still visible
            for k in child(0) {
                let mapped: Option<CKey> = k
                    .iter()
                    .map(|c| proj.iter().find(|p| &p.old == c).map(|p| p.new.clone()))
                    .collect();
                if let Some(mapped) = mapped {
                    ckeys.push(mapped);
                }
            }
        }

        Op::Select { .. }
        | Op::PosSelect { .. }
        | Op::Difference
        | Op::SemiJoin { .. }
        | Op::TypeAssert { .. }
        | Op::CondErr { .. }
        | Op::Roots
        | Op::Proxy { .. }
        | Op::ProxyBase => ckeys.extend(child(0).iter().cloned()),
        Op::Intersect => {
            ckeys.extend(child(0).iter().cloned());
            ckeys.extend(child(1).iter().cloned());
        }
        Op::Distinct => {
            ckeys.extend(child(0).iter().cloned());
            ckeys.push(dag.schema(id).names().cloned().collect());
        }
        Op::DisjUnion => {}

        Op::Cross | Op::ThetaJoin { .. } => ckeys.extend(combine(child(0), child(1))),
        Op::EqJoin { att1, att2 } => {
            ckeys.extend(combine(child(0), child(1)));
            let (l, r) = (dag.child(id, 0), dag.child(id, 1));
            if props.keys.get(&l).is_some_and(|k| k.contains(att1)) {
                ckeys.extend(child(1).iter().cloned());
            }
            if props.keys.get(&r).is_some_and(|k| k.contains(att2)) {
                ckeys.extend(child(0).iter().cloned());
            }
        }
        Op::InternalJoin { lproj, rproj } => {
            let map = |list: &[crate::algebra::ProjPair], k: &CKey| -> Option<CKey> {
                k.iter()
                    .map(|c| list.iter().find(|p| &p.old == c).map(|p| p.new.clone()))
                    .collect()
            };
            let left: Vec<CKey> = child(0).iter().filter_map(|k| map(lproj, k)).collect();
            let right: Vec<CKey> = child(1).iter().filter_map(|k| map(rproj, k)).collect();
            ckeys.extend(combine(&left, &right));
        }
        Op::ThetaJoinOpt { .. } => {
            let schema = dag.schema(id);
            let visible = |k: &&CKey| k.iter().all(|c| schema.contains(c));
            let left: Vec<CKey> = child(0).iter().filter(visible).cloned().collect();
            let right: Vec<CKey> = child(1).iter().filter(visible).cloned().collect();
            ckeys.extend(combine(&left, &right));
        }

        Op::Aggr { res, part, .. } => match part {
            Some(part) => ckeys.push(single(part)),
            None => ckeys.push(single(res)),
        },

        Op::Step { iter, item, .. } => {
            if is_const(dag.child(id, 1), iter) {
                ckeys.push(single(item));
            } else {
                ckeys.push([iter.clone(), item.clone()].into());
            }
        }
        Op::StepJoin { res, .. } => {
            for k in child(1) {
                let mut k = k.clone();
                k.insert(res.clone());
                ckeys.push(k);
            }
        }
        Op::Twig { item, .. } => ckeys.push(single(item)),
        Op::Serialize { .. } | Op::Fragment | Op::FragUnion | Op::EmptyFrag => {}
    }
    ckeys
}
