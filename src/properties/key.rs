//! Single-column keys.

use super::Properties;
use crate::algebra::{Column, Dag, NodeId, Op, TwigKind};
use std::collections::BTreeSet;

type Keys = BTreeSet<Column>;

pub(super) fn infer(dag: &Dag, order: &[NodeId], props: &mut Properties) {
    for &id in order {
        let keys = keys_of(dag, id, props);
        if !keys.is_empty() {
            props.keys.insert(id, keys);
        }
    }
}

fn keys_of(dag: &Dag, id: NodeId, props: &Properties) -> Keys {
    let empty = Keys::new();
    let child = |i: usize| props.keys.get(&dag.child(id, i)).unwrap_or(&empty);
    let card = |n: NodeId| props.card.get(&n).copied();
    let single_row = card(id) == Some(1);
    let is_const = |n: NodeId, col: &Column| props.consts.get(&n).is_some_and(|cs| cs.iter().any(|(c, _)| c == col));

    match dag.op(id) {
        Op::LitTbl { cols, tuples } => {
            if tuples.len() == 1 {
                return cols.iter().map(|c| c.name.clone()).collect();
            }
            cols.iter()
                .enumerate()
                .filter(|(i, _)| {
                    tuples
                        .iter()
                        .enumerate()
                        .all(|(a, ta)| tuples[a + 1..].iter().all(|tb| tb[*i] != ta[*i]))
                })
                .map(|(_, c)| c.name.clone())
                .collect()
        }
        Op::EmptyTbl { .. } => Keys::new(),
        Op::RefTbl { keys, .. } => keys
            .iter()
            .filter(|k| k.len() == 1)
            .map(|k| k[0].clone())
            .collect(),

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
            let mut keys = child(0).clone();
            if single_row {
                keys.insert(res.clone());
            }
            keys
        }
        Op::RowNum { res, part, .. } => {
            let mut keys = child(0).clone();
            if part.is_none() || single_row {
                keys.insert(res.clone());
            }
            keys
        }
        Op::RowId { res } => {
            let mut keys = child(0).clone();
            keys.insert(res.clone());
            keys
        }

        Op::Cross | Op::ThetaJoin { .. } => {
            let (l, r) = (dag.child(id, 0), dag.child(id, 1));
            let mut keys = Keys::new();
            if card(r) == Some(1) {
                keys.extend(child(0).iter().cloned());
            }
            if card(l) == Some(1) {
                keys.extend(child(1).iter().cloned());
            }
            keys
        }
        Op::EqJoin { att1, att2 } => join_keys(child(0), child(1), att1, att2),
        Op::InternalJoin { lproj, rproj } => {
            let (Some(lf), Some(rf)) = (lproj.first(), rproj.first()) else {
                return Keys::new();
            };
            let lmap = |c: &Column| lproj.iter().find(|p| &p.old == c).map(|p| p.new.clone());
            let rmap = |c: &Column| rproj.iter().find(|p| &p.old == c).map(|p| p.new.clone());
            let lk: Keys = child(0).iter().filter_map(lmap).collect();
            let rk: Keys = child(1).iter().filter_map(rmap).collect();
            let mut keys = Keys::new();
            let l_unique = child(0).contains(&lf.old);
            let r_unique = child(1).contains(&rf.old);
            if l_unique {
                keys.extend(rk.iter().cloned());
            }
            if r_unique {
                keys.extend(lk.iter().cloned());
            }
            keys
        }
        Op::ThetaJoinOpt { .. } => {
            let (l, r) = (dag.child(id, 0), dag.child(id, 1));
            let schema = dag.schema(id);
            let mut keys = Keys::new();
            if card(r) == Some(1) {
                keys.extend(child(0).iter().filter(|c| schema.contains(c)).cloned());
            }
            if card(l) == Some(1) {
                keys.extend(child(1).iter().filter(|c| schema.contains(c)).cloned());
            }
            keys
        }

        Op::Project { proj } => proj
            .iter()
            .filter(|p| child(0).contains(&p.old))
            .map(|p| p.new.clone())
            .collect(),

        Op::SemiJoin { .. }
        | Op::Select { .. }
        | Op::PosSelect { .. }
        | Op::Difference
        | Op::TypeAssert { .. }
        | Op::CondErr { .. }
        | Op::Roots
        | Op::Proxy { .. }
        | Op::ProxyBase => child(0).clone(),
        Op::Intersect => child(0).union(child(1)).cloned().collect(),
        Op::Distinct => {
            let mut keys = child(0).clone();
            let schema = dag.schema(id);
            if schema.len() == 1 {
                keys.extend(schema.names().cloned());
            }
            keys
        }
        Op::DisjUnion => Keys::new(),

        Op::Aggr { res, part, .. } => match part {
            Some(part) => [part.clone()].into(),
            None => [res.clone()].into(),
        },

        // the staircase join emits each node at most once per iteration
        Op::Step { iter, item, .. } => {
            if is_const(dag.child(id, 1), iter) {
                [item.clone()].into()
            } else {
                Keys::new()
            }
        }
        Op::StepJoin { .. } => Keys::new(),
        Op::Twig { kind, iter, item } => {
            let mut keys: Keys = [item.clone()].into();
            if matches!(kind, TwigKind::Element | TwigKind::Document) {
                keys.insert(iter.clone());
            }
            keys
        }
        Op::Serialize { .. } | Op::Fragment | Op::FragUnion | Op::EmptyFrag => Keys::new(),
    }
}

/// Keys of an equi-join: a key join column on one side keeps the keys of
/// the other side (each of its rows finds at most one partner)
fn join_keys(left: &Keys, right: &Keys, att1: &Column, att2: &Column) -> Keys {
    let mut keys = Keys::new();
    if left.contains(att1) {
        keys.extend(right.iter().cloned());
    }
    if right.contains(att2) {
        keys.extend(left.iter().cloned());
    }
    keys
}
