//! Required columns, propagated top-down.
//!
//! The root requires its whole schema. Every node passes to each child the
//! columns it reads from that child in order to produce what its parents
//! require; a child shared by several parents requires the union.

use super::Properties;
use crate::algebra::{Atom, Column, Dag, NodeId, Op};
use crate::traversal::reverse_post_order;
use std::collections::{BTreeSet, HashMap};

type Cols = BTreeSet<Column>;
type Consts = HashMap<NodeId, Vec<(Column, Atom)>>;

pub(super) fn infer(dag: &Dag, root: NodeId, props: &mut Properties) {
    let seed: Cols = dag.schema(root).names().cloned().collect();
    props.icols = propagate(dag, root, seed, Some(&props.consts));
}

/// Columns required below `entry` when its parents need exactly `seed`
pub fn required_from(dag: &Dag, entry: NodeId, seed: Cols) -> HashMap<NodeId, Cols> {
    propagate(dag, entry, seed, None)
}

fn propagate(dag: &Dag, start: NodeId, seed: Cols, consts: Option<&Consts>) -> HashMap<NodeId, Cols> {
    let mut icols: HashMap<NodeId, Cols> = HashMap::new();
    icols.insert(start, seed);
    for id in reverse_post_order(dag, start) {
        let own = icols.get(&id).cloned().unwrap_or_default();
        let needs = child_needs(dag, id, &own, consts);
        for (&c, need) in dag.children(id).iter().zip(needs) {
            icols.entry(c).or_default().extend(need);
        }
    }
    icols
}

fn names(dag: &Dag, id: NodeId) -> Cols {
    dag.schema(id).names().cloned().collect()
}

/// Keep one column alive so a set operation still sees every row
fn keep_one(dag: &Dag, id: NodeId, consts: Option<&Consts>) -> Option<Column> {
    let schema = dag.schema(id);
    let constant = consts
        .and_then(|cs| cs.get(&id))
        .and_then(|cs| cs.iter().find(|(c, _)| schema.contains(c)).map(|(c, _)| c.clone()));
    constant.or_else(|| schema.names().next().cloned())
}

fn child_needs(dag: &Dag, id: NodeId, icols: &Cols, consts: Option<&Consts>) -> Vec<Cols> {
    let op = dag.op(id);
    let children = dag.children(id);
    let within = |n: NodeId, cols: &Cols| -> Cols {
        let schema = dag.schema(n);
        cols.iter().filter(|c| schema.contains(c)).cloned().collect()
    };

    match op {
        Op::Project { proj } => vec![proj
            .iter()
            .filter(|p| icols.contains(&p.new))
            .map(|p| p.old.clone())
            .collect()],

        Op::Select { att } | Op::TypeAssert { att, .. } => {
            let mut need = icols.clone();
            need.insert(att.clone());
            vec![need]
        }
        Op::PosSelect { .. } => {
            let mut need = icols.clone();
            need.extend(op.used_columns());
            vec![need]
        }

        Op::Attach { res, .. } | Op::RowId { res } => {
            let mut need = icols.clone();
            need.remove(res);
            vec![need]
        }
        Op::Fun { res, .. }
        | Op::Compare { res, .. }
        | Op::Bool { res, .. }
        | Op::Not { res, .. }
        | Op::RowNum { res, .. }
        | Op::RowRank { res, .. }
        | Op::Rank { res, .. }
        | Op::TypeTest { res, .. }
        | Op::Cast { res, .. } => {
            let mut need = icols.clone();
            if need.remove(res) {
                need.extend(op.used_columns());
            }
            vec![need]
        }

        // document access is never pruned, so its operand stays required
        Op::DocTbl { res, .. } => {
            let mut need = icols.clone();
            need.remove(res);
            need.extend(op.used_columns());
            vec![need]
        }

        Op::Distinct | Op::Intersect | Op::Difference => children.iter().map(|&c| names(dag, c)).collect(),

        Op::DisjUnion => {
            let mut need = icols.clone();
            if need.is_empty() {
                need.extend(keep_one(dag, id, consts));
            }
            vec![need.clone(), need]
        }

        Op::Cross => children.iter().map(|&c| within(c, icols)).collect(),
        Op::EqJoin { att1, att2 } | Op::SemiJoin { att1, att2 } => {
            let mut l = within(children[0], icols);
            l.insert(att1.clone());
            let mut r = if matches!(op, Op::SemiJoin { .. }) {
                Cols::new()
            } else {
                within(children[1], icols)
            };
            r.insert(att2.clone());
            vec![l, r]
        }
        Op::ThetaJoin { preds } => {
            let mut l = within(children[0], icols);
            let mut r = within(children[1], icols);
            for p in preds {
                l.insert(p.left.clone());
                r.insert(p.right.clone());
            }
            vec![l, r]
        }
        Op::InternalJoin { lproj, rproj } => {
            let mut l = Cols::new();
            let mut r = Cols::new();
            for (i, p) in lproj.iter().enumerate() {
                if i == 0 || icols.contains(&p.new) {
                    l.insert(p.old.clone());
                }
            }
            for (i, p) in rproj.iter().enumerate() {
                if i == 0 || icols.contains(&p.new) {
                    r.insert(p.old.clone());
                }
            }
            vec![l, r]
        }
        Op::ThetaJoinOpt { preds } => {
            let mut l = within(children[0], icols);
            let mut r = within(children[1], icols);
            for p in preds {
                l.insert(p.left.clone());
                r.insert(p.right.clone());
            }
            vec![l, r]
        }

        Op::Aggr { .. } => vec![op.used_columns().into_iter().collect()],

        Op::Step { iter, item, .. } => vec![Cols::new(), [iter.clone(), item.clone()].into()],
        Op::StepJoin { item, res, .. } => {
            let mut need = icols.clone();
            need.remove(res);
            need.insert(item.clone());
            vec![Cols::new(), need]
        }
        Op::Twig { iter, item, .. } => vec![[iter.clone(), item.clone()].into()],
        Op::Roots | Op::Fragment => vec![names(dag, children[0])],
        Op::FragUnion => vec![Cols::new(), Cols::new()],
        Op::CondErr { att, .. } => vec![icols.clone(), [att.clone()].into()],
        Op::Serialize { pos, item } => vec![Cols::new(), [pos.clone(), item.clone()].into()],
        Op::Proxy { .. } | Op::ProxyBase => vec![icols.clone()],

        Op::LitTbl { .. } | Op::EmptyTbl { .. } | Op::RefTbl { .. } | Op::EmptyFrag => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::PropKind;
    use super::*;
    use crate::algebra::{proj, AlgType, Comparison, SchemaItem};

    fn cols(names: &[&str]) -> Cols {
        names.iter().map(|c| Column::new(c)).collect()
    }

    #[test]
    fn test_unused_result_does_not_require_arguments() {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl(
                "t",
                vec![
                    SchemaItem::new("a", AlgType::Int),
                    SchemaItem::new("b", AlgType::Int),
                    SchemaItem::new("c", AlgType::Int),
                ],
                vec![],
            )
            .unwrap();
        let cmp = dag.compare(t, Comparison::Gt, "r", "a", "b").unwrap();
        let p = dag.project(cmp, vec![proj("x", "c")]).unwrap();
        let props = Properties::infer(&dag, p, &[PropKind::Icols]);
        assert_eq!(props.icols(&dag, cmp), cols(&["c"]));
        assert_eq!(props.icols(&dag, t), cols(&["c"]));
    }

    #[test]
    fn test_shared_node_requires_union() {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl(
                "t",
                vec![SchemaItem::new("a", AlgType::Int), SchemaItem::new("b", AlgType::Int)],
                vec![],
            )
            .unwrap();
        let l = dag.project(t, vec![proj("x", "a")]).unwrap();
        let r = dag.project(t, vec![proj("y", "b")]).unwrap();
        let x = dag.cross(l, r).unwrap();
        let props = Properties::infer(&dag, x, &[PropKind::Icols]);
        assert_eq!(props.icols(&dag, t), cols(&["a", "b"]));
    }

    #[test]
    fn test_required_from_seed() {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl(
                "t",
                vec![SchemaItem::new("a", AlgType::Int), SchemaItem::new("b", AlgType::Int)],
                vec![],
            )
            .unwrap();
        let s = dag.select(t, "a").unwrap();
        let req = required_from(&dag, s, cols(&["b"]));
        assert_eq!(req[&t], cols(&["a", "b"]));
    }
}
