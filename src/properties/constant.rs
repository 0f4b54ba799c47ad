//! Constant columns.

use super::Properties;
use crate::algebra::{Atom, Column, Dag, NodeId, Op};

type Consts = Vec<(Column, Atom)>;

pub(super) fn infer(dag: &Dag, order: &[NodeId], props: &mut Properties) {
    for &id in order {
        let consts = consts_of(dag, id, props);
        if !consts.is_empty() {
            props.consts.insert(id, consts);
        }
    }
}

fn lookup<'a>(consts: &'a Consts, col: &Column) -> Option<&'a Atom> {
    consts.iter().find(|(c, _)| c == col).map(|(_, v)| v)
}

fn push(consts: &mut Consts, col: &Column, value: Atom) {
    if lookup(consts, col).is_none() {
        consts.push((col.clone(), value));
    }
}

fn consts_of(dag: &Dag, id: NodeId, props: &Properties) -> Consts {
    let empty = Consts::new();
    let child = |i: usize| props.consts.get(&dag.child(id, i)).unwrap_or(&empty);
    let schema = dag.schema(id);
    let keep_schema = |cs: &Consts| -> Consts {
        cs.iter().filter(|(c, _)| schema.contains(c)).cloned().collect()
    };

    match dag.op(id) {
        Op::LitTbl { cols, tuples } => {
            let Some(first) = tuples.first() else {
                return Consts::new();
            };
            cols.iter()
                .enumerate()
                .filter(|(i, _)| tuples.iter().all(|t| t[*i] == first[*i]))
                .map(|(i, item)| (item.name.clone(), first[i].clone()))
                .collect()
        }
        Op::EmptyTbl { .. } | Op::RefTbl { .. } => Consts::new(),
        Op::Attach { res, value } => {
            let mut cs = child(0).clone();
            push(&mut cs, res, value.clone());
            cs
        }
        Op::Project { proj } => proj
            .iter()
            .filter_map(|p| lookup(child(0), &p.old).map(|v| (p.new.clone(), v.clone())))
            .collect(),
        Op::Select { att } => {
            let mut cs = child(0).clone();
            push(&mut cs, att, Atom::Bln(true));
            cs
        }
        Op::Cross | Op::ThetaJoin { .. } | Op::Intersect => {
            let mut cs = child(0).clone();
            for (c, v) in child(1) {
                push(&mut cs, c, v.clone());
            }
            cs
        }
        Op::EqJoin { att1, att2 } => {
            let mut cs = child(0).clone();
            for (c, v) in child(1) {
                push(&mut cs, c, v.clone());
            }
            if let Some(v) = lookup(&cs, att1).cloned() {
                push(&mut cs, att2, v);
            } else if let Some(v) = lookup(&cs, att2).cloned() {
                push(&mut cs, att1, v);
            }
            cs
        }
        Op::SemiJoin { att1, att2 } => {
            let mut cs = child(0).clone();
            if let Some(v) = lookup(child(1), att2) {
                push(&mut cs, att1, v.clone());
            }
            cs
        }
        Op::DisjUnion => child(0)
            .iter()
            .filter(|(c, v)| lookup(child(1), c) == Some(v))
            .cloned()
            .collect(),
        Op::Aggr { part, .. } => match part {
            Some(part) => lookup(child(0), part)
                .map(|v| vec![(part.clone(), v.clone())])
                .unwrap_or_default(),
            None => Consts::new(),
        },
        Op::Step { iter, .. } => lookup(child(1), iter)
            .map(|v| vec![(iter.clone(), v.clone())])
            .unwrap_or_default(),
        Op::StepJoin { .. } => child(1).clone(),
        Op::Twig { iter, .. } => lookup(child(0), iter)
            .map(|v| vec![(iter.clone(), v.clone())])
            .unwrap_or_default(),
        Op::Serialize { .. } => keep_schema(child(1)),
        Op::InternalJoin { lproj, rproj } => {
            let mut cs = Consts::new();
            for p in lproj {
                if let Some(v) = lookup(child(0), &p.old) {
                    push(&mut cs, &p.new, v.clone());
                }
            }
            for p in rproj {
                if let Some(v) = lookup(child(1), &p.old) {
                    push(&mut cs, &p.new, v.clone());
                }
            }
            cs
        }
        Op::ThetaJoinOpt { .. } => {
            let mut cs = keep_schema(child(0));
            for (c, v) in keep_schema(child(1)) {
                push(&mut cs, &c, v);
            }
            cs
        }
        Op::TypeAssert { .. } => child(0).clone(),
        Op::Fragment | Op::FragUnion | Op::EmptyFrag => Consts::new(),
        // everything else passes its (first) input through and possibly
        // adds a computed column
        _ => keep_schema(child(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::PropKind;
    use super::*;
    use crate::algebra::{proj, AlgType, SchemaItem};

    #[test]
    fn test_literal_and_attach_constants() {
        let mut dag = Dag::new();
        let lit = dag
            .lit_tbl(
                vec![SchemaItem::new("a", AlgType::Int), SchemaItem::new("b", AlgType::Int)],
                vec![vec![Atom::Int(1), Atom::Int(5)], vec![Atom::Int(1), Atom::Int(6)]],
            )
            .unwrap();
        let att = dag.attach(lit, "c", Atom::Str("x".into())).unwrap();
        let p = dag.project(att, vec![proj("x", "a"), proj("y", "b"), proj("z", "c")]).unwrap();
        let props = Properties::infer(&dag, p, &[PropKind::Const]);
        assert_eq!(props.constant(&dag, p, &Column::new("x")), Some(&Atom::Int(1)));
        assert_eq!(props.constant(&dag, p, &Column::new("y")), None);
        assert_eq!(props.constant(&dag, p, &Column::new("z")), Some(&Atom::Str("x".into())));
    }

    #[test]
    fn test_union_keeps_agreeing_constants() {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl("t", vec![SchemaItem::new("a", AlgType::Int)], vec![])
            .unwrap();
        let l = dag.attach(t, "k", Atom::Int(1)).unwrap();
        let r = dag.attach(t, "k", Atom::Int(2)).unwrap();
        let same = dag.attach(t, "k", Atom::Int(1)).unwrap();
        let differ = dag.union(l, r).unwrap();
        let agree = dag.union(l, same).unwrap();
        let renamed = dag.project(agree, vec![proj("k2", "k")]).unwrap();
        let root = dag.cross(differ, renamed).unwrap();
        let props = Properties::infer(&dag, root, &[PropKind::Const]);
        assert_eq!(props.constant(&dag, differ, &Column::new("k")), None);
        assert_eq!(props.constant(&dag, agree, &Column::new("k")), Some(&Atom::Int(1)));
    }
}
