//! Duplicate-free outputs.

use super::Properties;
use crate::algebra::{Dag, NodeId, Op};

pub(super) fn infer(dag: &Dag, order: &[NodeId], props: &mut Properties) {
    for &id in order {
        let set = is_set(dag, id, props);
        props.set.insert(id, set);
    }
}

fn is_set(dag: &Dag, id: NodeId, props: &Properties) -> bool {
    if props.keys.get(&id).is_some_and(|k| !k.is_empty()) || props.ckeys.get(&id).is_some_and(|k| !k.is_empty()) {
        return true;
    }
    let child = |i: usize| props.set.get(&dag.child(id, i)).copied().unwrap_or(false);
    match dag.op(id) {
        Op::Distinct | Op::Aggr { .. } | Op::Step { .. } | Op::EmptyTbl { .. } | Op::RowId { .. } => true,
        Op::Attach { .. }
        | Op::Fun { .. }
        | Op::Compare { .. }
        | Op::Bool { .. }
        | Op::Not { .. }
        | Op::RowNum { .. }
        | Op::RowRank { .. }
        | Op::Rank { .. }
        | Op::TypeTest { .. }
        | Op::TypeAssert { .. }
        | Op::Cast { .. }
        | Op::DocTbl { .. }
        | Op::Select { .. }
        | Op::PosSelect { .. }
        | Op::SemiJoin { .. }
        | Op::Difference
        | Op::Intersect
        | Op::CondErr { .. }
        | Op::Proxy { .. }
        | Op::ProxyBase => child(0),
        Op::Cross | Op::EqJoin { .. } | Op::ThetaJoin { .. } | Op::InternalJoin { .. } => child(0) && child(1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::super::PropKind;
    use super::*;
    use crate::algebra::{proj, AlgType, SchemaItem};

    #[test]
    fn test_distinct_output_is_set_and_projection_may_lose_it() {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl(
                "t",
                vec![SchemaItem::new("a", AlgType::Int), SchemaItem::new("b", AlgType::Int)],
                vec![],
            )
            .unwrap();
        let d = dag.distinct(t).unwrap();
        let s = dag.select(d, "a").unwrap();
        let p = dag.project(s, vec![proj("a", "a")]).unwrap();
        let props = Properties::infer(&dag, p, &[PropKind::Set]);
        assert!(!props.is_set(&dag, t));
        assert!(props.is_set(&dag, d));
        assert!(props.is_set(&dag, s));
        assert!(!props.is_set(&dag, p));
    }
}
