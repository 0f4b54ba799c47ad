//! Exact cardinality, where it can be read off the plan.

use super::Properties;
use crate::algebra::{Dag, NodeId, Op};

pub(super) fn infer(dag: &Dag, order: &[NodeId], props: &mut Properties) {
    for &id in order {
        if let Some(card) = card_of(dag, id, props) {
            props.card.insert(id, card);
        }
    }
}

fn card_of(dag: &Dag, id: NodeId, props: &Properties) -> Option<u64> {
    let child = |i: usize| props.card.get(&dag.child(id, i)).copied();
    let either_empty = || (child(0) == Some(0) || child(1) == Some(0)).then_some(0);
    match dag.op(id) {
        Op::LitTbl { tuples, .. } => Some(tuples.len() as u64),
        Op::EmptyTbl { .. } => Some(0),
        Op::RefTbl { .. } => None,

        Op::Attach { .. }
        | Op::Project { .. }
        | Op::Fun { .. }
        | Op::Compare { .. }
        | Op::Bool { .. }
        | Op::Not { .. }
        | Op::RowNum { .. }
        | Op::RowRank { .. }
        | Op::Rank { .. }
        | Op::RowId { .. }
        | Op::TypeTest { .. }
        | Op::TypeAssert { .. }
        | Op::Cast { .. }
        | Op::DocTbl { .. }
        | Op::Roots
        | Op::Proxy { .. }
        | Op::ProxyBase
        | Op::CondErr { .. } => child(0),

        Op::Cross => child(0)?.checked_mul(child(1)?),
        Op::DisjUnion => child(0)?.checked_add(child(1)?),

        Op::EqJoin { .. }
        | Op::SemiJoin { .. }
        | Op::ThetaJoin { .. }
        | Op::Intersect
        | Op::InternalJoin { .. }
        | Op::ThetaJoinOpt { .. }
        | Op::Step { .. }
        | Op::StepJoin { .. } => either_empty(),

        Op::Select { .. } | Op::PosSelect { .. } | Op::Difference => (child(0) == Some(0)).then_some(0),

        Op::Distinct => child(0).filter(|&n| n <= 1),

        Op::Aggr { part: None, .. } => Some(1),
        Op::Aggr { part: Some(_), .. } => (child(0) == Some(0)).then_some(0),

        Op::Twig { .. } | Op::Serialize { .. } => None,
        Op::Fragment | Op::FragUnion | Op::EmptyFrag => None,
    }
}
