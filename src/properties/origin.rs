//! Column origins.
//!
//! Each column value that is computed somewhere in the plan gets one origin
//! identifier. Renaming and pass-through keep it, so two columns of a node
//! with the same origin carry the same values. Join columns keep their own
//! origins.

use super::Properties;
use crate::algebra::{Column, Dag, NodeId, Op};
use std::collections::HashMap;

/// Identity of a computed column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OriginId(u32);

type Origins = HashMap<Column, OriginId>;

struct Counter(u32);

impl Counter {
    fn next(&mut self) -> OriginId {
        self.0 += 1;
        OriginId(self.0)
    }
}

pub(super) fn infer(dag: &Dag, order: &[NodeId], props: &mut Properties) {
    let mut counter = Counter(0);
    for &id in order {
        let origins = origins_of(dag, id, props, &mut counter);
        props.origins.insert(id, origins);
    }
}

fn origins_of(dag: &Dag, id: NodeId, props: &Properties, counter: &mut Counter) -> Origins {
    let empty = Origins::new();
    let child = |i: usize| props.origins.get(&dag.child(id, i)).unwrap_or(&empty);
    let schema = dag.schema(id);
    let mut origins = Origins::new();

    // carry over what the output still shows, then give every column
    // without an origin a fresh one
    let inherit = |from: &Origins, origins: &mut Origins| {
        for (c, o) in from {
            if schema.contains(c) && !origins.contains_key(c) {
                origins.insert(c.clone(), *o);
            }
        }
    };

    match dag.op(id) {
        Op::Project { proj } => {
            for p in proj {
                if let Some(&o) = child(0).get(&p.old) {
                    origins.insert(p.new.clone(), o);
                }
            }
        }
        Op::InternalJoin { lproj, rproj } => {
            for p in lproj {
                if let Some(&o) = child(0).get(&p.old) {
                    origins.insert(p.new.clone(), o);
                }
            }
            for p in &rproj[1..] {
                if let Some(&o) = child(1).get(&p.old) {
                    origins.insert(p.new.clone(), o);
                }
            }
        }
        Op::Cross | Op::EqJoin { .. } | Op::ThetaJoin { .. } | Op::ThetaJoinOpt { .. } => {
            inherit(child(0), &mut origins);
            inherit(child(1), &mut origins);
        }
        Op::DisjUnion => {
            for (c, o) in child(0) {
                if child(1).get(c) == Some(o) {
                    origins.insert(c.clone(), *o);
                }
            }
        }
        Op::Step { iter, .. } | Op::Twig { iter, .. } => {
            let input = if matches!(dag.op(id), Op::Step { .. }) { 1 } else { 0 };
            if let Some(&o) = child(input).get(iter) {
                origins.insert(iter.clone(), o);
            }
        }
        Op::StepJoin { .. } | Op::Serialize { .. } => inherit(child(1), &mut origins),
        Op::LitTbl { .. } | Op::EmptyTbl { .. } | Op::RefTbl { .. } => {}
        Op::Fragment | Op::FragUnion | Op::EmptyFrag => {}
        // unary operators and the left-biased binary ones
        _ => {
            if let Some(res) = dag.op(id).res() {
                origins.insert(res.clone(), counter.next());
            }
            inherit(child(0), &mut origins);
        }
    }

    for col in schema.names() {
        if !origins.contains_key(col) {
            origins.insert(col.clone(), counter.next());
        }
    }
    origins
}
