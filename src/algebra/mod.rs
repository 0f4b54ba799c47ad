//! # Algebra
//!
//! Operator nodes, the arena DAG they live in, and the helpers every phase
//! uses to build and inspect plans.

mod build;
mod column;
mod dag;
mod op;
pub mod plan;
pub mod print;

pub use column::{
    proj, proj_identity, proj_source, AlgType, Atom, Column, Comparison, NameGenerator, ProjPair,
    Schema, SchemaItem, SortKey,
};
pub use dag::{Dag, Node, NodeId};
pub use op::{AggrKind, Axis, BoolOp, FunKind, JoinPred, Op, TjPred, TwigKind};
pub use plan::{Plan, PlanNode};
