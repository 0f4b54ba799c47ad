//! Optimizer Error Types
//!
//! Every variant is an invariant violation: the optimizer aborts instead of
//! emitting a plan it cannot vouch for. Pattern non-matches are not errors,
//! rewrites report them by returning `Ok(false)`.

use crate::algebra::{Column, NodeId};

/// Fatal optimizer errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptimizerError {
    /// Two branches below a proxy entry reported different exit candidates
    #[error("cannot cope with multiple different exit nodes below {entry} ({first} vs {second})")]
    MultipleExits {
        entry: NodeId,
        first: NodeId,
        second: NodeId,
    },

    /// A column an operator reads is not produced by its input
    #[error("column '{column}' not found in {context}")]
    MissingColumn { column: Column, context: String },

    /// An operator would produce the same column twice
    #[error("duplicate column '{column}' in {context}")]
    DuplicateColumn { column: Column, context: String },

    /// A rewrite reached an operator it was not built for
    #[error("unexpected operator '{found}' at {node}, expected {expected}")]
    UnexpectedOperator {
        node: NodeId,
        expected: &'static str,
        found: &'static str,
    },

    /// A projection maps one new name to more than one old name
    #[error("ambiguous projection: '{0}' is bound more than once")]
    AmbiguousProjection(Column),

    /// Join pushdown met a proxy that should have been dissolved first
    #[error("cannot cope with proxy node {0} during join pushdown")]
    ProxyInPushdown(NodeId),

    /// Wrong number of children for an operator
    #[error("operator '{op}' expects {expected} children, got {found}")]
    Arity {
        op: &'static str,
        expected: usize,
        found: usize,
    },

    /// A handle that does not address a slot of the DAG
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A relink target was not a child of the given parent
    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },

    /// Malformed serialized plan
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Unknown phase identifier in the phase sequence
    #[error("unknown optimizer phase '{0}'")]
    UnknownPhase(char),
}

/// Result type for optimizer operations
pub type OptResult<T> = Result<T, OptimizerError>;
