//! # Theta-Join Hoisting
//!
//! Moves cross products and theta-joins as far up the plan as possible,
//! collecting comparisons into the join predicate on the way. Operators
//! that only depend on one join input end up below the join, which turns
//! multivalued dependencies hidden in a plan into explicit join inputs.
//!
//! During the phase every join is an [`Op::ThetaJoinOpt`]. Its predicates
//! may be partial (computed but not yet filtering), and it may hide input
//! columns or carry the same column on both sides.
//!
//! ```text
//! attach / fun / bool / type / cast / not    into every input that has the operands
//! compare                                    one input, or a new predicate across inputs
//! select                                     one input, or makes a predicate filter
//! select over a plain eqjoin                 into the input holding its column
//! project                                    split over both inputs
//! distinct                                   both inputs, nothing hidden
//! rownum / pos_select (partitioned)          partition on one side, sort on the other
//! rank / rowrank                             sort columns on one side only
//! eqjoin / semijoin / step_join / cond_err   into the input holding the join column
//! union / intersect / difference             two identical joins sharing an input
//! union of two attaches over one input       cross with a two-row literal table
//! ```

mod cleanup;
mod hoist;

use crate::algebra::{Dag, NodeId};
use crate::config::OptimizerConfig;
use crate::error::OptResult;
use crate::traversal::walk_bottom_up;

/// Hoist theta-joins below `root`. Returns the number of rewrites.
pub fn optimize_thetajoin(dag: &mut Dag, root: NodeId, config: &OptimizerConfig) -> OptResult<usize> {
    let lowered = cleanup::introduce_internal_thetajoins(dag, root)?;
    let mut total = 0;
    for round in 0..config.max_iterations {
        let mut rewrites = 0;
        walk_bottom_up(dag, root, |dag, id| {
            let hoisted = hoist::hoist(dag, id)?;
            rewrites += usize::from(hoisted);
            Ok(hoisted)
        })?;
        tracing::trace!(round, rewrites, "thetajoin_round");
        total += rewrites;
        if rewrites == 0 {
            break;
        }
    }
    let dissolved = cleanup::dissolve_internal_thetajoins(dag, root)?;
    tracing::debug!(lowered, rewrites = total, dissolved, "thetajoin_done");
    Ok(total)
}
