//! Shared search protocol of all proxy kinds.
//!
//! 1. infer the properties the rule needs
//! 2. pick the first node (post-order) that is not yet checked and
//!    satisfies the entry predicate; mark it checked
//! 3. walk down from the entry marking nodes `IN` until the exit
//!    predicate holds, collecting the nodes that reference the exit
//! 4. walk down from the root marking nodes `OUT`; nodes that are both
//!    `IN` and `OUT` are conflicts
//! 5. hand everything to the rule's `generate`
//!
//! The loop ends when no unchecked entry is left.

use super::ProxyRule;
use crate::algebra::{Dag, NodeId, Op};
use crate::error::{OptResult, OptimizerError};
use crate::properties::Properties;
use crate::traversal::{post_order, Mark, Marks};
use std::collections::HashSet;

/// A candidate fragment handed to [`ProxyRule::generate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub entry: NodeId,
    pub exit: NodeId,
    /// Fragment nodes that are also referenced from outside
    pub conflicts: Vec<NodeId>,
    /// Fragment nodes that have the exit as a child
    pub exit_refs: Vec<NodeId>,
}

/// Apply one proxy rule until no unchecked entry is left. Returns the
/// number of successful rewrites.
pub fn intro_proxy_kind(
    dag: &mut Dag,
    root: NodeId,
    rule: &dyn ProxyRule,
    checked: &mut HashSet<NodeId>,
) -> OptResult<usize> {
    let mut rewrites = 0;
    loop {
        let props = Properties::infer(dag, root, rule.required());

        let Some(entry) = find_entry(dag, &props, root, rule, checked) else {
            break;
        };
        checked.insert(entry);

        let mut marks = Marks::new();
        let mut exit_refs = Vec::new();
        let exit = find_exit(dag, entry, None, &mut marks, &mut exit_refs, |dag, id| {
            rule.is_exit(dag, &props, id, entry)
        })?;
        let Some(exit) = exit else {
            tracing::trace!(rule = rule.name(), entry = %entry, "no_exit");
            continue;
        };

        let conflicts = find_conflicts(dag, root, &mut marks);
        let fragment = Fragment {
            entry,
            exit,
            conflicts,
            exit_refs,
        };
        tracing::trace!(
            rule = rule.name(),
            entry = %entry,
            exit = %exit,
            conflicts = fragment.conflicts.len(),
            "proxy_candidate"
        );

        if rule.generate(dag, &props, root, fragment, checked)? {
            rewrites += 1;
            tracing::debug!(rule = rule.name(), entry = %entry, exit = %exit, "proxy_rewritten");
        }
    }
    Ok(rewrites)
}

fn find_entry(
    dag: &Dag,
    props: &Properties,
    root: NodeId,
    rule: &dyn ProxyRule,
    checked: &HashSet<NodeId>,
) -> Option<NodeId> {
    post_order(dag, root)
        .into_iter()
        .find(|&id| !checked.contains(&id) && rule.is_entry(dag, props, id))
}

enum Step {
    Enter(NodeId),
    Leave { parent: NodeId, child: NodeId },
}

/// Walk down from `start` marking every visited node `SEEN` and `IN`.
///
/// A node satisfying `is_exit` ends its branch; `FragUnion` nodes and
/// nodes already seen are not entered. All branches must agree on the exit
/// node. `exit` may name a known exit in advance, which makes every
/// reference to it show up in `exit_refs`.
pub(crate) fn find_exit<F>(
    dag: &Dag,
    start: NodeId,
    mut exit: Option<NodeId>,
    marks: &mut Marks,
    exit_refs: &mut Vec<NodeId>,
    is_exit: F,
) -> OptResult<Option<NodeId>>
where
    F: Fn(&Dag, NodeId) -> bool,
{
    let mut stack = vec![Step::Enter(start)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(id) => {
                if is_exit(dag, id) {
                    match exit {
                        Some(first) if first != id => {
                            return Err(OptimizerError::MultipleExits {
                                entry: start,
                                first,
                                second: id,
                            });
                        }
                        _ => exit = Some(id),
                    }
                    marks.set(id, Mark::SEEN);
                    marks.set(id, Mark::IN);
                    continue;
                }
                // fragment information leads anywhere in the plan
                if matches!(dag.op(id), Op::FragUnion) || marks.is(id, Mark::SEEN) {
                    continue;
                }
                marks.set(id, Mark::SEEN);
                marks.set(id, Mark::IN);
                for &child in dag.children(id).iter().rev() {
                    stack.push(Step::Leave { parent: id, child });
                    stack.push(Step::Enter(child));
                }
            }
            Step::Leave { parent, child } => {
                if exit == Some(child) && !exit_refs.contains(&parent) {
                    exit_refs.push(parent);
                }
            }
        }
    }
    Ok(exit)
}

/// Walk down from `root` marking nodes `OUT`, stopping at `IN` nodes and
/// reporting them. Only nodes on the border of the fragment are reported.
pub(crate) fn find_conflicts(dag: &Dag, root: NodeId, marks: &mut Marks) -> Vec<NodeId> {
    let mut conflicts = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if marks.is(id, Mark::IN) {
            marks.set(id, Mark::OUT);
            if !conflicts.contains(&id) {
                conflicts.push(id);
            }
            continue;
        }
        if marks.is(id, Mark::OUT) {
            continue;
        }
        marks.set(id, Mark::OUT);
        stack.extend(dag.children(id).iter().rev().copied());
    }
    conflicts
}
