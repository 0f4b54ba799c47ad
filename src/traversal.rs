//! # Traversal
//!
//! Visit-once walks over the DAG and the scratch bits phases use to mark
//! nodes. All walks run on an explicit work stack so deep plans cannot
//! exhaust the call stack.
//!
//! ```text
//! post_order      children before parents, left child first
//! walk_bottom_up  post_order, each node rewritten after its children
//! walk_top_down   reverse post_order, every parent before its children
//! ```

use crate::algebra::{Dag, NodeId};
use crate::error::OptResult;

/// One scratch bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(u8);

impl Mark {
    /// Visited by the current walk
    pub const SEEN: Mark = Mark(1);
    /// Inside the fragment under inspection
    pub const IN: Mark = Mark(1 << 1);
    /// Reachable from outside the fragment
    pub const OUT: Mark = Mark(1 << 2);
    /// Reachable from the left join input
    pub const LEFT: Mark = Mark(1 << 3);
    /// Reachable from the right join input
    pub const RIGHT: Mark = Mark(1 << 4);
}

/// Handle-indexed scratch bitset, kept outside the nodes
#[derive(Debug, Clone, Default)]
pub struct Marks {
    bits: Vec<u8>,
}

impl Marks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is(&self, id: NodeId, mark: Mark) -> bool {
        self.bits.get(id.index()).is_some_and(|b| b & mark.0 != 0)
    }

    pub fn set(&mut self, id: NodeId, mark: Mark) {
        let i = id.index();
        if i >= self.bits.len() {
            self.bits.resize(i + 1, 0);
        }
        self.bits[i] |= mark.0;
    }

    pub fn clear(&mut self, id: NodeId, mark: Mark) {
        if let Some(b) = self.bits.get_mut(id.index()) {
            *b &= !mark.0;
        }
    }

    /// Clear one bit on every node
    pub fn clear_all(&mut self, mark: Mark) {
        for b in &mut self.bits {
            *b &= !mark.0;
        }
    }

    /// Clear every bit on every node
    pub fn reset(&mut self) {
        self.bits.clear();
    }

    pub fn is_clear(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }
}

/// Every node reachable from `root` exactly once, children before parents
pub fn post_order(dag: &Dag, root: NodeId) -> Vec<NodeId> {
    let mut seen = Marks::new();
    let mut order = Vec::new();
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            order.push(id);
            continue;
        }
        if seen.is(id, Mark::SEEN) {
            continue;
        }
        seen.set(id, Mark::SEEN);
        stack.push((id, true));
        for &c in dag.children(id).iter().rev() {
            if !seen.is(c, Mark::SEEN) {
                stack.push((c, false));
            }
        }
    }
    order
}

/// Every node reachable from `root` exactly once, parents before children
pub fn reverse_post_order(dag: &Dag, root: NodeId) -> Vec<NodeId> {
    let mut order = post_order(dag, root);
    order.reverse();
    order
}

/// Whether `target` is reachable from `from` (a node reaches itself)
pub fn reaches(dag: &Dag, from: NodeId, target: NodeId) -> bool {
    let mut seen = Marks::new();
    let mut stack = vec![from];
    while let Some(id) = stack.pop() {
        if id == target {
            return true;
        }
        if seen.is(id, Mark::SEEN) {
            continue;
        }
        seen.set(id, Mark::SEEN);
        stack.extend(dag.children(id).iter().copied());
    }
    false
}

/// Bottom-up rewriting walk.
///
/// Children are visited (and possibly rewritten) before their parent; the
/// parent then sees its current children. Nodes created by a visit are not
/// visited in the same walk. Returns whether any visit reported a change.
pub fn walk_bottom_up<F>(dag: &mut Dag, root: NodeId, mut visit: F) -> OptResult<bool>
where
    F: FnMut(&mut Dag, NodeId) -> OptResult<bool>,
{
    let mut seen = Marks::new();
    let mut modified = false;
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            modified |= visit(dag, id)?;
            continue;
        }
        if seen.is(id, Mark::SEEN) {
            continue;
        }
        seen.set(id, Mark::SEEN);
        stack.push((id, true));
        for &c in dag.children(id).iter().rev() {
            if !seen.is(c, Mark::SEEN) {
                stack.push((c, false));
            }
        }
    }
    Ok(modified)
}

/// Top-down rewriting walk over the shape the DAG had when the walk began
pub fn walk_top_down<F>(dag: &mut Dag, root: NodeId, mut visit: F) -> OptResult<bool>
where
    F: FnMut(&mut Dag, NodeId) -> OptResult<bool>,
{
    let mut modified = false;
    for id in reverse_post_order(dag, root) {
        modified |= visit(dag, id)?;
    }
    Ok(modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{proj, AlgType, SchemaItem};

    fn diamond() -> (Dag, NodeId, NodeId) {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl("t", vec![SchemaItem::new("a", AlgType::Int)], vec![])
            .unwrap();
        let l = dag.project(t, vec![proj("b", "a")]).unwrap();
        let r = dag.project(t, vec![proj("c", "a")]).unwrap();
        let x = dag.cross(l, r).unwrap();
        (dag, t, x)
    }

    #[test]
    fn test_post_order_visits_shared_node_once() {
        let (dag, t, x) = diamond();
        let order = post_order(&dag, x);
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], t);
        assert_eq!(*order.last().unwrap(), x);
    }

    #[test]
    fn test_reverse_post_order_puts_parents_first() {
        let (dag, t, x) = diamond();
        let order = reverse_post_order(&dag, x);
        assert_eq!(order[0], x);
        assert_eq!(*order.last().unwrap(), t);
    }

    #[test]
    fn test_bottom_up_sees_rewritten_children() {
        let (mut dag, t, x) = diamond();
        let mut visited = Vec::new();
        let changed = walk_bottom_up(&mut dag, x, |dag, id| {
            visited.push(id);
            if id == t {
                let fresh = dag
                    .ref_tbl("u", vec![SchemaItem::new("a", AlgType::Int)], vec![])
                    .unwrap();
                dag.replace(t, fresh)?;
                return Ok(true);
            }
            Ok(false)
        })
        .unwrap();
        assert!(changed);
        assert_eq!(visited.len(), 4);
        assert_eq!(visited[0], t);
        assert!(matches!(dag.op(t), crate::algebra::Op::RefTbl { name, .. } if name == "u"));
    }

    #[test]
    fn test_reaches_follows_edges_downwards() {
        let (dag, t, x) = diamond();
        assert!(reaches(&dag, x, t));
        assert!(reaches(&dag, t, t));
        assert!(!reaches(&dag, t, x));
    }

    #[test]
    fn test_marks_are_independent_bits() {
        let (_, t, x) = diamond();
        let mut marks = Marks::new();
        marks.set(t, Mark::IN);
        marks.set(t, Mark::OUT);
        marks.set(x, Mark::LEFT);
        assert!(marks.is(t, Mark::IN) && marks.is(t, Mark::OUT));
        marks.clear(t, Mark::IN);
        assert!(!marks.is(t, Mark::IN));
        marks.clear_all(Mark::OUT);
        assert!(!marks.is(t, Mark::OUT));
        assert!(marks.is(x, Mark::LEFT));
        marks.reset();
        assert!(marks.is_clear());
    }
}
