//! Nest proxy.
//!
//! Two branches that are computed independently from the same numbering
//! and then joined on their number columns are turned into a nested plan:
//! the right branch is joined against the numbering first, renumbered, and
//! the left branch is recomputed on top of that new numbering.
//!
//! ```text
//!        join(att1 = att2)                  project(top)
//!        /              \                       |
//!      left            right              join(new_num = att1)
//!        \              /                 /            \
//!         rowid_num(...)          project(upper_left)  left'
//!                                           \          /
//!                                  rowid_new_num(join(att1 = att2))
//!                                               /             \
//!                                    project(lower_left)     right
//!                                               \             /
//!                                                rowid_num(...)
//! ```
//!
//! `left'` is the left branch reading `project(upper_right)` instead of the
//! old numbering. Applied only when neither branch is referenced from
//! anywhere else and the branches do not share nodes.

use super::engine::{find_conflicts, find_exit};
use super::{Fragment, ProxyRule};
use crate::algebra::{proj, proj_identity, Column, Dag, NodeId, Op, ProjPair};
use crate::error::{OptResult, OptimizerError};
use crate::properties::{PropKind, Properties};
use crate::traversal::Marks;
use std::collections::HashSet;

pub struct NestProxy;

impl ProxyRule for NestProxy {
    fn name(&self) -> &'static str {
        "nest_proxy"
    }

    fn required(&self) -> &'static [PropKind] {
        &[PropKind::Key, PropKind::Dom]
    }

    /// An equi-join where neither side is a key join on a subdomain
    fn is_entry(&self, dag: &Dag, props: &Properties, p: NodeId) -> bool {
        let Op::EqJoin { att1, att2 } = dag.op(p) else {
            return false;
        };
        let (l, r) = (dag.child(p, 0), dag.child(p, 1));
        let left_key_join = props.is_key(dag, l, att1) && props.col_subdom(dag, (r, att2), (l, att1));
        let right_key_join = props.is_key(dag, r, att2) && props.col_subdom(dag, (l, att1), (r, att2));
        !left_key_join && !right_key_join
    }

    fn is_exit(&self, dag: &Dag, props: &Properties, p: NodeId, entry: NodeId) -> bool {
        let Op::RowId { res } = dag.op(p) else {
            return false;
        };
        // only worth it when a cross product waits below
        let mut cur = p;
        while matches!(dag.op(cur), Op::Project { .. } | Op::RowId { .. }) {
            cur = dag.child(cur, 0);
        }
        if !matches!(dag.op(cur), Op::Cross) {
            return false;
        }
        let Op::EqJoin { att1, att2 } = dag.op(entry) else {
            return false;
        };
        props.col_subdom(dag, (dag.child(entry, 0), att1), (p, res))
            && props.col_subdom(dag, (dag.child(entry, 1), att2), (p, res))
    }

    fn generate(
        &self,
        dag: &mut Dag,
        _props: &Properties,
        _root: NodeId,
        fragment: Fragment,
        checked: &mut HashSet<NodeId>,
    ) -> OptResult<bool> {
        let (entry, exit) = (fragment.entry, fragment.exit);
        if fragment.conflicts.iter().any(|&c| c != entry && c != exit) {
            return Ok(false);
        }
        let (att1, att2) = match dag.op(entry) {
            Op::EqJoin { att1, att2 } => (att1.clone(), att2.clone()),
            other => {
                return Err(OptimizerError::UnexpectedOperator {
                    node: entry,
                    expected: "eqjoin",
                    found: other.name(),
                })
            }
        };
        let num_col = match dag.op(exit) {
            Op::RowId { res } => res.clone(),
            other => {
                return Err(OptimizerError::UnexpectedOperator {
                    node: exit,
                    expected: "rowid",
                    found: other.name(),
                })
            }
        };
        let (l, r) = (dag.child(entry, 0), dag.child(entry, 1));
        if l == exit {
            return Ok(false);
        }

        // the right branch may share nothing with the left one but the exit
        let mut marks = Marks::new();
        let mut left_refs = Vec::new();
        find_exit(dag, l, Some(exit), &mut marks, &mut left_refs, |_, id| id == exit)?;
        if left_refs.is_empty() {
            return Ok(false);
        }
        if find_conflicts(dag, r, &mut marks).iter().any(|&c| c != exit) {
            return Ok(false);
        }

        let new_num_col = dag.fresh(&num_col);

        let mut upper_left = proj_identity(dag.schema(r).names());
        upper_left.push(proj(new_num_col.clone(), new_num_col.clone()));

        let top: Vec<ProjPair> = dag
            .schema(entry)
            .names()
            .map(|c| {
                if c == &att1 {
                    proj(att1.clone(), att2.clone())
                } else {
                    proj(c.clone(), c.clone())
                }
            })
            .collect();

        let exit_cols: Vec<Column> = dag.schema(exit).names().cloned().collect();
        let mut lower_left = Vec::with_capacity(exit_cols.len());
        let mut upper_right = Vec::with_capacity(exit_cols.len());
        for col in exit_cols {
            if col == num_col {
                lower_left.push(proj(att1.clone(), num_col.clone()));
                upper_right.push(proj(num_col.clone(), new_num_col.clone()));
            } else {
                let renamed = dag.fresh(&col);
                lower_left.push(proj(renamed.clone(), col.clone()));
                upper_right.push(proj(col, renamed));
            }
        }

        let lowered = dag.project(exit, lower_left)?;
        let lower_join = dag.eqjoin(lowered, r, att1.clone(), att2)?;
        let new_num = dag.rowid(lower_join, new_num_col.clone())?;
        let renumbered = dag.project(new_num, upper_right)?;
        for parent in left_refs {
            dag.relink(parent, exit, renumbered)?;
        }

        let carried = dag.project(new_num, upper_left)?;
        let upper_join = dag.eqjoin(carried, l, new_num_col, att1)?;
        let result = dag.project(upper_join, top)?;
        dag.replace(entry, result)?;

        checked.extend([upper_join, lower_join]);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{AlgType, Comparison, SchemaItem};
    use crate::proxy::intro_proxy_kind;

    fn independent_branches(dag: &mut Dag) -> (NodeId, NodeId, NodeId) {
        let a = dag.ref_tbl("a", vec![SchemaItem::new("a", AlgType::Int)], vec![]).unwrap();
        let b = dag.ref_tbl("b", vec![SchemaItem::new("b", AlgType::Int)], vec![]).unwrap();
        let x = dag.cross(a, b).unwrap();
        let n = dag.rowid(x, "n").unwrap();

        let cmp1 = dag.compare(n, Comparison::Gt, "c1", "a", "b").unwrap();
        let s1 = dag.select(cmp1, "c1").unwrap();
        let l = dag.project(s1, vec![proj("p", "n"), proj("a", "a")]).unwrap();

        let cmp2 = dag.compare(n, Comparison::Lt, "c2", "a", "b").unwrap();
        let s2 = dag.select(cmp2, "c2").unwrap();
        let r = dag.project(s2, vec![proj("q", "n"), proj("b", "b")]).unwrap();

        let entry = dag.eqjoin(l, r, "p", "q").unwrap();
        (entry, n, cmp1)
    }

    #[test]
    fn test_independent_branches_are_nested() {
        let mut dag = Dag::new();
        let (entry, n, cmp1) = independent_branches(&mut dag);
        let before: HashSet<Column> = dag.schema(entry).names().cloned().collect();

        let mut checked = HashSet::new();
        let rewrites = intro_proxy_kind(&mut dag, entry, &NestProxy, &mut checked).unwrap();
        assert_eq!(rewrites, 1);

        let after: HashSet<Column> = dag.schema(entry).names().cloned().collect();
        assert_eq!(before, after);
        assert!(matches!(dag.op(entry), Op::Project { .. }));
        assert!(matches!(dag.op(dag.child(entry, 0)), Op::EqJoin { .. }));

        // the left branch now reads the new numbering
        let renumbered = dag.child(cmp1, 0);
        assert_ne!(renumbered, n);
        assert!(matches!(dag.op(renumbered), Op::Project { .. }));
        assert!(matches!(dag.op(dag.child(renumbered, 0)), Op::RowId { .. }));
        dag.refresh_schemas(entry).unwrap();
    }

    #[test]
    fn test_shared_branch_blocks_nesting() {
        let mut dag = Dag::new();
        let (entry, _, cmp1) = independent_branches(&mut dag);
        let outside = dag.project(cmp1, vec![proj("z", "c1")]).unwrap();
        let root = dag.cross(entry, outside).unwrap();

        let mut checked = HashSet::new();
        let rewrites = intro_proxy_kind(&mut dag, root, &NestProxy, &mut checked).unwrap();
        assert_eq!(rewrites, 0);
        assert!(matches!(dag.op(entry), Op::EqJoin { .. }));
    }
}
