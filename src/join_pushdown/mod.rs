//! # Equi-Join Pushdown
//!
//! Moves equi-joins as far towards the leaves as they can go. While the
//! phase runs, every join is an [`Op::InternalJoin`] whose per-input
//! renaming lists absorb the projections it passes, so no column is ever
//! renamed in place.
//!
//! ```text
//! project / select / type_assert / roots / cond_err   always
//! attach / fun / compare / bool / not / cast / type   result is not the join column
//! rownum / rowid / rank / pos_select / distinct       other input is key and covers the join values
//! cross / thetajoin / semijoin / nested join          into the input holding the join column
//! union                                               into both inputs
//! ```
//!
//! Each round infers keys and domains once, then walks the plan bottom-up
//! merging stacked projections and pushing every join. Rounds repeat until
//! nothing changes or `max_iterations` is reached; the internal joins are
//! then turned back into plain equi-joins.

mod cleanup;
mod worker;

use crate::algebra::{proj, Dag, NodeId, Op};
use crate::config::OptimizerConfig;
use crate::error::{OptResult, OptimizerError};
use crate::properties::{PropKind, Properties};
use crate::traversal::walk_bottom_up;

/// Push equi-joins below `root` down. Returns the number of rewrites.
pub fn optimize_join_pushdown(dag: &mut Dag, root: NodeId, config: &OptimizerConfig) -> OptResult<usize> {
    let converted = cleanup::introduce_internal_joins(dag, root)?;
    let mut total = 0;
    for round in 0..config.max_iterations {
        let props = Properties::infer(dag, root, &[PropKind::Key, PropKind::Dom]);
        let mut rewrites = 0;
        walk_bottom_up(dag, root, |dag, id| {
            let n = match dag.op(id) {
                Op::Project { .. } => usize::from(merge_projections(dag, id)?),
                Op::InternalJoin { .. } => worker::push_join(dag, &props, id)?,
                _ => 0,
            };
            rewrites += n;
            Ok(n > 0)
        })?;
        tracing::trace!(round, rewrites, "join_pushdown_round");
        total += rewrites;
        if rewrites == 0 {
            break;
        }
    }
    let dissolved = cleanup::dissolve_internal_joins(dag, root)?;
    tracing::debug!(converted, rewrites = total, dissolved, "join_pushdown_done");
    Ok(total)
}

/// `project(project(x))` becomes one projection over `x`
fn merge_projections(dag: &mut Dag, id: NodeId) -> OptResult<bool> {
    let Op::Project { proj: upper } = dag.op(id) else {
        return Ok(false);
    };
    let below = dag.child(id, 0);
    let Op::Project { proj: lower } = dag.op(below) else {
        return Ok(false);
    };
    let mut merged = Vec::with_capacity(upper.len());
    for pair in upper {
        let old = lower
            .iter()
            .find(|p| p.new == pair.old)
            .map(|p| p.old.clone())
            .ok_or_else(|| OptimizerError::MissingColumn {
                column: pair.old.clone(),
                context: "project".to_string(),
            })?;
        merged.push(proj(pair.new.clone(), old));
    }
    let input = dag.child(below, 0);
    let flat = dag.project(input, merged)?;
    dag.replace(id, flat)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{AlgType, Column, Comparison, SchemaItem};
    use crate::traversal::{post_order, reaches};

    fn table(dag: &mut Dag, name: &str, cols: &[&str], keys: &[&str]) -> NodeId {
        dag.ref_tbl(
            name,
            cols.iter().map(|c| SchemaItem::new(*c, AlgType::Int)).collect(),
            keys.iter().map(|k| vec![Column::new(k)]).collect(),
        )
        .unwrap()
    }

    fn names(dag: &Dag, id: NodeId) -> Vec<String> {
        let mut names: Vec<String> = dag.schema(id).names().map(|c| c.as_str().to_string()).collect();
        names.sort();
        names
    }

    fn find(dag: &Dag, root: NodeId, pred: impl Fn(&Op) -> bool) -> Vec<NodeId> {
        post_order(dag, root).into_iter().filter(|&id| pred(dag.op(id))).collect()
    }

    #[test]
    fn test_join_sinks_below_selection() {
        let mut dag = Dag::new();
        let t = table(&mut dag, "t", &["a", "b"], &[]);
        let u = table(&mut dag, "u", &["c", "d"], &[]);
        let cmp = dag.compare(t, Comparison::Gt, "x", "a", "b").unwrap();
        let sel = dag.select(cmp, "x").unwrap();
        let join = dag.eqjoin(sel, u, "a", "c").unwrap();
        let root = dag.project(join, vec![proj("a", "a"), proj("d", "d")]).unwrap();

        let rewrites = optimize_join_pushdown(&mut dag, root, &OptimizerConfig::default()).unwrap();
        assert!(rewrites >= 2);
        assert_eq!(names(&dag, root), vec!["a", "d"]);

        let joins = find(&dag, root, |op| matches!(op, Op::EqJoin { .. }));
        assert_eq!(joins.len(), 1);
        assert!(dag.children(joins[0]).contains(&t));
        let selects = find(&dag, root, |op| matches!(op, Op::Select { .. }));
        assert!(selects.iter().all(|&s| reaches(&dag, s, u)));
        assert!(find(&dag, root, |op| matches!(op, Op::InternalJoin { .. })).is_empty());
        dag.refresh_schemas(root).unwrap();
    }

    #[test]
    fn test_numbering_moves_when_partner_is_key() {
        let mut dag = Dag::new();
        let t = table(&mut dag, "t", &["a", "b"], &["a"]);
        let n = dag.rowid(t, "n").unwrap();
        let u = dag.project(t, vec![proj("c", "a"), proj("d", "b")]).unwrap();
        let join = dag.eqjoin(n, u, "a", "c").unwrap();
        let root = dag.project(join, vec![proj("n", "n"), proj("d", "d")]).unwrap();

        optimize_join_pushdown(&mut dag, root, &OptimizerConfig::default()).unwrap();
        // the numbering is computed once, over the (now removed) key join
        assert!(matches!(dag.op(n), Op::Project { .. }));
        assert!(find(&dag, root, |op| matches!(op, Op::EqJoin { .. } | Op::InternalJoin { .. })).is_empty());
        assert_eq!(find(&dag, root, |op| matches!(op, Op::RowId { .. })).len(), 1);
        assert_eq!(names(&dag, root), vec!["d", "n"]);
        dag.refresh_schemas(root).unwrap();
    }

    #[test]
    fn test_numbering_blocks_join_without_key() {
        let mut dag = Dag::new();
        let t = table(&mut dag, "t", &["a", "b"], &[]);
        let n = dag.rowid(t, "n").unwrap();
        let u = dag.project(t, vec![proj("c", "a"), proj("d", "b")]).unwrap();
        let join = dag.eqjoin(n, u, "a", "c").unwrap();

        optimize_join_pushdown(&mut dag, join, &OptimizerConfig::default()).unwrap();
        assert!(matches!(dag.op(n), Op::RowId { .. }));
        assert!(matches!(dag.op(join), Op::EqJoin { .. }));
        assert_eq!(dag.child(join, 0), n);
        assert_eq!(names(&dag, join), vec!["a", "b", "c", "d", "n"]);
    }

    #[test]
    fn test_union_receives_join_in_both_inputs() {
        let mut dag = Dag::new();
        let t1 = table(&mut dag, "t1", &["a"], &[]);
        let t2 = table(&mut dag, "t2", &["a"], &[]);
        let u = table(&mut dag, "u", &["c", "d"], &[]);
        let un = dag.union(t1, t2).unwrap();
        let join = dag.eqjoin(un, u, "a", "c").unwrap();

        optimize_join_pushdown(&mut dag, join, &OptimizerConfig::default()).unwrap();
        assert!(matches!(dag.op(join), Op::DisjUnion));
        for i in 0..2 {
            let branch = dag.child(join, i);
            assert!(matches!(dag.op(branch), Op::EqJoin { .. }));
            assert_eq!(dag.child(branch, 1), u);
        }
        assert_eq!(names(&dag, join), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_cross_takes_join_on_join_column_side() {
        let mut dag = Dag::new();
        let t = table(&mut dag, "t", &["a"], &[]);
        let v = table(&mut dag, "v", &["e"], &[]);
        let u = table(&mut dag, "u", &["c", "d"], &[]);
        let x = dag.cross(t, v).unwrap();
        let join = dag.eqjoin(x, u, "a", "c").unwrap();

        optimize_join_pushdown(&mut dag, join, &OptimizerConfig::default()).unwrap();
        assert!(matches!(dag.op(join), Op::Cross));
        let lower = dag.child(join, 0);
        assert!(matches!(dag.op(lower), Op::EqJoin { .. }));
        assert_eq!(dag.children(lower), &[t, u]);
        assert_eq!(dag.child(join, 1), v);
        assert_eq!(names(&dag, join), vec!["a", "c", "d", "e"]);
    }

    #[test]
    fn test_nested_join_is_reassociated() {
        let mut dag = Dag::new();
        let t = table(&mut dag, "t", &["a", "b"], &["a"]);
        let v = table(&mut dag, "v", &["e", "f"], &[]);
        let n = dag.rowid(t, "n").unwrap();
        // stuck on the numbering: v is not key on e
        let inner = dag.eqjoin(n, v, "b", "e").unwrap();
        let u = dag.project(t, vec![proj("c", "a"), proj("d", "b")]).unwrap();
        let join = dag.eqjoin(inner, u, "a", "c").unwrap();
        let before = names(&dag, join);

        optimize_join_pushdown(&mut dag, join, &OptimizerConfig::default()).unwrap();
        assert_eq!(names(&dag, join), before);
        // the key join reached the numbering and vanished there
        assert!(matches!(dag.op(n), Op::Project { .. }));
        let joins = find(&dag, join, |op| matches!(op, Op::EqJoin { .. } | Op::InternalJoin { .. }));
        assert_eq!(joins.len(), 1);
        assert_eq!(dag.child(joins[0], 1), v);
        dag.refresh_schemas(join).unwrap();
    }

    #[test]
    fn test_self_join_on_key_disappears() {
        let mut dag = Dag::new();
        let t = table(&mut dag, "t", &["a", "b"], &["a"]);
        let u = dag.project(t, vec![proj("c", "a"), proj("d", "b")]).unwrap();
        let join = dag.eqjoin(t, u, "a", "c").unwrap();

        let rewrites = optimize_join_pushdown(&mut dag, join, &OptimizerConfig::default()).unwrap();
        assert!(rewrites >= 2);
        assert!(matches!(dag.op(join), Op::Project { .. }));
        assert_eq!(dag.child(join, 0), t);
        assert_eq!(names(&dag, join), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_proxy_in_pushdown_is_an_error() {
        let mut dag = Dag::new();
        let t = table(&mut dag, "t", &["a"], &[]);
        let u = table(&mut dag, "u", &["c", "d"], &[]);
        let base = dag.proxy_base(t).unwrap();
        let join = dag.eqjoin(base, u, "a", "c").unwrap();

        let err = optimize_join_pushdown(&mut dag, join, &OptimizerConfig::default()).unwrap_err();
        assert_eq!(err, OptimizerError::ProxyInPushdown(base));
    }

    #[test]
    fn test_stacked_projections_are_merged() {
        let mut dag = Dag::new();
        let t = table(&mut dag, "t", &["a", "b"], &[]);
        let p1 = dag.project(t, vec![proj("x", "a"), proj("y", "b")]).unwrap();
        let p2 = dag.project(p1, vec![proj("z", "y")]).unwrap();

        assert_eq!(optimize_join_pushdown(&mut dag, p2, &OptimizerConfig::default()).unwrap(), 1);
        assert_eq!(dag.child(p2, 0), t);
        let Op::Project { proj: list } = dag.op(p2) else {
            panic!("projection expected");
        };
        assert_eq!(list, &vec![proj("z", "b")]);
    }
}
