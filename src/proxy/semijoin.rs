//! Semijoin proxy.
//!
//! A semijoin (or an equi-join against a single-column distinct) that
//! filters the rows of `rowid(cross(A, B))` by a set of row ids computed
//! from that same numbering. Each cross input gets its own numbering; the
//! filter then works on the pair of input numbers, so the cross product is
//! formed only for the surviving rows:
//!
//! ```text
//! join(rowid_n(cross(A, B)), distinct(sub))
//!   =>
//! project(rowid_n(join(rowid_n2(B), join(rowid_n1(A),
//!         distinct(project(join(project(number), sub)))))))
//! where number = rowid_n(cross(rowid_n1(A), rowid_n2(B)))
//! ```

use super::conflicts::{resolve_join_conflicts, Resolution};
use super::{skip_project, Fragment, ProxyRule};
use crate::algebra::{proj, proj_identity, proj_source, Column, Dag, NodeId, Op, ProjPair};
use crate::error::{OptResult, OptimizerError};
use crate::properties::{DomainId, PropKind, Properties};
use crate::traversal::{Mark, Marks};
use std::collections::HashSet;

pub struct SemijoinProxy;

/// Result column of a row numbering directly over a cross product
fn rowid_over_cross(dag: &Dag, id: NodeId) -> Option<&Column> {
    match dag.op(id) {
        Op::RowId { res } if matches!(dag.op(dag.child(id, 0)), Op::Cross) => Some(res),
        _ => None,
    }
}

fn unexpected(dag: &Dag, node: NodeId, expected: &'static str) -> OptimizerError {
    OptimizerError::UnexpectedOperator {
        node,
        expected,
        found: dag.op(node).name(),
    }
}

impl ProxyRule for SemijoinProxy {
    fn name(&self) -> &'static str {
        "semijoin_proxy"
    }

    fn required(&self) -> &'static [PropKind] {
        &[PropKind::Key, PropKind::Dom]
    }

    fn is_entry(&self, dag: &Dag, props: &Properties, p: NodeId) -> bool {
        let (att1, att2) = match dag.op(p) {
            Op::SemiJoin { att1, att2 } | Op::EqJoin { att1, att2 } => (att1, att2),
            _ => return false,
        };
        let (l, r) = (dag.child(p, 0), dag.child(p, 1));
        let (lp, rp) = (skip_project(dag, l), skip_project(dag, r));
        let sub = |a: (NodeId, &Column), b: (NodeId, &Column)| props.col_subdom(dag, a, b);

        if matches!(dag.op(p), Op::SemiJoin { .. }) {
            // the semijoin removes duplicates itself
            return rowid_over_cross(dag, lp)
                .is_some_and(|num| sub((r, att2), (l, att1)) && sub((l, att1), (lp, num)));
        }

        let distinct_left = matches!(dag.op(lp), Op::Distinct)
            && dag.schema(l).len() == 1
            && dag.schema(lp).len() == 1
            && rowid_over_cross(dag, rp)
                .is_some_and(|num| sub((l, att1), (r, att2)) && sub((r, att2), (rp, num)));
        let distinct_right = matches!(dag.op(rp), Op::Distinct)
            && dag.schema(r).len() == 1
            && dag.schema(rp).len() == 1
            && rowid_over_cross(dag, lp)
                .is_some_and(|num| sub((r, att2), (l, att1)) && sub((l, att1), (lp, num)));
        distinct_left || distinct_right
    }

    fn is_exit(&self, dag: &Dag, _props: &Properties, p: NodeId, entry: NodeId) -> bool {
        rowid_over_cross(dag, p).is_some()
            && (skip_project(dag, dag.child(entry, 0)) == p || skip_project(dag, dag.child(entry, 1)) == p)
    }

    fn generate(
        &self,
        dag: &mut Dag,
        props: &Properties,
        root: NodeId,
        mut fragment: Fragment,
        checked: &mut HashSet<NodeId>,
    ) -> OptResult<bool> {
        let (entry, exit) = (fragment.entry, fragment.exit);
        let is_semi = matches!(dag.op(entry), Op::SemiJoin { .. });
        let num_col = match dag.op(exit) {
            Op::RowId { res } => res.clone(),
            _ => return Err(unexpected(dag, exit, "rowid")),
        };
        let entry_att1 = match dag.op(entry) {
            Op::SemiJoin { att1, .. } | Op::EqJoin { att1, .. } => att1.clone(),
            _ => return Err(unexpected(dag, entry, "eqjoin or semijoin")),
        };
        // looked up before conflict resolution rewrites anything
        let entry_dom = props.dom(dag, entry, &entry_att1);
        let exit_dom = props.dom(dag, exit, &num_col);

        let multiple = match resolve_join_conflicts(dag, props, &mut fragment)? {
            Resolution::Conflict => return Ok(false),
            Resolution::ProxyOnly => false,
            Resolution::Multiple => true,
        };
        if multiple && !only_mapping_refs(dag, props, root, entry, exit, entry_dom, exit_dom) {
            return Ok(false);
        }

        // conflict resolution may have rebuilt the entry, read it afresh
        let (att1, att2) = match dag.op(entry) {
            Op::SemiJoin { att1, att2 } | Op::EqJoin { att1, att2 } => (att1.clone(), att2.clone()),
            _ => return Err(unexpected(dag, entry, "eqjoin or semijoin")),
        };
        let (l, r) = (dag.child(entry, 0), dag.child(entry, 1));
        let (lp, mut lproject) = match dag.op(l) {
            Op::Project { .. } => (dag.child(l, 0), Some(l)),
            _ => (l, None),
        };
        let (rp, rproject) = match dag.op(r) {
            Op::Project { .. } if !is_semi => (dag.child(r, 0), Some(r)),
            _ => (r, None),
        };
        // keep the distinct on the right
        let rp = if !is_semi && matches!(dag.op(lp), Op::Distinct) {
            lproject = rproject;
            lp
        } else {
            rp
        };
        let (join_att2, rp) = if is_semi {
            (att2.clone(), rp)
        } else {
            if !matches!(dag.op(rp), Op::Distinct) {
                return Err(unexpected(dag, rp, "distinct"));
            }
            let Some(col) = dag.schema(rp).names().next().cloned() else {
                return Err(unexpected(dag, rp, "single-column distinct"));
            };
            (col, dag.child(rp, 0))
        };

        let cross = dag.child(exit, 0);
        let (left_in, right_in) = (dag.child(cross, 0), dag.child(cross, 1));

        let num_col1 = dag.fresh(&num_col);
        let num_col2 = dag.fresh(&num_col);
        let alias1 = dag.fresh(&num_col);
        let alias2 = dag.fresh(&num_col);
        let num_alias = if dag.has_col(rp, &num_col) {
            dag.fresh(&num_col)
        } else {
            num_col.clone()
        };

        let left_proj = vec![
            proj(num_alias.clone(), num_col.clone()),
            proj(num_col1.clone(), num_col1.clone()),
            proj(num_col2.clone(), num_col2.clone()),
        ];
        let dist_proj = vec![
            proj(alias1.clone(), num_col1.clone()),
            proj(alias2.clone(), num_col2.clone()),
        ];

        let mut proxy_proj: Vec<ProjPair> = Vec::new();
        for col in dag.schema(entry).names() {
            if col == &att1 || (!is_semi && col == &att2) {
                proxy_proj.push(proj(col.clone(), num_col.clone()));
            } else if let Some(lproject) = lproject {
                let list = match dag.op(lproject) {
                    Op::Project { proj } => proj,
                    _ => return Err(unexpected(dag, lproject, "project")),
                };
                let old = proj_source(list, col).ok_or_else(|| OptimizerError::MissingColumn {
                    column: col.clone(),
                    context: "semijoin proxy projection".to_string(),
                })?;
                proxy_proj.push(proj(col.clone(), old.clone()));
            } else {
                proxy_proj.push(proj(col.clone(), col.clone()));
            }
        }
        let exit_proj = proj_identity(dag.schema(exit).names());

        let num1 = dag.rowid(left_in, num_col1.clone())?;
        let num2 = dag.rowid(right_in, num_col2.clone())?;
        let pairs = dag.cross(num1, num2)?;
        let number = dag.rowid(pairs, num_col.clone())?;

        let mapped = dag.project(number, left_proj)?;
        let matched = dag.eqjoin(mapped, rp, num_alias, join_att2)?;
        let kept = dag.project(matched, dist_proj)?;
        let kept = dag.distinct(kept)?;
        let join1 = dag.eqjoin(num1, kept, num_col1, alias1)?;
        let join2 = dag.eqjoin(num2, join1, num_col2, alias2)?;
        let new_number = dag.rowid(join2, num_col)?;

        let top = dag.project(new_number, proxy_proj)?;
        dag.replace(entry, top)?;

        if multiple {
            // inside users keep the full numbering, outside users only
            // map columns and may use the filtered one
            let exit_op = dag.project(number, exit_proj.clone())?;
            for &parent in &fragment.exit_refs {
                if dag.children(parent).contains(&exit) {
                    dag.relink(parent, exit, exit_op)?;
                }
            }
            let outside = dag.project(new_number, exit_proj)?;
            dag.replace(exit, outside)?;
        } else {
            let inside = dag.project(number, exit_proj)?;
            dag.replace(exit, inside)?;
        }

        checked.extend([join2, join1, matched]);
        Ok(true)
    }
}

/// Whether every outside reference to `exit` is a mapping equi-join
/// between entry values and exit numbers, possibly under projections
fn only_mapping_refs(
    dag: &Dag,
    props: &Properties,
    root: NodeId,
    entry: NodeId,
    exit: NodeId,
    entry_dom: Option<DomainId>,
    exit_dom: Option<DomainId>,
) -> bool {
    let (Some(entry_dom), Some(exit_dom)) = (entry_dom, exit_dom) else {
        return false;
    };
    let sub = |n: NodeId, c: &Column, d: DomainId| props.dom(dag, n, c).is_some_and(|x| props.subdom(x, d));
    let mapping_join = |p: NodeId| match dag.op(p) {
        Op::EqJoin { att1, att2 } => {
            let (l, r) = (dag.child(p, 0), dag.child(p, 1));
            (sub(l, att1, entry_dom) && sub(r, att2, exit_dom)) || (sub(r, att2, entry_dom) && sub(l, att1, exit_dom))
        }
        _ => false,
    };

    let mut marks = Marks::new();
    marks.set(entry, Mark::SEEN);
    marks.set(exit, Mark::SEEN);
    let mut stack = vec![(root, false)];
    while let Some((p, in_join)) = stack.pop() {
        if p == exit {
            if !in_join {
                return false;
            }
            continue;
        }
        if marks.is(p, Mark::SEEN) {
            continue;
        }
        marks.set(p, Mark::SEEN);
        let ctx = match dag.op(p) {
            Op::Project { .. } => in_join,
            _ => mapping_join(p),
        };
        for &c in dag.children(p).iter().rev() {
            stack.push((c, ctx));
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{AlgType, Comparison, SchemaItem};
    use crate::proxy::intro_proxy_kind;

    fn table(dag: &mut Dag, name: &str, col: &str) -> NodeId {
        dag.ref_tbl(name, vec![SchemaItem::new(col, AlgType::Int)], vec![])
            .unwrap()
    }

    /// `eqjoin(rowid(cross(A, B)), distinct(project(select(compare(...)))))`
    fn filtered_cross(dag: &mut Dag) -> (NodeId, NodeId) {
        let a = table(dag, "a", "a");
        let b = table(dag, "b", "b");
        let x = dag.cross(a, b).unwrap();
        let n = dag.rowid(x, "n").unwrap();
        let cmp = dag.compare(n, Comparison::Gt, "c", "a", "b").unwrap();
        let s = dag.select(cmp, "c").unwrap();
        let ps = dag.project(s, vec![proj("m", "n")]).unwrap();
        let d = dag.distinct(ps).unwrap();
        let entry = dag.eqjoin(n, d, "n", "m").unwrap();
        (entry, n)
    }

    #[test]
    fn test_entry_recognizes_distinct_filter() {
        let mut dag = Dag::new();
        let (entry, n) = filtered_cross(&mut dag);
        let props = Properties::infer(&dag, entry, SemijoinProxy.required());
        assert!(SemijoinProxy.is_entry(&dag, &props, entry));
        assert!(SemijoinProxy.is_exit(&dag, &props, n, entry));
        assert!(!SemijoinProxy.is_entry(&dag, &props, n));
    }

    #[test]
    fn test_numbering_moves_into_cross_inputs() {
        let mut dag = Dag::new();
        let (entry, n) = filtered_cross(&mut dag);
        let before: HashSet<Column> = dag.schema(entry).names().cloned().collect();

        let mut checked = HashSet::new();
        let rewrites = intro_proxy_kind(&mut dag, entry, &SemijoinProxy, &mut checked).unwrap();
        assert_eq!(rewrites, 1);

        let after: HashSet<Column> = dag.schema(entry).names().cloned().collect();
        assert_eq!(before, after);
        assert!(matches!(dag.op(entry), Op::Project { .. }));
        let top_number = dag.child(entry, 0);
        assert!(matches!(dag.op(top_number), Op::RowId { .. }));
        assert!(matches!(dag.op(dag.child(top_number, 0)), Op::EqJoin { .. }));

        // the old numbering is now a projection over the split numbering
        assert!(matches!(dag.op(n), Op::Project { .. }));
        let number = dag.child(n, 0);
        let cross = dag.child(number, 0);
        assert!(matches!(dag.op(cross), Op::Cross));
        for &input in dag.children(cross) {
            assert!(matches!(dag.op(input), Op::RowId { .. }));
        }
        dag.refresh_schemas(entry).unwrap();
    }

    #[test]
    fn test_outside_use_of_numbering_blocks_rewrite() {
        let mut dag = Dag::new();
        let (entry, n) = filtered_cross(&mut dag);
        // a selection over the numbering outside the fragment
        let outside = dag.select(n, "a").unwrap();
        let outside = dag.project(outside, vec![proj("z", "n")]).unwrap();
        let root = dag.cross(entry, outside).unwrap();

        let mut checked = HashSet::new();
        let rewrites = intro_proxy_kind(&mut dag, root, &SemijoinProxy, &mut checked).unwrap();
        assert_eq!(rewrites, 0);
        assert!(matches!(dag.op(entry), Op::EqJoin { .. }));
    }
}
