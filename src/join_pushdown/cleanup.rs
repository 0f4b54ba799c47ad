use crate::algebra::{proj, proj_identity, Column, Dag, NodeId, Op, ProjPair};
use crate::error::OptResult;
use crate::traversal::walk_bottom_up;

/// Turn every equi-join below `root` into an internal join. Returns the
/// number of converted joins.
pub(super) fn introduce_internal_joins(dag: &mut Dag, root: NodeId) -> OptResult<usize> {
    let mut converted = 0;
    walk_bottom_up(dag, root, |dag, id| {
        let Op::EqJoin { att1, att2 } = dag.op(id).clone() else {
            return Ok(false);
        };
        let (l, r) = (dag.child(id, 0), dag.child(id, 1));
        let mut lproj = vec![proj(att1.clone(), att1.clone())];
        lproj.extend(dag.schema(l).names().filter(|c| **c != att1).map(|c| proj(c.clone(), c.clone())));
        let mut rproj = vec![proj(att1, att2)];
        rproj.extend(proj_identity(dag.schema(r).names()));
        dag.set_op(id, Op::InternalJoin { lproj, rproj })?;
        converted += 1;
        Ok(true)
    })?;
    Ok(converted)
}

/// A list that passes its whole input through unchanged
fn passes_through(dag: &Dag, input: NodeId, list: &[ProjPair]) -> bool {
    list.len() == dag.schema(input).len() && list.iter().all(|p| p.new == p.old)
}

/// Replace every internal join by a plain equi-join with explicit
/// projections. Returns the number of dissolved joins.
pub(super) fn dissolve_internal_joins(dag: &mut Dag, root: NodeId) -> OptResult<usize> {
    let mut dissolved = 0;
    walk_bottom_up(dag, root, |dag, id| {
        let Op::InternalJoin { lproj, rproj } = dag.op(id).clone() else {
            return Ok(false);
        };
        let (l, r) = (dag.child(id, 0), dag.child(id, 1));
        let join_col = lproj[0].new.clone();
        let ratt = rproj[0].old.clone();

        let left = if passes_through(dag, l, &lproj) {
            l
        } else {
            dag.project(l, lproj)?
        };
        let rest = &rproj[1..];
        let result = match rest.iter().find(|p| p.old == ratt).map(|p| p.new.clone()) {
            // the right join column is delivered anyway
            Some(att2) => {
                let right = if passes_through(dag, r, rest) {
                    r
                } else {
                    dag.project(r, rest.to_vec())?
                };
                dag.eqjoin(left, right, join_col, att2)?
            }
            None => {
                let alias = dag.fresh(&ratt);
                let mut list = vec![proj(alias.clone(), ratt)];
                list.extend_from_slice(rest);
                let right = dag.project(r, list)?;
                let joined = dag.eqjoin(left, right, join_col, alias)?;
                let keep: Vec<Column> = dag.schema(id).names().cloned().collect();
                dag.project(joined, proj_identity(&keep))?
            }
        };
        dag.replace(id, result)?;
        dissolved += 1;
        Ok(true)
    })?;
    Ok(dissolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{AlgType, SchemaItem};

    #[test]
    fn test_internal_join_dissolves_to_the_same_eqjoin() {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl(
                "t",
                vec![SchemaItem::new("a", AlgType::Int), SchemaItem::new("b", AlgType::Int)],
                vec![],
            )
            .unwrap();
        let u = dag.ref_tbl("u", vec![SchemaItem::new("c", AlgType::Int)], vec![]).unwrap();
        let root = dag.eqjoin(t, u, "a", "c").unwrap();

        assert_eq!(introduce_internal_joins(&mut dag, root).unwrap(), 1);
        assert!(matches!(dag.op(root), Op::InternalJoin { .. }));
        assert_eq!(dissolve_internal_joins(&mut dag, root).unwrap(), 1);
        assert_eq!(
            dag.op(root),
            &Op::EqJoin {
                att1: "a".into(),
                att2: "c".into(),
            }
        );
        assert_eq!(dag.children(root), &[t, u]);
        assert_eq!(dissolve_internal_joins(&mut dag, root).unwrap(), 0);
        assert_eq!(introduce_internal_joins(&mut dag, t).unwrap(), 0);
    }
}
