use crate::algebra::{proj, proj_identity, Column, Dag, JoinPred, NodeId, Op, TjPred};
use crate::error::OptResult;
use crate::traversal::walk_bottom_up;

/// Lower every cross product and theta-join below `root` to the internal
/// theta-join. Returns the number of lowered operators.
pub(super) fn introduce_internal_thetajoins(dag: &mut Dag, root: NodeId) -> OptResult<usize> {
    let mut lowered = 0;
    walk_bottom_up(dag, root, |dag, id| {
        let preds = match dag.op(id) {
            Op::Cross => Vec::new(),
            Op::ThetaJoin { preds } => preds
                .iter()
                .map(|p| TjPred::persistent(p.comp, p.left.clone(), p.right.clone()))
                .collect(),
            _ => return Ok(false),
        };
        dag.set_op(id, Op::ThetaJoinOpt { preds })?;
        lowered += 1;
        Ok(true)
    })?;
    Ok(lowered)
}

/// Replace every internal theta-join below `root` by a plain theta-join
/// (or cross product), one comparison per visible predicate result and a
/// pruning projection. Returns the number of dissolved joins.
pub(super) fn dissolve_internal_thetajoins(dag: &mut Dag, root: NodeId) -> OptResult<usize> {
    let mut dissolved = 0;
    walk_bottom_up(dag, root, |dag, id| {
        let Op::ThetaJoinOpt { preds } = dag.op(id).clone() else {
            return Ok(false);
        };
        let (l, r) = (dag.child(id, 0), dag.child(id, 1));
        let (left, right, preds) = separate_inputs(dag, l, r, preds)?;

        let filters: Vec<JoinPred> = preds
            .iter()
            .filter(|p| p.persist)
            .map(|p| JoinPred {
                comp: p.comp,
                left: p.left.clone(),
                right: p.right.clone(),
            })
            .collect();
        let mut cur = if filters.is_empty() {
            dag.cross(left, right)?
        } else {
            dag.thetajoin(left, right, filters)?
        };
        for p in preds.iter().filter(|p| p.res_vis) {
            if let Some(res) = &p.res {
                cur = dag.compare(cur, p.comp, res.clone(), p.left.clone(), p.right.clone())?;
            }
        }

        let keep: Vec<Column> = dag.schema(id).names().cloned().collect();
        let exact = dag.schema(cur).len() == keep.len() && dag.schema(cur).names().zip(&keep).all(|(a, b)| a == b);
        let result = if exact {
            cur
        } else {
            dag.project(cur, proj_identity(&keep))?
        };
        dag.replace(id, result)?;
        dissolved += 1;
        Ok(true)
    })?;
    Ok(dissolved)
}

/// Make both inputs column-disjoint. A column both inputs carry is taken
/// from the left; its left copy is dropped unless a predicate reads it,
/// in which case the right copy is renamed.
fn separate_inputs(
    dag: &mut Dag,
    l: NodeId,
    r: NodeId,
    mut preds: Vec<TjPred>,
) -> OptResult<(NodeId, NodeId, Vec<TjPred>)> {
    let shared: Vec<Column> = dag.schema(l).names().filter(|c| dag.has_col(r, c)).cloned().collect();
    if shared.is_empty() {
        return Ok((l, r, preds));
    }
    let read_left = |c: &Column| preds.iter().any(|p| &p.left == c);
    let (renamed, dropped): (Vec<Column>, Vec<Column>) = shared.into_iter().partition(|c| read_left(c));

    let left = if dropped.is_empty() {
        l
    } else {
        let list = proj_identity(dag.schema(l).names().filter(|c| !dropped.contains(c)));
        dag.project(l, list)?
    };
    let right = if renamed.is_empty() {
        r
    } else {
        let names: Vec<Column> = dag.schema(r).names().cloned().collect();
        let mut list = Vec::with_capacity(names.len());
        for name in names {
            if renamed.contains(&name) {
                let fresh = dag.fresh(&name);
                for p in preds.iter_mut().filter(|p| p.right == name) {
                    p.right = fresh.clone();
                }
                list.push(proj(fresh, name));
            } else {
                list.push(proj(name.clone(), name));
            }
        }
        dag.project(r, list)?
    };
    Ok((left, right, preds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{AlgType, Comparison, SchemaItem};

    fn table(dag: &mut Dag, name: &str, col: &str) -> NodeId {
        dag.ref_tbl(name, vec![SchemaItem::new(col, AlgType::Int)], vec![]).unwrap()
    }

    #[test]
    fn test_lowered_thetajoin_dissolves_back() {
        let mut dag = Dag::new();
        let t = table(&mut dag, "t", "a");
        let u = table(&mut dag, "u", "b");
        let preds = vec![JoinPred {
            comp: Comparison::Lt,
            left: "a".into(),
            right: "b".into(),
        }];
        let root = dag.thetajoin(t, u, preds.clone()).unwrap();

        assert_eq!(introduce_internal_thetajoins(&mut dag, root).unwrap(), 1);
        assert!(matches!(dag.op(root), Op::ThetaJoinOpt { .. }));
        assert_eq!(dissolve_internal_thetajoins(&mut dag, root).unwrap(), 1);
        assert_eq!(dag.op(root), &Op::ThetaJoin { preds });
        assert_eq!(dissolve_internal_thetajoins(&mut dag, root).unwrap(), 0);
    }

    #[test]
    fn test_second_dissolve_is_a_no_op() {
        let mut dag = Dag::new();
        let t = table(&mut dag, "t", "a");
        let u = table(&mut dag, "u", "b");
        let pred = TjPred {
            comp: Comparison::Gt,
            left: "a".into(),
            right: "b".into(),
            res: Some("r".into()),
            persist: false,
            left_vis: false,
            right_vis: true,
            res_vis: true,
        };
        let root = dag.thetajoin_opt(t, u, vec![pred]).unwrap();
        let before: Vec<Column> = dag.schema(root).names().cloned().collect();

        assert_eq!(dissolve_internal_thetajoins(&mut dag, root).unwrap(), 1);
        let after: Vec<Column> = dag.schema(root).names().cloned().collect();
        assert_eq!(after, before);
        let revision = dag.revision(root);
        assert_eq!(dissolve_internal_thetajoins(&mut dag, root).unwrap(), 0);
        assert_eq!(dag.revision(root), revision);
        dag.refresh_schemas(root).unwrap();
    }
}
