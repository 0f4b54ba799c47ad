//! Conflict resolution for proxies whose entry is a key equi-join.
//!
//! The entry and exit themselves may be referenced from outside. Any other
//! conflict is acceptable only when it is a projection or distinct sitting
//! directly on (or one below) the join input whose cardinality the join
//! preserves. Such nodes are rebuilt on top of the join, so outside users
//! keep seeing the same rows.

use super::Fragment;
use crate::algebra::{proj, proj_identity, Column, Dag, NodeId, Op};
use crate::error::OptResult;
use crate::properties::Properties;
use crate::traversal::reaches;

/// How the exit is referenced once conflicts are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Resolution {
    /// Unresolvable conflicts remain
    Conflict,
    /// The exit is only used inside the fragment
    ProxyOnly,
    /// The exit is also used outside the fragment
    Multiple,
}

pub(super) fn resolve_join_conflicts(
    dag: &mut Dag,
    props: &Properties,
    fragment: &mut Fragment,
) -> OptResult<Resolution> {
    let (entry, exit) = (fragment.entry, fragment.exit);
    let mut resolution = Resolution::ProxyOnly;
    fragment.conflicts.retain(|&c| {
        if c == exit {
            resolution = Resolution::Multiple;
        }
        c != exit && c != entry
    });
    if fragment.conflicts.is_empty() {
        return Ok(resolution);
    }

    let (att1, att2) = match dag.op(entry) {
        Op::EqJoin { att1, att2 } => (att1.clone(), att2.clone()),
        _ => return Ok(Resolution::Conflict),
    };
    let (l, r) = (dag.child(entry, 0), dag.child(entry, 1));
    if !props.is_key(dag, l, &att1) || !props.is_key(dag, r, &att2) {
        return Ok(Resolution::Conflict);
    }

    // all property lookups happen before the first rewrite
    let r_in_l = props.col_subdom(dag, (r, &att2), (l, &att1));
    let l_in_r = props.col_subdom(dag, (l, &att1), (r, &att2));

    let consistent = if r_in_l && l_in_r {
        resolve_side(dag, entry, l, r, &att1, &att2, fragment)?
            && resolve_side(
                dag,
                entry,
                dag.child(entry, 1),
                dag.child(entry, 0),
                &att2,
                &att1,
                fragment,
            )?
    } else if r_in_l {
        resolve_side(dag, entry, l, r, &att1, &att2, fragment)?
    } else if l_in_r {
        resolve_side(dag, entry, r, l, &att2, &att1, fragment)?
    } else {
        true
    };

    if !consistent || !fragment.conflicts.is_empty() {
        return Ok(Resolution::Conflict);
    }
    Ok(resolution)
}

fn redirect(refs: &mut [NodeId], old: NodeId, new: NodeId) {
    for r in refs.iter_mut() {
        if *r == old {
            *r = new;
        }
    }
}

/// Resolve conflicts at `rp`, the join input every row of which finds
/// exactly one partner in `lp`. Returns whether the conflict list is still
/// consistent with the DAG.
fn resolve_side(
    dag: &mut Dag,
    join: NodeId,
    lp: NodeId,
    rp: NodeId,
    latt: &Column,
    ratt: &Column,
    fragment: &mut Fragment,
) -> OptResult<bool> {
    let before = fragment.conflicts.len();
    let rlp = dag.children(rp).first().copied();
    let mut rp_ref = false;
    let mut rlp_ref = false;

    let mut i = 0;
    while i < fragment.conflicts.len() {
        let node = fragment.conflicts[i];
        if !matches!(dag.op(node), Op::Project { .. } | Op::Distinct) {
            return Ok(before == fragment.conflicts.len());
        }
        if node == rp {
            rp_ref = true;
            fragment.conflicts.swap_remove(i);
        } else if Some(node) == rlp {
            rlp_ref = true;
            fragment.conflicts.swap_remove(i);
        } else {
            i += 1;
        }
    }
    let changed = before != fragment.conflicts.len();

    // rebuilding rp on top of the join must not close a cycle
    if (rp_ref || rlp_ref) && reaches(dag, lp, rp) {
        return Ok(!changed);
    }

    match dag.op(rp).clone() {
        Op::Distinct if rp_ref && !rlp_ref => {
            let ident = proj_identity(dag.schema(rp).names());
            let inner = dag.child(rp, 0);
            let dist = dag.distinct(inner)?;
            let new_join = dag.eqjoin(lp, dist, latt.clone(), ratt.clone())?;
            dag.replace(join, new_join)?;
            redirect(&mut fragment.exit_refs, rp, dist);
            let top = dag.project(join, ident)?;
            dag.replace(rp, top)?;
            Ok(true)
        }
        Op::Project { proj: list } if rp_ref && !rlp_ref => {
            let ident = proj_identity(list.iter().map(|p| &p.new));
            let inner = dag.child(rp, 0);
            let lower = dag.project(inner, list)?;
            let new_join = dag.eqjoin(lp, lower, latt.clone(), ratt.clone())?;
            dag.replace(join, new_join)?;
            redirect(&mut fragment.exit_refs, rp, lower);
            let top = dag.project(join, ident)?;
            dag.replace(rp, top)?;
            Ok(true)
        }
        Op::Project { proj: list }
            if rlp_ref
                && list.len() == 1
                && rlp.is_some_and(|d| matches!(dag.op(d), Op::Distinct) && dag.schema(d).len() == 1) =>
        {
            let Some(rlp) = rlp else {
                return Ok(!changed);
            };
            let pair = list[0].clone();
            let source = dag.child(rlp, 0);
            let dist = dag.distinct(source)?;
            let lower = dag.project(dist, vec![pair.clone()])?;
            let new_join = dag.eqjoin(lp, lower, latt.clone(), ratt.clone())?;
            dag.replace(join, new_join)?;
            redirect(&mut fragment.exit_refs, rlp, dist);
            redirect(&mut fragment.exit_refs, rp, lower);
            let back = dag.project(join, vec![proj(pair.old.clone(), pair.new.clone())])?;
            dag.replace(rlp, back)?;
            let top = dag.project(join, vec![proj(pair.new.clone(), pair.new)])?;
            dag.replace(rp, top)?;
            Ok(true)
        }
        _ => Ok(!changed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{AlgType, SchemaItem};
    use crate::properties::PropKind;

    #[test]
    fn test_distinct_conflict_is_rebuilt_over_the_join() {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl(
                "t",
                vec![SchemaItem::new("a", AlgType::Int), SchemaItem::new("b", AlgType::Int)],
                vec![],
            )
            .unwrap();
        let n = dag.rowid(t, "n").unwrap();
        let pn = dag.project(n, vec![proj("m", "n")]).unwrap();
        let d = dag.distinct(pn).unwrap();
        let entry = dag.eqjoin(n, d, "n", "m").unwrap();
        // the distinct is shared with an outside consumer
        let outside = dag.project(d, vec![proj("z", "m")]).unwrap();
        let root = dag.cross(entry, outside).unwrap();

        let props = Properties::infer(&dag, root, &[PropKind::Key, PropKind::Dom]);
        let mut fragment = Fragment {
            entry,
            exit: n,
            conflicts: vec![entry, d, n],
            exit_refs: vec![entry, pn],
        };
        let res = resolve_join_conflicts(&mut dag, &props, &mut fragment).unwrap();
        assert_eq!(res, Resolution::Multiple);
        assert!(fragment.conflicts.is_empty());
        assert!(matches!(dag.op(d), Op::Project { .. }));
        assert_eq!(dag.children(d), &[entry]);
        assert_eq!(dag.schema(d).len(), 1);
        let new_dist = dag.child(entry, 1);
        assert!(matches!(dag.op(new_dist), Op::Distinct));
        assert_eq!(dag.child(new_dist, 0), pn);
    }

    #[test]
    fn test_unrelated_conflict_stays() {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl("t", vec![SchemaItem::new("a", AlgType::Int)], vec![])
            .unwrap();
        let n = dag.rowid(t, "n").unwrap();
        let s = dag.select(n, "a").unwrap();
        let ps = dag.project(s, vec![proj("m", "n")]).unwrap();
        let entry = dag.eqjoin(n, ps, "n", "m").unwrap();
        let outside = dag.project(s, vec![proj("z", "a")]).unwrap();
        let root = dag.cross(entry, outside).unwrap();

        let props = Properties::infer(&dag, root, &[PropKind::Key, PropKind::Dom]);
        let mut fragment = Fragment {
            entry,
            exit: n,
            conflicts: vec![entry, s],
            exit_refs: vec![entry, s],
        };
        let res = resolve_join_conflicts(&mut dag, &props, &mut fragment).unwrap();
        assert_eq!(res, Resolution::Conflict);
        assert!(matches!(dag.op(entry), Op::EqJoin { .. }));
    }
}
