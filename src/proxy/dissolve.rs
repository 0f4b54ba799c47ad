use crate::algebra::{Dag, NodeId, Op};
use crate::error::OptResult;
use crate::traversal::walk_bottom_up;

/// Replace every proxy and proxy base by its input. Returns the number of
/// dissolved nodes.
pub fn dissolve(dag: &mut Dag, root: NodeId) -> OptResult<usize> {
    let mut dissolved = 0;
    walk_bottom_up(dag, root, |dag, id| {
        if !matches!(dag.op(id), Op::Proxy { .. } | Op::ProxyBase) {
            return Ok(false);
        }
        let input = dag.child(id, 0);
        dag.replace(id, input)?;
        dissolved += 1;
        Ok(true)
    })?;
    if dissolved > 0 {
        tracing::debug!(dissolved, "proxies_dissolved");
    }
    Ok(dissolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{proj, AlgType, Column, SchemaItem};

    #[test]
    fn test_proxy_and_base_are_removed() {
        let mut dag = Dag::new();
        let t = dag.ref_tbl("t", vec![SchemaItem::new("a", AlgType::Int)], vec![]).unwrap();
        let base = dag.proxy_base(t).unwrap();
        let n = dag.rowid(base, "n").unwrap();
        let exit = dag.project(n, vec![proj("a", "a"), proj("n", "n")]).unwrap();
        let proxy = dag.proxy(exit, exit, base, vec![], vec![Column::new("a")]).unwrap();
        let root = dag.project(proxy, vec![proj("x", "n")]).unwrap();

        assert_eq!(dissolve(&mut dag, root).unwrap(), 2);
        assert!(matches!(dag.op(proxy), Op::Project { .. }));
        assert!(matches!(dag.op(base), Op::RefTbl { .. }));
        assert_eq!(dissolve(&mut dag, root).unwrap(), 0);
    }
}
