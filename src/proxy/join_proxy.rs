//! Join proxy.
//!
//! A key equi-join on subdomains is the entry; the numbering that created
//! the join domain is the exit. The fragment between them is wrapped in a
//! [`Op::Proxy`] so that later phases may move the base of the fragment
//! around as one unit.
//!
//! ```text
//!        join                         project(above)
//!       /    \                             |
//!      |     body                        proxy  . . . exit_op, base_op
//!       \    /                             |
//!       rowid_num                   project(proxy)
//!                                          |
//!                         join(new_num_alias = num)
//!                          /                     \
//!                project(left)            project(entry)
//!                      |                         |
//!                      |                  join(body over exit_op)
//!                      |                         |
//!                      +----- rowid_new_num <- exit_op = project(exit)
//!                                   |
//!                               proxy_base
//!                                   |
//!                             project(base)
//!                                   |
//!                               rowid_num
//! ```
//!
//! Columns are matched by origin, so the proxy itself only adds columns
//! (`new_cols`) and never renames one.

use super::conflicts::{resolve_join_conflicts, Resolution};
use super::{Fragment, ProxyRule};
use crate::algebra::{proj, proj_identity, Column, Dag, NodeId, Op, ProjPair};
use crate::error::{OptResult, OptimizerError};
use crate::properties::{required_from, OriginId, PropKind, Properties};
use std::collections::{BTreeSet, HashSet};

pub struct JoinProxy;

/// The join column on the side whose domain contains the other one
fn entry_domain_side(dag: &Dag, props: &Properties, entry: NodeId) -> Option<(NodeId, Column)> {
    let Op::EqJoin { att1, att2 } = dag.op(entry) else {
        return None;
    };
    let (l, r) = (dag.child(entry, 0), dag.child(entry, 1));
    if props.is_key(dag, r, att2) && props.col_subdom(dag, (l, att1), (r, att2)) {
        Some((r, att2.clone()))
    } else {
        Some((l, att1.clone()))
    }
}

impl ProxyRule for JoinProxy {
    fn name(&self) -> &'static str {
        "join_proxy"
    }

    fn required(&self) -> &'static [PropKind] {
        &[PropKind::Key, PropKind::Dom, PropKind::Origin]
    }

    fn is_entry(&self, dag: &Dag, props: &Properties, p: NodeId) -> bool {
        let Op::EqJoin { att1, att2 } = dag.op(p) else {
            return false;
        };
        let (l, r) = (dag.child(p, 0), dag.child(p, 1));
        (props.is_key(dag, l, att1) && props.col_subdom(dag, (r, att2), (l, att1)))
            || (props.is_key(dag, r, att2) && props.col_subdom(dag, (l, att1), (r, att2)))
    }

    /// An unpartitioned numbering generating exactly the join domain
    fn is_exit(&self, dag: &Dag, props: &Properties, p: NodeId, entry: NodeId) -> bool {
        let res = match dag.op(p) {
            Op::RowId { res } | Op::RowNum { res, part: None, .. } => res,
            _ => return false,
        };
        let Some((side, att)) = entry_domain_side(dag, props, entry) else {
            return false;
        };
        match (props.dom(dag, p, res), props.dom(dag, side, &att)) {
            (Some(dom), Some(entry_dom)) => props.subdom(dom, entry_dom) && props.subdom(entry_dom, dom),
            _ => false,
        }
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
        // checking the usage of an ordered numbering is not worth it
        let num_col = match dag.op(exit) {
            Op::RowId { res } => res.clone(),
            Op::RowNum { .. } => return Ok(false),
            other => {
                return Err(OptimizerError::UnexpectedOperator {
                    node: exit,
                    expected: "rowid",
                    found: other.name(),
                })
            }
        };
        if resolve_join_conflicts(dag, props, &mut fragment)? == Resolution::Conflict {
            return Ok(false);
        }

        let origins = Properties::infer(dag, root, &[PropKind::Origin]);
        let att2 = match dag.op(entry) {
            Op::EqJoin { att2, .. } => att2.clone(),
            other => {
                return Err(OptimizerError::UnexpectedOperator {
                    node: entry,
                    expected: "eqjoin",
                    found: other.name(),
                })
            }
        };

        // exit columns with distinct origins form the base
        let mut base_cols: Vec<(Column, Option<OriginId>)> = Vec::new();
        let mut exit_proj = Vec::new();
        for col in dag.schema(exit).names() {
            let origin = origins.origin(dag, exit, col);
            match base_cols.iter().find(|(_, o)| origin.is_some() && *o == origin) {
                Some((base, _)) => exit_proj.push(proj(col.clone(), base.clone())),
                None => {
                    base_cols.push((col.clone(), origin));
                    if col != &num_col {
                        exit_proj.push(proj(col.clone(), col.clone()));
                    }
                }
            }
        }
        let base_proj = proj_identity(base_cols.iter().map(|(c, _)| c));

        let new_num_col = dag.fresh(&num_col);
        let new_num_col_alias = dag.fresh(&num_col);
        let num_col_alias = dag.fresh(&num_col);
        exit_proj.insert(0, proj(num_col.clone(), new_num_col.clone()));
        let left_proj = vec![
            proj(new_num_col_alias.clone(), new_num_col.clone()),
            proj(num_col_alias.clone(), num_col.clone()),
        ];

        // map entry columns onto base names; everything the body computes
        // gets a fresh name and becomes a new column of the proxy
        let entry_cols: Vec<Column> = dag.schema(entry).names().cloned().collect();
        let mut above_proj = vec![proj(att2.clone(), num_col.clone())];
        let mut entry_proj: Vec<ProjPair> = Vec::new();
        let mut proxy_proj: Vec<ProjPair> = Vec::new();
        let mut new_cols = Vec::new();
        let mut seed = BTreeSet::new();
        for col in entry_cols {
            if col == att2 {
                continue;
            }
            let origin = origins.origin(dag, entry, &col);
            let duplicate = entry_proj
                .iter()
                .find(|p| origin.is_some() && origins.origin(dag, entry, &p.old) == origin)
                .map(|p| p.new.clone());
            if let Some(earlier) = duplicate {
                above_proj.push(proj(col, earlier));
                continue;
            }
            match base_cols.iter().find(|(_, o)| origin.is_some() && *o == origin) {
                Some((exit_col, _)) => {
                    entry_proj.push(proj(exit_col.clone(), col.clone()));
                    proxy_proj.push(if exit_col == &num_col {
                        proj(exit_col.clone(), num_col_alias.clone())
                    } else {
                        proj(exit_col.clone(), exit_col.clone())
                    });
                    above_proj.push(proj(col, exit_col.clone()));
                }
                None => {
                    let renamed = dag.fresh(&col);
                    new_cols.push(renamed.clone());
                    entry_proj.push(proj(renamed.clone(), col.clone()));
                    proxy_proj.push(proj(renamed.clone(), renamed.clone()));
                    above_proj.push(proj(col.clone(), renamed));
                    seed.insert(col);
                }
            }
        }
        // the mapping join needs the numbering inside the body output
        if !entry_proj.iter().any(|p| p.new == num_col) {
            return Ok(false);
        }

        let based = dag.project(exit, base_proj)?;
        let base_op = dag.proxy_base(based)?;
        let num_op = dag.rowid(base_op, new_num_col)?;
        let exit_op = dag.project(num_op, exit_proj)?;
        for &parent in &fragment.exit_refs {
            if dag.children(parent).contains(&exit) {
                dag.relink(parent, exit, exit_op)?;
            }
        }

        // base columns the new columns are computed from
        let required = required_from(dag, entry, seed);
        let req_cols: Vec<Column> = match required.get(&base_op) {
            Some(need) => dag
                .schema(base_op)
                .names()
                .filter(|c| **c != num_col && need.contains(*c))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let Op::EqJoin { att1, att2 } = dag.op(entry).clone() else {
            return Ok(false);
        };
        let (l, r) = (dag.child(entry, 0), dag.child(entry, 1));
        let body = dag.eqjoin(l, r, att1, att2)?;
        let renamed = dag.project(body, entry_proj)?;
        let mapping = dag.project(num_op, left_proj)?;
        let outer = dag.eqjoin(mapping, renamed, new_num_col_alias, num_col)?;
        let entry_op = dag.project(outer, proxy_proj)?;

        let proxy_op = dag.proxy(entry_op, exit_op, base_op, new_cols, req_cols)?;
        let above = dag.project(proxy_op, above_proj)?;
        dag.replace(entry, above)?;

        checked.extend([outer, body]);
        Ok(true)
    }
}
