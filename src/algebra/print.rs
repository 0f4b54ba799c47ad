//! Indented plan dump. Shared nodes are printed once; later references show
//! up as `^#id`.

use super::column::{ProjPair, SortKey};
use super::dag::{Dag, NodeId};
use super::op::Op;
use std::collections::HashSet;
use std::fmt::Write;

/// Render the DAG below `root`
pub fn render(dag: &Dag, root: NodeId) -> String {
    let mut out = String::new();
    let mut printed = HashSet::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let indent = "  ".repeat(depth);
        if !printed.insert(id) {
            let _ = writeln!(out, "{indent}^{id}");
            continue;
        }
        let cols: Vec<_> = dag.schema(id).names().map(|c| c.as_str()).collect();
        let _ = writeln!(out, "{indent}{id} {} -> [{}]", label(dag.op(id)), cols.join(", "));
        for &c in dag.children(id).iter().rev() {
            stack.push((c, depth + 1));
        }
    }
    out
}

fn proj_list(list: &[ProjPair]) -> String {
    list.iter()
        .map(|p| {
            if p.new == p.old {
                p.new.to_string()
            } else {
                format!("{}:{}", p.new, p.old)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn sort_list(sort: &[SortKey]) -> String {
    sort.iter()
        .map(|s| if s.desc { format!("{} desc", s.col) } else { s.col.to_string() })
        .collect::<Vec<_>>()
        .join(", ")
}

/// One-line description of an operator
pub fn label(op: &Op) -> String {
    let name = op.name();
    match op {
        Op::LitTbl { tuples, .. } => format!("{name} ({} tuples)", tuples.len()),
        Op::RefTbl { name: table, .. } => format!("{name} \"{table}\""),
        Op::Attach { res, value } => format!("{name} ({res} = {value})"),
        Op::EqJoin { att1, att2 } | Op::SemiJoin { att1, att2 } => format!("{name} ({att1} = {att2})"),
        Op::ThetaJoin { preds } => {
            let preds: Vec<_> = preds
                .iter()
                .map(|p| format!("{} {} {}", p.left, p.comp.symbol(), p.right))
                .collect();
            format!("{name} ({})", preds.join(" and "))
        }
        Op::Project { proj } => format!("{name} ({})", proj_list(proj)),
        Op::Select { att } => format!("{name} ({att})"),
        Op::PosSelect { pos, sort, part } => match part {
            Some(part) => format!("{name} ({pos}; {} / {part})", sort_list(sort)),
            None => format!("{name} ({pos}; {})", sort_list(sort)),
        },
        Op::Fun { kind, res, args } => {
            let args: Vec<_> = args.iter().map(ToString::to_string).collect();
            format!("{name} ({res} = {kind:?}({}))", args.join(", "))
        }
        Op::Compare { comp, res, att1, att2 } => format!("{name} ({res} = {att1} {} {att2})", comp.symbol()),
        Op::Bool { op, res, att1, att2 } => format!("{name} ({res} = {att1} {op:?} {att2})"),
        Op::Not { res, att } => format!("{name} ({res} = not {att})"),
        Op::Aggr { kind, res, att, part } => {
            let att = att.as_ref().map(ToString::to_string).unwrap_or_default();
            match part {
                Some(part) => format!("{name} ({res} = {kind:?}({att}) / {part})"),
                None => format!("{name} ({res} = {kind:?}({att}))"),
            }
        }
        Op::RowNum { res, sort, part } => match part {
            Some(part) => format!("{name} ({res}: <{}> / {part})", sort_list(sort)),
            None => format!("{name} ({res}: <{}>)", sort_list(sort)),
        },
        Op::RowRank { res, sort } | Op::Rank { res, sort } => format!("{name} ({res}: <{}>)", sort_list(sort)),
        Op::RowId { res } => format!("{name} ({res})"),
        Op::TypeTest { res, att, ty } | Op::Cast { res, att, ty } => format!("{name} ({res} = {att} as {ty})"),
        Op::TypeAssert { att, ty } => format!("{name} ({att}: {ty})"),
        Op::DocTbl { res, att } => format!("{name} ({res} = doc({att}))"),
        Op::Step { axis, test, iter, item } => format!("{name} ({axis:?}::{test}; {iter}, {item})"),
        Op::StepJoin { axis, test, item, res } => format!("{name} ({axis:?}::{test}; {res} from {item})"),
        Op::Twig { kind, iter, item } => format!("{name} ({kind:?}; {iter}, {item})"),
        Op::CondErr { att, msg } => format!("{name} ({att}: \"{msg}\")"),
        Op::Serialize { pos, item } => format!("{name} ({pos}, {item})"),
        Op::Proxy {
            exit,
            base,
            new_cols,
            req_cols,
        } => {
            let new: Vec<_> = new_cols.iter().map(ToString::to_string).collect();
            let req: Vec<_> = req_cols.iter().map(ToString::to_string).collect();
            format!(
                "{name} (exit {exit}, base {base}; new [{}], req [{}])",
                new.join(", "),
                req.join(", ")
            )
        }
        Op::InternalJoin { lproj, rproj } => format!("{name} ([{}] = [{}])", proj_list(lproj), proj_list(rproj)),
        Op::ThetaJoinOpt { preds } => {
            let preds: Vec<_> = preds
                .iter()
                .map(|p| {
                    let res = p.res.as_ref().map(|r| format!(" -> {r}")).unwrap_or_default();
                    let kind = if p.persist { "" } else { "?" };
                    format!("{kind}{} {} {}{res}", p.left, p.comp.symbol(), p.right)
                })
                .collect();
            format!("{name} ({})", preds.join(", "))
        }
        _ => name.to_string(),
    }
}
