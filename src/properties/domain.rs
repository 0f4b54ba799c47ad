//! Value domains.
//!
//! Every column is assigned a domain identifier. Domains form a graph of
//! subset edges; `subdom(a, b)` holds when all values of `a` are guaranteed
//! to occur in `b`. The `EMPTY` domain is a subdomain of every domain.
//!
//! ```text
//! select(R)            all columns become subdomains of R's
//! eqjoin(R, S; a = b)  a and b share dom(a) ∩ dom(b); R keeps its domains
//!                      when dom(a) ⊆ dom(b)
//! union(R, S)          dom(R.c) ∪ dom(S.c), a new superdomain
//! ```

use super::Properties;
use crate::algebra::{Column, Dag, NodeId, Op};
use std::collections::HashMap;

/// Domain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainId(u32);

impl DomainId {
    pub const EMPTY: DomainId = DomainId(0);
}

/// Subset relation between domains
#[derive(Debug, Clone)]
pub struct DomainGraph {
    /// Direct superdomains of each domain
    supers: Vec<Vec<DomainId>>,
}

impl Default for DomainGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainGraph {
    pub fn new() -> Self {
        DomainGraph {
            supers: vec![Vec::new()],
        }
    }

    pub fn len(&self) -> usize {
        self.supers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supers.len() <= 1
    }

    /// An unrelated domain
    pub fn fresh(&mut self) -> DomainId {
        let id = DomainId(self.supers.len() as u32);
        self.supers.push(Vec::new());
        id
    }

    /// A new domain contained in `of`
    pub fn sub(&mut self, of: DomainId) -> DomainId {
        let id = self.fresh();
        self.supers[id.0 as usize].push(of);
        id
    }

    /// Domain of the values common to `a` and `b`
    pub fn intersect(&mut self, a: DomainId, b: DomainId) -> DomainId {
        if self.subdom(a, b) {
            return a;
        }
        if self.subdom(b, a) {
            return b;
        }
        let id = self.fresh();
        self.supers[id.0 as usize].extend([a, b]);
        id
    }

    /// Smallest known domain containing `a` and `b`
    pub fn union(&mut self, a: DomainId, b: DomainId) -> DomainId {
        if self.subdom(a, b) {
            return b;
        }
        if self.subdom(b, a) {
            return a;
        }
        let id = self.fresh();
        self.supers[a.0 as usize].push(id);
        self.supers[b.0 as usize].push(id);
        id
    }

    /// Whether `a` is contained in `b`
    pub fn subdom(&self, a: DomainId, b: DomainId) -> bool {
        if a == b || a == DomainId::EMPTY {
            return true;
        }
        let mut seen = vec![false; self.supers.len()];
        let mut stack = vec![a];
        while let Some(d) = stack.pop() {
            if d == b {
                return true;
            }
            let i = d.0 as usize;
            if i >= seen.len() || seen[i] {
                continue;
            }
            seen[i] = true;
            stack.extend(self.supers[i].iter().copied());
        }
        false
    }
}

type Doms = HashMap<Column, DomainId>;

pub(super) fn infer(dag: &Dag, order: &[NodeId], props: &mut Properties) {
    for &id in order {
        let doms = doms_of(dag, id, props);
        props.doms.insert(id, doms);
    }
}

/// Domain of a child column; columns without a record get a fresh domain
fn dom(props: &mut Properties, node: NodeId, col: &Column) -> DomainId {
    if let Some(&d) = props.doms.get(&node).and_then(|d| d.get(col)) {
        return d;
    }
    let d = props.domains.fresh();
    props.doms.entry(node).or_default().insert(col.clone(), d);
    d
}

fn copy_all(dag: &Dag, props: &mut Properties, from: NodeId, into: &mut Doms) {
    for col in dag.schema(from).names() {
        let d = dom(props, from, col);
        into.insert(col.clone(), d);
    }
}

fn sub_all(dag: &Dag, props: &mut Properties, from: NodeId, into: &mut Doms) {
    for col in dag.schema(from).names() {
        let d = dom(props, from, col);
        let s = props.domains.sub(d);
        into.insert(col.clone(), s);
    }
}

fn doms_of(dag: &Dag, id: NodeId, props: &mut Properties) -> Doms {
    let mut doms = Doms::new();
    let child = |i: usize| dag.child(id, i);
    let card = |props: &Properties, n: NodeId| props.card.get(&n).copied();

    match dag.op(id) {
        Op::LitTbl { .. } | Op::RefTbl { .. } => {
            let empty = card(props, id) == Some(0);
            for col in dag.schema(id).names() {
                let d = if empty { DomainId::EMPTY } else { props.domains.fresh() };
                doms.insert(col.clone(), d);
            }
        }
        Op::EmptyTbl { .. } => {
            for col in dag.schema(id).names() {
                doms.insert(col.clone(), DomainId::EMPTY);
            }
        }

        Op::Distinct
        | Op::TypeAssert { .. }
        | Op::Proxy { .. }
        | Op::ProxyBase
        | Op::Roots
        | Op::CondErr { .. } => copy_all(dag, props, child(0), &mut doms),

        Op::Attach { .. }
        | Op::Fun { .. }
        | Op::Compare { .. }
        | Op::Bool { .. }
        | Op::Not { .. }
        | Op::RowNum { .. }
        | Op::RowRank { .. }
        | Op::Rank { .. }
        | Op::RowId { .. }
        | Op::TypeTest { .. }
        | Op::Cast { .. }
        | Op::DocTbl { .. } => {
            copy_all(dag, props, child(0), &mut doms);
            if let Some(res) = dag.op(id).res() {
                let d = props.domains.fresh();
                doms.insert(res.clone(), d);
            }
        }

        Op::Project { proj } => {
            for p in proj {
                let d = dom(props, child(0), &p.old);
                doms.insert(p.new.clone(), d);
            }
        }

        Op::Select { .. } | Op::PosSelect { .. } | Op::Difference => sub_all(dag, props, child(0), &mut doms),

        Op::Cross => {
            let (l, r) = (child(0), child(1));
            // a side is not filtered when the other side is known non-empty
            if card(props, r).is_some_and(|c| c > 0) {
                copy_all(dag, props, l, &mut doms);
            } else {
                sub_all(dag, props, l, &mut doms);
            }
            if card(props, l).is_some_and(|c| c > 0) {
                copy_all(dag, props, r, &mut doms);
            } else {
                sub_all(dag, props, r, &mut doms);
            }
        }

        Op::EqJoin { att1, att2 } => {
            let (l, r) = (child(0), child(1));
            let dl = dom(props, l, att1);
            let dr = dom(props, r, att2);
            let joined = props.domains.intersect(dl, dr);
            if props.domains.subdom(dl, dr) {
                copy_all(dag, props, l, &mut doms);
            } else {
                sub_all(dag, props, l, &mut doms);
            }
            if props.domains.subdom(dr, dl) {
                copy_all(dag, props, r, &mut doms);
            } else {
                sub_all(dag, props, r, &mut doms);
            }
            doms.insert(att1.clone(), joined);
            doms.insert(att2.clone(), joined);
        }

        Op::SemiJoin { att1, att2 } => {
            let (l, r) = (child(0), child(1));
            let dl = dom(props, l, att1);
            let dr = dom(props, r, att2);
            let joined = props.domains.intersect(dl, dr);
            if props.domains.subdom(dl, dr) {
                copy_all(dag, props, l, &mut doms);
            } else {
                sub_all(dag, props, l, &mut doms);
            }
            doms.insert(att1.clone(), joined);
        }

        Op::InternalJoin { lproj, rproj } => {
            let (l, r) = (child(0), child(1));
            let (Some(lf), Some(rf)) = (lproj.first(), rproj.first()) else {
                return doms;
            };
            let dl = dom(props, l, &lf.old);
            let dr = dom(props, r, &rf.old);
            let joined = props.domains.intersect(dl, dr);
            let keep_l = props.domains.subdom(dl, dr);
            let keep_r = props.domains.subdom(dr, dl);
            for p in &lproj[1..] {
                let d = dom(props, l, &p.old);
                let d = if keep_l { d } else { props.domains.sub(d) };
                doms.insert(p.new.clone(), d);
            }
            for p in &rproj[1..] {
                let d = dom(props, r, &p.old);
                let d = if keep_r { d } else { props.domains.sub(d) };
                doms.insert(p.new.clone(), d);
            }
            doms.insert(lf.new.clone(), joined);
        }

        Op::ThetaJoin { .. } | Op::ThetaJoinOpt { .. } => {
            let mut all = Doms::new();
            sub_all(dag, props, child(0), &mut all);
            sub_all(dag, props, child(1), &mut all);
            for col in dag.schema(id).names() {
                let d = match all.get(col) {
                    Some(&d) => d,
                    None => props.domains.fresh(),
                };
                doms.insert(col.clone(), d);
            }
        }

        Op::DisjUnion => {
            let (l, r) = (child(0), child(1));
            for col in dag.schema(id).names() {
                let dl = dom(props, l, col);
                let dr = dom(props, r, col);
                let d = props.domains.union(dl, dr);
                doms.insert(col.clone(), d);
            }
        }

        Op::Intersect => {
            let (l, r) = (child(0), child(1));
            for col in dag.schema(id).names() {
                let dl = dom(props, l, col);
                let dr = dom(props, r, col);
                let d = props.domains.intersect(dl, dr);
                doms.insert(col.clone(), d);
            }
        }

        Op::Aggr { res, part, .. } => {
            if let Some(part) = part {
                let d = dom(props, child(0), part);
                doms.insert(part.clone(), d);
            }
            let d = props.domains.fresh();
            doms.insert(res.clone(), d);
        }

        Op::Step { iter, item, .. } => {
            let d = dom(props, child(1), iter);
            let s = props.domains.sub(d);
            doms.insert(iter.clone(), s);
            let f = props.domains.fresh();
            doms.insert(item.clone(), f);
        }
        Op::StepJoin { res, .. } => {
            sub_all(dag, props, child(1), &mut doms);
            let f = props.domains.fresh();
            doms.insert(res.clone(), f);
        }
        Op::Twig { iter, item, .. } => {
            let d = dom(props, child(0), iter);
            let s = props.domains.sub(d);
            doms.insert(iter.clone(), s);
            let f = props.domains.fresh();
            doms.insert(item.clone(), f);
        }
        Op::Serialize { .. } => {
            for col in dag.schema(id).names() {
                let d = dom(props, child(1), col);
                doms.insert(col.clone(), d);
            }
        }
        Op::Fragment | Op::FragUnion | Op::EmptyFrag => {}
    }
    doms
}

#[cfg(test)]
mod tests {
    use super::super::PropKind;
    use super::*;
    use crate::algebra::{proj, AlgType, SchemaItem};

    #[test]
    fn test_graph_subdomain_rules() {
        let mut g = DomainGraph::new();
        let a = g.fresh();
        let b = g.fresh();
        let s = g.sub(a);
        let u = g.union(a, b);
        assert!(g.subdom(s, a));
        assert!(g.subdom(s, u));
        assert!(g.subdom(b, u));
        assert!(!g.subdom(a, b));
        assert!(g.subdom(DomainId::EMPTY, b));
        let i = g.intersect(a, b);
        assert!(g.subdom(i, a) && g.subdom(i, b));
        assert_eq!(g.intersect(s, a), s);
    }

    #[test]
    fn test_select_and_project_domains() {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl(
                "t",
                vec![SchemaItem::new("a", AlgType::Bln), SchemaItem::new("b", AlgType::Int)],
                vec![],
            )
            .unwrap();
        let s = dag.select(t, "a").unwrap();
        let p = dag.project(s, vec![proj("x", "b")]).unwrap();
        let props = Properties::infer(&dag, p, &[PropKind::Dom]);
        let b = Column::new("b");
        let x = Column::new("x");
        assert!(props.col_subdom(&dag, (p, &x), (t, &b)));
        assert!(!props.col_subdom(&dag, (t, &b), (p, &x)));
        assert!(props.col_subdom(&dag, (p, &x), (s, &b)));
    }

    #[test]
    fn test_eqjoin_on_foreign_key_keeps_domains() {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl("t", vec![SchemaItem::new("a", AlgType::Int)], vec![])
            .unwrap();
        let d = dag.distinct(t).unwrap();
        let s = dag.select(t, "a").unwrap();
        let sub = dag.project(s, vec![proj("b", "a")]).unwrap();
        let j = dag.eqjoin(sub, d, "b", "a").unwrap();
        let props = Properties::infer(&dag, j, &[PropKind::Dom]);
        // every b finds a partner, so the left side is not filtered
        assert!(props.col_subdom(&dag, (sub, &Column::new("b")), (j, &Column::new("b"))));
    }
}
