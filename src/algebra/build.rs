//! Mnemonic constructors.
//!
//! Thin wrappers around [`Dag::add`] so rewrites read like the algebra they
//! build: `dag.project(dag.eqjoin(l, r, a, b)?, list)`.

use super::column::{AlgType, Atom, Column, Comparison, ProjPair, SchemaItem, SortKey};
use super::dag::{Dag, NodeId};
use super::op::{AggrKind, Axis, BoolOp, FunKind, JoinPred, Op, TjPred, TwigKind};
use crate::error::OptResult;

impl Dag {
    pub fn lit_tbl(&mut self, cols: Vec<SchemaItem>, tuples: Vec<Vec<Atom>>) -> OptResult<NodeId> {
        self.add(Op::LitTbl { cols, tuples }, vec![])
    }

    pub fn empty_tbl(&mut self, cols: Vec<SchemaItem>) -> OptResult<NodeId> {
        self.add(Op::EmptyTbl { cols }, vec![])
    }

    pub fn ref_tbl(
        &mut self,
        name: &str,
        cols: Vec<SchemaItem>,
        keys: Vec<Vec<Column>>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::RefTbl {
                name: name.to_string(),
                cols,
                keys,
            },
            vec![],
        )
    }

    pub fn attach(&mut self, child: NodeId, res: impl Into<Column>, value: Atom) -> OptResult<NodeId> {
        self.add(
            Op::Attach {
                res: res.into(),
                value,
            },
            vec![child],
        )
    }

    pub fn cross(&mut self, l: NodeId, r: NodeId) -> OptResult<NodeId> {
        self.add(Op::Cross, vec![l, r])
    }

    pub fn eqjoin(
        &mut self,
        l: NodeId,
        r: NodeId,
        att1: impl Into<Column>,
        att2: impl Into<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::EqJoin {
                att1: att1.into(),
                att2: att2.into(),
            },
            vec![l, r],
        )
    }

    pub fn semijoin(
        &mut self,
        l: NodeId,
        r: NodeId,
        att1: impl Into<Column>,
        att2: impl Into<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::SemiJoin {
                att1: att1.into(),
                att2: att2.into(),
            },
            vec![l, r],
        )
    }

    pub fn thetajoin(&mut self, l: NodeId, r: NodeId, preds: Vec<JoinPred>) -> OptResult<NodeId> {
        self.add(Op::ThetaJoin { preds }, vec![l, r])
    }

    pub fn project(&mut self, child: NodeId, proj: Vec<ProjPair>) -> OptResult<NodeId> {
        self.add(Op::Project { proj }, vec![child])
    }

    pub fn select(&mut self, child: NodeId, att: impl Into<Column>) -> OptResult<NodeId> {
        self.add(Op::Select { att: att.into() }, vec![child])
    }

    pub fn pos_select(
        &mut self,
        child: NodeId,
        pos: i64,
        sort: Vec<SortKey>,
        part: Option<Column>,
    ) -> OptResult<NodeId> {
        self.add(Op::PosSelect { pos, sort, part }, vec![child])
    }

    pub fn union(&mut self, l: NodeId, r: NodeId) -> OptResult<NodeId> {
        self.add(Op::DisjUnion, vec![l, r])
    }

    pub fn intersect(&mut self, l: NodeId, r: NodeId) -> OptResult<NodeId> {
        self.add(Op::Intersect, vec![l, r])
    }

    pub fn difference(&mut self, l: NodeId, r: NodeId) -> OptResult<NodeId> {
        self.add(Op::Difference, vec![l, r])
    }

    pub fn distinct(&mut self, child: NodeId) -> OptResult<NodeId> {
        self.add(Op::Distinct, vec![child])
    }

    pub fn fun(
        &mut self,
        child: NodeId,
        kind: FunKind,
        res: impl Into<Column>,
        args: Vec<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::Fun {
                kind,
                res: res.into(),
                args,
            },
            vec![child],
        )
    }

    pub fn compare(
        &mut self,
        child: NodeId,
        comp: Comparison,
        res: impl Into<Column>,
        att1: impl Into<Column>,
        att2: impl Into<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::Compare {
                comp,
                res: res.into(),
                att1: att1.into(),
                att2: att2.into(),
            },
            vec![child],
        )
    }

    pub fn bool_op(
        &mut self,
        child: NodeId,
        op: BoolOp,
        res: impl Into<Column>,
        att1: impl Into<Column>,
        att2: impl Into<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::Bool {
                op,
                res: res.into(),
                att1: att1.into(),
                att2: att2.into(),
            },
            vec![child],
        )
    }

    pub fn not(&mut self, child: NodeId, res: impl Into<Column>, att: impl Into<Column>) -> OptResult<NodeId> {
        self.add(
            Op::Not {
                res: res.into(),
                att: att.into(),
            },
            vec![child],
        )
    }

    pub fn aggr(
        &mut self,
        child: NodeId,
        kind: AggrKind,
        res: impl Into<Column>,
        att: Option<Column>,
        part: Option<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::Aggr {
                kind,
                res: res.into(),
                att,
                part,
            },
            vec![child],
        )
    }

    pub fn rownum(
        &mut self,
        child: NodeId,
        res: impl Into<Column>,
        sort: Vec<SortKey>,
        part: Option<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::RowNum {
                res: res.into(),
                sort,
                part,
            },
            vec![child],
        )
    }

    pub fn rowrank(&mut self, child: NodeId, res: impl Into<Column>, sort: Vec<SortKey>) -> OptResult<NodeId> {
        self.add(Op::RowRank { res: res.into(), sort }, vec![child])
    }

    pub fn rank(&mut self, child: NodeId, res: impl Into<Column>, sort: Vec<SortKey>) -> OptResult<NodeId> {
        self.add(Op::Rank { res: res.into(), sort }, vec![child])
    }

    pub fn rowid(&mut self, child: NodeId, res: impl Into<Column>) -> OptResult<NodeId> {
        self.add(Op::RowId { res: res.into() }, vec![child])
    }

    pub fn type_test(
        &mut self,
        child: NodeId,
        res: impl Into<Column>,
        att: impl Into<Column>,
        ty: AlgType,
    ) -> OptResult<NodeId> {
        self.add(
            Op::TypeTest {
                res: res.into(),
                att: att.into(),
                ty,
            },
            vec![child],
        )
    }

    pub fn type_assert(&mut self, child: NodeId, att: impl Into<Column>, ty: AlgType) -> OptResult<NodeId> {
        self.add(Op::TypeAssert { att: att.into(), ty }, vec![child])
    }

    pub fn cast(
        &mut self,
        child: NodeId,
        res: impl Into<Column>,
        att: impl Into<Column>,
        ty: AlgType,
    ) -> OptResult<NodeId> {
        self.add(
            Op::Cast {
                res: res.into(),
                att: att.into(),
                ty,
            },
            vec![child],
        )
    }

    pub fn doc_tbl(&mut self, child: NodeId, res: impl Into<Column>, att: impl Into<Column>) -> OptResult<NodeId> {
        self.add(
            Op::DocTbl {
                res: res.into(),
                att: att.into(),
            },
            vec![child],
        )
    }

    pub fn step(
        &mut self,
        frag: NodeId,
        ctx: NodeId,
        axis: Axis,
        test: &str,
        iter: impl Into<Column>,
        item: impl Into<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::Step {
                axis,
                test: test.to_string(),
                iter: iter.into(),
                item: item.into(),
            },
            vec![frag, ctx],
        )
    }

    pub fn step_join(
        &mut self,
        frag: NodeId,
        ctx: NodeId,
        axis: Axis,
        test: &str,
        item: impl Into<Column>,
        res: impl Into<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::StepJoin {
                axis,
                test: test.to_string(),
                item: item.into(),
                res: res.into(),
            },
            vec![frag, ctx],
        )
    }

    pub fn twig(
        &mut self,
        content: NodeId,
        kind: TwigKind,
        iter: impl Into<Column>,
        item: impl Into<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::Twig {
                kind,
                iter: iter.into(),
                item: item.into(),
            },
            vec![content],
        )
    }

    pub fn roots(&mut self, twig: NodeId) -> OptResult<NodeId> {
        self.add(Op::Roots, vec![twig])
    }

    pub fn fragment(&mut self, twig: NodeId) -> OptResult<NodeId> {
        self.add(Op::Fragment, vec![twig])
    }

    pub fn frag_union(&mut self, l: NodeId, r: NodeId) -> OptResult<NodeId> {
        self.add(Op::FragUnion, vec![l, r])
    }

    pub fn empty_frag(&mut self) -> OptResult<NodeId> {
        self.add(Op::EmptyFrag, vec![])
    }

    pub fn cond_err(
        &mut self,
        rel: NodeId,
        cond: NodeId,
        att: impl Into<Column>,
        msg: &str,
    ) -> OptResult<NodeId> {
        self.add(
            Op::CondErr {
                att: att.into(),
                msg: msg.to_string(),
            },
            vec![rel, cond],
        )
    }

    pub fn serialize(
        &mut self,
        frag: NodeId,
        rel: NodeId,
        pos: impl Into<Column>,
        item: impl Into<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::Serialize {
                pos: pos.into(),
                item: item.into(),
            },
            vec![frag, rel],
        )
    }

    pub fn proxy(
        &mut self,
        child: NodeId,
        exit: NodeId,
        base: NodeId,
        new_cols: Vec<Column>,
        req_cols: Vec<Column>,
    ) -> OptResult<NodeId> {
        self.add(
            Op::Proxy {
                exit,
                base,
                new_cols,
                req_cols,
            },
            vec![child],
        )
    }

    pub fn proxy_base(&mut self, child: NodeId) -> OptResult<NodeId> {
        self.add(Op::ProxyBase, vec![child])
    }

    pub fn internal_join(
        &mut self,
        l: NodeId,
        r: NodeId,
        lproj: Vec<ProjPair>,
        rproj: Vec<ProjPair>,
    ) -> OptResult<NodeId> {
        self.add(Op::InternalJoin { lproj, rproj }, vec![l, r])
    }

    pub fn thetajoin_opt(&mut self, l: NodeId, r: NodeId, preds: Vec<TjPred>) -> OptResult<NodeId> {
        self.add(Op::ThetaJoinOpt { preds }, vec![l, r])
    }
}
