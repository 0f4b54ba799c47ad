//! Operator kinds and their schema rules.
//!
//! `Op` is a closed sum type with one variant per operator kind. Children are
//! not part of the variant, they live in the owning [`Node`](super::Node);
//! the variant only carries the kind-specific payload.

use super::column::{AlgType, Atom, Column, Comparison, ProjPair, Schema, SchemaItem, SortKey};
use super::dag::NodeId;
use crate::error::{OptResult, OptimizerError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 1:1 functions over columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Contains,
}

/// Binary boolean connectives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOp {
    And,
    Or,
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggrKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    All,
    Seqty1,
}

/// Navigation axes of the staircase join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    SelfAxis,
}

/// Node constructors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwigKind {
    Element,
    Attribute,
    Text,
    Comment,
    Document,
}

/// Predicate of a plain theta-join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPred {
    pub comp: Comparison,
    pub left: Column,
    pub right: Column,
}

/// Predicate of the internal theta-join used while hoisting.
///
/// A persistent predicate filters; a non-persistent one only computes its
/// boolean result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TjPred {
    pub comp: Comparison,
    pub left: Column,
    pub right: Column,
    pub res: Option<Column>,
    pub persist: bool,
    pub left_vis: bool,
    pub right_vis: bool,
    pub res_vis: bool,
}

impl TjPred {
    /// A filtering predicate that keeps both inputs visible
    pub fn persistent(comp: Comparison, left: Column, right: Column) -> Self {
        TjPred {
            comp,
            left,
            right,
            res: None,
            persist: true,
            left_vis: true,
            right_vis: true,
            res_vis: false,
        }
    }
}

/// Operator payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Op {
    #[serde(rename = "lit_tbl")]
    LitTbl {
        cols: Vec<SchemaItem>,
        tuples: Vec<Vec<Atom>>,
    },
    #[serde(rename = "empty_tbl")]
    EmptyTbl {
        cols: Vec<SchemaItem>,
    },
    #[serde(rename = "ref_tbl")]
    RefTbl {
        name: String,
        cols: Vec<SchemaItem>,
        #[serde(default)]
        keys: Vec<Vec<Column>>,
    },
    #[serde(rename = "attach")]
    Attach {
        res: Column,
        value: Atom,
    },
    #[serde(rename = "cross")]
    Cross,
    #[serde(rename = "eqjoin")]
    EqJoin {
        att1: Column,
        att2: Column,
    },
    #[serde(rename = "semijoin")]
    SemiJoin {
        att1: Column,
        att2: Column,
    },
    #[serde(rename = "thetajoin")]
    ThetaJoin {
        preds: Vec<JoinPred>,
    },
    #[serde(rename = "project")]
    Project {
        proj: Vec<ProjPair>,
    },
    #[serde(rename = "select")]
    Select {
        att: Column,
    },
    #[serde(rename = "pos_select")]
    PosSelect {
        pos: i64,
        sort: Vec<SortKey>,
        part: Option<Column>,
    },
    #[serde(rename = "union")]
    DisjUnion,
    #[serde(rename = "intersect")]
    Intersect,
    #[serde(rename = "difference")]
    Difference,
    #[serde(rename = "distinct")]
    Distinct,
    #[serde(rename = "fun")]
    Fun {
        kind: FunKind,
        res: Column,
        args: Vec<Column>,
    },
    #[serde(rename = "compare")]
    Compare {
        comp: Comparison,
        res: Column,
        att1: Column,
        att2: Column,
    },
    #[serde(rename = "bool")]
    Bool {
        #[serde(rename = "kind")]
        op: BoolOp,
        res: Column,
        att1: Column,
        att2: Column,
    },
    #[serde(rename = "not")]
    Not {
        res: Column,
        att: Column,
    },
    #[serde(rename = "aggr")]
    Aggr {
        kind: AggrKind,
        res: Column,
        att: Option<Column>,
        part: Option<Column>,
    },
    #[serde(rename = "rownum")]
    RowNum {
        res: Column,
        sort: Vec<SortKey>,
        part: Option<Column>,
    },
    #[serde(rename = "rowrank")]
    RowRank {
        res: Column,
        sort: Vec<SortKey>,
    },
    #[serde(rename = "rank")]
    Rank {
        res: Column,
        sort: Vec<SortKey>,
    },
    /// Row numbering without partition or order (row identity)
    #[serde(rename = "rowid")]
    RowId {
        res: Column,
    },
    #[serde(rename = "type")]
    TypeTest {
        res: Column,
        att: Column,
        ty: AlgType,
    },
    #[serde(rename = "type_assert")]
    TypeAssert {
        att: Column,
        ty: AlgType,
    },
    #[serde(rename = "cast")]
    Cast {
        res: Column,
        att: Column,
        ty: AlgType,
    },
    #[serde(rename = "doc_tbl")]
    DocTbl {
        res: Column,
        att: Column,
    },
    /// Staircase join: children `[fragment, context]`, output `(iter, item)`
    #[serde(rename = "step")]
    Step {
        axis: Axis,
        test: String,
        iter: Column,
        item: Column,
    },
    /// Duplicate-preserving step: every context row is kept and extended
    /// with `res`, once per result node
    #[serde(rename = "step_join")]
    StepJoin {
        axis: Axis,
        test: String,
        item: Column,
        res: Column,
    },
    #[serde(rename = "twig")]
    Twig {
        kind: TwigKind,
        iter: Column,
        item: Column,
    },
    #[serde(rename = "roots")]
    Roots,
    #[serde(rename = "fragment")]
    Fragment,
    #[serde(rename = "frag_union")]
    FragUnion,
    #[serde(rename = "empty_frag")]
    EmptyFrag,
    #[serde(rename = "cond_err")]
    CondErr {
        att: Column,
        msg: String,
    },
    #[serde(rename = "serialize")]
    Serialize {
        pos: Column,
        item: Column,
    },
    /// Relocatable fragment marker; `exit` and `base` are references, not
    /// children
    #[serde(rename = "proxy")]
    Proxy {
        exit: NodeId,
        base: NodeId,
        new_cols: Vec<Column>,
        req_cols: Vec<Column>,
    },
    #[serde(rename = "proxy_base")]
    ProxyBase,
    /// Equi-join with per-side renaming lists. The first entry of each list
    /// binds the shared output join column.
    #[serde(rename = "internal_join")]
    InternalJoin {
        lproj: Vec<ProjPair>,
        rproj: Vec<ProjPair>,
    },
    #[serde(rename = "thetajoin_opt")]
    ThetaJoinOpt {
        preds: Vec<TjPred>,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::LitTbl { .. } => "lit_tbl",
            Op::EmptyTbl { .. } => "empty_tbl",
            Op::RefTbl { .. } => "ref_tbl",
            Op::Attach { .. } => "attach",
            Op::Cross => "cross",
            Op::EqJoin { .. } => "eqjoin",
            Op::SemiJoin { .. } => "semijoin",
            Op::ThetaJoin { .. } => "thetajoin",
            Op::Project { .. } => "project",
            Op::Select { .. } => "select",
            Op::PosSelect { .. } => "pos_select",
            Op::DisjUnion => "union",
            Op::Intersect => "intersect",
            Op::Difference => "difference",
            Op::Distinct => "distinct",
            Op::Fun { .. } => "fun",
            Op::Compare { .. } => "compare",
            Op::Bool { .. } => "bool",
            Op::Not { .. } => "not",
            Op::Aggr { .. } => "aggr",
            Op::RowNum { .. } => "rownum",
            Op::RowRank { .. } => "rowrank",
            Op::Rank { .. } => "rank",
            Op::RowId { .. } => "rowid",
            Op::TypeTest { .. } => "type",
            Op::TypeAssert { .. } => "type_assert",
            Op::Cast { .. } => "cast",
            Op::DocTbl { .. } => "doc_tbl",
            Op::Step { .. } => "step",
            Op::StepJoin { .. } => "step_join",
            Op::Twig { .. } => "twig",
            Op::Roots => "roots",
            Op::Fragment => "fragment",
            Op::FragUnion => "frag_union",
            Op::EmptyFrag => "empty_frag",
            Op::CondErr { .. } => "cond_err",
            Op::Serialize { .. } => "serialize",
            Op::Proxy { .. } => "proxy",
            Op::ProxyBase => "proxy_base",
            Op::InternalJoin { .. } => "internal_join",
            Op::ThetaJoinOpt { .. } => "thetajoin_opt",
        }
    }

    /// Number of children the kind takes
    pub fn arity(&self) -> usize {
        match self {
            Op::LitTbl { .. } | Op::EmptyTbl { .. } | Op::RefTbl { .. } | Op::EmptyFrag => 0,
            Op::Cross
            | Op::EqJoin { .. }
            | Op::SemiJoin { .. }
            | Op::ThetaJoin { .. }
            | Op::DisjUnion
            | Op::Intersect
            | Op::Difference
            | Op::Step { .. }
            | Op::StepJoin { .. }
            | Op::FragUnion
            | Op::CondErr { .. }
            | Op::Serialize { .. }
            | Op::InternalJoin { .. }
            | Op::ThetaJoinOpt { .. } => 2,
            _ => 1,
        }
    }

    /// The result column of an operator that extends its input by exactly
    /// one column
    pub fn res(&self) -> Option<&Column> {
        match self {
            Op::Attach { res, .. }
            | Op::Fun { res, .. }
            | Op::Compare { res, .. }
            | Op::Bool { res, .. }
            | Op::Not { res, .. }
            | Op::RowNum { res, .. }
            | Op::RowRank { res, .. }
            | Op::Rank { res, .. }
            | Op::RowId { res }
            | Op::TypeTest { res, .. }
            | Op::Cast { res, .. }
            | Op::DocTbl { res, .. }
            | Op::StepJoin { res, .. } => Some(res),
            _ => None,
        }
    }

    /// Input columns a unary operator reads (beyond passing them through)
    pub fn used_columns(&self) -> Vec<Column> {
        let sort_cols = |sort: &[SortKey]| sort.iter().map(|s| s.col.clone()).collect::<Vec<_>>();
        match self {
            Op::Select { att }
            | Op::Not { att, .. }
            | Op::TypeTest { att, .. }
            | Op::TypeAssert { att, .. }
            | Op::Cast { att, .. }
            | Op::DocTbl { att, .. } => vec![att.clone()],
            Op::Fun { args, .. } => args.clone(),
            Op::Compare { att1, att2, .. } | Op::Bool { att1, att2, .. } => {
                vec![att1.clone(), att2.clone()]
            }
            Op::RowNum { sort, part, .. } | Op::PosSelect { sort, part, .. } => {
                let mut cols = sort_cols(sort);
                cols.extend(part.iter().cloned());
                cols
            }
            Op::RowRank { sort, .. } | Op::Rank { sort, .. } => sort_cols(sort),
            Op::Aggr { att, part, .. } => att.iter().chain(part.iter()).cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Copy of a unary operator with every column it reads or produces
    /// passed through `f`. Other kinds are returned unchanged.
    pub fn rename(&self, f: impl Fn(&Column) -> Column) -> Op {
        let sort = |keys: &[SortKey]| {
            keys.iter()
                .map(|k| SortKey {
                    col: f(&k.col),
                    desc: k.desc,
                })
                .collect::<Vec<_>>()
        };
        match self {
            Op::Attach { res, value } => Op::Attach {
                res: f(res),
                value: value.clone(),
            },
            Op::Select { att } => Op::Select { att: f(att) },
            Op::PosSelect { pos, sort: keys, part } => Op::PosSelect {
                pos: *pos,
                sort: sort(keys),
                part: part.as_ref().map(&f),
            },
            Op::Fun { kind, res, args } => Op::Fun {
                kind: *kind,
                res: f(res),
                args: args.iter().map(&f).collect(),
            },
            Op::Compare { comp, res, att1, att2 } => Op::Compare {
                comp: *comp,
                res: f(res),
                att1: f(att1),
                att2: f(att2),
            },
            Op::Bool { op, res, att1, att2 } => Op::Bool {
                op: *op,
                res: f(res),
                att1: f(att1),
                att2: f(att2),
            },
            Op::Not { res, att } => Op::Not { res: f(res), att: f(att) },
            Op::Aggr { kind, res, att, part } => Op::Aggr {
                kind: *kind,
                res: f(res),
                att: att.as_ref().map(&f),
                part: part.as_ref().map(&f),
            },
            Op::RowNum { res, sort: keys, part } => Op::RowNum {
                res: f(res),
                sort: sort(keys),
                part: part.as_ref().map(&f),
            },
            Op::RowRank { res, sort: keys } => Op::RowRank {
                res: f(res),
                sort: sort(keys),
            },
            Op::Rank { res, sort: keys } => Op::Rank {
                res: f(res),
                sort: sort(keys),
            },
            Op::RowId { res } => Op::RowId { res: f(res) },
            Op::TypeTest { res, att, ty } => Op::TypeTest {
                res: f(res),
                att: f(att),
                ty: *ty,
            },
            Op::TypeAssert { att, ty } => Op::TypeAssert { att: f(att), ty: *ty },
            Op::Cast { res, att, ty } => Op::Cast {
                res: f(res),
                att: f(att),
                ty: *ty,
            },
            Op::DocTbl { res, att } => Op::DocTbl { res: f(res), att: f(att) },
            other => other.clone(),
        }
    }

    /// Whether the operator emits node-construction side effects that tie
    /// it to its position in the plan
    pub fn is_constructor(&self) -> bool {
        matches!(
            self,
            Op::Twig { .. } | Op::Roots | Op::Fragment | Op::FragUnion | Op::EmptyFrag | Op::DocTbl { .. }
        )
    }

    /// Compute the output schema from the schemas of the children.
    ///
    /// Fails when the operator reads a column its input does not produce or
    /// would produce a column twice.
    pub fn output_schema(&self, inputs: &[&Schema]) -> OptResult<Schema> {
        if inputs.len() != self.arity() {
            return Err(OptimizerError::Arity {
                op: self.name(),
                expected: self.arity(),
                found: inputs.len(),
            });
        }
        let ctx = self.name();
        match self {
            Op::LitTbl { cols, tuples } => {
                if let Some(bad) = tuples.iter().find(|t| t.len() != cols.len()) {
                    return Err(OptimizerError::InvalidPlan(format!(
                        "literal tuple of width {} for {} columns",
                        bad.len(),
                        cols.len()
                    )));
                }
                from_items(cols, ctx)
            }
            Op::EmptyTbl { cols } | Op::RefTbl { cols, .. } => from_items(cols, ctx),
            Op::Attach { res, value } => extend(inputs[0], res, value.ty(), ctx),
            Op::Cross => concat(inputs[0], inputs[1], ctx),
            Op::EqJoin { att1, att2 } => {
                need(inputs[0], att1, ctx)?;
                need(inputs[1], att2, ctx)?;
                concat(inputs[0], inputs[1], ctx)
            }
            Op::SemiJoin { att1, att2 } => {
                need(inputs[0], att1, ctx)?;
                need(inputs[1], att2, ctx)?;
                Ok(inputs[0].clone())
            }
            Op::ThetaJoin { preds } => {
                for p in preds {
                    need(inputs[0], &p.left, ctx)?;
                    need(inputs[1], &p.right, ctx)?;
                }
                concat(inputs[0], inputs[1], ctx)
            }
            Op::Project { proj } => project_schema(inputs[0], proj),
            Op::Select { att } => {
                need(inputs[0], att, ctx)?;
                Ok(inputs[0].clone())
            }
            Op::PosSelect { sort, part, .. } => {
                for s in sort {
                    need(inputs[0], &s.col, ctx)?;
                }
                if let Some(part) = part {
                    need(inputs[0], part, ctx)?;
                }
                Ok(inputs[0].clone())
            }
            Op::DisjUnion => {
                same_columns(inputs[0], inputs[1], ctx)?;
                let items = inputs[0]
                    .iter()
                    .map(|item| {
                        let other = inputs[1].ty_of(&item.name).unwrap_or(item.ty);
                        let ty = if other == item.ty { item.ty } else { AlgType::Any };
                        SchemaItem::new(item.name.clone(), ty)
                    })
                    .collect();
                Ok(Schema::new(items))
            }
            Op::Intersect | Op::Difference => {
                same_columns(inputs[0], inputs[1], ctx)?;
                Ok(inputs[0].clone())
            }
            Op::Distinct | Op::Proxy { .. } | Op::ProxyBase => Ok(inputs[0].clone()),
            Op::Fun { kind, res, args } => {
                for a in args {
                    need(inputs[0], a, ctx)?;
                }
                let ty = match kind {
                    FunKind::Concat => AlgType::Str,
                    FunKind::Contains => AlgType::Bln,
                    _ => args
                        .first()
                        .and_then(|a| inputs[0].ty_of(a))
                        .unwrap_or(AlgType::Any),
                };
                extend(inputs[0], res, ty, ctx)
            }
            Op::Compare { res, att1, att2, .. } | Op::Bool { res, att1, att2, .. } => {
                need(inputs[0], att1, ctx)?;
                need(inputs[0], att2, ctx)?;
                extend(inputs[0], res, AlgType::Bln, ctx)
            }
            Op::Not { res, att } | Op::TypeTest { res, att, .. } => {
                need(inputs[0], att, ctx)?;
                extend(inputs[0], res, AlgType::Bln, ctx)
            }
            Op::Aggr { kind, res, att, part } => {
                let mut items = Vec::new();
                if let Some(part) = part {
                    let ty = need(inputs[0], part, ctx)?;
                    items.push(SchemaItem::new(part.clone(), ty));
                }
                let att_ty = match att {
                    Some(att) => Some(need(inputs[0], att, ctx)?),
                    None => None,
                };
                let ty = match kind {
                    AggrKind::Count => AlgType::Int,
                    AggrKind::Avg => AlgType::Dbl,
                    AggrKind::All => AlgType::Bln,
                    _ => att_ty.unwrap_or(AlgType::Any),
                };
                if part.as_ref() == Some(res) {
                    return Err(OptimizerError::DuplicateColumn {
                        column: res.clone(),
                        context: ctx.to_string(),
                    });
                }
                items.push(SchemaItem::new(res.clone(), ty));
                Ok(Schema::new(items))
            }
            Op::RowNum { res, sort, part } => {
                for s in sort {
                    need(inputs[0], &s.col, ctx)?;
                }
                if let Some(part) = part {
                    need(inputs[0], part, ctx)?;
                }
                extend(inputs[0], res, AlgType::Nat, ctx)
            }
            Op::RowRank { res, sort } | Op::Rank { res, sort } => {
                for s in sort {
                    need(inputs[0], &s.col, ctx)?;
                }
                extend(inputs[0], res, AlgType::Nat, ctx)
            }
            Op::RowId { res } => extend(inputs[0], res, AlgType::Nat, ctx),
            Op::TypeAssert { att, ty } => {
                need(inputs[0], att, ctx)?;
                let items = inputs[0]
                    .iter()
                    .map(|item| {
                        if &item.name == att {
                            SchemaItem::new(item.name.clone(), *ty)
                        } else {
                            item.clone()
                        }
                    })
                    .collect();
                Ok(Schema::new(items))
            }
            Op::Cast { res, att, ty } => {
                need(inputs[0], att, ctx)?;
                extend(inputs[0], res, *ty, ctx)
            }
            Op::DocTbl { res, att } => {
                need(inputs[0], att, ctx)?;
                extend(inputs[0], res, AlgType::Node, ctx)
            }
            Op::Step { iter, item, .. } => {
                let iter_ty = need(inputs[1], iter, ctx)?;
                need(inputs[1], item, ctx)?;
                Ok(Schema::new(vec![
                    SchemaItem::new(iter.clone(), iter_ty),
                    SchemaItem::new(item.clone(), AlgType::Node),
                ]))
            }
            Op::StepJoin { item, res, .. } => {
                need(inputs[1], item, ctx)?;
                extend(inputs[1], res, AlgType::Node, ctx)
            }
            Op::Twig { iter, item, .. } => {
                let iter_ty = need(inputs[0], iter, ctx)?;
                need(inputs[0], item, ctx)?;
                Ok(Schema::new(vec![
                    SchemaItem::new(iter.clone(), iter_ty),
                    SchemaItem::new(item.clone(), AlgType::Node),
                ]))
            }
            Op::Roots => Ok(inputs[0].clone()),
            Op::Fragment | Op::FragUnion | Op::EmptyFrag => Ok(Schema::default()),
            Op::CondErr { att, .. } => {
                need(inputs[1], att, ctx)?;
                Ok(inputs[0].clone())
            }
            Op::Serialize { pos, item } => {
                let pos_ty = need(inputs[1], pos, ctx)?;
                let item_ty = need(inputs[1], item, ctx)?;
                Ok(Schema::new(vec![
                    SchemaItem::new(pos.clone(), pos_ty),
                    SchemaItem::new(item.clone(), item_ty),
                ]))
            }
            Op::InternalJoin { lproj, rproj } => internal_join_schema(inputs[0], inputs[1], lproj, rproj),
            Op::ThetaJoinOpt { preds } => thetajoin_opt_schema(inputs[0], inputs[1], preds),
        }
    }
}

fn need(schema: &Schema, col: &Column, ctx: &str) -> OptResult<AlgType> {
    schema.ty_of(col).ok_or_else(|| OptimizerError::MissingColumn {
        column: col.clone(),
        context: ctx.to_string(),
    })
}

fn from_items(cols: &[SchemaItem], ctx: &str) -> OptResult<Schema> {
    let mut seen = HashSet::new();
    for item in cols {
        if !seen.insert(&item.name) {
            return Err(OptimizerError::DuplicateColumn {
                column: item.name.clone(),
                context: ctx.to_string(),
            });
        }
    }
    Ok(Schema::new(cols.to_vec()))
}

fn extend(base: &Schema, res: &Column, ty: AlgType, ctx: &str) -> OptResult<Schema> {
    if base.contains(res) {
        return Err(OptimizerError::DuplicateColumn {
            column: res.clone(),
            context: ctx.to_string(),
        });
    }
    let mut schema = base.clone();
    schema.push(SchemaItem::new(res.clone(), ty));
    Ok(schema)
}

fn concat(left: &Schema, right: &Schema, ctx: &str) -> OptResult<Schema> {
    let mut schema = left.clone();
    for item in right.iter() {
        if schema.contains(&item.name) {
            return Err(OptimizerError::DuplicateColumn {
                column: item.name.clone(),
                context: ctx.to_string(),
            });
        }
        schema.push(item.clone());
    }
    Ok(schema)
}

fn same_columns(left: &Schema, right: &Schema, ctx: &str) -> OptResult<()> {
    for item in left.iter() {
        need(right, &item.name, ctx)?;
    }
    for item in right.iter() {
        need(left, &item.name, ctx)?;
    }
    Ok(())
}

fn project_schema(input: &Schema, proj: &[ProjPair]) -> OptResult<Schema> {
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(proj.len());
    for p in proj {
        if !seen.insert(&p.new) {
            return Err(OptimizerError::AmbiguousProjection(p.new.clone()));
        }
        let ty = need(input, &p.old, "project")?;
        items.push(SchemaItem::new(p.new.clone(), ty));
    }
    Ok(Schema::new(items))
}

fn internal_join_schema(
    left: &Schema,
    right: &Schema,
    lproj: &[ProjPair],
    rproj: &[ProjPair],
) -> OptResult<Schema> {
    let ctx = "internal_join";
    let (Some(lfirst), Some(rfirst)) = (lproj.first(), rproj.first()) else {
        return Err(OptimizerError::InvalidPlan(
            "internal join without join columns".to_string(),
        ));
    };
    if lfirst.new != rfirst.new {
        return Err(OptimizerError::InvalidPlan(format!(
            "internal join binds '{}' and '{}' as its join column",
            lfirst.new, rfirst.new
        )));
    }
    need(right, &rfirst.old, ctx)?;
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for p in lproj {
        if !seen.insert(&p.new) {
            return Err(OptimizerError::AmbiguousProjection(p.new.clone()));
        }
        items.push(SchemaItem::new(p.new.clone(), need(left, &p.old, ctx)?));
    }
    for p in &rproj[1..] {
        if !seen.insert(&p.new) {
            return Err(OptimizerError::AmbiguousProjection(p.new.clone()));
        }
        items.push(SchemaItem::new(p.new.clone(), need(right, &p.old, ctx)?));
    }
    Ok(Schema::new(items))
}

fn thetajoin_opt_schema(left: &Schema, right: &Schema, preds: &[TjPred]) -> OptResult<Schema> {
    let ctx = "thetajoin_opt";
    for p in preds {
        need(left, &p.left, ctx)?;
        need(right, &p.right, ctx)?;
    }
    let mut schema = Schema::default();
    for item in left.iter() {
        let hidden = preds.iter().find(|p| p.left == item.name).is_some_and(|p| !p.left_vis);
        if !hidden {
            schema.push(item.clone());
        }
    }
    for item in right.iter() {
        // duplicate columns introduced by rewrites are taken from the left
        if left.contains(&item.name) {
            continue;
        }
        let hidden = preds.iter().find(|p| p.right == item.name).is_some_and(|p| !p.right_vis);
        if !hidden {
            schema.push(item.clone());
        }
    }
    for p in preds {
        if let (Some(res), true) = (&p.res, p.res_vis) {
            if left.contains(res) || right.contains(res) || schema.contains(res) {
                return Err(OptimizerError::DuplicateColumn {
                    column: res.clone(),
                    context: ctx.to_string(),
                });
            }
            schema.push(SchemaItem::new(res.clone(), AlgType::Bln));
        }
    }
    Ok(schema)
}
