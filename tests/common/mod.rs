//! Shared helpers for the integration tests: a small plan builder and a
//! reference evaluator with bag semantics.

#![allow(dead_code)]

use relalg_opt::algebra::{AggrKind, AlgType, Atom, BoolOp, Column, Comparison, FunKind, SchemaItem};
use relalg_opt::traversal::post_order;
use relalg_opt::{Dag, NodeId, Op};
use std::collections::{BTreeMap, HashMap};

/// Runtime value of the reference evaluator
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Val {
    Int(i64),
    Bln(bool),
    Str(String),
}

pub type Row = BTreeMap<Column, Val>;

/// A row as sorted `(column, value)` pairs, for readable assertions
pub type FlatRow = Vec<(String, Val)>;

/// Plan under construction together with the contents of its base tables
#[derive(Default)]
pub struct PlanBuilder {
    pub dag: Dag,
    tables: HashMap<String, Vec<Vec<Val>>>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Integer base table without declared keys
    pub fn table(&mut self, name: &str, cols: &[&str], rows: &[&[i64]]) -> NodeId {
        self.keyed_table(name, cols, &[], rows)
    }

    /// Integer base table; every column in `keys` is declared a key
    pub fn keyed_table(&mut self, name: &str, cols: &[&str], keys: &[&str], rows: &[&[i64]]) -> NodeId {
        let id = self
            .dag
            .ref_tbl(
                name,
                cols.iter().map(|c| SchemaItem::new(*c, AlgType::Int)).collect(),
                keys.iter().map(|k| vec![Column::new(k)]).collect(),
            )
            .unwrap();
        let data = rows
            .iter()
            .map(|row| {
                assert_eq!(row.len(), cols.len(), "row width of table {name}");
                row.iter().map(|&v| Val::Int(v)).collect()
            })
            .collect();
        self.tables.insert(name.to_string(), data);
        id
    }

    /// Base table with one integer column and one boolean flag column
    pub fn flagged_table(&mut self, name: &str, col: &str, flag: &str, rows: &[(i64, bool)]) -> NodeId {
        let items = vec![SchemaItem::new(col, AlgType::Int), SchemaItem::new(flag, AlgType::Bln)];
        let id = self.dag.ref_tbl(name, items, vec![]).unwrap();
        let data = rows.iter().map(|&(v, f)| vec![Val::Int(v), Val::Bln(f)]).collect();
        self.tables.insert(name.to_string(), data);
        id
    }

    /// Evaluate the plan below `root` on the registered tables
    pub fn eval(&self, root: NodeId) -> Vec<Row> {
        eval(&self.dag, root, &self.tables)
    }

    /// `eval` as a sorted bag of flat rows
    pub fn bag(&self, root: NodeId) -> Vec<FlatRow> {
        bag(self.eval(root))
    }
}

/// Sort rows so that two evaluations compare as multisets
pub fn bag(rows: Vec<Row>) -> Vec<FlatRow> {
    let mut flat: Vec<FlatRow> = rows
        .into_iter()
        .map(|row| row.into_iter().map(|(c, v)| (c.as_str().to_string(), v)).collect())
        .collect();
    flat.sort();
    flat
}

/// Schema column names, sorted
pub fn names(dag: &Dag, id: NodeId) -> Vec<String> {
    let mut names: Vec<String> = dag.schema(id).names().map(|c| c.as_str().to_string()).collect();
    names.sort();
    names
}

/// Reachable nodes whose operator satisfies `pred`
pub fn find(dag: &Dag, root: NodeId, pred: impl Fn(&Op) -> bool) -> Vec<NodeId> {
    post_order(dag, root).into_iter().filter(|&id| pred(dag.op(id))).collect()
}

fn atom(value: &Atom) -> Val {
    match value {
        Atom::Nat(n) => Val::Int(*n as i64),
        Atom::Int(i) => Val::Int(*i),
        Atom::Bln(b) => Val::Bln(*b),
        Atom::Str(s) => Val::Str(s.clone()),
        Atom::Dbl(_) => panic!("the reference evaluator has no doubles"),
    }
}

fn compare(comp: Comparison, a: &Val, b: &Val) -> bool {
    match comp {
        Comparison::Eq => a == b,
        Comparison::Ne => a != b,
        Comparison::Gt => a > b,
        Comparison::Ge => a >= b,
        Comparison::Lt => a < b,
        Comparison::Le => a <= b,
    }
}

fn int(v: &Val) -> i64 {
    match v {
        Val::Int(i) => *i,
        other => panic!("integer expected, got {other:?}"),
    }
}

fn truth(v: &Val) -> bool {
    match v {
        Val::Bln(b) => *b,
        other => panic!("boolean expected, got {other:?}"),
    }
}

fn merge(l: &Row, r: &Row) -> Row {
    let mut row = l.clone();
    row.extend(r.iter().map(|(c, v)| (c.clone(), v.clone())));
    row
}

fn distinct(rows: Vec<Row>) -> Vec<Row> {
    let mut out: Vec<Row> = Vec::new();
    for row in rows {
        if !out.contains(&row) {
            out.push(row);
        }
    }
    out
}

fn extend(rows: &[Row], res: &Column, f: impl Fn(&Row) -> Val) -> Vec<Row> {
    rows.iter()
        .map(|row| {
            let mut row = row.clone();
            let value = f(&row);
            row.insert(res.clone(), value);
            row
        })
        .collect()
}

/// Reference evaluation of the plan below `root`. Shared nodes are
/// evaluated once, so row numberings are consistent between all readers.
pub fn eval(dag: &Dag, root: NodeId, tables: &HashMap<String, Vec<Vec<Val>>>) -> Vec<Row> {
    let mut memo: HashMap<NodeId, Vec<Row>> = HashMap::new();
    for id in post_order(dag, root) {
        let input = |i: usize| &memo[&dag.child(id, i)];
        let rows: Vec<Row> = match dag.op(id) {
            Op::RefTbl { name, cols, .. } => tables[name]
                .iter()
                .map(|values| cols.iter().map(|c| c.name.clone()).zip(values.iter().cloned()).collect())
                .collect(),
            Op::LitTbl { cols, tuples } => tuples
                .iter()
                .map(|t| cols.iter().map(|c| c.name.clone()).zip(t.iter().map(atom)).collect())
                .collect(),
            Op::EmptyTbl { .. } => Vec::new(),
            Op::Attach { res, value } => extend(input(0), res, |_| atom(value)),
            Op::Cross => {
                let (l, r) = (input(0), input(1));
                l.iter().flat_map(move |a| r.iter().map(move |b| merge(a, b))).collect()
            }
            Op::EqJoin { att1, att2 } => {
                let (l, r) = (input(0), input(1));
                l.iter()
                    .flat_map(move |a| r.iter().filter(move |b| a[att1] == b[att2]).map(move |b| merge(a, b)))
                    .collect()
            }
            Op::SemiJoin { att1, att2 } => {
                let (l, r) = (input(0), input(1));
                l.iter().filter(|a| r.iter().any(|b| a[att1] == b[att2])).cloned().collect()
            }
            Op::ThetaJoin { preds } => {
                let (l, r) = (input(0), input(1));
                l.iter()
                    .flat_map(move |a| {
                        r.iter()
                            .filter(move |b| preds.iter().all(|p| compare(p.comp, &a[&p.left], &b[&p.right])))
                            .map(move |b| merge(a, b))
                    })
                    .collect()
            }
            Op::Project { proj } => input(0)
                .iter()
                .map(|row| proj.iter().map(|p| (p.new.clone(), row[&p.old].clone())).collect())
                .collect(),
            Op::Select { att } => input(0).iter().filter(|row| truth(&row[att])).cloned().collect(),
            Op::DisjUnion => input(0).iter().chain(input(1)).cloned().collect(),
            Op::Intersect => {
                let r = input(1);
                distinct(input(0).iter().filter(|row| r.contains(row)).cloned().collect())
            }
            Op::Difference => {
                let r = input(1);
                distinct(input(0).iter().filter(|row| !r.contains(row)).cloned().collect())
            }
            Op::Distinct => distinct(input(0).clone()),
            Op::Fun { kind, res, args } => extend(input(0), res, |row| {
                let (a, b) = (int(&row[&args[0]]), int(&row[&args[1]]));
                Val::Int(match kind {
                    FunKind::Add => a + b,
                    FunKind::Sub => a - b,
                    FunKind::Mul => a * b,
                    other => panic!("unsupported function {other:?}"),
                })
            }),
            Op::Compare { comp, res, att1, att2 } => {
                extend(input(0), res, |row| Val::Bln(compare(*comp, &row[att1], &row[att2])))
            }
            Op::Bool { op, res, att1, att2 } => extend(input(0), res, |row| {
                let (a, b) = (truth(&row[att1]), truth(&row[att2]));
                Val::Bln(match op {
                    BoolOp::And => a && b,
                    BoolOp::Or => a || b,
                })
            }),
            Op::Not { res, att } => extend(input(0), res, |row| Val::Bln(!truth(&row[att]))),
            Op::Aggr { kind, res, att, part } => {
                let mut groups: BTreeMap<Option<Val>, Vec<&Row>> = BTreeMap::new();
                for row in input(0) {
                    groups.entry(part.as_ref().map(|p| row[p].clone())).or_default().push(row);
                }
                groups
                    .into_iter()
                    .map(|(key, rows)| {
                        let values = || rows.iter().map(|r| int(&r[att.as_ref().unwrap()]));
                        let value = match kind {
                            AggrKind::Count => rows.len() as i64,
                            AggrKind::Sum => values().sum(),
                            AggrKind::Min => values().min().unwrap(),
                            AggrKind::Max => values().max().unwrap(),
                            other => panic!("unsupported aggregate {other:?}"),
                        };
                        let mut row = Row::new();
                        if let (Some(p), Some(k)) = (part, key) {
                            row.insert(p.clone(), k);
                        }
                        row.insert(res.clone(), Val::Int(value));
                        row
                    })
                    .collect()
            }
            Op::RowId { res } => input(0)
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let mut row = row.clone();
                    row.insert(res.clone(), Val::Int(i as i64 + 1));
                    row
                })
                .collect(),
            Op::RowNum { res, sort, part } => {
                let mut rows = input(0).clone();
                rows.sort_by(|a, b| {
                    let key = |r: &Row| sort.iter().map(|k| r[&k.col].clone()).collect::<Vec<_>>();
                    key(a).cmp(&key(b))
                });
                let mut counters: HashMap<Option<Val>, i64> = HashMap::new();
                for row in &mut rows {
                    let counter = counters.entry(part.as_ref().map(|p| row[p].clone())).or_insert(0);
                    *counter += 1;
                    row.insert(res.clone(), Val::Int(*counter));
                }
                rows
            }
            Op::TypeAssert { .. } | Op::Proxy { .. } | Op::ProxyBase => input(0).clone(),
            other => panic!("the reference evaluator does not support {}", other.name()),
        };
        memo.insert(id, rows);
    }
    memo.remove(&root).unwrap_or_default()
}
