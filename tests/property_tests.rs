//! Property-based tests (proptest): traversal order, name freshness,
//! projection well-formedness and result preservation of random plans
//! under every phase sequence.

mod common;

use common::{names, PlanBuilder};
use proptest::prelude::*;
use proptest::sample::Index;
use relalg_opt::algebra::{proj, proj_identity, AlgType, Column, Comparison, FunKind, NameGenerator, SchemaItem};
use relalg_opt::traversal::{post_order, walk_bottom_up, walk_top_down};
use relalg_opt::{Dag, NodeId, Op, Optimizer, OptimizerConfig};
use std::collections::{HashMap, HashSet};

/// Build a DAG of single-column nodes from `(kind, child, child)` triples.
/// Later nodes pick their children among earlier ones, so sharing is common.
fn random_dag(specs: &[(u8, Index, Index)]) -> (Dag, NodeId) {
    let mut dag = Dag::new();
    let mut nodes: Vec<NodeId> = Vec::new();
    for (i, (kind, c1, c2)) in specs.iter().enumerate() {
        let id = match (*kind, nodes.len()) {
            (_, 0) | (0, _) => dag
                .ref_tbl(&format!("t{i}"), vec![SchemaItem::new("a", AlgType::Int)], vec![])
                .unwrap(),
            (1, n) => dag.distinct(nodes[c1.index(n)]).unwrap(),
            (_, n) => dag.union(nodes[c1.index(n)], nodes[c2.index(n)]).unwrap(),
        };
        nodes.push(id);
    }
    let root = *nodes.last().unwrap();
    (dag, root)
}

fn reachable(dag: &Dag, root: NodeId) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if seen.insert(id) {
            stack.extend(dag.children(id).iter().copied());
        }
    }
    seen
}

/// Position of every node in `order`, asserting each node occurs once
fn positions(order: &[NodeId]) -> HashMap<NodeId, usize> {
    let mut pos = HashMap::new();
    for (i, &id) in order.iter().enumerate() {
        assert!(pos.insert(id, i).is_none(), "{id} visited twice");
    }
    pos
}

fn dag_specs() -> impl Strategy<Value = Vec<(u8, Index, Index)>> {
    prop::collection::vec((0u8..3, any::<Index>(), any::<Index>()), 1..40)
}

proptest! {
    #[test]
    fn prop_post_order_visits_once_children_first(specs in dag_specs()) {
        let (dag, root) = random_dag(&specs);
        let order = post_order(&dag, root);
        let pos = positions(&order);
        prop_assert_eq!(pos.keys().copied().collect::<HashSet<_>>(), reachable(&dag, root));
        for &id in &order {
            for c in dag.children(id) {
                prop_assert!(pos[c] < pos[&id]);
            }
        }
        prop_assert_eq!(order.last().copied(), Some(root));
    }

    #[test]
    fn prop_bottom_up_walk_visits_once(specs in dag_specs()) {
        let (mut dag, root) = random_dag(&specs);
        let mut order = Vec::new();
        let changed = walk_bottom_up(&mut dag, root, |_, id| {
            order.push(id);
            Ok(false)
        })
        .unwrap();
        prop_assert!(!changed);
        let pos = positions(&order);
        prop_assert_eq!(pos.len(), reachable(&dag, root).len());
        for &id in &order {
            for c in dag.children(id) {
                prop_assert!(pos[c] < pos[&id]);
            }
        }
    }

    #[test]
    fn prop_top_down_walk_puts_parents_first(specs in dag_specs()) {
        let (mut dag, root) = random_dag(&specs);
        let mut order = Vec::new();
        walk_top_down(&mut dag, root, |_, id| {
            order.push(id);
            Ok(false)
        })
        .unwrap();
        let pos = positions(&order);
        prop_assert_eq!(pos.len(), reachable(&dag, root).len());
        for &id in &order {
            for c in dag.children(id) {
                prop_assert!(pos[&id] < pos[c]);
            }
        }
    }

    #[test]
    fn prop_fresh_names_are_unused_and_distinct(
        reserved in prop::collection::hash_set("[a-c]{1,2}(_[0-9])?", 0..20),
        bases in prop::collection::vec("[a-c]{1,2}(_[0-9]{1,2})?", 1..20),
    ) {
        let mut names = NameGenerator::new();
        for name in &reserved {
            names.reserve(&Column::new(name));
        }
        let mut handed_out = HashSet::new();
        for base in &bases {
            let fresh = names.fresh(&Column::new(base));
            prop_assert!(!reserved.contains(fresh.as_str()), "{} was reserved", fresh);
            prop_assert!(handed_out.insert(fresh.clone()), "{} handed out twice", fresh);
            prop_assert!(names.is_used(&fresh));
        }
    }

    #[test]
    fn prop_dag_fresh_avoids_schema_names(
        cols in prop::collection::btree_set("[a-c]{1,2}(_[0-9])?", 1..10),
        base in "[a-c]{1,2}",
    ) {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl("t", cols.iter().map(|c| SchemaItem::new(c.as_str(), AlgType::Int)).collect(), vec![])
            .unwrap();
        let fresh = dag.fresh(&Column::new(&base));
        prop_assert!(!dag.has_col(t, &fresh));
    }
}

/// One level of a projection chain: which current columns survive
fn chain_specs() -> impl Strategy<Value = Vec<Vec<bool>>> {
    prop::collection::vec(prop::collection::vec(any::<bool>(), 3), 1..5)
}

fn table_rows() -> impl Strategy<Value = Vec<[i64; 3]>> {
    prop::collection::vec([0i64..4, 0i64..4, 0i64..4], 0..6)
}

/// `eqjoin(project(...project(t)), u)` with renaming projections that
/// each keep a non-empty subset of their input columns
fn projection_chain(b: &mut PlanBuilder, levels: &[Vec<bool>], t_rows: &[[i64; 3]], u_rows: &[[i64; 2]]) -> NodeId {
    let rows: Vec<&[i64]> = t_rows.iter().map(|r| &r[..]).collect();
    let mut cur = b.table("t", &["c0", "c1", "c2"], &rows);
    for (level, mask) in levels.iter().enumerate() {
        let cols: Vec<Column> = b.dag.schema(cur).names().cloned().collect();
        let mut list = Vec::new();
        for (k, col) in cols.iter().enumerate() {
            if mask[k % mask.len()] || (k + 1 == cols.len() && list.is_empty()) {
                list.push(proj(format!("l{level}_{k}"), col.clone()));
            }
        }
        cur = b.dag.project(cur, list).unwrap();
    }
    let rows: Vec<&[i64]> = u_rows.iter().map(|r| &r[..]).collect();
    let u = b.table("u", &["k", "v"], &rows);
    let first = b.dag.schema(cur).names().next().cloned().unwrap();
    b.dag.eqjoin(cur, u, first, "k").unwrap()
}

/// Every reachable projection maps each new name to exactly one input column
fn assert_projections_well_formed(dag: &Dag, root: NodeId) {
    for id in post_order(dag, root) {
        if let Op::Project { proj } = dag.op(id) {
            let child = dag.child(id, 0);
            let mut new_names = HashSet::new();
            for pair in proj {
                assert!(new_names.insert(pair.new.clone()), "{} bound twice at {id}", pair.new);
                assert!(dag.has_col(child, &pair.old), "{} missing below {id}", pair.old);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_optimized_projections_are_well_formed(
        levels in chain_specs(),
        t_rows in table_rows(),
        u_rows in prop::collection::vec([0i64..4, 0i64..9], 0..5),
        phases in prop::sample::select(vec!["J", "I", "JI", "IPDJTI"]),
    ) {
        let mut b = PlanBuilder::new();
        let root = projection_chain(&mut b, &levels, &t_rows, &u_rows);
        let expected = b.bag(root);
        let schema = names(&b.dag, root);

        Optimizer::new(OptimizerConfig {
            phases: phases.to_string(),
            ..OptimizerConfig::default()
        })
        .optimize(&mut b.dag, root)
        .unwrap();

        b.dag.refresh_schemas(root).unwrap();
        assert_projections_well_formed(&b.dag, root);
        prop_assert_eq!(names(&b.dag, root), schema);
        prop_assert_eq!(b.bag(root), expected);
    }
}

/// One step of a random plan: operator kind, the node it reads, a second
/// node for binary operators and two column picks
type Step = (u8, Index, Index, Index, Index);

fn plan_steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        (0u8..8, any::<Index>(), any::<Index>(), any::<Index>(), any::<Index>()),
        1..9,
    )
}

fn ints(b: &PlanBuilder, id: NodeId) -> Vec<Column> {
    let schema = b.dag.schema(id);
    schema.names().filter(|c| schema.ty_of(c) == Some(AlgType::Int)).cloned().collect()
}

fn bools(b: &PlanBuilder, id: NodeId) -> Vec<Column> {
    let schema = b.dag.schema(id);
    schema.names().filter(|c| schema.ty_of(c) == Some(AlgType::Bln)).cloned().collect()
}

/// `id` with every column renamed `<col>_<step>`
fn renamed(b: &mut PlanBuilder, id: NodeId, step: usize) -> NodeId {
    let list = b
        .dag
        .schema(id)
        .names()
        .map(|c| proj(format!("{c}_{step}"), c.clone()))
        .collect();
    b.dag.project(id, list).unwrap()
}

/// Random plan over `t(a, b)` and `u(c, d)` built from comparisons,
/// selections, additions, cross products, unions, equi-joins, projections
/// and rowid lookup joins. Steps read earlier nodes, so sharing is common.
/// At most two products or joins keep the reference evaluation small.
fn random_plan(b: &mut PlanBuilder, steps: &[Step], t_rows: &[[i64; 2]], u_rows: &[[i64; 2]]) -> NodeId {
    let rows: Vec<&[i64]> = t_rows.iter().map(|r| &r[..]).collect();
    let t = b.table("t", &["a", "b"], &rows);
    let rows: Vec<&[i64]> = u_rows.iter().map(|r| &r[..]).collect();
    let u = b.table("u", &["c", "d"], &rows);
    let mut nodes = vec![t, u];
    let mut products = 0;

    for (i, (kind, x, y, c1, c2)) in steps.iter().enumerate() {
        let x = nodes[x.index(nodes.len())];
        let y = nodes[y.index(nodes.len())];
        let cols = ints(b, x);
        let (a1, a2) = (c1.get(&cols).clone(), c2.get(&cols).clone());
        let res = format!("r{i}");
        let joins = products < 2;

        let id = match *kind {
            0 => b.dag.compare(x, Comparison::Gt, res, a1, a2).unwrap(),
            1 => match bools(b, x).first().cloned() {
                Some(flag) => b.dag.select(x, flag).unwrap(),
                None => {
                    let cmp = b.dag.compare(x, Comparison::Ge, res.as_str(), a1, a2).unwrap();
                    b.dag.select(cmp, res).unwrap()
                }
            },
            3 if joins => {
                products += 1;
                let other = renamed(b, y, i);
                b.dag.cross(x, other).unwrap()
            }
            4 => {
                let keep: Vec<Column> = b.dag.schema(x).names().cloned().collect();
                let cmp = b.dag.compare(x, Comparison::Lt, res.as_str(), a1, a2).unwrap();
                let sel = b.dag.select(cmp, res).unwrap();
                let filtered = b.dag.project(sel, proj_identity(&keep)).unwrap();
                b.dag.union(x, filtered).unwrap()
            }
            5 if joins => {
                products += 1;
                let other = renamed(b, y, i);
                let key = c2.get(&ints(b, other)).clone();
                b.dag.eqjoin(x, other, a1, key).unwrap()
            }
            6 if b.dag.schema(x).len() > 1 => {
                let all: Vec<Column> = b.dag.schema(x).names().cloned().collect();
                let dropped = c1.get(&all).clone();
                let keep: Vec<&Column> = all.iter().filter(|c| **c != dropped).collect();
                if keep.iter().any(|c| cols.contains(c)) {
                    b.dag.project(x, proj_identity(keep)).unwrap()
                } else {
                    b.dag.fun(x, FunKind::Add, res, vec![a1, a2]).unwrap()
                }
            }
            7 if joins => {
                products += 1;
                let keep: Vec<Column> = b.dag.schema(x).names().cloned().collect();
                let (num, key, flag, copy) = (format!("n{i}"), format!("m{i}"), format!("c{i}"), format!("w{i}"));
                let n = b.dag.rowid(x, num.as_str()).unwrap();
                let cmp = b.dag.compare(n, Comparison::Gt, flag.as_str(), a1, a2).unwrap();
                let sel = b.dag.select(cmp, flag.as_str()).unwrap();
                let lookup = b
                    .dag
                    .project(sel, vec![proj(key.as_str(), num.as_str()), proj(copy.as_str(), flag.as_str())])
                    .unwrap();
                let entry = b.dag.eqjoin(n, lookup, num, key).unwrap();
                // row numbers depend on evaluation order, so they stay inside
                let mut list = proj_identity(&keep);
                list.push(proj(copy.as_str(), copy.as_str()));
                b.dag.project(entry, list).unwrap()
            }
            _ => b.dag.fun(x, FunKind::Add, res, vec![a1, a2]).unwrap(),
        };
        nodes.push(id);
    }
    *nodes.last().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_every_phase_keeps_random_plan_results(
        steps in plan_steps(),
        t_rows in prop::collection::vec([0i64..4, 0i64..4], 0..5),
        u_rows in prop::collection::vec([0i64..4, 0i64..4], 0..5),
        phases in prop::sample::select(vec!["I", "P", "PD", "J", "T", "IPDJTI"]),
    ) {
        let mut b = PlanBuilder::new();
        let root = random_plan(&mut b, &steps, &t_rows, &u_rows);
        let expected = b.bag(root);
        let schema = names(&b.dag, root);

        Optimizer::new(OptimizerConfig {
            phases: phases.to_string(),
            ..OptimizerConfig::default()
        })
        .optimize(&mut b.dag, root)
        .unwrap();

        b.dag.refresh_schemas(root).unwrap();
        assert_projections_well_formed(&b.dag, root);
        prop_assert_eq!(names(&b.dag, root), schema, "schema changed by {}", phases);
        prop_assert_eq!(b.bag(root), expected, "result changed by {}", phases);
    }
}
