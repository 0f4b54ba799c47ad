//! # relalg-opt
//!
//! A rewriting optimizer for relational algebra plans. Plans are DAGs of
//! operators with shared subexpressions; every phase rewrites the DAG in
//! place so that all parents of a rewritten node observe the change.
//!
//! ## Pipeline
//!
//! ```text
//! plan.json
//!     ↓
//! [Plan::load]                  → Dag + root
//!     ↓
//! [I] icols pruning             → unused columns removed
//! [P] proxy introduction        → numbering fragments made relocatable
//! [D] proxy dissolution         → proxies replaced by their inputs
//! [J] equi-join pushdown        → joins moved towards the leaves
//! [T] theta-join hoisting       → cross products lifted, predicates collected
//! [I] icols pruning
//!     ↓
//! [Plan::capture]               → optimized plan.json
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relalg_opt::{Config, Optimizer, Plan};
//!
//! let config = Config::load()?;
//! let (mut dag, root) = Plan::from_json(&text)?.load()?;
//! let report = Optimizer::new(config.optimizer).optimize(&mut dag, root)?;
//! println!("{} rewrites", report.total_rewrites());
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `algebra` | operators, schemas, the arena DAG, JSON plans, tree printing |
//! | `traversal` | scratch marks and visit-once walks |
//! | `properties` | cardinality, constants, keys, domains, sets, origins, required columns |
//! | `proxy` | proxy introduction and dissolution |
//! | `join_pushdown` | equi-join pushdown |
//! | `thetajoin` | theta-join hoisting |
//! | `icols` | required-column pruning |
//! | `optimizer` | phase sequencing and statistics |

pub mod algebra;
pub mod error;
pub mod properties;
pub mod traversal;

// Phases
pub mod icols;
pub mod join_pushdown;
pub mod proxy;
pub mod thetajoin;

pub mod optimizer;

// Ambient
pub mod config;
pub mod logging;

pub use algebra::{Column, Dag, NodeId, Op, Plan};
pub use config::{Config, LoggingConfig, OptimizerConfig};
pub use error::{OptResult, OptimizerError};
pub use optimizer::{parse_phases, OptimizeReport, Optimizer, Phase, PhaseStats};
pub use properties::{PropKind, Properties};
