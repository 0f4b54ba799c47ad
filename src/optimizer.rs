//! # Optimizer Driver
//!
//! Runs the rewriting phases named by a phase string, one letter per phase:
//!
//! ```text
//! I  icols pruning
//! P  proxy introduction
//! D  proxy dissolution
//! J  equi-join pushdown
//! T  theta-join hoisting
//! ```
//!
//! The default sequence is `IPDJTI`. The whole string is validated before
//! the first phase touches the plan.

use crate::algebra::{Dag, NodeId};
use crate::config::OptimizerConfig;
use crate::error::{OptResult, OptimizerError};
use crate::{icols, join_pushdown, proxy, thetajoin};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// One optimizer phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Icols,
    Proxy,
    Dissolve,
    JoinPushdown,
    ThetaJoin,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Icols,
        Phase::Proxy,
        Phase::Dissolve,
        Phase::JoinPushdown,
        Phase::ThetaJoin,
    ];

    pub fn from_letter(c: char) -> OptResult<Self> {
        match c {
            'I' => Ok(Phase::Icols),
            'P' => Ok(Phase::Proxy),
            'D' => Ok(Phase::Dissolve),
            'J' => Ok(Phase::JoinPushdown),
            'T' => Ok(Phase::ThetaJoin),
            other => Err(OptimizerError::UnknownPhase(other)),
        }
    }

    pub fn letter(self) -> char {
        match self {
            Phase::Icols => 'I',
            Phase::Proxy => 'P',
            Phase::Dissolve => 'D',
            Phase::JoinPushdown => 'J',
            Phase::ThetaJoin => 'T',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Icols => "icols",
            Phase::Proxy => "proxy",
            Phase::Dissolve => "dissolve",
            Phase::JoinPushdown => "join_pushdown",
            Phase::ThetaJoin => "thetajoin",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Phase::Icols => "prune columns no ancestor requires",
            Phase::Proxy => "rewrite numbering fragments behind proxies",
            Phase::Dissolve => "replace proxies by their inputs",
            Phase::JoinPushdown => "push equi-joins towards the leaves",
            Phase::ThetaJoin => "hoist theta-joins and collect predicates",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a phase string. Whitespace is ignored.
pub fn parse_phases(phases: &str) -> OptResult<Vec<Phase>> {
    phases
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(Phase::from_letter)
        .collect()
}

/// Statistics of one phase run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseStats {
    pub phase: Phase,
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub rewrites: usize,
    pub elapsed: Duration,
}

/// Outcome of a full optimizer run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptimizeReport {
    pub phases: Vec<PhaseStats>,
    /// The node guard ended the run before the phase string was exhausted
    pub stopped_early: bool,
}

impl OptimizeReport {
    pub fn total_rewrites(&self) -> usize {
        self.phases.iter().map(|s| s.rewrites).sum()
    }
}

/// Phase sequencer
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Optimizer { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run the configured phases on the plan below `root`
    pub fn optimize(&self, dag: &mut Dag, root: NodeId) -> OptResult<OptimizeReport> {
        let phases = parse_phases(&self.config.phases)?;
        let mut report = OptimizeReport::default();

        for (i, &phase) in phases.iter().enumerate() {
            let nodes_before = dag.reachable_count(root);
            if i > 0 {
                if let Some(limit) = self.config.node_guard.filter(|&limit| nodes_before > limit) {
                    tracing::warn!(
                        nodes = nodes_before,
                        limit,
                        next = phase.name(),
                        "node guard reached, skipping remaining phases"
                    );
                    report.stopped_early = true;
                    break;
                }
            }

            let start = Instant::now();
            let rewrites = self.run_phase(phase, dag, root)?;
            let stats = PhaseStats {
                phase,
                nodes_before,
                nodes_after: dag.reachable_count(root),
                rewrites,
                elapsed: start.elapsed(),
            };
            tracing::debug!(
                phase = phase.name(),
                rewrites,
                nodes_before,
                nodes_after = stats.nodes_after,
                elapsed_us = stats.elapsed.as_micros() as u64,
                "phase_done"
            );
            report.phases.push(stats);
        }

        tracing::info!(
            phases = report.phases.len(),
            rewrites = report.total_rewrites(),
            "optimization finished"
        );
        Ok(report)
    }

    fn run_phase(&self, phase: Phase, dag: &mut Dag, root: NodeId) -> OptResult<usize> {
        match phase {
            Phase::Icols => icols::optimize_icols(dag, root),
            Phase::Proxy => proxy::introduce_proxies(dag, root),
            Phase::Dissolve => proxy::dissolve(dag, root),
            Phase::JoinPushdown => join_pushdown::optimize_join_pushdown(dag, root, &self.config),
            Phase::ThetaJoin => thetajoin::optimize_thetajoin(dag, root, &self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{proj, AlgType, Column, SchemaItem};

    fn small_plan() -> (Dag, NodeId) {
        let mut dag = Dag::new();
        let t = dag
            .ref_tbl(
                "t",
                vec![SchemaItem::new("a", AlgType::Int), SchemaItem::new("b", AlgType::Int)],
                vec![vec![Column::new("a")]],
            )
            .unwrap();
        let u = dag
            .ref_tbl("u", vec![SchemaItem::new("c", AlgType::Int)], vec![])
            .unwrap();
        let join = dag.eqjoin(t, u, "a", "c").unwrap();
        let root = dag.project(join, vec![proj("b", "b"), proj("c", "c")]).unwrap();
        (dag, root)
    }

    #[test]
    fn test_default_sequence() {
        let phases = parse_phases(&OptimizerConfig::default().phases).unwrap();
        let letters: String = phases.iter().map(|p| p.letter()).collect();
        assert_eq!(letters, "IPDJTI");
    }

    #[test]
    fn test_letters_round_trip() {
        for phase in Phase::ALL {
            assert_eq!(Phase::from_letter(phase.letter()), Ok(phase));
        }
    }

    #[test]
    fn test_unknown_phase_rejected_before_running() {
        let (mut dag, root) = small_plan();
        let slots = dag.len();
        let revision = dag.revision(root);
        let optimizer = Optimizer::new(OptimizerConfig {
            phases: "IJX".to_string(),
            ..OptimizerConfig::default()
        });
        assert_eq!(optimizer.optimize(&mut dag, root), Err(OptimizerError::UnknownPhase('X')));
        assert_eq!(dag.len(), slots);
        assert_eq!(dag.revision(root), revision);
    }

    #[test]
    fn test_stats_follow_phase_string() {
        let (mut dag, root) = small_plan();
        let optimizer = Optimizer::new(OptimizerConfig {
            phases: "J I".to_string(),
            ..OptimizerConfig::default()
        });
        let report = optimizer.optimize(&mut dag, root).unwrap();
        let run: Vec<Phase> = report.phases.iter().map(|s| s.phase).collect();
        assert_eq!(run, vec![Phase::JoinPushdown, Phase::Icols]);
        assert!(!report.stopped_early);
        assert_eq!(report.phases[0].nodes_before, 4);
        assert_eq!(report.phases[1].nodes_before, report.phases[0].nodes_after);
    }

    #[test]
    fn test_node_guard_stops_between_phases() {
        let (mut dag, root) = small_plan();
        let optimizer = Optimizer::new(OptimizerConfig {
            phases: "III".to_string(),
            node_guard: Some(0),
            ..OptimizerConfig::default()
        });
        let report = optimizer.optimize(&mut dag, root).unwrap();
        assert_eq!(report.phases.len(), 1);
        assert!(report.stopped_early);
    }

    #[test]
    fn test_empty_sequence_leaves_plan_alone() {
        let (mut dag, root) = small_plan();
        let revision = dag.revision(root);
        let report = Optimizer::new(OptimizerConfig {
            phases: String::new(),
            ..OptimizerConfig::default()
        })
        .optimize(&mut dag, root)
        .unwrap();
        assert!(report.phases.is_empty());
        assert_eq!(report.total_rewrites(), 0);
        assert_eq!(dag.revision(root), revision);
    }
}
