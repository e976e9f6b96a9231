//! Engine Configuration.

/// Restart schedule selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartStrategy {
    /// Luby sequence scaled by the base interval.
    #[default]
    Luby,
    /// Geometric growth from the base interval.
    Geometric,
    /// Never restart.
    None,
}

/// Configuration for the solver engine.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Domains smaller than this are expanded into clauses rather than
    /// handled by a propagator.
    pub eager_threshold: i64,
    /// Learnt-clause count that triggers a database reduction.
    pub learnt_dbmax: usize,
    /// Growth factor applied to the learnt cap after each reduction.
    pub learnt_growth: f64,
    /// Restart schedule.
    pub restart: RestartStrategy,
    /// Base restart interval in conflicts.
    pub restart_base: u64,
    /// Growth factor for the geometric schedule.
    pub restart_inc: f64,
    /// Predicate activity decay applied after each conflict.
    pub pred_act_decay: f64,
    /// Learnt-clause activity decay applied after each conflict.
    pub clause_act_decay: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            eager_threshold: 64,
            learnt_dbmax: 5000,
            learnt_growth: 1.1,
            restart: RestartStrategy::Luby,
            restart_base: 100,
            restart_inc: 1.5,
            pred_act_decay: 0.95,
            clause_act_decay: 0.999,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = SolverConfig::default();
        assert_eq!(c.restart, RestartStrategy::Luby);
        assert!(c.eager_threshold > 0);
        assert!(c.learnt_growth > 1.0);
        assert!(c.pred_act_decay < 1.0);
    }
}
