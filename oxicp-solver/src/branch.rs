//! Branching Strategies.
//!
//! A brancher yields the next decision atom or `None` when it has nothing
//! left to decide. The solver consults its branchers in order, first
//! non-`None` wins, and falls back to the activity-guided default, which
//! closes the search by fixing every remaining predicate.

use oxicp_core::{pval_inv, Atom, IntVar, PredId};
use oxicp_engine::Engine;

/// Variable selection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarChoice {
    /// First unfixed in posting order.
    #[default]
    InputOrder,
    /// Smallest remaining domain.
    FirstFail,
    /// Smallest lower bound.
    Smallest,
    /// Largest upper bound.
    Largest,
}

/// Value selection for the chosen variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValChoice {
    /// Fix to the lower bound.
    #[default]
    Min,
    /// Fix to the upper bound.
    Max,
    /// Cap at the domain midpoint.
    Split,
}

/// A decision strategy plug-in.
pub trait Brancher {
    /// Next decision, or `None` if this brancher is exhausted.
    fn select(&mut self, engine: &Engine) -> Option<Atom>;

    /// Notification that the search restarted.
    fn on_restart(&mut self) {}
}

/// Branch over a fixed list of variables.
pub struct BasicBrancher {
    varc: VarChoice,
    valc: ValChoice,
    vars: Vec<IntVar>,
}

/// Build a [`BasicBrancher`].
pub fn basic_brancher(varc: VarChoice, valc: ValChoice, vars: Vec<IntVar>) -> Box<dyn Brancher> {
    Box::new(BasicBrancher { varc, valc, vars })
}

impl Brancher for BasicBrancher {
    fn select(&mut self, engine: &Engine) -> Option<Atom> {
        let mut best: Option<IntVar> = None;
        let mut best_key = i64::MAX;
        for &x in &self.vars {
            if engine.is_fixed(x) {
                continue;
            }
            let key = match self.varc {
                VarChoice::InputOrder => return Some(decide(engine, x, self.valc)),
                VarChoice::FirstFail => engine.ub(x) - engine.lb(x),
                VarChoice::Smallest => engine.lb(x),
                VarChoice::Largest => -engine.ub(x),
            };
            if key < best_key {
                best_key = key;
                best = Some(x);
            }
        }
        best.map(|x| decide(engine, x, self.valc))
    }
}

fn decide(engine: &Engine, x: IntVar, valc: ValChoice) -> Atom {
    let (lb, ub) = (engine.lb(x), engine.ub(x));
    match valc {
        ValChoice::Min => x.le(lb),
        ValChoice::Max => x.ge(ub),
        ValChoice::Split => x.le(lb + (ub - lb) / 2),
    }
}

/// Try each sub-brancher in order; first non-`None` wins.
pub fn seq_brancher(bs: Vec<Box<dyn Brancher>>) -> Box<dyn Brancher> {
    Box::new(SeqBrancher { bs })
}

struct SeqBrancher {
    bs: Vec<Box<dyn Brancher>>,
}

impl Brancher for SeqBrancher {
    fn select(&mut self, engine: &Engine) -> Option<Atom> {
        self.bs.iter_mut().find_map(|b| b.select(engine))
    }

    fn on_restart(&mut self) {
        for b in &mut self.bs {
            b.on_restart();
        }
    }
}

/// Delegate to the sub-brancher of each selector atom that currently holds,
/// in listed order.
pub fn priority_brancher(pairs: Vec<(Atom, Box<dyn Brancher>)>) -> Box<dyn Brancher> {
    Box::new(PriorityBrancher { pairs })
}

struct PriorityBrancher {
    pairs: Vec<(Atom, Box<dyn Brancher>)>,
}

impl Brancher for PriorityBrancher {
    fn select(&mut self, engine: &Engine) -> Option<Atom> {
        for (sel, b) in &mut self.pairs {
            if engine.state.is_entailed(*sel) {
                if let Some(at) = b.select(engine) {
                    return Some(at);
                }
            }
        }
        None
    }

    fn on_restart(&mut self) {
        for (_, b) in &mut self.pairs {
            b.on_restart();
        }
    }
}

/// Rotate between sub-branchers, advancing on every restart.
pub fn toggle_brancher(bs: Vec<Box<dyn Brancher>>) -> Box<dyn Brancher> {
    Box::new(ToggleBrancher { bs, active: 0 })
}

struct ToggleBrancher {
    bs: Vec<Box<dyn Brancher>>,
    active: usize,
}

impl Brancher for ToggleBrancher {
    fn select(&mut self, engine: &Engine) -> Option<Atom> {
        self.bs.get_mut(self.active)?.select(engine)
    }

    fn on_restart(&mut self) {
        if !self.bs.is_empty() {
            self.active = (self.active + 1) % self.bs.len();
        }
        for b in &mut self.bs {
            b.on_restart();
        }
    }
}

/// Delegate until the decision budget is spent.
pub fn limit_brancher(inner: Box<dyn Brancher>, budget: u64) -> Box<dyn Brancher> {
    Box::new(LimitBrancher {
        inner,
        budget,
        used: 0,
    })
}

struct LimitBrancher {
    inner: Box<dyn Brancher>,
    budget: u64,
    used: u64,
}

impl Brancher for LimitBrancher {
    fn select(&mut self, engine: &Engine) -> Option<Atom> {
        if self.used >= self.budget {
            return None;
        }
        let at = self.inner.select(engine)?;
        self.used += 1;
        Some(at)
    }

    fn on_restart(&mut self) {
        self.inner.on_restart();
    }
}

/// Replay a fixed decision sequence, skipping settled atoms, then retire.
pub fn warmstart_brancher(decs: Vec<Atom>) -> Box<dyn Brancher> {
    Box::new(WarmstartBrancher { decs, idx: 0 })
}

struct WarmstartBrancher {
    decs: Vec<Atom>,
    idx: usize,
}

impl Brancher for WarmstartBrancher {
    fn select(&mut self, engine: &Engine) -> Option<Atom> {
        while self.idx < self.decs.len() {
            let at = self.decs[self.idx];
            if engine.state.is_entailed(at) || engine.state.is_inconsistent(at) {
                self.idx += 1;
                continue;
            }
            self.idx += 1;
            return Some(at);
        }
        None
    }
}

/// Activity-guided fallback over every predicate pair, with polarity hints.
#[derive(Debug, Default)]
pub struct DefaultBrancher;

impl Brancher for DefaultBrancher {
    fn select(&mut self, engine: &Engine) -> Option<Atom> {
        let pairs = engine.state.num_preds() / 2;
        let mut best: Option<usize> = None;
        let mut best_act = f64::NEG_INFINITY;
        for pair in 1..pairs {
            let pid = PredId::new(2 * pair as u32);
            if engine.state.is_fixed(pid) {
                continue;
            }
            let act = engine.activity(pair);
            if act > best_act {
                best_act = act;
                best = Some(pair);
            }
        }
        let pair = best?;
        let pid = PredId::new(2 * pair as u32);
        let lb = engine.state.p_vals[pid.idx()];
        let ub = pval_inv(engine.state.p_vals[pid.inv().idx()]);
        Some(if engine.polarity[pair] {
            Atom::new(pid, ub)
        } else {
            !Atom::new(pid, lb + 1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxicp_engine::SolverConfig;

    #[test]
    fn test_basic_brancher_first_fail() {
        let mut engine = Engine::new(SolverConfig::default());
        let x = engine.new_intvar(0, 9);
        let y = engine.new_intvar(0, 2);
        let mut b = BasicBrancher {
            varc: VarChoice::FirstFail,
            valc: ValChoice::Min,
            vars: vec![x, y],
        };
        // y has the smaller domain: decide y ≤ 0.
        assert_eq!(b.select(&engine), Some(y.le(0)));
    }

    #[test]
    fn test_default_brancher_closes_search() {
        let mut engine = Engine::new(SolverConfig::default());
        let x = engine.new_intvar(3, 7);
        let mut b = DefaultBrancher;
        let at = b.select(&engine).expect("x is unfixed");
        // Default polarity caps at the lower bound.
        assert_eq!(at, x.le(3));
    }

    #[test]
    fn test_warmstart_skips_settled() {
        let mut engine = Engine::new(SolverConfig::default());
        let x = engine.new_intvar(0, 5);
        engine.post(x.ge(3));
        let mut b = WarmstartBrancher {
            decs: vec![x.ge(3), x.ge(4)],
            idx: 0,
        };
        // x ≥ 3 already holds; the next usable decision is x ≥ 4.
        assert_eq!(b.select(&engine), Some(x.ge(4)));
        assert_eq!(b.select(&engine), None);
    }
}
