//! Property-based checks against brute force on small instances.

use proptest::prelude::*;

use oxicp_solver::{Atom, Limits, SolveResult, Solver};

const VARS: usize = 5;

/// A clause as (variable index, polarity) pairs.
type TinyClause = Vec<(usize, bool)>;

fn clause_strategy() -> impl Strategy<Value = TinyClause> {
    prop::collection::vec((0..VARS, any::<bool>()), 1..=3)
}

fn cnf_strategy() -> impl Strategy<Value = Vec<TinyClause>> {
    prop::collection::vec(clause_strategy(), 1..=8)
}

fn brute_force_sat(cnf: &[TinyClause]) -> bool {
    (0..1u32 << VARS).any(|m| {
        cnf.iter().all(|cl| {
            cl.iter()
                .any(|&(v, pol)| ((m >> v) & 1 == 1) == pol)
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_agrees_with_brute_force(cnf in cnf_strategy()) {
        let mut s = Solver::new();
        let bs: Vec<Atom> = (0..VARS).map(|_| s.new_bool()).collect();
        let mut root_unsat = false;
        for cl in &cnf {
            let lits: Vec<Atom> = cl
                .iter()
                .map(|&(v, pol)| if pol { bs[v] } else { !bs[v] })
                .collect();
            if !s.post_clause(&lits) {
                root_unsat = true;
            }
        }
        let expected = brute_force_sat(&cnf);
        if root_unsat {
            prop_assert!(!expected);
        }
        let got = s.solve(Limits::unlimited());
        match got {
            SolveResult::Sat => {
                prop_assert!(expected);
                // The model satisfies every clause.
                let m = s.get_model();
                for cl in &cnf {
                    let ok = cl
                        .iter()
                        .any(|&(v, pol)| m.value(bs[v]) == pol);
                    prop_assert!(ok, "model violates a clause");
                }
            }
            SolveResult::Unsat => prop_assert!(!expected),
            SolveResult::Unknown => prop_assert!(false, "unlimited solve returned unknown"),
        }
    }

    #[test]
    fn prop_assumption_core_is_subset_and_unsat(cnf in cnf_strategy(), pols in prop::collection::vec(any::<bool>(), VARS)) {
        let mut s = Solver::new();
        let bs: Vec<Atom> = (0..VARS).map(|_| s.new_bool()).collect();
        for cl in &cnf {
            let lits: Vec<Atom> = cl
                .iter()
                .map(|&(v, pol)| if pol { bs[v] } else { !bs[v] })
                .collect();
            s.post_clause(&lits);
        }
        let assumed: Vec<Atom> = bs
            .iter()
            .zip(&pols)
            .map(|(&b, &p)| if p { b } else { !b })
            .collect();
        for &a in &assumed {
            s.assume(a);
        }
        if s.solve(Limits::unlimited()) == SolveResult::Unsat {
            let core = s.get_conflict().to_vec();
            // Every core atom is a pushed assumption.
            for at in &core {
                prop_assert!(assumed.contains(at));
            }
            // Re-asserting just the core is still unsatisfiable.
            let mut s2 = Solver::new();
            let bs2: Vec<Atom> = (0..VARS).map(|_| s2.new_bool()).collect();
            for cl in &cnf {
                let lits: Vec<Atom> = cl
                    .iter()
                    .map(|&(v, pol)| if pol { bs2[v] } else { !bs2[v] })
                    .collect();
                s2.post_clause(&lits);
            }
            for (i, &a) in assumed.iter().enumerate() {
                if core.contains(&a) {
                    let b2 = if a == bs[i] { bs2[i] } else { !bs2[i] };
                    s2.assume(b2);
                }
            }
            prop_assert_eq!(s2.solve(Limits::unlimited()), SolveResult::Unsat);
        }
    }

    #[test]
    fn prop_bounds_restored_exactly(steps in prop::collection::vec(1..20i64, 1..6)) {
        use oxicp_engine::{propagate, Engine, PropagatorStore, Reason, SolverConfig};
        let mut engine = Engine::new(SolverConfig::default());
        let mut props = PropagatorStore::default();
        let x = engine.new_intvar(0, 200);

        let mut lbs = vec![engine.lb(x)];
        let mut acc = 0;
        for d in &steps {
            acc += d;
            engine.push_level();
            prop_assert!(engine.enqueue(x.ge(acc), Reason::Decision));
            prop_assert!(propagate(&mut engine, &mut props));
            lbs.push(engine.lb(x));
        }
        for level in (0..steps.len()).rev() {
            engine.bt_to_level(level);
            prop_assert_eq!(engine.lb(x), lbs[level]);
        }
        prop_assert_eq!(engine.ub(x), 200);
    }
}
