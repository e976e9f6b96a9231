//! Bound restoration across decision levels, driven through the engine.

use oxicp_engine::{propagate, Engine, PropagatorStore, Reason, SolverConfig};

#[test]
fn test_push_set_pop_restores_bound() {
    let mut engine = Engine::new(SolverConfig::default());
    let mut props = PropagatorStore::default();
    let x = engine.new_intvar(0, 10);
    assert!(propagate(&mut engine, &mut props));

    engine.push_level();
    assert!(engine.enqueue(x.ge(5), Reason::Decision));
    assert!(propagate(&mut engine, &mut props));
    assert_eq!(engine.lb(x), 5);

    engine.bt_to_level(0);
    assert_eq!(engine.lb(x), 0);
    assert_eq!(engine.ub(x), 10);
}

#[test]
fn test_nested_levels_restore_in_order() {
    let mut engine = Engine::new(SolverConfig::default());
    let mut props = PropagatorStore::default();
    let x = engine.new_intvar(0, 100);

    let mut lbs = vec![engine.lb(x)];
    for step in [10, 25, 40] {
        engine.push_level();
        assert!(engine.enqueue(x.ge(step), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        lbs.push(engine.lb(x));
    }
    assert_eq!(lbs, vec![0, 10, 25, 40]);

    engine.bt_to_level(2);
    assert_eq!(engine.lb(x), 25);
    engine.bt_to_level(1);
    assert_eq!(engine.lb(x), 10);
    engine.bt_to_level(0);
    assert_eq!(engine.lb(x), 0);
}

#[test]
fn test_monotone_within_level() {
    let mut engine = Engine::new(SolverConfig::default());
    let mut props = PropagatorStore::default();
    let x = engine.new_intvar(0, 100);

    engine.push_level();
    let mut prev = engine.lb(x);
    for step in [3, 7, 7, 20] {
        assert!(engine.enqueue(x.ge(step), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert!(engine.lb(x) >= prev);
        prev = engine.lb(x);
    }
    assert_eq!(prev, 20);
    engine.bt_to_level(0);
    assert_eq!(engine.lb(x), 0);
}
