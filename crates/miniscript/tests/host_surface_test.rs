//! Host-facing behavior: REPL sessions, multi-line continuation, stepping
//! with a budget, suspendable intrinsics, disposal, and pool accounting.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use miniscript::{Interpreter, Value};
use miniscript_core::pool;

fn capturing_repl() -> (Interpreter, Rc<RefCell<Vec<String>>>, Rc<RefCell<Vec<String>>>) {
    let mut interp = Interpreter::for_repl();
    let output = Rc::new(RefCell::new(Vec::new()));
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = output.clone();
    interp.implicit_output = Some(Rc::new(move |s: &str| {
        sink.borrow_mut().push(s.to_string())
    }));
    let sink = output.clone();
    interp.standard_output = Rc::new(move |s: &str| sink.borrow_mut().push(s.to_string()));
    let sink = errors.clone();
    interp.error_output = Rc::new(move |s: &str| sink.borrow_mut().push(s.to_string()));
    (interp, output, errors)
}

#[test]
fn repl_keeps_globals_between_lines() {
    let (mut interp, output, errors) = capturing_repl();
    interp.repl("x = 6");
    interp.repl("x * 7");
    assert!(errors.borrow().is_empty(), "{:?}", errors.borrow());
    assert_eq!(output.borrow().last().unwrap(), "42");
}

#[test]
fn repl_buffers_incomplete_blocks() {
    let (mut interp, output, errors) = capturing_repl();
    interp.repl("f = function(n)");
    assert!(interp.need_more_input());
    interp.repl("return n + 1");
    assert!(interp.need_more_input());
    interp.repl("end function");
    assert!(!interp.need_more_input());
    interp.repl("f(41)");
    assert!(errors.borrow().is_empty(), "{:?}", errors.borrow());
    assert_eq!(output.borrow().last().unwrap(), "42");
}

#[test]
fn repl_reports_compile_errors_and_recovers() {
    let (mut interp, output, errors) = capturing_repl();
    interp.repl("1 +");
    assert_eq!(errors.borrow().len(), 1);
    assert!(errors.borrow()[0].contains("Compiler Error"));
    interp.repl("2 + 2");
    assert_eq!(output.borrow().last().unwrap(), "4");
}

#[test]
fn underscore_holds_the_last_result() {
    let (mut interp, output, _errors) = capturing_repl();
    interp.repl("6 * 7");
    interp.repl("_ + 1");
    assert_eq!(output.borrow().last().unwrap(), "43");
}

#[test]
fn step_budget_pauses_and_resumes() {
    let mut interp = Interpreter::new("total = 0\nfor i in range(1, 1000)\ntotal = total + i\nend for");
    interp.compile().unwrap();
    interp.run_until_done(10, false);
    assert!(!interp.is_done());
    while !interp.is_done() {
        interp.run_until_done(500, false);
    }
    assert_eq!(
        interp.get_global("total").unwrap().as_number(),
        Some(500500.0)
    );
}

#[test]
fn wait_suspends_and_returns_control() {
    let mut interp = Interpreter::new("wait(0.01)\ndone = 1");
    interp.compile().unwrap();
    // With return-early, the suspended intrinsic hands control back.
    interp.run_until_done(1000, true);
    assert!(!interp.is_done());
    assert!(interp.get_global("done").is_none());
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !interp.is_done() {
        assert!(std::time::Instant::now() < deadline, "wait() never finished");
        interp.run_until_done(1000, true);
    }
    assert_eq!(interp.get_global("done").unwrap().as_number(), Some(1.0));
}

#[test]
fn yield_gives_back_control_for_one_step() {
    let mut interp = Interpreter::new("a = 1\nyield\nb = 2");
    interp.compile().unwrap();
    interp.run_until_done(1000, true);
    assert!(!interp.is_done());
    assert_eq!(interp.get_global("a").unwrap().as_number(), Some(1.0));
    assert!(interp.get_global("b").is_none());
    interp.run_until_done(1000, true);
    assert!(interp.is_done());
    assert_eq!(interp.get_global("b").unwrap().as_number(), Some(2.0));
}

#[test]
fn dispose_discards_suspended_state() {
    let mut interp = Interpreter::new("wait(60)\nnever = 1");
    interp.compile().unwrap();
    interp.run_until_done(1000, true);
    assert!(!interp.is_done());
    interp.dispose();
    assert!(interp.is_done());
    assert!(interp.get_global("never").is_none());
}

#[test]
fn completed_scripts_release_their_lists_and_maps() {
    // Warm up per-thread state (interner, intrinsic registry) first.
    common::run("x = 1");
    let lists_before = pool::lists_in_use();
    let maps_before = pool::maps_in_use();
    {
        let capture = common::run(
            "rows = []\nfor i in range(1, 50)\nrows.push({\"n\": i, \"sq\": [i, i * i]})\nend for\nlen(rows)",
        );
        assert!(capture.errors.is_empty());
        assert_eq!(capture.implicit.last().unwrap(), "50");
    }
    assert_eq!(pool::lists_in_use(), lists_before);
    assert_eq!(pool::maps_in_use(), maps_before);
}

#[test]
fn number_crunching_leaves_the_pools_balanced() {
    common::run("x = 1");
    let lists_before = pool::lists_in_use();
    let maps_before = pool::maps_in_use();
    let capture = common::run("t = 0\ni = 0\nwhile i < 100\ni = i + 1\nt = t + i * i\nend while\nt");
    assert!(capture.errors.is_empty());
    assert_eq!(pool::lists_in_use(), lists_before);
    assert_eq!(pool::maps_in_use(), maps_before);
}

#[test]
fn get_global_reads_script_values() {
    let mut interp = Interpreter::new("m = {\"k\": [1, 2]}");
    interp.run();
    let m = interp.get_global("m").unwrap();
    assert!(matches!(m, Value::Map(_)));
    assert_eq!(m.code_form(3), "{\"k\": [1, 2]}");
}
