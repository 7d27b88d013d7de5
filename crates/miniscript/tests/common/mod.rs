use std::cell::RefCell;
use std::rc::Rc;

use miniscript::Interpreter;

/// Everything a script emitted, by sink.
pub struct Capture {
    pub implicit: Vec<String>,
    pub output: Vec<String>,
    pub errors: Vec<String>,
}

/// Run a source text to completion, capturing all three sinks.
pub fn run(src: &str) -> Capture {
    let implicit = Rc::new(RefCell::new(Vec::new()));
    let output = Rc::new(RefCell::new(Vec::new()));
    let errors = Rc::new(RefCell::new(Vec::new()));

    let mut interp = Interpreter::new(src);
    let sink = implicit.clone();
    interp.implicit_output = Some(Rc::new(move |s: &str| {
        sink.borrow_mut().push(s.to_string())
    }));
    let sink = output.clone();
    interp.standard_output = Rc::new(move |s: &str| sink.borrow_mut().push(s.to_string()));
    let sink = errors.clone();
    interp.error_output = Rc::new(move |s: &str| sink.borrow_mut().push(s.to_string()));
    interp.run();

    let implicit = implicit.borrow().clone();
    let output = output.borrow().clone();
    let errors = errors.borrow().clone();

    Capture {
        implicit,
        output,
        errors,
    }
}

/// Run and return the last implicit (statement-result) output, asserting
/// the script finished cleanly.
pub fn last_implicit(src: &str) -> String {
    let capture = run(src);
    assert!(
        capture.errors.is_empty(),
        "script errored: {:?}\nsource: {src}",
        capture.errors
    );
    capture
        .implicit
        .last()
        .unwrap_or_else(|| panic!("no implicit output for: {src}"))
        .clone()
}

/// Run and return everything `print` emitted.
pub fn printed(src: &str) -> Vec<String> {
    let capture = run(src);
    assert!(
        capture.errors.is_empty(),
        "script errored: {:?}\nsource: {src}",
        capture.errors
    );
    capture.output
}

/// Run and return the first reported error.
pub fn first_error(src: &str) -> String {
    let capture = run(src);
    assert!(
        !capture.errors.is_empty(),
        "expected an error from: {src}"
    );
    capture.errors[0].clone()
}

/// Generate scenario tests: each entry runs a source text and compares the
/// last statement-result output.
#[macro_export]
macro_rules! scenario_tests {
    ($($name:ident : $src:expr => $expected:expr),* $(,)?) => {
        $(
            paste::paste! {
                #[test]
                fn [<scenario_ $name>]() {
                    let got = common::last_implicit($src);
                    assert_eq!(got, $expected, "source: {}", $src);
                }
            }
        )*
    };
}
