//! # matscout-sandbox
//!
//! A restricted interpreter for the Python subset language models write when
//! asked to act through code.
//!
//! The interpreter has no filesystem, network, or process access. Builtins
//! cover printing, conversions, and simple sequence handling; every other
//! call must name a function exposed by the embedding `HostBridge`. Imports
//! are checked against an allow-list and bind inert module markers. Each
//! fragment runs under an operation budget so a runaway loop terminates with
//! an error rather than hanging the agent.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use matscout_sandbox::{Interpreter, ExecOutcome};
//!
//! let mut interpreter = Interpreter::new(vec![]);
//! let execution = interpreter.execute("print(search_by_material('Wood'))", &mut host);
//! assert!(matches!(execution.result, Ok(ExecOutcome::Completed)));
//! ```

pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

pub use error::SandboxError;
pub use interpreter::{
    ExecOutcome, Execution, HostBridge, HostReply, Interpreter, DEFAULT_OPERATION_BUDGET,
};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Host exposing `lookup(x)`, `fail()`, and a terminal `final_answer(x)`.
    /// Records every call it receives.
    struct MockHost {
        calls: Arc<Mutex<Vec<(String, Vec<Value>, Vec<(String, Value)>)>>>,
    }

    impl MockHost {
        fn new() -> (Self, Arc<Mutex<Vec<(String, Vec<Value>, Vec<(String, Value)>)>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (Self { calls: Arc::clone(&calls) }, calls)
        }
    }

    impl HostBridge for MockHost {
        fn provides(&self, name: &str) -> bool {
            matches!(name, "lookup" | "fail" | "final_answer")
        }

        fn call(
            &mut self,
            name: &str,
            args: Vec<Value>,
            kwargs: Vec<(String, Value)>,
        ) -> Result<HostReply, String> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), args.clone(), kwargs.clone()));
            let first = args
                .into_iter()
                .next()
                .or_else(|| kwargs.into_iter().next().map(|(_, v)| v))
                .unwrap_or(Value::Null);
            match name {
                "lookup" => Ok(HostReply::Value(json!({ "Material": first, "Density": 0.7 }))),
                "final_answer" => Ok(HostReply::Finish(first)),
                _ => Err("Error: lookup service unavailable".to_string()),
            }
        }
    }

    fn run(interpreter: &mut Interpreter, code: &str) -> Execution {
        let (mut host, _) = MockHost::new();
        interpreter.execute(code, &mut host)
    }

    // ── Output capture ────────────────────────────────────────────────────────

    #[test]
    fn print_output_is_captured() {
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(&mut interpreter, "print('a', 1, 2.5, None, sep='|')\nprint([1, 'b'])");
        assert_eq!(execution.result, Ok(ExecOutcome::Completed));
        assert_eq!(execution.stdout, "a|1|2.5|None\n[1, 'b']\n");
    }

    #[test]
    fn variables_persist_between_fragments() {
        let mut interpreter = Interpreter::new(vec![]);
        run(&mut interpreter, "total = 40");
        let execution = run(&mut interpreter, "total += 2\nprint(total)");
        assert_eq!(execution.stdout, "42\n");
        assert_eq!(interpreter.variable("total"), Some(&json!(42)));

        interpreter.reset();
        assert!(interpreter.variable("total").is_none(), "reset must forget variables");
    }

    #[test]
    fn error_keeps_partial_stdout() {
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(&mut interpreter, "print('before')\nx = 1 / 0\nprint('after')");
        assert_eq!(execution.stdout, "before\n");
        assert_eq!(execution.result, Err(SandboxError::ZeroDivision));
    }

    // ── Host calls ────────────────────────────────────────────────────────────

    #[test]
    fn host_results_flow_into_expressions() {
        let mut interpreter = Interpreter::new(vec![]);
        let (mut host, calls) = MockHost::new();
        let execution = interpreter.execute(
            "row = lookup('Wood')\nprint(row['Material'], row.get('Density'))",
            &mut host,
        );
        assert_eq!(execution.stdout, "Wood 0.7\n");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "lookup");
        assert_eq!(calls[0].1, vec![json!("Wood")]);
    }

    #[test]
    fn finish_stops_execution_immediately() {
        let mut interpreter = Interpreter::new(vec![]);
        let (mut host, calls) = MockHost::new();
        let execution = interpreter.execute(
            "print('deciding')\nfinal_answer(answer='Wood')\nlookup('never')",
            &mut host,
        );
        assert_eq!(execution.stdout, "deciding\n");
        assert_eq!(execution.result, Ok(ExecOutcome::Finished(json!("Wood"))));
        assert_eq!(calls.lock().unwrap().len(), 1, "nothing may run after the terminal call");
    }

    #[test]
    fn host_errors_become_fragment_errors() {
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(&mut interpreter, "fail()");
        assert_eq!(
            execution.result,
            Err(SandboxError::Host("Error: lookup service unavailable".into()))
        );
    }

    #[test]
    fn unknown_functions_are_forbidden() {
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(&mut interpreter, "open('/etc/passwd')");
        assert_eq!(execution.result, Err(SandboxError::Forbidden("open".into())));
    }

    // ── Imports ───────────────────────────────────────────────────────────────

    #[test]
    fn imports_are_checked_against_allow_list() {
        let mut interpreter = Interpreter::new(vec!["math".to_string()]);
        assert_eq!(run(&mut interpreter, "import math").result, Ok(ExecOutcome::Completed));
        assert_eq!(run(&mut interpreter, "from math import sqrt").result, Ok(ExecOutcome::Completed));

        let denied = run(&mut interpreter, "import os");
        assert!(
            matches!(denied.result, Err(SandboxError::Import { ref module, .. }) if module == "os"),
            "os must not be importable: {:?}",
            denied.result
        );
    }

    // ── Budget ────────────────────────────────────────────────────────────────

    #[test]
    fn runaway_loops_exhaust_the_budget() {
        let mut interpreter = Interpreter::new(vec![]).with_operation_budget(500);
        let execution = run(&mut interpreter, "while True:\n    pass");
        assert_eq!(execution.result, Err(SandboxError::Budget(500)));
    }

    // ── Language coverage ─────────────────────────────────────────────────────

    #[test]
    fn arithmetic_follows_python_semantics() {
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(
            &mut interpreter,
            "print(7 // 2, -7 // 2, 7 % -3, 5 / 2, 2 ** 10, round(2.5), round(3.14159, 2))",
        );
        assert_eq!(execution.stdout, "3 -4 -2 2.5 1024 2 3.14\n");
    }

    /// Integer extremes must raise or fall back to floats, never panic.
    #[test]
    fn integer_extremes_do_not_panic() {
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(
            &mut interpreter,
            "low = -9223372036854775807 - 1\n\
             print(low % -1)\n\
             print(9223372036854775806 % 9223372036854775807)\n\
             print(-7 % 9223372036854775807)\n\
             print(list(range(0, -10, low)))\n\
             q = low // -1\n\
             print(q > 0)",
        );
        assert_eq!(execution.result, Ok(ExecOutcome::Completed), "{}", execution.stdout);
        assert_eq!(
            execution.stdout,
            "0\n9223372036854775806\n9223372036854775800\n[0]\nTrue\n"
        );
    }

    #[test]
    fn oversized_repetition_is_an_overflow_error() {
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(&mut interpreter, "print([0] * 3, 'ab' * -2 == '')\ns = 'ab' * 9223372036854775807");
        assert_eq!(execution.stdout, "[0, 0, 0] True\n");
        assert!(
            matches!(execution.result, Err(SandboxError::Overflow(_))),
            "got {:?}",
            execution.result
        );

        let execution = run(&mut interpreter, "x = [1, 2] * 600000");
        assert!(matches!(execution.result, Err(SandboxError::Overflow(_))));
    }

    #[test]
    fn enumerate_past_the_integer_range_is_an_overflow_error() {
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(&mut interpreter, "pairs = list(enumerate([1, 2], start=9223372036854775807))");
        assert!(
            matches!(execution.result, Err(SandboxError::Overflow(_))),
            "got {:?}",
            execution.result
        );

        let execution = run(&mut interpreter, "print(list(enumerate(['a'], start=3)))");
        assert_eq!(execution.stdout, "[[3, 'a']]\n");
    }

    #[test]
    fn control_flow_and_comprehensions() {
        let code = r#"
scores = {"Wood": 0.2, "Copper": 8.1, "Aluminum": 1.4}
light = []
for name, density in scores.items():
    if density < 2:
        light.append(name)
    elif density > 8:
        continue
    else:
        pass
print(", ".join(sorted(light)))
print([n.upper() for n in light if n != "Wood"])
"#;
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(&mut interpreter, code);
        assert_eq!(execution.result, Ok(ExecOutcome::Completed), "{}", execution.stdout);
        assert_eq!(execution.stdout, "Aluminum, Wood\n['ALUMINUM']\n");
    }

    #[test]
    fn fstrings_and_triple_quoted_strings() {
        let code = "name = 'Copper'\nd = 8.96\nprint(f\"{name!r}: {d:.1f} g/cm3, {len(name)} chars\")\nprint('''multi\nline''')";
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(&mut interpreter, code);
        assert_eq!(execution.stdout, "'Copper': 9.0 g/cm3, 6 chars\nmulti\nline\n");
    }

    #[test]
    fn syntax_errors_report_a_line() {
        let mut interpreter = Interpreter::new(vec![]);
        let execution = run(&mut interpreter, "x = 1\ny = (2 +\n");
        assert!(matches!(execution.result, Err(SandboxError::Syntax { .. })));
        assert!(execution.stdout.is_empty());
    }
}
