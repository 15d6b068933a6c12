//! Snippet tests for the quill pipeline as a whole.
//! Each snippet in `tests/snippets` starts with a heading of comments:
//! ```plain
//! // action: run
//! // outcome: success
//! // expect: 42
//! ```

use std::{collections::HashMap, fs, path::PathBuf, rc::Rc};

use quill::{
    common::source::Source,
    compiler::{gen, lex, parse},
    Environment, Native, PluginContext, Runtime, Status, Value,
};

/// Represents specific success/failure modes of a snippet test.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Syntax,
    Trace,
}

impl Outcome {
    pub fn parse(outcome: &str) -> Outcome {
        match outcome {
            "success" => Outcome::Success,
            "syntax" => Outcome::Syntax,
            "trace" => Outcome::Trace,
            invalid => panic!("invalid outcome '{}' in strat heading", invalid),
        }
    }
}

/// Represents what part of the pipeline a snippet tests.
#[derive(Debug)]
pub enum Action {
    Lex,
    Parse,
    Gen,
    Run,
}

impl Action {
    pub fn parse(action: &str) -> Action {
        match action {
            "lex" => Action::Lex,
            "parse" => Action::Parse,
            "gen" => Action::Gen,
            "run" => Action::Run,
            invalid => panic!("invalid action '{}' in strat heading", invalid),
        }
    }
}

/// Represents a test strategy for executing a snippet,
/// found at the top of each file.
#[derive(Debug)]
pub struct TestStrat {
    /// How to run the test.
    action: Action,
    /// The expected outcome.
    outcome: Outcome,
    /// Optional value to check the script's result against.
    /// Should only be used with `Action::Run`.
    expect: Option<Value>,
}

impl TestStrat {
    /// Uses a heading to construct a test strat.
    pub fn heading(heading: HashMap<String, String>) -> TestStrat {
        let mut outcome = None;
        let mut action = None;
        let mut expect = None;

        for (strat, result) in heading.iter() {
            match strat.as_str() {
                "outcome" => outcome = Some(Outcome::parse(result)),
                "action" => action = Some(Action::parse(result)),
                "expect" => expect = Some(evaluate(result)),
                invalid => panic!("invalid strat '{}' in strat heading", invalid),
            }
        }

        TestStrat {
            outcome: outcome.expect("no outcome provided"),
            action: action.expect("no action provided"),
            expect,
        }
    }

    /// Parses the test strat from a given snippet.
    pub fn snippet(source: &Rc<Source>) -> TestStrat {
        let mut heading = HashMap::new();

        // build up a list of key-value pairs
        for line in source.contents.lines() {
            let line = match line.strip_prefix("//") {
                Some(line) => line,
                None => break,
            };

            let (strat, result) = line.split_once(':').expect("Missing colon in test strat heading");
            if heading.insert(strat.trim().to_string(), result.trim().to_string()).is_some() {
                panic!("Key present twice in test strat heading");
            }
        }

        TestStrat::heading(heading)
    }
}

/// Expectations are written as quill expressions.
fn evaluate(expression: &str) -> Value {
    match quill::run(expression, "expect") {
        Ok(Status::Finished(finished)) => finished.value,
        other => panic!("could not evaluate expectation '{}': {:?}", expression, other),
    }
}

/// Plugins every snippet can call.
fn environment() -> Environment {
    Environment::new()
        .with_plugin("Dialogue", |_: &PluginContext| Ok(Native::Ready(Value::Null)))
        .with_plugin("Print", |context: &PluginContext| {
            for (key, value) in context.parameters {
                println!("{} = {}", key, value);
            }
            Ok(Native::Ready(Value::Null))
        })
}

fn test_snippet(source: Rc<Source>, strat: TestStrat) {
    let succeeded = |ok: bool| if ok { Outcome::Success } else { Outcome::Syntax };

    let actual_outcome = match strat.action {
        Action::Lex => succeeded(lex(&source).is_ok()),
        Action::Parse => succeeded(lex(&source).and_then(|t| parse(t, &source)).is_ok()),
        Action::Gen => succeeded(
            lex(&source)
                .and_then(|t| parse(t, &source))
                .and_then(|tree| gen(&tree, &source))
                .is_ok(),
        ),
        Action::Run => match Runtime::compile(&source, environment()) {
            Err(error) => {
                println!("{}", error);
                Outcome::Syntax
            },
            Ok(mut runtime) => match runtime.run() {
                Ok(Status::Finished(finished)) => {
                    if let Some(expected) = &strat.expect {
                        if expected != &finished.value {
                            println!("Result: {}", finished.value);
                            println!("Expected: {}", expected);
                            panic!("Result does not match the expectation")
                        }
                    }
                    Outcome::Success
                },
                Ok(status) => panic!("snippet did not finish: {:?}", status),
                Err(trace) => {
                    println!("{}", trace);
                    Outcome::Trace
                },
            },
        },
    };

    if actual_outcome != strat.outcome {
        println!("expected outcome {:?}", strat.outcome);
        println!("actual outcome {:?}", actual_outcome);
        panic!("test failed, outcomes are not the same");
    }
}

#[test]
fn test_snippets() {
    let paths = fs::read_dir("./tests/snippets")
        .expect("You must be in the base quill directory, snippets in ./tests/snippets");

    let mut to_run: Vec<PathBuf> = vec![];
    for path in paths {
        to_run.push(path.expect("Could not read path").path())
    }
    to_run.sort();

    println!("\nRunning {} snippet test(s)...", to_run.len());

    for (counter, path) in to_run.iter().enumerate() {
        println!("test {}: {}...", counter, path.display());

        let source = Source::path(path).expect("Could not get snippet source");
        let test_strat = TestStrat::snippet(&source);

        test_snippet(source, test_strat);
    }

    println!("All tests passed!\n");
}
