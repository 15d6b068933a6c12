//! End-to-end properties of the compiler and the runtime.

use std::{cell::RefCell, rc::Rc, sync::Arc};

use proptest::prelude::*;

use quill::{
    common::opcode::{Opcode, Operand},
    compiler,
    value::operator::{binary_capability, compare_capability, Operation},
    vm::Fault,
    Container, Environment, Native, PluginContext, Runtime, ScriptCache, Source, Status,
    TranslationTable, Value,
};

fn container(source: &str) -> Arc<Container> {
    Arc::new(compiler::compile(&Source::new(source, "scenario")).unwrap())
}

fn run(source: &str, environment: Environment) -> Result<Status, quill::RuntimeError> {
    Runtime::new("scenario", container(source), environment).run()
}

fn value(source: &str, environment: Environment) -> Value {
    match run(source, environment) {
        Ok(Status::Finished(finished)) => finished.value,
        other => panic!("expected the script to finish, got {:?}", other),
    }
}

/// Walks the code stream, yielding each instruction's offset and opcode.
fn instructions(container: &Container) -> Vec<(usize, Opcode)> {
    let mut found = vec![];
    let mut index = 0;
    while index < container.code.len() {
        let opcode = Opcode::from_byte(container.code[index]).unwrap();
        found.push((index, opcode));
        index += 1 + match opcode.operand() {
            Operand::None => 0,
            Operand::Integer | Operand::Float => 8,
            Operand::Varint => quill::common::number::build_number(&container.code[index + 1..]).unwrap().1,
        };
    }
    found
}

#[test]
fn scenario_a_addition() {
    assert_eq!(value("1 + 2", Environment::new()), Value::Integer(3));
}

#[test]
fn scenario_b_constant_reassignment() {
    let error = run("@#X = 5\n@X = 6", Environment::new()).unwrap_err();
    assert_eq!(error.fault, Fault::ConstantReassignment { name: "X".to_string() });
    assert!(error.to_string().contains("can not reassign constant 'X'"));
    assert_eq!(error.trace.last().and_then(|frame| frame.position).map(|p| p.line), Some(1));
}

#[test]
fn scenario_c_lexical_scoping() {
    // `caller` binds its own `name`, which `lookup` must not see
    let source = "\
        @name = 'declaration'\n\
        @result = ''\n\
        function lookup() { return @name }\n\
        function caller(name) { return lookup() }\n\
        {\n\
            @result = caller(name = 'call site')\n\
        }\n\
        @result";
    assert_eq!(value(source, Environment::new()), Value::from("declaration"));
}

#[test]
fn scenario_d_translation_fallback() {
    // eight distinct translatable strings, numbered 0 to 7
    let source = ["zero", "one", "two", "three", "four", "five", "six", "seven"]
        .iter()
        .map(|text| format!("\"{}\"", text))
        .collect::<Vec<_>>()
        .join("\n");

    let compiled = container(&source);
    assert_eq!(compiled.translations.get(7), Some("seven"));

    let full = |_: &str, language: &str| match language {
        "en" => Some((0..8).map(|id| (id, format!("en {}", id))).collect::<TranslationTable>()),
        _ => None,
    };
    let environment = Environment::new().with_translator(full).with_language("en");
    let resolved = value(&source, environment);
    assert_eq!(resolved.text(), Some("en 7"));

    let partial = |_: &str, language: &str| match language {
        "en" => Some((0..7).map(|id| (id, format!("en {}", id))).collect::<TranslationTable>()),
        _ => None,
    };
    let environment = Environment::new().with_translator(partial).with_language("en");
    let resolved = value(&source, environment);
    assert_eq!(resolved.text(), Some("seven"));
}

#[test]
fn scenario_e_forward_branch() {
    let source = "@flag = false\nif @flag { [Record what='skipped'] }\n[Record what='ran']";
    let compiled = container(source);

    let code = instructions(&compiled);
    let (offset, _) = code.iter().find(|(_, opcode)| *opcode == Opcode::BranchIfFalse).unwrap();
    let (id, _) = quill::common::number::build_number(&compiled.code[offset + 1..]).unwrap();
    let target = compiled.label(id).unwrap();

    // the target is later in the stream, on an instruction boundary past the plugin call
    let first_plugin = code.iter().find(|(_, opcode)| *opcode == Opcode::Plugin).unwrap().0;
    assert!(target > first_plugin);
    assert!(code.iter().any(|(at, _)| *at == target));

    let seen = Rc::new(RefCell::new(vec![]));
    let log = seen.clone();
    let environment = Environment::new().with_plugin("Record", move |context: &PluginContext| {
        log.borrow_mut().push(context.get("what").map(Value::to_text).unwrap_or_default());
        Ok(Native::Ready(Value::Null))
    });
    Runtime::new("scenario", compiled, environment).run().unwrap();
    assert_eq!(*seen.borrow(), vec!["ran".to_string()]);
}

#[test]
fn round_trip() {
    let source = "\
        @#GREETING = \"Hello\"\n\
        function greet(who = 'you') { return @#GREETING + ', ' + @who }\n\
        while false { }\n\
        export @result = greet()";

    let (first, _) = quill::compile(source, "round").unwrap();
    let (second, _) = quill::compile(source, "round").unwrap();
    assert_eq!(first, second);

    let decoded = Container::decode(&first).unwrap();
    assert_eq!(decoded.encode(), first);
    assert_eq!(*container(source), decoded);

    let cache = ScriptCache::new();
    let cached = cache.compile_if_changed(&Source::new(source, "round")).unwrap();
    let reused = cache.compile_if_changed(&Source::new(source, "round")).unwrap();
    assert!(Arc::ptr_eq(&cached, &reused));
    let edited = cache.compile_if_changed(&Source::new(&format!("{}\n", source), "round")).unwrap();
    assert!(!Arc::ptr_eq(&cached, &edited));
}

#[test]
fn idempotence() {
    let compiled = container("export @a = 1 + 2\n@b = 'x' * 3\nexport @b\nfunction f() { 1 }\nexport @f");
    let exports = |_| match Runtime::new("scenario", compiled.clone(), Environment::new()).run() {
        Ok(Status::Finished(finished)) => finished.exports,
        other => panic!("expected the script to finish, got {:?}", other),
    };
    let first = exports(());
    for _ in 0..3 {
        assert_eq!(exports(()), first);
    }
}

const LITERALS: [&str; 6] = ["null", "true", "7", "2.5", "'text'", "\"words\""];

proptest! {
    #[test]
    fn scope_invariant(outer in "[a-z]{1,8}", inner in "[a-z]{1,8}") {
        let source = format!(
            "@o_{o} = 1\n\
             @reached = false\n\
             {{\n\
                 @i_{i} = 2\n\
                 @reached = @o_{o} == 1 && @i_{i} == 2\n\
             }}\n\
             @reached && @i_{i} == null && @o_{o} == 1",
            o = outer,
            i = inner,
        );
        prop_assert_eq!(value(&source, Environment::new()), Value::Boolean(true));
    }

    #[test]
    fn constant_invariant(n in any::<i32>()) {
        let source = format!("@#K = {}\n@#K + @K", n);
        prop_assert_eq!(value(&source, Environment::new()), Value::Integer(2 * n as i64));

        let source = format!("@#K = {}\n{{ @K = 0 }}", n);
        let error = run(&source, Environment::new()).unwrap_err();
        prop_assert_eq!(error.fault, Fault::ConstantReassignment { name: "K".to_string() });
    }

    #[test]
    fn operator_dispatch(
        left in 0..LITERALS.len(),
        right in 0..LITERALS.len(),
        operation in prop::sample::select(vec![
            (Operation::Add, "+"),
            (Operation::Subtract, "-"),
            (Operation::Multiply, "*"),
            (Operation::Divide, "/"),
            (Operation::Compare, "<"),
        ]),
    ) {
        let (operation, symbol) = operation;
        let source = format!("({}) {} ({})", LITERALS[left], symbol, LITERALS[right]);
        let left_kind = match quill::run(LITERALS[left], "kind") {
            Ok(Status::Finished(finished)) => finished.value.kind(),
            other => panic!("literal did not evaluate: {:?}", other),
        };

        let capable = match operation {
            Operation::Compare => compare_capability(left_kind).is_some(),
            _ => binary_capability(operation, left_kind).is_some(),
        };

        if !capable {
            let error = run(&source, Environment::new()).unwrap_err();
            prop_assert!(error.fault.to_string().contains(&operation.to_string()));
        }
    }

    #[test]
    fn integer_addition(a in any::<i32>(), b in any::<i32>()) {
        let source = format!("({}) + ({})", a, b);
        prop_assert_eq!(value(&source, Environment::new()), Value::Integer(a as i64 + b as i64));
    }

    #[test]
    fn integer_and_string(a in any::<i32>(), text in "[a-z]{1,6}") {
        let source = format!("({}) + '{}'", a, a);
        prop_assert_eq!(value(&source, Environment::new()), Value::Integer(2 * a as i64));

        let source = format!("({}) + '{}'", a, text);
        let error = run(&source, Environment::new()).unwrap_err();
        let is_not_a_number = matches!(
            error.fault,
            Fault::Operator(quill::value::operator::OperatorError::NotANumber(_))
        );
        prop_assert!(is_not_a_number);
    }
}
