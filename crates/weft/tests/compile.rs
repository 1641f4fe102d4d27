use weft::{
    Accumulator, ClosureTable, CompileError, Grammar, GrammarDef, Options, Rule, Value,
};

const WORD_LIST: &str = r#"{
    "title": "word list",
    "start": "list",
    "epilogue": "ltr",
    "productions": [
        {
            "name": "list",
            "expr": {"kind": "tag", "action": "keep", "children": [
                {"kind": "sequence", "children": [
                    {"kind": "identifier", "name": "word"},
                    {"kind": "repeat", "children": [
                        {"kind": "sequence", "children": [
                            {"kind": "token", "text": ","},
                            {"kind": "identifier", "name": "word"}
                        ]}
                    ]}
                ]}
            ]}
        },
        {
            "name": "word",
            "expr": {"kind": "tag", "action": "upper; wrap", "children": [
                {"kind": "times", "min": 1, "children": [
                    {"kind": "range", "low": 97, "high": 122}
                ]}
            ]}
        }
    ]
}"#;

#[test]
fn test_word_list_end_to_end() {
    let def: GrammarDef = serde_json::from_str(WORD_LIST).unwrap();
    assert_eq!(def.metadata.title.as_deref(), Some("word list"));
    let grammar = Grammar::new(def).unwrap();

    let tree = grammar.interpret(b"ab, cd", &Options::default()).unwrap();
    let compiled = grammar
        .compile(&tree, &mut ClosureTable::with_builtins())
        .unwrap();

    assert_eq!(
        serde_json::to_value(&compiled.value).unwrap(),
        serde_json::json!({"arr": ["AB", "CD"], "in": "ab,cd"})
    );
    assert_eq!(compiled.ltr, "ab,cd");
    assert!(compiled.stack.is_empty());
}

#[test]
fn test_sequence_without_actions_concatenates() {
    let grammar = Grammar::new(GrammarDef::default().production(
        "abc",
        Rule::sequence(vec![Rule::token("a"), Rule::token("b"), Rule::token("c")]),
    ))
    .unwrap();

    let tree = grammar.interpret(b"a bc", &Options::default()).unwrap();
    let compiled = grammar.compile(&tree, &mut ClosureTable::new()).unwrap();
    assert_eq!(compiled.value.input(), "abc");
    assert_eq!(compiled.value.len(), 1);
}

#[test]
fn test_prologue_output_comes_first() {
    let grammar = Grammar::new(
        GrammarDef::default()
            .production(
                "start",
                Rule::sequence(vec![
                    Rule::tag("body", Rule::times(1, None, Rule::range('a', 'z'))),
                    Rule::command("be", vec![Rule::number(1)]),
                ]),
            )
            .prologue("header"),
    )
    .unwrap();

    let mut table = ClosureTable::with_builtins();
    table.register("header", |mut acc, _| {
        acc.insert("str_out", Value::from("header:"));
        Ok(acc)
    });
    table.register("body", |acc, _| {
        let mut out = Accumulator::new();
        out.insert("str_out", Value::Str(acc.input()));
        Ok(out)
    });

    let tree = grammar.interpret(b"abc\x05", &Options::default()).unwrap();
    let compiled = grammar.compile(&tree, &mut table).unwrap();

    assert_eq!(compiled.value.get("str_out"), Some(&Value::from("header:abc")));
    assert_eq!(compiled.value.get("num"), Some(&Value::Number(5)));
    assert_eq!(compiled.ltr, "abc");
}

#[test]
fn test_stack_survives_between_actions() {
    // every item is pushed, the epilogue pops the last one back into `in`
    let grammar = Grammar::new(
        GrammarDef::default()
            .production(
                "items",
                Rule::repeat(Rule::tag("lower;push", Rule::times(1, None, Rule::range('A', 'Z')))),
            )
            .epilogue("clear;pop"),
    )
    .unwrap();

    let tree = grammar.interpret(b"AB CD", &Options::default()).unwrap();
    let compiled = grammar
        .compile(&tree, &mut ClosureTable::with_builtins())
        .unwrap();

    assert_eq!(compiled.value.input(), "cd");
    assert_eq!(compiled.stack, [Value::from("ab")]);
}

#[test]
fn test_unknown_action_fails() {
    let grammar = Grammar::new(GrammarDef::default().production(
        "start",
        Rule::sequence(vec![Rule::token("x"), Rule::tag("nope", Rule::token("y"))]),
    ))
    .unwrap();

    let tree = grammar.interpret(b"xy", &Options::default()).unwrap();
    let err = grammar
        .compile(&tree, &mut ClosureTable::with_builtins())
        .unwrap_err();

    let CompileError::Action { position, .. } = &err;
    assert_eq!(*position, 1);
    assert_eq!(err.to_string(), "action {nope} at 1 failed: no action named `nope`");
}

fn name_table() -> ClosureTable {
    let mut table = ClosureTable::new();
    table.register("name", |acc, _| {
        let mut out = Accumulator::new();
        out.insert("name", Value::Str(acc.input()));
        Ok(out)
    });
    table
}

fn compile_letters(expr: Rule) -> serde_json::Value {
    let grammar = Grammar::new(
        GrammarDef::new("start")
            .production("start", expr)
            .tagged("letter", "name", Rule::range('a', 'z')),
    )
    .unwrap();
    let tree = grammar.interpret(b"w x y z", &Options::default()).unwrap();
    let compiled = grammar.compile(&tree, &mut name_table()).unwrap();
    serde_json::to_value(&compiled.value).unwrap()
}

#[test]
fn test_contributions_follow_grouping() {
    let letter = || Rule::ident("letter");

    let flat = compile_letters(Rule::group(vec![letter(), letter(), letter(), letter()]));
    assert_eq!(flat, serde_json::json!({"name": ["w", "x", "y", "z"]}));

    let grouped = compile_letters(Rule::group(vec![
        Rule::group(vec![letter(), letter()]),
        Rule::group(vec![letter(), letter()]),
    ]));
    assert_eq!(grouped, serde_json::json!({"name": [["w", "x"], ["y", "z"]]}));

    let right = compile_letters(Rule::group(vec![
        letter(),
        Rule::group(vec![letter(), letter(), letter()]),
    ]));
    assert_eq!(right, serde_json::json!({"name": ["w", ["x", "y", "z"]]}));
}

#[test]
fn test_action_position_skips_leading_spacing() {
    let grammar = Grammar::new(
        GrammarDef::default().production("start", Rule::tag("nope", Rule::token("x"))),
    )
    .unwrap();

    let tree = grammar.interpret(b"  x", &Options::default()).unwrap();
    let CompileError::Action { position, .. } = grammar
        .compile(&tree, &mut ClosureTable::new())
        .unwrap_err();
    assert_eq!(position, 2);
}
