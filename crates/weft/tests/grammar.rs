use weft::{Grammar, GrammarDef, GrammarError, Options, Rule, StartRef};

const GREETING: &str = r#"{
    "start": 1,
    "productions": [
        {"name": "name", "expr": {"kind": "times", "min": 1, "children": [
            {"kind": "range", "low": 97, "high": 122}
        ]}},
        {"name": "greeting", "expr": {"kind": "sequence", "children": [
            {"kind": "token", "text": "hello"},
            {"kind": "identifier", "name": "name", "position": 9}
        ]}}
    ]
}"#;

#[test]
fn test_load_json_with_start_index() {
    let def: GrammarDef = serde_json::from_str(GREETING).unwrap();
    assert_eq!(def.start, StartRef::Index(1));

    let grammar = Grammar::new(def).unwrap();
    assert_eq!(grammar.start(), grammar.lookup("greeting").unwrap());
    assert!(grammar.interpret(b"hello world", &Options::default()).is_ok());
    assert!(grammar.interpret(b"hello", &Options::default()).is_err());
}

#[test]
fn test_load_json_reports_positions() {
    let json = GREETING.replace(
        r#""kind": "identifier", "name": "name""#,
        r#""kind": "identifier", "name": "nobody""#,
    );
    let def: GrammarDef = serde_json::from_str(&json).unwrap();

    let errors = Grammar::new(def).unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        GrammarError::UnresolvedIdentifier { name, position: 9 } if &**name == "nobody"
    )));
}

#[test]
fn test_definitions_round_trip_through_json() {
    let def = GrammarDef::new("pair")
        .production("pair", Rule::sequence(vec![Rule::ident("item"), Rule::ident("item")]))
        .tagged("item", "upper", Rule::byte_range(b'a', b'z'))
        .epilogue("ltr");

    let json = serde_json::to_string(&def).unwrap();
    let back: GrammarDef = serde_json::from_str(&json).unwrap();
    assert_eq!(def, back);
}

#[test]
fn test_grammar_is_shared_between_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Grammar>();

    let grammar = Grammar::new(
        GrammarDef::default().production("digits", Rule::times(1, None, Rule::range('0', '9'))),
    )
    .unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let grammar = &grammar;
                scope.spawn(move || {
                    let input = i.to_string().repeat(i + 1);
                    let options = Options {
                        memoize: i % 2 == 0,
                        ..Options::default()
                    };
                    grammar.interpret(input.as_bytes(), &options).is_ok()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    });
}

#[test]
fn test_display_lists_productions() {
    let grammar = Grammar::new(
        GrammarDef::new("b")
            .production("a", Rule::token("x"))
            .production("b", Rule::optional(Rule::ident("a"))),
    )
    .unwrap();

    let mut out = String::new();
    grammar.display_into(&mut out).unwrap();
    assert_eq!(
        out,
        "a =\n  Token(\"x\") @0\nb (start) =\n  Optional @0\n    Identifier(a) @0\n"
    );
}
