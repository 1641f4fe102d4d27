use proptest::{prelude::*, test_runner::TestCaseError};
use weft::{Grammar, GrammarDef, Options, Rule, RuleKind};

fn arithmetic() -> Grammar {
    // expr = term ("+" term)*
    // term = num | "(" expr ")"
    // num = ["0"-"9"]+
    Grammar::new(
        GrammarDef::new("expr")
            .production(
                "expr",
                Rule::sequence(vec![
                    Rule::ident("term"),
                    Rule::repeat(Rule::sequence(vec![Rule::token("+"), Rule::ident("term")])),
                ]),
            )
            .production(
                "term",
                Rule::choice(vec![
                    Rule::ident("num"),
                    Rule::sequence(vec![Rule::token("("), Rule::ident("expr"), Rule::token(")")]),
                ]),
            )
            .production(
                "num",
                Rule::group(vec![Rule::times(1, None, Rule::range('0', '9'))]),
            ),
    )
    .unwrap()
}

fn run(grammar: &Grammar, input: &[u8], memoize: bool) -> Result<Rule, Option<u32>> {
    let options = Options {
        memoize,
        ..Options::default()
    };
    grammar.interpret(input, &options).map_err(|e| e.offset())
}

/// Checks that `node` is fully flattened and that every token is backed by the input.
fn check_node(node: &Rule, input: &[u8]) -> Result<(), TestCaseError> {
    prop_assert!(
        matches!(
            node.kind(),
            RuleKind::Production { .. } | RuleKind::Group | RuleKind::Token { .. }
        ),
        "unexpected node {}",
        node.display()
    );

    if let Some(text) = node.token_text() {
        let start = node.position() as usize;
        let backing: Vec<u8> = input[start..]
            .iter()
            .copied()
            .filter(|&b| b != b' ')
            .take(text.len())
            .collect();
        prop_assert_eq!(backing.as_slice(), text.as_bytes());
    }

    for pair in node.children().windows(2) {
        prop_assert!(!(pair[0].token_text().is_some() && pair[1].token_text().is_some()));
    }
    for child in node.children() {
        check_node(child, input)?;
    }
    Ok(())
}

proptest! {
    #[test]
    fn memoization_does_not_change_results(input in "[0-9+() ]{0,16}") {
        let grammar = arithmetic();
        prop_assert_eq!(
            run(&grammar, input.as_bytes(), false),
            run(&grammar, input.as_bytes(), true)
        );
    }

    #[test]
    fn results_are_flat_and_backed_by_input(input in "[0-9+() ]{0,16}") {
        let grammar = arithmetic();
        if let Ok(tree) = run(&grammar, input.as_bytes(), false) {
            check_node(&tree, input.as_bytes())?;
        }
    }

    #[test]
    fn failures_point_inside_input(input in "[0-9+()]{0,16}") {
        let grammar = arithmetic();
        if let Err(offset) = run(&grammar, input.as_bytes(), false) {
            prop_assert!(offset.is_some_and(|offset| offset as usize <= input.len()));
        }
    }

    #[test]
    fn times_respects_bounds(count in 0usize..8) {
        let grammar = Grammar::new(
            GrammarDef::default().production("xs", Rule::times(2, Some(5), Rule::token("x"))),
        )
        .unwrap();
        let input = "x".repeat(count);
        let result = grammar.interpret(input.as_bytes(), &Options::default());
        prop_assert_eq!(result.is_ok(), (2..=5).contains(&count));
    }
}
