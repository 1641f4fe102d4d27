use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::{
    command::{self, Directive},
    cursor::Cursor,
    error::{GrammarError, ParseError},
    grammar::{Grammar, ProductionHandle},
    linemap::LineMap,
    memo::{self, Lookup, Memo},
    rule::{self, RangeUnit, Rule, RuleKind, SharedStr, Text},
};

/// Characters skipped before every terminal unless a `skip` command says otherwise.
pub const DEFAULT_SPACING: &str = " \t\r\n";

/// Upper bound of a `Times` repetition without an explicit maximum.
pub const UNBOUNDED_TIMES: u32 = 1 << 24;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Record successful production results and reuse them on re-entry.
    pub memoize: bool,
    pub spacing: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            memoize: false,
            spacing: DEFAULT_SPACING.to_owned(),
        }
    }
}

/// Parses `input` starting at production `start`.
pub fn interpret(
    grammar: &Grammar,
    start: ProductionHandle,
    input: &[u8],
    options: &Options,
) -> Result<Rule, ParseError> {
    let Some(production) = grammar.get(start) else {
        return Err(GrammarError::StartOutOfRange {
            index: start.as_u32(),
            len: grammar.len(),
        }
        .into());
    };
    if u32::try_from(input.len()).is_err() {
        return Err(ParseError::InputTooLarge { len: input.len() });
    }

    log::debug!(
        "Interpreting {} bytes from `{}`, memoize: {}",
        input.len(),
        production.name,
        options.memoize
    );

    let mut interpreter = Interpreter::new(grammar, input, options.memoize);
    let spacing = options.spacing.as_str();
    let result = interpreter.apply_identifier(start, &production.name, 0, spacing)?;

    let stats = interpreter.memo.stats();
    log::debug!(
        "Applied {} productions, {} memo hits, {} stored, {} loop guard cuts",
        stats.entered,
        stats.hits,
        stats.stored,
        stats.cuts
    );

    if let Some(nodes) = result {
        interpreter.cursor.skip_chars(spacing);
        if interpreter.cursor.is_eof() {
            let tree = RuleKind::Production {
                name: production.name.clone(),
            }
            .to_rule(rule::finish(nodes));
            return Ok(tree);
        }
    }

    Err(interpreter.incomplete(input))
}

enum Step<'g> {
    Matched(Vec<Rule>),
    /// Replaces the spacing for the rest of the enclosing sequence.
    Spacing(Cow<'g, str>),
}

/// Terminal texts for every byte, created on first use.
struct SingleBytes(Vec<Option<Text>>);

impl SingleBytes {
    fn new() -> SingleBytes {
        SingleBytes(vec![None; 256])
    }
    fn get(&mut self, byte: u8) -> Text {
        self.0[byte as usize]
            .get_or_insert_with(|| Text::new(&[byte]))
            .clone()
    }
}

/// The state of a single run, owned by [`interpret`].
struct Interpreter<'g, 'i> {
    grammar: &'g Grammar,
    cursor: Cursor<'i>,
    memo: Memo,
    single_bytes: SingleBytes,
}

impl<'g, 'i> Interpreter<'g, 'i> {
    fn new(grammar: &'g Grammar, input: &'i [u8], memoize: bool) -> Interpreter<'g, 'i> {
        Interpreter {
            grammar,
            cursor: Cursor::new(input),
            memo: Memo::new(memoize),
            single_bytes: SingleBytes::new(),
        }
    }

    fn incomplete(&self, input: &[u8]) -> ParseError {
        let offset = self.cursor.max_position();
        let pos = LineMap::new(input).offset_to_codepoint(input, offset);
        log::debug!("Interpretation stopped at offset {offset}");
        ParseError::Incomplete {
            offset,
            line: pos.line + 1,
            column: pos.character + 1,
        }
    }

    fn apply(&mut self, rule: &'g Rule, spacing: &str) -> Result<Option<Step<'g>>, GrammarError> {
        let matched = match rule.kind() {
            RuleKind::Sequence => self.apply_sequence(rule.children(), spacing)?,
            RuleKind::Group | RuleKind::Production { .. } | RuleKind::Tag { .. } => {
                let start = self.cursor.position();
                self.apply_sequence(rule.children(), spacing)?.map(|children| {
                    // the first child already skipped the spacing in front of it
                    let position = children.first().map_or(start, Rule::position);
                    vec![rule.kind().clone().to_rule(children).with_position(position)]
                })
            }
            RuleKind::Token { text } => self.apply_token(text, spacing),
            &RuleKind::Range { low, high, unit } => self.apply_range(low, high, unit, spacing),
            RuleKind::Choice => {
                for child in rule.children() {
                    if let Some(step) = self.apply(child, spacing)? {
                        return Ok(Some(step));
                    }
                }
                None
            }
            RuleKind::Repeat => self.apply_times(rule.children(), 0, u32::MAX, spacing)?,
            &RuleKind::Times { min, max } => {
                let max = max.unwrap_or(UNBOUNDED_TIMES);
                self.apply_times(rule.children(), min, max, spacing)?
            }
            RuleKind::Optional => Some(
                self.apply_sequence(rule.children(), spacing)?
                    .unwrap_or_default(),
            ),
            RuleKind::Identifier { name, target } => {
                let position = rule.position();
                let Some(handle) = *target else {
                    return Err(GrammarError::UnresolvedIdentifier {
                        name: name.clone(),
                        position,
                    });
                };
                self.apply_identifier(handle, name, position, spacing)?
            }
            RuleKind::Command { name, arguments } => {
                return self.apply_command(name, arguments, rule.position());
            }
            &RuleKind::Number { value } => {
                Some(vec![Rule::number(value).with_position(self.cursor.position())])
            }
        };

        Ok(matched.map(Step::Matched))
    }

    fn apply_sequence(
        &mut self,
        children: &'g [Rule],
        spacing: &str,
    ) -> Result<Option<Vec<Rule>>, GrammarError> {
        let checkpoint = self.cursor.save_position();
        let mut out = Vec::new();
        let mut changed: Option<Cow<'g, str>> = None;

        for child in children {
            let current = changed.as_deref().unwrap_or(spacing);
            match self.apply(child, current)? {
                Some(Step::Matched(nodes)) => {
                    for node in nodes {
                        rule::splice_into(&mut out, node);
                    }
                }
                Some(Step::Spacing(next)) => changed = Some(next),
                None => {
                    self.cursor.restore_position(checkpoint);
                    return Ok(None);
                }
            }
        }

        Ok(Some(out))
    }

    fn apply_times(
        &mut self,
        children: &'g [Rule],
        min: u32,
        max: u32,
        spacing: &str,
    ) -> Result<Option<Vec<Rule>>, GrammarError> {
        let checkpoint = self.cursor.save_position();
        let mut out = Vec::new();
        let mut count = 0;

        while count < max {
            let before = self.cursor.position();
            let Some(nodes) = self.apply_sequence(children, spacing)? else {
                break;
            };
            count += 1;
            for node in nodes {
                rule::splice_into(&mut out, node);
            }
            // an iteration which consumed nothing would repeat forever
            if self.cursor.position() == before && count >= min {
                break;
            }
        }

        if count < min {
            self.cursor.restore_position(checkpoint);
            return Ok(None);
        }
        Ok(Some(out))
    }

    fn apply_token(&mut self, text: &Text, spacing: &str) -> Option<Vec<Rule>> {
        let checkpoint = self.cursor.save_position();
        self.cursor.skip_chars(spacing);
        let position = self.cursor.position();

        match self.cursor.consume(text.as_bytes()) {
            true => {
                let token = RuleKind::Token { text: text.clone() };
                Some(vec![token.to_leaf().with_position(position)])
            }
            false => {
                self.cursor.restore_position(checkpoint);
                None
            }
        }
    }

    fn apply_range(
        &mut self,
        low: u32,
        high: u32,
        unit: RangeUnit,
        spacing: &str,
    ) -> Option<Vec<Rule>> {
        let checkpoint = self.cursor.save_position();
        self.cursor.skip_chars(spacing);
        let position = self.cursor.position();

        let size = match unit {
            RangeUnit::Byte => self
                .cursor
                .peek_byte()
                .filter(|byte| (low..=high).contains(&(*byte as u32)))
                .map(|_| 1),
            RangeUnit::Char => self
                .cursor
                .peek_char()
                .filter(|(char, _)| (low..=high).contains(&(*char as u32)))
                .map(|(_, size)| size),
        };

        let Some(size) = size else {
            self.cursor.restore_position(checkpoint);
            return None;
        };

        let text = match size {
            1 => {
                let byte = self.cursor.remaining()[0];
                self.single_bytes.get(byte)
            }
            _ => Text::new(&self.cursor.remaining()[..size as usize]),
        };
        self.cursor.advance(size);

        Some(vec![RuleKind::Token { text }.to_leaf().with_position(position)])
    }

    fn apply_identifier(
        &mut self,
        handle: ProductionHandle,
        name: &str,
        position: u32,
        spacing: &str,
    ) -> Result<Option<Vec<Rule>>, GrammarError> {
        let grammar = self.grammar;
        let Some(production) = grammar.get(handle) else {
            return Err(GrammarError::InvalidTarget {
                name: name.into(),
                position,
                index: handle.as_u32(),
                len: grammar.len(),
            });
        };

        let key = memo::pair(handle, self.cursor.position());
        let frame = match self.memo.enter(key, spacing) {
            Lookup::Found { nodes, end } => {
                self.cursor.jump_to(end);
                return Ok(Some(nodes));
            }
            Lookup::Cycle => return Ok(None),
            Lookup::Enter(frame) => frame,
        };

        let result = self.apply_sequence(std::slice::from_ref(&production.expr), spacing);

        let end = self.cursor.position();
        let stored = match &result {
            Ok(Some(nodes)) => Some((nodes.as_slice(), end)),
            _ => None,
        };
        self.memo.leave(frame, key, stored, spacing);

        result
    }

    fn apply_command(
        &mut self,
        name: &SharedStr,
        arguments: &'g [Rule],
        position: u32,
    ) -> Result<Option<Step<'g>>, GrammarError> {
        match command::resolve(name, arguments, position)? {
            Directive::Skip(spacing) => Ok(Some(Step::Spacing(spacing))),
            Directive::Decode { encoding, width } => {
                let position = self.cursor.position();
                let Some(bytes) = self.cursor.peek_bytes(width) else {
                    return Ok(None);
                };
                let Some(value) = command::decode(encoding, bytes) else {
                    return Ok(None);
                };
                self.cursor.advance(width as u32);

                let number = Rule::number(value).with_position(position);
                Ok(Some(Step::Matched(vec![number])))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::grammar::GrammarDef;

    fn parens() -> Grammar {
        // start = "(" start ")" | ()
        Grammar::new(GrammarDef::new("start").production(
            "start",
            Rule::choice(vec![
                Rule::sequence(vec![Rule::token("("), Rule::ident("start"), Rule::token(")")]),
                Rule::sequence(vec![]),
            ]),
        ))
        .unwrap()
    }

    #[test]
    fn test_balanced_parens() {
        let grammar = parens();
        let options = Options::default();

        let tree = grammar.interpret(b"(())", &options).unwrap();
        let mut display = String::new();
        tree.display_into(&mut display).unwrap();
        assert_eq!(
            display,
            "Production(start) @0\n  Token(\"(())\") @0\n"
        );

        let err = grammar.interpret(b"(()", &options).unwrap_err();
        assert_eq!(err.offset(), Some(3));
    }

    #[test]
    fn test_identifier_results_are_spliced() {
        let grammar = Grammar::new(
            GrammarDef::new("pair")
                .production("x", Rule::token("x"))
                .production(
                    "pair",
                    Rule::sequence(vec![Rule::ident("x"), Rule::ident("x")]),
                ),
        )
        .unwrap();

        let tree = grammar.interpret(b"x x", &Options::default()).unwrap();
        assert_eq!(tree.children().len(), 1);
        assert_eq!(tree.children()[0].token_text(), Some(&Text::from("xx")));
        assert_eq!(tree.children()[0].position(), 0);
    }

    #[test]
    fn test_byte_ranges_share_single_byte_text() {
        let grammar = Grammar::new(
            GrammarDef::default().production("digits", Rule::repeat(Rule::group(vec![Rule::range('0', '9')]))),
        )
        .unwrap();

        let tree = grammar.interpret(b"1 1", &Options::default()).unwrap();
        let [first, second] = tree.children() else {
            panic!("{}", tree.display());
        };
        assert_eq!(first.children()[0].token_text(), Some(&Text::from("1")));
        assert_eq!(second.children()[0].position(), 2);
    }

    #[test]
    fn test_failure_restores_cursor() {
        let grammar = parens();
        let rule = Rule::times(
            1,
            Some(2),
            Rule::sequence(vec![Rule::token("a"), Rule::token("b"), Rule::token("c")]),
        );
        let mut interpreter = Interpreter::new(&grammar, b"abx", false);

        assert!(interpreter.apply(&rule, DEFAULT_SPACING).unwrap().is_none());
        assert_eq!(interpreter.cursor.position(), 0);
        assert_eq!(interpreter.cursor.max_position(), 2);
    }

    #[test]
    fn test_long_run_is_one_token() {
        let grammar = Grammar::new(
            GrammarDef::default().production("word", Rule::repeat(Rule::range('a', 'z'))),
        )
        .unwrap();
        let input = vec![b'a'; 1 << 18];

        let tree = grammar.interpret(&input, &Options::default()).unwrap();
        let [word] = tree.children() else {
            panic!("expected a single token");
        };
        assert_eq!(word.token_text().map(Text::len), Some(input.len()));
    }

    /// Small expressions over tokens and ranges, no identifiers.
    fn arb_rule() -> impl Strategy<Value = Rule> {
        let leaf = prop_oneof![
            "[ab]{0,2}".prop_map(|text| Rule::token(text.as_str())),
            Just(Rule::range('a', 'b')),
        ];
        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Rule::sequence),
                prop::collection::vec(inner.clone(), 1..3).prop_map(Rule::choice),
                (0u32..3, 0u32..3, inner)
                    .prop_map(|(min, extra, rule)| Rule::times(min, Some(min + extra), rule)),
            ]
        })
    }

    proptest! {
        #[test]
        fn failed_apply_leaves_cursor_in_place(
            rule in arb_rule(),
            input in "[ab ]{0,6}",
            start in 0u32..4,
        ) {
            let grammar = parens();
            let input = input.as_bytes();
            let mut interpreter = Interpreter::new(&grammar, input, false);
            interpreter.cursor.jump_to(start.min(input.len() as u32));

            let entry = interpreter.cursor.position();
            if interpreter.apply(&rule, DEFAULT_SPACING).unwrap().is_none() {
                prop_assert_eq!(interpreter.cursor.position(), entry);
            }
        }
    }

    #[test]
    fn test_dangling_target_is_fatal() {
        let grammar = parens();
        let mut rule = Rule::ident("elsewhere");
        if let RuleKind::Identifier { target, .. } = rule.kind_mut() {
            *target = Some(ProductionHandle::from_u32(9));
        }
        let mut interpreter = Interpreter::new(&grammar, b"", false);
        assert!(matches!(
            interpreter.apply(&rule, ""),
            Err(GrammarError::InvalidTarget { index: 9, .. })
        ));
    }
}
