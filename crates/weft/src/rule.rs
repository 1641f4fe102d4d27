use std::{fmt::Display, sync::Arc};

use bstr::{BStr, ByteSlice};
use serde::{
    de::{SeqAccess, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::{display::display_byte_literal, grammar::ProductionHandle};

pub type SharedStr = Arc<str>;

/// Immutable, cheaply cloned byte string used for literals and matched terminals.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Text(Arc<[u8]>);

impl Text {
    pub fn new(bytes: &[u8]) -> Text {
        Text(bytes.into())
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    pub fn as_bstr(&self) -> &BStr {
        self.0.as_bstr()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Text {
    fn from(value: &str) -> Self {
        Text::new(value.as_bytes())
    }
}

impl From<&[u8]> for Text {
    fn from(value: &[u8]) -> Self {
        Text::new(value)
    }
}

impl From<Vec<u8>> for Text {
    fn from(value: Vec<u8>) -> Self {
        Text(value.into())
    }
}

impl std::fmt::Debug for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        display_byte_literal(f, "\"", &self.0)
    }
}

impl Serialize for Text {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.0) {
            Ok(str) => serializer.serialize_str(str),
            Err(_) => serializer.collect_seq(self.0.iter()),
        }
    }
}

struct TextVisitor;

impl<'de> Visitor<'de> for TextVisitor {
    type Value = Text;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a string or a sequence of bytes")
    }
    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Text, E> {
        Ok(Text::from(v))
    }
    fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Text, E> {
        Ok(Text::from(v))
    }
    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Text, A::Error> {
        let mut bytes = Vec::new();
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(Text::from(bytes))
    }
}

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Text, D::Error> {
        deserializer.deserialize_any(TextVisitor)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeUnit {
    /// A single unicode scalar value, utf8 encoded.
    #[default]
    Char,
    Byte,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    Sequence,
    Group,
    Production {
        name: SharedStr,
    },
    Token {
        text: Text,
    },
    Range {
        low: u32,
        high: u32,
        #[serde(default)]
        unit: RangeUnit,
    },
    Choice,
    Repeat,
    Times {
        min: u32,
        /// `None` is unbounded, capped at [`crate::interpret::UNBOUNDED_TIMES`].
        #[serde(default)]
        max: Option<u32>,
    },
    Optional,
    Identifier {
        name: SharedStr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ProductionHandle>,
    },
    Tag {
        action: SharedStr,
    },
    Command {
        name: SharedStr,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        arguments: Vec<Rule>,
    },
    Number {
        value: u64,
    },
}

impl RuleKind {
    pub fn to_rule(self, children: Vec<Rule>) -> Rule {
        Rule {
            kind: self,
            position: 0,
            children,
        }
    }
    pub fn to_leaf(self) -> Rule {
        self.to_rule(Vec::new())
    }
    pub fn display_into(&self, buf: &mut dyn std::fmt::Write) -> std::fmt::Result {
        match self {
            RuleKind::Sequence => write!(buf, "Sequence"),
            RuleKind::Group => write!(buf, "Group"),
            RuleKind::Production { name } => write!(buf, "Production({name})"),
            RuleKind::Token { text } => {
                write!(buf, "Token(")?;
                display_byte_literal(buf, "\"", text.as_bytes())?;
                write!(buf, ")")
            }
            RuleKind::Range { low, high, unit } => match unit {
                RangeUnit::Char => {
                    let display = |c: u32| char::from_u32(c).map(|c| c.escape_debug().to_string());
                    match (display(*low), display(*high)) {
                        (Some(low), Some(high)) => write!(buf, "Range('{low}'..='{high}')"),
                        _ => write!(buf, "Range(U+{low:04X}..=U+{high:04X})"),
                    }
                }
                RangeUnit::Byte => write!(buf, "ByteRange(0x{low:02X}..=0x{high:02X})"),
            },
            RuleKind::Choice => write!(buf, "Choice"),
            RuleKind::Repeat => write!(buf, "Repeat"),
            RuleKind::Times { min, max } => match max {
                Some(max) => write!(buf, "Times({min}, {max})"),
                None => write!(buf, "Times({min}, ..)"),
            },
            RuleKind::Optional => write!(buf, "Optional"),
            RuleKind::Identifier { name, .. } => write!(buf, "Identifier({name})"),
            RuleKind::Tag { action } => write!(buf, "Tag({{{action}}})"),
            RuleKind::Command { name, .. } => write!(buf, "Command({name})"),
            RuleKind::Number { value } => write!(buf, "Number({value})"),
        }
    }
}

/// A node of either a grammar expression or an interpretation result.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Rule {
    #[serde(flatten)]
    kind: RuleKind,
    #[serde(default, skip_serializing_if = "is_zero")]
    position: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Rule>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl Rule {
    pub fn sequence(children: Vec<Rule>) -> Rule {
        RuleKind::Sequence.to_rule(children)
    }
    pub fn group(children: Vec<Rule>) -> Rule {
        RuleKind::Group.to_rule(children)
    }
    pub fn choice(children: Vec<Rule>) -> Rule {
        RuleKind::Choice.to_rule(children)
    }
    pub fn production(name: &str, children: Vec<Rule>) -> Rule {
        RuleKind::Production { name: name.into() }.to_rule(children)
    }
    pub fn repeat(child: Rule) -> Rule {
        RuleKind::Repeat.to_rule(vec![child])
    }
    pub fn optional(child: Rule) -> Rule {
        RuleKind::Optional.to_rule(vec![child])
    }
    pub fn times(min: u32, max: Option<u32>, child: Rule) -> Rule {
        RuleKind::Times { min, max }.to_rule(vec![child])
    }
    pub fn token(text: impl Into<Text>) -> Rule {
        RuleKind::Token { text: text.into() }.to_leaf()
    }
    pub fn range(low: char, high: char) -> Rule {
        RuleKind::Range {
            low: low.into(),
            high: high.into(),
            unit: RangeUnit::Char,
        }
        .to_leaf()
    }
    pub fn byte_range(low: u8, high: u8) -> Rule {
        RuleKind::Range {
            low: low.into(),
            high: high.into(),
            unit: RangeUnit::Byte,
        }
        .to_leaf()
    }
    pub fn ident(name: &str) -> Rule {
        RuleKind::Identifier {
            name: name.into(),
            target: None,
        }
        .to_leaf()
    }
    pub fn tag(action: &str, child: Rule) -> Rule {
        RuleKind::Tag {
            action: action.into(),
        }
        .to_rule(vec![child])
    }
    pub fn command(name: &str, arguments: Vec<Rule>) -> Rule {
        RuleKind::Command {
            name: name.into(),
            arguments,
        }
        .to_leaf()
    }
    pub fn number(value: u64) -> Rule {
        RuleKind::Number { value }.to_leaf()
    }
    pub fn with_position(mut self, position: u32) -> Rule {
        self.position = position;
        self
    }
    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }
    pub fn kind_mut(&mut self) -> &mut RuleKind {
        &mut self.kind
    }
    pub fn position(&self) -> u32 {
        self.position
    }
    pub fn children(&self) -> &[Rule] {
        &self.children
    }
    pub fn children_mut(&mut self) -> &mut [Rule] {
        &mut self.children
    }
    pub fn into_children(self) -> Vec<Rule> {
        self.children
    }
    pub fn token_text(&self) -> Option<&Text> {
        match &self.kind {
            RuleKind::Token { text } => Some(text),
            _ => None,
        }
    }
    fn visit_impl(&self, f: &mut dyn FnMut(&Rule)) {
        for child in &self.children {
            child.visit_impl(f);
        }
        if let RuleKind::Command { arguments, .. } = &self.kind {
            for argument in arguments {
                argument.visit_impl(f);
            }
        }
        f(self)
    }
    /// Visits every node in postorder, command arguments included.
    pub fn visit(&self, mut f: impl FnMut(&Rule)) {
        self.visit_impl(&mut f)
    }
    fn visit_mut_impl(&mut self, f: &mut dyn FnMut(&mut Rule)) {
        for child in &mut self.children {
            child.visit_mut_impl(f);
        }
        if let RuleKind::Command { arguments, .. } = &mut self.kind {
            for argument in arguments {
                argument.visit_mut_impl(f);
            }
        }
        f(self)
    }
    pub fn visit_mut(&mut self, mut f: impl FnMut(&mut Rule)) {
        self.visit_mut_impl(&mut f)
    }
    pub fn display_into_indent(
        &self,
        buf: &mut dyn std::fmt::Write,
        indent: u32,
    ) -> std::fmt::Result {
        for _ in 0..indent {
            write!(buf, "  ")?;
        }
        self.kind.display_into(buf)?;
        write!(buf, " @{}\n", self.position)?;
        if let RuleKind::Command { arguments, .. } = &self.kind {
            for argument in arguments {
                argument.display_into_indent(buf, indent + 1)?;
            }
        }
        for child in &self.children {
            child.display_into_indent(buf, indent + 1)?;
        }
        Ok(())
    }
    pub fn display_into(&self, buf: &mut dyn std::fmt::Write) -> std::fmt::Result {
        self.display_into_indent(buf, 0)
    }
    pub fn display(&self) -> RuleDisplay<'_> {
        RuleDisplay(self)
    }
}

#[derive(Clone, Copy)]
pub struct RuleDisplay<'a>(&'a Rule);

impl Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.display_into(f)
    }
}

/// Appends `node` to `out`, replacing `Sequence` nodes by their children.
///
/// Adjacent tokens are left alone until [`finish`] coalesces them.
pub fn splice_into(out: &mut Vec<Rule>, node: Rule) {
    if let RuleKind::Sequence = node.kind {
        for child in node.children {
            splice_into(out, child);
        }
        return;
    }
    out.push(node);
}

/// Adjacent tokens being merged, the first one's text is reused when it stays alone.
struct TokenRun {
    position: u32,
    first: Text,
    rest: Vec<u8>,
}

impl TokenRun {
    fn into_rule(self) -> Rule {
        let text = match self.rest.is_empty() {
            true => self.first,
            false => {
                let mut bytes = Vec::with_capacity(self.first.len() + self.rest.len());
                bytes.extend_from_slice(self.first.as_bytes());
                bytes.extend_from_slice(&self.rest);
                Text::from(bytes)
            }
        };
        RuleKind::Token { text }.to_leaf().with_position(self.position)
    }
}

struct Finisher {
    out: Vec<Rule>,
    run: Option<TokenRun>,
}

impl Finisher {
    fn push(&mut self, mut node: Rule) {
        if let RuleKind::Sequence = node.kind {
            for child in node.children {
                self.push(child);
            }
            return;
        }

        if let RuleKind::Token { text } = &node.kind {
            match &mut self.run {
                Some(run) => run.rest.extend_from_slice(text.as_bytes()),
                None => {
                    self.run = Some(TokenRun {
                        position: node.position,
                        first: text.clone(),
                        rest: Vec::new(),
                    })
                }
            }
            return;
        }

        self.flush();
        node.children = finish(std::mem::take(&mut node.children));
        self.out.push(node);
    }

    fn flush(&mut self) {
        if let Some(run) = self.run.take() {
            self.out.push(run.into_rule());
        }
    }
}

/// Flattens a whole result forest and merges every run of adjacent tokens into one.
pub fn finish(nodes: Vec<Rule>) -> Vec<Rule> {
    let mut finisher = Finisher {
        out: Vec::with_capacity(nodes.len()),
        run: None,
    };
    for node in nodes {
        finisher.push(node);
    }
    finisher.flush();
    finisher.out
}

#[test]
fn test_finish_flattens_and_coalesces() {
    let nodes = vec![
        Rule::token("a"),
        Rule::sequence(vec![Rule::token("b"), Rule::sequence(vec![Rule::token("c")])]),
        Rule::group(vec![Rule::token("d"), Rule::token("e")]),
        Rule::token("f"),
    ];
    let finished = finish(nodes);

    assert_eq!(finished.len(), 3);
    assert_eq!(finished[0].token_text(), Some(&Text::from("abc")));
    assert_eq!(finished[1].children().len(), 1);
    assert_eq!(finished[1].children()[0].token_text(), Some(&Text::from("de")));
    assert_eq!(finished[2].token_text(), Some(&Text::from("f")));
}

#[test]
fn test_finish_long_run() {
    let nodes: Vec<Rule> = (0..1 << 18)
        .map(|i| Rule::token("ab").with_position(i * 2))
        .collect();
    let finished = finish(vec![Rule::group(nodes), Rule::number(1), Rule::token("c")]);

    let [group, number, last] = finished.as_slice() else {
        panic!("{finished:?}");
    };
    let [run] = group.children() else {
        panic!("{group:?}");
    };
    assert_eq!(run.token_text().map(Text::len), Some(1 << 19));
    assert_eq!(run.position(), 0);
    assert!(run.token_text().unwrap().as_bytes().starts_with(b"abab"));
    assert_eq!(number.kind(), &RuleKind::Number { value: 1 });
    assert_eq!(last.token_text(), Some(&Text::from("c")));
}

#[test]
fn test_rule_json_shape() {
    let rule = Rule::choice(vec![
        Rule::sequence(vec![Rule::token("("), Rule::ident("start"), Rule::token(")")]),
        Rule::sequence(vec![]),
    ]);
    let json = serde_json::to_string(&rule).unwrap();
    let back: Rule = serde_json::from_str(&json).unwrap();
    assert_eq!(rule, back);

    let parsed: Rule =
        serde_json::from_str(r#"{"kind": "times", "min": 2, "max": 4, "children": [{"kind": "token", "text": "x"}]}"#)
            .unwrap();
    assert_eq!(parsed, Rule::times(2, Some(4), Rule::token("x")));
}
