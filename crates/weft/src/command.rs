//! Built-in commands which can appear inside grammar expressions.
//!
//! * `skip` - with no argument clears the spacing set, with a literal argument replaces it with the
//!   characters of that literal. Applies to the rest of the enclosing sequence.
//! * `le`, `be`, `dec` - decode an unsigned number occupying the given amount of bytes, stored as
//!   little endian, big endian, or ascii decimal digits.

use std::borrow::Cow;

use crate::{
    error::GrammarError,
    rule::{Rule, RuleKind},
};

pub const DECODE_WIDTHS: [u64; 5] = [1, 2, 3, 4, 8];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Encoding {
    LittleEndian,
    BigEndian,
    Decimal,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Directive<'g> {
    Skip(Cow<'g, str>),
    Decode { encoding: Encoding, width: usize },
}

pub fn resolve<'g>(
    name: &str,
    arguments: &'g [Rule],
    position: u32,
) -> Result<Directive<'g>, GrammarError> {
    let malformed = |reason| GrammarError::MalformedCommand {
        name: name.into(),
        position,
        reason,
    };

    let encoding = match name {
        "skip" => {
            return match arguments {
                [] => Ok(Directive::Skip(Cow::Borrowed(""))),
                [argument] => spacing_set(argument)
                    .map(Directive::Skip)
                    .ok_or_else(|| malformed("expected a literal, or a sequence of literals")),
                _ => Err(malformed("expected at most one argument")),
            }
        }
        "le" => Encoding::LittleEndian,
        "be" => Encoding::BigEndian,
        "dec" => Encoding::Decimal,
        _ => {
            return Err(GrammarError::UnknownCommand {
                name: name.into(),
                position,
            })
        }
    };

    let [argument] = arguments else {
        return Err(malformed("expected a single width argument"));
    };
    let &RuleKind::Number { value: width } = argument.kind() else {
        return Err(malformed("expected a number as the width"));
    };
    if !DECODE_WIDTHS.contains(&width) {
        return Err(GrammarError::InvalidDecodeWidth {
            name: name.into(),
            width,
            position,
        });
    }

    Ok(Directive::Decode {
        encoding,
        width: width as usize,
    })
}

fn collect_literals<'g>(rule: &'g Rule, out: &mut Vec<&'g [u8]>) -> bool {
    match rule.kind() {
        RuleKind::Token { text } => {
            out.push(text.as_bytes());
            true
        }
        RuleKind::Sequence | RuleKind::Group => rule
            .children()
            .iter()
            .all(|child| collect_literals(child, out)),
        _ => false,
    }
}

/// The concatenated text of a pure-literal expression, which must be valid utf8.
fn spacing_set(rule: &Rule) -> Option<Cow<'_, str>> {
    let mut literals = Vec::new();
    if !collect_literals(rule, &mut literals) {
        return None;
    }
    match literals.as_slice() {
        [] => Some(Cow::Borrowed("")),
        [single] => std::str::from_utf8(single).ok().map(Cow::Borrowed),
        _ => String::from_utf8(literals.concat()).ok().map(Cow::Owned),
    }
}

/// Decodes a complete number, `None` if `dec` encounters something other than a digit.
pub fn decode(encoding: Encoding, bytes: &[u8]) -> Option<u64> {
    match encoding {
        Encoding::LittleEndian => Some(
            bytes
                .iter()
                .rev()
                .fold(0, |acc, &byte| acc << 8 | byte as u64),
        ),
        Encoding::BigEndian => Some(bytes.iter().fold(0, |acc, &byte| acc << 8 | byte as u64)),
        Encoding::Decimal => bytes.iter().try_fold(0u64, |acc, &byte| {
            let digit = (byte as char).to_digit(10)?;
            Some(acc * 10 + digit as u64)
        }),
    }
}

#[test]
fn test_decode() {
    assert_eq!(decode(Encoding::LittleEndian, &[0x34, 0x12]), Some(0x1234));
    assert_eq!(decode(Encoding::BigEndian, &[0x12, 0x34, 0x56]), Some(0x123456));
    assert_eq!(
        decode(Encoding::BigEndian, &[0xFF; 8]),
        Some(u64::MAX)
    );
    assert_eq!(decode(Encoding::Decimal, b"00420"), Some(420));
    assert_eq!(decode(Encoding::Decimal, b"4x"), None);
}

#[test]
fn test_resolve() {
    assert_eq!(
        resolve("skip", &[], 0),
        Ok(Directive::Skip(Cow::Borrowed("")))
    );
    assert_eq!(
        resolve(
            "skip",
            &[Rule::sequence(vec![Rule::token(" "), Rule::group(vec![Rule::token("\t")])])],
            0
        ),
        Ok(Directive::Skip(Cow::Borrowed(" \t")))
    );
    assert!(matches!(
        resolve("skip", &[Rule::ident("spaces")], 3),
        Err(GrammarError::MalformedCommand { position: 3, .. })
    ));
    assert_eq!(
        resolve("be", &[Rule::number(4)], 0),
        Ok(Directive::Decode {
            encoding: Encoding::BigEndian,
            width: 4
        })
    );
    assert_eq!(
        resolve("le", &[Rule::number(5)], 7),
        Err(GrammarError::InvalidDecodeWidth {
            name: "le".into(),
            width: 5,
            position: 7
        })
    );
}
