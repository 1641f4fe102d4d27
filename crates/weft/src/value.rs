use std::collections::HashSet;

use bstr::{BStr, BString, ByteSlice, ByteVec};
use indexmap::{map::Entry, IndexMap};
use serde::{Serialize, Serializer};

/// A value stored in an [`Accumulator`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Value {
    Str(BString),
    Number(u64),
    List(Vec<Value>),
}

impl Value {
    pub fn as_bstr(&self) -> Option<&BStr> {
        match self {
            Value::Str(str) => Some(str.as_bstr()),
            _ => None,
        }
    }
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Value::Number(number) => Some(*number),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }
    /// Renders the value as text, lists are concatenated.
    pub fn render_into(&self, buf: &mut BString) {
        match self {
            Value::Str(str) => buf.push_str(str),
            Value::Number(number) => buf.push_str(number.to_string()),
            Value::List(list) => {
                for value in list {
                    value.render_into(buf);
                }
            }
        }
    }
    pub fn render(&self) -> BString {
        let mut buf = BString::default();
        self.render_into(&mut buf);
        buf
    }
    fn concat_str(&mut self, other: Value) {
        match (self, other) {
            (Value::Str(str), Value::Str(other)) => str.push_str(other),
            (this, other) => {
                let mut buf = this.render();
                other.render_into(&mut buf);
                *this = Value::Str(buf);
            }
        }
    }
    fn concat_list(&mut self, other: Value) {
        let list = self.make_list();
        match other {
            Value::List(other) => list.extend(other),
            other => list.push(other),
        }
    }
    fn make_list(&mut self) -> &mut Vec<Value> {
        if !matches!(self, Value::List(_)) {
            let first = std::mem::replace(self, Value::List(Vec::new()));
            *self = Value::List(vec![first]);
        }
        match self {
            Value::List(list) => list,
            _ => unreachable!(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Str(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.render(), f)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Str(str) => serializer.serialize_str(&str.to_str_lossy()),
            Value::Number(number) => serializer.serialize_u64(*number),
            Value::List(list) => serializer.collect_seq(list),
        }
    }
}

/// How values under a key combine when siblings are merged.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KeyShape {
    /// `in` and keys starting with `str`, concatenated.
    Str,
    /// `stack` and keys starting with `arr`, list-concatenated.
    List,
    /// The first contribution keeps its shape, further ones turn it into a list.
    Other,
}

impl KeyShape {
    pub fn of(key: &str) -> KeyShape {
        if key == "in" || key.starts_with("str") {
            KeyShape::Str
        } else if key == "stack" || key.starts_with("arr") {
            KeyShape::List
        } else {
            KeyShape::Other
        }
    }
}

/// Insertion ordered attribute map computed for every node during compilation.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Accumulator {
    values: IndexMap<String, Value>,
    /// "Other" keys whose value is the list of sibling contributions built by [`Accumulator::merge`].
    gathered: HashSet<String>,
}

impl Accumulator {
    pub const INPUT: &'static str = "in";

    pub fn new() -> Accumulator {
        Accumulator::default()
    }
    /// An accumulator holding only `in`.
    pub fn with_input(text: &[u8]) -> Accumulator {
        let mut this = Accumulator::new();
        this.insert(Self::INPUT, Value::from(text));
        this
    }
    /// The `in` string, empty if missing, rendered if it isn't a string.
    pub fn input(&self) -> BString {
        self.get(Self::INPUT)
            .map(Value::render)
            .unwrap_or_default()
    }
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.values.get_mut(key)
    }
    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        self.gathered.remove(key);
        self.values.insert(key.to_owned(), value)
    }
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.gathered.remove(key);
        self.values.shift_remove(key)
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.values.iter()
    }
    pub fn keys(&self) -> indexmap::map::Keys<'_, String, Value> {
        self.values.keys()
    }
    /// Merges the accumulator of a right sibling into this one.
    ///
    /// A right sibling always contributes its value whole, lists it gathered itself included,
    /// so the result doesn't depend on how the siblings were grouped.
    pub fn merge(&mut self, other: Accumulator) {
        for (key, value) in other.values {
            match self.values.entry(key) {
                Entry::Vacant(v) => {
                    v.insert(value);
                }
                Entry::Occupied(mut o) => match KeyShape::of(o.key()) {
                    KeyShape::Str => o.get_mut().concat_str(value),
                    KeyShape::List => o.get_mut().concat_list(value),
                    KeyShape::Other => {
                        let first = self.gathered.insert(o.key().clone());
                        match (first, o.get_mut()) {
                            (false, Value::List(contributions)) => contributions.push(value),
                            (_, slot) => {
                                let previous = std::mem::replace(slot, Value::List(Vec::new()));
                                *slot = Value::List(vec![previous, value]);
                            }
                        }
                    }
                },
            }
        }
    }
}

impl Serialize for Accumulator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Accumulator {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Accumulator {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            gathered: HashSet::new(),
        }
    }
}

impl<'a> IntoIterator for &'a Accumulator {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[test]
fn test_merge_shapes() {
    let mut acc: Accumulator = [
        ("in", Value::from("a")),
        ("stack", Value::from(vec![Value::from(1u64)])),
        ("name", Value::from("x")),
    ]
    .into_iter()
    .collect();

    acc.merge(
        [
            ("in", Value::from("b")),
            ("stack", Value::from(2u64)),
            ("name", Value::from("y")),
            ("arr_items", Value::List(vec![])),
        ]
        .into_iter()
        .collect(),
    );
    acc.merge([("name", Value::from("z")), ("str_tail", Value::from(7u64))].into_iter().collect());

    assert_eq!(acc.input(), "ab");
    assert_eq!(
        acc.get("stack"),
        Some(&Value::from(vec![Value::from(1u64), Value::from(2u64)]))
    );
    assert_eq!(
        acc.get("name"),
        Some(&Value::from(vec![Value::from("x"), Value::from("y"), Value::from("z")]))
    );
    assert_eq!(acc.get("str_tail"), Some(&Value::from(7u64)));
    assert_eq!(
        acc.keys().collect::<Vec<_>>(),
        ["in", "stack", "name", "arr_items", "str_tail"]
    );
}

#[test]
fn test_string_keys_render_other_values() {
    let mut acc = Accumulator::with_input(b"n=");
    acc.merge([("in", Value::from(vec![Value::from(4u64), Value::from("2")]))].into_iter().collect());
    assert_eq!(acc.get("in"), Some(&Value::from("n=42")));
}

#[test]
fn test_other_keys_gather_whole_contributions() {
    let leaf = |name: &str| -> Accumulator { [("name", Value::from(name))].into_iter().collect() };
    let group = |left: Accumulator, right: Accumulator| {
        let mut acc = Accumulator::new();
        acc.merge(left);
        acc.merge(right);
        acc
    };
    let list = |values: &[&str]| Value::List(values.iter().map(|&v| Value::from(v)).collect());

    // a list on either side is a single contribution
    let acc = group(group(leaf("w"), leaf("x")), group(leaf("y"), leaf("z")));
    assert_eq!(
        acc.get("name"),
        Some(&Value::List(vec![list(&["w", "x"]), list(&["y", "z"])]))
    );
    let acc = group(leaf("w"), group(leaf("x"), leaf("y")));
    assert_eq!(
        acc.get("name"),
        Some(&Value::List(vec![Value::from("w"), list(&["x", "y"])]))
    );
    let acc = group(group(leaf("w"), leaf("x")), leaf("y"));
    assert_eq!(
        acc.get("name"),
        Some(&Value::List(vec![list(&["w", "x"]), Value::from("y")]))
    );

    // a list a sibling produced itself is kept whole too
    let mut acc: Accumulator = [("name", list(&["a", "b"]))].into_iter().collect();
    acc.merge([("name", Value::from("c"))].into_iter().collect());
    acc.merge([("name", Value::from("d"))].into_iter().collect());
    assert_eq!(
        acc.get("name"),
        Some(&Value::List(vec![list(&["a", "b"]), Value::from("c"), Value::from("d")]))
    );

    // overwriting a gathered key starts over
    acc.insert("name", Value::from("e"));
    acc.merge([("name", Value::from("f"))].into_iter().collect());
    assert_eq!(acc.get("name"), Some(&list(&["e", "f"])));
}
