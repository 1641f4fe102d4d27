use std::collections::HashMap;

use bstr::{BStr, BString, ByteSlice};

use crate::{
    error::ActionError,
    value::{Accumulator, Value},
};

/// Compilation state visible to a running action.
pub struct ActionContext<'a> {
    pub(crate) ltr: &'a BStr,
    pub(crate) stack: &'a mut Vec<Value>,
}

impl<'a> ActionContext<'a> {
    pub fn new(ltr: &'a BStr, stack: &'a mut Vec<Value>) -> ActionContext<'a> {
        ActionContext { ltr, stack }
    }
    /// Every terminal compiled so far, left to right.
    pub fn ltr(&self) -> &BStr {
        self.ltr
    }
    pub fn stack(&mut self) -> &mut Vec<Value> {
        self.stack
    }
}

/// Executes the body of a tagged node.
///
/// `upstream` is the merged accumulator of the node's children, the returned accumulator becomes
/// the node's own.
pub trait ActionRunner {
    fn run(
        &mut self,
        body: &str,
        upstream: Accumulator,
        cx: &mut ActionContext<'_>,
    ) -> Result<Accumulator, ActionError>;
}

impl<F> ActionRunner for F
where
    F: FnMut(&str, Accumulator, &mut ActionContext<'_>) -> Result<Accumulator, ActionError>,
{
    fn run(
        &mut self,
        body: &str,
        upstream: Accumulator,
        cx: &mut ActionContext<'_>,
    ) -> Result<Accumulator, ActionError> {
        self(body, upstream, cx)
    }
}

pub type Closure =
    Box<dyn FnMut(Accumulator, &mut ActionContext<'_>) -> Result<Accumulator, ActionError> + Send>;

/// Runs bodies made of `;` separated names of registered closures, in order.
#[derive(Default)]
pub struct ClosureTable {
    closures: HashMap<String, Closure>,
}

impl ClosureTable {
    pub fn new() -> ClosureTable {
        ClosureTable::default()
    }

    pub fn with_builtins() -> ClosureTable {
        let mut this = ClosureTable::new();
        this.register("keep", |acc, _| Ok(acc));
        this.register("upper", |acc, _| {
            Ok(map_input(acc, |input| input.to_str_lossy().to_uppercase().into()))
        });
        this.register("lower", |acc, _| {
            Ok(map_input(acc, |input| input.to_str_lossy().to_lowercase().into()))
        });
        this.register("trim", |acc, _| {
            Ok(map_input(acc, |input| input.to_str_lossy().trim().into()))
        });
        this.register("push", |acc, cx| {
            cx.stack().push(Value::Str(acc.input()));
            Ok(acc)
        });
        this.register("pop", |mut acc, cx| {
            let value = cx.stack().pop().ok_or("pop from an empty stack")?;
            acc.insert(Accumulator::INPUT, value);
            Ok(acc)
        });
        this.register("ltr", |mut acc, cx| {
            acc.insert(Accumulator::INPUT, Value::Str(cx.ltr().to_owned()));
            Ok(acc)
        });
        this.register("clear", |_, _| Ok(Accumulator::new()));
        this.register("wrap", |acc, _| {
            let mut wrapped = Accumulator::new();
            wrapped.insert("arr", Value::List(vec![Value::Str(acc.input())]));
            Ok(wrapped)
        });
        this.register("count", |mut acc, _| {
            let count = acc.input().chars().count() as u64;
            acc.insert("num", Value::Number(count));
            Ok(acc)
        });
        this
    }

    pub fn register(
        &mut self,
        name: &str,
        closure: impl FnMut(Accumulator, &mut ActionContext<'_>) -> Result<Accumulator, ActionError>
            + Send
            + 'static,
    ) {
        self.closures.insert(name.to_owned(), Box::new(closure));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.closures.contains_key(name)
    }
}

fn map_input(mut acc: Accumulator, f: impl FnOnce(&BStr) -> BString) -> Accumulator {
    let input = f(acc.input().as_bstr());
    acc.insert(Accumulator::INPUT, Value::Str(input));
    acc
}

impl ActionRunner for ClosureTable {
    fn run(
        &mut self,
        body: &str,
        upstream: Accumulator,
        cx: &mut ActionContext<'_>,
    ) -> Result<Accumulator, ActionError> {
        let mut acc = upstream;
        for name in body.split(';').map(str::trim).filter(|name| !name.is_empty()) {
            let Some(closure) = self.closures.get_mut(name) else {
                return Err(format!("no action named `{name}`").into());
            };
            acc = closure(acc, cx)?;
        }
        Ok(acc)
    }
}

#[test]
fn test_builtins() {
    let mut table = ClosureTable::with_builtins();
    let mut stack = Vec::new();
    let mut cx = ActionContext::new(b"abc".as_bstr(), &mut stack);

    let acc = table
        .run(" trim; upper ;push", Accumulator::with_input(b"  hi "), &mut cx)
        .unwrap();
    assert_eq!(acc.input(), "HI");
    assert_eq!(cx.stack(), &[Value::from("HI")]);

    let acc = table.run("ltr;count;wrap", Accumulator::new(), &mut cx).unwrap();
    assert_eq!(
        acc.get("arr"),
        Some(&Value::List(vec![Value::from("abc")]))
    );

    let acc = table.run("pop", Accumulator::new(), &mut cx).unwrap();
    assert_eq!(acc.input(), "HI");
    assert!(table.run("pop", Accumulator::new(), &mut cx).is_err());
    assert!(table.run("missing", Accumulator::new(), &mut cx).is_err());
}
