use bstr::{BString, ByteSlice};

use crate::{
    action::{ActionContext, ActionRunner},
    error::CompileError,
    rule::{Rule, RuleKind},
    value::{Accumulator, Value},
};

/// The result of compiling a tree.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Compiled {
    pub value: Accumulator,
    /// Every terminal of the tree, left to right.
    pub ltr: BString,
    pub stack: Vec<Value>,
}

/// One compilation pass, owning the left-to-right stream and the global stack.
pub struct Compiler<'r, R: ActionRunner + ?Sized> {
    runner: &'r mut R,
    ltr: BString,
    stack: Vec<Value>,
}

impl<'r, R: ActionRunner + ?Sized> Compiler<'r, R> {
    pub fn new(runner: &'r mut R) -> Compiler<'r, R> {
        Compiler {
            runner,
            ltr: BString::default(),
            stack: Vec::new(),
        }
    }

    /// Compiles siblings left to right and merges their accumulators.
    pub fn compile_nodes(&mut self, nodes: &[Rule]) -> Result<Accumulator, CompileError> {
        match nodes {
            [] => Ok(Accumulator::with_input(b"")),
            [node] => self.compile_node(node),
            _ => {
                let mut acc = Accumulator::new();
                for node in nodes {
                    let next = self.compile_node(node)?;
                    acc.merge(next);
                }
                Ok(acc)
            }
        }
    }

    pub fn compile_node(&mut self, node: &Rule) -> Result<Accumulator, CompileError> {
        match node.kind() {
            RuleKind::Token { text } => {
                self.ltr.extend_from_slice(text.as_bytes());
                Ok(Accumulator::with_input(text.as_bytes()))
            }
            &RuleKind::Number { value } => {
                let mut acc = Accumulator::new();
                acc.insert("num", Value::Number(value));
                Ok(acc)
            }
            RuleKind::Tag { action } => {
                let upstream = self.compile_nodes(node.children())?;
                self.run_action(action, node.position(), upstream)
            }
            _ => self.compile_nodes(node.children()),
        }
    }

    /// Runs `body` once with the current stream and stack.
    pub fn run_action(
        &mut self,
        body: &str,
        position: u32,
        upstream: Accumulator,
    ) -> Result<Accumulator, CompileError> {
        let mut cx = ActionContext::new(self.ltr.as_bstr(), &mut self.stack);
        self.runner
            .run(body, upstream, &mut cx)
            .map_err(|source| CompileError::Action {
                position,
                body: body.into(),
                source,
            })
    }

    pub fn finish(self, value: Accumulator) -> Compiled {
        Compiled {
            value,
            ltr: self.ltr,
            stack: self.stack,
        }
    }
}

/// Compiles a result tree, running `prologue` before and `epilogue` after it.
pub fn compile<R: ActionRunner + ?Sized>(
    tree: &Rule,
    prologue: Option<&str>,
    epilogue: Option<&str>,
    runner: &mut R,
) -> Result<Compiled, CompileError> {
    let mut compiler = Compiler::new(runner);

    let mut value = match prologue {
        Some(body) => compiler.run_action(body, 0, Accumulator::new())?,
        None => Accumulator::new(),
    };
    value.merge(compiler.compile_node(tree)?);

    if let Some(body) = epilogue {
        value = compiler.run_action(body, tree.position(), value)?;
    }

    log::debug!(
        "Compiled {} terminal bytes into {} keys",
        compiler.ltr.len(),
        value.len()
    );
    Ok(compiler.finish(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;

    fn record(
        log: &mut Vec<String>,
    ) -> impl FnMut(&str, Accumulator, &mut ActionContext<'_>) -> Result<Accumulator, ActionError> + '_
    {
        move |body, acc, cx| {
            log.push(format!("{body}:{}:{}", acc.input(), cx.ltr()));
            Ok(acc)
        }
    }

    #[test]
    fn test_sequence_concatenates() {
        let tree = Rule::production(
            "start",
            vec![Rule::group(vec![
                Rule::token("a"),
                Rule::number(7),
                Rule::group(vec![Rule::token("b"), Rule::token("c")]),
            ])],
        );
        let mut runner = NoActions;
        let compiled = compile(&tree, None, None, &mut runner).unwrap();

        assert_eq!(compiled.value.input(), "abc");
        assert_eq!(compiled.value.get("num"), Some(&Value::Number(7)));
        assert_eq!(compiled.ltr, "abc");
    }

    struct NoActions;

    impl ActionRunner for NoActions {
        fn run(
            &mut self,
            body: &str,
            _: Accumulator,
            _: &mut ActionContext<'_>,
        ) -> Result<Accumulator, ActionError> {
            Err(format!("unexpected action {body}").into())
        }
    }

    #[test]
    fn test_actions_run_bottom_up_once() {
        let tree = Rule::tag(
            "outer",
            Rule::group(vec![
                Rule::tag("first", Rule::token("x")),
                Rule::tag("second", Rule::token("y")),
            ]),
        );
        let mut log = Vec::new();
        let compiled = compile(&tree, Some("pro"), Some("epi"), &mut record(&mut log)).unwrap();

        assert_eq!(compiled.value.input(), "xy");
        assert_eq!(
            log,
            ["pro::", "first:x:x", "second:y:xy", "outer:xy:xy", "epi:xy:xy"]
        );
    }

    #[test]
    fn test_action_error_carries_position() {
        let tree = Rule::tag("boom", Rule::token("x")).with_position(4);
        let err = compile(&tree, None, None, &mut NoActions).unwrap_err();
        let CompileError::Action { position, body, .. } = err;
        assert_eq!(position, 4);
        assert_eq!(&*body, "boom");
    }
}
