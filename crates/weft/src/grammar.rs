use std::collections::HashMap;

use cranelift_entity::{entity_impl, packed_option::ReservedValue, PrimaryMap, SecondaryMap};
use serde::{Deserialize, Serialize};

use crate::{
    action::ActionRunner,
    compile::{self, Compiled},
    error::{CompileError, ErrorAccumulator, GrammarErrors, ParseError},
    interpret::{self, Options},
    resolve::{self, ResolveCx},
    rule::{Rule, RuleKind, SharedStr},
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductionHandle(u32);

entity_impl! { ProductionHandle }

impl ProductionHandle {
    pub fn name(self, grammar: &Grammar) -> Option<&SharedStr> {
        grammar.get(self).map(|production| &production.name)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Production {
    pub name: SharedStr,
    pub position: u32,
    /// The single top-level expression, a tagged production wraps it in a `Tag`.
    pub expr: Rule,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ProductionDef {
    pub name: String,
    #[serde(default)]
    pub position: u32,
    pub expr: Rule,
}

impl ProductionDef {
    pub fn new(name: &str, expr: Rule) -> ProductionDef {
        ProductionDef {
            name: name.to_owned(),
            position: 0,
            expr,
        }
    }
    pub fn tagged(name: &str, action: &str, expr: Rule) -> ProductionDef {
        ProductionDef::new(name, Rule::tag(action, expr))
    }
}

/// The start production, either by name or by its index in `GrammarDef::productions`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartRef {
    Index(u32),
    Name(String),
}

impl Default for StartRef {
    fn default() -> Self {
        StartRef::Index(0)
    }
}

impl From<&str> for StartRef {
    fn from(value: &str) -> Self {
        StartRef::Name(value.to_owned())
    }
}

impl From<u32> for StartRef {
    fn from(value: u32) -> Self {
        StartRef::Index(value)
    }
}

/// Unresolved grammar as supplied by a front-end, either built in code or loaded from json.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct GrammarDef {
    #[serde(flatten)]
    pub metadata: Metadata,
    #[serde(default)]
    pub start: StartRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prologue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epilogue: Option<String>,
    pub productions: Vec<ProductionDef>,
}

impl GrammarDef {
    pub fn new(start: impl Into<StartRef>) -> GrammarDef {
        GrammarDef {
            start: start.into(),
            ..Default::default()
        }
    }
    pub fn production(mut self, name: &str, expr: Rule) -> GrammarDef {
        self.productions.push(ProductionDef::new(name, expr));
        self
    }
    pub fn tagged(mut self, name: &str, action: &str, expr: Rule) -> GrammarDef {
        self.productions
            .push(ProductionDef::tagged(name, action, expr));
        self
    }
    pub fn prologue(mut self, body: &str) -> GrammarDef {
        self.prologue = Some(body.to_owned());
        self
    }
    pub fn epilogue(mut self, body: &str) -> GrammarDef {
        self.epilogue = Some(body.to_owned());
        self
    }
}

/// A resolved and validated grammar, immutable and shareable between threads.
#[derive(Clone, Debug)]
pub struct Grammar {
    productions: PrimaryMap<ProductionHandle, Production>,
    names: HashMap<SharedStr, ProductionHandle>,
    start: ProductionHandle,
    prologue: Option<SharedStr>,
    epilogue: Option<SharedStr>,
    metadata: Metadata,
}

impl Grammar {
    pub fn new(def: GrammarDef) -> Result<Grammar, GrammarErrors> {
        let err = ErrorAccumulator::new();

        let mut productions = PrimaryMap::new();
        for production in def.productions {
            productions.push(Production {
                name: production.name.as_str().into(),
                position: production.position,
                expr: production.expr,
            });
        }

        let cx = ResolveCx::new(&productions, &err);
        let start = match cx.resolve_start(&def.start, productions.len()) {
            Ok(handle) => handle,
            Err(e) => {
                err.error(e);
                ProductionHandle::reserved_value()
            }
        };
        resolve::resolve_identifiers(&mut productions, &cx);
        resolve::validate(&productions, &err);
        let names = cx.name_to_production;

        err.finish()?;

        let grammar = Grammar {
            productions,
            names,
            start,
            prologue: def.prologue.map(|body| body.as_str().into()),
            epilogue: def.epilogue.map(|body| body.as_str().into()),
            metadata: def.metadata,
        };

        for handle in grammar.unreachable() {
            log::warn!(
                "Production `{}` is unreachable from `{}`",
                grammar.productions[handle].name,
                grammar.start_production().name
            );
        }

        Ok(grammar)
    }
    pub fn get(&self, handle: ProductionHandle) -> Option<&Production> {
        self.productions.get(handle)
    }
    pub fn lookup(&self, name: &str) -> Option<ProductionHandle> {
        self.names.get(name).copied()
    }
    pub fn start(&self) -> ProductionHandle {
        self.start
    }
    pub fn start_production(&self) -> &Production {
        &self.productions[self.start]
    }
    pub fn prologue(&self) -> Option<&str> {
        self.prologue.as_deref()
    }
    pub fn epilogue(&self) -> Option<&str> {
        self.epilogue.as_deref()
    }
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
    pub fn len(&self) -> usize {
        self.productions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }
    pub fn iter(&self) -> cranelift_entity::Iter<'_, ProductionHandle, Production> {
        self.productions.iter()
    }
    /// Productions which can't be reached from the start production through identifiers.
    pub fn unreachable(&self) -> Vec<ProductionHandle> {
        let mut reached: SecondaryMap<ProductionHandle, bool> = SecondaryMap::new();
        let mut stack = vec![self.start];
        reached[self.start] = true;

        while let Some(handle) = stack.pop() {
            self.productions[handle].expr.visit(|rule| {
                if let RuleKind::Identifier {
                    target: Some(target),
                    ..
                } = rule.kind()
                {
                    if !reached[*target] {
                        reached[*target] = true;
                        stack.push(*target);
                    }
                }
            });
        }

        self.productions
            .keys()
            .filter(|handle| !reached[*handle])
            .collect()
    }
    /// Parses `input` starting from the grammar's start production.
    pub fn interpret(&self, input: &[u8], options: &Options) -> Result<Rule, ParseError> {
        interpret::interpret(self, self.start, input, options)
    }
    /// Compiles a result tree with this grammar's prologue and epilogue.
    pub fn compile<R: ActionRunner + ?Sized>(
        &self,
        tree: &Rule,
        runner: &mut R,
    ) -> Result<Compiled, CompileError> {
        compile::compile(tree, self.prologue(), self.epilogue(), runner)
    }
    pub fn display_into(&self, buf: &mut dyn std::fmt::Write) -> std::fmt::Result {
        for (handle, production) in self.productions.iter() {
            match handle == self.start {
                true => write!(buf, "{} (start) =\n", production.name)?,
                false => write!(buf, "{} =\n", production.name)?,
            }
            production.expr.display_into_indent(buf, 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GrammarError;

    #[test]
    fn test_resolves_names_and_start() {
        let grammar = Grammar::new(
            GrammarDef::new("list")
                .production("item", Rule::token("x"))
                .production("list", Rule::repeat(Rule::ident("item"))),
        )
        .unwrap();

        let list = grammar.lookup("list").unwrap();
        let item = grammar.lookup("item").unwrap();
        assert_eq!(grammar.start(), list);
        assert_eq!(item.name(&grammar).map(|n| &**n), Some("item"));

        let mut targets = Vec::new();
        grammar.start_production().expr.visit(|rule| {
            if let RuleKind::Identifier { target, .. } = rule.kind() {
                targets.push(*target);
            }
        });
        assert_eq!(targets, vec![Some(item)]);
        assert!(grammar.unreachable().is_empty());
    }

    #[test]
    fn test_collects_every_error() {
        let errors = Grammar::new(
            GrammarDef::new("missing")
                .production("a", Rule::ident("nowhere"))
                .production("a", Rule::command("frobnicate", vec![]))
                .production("b", Rule::times(3, Some(1), Rule::token("x"))),
        )
        .unwrap_err();

        assert_eq!(
            errors.0,
            vec![
                GrammarError::DuplicateProduction {
                    name: "a".into(),
                    position: 0
                },
                GrammarError::UnknownStart {
                    name: "missing".to_owned()
                },
                GrammarError::UnresolvedIdentifier {
                    name: "nowhere".into(),
                    position: 0
                },
                GrammarError::UnknownCommand {
                    name: "frobnicate".into(),
                    position: 0
                },
                GrammarError::InvalidTimes {
                    min: 3,
                    max: 1,
                    position: 0
                },
            ]
        );
    }

    #[test]
    fn test_unreachable_productions() {
        let grammar = Grammar::new(
            GrammarDef::default()
                .production("start", Rule::token("a"))
                .production("orphan", Rule::ident("start")),
        )
        .unwrap();

        assert_eq!(grammar.unreachable(), vec![grammar.lookup("orphan").unwrap()]);
    }

    #[test]
    fn test_start_index_out_of_range() {
        let errors = Grammar::new(GrammarDef::new(1u32).production("a", Rule::token("a"))).unwrap_err();
        assert_eq!(
            errors.0,
            vec![GrammarError::StartOutOfRange { index: 1, len: 1 }]
        );
    }
}
