//! Resolve identifiers into production handles and check the shape of every expression. There
//! are no scopes, every production is visible from everywhere.

use std::collections::{hash_map::Entry, HashMap};

use cranelift_entity::{EntityRef, PrimaryMap};

use crate::{
    command,
    error::{ErrorAccumulator, GrammarError},
    grammar::{Production, ProductionHandle, StartRef},
    interpret::UNBOUNDED_TIMES,
    rule::{RangeUnit, Rule, RuleKind, SharedStr},
};

pub struct ResolveCx<'a> {
    pub err: &'a ErrorAccumulator,
    pub name_to_production: HashMap<SharedStr, ProductionHandle>,
}

impl<'a> ResolveCx<'a> {
    pub fn new(
        productions: &PrimaryMap<ProductionHandle, Production>,
        err: &'a ErrorAccumulator,
    ) -> ResolveCx<'a> {
        let mut this = ResolveCx {
            err,
            name_to_production: HashMap::new(),
        };
        this.populate(productions);
        this
    }

    fn populate(&mut self, productions: &PrimaryMap<ProductionHandle, Production>) {
        for (handle, production) in productions.iter() {
            match self.name_to_production.entry(production.name.clone()) {
                Entry::Occupied(_) => self.err.error(GrammarError::DuplicateProduction {
                    name: production.name.clone(),
                    position: production.position,
                }),
                Entry::Vacant(v) => {
                    v.insert(handle);
                }
            }
        }
    }

    pub fn resolve_start(
        &self,
        start: &StartRef,
        len: usize,
    ) -> Result<ProductionHandle, GrammarError> {
        match start {
            StartRef::Index(index) => match (*index as usize) < len {
                true => Ok(ProductionHandle::new(*index as usize)),
                false => Err(GrammarError::StartOutOfRange { index: *index, len }),
            },
            StartRef::Name(name) => self
                .name_to_production
                .get(name.as_str())
                .copied()
                .ok_or_else(|| GrammarError::UnknownStart { name: name.clone() }),
        }
    }
}

pub fn resolve_identifiers(
    productions: &mut PrimaryMap<ProductionHandle, Production>,
    cx: &ResolveCx,
) {
    let len = productions.len();
    for (_, production) in productions.iter_mut() {
        production.expr.visit_mut(|rule| {
            let position = rule.position();
            let RuleKind::Identifier { name, target } = rule.kind_mut() else {
                return;
            };
            match target {
                // handles supplied by the front-end are trusted as long as they point somewhere
                Some(handle) => {
                    if handle.index() >= len {
                        cx.err.error(GrammarError::InvalidTarget {
                            name: name.clone(),
                            position,
                            index: handle.as_u32(),
                            len,
                        });
                    }
                }
                None => match cx.name_to_production.get(&**name) {
                    Some(handle) => *target = Some(*handle),
                    None => cx.err.error(GrammarError::UnresolvedIdentifier {
                        name: name.clone(),
                        position,
                    }),
                },
            }
        });
    }
}

pub fn validate(productions: &PrimaryMap<ProductionHandle, Production>, err: &ErrorAccumulator) {
    for (_, production) in productions.iter() {
        production.expr.visit(|rule| validate_rule(rule, err));
    }
}

fn validate_rule(rule: &Rule, err: &ErrorAccumulator) {
    let position = rule.position();
    match rule.kind() {
        &RuleKind::Times { min, max } => {
            let max = max.unwrap_or(UNBOUNDED_TIMES);
            if min > max {
                err.error(GrammarError::InvalidTimes { min, max, position });
            }
        }
        &RuleKind::Range { low, high, unit } => {
            let limit = match unit {
                RangeUnit::Char => char::MAX as u32,
                RangeUnit::Byte => u8::MAX as u32,
            };
            if low > high || high > limit {
                err.error(GrammarError::InvalidRange {
                    low,
                    high,
                    position,
                });
            }
        }
        RuleKind::Command { name, arguments } => {
            if let Err(e) = command::resolve(name, arguments, position) {
                err.error(e);
            }
        }
        _ => {}
    }
}
