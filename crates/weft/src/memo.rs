//! Bookkeeping for production applications: the loop guard which cuts left recursion, and the
//! optional table of successful results.
//!
//! A result is only stored when its derivation did not run into the loop guard of an application
//! that was still in progress further up the stack. Such a result depends on the caller's context
//! and replaying it elsewhere could change the outcome.

use std::collections::HashMap;

use cranelift_entity::EntityRef;

use crate::{grammar::ProductionHandle, rule::Rule};

pub type MemoKey = u64;

/// Pairs a production with a cursor position into one key.
pub fn pair(production: ProductionHandle, position: u32) -> MemoKey {
    (production.index() as u64) << 32 | position as u64
}

pub fn unpair(key: MemoKey) -> (ProductionHandle, u32) {
    (ProductionHandle::new((key >> 32) as usize), key as u32)
}

struct Found {
    nodes: Vec<Rule>,
    end: u32,
    spacing: Box<str>,
}

pub enum Lookup {
    /// A stored result, the cursor should jump to `end`.
    Found { nodes: Vec<Rule>, end: u32 },
    /// The same production is already being applied at this position.
    Cycle,
    Enter(Frame),
}

/// Handed out by [`Memo::enter`], must be given back to [`Memo::leave`].
#[must_use]
pub struct Frame {
    depth: u32,
    outer_cut: u32,
}

#[derive(Clone, Copy, Default, Debug)]
pub struct MemoStats {
    pub entered: u64,
    pub hits: u64,
    pub cuts: u64,
    pub stored: u64,
}

pub struct Memo {
    in_progress: HashMap<MemoKey, u32>,
    found: Option<HashMap<MemoKey, Found>>,
    depth: u32,
    /// Shallowest depth whose loop guard fired within the current application.
    cut: u32,
    stats: MemoStats,
}

impl Memo {
    pub fn new(memoize: bool) -> Memo {
        Memo {
            in_progress: HashMap::new(),
            found: memoize.then(HashMap::new),
            depth: 0,
            cut: u32::MAX,
            stats: MemoStats::default(),
        }
    }

    pub fn enter(&mut self, key: MemoKey, spacing: &str) -> Lookup {
        if let Some(&depth) = self.in_progress.get(&key) {
            self.stats.cuts += 1;
            self.cut = self.cut.min(depth);
            if log::log_enabled!(log::Level::Trace) {
                let (production, position) = unpair(key);
                log::trace!("Loop guard cut #{} at {position}", production.index());
            }
            return Lookup::Cycle;
        }

        if let Some(found) = self.found.as_ref().and_then(|found| found.get(&key)) {
            if *found.spacing == *spacing {
                self.stats.hits += 1;
                log::trace!("Memo hit at {}, resuming at {}", key as u32, found.end);
                return Lookup::Found {
                    nodes: found.nodes.clone(),
                    end: found.end,
                };
            }
        }

        self.stats.entered += 1;
        self.depth += 1;
        self.in_progress.insert(key, self.depth);

        let frame = Frame {
            depth: self.depth,
            outer_cut: self.cut,
        };
        self.cut = u32::MAX;
        Lookup::Enter(frame)
    }

    /// Finishes an application, `result` being the matched nodes and end position on success.
    pub fn leave(
        &mut self,
        frame: Frame,
        key: MemoKey,
        result: Option<(&[Rule], u32)>,
        spacing: &str,
    ) {
        debug_assert_eq!(frame.depth, self.depth);
        self.in_progress.remove(&key);
        self.depth -= 1;

        let context_free = self.cut >= frame.depth;
        if let (Some(found), Some((nodes, end)), true) = (&mut self.found, result, context_free) {
            self.stats.stored += 1;
            found.insert(
                key,
                Found {
                    nodes: nodes.to_vec(),
                    end,
                    spacing: spacing.into(),
                },
            );
        }

        // cuts of our own guard are resolved here, cuts of ancestors still taint the caller
        let inherited = match context_free {
            true => u32::MAX,
            false => self.cut,
        };
        self.cut = frame.outer_cut.min(inherited);
    }

    pub fn stats(&self) -> MemoStats {
        self.stats
    }
}

#[test]
fn test_pairing() {
    let production = ProductionHandle::new(7);
    let key = pair(production, u32::MAX);
    assert_eq!(unpair(key), (production, u32::MAX));
    assert_ne!(pair(production, 1), pair(ProductionHandle::new(1), 7));
}

#[test]
fn test_cut_taints_only_descendants() {
    let a = pair(ProductionHandle::new(0), 0);
    let b = pair(ProductionHandle::new(1), 0);
    let mut memo = Memo::new(true);

    let Lookup::Enter(outer) = memo.enter(a, "") else {
        panic!()
    };
    let Lookup::Enter(inner) = memo.enter(b, "") else {
        panic!()
    };
    assert!(matches!(memo.enter(a, ""), Lookup::Cycle));
    // `b` saw the guard of `a`, so it must not be stored
    memo.leave(inner, b, Some((&[][..], 0)), "");
    // `a` only saw its own guard
    memo.leave(outer, a, Some((&[][..], 0)), "");

    assert!(matches!(memo.enter(a, ""), Lookup::Found { end: 0, .. }));
    assert!(matches!(memo.enter(b, ""), Lookup::Enter(_)));
    assert!(matches!(memo.enter(a, " "), Lookup::Enter(_)));
    assert_eq!(memo.stats().hits, 1);
    assert_eq!(memo.stats().stored, 1);
}
