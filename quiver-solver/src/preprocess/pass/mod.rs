//! Preprocessing passes.
//!
//! Each pass is a function `apply(tm, view, ctx) -> Result<bool>` reporting
//! whether it changed the assertion view. Shared pass state (rewriter,
//! recorded substitutions, Ackermann table, statistics) travels in
//! [`PassContext`].

pub mod contradicting_ands;
pub mod elim_lambda;
pub mod elim_uninterpreted;
pub mod embedded_constraints;
pub mod flatten_and;
pub mod normalize;
pub mod rewrite;
pub mod skeleton_preproc;
pub mod variable_substitution;

use rustc_hash::FxHashMap;

use quiver_core::ast::{TermId, TermManager};
use quiver_core::error::Result;
use quiver_core::option::Options;
use quiver_core::rewrite::Rewriter;
use quiver_core::statistics::Statistics;

use super::Assertion;

/// Mutable window over the assertion stack handed to a pass.
pub struct AssertionView<'a> {
    entries: &'a mut Vec<Assertion>,
}

impl<'a> AssertionView<'a> {
    pub(crate) fn new(entries: &'a mut Vec<Assertion>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> TermId {
        self.entries[i].current
    }

    pub fn origin(&self, i: usize) -> Option<TermId> {
        self.entries[i].origin
    }

    /// Replace assertion `i`; returns true when the term actually changed.
    pub fn replace(&mut self, i: usize, t: TermId) -> bool {
        if self.entries[i].current == t {
            false
        } else {
            self.entries[i].current = t;
            true
        }
    }

    /// Append a derived assertion. `origin` ties it to a user assertion for
    /// unsat-core reporting; `None` marks an internal lemma.
    pub fn push_derived(&mut self, t: TermId, origin: Option<TermId>) {
        self.entries.push(Assertion { current: t, origin });
    }
}

/// One Ackermann expansion: an application term, its argument terms and the
/// fresh constant standing in for it.
#[derive(Debug, Clone)]
pub struct AckInstance {
    pub app: TermId,
    pub args: Vec<TermId>,
    pub constant: TermId,
}

/// Ackermann expansion state, scoped with the assertion stack.
#[derive(Debug, Clone, Default)]
pub struct AckermannTable {
    /// Function or array symbol -> its expanded applications.
    pub instances: FxHashMap<TermId, Vec<AckInstance>>,
    /// Application term -> stand-in constant.
    pub app_map: FxHashMap<TermId, TermId>,
    /// Per symbol: number of instances whose congruence pairs are asserted.
    pub lemma_done: FxHashMap<TermId, usize>,
}

/// Shared state threaded through the passes.
pub struct PassContext<'a> {
    pub rewriter: &'a mut Rewriter,
    pub options: &'a Options,
    pub substitutions: &'a mut FxHashMap<TermId, TermId>,
    pub ackermann: &'a mut AckermannTable,
    pub stats: &'a mut Statistics,
}

/// True when `needle` occurs in the DAG of `root`.
pub(crate) fn occurs(tm: &TermManager, needle: TermId, root: TermId) -> bool {
    let mut seen = rustc_hash::FxHashSet::default();
    let mut visit = vec![root];
    while let Some(cur) = visit.pop() {
        if cur == needle {
            return true;
        }
        if seen.insert(cur) {
            visit.extend(tm.children(cur).iter().copied());
        }
    }
    false
}

/// Rebuild every assertion bottom-up through `step`, which may replace a
/// node whose children are already rebuilt. Returns whether anything
/// changed.
pub(crate) fn map_assertions(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    mut step: impl FnMut(&mut TermManager, TermId) -> Result<Option<TermId>>,
) -> Result<bool> {
    let mut cache: FxHashMap<TermId, TermId> = FxHashMap::default();
    let mut changed = false;
    for i in 0..view.len() {
        let root = view.get(i);
        let mut visit = vec![root];
        while let Some(&cur) = visit.last() {
            if cache.contains_key(&cur) {
                visit.pop();
                continue;
            }
            let pending: Vec<TermId> = tm
                .children(cur)
                .iter()
                .copied()
                .filter(|c| !cache.contains_key(c))
                .collect();
            if !pending.is_empty() {
                visit.extend(pending);
                continue;
            }
            visit.pop();
            let old_children: Vec<TermId> = tm.children(cur).to_vec();
            let new_children: Vec<TermId> = old_children.iter().map(|c| cache[c]).collect();
            let rebuilt = if new_children == old_children {
                cur
            } else {
                tm.rebuild(cur, &new_children)?
            };
            let res = match step(tm, rebuilt)? {
                Some(r) => r,
                None => rebuilt,
            };
            cache.insert(cur, res);
        }
        if view.replace(i, cache[&root]) {
            changed = true;
        }
    }
    Ok(changed)
}
