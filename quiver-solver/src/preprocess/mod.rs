//! Preprocessing pipeline.
//!
//! A [`Preprocessor`] owns the scoped assertion stack and runs the passes in
//! a fixed order until a full round makes no change:
//! rewrite, contradicting-ands, lambda elimination, uninterpreted
//! elimination, embedded constraints, variable substitution, and-flattening,
//! skeleton preprocessing, normalization. Every pass is individually
//! disableable and must never grow its own size metric; a pass that would is
//! required to keep the original assertions.
//!
//! `push`/`pop` snapshot and restore the complete preprocessing state so
//! that popped scopes cannot leak substitutions or Ackermann instances into
//! outer scopes.

pub mod pass;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use quiver_core::ast::{TermId, TermManager};
use quiver_core::error::Result;
use quiver_core::option::Options;
use quiver_core::rewrite::Rewriter;
use quiver_core::statistics::Statistics;

pub use pass::{AckInstance, AckermannTable, AssertionView, PassContext};

/// One assertion on the stack. `origin` is the user-asserted term the entry
/// descends from; internal lemmas (e.g. Ackermann congruence) carry `None`
/// and are never reported in unsat cores.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub current: TermId,
    pub origin: Option<TermId>,
}

#[derive(Debug, Clone)]
struct Snapshot {
    entries: Vec<Assertion>,
    substitutions: FxHashMap<TermId, TermId>,
    ackermann: AckermannTable,
}

/// Scoped assertion stack plus the pass pipeline.
pub struct Preprocessor {
    rewriter: Rewriter,
    entries: Vec<Assertion>,
    scopes: Vec<Snapshot>,
    substitutions: FxHashMap<TermId, TermId>,
    ackermann: AckermannTable,
    stats: Statistics,
}

impl Preprocessor {
    pub fn new(rewrite_level: u8) -> Self {
        Self {
            rewriter: Rewriter::new(rewrite_level),
            entries: Vec::new(),
            scopes: Vec::new(),
            substitutions: FxHashMap::default(),
            ackermann: AckermannTable::default(),
            stats: Statistics::new(),
        }
    }

    pub fn assert_formula(&mut self, t: TermId) {
        self.entries.push(Assertion { current: t, origin: Some(t) });
    }

    pub fn push(&mut self) {
        self.scopes.push(Snapshot {
            entries: self.entries.clone(),
            substitutions: self.substitutions.clone(),
            ackermann: self.ackermann.clone(),
        });
    }

    pub fn pop(&mut self) -> bool {
        match self.scopes.pop() {
            Some(snap) => {
                self.entries = snap.entries;
                self.substitutions = snap.substitutions;
                self.ackermann = snap.ackermann;
                true
            }
            None => false,
        }
    }

    pub fn num_scopes(&self) -> usize {
        self.scopes.len()
    }

    pub fn assertions(&self) -> &[Assertion] {
        &self.entries
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn rewriter_mut(&mut self) -> &mut Rewriter {
        &mut self.rewriter
    }

    /// Swap the rewriter for one at a different level (option changes
    /// between checks). Assertions and scopes are untouched.
    pub fn set_rewrite_level(&mut self, level: u8) {
        if self.rewriter.level() != level {
            self.rewriter = Rewriter::new(level);
        }
    }

    /// Run the pipeline to a fixed point over the current assertions.
    pub fn preprocess(&mut self, tm: &mut TermManager, options: &Options) -> Result<()> {
        let timer = self.stats.start("preprocess::time_total");
        let mut iterations = 0u32;
        loop {
            iterations += 1;
            let mut changed = false;
            for (name, enabled) in Self::pass_roster(options) {
                if !enabled {
                    continue;
                }
                let pass_timer = self.stats.start(&format!("preprocess::{name}::time"));
                let mut view = AssertionView::new(&mut self.entries);
                let mut ctx = PassContext {
                    rewriter: &mut self.rewriter,
                    options,
                    substitutions: &mut self.substitutions,
                    ackermann: &mut self.ackermann,
                    stats: &mut self.stats,
                };
                let pass_changed = match name {
                    "rewrite" => pass::rewrite::apply(tm, &mut view, &mut ctx)?,
                    "contradicting_ands" => pass::contradicting_ands::apply(tm, &mut view, &mut ctx)?,
                    "elim_lambda" => pass::elim_lambda::apply(tm, &mut view, &mut ctx)?,
                    "elim_uninterpreted" => pass::elim_uninterpreted::apply(tm, &mut view, &mut ctx)?,
                    "embedded_constraints" => pass::embedded_constraints::apply(tm, &mut view, &mut ctx)?,
                    "variable_substitution" => pass::variable_substitution::apply(tm, &mut view, &mut ctx)?,
                    "flatten_and" => pass::flatten_and::apply(tm, &mut view, &mut ctx)?,
                    "skeleton_preproc" => pass::skeleton_preproc::apply(tm, &mut view, &mut ctx)?,
                    "normalize" => pass::normalize::apply(tm, &mut view, &mut ctx)?,
                    _ => unreachable!("unknown pass {name}"),
                };
                pass_timer.stop(&mut self.stats);
                if pass_changed {
                    debug!(pass = name, iteration = iterations, "pass changed assertions");
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            if iterations >= 100 {
                warn!("preprocessing did not reach a fixed point after {iterations} rounds");
                break;
            }
        }
        self.stats.add("preprocess::num_iterations", u64::from(iterations));
        timer.stop(&mut self.stats);
        Ok(())
    }

    fn pass_roster(options: &Options) -> [(&'static str, bool); 9] {
        let p = &options.passes;
        // passes that move information across assertions would detach an
        // unsat core from the user assertions it came from
        let cross = !options.produce_unsat_cores;
        [
            ("rewrite", p.rewrite),
            ("contradicting_ands", p.contradicting_ands),
            ("elim_lambda", p.elim_lambda),
            ("elim_uninterpreted", p.elim_uninterpreted),
            ("embedded_constraints", p.embedded_constraints && cross),
            ("variable_substitution", p.variable_substitution && cross),
            ("flatten_and", p.flatten_and),
            ("skeleton_preproc", p.skeleton_preproc && cross),
            ("normalize", p.normalize),
        ]
    }

    /// Re-apply the recorded transformations to a downstream term (used for
    /// model queries over terms the user built after `check_sat`).
    pub fn process(&mut self, tm: &mut TermManager, t: TermId) -> Result<TermId> {
        let mut cur = t;
        for _ in 0..10 {
            let mut next = self.rewriter.rewrite(tm, cur)?;
            if !self.substitutions.is_empty() {
                next = tm.substitute_term(next, &self.substitutions)?;
            }
            if !self.ackermann.app_map.is_empty() {
                next = tm.substitute_term(next, &self.ackermann.app_map)?;
            }
            if next == cur {
                break;
            }
            cur = next;
        }
        Ok(cur)
    }

    /// The Ackermann instance table of the current scope.
    pub fn ackermann(&self) -> &AckermannTable {
        &self.ackermann
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::ast::Kind;

    #[test]
    fn pipeline_reaches_fixed_point() {
        let mut tm = TermManager::new();
        let options = Options::default();
        let mut pp = Preprocessor::new(options.rewrite_level);
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let zero = tm.mk_bv_zero(bv8).unwrap();
        let add = tm.mk_term(Kind::BvAdd, &[x, zero], &[]).unwrap();
        let eq = tm.mk_eq(add, x).unwrap();
        pp.assert_formula(eq);
        pp.preprocess(&mut tm, &options).unwrap();
        assert_eq!(pp.assertions().len(), 1);
        assert!(tm.is_true(pp.assertions()[0].current));
    }

    #[test]
    fn push_pop_restores_view() {
        let mut tm = TermManager::new();
        let options = Options::default();
        let mut pp = Preprocessor::new(options.rewrite_level);
        let b = tm.mk_bool_sort();
        let p = tm.mk_const(b, Some("p")).unwrap();
        pp.assert_formula(p);
        pp.preprocess(&mut tm, &options).unwrap();
        let saved: Vec<TermId> = pp.assertions().iter().map(|a| a.current).collect();

        pp.push();
        let np = tm.mk_not(p).unwrap();
        pp.assert_formula(np);
        pp.preprocess(&mut tm, &options).unwrap();
        assert!(pp.pop());

        let restored: Vec<TermId> = pp.assertions().iter().map(|a| a.current).collect();
        assert_eq!(saved, restored);
    }
}
