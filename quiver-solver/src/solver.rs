//! The public solver facade.
//!
//! [`Solver`] exposes the incremental assert/check interface over the
//! ground solver and dispatches to the quantifier engine when the current
//! assertion set mentions binders. Model and core queries are guarded by
//! the solver state machine: values only after `Sat` with `produce-models`,
//! cores only after `Unsat` with `produce-unsat-cores`, and nothing after a
//! cancelled check.

use rustc_hash::FxHashSet;
use tracing::debug;

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::bv::BvValue;
use quiver_core::error::{Error, Result};
use quiver_core::fp::RoundingMode;
use quiver_core::option::{OptionValue, Options};

use crate::ground::{GroundSolver, SolverResult, TerminationCallback};
use crate::quant::QuantSolver;

/// Incremental SMT solver over one term manager.
pub struct Solver {
    options: Options,
    ground: GroundSolver,
    quant: Option<QuantSolver>,
    terminator: Option<TerminationCallback>,
    last: Option<SolverResult>,
    last_was_quant: bool,
}

impl Solver {
    pub fn new(options: Options) -> Self {
        let ground = GroundSolver::new(options.clone());
        Self {
            options,
            ground,
            quant: None,
            terminator: None,
            last: None,
            last_was_quant: false,
        }
    }

    /// Set an option by name (see [`Options::set`]).
    pub fn set_option(&mut self, name: &str, value: OptionValue) -> Result<()> {
        self.options.set(name, value)?;
        self.ground.set_options(self.options.clone());
        Ok(())
    }

    /// Read an option by name.
    pub fn get_option(&self, name: &str) -> Result<OptionValue> {
        self.options.get(name)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn set_termination_callback(&mut self, cb: TerminationCallback) {
        self.terminator = Some(cb.clone());
        self.ground.set_termination_callback(cb);
    }

    pub fn push(&mut self, n: u64) -> Result<()> {
        if n > 0 && !self.options.incremental {
            return Err(Error::InvalidState(
                "push requires the incremental option".to_string(),
            ));
        }
        self.ground.push(n);
        Ok(())
    }

    pub fn pop(&mut self, n: u64) -> Result<()> {
        if n > 0 && !self.options.incremental {
            return Err(Error::InvalidState(
                "pop requires the incremental option".to_string(),
            ));
        }
        self.ground.pop(n)?;
        self.last = None;
        Ok(())
    }

    pub fn assert_formula(&mut self, tm: &TermManager, t: TermId) -> Result<()> {
        self.ground.assert_formula(tm, t)?;
        self.last = None;
        Ok(())
    }

    /// Run the preprocessor and return the simplified assertion set.
    pub fn simplify(&mut self, tm: &mut TermManager) -> Result<Vec<TermId>> {
        self.ground.simplify(tm)?;
        Ok(self.ground.assertions())
    }

    pub fn check_sat(&mut self, tm: &mut TermManager, assumptions: &[TermId]) -> Result<SolverResult> {
        let assertions = self.ground.assertions();
        let quantified = assertions
            .iter()
            .chain(assumptions)
            .any(|&t| contains_quantifier(tm, t));
        let result = if quantified {
            debug!(num_assertions = assertions.len(), "dispatching to the quantifier engine");
            let mut roots = assertions;
            roots.extend_from_slice(assumptions);
            let mut quant = QuantSolver::new(self.options.clone());
            if let Some(cb) = &self.terminator {
                quant.set_termination_callback(cb.clone());
            }
            let r = quant.check(tm, &roots)?;
            self.quant = Some(quant);
            self.last_was_quant = true;
            r
        } else {
            self.last_was_quant = false;
            self.ground.check_sat(tm, assumptions)?
        };
        self.last = Some(result);
        Ok(result)
    }

    fn require_model(&self) -> Result<()> {
        if self.last != Some(SolverResult::Sat) {
            return Err(Error::InvalidState(
                "model queries require the last check to be sat".to_string(),
            ));
        }
        if !self.options.produce_models {
            return Err(Error::InvalidState(
                "model queries require the produce-models option".to_string(),
            ));
        }
        Ok(())
    }

    /// Model value of `t` as a term (a value, a lambda for functions, a
    /// store chain for arrays).
    pub fn get_value(&mut self, tm: &mut TermManager, t: TermId) -> Result<TermId> {
        self.require_model()?;
        if self.last_was_quant {
            let quant = self.quant.as_ref().expect("quantifier engine state");
            return quant.model_value(t).ok_or_else(|| {
                Error::InvalidState(
                    "the quantified model covers top-level existentials only".to_string(),
                )
            });
        }
        self.ground.value_term(tm, t)
    }

    /// Bit-vector model value of `t`.
    pub fn get_bv_value(&mut self, tm: &mut TermManager, t: TermId) -> Result<BvValue> {
        let v = self.get_value(tm, t)?;
        tm.bv_value(v).cloned().ok_or_else(|| {
            Error::InvalidState("term does not evaluate to a bit-vector value".to_string())
        })
    }

    /// Floating-point model value of `t` as `(sign, exponent, significand)`.
    pub fn get_fp_value(
        &mut self,
        tm: &mut TermManager,
        t: TermId,
    ) -> Result<(BvValue, BvValue, BvValue)> {
        let v = self.get_value(tm, t)?;
        let fp = tm.fp_value(v).ok_or_else(|| {
            Error::InvalidState("term does not evaluate to a floating-point value".to_string())
        })?;
        Ok((fp.sign(), fp.exponent(), fp.significand()))
    }

    /// Rounding-mode model value of `t`.
    pub fn get_rm_value(&mut self, tm: &mut TermManager, t: TermId) -> Result<RoundingMode> {
        let v = self.get_value(tm, t)?;
        tm.rm_value(v).ok_or_else(|| {
            Error::InvalidState("term does not evaluate to a rounding mode".to_string())
        })
    }

    fn require_ground_unsat(&self, what: &str) -> Result<()> {
        if self.last != Some(SolverResult::Unsat) {
            return Err(Error::InvalidState(format!(
                "{what} requires the last check to be unsat"
            )));
        }
        if self.last_was_quant {
            return Err(Error::InvalidState(format!(
                "{what} is not available from the quantifier engine"
            )));
        }
        Ok(())
    }

    pub fn get_unsat_core(&self) -> Result<Vec<TermId>> {
        self.require_ground_unsat("get-unsat-core")?;
        Ok(self.ground.unsat_core()?.to_vec())
    }

    pub fn get_unsat_assumptions(&self) -> Result<Vec<TermId>> {
        self.require_ground_unsat("get-unsat-assumptions")?;
        Ok(self.ground.unsat_assumptions()?.to_vec())
    }

    pub fn is_unsat_assumption(&self, t: TermId) -> Result<bool> {
        self.require_ground_unsat("is-unsat-assumption")?;
        self.ground.is_unsat_assumption(t)
    }

    /// Statistics of the underlying engines.
    pub fn stats(&self) -> quiver_core::statistics::Statistics {
        let mut stats = self.ground.stats().clone();
        if let Some(q) = &self.quant {
            stats.merge(q.stats());
        }
        stats
    }
}

fn contains_quantifier(tm: &TermManager, root: TermId) -> bool {
    let mut seen = FxHashSet::default();
    let mut visit = vec![root];
    while let Some(cur) = visit.pop() {
        if !seen.insert(cur) {
            continue;
        }
        if matches!(tm.kind(cur), Kind::Forall | Kind::Exists) {
            return true;
        }
        visit.extend(tm.children(cur).iter().copied());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver_with(models: bool, cores: bool, incremental: bool) -> Solver {
        let mut options = Options::default();
        options.produce_models = models;
        options.produce_unsat_cores = cores;
        options.incremental = incremental;
        Solver::new(options)
    }

    #[test]
    fn model_queries_are_guarded() {
        let mut tm = TermManager::new();
        let mut solver = solver_with(false, false, false);
        let b = tm.mk_bool_sort();
        let p = tm.mk_const(b, Some("p")).unwrap();
        solver.assert_formula(&tm, p).unwrap();
        assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Sat);
        // produce-models is off
        assert!(matches!(
            solver.get_value(&mut tm, p),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn core_queries_are_guarded() {
        let mut tm = TermManager::new();
        let mut solver = solver_with(true, false, false);
        let b = tm.mk_bool_sort();
        let p = tm.mk_const(b, Some("p")).unwrap();
        solver.assert_formula(&tm, p).unwrap();
        assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Sat);
        assert!(solver.get_unsat_core().is_err());
    }

    #[test]
    fn push_requires_incremental() {
        let mut solver = solver_with(false, false, false);
        assert!(solver.push(1).is_err());
        let mut solver = solver_with(false, false, true);
        assert!(solver.push(1).is_ok());
        assert!(solver.pop(1).is_ok());
        assert!(solver.pop(1).is_err());
    }

    #[test]
    fn quantified_assertions_route_to_the_quantifier_engine() {
        let mut tm = TermManager::new();
        let mut solver = solver_with(true, false, false);
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_var(bv8, Some("x")).unwrap();
        let y = tm.mk_var(bv8, Some("y")).unwrap();
        let sum = tm.mk_term(Kind::BvAdd, &[x, y], &[]).unwrap();
        let eq = tm.mk_eq(sum, y).unwrap();
        let forall = tm.mk_forall(y, eq).unwrap();
        let exists = tm.mk_exists(x, forall).unwrap();
        solver.assert_formula(&tm, exists).unwrap();
        assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Sat);
    }

    #[test]
    fn set_option_round_trips_through_solver() {
        let mut solver = solver_with(false, false, false);
        solver
            .set_option("rewrite-level", OptionValue::Num(1))
            .unwrap();
        assert_eq!(
            solver.get_option("rewrite-level").unwrap(),
            OptionValue::Num(1)
        );
        assert!(solver.set_option("bogus", OptionValue::Num(1)).is_err());
    }

    #[test]
    fn simplify_exposes_preprocessed_assertions() {
        let mut tm = TermManager::new();
        let mut solver = solver_with(false, false, false);
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let zero = tm.mk_bv_zero(bv8).unwrap();
        let add = tm.mk_term(Kind::BvAdd, &[x, zero], &[]).unwrap();
        let eq = tm.mk_eq(add, x).unwrap();
        solver.assert_formula(&tm, eq).unwrap();
        let simplified = solver.simplify(&mut tm).unwrap();
        assert!(simplified.iter().all(|&t| tm.is_true(t)));
    }
}
