//! Ground solver: preprocess, bit-blast, drive the CNF oracle.
//!
//! The contract is the one the quantifier engine and the public solver rely
//! on: scoped `assert`, `check_sat` with assumptions, model values after
//! `Sat`, unsat cores and unsat assumption sets after `Unsat`, and a
//! cooperative termination callback polled at `check_sat` entry. A
//! cancelled check reports [`SolverResult::Unknown`] and leaves no model or
//! core behind, as do formulas whose preprocessed form still contains terms
//! outside the Bool/BV fragment (floating-point arithmetic).

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::bv::BvValue;
use quiver_core::error::{Error, Result};
use quiver_core::option::Options;
use quiver_core::statistics::Statistics;

use crate::bitblast::Bitblaster;
use crate::eval::{eval, Value};
use crate::preprocess::Preprocessor;
use crate::sat::{AigCnf, SatOracle};

/// Outcome of a satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverResult {
    Sat,
    Unsat,
    Unknown,
}

impl fmt::Display for SolverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverResult::Sat => f.write_str("sat"),
            SolverResult::Unsat => f.write_str("unsat"),
            SolverResult::Unknown => f.write_str("unknown"),
        }
    }
}

/// Cooperative cancellation predicate.
pub type TerminationCallback = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Default)]
struct Model {
    values: FxHashMap<TermId, Value>,
}

/// Bit-blasting ground solver over the CNF oracle.
pub struct GroundSolver {
    options: Options,
    preprocessor: Preprocessor,
    terminator: Option<TerminationCallback>,
    last: Option<SolverResult>,
    model: Option<Model>,
    unsat_core: Vec<TermId>,
    unsat_assumptions: Vec<TermId>,
    stats: Statistics,
}

impl GroundSolver {
    pub fn new(options: Options) -> Self {
        let preprocessor = Preprocessor::new(options.rewrite_level);
        Self {
            options,
            preprocessor,
            terminator: None,
            last: None,
            model: None,
            unsat_core: Vec::new(),
            unsat_assumptions: Vec::new(),
            stats: Statistics::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Replace the configuration (between checks). The assertion stack is
    /// untouched; a changed rewrite level swaps the memoized rewriter.
    pub fn set_options(&mut self, options: Options) {
        self.preprocessor.set_rewrite_level(options.rewrite_level);
        self.options = options;
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Add a Boolean assertion to the current scope.
    pub fn assert_formula(&mut self, tm: &TermManager, t: TermId) -> Result<()> {
        if !tm.sort(tm.sort_of(t)).is_bool() {
            return Err(Error::SortMismatch {
                kind: "assert",
                details: "assertions must be Boolean".to_string(),
            });
        }
        self.preprocessor.assert_formula(t);
        self.last = None;
        Ok(())
    }

    pub fn push(&mut self, n: u64) {
        for _ in 0..n {
            self.preprocessor.push();
        }
    }

    pub fn pop(&mut self, n: u64) -> Result<()> {
        for _ in 0..n {
            if !self.preprocessor.pop() {
                return Err(Error::InvalidState("pop without matching push".to_string()));
            }
        }
        self.last = None;
        Ok(())
    }

    pub fn num_scopes(&self) -> usize {
        self.preprocessor.num_scopes()
    }

    pub fn set_termination_callback(&mut self, cb: TerminationCallback) {
        self.terminator = Some(cb);
    }

    /// Poll the termination callback.
    pub fn terminate(&self) -> bool {
        self.terminator.as_ref().is_some_and(|cb| cb())
    }

    /// Run preprocessing only; the simplified assertions remain visible
    /// through [`GroundSolver::assertions`].
    pub fn simplify(&mut self, tm: &mut TermManager) -> Result<()> {
        self.preprocessor.preprocess(tm, &self.options)
    }

    /// The current (possibly preprocessed) assertion terms.
    pub fn assertions(&self) -> Vec<TermId> {
        self.preprocessor
            .assertions()
            .iter()
            .map(|a| a.current)
            .collect()
    }

    pub fn check_sat(&mut self, tm: &mut TermManager, assumptions: &[TermId]) -> Result<SolverResult> {
        self.model = None;
        self.unsat_core.clear();
        self.unsat_assumptions.clear();

        if self.terminate() {
            self.last = Some(SolverResult::Unknown);
            return Ok(SolverResult::Unknown);
        }

        let timer = self.stats.start("ground::time_check_sat");
        self.preprocessor.preprocess(tm, &self.options)?;

        let mut bb = Bitblaster::new();
        let mut oracle = SatOracle::new();
        let mut cnf = AigCnf::new();
        let mut assumed: Vec<i32> = Vec::new();
        let mut lit_source: FxHashMap<i32, (TermId, bool)> = FxHashMap::default();

        let entries: Vec<(TermId, Option<TermId>)> = self
            .preprocessor
            .assertions()
            .iter()
            .map(|a| (a.current, a.origin))
            .collect();
        for (current, origin) in entries {
            let root = match bb.blast_bool(tm, current) {
                Ok(r) => r,
                Err(Error::Unsupported(what)) => {
                    debug!(what, "formula outside the bit-blastable fragment");
                    timer.stop(&mut self.stats);
                    self.last = Some(SolverResult::Unknown);
                    return Ok(SolverResult::Unknown);
                }
                Err(e) => return Err(e),
            };
            let lit = cnf.lit(&mut oracle, &bb.aig, root);
            match origin {
                Some(origin) if self.options.produce_unsat_cores => {
                    let act = oracle.new_var();
                    oracle.add_clause(&[-act, lit]);
                    assumed.push(act);
                    lit_source.insert(act, (origin, false));
                }
                _ => oracle.add_clause(&[lit]),
            }
        }
        for &t in assumptions {
            let p = self.preprocessor.process(tm, t)?;
            let root = match bb.blast_bool(tm, p) {
                Ok(r) => r,
                Err(Error::Unsupported(_)) => {
                    timer.stop(&mut self.stats);
                    self.last = Some(SolverResult::Unknown);
                    return Ok(SolverResult::Unknown);
                }
                Err(e) => return Err(e),
            };
            let lit = cnf.lit(&mut oracle, &bb.aig, root);
            assumed.push(lit);
            lit_source.insert(lit, (t, true));
        }

        if self.terminate() {
            timer.stop(&mut self.stats);
            self.last = Some(SolverResult::Unknown);
            return Ok(SolverResult::Unknown);
        }

        let sat = oracle.solve(&assumed);
        let result = if sat {
            let mut model = Model::default();
            for (&term, bits) in bb.inputs() {
                let sort = tm.sort(tm.sort_of(term));
                if sort.is_bool() {
                    let v = bits
                        .first()
                        .and_then(|&b| cnf.input_var(b))
                        .map(|var| oracle.value(var))
                        .unwrap_or(false);
                    model.values.insert(term, Value::Bool(v));
                } else if sort.is_bv() {
                    let mut acc = num_bigint::BigUint::default();
                    for (i, &bit) in bits.iter().enumerate() {
                        let v = cnf.input_var(bit).map(|var| oracle.value(var)).unwrap_or(false);
                        if v {
                            acc |= num_bigint::BigUint::from(1u8) << i;
                        }
                    }
                    model.values.insert(term, Value::Bv(BvValue::new(sort.bv_size(), acc)));
                }
            }
            self.model = Some(model);
            SolverResult::Sat
        } else {
            for &lit in oracle.failed_assumptions() {
                if let Some(&(term, is_assumption)) = lit_source.get(&lit) {
                    if is_assumption {
                        self.unsat_assumptions.push(term);
                    } else if !self.unsat_core.contains(&term) {
                        self.unsat_core.push(term);
                    }
                }
            }
            SolverResult::Unsat
        };
        timer.stop(&mut self.stats);
        self.stats.incr("ground::num_check_sat");
        self.last = Some(result);
        Ok(result)
    }

    pub fn last_result(&self) -> Option<SolverResult> {
        self.last
    }

    fn require(&self, expected: SolverResult, what: &str) -> Result<()> {
        if self.last != Some(expected) {
            return Err(Error::InvalidState(format!(
                "{what} requires the last check to be {expected}"
            )));
        }
        Ok(())
    }

    /// Evaluate a Bool/BV term under the current model.
    pub fn value(&mut self, tm: &mut TermManager, t: TermId) -> Result<Value> {
        self.require(SolverResult::Sat, "get-value")?;
        let p = self.preprocessor.process(tm, t)?;
        let model = self.model.as_ref().expect("model after sat");
        eval(tm, p, &mut |_, n| model.values.get(&n).cloned())
    }

    /// Model value as a value term. Function- and array-sorted terms are
    /// reconstructed from their Ackermann instances as lambda terms and
    /// store chains.
    pub fn value_term(&mut self, tm: &mut TermManager, t: TermId) -> Result<TermId> {
        self.require(SolverResult::Sat, "get-value")?;
        let sort = tm.sort(tm.sort_of(t));
        if sort.is_fun() {
            return self.fun_value(tm, t);
        }
        if sort.is_array() {
            return self.array_value(tm, t);
        }
        let p = self.preprocessor.process(tm, t)?;
        if tm.is_value(p) {
            // already a literal (covers rounding-mode and floating-point
            // values, which the evaluator does not interpret)
            return Ok(p);
        }
        match self.value(tm, p)? {
            Value::Bool(b) => Ok(tm.mk_bool(b)),
            Value::Bv(v) => Ok(tm.mk_bv_val(v)),
        }
    }

    fn instance_points(
        &mut self,
        tm: &mut TermManager,
        f: TermId,
    ) -> Result<Vec<(Vec<BvValue>, Value)>> {
        let instances = self
            .preprocessor
            .ackermann()
            .instances
            .get(&f)
            .cloned()
            .unwrap_or_default();
        let mut points = Vec::with_capacity(instances.len());
        for inst in instances {
            let mut args = Vec::with_capacity(inst.args.len());
            for &a in &inst.args {
                args.push(self.value(tm, a)?.as_bv()?.clone());
            }
            let out = self.value(tm, inst.constant)?;
            points.push((args, out));
        }
        Ok(points)
    }

    /// Lambda term for an uninterpreted function, from its Ackermann points.
    fn fun_value(&mut self, tm: &mut TermManager, f: TermId) -> Result<TermId> {
        let points = self.instance_points(tm, f)?;
        let sort = tm.sort(tm.sort_of(f));
        let domain: Vec<_> = sort.fun_domain().to_vec();
        let codomain = sort.fun_codomain();
        let vars: Vec<TermId> = domain
            .iter()
            .map(|&d| tm.mk_var(d, None))
            .collect::<Result<_>>()?;
        let mut body = self.default_term(tm, codomain)?;
        for (args, out) in points.into_iter().rev() {
            let mut conds = Vec::with_capacity(args.len());
            for (var, value) in vars.iter().zip(args) {
                let v = tm.mk_bv_val(value);
                conds.push(tm.mk_eq(*var, v)?);
            }
            let cond = tm.mk_and(&conds)?;
            let out_term = self.value_to_term(tm, out);
            body = tm.mk_ite(cond, out_term, body)?;
        }
        let mut lam = body;
        for &v in vars.iter().rev() {
            lam = tm.mk_lambda(v, lam)?;
        }
        Ok(lam)
    }

    /// Store chain for an array constant, from its read instances.
    fn array_value(&mut self, tm: &mut TermManager, a: TermId) -> Result<TermId> {
        let points = self.instance_points(tm, a)?;
        let sort_id = tm.sort_of(a);
        let elt = tm.sort(sort_id).array_element();
        let default = self.default_term(tm, elt)?;
        let mut res = tm.mk_const_array(sort_id, default)?;
        for (args, out) in points {
            let idx = tm.mk_bv_val(args[0].clone());
            let out_term = self.value_to_term(tm, out);
            res = tm.mk_term(Kind::Store, &[res, idx, out_term], &[])?;
        }
        Ok(res)
    }

    fn value_to_term(&self, tm: &mut TermManager, v: Value) -> TermId {
        match v {
            Value::Bool(b) => tm.mk_bool(b),
            Value::Bv(bv) => tm.mk_bv_val(bv),
        }
    }

    fn default_term(&self, tm: &mut TermManager, sort: quiver_core::sort::SortId) -> Result<TermId> {
        let view = tm.sort(sort);
        if view.is_bool() {
            Ok(tm.mk_false())
        } else if view.is_bv() {
            tm.mk_bv_zero(sort)
        } else {
            Err(Error::Unsupported(
                "no default model value for this sort".to_string(),
            ))
        }
    }

    pub fn unsat_core(&self) -> Result<&[TermId]> {
        self.require(SolverResult::Unsat, "get-unsat-core")?;
        if !self.options.produce_unsat_cores {
            return Err(Error::InvalidState(
                "unsat cores require the produce-unsat-cores option".to_string(),
            ));
        }
        Ok(&self.unsat_core)
    }

    pub fn unsat_assumptions(&self) -> Result<&[TermId]> {
        self.require(SolverResult::Unsat, "get-unsat-assumptions")?;
        Ok(&self.unsat_assumptions)
    }

    pub fn is_unsat_assumption(&self, t: TermId) -> Result<bool> {
        Ok(self.unsat_assumptions()?.contains(&t))
    }
}
