//! Counterexample-guided quantifier solving.
//!
//! The engine runs two ground solver instances over one term manager: the
//! *F-solver* checks candidate models of the skolemized formula (universal
//! variables replaced by fresh constants, existential variables by skolem
//! constants or functions over their enclosing universals), and the
//! *E-solver* accumulates refinements, instances of the body at the
//! counterexamples the F-solver produced. Candidate values for existential
//! variables are synthesized from the counterexample table by bounded
//! enumeration, with a concrete ITE model as fallback.
//!
//! With the dual option enabled (and no uninterpreted functions present),
//! a second bundle solves the negated formula with swapped quantifiers in a
//! parallel worker that owns its own term manager; the first definite
//! verdict wins and the dual verdict is complemented.

pub(crate) mod simplify;
mod synth;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::bv::BvValue;
use quiver_core::error::Result;
use quiver_core::option::{Options, SynthMode};
use quiver_core::sort::SortId;
use quiver_core::statistics::Statistics;

use crate::eval::Value;
use crate::ground::{GroundSolver, SolverResult, TerminationCallback};

use synth::{synthesize_term, SynthSpec};

/// True when `var` occurs in `root`.
pub(crate) fn occurs_free(tm: &TermManager, var: TermId, root: TermId) -> bool {
    let mut seen = FxHashSet::default();
    let mut visit = vec![root];
    while let Some(cur) = visit.pop() {
        if cur == var {
            return true;
        }
        if seen.insert(cur) {
            visit.extend(tm.children(cur).iter().copied());
        }
    }
    false
}

struct UVar {
    var: TermId,
    f_const: TermId,
}

struct EVar {
    var: TermId,
    /// Indices into the universal variable list this evar depends on.
    deps: Vec<usize>,
    /// E-solver symbol: constant, or uninterpreted function over the deps.
    e_term: TermId,
    /// F-solver skolem symbol of the same shape.
    f_skolem: TermId,
}

struct SynthState {
    value: Option<TermId>,
    partial: bool,
    limit: u64,
}

struct CounterExample {
    uvals: Vec<Value>,
    evals: Vec<Value>,
}

enum Step {
    Done(SolverResult),
    Refined,
}

/// The two ground solver instances plus all bookkeeping of one CEGAR loop.
struct GroundSolvers {
    formula: TermId,
    options: Options,
    e_solver: GroundSolver,
    f_solver: GroundSolver,
    uvars: Vec<UVar>,
    evars: Vec<EVar>,
    has_ufs: bool,
    /// Bit-vector value terms occurring in the formula, synthesis leaves.
    consts: Vec<TermId>,
    ces: Vec<CounterExample>,
    ce_set: FxHashSet<Vec<Value>>,
    synth: Vec<SynthState>,
    /// Previously synthesized quantifier instantiations, per universal.
    qi_prev: FxHashMap<TermId, TermId>,
    refinements: u64,
    stats: Statistics,
}

impl GroundSolvers {
    /// Build a bundle for a normalized formula. Returns `None` when the
    /// formula is outside the supported fragment (non-bitvector binders).
    fn new(
        tm: &mut TermManager,
        options: &Options,
        formula: TermId,
        terminator: Option<TerminationCallback>,
    ) -> Result<Option<Self>> {
        let mut uvars: Vec<UVar> = Vec::new();
        let mut evars: Vec<EVar> = Vec::new();

        // walk the quantifier skeleton, tracking enclosing universals
        enum Frame {
            Enter(TermId),
            ExitForall,
        }
        let mut registered: FxHashSet<TermId> = FxHashSet::default();
        let mut fstack: Vec<usize> = Vec::new();
        let mut stack = vec![Frame::Enter(formula)];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::ExitForall => {
                    fstack.pop();
                }
                Frame::Enter(t) => match tm.kind(t) {
                    Kind::And | Kind::Or => {
                        for &c in tm.children(t) {
                            stack.push(Frame::Enter(c));
                        }
                    }
                    Kind::Forall => {
                        let var = tm.child(t, 0);
                        if !registered.insert(var) {
                            continue;
                        }
                        if !tm.sort(tm.sort_of(var)).is_bv() && !tm.sort(tm.sort_of(var)).is_bool()
                        {
                            return Ok(None);
                        }
                        let f_const = tm.mk_const(tm.sort_of(var), None)?;
                        uvars.push(UVar { var, f_const });
                        fstack.push(uvars.len() - 1);
                        stack.push(Frame::ExitForall);
                        stack.push(Frame::Enter(tm.child(t, 1)));
                    }
                    Kind::Exists => {
                        let var = tm.child(t, 0);
                        if !registered.insert(var) {
                            continue;
                        }
                        if !tm.sort(tm.sort_of(var)).is_bv() && !tm.sort(tm.sort_of(var)).is_bool()
                        {
                            return Ok(None);
                        }
                        let deps = fstack.clone();
                        let (e_term, f_skolem) = if deps.is_empty() {
                            (
                                tm.mk_const(tm.sort_of(var), None)?,
                                tm.mk_const(tm.sort_of(var), None)?,
                            )
                        } else {
                            let domain: Vec<SortId> =
                                deps.iter().map(|&i| tm.sort_of(uvars[i].var)).collect();
                            let fun = tm.mk_fun_sort(&domain, tm.sort_of(var))?;
                            (tm.mk_const(fun, None)?, tm.mk_const(fun, None)?)
                        };
                        evars.push(EVar { var, deps, e_term, f_skolem });
                        stack.push(Frame::Enter(tm.child(t, 1)));
                    }
                    _ => {}
                },
            }
        }

        // collect value leaves and detect uninterpreted functions
        let mut consts: Vec<TermId> = Vec::new();
        let mut has_ufs = false;
        let mut seen = FxHashSet::default();
        let mut visit = vec![formula];
        while let Some(cur) = visit.pop() {
            if !seen.insert(cur) {
                continue;
            }
            if tm.bv_value(cur).is_some() {
                consts.push(cur);
            }
            if tm.kind(cur) == Kind::Apply && tm.is_const(tm.child(cur, 0)) {
                has_ufs = true;
            }
            if tm.is_const(cur) && tm.sort(tm.sort_of(cur)).is_fun() {
                has_ufs = true;
            }
            visit.extend(tm.children(cur).iter().copied());
        }
        consts.sort();

        let mut ground_options = options.clone();
        ground_options.produce_models = true;
        ground_options.produce_unsat_cores = false;
        let mut e_solver = GroundSolver::new(ground_options.clone());
        let mut f_solver = GroundSolver::new(ground_options);
        if let Some(cb) = &terminator {
            e_solver.set_termination_callback(cb.clone());
            f_solver.set_termination_callback(cb.clone());
        }

        let synth = evars
            .iter()
            .map(|_| SynthState {
                value: None,
                partial: false,
                limit: options.quant_synth_limit,
            })
            .collect();

        Ok(Some(Self {
            formula,
            options: options.clone(),
            e_solver,
            f_solver,
            uvars,
            evars,
            has_ufs,
            consts,
            ces: Vec::new(),
            ce_set: FxHashSet::default(),
            synth,
            qi_prev: FxHashMap::default(),
            refinements: 0,
            stats: Statistics::new(),
        }))
    }

    fn value_to_term(tm: &mut TermManager, v: &Value) -> TermId {
        match v {
            Value::Bool(b) => tm.mk_bool(*b),
            Value::Bv(bv) => tm.mk_bv_val(bv.clone()),
        }
    }

    /// Read the value of every existential variable per counterexample out
    /// of the E-solver model.
    fn flat_model(&mut self, tm: &mut TermManager) -> Result<Vec<Vec<Value>>> {
        let mut flat = Vec::with_capacity(self.ces.len());
        for ce_idx in 0..self.ces.len() {
            let mut row = Vec::with_capacity(self.evars.len());
            for ev_idx in 0..self.evars.len() {
                let (e_term, deps) = {
                    let ev = &self.evars[ev_idx];
                    (ev.e_term, ev.deps.clone())
                };
                let value = if deps.is_empty() {
                    self.e_solver.value(tm, e_term)?
                } else {
                    let args: Vec<TermId> = deps
                        .iter()
                        .map(|&i| Self::value_to_term(tm, &self.ces[ce_idx].uvals[i]))
                        .collect();
                    let app = tm.mk_apply(e_term, &args)?;
                    self.e_solver.value(tm, app)?
                };
                row.push(value);
            }
            flat.push(row);
        }
        Ok(flat)
    }

    /// Per-example full assignments (universals and existentials).
    fn example_assignments(&self, flat: &[Vec<Value>]) -> Vec<FxHashMap<TermId, Value>> {
        let mut out = Vec::with_capacity(self.ces.len());
        for (ce, row) in self.ces.iter().zip(flat) {
            let mut map = FxHashMap::default();
            for (uv, val) in self.uvars.iter().zip(&ce.uvals) {
                map.insert(uv.var, val.clone());
            }
            for (ev, val) in self.evars.iter().zip(row) {
                map.insert(ev.var, val.clone());
            }
            out.push(map);
        }
        out
    }

    /// The boolean frontier of the formula around `var`: smallest
    /// Boolean-sorted subterms whose cone contains the variable.
    fn cone_constraints(&self, tm: &TermManager, var: TermId) -> Vec<TermId> {
        let mut contains: FxHashSet<TermId> = FxHashSet::default();
        let mut order: Vec<TermId> = Vec::new();
        let mut seen = FxHashSet::default();
        let mut visit = vec![self.formula];
        while let Some(&cur) = visit.last() {
            if seen.contains(&cur) {
                visit.pop();
                continue;
            }
            let pending: Vec<TermId> = tm
                .children(cur)
                .iter()
                .copied()
                .filter(|c| !seen.contains(c))
                .collect();
            if !pending.is_empty() {
                visit.extend(pending);
                continue;
            }
            visit.pop();
            seen.insert(cur);
            order.push(cur);
        }
        for &t in &order {
            if t == var || tm.children(t).iter().any(|c| contains.contains(c)) {
                contains.insert(t);
            }
        }
        let mut constraints = Vec::new();
        for &t in &order {
            if !contains.contains(&t) || !tm.sort(tm.sort_of(t)).is_bool() {
                continue;
            }
            let child_is_bool_cone = tm
                .children(t)
                .iter()
                .any(|&c| contains.contains(&c) && tm.sort(tm.sort_of(c)).is_bool());
            if !child_is_bool_cone {
                constraints.push(t);
            }
        }
        constraints
    }

    /// Synthesize a candidate term per existential variable from the flat
    /// model; the per-evar budget persists across loop iterations.
    fn synthesize_model(&mut self, tm: &mut TermManager, flat: &[Vec<Value>]) -> Result<()> {
        let examples = self.example_assignments(flat);
        let default_limit = self.options.quant_synth_limit;
        for i in 0..self.evars.len() {
            let (var, deps) = {
                let ev = &self.evars[i];
                (ev.var, ev.deps.clone())
            };
            if deps.is_empty() {
                // outermost: the value is the same for every counterexample
                let value = if let Some(row) = flat.first() {
                    row[i].clone()
                } else {
                    self.e_solver.value(tm, self.evars[i].e_term)?
                };
                let term = Self::value_to_term(tm, &value);
                self.synth[i] = SynthState { value: Some(term), partial: false, limit: self.synth[i].limit };
                self.stats.incr("quant::synthesize_const");
                continue;
            }

            // Boolean-sorted evars skip enumeration and take the ITE model
            let outputs: Option<Vec<BvValue>> = flat
                .iter()
                .map(|row| row[i].as_bv().ok().cloned())
                .collect();
            let inputs: Vec<TermId> = deps.iter().map(|&d| self.uvars[d].var).collect();

            let mut limit = self.synth[i].limit;
            if self.synth[i].partial {
                // previous search was partial: widen the budget
                limit = limit.saturating_mul(3) / 2;
                if limit > default_limit.saturating_mul(10) {
                    limit = default_limit;
                }
            }
            let prev = if self.synth[i].partial { None } else { self.synth[i].value };

            let mode = self.options.quant_synth;
            let mut candidate = None;
            if let Some(outputs) = &outputs {
                if matches!(mode, SynthMode::El | SynthMode::ElElmc) {
                    let spec = SynthSpec {
                        inputs: &inputs,
                        examples: &examples,
                        outputs,
                        consts: &self.consts,
                        constraints: &[],
                        placeholder: var,
                    };
                    candidate = synthesize_term(tm, &spec, limit, prev)?;
                }
                if candidate.is_none() && matches!(mode, SynthMode::Elmc | SynthMode::ElElmc) {
                    let constraints = self.cone_constraints(tm, var);
                    let spec = SynthSpec {
                        inputs: &inputs,
                        examples: &examples,
                        outputs,
                        consts: &self.consts,
                        constraints: &constraints,
                        placeholder: var,
                    };
                    candidate = synthesize_term(tm, &spec, limit, prev)?;
                }
                if candidate.is_none() && mode == SynthMode::Elmr {
                    let constraints = [self.formula];
                    let spec = SynthSpec {
                        inputs: &inputs,
                        examples: &examples,
                        outputs,
                        consts: &self.consts,
                        constraints: &constraints,
                        placeholder: var,
                    };
                    candidate = synthesize_term(tm, &spec, limit, prev)?;
                }
            }

            self.synth[i] = match candidate {
                Some(t) => {
                    self.stats.incr("quant::synthesize_term");
                    SynthState { value: Some(t), partial: false, limit }
                }
                None => {
                    self.stats.incr("quant::synthesize_none");
                    let ite = self.concrete_ite_model(tm, i, flat)?;
                    SynthState { value: Some(ite), partial: true, limit }
                }
            };
        }
        Ok(())
    }

    /// Fallback model: a nested ITE over the dependency tuple, one branch
    /// per counterexample, defaulting to zero.
    fn concrete_ite_model(
        &mut self,
        tm: &mut TermManager,
        ev_idx: usize,
        flat: &[Vec<Value>],
    ) -> Result<TermId> {
        let deps = self.evars[ev_idx].deps.clone();
        let var = self.evars[ev_idx].var;
        let sort = tm.sort_of(var);
        let mut acc = if tm.sort(sort).is_bool() {
            tm.mk_false()
        } else {
            tm.mk_bv_zero(sort)?
        };
        for (ce_idx, row) in flat.iter().enumerate() {
            let mut conds = Vec::with_capacity(deps.len());
            for &d in &deps {
                let uvar = self.uvars[d].var;
                let val = Self::value_to_term(tm, &self.ces[ce_idx].uvals[d]);
                conds.push(tm.mk_eq(uvar, val)?);
            }
            let cond = tm.mk_and(&conds)?;
            let branch = Self::value_to_term(tm, &row[ev_idx]);
            acc = tm.mk_ite(cond, branch, acc)?;
        }
        Ok(acc)
    }

    /// Instantiate the formula: universals become their fresh constants,
    /// existentials their synthesized terms (or skolem applications when no
    /// model is available). Returns the ground candidate and the term each
    /// existential was replaced with.
    fn instantiate_formula(&mut self, tm: &mut TermManager) -> Result<(TermId, Vec<TermId>)> {
        let uvar_map: FxHashMap<TermId, TermId> = self
            .uvars
            .iter()
            .map(|uv| (uv.var, uv.f_const))
            .collect();
        let mut map = uvar_map.clone();
        let mut evar_inst = Vec::with_capacity(self.evars.len());
        for i in 0..self.evars.len() {
            let (var, deps, f_skolem) = {
                let ev = &self.evars[i];
                (ev.var, ev.deps.clone(), ev.f_skolem)
            };
            let raw = match self.synth[i].value {
                Some(t) => t,
                None => {
                    if deps.is_empty() {
                        f_skolem
                    } else {
                        let args: Vec<TermId> =
                            deps.iter().map(|&d| self.uvars[d].f_const).collect();
                        tm.mk_apply(f_skolem, &args)?
                    }
                }
            };
            // synthesized terms mention universal variables
            let replacement = tm.substitute_term(raw, &uvar_map)?;
            map.insert(var, replacement);
            evar_inst.push(replacement);
        }
        let g = instantiate(tm, self.formula, &map)?;
        Ok((g, evar_inst))
    }

    /// Build and assert the E-solver refinement for the newest
    /// counterexample.
    fn refine_exists_solver(&mut self, tm: &mut TermManager) -> Result<()> {
        let ce = self.ces.last().expect("counterexample recorded");
        let mut map: FxHashMap<TermId, TermId> = FxHashMap::default();
        for (uv, val) in self.uvars.iter().zip(&ce.uvals) {
            map.insert(uv.var, Self::value_to_term(tm, val));
        }
        for ev in &self.evars {
            let replacement = if ev.deps.is_empty() {
                ev.e_term
            } else {
                let args: Vec<TermId> = ev
                    .deps
                    .iter()
                    .map(|&d| Self::value_to_term(tm, &ce.uvals[d]))
                    .collect();
                tm.mk_apply(ev.e_term, &args)?
            };
            map.insert(ev.var, replacement);
        }
        let refinement = instantiate(tm, self.formula, &map)?;
        debug_assert!(!tm.is_true(refinement), "vacuous refinement");
        self.e_solver.assert_formula(tm, refinement)?;
        self.refinements += 1;
        self.stats.incr("quant::refinements");
        Ok(())
    }

    /// Synthesize instantiation terms for the universal variables and push
    /// the corresponding instance of the body as an extra E-solver lemma.
    fn synthesize_quant_inst(&mut self, tm: &mut TermManager) -> Result<()> {
        let inputs: Vec<TermId> = self
            .evars
            .iter()
            .filter(|ev| ev.deps.is_empty())
            .map(|ev| ev.var)
            .collect();
        if inputs.is_empty() || self.ces.is_empty() {
            return Ok(());
        }
        let flat: Vec<Vec<Value>> = self.ces.iter().map(|ce| ce.evals.clone()).collect();
        let examples = self.example_assignments(&flat);
        let not_formula = tm.mk_not(self.formula)?;

        // independent evars map to their E-solver constants inside lemmas
        let evar_to_e: FxHashMap<TermId, TermId> = self
            .evars
            .iter()
            .filter(|ev| ev.deps.is_empty())
            .map(|ev| (ev.var, ev.e_term))
            .collect();

        let mut qi_cur: FxHashMap<TermId, TermId> = FxHashMap::default();
        let mut map: FxHashMap<TermId, TermId> = FxHashMap::default();
        let mut num_synth = 0;
        for (j, uv) in self.uvars.iter().enumerate() {
            let outputs: Option<Vec<BvValue>> = self
                .ces
                .iter()
                .map(|ce| ce.uvals[j].as_bv().ok().cloned())
                .collect();
            let Some(outputs) = outputs else {
                let last = self.ces.last().expect("counterexample recorded");
                let c = Self::value_to_term(tm, &last.uvals[j]);
                map.insert(uv.var, c);
                continue;
            };
            let prev = self.qi_prev.get(&uv.var).copied();
            let spec = SynthSpec {
                inputs: &inputs,
                examples: &examples,
                outputs: &outputs,
                consts: &self.consts,
                constraints: std::slice::from_ref(&not_formula),
                placeholder: uv.var,
            };
            let result = synthesize_term(tm, &spec, 10_000, prev)?;
            match result {
                Some(t) => {
                    num_synth += 1;
                    qi_cur.insert(uv.var, t);
                    let instantiated = tm.substitute_term(t, &evar_to_e)?;
                    map.insert(uv.var, instantiated);
                }
                None => {
                    let last = self.ces.last().expect("counterexample recorded");
                    let c = Self::value_to_term(tm, &last.uvals[j]);
                    map.insert(uv.var, c);
                }
            }
        }
        if num_synth == 0 {
            self.qi_prev = qi_cur;
            return Ok(());
        }
        for ev in &self.evars {
            let replacement = if ev.deps.is_empty() {
                ev.e_term
            } else {
                let args: Vec<TermId> = ev.deps.iter().map(|&d| map[&self.uvars[d].var]).collect();
                tm.mk_apply(ev.e_term, &args)?
            };
            map.insert(ev.var, replacement);
        }
        let lemma = instantiate(tm, self.formula, &map)?;
        self.e_solver.assert_formula(tm, lemma)?;
        self.stats.incr("quant::qi_lemmas");
        self.qi_prev = qi_cur;
        Ok(())
    }

    /// One round of the counterexample-guided loop.
    fn find_model(&mut self, tm: &mut TermManager, skip_exists: bool) -> Result<Step> {
        if !skip_exists {
            let timer = self.stats.start("quant::time_e_solver");
            let r = self.e_solver.check_sat(tm, &[])?;
            timer.stop(&mut self.stats);
            match r {
                SolverResult::Unsat => return Ok(Step::Done(SolverResult::Unsat)),
                SolverResult::Unknown => return Ok(Step::Done(SolverResult::Unknown)),
                SolverResult::Sat => {}
            }
            let timer = self.stats.start("quant::time_synth");
            let flat = self.flat_model(tm)?;
            self.synthesize_model(tm, &flat)?;
            timer.stop(&mut self.stats);
        }

        let (g, evar_inst) = self.instantiate_formula(tm)?;

        if self.uvars.is_empty() {
            // no universals: the instantiated formula is a plain ground query
            self.f_solver.assert_formula(tm, g)?;
            let timer = self.stats.start("quant::time_f_solver");
            let r = self.f_solver.check_sat(tm, &[])?;
            timer.stop(&mut self.stats);
            if r == SolverResult::Sat {
                // witness values for the existentials come from the F model
                for (i, &inst) in evar_inst.iter().enumerate() {
                    let v = self.f_solver.value(tm, inst)?;
                    let term = Self::value_to_term(tm, &v);
                    self.synth[i].value = Some(term);
                    self.synth[i].partial = false;
                }
            }
            return Ok(Step::Done(r));
        }

        let ng = tm.mk_not(g)?;
        let timer = self.stats.start("quant::time_f_solver");
        let r = self.f_solver.check_sat(tm, &[ng])?;
        timer.stop(&mut self.stats);
        match r {
            SolverResult::Unsat => return Ok(Step::Done(SolverResult::Sat)),
            SolverResult::Unknown => return Ok(Step::Done(SolverResult::Unknown)),
            SolverResult::Sat => {}
        }

        // counterexample: universal assignment plus witnessed existentials
        let mut uvals = Vec::with_capacity(self.uvars.len());
        for i in 0..self.uvars.len() {
            let c = self.uvars[i].f_const;
            uvals.push(self.f_solver.value(tm, c)?);
        }
        let mut evals = Vec::with_capacity(self.evars.len());
        for &inst in &evar_inst {
            evals.push(self.f_solver.value(tm, inst)?);
        }
        if !self.ce_set.insert(uvals.clone()) {
            // a repeated counterexample means the refinement made no progress
            warn!("repeated counterexample; giving up");
            return Ok(Step::Done(SolverResult::Unknown));
        }
        self.ces.push(CounterExample { uvals, evals });

        let timer = self.stats.start("quant::time_refine");
        self.refine_exists_solver(tm)?;
        timer.stop(&mut self.stats);

        if self.options.quant_synth_qi {
            let timer = self.stats.start("quant::time_qinst");
            self.synthesize_quant_inst(tm)?;
            timer.stop(&mut self.stats);
        }
        Ok(Step::Refined)
    }

    /// Drive [`GroundSolvers::find_model`] to a verdict.
    fn solve(&mut self, tm: &mut TermManager, stop: &AtomicBool) -> Result<SolverResult> {
        let mut skip_exists = true;
        loop {
            if stop.load(Ordering::Acquire) {
                return Ok(SolverResult::Unknown);
            }
            match self.find_model(tm, skip_exists)? {
                Step::Done(r) => return Ok(r),
                Step::Refined => skip_exists = false,
            }
        }
    }
}

/// Replace variables through `map` and strip binders.
fn instantiate(tm: &mut TermManager, root: TermId, map: &FxHashMap<TermId, TermId>) -> Result<TermId> {
    let mut cache: FxHashMap<TermId, TermId> = map.clone();
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
        let children: Vec<TermId> = tm.children(cur).iter().map(|c| cache[c]).collect();
        let res = match tm.kind(cur) {
            Kind::Forall | Kind::Exists => children[1],
            _ => {
                let old: Vec<TermId> = tm.children(cur).to_vec();
                if children == old {
                    cur
                } else {
                    tm.rebuild(cur, &children)?
                }
            }
        };
        cache.insert(cur, res);
    }
    Ok(cache[&root])
}

/// Copy a term into another manager, optionally swapping the quantifiers
/// (the dual construction negates the result separately).
fn transfer(
    src: &TermManager,
    dst: &mut TermManager,
    root: TermId,
    swap_quantifiers: bool,
) -> Result<TermId> {
    let mut sorts: FxHashMap<SortId, SortId> = FxHashMap::default();
    let mut cache: FxHashMap<TermId, TermId> = FxHashMap::default();
    let mut visit = vec![root];
    while let Some(&cur) = visit.last() {
        if cache.contains_key(&cur) {
            visit.pop();
            continue;
        }
        let pending: Vec<TermId> = src
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
        let children: Vec<TermId> = src.children(cur).iter().map(|c| cache[c]).collect();
        let res = transfer_node(src, dst, cur, &children, swap_quantifiers, &mut sorts)?;
        cache.insert(cur, res);
    }
    Ok(cache[&root])
}

fn transfer_sort(
    src: &TermManager,
    dst: &mut TermManager,
    sort: SortId,
    cache: &mut FxHashMap<SortId, SortId>,
) -> Result<SortId> {
    if let Some(&s) = cache.get(&sort) {
        return Ok(s);
    }
    let view = src.sort(sort);
    let res = if view.is_bool() {
        dst.mk_bool_sort()
    } else if view.is_bv() {
        dst.mk_bv_sort(view.bv_size())
    } else if view.is_rm() {
        dst.mk_rm_sort()
    } else if view.is_fp() {
        dst.mk_fp_sort(view.fp_exp_size(), view.fp_sig_size())
    } else if view.is_array() {
        let (i, e) = (view.array_index(), view.array_element());
        let i = transfer_sort(src, dst, i, cache)?;
        let e = transfer_sort(src, dst, e, cache)?;
        dst.mk_array_sort(i, e)?
    } else {
        let domain: Vec<SortId> = view.fun_domain().to_vec();
        let codomain = view.fun_codomain();
        let domain: Vec<SortId> = domain
            .into_iter()
            .map(|d| transfer_sort(src, dst, d, cache))
            .collect::<Result<_>>()?;
        let codomain = transfer_sort(src, dst, codomain, cache)?;
        dst.mk_fun_sort(&domain, codomain)?
    };
    cache.insert(sort, res);
    Ok(res)
}

fn transfer_node(
    src: &TermManager,
    dst: &mut TermManager,
    cur: TermId,
    children: &[TermId],
    swap_quantifiers: bool,
    sorts: &mut FxHashMap<SortId, SortId>,
) -> Result<TermId> {
    let kind = src.kind(cur);
    match kind {
        Kind::Value => {
            if let Some(b) = src.bool_value(cur) {
                Ok(dst.mk_bool(b))
            } else if let Some(v) = src.bv_value(cur) {
                Ok(dst.mk_bv_val(v.clone()))
            } else if let Some(rm) = src.rm_value(cur) {
                Ok(dst.mk_rm_value(rm))
            } else if let Some(fp) = src.fp_value(cur) {
                Ok(dst.mk_fp_val(fp.clone()))
            } else {
                unreachable!("value payload")
            }
        }
        Kind::Const => {
            let sort = transfer_sort(src, dst, src.sort_of(cur), sorts)?;
            dst.mk_const(sort, src.symbol(cur))
        }
        Kind::Var => {
            let sort = transfer_sort(src, dst, src.sort_of(cur), sorts)?;
            dst.mk_var(sort, src.symbol(cur))
        }
        Kind::ConstArray => {
            let sort = transfer_sort(src, dst, src.sort_of(cur), sorts)?;
            dst.mk_const_array(sort, children[0])
        }
        Kind::Forall if swap_quantifiers => dst.mk_term(Kind::Exists, children, &[]),
        Kind::Exists if swap_quantifiers => dst.mk_term(Kind::Forall, children, &[]),
        _ => {
            let indices: Vec<u64> = src.indices(cur).to_vec();
            dst.mk_term(kind, children, &indices)
        }
    }
}

/// The quantifier solver: owns the loop, the optional dual worker and the
/// synthesized top-level model.
pub struct QuantSolver {
    options: Options,
    terminator: Option<TerminationCallback>,
    stats: Statistics,
    model: FxHashMap<TermId, TermId>,
}

impl QuantSolver {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            terminator: None,
            stats: Statistics::new(),
            model: FxHashMap::default(),
        }
    }

    pub fn set_termination_callback(&mut self, cb: TerminationCallback) {
        self.terminator = Some(cb);
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Model term for a top-level existential (by bound variable or by the
    /// free constant it stood for), available after `Sat`.
    pub fn model_value(&self, t: TermId) -> Option<TermId> {
        self.model.get(&t).copied()
    }

    /// Decide a formula with quantifiers.
    pub fn check(&mut self, tm: &mut TermManager, assertions: &[TermId]) -> Result<SolverResult> {
        self.model.clear();
        let mut rewriter = quiver_core::rewrite::Rewriter::new(self.options.rewrite_level.max(1));
        let mut g = tm.mk_and(assertions)?;
        g = rewriter.rewrite(tm, g)?;

        if contains_array_structure(tm, g) {
            return Ok(SolverResult::Unknown);
        }

        // rename binders apart first; the fresh variables introduced for
        // free constants below must stay stable for model reporting
        let (renamed, rename_map) = simplify::alpha_rename(tm, g)?;
        g = renamed;
        let (bound, const_map) = bind_free_constants(tm, g)?;
        g = bound;
        g = simplify::expand_nonmonotone(tm, g)?;
        g = simplify::to_nnf(tm, g)?;
        if !simplify::quantifiers_well_placed(tm, g) {
            return Ok(SolverResult::Unknown);
        }
        if self.options.quant_miniscope {
            g = simplify::miniscope(tm, g)?;
        }
        if self.options.quant_der {
            g = simplify::equality_resolution(tm, g, true)?;
        }
        if self.options.quant_cer {
            g = simplify::equality_resolution(tm, g, false)?;
        }
        g = rewriter.rewrite(tm, g)?;

        let stop = Arc::new(AtomicBool::new(false));
        let terminator = self.make_terminator(&stop);
        let Some(mut bundle) = GroundSolvers::new(tm, &self.options, g, Some(terminator))? else {
            return Ok(SolverResult::Unknown);
        };

        let result = if self.options.quant_dual_solver && !bundle.has_ufs {
            self.run_with_dual(tm, &mut bundle, g, &stop)?
        } else {
            let r = bundle.solve(tm, &stop)?;
            debug!(refinements = bundle.refinements, "quantifier loop finished");
            r
        };

        self.stats.merge(&bundle.stats);
        self.stats.add("quant::refinements_total", bundle.refinements);

        if result == SolverResult::Sat {
            for i in 0..bundle.evars.len() {
                let var = bundle.evars[i].var;
                // a first-iteration Sat validated the skolem itself: any
                // value works, default to zero
                let value = match bundle.synth[i].value {
                    Some(v) => v,
                    None => {
                        let sort = tm.sort_of(var);
                        if tm.sort(sort).is_bool() {
                            tm.mk_false()
                        } else {
                            tm.mk_bv_zero(sort)?
                        }
                    }
                };
                self.model.insert(var, value);
                // also key by what the user wrote: the original bound
                // variable, or the free constant the variable replaced
                if let Some(&orig) = rename_map.get(&var) {
                    self.model.insert(orig, value);
                }
                if let Some(&orig) = const_map.get(&var) {
                    self.model.insert(orig, value);
                }
            }
        }
        Ok(result)
    }

    fn make_terminator(&self, stop: &Arc<AtomicBool>) -> TerminationCallback {
        let stop = Arc::clone(stop);
        let user = self.terminator.clone();
        Arc::new(move || {
            stop.load(Ordering::Acquire) || user.as_ref().is_some_and(|cb| cb())
        })
    }

    /// Race the primary bundle against the dual formula in a second worker
    /// that owns its own term manager. The first definite verdict wins; a
    /// dual verdict is complemented.
    fn run_with_dual(
        &mut self,
        tm: &mut TermManager,
        primary: &mut GroundSolvers,
        formula: TermId,
        stop: &Arc<AtomicBool>,
    ) -> Result<SolverResult> {
        let mut dual_tm = TermManager::new();
        let transferred = transfer(tm, &mut dual_tm, formula, true)?;
        let dual_formula = {
            let neg = dual_tm.mk_not(transferred)?;
            let mut rw = quiver_core::rewrite::Rewriter::new(self.options.rewrite_level.max(1));
            let n = rw.rewrite(&mut dual_tm, neg)?;
            simplify::to_nnf(&mut dual_tm, n)?
        };
        let dual_terminator = self.make_terminator(stop);
        let Some(mut dual) = GroundSolvers::new(
            &mut dual_tm,
            &self.options,
            dual_formula,
            Some(dual_terminator),
        )?
        else {
            // dual construction failed; solve the primary alone
            return primary.solve(tm, stop);
        };

        let winner = Mutex::new(());
        let (primary_result, dual_result) = std::thread::scope(|s| {
            let stop_dual = Arc::clone(stop);
            let winner_ref = &winner;
            let handle = s.spawn(move || {
                let r = dual.solve(&mut dual_tm, &stop_dual);
                if let Ok(res) = &r {
                    if *res != SolverResult::Unknown {
                        let _guard = winner_ref.lock().expect("winner lock");
                        stop_dual.store(true, Ordering::Release);
                    }
                }
                r
            });
            let primary_result = primary.solve(tm, stop).map(|res| {
                if res != SolverResult::Unknown {
                    let _guard = winner_ref.lock().expect("winner lock");
                    stop.store(true, Ordering::Release);
                }
                res
            });
            let dual_result = handle.join().expect("dual worker panicked");
            (primary_result, dual_result)
        });
        let primary_result = primary_result?;
        let dual_result = dual_result?;

        if primary_result != SolverResult::Unknown {
            return Ok(primary_result);
        }
        let translated = match dual_result {
            SolverResult::Sat => SolverResult::Unsat,
            SolverResult::Unsat => SolverResult::Sat,
            SolverResult::Unknown => SolverResult::Unknown,
        };
        debug!(?dual_result, ?translated, "dual verdict translated");
        Ok(translated)
    }
}

/// Arrays inside quantified formulas are outside the supported fragment.
fn contains_array_structure(tm: &TermManager, root: TermId) -> bool {
    let mut seen = FxHashSet::default();
    let mut visit = vec![root];
    while let Some(cur) = visit.pop() {
        if !seen.insert(cur) {
            continue;
        }
        if matches!(tm.kind(cur), Kind::Select | Kind::Store | Kind::ConstArray) {
            return true;
        }
        if tm.sort(tm.sort_of(cur)).is_array() {
            return true;
        }
        visit.extend(tm.children(cur).iter().copied());
    }
    false
}

/// Bind every free bit-vector/Boolean constant with an outermost
/// existential. Returns the bound formula and a map from fresh variable to
/// original constant.
fn bind_free_constants(
    tm: &mut TermManager,
    root: TermId,
) -> Result<(TermId, FxHashMap<TermId, TermId>)> {
    let mut consts: Vec<TermId> = Vec::new();
    let mut seen = FxHashSet::default();
    let mut visit = vec![root];
    while let Some(cur) = visit.pop() {
        if !seen.insert(cur) {
            continue;
        }
        if tm.is_const(cur) {
            let sort = tm.sort(tm.sort_of(cur));
            if sort.is_bv() || sort.is_bool() {
                consts.push(cur);
            }
        }
        visit.extend(tm.children(cur).iter().copied());
    }
    consts.sort();
    if consts.is_empty() {
        return Ok((root, FxHashMap::default()));
    }
    let mut subst: FxHashMap<TermId, TermId> = FxHashMap::default();
    let mut const_map: FxHashMap<TermId, TermId> = FxHashMap::default();
    let mut vars = Vec::with_capacity(consts.len());
    for c in consts {
        let var = tm.mk_var(tm.sort_of(c), None)?;
        subst.insert(c, var);
        const_map.insert(var, c);
        vars.push(var);
    }
    let mut body = tm.substitute_term(root, &subst)?;
    for var in vars.into_iter().rev() {
        body = tm.mk_exists(var, body)?;
    }
    Ok((body, const_map))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Options {
        Options::default()
    }

    #[test]
    fn exists_forall_identity_is_sat() {
        // ∃x. ∀y. x + y = y  has the model x = 0
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_var(bv8, Some("x")).unwrap();
        let y = tm.mk_var(bv8, Some("y")).unwrap();
        let sum = tm.mk_term(Kind::BvAdd, &[x, y], &[]).unwrap();
        let eq = tm.mk_eq(sum, y).unwrap();
        let forall = tm.mk_forall(y, eq).unwrap();
        let exists = tm.mk_exists(x, forall).unwrap();

        let mut solver = QuantSolver::new(options());
        let res = solver.check(&mut tm, &[exists]).unwrap();
        assert_eq!(res, SolverResult::Sat);
    }

    #[test]
    fn contradictory_body_is_unsat() {
        // ∀x. ∃y. y = x ∧ y ≠ x
        let mut tm = TermManager::new();
        let bv4 = tm.mk_bv_sort(4);
        let x = tm.mk_var(bv4, Some("x")).unwrap();
        let y = tm.mk_var(bv4, Some("y")).unwrap();
        let eq = tm.mk_eq(y, x).unwrap();
        let ne = tm.mk_not(eq).unwrap();
        let body = tm.mk_and2(eq, ne).unwrap();
        let exists = tm.mk_exists(y, body).unwrap();
        let forall = tm.mk_forall(x, exists).unwrap();

        let mut solver = QuantSolver::new(options());
        let res = solver.check(&mut tm, &[forall]).unwrap();
        assert_eq!(res, SolverResult::Unsat);
    }

    #[test]
    fn dependent_existential_synthesizes_function() {
        // ∀y. ∃z. z = y + 1
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let y = tm.mk_var(bv8, Some("y")).unwrap();
        let z = tm.mk_var(bv8, Some("z")).unwrap();
        let one = tm.mk_bv_one(bv8).unwrap();
        let y1 = tm.mk_term(Kind::BvAdd, &[y, one], &[]).unwrap();
        let eq = tm.mk_eq(z, y1).unwrap();
        let exists = tm.mk_exists(z, eq).unwrap();
        let forall = tm.mk_forall(y, exists).unwrap();

        let mut solver = QuantSolver::new(options());
        let res = solver.check(&mut tm, &[forall]).unwrap();
        assert_eq!(res, SolverResult::Sat);
    }

    #[test]
    fn free_constants_act_as_existentials() {
        // c + c = 4 with free c: satisfiable, a model for c exists
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let c = tm.mk_const(bv8, Some("c")).unwrap();
        let y = tm.mk_var(bv8, Some("y")).unwrap();
        // add a dummy quantifier so the quantifier engine is exercised
        let yy = tm.mk_eq(y, y).unwrap();
        let trivial = tm.mk_forall(y, yy).unwrap();
        let sum = tm.mk_term(Kind::BvAdd, &[c, c], &[]).unwrap();
        let four = tm.mk_bv_value_u64(bv8, 4).unwrap();
        let eq = tm.mk_eq(sum, four).unwrap();

        let mut solver = QuantSolver::new(options());
        let res = solver.check(&mut tm, &[eq, trivial]).unwrap();
        assert_eq!(res, SolverResult::Sat);
        let model = solver.model_value(c).expect("model for free constant");
        let v = tm.bv_value(model).expect("bit-vector model value");
        assert_eq!(v.bvadd(v), BvValue::from_u64(8, 4));
    }

    #[test]
    fn unsat_via_dual_solver() {
        let mut tm = TermManager::new();
        let bv4 = tm.mk_bv_sort(4);
        let x = tm.mk_var(bv4, Some("x")).unwrap();
        let y = tm.mk_var(bv4, Some("y")).unwrap();
        let eq = tm.mk_eq(y, x).unwrap();
        let ne = tm.mk_not(eq).unwrap();
        let body = tm.mk_and2(eq, ne).unwrap();
        let exists = tm.mk_exists(y, body).unwrap();
        let forall = tm.mk_forall(x, exists).unwrap();

        let mut opts = options();
        opts.quant_dual_solver = true;
        let mut solver = QuantSolver::new(opts);
        let res = solver.check(&mut tm, &[forall]).unwrap();
        assert_eq!(res, SolverResult::Unsat);
    }

    #[test]
    fn cancellation_yields_unknown() {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_var(bv8, Some("x")).unwrap();
        let y = tm.mk_var(bv8, Some("y")).unwrap();
        let sum = tm.mk_term(Kind::BvAdd, &[x, y], &[]).unwrap();
        let eq = tm.mk_eq(sum, y).unwrap();
        let forall = tm.mk_forall(y, eq).unwrap();
        let exists = tm.mk_exists(x, forall).unwrap();

        let mut solver = QuantSolver::new(options());
        solver.set_termination_callback(Arc::new(|| true));
        let res = solver.check(&mut tm, &[exists]).unwrap();
        assert_eq!(res, SolverResult::Unknown);
    }

    #[test]
    fn counterexamples_grow_strictly() {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_var(bv8, Some("x")).unwrap();
        let y = tm.mk_var(bv8, Some("y")).unwrap();
        let sum = tm.mk_term(Kind::BvAdd, &[x, y], &[]).unwrap();
        let eq = tm.mk_eq(sum, y).unwrap();
        let forall = tm.mk_forall(y, eq).unwrap();
        let g = tm.mk_exists(x, forall).unwrap();

        let options = options();
        let mut bundle = GroundSolvers::new(&mut tm, &options, g, None)
            .unwrap()
            .expect("supported fragment");
        let stop = AtomicBool::new(false);
        let res = bundle.solve(&mut tm, &stop).unwrap();
        assert_eq!(res, SolverResult::Sat);
        assert_eq!(bundle.ces.len(), bundle.ce_set.len());
        assert_eq!(bundle.ces.len(), 1, "one refinement settles x + y = y");
    }
}
