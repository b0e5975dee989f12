//! CNF oracle.
//!
//! The ground solver treats satisfiability as an opaque incremental CNF
//! oracle with assumptions and failed-assumption cores; this module wraps
//! `varisat` behind that contract and provides the Tseitin encoding from
//! AIG to clauses.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use varisat::{ExtendFormula, Lit, Solver};

use crate::aig::{Aig, AigRef};

/// Incremental SAT oracle. Literals use DIMACS convention (non-zero `i32`,
/// sign is polarity).
pub struct SatOracle {
    solver: Solver<'static>,
    num_vars: i32,
    model: Vec<bool>,
    failed: Vec<i32>,
}

impl SatOracle {
    pub fn new() -> Self {
        Self {
            solver: Solver::new(),
            num_vars: 0,
            model: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn new_var(&mut self) -> i32 {
        self.num_vars += 1;
        self.num_vars
    }

    pub fn add_clause(&mut self, lits: &[i32]) {
        let clause: Vec<Lit> = lits.iter().map(|&l| Lit::from_dimacs(l as isize)).collect();
        self.solver.add_clause(&clause);
    }

    /// Solve under the given assumptions.
    pub fn solve(&mut self, assumptions: &[i32]) -> bool {
        let assumed: Vec<Lit> = assumptions
            .iter()
            .map(|&l| Lit::from_dimacs(l as isize))
            .collect();
        self.solver.assume(&assumed);
        let sat = self.solver.solve().expect("sat oracle failure");
        debug!(num_vars = self.num_vars, sat, "oracle solve");
        if sat {
            self.model = vec![false; self.num_vars as usize + 1];
            if let Some(model) = self.solver.model() {
                for lit in model {
                    let d = lit.to_dimacs();
                    let var = d.unsigned_abs();
                    if var <= self.num_vars as usize {
                        self.model[var] = d > 0;
                    }
                }
            }
            self.failed.clear();
        } else {
            self.model.clear();
            self.failed = self
                .solver
                .failed_core()
                .map(|core| core.iter().map(|l| l.to_dimacs() as i32).collect())
                .unwrap_or_default();
        }
        sat
    }

    /// Value of a variable in the last satisfying assignment.
    pub fn value(&self, var: i32) -> bool {
        self.model
            .get(var.unsigned_abs() as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Assumptions reported in the last unsatisfiable core.
    pub fn failed_assumptions(&self) -> &[i32] {
        &self.failed
    }
}

impl Default for SatOracle {
    fn default() -> Self {
        Self::new()
    }
}

/// Tseitin encoding of AIG nodes into oracle clauses.
#[derive(Default)]
pub struct AigCnf {
    map: FxHashMap<AigRef, i32>,
    encoded: FxHashSet<AigRef>,
}

impl AigCnf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variable of a non-negated AIG node.
    fn var(&mut self, oracle: &mut SatOracle, r: AigRef) -> i32 {
        debug_assert!(!r.is_negated());
        if let Some(&v) = self.map.get(&r) {
            return v;
        }
        let v = oracle.new_var();
        self.map.insert(r, v);
        v
    }

    /// Literal of an arbitrary AIG reference. The constant true node maps to
    /// a frozen unit variable.
    pub fn lit(&mut self, oracle: &mut SatOracle, aig: &Aig, r: AigRef) -> i32 {
        let base = if r.is_negated() { r.negate() } else { r };
        if base.is_const() && !self.map.contains_key(&base) {
            let v = self.var(oracle, base);
            oracle.add_clause(&[v]);
        }
        self.encode(oracle, aig, base);
        let v = self.map[&base];
        if r.is_negated() {
            -v
        } else {
            v
        }
    }

    /// Variable previously assigned to an input, if any.
    pub fn input_var(&self, r: AigRef) -> Option<i32> {
        let base = if r.is_negated() { r.negate() } else { r };
        self.map.get(&base).copied()
    }

    fn encode(&mut self, oracle: &mut SatOracle, aig: &Aig, root: AigRef) {
        let mut visit = vec![root];
        while let Some(r) = visit.pop() {
            let base = if r.is_negated() { r.negate() } else { r };
            if !self.encoded.insert(base) {
                continue;
            }
            let Some((l, rr)) = aig.children(base) else {
                let _ = self.var(oracle, base);
                continue;
            };
            let out = self.var(oracle, base);
            let lbase = if l.is_negated() { l.negate() } else { l };
            let rbase = if rr.is_negated() { rr.negate() } else { rr };
            visit.push(lbase);
            visit.push(rbase);
            // literals for children exist after their vars are allocated
            let llit = {
                let v = self.var(oracle, lbase);
                if l.is_negated() {
                    -v
                } else {
                    v
                }
            };
            let rlit = {
                let v = self.var(oracle, rbase);
                if rr.is_negated() {
                    -v
                } else {
                    v
                }
            };
            if lbase.is_const() {
                oracle.add_clause(&[llit.abs()]);
            }
            if rbase.is_const() {
                oracle.add_clause(&[rlit.abs()]);
            }
            oracle.add_clause(&[-out, llit]);
            oracle.add_clause(&[-out, rlit]);
            oracle.add_clause(&[-llit, -rlit, out]);
        }
    }
}
