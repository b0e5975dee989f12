//! Bounded enumerative term synthesis.
//!
//! Candidates are enumerated level-wise over the given inputs and constants
//! and scored against input/output examples; observationally equivalent
//! candidates (same outputs on every example) are pruned, which is the
//! enumerative-learning mode of the quantifier engine. Optional constraint
//! terms restrict accepted candidates further: a candidate is only accepted
//! when every constraint evaluates to true under each example extended with
//! the candidate's output. The budget counts evaluated candidates; an
//! exhausted budget reports `None` and the caller falls back to a concrete
//! ITE model.

use rustc_hash::{FxHashMap, FxHashSet};

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::bv::BvValue;
use quiver_core::error::Result;

use crate::eval::{eval, Value};

/// Specification of one synthesis query.
pub(crate) struct SynthSpec<'a> {
    /// Leaf terms candidates may mention.
    pub inputs: &'a [TermId],
    /// Per-example assignment for every input (and any other leaf).
    pub examples: &'a [FxHashMap<TermId, Value>],
    /// Expected output per example.
    pub outputs: &'a [BvValue],
    /// Constant value terms harvested from the formula.
    pub consts: &'a [TermId],
    /// Constraint terms a candidate must satisfy on the examples.
    pub constraints: &'a [TermId],
    /// The variable the candidate stands for inside the constraints.
    pub placeholder: TermId,
}

const UNARY_OPS: [Kind; 4] = [Kind::BvNot, Kind::BvNeg, Kind::BvInc, Kind::BvDec];
const BINARY_OPS: [Kind; 7] = [
    Kind::BvAdd,
    Kind::BvMul,
    Kind::BvAnd,
    Kind::BvOr,
    Kind::BvXor,
    Kind::BvShl,
    Kind::BvShr,
];

/// Enumerate a term matching the examples, spending at most `limit`
/// candidate evaluations.
pub(crate) fn synthesize_term(
    tm: &mut TermManager,
    spec: &SynthSpec<'_>,
    limit: u64,
    prev: Option<TermId>,
) -> Result<Option<TermId>> {
    if spec.examples.is_empty() || spec.outputs.is_empty() {
        return Ok(None);
    }
    let target: Vec<Value> = spec.outputs.iter().map(|v| Value::Bv(v.clone())).collect();

    let mut checked: u64 = 0;
    let mut seen: FxHashSet<Vec<Value>> = FxHashSet::default();
    // candidate pools per width
    let mut pool: FxHashMap<u64, Vec<TermId>> = FxHashMap::default();
    let mut frontier: Vec<TermId> = Vec::new();

    let mut try_candidate = |tm: &mut TermManager,
                             t: TermId,
                             checked: &mut u64,
                             seen: &mut FxHashSet<Vec<Value>>|
     -> Result<CandidateOutcome> {
        *checked += 1;
        let Some(sig) = signature(tm, t, spec.examples) else {
            return Ok(CandidateOutcome::Rejected);
        };
        if sig == target && constraints_hold(tm, t, spec)? {
            return Ok(CandidateOutcome::Solution);
        }
        if seen.insert(sig) {
            Ok(CandidateOutcome::Fresh)
        } else {
            Ok(CandidateOutcome::Rejected)
        }
    };

    let mut initial: Vec<TermId> = Vec::new();
    initial.extend(prev);
    initial.extend(spec.inputs.iter().copied());
    initial.extend(spec.consts.iter().copied());
    for t in initial {
        if !tm.sort(tm.sort_of(t)).is_bv() {
            continue;
        }
        match try_candidate(tm, t, &mut checked, &mut seen)? {
            CandidateOutcome::Solution => return Ok(Some(t)),
            CandidateOutcome::Fresh => {
                pool.entry(tm.bv_width(t)).or_default().push(t);
                frontier.push(t);
            }
            CandidateOutcome::Rejected => {}
        }
        if checked >= limit {
            return Ok(None);
        }
    }

    while !frontier.is_empty() && checked < limit {
        let mut next_frontier: Vec<TermId> = Vec::new();
        let current = std::mem::take(&mut frontier);
        for &a in &current {
            let w = tm.bv_width(a);
            for op in UNARY_OPS {
                let t = tm.mk_term(op, &[a], &[])?;
                match try_candidate(tm, t, &mut checked, &mut seen)? {
                    CandidateOutcome::Solution => return Ok(Some(t)),
                    CandidateOutcome::Fresh => {
                        pool.entry(w).or_default().push(t);
                        next_frontier.push(t);
                    }
                    CandidateOutcome::Rejected => {}
                }
                if checked >= limit {
                    return Ok(None);
                }
            }
            let peers: Vec<TermId> = pool.get(&w).cloned().unwrap_or_default();
            for &b in &peers {
                for op in BINARY_OPS {
                    let t = tm.mk_term(op, &[a, b], &[])?;
                    match try_candidate(tm, t, &mut checked, &mut seen)? {
                        CandidateOutcome::Solution => return Ok(Some(t)),
                        CandidateOutcome::Fresh => {
                            pool.entry(w).or_default().push(t);
                            next_frontier.push(t);
                        }
                        CandidateOutcome::Rejected => {}
                    }
                    if checked >= limit {
                        return Ok(None);
                    }
                }
            }
        }
        frontier = next_frontier;
    }
    Ok(None)
}

enum CandidateOutcome {
    Solution,
    Fresh,
    Rejected,
}

/// Outputs of a candidate on every example; `None` when it cannot be
/// evaluated.
fn signature(
    tm: &TermManager,
    t: TermId,
    examples: &[FxHashMap<TermId, Value>],
) -> Option<Vec<Value>> {
    let mut sig = Vec::with_capacity(examples.len());
    for example in examples {
        let v = eval(tm, t, &mut |_, n| example.get(&n).cloned()).ok()?;
        sig.push(v);
    }
    Some(sig)
}

/// Check the constraint terms under every example, with the placeholder
/// bound to the candidate's output. Constraints that cannot be evaluated
/// are skipped.
fn constraints_hold(tm: &TermManager, candidate: TermId, spec: &SynthSpec<'_>) -> Result<bool> {
    if spec.constraints.is_empty() {
        return Ok(true);
    }
    for example in spec.examples {
        let out = match eval(tm, candidate, &mut |_, n| example.get(&n).cloned()) {
            Ok(v) => v,
            Err(_) => return Ok(false),
        };
        for &constraint in spec.constraints {
            let holds = eval(tm, constraint, &mut |_, n| {
                if n == spec.placeholder {
                    Some(out.clone())
                } else {
                    example.get(&n).cloned()
                }
            });
            match holds {
                Ok(Value::Bool(true)) => {}
                Ok(_) => return Ok(false),
                Err(_) => {} // not evaluable under the flat model: skip
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(pairs: &[(TermId, u64)], width: u64) -> FxHashMap<TermId, Value> {
        pairs
            .iter()
            .map(|&(t, v)| (t, Value::Bv(BvValue::from_u64(width, v))))
            .collect()
    }

    #[test]
    fn synthesizes_identity() {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let y = tm.mk_var(bv8, Some("y")).unwrap();
        let z = tm.mk_var(bv8, Some("z")).unwrap();
        let examples = [example(&[(y, 3)], 8), example(&[(y, 250)], 8)];
        let outputs = [BvValue::from_u64(8, 3), BvValue::from_u64(8, 250)];
        let spec = SynthSpec {
            inputs: &[y],
            examples: &examples,
            outputs: &outputs,
            consts: &[],
            constraints: &[],
            placeholder: z,
        };
        let res = synthesize_term(&mut tm, &spec, 1000, None).unwrap();
        assert_eq!(res, Some(y));
    }

    #[test]
    fn synthesizes_increment_with_constant() {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let y = tm.mk_var(bv8, Some("y")).unwrap();
        let z = tm.mk_var(bv8, Some("z")).unwrap();
        let one = tm.mk_bv_one(bv8).unwrap();
        let examples = [
            example(&[(y, 0)], 8),
            example(&[(y, 7)], 8),
            example(&[(y, 255)], 8),
        ];
        let outputs = [
            BvValue::from_u64(8, 1),
            BvValue::from_u64(8, 8),
            BvValue::from_u64(8, 0),
        ];
        let spec = SynthSpec {
            inputs: &[y],
            examples: &examples,
            outputs: &outputs,
            consts: &[one],
            constraints: &[],
            placeholder: z,
        };
        let res = synthesize_term(&mut tm, &spec, 10_000, None).unwrap();
        let term = res.expect("y + 1 is within the search space");
        // verify on an unseen input
        let check = eval(
            &tm,
            term,
            &mut |_, n| (n == y).then(|| Value::Bv(BvValue::from_u64(8, 41))),
        )
        .unwrap();
        assert_eq!(check, Value::Bv(BvValue::from_u64(8, 42)));
    }

    #[test]
    fn budget_exhaustion_reports_none() {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let y = tm.mk_var(bv8, Some("y")).unwrap();
        let z = tm.mk_var(bv8, Some("z")).unwrap();
        let examples = [example(&[(y, 1)], 8), example(&[(y, 2)], 8)];
        // outputs that no tiny budget can reach
        let outputs = [BvValue::from_u64(8, 123), BvValue::from_u64(8, 77)];
        let spec = SynthSpec {
            inputs: &[y],
            examples: &examples,
            outputs: &outputs,
            consts: &[],
            constraints: &[],
            placeholder: z,
        };
        let res = synthesize_term(&mut tm, &spec, 3, None).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn constraints_filter_candidates() {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let y = tm.mk_var(bv8, Some("y")).unwrap();
        let z = tm.mk_var(bv8, Some("z")).unwrap();
        // both y and ~~y match the examples, but the constraint z = y holds
        // for either; a constraint z != y rejects everything
        let ne = {
            let eq = tm.mk_eq(z, y).unwrap();
            tm.mk_not(eq).unwrap()
        };
        let examples = [example(&[(y, 5)], 8)];
        let outputs = [BvValue::from_u64(8, 5)];
        let spec = SynthSpec {
            inputs: &[y],
            examples: &examples,
            outputs: &outputs,
            consts: &[],
            constraints: &[ne],
            placeholder: z,
        };
        let res = synthesize_term(&mut tm, &spec, 100, None).unwrap();
        assert!(res.is_none());
    }
}
