//! Pass: Boolean-skeleton sweep.
//!
//! The Boolean structure of the assertion set is encoded as clauses over its
//! subterms (theory atoms stay opaque) and unit propagation runs at level
//! zero. Every literal the propagation fixes is substituted by its value
//! throughout the assertions; a propagation conflict makes the whole set
//! `false`.

use rustc_hash::{FxHashMap, FxHashSet};

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::error::Result;

use super::{AssertionView, PassContext};

type Lit = (TermId, bool);

pub(crate) fn apply(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    ctx: &mut PassContext<'_>,
) -> Result<bool> {
    let mut clauses: Vec<Vec<Lit>> = Vec::new();
    let mut seen: FxHashSet<TermId> = FxHashSet::default();
    let mut roots = Vec::new();
    for i in 0..view.len() {
        let t = view.get(i);
        roots.push(t);
        clauses.push(vec![lit(tm, t, true)]);
        encode(tm, t, &mut seen, &mut clauses);
    }

    let Some(assignment) = propagate(&clauses) else {
        // level-zero conflict: the skeleton alone is unsatisfiable
        let f = tm.mk_false();
        view.push_derived(f, None);
        ctx.stats.incr("preprocess::skeleton_preproc::num_conflicts");
        return Ok(true);
    };

    let mut map: FxHashMap<TermId, TermId> = FxHashMap::default();
    for (&t, &value) in &assignment {
        if tm.is_value(t) {
            continue;
        }
        map.insert(t, tm.mk_bool(value));
    }
    if map.is_empty() {
        return Ok(false);
    }

    let mut changed = false;
    let mut num = 0u64;
    for i in 0..view.len() {
        let t = view.get(i);
        let children: Vec<TermId> = tm.children(t).to_vec();
        if children.is_empty() {
            continue;
        }
        // fixed literals replace proper subterm occurrences only; the
        // assertion roots themselves are trivially fixed to true
        let new_children = tm.substitute_terms(&children, &map)?;
        if new_children != children {
            let rebuilt = tm.rebuild(t, &new_children)?;
            if view.replace(i, rebuilt) {
                num += 1;
                changed = true;
            }
        }
    }
    ctx.stats.add("preprocess::skeleton_preproc::num_fixed", num);
    Ok(changed)
}

/// Literal of a Boolean term with negations stripped into the polarity.
fn lit(tm: &TermManager, t: TermId, polarity: bool) -> Lit {
    let mut cur = t;
    let mut pol = polarity;
    while tm.kind(cur) == Kind::Not {
        cur = tm.child(cur, 0);
        pol = !pol;
    }
    (cur, pol)
}

fn neg(l: Lit) -> Lit {
    (l.0, !l.1)
}

/// Emit the structure clauses of the Boolean skeleton below `root`.
fn encode(tm: &TermManager, root: TermId, seen: &mut FxHashSet<TermId>, clauses: &mut Vec<Vec<Lit>>) {
    let mut visit = vec![root];
    while let Some(cur) = visit.pop() {
        let (node, _) = lit(tm, cur, true);
        if !seen.insert(node) {
            continue;
        }
        let kind = tm.kind(node);
        let this = (node, true);
        match kind {
            Kind::And | Kind::Or => {
                let children: Vec<Lit> =
                    tm.children(node).iter().map(|&c| lit(tm, c, true)).collect();
                if kind == Kind::And {
                    let mut long = vec![this];
                    for &c in &children {
                        clauses.push(vec![neg(this), c]);
                        long.push(neg(c));
                    }
                    clauses.push(long);
                } else {
                    let mut long = vec![neg(this)];
                    for &c in &children {
                        clauses.push(vec![this, neg(c)]);
                        long.push(c);
                    }
                    clauses.push(long);
                }
                visit.extend(tm.children(node).iter().copied());
            }
            Kind::Implies => {
                let a = lit(tm, tm.child(node, 0), true);
                let b = lit(tm, tm.child(node, 1), true);
                clauses.push(vec![neg(this), neg(a), b]);
                clauses.push(vec![this, a]);
                clauses.push(vec![this, neg(b)]);
                visit.extend(tm.children(node).iter().copied());
            }
            Kind::Iff | Kind::Xor => {
                let a = lit(tm, tm.child(node, 0), true);
                let b0 = lit(tm, tm.child(node, 1), true);
                let b = if kind == Kind::Xor { neg(b0) } else { b0 };
                clauses.push(vec![neg(this), neg(a), b]);
                clauses.push(vec![neg(this), a, neg(b)]);
                clauses.push(vec![this, a, b]);
                clauses.push(vec![this, neg(a), neg(b)]);
                visit.extend(tm.children(node).iter().copied());
            }
            Kind::Ite if tm.sort(tm.sort_of(node)).is_bool() => {
                let c = lit(tm, tm.child(node, 0), true);
                let x = lit(tm, tm.child(node, 1), true);
                let y = lit(tm, tm.child(node, 2), true);
                clauses.push(vec![neg(this), neg(c), x]);
                clauses.push(vec![neg(this), c, y]);
                clauses.push(vec![this, neg(c), neg(x)]);
                clauses.push(vec![this, c, neg(y)]);
                visit.extend(tm.children(node).iter().copied());
            }
            Kind::Value => {
                if let Some(b) = tm.bool_value(node) {
                    clauses.push(vec![(node, b)]);
                }
            }
            _ => {} // theory atom
        }
    }
}

/// Unit propagation; `None` on conflict, otherwise the forced assignment.
fn propagate(clauses: &[Vec<Lit>]) -> Option<FxHashMap<TermId, bool>> {
    let mut assignment: FxHashMap<TermId, bool> = FxHashMap::default();
    loop {
        let mut progress = false;
        for clause in clauses {
            let mut unassigned: Option<Lit> = None;
            let mut num_unassigned = 0;
            let mut satisfied = false;
            for &(t, pol) in clause {
                match assignment.get(&t) {
                    Some(&v) if v == pol => {
                        satisfied = true;
                        break;
                    }
                    Some(_) => {}
                    None => {
                        num_unassigned += 1;
                        unassigned = Some((t, pol));
                    }
                }
            }
            if satisfied {
                continue;
            }
            match num_unassigned {
                0 => return None,
                1 => {
                    let (t, pol) = unassigned.expect("one unassigned literal");
                    assignment.insert(t, pol);
                    progress = true;
                }
                _ => {}
            }
        }
        if !progress {
            return Some(assignment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mini_ctx<'a>(
        options: &'a quiver_core::option::Options,
        rewriter: &'a mut quiver_core::rewrite::Rewriter,
        subst: &'a mut FxHashMap<TermId, TermId>,
        ack: &'a mut super::super::AckermannTable,
        stats: &'a mut quiver_core::statistics::Statistics,
    ) -> PassContext<'a> {
        PassContext { rewriter, options, substitutions: subst, ackermann: ack, stats }
    }

    #[test]
    fn forced_literal_is_substituted() {
        let mut tm = TermManager::new();
        let b = tm.mk_bool_sort();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let zero = tm.mk_bv_zero(bv8).unwrap();
        let atom = tm.mk_term(Kind::BvUlt, &[zero, x], &[]).unwrap();
        let q = tm.mk_const(b, Some("q")).unwrap();
        // assert atom; assert (atom -> q) as an Or; propagation forces q
        let natom = tm.mk_not(atom).unwrap();
        let or = tm.mk_or2(natom, q).unwrap();
        let x_eq_zero_term = x_eq_zero(&mut tm, x, zero);
        let other = tm.mk_or2(q, x_eq_zero_term).unwrap();

        let mut entries = vec![
            crate::preprocess::Assertion { current: atom, origin: Some(atom) },
            crate::preprocess::Assertion { current: or, origin: Some(or) },
            crate::preprocess::Assertion { current: other, origin: Some(other) },
        ];
        let options = quiver_core::option::Options::default();
        let mut rewriter = quiver_core::rewrite::Rewriter::new(2);
        let mut subst = FxHashMap::default();
        let mut ack = super::super::AckermannTable::default();
        let mut stats = quiver_core::statistics::Statistics::new();
        let mut ctx = mini_ctx(&options, &mut rewriter, &mut subst, &mut ack, &mut stats);
        let mut view = AssertionView::new(&mut entries);
        let changed = apply(&mut tm, &mut view, &mut ctx).unwrap();
        assert!(changed);
        // `q` was forced true, so the third assertion's first disjunct is now
        // the value true
        let t = entries[2].current;
        assert!(tm.children(t).iter().any(|&c| tm.is_true(c)) || tm.is_true(t));
    }

    fn x_eq_zero(tm: &mut TermManager, x: TermId, zero: TermId) -> TermId {
        tm.mk_eq(x, zero).unwrap()
    }

    #[test]
    fn conflict_produces_false() {
        let mut tm = TermManager::new();
        let b = tm.mk_bool_sort();
        let p = tm.mk_const(b, Some("p")).unwrap();
        let np = tm.mk_not(p).unwrap();
        let mut entries = vec![
            crate::preprocess::Assertion { current: p, origin: Some(p) },
            crate::preprocess::Assertion { current: np, origin: Some(np) },
        ];
        let options = quiver_core::option::Options::default();
        let mut rewriter = quiver_core::rewrite::Rewriter::new(2);
        let mut subst = FxHashMap::default();
        let mut ack = super::super::AckermannTable::default();
        let mut stats = quiver_core::statistics::Statistics::new();
        let mut ctx = mini_ctx(&options, &mut rewriter, &mut subst, &mut ack, &mut stats);
        let mut view = AssertionView::new(&mut entries);
        assert!(apply(&mut tm, &mut view, &mut ctx).unwrap());
        assert!(entries.iter().any(|a| tm.is_false(a.current)));
    }
}
