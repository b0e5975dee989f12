//! Quantifier-level simplification.
//!
//! Before the counterexample-guided loop starts, the input is brought into
//! a shape where every quantifier occurs in positive position under
//! conjunctions/disjunctions only: binders are alpha-renamed apart,
//! non-monotone connectives over quantified subterms are expanded, negations
//! are pushed to the atoms (swapping quantifiers), and the optional
//! miniscoping and destructive/constructive equality resolution rules are
//! applied.

use rustc_hash::{FxHashMap, FxHashSet};

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::error::Result;

/// Nodes whose DAG contains a quantifier.
pub(crate) fn quantified_nodes(tm: &TermManager, root: TermId) -> FxHashSet<TermId> {
    let mut has: FxHashSet<TermId> = FxHashSet::default();
    let mut order: Vec<TermId> = Vec::new();
    let mut seen: FxHashSet<TermId> = FxHashSet::default();
    let mut visit = vec![root];
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
    for t in order {
        if tm.kind(t).is_quantifier() || tm.children(t).iter().any(|c| has.contains(c)) {
            has.insert(t);
        }
    }
    has
}

/// Give every binder a fresh variable so no variable is bound twice.
/// Returns the renamed formula and a map from fresh variable back to the
/// variable it replaced (for model reporting).
pub(crate) fn alpha_rename(
    tm: &mut TermManager,
    root: TermId,
) -> Result<(TermId, FxHashMap<TermId, TermId>)> {
    let mut renames: FxHashMap<TermId, TermId> = FxHashMap::default();
    let mut cache: FxHashMap<TermId, TermId> = FxHashMap::default();
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
        let kind = tm.kind(cur);
        let res = if matches!(kind, Kind::Forall | Kind::Exists | Kind::Lambda) {
            let var = children[0];
            let fresh = tm.mk_var(tm.sort_of(var), None)?;
            renames.insert(fresh, var);
            let map: FxHashMap<TermId, TermId> = std::iter::once((var, fresh)).collect();
            let body = tm.substitute_term(children[1], &map)?;
            tm.mk_term(kind, &[fresh, body], &[])?
        } else {
            let old: Vec<TermId> = tm.children(cur).to_vec();
            if children == old {
                cur
            } else {
                tm.rebuild(cur, &children)?
            }
        };
        cache.insert(cur, res);
    }
    Ok((cache[&root], renames))
}

/// Expand xor/iff/Boolean-equality/Boolean-ite nodes above quantifiers into
/// and/or/not structure so that negation pushing can see through them.
pub(crate) fn expand_nonmonotone(tm: &mut TermManager, root: TermId) -> Result<TermId> {
    let quantified = quantified_nodes(tm, root);
    let mut cache: FxHashMap<TermId, TermId> = FxHashMap::default();
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
        let kind = tm.kind(cur);
        let is_bool = tm.sort(tm.sort_of(cur)).is_bool();
        let needs_expansion = quantified.contains(&cur)
            && is_bool
            && matches!(kind, Kind::Xor | Kind::Iff | Kind::Equal | Kind::Ite)
            && (kind != Kind::Equal || tm.sort(tm.sort_of(children[0])).is_bool());
        let res = if needs_expansion {
            match kind {
                Kind::Xor => {
                    let (a, b) = (children[0], children[1]);
                    let nb = tm.mk_not(b)?;
                    let na = tm.mk_not(a)?;
                    let l = tm.mk_and2(a, nb)?;
                    let r = tm.mk_and2(na, b)?;
                    tm.mk_or2(l, r)?
                }
                Kind::Iff | Kind::Equal => {
                    let (a, b) = (children[0], children[1]);
                    let na = tm.mk_not(a)?;
                    let nb = tm.mk_not(b)?;
                    let l = tm.mk_or2(na, b)?;
                    let r = tm.mk_or2(a, nb)?;
                    tm.mk_and2(l, r)?
                }
                Kind::Ite => {
                    let (c, x, y) = (children[0], children[1], children[2]);
                    let nc = tm.mk_not(c)?;
                    let l = tm.mk_or2(nc, x)?;
                    let r = tm.mk_or2(c, y)?;
                    tm.mk_and2(l, r)?
                }
                _ => unreachable!(),
            }
        } else {
            let old: Vec<TermId> = tm.children(cur).to_vec();
            if children == old {
                cur
            } else {
                tm.rebuild(cur, &children)?
            }
        };
        cache.insert(cur, res);
    }
    Ok(cache[&root])
}

/// Negation normal form with quantifier swapping.
pub(crate) fn to_nnf(tm: &mut TermManager, root: TermId) -> Result<TermId> {
    nnf(tm, root, true, &mut FxHashMap::default())
}

fn nnf(
    tm: &mut TermManager,
    t: TermId,
    positive: bool,
    cache: &mut FxHashMap<(TermId, bool), TermId>,
) -> Result<TermId> {
    if let Some(&r) = cache.get(&(t, positive)) {
        return Ok(r);
    }
    let kind = tm.kind(t);
    let res = match kind {
        Kind::Not => nnf(tm, tm.child(t, 0), !positive, cache)?,
        Kind::And | Kind::Or => {
            let children: Vec<TermId> = tm.children(t).to_vec();
            let mut mapped = Vec::with_capacity(children.len());
            for c in children {
                mapped.push(nnf(tm, c, positive, cache)?);
            }
            let out_kind = match (kind, positive) {
                (Kind::And, true) | (Kind::Or, false) => Kind::And,
                _ => Kind::Or,
            };
            if out_kind == Kind::And {
                tm.mk_and(&mapped)?
            } else {
                tm.mk_or(&mapped)?
            }
        }
        Kind::Implies => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            let na = nnf(tm, a, !positive, cache)?;
            let nb = nnf(tm, b, positive, cache)?;
            if positive {
                tm.mk_or2(na, nb)?
            } else {
                // ¬(a -> b) = a ∧ ¬b
                tm.mk_and2(na, nb)?
            }
        }
        Kind::Forall | Kind::Exists => {
            let var = tm.child(t, 0);
            let body = nnf(tm, tm.child(t, 1), positive, cache)?;
            let out_kind = match (kind, positive) {
                (Kind::Forall, true) | (Kind::Exists, false) => Kind::Forall,
                _ => Kind::Exists,
            };
            tm.mk_term(out_kind, &[var, body], &[])?
        }
        _ => {
            if positive {
                t
            } else {
                tm.mk_not(t)?
            }
        }
    };
    cache.insert((t, positive), res);
    Ok(res)
}

/// True when every quantifier sits in the positive Boolean skeleton (under
/// and/or/binders reachable from the root only).
pub(crate) fn quantifiers_well_placed(tm: &TermManager, root: TermId) -> bool {
    let quantified = quantified_nodes(tm, root);
    let mut seen = FxHashSet::default();
    let mut visit = vec![root];
    while let Some(cur) = visit.pop() {
        if !seen.insert(cur) || !quantified.contains(&cur) {
            continue;
        }
        match tm.kind(cur) {
            Kind::And | Kind::Or | Kind::Forall | Kind::Exists => {
                visit.extend(tm.children(cur).iter().copied());
            }
            _ => return false,
        }
    }
    true
}

/// Push binders into conjunctions/disjunctions and drop unused binders.
pub(crate) fn miniscope(tm: &mut TermManager, root: TermId) -> Result<TermId> {
    let mut cache: FxHashMap<TermId, TermId> = FxHashMap::default();
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
        let kind = tm.kind(cur);
        let res = if kind.is_quantifier() {
            push_binder(tm, kind, children[0], children[1])?
        } else {
            let old: Vec<TermId> = tm.children(cur).to_vec();
            if children == old {
                cur
            } else {
                tm.rebuild(cur, &children)?
            }
        };
        cache.insert(cur, res);
    }
    Ok(cache[&root])
}

fn push_binder(tm: &mut TermManager, kind: Kind, var: TermId, body: TermId) -> Result<TermId> {
    if !super::occurs_free(tm, var, body) {
        return Ok(body);
    }
    let body_kind = tm.kind(body);
    let distributes = (kind == Kind::Forall && body_kind == Kind::And)
        || (kind == Kind::Exists && body_kind == Kind::Or);
    if distributes {
        let parts: Vec<TermId> = tm.children(body).to_vec();
        let mut mapped = Vec::with_capacity(parts.len());
        for p in parts {
            mapped.push(push_binder(tm, kind, var, p)?);
        }
        return if body_kind == Kind::And {
            tm.mk_and(&mapped)
        } else {
            tm.mk_or(&mapped)
        };
    }
    tm.mk_term(kind, &[var, body], &[])
}

/// Destructive equality resolution: `∀x. (x ≠ t ∨ φ) -> φ[t/x]`, and its
/// constructive dual `∃x. (x = t ∧ φ) -> φ[t/x]`.
pub(crate) fn equality_resolution(
    tm: &mut TermManager,
    root: TermId,
    destructive: bool,
) -> Result<TermId> {
    let mut cache: FxHashMap<TermId, TermId> = FxHashMap::default();
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
        let kind = tm.kind(cur);
        let target = if destructive { Kind::Forall } else { Kind::Exists };
        let res = if kind == target {
            resolve_binder(tm, kind, children[0], children[1], destructive)?
        } else {
            let old: Vec<TermId> = tm.children(cur).to_vec();
            if children == old {
                cur
            } else {
                tm.rebuild(cur, &children)?
            }
        };
        cache.insert(cur, res);
    }
    Ok(cache[&root])
}

fn resolve_binder(
    tm: &mut TermManager,
    kind: Kind,
    var: TermId,
    body: TermId,
    destructive: bool,
) -> Result<TermId> {
    let (collect_kind, literal_of) = if destructive {
        (Kind::Or, Kind::Not)
    } else {
        (Kind::And, Kind::Equal)
    };
    if tm.kind(body) != collect_kind {
        return tm.mk_term(kind, &[var, body], &[]);
    }
    let parts: Vec<TermId> = tm.children(body).to_vec();
    for (i, &part) in parts.iter().enumerate() {
        let eq = if destructive {
            if tm.kind(part) != literal_of {
                continue;
            }
            tm.child(part, 0)
        } else {
            part
        };
        if tm.kind(eq) != Kind::Equal {
            continue;
        }
        let (a, b) = (tm.child(eq, 0), tm.child(eq, 1));
        let def = if a == var && !super::occurs_free(tm, var, b) {
            Some(b)
        } else if b == var && !super::occurs_free(tm, var, a) {
            Some(a)
        } else {
            None
        };
        let Some(def) = def else { continue };
        let rest: Vec<TermId> = parts
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, &p)| p)
            .collect();
        let remaining = if collect_kind == Kind::Or {
            tm.mk_or(&rest)?
        } else {
            tm.mk_and(&rest)?
        };
        let map: FxHashMap<TermId, TermId> = std::iter::once((var, def)).collect();
        return tm.substitute_term(remaining, &map);
    }
    tm.mk_term(kind, &[var, body], &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TermManager, TermId, TermId) {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_var(bv8, Some("x")).unwrap();
        let y = tm.mk_const(bv8, Some("y")).unwrap();
        (tm, x, y)
    }

    #[test]
    fn negation_swaps_quantifiers() {
        let (mut tm, x, y) = setup();
        let eq = tm.mk_eq(x, y).unwrap();
        let forall = tm.mk_forall(x, eq).unwrap();
        let neg = tm.mk_not(forall).unwrap();
        let res = to_nnf(&mut tm, neg).unwrap();
        assert_eq!(tm.kind(res), Kind::Exists);
        assert_eq!(tm.kind(tm.child(res, 1)), Kind::Not);
        assert!(quantifiers_well_placed(&tm, res));
    }

    #[test]
    fn miniscope_distributes_forall_over_and() {
        let (mut tm, x, y) = setup();
        let eq1 = tm.mk_eq(x, y).unwrap();
        let zero = tm.mk_bv_zero(tm.sort_of(x)).unwrap();
        let eq2 = tm.mk_eq(y, zero).unwrap();
        let body = tm.mk_and2(eq1, eq2).unwrap();
        let forall = tm.mk_forall(x, body).unwrap();
        let res = miniscope(&mut tm, forall).unwrap();
        assert_eq!(tm.kind(res), Kind::And);
        // the conjunct not mentioning x lost its binder
        let children: Vec<TermId> = tm.children(res).to_vec();
        assert!(children.iter().any(|&c| tm.kind(c) == Kind::Forall));
        assert!(children.iter().any(|&c| c == eq2));
    }

    #[test]
    fn der_eliminates_definitional_binder() {
        let (mut tm, x, y) = setup();
        // ∀x. x ≠ y ∨ P(x)  with P(x) = (x < y)  reduces to  y < y
        let eq = tm.mk_eq(x, y).unwrap();
        let ne = tm.mk_not(eq).unwrap();
        let lt = tm.mk_term(Kind::BvUlt, &[x, y], &[]).unwrap();
        let body = tm.mk_or2(ne, lt).unwrap();
        let forall = tm.mk_forall(x, body).unwrap();
        let res = equality_resolution(&mut tm, forall, true).unwrap();
        let expected = tm.mk_term(Kind::BvUlt, &[y, y], &[]).unwrap();
        assert_eq!(res, expected);
    }

    #[test]
    fn cer_eliminates_existential_definition() {
        let (mut tm, x, y) = setup();
        // ∃x. x = y ∧ P(x)  reduces to  P(y)
        let eq = tm.mk_eq(x, y).unwrap();
        let lt = tm.mk_term(Kind::BvUlt, &[x, y], &[]).unwrap();
        let body = tm.mk_and2(eq, lt).unwrap();
        let exists = tm.mk_exists(x, body).unwrap();
        let res = equality_resolution(&mut tm, exists, false).unwrap();
        let expected = tm.mk_term(Kind::BvUlt, &[y, y], &[]).unwrap();
        assert_eq!(res, expected);
    }

    #[test]
    fn alpha_renaming_separates_binders() {
        let (mut tm, x, y) = setup();
        let eq = tm.mk_eq(x, y).unwrap();
        let inner = tm.mk_exists(x, eq).unwrap();
        let outer_body = tm.mk_and2(eq, inner).unwrap();
        let outer = tm.mk_forall(x, outer_body).unwrap();
        let (renamed, renames) = alpha_rename(&mut tm, outer).unwrap();
        assert!(!renames.is_empty());
        // the two binders now bind different variables
        let outer_var = tm.child(renamed, 0);
        let and = tm.child(renamed, 1);
        let inner_q = tm
            .children(and)
            .iter()
            .copied()
            .find(|&c| tm.kind(c) == Kind::Exists)
            .unwrap();
        assert_ne!(outer_var, tm.child(inner_q, 0));
    }

    #[test]
    fn nonmonotone_expansion_enables_nnf() {
        let (mut tm, x, y) = setup();
        let eq = tm.mk_eq(x, y).unwrap();
        let forall = tm.mk_forall(x, eq).unwrap();
        let b = tm.mk_bool_sort();
        let p = tm.mk_const(b, Some("p")).unwrap();
        let xor = tm.mk_term(Kind::Xor, &[forall, p], &[]).unwrap();
        let expanded = expand_nonmonotone(&mut tm, xor).unwrap();
        let res = to_nnf(&mut tm, expanded).unwrap();
        assert!(quantifiers_well_placed(&tm, res));
    }
}
