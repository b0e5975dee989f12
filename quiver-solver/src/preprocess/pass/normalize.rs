//! Pass: normalization of additive and multiplicative chains.
//!
//! The pass rewrites equalities and comparisons whose sides are `bvadd` /
//! `bvmul` chains into a canonical shape driven by *coefficient maps*
//! (leaf -> multiplicity), factors common coefficients to maximize sharing,
//! distributes multiplication over shifts and additions up to a bounded
//! depth, and runs a second sub-pass that introduces shared sub-sums across
//! all additive chains of the assertion set. The second sub-pass is applied
//! only when it strictly shrinks the bit-blasted AIG, measured with a cheap
//! and-gate counter; the whole pass keeps the original assertions unless the
//! AIG strictly shrinks.
//!
//! Coefficient maps iterate in term-id order, so the emitted chains do not
//! depend on allocator state.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::bv::BvValue;
use quiver_core::error::Result;
use quiver_core::rewrite::Rewriter;

use crate::bitblast::Bitblaster;

use super::{AssertionView, PassContext};

/// Leaf -> coefficient, iterated in ascending term-id order.
type Coeffs = BTreeMap<TermId, BvValue>;
type Parents = FxHashMap<TermId, u64>;

pub(crate) fn apply(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    ctx: &mut PassContext<'_>,
) -> Result<bool> {
    let mut pass = Normalizer {
        share_aware: ctx.options.normalize_share_aware,
        parents: Parents::default(),
        cache: FxHashMap::default(),
        num_normalizations: 0,
    };
    if pass.share_aware {
        for i in 0..view.len() {
            count_parents(tm, view.get(i), &mut pass.parents);
        }
    }

    let assertions: Vec<TermId> = (0..view.len()).map(|i| view.get(i)).collect();
    let size_before = aig_size(tm, &assertions);

    let mut processed = Vec::with_capacity(assertions.len());
    for &a in &assertions {
        processed.push(pass.process(tm, ctx.rewriter, a)?);
    }
    let size_after1 = aig_size(tm, &processed);

    let shared = normalize_adders(tm, &processed)?;
    let size_after2 = aig_size(tm, &shared);

    debug!(size_before, size_after1, size_after2, "normalization AIG sizes");
    ctx.stats
        .add("preprocess::normalize::num_normalizations", pass.num_normalizations);

    let (final_assertions, size_after) = if size_after2 < size_after1 {
        (shared, size_after2)
    } else {
        (processed, size_after1)
    };
    if size_after >= size_before {
        return Ok(false);
    }
    let mut changed = false;
    for (i, t) in final_assertions.into_iter().enumerate() {
        if view.replace(i, t) {
            changed = true;
        }
    }
    Ok(changed)
}

/// Shared and-gate count of the bit-blasted assertion set. Unsupported
/// nodes are abstracted as inputs, so the metric is defined on any input.
fn aig_size(tm: &TermManager, assertions: &[TermId]) -> u64 {
    let mut bb = Bitblaster::for_counting();
    let mut cache = FxHashSet::default();
    let mut size = 0;
    for &a in assertions {
        if let Ok(root) = bb.blast_bool(tm, a) {
            size += bb.aig.count_ands(root, &mut cache);
        }
    }
    size
}

/// Number of distinct nodes in a term DAG.
fn dag_size(tm: &TermManager, root: TermId) -> usize {
    let mut seen = FxHashSet::default();
    let mut visit = vec![root];
    while let Some(cur) = visit.pop() {
        if seen.insert(cur) {
            visit.extend(tm.children(cur).iter().copied());
        }
    }
    seen.len()
}

/// True when `node` belongs to a chain of `kind` (including the negation
/// wrappers that the additive normalization looks through).
fn in_chain(tm: &TermManager, kind: Kind, node: TermId) -> bool {
    let k = tm.kind(node);
    k == kind
        || (kind == Kind::BvAdd
            && (k == Kind::BvNeg
                || (k == Kind::BvNot && tm.kind(tm.child(node, 0)) == Kind::BvAdd)))
}

/// Count parent references of every node reachable from `root`.
fn count_parents(tm: &TermManager, root: TermId, parents: &mut Parents) {
    let mut cache = FxHashSet::default();
    let mut visit = vec![root];
    *parents.entry(root).or_default() += 1;
    while let Some(cur) = visit.pop() {
        if !cache.insert(cur) {
            continue;
        }
        for &child in tm.children(cur) {
            *parents.entry(child).or_default() += 1;
            visit.push(child);
        }
    }
}

/// Count parent references within the chain trees of `kind` rooted at
/// `roots` only.
fn count_chain_parents(tm: &TermManager, roots: &[TermId], kind: Kind, parents: &mut Parents) {
    let mut cache = FxHashSet::default();
    for &root in roots {
        *parents.entry(root).or_default() += 1;
        let mut visit = vec![root];
        while let Some(cur) = visit.pop() {
            if cache.insert(cur) && in_chain(tm, kind, cur) {
                for &child in tm.children(cur) {
                    *parents.entry(child).or_default() += 1;
                    visit.push(child);
                }
            }
        }
    }
}

struct Normalizer {
    share_aware: bool,
    /// Global parent counts over the assertion set (share-aware mode).
    parents: Parents,
    cache: FxHashMap<TermId, TermId>,
    num_normalizations: u64,
}

impl Normalizer {
    /// A chain node is a leaf when it has parent references from outside the
    /// current chain.
    fn is_leaf(&self, kind: Kind, tm: &TermManager, node: TermId, chain_parents: &Parents) -> bool {
        if !in_chain(tm, kind, node) {
            return true;
        }
        let Some(&global) = self.parents.get(&node) else { return false };
        let Some(&chain) = chain_parents.get(&node) else { return false };
        chain < global
    }

    /// Flatten the chain of `kind` rooted at `node` into coefficients.
    fn compute_coefficients(
        &self,
        tm: &TermManager,
        node: TermId,
        kind: Kind,
        chain_parents: &Parents,
        coeffs: &mut Coeffs,
    ) {
        let width = tm.bv_width(node);
        let zero = BvValue::zero(width);

        let mut cfs: FxHashMap<TermId, BvValue> = FxHashMap::default();
        let mut nodes: Vec<TermId> = Vec::new();
        let mut intermediate: FxHashSet<TermId> = FxHashSet::default();
        let mut visit = vec![node];
        while let Some(cur) = visit.pop() {
            if cfs.contains_key(&cur) {
                continue;
            }
            cfs.insert(cur, zero.clone());
            nodes.push(cur);
            let k = tm.kind(cur);
            let chain_member = k == kind || (kind == Kind::BvAdd && k == Kind::BvNeg);
            if chain_member {
                if self.share_aware
                    && cur != node
                    && self.is_leaf(kind, tm, cur, chain_parents)
                {
                    continue;
                }
                intermediate.insert(cur);
                visit.extend(tm.children(cur).iter().copied());
            }
        }

        // push the root coefficient down; children always have smaller ids
        // than their parents, so descending id order visits parents first
        nodes.sort();
        if let Some(c) = cfs.get_mut(&node) {
            c.ibvinc();
        }
        for &cur in nodes.iter().rev() {
            let c = cfs[&cur].clone();
            if intermediate.contains(&cur) {
                if tm.kind(cur) == Kind::BvNeg && kind == Kind::BvAdd {
                    let child = tm.child(cur, 0);
                    let neg = c.bvneg();
                    cfs.get_mut(&child).expect("visited child").ibvadd(&neg);
                } else {
                    for &child in tm.children(cur) {
                        cfs.get_mut(&child).expect("visited child").ibvadd(&c);
                    }
                }
            } else {
                coeffs
                    .entry(cur)
                    .and_modify(|e| e.ibvadd(&c))
                    .or_insert(c);
            }
        }
    }

    /// Fold values, expand negations and push `~x = -x - 1` through additive
    /// coefficients. Returns the accumulated constant.
    fn normalize_add(
        &self,
        tm: &mut TermManager,
        width: u64,
        coeffs: &mut Coeffs,
        chain_parents: &Parents,
        keep_value: bool,
        push_neg: bool,
    ) -> BvValue {
        let zero = BvValue::zero(width);
        let mut value = zero.clone();
        loop {
            let mut progress = false;
            let keys: Vec<TermId> = coeffs.keys().rev().copied().collect();
            for t in keys {
                let c = coeffs[&t].clone();
                if c.is_zero() {
                    continue;
                }
                if let Some(v) = tm.bv_value(t) {
                    value.ibvadd(&v.bvmul(&c));
                    coeffs.insert(t, zero.clone());
                    continue;
                }
                let kind = tm.kind(t);
                if kind == Kind::BvNeg {
                    let y = tm.child(t, 0);
                    coeffs.insert(t, zero.clone());
                    let scale = c.bvneg();
                    if tm.kind(y) == Kind::BvAdd
                        && (!self.share_aware || self.parents.get(&y).copied().unwrap_or(0) <= 1)
                    {
                        let mut sub = Coeffs::new();
                        self.compute_coefficients(tm, y, Kind::BvAdd, chain_parents, &mut sub);
                        for (s, cf) in sub {
                            let scaled = cf.bvmul(&scale);
                            if let Some(v) = tm.bv_value(s) {
                                value.ibvadd(&v.bvmul(&scaled));
                            } else {
                                coeffs
                                    .entry(s)
                                    .and_modify(|e| e.ibvadd(&scaled))
                                    .or_insert(scaled);
                            }
                        }
                    } else {
                        coeffs
                            .entry(y)
                            .and_modify(|e| e.ibvadd(&scale))
                            .or_insert(scale);
                    }
                    progress = true;
                    break;
                }
                if push_neg
                    && kind == Kind::BvNot
                    && tm.kind(tm.child(t, 0)) == Kind::BvAdd
                    && self.parents.get(&tm.child(t, 0)).copied().unwrap_or(0) <= 1
                {
                    // ~x = -(x + 1) = -x - 1
                    let inner = tm.child(t, 0);
                    let scale = c.bvneg();
                    coeffs.insert(t, zero.clone());
                    let mut sub = Coeffs::new();
                    self.compute_coefficients(tm, inner, Kind::BvAdd, chain_parents, &mut sub);
                    for (s, cf) in sub {
                        let scaled = cf.bvmul(&scale);
                        if let Some(v) = tm.bv_value(s) {
                            value.ibvadd(&v.bvmul(&scaled));
                        } else {
                            coeffs
                                .entry(s)
                                .and_modify(|e| e.ibvadd(&scaled))
                                .or_insert(scaled);
                        }
                    }
                    value.ibvadd(&scale);
                    progress = true;
                    break;
                }
                if kind == Kind::BvNot {
                    let y = tm.child(t, 0);
                    if coeffs.contains_key(&y) {
                        // c*~x + d*x: fold c of them into -c - c*x
                        value.ibvadd(&c.bvneg());
                        coeffs.get_mut(&y).expect("present").ibvsub(&c);
                        coeffs.insert(t, zero.clone());
                    }
                }
            }
            if !progress {
                break;
            }
        }

        if keep_value && !value.is_zero() {
            let val = tm.mk_bv_val(value.clone());
            let one = BvValue::one(width);
            coeffs
                .entry(val)
                .and_modify(|e| e.ibvinc())
                .or_insert(one);
        }
        value
    }

    /// Fold value factors of a multiplicative chain. Returns the constant.
    fn normalize_mul(&self, tm: &mut TermManager, width: u64, coeffs: &mut Coeffs, keep_value: bool) -> BvValue {
        let zero = BvValue::zero(width);
        let mut value = BvValue::one(width);
        let keys: Vec<TermId> = coeffs.keys().copied().collect();
        for t in keys {
            let c = coeffs[&t].clone();
            if c.is_zero() {
                continue;
            }
            if let Some(v) = tm.bv_value(t).cloned() {
                if let Some(n) = c.to_u64() {
                    for _ in 0..n {
                        value.ibvmul(&v);
                    }
                    coeffs.insert(t, zero.clone());
                }
            }
        }
        if keep_value && !value.is_one() {
            let val = tm.mk_bv_val(value.clone());
            let one = BvValue::one(width);
            coeffs
                .entry(val)
                .and_modify(|e| e.ibvinc())
                .or_insert(one);
        }
        value
    }

    /// Subtract the common part of two coefficient maps and return it.
    fn compute_common(&self, lhs: &mut Coeffs, rhs: &mut Coeffs) -> Coeffs {
        let mut common = Coeffs::new();
        let keys: Vec<TermId> = lhs.keys().copied().collect();
        for t in keys {
            let Some(r) = rhs.get(&t).cloned() else { continue };
            let l = lhs[&t].clone();
            let occs = if l.compare(&r) <= std::cmp::Ordering::Equal {
                l
            } else {
                r
            };
            if occs.is_zero() {
                continue;
            }
            lhs.get_mut(&t).expect("present").ibvsub(&occs);
            rhs.get_mut(&t).expect("present").ibvsub(&occs);
            common.insert(t, occs);
        }
        common
    }

    /// Rebuild a chain of `kind` from coefficients, leaves in id order.
    fn mk_chain(&self, tm: &mut TermManager, kind: Kind, coeffs: &Coeffs) -> Result<Option<TermId>> {
        let entries: Vec<(TermId, BvValue)> = coeffs
            .iter()
            .filter(|(_, c)| !c.is_zero())
            .map(|(t, c)| (*t, c.clone()))
            .collect();
        if entries.is_empty() {
            return Ok(None);
        }
        if kind == Kind::BvAdd {
            let mut res: Option<TermId> = None;
            for (node, coeff) in entries {
                let piece = if coeff.is_one() {
                    node
                } else {
                    let v = tm.mk_bv_val(coeff);
                    tm.mk_term(Kind::BvMul, &[v, node], &[])?
                };
                res = Some(match res {
                    None => piece,
                    Some(acc) => tm.mk_term(Kind::BvAdd, &[acc, piece], &[])?,
                });
            }
            Ok(res)
        } else {
            // factor shared powers: repeatedly multiply the highest-degree
            // entry into the next, subtracting the shared exponent
            let mut vec = entries;
            while vec.len() > 1 {
                vec.sort_by(|a, b| b.1.compare(&a.1).then(a.0.cmp(&b.0)));
                while vec.last().is_some_and(|(_, c)| c.is_zero()) {
                    vec.pop();
                }
                if vec.len() <= 1 {
                    break;
                }
                for i in 1..vec.len() {
                    let occs = vec[i].1.clone();
                    let merged = tm.mk_term(Kind::BvMul, &[vec[i - 1].0, vec[i].0], &[])?;
                    vec[i].0 = merged;
                    vec[i - 1].1.ibvsub(&occs);
                }
            }
            let (node, coeff) = vec.pop().expect("non-empty chain");
            let mut res = node;
            let n = coeff.to_u64().expect("multiplicity fits in u64");
            for _ in 1..n {
                res = tm.mk_term(Kind::BvMul, &[res, node], &[])?;
            }
            Ok(Some(res))
        }
    }

    /// Normalize both sides of `op(n0, n1)` for an equality: compute
    /// coefficient maps, fold values, migrate negative coefficients across
    /// the equation and cancel (add) or factor out (mul) the common part.
    fn normalize_coefficients_eq(
        &self,
        tm: &mut TermManager,
        n0: TermId,
        n1: TermId,
    ) -> Result<(Coeffs, Coeffs)> {
        let kind = tm.kind(n0);
        let width = tm.bv_width(n0);
        let mut chain_parents = Parents::default();
        if self.share_aware {
            count_chain_parents(tm, &[n0, n1], kind, &mut chain_parents);
        }
        let mut c0 = Coeffs::new();
        let mut c1 = Coeffs::new();
        self.compute_coefficients(tm, n0, kind, &chain_parents, &mut c0);
        self.compute_coefficients(tm, n1, kind, &chain_parents, &mut c1);

        if kind == Kind::BvAdd {
            let v0 = self.normalize_add(tm, width, &mut c0, &chain_parents, false, true);
            let v1 = self.normalize_add(tm, width, &mut c1, &chain_parents, false, true);
            // a - b = c  <=>  a = b + c: negative coefficients change sides
            migrate_negative(&mut c0, &mut c1);
            migrate_negative(&mut c1, &mut c0);
            let mut diff = v0;
            diff.ibvsub(&v1);
            if !diff.is_zero() {
                let one = BvValue::one(width);
                // keep the folded constant positive where possible
                if diff.bit(width - 1) {
                    let val = tm.mk_bv_val(diff.bvneg());
                    c1.entry(val).and_modify(|e| e.ibvinc()).or_insert(one);
                } else {
                    let val = tm.mk_bv_val(diff);
                    c0.entry(val).and_modify(|e| e.ibvinc()).or_insert(one);
                }
            }
            let _ = self.compute_common(&mut c0, &mut c1);
        } else {
            self.normalize_mul(tm, width, &mut c0, true);
            self.normalize_mul(tm, width, &mut c1, true);
            let common = self.compute_common(&mut c0, &mut c1);
            if coeffs_fit_u64(&common) {
                // x may be zero, so the common factor must stay on both sides
                if let Some(node) = self.mk_chain(tm, Kind::BvMul, &common)? {
                    let one = BvValue::one(width);
                    c0.entry(node).and_modify(|e| e.ibvinc()).or_insert(one.clone());
                    c1.entry(node).and_modify(|e| e.ibvinc()).or_insert(one);
                }
            } else {
                // cannot rebuild the factored chain exactly; undo
                for (t, c) in common {
                    c0.entry(t).and_modify(|e| e.ibvadd(&c)).or_insert(c.clone());
                    c1.entry(t).and_modify(|e| e.ibvadd(&c)).or_insert(c);
                }
            }
        }
        remove_zero(&mut c0);
        remove_zero(&mut c1);
        Ok((c0, c1))
    }

    /// Normalize `n0 = n1` where both sides are chains of the same kind.
    /// Returns the replacement and whether anything changed.
    fn normalize_eq_add_mul(
        &mut self,
        tm: &mut TermManager,
        n0: TermId,
        n1: TermId,
    ) -> Result<(TermId, bool)> {
        let kind = tm.kind(n0);
        let width = tm.bv_width(n0);
        let (c0, c1) = self.normalize_coefficients_eq(tm, n0, n1)?;
        if kind == Kind::BvMul && (!coeffs_fit_u64(&c0) || !coeffs_fit_u64(&c1)) {
            return Ok((tm.mk_eq(n0, n1)?, false));
        }
        let (left, right) = if kind == Kind::BvAdd {
            let zero = tm.mk_bv_val(BvValue::zero(width));
            let l = self.mk_chain(tm, kind, &c0)?.unwrap_or(zero);
            let r = self.mk_chain(tm, kind, &c1)?.unwrap_or(zero);
            (l, r)
        } else {
            let one = tm.mk_bv_val(BvValue::one(width));
            let l = self.mk_chain(tm, kind, &c0)?.unwrap_or(one);
            let r = self.mk_chain(tm, kind, &c1)?.unwrap_or(one);
            (l, r)
        };
        if left == right {
            return Ok((tm.mk_true(), true));
        }
        if left == n0 && right == n1 {
            return Ok((tm.mk_eq(n0, n1)?, false));
        }
        let original = tm.mk_eq(n0, n1)?;
        let res = tm.mk_eq(left, right)?;
        // the replacement must not grow the term
        if dag_size(tm, res) > dag_size(tm, original) {
            return Ok((original, false));
        }
        Ok((res, true))
    }

    /// Factor the common part out of both sides of a comparison (or mixed
    /// equality). The common chain stays on both sides, so the blasted
    /// circuit shares it.
    fn normalize_comm_assoc(
        &mut self,
        tm: &mut TermManager,
        parent_kind: Kind,
        n0: TermId,
        n1: TermId,
    ) -> Result<(TermId, bool)> {
        let (spine0, top0) = wrapper_spine(tm, n0);
        let (spine1, top1) = wrapper_spine(tm, n1);
        let mut kind = tm.kind(top0);
        if kind != Kind::BvAdd && kind != Kind::BvMul {
            kind = tm.kind(top1);
            if kind != Kind::BvAdd && kind != Kind::BvMul {
                return Ok((tm.mk_term(parent_kind, &[n0, n1], &[])?, false));
            }
        }
        // the spines may peel extract/concat wrappers, so the two tops can
        // have different widths; shared leaves then cannot exist, but every
        // per-side constant must use its own width
        let w0 = tm.bv_width(top0);
        let w1 = tm.bv_width(top1);
        let mut chain_parents = Parents::default();
        if self.share_aware {
            count_chain_parents(tm, &[top0, top1], kind, &mut chain_parents);
        }
        let mut lhs = Coeffs::new();
        let mut rhs = Coeffs::new();
        self.compute_coefficients(tm, top0, kind, &chain_parents, &mut lhs);
        self.compute_coefficients(tm, top1, kind, &chain_parents, &mut rhs);
        let lhs_size = lhs.len();
        let rhs_size = rhs.len();
        if tm.kind(top0) == Kind::BvAdd {
            self.normalize_add(tm, w0, &mut lhs, &chain_parents, true, true);
        } else if tm.kind(top0) == Kind::BvMul {
            self.normalize_mul(tm, w0, &mut lhs, true);
        }
        if tm.kind(top1) == Kind::BvAdd {
            self.normalize_add(tm, w1, &mut rhs, &chain_parents, true, true);
        } else if tm.kind(top1) == Kind::BvMul {
            self.normalize_mul(tm, w1, &mut rhs, true);
        }

        let mut common = if w0 == w1 {
            self.compute_common(&mut lhs, &mut rhs)
        } else {
            Coeffs::new()
        };
        if kind == Kind::BvMul && !coeffs_fit_u64(&common) {
            for (t, c) in std::mem::take(&mut common) {
                lhs.entry(t).and_modify(|e| e.ibvadd(&c)).or_insert(c.clone());
                rhs.entry(t).and_modify(|e| e.ibvadd(&c)).or_insert(c);
            }
        }
        if let Some(node) = self.mk_chain(tm, kind, &common)? {
            let one = BvValue::one(w0);
            lhs.entry(node).and_modify(|e| e.ibvinc()).or_insert(one.clone());
            rhs.entry(node).and_modify(|e| e.ibvinc()).or_insert(one);
        }
        remove_zero(&mut lhs);
        remove_zero(&mut rhs);

        // bail out when factoring found nothing to share, or when a
        // multiplicative multiplicity cannot be rebuilt exactly
        if (lhs_size <= lhs.len() && rhs_size <= rhs.len())
            || (kind == Kind::BvMul && (!coeffs_fit_u64(&lhs) || !coeffs_fit_u64(&rhs)))
        {
            return Ok((tm.mk_term(parent_kind, &[n0, n1], &[])?, false));
        }

        let zero0 = tm.mk_bv_val(BvValue::zero(w0));
        let zero1 = tm.mk_bv_val(BvValue::zero(w1));
        let left = self.mk_chain(tm, kind, &lhs)?.unwrap_or(zero0);
        let right = self.mk_chain(tm, kind, &rhs)?.unwrap_or(zero1);
        let rebuilt0 = rebuild_spine(tm, &spine0, left)?;
        let rebuilt1 = rebuild_spine(tm, &spine1, right)?;
        let changed = rebuilt0 != n0 || rebuilt1 != n1;
        Ok((tm.mk_term(parent_kind, &[rebuilt0, rebuilt1], &[])?, changed))
    }

    /// One normalization sweep over a single assertion.
    fn process(&mut self, tm: &mut TermManager, rewriter: &mut Rewriter, root: TermId) -> Result<TermId> {
        let mut node = rewriter.rewrite(tm, root)?;
        loop {
            let mut normalized = false;
            let mut visit = vec![node];
            while let Some(&cur) = visit.last() {
                if self.cache.contains_key(&cur) {
                    visit.pop();
                    continue;
                }
                let pending: Vec<TermId> = tm
                    .children(cur)
                    .iter()
                    .copied()
                    .filter(|c| !self.cache.contains_key(c))
                    .collect();
                if !pending.is_empty() {
                    visit.extend(pending);
                    continue;
                }
                visit.pop();
                let children: Vec<TermId> =
                    tm.children(cur).iter().map(|c| self.cache[c]).collect();
                let k = tm.kind(cur);
                let res = if k == Kind::Equal
                    && tm.kind(children[0]) == tm.kind(children[1])
                    && matches!(tm.kind(children[0]), Kind::BvAdd | Kind::BvMul)
                {
                    let (res, norm) = self.normalize_eq_add_mul(tm, children[0], children[1])?;
                    if norm {
                        self.num_normalizations += 1;
                        normalized = true;
                    }
                    res
                } else if k == Kind::Equal
                    && tm.sort(tm.sort_of(children[0])).is_bv()
                {
                    if let Some(rw) = rewrite_mul_udiv_eq_zero(tm, children[0], children[1])? {
                        normalized = true;
                        self.num_normalizations += 1;
                        rw
                    } else {
                        let (res, norm) =
                            self.normalize_comm_assoc(tm, k, children[0], children[1])?;
                        if norm {
                            self.num_normalizations += 1;
                        }
                        res
                    }
                } else if k == Kind::BvUlt || k == Kind::BvSlt {
                    let (res, norm) = self.normalize_comm_assoc(tm, k, children[0], children[1])?;
                    if norm {
                        self.num_normalizations += 1;
                    }
                    res
                } else if k == Kind::BvMul {
                    let distributed = distrib_mul(tm, children[0], children[1], 5)?;
                    rewriter.rewrite(tm, distributed)?
                } else {
                    let old: Vec<TermId> = tm.children(cur).to_vec();
                    if children == old {
                        cur
                    } else {
                        tm.rebuild(cur, &children)?
                    }
                };
                if self.share_aware && res != cur {
                    let count = self.parents.get(&cur).copied().unwrap_or(0);
                    self.parents.insert(res, count);
                }
                self.cache.insert(cur, res);
            }
            if normalized {
                node = self.cache[&node];
                // the replacement contains fresh nodes; sweep again
                continue;
            }
            break;
        }
        rewriter.rewrite(tm, self.cache[&node])
    }
}

fn remove_zero(coeffs: &mut Coeffs) {
    coeffs.retain(|_, c| !c.is_zero());
}

/// Multiplicative chains are rebuilt by repeating factors, which requires
/// every multiplicity to fit into a machine word.
fn coeffs_fit_u64(coeffs: &Coeffs) -> bool {
    coeffs.values().all(|c| c.to_u64().is_some())
}

/// Move entries with a negative signed coefficient to the other side of an
/// equation, negating them.
fn migrate_negative(from: &mut Coeffs, to: &mut Coeffs) {
    let keys: Vec<TermId> = from.keys().copied().collect();
    for t in keys {
        let c = from[&t].clone();
        if c.is_zero() || !c.bit(c.width() - 1) {
            continue;
        }
        let neg = c.bvneg();
        from.remove(&t);
        to.entry(t).and_modify(|e| e.ibvadd(&neg)).or_insert(neg);
    }
}

/// Wrapper nodes the comparison normalization looks through, together with
/// the child position to descend into.
fn wrapper_spine(tm: &TermManager, node: TermId) -> (Vec<(TermId, usize)>, TermId) {
    let mut spine = Vec::new();
    let mut cur = node;
    loop {
        match tm.kind(cur) {
            Kind::BvNot | Kind::BvShl | Kind::BvShr | Kind::BvExtract => {
                spine.push((cur, 0));
                cur = tm.child(cur, 0);
            }
            Kind::BvConcat if tm.is_value(tm.child(cur, 0)) => {
                spine.push((cur, 1));
                cur = tm.child(cur, 1);
            }
            Kind::BvConcat if tm.is_value(tm.child(cur, 1)) => {
                spine.push((cur, 0));
                cur = tm.child(cur, 0);
            }
            _ => break,
        }
    }
    (spine, cur)
}

fn rebuild_spine(
    tm: &mut TermManager,
    spine: &[(TermId, usize)],
    mut acc: TermId,
) -> Result<TermId> {
    for &(node, pos) in spine.iter().rev() {
        let mut children: Vec<TermId> = tm.children(node).to_vec();
        children[pos] = acc;
        acc = tm.rebuild(node, &children)?;
    }
    Ok(acc)
}

/// `x * (n udiv x) = 0  ->  x = 0 \/ n < x` (total-division identity).
fn rewrite_mul_udiv_eq_zero(
    tm: &mut TermManager,
    c0: TermId,
    c1: TermId,
) -> Result<Option<TermId>> {
    let (mul, val) = if tm.kind(c0) == Kind::BvMul {
        (c0, c1)
    } else if tm.kind(c1) == Kind::BvMul {
        (c1, c0)
    } else {
        return Ok(None);
    };
    if tm.bv_value(val).is_none_or(|v| !v.is_zero()) {
        return Ok(None);
    }
    let (a, b) = (tm.child(mul, 0), tm.child(mul, 1));
    let (udiv, x) = if tm.kind(a) == Kind::BvUdiv {
        (a, b)
    } else if tm.kind(b) == Kind::BvUdiv {
        (b, a)
    } else {
        return Ok(None);
    };
    if tm.child(udiv, 1) != x {
        return Ok(None);
    }
    let n = tm.child(udiv, 0);
    let eq = tm.mk_eq(x, val)?;
    let gt = tm.mk_term(Kind::BvUlt, &[n, x], &[])?;
    Ok(Some(tm.mk_or2(eq, gt)?))
}

/// Bounded-depth distribution of multiplication over shifts and additions.
fn distrib_mul(tm: &mut TermManager, left: TermId, right: TermId, depth: u8) -> Result<TermId> {
    if depth > 0 && tm.kind(left) == Kind::BvShl {
        let inner = distrib_mul(tm, tm.child(left, 0), right, depth - 1)?;
        return tm.mk_term(Kind::BvShl, &[inner, tm.child(left, 1)], &[]);
    }
    if depth > 0 && tm.kind(right) == Kind::BvShl {
        let inner = distrib_mul(tm, tm.child(right, 0), left, depth - 1)?;
        return tm.mk_term(Kind::BvShl, &[inner, tm.child(right, 1)], &[]);
    }
    if depth > 0 && tm.kind(left) == Kind::BvAdd {
        let a = distrib_mul(tm, tm.child(left, 0), right, depth - 1)?;
        let b = distrib_mul(tm, tm.child(left, 1), right, depth - 1)?;
        return tm.mk_term(Kind::BvAdd, &[a, b], &[]);
    }
    if depth > 0 && tm.kind(right) == Kind::BvAdd {
        let a = distrib_mul(tm, tm.child(right, 0), left, depth - 1)?;
        let b = distrib_mul(tm, tm.child(right, 1), left, depth - 1)?;
        return tm.mk_term(Kind::BvAdd, &[a, b], &[]);
    }
    tm.mk_term(Kind::BvMul, &[left, right], &[])
}

/// Representative for grouping slices/complements of the same base term.
fn cmp_repr(tm: &TermManager, node: TermId) -> TermId {
    let mut cur = node;
    loop {
        match tm.kind(cur) {
            Kind::BvConcat => cur = tm.child(cur, 1),
            Kind::BvExtract | Kind::BvNot => cur = tm.child(cur, 0),
            _ => return cur,
        }
    }
}

/// The adder-chain sharing sub-pass: collect every additive chain, order
/// leaves so that leaves co-occurring in the same chains are adjacent, and
/// greedily introduce shared sub-sums.
fn normalize_adders(tm: &mut TermManager, assertions: &[TermId]) -> Result<Vec<TermId>> {
    let normalizer = Normalizer {
        share_aware: false,
        parents: Parents::default(),
        cache: FxHashMap::default(),
        num_normalizations: 0,
    };

    // collect all additive chains with their coefficients
    let mut adders: BTreeMap<TermId, Coeffs> = BTreeMap::new();
    {
        let empty = Parents::default();
        let mut cache = FxHashSet::default();
        let mut visit: Vec<TermId> = assertions.to_vec();
        while let Some(cur) = visit.pop() {
            if !cache.insert(cur) {
                continue;
            }
            if tm.kind(cur) == Kind::BvAdd {
                let mut coeffs = Coeffs::new();
                normalizer.compute_coefficients(tm, cur, Kind::BvAdd, &empty, &mut coeffs);
                remove_zero(&mut coeffs);
                for &leaf in coeffs.keys() {
                    visit.push(leaf);
                }
                adders.insert(cur, coeffs);
            } else {
                visit.extend(tm.children(cur).iter().copied());
            }
        }
    }
    if adders.len() < 2 {
        return Ok(assertions.to_vec());
    }

    // chain ids ordered by descending chain size
    let mut chain_sizes: Vec<(TermId, usize)> =
        adders.iter().map(|(c, m)| (*c, m.len())).collect();
    chain_sizes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let id_map: FxHashMap<TermId, u64> = chain_sizes
        .iter()
        .enumerate()
        .map(|(i, (c, _))| (*c, i as u64))
        .collect();

    // leaf -> chains, plus the representative-grouped chain sets
    let mut elements: BTreeMap<TermId, Vec<TermId>> = BTreeMap::new();
    let mut elements_repr: BTreeMap<TermId, FxHashSet<TermId>> = BTreeMap::new();
    for (&chain, coeffs) in &adders {
        for &leaf in coeffs.keys() {
            elements.entry(leaf).or_default().push(chain);
            elements_repr
                .entry(cmp_repr(tm, leaf))
                .or_default()
                .insert(chain);
        }
    }

    let occs_repr: FxHashMap<TermId, Vec<u64>> = elements_repr
        .iter()
        .map(|(&repr, chains)| {
            let mut v: Vec<u64> = chains.iter().map(|c| id_map[c]).collect();
            v.sort_unstable();
            (repr, v)
        })
        .collect();

    // leaves sorted so that co-occurring leaves are adjacent
    let mut ordered: Vec<TermId> = elements.keys().copied().collect();
    ordered.sort_by(|&a, &b| {
        let (ra, rb) = (cmp_repr(tm, a), cmp_repr(tm, b));
        let (va, vb) = (&occs_repr[&ra], &occs_repr[&rb]);
        for (x, y) in va.iter().zip(vb.iter()) {
            if x != y {
                return x.cmp(y);
            }
        }
        vb.len()
            .cmp(&va.len())
            .then(ra.cmp(&rb))
            .then(a.cmp(&b))
    });

    // greedily grow one shared sub-sum per chain
    let mut results: BTreeMap<TermId, TermId> = BTreeMap::new();
    for &leaf in &ordered {
        for &chain in &elements[&leaf] {
            match results.get(&chain) {
                None => {
                    results.insert(chain, leaf);
                }
                Some(&acc) => {
                    let sum = tm.mk_term(Kind::BvAdd, &[leaf, acc], &[])?;
                    results.insert(chain, sum);
                }
            }
            if let Some(c) = adders.get_mut(&chain).and_then(|m| m.get_mut(&leaf)) {
                c.ibvdec();
            }
        }
    }

    // rebuild each chain from the shared sub-sum plus residual coefficients
    let mut subst: FxHashMap<TermId, TermId> = FxHashMap::default();
    for (chain, mut res) in results {
        for (&n, coeff) in &adders[&chain] {
            if coeff.is_zero() {
                continue;
            }
            let arg = if coeff.is_one() {
                n
            } else {
                let v = tm.mk_bv_val(coeff.clone());
                tm.mk_term(Kind::BvMul, &[v, n], &[])?
            };
            res = tm.mk_term(Kind::BvAdd, &[arg, res], &[])?;
        }
        if res != chain {
            subst.insert(chain, res);
        }
    }
    if subst.is_empty() {
        return Ok(assertions.to_vec());
    }
    tm.substitute_terms(assertions, &subst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::option::Options;

    fn run_pass(tm: &mut TermManager, asserts: &[TermId]) -> Vec<TermId> {
        let options = Options::default();
        let mut entries: Vec<crate::preprocess::Assertion> = asserts
            .iter()
            .map(|&t| crate::preprocess::Assertion { current: t, origin: Some(t) })
            .collect();
        let mut rewriter = Rewriter::new(options.rewrite_level);
        let mut subst = FxHashMap::default();
        let mut ack = crate::preprocess::AckermannTable::default();
        let mut stats = quiver_core::statistics::Statistics::new();
        let mut ctx = PassContext {
            rewriter: &mut rewriter,
            options: &options,
            substitutions: &mut subst,
            ackermann: &mut ack,
            stats: &mut stats,
        };
        let mut view = AssertionView::new(&mut entries);
        apply(tm, &mut view, &mut ctx).unwrap();
        entries.iter().map(|a| a.current).collect()
    }

    #[test]
    fn reassociated_sums_compare_equal() {
        // eq(a + (b + c), (c + a) + b) normalizes to true
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let a = tm.mk_const(bv8, Some("a")).unwrap();
        let b = tm.mk_const(bv8, Some("b")).unwrap();
        let c = tm.mk_const(bv8, Some("c")).unwrap();
        let bc = tm.mk_term(Kind::BvAdd, &[b, c], &[]).unwrap();
        let lhs = tm.mk_term(Kind::BvAdd, &[a, bc], &[]).unwrap();
        let ca = tm.mk_term(Kind::BvAdd, &[c, a], &[]).unwrap();
        let rhs = tm.mk_term(Kind::BvAdd, &[ca, b], &[]).unwrap();
        let eq = tm.mk_eq(lhs, rhs).unwrap();
        let out = run_pass(&mut tm, &[eq]);
        assert!(tm.is_true(out[0]), "{}", tm.to_smt2(out[0]));
    }

    #[test]
    fn common_summands_cancel_across_equality() {
        // a + b = b + c  normalizes to  a = c
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let a = tm.mk_const(bv8, Some("a")).unwrap();
        let b = tm.mk_const(bv8, Some("b")).unwrap();
        let c = tm.mk_const(bv8, Some("c")).unwrap();
        let lhs = tm.mk_term(Kind::BvAdd, &[a, b], &[]).unwrap();
        let rhs = tm.mk_term(Kind::BvAdd, &[b, c], &[]).unwrap();
        let eq = tm.mk_eq(lhs, rhs).unwrap();
        let out = run_pass(&mut tm, &[eq]);
        let expected = tm.mk_eq(a, c).unwrap();
        assert_eq!(out[0], expected, "{}", tm.to_smt2(out[0]));
    }

    #[test]
    fn negated_summands_balance_across_equality() {
        // a - c = b - c  normalizes to  a = b
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let a = tm.mk_const(bv8, Some("a")).unwrap();
        let b = tm.mk_const(bv8, Some("b")).unwrap();
        let c = tm.mk_const(bv8, Some("c")).unwrap();
        let nc = tm.mk_term(Kind::BvNeg, &[c], &[]).unwrap();
        let lhs = tm.mk_term(Kind::BvAdd, &[a, nc], &[]).unwrap();
        let rhs = tm.mk_term(Kind::BvAdd, &[b, nc], &[]).unwrap();
        let eq = tm.mk_eq(lhs, rhs).unwrap();
        let out = run_pass(&mut tm, &[eq]);
        let expected = tm.mk_eq(a, b).unwrap();
        assert_eq!(out[0], expected, "{}", tm.to_smt2(out[0]));
    }

    #[test]
    fn constants_fold_across_sides() {
        // a + 2 = b + 3  normalizes to  a = b + 1
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let a = tm.mk_const(bv8, Some("a")).unwrap();
        let b = tm.mk_const(bv8, Some("b")).unwrap();
        let two = tm.mk_bv_value_u64(bv8, 2).unwrap();
        let three = tm.mk_bv_value_u64(bv8, 3).unwrap();
        let lhs = tm.mk_term(Kind::BvAdd, &[a, two], &[]).unwrap();
        let rhs = tm.mk_term(Kind::BvAdd, &[b, three], &[]).unwrap();
        let eq = tm.mk_eq(lhs, rhs).unwrap();
        let out = run_pass(&mut tm, &[eq]);
        let one = tm.mk_bv_one(bv8).unwrap();
        let b1 = tm.mk_term(Kind::BvAdd, &[b, one], &[]).unwrap();
        let expected = tm.mk_eq(a, b1).unwrap();
        assert_eq!(out[0], expected, "{}", tm.to_smt2(out[0]));
    }

    #[test]
    fn division_totality_identity() {
        // x * (n udiv x) = 0  ->  x = 0 \/ n < x
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let n = tm.mk_const(bv8, Some("n")).unwrap();
        let udiv = tm.mk_term(Kind::BvUdiv, &[n, x], &[]).unwrap();
        let mul = tm.mk_term(Kind::BvMul, &[x, udiv], &[]).unwrap();
        let zero = tm.mk_bv_zero(bv8).unwrap();
        let eq = tm.mk_eq(mul, zero).unwrap();
        let out = run_pass(&mut tm, &[eq]);
        assert_eq!(tm.kind(out[0]), Kind::Or, "{}", tm.to_smt2(out[0]));
    }

    #[test]
    fn shared_adders_reduce_aig_size() {
        // four chains over the same four summands end up sharing one sub-sum
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let names = ["a", "b", "c", "d"];
        let vars: Vec<TermId> = names
            .iter()
            .map(|n| tm.mk_const(bv8, Some(n)).unwrap())
            .collect();
        let mut asserts = Vec::new();
        for (i, &k) in [11u64, 23, 37, 71].iter().enumerate() {
            // vary association so the chains are distinct nodes
            let mut sum = vars[i % 4];
            for j in 0..4 {
                if j != i % 4 {
                    sum = tm.mk_term(Kind::BvAdd, &[sum, vars[j]], &[]).unwrap();
                }
            }
            let kv = tm.mk_bv_value_u64(bv8, k).unwrap();
            asserts.push(tm.mk_eq(sum, kv).unwrap());
        }
        let before = aig_size(&tm, &asserts);
        let out = run_pass(&mut tm, &asserts);
        let after = aig_size(&tm, &out);
        assert!(after < before, "sharing must shrink the AIG: {before} -> {after}");
    }

    #[test]
    fn pass_keeps_input_when_nothing_improves() {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let y = tm.mk_const(bv8, Some("y")).unwrap();
        let eq = tm.mk_eq(x, y).unwrap();
        let out = run_pass(&mut tm, &[eq]);
        assert_eq!(out[0], eq);
    }
}
