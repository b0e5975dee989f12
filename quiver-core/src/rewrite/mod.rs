//! Pure structural rewriting.
//!
//! [`Rewriter::rewrite`] maps a term to a semantically equivalent term in a
//! stable canonical form, never increasing the node count for the identities
//! it implements. Results are memoized per term identifier.
//!
//! The rewrite level selects aggressiveness:
//! - level 0: identity,
//! - level 1: constant folding, neutral/annihilating elements, idempotence,
//!   double negation, operator canonicalization,
//! - level 2: the remaining size-reducing identities (De Morgan when
//!   reducing, slice/extend coalescing, `distinct` fanout, array read
//!   simplification, lambda beta reduction, ITE lifting over folded
//!   operands),
//! - level 3: speculative identities used by the normalizer (value
//!   multiplication distributed over addition).

mod bool_rules;
mod bv_rules;
mod core_rules;

use rustc_hash::FxHashMap;

use crate::ast::{TermId, TermManager};
use crate::error::Result;

/// Counters of a rewriter instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteStats {
    /// Nodes visited, including cache hits.
    pub nodes_visited: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Applied rule steps.
    pub rewrites: u64,
}

/// Memoizing structural rewriter.
#[derive(Debug)]
pub struct Rewriter {
    level: u8,
    cache: FxHashMap<TermId, TermId>,
    stats: RewriteStats,
}

impl Rewriter {
    /// Create a rewriter at the given level (0..=3).
    pub fn new(level: u8) -> Self {
        assert!(level <= 3, "rewrite level must be 0..=3, got {level}");
        Self {
            level,
            cache: FxHashMap::default(),
            stats: RewriteStats::default(),
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn stats(&self) -> RewriteStats {
        self.stats
    }

    /// Drop all memoized results (required after a manager reset).
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Rewrite `root` bottom-up to its canonical form.
    pub fn rewrite(&mut self, tm: &mut TermManager, root: TermId) -> Result<TermId> {
        if self.level == 0 {
            return Ok(root);
        }
        let mut visit = vec![root];
        while let Some(&cur) = visit.last() {
            self.stats.nodes_visited += 1;
            if self.cache.contains_key(&cur) {
                self.stats.cache_hits += 1;
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
            // children are rewritten; rebuild and apply one rule step
            let old_children: Vec<TermId> = tm.children(cur).to_vec();
            let new_children: Vec<TermId> = old_children.iter().map(|c| self.cache[c]).collect();
            let rebuilt = if new_children == old_children {
                cur
            } else {
                tm.rebuild(cur, &new_children)?
            };
            let res = self.rewrite_step(tm, rebuilt)?;
            if res == rebuilt {
                self.cache.insert(cur, res);
                if cur != rebuilt {
                    self.cache.insert(rebuilt, res);
                }
                visit.pop();
            } else if let Some(&done) = self.cache.get(&res) {
                self.stats.rewrites += 1;
                self.cache.insert(cur, done);
                if cur != rebuilt {
                    self.cache.insert(rebuilt, done);
                }
                visit.pop();
            } else {
                // rewrite the rule result fully, then revisit `cur`; the step
                // is deterministic, so the revisit aliases `cur` to it
                self.stats.rewrites += 1;
                visit.push(res);
            }
        }
        Ok(self.cache[&root])
    }

    /// Apply a single top-level rule step to a node whose children are
    /// already in canonical form. Returns the node itself when no rule fires.
    fn rewrite_step(&mut self, tm: &mut TermManager, t: TermId) -> Result<TermId> {
        let level = self.level;
        if let Some(res) = bv_rules::fold_values(tm, t)? {
            return Ok(res);
        }
        if let Some(res) = bool_rules::apply(tm, t, level)? {
            return Ok(res);
        }
        if let Some(res) = bv_rules::apply(tm, t, level)? {
            return Ok(res);
        }
        if let Some(res) = core_rules::apply(tm, t, level)? {
            return Ok(res);
        }
        Ok(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Kind;

    fn setup() -> (TermManager, Rewriter) {
        (TermManager::new(), Rewriter::new(2))
    }

    #[test]
    fn level_zero_is_identity() {
        let mut tm = TermManager::new();
        let mut rw = Rewriter::new(0);
        let t = tm.mk_true();
        let f = tm.mk_false();
        let and = tm.mk_and2(t, f).unwrap();
        assert_eq!(rw.rewrite(&mut tm, and).unwrap(), and);
    }

    #[test]
    fn constant_folding_is_deep() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let a = tm.mk_bv_value_u64(bv8, 3).unwrap();
        let b = tm.mk_bv_value_u64(bv8, 5).unwrap();
        let add = tm.mk_term(Kind::BvAdd, &[a, b], &[]).unwrap();
        let mul = tm.mk_term(Kind::BvMul, &[add, add], &[]).unwrap();
        let res = rw.rewrite(&mut tm, mul).unwrap();
        assert_eq!(res, tm.mk_bv_value_u64(bv8, 64).unwrap());
    }

    #[test]
    fn rewriting_is_idempotent() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let zero = tm.mk_bv_zero(bv8).unwrap();
        let one = tm.mk_bv_one(bv8).unwrap();
        let t1 = tm.mk_term(Kind::BvAdd, &[x, zero], &[]).unwrap();
        let t2 = tm.mk_term(Kind::BvMul, &[t1, one], &[]).unwrap();
        let t3 = tm.mk_term(Kind::BvSub, &[t2, x], &[]).unwrap();
        let once = rw.rewrite(&mut tm, t3).unwrap();
        let twice = rw.rewrite(&mut tm, once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, zero);
    }

    #[test]
    fn stats_account_for_cache() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let zero = tm.mk_bv_zero(bv8).unwrap();
        let t = tm.mk_term(Kind::BvAdd, &[x, zero], &[]).unwrap();
        let r1 = rw.rewrite(&mut tm, t).unwrap();
        let before = rw.stats().cache_hits;
        let r2 = rw.rewrite(&mut tm, t).unwrap();
        assert_eq!(r1, r2);
        assert!(rw.stats().cache_hits > before);
    }
}
