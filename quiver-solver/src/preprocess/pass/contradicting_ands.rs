//! Pass: collapse conjunctions containing `a` and `¬a`.
//!
//! The rewriter catches contradictions among the direct children of one
//! conjunction; this pass looks through nested conjunction structure, where
//! the two complementary literals may live in different sub-conjunctions.

use rustc_hash::FxHashSet;

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::error::Result;

use super::{map_assertions, AssertionView, PassContext};

pub(crate) fn apply(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    ctx: &mut PassContext<'_>,
) -> Result<bool> {
    let mut num = 0u64;
    let changed = map_assertions(tm, view, |tm, t| {
        if tm.kind(t) != Kind::And {
            return Ok(None);
        }
        if has_contradiction(tm, t) {
            num += 1;
            Ok(Some(tm.mk_false()))
        } else {
            Ok(None)
        }
    })?;
    ctx.stats.add("preprocess::contradicting_ands::num_collapsed", num);
    Ok(changed)
}

fn has_contradiction(tm: &TermManager, root: TermId) -> bool {
    // flatten the nested conjunction and look for complementary leaves
    let mut leaves: FxHashSet<TermId> = FxHashSet::default();
    let mut visit: Vec<TermId> = tm.children(root).to_vec();
    let mut seen: FxHashSet<TermId> = FxHashSet::default();
    while let Some(cur) = visit.pop() {
        if !seen.insert(cur) {
            continue;
        }
        if tm.kind(cur) == Kind::And {
            visit.extend(tm.children(cur).iter().copied());
        } else {
            leaves.insert(cur);
        }
    }
    for &leaf in &leaves {
        if tm.kind(leaf) == Kind::Not && leaves.contains(&tm.child(leaf, 0)) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::rewrite::Rewriter;

    #[test]
    fn nested_contradiction_is_found() {
        let mut tm = TermManager::new();
        let b = tm.mk_bool_sort();
        let p = tm.mk_const(b, Some("p")).unwrap();
        let q = tm.mk_const(b, Some("q")).unwrap();
        let r = tm.mk_const(b, Some("r")).unwrap();
        let np = tm.mk_not(p).unwrap();
        let left = tm.mk_and2(p, q).unwrap();
        let right = tm.mk_and2(np, r).unwrap();
        let root = tm.mk_and2(left, right).unwrap();
        assert!(has_contradiction(&tm, root));

        let ok = tm.mk_and2(left, r).unwrap();
        assert!(!has_contradiction(&tm, ok));
    }

    #[test]
    fn pass_collapses_to_false() {
        let mut tm = TermManager::new();
        let options = quiver_core::option::Options::default();
        let b = tm.mk_bool_sort();
        let p = tm.mk_const(b, Some("p")).unwrap();
        let q = tm.mk_const(b, Some("q")).unwrap();
        let np = tm.mk_not(p).unwrap();
        let left = tm.mk_and2(p, q).unwrap();
        let root = tm.mk_and2(left, np).unwrap();

        let mut entries = vec![crate::preprocess::Assertion { current: root, origin: Some(root) }];
        let mut view = AssertionView::new(&mut entries);
        let mut rewriter = Rewriter::new(2);
        let mut subst = rustc_hash::FxHashMap::default();
        let mut ack = super::super::AckermannTable::default();
        let mut stats = quiver_core::statistics::Statistics::new();
        let mut ctx = PassContext {
            rewriter: &mut rewriter,
            options: &options,
            substitutions: &mut subst,
            ackermann: &mut ack,
            stats: &mut stats,
        };
        assert!(apply(&mut tm, &mut view, &mut ctx).unwrap());
        assert!(tm.is_false(entries[0].current));
    }
}
