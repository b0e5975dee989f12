//! Term substitution.

use rustc_hash::FxHashMap;

use crate::error::Result;

use super::term::{TermId, TermManager};

impl TermManager {
    /// Replace every occurrence of a key of `map` in `root` by its value.
    ///
    /// The walk is memoized over the DAG. Substitution does not look through
    /// binders specially: bound variables must not occur as keys (the caller
    /// is responsible for capture avoidance).
    pub fn substitute_term(
        &mut self,
        root: TermId,
        map: &FxHashMap<TermId, TermId>,
    ) -> Result<TermId> {
        let mut out = self.substitute_terms(&[root], map)?;
        Ok(out.pop().expect("one result per root"))
    }

    /// Substitute over several roots sharing one memo table.
    pub fn substitute_terms(
        &mut self,
        roots: &[TermId],
        map: &FxHashMap<TermId, TermId>,
    ) -> Result<Vec<TermId>> {
        let mut cache: FxHashMap<TermId, TermId> = FxHashMap::default();
        for (k, v) in map {
            cache.insert(*k, *v);
        }
        let mut visit: Vec<TermId> = roots.to_vec();
        while let Some(&cur) = visit.last() {
            if cache.contains_key(&cur) {
                visit.pop();
                continue;
            }
            let pending: Vec<TermId> = self
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
            let old_children: Vec<TermId> = self.children(cur).to_vec();
            let new_children: Vec<TermId> = old_children.iter().map(|c| cache[c]).collect();
            let res = if new_children == old_children {
                cur
            } else {
                self.rebuild(cur, &new_children)?
            };
            cache.insert(cur, res);
        }
        Ok(roots.iter().map(|r| cache[r]).collect())
    }
}
