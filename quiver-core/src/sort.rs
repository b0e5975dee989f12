//! Interned sort descriptors.
//!
//! Sorts are immutable and interned: constructing the same sort twice yields
//! the same [`SortId`]. Identifiers are tagged with the owning manager, so
//! mixing identifiers across term managers is detected and reported as a
//! hard failure rather than silently comparing unrelated indices.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;

use crate::error::{Error, Result};

/// Stable identifier of an interned sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SortId {
    pub(crate) mgr: u32,
    pub(crate) idx: u32,
}

impl SortId {
    /// The raw 64-bit identifier (manager tag in the high half).
    pub fn raw(self) -> u64 {
        (u64::from(self.mgr) << 32) | u64::from(self.idx)
    }
}

/// The shape of a sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SortKind {
    Bool,
    BitVec(u64),
    FloatingPoint { exp: u64, sig: u64 },
    RoundingMode,
    Array { index: SortId, element: SortId },
    Fun { domain: SmallVec<[SortId; 4]>, codomain: SortId },
}

/// Sort interner owned by a term manager.
#[derive(Debug)]
pub(crate) struct SortStore {
    mgr: u32,
    sorts: Vec<SortKind>,
    table: FxHashMap<SortKind, u32>,
}

impl SortStore {
    pub(crate) fn new(mgr: u32) -> Self {
        Self {
            mgr,
            sorts: Vec::new(),
            table: FxHashMap::default(),
        }
    }

    pub(crate) fn intern(&mut self, kind: SortKind) -> SortId {
        if let Some(&idx) = self.table.get(&kind) {
            return SortId { mgr: self.mgr, idx };
        }
        let idx = u32::try_from(self.sorts.len()).expect("sort arena overflow");
        self.sorts.push(kind.clone());
        self.table.insert(kind, idx);
        SortId { mgr: self.mgr, idx }
    }

    pub(crate) fn check(&self, id: SortId) -> Result<()> {
        if id.mgr != self.mgr || (id.idx as usize) >= self.sorts.len() {
            return Err(Error::CrossManager);
        }
        Ok(())
    }

    pub(crate) fn kind(&self, id: SortId) -> &SortKind {
        assert_eq!(id.mgr, self.mgr, "sort identifier from a different term manager");
        &self.sorts[id.idx as usize]
    }

    pub(crate) fn display(&self, id: SortId) -> String {
        match self.kind(id) {
            SortKind::Bool => "Bool".to_string(),
            SortKind::BitVec(w) => format!("(_ BitVec {w})"),
            SortKind::FloatingPoint { exp, sig } => format!("(_ FloatingPoint {exp} {sig})"),
            SortKind::RoundingMode => "RoundingMode".to_string(),
            SortKind::Array { index, element } => {
                format!("(Array {} {})", self.display(*index), self.display(*element))
            }
            SortKind::Fun { domain, codomain } => {
                let mut s = String::from("(");
                for d in domain {
                    s.push_str(&self.display(*d));
                    s.push(' ');
                }
                s.push_str("-> ");
                s.push_str(&self.display(*codomain));
                s.push(')');
                s
            }
        }
    }
}

/// Read-only view of a sort, handed out by the term manager.
#[derive(Clone, Copy)]
pub struct Sort<'a> {
    pub(crate) id: SortId,
    pub(crate) store: &'a SortStore,
}

impl<'a> Sort<'a> {
    pub fn id(&self) -> SortId {
        self.id
    }

    fn kind(&self) -> &'a SortKind {
        self.store.kind(self.id)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.kind(), SortKind::Bool)
    }

    pub fn is_bv(&self) -> bool {
        matches!(self.kind(), SortKind::BitVec(_))
    }

    pub fn is_fp(&self) -> bool {
        matches!(self.kind(), SortKind::FloatingPoint { .. })
    }

    pub fn is_rm(&self) -> bool {
        matches!(self.kind(), SortKind::RoundingMode)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind(), SortKind::Array { .. })
    }

    pub fn is_fun(&self) -> bool {
        matches!(self.kind(), SortKind::Fun { .. })
    }

    /// Bit-vector width; panics when applied to a non-bit-vector sort.
    pub fn bv_size(&self) -> u64 {
        match self.kind() {
            SortKind::BitVec(w) => *w,
            k => panic!("bv_size on non-bit-vector sort {k:?}"),
        }
    }

    pub fn fp_exp_size(&self) -> u64 {
        match self.kind() {
            SortKind::FloatingPoint { exp, .. } => *exp,
            k => panic!("fp_exp_size on non-floating-point sort {k:?}"),
        }
    }

    pub fn fp_sig_size(&self) -> u64 {
        match self.kind() {
            SortKind::FloatingPoint { sig, .. } => *sig,
            k => panic!("fp_sig_size on non-floating-point sort {k:?}"),
        }
    }

    pub fn array_index(&self) -> SortId {
        match self.kind() {
            SortKind::Array { index, .. } => *index,
            k => panic!("array_index on non-array sort {k:?}"),
        }
    }

    pub fn array_element(&self) -> SortId {
        match self.kind() {
            SortKind::Array { element, .. } => *element,
            k => panic!("array_element on non-array sort {k:?}"),
        }
    }

    pub fn fun_domain(&self) -> &'a [SortId] {
        match self.kind() {
            SortKind::Fun { domain, .. } => domain,
            k => panic!("fun_domain on non-function sort {k:?}"),
        }
    }

    pub fn fun_codomain(&self) -> SortId {
        match self.kind() {
            SortKind::Fun { codomain, .. } => *codomain,
            k => panic!("fun_codomain on non-function sort {k:?}"),
        }
    }

    pub fn fun_arity(&self) -> usize {
        self.fun_domain().len()
    }
}

impl fmt::Debug for Sort<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.store.display(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut store = SortStore::new(1);
        let b1 = store.intern(SortKind::Bool);
        let b2 = store.intern(SortKind::Bool);
        assert_eq!(b1, b2);
        let bv8 = store.intern(SortKind::BitVec(8));
        let bv9 = store.intern(SortKind::BitVec(9));
        assert_ne!(bv8, bv9);
        assert_eq!(store.intern(SortKind::BitVec(8)), bv8);
        let arr = store.intern(SortKind::Array { index: bv8, element: bv9 });
        assert_eq!(store.intern(SortKind::Array { index: bv8, element: bv9 }), arr);
    }

    #[test]
    fn cross_manager_is_detected() {
        let mut a = SortStore::new(1);
        let mut b = SortStore::new(2);
        let ida = a.intern(SortKind::Bool);
        let _ = b.intern(SortKind::Bool);
        assert!(b.check(ida).is_err());
        assert!(a.check(ida).is_ok());
    }
}
