//! Hash-consed term DAG and its manager.
//!
//! The manager owns all term storage. Construction validates arity, index
//! counts and sorts, then interns: two constructions with the same
//! `(kind, sort, children, indices, payload)` tuple return the same
//! [`TermId`]. Identifiers are tagged with the owning manager and stay valid
//! until [`TermManager::reset`]; terms are never destroyed individually.

use lasso::{Rodeo, Spur};
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::bv::BvValue;
use crate::error::{Error, Result};
use crate::fp::{FpValue, RoundingMode};
use crate::sort::{Sort, SortId, SortKind, SortStore};

use super::kind::Kind;

static NEXT_MANAGER_ID: AtomicU32 = AtomicU32::new(1);

/// Stable identifier of an interned term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TermId {
    pub(crate) mgr: u32,
    pub(crate) idx: u32,
}

impl TermId {
    /// The raw 64-bit identifier (manager tag in the high half).
    pub fn raw(self) -> u64 {
        (u64::from(self.mgr) << 32) | u64::from(self.idx)
    }
}

// Ordering ignores the manager tag: ids are only ever ordered within one
// manager, and canonical orders (coefficient maps, commutative interning)
// must match creation order.
impl PartialOrd for TermId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TermId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.idx.cmp(&other.idx)
    }
}

/// Leaf payload of a term node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    None,
    Bool(bool),
    BitVec(BvValue),
    Rm(RoundingMode),
    Fp(FpValue),
    Symbol(Spur),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TermData {
    pub(crate) kind: Kind,
    pub(crate) sort: SortId,
    pub(crate) children: SmallVec<[TermId; 2]>,
    pub(crate) indices: SmallVec<[u64; 2]>,
    pub(crate) payload: Payload,
}

/// Hash-consed, typed term manager.
pub struct TermManager {
    mgr: u32,
    sorts: SortStore,
    terms: Vec<TermData>,
    table: FxHashMap<TermData, u32>,
    symbols: Rodeo,
    fresh: u64,
}

impl Default for TermManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TermManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermManager")
            .field("mgr", &self.mgr)
            .field("num_terms", &self.terms.len())
            .finish()
    }
}

impl TermManager {
    pub fn new() -> Self {
        let mgr = NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            mgr,
            sorts: SortStore::new(mgr),
            terms: Vec::new(),
            table: FxHashMap::default(),
            symbols: Rodeo::default(),
            fresh: 0,
        }
    }

    /// Drop every term and sort; all identifiers issued so far become
    /// invalid simultaneously.
    pub fn reset(&mut self) {
        let mgr = NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed);
        self.mgr = mgr;
        self.sorts = SortStore::new(mgr);
        self.terms.clear();
        self.table.clear();
        self.symbols = Rodeo::default();
        self.fresh = 0;
    }

    /// Number of live terms (used by size guards and tests).
    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /* ---- sorts ---- */

    pub fn mk_bool_sort(&mut self) -> SortId {
        self.sorts.intern(SortKind::Bool)
    }

    pub fn mk_bv_sort(&mut self, width: u64) -> SortId {
        assert!(width >= 1, "bit-vector sort width must be >= 1");
        self.sorts.intern(SortKind::BitVec(width))
    }

    pub fn mk_fp_sort(&mut self, exp: u64, sig: u64) -> SortId {
        assert!(exp >= 2 && sig >= 2, "degenerate floating-point sort ({exp}, {sig})");
        self.sorts.intern(SortKind::FloatingPoint { exp, sig })
    }

    pub fn mk_rm_sort(&mut self) -> SortId {
        self.sorts.intern(SortKind::RoundingMode)
    }

    pub fn mk_array_sort(&mut self, index: SortId, element: SortId) -> Result<SortId> {
        self.sorts.check(index)?;
        self.sorts.check(element)?;
        Ok(self.sorts.intern(SortKind::Array { index, element }))
    }

    pub fn mk_fun_sort(&mut self, domain: &[SortId], codomain: SortId) -> Result<SortId> {
        assert!(!domain.is_empty(), "function sort needs a non-empty domain");
        for d in domain {
            self.sorts.check(*d)?;
        }
        self.sorts.check(codomain)?;
        if self.sort(codomain).is_fun() {
            return Err(Error::SortMismatch {
                kind: "fun-sort",
                details: "higher-order codomain".to_string(),
            });
        }
        Ok(self.sorts.intern(SortKind::Fun {
            domain: domain.iter().copied().collect(),
            codomain,
        }))
    }

    /// Sort view for predicates and accessors.
    pub fn sort(&self, id: SortId) -> Sort<'_> {
        Sort { id, store: &self.sorts }
    }

    /* ---- term accessors ---- */

    fn check(&self, id: TermId) -> Result<()> {
        if id.mgr != self.mgr || (id.idx as usize) >= self.terms.len() {
            return Err(Error::CrossManager);
        }
        Ok(())
    }

    fn data(&self, id: TermId) -> &TermData {
        assert_eq!(id.mgr, self.mgr, "term identifier from a different term manager");
        &self.terms[id.idx as usize]
    }

    pub fn kind(&self, t: TermId) -> Kind {
        self.data(t).kind
    }

    pub fn sort_of(&self, t: TermId) -> SortId {
        self.data(t).sort
    }

    pub fn children(&self, t: TermId) -> &[TermId] {
        &self.data(t).children
    }

    pub fn child(&self, t: TermId, i: usize) -> TermId {
        self.data(t).children[i]
    }

    pub fn num_children(&self, t: TermId) -> usize {
        self.data(t).children.len()
    }

    pub fn indices(&self, t: TermId) -> &[u64] {
        &self.data(t).indices
    }

    pub fn index(&self, t: TermId, i: usize) -> u64 {
        self.data(t).indices[i]
    }

    pub fn is_value(&self, t: TermId) -> bool {
        self.data(t).kind == Kind::Value
    }

    pub fn is_const(&self, t: TermId) -> bool {
        self.data(t).kind == Kind::Const
    }

    pub fn is_var(&self, t: TermId) -> bool {
        self.data(t).kind == Kind::Var
    }

    pub fn bool_value(&self, t: TermId) -> Option<bool> {
        match &self.data(t).payload {
            Payload::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn bv_value(&self, t: TermId) -> Option<&BvValue> {
        match &self.data(t).payload {
            Payload::BitVec(v) => Some(v),
            _ => None,
        }
    }

    pub fn rm_value(&self, t: TermId) -> Option<RoundingMode> {
        match &self.data(t).payload {
            Payload::Rm(rm) => Some(*rm),
            _ => None,
        }
    }

    pub fn fp_value(&self, t: TermId) -> Option<&FpValue> {
        match &self.data(t).payload {
            Payload::Fp(v) => Some(v),
            _ => None,
        }
    }

    pub fn symbol(&self, t: TermId) -> Option<&str> {
        match &self.data(t).payload {
            Payload::Symbol(s) => Some(self.symbols.resolve(s)),
            _ => None,
        }
    }

    /// Convenience: true if `t` is the value `true`.
    pub fn is_true(&self, t: TermId) -> bool {
        self.bool_value(t) == Some(true)
    }

    /// Convenience: true if `t` is the value `false`.
    pub fn is_false(&self, t: TermId) -> bool {
        self.bool_value(t) == Some(false)
    }

    /// Width of a bit-vector term.
    pub fn bv_width(&self, t: TermId) -> u64 {
        self.sort(self.sort_of(t)).bv_size()
    }

    /* ---- interning ---- */

    fn intern(&mut self, mut data: TermData) -> TermId {
        if data.kind.is_commutative() && data.children.len() == 2 && data.children[0] > data.children[1]
        {
            data.children.swap(0, 1);
        }
        if let Some(&idx) = self.table.get(&data) {
            return TermId { mgr: self.mgr, idx };
        }
        let idx = u32::try_from(self.terms.len()).expect("term arena overflow");
        self.terms.push(data.clone());
        self.table.insert(data, idx);
        TermId { mgr: self.mgr, idx }
    }

    fn intern_value(&mut self, sort: SortId, payload: Payload) -> TermId {
        self.intern(TermData {
            kind: Kind::Value,
            sort,
            children: SmallVec::new(),
            indices: SmallVec::new(),
            payload,
        })
    }

    /* ---- value constructors ---- */

    pub fn mk_true(&mut self) -> TermId {
        let sort = self.mk_bool_sort();
        self.intern_value(sort, Payload::Bool(true))
    }

    pub fn mk_false(&mut self) -> TermId {
        let sort = self.mk_bool_sort();
        self.intern_value(sort, Payload::Bool(false))
    }

    pub fn mk_bool(&mut self, b: bool) -> TermId {
        if b {
            self.mk_true()
        } else {
            self.mk_false()
        }
    }

    /// Bit-vector value from an existing [`BvValue`].
    pub fn mk_bv_val(&mut self, value: BvValue) -> TermId {
        let sort = self.mk_bv_sort(value.width());
        self.intern_value(sort, Payload::BitVec(value))
    }

    /// Bit-vector value from a literal string in base 2, 10 or 16.
    pub fn mk_bv_value(&mut self, sort: SortId, text: &str, base: u32) -> Result<TermId> {
        self.sorts.check(sort)?;
        let width = self.sort(sort).bv_size();
        let value = BvValue::from_str_radix(width, text, base)?;
        Ok(self.mk_bv_val(value))
    }

    pub fn mk_bv_value_u64(&mut self, sort: SortId, value: u64) -> Result<TermId> {
        self.sorts.check(sort)?;
        let width = self.sort(sort).bv_size();
        Ok(self.mk_bv_val(BvValue::from_u64(width, value)))
    }

    pub fn mk_bv_value_i64(&mut self, sort: SortId, value: i64) -> Result<TermId> {
        self.sorts.check(sort)?;
        let width = self.sort(sort).bv_size();
        Ok(self.mk_bv_val(BvValue::from_i64(width, value)))
    }

    pub fn mk_bv_zero(&mut self, sort: SortId) -> Result<TermId> {
        self.sorts.check(sort)?;
        let width = self.sort(sort).bv_size();
        Ok(self.mk_bv_val(BvValue::zero(width)))
    }

    pub fn mk_bv_one(&mut self, sort: SortId) -> Result<TermId> {
        self.sorts.check(sort)?;
        let width = self.sort(sort).bv_size();
        Ok(self.mk_bv_val(BvValue::one(width)))
    }

    pub fn mk_bv_ones(&mut self, sort: SortId) -> Result<TermId> {
        self.sorts.check(sort)?;
        let width = self.sort(sort).bv_size();
        Ok(self.mk_bv_val(BvValue::ones(width)))
    }

    pub fn mk_bv_min_signed(&mut self, sort: SortId) -> Result<TermId> {
        self.sorts.check(sort)?;
        let width = self.sort(sort).bv_size();
        Ok(self.mk_bv_val(BvValue::min_signed(width)))
    }

    pub fn mk_bv_max_signed(&mut self, sort: SortId) -> Result<TermId> {
        self.sorts.check(sort)?;
        let width = self.sort(sort).bv_size();
        Ok(self.mk_bv_val(BvValue::max_signed(width)))
    }

    pub fn mk_rm_value(&mut self, rm: RoundingMode) -> TermId {
        let sort = self.mk_rm_sort();
        self.intern_value(sort, Payload::Rm(rm))
    }

    fn fp_format(&self, sort: SortId) -> (u64, u64) {
        let view = self.sort(sort);
        (view.fp_exp_size(), view.fp_sig_size())
    }

    pub fn mk_fp_val(&mut self, value: FpValue) -> TermId {
        let sort = self.mk_fp_sort(value.exp_size(), value.sig_size());
        self.intern_value(sort, Payload::Fp(value))
    }

    pub fn mk_fp_pos_zero(&mut self, sort: SortId) -> Result<TermId> {
        self.sorts.check(sort)?;
        let (e, s) = self.fp_format(sort);
        Ok(self.mk_fp_val(FpValue::pos_zero(e, s)))
    }

    pub fn mk_fp_neg_zero(&mut self, sort: SortId) -> Result<TermId> {
        self.sorts.check(sort)?;
        let (e, s) = self.fp_format(sort);
        Ok(self.mk_fp_val(FpValue::neg_zero(e, s)))
    }

    pub fn mk_fp_pos_inf(&mut self, sort: SortId) -> Result<TermId> {
        self.sorts.check(sort)?;
        let (e, s) = self.fp_format(sort);
        Ok(self.mk_fp_val(FpValue::pos_inf(e, s)))
    }

    pub fn mk_fp_neg_inf(&mut self, sort: SortId) -> Result<TermId> {
        self.sorts.check(sort)?;
        let (e, s) = self.fp_format(sort);
        Ok(self.mk_fp_val(FpValue::neg_inf(e, s)))
    }

    pub fn mk_fp_nan(&mut self, sort: SortId) -> Result<TermId> {
        self.sorts.check(sort)?;
        let (e, s) = self.fp_format(sort);
        Ok(self.mk_fp_val(FpValue::nan(e, s)))
    }

    /// Floating-point literal from `(sign, exp, sig)` bit-vector value terms.
    pub fn mk_fp_value(&mut self, sign: TermId, exp: TermId, sig: TermId) -> Result<TermId> {
        self.check(sign)?;
        self.check(exp)?;
        self.check(sig)?;
        let get = |tm: &Self, t: TermId| -> Result<BvValue> {
            tm.bv_value(t).cloned().ok_or_else(|| Error::SortMismatch {
                kind: "fp-value",
                details: "arguments must be bit-vector values".to_string(),
            })
        };
        let sign = get(self, sign)?;
        let exp = get(self, exp)?;
        let sig = get(self, sig)?;
        if sign.width() != 1 {
            return Err(Error::SortMismatch {
                kind: "fp-value",
                details: format!("sign must have width 1, got {}", sign.width()),
            });
        }
        Ok(self.mk_fp_val(FpValue::from_fields(&sign, &exp, &sig)))
    }

    /// Floating-point literal from a decimal real string under `rm`.
    pub fn mk_fp_value_from_real(
        &mut self,
        sort: SortId,
        rm: RoundingMode,
        real: &str,
    ) -> Result<TermId> {
        self.sorts.check(sort)?;
        let (e, s) = self.fp_format(sort);
        let value = FpValue::from_real(e, s, rm, real)?;
        Ok(self.mk_fp_val(value))
    }

    /// Floating-point literal from a decimal rational under `rm`.
    pub fn mk_fp_value_from_rational(
        &mut self,
        sort: SortId,
        rm: RoundingMode,
        num: &str,
        den: &str,
    ) -> Result<TermId> {
        self.sorts.check(sort)?;
        let (e, s) = self.fp_format(sort);
        let value = FpValue::from_rational(e, s, rm, num, den)?;
        Ok(self.mk_fp_val(value))
    }

    /* ---- constants, variables, constant arrays ---- */

    fn fresh_symbol(&mut self, prefix: &str) -> Spur {
        let n = self.fresh;
        self.fresh += 1;
        self.symbols.get_or_intern(format!("@{prefix}{n}"))
    }

    /// A free constant. A named constant is interned by
    /// `(sort, symbol)`; an anonymous constant receives a fresh generated
    /// symbol and is therefore distinct from all previous constants.
    pub fn mk_const(&mut self, sort: SortId, symbol: Option<&str>) -> Result<TermId> {
        self.sorts.check(sort)?;
        let spur = match symbol {
            Some(s) => self.symbols.get_or_intern(s),
            None => self.fresh_symbol("c"),
        };
        Ok(self.intern(TermData {
            kind: Kind::Const,
            sort,
            children: SmallVec::new(),
            indices: SmallVec::new(),
            payload: Payload::Symbol(spur),
        }))
    }

    /// A variable to be bound by a quantifier or lambda.
    pub fn mk_var(&mut self, sort: SortId, symbol: Option<&str>) -> Result<TermId> {
        self.sorts.check(sort)?;
        if self.sort(sort).is_fun() {
            return Err(Error::SortMismatch {
                kind: "var",
                details: "variables cannot have function sort".to_string(),
            });
        }
        let spur = match symbol {
            Some(s) => self.symbols.get_or_intern(s),
            None => self.fresh_symbol("v"),
        };
        Ok(self.intern(TermData {
            kind: Kind::Var,
            sort,
            children: SmallVec::new(),
            indices: SmallVec::new(),
            payload: Payload::Symbol(spur),
        }))
    }

    /// A constant array of the given array sort whose every element is
    /// `value`.
    pub fn mk_const_array(&mut self, sort: SortId, value: TermId) -> Result<TermId> {
        self.sorts.check(sort)?;
        self.check(value)?;
        let view = self.sort(sort);
        if !view.is_array() {
            return Err(Error::SortMismatch {
                kind: "const-array",
                details: "sort is not an array sort".to_string(),
            });
        }
        if view.array_element() != self.sort_of(value) {
            return Err(Error::SortMismatch {
                kind: "const-array",
                details: "element sort does not match the array sort".to_string(),
            });
        }
        Ok(self.intern(TermData {
            kind: Kind::ConstArray,
            sort,
            children: smallvec![value],
            indices: SmallVec::new(),
            payload: Payload::None,
        }))
    }

    /* ---- general construction ---- */

    /// Construct a term of `kind`. Validates arity, index count and sorts.
    pub fn mk_term(&mut self, kind: Kind, args: &[TermId], indices: &[u64]) -> Result<TermId> {
        if matches!(kind, Kind::Value | Kind::Const | Kind::Var | Kind::ConstArray) {
            return Err(Error::SortMismatch {
                kind: kind.name(),
                details: "leaf kinds are built through their dedicated constructors".to_string(),
            });
        }
        for a in args {
            self.check(*a)?;
        }
        if !kind.arity().accepts(args.len()) {
            return Err(Error::ArityMismatch {
                kind: kind.name(),
                expected: kind.arity().to_string(),
                got: args.len(),
            });
        }
        if kind.num_indices() != indices.len() {
            return Err(Error::IndexCountMismatch {
                kind: kind.name(),
                expected: kind.num_indices(),
                got: indices.len(),
            });
        }
        let sort = self.result_sort(kind, args, indices)?;
        Ok(self.intern(TermData {
            kind,
            sort,
            children: args.iter().copied().collect(),
            indices: indices.iter().copied().collect(),
            payload: Payload::None,
        }))
    }

    fn sort_err(&self, kind: Kind, details: String) -> Error {
        Error::SortMismatch { kind: kind.name(), details }
    }

    fn expect_bool(&self, kind: Kind, t: TermId) -> Result<()> {
        if self.sort(self.sort_of(t)).is_bool() {
            Ok(())
        } else {
            Err(self.sort_err(
                kind,
                format!("expected Boolean argument, got {:?}", self.sort(self.sort_of(t))),
            ))
        }
    }

    fn expect_bv(&self, kind: Kind, t: TermId) -> Result<u64> {
        let s = self.sort(self.sort_of(t));
        if s.is_bv() {
            Ok(s.bv_size())
        } else {
            Err(self.sort_err(kind, format!("expected bit-vector argument, got {s:?}")))
        }
    }

    fn expect_fp(&self, kind: Kind, t: TermId) -> Result<(u64, u64)> {
        let s = self.sort(self.sort_of(t));
        if s.is_fp() {
            Ok((s.fp_exp_size(), s.fp_sig_size()))
        } else {
            Err(self.sort_err(kind, format!("expected floating-point argument, got {s:?}")))
        }
    }

    fn expect_rm(&self, kind: Kind, t: TermId) -> Result<()> {
        if self.sort(self.sort_of(t)).is_rm() {
            Ok(())
        } else {
            Err(self.sort_err(kind, "expected rounding-mode argument".to_string()))
        }
    }

    fn expect_same_bv(&self, kind: Kind, args: &[TermId]) -> Result<u64> {
        let w = self.expect_bv(kind, args[0])?;
        for a in &args[1..] {
            let wa = self.expect_bv(kind, *a)?;
            if wa != w {
                return Err(self.sort_err(kind, format!("operand widths differ: {w} vs {wa}")));
            }
        }
        Ok(w)
    }

    fn expect_same_fp(&self, kind: Kind, args: &[TermId]) -> Result<(u64, u64)> {
        let fmt = self.expect_fp(kind, args[0])?;
        for a in &args[1..] {
            if self.expect_fp(kind, *a)? != fmt {
                return Err(self.sort_err(kind, "operand formats differ".to_string()));
            }
        }
        Ok(fmt)
    }

    fn result_sort(&mut self, kind: Kind, args: &[TermId], indices: &[u64]) -> Result<SortId> {
        use Kind::*;
        match kind {
            Value | Const | Var | ConstArray => unreachable!("handled by mk_term"),

            And | Or | Not | Xor | Iff | Implies => {
                for a in args {
                    self.expect_bool(kind, *a)?;
                }
                Ok(self.mk_bool_sort())
            }

            Equal | Distinct => {
                let s = self.sort_of(args[0]);
                for a in &args[1..] {
                    if self.sort_of(*a) != s {
                        return Err(self.sort_err(kind, "argument sorts differ".to_string()));
                    }
                }
                Ok(self.mk_bool_sort())
            }

            Ite => {
                self.expect_bool(kind, args[0])?;
                let s = self.sort_of(args[1]);
                if self.sort_of(args[2]) != s {
                    return Err(self.sort_err(kind, "branch sorts differ".to_string()));
                }
                Ok(s)
            }

            Apply => {
                let fun_sort = self.sort(self.sort_of(args[0]));
                if !fun_sort.is_fun() {
                    return Err(self.sort_err(kind, "first argument is not a function".to_string()));
                }
                let domain: SmallVec<[SortId; 4]> = fun_sort.fun_domain().iter().copied().collect();
                let codomain = fun_sort.fun_codomain();
                if domain.len() != args.len() - 1 {
                    return Err(Error::ArityMismatch {
                        kind: kind.name(),
                        expected: (domain.len() + 1).to_string(),
                        got: args.len(),
                    });
                }
                for (a, d) in args[1..].iter().zip(domain.iter()) {
                    if self.sort_of(*a) != *d {
                        return Err(self.sort_err(kind, "argument sort does not match domain".to_string()));
                    }
                }
                Ok(codomain)
            }

            Lambda => {
                if !self.is_var(args[0]) {
                    return Err(self.sort_err(kind, "binder must be a variable".to_string()));
                }
                let var_sort = self.sort_of(args[0]);
                let body_sort = self.sort_of(args[1]);
                let mut domain: SmallVec<[SortId; 4]> = smallvec![var_sort];
                let codomain = if self.sort(body_sort).is_fun() {
                    let body_view = self.sort(body_sort);
                    domain.extend(body_view.fun_domain().iter().copied());
                    body_view.fun_codomain()
                } else {
                    body_sort
                };
                self.mk_fun_sort(&domain, codomain)
            }

            Forall | Exists => {
                if !self.is_var(args[0]) {
                    return Err(self.sort_err(kind, "binder must be a variable".to_string()));
                }
                self.expect_bool(kind, args[1])?;
                Ok(self.mk_bool_sort())
            }

            Select => {
                let arr = self.sort(self.sort_of(args[0]));
                if !arr.is_array() {
                    return Err(self.sort_err(kind, "first argument is not an array".to_string()));
                }
                if self.sort_of(args[1]) != arr.array_index() {
                    return Err(self.sort_err(kind, "index sort mismatch".to_string()));
                }
                Ok(arr.array_element())
            }

            Store => {
                let arr_sort = self.sort_of(args[0]);
                let arr = self.sort(arr_sort);
                if !arr.is_array() {
                    return Err(self.sort_err(kind, "first argument is not an array".to_string()));
                }
                if self.sort_of(args[1]) != arr.array_index() {
                    return Err(self.sort_err(kind, "index sort mismatch".to_string()));
                }
                if self.sort_of(args[2]) != arr.array_element() {
                    return Err(self.sort_err(kind, "element sort mismatch".to_string()));
                }
                Ok(arr_sort)
            }

            BvAdd | BvAnd | BvAshr | BvMul | BvNand | BvNor | BvOr | BvRol | BvRor | BvSdiv
            | BvShl | BvShr | BvSmod | BvSrem | BvSub | BvUdiv | BvUrem | BvXnor | BvXor => {
                let w = self.expect_same_bv(kind, args)?;
                Ok(self.mk_bv_sort(w))
            }

            BvNeg | BvNot | BvInc | BvDec => {
                let w = self.expect_bv(kind, args[0])?;
                Ok(self.mk_bv_sort(w))
            }

            BvComp => {
                self.expect_same_bv(kind, args)?;
                Ok(self.mk_bv_sort(1))
            }

            BvRedand | BvRedor | BvRedxor => {
                self.expect_bv(kind, args[0])?;
                Ok(self.mk_bv_sort(1))
            }

            BvUlt | BvUle | BvUgt | BvUge | BvSlt | BvSle | BvSgt | BvSge | BvUaddo | BvSaddo
            | BvUsubo | BvSsubo | BvUmulo | BvSmulo | BvSdivo => {
                self.expect_same_bv(kind, args)?;
                Ok(self.mk_bool_sort())
            }

            BvConcat => {
                let w0 = self.expect_bv(kind, args[0])?;
                let w1 = self.expect_bv(kind, args[1])?;
                Ok(self.mk_bv_sort(w0 + w1))
            }

            BvExtract => {
                let w = self.expect_bv(kind, args[0])?;
                let (hi, lo) = (indices[0], indices[1]);
                if hi < lo || hi >= w {
                    return Err(Error::IndexOutOfRange {
                        kind: kind.name(),
                        details: format!("[{hi}:{lo}] on width {w}"),
                    });
                }
                Ok(self.mk_bv_sort(hi - lo + 1))
            }

            BvRepeat => {
                let w = self.expect_bv(kind, args[0])?;
                let n = indices[0];
                if n == 0 {
                    return Err(Error::IndexOutOfRange {
                        kind: kind.name(),
                        details: "repeat count must be >= 1".to_string(),
                    });
                }
                Ok(self.mk_bv_sort(w * n))
            }

            BvRoli | BvRori => {
                let w = self.expect_bv(kind, args[0])?;
                Ok(self.mk_bv_sort(w))
            }

            BvSignExtend | BvZeroExtend => {
                let w = self.expect_bv(kind, args[0])?;
                Ok(self.mk_bv_sort(w + indices[0]))
            }

            FpAbs | FpNeg => {
                let (e, s) = self.expect_fp(kind, args[0])?;
                Ok(self.mk_fp_sort(e, s))
            }

            FpAdd | FpSub | FpMul | FpDiv => {
                self.expect_rm(kind, args[0])?;
                let (e, s) = self.expect_same_fp(kind, &args[1..])?;
                Ok(self.mk_fp_sort(e, s))
            }

            FpFma => {
                self.expect_rm(kind, args[0])?;
                let (e, s) = self.expect_same_fp(kind, &args[1..])?;
                Ok(self.mk_fp_sort(e, s))
            }

            FpSqrt | FpRti => {
                self.expect_rm(kind, args[0])?;
                let (e, s) = self.expect_fp(kind, args[1])?;
                Ok(self.mk_fp_sort(e, s))
            }

            FpRem | FpMin | FpMax => {
                let (e, s) = self.expect_same_fp(kind, args)?;
                Ok(self.mk_fp_sort(e, s))
            }

            FpEq | FpLeq | FpLt | FpGeq | FpGt => {
                self.expect_same_fp(kind, args)?;
                Ok(self.mk_bool_sort())
            }

            FpIsInf | FpIsNan | FpIsNeg | FpIsNormal | FpIsPos | FpIsSubnormal | FpIsZero => {
                self.expect_fp(kind, args[0])?;
                Ok(self.mk_bool_sort())
            }

            FpFp => {
                let ws = self.expect_bv(kind, args[0])?;
                let we = self.expect_bv(kind, args[1])?;
                let wm = self.expect_bv(kind, args[2])?;
                if ws != 1 {
                    return Err(self.sort_err(kind, "sign must have width 1".to_string()));
                }
                Ok(self.mk_fp_sort(we, wm + 1))
            }

            FpToFpFromBv => {
                let w = self.expect_bv(kind, args[0])?;
                let (e, s) = (indices[0], indices[1]);
                if w != e + s {
                    return Err(self.sort_err(
                        kind,
                        format!("bit-vector width {w} does not match format ({e}, {s})"),
                    ));
                }
                Ok(self.mk_fp_sort(e, s))
            }

            FpToFpFromFp => {
                self.expect_rm(kind, args[0])?;
                self.expect_fp(kind, args[1])?;
                Ok(self.mk_fp_sort(indices[0], indices[1]))
            }

            FpToFpFromSbv | FpToFpFromUbv => {
                self.expect_rm(kind, args[0])?;
                self.expect_bv(kind, args[1])?;
                Ok(self.mk_fp_sort(indices[0], indices[1]))
            }

            FpToSbv | FpToUbv => {
                self.expect_rm(kind, args[0])?;
                self.expect_fp(kind, args[1])?;
                if indices[0] == 0 {
                    return Err(Error::IndexOutOfRange {
                        kind: kind.name(),
                        details: "target width must be >= 1".to_string(),
                    });
                }
                Ok(self.mk_bv_sort(indices[0]))
            }
        }
    }

    /* ---- convenience constructors ---- */

    pub fn mk_not(&mut self, t: TermId) -> Result<TermId> {
        self.mk_term(Kind::Not, &[t], &[])
    }

    pub fn mk_and2(&mut self, a: TermId, b: TermId) -> Result<TermId> {
        self.mk_term(Kind::And, &[a, b], &[])
    }

    pub fn mk_or2(&mut self, a: TermId, b: TermId) -> Result<TermId> {
        self.mk_term(Kind::Or, &[a, b], &[])
    }

    /// N-ary conjunction; empty is `true`, singleton is the element itself.
    pub fn mk_and(&mut self, ts: &[TermId]) -> Result<TermId> {
        match ts {
            [] => Ok(self.mk_true()),
            [t] => Ok(*t),
            _ => self.mk_term(Kind::And, ts, &[]),
        }
    }

    /// N-ary disjunction; empty is `false`, singleton is the element itself.
    pub fn mk_or(&mut self, ts: &[TermId]) -> Result<TermId> {
        match ts {
            [] => Ok(self.mk_false()),
            [t] => Ok(*t),
            _ => self.mk_term(Kind::Or, ts, &[]),
        }
    }

    pub fn mk_implies(&mut self, a: TermId, b: TermId) -> Result<TermId> {
        self.mk_term(Kind::Implies, &[a, b], &[])
    }

    pub fn mk_eq(&mut self, a: TermId, b: TermId) -> Result<TermId> {
        self.mk_term(Kind::Equal, &[a, b], &[])
    }

    pub fn mk_ite(&mut self, c: TermId, t: TermId, e: TermId) -> Result<TermId> {
        self.mk_term(Kind::Ite, &[c, t, e], &[])
    }

    pub fn mk_apply(&mut self, fun: TermId, args: &[TermId]) -> Result<TermId> {
        let mut children = Vec::with_capacity(args.len() + 1);
        children.push(fun);
        children.extend_from_slice(args);
        self.mk_term(Kind::Apply, &children, &[])
    }

    pub fn mk_forall(&mut self, var: TermId, body: TermId) -> Result<TermId> {
        self.mk_term(Kind::Forall, &[var, body], &[])
    }

    pub fn mk_exists(&mut self, var: TermId, body: TermId) -> Result<TermId> {
        self.mk_term(Kind::Exists, &[var, body], &[])
    }

    pub fn mk_lambda(&mut self, var: TermId, body: TermId) -> Result<TermId> {
        self.mk_term(Kind::Lambda, &[var, body], &[])
    }

    /// Rebuild a non-leaf node with new children (same kind and indices).
    /// Leaf nodes are returned unchanged.
    pub fn rebuild(&mut self, t: TermId, children: &[TermId]) -> Result<TermId> {
        match self.kind(t) {
            Kind::Value | Kind::Const | Kind::Var => Ok(t),
            Kind::ConstArray => {
                let sort = self.sort_of(t);
                self.mk_const_array(sort, children[0])
            }
            kind => {
                let indices: SmallVec<[u64; 2]> = self.data(t).indices.clone();
                self.mk_term(kind, children, &indices)
            }
        }
    }

    /* ---- printing ---- */

    /// Render a term in SMT-LIB-style concrete syntax.
    ///
    /// Bit-vector values print per `base` (2, 10 or 16);
    /// function-sorted entries render as `lambda` terms.
    pub fn to_smt2_base(&self, t: TermId, base: u32) -> String {
        // iterative post-order rendering, parents assembled from child strings
        let mut rendered: FxHashMap<TermId, String> = FxHashMap::default();
        let mut visit = vec![t];
        while let Some(&cur) = visit.last() {
            if rendered.contains_key(&cur) {
                visit.pop();
                continue;
            }
            let pending: Vec<TermId> = self
                .children(cur)
                .iter()
                .copied()
                .filter(|c| !rendered.contains_key(c))
                .collect();
            if !pending.is_empty() {
                visit.extend(pending);
                continue;
            }
            visit.pop();
            let text = self.render_node(cur, base, &rendered);
            rendered.insert(cur, text);
        }
        rendered.remove(&t).expect("root rendered")
    }

    /// Render with the default binary/hex value syntax.
    pub fn to_smt2(&self, t: TermId) -> String {
        self.to_smt2_base(t, 16)
    }

    fn render_node(&self, t: TermId, base: u32, rendered: &FxHashMap<TermId, String>) -> String {
        let data = self.data(t);
        let child = |i: usize| rendered[&data.children[i]].clone();
        match data.kind {
            Kind::Value => match &data.payload {
                Payload::Bool(b) => b.to_string(),
                Payload::BitVec(v) => match base {
                    10 => format!("(_ bv{} {})", v.to_string_radix(10), v.width()),
                    2 => format!("#b{}", v.to_string_radix(2)),
                    _ => v.to_smt2(),
                },
                Payload::Rm(rm) => rm.to_string(),
                Payload::Fp(v) => v.to_string(),
                Payload::Symbol(_) | Payload::None => unreachable!("value payload"),
            },
            Kind::Const | Kind::Var => self.symbol(t).unwrap_or("?").to_string(),
            Kind::ConstArray => format!(
                "((as const {}) {})",
                self.sorts.display(data.sort),
                child(0)
            ),
            Kind::Lambda | Kind::Forall | Kind::Exists => {
                let var = data.children[0];
                format!(
                    "({} (({} {})) {})",
                    data.kind.name(),
                    self.symbol(var).unwrap_or("?"),
                    self.sorts.display(self.sort_of(var)),
                    child(1)
                )
            }
            kind => {
                let mut s = String::from("(");
                if kind.num_indices() > 0 {
                    s.push_str("(_ ");
                    s.push_str(kind.name());
                    for i in &data.indices {
                        s.push(' ');
                        s.push_str(&i.to_string());
                    }
                    s.push(')');
                } else {
                    s.push_str(kind.name());
                }
                for i in 0..data.children.len() {
                    s.push(' ');
                    s.push_str(&child(i));
                }
                s.push(')');
                s
            }
        }
    }
}
