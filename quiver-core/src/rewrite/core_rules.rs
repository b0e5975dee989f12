//! Core rewriting: equality, `distinct`, `ite`, arrays, beta reduction and
//! floating-point value folding.

use num_bigint::BigInt;

use crate::ast::{Kind, TermId, TermManager};
use crate::error::Result;
use crate::fp::FpValue;

pub(super) fn apply(tm: &mut TermManager, t: TermId, level: u8) -> Result<Option<TermId>> {
    use Kind::*;
    let kind = tm.kind(t);
    let res: Option<TermId> = match kind {
        Equal => rewrite_equal(tm, t, level)?,
        Distinct => rewrite_distinct(tm, t)?,
        Ite => rewrite_ite(tm, t, level)?,
        Select => rewrite_select(tm, t, level)?,
        Store => rewrite_store(tm, t, level)?,
        Apply => beta_reduce(tm, t)?,
        FpIsInf | FpIsNan | FpIsNeg | FpIsNormal | FpIsPos | FpIsSubnormal | FpIsZero => {
            let Some(v) = tm.fp_value(tm.child(t, 0)).cloned() else {
                return Ok(None);
            };
            let holds = match kind {
                FpIsInf => v.is_inf(),
                FpIsNan => v.is_nan(),
                FpIsNeg => v.is_neg(),
                FpIsNormal => v.is_normal(),
                FpIsPos => v.is_pos(),
                FpIsSubnormal => v.is_subnormal(),
                FpIsZero => v.is_zero(),
                _ => unreachable!(),
            };
            Some(tm.mk_bool(holds))
        }
        FpNeg | FpAbs => {
            let a = tm.child(t, 0);
            if kind == FpNeg && tm.kind(a) == FpNeg {
                return Ok(Some(tm.child(a, 0)));
            }
            if kind == FpAbs && matches!(tm.kind(a), FpAbs | FpNeg) {
                // |−x| = |x|, ||x|| = |x|
                return Ok(Some(tm.mk_term(FpAbs, &[tm.child(a, 0)], &[])?));
            }
            let Some(v) = tm.fp_value(a).cloned() else {
                return Ok(None);
            };
            let sign = if kind == FpNeg {
                v.sign().bvnot()
            } else {
                crate::bv::BvValue::zero(1)
            };
            let value = FpValue::from_fields(&sign, &v.exponent(), &v.significand());
            Some(tm.mk_fp_val(value))
        }
        FpEq | FpLeq | FpLt | FpGeq | FpGt => fold_fp_compare(tm, t)?,
        _ => ite_lift(tm, t)?,
    };
    Ok(res)
}

fn rewrite_equal(tm: &mut TermManager, t: TermId, level: u8) -> Result<Option<TermId>> {
    let (a, b) = (tm.child(t, 0), tm.child(t, 1));
    if a == b {
        return Ok(Some(tm.mk_true()));
    }
    // value = value decides by identity, except that all NaN payloads denote
    // the one NaN value
    if tm.is_value(a) && tm.is_value(b) {
        let eq = match (tm.fp_value(a), tm.fp_value(b)) {
            (Some(x), Some(y)) => (x.is_nan() && y.is_nan()) || x.bits() == y.bits(),
            _ => false, // distinct interned values
        };
        return Ok(Some(tm.mk_bool(eq)));
    }
    // Boolean equality folds into the operand or its negation
    if tm.sort(tm.sort_of(a)).is_bool() {
        if let Some(v) = tm.bool_value(a) {
            return Ok(Some(if v { b } else { tm.mk_not(b)? }));
        }
        if let Some(v) = tm.bool_value(b) {
            return Ok(Some(if v { a } else { tm.mk_not(a)? }));
        }
    }
    if level >= 2 && tm.kind(a) == Kind::BvNot && tm.kind(b) == Kind::BvNot {
        let eq = tm.mk_eq(tm.child(a, 0), tm.child(b, 0))?;
        return Ok(Some(eq));
    }
    Ok(None)
}

/// `distinct` fans out to pairwise inequalities; the chain solvers and the
/// bit-blaster only deal with binary equality.
fn rewrite_distinct(tm: &mut TermManager, t: TermId) -> Result<Option<TermId>> {
    let children: Vec<TermId> = tm.children(t).to_vec();
    for (i, &a) in children.iter().enumerate() {
        for &b in &children[i + 1..] {
            if a == b {
                return Ok(Some(tm.mk_false()));
            }
        }
    }
    let mut conj = Vec::new();
    for (i, &a) in children.iter().enumerate() {
        for &b in &children[i + 1..] {
            let eq = tm.mk_eq(a, b)?;
            conj.push(tm.mk_not(eq)?);
        }
    }
    Ok(Some(tm.mk_and(&conj)?))
}

fn rewrite_ite(tm: &mut TermManager, t: TermId, level: u8) -> Result<Option<TermId>> {
    let (c, then_, else_) = (tm.child(t, 0), tm.child(t, 1), tm.child(t, 2));
    if let Some(v) = tm.bool_value(c) {
        return Ok(Some(if v { then_ } else { else_ }));
    }
    if then_ == else_ {
        return Ok(Some(then_));
    }
    if tm.kind(c) == Kind::Not {
        let inner = tm.child(c, 0);
        return Ok(Some(tm.mk_ite(inner, else_, then_)?));
    }
    if level >= 2 && tm.sort(tm.sort_of(then_)).is_bool() {
        match (tm.bool_value(then_), tm.bool_value(else_)) {
            (Some(true), _) => return Ok(Some(tm.mk_or2(c, else_)?)),
            (Some(false), _) => {
                let nc = tm.mk_not(c)?;
                return Ok(Some(tm.mk_and2(nc, else_)?));
            }
            (_, Some(true)) => {
                let nc = tm.mk_not(c)?;
                return Ok(Some(tm.mk_or2(nc, then_)?));
            }
            (_, Some(false)) => return Ok(Some(tm.mk_and2(c, then_)?)),
            _ => {}
        }
    }
    Ok(None)
}

fn rewrite_select(tm: &mut TermManager, t: TermId, level: u8) -> Result<Option<TermId>> {
    let (arr, idx) = (tm.child(t, 0), tm.child(t, 1));
    match tm.kind(arr) {
        Kind::ConstArray => Ok(Some(tm.child(arr, 0))),
        Kind::Store => {
            let (base, widx, val) = (tm.child(arr, 0), tm.child(arr, 1), tm.child(arr, 2));
            if widx == idx {
                return Ok(Some(val));
            }
            if tm.is_value(widx) && tm.is_value(idx) {
                // distinct interned values cannot alias
                return Ok(Some(tm.mk_term(Kind::Select, &[base, idx], &[])?));
            }
            if level >= 2 {
                let eq = tm.mk_eq(widx, idx)?;
                let deep = tm.mk_term(Kind::Select, &[base, idx], &[])?;
                return Ok(Some(tm.mk_ite(eq, val, deep)?));
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn rewrite_store(tm: &mut TermManager, t: TermId, level: u8) -> Result<Option<TermId>> {
    if level < 2 {
        return Ok(None);
    }
    let (arr, idx, val) = (tm.child(t, 0), tm.child(t, 1), tm.child(t, 2));
    // writing back the stored element is the identity
    if tm.kind(val) == Kind::Select && tm.child(val, 0) == arr && tm.child(val, 1) == idx {
        return Ok(Some(arr));
    }
    // a same-index overwrite shadows the inner store
    if tm.kind(arr) == Kind::Store && tm.child(arr, 1) == idx {
        let base = tm.child(arr, 0);
        return Ok(Some(tm.mk_term(Kind::Store, &[base, idx, val], &[])?));
    }
    Ok(None)
}

/// `(lambda x. body) a ...` reduces by substitution through the curried
/// lambda spine.
fn beta_reduce(tm: &mut TermManager, t: TermId) -> Result<Option<TermId>> {
    let fun = tm.child(t, 0);
    if tm.kind(fun) != Kind::Lambda {
        return Ok(None);
    }
    let args: Vec<TermId> = tm.children(t)[1..].to_vec();
    let mut map = rustc_hash::FxHashMap::default();
    let mut body = fun;
    for &arg in &args {
        debug_assert_eq!(tm.kind(body), Kind::Lambda, "lambda spine shorter than arity");
        map.insert(tm.child(body, 0), arg);
        body = tm.child(body, 1);
    }
    Ok(Some(tm.substitute_term(body, &map)?))
}

/// Lift an `ite` above an operator when the remaining operands are values
/// and one branch is a value: one of the two copies folds away, so the term
/// never grows.
fn ite_lift(tm: &mut TermManager, t: TermId) -> Result<Option<TermId>> {
    let kind = tm.kind(t);
    if !kind.is_bv() || kind.num_indices() > 0 {
        return Ok(None);
    }
    let children: Vec<TermId> = tm.children(t).to_vec();
    let mut ite_pos = None;
    for (i, &c) in children.iter().enumerate() {
        if tm.kind(c) == Kind::Ite {
            if ite_pos.is_some() {
                return Ok(None);
            }
            ite_pos = Some(i);
        } else if !tm.is_value(c) {
            return Ok(None);
        }
    }
    let Some(pos) = ite_pos else { return Ok(None) };
    let ite = children[pos];
    let (c, then_, else_) = (tm.child(ite, 0), tm.child(ite, 1), tm.child(ite, 2));
    if !tm.is_value(then_) && !tm.is_value(else_) {
        return Ok(None);
    }
    let mut then_children = children.clone();
    then_children[pos] = then_;
    let mut else_children = children;
    else_children[pos] = else_;
    let then_op = tm.mk_term(kind, &then_children, &[])?;
    let else_op = tm.mk_term(kind, &else_children, &[])?;
    Ok(Some(tm.mk_ite(c, then_op, else_op)?))
}

/// Fold floating-point comparisons on literal operands. NaN compares false
/// under every predicate; the two zeros compare equal.
fn fold_fp_compare(tm: &mut TermManager, t: TermId) -> Result<Option<TermId>> {
    let (Some(a), Some(b)) = (
        tm.fp_value(tm.child(t, 0)).cloned(),
        tm.fp_value(tm.child(t, 1)).cloned(),
    ) else {
        return Ok(None);
    };
    let (Some(ka), Some(kb)) = (fp_order_key(&a), fp_order_key(&b)) else {
        return Ok(Some(tm.mk_false()));
    };
    let holds = match tm.kind(t) {
        Kind::FpEq => ka == kb,
        Kind::FpLeq => ka <= kb,
        Kind::FpLt => ka < kb,
        Kind::FpGeq => ka >= kb,
        Kind::FpGt => ka > kb,
        _ => unreachable!(),
    };
    Ok(Some(tm.mk_bool(holds)))
}

/// Total numeric order key; `None` for NaN. Both zeros map to zero.
fn fp_order_key(v: &FpValue) -> Option<BigInt> {
    if v.is_nan() {
        return None;
    }
    if v.is_zero() {
        return Some(BigInt::from(0));
    }
    let magnitude = BigInt::from(v.exponent().uint().clone()) * (BigInt::from(1) << v.sig_size())
        + BigInt::from(v.significand().uint().clone());
    Some(if v.sign().is_zero() { magnitude } else { -magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp::RoundingMode;
    use crate::rewrite::Rewriter;

    fn setup() -> (TermManager, Rewriter) {
        (TermManager::new(), Rewriter::new(2))
    }

    #[test]
    fn reflexive_equality_is_true() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let eq = tm.mk_eq(x, x).unwrap();
        assert_eq!(rw.rewrite(&mut tm, eq).unwrap(), tm.mk_true());
    }

    #[test]
    fn distinct_fans_out() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let y = tm.mk_const(bv8, Some("y")).unwrap();
        let d2 = tm.mk_term(Kind::Distinct, &[x, y], &[]).unwrap();
        let eq = tm.mk_eq(x, y).unwrap();
        let ne = tm.mk_not(eq).unwrap();
        assert_eq!(rw.rewrite(&mut tm, d2).unwrap(), ne);

        let dup = tm.mk_term(Kind::Distinct, &[x, y, x], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, dup).unwrap(), tm.mk_false());
    }

    #[test]
    fn ite_simplifies() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let b = tm.mk_bool_sort();
        let c = tm.mk_const(b, Some("c")).unwrap();
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let y = tm.mk_const(bv8, Some("y")).unwrap();
        let t = tm.mk_true();

        let ite_t = tm.mk_ite(t, x, y).unwrap();
        assert_eq!(rw.rewrite(&mut tm, ite_t).unwrap(), x);
        let ite_same = tm.mk_ite(c, x, x).unwrap();
        assert_eq!(rw.rewrite(&mut tm, ite_same).unwrap(), x);
        let nc = tm.mk_not(c).unwrap();
        let ite_not = tm.mk_ite(nc, x, y).unwrap();
        let flipped = tm.mk_ite(c, y, x).unwrap();
        assert_eq!(rw.rewrite(&mut tm, ite_not).unwrap(), flipped);
    }

    #[test]
    fn select_over_store() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let arr_sort = tm.mk_array_sort(bv8, bv8).unwrap();
        let a = tm.mk_const(arr_sort, Some("a")).unwrap();
        let i = tm.mk_const(bv8, Some("i")).unwrap();
        let j = tm.mk_const(bv8, Some("j")).unwrap();
        let v = tm.mk_const(bv8, Some("v")).unwrap();

        let st = tm.mk_term(Kind::Store, &[a, i, v], &[]).unwrap();
        let same = tm.mk_term(Kind::Select, &[st, i], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, same).unwrap(), v);

        let other = tm.mk_term(Kind::Select, &[st, j], &[]).unwrap();
        let res = rw.rewrite(&mut tm, other).unwrap();
        assert_eq!(tm.kind(res), Kind::Ite);
    }

    #[test]
    fn select_of_const_array() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let arr_sort = tm.mk_array_sort(bv8, bv8).unwrap();
        let v = tm.mk_bv_value_u64(bv8, 7).unwrap();
        let ca = tm.mk_const_array(arr_sort, v).unwrap();
        let i = tm.mk_const(bv8, Some("i")).unwrap();
        let sel = tm.mk_term(Kind::Select, &[ca, i], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, sel).unwrap(), v);
    }

    #[test]
    fn beta_reduction() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let vx = tm.mk_var(bv8, Some("i")).unwrap();
        let body = tm.mk_term(Kind::BvNot, &[vx], &[]).unwrap();
        let lam = tm.mk_lambda(vx, body).unwrap();
        let arg = tm.mk_bv_value_u64(bv8, 0x0F).unwrap();
        let app = tm.mk_apply(lam, &[arg]).unwrap();
        let res = rw.rewrite(&mut tm, app).unwrap();
        assert_eq!(res, tm.mk_bv_value_u64(bv8, 0xF0).unwrap());
    }

    #[test]
    fn ite_lifts_over_folded_operands() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let b = tm.mk_bool_sort();
        let c = tm.mk_const(b, Some("c")).unwrap();
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let v1 = tm.mk_bv_value_u64(bv8, 1).unwrap();
        let v2 = tm.mk_bv_value_u64(bv8, 2).unwrap();
        let ite = tm.mk_ite(c, v1, x).unwrap();
        let add = tm.mk_term(Kind::BvAdd, &[ite, v2], &[]).unwrap();
        let res = rw.rewrite(&mut tm, add).unwrap();
        // then-branch folded to the value 3
        assert_eq!(tm.kind(res), Kind::Ite);
        let three = tm.mk_bv_value_u64(bv8, 3).unwrap();
        assert_eq!(tm.child(res, 1), three);
    }

    #[test]
    fn fp_classification_folds() {
        let (mut tm, mut rw) = setup();
        let fp32 = tm.mk_fp_sort(8, 24);
        let nan = tm.mk_fp_nan(fp32).unwrap();
        let isnan = tm.mk_term(Kind::FpIsNan, &[nan], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, isnan).unwrap(), tm.mk_true());
        let inf = tm.mk_fp_pos_inf(fp32).unwrap();
        let isneg = tm.mk_term(Kind::FpIsNeg, &[inf], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, isneg).unwrap(), tm.mk_false());
    }

    #[test]
    fn fp_compare_folds_with_nan_and_zeros() {
        let (mut tm, mut rw) = setup();
        let fp32 = tm.mk_fp_sort(8, 24);
        let nan = tm.mk_fp_nan(fp32).unwrap();
        let one = tm
            .mk_fp_value_from_real(fp32, RoundingMode::Rne, "1")
            .unwrap();
        let le = tm.mk_term(Kind::FpLeq, &[nan, one], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, le).unwrap(), tm.mk_false());

        let pz = tm.mk_fp_pos_zero(fp32).unwrap();
        let nz = tm.mk_fp_neg_zero(fp32).unwrap();
        let eq = tm.mk_term(Kind::FpEq, &[pz, nz], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, eq).unwrap(), tm.mk_true());
    }
}
