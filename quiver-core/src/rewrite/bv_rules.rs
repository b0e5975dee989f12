//! Bit-vector rewriting: constant folding and algebraic reductions.

use smallvec::SmallVec;

use crate::ast::{Kind, TermId, TermManager};
use crate::bv::BvValue;
use crate::error::Result;
use crate::fp::FpValue;

/// Clone the bit-vector values of all children, if every child is a value.
fn bv_args(tm: &TermManager, t: TermId) -> Option<SmallVec<[BvValue; 3]>> {
    let mut out = SmallVec::new();
    for &c in tm.children(t) {
        out.push(tm.bv_value(c)?.clone());
    }
    Some(out)
}

/// Fold operators whose operands are all values.
pub(super) fn fold_values(tm: &mut TermManager, t: TermId) -> Result<Option<TermId>> {
    use Kind::*;
    let kind = tm.kind(t);
    let res = match kind {
        BvAdd | BvSub | BvMul | BvAnd | BvOr | BvXor | BvNand | BvNor | BvXnor | BvShl | BvShr
        | BvAshr | BvUdiv | BvUrem | BvSdiv | BvSrem | BvSmod | BvConcat | BvComp | BvRol
        | BvRor => {
            let Some(v) = bv_args(tm, t) else { return Ok(None) };
            let (a, b) = (&v[0], &v[1]);
            let value = match kind {
                BvAdd => a.bvadd(b),
                BvSub => a.bvsub(b),
                BvMul => a.bvmul(b),
                BvAnd => a.bvand(b),
                BvOr => a.bvor(b),
                BvXor => a.bvxor(b),
                BvNand => a.bvnand(b),
                BvNor => a.bvnor(b),
                BvXnor => a.bvxnor(b),
                BvShl => a.bvshl(b),
                BvShr => a.bvshr(b),
                BvAshr => a.bvashr(b),
                BvUdiv => a.bvudiv(b),
                BvUrem => a.bvurem(b),
                BvSdiv => a.bvsdiv(b),
                BvSrem => a.bvsrem(b),
                BvSmod => a.bvsmod(b),
                BvConcat => a.bvconcat(b),
                BvComp => a.bvcomp(b),
                BvRol => a.bvrol(b),
                BvRor => a.bvror(b),
                _ => unreachable!(),
            };
            Some(tm.mk_bv_val(value))
        }

        BvNeg | BvNot | BvInc | BvDec => {
            let Some(v) = bv_args(tm, t) else { return Ok(None) };
            let value = match kind {
                BvNeg => v[0].bvneg(),
                BvNot => v[0].bvnot(),
                BvInc => v[0].bvinc(),
                BvDec => v[0].bvdec(),
                _ => unreachable!(),
            };
            Some(tm.mk_bv_val(value))
        }

        BvRedand | BvRedor | BvRedxor => {
            let Some(v) = bv_args(tm, t) else { return Ok(None) };
            let bit = match kind {
                BvRedand => v[0].redand(),
                BvRedor => v[0].redor(),
                BvRedxor => v[0].redxor(),
                _ => unreachable!(),
            };
            Some(tm.mk_bv_val(BvValue::from_bool(bit)))
        }

        BvUlt | BvUle | BvUgt | BvUge | BvSlt | BvSle | BvSgt | BvSge | BvUaddo | BvSaddo
        | BvUsubo | BvSsubo | BvUmulo | BvSmulo | BvSdivo => {
            let Some(v) = bv_args(tm, t) else { return Ok(None) };
            let (a, b) = (&v[0], &v[1]);
            let holds = match kind {
                BvUlt => a.ult(b),
                BvUle => a.ule(b),
                BvUgt => a.ugt(b),
                BvUge => a.uge(b),
                BvSlt => a.slt(b),
                BvSle => a.sle(b),
                BvSgt => a.sgt(b),
                BvSge => a.sge(b),
                BvUaddo => a.uaddo(b),
                BvSaddo => a.saddo(b),
                BvUsubo => a.usubo(b),
                BvSsubo => a.ssubo(b),
                BvUmulo => a.umulo(b),
                BvSmulo => a.smulo(b),
                BvSdivo => a.sdivo(b),
                _ => unreachable!(),
            };
            Some(tm.mk_bool(holds))
        }

        BvExtract | BvRepeat | BvRoli | BvRori | BvSignExtend | BvZeroExtend => {
            let Some(v) = bv_args(tm, t) else { return Ok(None) };
            let idx: SmallVec<[u64; 2]> = tm.indices(t).iter().copied().collect();
            let value = match kind {
                BvExtract => v[0].slice(idx[0], idx[1]),
                BvRepeat => v[0].repeat(idx[0]),
                BvRoli => v[0].roli(idx[0]),
                BvRori => v[0].rori(idx[0]),
                BvSignExtend => v[0].sign_extend(idx[0]),
                BvZeroExtend => v[0].zero_extend(idx[0]),
                _ => unreachable!(),
            };
            Some(tm.mk_bv_val(value))
        }

        FpFp => {
            let Some(v) = bv_args(tm, t) else { return Ok(None) };
            Some(tm.mk_fp_val(FpValue::from_fields(&v[0], &v[1], &v[2])))
        }

        FpToFpFromBv => {
            let Some(v) = bv_args(tm, t) else { return Ok(None) };
            let idx = tm.indices(t);
            Some(tm.mk_fp_val(FpValue::from_bits(idx[0], idx[1], v[0].clone())))
        }

        _ => None,
    };
    Ok(res)
}

/// Algebraic bit-vector identities on partially symbolic operands.
pub(super) fn apply(tm: &mut TermManager, t: TermId, level: u8) -> Result<Option<TermId>> {
    use Kind::*;
    let kind = tm.kind(t);
    let res: Option<TermId> = match kind {
        BvAdd => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if is_zero(tm, a) {
                Some(b)
            } else if is_zero(tm, b) {
                Some(a)
            } else {
                None
            }
        }

        BvSub => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if a == b {
                let w = tm.bv_width(t);
                Some(tm.mk_bv_val(BvValue::zero(w)))
            } else if is_zero(tm, b) {
                Some(a)
            } else {
                // canonical: subtraction becomes addition of the negation so
                // that additive chains flatten uniformly
                let neg = tm.mk_term(BvNeg, &[b], &[])?;
                Some(tm.mk_term(BvAdd, &[a, neg], &[])?)
            }
        }

        BvMul => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if is_zero(tm, a) || is_zero(tm, b) {
                let w = tm.bv_width(t);
                Some(tm.mk_bv_val(BvValue::zero(w)))
            } else if is_one(tm, a) {
                Some(b)
            } else if is_one(tm, b) {
                Some(a)
            } else if level >= 3 {
                // speculative: distribute a value factor over an addition
                distribute_value_mul(tm, a, b)?
            } else {
                None
            }
        }

        BvAnd => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if a == b {
                Some(a)
            } else if is_zero(tm, a) || is_zero(tm, b) {
                let w = tm.bv_width(t);
                Some(tm.mk_bv_val(BvValue::zero(w)))
            } else if is_ones(tm, a) {
                Some(b)
            } else if is_ones(tm, b) {
                Some(a)
            } else {
                None
            }
        }

        BvOr => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if a == b {
                Some(a)
            } else if is_ones(tm, a) || is_ones(tm, b) {
                let w = tm.bv_width(t);
                Some(tm.mk_bv_val(BvValue::ones(w)))
            } else if is_zero(tm, a) {
                Some(b)
            } else if is_zero(tm, b) {
                Some(a)
            } else {
                None
            }
        }

        BvXor => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if a == b {
                let w = tm.bv_width(t);
                Some(tm.mk_bv_val(BvValue::zero(w)))
            } else if is_zero(tm, a) {
                Some(b)
            } else if is_zero(tm, b) {
                Some(a)
            } else if is_ones(tm, b) {
                Some(tm.mk_term(BvNot, &[a], &[])?)
            } else if is_ones(tm, a) {
                Some(tm.mk_term(BvNot, &[b], &[])?)
            } else {
                None
            }
        }

        // canonical: the composed bitwise kinds reduce to their cores
        BvNand => {
            let and = tm.mk_term(BvAnd, &[tm.child(t, 0), tm.child(t, 1)], &[])?;
            Some(tm.mk_term(BvNot, &[and], &[])?)
        }
        BvNor => {
            let or = tm.mk_term(BvOr, &[tm.child(t, 0), tm.child(t, 1)], &[])?;
            Some(tm.mk_term(BvNot, &[or], &[])?)
        }
        BvXnor => {
            let xor = tm.mk_term(BvXor, &[tm.child(t, 0), tm.child(t, 1)], &[])?;
            Some(tm.mk_term(BvNot, &[xor], &[])?)
        }

        BvNot => {
            let a = tm.child(t, 0);
            if tm.kind(a) == BvNot {
                Some(tm.child(a, 0))
            } else {
                None
            }
        }

        BvNeg => {
            let a = tm.child(t, 0);
            if tm.kind(a) == BvNeg {
                Some(tm.child(a, 0))
            } else {
                None
            }
        }

        // canonical: increment/decrement become additions
        BvInc => {
            let w = tm.bv_width(t);
            let one = tm.mk_bv_val(BvValue::one(w));
            Some(tm.mk_term(BvAdd, &[tm.child(t, 0), one], &[])?)
        }
        BvDec => {
            let w = tm.bv_width(t);
            let ones = tm.mk_bv_val(BvValue::ones(w));
            Some(tm.mk_term(BvAdd, &[tm.child(t, 0), ones], &[])?)
        }

        BvShl | BvShr => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            let w = tm.bv_width(t);
            if is_zero(tm, b) {
                Some(a)
            } else if is_zero(tm, a) {
                Some(a)
            } else if let Some(v) = tm.bv_value(b) {
                if v.uint() >= &num_bigint::BigUint::from(w) {
                    Some(tm.mk_bv_val(BvValue::zero(w)))
                } else {
                    None
                }
            } else {
                None
            }
        }

        BvAshr => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if is_zero(tm, b) || is_zero(tm, a) {
                Some(a)
            } else {
                None
            }
        }

        BvUdiv => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if is_one(tm, b) {
                Some(a)
            } else {
                None
            }
        }

        BvUrem => {
            let b = tm.child(t, 1);
            if is_one(tm, b) {
                let w = tm.bv_width(t);
                Some(tm.mk_bv_val(BvValue::zero(w)))
            } else {
                None
            }
        }

        BvSdiv => {
            let b = tm.child(t, 1);
            if is_one(tm, b) {
                Some(tm.child(t, 0))
            } else {
                None
            }
        }

        // canonical: strict/non-strict "greater" orientations flip
        BvUgt => Some(tm.mk_term(BvUlt, &[tm.child(t, 1), tm.child(t, 0)], &[])?),
        BvUge => Some(tm.mk_term(BvUle, &[tm.child(t, 1), tm.child(t, 0)], &[])?),
        BvSgt => Some(tm.mk_term(BvSlt, &[tm.child(t, 1), tm.child(t, 0)], &[])?),
        BvSge => Some(tm.mk_term(BvSle, &[tm.child(t, 1), tm.child(t, 0)], &[])?),

        BvUlt => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if a == b || is_zero(tm, b) {
                Some(tm.mk_false())
            } else if level >= 2 && is_zero(tm, a) {
                // 0 < x is x != 0
                let eq = tm.mk_eq(a, b)?;
                Some(tm.mk_not(eq)?)
            } else {
                None
            }
        }

        BvUle => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if a == b || is_zero(tm, a) || is_ones(tm, b) {
                Some(tm.mk_true())
            } else {
                None
            }
        }

        BvSlt => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if a == b {
                Some(tm.mk_false())
            } else {
                None
            }
        }

        BvSle => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if a == b {
                Some(tm.mk_true())
            } else {
                None
            }
        }

        BvComp => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if a == b {
                Some(tm.mk_bv_val(BvValue::one(1)))
            } else {
                None
            }
        }

        BvExtract => {
            let a = tm.child(t, 0);
            let (hi, lo) = (tm.index(t, 0), tm.index(t, 1));
            let w = tm.bv_width(a);
            if lo == 0 && hi == w - 1 {
                Some(a)
            } else if tm.kind(a) == BvExtract {
                // extract of extract coalesces
                let inner_lo = tm.index(a, 1);
                Some(tm.mk_term(
                    BvExtract,
                    &[tm.child(a, 0)],
                    &[hi + inner_lo, lo + inner_lo],
                )?)
            } else if level >= 2 && tm.kind(a) == BvConcat {
                let (c0, c1) = (tm.child(a, 0), tm.child(a, 1));
                let w1 = tm.bv_width(c1);
                if hi < w1 {
                    Some(tm.mk_term(BvExtract, &[c1], &[hi, lo])?)
                } else if lo >= w1 {
                    Some(tm.mk_term(BvExtract, &[c0], &[hi - w1, lo - w1])?)
                } else {
                    None
                }
            } else if level >= 2
                && matches!(tm.kind(a), BvZeroExtend | BvSignExtend)
                && hi < tm.bv_width(tm.child(a, 0))
            {
                // the extension bits are not touched
                Some(tm.mk_term(BvExtract, &[tm.child(a, 0)], &[hi, lo])?)
            } else {
                None
            }
        }

        BvConcat => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if level >= 2 && tm.kind(a) == BvExtract && tm.kind(b) == BvExtract {
                // adjacent slices of the same term coalesce
                let base = tm.child(a, 0);
                if base == tm.child(b, 0) && tm.index(a, 1) == tm.index(b, 0) + 1 {
                    Some(tm.mk_term(BvExtract, &[base], &[tm.index(a, 0), tm.index(b, 1)])?)
                } else {
                    None
                }
            } else {
                None
            }
        }

        BvZeroExtend | BvSignExtend => {
            if tm.index(t, 0) == 0 {
                Some(tm.child(t, 0))
            } else {
                None
            }
        }

        BvRepeat => {
            if tm.index(t, 0) == 1 {
                Some(tm.child(t, 0))
            } else {
                None
            }
        }

        BvRoli | BvRori => {
            let w = tm.bv_width(t);
            if tm.index(t, 0) % w == 0 {
                Some(tm.child(t, 0))
            } else {
                None
            }
        }

        BvRol | BvRor => {
            // rotation by a known amount becomes an indexed rotation
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if let Some(v) = tm.bv_value(b) {
                let w = tm.bv_width(t);
                let n = (v.uint() % num_bigint::BigUint::from(w))
                    .try_into()
                    .unwrap_or(0u64);
                let indexed = if kind == BvRol { BvRoli } else { BvRori };
                Some(tm.mk_term(indexed, &[a], &[n])?)
            } else {
                None
            }
        }

        _ => None,
    };
    Ok(res)
}

fn distribute_value_mul(tm: &mut TermManager, a: TermId, b: TermId) -> Result<Option<TermId>> {
    use Kind::*;
    let (val, other) = if tm.is_value(a) {
        (a, b)
    } else if tm.is_value(b) {
        (b, a)
    } else {
        return Ok(None);
    };
    if tm.kind(other) != BvAdd {
        return Ok(None);
    }
    let (x, y) = (tm.child(other, 0), tm.child(other, 1));
    let mx = tm.mk_term(BvMul, &[val, x], &[])?;
    let my = tm.mk_term(BvMul, &[val, y], &[])?;
    Ok(Some(tm.mk_term(BvAdd, &[mx, my], &[])?))
}

fn is_zero(tm: &TermManager, t: TermId) -> bool {
    tm.bv_value(t).is_some_and(BvValue::is_zero)
}

fn is_one(tm: &TermManager, t: TermId) -> bool {
    tm.bv_value(t).is_some_and(BvValue::is_one)
}

fn is_ones(tm: &TermManager, t: TermId) -> bool {
    tm.bv_value(t).is_some_and(BvValue::is_ones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::Rewriter;

    fn setup() -> (TermManager, Rewriter) {
        (TermManager::new(), Rewriter::new(2))
    }

    #[test]
    fn neutral_and_annihilating_elements() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let zero = tm.mk_bv_zero(bv8).unwrap();
        let one = tm.mk_bv_one(bv8).unwrap();
        let ones = tm.mk_bv_ones(bv8).unwrap();

        let cases = [
            (tm.mk_term(Kind::BvAdd, &[x, zero], &[]).unwrap(), x),
            (tm.mk_term(Kind::BvMul, &[x, one], &[]).unwrap(), x),
            (tm.mk_term(Kind::BvMul, &[x, zero], &[]).unwrap(), zero),
            (tm.mk_term(Kind::BvAnd, &[x, zero], &[]).unwrap(), zero),
            (tm.mk_term(Kind::BvAnd, &[x, ones], &[]).unwrap(), x),
            (tm.mk_term(Kind::BvAnd, &[x, x], &[]).unwrap(), x),
            (tm.mk_term(Kind::BvOr, &[x, zero], &[]).unwrap(), x),
            (tm.mk_term(Kind::BvXor, &[x, x], &[]).unwrap(), zero),
            (tm.mk_term(Kind::BvShl, &[x, zero], &[]).unwrap(), x),
            (tm.mk_term(Kind::BvUdiv, &[x, one], &[]).unwrap(), x),
        ];
        for (input, expected) in cases {
            assert_eq!(rw.rewrite(&mut tm, input).unwrap(), expected);
        }
    }

    #[test]
    fn shift_by_width_is_zero() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let eight = tm.mk_bv_value_u64(bv8, 8).unwrap();
        let zero = tm.mk_bv_zero(bv8).unwrap();
        let shl = tm.mk_term(Kind::BvShl, &[x, eight], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, shl).unwrap(), zero);
    }

    #[test]
    fn sub_becomes_add_of_negation() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let y = tm.mk_const(bv8, Some("y")).unwrap();
        let sub = tm.mk_term(Kind::BvSub, &[x, y], &[]).unwrap();
        let res = rw.rewrite(&mut tm, sub).unwrap();
        let neg_y = tm.mk_term(Kind::BvNeg, &[y], &[]).unwrap();
        assert_eq!(res, tm.mk_term(Kind::BvAdd, &[x, neg_y], &[]).unwrap());
    }

    #[test]
    fn double_negations_cancel() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let nn = {
            let n = tm.mk_term(Kind::BvNot, &[x], &[]).unwrap();
            tm.mk_term(Kind::BvNot, &[n], &[]).unwrap()
        };
        assert_eq!(rw.rewrite(&mut tm, nn).unwrap(), x);
    }

    #[test]
    fn extract_identities() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let full = tm.mk_term(Kind::BvExtract, &[x], &[7, 0]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, full).unwrap(), x);

        let outer = {
            let inner = tm.mk_term(Kind::BvExtract, &[x], &[6, 2]).unwrap();
            tm.mk_term(Kind::BvExtract, &[inner], &[3, 1]).unwrap()
        };
        let coalesced = tm.mk_term(Kind::BvExtract, &[x], &[5, 3]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, outer).unwrap(), coalesced);

        // hi:lo slices of the same base merge across concat
        let hi = tm.mk_term(Kind::BvExtract, &[x], &[7, 4]).unwrap();
        let lo = tm.mk_term(Kind::BvExtract, &[x], &[3, 1]).unwrap();
        let cat = tm.mk_term(Kind::BvConcat, &[hi, lo], &[]).unwrap();
        let merged = tm.mk_term(Kind::BvExtract, &[x], &[7, 1]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, cat).unwrap(), merged);
    }

    #[test]
    fn comparisons_canonicalize() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let y = tm.mk_const(bv8, Some("y")).unwrap();
        let gt = tm.mk_term(Kind::BvUgt, &[x, y], &[]).unwrap();
        let lt = tm.mk_term(Kind::BvUlt, &[y, x], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, gt).unwrap(), lt);
        let same = tm.mk_term(Kind::BvUlt, &[x, x], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, same).unwrap(), tm.mk_false());
    }

    #[test]
    fn rotation_by_value_becomes_indexed() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let nine = tm.mk_bv_value_u64(bv8, 9).unwrap();
        let rol = tm.mk_term(Kind::BvRol, &[x, nine], &[]).unwrap();
        let roli = tm.mk_term(Kind::BvRoli, &[x], &[1]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, rol).unwrap(), roli);
    }

    #[test]
    fn value_folding_matches_semantics() {
        let (mut tm, mut rw) = setup();
        let bv8 = tm.mk_bv_sort(8);
        let a = tm.mk_bv_value_u64(bv8, 0xF0).unwrap();
        let b = tm.mk_bv_value_u64(bv8, 0x0F).unwrap();
        let or = tm.mk_term(Kind::BvOr, &[a, b], &[]).unwrap();
        let ones = tm.mk_bv_ones(bv8).unwrap();
        assert_eq!(rw.rewrite(&mut tm, or).unwrap(), ones);

        let cmp = tm.mk_term(Kind::BvUlt, &[b, a], &[]).unwrap();
        assert_eq!(rw.rewrite(&mut tm, cmp).unwrap(), tm.mk_true());
    }
}
