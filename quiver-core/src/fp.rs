//! IEEE-754 floating-point values and rounding modes.
//!
//! An [`FpValue`] is the packed bit pattern of a floating-point number in a
//! `(exp_size, sig_size)` format, stored as a bit-vector of width
//! `exp_size + sig_size` (sign bit, exponent, stored significand). The term
//! layer needs literal construction, the special constants, classification
//! predicates and conversion from decimal/rational strings; arithmetic on
//! floating-point values is the bit-blaster's business and is not folded
//! here.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::fmt;

use crate::bv::BvValue;
use crate::error::{Error, Result};

/// IEEE-754 rounding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoundingMode {
    /// Round to nearest, ties to even.
    Rne,
    /// Round to nearest, ties away from zero.
    Rna,
    /// Round toward negative.
    Rtn,
    /// Round toward positive.
    Rtp,
    /// Round toward zero.
    Rtz,
}

impl RoundingMode {
    /// All five modes, in the SMT-LIB declaration order.
    pub const ALL: [RoundingMode; 5] = [
        RoundingMode::Rne,
        RoundingMode::Rna,
        RoundingMode::Rtn,
        RoundingMode::Rtp,
        RoundingMode::Rtz,
    ];

    /// SMT-LIB name.
    pub fn smt2_name(self) -> &'static str {
        match self {
            RoundingMode::Rne => "RNE",
            RoundingMode::Rna => "RNA",
            RoundingMode::Rtn => "RTN",
            RoundingMode::Rtp => "RTP",
            RoundingMode::Rtz => "RTZ",
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.smt2_name())
    }
}

/// A floating-point literal: format plus packed bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FpValue {
    exp_size: u64,
    sig_size: u64,
    bits: BvValue,
}

impl FpValue {
    /// Build from the packed bit pattern (width must be `exp + sig`).
    pub fn from_bits(exp_size: u64, sig_size: u64, bits: BvValue) -> Self {
        assert!(exp_size >= 2 && sig_size >= 2, "degenerate floating-point format");
        assert_eq!(
            bits.width(),
            exp_size + sig_size,
            "floating-point bit pattern width mismatch"
        );
        Self { exp_size, sig_size, bits }
    }

    /// Build from sign, exponent and stored-significand fields.
    ///
    /// `sign` has width 1, `exp` width `exp_size`, `sig` width
    /// `sig_size - 1` (the hidden bit is not stored).
    pub fn from_fields(sign: &BvValue, exp: &BvValue, sig: &BvValue) -> Self {
        assert_eq!(sign.width(), 1, "floating-point sign must be one bit");
        Self::from_bits(
            exp.width(),
            sig.width() + 1,
            sign.bvconcat(exp).bvconcat(sig),
        )
    }

    pub fn pos_zero(exp_size: u64, sig_size: u64) -> Self {
        Self::from_bits(exp_size, sig_size, BvValue::zero(exp_size + sig_size))
    }

    pub fn neg_zero(exp_size: u64, sig_size: u64) -> Self {
        let w = exp_size + sig_size;
        Self::from_bits(exp_size, sig_size, BvValue::min_signed(w))
    }

    pub fn pos_inf(exp_size: u64, sig_size: u64) -> Self {
        let sign = BvValue::zero(1);
        let exp = BvValue::ones(exp_size);
        let sig = BvValue::zero(sig_size - 1);
        Self::from_fields(&sign, &exp, &sig)
    }

    pub fn neg_inf(exp_size: u64, sig_size: u64) -> Self {
        let sign = BvValue::one(1);
        let exp = BvValue::ones(exp_size);
        let sig = BvValue::zero(sig_size - 1);
        Self::from_fields(&sign, &exp, &sig)
    }

    /// The canonical quiet NaN (all-ones exponent, MSB of the significand).
    pub fn nan(exp_size: u64, sig_size: u64) -> Self {
        let sign = BvValue::zero(1);
        let exp = BvValue::ones(exp_size);
        let sig = BvValue::min_signed(sig_size - 1);
        Self::from_fields(&sign, &exp, &sig)
    }

    pub fn exp_size(&self) -> u64 {
        self.exp_size
    }

    pub fn sig_size(&self) -> u64 {
        self.sig_size
    }

    /// The packed bit pattern.
    pub fn bits(&self) -> &BvValue {
        &self.bits
    }

    /// The sign bit as a width-1 bit-vector.
    pub fn sign(&self) -> BvValue {
        let w = self.bits.width();
        self.bits.slice(w - 1, w - 1)
    }

    /// The exponent field.
    pub fn exponent(&self) -> BvValue {
        let w = self.bits.width();
        self.bits.slice(w - 2, self.sig_size - 1)
    }

    /// The stored significand field (without hidden bit).
    pub fn significand(&self) -> BvValue {
        self.bits.slice(self.sig_size - 2, 0)
    }

    pub fn is_nan(&self) -> bool {
        self.exponent().is_ones() && !self.significand().is_zero()
    }

    pub fn is_inf(&self) -> bool {
        self.exponent().is_ones() && self.significand().is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.exponent().is_zero() && self.significand().is_zero()
    }

    pub fn is_subnormal(&self) -> bool {
        self.exponent().is_zero() && !self.significand().is_zero()
    }

    pub fn is_normal(&self) -> bool {
        !self.exponent().is_zero() && !self.exponent().is_ones()
    }

    pub fn is_neg(&self) -> bool {
        !self.sign().is_zero() && !self.is_nan()
    }

    pub fn is_pos(&self) -> bool {
        self.sign().is_zero() && !self.is_nan()
    }

    /// Convert a rational `num / den` (decimal integer strings, `num` may be
    /// signed) into this format under the given rounding mode.
    pub fn from_rational(
        exp_size: u64,
        sig_size: u64,
        rm: RoundingMode,
        num: &str,
        den: &str,
    ) -> Result<Self> {
        let (negative, num_digits) = match num.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, num),
        };
        let parse = |s: &str| {
            BigUint::parse_bytes(s.as_bytes(), 10).ok_or_else(|| Error::ValueParse {
                literal: s.to_string(),
                base: 10,
            })
        };
        let num = parse(num_digits)?;
        let den = parse(den)?;
        if den.is_zero() {
            return Err(Error::ValueParse {
                literal: "0".to_string(),
                base: 10,
            });
        }
        Ok(Self::round_rational(exp_size, sig_size, rm, negative, num, den))
    }

    /// Convert a decimal real string (`-12.25`, `3`, `0.5`) into this format.
    pub fn from_real(exp_size: u64, sig_size: u64, rm: RoundingMode, real: &str) -> Result<Self> {
        let (negative, digits) = match real.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, real),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(Error::ValueParse {
                literal: real.to_string(),
                base: 10,
            });
        }
        let mut joined = String::with_capacity(int_part.len() + frac_part.len());
        joined.push_str(if int_part.is_empty() { "0" } else { int_part });
        joined.push_str(frac_part);
        let num = BigUint::parse_bytes(joined.as_bytes(), 10).ok_or_else(|| Error::ValueParse {
            literal: real.to_string(),
            base: 10,
        })?;
        let den = BigUint::from(10u32).pow(frac_part.len() as u32);
        Ok(Self::round_rational(exp_size, sig_size, rm, negative, num, den))
    }

    /// Round `(-1)^negative * num / den` to the nearest representable value
    /// per `rm`. Handles normals, subnormals and overflow to infinity.
    fn round_rational(
        exp_size: u64,
        sig_size: u64,
        rm: RoundingMode,
        negative: bool,
        num: BigUint,
        den: BigUint,
    ) -> Self {
        if num.is_zero() {
            return if negative {
                Self::neg_zero(exp_size, sig_size)
            } else {
                Self::pos_zero(exp_size, sig_size)
            };
        }

        let bias: i64 = (1i64 << (exp_size - 1)) - 1;
        let p = sig_size; // precision incl. hidden bit
        let emin: i64 = 1 - bias;
        let emax: i64 = bias;

        // Find e with 2^e <= num/den < 2^(e+1).
        let mut e: i64 = num.bits() as i64 - den.bits() as i64;
        loop {
            // compare num/den with 2^e
            let ge = if e >= 0 {
                num >= (&den << e as u64)
            } else {
                (&num << (-e) as u64) >= den
            };
            if !ge {
                e -= 1;
                continue;
            }
            let lt_next = if e + 1 >= 0 {
                num < (&den << (e + 1) as u64)
            } else {
                (&num << (-(e + 1)) as u64) < den
            };
            if !lt_next {
                e += 1;
                continue;
            }
            break;
        }

        // Subnormal range rounds at a fixed exponent.
        let (target_e, stored_bits) = if e < emin {
            (emin, p - 1)
        } else {
            (e, p - 1)
        };

        // significand scaled to `stored_bits` fractional bits below 2^target_e
        let shift = stored_bits as i64 - target_e;
        let (scaled_num, scaled_den) = if shift >= 0 {
            (&num << shift as u64, den.clone())
        } else {
            (num.clone(), &den << (-shift) as u64)
        };
        let q = &scaled_num / &scaled_den;
        let r = &scaled_num % &scaled_den;

        let round_up = if r.is_zero() {
            false
        } else {
            match rm {
                RoundingMode::Rtz => false,
                RoundingMode::Rtp => !negative,
                RoundingMode::Rtn => negative,
                RoundingMode::Rne | RoundingMode::Rna => {
                    let twice = &r << 1u8;
                    match twice.cmp(&scaled_den) {
                        std::cmp::Ordering::Less => false,
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Equal => {
                            if rm == RoundingMode::Rna {
                                true
                            } else {
                                // ties to even
                                (&q & BigUint::one()) == BigUint::one()
                            }
                        }
                    }
                }
            }
        };
        let mut mantissa = if round_up { q + BigUint::one() } else { q };
        let mut exp = target_e;

        // Rounding may have carried into the next binade.
        let full = BigUint::one() << p;
        if mantissa >= full {
            mantissa >>= 1u8;
            exp += 1;
        }

        if exp > emax {
            return match (rm, negative) {
                (RoundingMode::Rtz, false) | (RoundingMode::Rtn, false) => {
                    Self::largest_normal(exp_size, sig_size, false)
                }
                (RoundingMode::Rtz, true) | (RoundingMode::Rtp, true) => {
                    Self::largest_normal(exp_size, sig_size, true)
                }
                (_, false) => Self::pos_inf(exp_size, sig_size),
                (_, true) => Self::neg_inf(exp_size, sig_size),
            };
        }

        let hidden = BigUint::one() << (p - 1);
        let (biased_exp, stored_sig) = if mantissa < hidden {
            // subnormal
            (BigUint::zero(), mantissa)
        } else {
            (BigUint::from((exp + bias) as u64), mantissa - hidden)
        };

        let sign = BvValue::from_bool(negative);
        let exp_bv = BvValue::new(exp_size, biased_exp);
        let sig_bv = BvValue::new(sig_size - 1, stored_sig);
        Self::from_fields(&sign, &exp_bv, &sig_bv)
    }

    fn largest_normal(exp_size: u64, sig_size: u64, negative: bool) -> Self {
        let sign = BvValue::from_bool(negative);
        let exp = BvValue::ones(exp_size).bvdec();
        let sig = BvValue::ones(sig_size - 1);
        Self::from_fields(&sign, &exp, &sig)
    }
}

impl fmt::Display for FpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(fp {} {} {})",
            self.sign().to_smt2(),
            self.exponent().to_smt2(),
            self.significand().to_smt2()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_bits(v: f32) -> FpValue {
        FpValue::from_bits(8, 24, BvValue::from_u64(32, u64::from(v.to_bits())))
    }

    #[test]
    fn specials_classify() {
        let pz = FpValue::pos_zero(8, 24);
        assert!(pz.is_zero() && pz.is_pos() && !pz.is_neg());
        let nz = FpValue::neg_zero(8, 24);
        assert!(nz.is_zero() && nz.is_neg());
        let inf = FpValue::pos_inf(8, 24);
        assert!(inf.is_inf() && !inf.is_nan());
        let nan = FpValue::nan(8, 24);
        assert!(nan.is_nan() && !nan.is_inf() && !nan.is_pos() && !nan.is_neg());
    }

    #[test]
    fn field_round_trip() {
        let v = f32_bits(-12.25);
        let rebuilt = FpValue::from_fields(&v.sign(), &v.exponent(), &v.significand());
        assert_eq!(v, rebuilt);
        assert!(v.is_normal());
        assert!(v.is_neg());
    }

    #[test]
    fn real_conversion_matches_f32() {
        for (s, v) in [
            ("1", 1.0f32),
            ("-12.25", -12.25),
            ("0.5", 0.5),
            ("3.14159265358979", std::f32::consts::PI),
            ("0.1", 0.1),
            ("123456789", 123456789.0),
        ] {
            let got = FpValue::from_real(8, 24, RoundingMode::Rne, s).unwrap();
            assert_eq!(got, f32_bits(v), "mismatch for {s}");
        }
    }

    #[test]
    fn rational_conversion_matches_f32() {
        let got = FpValue::from_rational(8, 24, RoundingMode::Rne, "1", "3").unwrap();
        assert_eq!(got, f32_bits(1.0 / 3.0));
        let got = FpValue::from_rational(8, 24, RoundingMode::Rne, "-2", "3").unwrap();
        assert_eq!(got, f32_bits(-2.0 / 3.0));
    }

    #[test]
    fn directed_rounding() {
        let up = FpValue::from_rational(8, 24, RoundingMode::Rtp, "1", "3").unwrap();
        let down = FpValue::from_rational(8, 24, RoundingMode::Rtn, "1", "3").unwrap();
        assert_ne!(up, down);
        assert_eq!(up.bits().uint() - down.bits().uint(), 1u32.into());
    }

    #[test]
    fn overflow_goes_to_infinity_or_max() {
        let huge = "1000000000000000000000000000000000000000";
        let inf = FpValue::from_real(8, 24, RoundingMode::Rne, huge).unwrap();
        assert!(inf.is_inf());
        let max = FpValue::from_real(8, 24, RoundingMode::Rtz, huge).unwrap();
        assert!(max.is_normal());
        assert_eq!(max, f32_bits(f32::MAX));
    }

    #[test]
    fn tiny_values_go_subnormal() {
        // 2^-140 is below the normal range of binary32
        let den = (BigUint::one() << 140u32).to_str_radix(10);
        let got = FpValue::from_rational(8, 24, RoundingMode::Rne, "1", &den).unwrap();
        assert!(got.is_subnormal());
        assert_eq!(got, f32_bits((2.0f64.powi(-140)) as f32));
    }
}
