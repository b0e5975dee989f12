//! Fixed-width bit-vector values.
//!
//! [`BvValue`] is an arbitrary-precision two's-complement bit-vector of a
//! fixed width `w >= 1`. All operations are bit-exact with respect to the
//! SMT-LIB bit-vector theory: overflow is modular, signed operators
//! interpret two's complement, and division/remainder follow the SMT-LIB
//! totalization (division by zero yields all-ones for `bvudiv`, `bvurem` by
//! zero yields the dividend, `bvsdiv`/`bvsrem`/`bvsmod` follow the signed
//! conventions).
//!
//! Width mismatches between operands and out-of-range bit indices are
//! programmer errors and panic with a diagnostic; they are never silently
//! resized.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// A fixed-width two's-complement bit-vector value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BvValue {
    width: u64,
    /// Invariant: `value < 2^width`.
    value: BigUint,
}

fn mask(width: u64) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

impl BvValue {
    /// Create a value from a `BigUint`, truncating to `width` bits.
    pub fn new(width: u64, value: BigUint) -> Self {
        assert!(width >= 1, "bit-vector width must be >= 1");
        Self {
            width,
            value: value & mask(width),
        }
    }

    /// The zero value of the given width.
    pub fn zero(width: u64) -> Self {
        Self::new(width, BigUint::zero())
    }

    /// The one value of the given width.
    pub fn one(width: u64) -> Self {
        Self::new(width, BigUint::one())
    }

    /// The all-ones value of the given width.
    pub fn ones(width: u64) -> Self {
        Self::new(width, mask(width))
    }

    /// The minimum signed value `1000...0`.
    pub fn min_signed(width: u64) -> Self {
        Self::new(width, BigUint::one() << (width - 1))
    }

    /// The maximum signed value `0111...1`.
    pub fn max_signed(width: u64) -> Self {
        let w = width;
        Self::new(w, mask(w) >> 1u8)
    }

    /// Create from a `u64`, truncating to `width` bits.
    pub fn from_u64(width: u64, value: u64) -> Self {
        Self::new(width, BigUint::from(value))
    }

    /// Create from an `i64`, wrapping two's complement into `width` bits.
    pub fn from_i64(width: u64, value: i64) -> Self {
        let b = BigInt::from(value);
        Self::from_bigint(width, &b)
    }

    /// Create from a `bool` as a width-1 value.
    pub fn from_bool(value: bool) -> Self {
        Self::from_u64(1, u64::from(value))
    }

    fn from_bigint(width: u64, value: &BigInt) -> Self {
        let modulus = BigInt::from(BigUint::one() << width);
        let mut v = value % &modulus;
        if v.sign() == Sign::Minus {
            v += &modulus;
        }
        let (_, mag) = v.into_parts();
        Self::new(width, mag)
    }

    /// Parse a numeric literal in the given base (2, 10 or 16).
    ///
    /// Base 10 accepts an optional leading `-`. A literal that does not fit
    /// into `width` bits is rejected.
    pub fn from_str_radix(width: u64, s: &str, base: u32) -> Result<Self> {
        assert!(
            base == 2 || base == 10 || base == 16,
            "unsupported bit-vector literal base {base}"
        );
        assert!(width >= 1, "bit-vector width must be >= 1");
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) if base == 10 => (true, rest),
            _ => (false, s),
        };
        if digits.is_empty() {
            return Err(Error::ValueParse {
                literal: s.to_string(),
                base,
            });
        }
        let magnitude =
            BigUint::parse_bytes(digits.as_bytes(), base).ok_or_else(|| Error::ValueParse {
                literal: s.to_string(),
                base,
            })?;
        let fits = if negative {
            // -2^(w-1) is the most negative representable value
            magnitude <= (BigUint::one() << (width - 1))
        } else {
            magnitude <= mask(width)
        };
        if !fits {
            return Err(Error::ValueOverflow {
                literal: s.to_string(),
                width,
            });
        }
        if negative {
            let int = -BigInt::from(magnitude);
            Ok(Self::from_bigint(width, &int))
        } else {
            Ok(Self::new(width, magnitude))
        }
    }

    /// The width in bits.
    pub fn width(&self) -> u64 {
        self.width
    }

    /// The unsigned integer value.
    pub fn uint(&self) -> &BigUint {
        &self.value
    }

    /// The signed (two's-complement) integer value.
    pub fn int(&self) -> BigInt {
        if self.msb() {
            BigInt::from(self.value.clone()) - BigInt::from(BigUint::one() << self.width)
        } else {
            BigInt::from(self.value.clone())
        }
    }

    /// The value as `u64` if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        self.value.to_u64()
    }

    /// Bit `i` (0 = least significant).
    pub fn bit(&self, i: u64) -> bool {
        assert!(i < self.width, "bit index {i} out of range for width {}", self.width);
        self.value.bit(i)
    }

    fn msb(&self) -> bool {
        self.bit(self.width - 1)
    }

    /// Number of leading zero bits.
    pub fn count_leading_zeros(&self) -> u64 {
        let used = self.value.bits();
        self.width - used
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_one(&self) -> bool {
        self.value.is_one()
    }

    pub fn is_ones(&self) -> bool {
        self.value == mask(self.width)
    }

    pub fn is_min_signed(&self) -> bool {
        self.value == (BigUint::one() << (self.width - 1))
    }

    pub fn is_max_signed(&self) -> bool {
        self.value == mask(self.width) >> 1u8
    }

    /// True iff the value is a power of two; returns the exponent.
    pub fn power_of_two(&self) -> Option<u64> {
        if self.is_zero() || self.value.count_ones() != 1 {
            None
        } else {
            Some(self.value.trailing_zeros().unwrap_or(0))
        }
    }

    fn check_width(&self, other: &Self, op: &str) {
        assert_eq!(
            self.width, other.width,
            "bit-vector width mismatch in {op}: {} vs {}",
            self.width, other.width
        );
    }

    /// Unsigned comparison usable as a total order over same-width values.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.check_width(other, "compare");
        self.value.cmp(&other.value)
    }

    /// Signed comparison.
    pub fn signed_compare(&self, other: &Self) -> Ordering {
        self.check_width(other, "signed_compare");
        self.int().cmp(&other.int())
    }

    /* ---- arithmetic ---- */

    pub fn bvadd(&self, other: &Self) -> Self {
        self.check_width(other, "bvadd");
        Self::new(self.width, &self.value + &other.value)
    }

    pub fn bvsub(&self, other: &Self) -> Self {
        self.check_width(other, "bvsub");
        self.bvadd(&other.bvneg())
    }

    pub fn bvmul(&self, other: &Self) -> Self {
        self.check_width(other, "bvmul");
        Self::new(self.width, &self.value * &other.value)
    }

    pub fn bvneg(&self) -> Self {
        if self.value.is_zero() {
            self.clone()
        } else {
            Self::new(self.width, (BigUint::one() << self.width) - &self.value)
        }
    }

    pub fn bvnot(&self) -> Self {
        Self {
            width: self.width,
            value: mask(self.width) ^ &self.value,
        }
    }

    pub fn bvinc(&self) -> Self {
        Self::new(self.width, &self.value + BigUint::one())
    }

    pub fn bvdec(&self) -> Self {
        self.bvsub(&Self::one(self.width))
    }

    /* ---- bitwise ---- */

    pub fn bvand(&self, other: &Self) -> Self {
        self.check_width(other, "bvand");
        Self {
            width: self.width,
            value: &self.value & &other.value,
        }
    }

    pub fn bvor(&self, other: &Self) -> Self {
        self.check_width(other, "bvor");
        Self {
            width: self.width,
            value: &self.value | &other.value,
        }
    }

    pub fn bvxor(&self, other: &Self) -> Self {
        self.check_width(other, "bvxor");
        Self {
            width: self.width,
            value: &self.value ^ &other.value,
        }
    }

    pub fn bvnand(&self, other: &Self) -> Self {
        self.bvand(other).bvnot()
    }

    pub fn bvnor(&self, other: &Self) -> Self {
        self.bvor(other).bvnot()
    }

    pub fn bvxnor(&self, other: &Self) -> Self {
        self.bvxor(other).bvnot()
    }

    /// `bvcomp`: width-1 value, 1 iff equal.
    pub fn bvcomp(&self, other: &Self) -> Self {
        self.check_width(other, "bvcomp");
        Self::from_bool(self.value == other.value)
    }

    /* ---- shifts ---- */

    fn shift_amount(&self) -> Option<u64> {
        // None means "at least the width", which saturates every shift
        let amount = self.value.to_u64()?;
        (amount < self.width).then_some(amount)
    }

    pub fn bvshl(&self, other: &Self) -> Self {
        self.check_width(other, "bvshl");
        match other.shift_amount() {
            Some(n) => Self::new(self.width, &self.value << n),
            None => Self::zero(self.width),
        }
    }

    pub fn bvshr(&self, other: &Self) -> Self {
        self.check_width(other, "bvshr");
        match other.shift_amount() {
            Some(n) => Self::new(self.width, &self.value >> n),
            None => Self::zero(self.width),
        }
    }

    pub fn bvashr(&self, other: &Self) -> Self {
        self.check_width(other, "bvashr");
        let fill = self.msb();
        match other.shift_amount() {
            Some(n) => {
                let mut shifted = &self.value >> n;
                if fill {
                    let fill_bits = mask(self.width) ^ mask(self.width - n);
                    shifted |= fill_bits;
                }
                Self::new(self.width, shifted)
            }
            None => {
                if fill {
                    Self::ones(self.width)
                } else {
                    Self::zero(self.width)
                }
            }
        }
    }

    /* ---- division ---- */

    pub fn bvudiv(&self, other: &Self) -> Self {
        self.check_width(other, "bvudiv");
        if other.is_zero() {
            Self::ones(self.width)
        } else {
            Self::new(self.width, &self.value / &other.value)
        }
    }

    pub fn bvurem(&self, other: &Self) -> Self {
        self.check_width(other, "bvurem");
        if other.is_zero() {
            self.clone()
        } else {
            Self::new(self.width, &self.value % &other.value)
        }
    }

    pub fn bvsdiv(&self, other: &Self) -> Self {
        self.check_width(other, "bvsdiv");
        if other.is_zero() {
            // SMT-LIB: (bvsdiv a 0) = a >= 0 ? ones : one
            return if self.msb() {
                Self::one(self.width)
            } else {
                Self::ones(self.width)
            };
        }
        let q = self.int() / other.int();
        Self::from_bigint(self.width, &q)
    }

    pub fn bvsrem(&self, other: &Self) -> Self {
        self.check_width(other, "bvsrem");
        if other.is_zero() {
            return self.clone();
        }
        let r = self.int() % other.int();
        Self::from_bigint(self.width, &r)
    }

    pub fn bvsmod(&self, other: &Self) -> Self {
        self.check_width(other, "bvsmod");
        if other.is_zero() {
            return self.clone();
        }
        let b = other.int();
        let mut r = self.int() % &b;
        if !r.is_zero() && r.sign() != b.sign() {
            r += &b;
        }
        Self::from_bigint(self.width, &r)
    }

    /* ---- structural ---- */

    /// Extract bits `hi..=lo`; result width is `hi - lo + 1`.
    pub fn slice(&self, hi: u64, lo: u64) -> Self {
        assert!(
            hi >= lo && hi < self.width,
            "extract indices [{hi}:{lo}] out of range for width {}",
            self.width
        );
        Self::new(hi - lo + 1, &self.value >> lo)
    }

    /// Concatenation; `self` provides the high bits.
    pub fn bvconcat(&self, other: &Self) -> Self {
        Self::new(
            self.width + other.width,
            (&self.value << other.width) | &other.value,
        )
    }

    pub fn zero_extend(&self, n: u64) -> Self {
        Self {
            width: self.width + n,
            value: self.value.clone(),
        }
    }

    pub fn sign_extend(&self, n: u64) -> Self {
        if self.msb() {
            let ext = (mask(self.width + n) ^ mask(self.width)) | &self.value;
            Self::new(self.width + n, ext)
        } else {
            self.zero_extend(n)
        }
    }

    pub fn repeat(&self, n: u64) -> Self {
        assert!(n >= 1, "repeat count must be >= 1");
        let mut res = self.clone();
        for _ in 1..n {
            res = res.bvconcat(self);
        }
        res
    }

    /// Rotate left by a constant amount.
    pub fn roli(&self, n: u64) -> Self {
        let n = n % self.width;
        if n == 0 {
            return self.clone();
        }
        let hi = self.slice(self.width - 1, self.width - n);
        let lo = self.slice(self.width - n - 1, 0).bvconcat(&hi);
        debug_assert_eq!(lo.width, self.width);
        lo
    }

    /// Rotate right by a constant amount.
    pub fn rori(&self, n: u64) -> Self {
        let n = n % self.width;
        self.roli(self.width - n)
    }

    /// Rotate left by another bit-vector's value modulo the width.
    pub fn bvrol(&self, other: &Self) -> Self {
        self.check_width(other, "bvrol");
        let n = (&other.value % BigUint::from(self.width)).to_u64().unwrap_or(0);
        self.roli(n)
    }

    /// Rotate right by another bit-vector's value modulo the width.
    pub fn bvror(&self, other: &Self) -> Self {
        self.check_width(other, "bvror");
        let n = (&other.value % BigUint::from(self.width)).to_u64().unwrap_or(0);
        self.rori(n)
    }

    /* ---- reductions ---- */

    pub fn redand(&self) -> bool {
        self.is_ones()
    }

    pub fn redor(&self) -> bool {
        !self.is_zero()
    }

    pub fn redxor(&self) -> bool {
        self.value.count_ones() % 2 == 1
    }

    /* ---- comparisons ---- */

    pub fn ult(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Less
    }

    pub fn ule(&self, other: &Self) -> bool {
        self.compare(other) != Ordering::Greater
    }

    pub fn ugt(&self, other: &Self) -> bool {
        other.ult(self)
    }

    pub fn uge(&self, other: &Self) -> bool {
        other.ule(self)
    }

    pub fn slt(&self, other: &Self) -> bool {
        self.signed_compare(other) == Ordering::Less
    }

    pub fn sle(&self, other: &Self) -> bool {
        self.signed_compare(other) != Ordering::Greater
    }

    pub fn sgt(&self, other: &Self) -> bool {
        other.slt(self)
    }

    pub fn sge(&self, other: &Self) -> bool {
        other.sle(self)
    }

    /* ---- overflow predicates ---- */

    pub fn uaddo(&self, other: &Self) -> bool {
        self.check_width(other, "uaddo");
        (&self.value + &other.value) > mask(self.width)
    }

    pub fn saddo(&self, other: &Self) -> bool {
        self.signed_out_of_range(self.int() + other.int(), other, "saddo")
    }

    pub fn usubo(&self, other: &Self) -> bool {
        self.check_width(other, "usubo");
        self.value < other.value
    }

    pub fn ssubo(&self, other: &Self) -> bool {
        self.signed_out_of_range(self.int() - other.int(), other, "ssubo")
    }

    pub fn umulo(&self, other: &Self) -> bool {
        self.check_width(other, "umulo");
        (&self.value * &other.value) > mask(self.width)
    }

    pub fn smulo(&self, other: &Self) -> bool {
        self.signed_out_of_range(self.int() * other.int(), other, "smulo")
    }

    pub fn sdivo(&self, other: &Self) -> bool {
        self.check_width(other, "sdivo");
        self.is_min_signed() && other.is_ones()
    }

    pub fn nego(&self) -> bool {
        self.is_min_signed()
    }

    fn signed_out_of_range(&self, result: BigInt, other: &Self, op: &str) -> bool {
        self.check_width(other, op);
        let max = BigInt::from(BigUint::one() << (self.width - 1)) - 1;
        let min = -BigInt::from(BigUint::one() << (self.width - 1));
        result > max || result < min
    }

    /* ---- in-place mutators ---- */

    pub fn ibvinc(&mut self) {
        *self = self.bvinc();
    }

    pub fn ibvdec(&mut self) {
        *self = self.bvdec();
    }

    pub fn ibvadd(&mut self, other: &Self) {
        *self = self.bvadd(other);
    }

    pub fn ibvsub(&mut self, other: &Self) {
        *self = self.bvsub(other);
    }

    pub fn ibvmul(&mut self, other: &Self) {
        *self = self.bvmul(other);
    }

    pub fn ibvand(&mut self, other: &Self) {
        *self = self.bvand(other);
    }

    /* ---- printing ---- */

    /// Render in the given base (2, 10, 16). Base 2 pads to the width; base
    /// 16 is only used for widths divisible by four.
    pub fn to_string_radix(&self, base: u32) -> String {
        match base {
            2 => {
                let digits = self.value.to_str_radix(2);
                let mut s = String::with_capacity(self.width as usize);
                for _ in digits.len() as u64..self.width {
                    s.push('0');
                }
                s.push_str(&digits);
                s
            }
            10 => self.value.to_str_radix(10),
            16 => {
                let digits = self.value.to_str_radix(16);
                let nibbles = self.width.div_ceil(4);
                let mut s = String::with_capacity(nibbles as usize);
                for _ in digits.len() as u64..nibbles {
                    s.push('0');
                }
                s.push_str(&digits);
                s
            }
            _ => panic!("unsupported bit-vector print base {base}"),
        }
    }

    /// SMT-LIB literal syntax (`#b...` or `#x...` when the width allows).
    pub fn to_smt2(&self) -> String {
        if self.width % 4 == 0 {
            format!("#x{}", self.to_string_radix(16))
        } else {
            format!("#b{}", self.to_string_radix(2))
        }
    }
}

impl fmt::Debug for BvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BvValue({}'{})", self.width, self.to_string_radix(2))
    }
}

impl fmt::Display for BvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_smt2())
    }
}
