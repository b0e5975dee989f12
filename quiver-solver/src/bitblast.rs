//! Term to AIG translation.
//!
//! Bit-vector terms lower to per-bit AIG references (LSB first), Boolean
//! terms to a single reference. Free constants become primary inputs and are
//! recorded so that the ground solver can read their values back out of a
//! satisfying oracle assignment.
//!
//! Kinds outside the Bool/BV fragment (floating-point arithmetic, arrays and
//! function applications that survived preprocessing, quantifiers) either
//! abort the translation or, in *abstraction mode*, become fresh inputs.
//! Abstraction mode is only used for gate counting, never for solving.

use rustc_hash::FxHashMap;

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::bv::BvValue;
use quiver_core::error::{Error, Result};

use crate::aig::{Aig, AigRef};

/// Blasted form of a term.
#[derive(Debug, Clone)]
pub enum Bits {
    Bool(AigRef),
    /// Bit-vector bits, least significant first.
    Vec(Vec<AigRef>),
}

impl Bits {
    fn as_bool(&self) -> Result<AigRef> {
        match self {
            Bits::Bool(r) => Ok(*r),
            Bits::Vec(_) => Err(Error::Unsupported("expected a Boolean term".to_string())),
        }
    }

    fn as_vec(&self) -> Result<&[AigRef]> {
        match self {
            Bits::Vec(v) => Ok(v),
            Bits::Bool(_) => Err(Error::Unsupported("expected a bit-vector term".to_string())),
        }
    }
}

/// Term-to-AIG translator with a persistent node map.
pub struct Bitblaster {
    pub aig: Aig,
    map: FxHashMap<TermId, Bits>,
    /// Primary inputs per free constant (single entry for Booleans).
    inputs: FxHashMap<TermId, Vec<AigRef>>,
    abstract_unsupported: bool,
}

impl Bitblaster {
    pub fn new() -> Self {
        Self {
            aig: Aig::new(),
            map: FxHashMap::default(),
            inputs: FxHashMap::default(),
            abstract_unsupported: false,
        }
    }

    /// A blaster that abstracts unsupported nodes as fresh inputs; used for
    /// gate counting only.
    pub fn for_counting() -> Self {
        let mut b = Self::new();
        b.abstract_unsupported = true;
        b
    }

    /// The primary inputs allocated for free constants.
    pub fn inputs(&self) -> &FxHashMap<TermId, Vec<AigRef>> {
        &self.inputs
    }

    /// Blast a Boolean term to a single AIG reference.
    pub fn blast_bool(&mut self, tm: &TermManager, t: TermId) -> Result<AigRef> {
        self.blast(tm, t)?.as_bool()
    }

    /// Blast any Bool/BV term.
    pub fn blast(&mut self, tm: &TermManager, root: TermId) -> Result<Bits> {
        let mut visit = vec![root];
        while let Some(&cur) = visit.last() {
            if self.map.contains_key(&cur) {
                visit.pop();
                continue;
            }
            if !self.supported(tm, cur) {
                // opaque node: fresh inputs, children not visited
                let bits = self.fresh_for(tm, cur)?;
                self.map.insert(cur, bits);
                visit.pop();
                continue;
            }
            let pending: Vec<TermId> = tm
                .children(cur)
                .iter()
                .copied()
                .filter(|c| !self.map.contains_key(c))
                .collect();
            if !pending.is_empty() {
                visit.extend(pending);
                continue;
            }
            visit.pop();
            let bits = self.blast_node(tm, cur)?;
            self.map.insert(cur, bits);
        }
        Ok(self.map[&root].clone())
    }

    fn supported(&self, tm: &TermManager, t: TermId) -> bool {
        let kind = tm.kind(t);
        let sort = tm.sort(tm.sort_of(t));
        match kind {
            Kind::Value | Kind::Const => sort.is_bool() || sort.is_bv(),
            Kind::Equal => {
                let cs = tm.sort(tm.sort_of(tm.child(t, 0)));
                cs.is_bool() || cs.is_bv()
            }
            Kind::And
            | Kind::Or
            | Kind::Not
            | Kind::Xor
            | Kind::Iff
            | Kind::Implies
            | Kind::Ite => sort.is_bool() || sort.is_bv(),
            k if k.is_bv() => true,
            Kind::BvUlt | Kind::BvUle | Kind::BvUgt | Kind::BvUge | Kind::BvSlt | Kind::BvSle
            | Kind::BvSgt | Kind::BvSge | Kind::BvUaddo | Kind::BvSaddo | Kind::BvUsubo
            | Kind::BvSsubo | Kind::BvUmulo | Kind::BvSmulo | Kind::BvSdivo | Kind::BvSub => true,
            _ => false,
        }
    }

    fn fresh_for(&mut self, tm: &TermManager, t: TermId) -> Result<Bits> {
        let sort = tm.sort(tm.sort_of(t));
        if !self.abstract_unsupported && !matches!(tm.kind(t), Kind::Const | Kind::Value) {
            return Err(Error::Unsupported(format!(
                "cannot bit-blast {} term",
                tm.kind(t)
            )));
        }
        if sort.is_bool() {
            let v = self.aig.new_var();
            self.inputs.insert(t, vec![v]);
            Ok(Bits::Bool(v))
        } else if sort.is_bv() {
            let w = sort.bv_size() as usize;
            let bits: Vec<AigRef> = (0..w).map(|_| self.aig.new_var()).collect();
            self.inputs.insert(t, bits.clone());
            Ok(Bits::Vec(bits))
        } else if self.abstract_unsupported {
            // non-bitvector abstraction: a single opaque input
            let v = self.aig.new_var();
            self.inputs.insert(t, vec![v]);
            Ok(Bits::Bool(v))
        } else {
            Err(Error::Unsupported(format!(
                "cannot bit-blast term of sort {:?}",
                sort
            )))
        }
    }

    fn blast_node(&mut self, tm: &TermManager, t: TermId) -> Result<Bits> {
        use Kind::*;
        let kind = tm.kind(t);
        match kind {
            Value => {
                if let Some(b) = tm.bool_value(t) {
                    Ok(Bits::Bool(self.aig.from_bool(b)))
                } else if let Some(v) = tm.bv_value(t) {
                    Ok(Bits::Vec(self.value_bits(v)))
                } else {
                    self.fresh_for(tm, t)
                }
            }
            Const => self.fresh_for(tm, t),

            Not => {
                let a = self.bits(t, tm, 0)?.as_bool()?;
                Ok(Bits::Bool(a.negate()))
            }
            And | Or => {
                let mut refs = Vec::with_capacity(tm.num_children(t));
                for i in 0..tm.num_children(t) {
                    refs.push(self.bits(t, tm, i)?.as_bool()?);
                }
                let r = if kind == And {
                    self.aig.and_many(&refs)
                } else {
                    self.aig.or_many(&refs)
                };
                Ok(Bits::Bool(r))
            }
            Xor | Iff | Implies => {
                let a = self.bits(t, tm, 0)?.as_bool()?;
                let b = self.bits(t, tm, 1)?.as_bool()?;
                let r = match kind {
                    Xor => self.aig.xor2(a, b),
                    Iff => self.aig.iff2(a, b),
                    _ => self.aig.or2(a.negate(), b),
                };
                Ok(Bits::Bool(r))
            }

            Equal => {
                let a = self.bits(t, tm, 0)?;
                let b = self.bits(t, tm, 1)?;
                let r = match (&a, &b) {
                    (Bits::Bool(x), Bits::Bool(y)) => self.aig.iff2(*x, *y),
                    (Bits::Vec(x), Bits::Vec(y)) => self.eq_vec(&x.clone(), &y.clone()),
                    _ => return Err(Error::Unsupported("ill-sorted equality".to_string())),
                };
                Ok(Bits::Bool(r))
            }

            Ite => {
                let c = self.bits(t, tm, 0)?.as_bool()?;
                let a = self.bits(t, tm, 1)?;
                let b = self.bits(t, tm, 2)?;
                match (a, b) {
                    (Bits::Bool(x), Bits::Bool(y)) => Ok(Bits::Bool(self.aig.ite(c, x, y))),
                    (Bits::Vec(x), Bits::Vec(y)) => Ok(Bits::Vec(self.mux_vec(c, &x, &y))),
                    _ => Err(Error::Unsupported("ill-sorted ite".to_string())),
                }
            }

            BvNot => {
                let a = self.vec_arg(tm, t, 0)?;
                Ok(Bits::Vec(a.iter().map(|r| r.negate()).collect()))
            }
            BvNeg => {
                let a = self.vec_arg(tm, t, 0)?;
                let inverted: Vec<AigRef> = a.iter().map(|r| r.negate()).collect();
                Ok(Bits::Vec(self.increment(&inverted)))
            }
            BvInc => {
                let a = self.vec_arg(tm, t, 0)?;
                Ok(Bits::Vec(self.increment(&a)))
            }
            BvDec => {
                let a = self.vec_arg(tm, t, 0)?;
                let ones = vec![self.aig.true_ref(); a.len()];
                let (sum, _) = self.add_vec(&a, &ones);
                Ok(Bits::Vec(sum))
            }

            BvAnd | BvOr | BvXor | BvNand | BvNor | BvXnor => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let mut out = Vec::with_capacity(a.len());
                for (&x, &y) in a.iter().zip(&b) {
                    let r = match kind {
                        BvAnd => self.aig.and2(x, y),
                        BvOr => self.aig.or2(x, y),
                        BvXor => self.aig.xor2(x, y),
                        BvNand => self.aig.and2(x, y).negate(),
                        BvNor => self.aig.or2(x, y).negate(),
                        BvXnor => self.aig.iff2(x, y),
                        _ => unreachable!(),
                    };
                    out.push(r);
                }
                Ok(Bits::Vec(out))
            }

            BvAdd => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let (sum, _) = self.add_vec(&a, &b);
                Ok(Bits::Vec(sum))
            }
            BvSub => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                Ok(Bits::Vec(self.sub_vec(&a, &b)))
            }
            BvMul => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                Ok(Bits::Vec(self.mul_vec(&a, &b)))
            }

            BvComp => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let eq = self.eq_vec(&a, &b);
                Ok(Bits::Vec(vec![eq]))
            }
            BvRedand | BvRedor | BvRedxor => {
                let a = self.vec_arg(tm, t, 0)?;
                let r = match kind {
                    BvRedand => self.aig.and_many(&a),
                    BvRedor => self.aig.or_many(&a),
                    _ => {
                        let mut acc = self.aig.false_ref();
                        for &bit in &a {
                            acc = self.aig.xor2(acc, bit);
                        }
                        acc
                    }
                };
                Ok(Bits::Vec(vec![r]))
            }

            BvUlt | BvUle | BvSlt | BvSle | BvUgt | BvUge | BvSgt | BvSge => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let r = match kind {
                    BvUlt => self.ult_vec(&a, &b),
                    BvUle => self.ult_vec(&b, &a).negate(),
                    BvUgt => self.ult_vec(&b, &a),
                    BvUge => self.ult_vec(&a, &b).negate(),
                    BvSlt => self.slt_vec(&a, &b),
                    BvSle => self.slt_vec(&b, &a).negate(),
                    BvSgt => self.slt_vec(&b, &a),
                    BvSge => self.slt_vec(&a, &b).negate(),
                    _ => unreachable!(),
                };
                Ok(Bits::Bool(r))
            }

            BvShl | BvShr | BvAshr => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                Ok(Bits::Vec(self.shift_vec(kind, &a, &b)))
            }

            BvUdiv | BvUrem => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let (q, r) = self.udivrem(&a, &b);
                let b_zero = self.is_zero_vec(&b);
                let out = if kind == BvUdiv {
                    let ones = vec![self.aig.true_ref(); a.len()];
                    self.mux_vec(b_zero, &ones, &q)
                } else {
                    self.mux_vec(b_zero, &a, &r)
                };
                Ok(Bits::Vec(out))
            }

            BvSdiv | BvSrem | BvSmod => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                Ok(Bits::Vec(self.signed_divrem(kind, &a, &b)))
            }

            BvConcat => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let mut out = b;
                out.extend(a);
                Ok(Bits::Vec(out))
            }
            BvExtract => {
                let a = self.vec_arg(tm, t, 0)?;
                let (hi, lo) = (tm.index(t, 0) as usize, tm.index(t, 1) as usize);
                Ok(Bits::Vec(a[lo..=hi].to_vec()))
            }
            BvZeroExtend | BvSignExtend => {
                let a = self.vec_arg(tm, t, 0)?;
                let n = tm.index(t, 0) as usize;
                let fill = if kind == BvZeroExtend {
                    self.aig.false_ref()
                } else {
                    *a.last().expect("width >= 1")
                };
                let mut out = a;
                out.extend(std::iter::repeat(fill).take(n));
                Ok(Bits::Vec(out))
            }
            BvRepeat => {
                let a = self.vec_arg(tm, t, 0)?;
                let n = tm.index(t, 0) as usize;
                let mut out = Vec::with_capacity(a.len() * n);
                for _ in 0..n {
                    out.extend(a.iter().copied());
                }
                Ok(Bits::Vec(out))
            }
            BvRoli | BvRori => {
                let a = self.vec_arg(tm, t, 0)?;
                let w = a.len();
                let n = (tm.index(t, 0) as usize) % w;
                let n = if kind == BvRori { (w - n) % w } else { n };
                // rotate left by n: out[i] = a[(i + w - n) % w]
                let out: Vec<AigRef> = (0..w).map(|i| a[(i + w - n) % w]).collect();
                Ok(Bits::Vec(out))
            }
            BvRol | BvRor => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                Ok(Bits::Vec(self.rotate_sym(kind == BvRol, &a, &b)))
            }

            BvUaddo => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let (_, carry) = self.add_vec(&a, &b);
                Ok(Bits::Bool(carry))
            }
            BvSaddo => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let (sum, _) = self.add_vec(&a, &b);
                let (sa, sb, ss) = (a[a.len() - 1], b[b.len() - 1], sum[sum.len() - 1]);
                let same = self.aig.iff2(sa, sb);
                let flipped = self.aig.xor2(sa, ss);
                Ok(Bits::Bool(self.aig.and2(same, flipped)))
            }
            BvUsubo => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                Ok(Bits::Bool(self.ult_vec(&a, &b)))
            }
            BvSsubo => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let diff = self.sub_vec(&a, &b);
                let (sa, sb, sd) = (a[a.len() - 1], b[b.len() - 1], diff[diff.len() - 1]);
                let differ = self.aig.xor2(sa, sb);
                let flipped = self.aig.xor2(sa, sd);
                Ok(Bits::Bool(self.aig.and2(differ, flipped)))
            }
            BvUmulo => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let w = a.len();
                let ax = self.extend(&a, w, false);
                let bx = self.extend(&b, w, false);
                let prod = self.mul_vec(&ax, &bx);
                let high = self.aig.or_many(&prod[w..]);
                Ok(Bits::Bool(high))
            }
            BvSmulo => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let w = a.len();
                let ax = self.extend(&a, w, true);
                let bx = self.extend(&b, w, true);
                let prod = self.mul_vec(&ax, &bx);
                // overflow unless the top w+1 bits all equal the sign of the
                // low part
                let sign = prod[w - 1];
                let mut same = self.aig.true_ref();
                for &bit in &prod[w..] {
                    let eq = self.aig.iff2(bit, sign);
                    same = self.aig.and2(same, eq);
                }
                Ok(Bits::Bool(same.negate()))
            }
            BvSdivo => {
                let a = self.vec_arg(tm, t, 0)?;
                let b = self.vec_arg(tm, t, 1)?;
                let w = a.len();
                let min = self.value_bits(&BvValue::min_signed(w as u64));
                let ones = self.value_bits(&BvValue::ones(w as u64));
                let is_min = self.eq_vec(&a, &min);
                let is_ones = self.eq_vec(&b, &ones);
                Ok(Bits::Bool(self.aig.and2(is_min, is_ones)))
            }

            _ => self.fresh_for(tm, t),
        }
    }

    fn bits(&mut self, t: TermId, tm: &TermManager, i: usize) -> Result<Bits> {
        let c = tm.child(t, i);
        Ok(self.map[&c].clone())
    }

    fn vec_arg(&mut self, tm: &TermManager, t: TermId, i: usize) -> Result<Vec<AigRef>> {
        Ok(self.bits(t, tm, i)?.as_vec()?.to_vec())
    }

    fn value_bits(&mut self, v: &BvValue) -> Vec<AigRef> {
        (0..v.width()).map(|i| self.aig.from_bool(v.bit(i))).collect()
    }

    /* ---- word-level circuits ---- */

    fn add_vec(&mut self, a: &[AigRef], b: &[AigRef]) -> (Vec<AigRef>, AigRef) {
        let mut carry = self.aig.false_ref();
        let mut sum = Vec::with_capacity(a.len());
        for (&x, &y) in a.iter().zip(b) {
            let xy = self.aig.xor2(x, y);
            let s = self.aig.xor2(xy, carry);
            let c1 = self.aig.and2(x, y);
            let c2 = self.aig.and2(xy, carry);
            carry = self.aig.or2(c1, c2);
            sum.push(s);
        }
        (sum, carry)
    }

    fn increment(&mut self, a: &[AigRef]) -> Vec<AigRef> {
        let mut carry = self.aig.true_ref();
        let mut out = Vec::with_capacity(a.len());
        for &x in a {
            out.push(self.aig.xor2(x, carry));
            carry = self.aig.and2(x, carry);
        }
        out
    }

    fn negate_vec(&mut self, a: &[AigRef]) -> Vec<AigRef> {
        let inverted: Vec<AigRef> = a.iter().map(|r| r.negate()).collect();
        self.increment(&inverted)
    }

    fn sub_vec(&mut self, a: &[AigRef], b: &[AigRef]) -> Vec<AigRef> {
        let nb = self.negate_vec(b);
        self.add_vec(a, &nb).0
    }

    fn mul_vec(&mut self, a: &[AigRef], b: &[AigRef]) -> Vec<AigRef> {
        let w = a.len();
        let mut acc = vec![self.aig.false_ref(); w];
        for i in 0..w {
            // acc += (a << i) & b[i]
            let mut partial = vec![self.aig.false_ref(); w];
            for j in 0..w - i {
                partial[i + j] = self.aig.and2(a[j], b[i]);
            }
            let (sum, _) = self.add_vec(&acc, &partial);
            acc = sum;
        }
        acc
    }

    fn eq_vec(&mut self, a: &[AigRef], b: &[AigRef]) -> AigRef {
        let mut acc = self.aig.true_ref();
        for (&x, &y) in a.iter().zip(b) {
            let eq = self.aig.iff2(x, y);
            acc = self.aig.and2(acc, eq);
        }
        acc
    }

    fn is_zero_vec(&mut self, a: &[AigRef]) -> AigRef {
        self.aig.or_many(a).negate()
    }

    fn ult_vec(&mut self, a: &[AigRef], b: &[AigRef]) -> AigRef {
        // from LSB up: lt = (¬a & b) | (a ≡ b) & lt_prev
        let mut lt = self.aig.false_ref();
        for (&x, &y) in a.iter().zip(b) {
            let xlt = self.aig.and2(x.negate(), y);
            let eq = self.aig.iff2(x, y);
            let keep = self.aig.and2(eq, lt);
            lt = self.aig.or2(xlt, keep);
        }
        lt
    }

    fn slt_vec(&mut self, a: &[AigRef], b: &[AigRef]) -> AigRef {
        let w = a.len();
        if w == 1 {
            // 1-bit signed: 1 < 0, i.e. a=1, b=0
            return self.aig.and2(a[0], b[0].negate());
        }
        let (sa, sb) = (a[w - 1], b[w - 1]);
        let ult_low = self.ult_vec(&a[..w - 1], &b[..w - 1]);
        // a < b  iff  (sa & ¬sb) | ((sa ≡ sb) & ult_low)
        let neg_pos = self.aig.and2(sa, sb.negate());
        let same = self.aig.iff2(sa, sb);
        let keep = self.aig.and2(same, ult_low);
        self.aig.or2(neg_pos, keep)
    }

    fn mux_vec(&mut self, c: AigRef, t: &[AigRef], e: &[AigRef]) -> Vec<AigRef> {
        t.iter()
            .zip(e)
            .map(|(&x, &y)| self.aig.ite(c, x, y))
            .collect()
    }

    fn extend(&mut self, a: &[AigRef], n: usize, signed: bool) -> Vec<AigRef> {
        let fill = if signed {
            *a.last().expect("width >= 1")
        } else {
            self.aig.false_ref()
        };
        let mut out = a.to_vec();
        out.extend(std::iter::repeat(fill).take(n));
        out
    }

    fn shift_vec(&mut self, kind: Kind, a: &[AigRef], b: &[AigRef]) -> Vec<AigRef> {
        let w = a.len();
        let fill = if kind == Kind::BvAshr {
            a[w - 1]
        } else {
            self.aig.false_ref()
        };
        // barrel shifter over the low log2(w) bits of b
        let stages = usize::BITS as usize - (w - 1).leading_zeros() as usize;
        let stages = if w == 1 { 0 } else { stages };
        let mut cur = a.to_vec();
        for s in 0..stages {
            let amount = 1usize << s;
            let shifted: Vec<AigRef> = (0..w)
                .map(|i| match kind {
                    Kind::BvShl => {
                        if i >= amount {
                            cur[i - amount]
                        } else {
                            self.aig.false_ref()
                        }
                    }
                    _ => {
                        if i + amount < w {
                            cur[i + amount]
                        } else {
                            fill
                        }
                    }
                })
                .collect();
            cur = self.mux_vec(b[s], &shifted, &cur);
        }
        // staged shifting already saturates for amounts in [w, 2^stages); any
        // higher shift bit set forces the saturated result directly
        let mut high = self.aig.false_ref();
        for &bit in &b[stages.min(b.len())..] {
            high = self.aig.or2(high, bit);
        }
        let saturated = vec![fill; w];
        self.mux_vec(high, &saturated, &cur)
    }

    fn rotate_sym(&mut self, left: bool, a: &[AigRef], b: &[AigRef]) -> Vec<AigRef> {
        let w = a.len();
        if w == 1 {
            return a.to_vec();
        }
        // amount = b mod w via the division circuit, then one mux per residue
        let w_bits = self.value_bits(&BvValue::from_u64(w as u64, w as u64));
        let (_, amount) = self.udivrem(b, &w_bits);
        let mut out = a.to_vec();
        for k in 1..w {
            let rotated: Vec<AigRef> = (0..w)
                .map(|i| {
                    let src = if left { (i + w - k) % w } else { (i + k) % w };
                    a[src]
                })
                .collect();
            let k_bits = self.value_bits(&BvValue::from_u64(w as u64, k as u64));
            let is_k = self.eq_vec(&amount, &k_bits);
            out = self.mux_vec(is_k, &rotated, &out);
        }
        out
    }

    fn udivrem(&mut self, a: &[AigRef], b: &[AigRef]) -> (Vec<AigRef>, Vec<AigRef>) {
        let w = a.len();
        // restoring division over a w+1 bit remainder
        let ext = 1;
        let bx = self.extend(b, ext, false);
        let mut rem = vec![self.aig.false_ref(); w + ext];
        let mut quot = vec![self.aig.false_ref(); w];
        for i in (0..w).rev() {
            // rem = (rem << 1) | a[i]
            let mut shifted = Vec::with_capacity(w + ext);
            shifted.push(a[i]);
            shifted.extend(rem[..w + ext - 1].iter().copied());
            let ge = self.ult_vec(&shifted, &bx).negate();
            let diff = self.sub_vec(&shifted, &bx);
            rem = self.mux_vec(ge, &diff, &shifted);
            quot[i] = ge;
        }
        (quot, rem[..w].to_vec())
    }

    fn signed_divrem(&mut self, kind: Kind, a: &[AigRef], b: &[AigRef]) -> Vec<AigRef> {
        let w = a.len();
        let (sa, sb) = (a[w - 1], b[w - 1]);
        let na = self.negate_vec(a);
        let nb = self.negate_vec(b);
        let abs_a = self.mux_vec(sa, &na, &a.to_vec());
        let abs_b = self.mux_vec(sb, &nb, &b.to_vec());
        let (q, r) = self.udivrem(&abs_a, &abs_b);
        let b_zero = self.is_zero_vec(b);
        match kind {
            Kind::BvSdiv => {
                let sign = self.aig.xor2(sa, sb);
                let nq = self.negate_vec(&q);
                let signed_q = self.mux_vec(sign, &nq, &q);
                // division by zero: non-negative dividend yields ones,
                // negative yields one
                let ones = self.value_bits(&BvValue::ones(w as u64));
                let one = self.value_bits(&BvValue::one(w as u64));
                let zero_case = self.mux_vec(sa, &one, &ones);
                self.mux_vec(b_zero, &zero_case, &signed_q)
            }
            Kind::BvSrem => {
                // remainder takes the sign of the dividend
                let nr = self.negate_vec(&r);
                let signed_r = self.mux_vec(sa, &nr, &r);
                self.mux_vec(b_zero, &a.to_vec(), &signed_r)
            }
            Kind::BvSmod => {
                // srem, then add the divisor when signs disagree and the
                // remainder is non-zero
                let nr = self.negate_vec(&r);
                let srem = self.mux_vec(sa, &nr, &r);
                let r_zero = self.is_zero_vec(&srem);
                let differ = self.aig.xor2(sa, sb);
                let fix = self.aig.and2(differ, r_zero.negate());
                let (fixed, _) = self.add_vec(&srem, &b.to_vec());
                let smod = self.mux_vec(fix, &fixed, &srem);
                self.mux_vec(b_zero, &a.to_vec(), &smod)
            }
            _ => unreachable!(),
        }
    }
}

impl Default for Bitblaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::ast::TermManager;

    /// Evaluate a blasted bool term under an assignment to the inputs.
    fn eval_aig(aig: &Aig, r: AigRef, assign: &FxHashMap<AigRef, bool>) -> bool {
        let base = if r.is_negated() { r.negate() } else { r };
        let v = if base.is_const() {
            true
        } else if let Some((l, rr)) = aig.children(base) {
            eval_aig(aig, l, assign) && eval_aig(aig, rr, assign)
        } else {
            *assign.get(&base).unwrap_or(&false)
        };
        if r.is_negated() {
            !v
        } else {
            v
        }
    }

    fn check_binop_exhaustive(kind: Kind, width: u64, reference: impl Fn(&BvValue, &BvValue) -> BvValue) {
        let mut tm = TermManager::new();
        let sort = tm.mk_bv_sort(width);
        let x = tm.mk_const(sort, Some("x")).unwrap();
        let y = tm.mk_const(sort, Some("y")).unwrap();
        let op = tm.mk_term(kind, &[x, y], &[]).unwrap();
        let expected = tm.mk_const(sort, Some("z")).unwrap();
        let eq = tm.mk_eq(op, expected).unwrap();

        let mut bb = Bitblaster::new();
        let root = bb.blast_bool(&tm, eq).unwrap();
        let xin = bb.inputs()[&x].clone();
        let yin = bb.inputs()[&y].clone();
        let zin = bb.inputs()[&expected].clone();

        for av in 0..(1u64 << width) {
            for bv in 0..(1u64 << width) {
                let a = BvValue::from_u64(width, av);
                let b = BvValue::from_u64(width, bv);
                let z = reference(&a, &b);
                let mut assign = FxHashMap::default();
                for (i, &bit) in xin.iter().enumerate() {
                    assign.insert(bit, a.bit(i as u64));
                }
                for (i, &bit) in yin.iter().enumerate() {
                    assign.insert(bit, b.bit(i as u64));
                }
                for (i, &bit) in zin.iter().enumerate() {
                    assign.insert(bit, z.bit(i as u64));
                }
                assert!(
                    eval_aig(&bb.aig, root, &assign),
                    "{kind:?} mismatch at a={av} b={bv}"
                );
            }
        }
    }

    #[test]
    fn adder_matches_semantics() {
        check_binop_exhaustive(Kind::BvAdd, 4, |a, b| a.bvadd(b));
    }

    #[test]
    fn multiplier_matches_semantics() {
        check_binop_exhaustive(Kind::BvMul, 4, |a, b| a.bvmul(b));
    }

    #[test]
    fn division_matches_totalized_semantics() {
        check_binop_exhaustive(Kind::BvUdiv, 3, |a, b| a.bvudiv(b));
        check_binop_exhaustive(Kind::BvUrem, 3, |a, b| a.bvurem(b));
        check_binop_exhaustive(Kind::BvSdiv, 3, |a, b| a.bvsdiv(b));
        check_binop_exhaustive(Kind::BvSrem, 3, |a, b| a.bvsrem(b));
        check_binop_exhaustive(Kind::BvSmod, 3, |a, b| a.bvsmod(b));
    }

    #[test]
    fn shifts_match_semantics() {
        check_binop_exhaustive(Kind::BvShl, 3, |a, b| a.bvshl(b));
        check_binop_exhaustive(Kind::BvShr, 3, |a, b| a.bvshr(b));
        check_binop_exhaustive(Kind::BvAshr, 3, |a, b| a.bvashr(b));
    }

    #[test]
    fn unsupported_kinds_error_in_solving_mode() {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let arr = tm.mk_array_sort(bv8, bv8).unwrap();
        let a = tm.mk_const(arr, Some("a")).unwrap();
        let i = tm.mk_const(bv8, Some("i")).unwrap();
        let sel = tm.mk_term(Kind::Select, &[a, i], &[]).unwrap();
        let v = tm.mk_bv_zero(bv8).unwrap();
        let eq = tm.mk_eq(sel, v).unwrap();
        let mut bb = Bitblaster::new();
        assert!(matches!(bb.blast_bool(&tm, eq), Err(Error::Unsupported(_))));
        // counting mode abstracts instead
        let mut counting = Bitblaster::for_counting();
        assert!(counting.blast_bool(&tm, eq).is_ok());
    }
}
