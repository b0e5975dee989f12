//! And-inverter graphs.
//!
//! The bit-blaster lowers Boolean structure into a structurally hashed AIG;
//! the normalizer uses the and-gate count of a blasted assertion as its
//! cheap size metric. References are signed indices: negation is free.

use rustc_hash::{FxHashMap, FxHashSet};

/// Reference to an AIG node; the sign encodes negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AigRef(i64);

impl AigRef {
    const TRUE: AigRef = AigRef(1);
    const FALSE: AigRef = AigRef(-1);

    pub fn negate(self) -> AigRef {
        AigRef(-self.0)
    }

    pub fn is_negated(self) -> bool {
        self.0 < 0
    }

    fn index(self) -> usize {
        self.0.unsigned_abs() as usize
    }

    pub fn is_true(self) -> bool {
        self == Self::TRUE
    }

    pub fn is_false(self) -> bool {
        self == Self::FALSE
    }

    pub fn is_const(self) -> bool {
        self.index() == 1
    }
}

#[derive(Debug, Clone, Copy)]
enum AigNode {
    True,
    Var,
    And(AigRef, AigRef),
}

/// Structurally hashed AIG manager.
#[derive(Debug, Default)]
pub struct Aig {
    nodes: Vec<AigNode>,
    table: FxHashMap<(AigRef, AigRef), AigRef>,
}

impl Aig {
    pub fn new() -> Self {
        let mut aig = Self { nodes: Vec::new(), table: FxHashMap::default() };
        aig.nodes.push(AigNode::True); // index 0 unused
        aig.nodes.push(AigNode::True); // index 1 is the constant
        aig
    }

    pub fn true_ref(&self) -> AigRef {
        AigRef::TRUE
    }

    pub fn false_ref(&self) -> AigRef {
        AigRef::FALSE
    }

    pub fn from_bool(&self, b: bool) -> AigRef {
        if b {
            AigRef::TRUE
        } else {
            AigRef::FALSE
        }
    }

    /// A fresh primary input.
    pub fn new_var(&mut self) -> AigRef {
        let id = self.nodes.len() as i64;
        self.nodes.push(AigNode::Var);
        AigRef(id)
    }

    pub fn is_var(&self, r: AigRef) -> bool {
        matches!(self.nodes[r.index()], AigNode::Var)
    }

    pub fn is_and(&self, r: AigRef) -> bool {
        matches!(self.nodes[r.index()], AigNode::And(_, _))
    }

    /// Children of an and-gate.
    pub fn children(&self, r: AigRef) -> Option<(AigRef, AigRef)> {
        match self.nodes[r.index()] {
            AigNode::And(l, rr) => Some((l, rr)),
            _ => None,
        }
    }

    /// Conjunction with constant propagation and structural hashing.
    pub fn and2(&mut self, a: AigRef, b: AigRef) -> AigRef {
        if a.is_false() || b.is_false() || a == b.negate() {
            return AigRef::FALSE;
        }
        if a.is_true() || a == b {
            return b;
        }
        if b.is_true() {
            return a;
        }
        let (l, r) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        if let Some(&cached) = self.table.get(&(l, r)) {
            return cached;
        }
        let id = self.nodes.len() as i64;
        self.nodes.push(AigNode::And(l, r));
        let res = AigRef(id);
        self.table.insert((l, r), res);
        res
    }

    pub fn or2(&mut self, a: AigRef, b: AigRef) -> AigRef {
        self.and2(a.negate(), b.negate()).negate()
    }

    pub fn xor2(&mut self, a: AigRef, b: AigRef) -> AigRef {
        let na = self.and2(a, b.negate());
        let nb = self.and2(a.negate(), b);
        self.or2(na, nb)
    }

    pub fn iff2(&mut self, a: AigRef, b: AigRef) -> AigRef {
        self.xor2(a, b).negate()
    }

    pub fn ite(&mut self, c: AigRef, t: AigRef, e: AigRef) -> AigRef {
        let ct = self.and2(c, t);
        let ce = self.and2(c.negate(), e);
        self.or2(ct, ce)
    }

    pub fn and_many(&mut self, refs: &[AigRef]) -> AigRef {
        let mut acc = AigRef::TRUE;
        for &r in refs {
            acc = self.and2(acc, r);
        }
        acc
    }

    pub fn or_many(&mut self, refs: &[AigRef]) -> AigRef {
        let mut acc = AigRef::FALSE;
        for &r in refs {
            acc = self.or2(acc, r);
        }
        acc
    }

    /// Number of and-gates reachable from `root` and not yet in `cache`.
    ///
    /// Passing the same cache across several roots counts shared gates once,
    /// which is exactly the metric the adder-sharing pass compares.
    pub fn count_ands(&self, root: AigRef, cache: &mut FxHashSet<i64>) -> u64 {
        let mut count = 0;
        let mut visit = vec![root];
        while let Some(r) = visit.pop() {
            let idx = r.index() as i64;
            if !cache.insert(idx) {
                continue;
            }
            if let AigNode::And(l, rr) = self.nodes[r.index()] {
                count += 1;
                visit.push(l);
                visit.push(rr);
            }
        }
        count
    }

    /// Total allocated nodes (inputs + gates).
    pub fn num_nodes(&self) -> usize {
        self.nodes.len() - 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_propagation() {
        let mut aig = Aig::new();
        let a = aig.new_var();
        let t = aig.true_ref();
        let f = aig.false_ref();
        assert_eq!(aig.and2(a, t), a);
        assert_eq!(aig.and2(a, f), f);
        assert_eq!(aig.and2(a, a), a);
        assert_eq!(aig.and2(a, a.negate()), f);
        assert_eq!(aig.or2(a, t), t);
        assert_eq!(aig.or2(a, f), a);
    }

    #[test]
    fn structural_hashing_shares_gates() {
        let mut aig = Aig::new();
        let a = aig.new_var();
        let b = aig.new_var();
        let g1 = aig.and2(a, b);
        let g2 = aig.and2(b, a);
        assert_eq!(g1, g2);
        assert_eq!(aig.num_nodes(), 3);
    }

    #[test]
    fn gate_counting_respects_sharing() {
        let mut aig = Aig::new();
        let a = aig.new_var();
        let b = aig.new_var();
        let c = aig.new_var();
        let ab = aig.and2(a, b);
        let abc = aig.and2(ab, c);
        let mut cache = FxHashSet::default();
        assert_eq!(aig.count_ands(abc, &mut cache), 2);
        // second root reusing `ab` adds only the new gate
        let abd = aig.and2(ab, c.negate());
        assert_eq!(aig.count_ands(abd, &mut cache), 1);
    }

    #[test]
    fn xor_of_equal_is_false() {
        let mut aig = Aig::new();
        let a = aig.new_var();
        assert_eq!(aig.xor2(a, a), aig.false_ref());
        assert_eq!(aig.iff2(a, a), aig.true_ref());
    }
}
