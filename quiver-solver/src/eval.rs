//! Bit-precise term evaluation under an assignment.
//!
//! Used by the ground solver to read models back out of the oracle and by
//! the quantifier engine to score synthesis candidates against
//! counterexamples. Uninterpreted leaves (constants, variables, function
//! applications and array reads) are resolved through a caller-provided
//! lookup; anything the lookup does not know defaults to zero, mirroring how
//! the ground solver completes partial models.

use rustc_hash::FxHashMap;

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::bv::BvValue;
use quiver_core::error::{Error, Result};

/// An evaluated Bool or bit-vector value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(bool),
    Bv(BvValue),
}

impl Value {
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Bv(_) => Err(Error::Unsupported("expected a Boolean value".to_string())),
        }
    }

    pub fn as_bv(&self) -> Result<&BvValue> {
        match self {
            Value::Bv(v) => Ok(v),
            Value::Bool(_) => Err(Error::Unsupported("expected a bit-vector value".to_string())),
        }
    }
}

/// Default value of a Bool or bit-vector sort.
pub fn default_value(tm: &TermManager, t: TermId) -> Result<Value> {
    let sort = tm.sort(tm.sort_of(t));
    if sort.is_bool() {
        Ok(Value::Bool(false))
    } else if sort.is_bv() {
        Ok(Value::Bv(BvValue::zero(sort.bv_size())))
    } else {
        Err(Error::Unsupported(format!(
            "cannot evaluate term of sort {sort:?}"
        )))
    }
}

/// Evaluate `root` under `lookup`.
pub fn eval(
    tm: &TermManager,
    root: TermId,
    lookup: &mut dyn FnMut(&TermManager, TermId) -> Option<Value>,
) -> Result<Value> {
    let mut cache: FxHashMap<TermId, Value> = FxHashMap::default();
    let mut visit = vec![root];
    while let Some(&cur) = visit.last() {
        if cache.contains_key(&cur) {
            visit.pop();
            continue;
        }
        let kind = tm.kind(cur);
        // leaves and uninterpreted nodes resolve through the lookup
        if matches!(kind, Kind::Const | Kind::Var | Kind::Apply | Kind::Select) {
            let v = match lookup(tm, cur) {
                Some(v) => v,
                None => default_value(tm, cur)?,
            };
            cache.insert(cur, v);
            visit.pop();
            continue;
        }
        if kind == Kind::Value {
            let v = if let Some(b) = tm.bool_value(cur) {
                Value::Bool(b)
            } else if let Some(bv) = tm.bv_value(cur) {
                Value::Bv(bv.clone())
            } else {
                return Err(Error::Unsupported(
                    "cannot evaluate non-bitvector value".to_string(),
                ));
            };
            cache.insert(cur, v);
            visit.pop();
            continue;
        }
        let pending: Vec<TermId> = tm
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
        let v = eval_node(tm, cur, &cache)?;
        cache.insert(cur, v);
    }
    Ok(cache.remove(&root).expect("root evaluated"))
}

fn eval_node(tm: &TermManager, t: TermId, cache: &FxHashMap<TermId, Value>) -> Result<Value> {
    use Kind::*;
    use crate::eval::Value;
    let kind = tm.kind(t);
    let arg = |i: usize| &cache[&tm.child(t, i)];
    let bv = |i: usize| arg(i).as_bv();
    let b = |i: usize| arg(i).as_bool();

    let v = match kind {
        Not => Value::Bool(!b(0)?),
        And => {
            let mut acc = true;
            for i in 0..tm.num_children(t) {
                acc &= b(i)?;
            }
            Value::Bool(acc)
        }
        Or => {
            let mut acc = false;
            for i in 0..tm.num_children(t) {
                acc |= b(i)?;
            }
            Value::Bool(acc)
        }
        Xor => Value::Bool(b(0)? != b(1)?),
        Iff => Value::Bool(b(0)? == b(1)?),
        Implies => Value::Bool(!b(0)? || b(1)?),

        Equal => Value::Bool(arg(0) == arg(1)),
        Distinct => {
            let n = tm.num_children(t);
            let mut ok = true;
            'outer: for i in 0..n {
                for j in i + 1..n {
                    if arg(i) == arg(j) {
                        ok = false;
                        break 'outer;
                    }
                }
            }
            Value::Bool(ok)
        }

        Ite => {
            if b(0)? {
                arg(1).clone()
            } else {
                arg(2).clone()
            }
        }

        BvAdd => Value::Bv(bv(0)?.bvadd(bv(1)?)),
        BvSub => Value::Bv(bv(0)?.bvsub(bv(1)?)),
        BvMul => Value::Bv(bv(0)?.bvmul(bv(1)?)),
        BvAnd => Value::Bv(bv(0)?.bvand(bv(1)?)),
        BvOr => Value::Bv(bv(0)?.bvor(bv(1)?)),
        BvXor => Value::Bv(bv(0)?.bvxor(bv(1)?)),
        BvNand => Value::Bv(bv(0)?.bvnand(bv(1)?)),
        BvNor => Value::Bv(bv(0)?.bvnor(bv(1)?)),
        BvXnor => Value::Bv(bv(0)?.bvxnor(bv(1)?)),
        BvShl => Value::Bv(bv(0)?.bvshl(bv(1)?)),
        BvShr => Value::Bv(bv(0)?.bvshr(bv(1)?)),
        BvAshr => Value::Bv(bv(0)?.bvashr(bv(1)?)),
        BvUdiv => Value::Bv(bv(0)?.bvudiv(bv(1)?)),
        BvUrem => Value::Bv(bv(0)?.bvurem(bv(1)?)),
        BvSdiv => Value::Bv(bv(0)?.bvsdiv(bv(1)?)),
        BvSrem => Value::Bv(bv(0)?.bvsrem(bv(1)?)),
        BvSmod => Value::Bv(bv(0)?.bvsmod(bv(1)?)),
        BvConcat => Value::Bv(bv(0)?.bvconcat(bv(1)?)),
        BvComp => Value::Bv(bv(0)?.bvcomp(bv(1)?)),
        BvRol => Value::Bv(bv(0)?.bvrol(bv(1)?)),
        BvRor => Value::Bv(bv(0)?.bvror(bv(1)?)),
        BvNeg => Value::Bv(bv(0)?.bvneg()),
        BvNot => Value::Bv(bv(0)?.bvnot()),
        BvInc => Value::Bv(bv(0)?.bvinc()),
        BvDec => Value::Bv(bv(0)?.bvdec()),
        BvRedand => Value::Bv(BvValue::from_bool(bv(0)?.redand())),
        BvRedor => Value::Bv(BvValue::from_bool(bv(0)?.redor())),
        BvRedxor => Value::Bv(BvValue::from_bool(bv(0)?.redxor())),

        BvUlt => Value::Bool(bv(0)?.ult(bv(1)?)),
        BvUle => Value::Bool(bv(0)?.ule(bv(1)?)),
        BvUgt => Value::Bool(bv(0)?.ugt(bv(1)?)),
        BvUge => Value::Bool(bv(0)?.uge(bv(1)?)),
        BvSlt => Value::Bool(bv(0)?.slt(bv(1)?)),
        BvSle => Value::Bool(bv(0)?.sle(bv(1)?)),
        BvSgt => Value::Bool(bv(0)?.sgt(bv(1)?)),
        BvSge => Value::Bool(bv(0)?.sge(bv(1)?)),
        BvUaddo => Value::Bool(bv(0)?.uaddo(bv(1)?)),
        BvSaddo => Value::Bool(bv(0)?.saddo(bv(1)?)),
        BvUsubo => Value::Bool(bv(0)?.usubo(bv(1)?)),
        BvSsubo => Value::Bool(bv(0)?.ssubo(bv(1)?)),
        BvUmulo => Value::Bool(bv(0)?.umulo(bv(1)?)),
        BvSmulo => Value::Bool(bv(0)?.smulo(bv(1)?)),
        BvSdivo => Value::Bool(bv(0)?.sdivo(bv(1)?)),

        BvExtract => Value::Bv(bv(0)?.slice(tm.index(t, 0), tm.index(t, 1))),
        BvRepeat => Value::Bv(bv(0)?.repeat(tm.index(t, 0))),
        BvRoli => Value::Bv(bv(0)?.roli(tm.index(t, 0))),
        BvRori => Value::Bv(bv(0)?.rori(tm.index(t, 0))),
        BvSignExtend => Value::Bv(bv(0)?.sign_extend(tm.index(t, 0))),
        BvZeroExtend => Value::Bv(bv(0)?.zero_extend(tm.index(t, 0))),

        // quantified bodies under the flat model: the binder is resolved by
        // the lookup, the body value is the result
        Forall | Exists => cache[&tm.child(t, 1)].clone(),

        other => {
            return Err(Error::Unsupported(format!(
                "cannot evaluate {other} term"
            )))
        }
    };
    Ok(v)
}
