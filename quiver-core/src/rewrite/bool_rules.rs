//! Boolean connective rewriting.

use crate::ast::{Kind, TermId, TermManager};
use crate::error::Result;

pub(super) fn apply(tm: &mut TermManager, t: TermId, level: u8) -> Result<Option<TermId>> {
    use Kind::*;
    let kind = tm.kind(t);
    let res: Option<TermId> = match kind {
        Not => {
            let a = tm.child(t, 0);
            if let Some(b) = tm.bool_value(a) {
                Some(tm.mk_bool(!b))
            } else if tm.kind(a) == Not {
                Some(tm.child(a, 0))
            } else if level >= 2 {
                de_morgan(tm, a)?
            } else {
                None
            }
        }

        And | Or => {
            let neutral = kind == And; // true absorbs nothing in a conjunction
            let absorbing = !neutral;
            let children: Vec<TermId> = tm.children(t).to_vec();
            let mut kept: Vec<TermId> = Vec::with_capacity(children.len());
            let mut changed = false;
            for c in children {
                match tm.bool_value(c) {
                    Some(b) if b == neutral => changed = true,
                    Some(_) => return Ok(Some(tm.mk_bool(absorbing))),
                    None => {
                        if kept.contains(&c) {
                            changed = true;
                        } else {
                            kept.push(c);
                        }
                    }
                }
            }
            // a ∧ ¬a annihilates, a ∨ ¬a is valid
            for &c in &kept {
                if tm.kind(c) == Not && kept.contains(&tm.child(c, 0)) {
                    return Ok(Some(tm.mk_bool(absorbing)));
                }
            }
            if !changed {
                None
            } else if kind == And {
                Some(tm.mk_and(&kept)?)
            } else {
                Some(tm.mk_or(&kept)?)
            }
        }

        Xor => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            match (tm.bool_value(a), tm.bool_value(b)) {
                (Some(x), Some(y)) => Some(tm.mk_bool(x != y)),
                (Some(false), None) => Some(b),
                (None, Some(false)) => Some(a),
                (Some(true), None) => Some(tm.mk_not(b)?),
                (None, Some(true)) => Some(tm.mk_not(a)?),
                (None, None) if a == b => Some(tm.mk_false()),
                _ => None,
            }
        }

        Iff => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            match (tm.bool_value(a), tm.bool_value(b)) {
                (Some(x), Some(y)) => Some(tm.mk_bool(x == y)),
                (Some(true), None) => Some(b),
                (None, Some(true)) => Some(a),
                (Some(false), None) => Some(tm.mk_not(b)?),
                (None, Some(false)) => Some(tm.mk_not(a)?),
                (None, None) if a == b => Some(tm.mk_true()),
                _ => None,
            }
        }

        Implies => {
            let (a, b) = (tm.child(t, 0), tm.child(t, 1));
            if a == b {
                Some(tm.mk_true())
            } else {
                match (tm.bool_value(a), tm.bool_value(b)) {
                    (Some(true), _) => Some(b),
                    (Some(false), _) => Some(tm.mk_true()),
                    (_, Some(true)) => Some(tm.mk_true()),
                    (_, Some(false)) => Some(tm.mk_not(a)?),
                    _ => None,
                }
            }
        }

        _ => None,
    };
    Ok(res)
}

/// `¬(¬a ∧ ¬b) → a ∨ b` (and dually), only when every operand is negated:
/// the only case where the identity shrinks the term.
fn de_morgan(tm: &mut TermManager, inner: TermId) -> Result<Option<TermId>> {
    use Kind::*;
    let inner_kind = tm.kind(inner);
    if inner_kind != And && inner_kind != Or {
        return Ok(None);
    }
    let children: Vec<TermId> = tm.children(inner).to_vec();
    if !children.iter().all(|&c| tm.kind(c) == Not) {
        return Ok(None);
    }
    let stripped: Vec<TermId> = children.iter().map(|&c| tm.child(c, 0)).collect();
    let res = if inner_kind == And {
        tm.mk_or(&stripped)?
    } else {
        tm.mk_and(&stripped)?
    };
    Ok(Some(res))
}
