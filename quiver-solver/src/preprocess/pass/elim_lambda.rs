//! Pass: beta-reduce lambda applications.
//!
//! Lambdas enter the assertion set through array/function model
//! reconstruction and user-built applications; after this pass no `apply`
//! node has a lambda in function position.

use rustc_hash::FxHashMap;

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::error::Result;

use super::{map_assertions, AssertionView, PassContext};

pub(crate) fn apply(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    ctx: &mut PassContext<'_>,
) -> Result<bool> {
    let mut num = 0u64;
    let changed = map_assertions(tm, view, |tm, t| {
        if tm.kind(t) != Kind::Apply || tm.kind(tm.child(t, 0)) != Kind::Lambda {
            return Ok(None);
        }
        num += 1;
        Ok(Some(beta_reduce(tm, t)?))
    })?;
    ctx.stats.add("preprocess::elim_lambda::num_reduced", num);
    Ok(changed)
}

fn beta_reduce(tm: &mut TermManager, app: TermId) -> Result<TermId> {
    let args: Vec<TermId> = tm.children(app)[1..].to_vec();
    let mut map: FxHashMap<TermId, TermId> = FxHashMap::default();
    let mut body = tm.child(app, 0);
    for &arg in &args {
        debug_assert_eq!(tm.kind(body), Kind::Lambda);
        map.insert(tm.child(body, 0), arg);
        body = tm.child(body, 1);
    }
    tm.substitute_term(body, &map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_curried_lambda() {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let vx = tm.mk_var(bv8, Some("a")).unwrap();
        let vy = tm.mk_var(bv8, Some("b")).unwrap();
        let body = tm.mk_term(Kind::BvAdd, &[vx, vy], &[]).unwrap();
        let inner = tm.mk_lambda(vy, body).unwrap();
        let lam = tm.mk_lambda(vx, inner).unwrap();
        let three = tm.mk_bv_value_u64(bv8, 3).unwrap();
        let four = tm.mk_bv_value_u64(bv8, 4).unwrap();
        let app = tm.mk_apply(lam, &[three, four]).unwrap();
        let res = beta_reduce(&mut tm, app).unwrap();
        let expected = tm.mk_term(Kind::BvAdd, &[three, four], &[]).unwrap();
        assert_eq!(res, expected);
    }
}
