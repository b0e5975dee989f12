//! Pass: eliminate uninterpreted functions and array reads by Ackermann
//! expansion.
//!
//! Every application `f(a, ...)` of an uninterpreted function and every read
//! `select(a, i)` from a base array constant is replaced by a fresh
//! constant; for each pair of instances of the same symbol a congruence
//! lemma `args_1 = args_2 -> c_1 = c_2` is appended as an internal
//! assertion. After this pass (and the read pushing below) the ground
//! fragment contains no `apply` and no `select`.
//!
//! Reads over `store`/`ite`/constant arrays are pushed down first so that
//! only reads from base constants remain.

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::error::Result;

use super::{map_assertions, AckInstance, AssertionView, PassContext};

pub(crate) fn apply(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    ctx: &mut PassContext<'_>,
) -> Result<bool> {
    let mut changed = map_assertions(tm, view, |tm, t| rewrite_node(tm, ctx, t))?;
    changed |= assert_congruence_lemmas(tm, view, ctx)?;
    Ok(changed)
}

fn rewrite_node(
    tm: &mut TermManager,
    ctx: &mut PassContext<'_>,
    t: TermId,
) -> Result<Option<TermId>> {
    match tm.kind(t) {
        Kind::Select => {
            let (arr, idx) = (tm.child(t, 0), tm.child(t, 1));
            match tm.kind(arr) {
                Kind::ConstArray => Ok(Some(tm.child(arr, 0))),
                Kind::Store => {
                    // select over store unfolds regardless of rewrite level
                    let (base, widx, val) = (tm.child(arr, 0), tm.child(arr, 1), tm.child(arr, 2));
                    if widx == idx {
                        return Ok(Some(val));
                    }
                    let eq = tm.mk_eq(widx, idx)?;
                    let deep = tm.mk_term(Kind::Select, &[base, idx], &[])?;
                    Ok(Some(tm.mk_ite(eq, val, deep)?))
                }
                Kind::Ite => {
                    let (c, a, b) = (tm.child(arr, 0), tm.child(arr, 1), tm.child(arr, 2));
                    let sa = tm.mk_term(Kind::Select, &[a, idx], &[])?;
                    let sb = tm.mk_term(Kind::Select, &[b, idx], &[])?;
                    Ok(Some(tm.mk_ite(c, sa, sb)?))
                }
                Kind::Const => Ok(Some(ackermannize(tm, ctx, arr, t, &[idx])?)),
                _ => Ok(None),
            }
        }
        Kind::Apply if tm.kind(tm.child(t, 0)) == Kind::Const => {
            let f = tm.child(t, 0);
            let args: Vec<TermId> = tm.children(t)[1..].to_vec();
            Ok(Some(ackermannize(tm, ctx, f, t, &args)?))
        }
        _ => Ok(None),
    }
}

fn ackermannize(
    tm: &mut TermManager,
    ctx: &mut PassContext<'_>,
    symbol: TermId,
    app: TermId,
    args: &[TermId],
) -> Result<TermId> {
    if let Some(&c) = ctx.ackermann.app_map.get(&app) {
        return Ok(c);
    }
    let sort = tm.sort_of(app);
    let constant = tm.mk_const(sort, None)?;
    ctx.ackermann.app_map.insert(app, constant);
    ctx.ackermann
        .instances
        .entry(symbol)
        .or_default()
        .push(AckInstance { app, args: args.to_vec(), constant });
    ctx.stats.incr("preprocess::elim_uninterpreted::num_instances");
    Ok(constant)
}

fn assert_congruence_lemmas(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    ctx: &mut PassContext<'_>,
) -> Result<bool> {
    let mut symbols: Vec<TermId> = ctx.ackermann.instances.keys().copied().collect();
    symbols.sort();
    let mut changed = false;
    for symbol in symbols {
        let instances = ctx.ackermann.instances[&symbol].clone();
        let done = ctx.ackermann.lemma_done.get(&symbol).copied().unwrap_or(0);
        let n = instances.len();
        if done >= n {
            continue;
        }
        for j in done..n {
            for i in 0..j {
                let (a, b) = (&instances[i], &instances[j]);
                let mut eqs = Vec::with_capacity(a.args.len());
                for (&x, &y) in a.args.iter().zip(&b.args) {
                    eqs.push(tm.mk_eq(x, y)?);
                }
                let antecedent = tm.mk_and(&eqs)?;
                let consequent = tm.mk_eq(a.constant, b.constant)?;
                let lemma = tm.mk_implies(antecedent, consequent)?;
                let lemma = ctx.rewriter.rewrite(tm, lemma)?;
                if !tm.is_true(lemma) {
                    view.push_derived(lemma, None);
                    changed = true;
                    ctx.stats.incr("preprocess::elim_uninterpreted::num_lemmas");
                }
            }
        }
        ctx.ackermann.lemma_done.insert(symbol, n);
    }
    Ok(changed)
}
