//! Quiver solver: preprocessing, bit-blasting, ground solving and the
//! counterexample-guided quantifier engine.
//!
//! The crate is organized around the data flow of a check:
//! [`preprocess`] rewrites and normalizes the scoped assertion stack,
//! [`bitblast`] lowers the Bool/BV fragment to an [`aig`], [`sat`] drives
//! the CNF oracle, [`ground`] ties those into the incremental ground
//! solver, and [`quant`] runs the E-solver/F-solver refinement loop (with
//! an optional parallel dual worker) on quantified inputs. [`Solver`] is
//! the public facade.
//!
//! # Examples
//!
//! ```
//! use quiver_core::ast::{Kind, TermManager};
//! use quiver_core::option::Options;
//! use quiver_solver::{Solver, SolverResult};
//!
//! let mut tm = TermManager::new();
//! let mut options = Options::default();
//! options.produce_models = true;
//! let mut solver = Solver::new(options);
//!
//! let bv8 = tm.mk_bv_sort(8);
//! let x = tm.mk_const(bv8, Some("x")).unwrap();
//! let one = tm.mk_bv_one(bv8).unwrap();
//! let shifted = tm.mk_term(Kind::BvShl, &[x, one], &[]).unwrap();
//! let target = tm.mk_bv_value_u64(bv8, 8).unwrap();
//! let eq = tm.mk_eq(shifted, target).unwrap();
//!
//! solver.assert_formula(&tm, eq).unwrap();
//! assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Sat);
//! let model = solver.get_bv_value(&mut tm, x).unwrap();
//! assert_eq!(model.bvshl(&quiver_core::bv::BvValue::one(8)).to_u64(), Some(8));
//! ```

#![deny(unsafe_code)]

pub mod aig;
pub mod bitblast;
pub mod eval;
pub mod ground;
pub mod preprocess;
pub mod quant;
pub mod sat;
pub mod solver;

pub use ground::{GroundSolver, SolverResult, TerminationCallback};
pub use quant::QuantSolver;
pub use solver::Solver;
