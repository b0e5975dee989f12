//! Quiver core: sorts, hash-consed terms, bit-vector values and rewriting.
//!
//! This crate provides the foundational types of the Quiver SMT solver:
//! - [`bv::BvValue`], arbitrary fixed-width two's-complement arithmetic,
//! - [`fp::FpValue`] and [`fp::RoundingMode`], IEEE-754 literal support,
//! - an interned sort registry ([`sort`]),
//! - the hash-consed, well-sorted term DAG and its [`ast::TermManager`],
//! - the memoized structural [`rewrite::Rewriter`] with levels 0..=3,
//! - typed solver [`option::Options`], error types and statistics.
//!
//! # Examples
//!
//! ```
//! use quiver_core::ast::{Kind, TermManager};
//!
//! let mut tm = TermManager::new();
//! let bv8 = tm.mk_bv_sort(8);
//! let x = tm.mk_const(bv8, Some("x")).unwrap();
//! let y = tm.mk_const(bv8, Some("y")).unwrap();
//! let sum = tm.mk_term(Kind::BvAdd, &[x, y], &[]).unwrap();
//! assert_eq!(sum, tm.mk_term(Kind::BvAdd, &[y, x], &[]).unwrap());
//! ```

#![deny(unsafe_code)]

pub mod ast;
pub mod bv;
pub mod error;
pub mod fp;
pub mod option;
pub mod rewrite;
pub mod sort;
pub mod statistics;

pub use ast::{Kind, TermId, TermManager};
pub use bv::BvValue;
pub use error::{Error, Result};
pub use fp::{FpValue, RoundingMode};
pub use option::{OptionValue, Options, SynthMode};
pub use rewrite::{RewriteStats, Rewriter};
pub use sort::{Sort, SortId};
pub use statistics::{Statistics, Timer};
