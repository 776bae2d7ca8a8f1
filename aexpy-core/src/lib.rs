//! AexPy core - API evolution analysis for Python packages.
//!
//! Releases flow through four stages, each producing a JSON product:
//!
//! ```text
//! preprocess → Distribution
//! extract    → ApiDescription   (inspector subprocess + enrichers)
//! diff       → ApiDifference    (constraints, ranking, optional verification)
//! report     → Report
//! ```
//!
//! Every stage runs inside [`produce::produce`], which stamps the product
//! with its creation time, duration, producer chain and final state, and
//! captures the log records emitted meanwhile.
//!
//! # Usage
//!
//! ```ignore
//! use aexpy_core::{diffing, extracting, reporting};
//!
//! let old = extracting::extract(&old_dist, &env, &options).into_result()?;
//! let new = extracting::extract(&new_dist, &env, &options).into_result()?;
//! let difference = diffing::diff(&old, &new, &Default::default()).into_result()?;
//! println!("{}", reporting::report(&difference).product.content);
//! ```

pub mod cache;
pub mod diffing;
pub mod environment;
pub mod error;
pub mod extracting;
pub mod io;
pub mod models;
pub mod preprocessing;
pub mod produce;
pub mod reporting;
pub mod typing;
pub mod verifying;

pub use cache::FileCache;
pub use diffing::{diff, DiffOptions, Differ};
pub use environment::{select_python, CurrentEnvironment, ExecutionEnvironment, VenvEnvironment};
pub use error::{Error, Result};
pub use extracting::{extract, ExtractOptions};
pub use models::{AnyProduct, ApiDescription, ApiDifference, BreakingRank, Distribution, Product, Release, Report};
pub use preprocessing::{preprocess, PreprocessOptions};
pub use produce::{CaptureLayer, ProduceContext};
pub use reporting::report;
pub use verifying::{Verifier, VerifyOptions};
