//! # Flowtune: Taguchi L8 Experiments for Generative-Text Pipelines
//!
//! **Version**: 0.1.0
//!
//! Flowtune explores 4–7 two-level configuration variables with 8 trials from
//! a fixed orthogonal array instead of exhaustive search. Each trial is
//! generated, scored by an automated judge, and measured for cost and
//! latency. A completed run yields per-variable contributions to utility and
//! a non-dominated frontier across objectives.
//!
//! ## Components (leaves first)
//!
//! - [`design`]: L8 orthogonal array → 8 trial configurations
//! - [`cache`] + [`kv`]: content-addressed judge response cache
//! - [`judge`]: rubric scoring with payload recovery and retries
//! - [`trial`]: one configuration end to end
//! - [`experiment`]: sequencing, persistence, resume, utility
//! - [`analysis`]: main effects and Pareto frontier
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: Failures stop the run with trial index and configuration attached
//! - **Poka-Yoke**: Invalid designs are rejected at construction, never at runtime
//! - **Genchi Genbutsu**: Every trial snapshot is persisted before the next starts
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use flowtune::design::{generate, Variable};
//!
//! let variables = vec![
//!     Variable::new("model", "small", "large")?,
//!     Variable::new("temperature", 0.3, 0.7)?,
//!     Variable::new("context", "short", "full")?,
//!     Variable::new("strategy", "standard", "cot")?,
//! ];
//!
//! for trial in generate(&variables)? {
//!     println!("trial {}: {}", trial.index(), trial.describe());
//! }
//! # Ok::<(), flowtune::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analysis;
pub mod cache;
pub mod design;
pub mod error;
pub mod experiment;
pub mod judge;
pub mod kv;
pub mod logging;
pub mod topk;
pub mod trial;

pub use error::{Error, Result};
