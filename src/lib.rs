//! # Recommendation Planner
//!
//! Turns a noisy, duplicated, sometimes contradictory pool of machine-generated
//! recommendations into one ordered, non-redundant implementation plan.
//!
//! ## Components
//!
//! - **Normalizer** ([`recommendation::normalize`]): comparison keys and term sets
//! - **Clustering** ([`clustering`]): cross-source similarity, union-find grouping, merging
//! - **Consensus** ([`consensus`]): agreement between engines that analyzed the same input
//! - **Dependency graph** ([`dependency`]): inferred edges, cycles, depth, ordering
//! - **Pipeline** ([`pipeline`]): all of the above behind one call
//!
//! ## Flow
//!
//! ```text
//! engine outputs → Consensus ┐
//!                            ▼
//! recommendations ────► Clustering ──► Dependency graph ──► ordered plan + diagnostics
//! ```
//!
//! ## Example
//!
//! ```
//! use recommendation_planner::{Config, ImplementationPlanner, PlanInput, Recommendation};
//! use recommendation_planner::clustering::TermOverlapScorer;
//! use recommendation_planner::consensus::InMemoryResolutionLog;
//!
//! let planner = ImplementationPlanner::new(&Config::default()).unwrap();
//! let input = PlanInput::new(vec![
//!     Recommendation::new("deploy", "Deploy model", "report-a")
//!         .with_description("This requires model training"),
//!     Recommendation::new("train", "Train model", "report-a"),
//! ]);
//! let plan = planner
//!     .plan(input, &mut TermOverlapScorer::new(), &mut InMemoryResolutionLog::new())
//!     .unwrap();
//! assert_eq!(plan.ordered()[0].id, "train");
//! ```
//!
//! Everything is synchronous and in memory. The only I/O is the optional
//! [`consensus::JsonlResolutionLog`].

#![warn(missing_docs)]

/// Cross-source similarity detection and consolidation.
pub mod clustering;
/// Configuration for every component.
pub mod config;
/// Multi-engine consensus resolution.
pub mod consensus;
/// Dependency inference and implementation ordering.
pub mod dependency;
/// Non-fatal data-quality warnings.
pub mod diagnostics;
/// Error types and result aliases.
pub mod error;
/// End-to-end planning.
pub mod pipeline;
/// Recommendation data model and normalization.
pub mod recommendation;

pub use config::Config;
pub use error::{PlanError, PlanResult};
pub use pipeline::{ImplementationPlan, ImplementationPlanner, PlanInput};
pub use recommendation::{Priority, Recommendation};
