//! # Flip Graph Search Engine
//!
//! A high-performance Rust library for finding fast matrix multiplication
//! schemes for square matrices in characteristic 2.
//!
//! This crate provides:
//! - A compact bitmask representation of rank-one trilinear terms with
//!   **incremental** collision tracking (which component values currently
//!   occur in two or more term slots).
//! - A randomized walk over the *flip graph* of symmetric decompositions,
//!   applying flip and plus transitions that preserve the bilinear identity
//!   while driving the number of nonzero terms down to a target rank.
//! - A deterministic GF(2) tensor validator for returned schemes.
//! - A parallel multi-run campaign driver.
//!
//! The flip and reduction operations are as described in:
//! M. Kauers and J. Moosbauer, *Flip Graphs for Matrix Multiplication*, 2022.
//! The plus transition is as described in:
//! Y. Arai, Y. Ichikawa, K. Hukushima, *Adaptive Flip Graph Algorithm for
//! Matrix Multiplication*, 2024.
//!
//! Decompositions carry either 3-way (cyclic) or 6-way (cyclic plus
//! reflective) symmetry; every transition is applied to a whole symmetry
//! orbit at once so the symmetry is preserved throughout the walk.
//!
//! ## Quick Start
//!
//! ```no_run
//! use flipgraph::campaign::{run_campaign, CampaignConfig};
//! use flipgraph::symmetry::Symm;
//!
//! // Search for Strassen-like 2x2 schemes from the identity-cube seed.
//! let cfg = CampaignConfig {
//!     dim: 2,
//!     diagonal_cubes: vec!["11".to_string()],
//!     target: 7,
//!     symm: Symm::Cyclic3,
//!     runs: 4,
//!     flimit: 10_000,
//!     seed: Some(12345),
//!     ..Default::default()
//! };
//! let summary = run_campaign(&cfg).expect("campaign should run");
//! println!("best rank seen: {:?}", summary.best_rank());
//! ```
//!
//! ## Driving the Engine Directly
//!
//! ```
//! use flipgraph::solver::{SolveParams, Solver};
//! use flipgraph::symmetry::Symm;
//!
//! // A tiny hand-rolled decomposition: two cyclic triples sharing values.
//! let masks = vec![3, 5, 9, 3, 5, 17];
//! let params = SolveParams {
//!     target: 3,
//!     flimit: 1_000,
//!     ..Default::default()
//! };
//! let mut solver = Solver::new(masks, Symm::Cyclic3, params);
//! let outcome = solver.run();
//! assert_eq!(outcome.flips % 3, 0);
//! ```
//!
//! ## Modules
//!
//! - [`dict`]: Bucketed dictionary specialized for the flip-graph hot loop.
//! - [`index`]: Coupled uniqueness/collision indices with O(1) sampling.
//! - [`symmetry`]: Symmetry orbit descriptors, slot partner tables, permits.
//! - [`state`]: Mutable decomposition state with incremental bookkeeping.
//! - [`solver`]: The single-threaded flip/plus transition engine.
//! - [`runfile`]: Whitespace-token solver interchange files.
//! - [`tensor`]: GF(2) bit cubes and the matrix multiplication target tensor.
//! - [`construction`]: Initial symmetric decompositions from seed cubes.
//! - [`validate`]: Deterministic verification of the bilinear identity.
//! - [`scheme`]: Human-readable solution files.
//! - [`campaign`]: Parallel multi-run orchestration.
//!
//! ## Performance Notes
//!
//! - Component bitmasks are `u64`, limiting matrices to 8x8 (64 cells).
//! - Flip bookkeeping is O(1) amortized per transition; a run performs no
//!   heap allocation after startup.
//! - The engine consumes a 32-bit Mersenne Twister strictly sequentially, so
//!   a run is a pure function of its input masks, parameters and seed.
//! - For maximum performance, compile with: `RUSTFLAGS="-C target-cpu=native" cargo build --release`

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::inline_always)] // Intentional for hot-path code
#![allow(clippy::many_single_char_names)] // Mathematical variable names
#![allow(clippy::needless_range_loop)] // Often clearer for slot indexing
#![allow(clippy::doc_markdown)] // Math notation in docs
#![allow(clippy::multiple_crate_versions)] // Cargo.lock management is external

pub mod campaign;
pub mod construction;
pub mod dict;
pub mod index;
pub mod runfile;
pub mod scheme;
pub mod solver;
pub mod state;
pub mod symmetry;
pub mod tensor;
pub mod validate;

/// Re-export commonly used types for convenience.
pub mod prelude {
    pub use crate::campaign::{run_campaign, CampaignConfig, CampaignSummary};
    pub use crate::construction::build_start;
    pub use crate::runfile::RunFile;
    pub use crate::solver::{ExitCode, Outcome, SolveParams, Solver};
    pub use crate::symmetry::Symm;
    pub use crate::validate::verify_slots;
}
