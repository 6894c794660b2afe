// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # arvan-iaas
//!
//! Declarative, idempotent control of `ArvanCloud` IaaS servers, volume
//! attachments and image lookups.
//!
//! ## Overview
//!
//! Servers are created elsewhere. This crate adopts them by id and keeps
//! their mutable fields (name, power, rescue mode, flavor, disk size, image,
//! security groups) in line with a manifest by issuing server actions. Volume
//! attachments are created and removed; image names are resolved to ids.
//!
//! ## Architecture
//!
//! 1. **Desired state**: defined in `arvan-iaas.yaml`
//! 2. **Last applied state**: kept in `.arvan-iaas/state.json`
//! 3. **Reconciler**: diffs the two and drives each resource's lifecycle
//!
//! ## Modules
//!
//! - [`api`]: region-scoped endpoints, server actions, images, volumes
//! - [`config`]: manifest parsing and validation
//! - [`resource`]: lifecycle of servers, attachments and image lookups
//! - [`planner`]: diffs, ordered action plans and their execution
//! - [`reconciler`]: plan/apply/destroy over a whole manifest
//! - [`state`]: state storage
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! provider:
//!   timeout_secs: 30
//!
//! servers:
//!   - id: 6b1c2b0e-3f43-4a4c-9d86-1f0c6f6b9a11
//!     region: ir-thr-c2
//!     name: web-01
//!     power: on
//!     image:
//!       name: ubuntu-22.04
//!       type: distributions
//!     security_groups: [sg-web]
//!
//! volume_attachments:
//!   - region: ir-thr-c2
//!     server_id: 6b1c2b0e-3f43-4a4c-9d86-1f0c6f6b9a11
//!     volume_id: 0f8e3c52-8c1d-4b0e-9a7b-5d2e6c4f1a90
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod reconciler;
pub mod resource;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::{IaasClient, ServerAction, ServerActions};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, Manifest};
pub use error::{IaasError, Result};
pub use planner::{ActionPlan, ChangePlan, DiffEngine, PlanExecutor};
pub use reconciler::{ApplyReport, Reconciler};
pub use resource::{Diagnostics, Lifecycle, ResourceData};
pub use state::{LocalStateStore, ProviderState, StateStore};
