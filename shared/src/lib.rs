//! Shared types and models for the Doorworks ERP
//!
//! This crate holds the pure domain logic shared by the backend and the
//! browser forms (via WASM): status workflows, role groups, document
//! numbering and the money, aging and quantity arithmetic.

pub mod models;
pub mod numbering;
pub mod roles;
pub mod types;
pub mod validation;
pub mod workflow;

pub use models::*;
pub use roles::*;
pub use types::*;
pub use validation::*;
pub use workflow::{ensure_one_of, ensure_transition, parse_status, TransitionError, UnknownVariant, Workflow};
