//! IAM Policy SDK
//!
//! Client-side evaluation of IAM policy expressions. The authorization
//! service answers a policy query with a condition tree; this crate parses
//! that tree, resolves `type.attribute` fields against the resource being
//! accessed and decides locally whether the subject may act on it.
//!
//! Compiles to native and, with the `wasm` feature, to WASM.

pub mod cache;
pub mod canonicalization;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod hash;
pub mod iam;
pub mod operator;
pub mod parser;
pub mod request;
pub mod types;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use config::IamConfig;
pub use context::AttributeStore;
pub use decision::Decision;
pub use error::{PolicyError, Result};
pub use evaluator::PolicyEvaluator;
pub use expression::Expression;
pub use iam::{Iam, PolicySource};
pub use request::{Action, MultiActionRequest, Request, Resource, ResourceNode, Subject};

/// Version of the SDK.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::config::IamConfig;
    pub use crate::context::AttributeStore;
    pub use crate::decision::Decision;
    pub use crate::error::{PolicyError, Result};
    pub use crate::evaluator::PolicyEvaluator;
    pub use crate::expression::Expression;
    pub use crate::iam::{Iam, PolicySource};
    pub use crate::parser::ActionPolicy;
    pub use crate::request::*;
    pub use crate::types::*;
}
