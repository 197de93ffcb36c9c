//! # Error Handling
//!
//! Error taxonomy for albsync. Desired-state problems surface as validation or
//! reference-resolution errors before (or instead of) any mutating call;
//! provider failures are carried as [`GatewayError`] wrapped with the resource
//! and operation that was being attempted.

pub mod gateway;
pub mod types;

pub use gateway::{GatewayError, GatewayErrorCode, GatewayResult};
pub use types::{AlbError, GatewayContext, Result};
