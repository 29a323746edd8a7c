//! HTTP surface for the scoring engine.
//!
//! The engine is built once by the caller and handed in as an
//! `Arc<dyn Scorer>`; every request becomes one batch call on the blocking
//! pool.

pub mod adapter;
pub mod error;
pub mod protocol;
pub mod server;

pub use adapter::RequestAdapter;
pub use error::ApiError;
pub use server::{router, run, ServerConfig};
