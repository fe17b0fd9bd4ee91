//! REST API for crop analysis.
//!
//! One analysis route plus read-only lookups over the administrative
//! dataset and the crop catalog. The pipeline is blocking, so handlers
//! hand it to tokio's blocking pool.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::{status_for_kind, ApiError, AppError};
pub use router::create_router;
pub use state::AppState;
