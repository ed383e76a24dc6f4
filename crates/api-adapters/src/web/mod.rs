//! axum routers for the art and social services.

pub mod art;
pub mod error;
pub mod middleware;
pub mod social;

pub use art::{ArtState, StaticAssets};
pub use error::{ApiError, ApiResult};
pub use social::SocialState;
