//! HTTP API handlers for stash-engine

pub mod health;
pub mod recognize;
pub mod save;
pub mod vibe;

pub use health::health_routes;
pub use recognize::recognize_routes;
pub use save::save_routes;
pub use vibe::vibe_routes;
