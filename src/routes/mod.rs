pub mod api;
pub mod auth;
pub mod cache;
pub mod health;

pub use api::create_api_routes;
pub use auth::create_auth_routes;
pub use cache::create_cache_routes;
pub use health::create_health_routes;
