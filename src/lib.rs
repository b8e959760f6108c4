pub mod admission;
pub mod app;
pub mod authz;
pub mod db;
pub mod errors;
pub mod events;
pub mod jwt;
pub mod membership;
pub mod models;
pub mod routes;
pub mod utils;

// Re-export commonly used items for tests
pub use app::create_app;
