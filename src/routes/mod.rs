pub mod admissions;
pub mod auth;
pub mod health;
pub mod labs;
pub mod members;
