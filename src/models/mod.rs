pub mod admission;
pub mod lab;
pub mod member;
pub mod role;
pub mod user;
