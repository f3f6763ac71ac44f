pub mod authorization;
pub mod document;
pub mod organization;
pub mod user;
pub mod wiki;
