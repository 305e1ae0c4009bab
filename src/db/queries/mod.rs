pub mod requests;
pub mod user;
