pub mod approval;
pub mod requests;
pub mod role;
