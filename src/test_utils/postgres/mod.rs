/// `PostgreSQL` embedded server lifecycle
pub mod embedded;

pub use embedded::*;
