//! Data Transfer Objects for the query API.

pub mod request;
pub mod response;

pub use request::*;
pub use response::*;
