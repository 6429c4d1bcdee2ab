// src/lib.rs
pub mod errors;
pub mod models;
pub mod rl;
pub mod utils;

pub use errors::{PlpError, PlpResult};
