// Registry client bench - Library root for the harness binary and tests

pub mod bench;
pub mod error;
pub mod fixture;
pub mod models;
pub mod serialization;
pub mod variants;
