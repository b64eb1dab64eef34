//! CLI command implementations.

pub mod cat;
pub mod fetch;
pub mod ls;
pub mod rm;
pub mod serve;
