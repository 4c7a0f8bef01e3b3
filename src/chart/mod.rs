//! Chart configuration and rendering-agnostic chart specs.

pub mod config;
pub mod spec;
