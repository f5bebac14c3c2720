//! Language-aware label and description resolution for graph resources.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
