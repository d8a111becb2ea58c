//! vitess-operator library.
//!
//! This crate primarily ships a `vitess-operator` binary, but we expose a
//! small library surface to enable integration testing and reuse.

pub mod config;
pub mod controller;
pub mod generator;
pub mod manifest;
pub mod normalizer;
pub mod selector;
pub mod store;
pub mod worker;
