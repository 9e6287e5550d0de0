//! Shared library modules for the oraclebench resolution benchmark.
//!
//! The `oraclebench` binary runs the benchmark; `bench_dash`, `fetch_cases`
//! and `analyze` reuse the same modules without duplicating code.

pub mod analysis;
pub mod config;
pub mod dashboard;
pub mod fetch;
pub mod llm;
pub mod market;
pub mod metrics;
pub mod pipeline;
pub mod runner;
pub mod store;
pub mod text;
pub mod validate;
pub mod verdict;
