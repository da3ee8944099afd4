// src/simulation/mod.rs

//! 顺序步进驱动。

pub mod driver;

pub use driver::{run_steps, RunSummary};
