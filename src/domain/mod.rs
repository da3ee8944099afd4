// src/domain/mod.rs

//! 静态参数域：逐 HRU 参数表与类型标记。

pub mod params;

pub use params::{CoverType, HruParameters, HruType};
