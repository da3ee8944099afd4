// src/forcing/mod.rs

//! 大气强迫管理 (Forcing Management)
//!
//! 本模块负责强迫状态的装载、按步取值与派生量订正，包括：
//! - 时间/空间双索引的状态容器（markov 与 timeseries 两种持有模式）
//! - 类型化数据源接口（逐变量表格源、合并数据集源、内存映射）
//! - NHM 订正链：降水相态分割、度日法短波辐射、Jensen-Haise 潜在蒸散
//! - 太阳几何查找表（外部预计算，只读）

pub mod adjust;
pub mod solar;
pub mod sources;
pub mod state;
