// src/lib.rs

//! terrahydro — 分布式参数陆面水文模拟核心
//!
//! 以水文响应单元 (HRU) 为空间离散的陆面过程模拟器：共享模拟时钟
//! 逐步推进，每步更新大气强迫状态与物理储量过程。
//!
//! # 模块概览
//!
//! - [`infra`]: 基础设施（错误、时钟、常数、配置、日志）
//! - [`domain`]: 静态参数域（逐 HRU 参数表、覆被类型）
//! - [`forcing`]: 大气强迫（状态容器、数据源、太阳几何表、派生量订正）
//! - [`physics`]: 物理过程单元（冠层截留范例、收支日志）
//! - [`simulation`]: 顺序步进驱动
//!
//! # 控制流
//!
//! ```text
//! driver ─> ForcingStateContainer.advance() ─> SimulationClock
//!        ─> ProcessUnit.advance(step) / calculate()
//!               └─> get_current_state(var) ─> BudgetLog
//! ```

pub mod domain;
pub mod forcing;
pub mod infra;
pub mod physics;
pub mod simulation;

// 重导出核心类型
pub use forcing::solar::SolarGeometryTable;
pub use forcing::state::{ForcingStateContainer, ForcingVar, VariableData};
pub use infra::config::{CalcStrategy, RunConfig, Season};
pub use infra::error::{ThError, ThResult};
pub use infra::time::SimulationClock;
pub use physics::canopy::Canopy;
pub use physics::process::{BudgetLog, MemorySink, OutputSink, ProcessUnit};
