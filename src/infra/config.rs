// src/infra/config.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::infra::error::{ThError, ThResult};
use crate::infra::time::SimulationClock;

/// 单步计算策略
///
/// Procedural 为逐 HRU 标量参考实现（可读性基准），
/// Vectorized 为整场数组实现（性能路径）。两者输出必须在
/// [`tolerances::STRATEGY_EQUIVALENCE_ATOL`](crate::infra::constants::tolerances)
/// 内一致，由性质测试保证。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalcStrategy {
    Procedural,
    Vectorized,
}

/// 生长季标志
///
/// 决定冠层选用夏季/冬季覆盖度与雨水截留容量，
/// 以及降水日辐射订正取夏/冬系数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    /// 生长季（蒸腾开启）
    Growing,
    /// 休眠季
    Dormant,
}

/// 运行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub project_name: String,
    pub start_time_iso: String,
    pub end_time_iso: Option<String>,
    /// 时间步长（整数小时，日步长为 24）
    pub time_step_hours: i64,
    pub strategy: CalcStrategy,
    pub season: Season,
    /// 强迫量观测高度 [m]
    pub height_m: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            project_name: "Untitled_Run".into(),
            start_time_iso: "1979-01-01T00:00:00Z".into(),
            end_time_iso: None,
            time_step_hours: 24,
            strategy: CalcStrategy::Vectorized,
            season: Season::Growing,
            height_m: None,
        }
    }
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            project_name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: CalcStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_season(mut self, season: Season) -> Self {
        self.season = season;
        self
    }

    pub fn with_time_step_hours(mut self, hours: i64) -> Self {
        self.time_step_hours = hours;
        self
    }

    pub fn start_time(&self) -> Result<DateTime<Utc>, String> {
        self.start_time_iso
            .parse()
            .map_err(|e| format!("起始时间解析失败 (需 ISO8601): {}", e))
    }

    pub fn end_time(&self) -> Result<Option<DateTime<Utc>>, String> {
        match &self.end_time_iso {
            None => Ok(None),
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|e| format!("结束时间解析失败 (需 ISO8601): {}", e)),
        }
    }

    /// 由配置构造模拟时钟
    pub fn build_clock(&self) -> ThResult<SimulationClock> {
        self.validate().map_err(ThError::config)?;
        let start = self.start_time().map_err(ThError::config)?;
        let end = self.end_time().map_err(ThError::config)?;
        SimulationClock::new(start, end, Duration::hours(self.time_step_hours))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.time_step_hours <= 0 {
            return Err("时间步长必须为正整数小时".into());
        }
        let start = self.start_time()?;
        if let Some(end) = self.end_time()? {
            if start >= end {
                return Err(format!("起始时间 {} 不早于结束时间 {}", start, end));
            }
        }
        Ok(())
    }
}
