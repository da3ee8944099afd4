// src/simulation/driver.rs

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::forcing::state::ForcingStateContainer;
use crate::infra::error::ThResult;
use crate::physics::process::ProcessUnit;

/// 运行摘要
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub steps_run: usize,
    pub first_time: DateTime<Utc>,
    pub last_time: DateTime<Utc>,
}

/// 顺序步进执行
///
/// 严格串行：每步先让各过程单元在容器当前位置上 advance + calculate，
/// 全部提交后才推进容器（即共享时钟）进入下一步——截留计算依赖
/// 上一步储量与滞后雪被记录，步间不存在可重叠的余地。步内的逐
/// HRU 计算是否整场并行由各单元的计算策略决定，与正确性无关。
///
/// 容器构造后已定位于起始时刻，因此第一迭代直接计算当前行，
/// 之后 advance；时间轴耗尽在下一次 advance 时以 Range 错误暴露。
pub fn run_steps(
    atm: &mut ForcingStateContainer,
    units: &mut [&mut dyn ProcessUnit],
    n_steps: usize,
) -> ThResult<RunSummary> {
    let first_time = atm.current_time();
    info!(
        "[Driver] 运行开始: {} 步, 起始 {}, {} 单元",
        n_steps,
        first_time,
        units.len()
    );

    for k in 0..n_steps {
        if k > 0 {
            atm.advance()?;
        }
        let step_index = atm.current_time_index();
        for unit in units.iter_mut() {
            unit.advance(step_index, atm)?;
            unit.calculate(atm)?;
        }
    }

    let summary = RunSummary {
        steps_run: n_steps,
        first_time,
        last_time: atm.current_time(),
    };
    info!(
        "[Driver] 运行结束: {} -> {}",
        summary.first_time, summary.last_time
    );
    Ok(summary)
}
