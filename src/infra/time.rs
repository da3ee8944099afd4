// src/infra/time.rs

use chrono::{DateTime, Duration, Utc};

use crate::infra::constants::validation;
use crate::infra::error::{ThError, ThResult};

/// 模拟时钟
///
/// 持有时间边界与当前步指针的纯状态机，内部始终使用 UTC。
/// 不变量：`current_time = start_time + current_time_index * time_step`；
/// 当 `end_time` 存在时 `current_time` 不得越过它。
///
/// 生命周期：构造一次，仅由 [`advance`](Self::advance) 推进，从不重置。
/// 耗尽没有终止态对象，只在下一次 `advance` 尝试时以 Range 错误暴露。
#[derive(Debug, Clone)]
pub struct SimulationClock {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    time_step: Duration,
    current_time: DateTime<Utc>,
    current_time_index: usize,
}

impl SimulationClock {
    /// 由显式边界构造，初始位于 `start_time` (索引 0)
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        time_step: Duration,
    ) -> ThResult<Self> {
        if time_step <= Duration::zero() {
            return Err(ThError::config(format!("时间步长必须为正: {}", time_step)));
        }
        if let Some(end) = end_time {
            if start_time >= end {
                return Err(ThError::config(format!(
                    "起始时间 {} 不早于结束时间 {}",
                    start_time, end
                )));
            }
        }
        Ok(Self {
            start_time,
            end_time,
            time_step,
            current_time: start_time,
            current_time_index: 0,
        })
    }

    /// 由外部时间轴构造：步长取相邻条目的恒定差值
    ///
    /// 间隔不恒定时以 InconsistentTimestep 失败，防止半有效时钟流入运行期。
    pub fn from_axis(axis: &[DateTime<Utc>]) -> ThResult<Self> {
        if axis.len() < validation::MIN_TIME_STEPS {
            return Err(ThError::config(format!(
                "时间轴条目不足 (需要至少 {} 帧, 实际 {})",
                validation::MIN_TIME_STEPS,
                axis.len()
            )));
        }
        let step = axis[1] - axis[0];
        if step <= Duration::zero() {
            return Err(ThError::inconsistent_timestep("时间轴非单调递增"));
        }
        for (k, w) in axis.windows(2).enumerate() {
            let d = w[1] - w[0];
            if d != step {
                return Err(ThError::inconsistent_timestep(format!(
                    "第 {} 段间隔 {} != 首段间隔 {}",
                    k + 1,
                    d,
                    step
                )));
            }
        }
        Ok(Self {
            start_time: axis[0],
            end_time: Some(axis[axis.len() - 1]),
            time_step: step,
            current_time: axis[0],
            current_time_index: 0,
        })
    }

    /// 推进一步
    ///
    /// 若结果将越过 `end_time` 则失败，时钟保持原位。
    pub fn advance(&mut self) -> ThResult<()> {
        let next = self.current_time + self.time_step;
        if let Some(end) = self.end_time {
            if next > end {
                return Err(ThError::range(format!(
                    "advance 越过 end_time: {} > {}",
                    next, end
                )));
            }
        }
        self.current_time = next;
        self.current_time_index += 1;
        Ok(())
    }

    /// 将时钟定位到指定时刻（必须恰好落在步长网格上且在边界内）
    ///
    /// 用于从时间轴中段启动的容器构造；运行期不得再次调用。
    pub fn seek(&mut self, time: DateTime<Utc>) -> ThResult<()> {
        let offset = time - self.start_time;
        if offset < Duration::zero() {
            return Err(ThError::range(format!(
                "目标时刻 {} 早于起始时间 {}",
                time, self.start_time
            )));
        }
        if let Some(end) = self.end_time {
            if time > end {
                return Err(ThError::range(format!(
                    "目标时刻 {} 晚于结束时间 {}",
                    time, end
                )));
            }
        }
        let step_ms = self.time_step.num_milliseconds();
        let offset_ms = offset.num_milliseconds();
        if offset_ms % step_ms != 0 {
            return Err(ThError::range(format!(
                "目标时刻 {} 不在时间步网格上 (步长 {})",
                time, self.time_step
            )));
        }
        self.current_time = time;
        self.current_time_index = (offset_ms / step_ms) as usize;
        Ok(())
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn time_step(&self) -> Duration {
        self.time_step
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        self.current_time
    }

    pub fn current_time_index(&self) -> usize {
        self.current_time_index
    }

    /// 有界时钟的总步数（含起止两端）
    pub fn n_steps(&self) -> Option<usize> {
        self.end_time.map(|end| {
            let span = (end - self.start_time).num_milliseconds();
            (span / self.time_step.num_milliseconds()) as usize + 1
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(iso: &str) -> DateTime<Utc> {
        iso.parse().unwrap()
    }

    #[test]
    fn test_advance_law() {
        // 第 k 次 advance 后 current_time = start + k*step
        let start = t("1979-01-01T00:00:00Z");
        let mut clock =
            SimulationClock::new(start, Some(t("1979-01-06T00:00:00Z")), Duration::days(1))
                .unwrap();
        assert_eq!(clock.current_time_index(), 0);
        for k in 1..=5 {
            clock.advance().unwrap();
            assert_eq!(clock.current_time(), start + Duration::days(k));
            assert_eq!(clock.current_time_index(), k as usize);
        }
        // 第 6 次越界，时钟保持原位
        assert!(matches!(clock.advance(), Err(ThError::Range(_))));
        assert_eq!(clock.current_time_index(), 5);
    }

    #[test]
    fn test_unbounded_clock() {
        let mut clock =
            SimulationClock::new(t("1979-01-01T00:00:00Z"), None, Duration::hours(1)).unwrap();
        for _ in 0..100 {
            clock.advance().unwrap();
        }
        assert_eq!(clock.current_time_index(), 100);
    }

    #[test]
    fn test_invalid_bounds() {
        let r = SimulationClock::new(
            t("1979-01-02T00:00:00Z"),
            Some(t("1979-01-01T00:00:00Z")),
            Duration::days(1),
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_from_axis_infers_step() {
        let axis: Vec<DateTime<Utc>> = (0..4)
            .map(|d| Utc.with_ymd_and_hms(1979, 1, 1 + d, 0, 0, 0).unwrap())
            .collect();
        let clock = SimulationClock::from_axis(&axis).unwrap();
        assert_eq!(clock.time_step(), Duration::days(1));
        assert_eq!(clock.n_steps(), Some(4));
    }

    #[test]
    fn test_from_axis_inconsistent_step() {
        let axis = vec![
            t("1979-01-01T00:00:00Z"),
            t("1979-01-02T00:00:00Z"),
            t("1979-01-04T00:00:00Z"),
        ];
        assert!(matches!(
            SimulationClock::from_axis(&axis),
            Err(ThError::InconsistentTimestep(_))
        ));
    }

    #[test]
    fn test_seek() {
        let axis: Vec<DateTime<Utc>> = (0..6)
            .map(|d| Utc.with_ymd_and_hms(1979, 1, 1 + d, 0, 0, 0).unwrap())
            .collect();
        let mut clock = SimulationClock::from_axis(&axis).unwrap();
        clock.seek(axis[2]).unwrap();
        assert_eq!(clock.current_time_index(), 2);

        // 网格外时刻被拒绝
        assert!(clock.seek(t("1979-01-03T12:00:00Z")).is_err());
        // 轴外时刻被拒绝
        assert!(clock.seek(t("1980-01-01T00:00:00Z")).is_err());
    }
}
