// src/physics/process.rs

use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayView1};
use std::collections::BTreeMap;

use crate::forcing::state::ForcingStateContainer;
use crate::infra::error::{ThError, ThResult};

/// 物理过程单元统一接口
///
/// 驱动器每步先 `advance` 后 `calculate`；两者之间不得插入
/// 其它步的状态变更（严格顺序执行，见并发模型）。
pub trait ProcessUnit {
    fn name(&self) -> &'static str;

    /// 进入新步：快照上一步储量、选择本步系数、拉取滞后输入
    fn advance(&mut self, step_index: usize, atm: &ForcingStateContainer) -> ThResult<()>;

    /// 执行本步质量平衡并追加收支日志
    fn calculate(&mut self, atm: &ForcingStateContainer) -> ThResult<()>;

    fn budget(&self) -> &BudgetLog;

    fn budget_mut(&mut self) -> &mut BudgetLog;
}

/// 收支输出汇：日志冲刷的协作方接口（文件写出属外部职责）
pub trait OutputSink {
    fn write_record(
        &mut self,
        variable: &str,
        time: DateTime<Utc>,
        values: ArrayView1<'_, f64>,
    ) -> ThResult<()>;
}

/// 单条收支记录：时间戳 + 逐 HRU 值
#[derive(Debug, Clone)]
pub struct BudgetRecord {
    pub time: DateTime<Utc>,
    pub values: Array1<f64>,
}

/// 过程单元收支日志
///
/// 每个输出变量一条只追加的时间戳记录流。为避免长时段运行的
/// 无界累积，日志是显式有界缓冲：定期 `drain_to` 冲刷给输出汇，
/// 冲刷后缓冲清空、记录所有权移交。
#[derive(Debug)]
pub struct BudgetLog {
    variables: Vec<&'static str>,
    rows: BTreeMap<&'static str, Vec<BudgetRecord>>,
}

impl BudgetLog {
    pub fn new(variables: Vec<&'static str>) -> Self {
        let rows = variables.iter().map(|&v| (v, Vec::new())).collect();
        Self { variables, rows }
    }

    pub fn variables(&self) -> &[&'static str] {
        &self.variables
    }

    /// 追加一条记录；变量必须在构造时注册
    pub fn append(
        &mut self,
        variable: &'static str,
        time: DateTime<Utc>,
        values: Array1<f64>,
    ) -> ThResult<()> {
        let rows = self
            .rows
            .get_mut(variable)
            .ok_or_else(|| ThError::not_found(format!("收支变量 '{}' 未注册", variable)))?;
        rows.push(BudgetRecord { time, values });
        Ok(())
    }

    /// 已缓冲的步数（以首个变量计）
    pub fn len(&self) -> usize {
        self.variables
            .first()
            .map(|v| self.rows[v].len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self, variable: &str) -> ThResult<&[BudgetRecord]> {
        self.rows
            .get(variable)
            .map(|v| v.as_slice())
            .ok_or_else(|| ThError::not_found(format!("收支变量 '{}' 未注册", variable)))
    }

    /// 冲刷全部缓冲记录到输出汇，返回写出的记录条数
    pub fn drain_to(&mut self, sink: &mut dyn OutputSink) -> ThResult<usize> {
        let mut written = 0;
        for &var in &self.variables {
            let rows = self.rows.get_mut(var).expect("注册变量必有行缓冲");
            for rec in rows.drain(..) {
                sink.write_record(var, rec.time, rec.values.view())?;
                written += 1;
            }
        }
        Ok(written)
    }
}

/// 内存输出汇（测试与演示）
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<(String, DateTime<Utc>, Array1<f64>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for MemorySink {
    fn write_record(
        &mut self,
        variable: &str,
        time: DateTime<Utc>,
        values: ArrayView1<'_, f64>,
    ) -> ThResult<()> {
        self.records
            .push((variable.to_string(), time, values.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1979, 1, 3, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_append_and_records() {
        let mut log = BudgetLog::new(vec!["net_rain", "net_snow"]);
        log.append("net_rain", t0(), array![0.1, 0.2]).unwrap();
        assert_eq!(log.len(), 1);

        let recs = log.records("net_rain").unwrap();
        assert_eq!(recs[0].values.to_vec(), vec![0.1, 0.2]);

        // 未注册变量被拒绝
        assert!(log.append("foo", t0(), array![0.0]).is_err());
        assert!(log.records("foo").is_err());
    }

    #[test]
    fn test_drain_to_sink_empties_buffer() {
        let mut log = BudgetLog::new(vec!["net_rain"]);
        log.append("net_rain", t0(), array![0.1]).unwrap();
        log.append("net_rain", t0(), array![0.3]).unwrap();

        let mut sink = MemorySink::new();
        let n = log.drain_to(&mut sink).unwrap();
        assert_eq!(n, 2);
        assert!(log.is_empty());
        assert_eq!(sink.records.len(), 2);
        assert_eq!(sink.records[0].0, "net_rain");
    }
}
