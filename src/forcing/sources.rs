// src/forcing/sources.rs

//! 类型化强迫数据源接口
//!
//! 文件格式解析（CSV/NetCDF 等）属外部协作方职责；本层只定义
//! 已解析数据的类型化提供方，并附内存实现作为最小测试面。

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use std::collections::BTreeMap;

use crate::infra::constants::validation;
use crate::infra::error::{ThError, ThResult};

/// 逐变量表格源：一个源提供一个变量的完整时间序列
///
/// 约定与列式文件一致：时间轴单调、值矩阵 [time, space]，
/// 空间列顺序与参数源的 `nhm_id` 顺序一致。
pub trait TabularSource {
    /// 来源描述（日志与错误信息用）
    fn label(&self) -> &str;

    fn time_axis(&self) -> &[DateTime<Utc>];

    /// [time, space] 值矩阵
    fn values(&self) -> ArrayView2<'_, f64>;
}

/// 合并数据集源：单一句柄暴露共享时空轴上的多个命名变量
///
/// 变量可能同时存在原始名与 `_adj` 后缀的订正名，
/// 容器构造时默认偏好订正名（见 `ForcingStateContainer::from_dataset`）。
pub trait DatasetSource {
    fn label(&self) -> &str;

    fn time_axis(&self) -> &[DateTime<Utc>];

    fn spatial_id(&self) -> &[u64];

    fn variable_names(&self) -> Vec<String>;

    fn has_variable(&self, name: &str) -> bool {
        self.variable_names().iter().any(|v| v == name)
    }

    /// 读取变量的完整 [time, space] 记录；缺失时返回 NotFound
    fn read_variable(&self, name: &str) -> ThResult<Array2<f64>>;
}

fn validate_axis(label: &str, axis: &[DateTime<Utc>]) -> ThResult<()> {
    if axis.len() < validation::MIN_TIME_STEPS {
        return Err(ThError::data_load(
            label,
            format!(
                "时间步不足 (需要至少 {} 帧, 实际 {})",
                validation::MIN_TIME_STEPS,
                axis.len()
            ),
        ));
    }
    if axis.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ThError::data_load(label, "时间轴非单调递增"));
    }
    Ok(())
}

/// 内存表格源
#[derive(Debug, Clone)]
pub struct MemoryTable {
    label: String,
    time_axis: Vec<DateTime<Utc>>,
    values: Array2<f64>,
}

impl MemoryTable {
    pub fn new(
        label: impl Into<String>,
        time_axis: Vec<DateTime<Utc>>,
        values: Array2<f64>,
    ) -> ThResult<Self> {
        let label = label.into();
        validate_axis(&label, &time_axis)?;
        if values.nrows() != time_axis.len() {
            return Err(ThError::data_load(
                label.as_str(),
                format!(
                    "值矩阵行数 {} != 时间轴长度 {}",
                    values.nrows(),
                    time_axis.len()
                ),
            ));
        }
        Ok(Self {
            label,
            time_axis,
            values,
        })
    }
}

impl TabularSource for MemoryTable {
    fn label(&self) -> &str {
        &self.label
    }

    fn time_axis(&self) -> &[DateTime<Utc>] {
        &self.time_axis
    }

    fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }
}

/// 内存数据集源
#[derive(Debug, Clone)]
pub struct MemoryDataset {
    label: String,
    time_axis: Vec<DateTime<Utc>>,
    spatial_id: Vec<u64>,
    variables: BTreeMap<String, Array2<f64>>,
}

impl MemoryDataset {
    pub fn new(
        label: impl Into<String>,
        time_axis: Vec<DateTime<Utc>>,
        spatial_id: Vec<u64>,
    ) -> ThResult<Self> {
        let label = label.into();
        validate_axis(&label, &time_axis)?;
        if spatial_id.is_empty() {
            return Err(ThError::data_load(label.as_str(), "空间标识为空"));
        }
        Ok(Self {
            label,
            time_axis,
            spatial_id,
            variables: BTreeMap::new(),
        })
    }

    /// 插入一个命名变量（形状必须匹配共享轴）
    pub fn insert(&mut self, name: impl Into<String>, values: Array2<f64>) -> ThResult<()> {
        let name = name.into();
        let expected = (self.time_axis.len(), self.spatial_id.len());
        if values.dim() != expected {
            return Err(ThError::data_load(
                self.label.as_str(),
                format!("变量 '{}' 形状 {:?} != {:?}", name, values.dim(), expected),
            ));
        }
        self.variables.insert(name, values);
        Ok(())
    }
}

impl DatasetSource for MemoryDataset {
    fn label(&self) -> &str {
        &self.label
    }

    fn time_axis(&self) -> &[DateTime<Utc>] {
        &self.time_axis
    }

    fn spatial_id(&self) -> &[u64] {
        &self.spatial_id
    }

    fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    fn read_variable(&self, name: &str) -> ThResult<Array2<f64>> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| ThError::not_found(format!("{} 中无变量 '{}'", self.label, name)))
    }
}
