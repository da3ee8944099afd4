// src/forcing/state.rs

use chrono::{DateTime, Utc};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::params::HruParameters;
use crate::forcing::sources::{DatasetSource, TabularSource};
use crate::infra::error::{ThError, ThResult};
use crate::infra::time::SimulationClock;

/// 强迫变量注册表
///
/// 固定的类型化名字集合：注册表之外的名字在 get/set 两侧都以
/// NotFound 失败，不存在未经检查的动态属性。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ForcingVar {
    /// 降水 [inch]
    Prcp,
    /// 日最高气温 [°F]
    Tmax,
    /// 日最低气温 [°F]
    Tmin,
    /// 平均相对湿度 [%]
    Rhavg,
    /// 降雨（相态分割产物）[inch]
    Rainfall,
    /// 降雪（相态分割产物）[inch]
    Snowfall,
    /// 短波辐射（度日法产物）[langley/day]
    Swrad,
    /// 潜在蒸散（Jensen-Haise 产物）[inch]
    Potet,
}

impl ForcingVar {
    pub const ALL: [ForcingVar; 8] = [
        ForcingVar::Prcp,
        ForcingVar::Tmax,
        ForcingVar::Tmin,
        ForcingVar::Rhavg,
        ForcingVar::Rainfall,
        ForcingVar::Snowfall,
        ForcingVar::Swrad,
        ForcingVar::Potet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ForcingVar::Prcp => "prcp",
            ForcingVar::Tmax => "tmax",
            ForcingVar::Tmin => "tmin",
            ForcingVar::Rhavg => "rhavg",
            ForcingVar::Rainfall => "rainfall",
            ForcingVar::Snowfall => "snowfall",
            ForcingVar::Swrad => "swrad",
            ForcingVar::Potet => "potet",
        }
    }

    /// 数据集中的订正名（`_adj` 后缀）
    pub fn adjusted_name(&self) -> String {
        format!("{}_adj", self.as_str())
    }

    /// 解析注册表内的原始名；未注册名 => NotFound
    pub fn parse(name: &str) -> ThResult<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == name)
            .ok_or_else(|| ThError::not_found(format!("变量 '{}' 不在注册表内", name)))
    }

    /// 解析数据集变量名，识别 `_adj` 后缀
    ///
    /// 返回 (注册变量, 是否显式请求订正形式)。
    pub fn parse_dataset_name(name: &str) -> ThResult<(Self, bool)> {
        match name.strip_suffix("_adj") {
            Some(raw) => Ok((Self::parse(raw)?, true)),
            None => Ok((Self::parse(name)?, false)),
        }
    }
}

impl std::fmt::Display for ForcingVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 变量的持有模式
///
/// - Markov: 只持有当前瞬时的单缓冲，无历史
/// - Timeseries: 持有完整 [time, space] 记录，当前行由时钟索引选定
#[derive(Debug, Clone)]
pub enum VariableData {
    Markov(Array1<f64>),
    Timeseries(Array2<f64>),
}

impl VariableData {
    pub fn n_space(&self) -> usize {
        match self {
            VariableData::Markov(a) => a.len(),
            VariableData::Timeseries(m) => m.ncols(),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            VariableData::Markov(_) => "markov",
            VariableData::Timeseries(_) => "timeseries",
        }
    }
}

/// 显式状态映射：绕过文件 IO 直接喂给容器的最小接口面
#[derive(Debug, Clone)]
pub struct StateMap {
    pub datetime: Vec<DateTime<Utc>>,
    pub spatial_id: Vec<u64>,
    pub variables: BTreeMap<ForcingVar, Array2<f64>>,
}

/// 时间-空间双索引的强迫状态容器
///
/// 包裹一只 [`SimulationClock`]，按名字持有时间对齐的状态变量，
/// 以时钟索引对外提供"当前状态"。不变量：
/// - 每个 timeseries 变量的时间维 == 时钟时间轴长度
/// - 每个变量的空间维 == `spatial_id` 长度
/// - 变量构造后只覆写，从不移除
pub struct ForcingStateContainer {
    clock: SimulationClock,
    datetime: Option<Vec<DateTime<Utc>>>,
    spatial_id: Vec<u64>,
    height_m: Option<f64>,
    variables: BTreeMap<ForcingVar, VariableData>,
    /// param_adjust 的一次性闸（重复订正会在已订正值上再订正）
    pub(crate) adjusted: bool,
}

fn check_spatial_ids(spatial_id: &[u64]) -> ThResult<()> {
    if spatial_id.is_empty() {
        return Err(ThError::validation("空间标识为空"));
    }
    let mut seen = std::collections::HashSet::with_capacity(spatial_id.len());
    for &id in spatial_id {
        if !seen.insert(id) {
            return Err(ThError::validation(format!("空间标识重复: {}", id)));
        }
    }
    Ok(())
}

impl ForcingStateContainer {
    // ========================================================================
    // 构造：三种互斥数据源，产出等价容器
    // ========================================================================

    /// 由显式时钟边界构造（无时间轴，变量以 markov 模式持有）
    pub fn with_bounds(
        clock: SimulationClock,
        spatial_id: Vec<u64>,
        height_m: Option<f64>,
    ) -> ThResult<Self> {
        check_spatial_ids(&spatial_id)?;
        Ok(Self {
            clock,
            datetime: None,
            spatial_id,
            height_m,
            variables: BTreeMap::new(),
            adjusted: false,
        })
    }

    /// 由显式 name→array 映射构造 (timeseries 模式)
    ///
    /// `start_time` 必须落在所给时间轴上，否则以 Range 失败；
    /// 时钟定位到该条目的索引处。
    pub fn from_state_map(
        map: StateMap,
        start_time: DateTime<Utc>,
        height_m: Option<f64>,
    ) -> ThResult<Self> {
        check_spatial_ids(&map.spatial_id)?;
        let mut clock = SimulationClock::from_axis(&map.datetime)?;
        clock.seek(start_time)?;

        let n_time = map.datetime.len();
        let nhru = map.spatial_id.len();
        let mut variables = BTreeMap::new();
        for (var, arr) in map.variables {
            if arr.dim() != (n_time, nhru) {
                return Err(ThError::misaligned(format!(
                    "变量 '{}' 形状 {:?} != ({}, {})",
                    var,
                    arr.dim(),
                    n_time,
                    nhru
                )));
            }
            variables.insert(var, VariableData::Timeseries(arr));
        }

        info!(
            "[ForcingState] 状态映射装载完成: {} 变量, {} 步 x {} HRU",
            variables.len(),
            n_time,
            nhru
        );

        Ok(Self {
            clock,
            datetime: Some(map.datetime),
            spatial_id: map.spatial_id,
            height_m,
            variables,
            adjusted: false,
        })
    }

    /// 由逐变量表格源集合构造
    ///
    /// 每个源提供一个变量的完整时间序列；所有源的时间轴必须逐条
    /// 相同（否则 MisalignedAxes），时钟取自共享轴。
    pub fn from_tabular_sources(
        sources: &[(ForcingVar, &dyn TabularSource)],
        spatial_id: Vec<u64>,
        start_time: DateTime<Utc>,
        height_m: Option<f64>,
    ) -> ThResult<Self> {
        check_spatial_ids(&spatial_id)?;
        let (first_var, first) = sources
            .first()
            .ok_or_else(|| ThError::config("未提供任何表格源"))?;
        let axis = first.time_axis().to_vec();

        let nhru = spatial_id.len();
        let mut variables = BTreeMap::new();
        for (var, src) in sources {
            if src.time_axis() != axis.as_slice() {
                return Err(ThError::misaligned(format!(
                    "源 '{}' ({}) 的时间轴与 '{}' ({}) 不一致",
                    src.label(),
                    var,
                    first.label(),
                    first_var
                )));
            }
            let values = src.values();
            if values.ncols() != nhru {
                return Err(ThError::misaligned(format!(
                    "源 '{}' 空间列数 {} != spatial_id 长度 {}",
                    src.label(),
                    values.ncols(),
                    nhru
                )));
            }
            variables.insert(*var, VariableData::Timeseries(values.to_owned()));
        }

        let mut clock = SimulationClock::from_axis(&axis)?;
        clock.seek(start_time)?;

        info!(
            "[ForcingState] 表格源装载完成: {} 变量, 时间范围 {} -> {}",
            variables.len(),
            axis[0],
            axis[axis.len() - 1]
        );

        Ok(Self {
            clock,
            datetime: Some(axis),
            spatial_id,
            height_m,
            variables,
            adjusted: false,
        })
    }

    /// 由合并数据集源构造
    ///
    /// `read_vars` 为 None 时读取注册表内在源中存在的全部变量，
    /// 原始名与订正名并存时偏好订正名；显式给出 `read_vars` 时
    /// 逐名精确读取（请求原始名即读原始值），缺失以 NotFound 失败。
    /// `params` 用于空间标识交叉校验。
    pub fn from_dataset(
        source: &dyn DatasetSource,
        params: &HruParameters,
        read_vars: Option<&[&str]>,
        start_time: DateTime<Utc>,
        height_m: Option<f64>,
    ) -> ThResult<Self> {
        if source.spatial_id() != params.nhm_id.as_slice() {
            return Err(ThError::misaligned(format!(
                "数据集 '{}' 的空间标识与参数源不一致",
                source.label()
            )));
        }

        // 名字解析：显式列表精确读取，缺省列表按偏好规则扫描注册表
        let mut resolved: Vec<(ForcingVar, String)> = Vec::new();
        match read_vars {
            Some(names) => {
                for name in names {
                    let (var, _explicit_adj) = ForcingVar::parse_dataset_name(name)?;
                    if !source.has_variable(name) {
                        return Err(ThError::not_found(format!(
                            "数据集 '{}' 中无变量 '{}'",
                            source.label(),
                            name
                        )));
                    }
                    resolved.push((var, name.to_string()));
                }
            }
            None => {
                for var in ForcingVar::ALL {
                    let adj = var.adjusted_name();
                    if source.has_variable(&adj) {
                        resolved.push((var, adj));
                    } else if source.has_variable(var.as_str()) {
                        resolved.push((var, var.as_str().to_string()));
                    }
                }
                if resolved.is_empty() {
                    return Err(ThError::data_load(
                        source.label(),
                        "数据集中没有任何已注册变量",
                    ));
                }
            }
        }

        let axis = source.time_axis().to_vec();
        let nhru = params.nhm_id.len();
        let mut variables = BTreeMap::new();
        for (var, source_name) in &resolved {
            let arr = source.read_variable(source_name)?;
            if arr.dim() != (axis.len(), nhru) {
                return Err(ThError::misaligned(format!(
                    "变量 '{}' 形状 {:?} != ({}, {})",
                    source_name,
                    arr.dim(),
                    axis.len(),
                    nhru
                )));
            }
            debug!("[ForcingState] 读取 '{}' <- '{}'", var, source_name);
            variables.insert(*var, VariableData::Timeseries(arr));
        }

        let mut clock = SimulationClock::from_axis(&axis)?;
        clock.seek(start_time)?;

        info!(
            "[ForcingState] 数据集 '{}' 装载完成: {} 变量, {} 步 x {} HRU",
            source.label(),
            variables.len(),
            axis.len(),
            nhru
        );

        Ok(Self {
            clock,
            datetime: Some(axis),
            spatial_id: params.nhm_id.clone(),
            height_m,
            variables,
            adjusted: false,
        })
    }

    // ========================================================================
    // 访问
    // ========================================================================

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        self.clock.current_time()
    }

    pub fn current_time_index(&self) -> usize {
        self.clock.current_time_index()
    }

    pub fn datetime(&self) -> Option<&[DateTime<Utc>]> {
        self.datetime.as_deref()
    }

    pub fn spatial_id(&self) -> &[u64] {
        &self.spatial_id
    }

    pub fn nhru(&self) -> usize {
        self.spatial_id.len()
    }

    pub fn height_m(&self) -> Option<f64> {
        self.height_m
    }

    /// 已装载变量（注册表顺序）
    pub fn variables(&self) -> Vec<ForcingVar> {
        self.variables.keys().copied().collect()
    }

    pub fn contains(&self, var: ForcingVar) -> bool {
        self.variables.contains_key(&var)
    }

    /// 整个变量（timeseries 为全记录，markov 为唯一缓冲）
    pub fn get(&self, var: ForcingVar) -> ThResult<&VariableData> {
        self.variables
            .get(&var)
            .ok_or_else(|| ThError::not_found(format!("变量 '{}' 未装载", var)))
    }

    /// 按原始名访问（未注册名 => NotFound）
    pub fn get_named(&self, name: &str) -> ThResult<&VariableData> {
        self.get(ForcingVar::parse(name)?)
    }

    /// 取 timeseries 记录；markov 模式变量 => Validation
    pub fn get_timeseries(&self, var: ForcingVar) -> ThResult<&Array2<f64>> {
        match self.get(var)? {
            VariableData::Timeseries(m) => Ok(m),
            VariableData::Markov(_) => Err(ThError::validation(format!(
                "变量 '{}' 为 markov 模式, 无完整时间序列",
                var
            ))),
        }
    }

    /// 覆写变量（形状在写入前校验）
    pub fn set(&mut self, var: ForcingVar, data: VariableData) -> ThResult<()> {
        let nhru = self.nhru();
        match &data {
            VariableData::Markov(a) => {
                if a.len() != nhru {
                    return Err(ThError::misaligned(format!(
                        "变量 '{}' 空间维 {} != {}",
                        var,
                        a.len(),
                        nhru
                    )));
                }
            }
            VariableData::Timeseries(m) => {
                let n_time = self
                    .datetime
                    .as_ref()
                    .map(|a| a.len())
                    .ok_or_else(|| {
                        ThError::misaligned(format!(
                            "容器无时间轴, 变量 '{}' 不能以 timeseries 模式写入",
                            var
                        ))
                    })?;
                if m.dim() != (n_time, nhru) {
                    return Err(ThError::misaligned(format!(
                        "变量 '{}' 形状 {:?} != ({}, {})",
                        var,
                        m.dim(),
                        n_time,
                        nhru
                    )));
                }
            }
        }
        self.variables.insert(var, data);
        Ok(())
    }

    /// 按原始名覆写（未注册名 => NotFound）
    pub fn set_named(&mut self, name: &str, data: VariableData) -> ThResult<()> {
        self.set(ForcingVar::parse(name)?, data)
    }

    pub fn set_timeseries(&mut self, var: ForcingVar, values: Array2<f64>) -> ThResult<()> {
        self.set(var, VariableData::Timeseries(values))
    }

    pub fn set_markov(&mut self, var: ForcingVar, values: Array1<f64>) -> ThResult<()> {
        self.set(var, VariableData::Markov(values))
    }

    /// 当前步状态：过程单元的主读取路径
    ///
    /// timeseries 变量取时钟索引所在行；markov 变量的"当前"
    /// 定义上即其唯一缓冲。
    pub fn get_current_state(&self, var: ForcingVar) -> ThResult<ArrayView1<'_, f64>> {
        match self.get(var)? {
            VariableData::Markov(a) => Ok(a.view()),
            VariableData::Timeseries(m) => Ok(m.row(self.clock.current_time_index())),
        }
    }

    /// 推进一步：委托给时钟
    ///
    /// markov 模式无数据效应；timeseries 模式仅移动
    /// `get_current_state` 选定的行。
    pub fn advance(&mut self) -> ThResult<()> {
        self.clock.advance()
    }
}
