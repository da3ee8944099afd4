// src/domain/params.rs

use serde::{Deserialize, Serialize};

use crate::infra::error::{ThError, ThResult};

/// 植被覆盖类型
///
/// 顺序即密度排序：截留逻辑依赖 `cov_type > Grasses` 的比较。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CoverType {
    Bare = 0,
    Grasses = 1,
    Shrubs = 2,
    Trees = 3,
    Conifer = 4,
}

/// HRU 地表类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HruType {
    Land,
    Lake,
}

/// 逐 HRU 静态参数集
///
/// 由外部参数源（控制/参数文件解析属协作方职责）提供，
/// 本层只读消费。所有向量长度必须等于 `nhru`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HruParameters {
    pub nhru: usize,
    /// 有序且唯一的空间标识（NHM 全国编号）
    pub nhm_id: Vec<u64>,
    pub hru_area: Vec<f64>,
    pub hru_type: Vec<HruType>,

    // --- 冠层 ---
    pub cov_type: Vec<CoverType>,
    /// 夏季覆盖度 [0,1]
    pub covden_sum: Vec<f64>,
    /// 冬季覆盖度 [0,1]
    pub covden_win: Vec<f64>,
    /// 夏季雨水截留容量 [inch]
    pub srain_intcp: Vec<f64>,
    /// 冬季雨水截留容量 [inch]
    pub wrain_intcp: Vec<f64>,
    /// 雪截留容量 [inch]
    pub snow_intcp: Vec<f64>,
    /// 升华占潜在蒸散比例
    pub potet_sublim: Vec<f64>,
    /// 蒸发皿系数
    pub epan_coef: Vec<f64>,

    // --- 气象订正 ---
    pub tmax_cbh_adj: Vec<f64>,
    pub tmin_cbh_adj: Vec<f64>,
    pub rain_cbh_adj: Vec<f64>,
    pub snow_cbh_adj: Vec<f64>,
    /// 混合事件雨比例订正
    pub adjmix_rain: Vec<f64>,
    /// 全雪温度阈值 [°F]
    pub tmax_allsnow: Vec<f64>,
    /// 全雨阈值偏移：tmax_allrain = tmax_allsnow + offset
    pub tmax_allrain_offset: Vec<f64>,

    // --- 度日法辐射 ---
    pub hru_slope: Vec<f64>,
    pub dday_slope: Vec<f64>,
    pub dday_intcp: Vec<f64>,
    pub radmax: Vec<f64>,
    /// 触发降水日订正的降水阈值 [inch]
    pub ppt_rad_adj: Vec<f64>,
    pub tmax_index: Vec<f64>,
    pub radadj_intcp: Vec<f64>,
    pub radadj_slope: Vec<f64>,
    /// 夏季降水日辐射订正系数
    pub radj_sppt: Vec<f64>,
    /// 冬季降水日辐射订正系数
    pub radj_wppt: Vec<f64>,

    // --- Jensen-Haise 蒸散 ---
    pub jh_coef: Vec<f64>,
    pub jh_coef_hru: Vec<f64>,
}

impl HruParameters {
    /// 以 NHM 典型默认值构造（测试与演示入口；生产值来自参数源）
    pub fn with_defaults(nhm_id: Vec<u64>) -> Self {
        let n = nhm_id.len();
        Self {
            nhru: n,
            nhm_id,
            hru_area: vec![100.0; n],
            hru_type: vec![HruType::Land; n],
            cov_type: vec![CoverType::Trees; n],
            covden_sum: vec![0.5; n],
            covden_win: vec![0.35; n],
            srain_intcp: vec![0.05; n],
            wrain_intcp: vec![0.05; n],
            snow_intcp: vec![0.1; n],
            potet_sublim: vec![0.5; n],
            epan_coef: vec![1.0; n],
            tmax_cbh_adj: vec![0.0; n],
            tmin_cbh_adj: vec![0.0; n],
            rain_cbh_adj: vec![1.0; n],
            snow_cbh_adj: vec![1.0; n],
            adjmix_rain: vec![1.0; n],
            tmax_allsnow: vec![32.0; n],
            tmax_allrain_offset: vec![6.0; n],
            hru_slope: vec![0.0; n],
            dday_slope: vec![0.4; n],
            dday_intcp: vec![-10.0; n],
            radmax: vec![0.8; n],
            ppt_rad_adj: vec![0.02; n],
            tmax_index: vec![50.0; n],
            radadj_intcp: vec![1.0; n],
            radadj_slope: vec![0.0; n],
            radj_sppt: vec![0.44; n],
            radj_wppt: vec![0.5; n],
            jh_coef: vec![0.014; n],
            jh_coef_hru: vec![13.0; n],
        }
    }

    /// 构造期完整性校验：长度、取值范围与标识唯一性
    pub fn validate(&self) -> ThResult<()> {
        let n = self.nhru;
        if n == 0 {
            return Err(ThError::validation("nhru 为零"));
        }

        let lengths: [(&str, usize); 29] = [
            ("nhm_id", self.nhm_id.len()),
            ("hru_area", self.hru_area.len()),
            ("hru_type", self.hru_type.len()),
            ("cov_type", self.cov_type.len()),
            ("covden_sum", self.covden_sum.len()),
            ("covden_win", self.covden_win.len()),
            ("srain_intcp", self.srain_intcp.len()),
            ("wrain_intcp", self.wrain_intcp.len()),
            ("snow_intcp", self.snow_intcp.len()),
            ("potet_sublim", self.potet_sublim.len()),
            ("epan_coef", self.epan_coef.len()),
            ("tmax_cbh_adj", self.tmax_cbh_adj.len()),
            ("tmin_cbh_adj", self.tmin_cbh_adj.len()),
            ("rain_cbh_adj", self.rain_cbh_adj.len()),
            ("snow_cbh_adj", self.snow_cbh_adj.len()),
            ("adjmix_rain", self.adjmix_rain.len()),
            ("tmax_allsnow", self.tmax_allsnow.len()),
            ("tmax_allrain_offset", self.tmax_allrain_offset.len()),
            ("hru_slope", self.hru_slope.len()),
            ("dday_slope", self.dday_slope.len()),
            ("dday_intcp", self.dday_intcp.len()),
            ("radmax", self.radmax.len()),
            ("ppt_rad_adj", self.ppt_rad_adj.len()),
            ("tmax_index", self.tmax_index.len()),
            ("radadj_intcp", self.radadj_intcp.len()),
            ("radadj_slope", self.radadj_slope.len()),
            ("radj_sppt", self.radj_sppt.len()),
            ("radj_wppt", self.radj_wppt.len()),
            ("jh_coef", self.jh_coef.len()),
        ];
        for (name, len) in lengths {
            if len != n {
                return Err(ThError::validation(format!(
                    "参数 '{}' 长度 {} != nhru {}",
                    name, len, n
                )));
            }
        }
        if self.jh_coef_hru.len() != n {
            return Err(ThError::validation(format!(
                "参数 'jh_coef_hru' 长度 {} != nhru {}",
                self.jh_coef_hru.len(),
                n
            )));
        }

        let mut seen = std::collections::HashSet::with_capacity(n);
        for &id in &self.nhm_id {
            if !seen.insert(id) {
                return Err(ThError::validation(format!("空间标识重复: {}", id)));
            }
        }

        for i in 0..n {
            for (name, v) in [
                ("covden_sum", self.covden_sum[i]),
                ("covden_win", self.covden_win[i]),
            ] {
                if !(0.0..=1.0).contains(&v) {
                    return Err(ThError::validation(format!(
                        "参数 '{}' [{}] = {} 超出 [0,1]",
                        name, i, v
                    )));
                }
            }
            if self.radmax[i] <= 0.0 || self.radmax[i] > 1.0 {
                return Err(ThError::validation(format!(
                    "参数 'radmax' [{}] = {} 超出 (0,1]",
                    i, self.radmax[i]
                )));
            }
            if self.hru_area[i] <= 0.0 {
                return Err(ThError::validation(format!(
                    "参数 'hru_area' [{}] 必须为正",
                    i
                )));
            }
            if self.epan_coef[i] <= 0.0 {
                return Err(ThError::validation(format!(
                    "参数 'epan_coef' [{}] 必须为正",
                    i
                )));
            }
        }
        Ok(())
    }
}
