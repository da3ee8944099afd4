// src/forcing/solar.rs

use chrono::{DateTime, Datelike, Utc};
use ndarray::{Array2, ArrayView1};

use crate::infra::constants::physics::MAX_DAY_OF_YEAR;
use crate::infra::error::{ThError, ThResult};

/// 太阳几何查找表
///
/// 由纬度/坡度/坡向参数一次性预计算（预计算属协作方职责），
/// 此后只读。按 (年内日序, 空间索引) 双索引提供：
/// - `potential_sw_rad`: 晴空潜在短波辐射 [langley/day]
/// - `sun_hrs`: 可照时数 [hr]
///
/// 两表形状均为 [366, n_spatial]。
#[derive(Debug, Clone)]
pub struct SolarGeometryTable {
    potential_sw_rad: Array2<f64>,
    sun_hrs: Array2<f64>,
}

impl SolarGeometryTable {
    pub fn new(potential_sw_rad: Array2<f64>, sun_hrs: Array2<f64>) -> ThResult<Self> {
        if potential_sw_rad.nrows() != MAX_DAY_OF_YEAR {
            return Err(ThError::misaligned(format!(
                "potential_sw_rad 日序维 {} != {}",
                potential_sw_rad.nrows(),
                MAX_DAY_OF_YEAR
            )));
        }
        if potential_sw_rad.dim() != sun_hrs.dim() {
            return Err(ThError::misaligned(format!(
                "potential_sw_rad {:?} 与 sun_hrs {:?} 形状不一致",
                potential_sw_rad.dim(),
                sun_hrs.dim()
            )));
        }
        Ok(Self {
            potential_sw_rad,
            sun_hrs,
        })
    }

    /// 全年各 HRU 同值的平坦表（测试与演示）
    pub fn uniform(n_spatial: usize, potential_sw_rad: f64, sun_hrs: f64) -> Self {
        Self {
            potential_sw_rad: Array2::from_elem((MAX_DAY_OF_YEAR, n_spatial), potential_sw_rad),
            sun_hrs: Array2::from_elem((MAX_DAY_OF_YEAR, n_spatial), sun_hrs),
        }
    }

    pub fn n_spatial(&self) -> usize {
        self.potential_sw_rad.ncols()
    }

    /// 时刻对应的日序行索引 (0 起)
    #[inline]
    pub fn doy_index(time: DateTime<Utc>) -> usize {
        time.ordinal() as usize - 1
    }

    /// 指定日序的潜在短波辐射行
    pub fn potential_sw_rad_on(&self, doy_index: usize) -> ArrayView1<'_, f64> {
        self.potential_sw_rad.row(doy_index)
    }

    /// 指定日序的可照时数行
    pub fn sun_hrs_on(&self, doy_index: usize) -> ArrayView1<'_, f64> {
        self.sun_hrs.row(doy_index)
    }

    #[inline]
    pub fn potential_sw_rad_at(&self, doy_index: usize, hru: usize) -> f64 {
        self.potential_sw_rad[[doy_index, hru]]
    }

    #[inline]
    pub fn sun_hrs_at(&self, doy_index: usize, hru: usize) -> f64 {
        self.sun_hrs[[doy_index, hru]]
    }
}
