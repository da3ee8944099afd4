// src/forcing/adjust.rs

//! NHM 订正链：把原始气象输入转换为模型可用强迫量
//!
//! 三个无状态变换，就地覆写容器内的注册变量：
//! 1. `param_adjust` — 站点/高程订正 + 降水相态分割
//! 2. `calculate_sw_rad_degree_day` — 度日法短波辐射
//! 3. `calculate_potential_et_jh` — Jensen-Haise 潜在蒸散
//!
//! 派生量 (`rainfall`/`snowfall`/`swrad`/`potet`) 写回后与普通
//! 变量无异，由 `get_current_state` 统一供给过程单元。

use log::{info, warn};
use ndarray::{Array1, Array2, Zip};

use crate::domain::params::HruParameters;
use crate::forcing::solar::SolarGeometryTable;
use crate::forcing::state::{ForcingStateContainer, ForcingVar};
use crate::infra::config::Season;
use crate::infra::constants::{physics, validation};
use crate::infra::error::{ThError, ThResult};

impl ForcingStateContainer {
    /// 站点订正与降水相态分割
    ///
    /// 对原始 tmax/tmin 施加逐 HRU 订正量，再按全雪阈值
    /// `tmax_allsnow` 与全雨阈值 `tmax_allsnow + tmax_allrain_offset`
    /// 把降水分割为 rainfall/snowfall，混合事件雨比例为
    /// `adjmix_rain * (tmax - allsnow) / (tmax - tmin)`。
    /// `rhavg` 原样传递，不参与订正。
    ///
    /// 每次装载至多调用一次：重复调用会在已订正值上再订正，
    /// 因此第二次调用直接以 Validation 拒绝。
    pub fn param_adjust(&mut self, params: &HruParameters) -> ThResult<()> {
        if self.adjusted {
            return Err(ThError::validation(
                "param_adjust 已执行过, 重复订正会叠加偏差",
            ));
        }
        if params.nhru != self.nhru() {
            return Err(ThError::misaligned(format!(
                "参数 nhru {} != 容器空间维 {}",
                params.nhru,
                self.nhru()
            )));
        }

        let mut tmax = self.get_timeseries(ForcingVar::Tmax)?.clone();
        let mut tmin = self.get_timeseries(ForcingVar::Tmin)?.clone();
        let prcp_raw = self.get_timeseries(ForcingVar::Prcp)?.clone();

        warn_on_suspect_inputs(&tmax, &tmin, &prcp_raw);

        // 温度订正（逐 HRU 常量沿时间维广播）
        let tmax_adj = Array1::from_vec(params.tmax_cbh_adj.clone());
        let tmin_adj = Array1::from_vec(params.tmin_cbh_adj.clone());
        Zip::from(tmax.rows_mut()).for_each(|mut row| row += &tmax_adj.view());
        Zip::from(tmin.rows_mut()).for_each(|mut row| row += &tmin_adj.view());

        // 相态分割
        let dim = prcp_raw.dim();
        let mut prcp = Array2::zeros(dim);
        let mut rainfall = Array2::zeros(dim);
        let mut snowfall = Array2::zeros(dim);

        let (nt, nh) = dim;
        for t in 0..nt {
            for i in 0..nh {
                let (p, r, s) = partition_precip(
                    prcp_raw[[t, i]],
                    tmax[[t, i]],
                    tmin[[t, i]],
                    params.tmax_allsnow[i],
                    params.tmax_allsnow[i] + params.tmax_allrain_offset[i],
                    params.adjmix_rain[i],
                    params.rain_cbh_adj[i],
                    params.snow_cbh_adj[i],
                );
                prcp[[t, i]] = p;
                rainfall[[t, i]] = r;
                snowfall[[t, i]] = s;
            }
        }

        self.set_timeseries(ForcingVar::Tmax, tmax)?;
        self.set_timeseries(ForcingVar::Tmin, tmin)?;
        self.set_timeseries(ForcingVar::Prcp, prcp)?;
        self.set_timeseries(ForcingVar::Rainfall, rainfall)?;
        self.set_timeseries(ForcingVar::Snowfall, snowfall)?;
        self.adjusted = true;

        info!("[ForcingAdjust] 站点订正与相态分割完成 ({} HRU)", self.nhru());
        Ok(())
    }

    /// 度日法短波辐射
    ///
    /// 以日温度幅度驱动的经验订正系数缩放太阳几何表的潜在辐射：
    /// `swrad = potential_sw_rad[doy, hru] * radadj / cos(atan(hru_slope))`。
    /// 降水日（prcp 超过 `ppt_rad_adj`）按季节系数或温度线性式压低。
    pub fn calculate_sw_rad_degree_day(
        &mut self,
        params: &HruParameters,
        soltab: &SolarGeometryTable,
        season: Season,
    ) -> ThResult<()> {
        let nhru = self.nhru();
        if soltab.n_spatial() != nhru {
            return Err(ThError::misaligned(format!(
                "太阳几何表空间维 {} != 容器空间维 {}",
                soltab.n_spatial(),
                nhru
            )));
        }
        let times = self
            .datetime()
            .ok_or_else(|| ThError::validation("度日法辐射需要完整时间轴"))?
            .to_vec();

        let tmax = self.get_timeseries(ForcingVar::Tmax)?.clone();
        let prcp = self.get_timeseries(ForcingVar::Prcp)?.clone();

        let cossl: Vec<f64> = params
            .hru_slope
            .iter()
            .map(|&s| s.atan().cos())
            .collect();

        let mut swrad = Array2::zeros(tmax.dim());
        for (t, &time) in times.iter().enumerate() {
            let doy = SolarGeometryTable::doy_index(time);
            let potsw = soltab.potential_sw_rad_on(doy);
            Zip::indexed(swrad.row_mut(t))
                .and(tmax.row(t))
                .and(prcp.row(t))
                .and(potsw)
                .for_each(|i, sw, &tx, &p, &psw| {
                    let radadj = degree_day_radadj(
                        tx,
                        p,
                        params.dday_slope[i],
                        params.dday_intcp[i],
                        params.radmax[i],
                        params.ppt_rad_adj[i],
                        params.tmax_index[i],
                        params.radadj_intcp[i],
                        params.radadj_slope[i],
                        match season {
                            Season::Growing => params.radj_sppt[i],
                            Season::Dormant => params.radj_wppt[i],
                        },
                    );
                    *sw = psw * radadj / cossl[i];
                });
        }

        self.set_timeseries(ForcingVar::Swrad, swrad)?;
        info!("[ForcingAdjust] 度日法短波辐射完成 ({} 步)", times.len());
        Ok(())
    }

    /// Jensen-Haise 潜在蒸散
    ///
    /// `potet = jh_coef * (tavg_f - jh_coef_hru) * swrad / elh`，
    /// 其中 `elh = (597.3 - 0.5653 * tavg_c) * 2.54`，负值截断为零。
    /// 需要 `swrad` 已就位（先执行度日法辐射）。
    pub fn calculate_potential_et_jh(&mut self, params: &HruParameters) -> ThResult<()> {
        let tmax = self.get_timeseries(ForcingVar::Tmax)?.clone();
        let tmin = self.get_timeseries(ForcingVar::Tmin)?.clone();
        let swrad = self.get_timeseries(ForcingVar::Swrad)?.clone();

        let mut potet = Array2::zeros(tmax.dim());
        Zip::indexed(&mut potet)
            .and(&tmax)
            .and(&tmin)
            .and(&swrad)
            .for_each(|(_, i), pet, &tx, &tn, &sw| {
                *pet = jensen_haise(tx, tn, sw, params.jh_coef[i], params.jh_coef_hru[i]);
            });

        self.set_timeseries(ForcingVar::Potet, potet)?;
        info!("[ForcingAdjust] Jensen-Haise 潜在蒸散完成");
        Ok(())
    }
}

/// 单点降水相态分割
///
/// 返回 (订正降水, 降雨, 降雪)。
#[inline]
pub fn partition_precip(
    prcp_raw: f64,
    tmax: f64,
    tmin: f64,
    tmax_allsnow: f64,
    tmax_allrain: f64,
    adjmix_rain: f64,
    rain_adj: f64,
    snow_adj: f64,
) -> (f64, f64, f64) {
    if prcp_raw <= 0.0 {
        return (0.0, 0.0, 0.0);
    }
    if tmax <= tmax_allsnow {
        // 全雪
        let ppt = prcp_raw * snow_adj;
        (ppt, 0.0, ppt)
    } else if tmin > tmax_allsnow || tmax >= tmax_allrain {
        // 全雨
        let ppt = prcp_raw * rain_adj;
        (ppt, ppt, 0.0)
    } else {
        // 混合事件：雨比例随温度幅度线性过渡
        let prmx = ((tmax - tmax_allsnow) / (tmax - tmin)) * adjmix_rain;
        if prmx >= 1.0 {
            let ppt = prcp_raw * rain_adj;
            (ppt, ppt, 0.0)
        } else {
            let ppt = prcp_raw * snow_adj;
            let rain = prmx * ppt;
            (ppt, rain, ppt - rain)
        }
    }
}

/// 单点度日辐射订正系数
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn degree_day_radadj(
    tmax: f64,
    prcp: f64,
    dday_slope: f64,
    dday_intcp: f64,
    radmax: f64,
    ppt_rad_adj: f64,
    tmax_index: f64,
    radadj_intcp: f64,
    radadj_slope: f64,
    radj_ppt: f64,
) -> f64 {
    let mut dday = dday_slope * tmax + dday_intcp + 1.0;
    if dday < 1.0 {
        dday = 1.0;
    }

    let mut radadj = if dday < validation::DDAY_TABLE_MAX {
        // 26 点插值表，整数节点线性内插
        let kp = dday as usize;
        let frac = dday - kp as f64;
        let table = physics::SOLAR_RADIATION_FRACTION;
        table[kp - 1] + (table[kp] - table[kp - 1]) * frac
    } else {
        radmax
    };

    if prcp > ppt_rad_adj {
        let pptadj = if tmax < tmax_index {
            radj_ppt
        } else {
            let adj = radadj_intcp + radadj_slope * (tmax - tmax_index);
            adj.min(1.0)
        };
        radadj *= pptadj;
    }

    radadj.max(validation::MIN_RADADJ)
}

/// 单点 Jensen-Haise 潜在蒸散 [inch]
#[inline]
pub fn jensen_haise(tmax: f64, tmin: f64, swrad: f64, jh_coef: f64, jh_coef_hru: f64) -> f64 {
    let tavg_f = (tmax + tmin) / 2.0;
    let tavg_c = physics::f_to_c(tavg_f);
    let elh = (physics::LATENT_HEAT_BASE - physics::LATENT_HEAT_SLOPE * tavg_c)
        * physics::INCH_TO_CM;
    (jh_coef * (tavg_f - jh_coef_hru) * swrad / elh).max(0.0)
}

fn warn_on_suspect_inputs(tmax: &Array2<f64>, tmin: &Array2<f64>, prcp: &Array2<f64>) {
    let max_t = tmax.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_t > validation::MAX_REASONABLE_TMAX {
        warn!("[ForcingAdjust] tmax 异常: {:.1} °F, 可能是单位错误", max_t);
    }
    let min_t = tmin.iter().cloned().fold(f64::INFINITY, f64::min);
    if min_t < validation::MIN_REASONABLE_TMIN {
        warn!("[ForcingAdjust] tmin 异常: {:.1} °F", min_t);
    }
    let max_p = prcp.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_p > validation::MAX_REASONABLE_PRCP {
        warn!("[ForcingAdjust] 单步降水异常: {:.1} inch", max_p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forcing::state::StateMap;
    use chrono::{DateTime, TimeZone, Utc};
    use ndarray::array;
    use std::collections::BTreeMap;

    fn axis(n: u32) -> Vec<DateTime<Utc>> {
        (0..n)
            .map(|d| Utc.with_ymd_and_hms(1979, 1, 1 + d, 0, 0, 0).unwrap())
            .collect()
    }

    fn raw_container() -> ForcingStateContainer {
        let mut variables = BTreeMap::new();
        variables.insert(ForcingVar::Tmax, array![[28.0, 57.4], [40.0, 55.5]]);
        variables.insert(ForcingVar::Tmin, array![[20.0, 45.8], [30.0, 37.5]]);
        variables.insert(ForcingVar::Prcp, array![[0.5, 0.3], [0.2, 0.0]]);
        variables.insert(ForcingVar::Rhavg, array![[82.5, 82.6], [82.0, 82.3]]);
        let map = StateMap {
            datetime: axis(2),
            spatial_id: vec![5307, 5308],
            variables,
        };
        ForcingStateContainer::from_state_map(map, axis(2)[0], None).unwrap()
    }

    #[test]
    fn test_partition_all_snow() {
        // tmax 低于全雪阈值 => 全部成雪, 乘雪订正系数
        let (ppt, rain, snow) = partition_precip(1.0, 30.0, 20.0, 32.0, 38.0, 1.0, 1.1, 0.9);
        assert!((ppt - 0.9).abs() < 1e-12);
        assert_eq!(rain, 0.0);
        assert!((snow - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_partition_all_rain() {
        // tmin 高于全雪阈值 => 全雨
        let (ppt, rain, snow) = partition_precip(1.0, 50.0, 40.0, 32.0, 38.0, 1.0, 1.1, 0.9);
        assert!((ppt - 1.1).abs() < 1e-12);
        assert!((rain - 1.1).abs() < 1e-12);
        assert_eq!(snow, 0.0);

        // tmax 高于全雨阈值同样 => 全雨
        let (_, rain, snow) = partition_precip(1.0, 40.0, 25.0, 32.0, 38.0, 1.0, 1.0, 1.0);
        assert!(rain > 0.0);
        assert_eq!(snow, 0.0);
    }

    #[test]
    fn test_partition_mixed_event() {
        // tmax=36, tmin=28, allsnow=32: prmx = (36-32)/(36-28) = 0.5
        let (ppt, rain, snow) = partition_precip(1.0, 36.0, 28.0, 32.0, 38.0, 1.0, 1.0, 1.0);
        assert!((ppt - 1.0).abs() < 1e-12);
        assert!((rain - 0.5).abs() < 1e-12);
        assert!((snow - 0.5).abs() < 1e-12);
        // 质量守恒
        assert!((rain + snow - ppt).abs() < 1e-12);
    }

    #[test]
    fn test_partition_zero_precip() {
        let (ppt, rain, snow) = partition_precip(0.0, 36.0, 28.0, 32.0, 38.0, 1.0, 1.0, 1.0);
        assert_eq!((ppt, rain, snow), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_param_adjust_writes_phase_variables() {
        let mut atm = raw_container();
        let params = HruParameters::with_defaults(vec![5307, 5308]);
        atm.param_adjust(&params).unwrap();

        // HRU0 第 0 步 tmax=28 <= 32 => 全雪
        let snow = atm.get_timeseries(ForcingVar::Snowfall).unwrap();
        let rain = atm.get_timeseries(ForcingVar::Rainfall).unwrap();
        assert!((snow[[0, 0]] - 0.5).abs() < 1e-12);
        assert_eq!(rain[[0, 0]], 0.0);

        // HRU1 第 0 步 tmin=45.8 > 32 => 全雨
        assert!((rain[[0, 1]] - 0.3).abs() < 1e-12);
        assert_eq!(snow[[0, 1]], 0.0);

        // rhavg 原样传递
        let rh = atm.get_timeseries(ForcingVar::Rhavg).unwrap();
        assert!((rh[[0, 0]] - 82.5).abs() < 1e-12);
    }

    #[test]
    fn test_param_adjust_once_only() {
        let mut atm = raw_container();
        let params = HruParameters::with_defaults(vec![5307, 5308]);
        atm.param_adjust(&params).unwrap();
        assert!(matches!(
            atm.param_adjust(&params),
            Err(ThError::Validation(_))
        ));
    }

    #[test]
    fn test_degree_day_radadj_saturation() {
        // dday 超表 => radmax
        let r = degree_day_radadj(100.0, 0.0, 0.4, 0.0, 0.8, 0.02, 50.0, 1.0, 0.0, 0.44);
        assert!((r - 0.8).abs() < 1e-12);

        // dday 压到下限 1.0 => 表首值 0.20
        let r = degree_day_radadj(-100.0, 0.0, 0.4, 0.0, 0.8, 0.02, 50.0, 1.0, 0.0, 0.44);
        assert!((r - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_degree_day_radadj_wet_day_floor() {
        // 降水日且低温 => 季节系数, 但不得低于 0.2 下限
        let r = degree_day_radadj(30.0, 1.0, 0.3, 0.0, 0.8, 0.02, 50.0, 1.0, 0.0, 0.1);
        assert!((r - validation::MIN_RADADJ).abs() < 1e-12);
    }

    #[test]
    fn test_sw_rad_degree_day_field() {
        let mut atm = raw_container();
        let params = HruParameters::with_defaults(vec![5307, 5308]);
        atm.param_adjust(&params).unwrap();

        let soltab = SolarGeometryTable::uniform(2, 200.0, 9.5);
        atm.calculate_sw_rad_degree_day(&params, &soltab, Season::Growing)
            .unwrap();

        let swrad = atm.get_timeseries(ForcingVar::Swrad).unwrap();
        // 平地 cossl=1, swrad = 200 * radadj, 因此应落在 [40, 160]
        for &v in swrad.iter() {
            assert!(v >= 200.0 * validation::MIN_RADADJ - 1e-9);
            assert!(v <= 200.0 * 0.8 + 1e-9);
        }
    }

    #[test]
    fn test_jensen_haise_formula() {
        // tavgf = 55, tavgc = 12.78, elh = (597.3 - 7.222) * 2.54 = 1498.9
        let pet = jensen_haise(65.0, 45.0, 300.0, 0.014, 13.0);
        let tavg_c = (55.0 - 32.0) * 5.0 / 9.0;
        let elh = (597.3 - 0.5653 * tavg_c) * 2.54;
        let expected = 0.014 * (55.0 - 13.0) * 300.0 / elh;
        assert!((pet - expected).abs() < 1e-12);

        // 低温下负值截断为零
        assert_eq!(jensen_haise(10.0, 0.0, 300.0, 0.014, 13.0), 0.0);
    }

    #[test]
    fn test_potet_requires_swrad() {
        let mut atm = raw_container();
        let params = HruParameters::with_defaults(vec![5307, 5308]);
        // 未先计算 swrad => NotFound
        assert!(matches!(
            atm.calculate_potential_et_jh(&params),
            Err(ThError::NotFound(_))
        ));
    }

    #[test]
    fn test_potet_chain() {
        let mut atm = raw_container();
        let params = HruParameters::with_defaults(vec![5307, 5308]);
        atm.param_adjust(&params).unwrap();
        let soltab = SolarGeometryTable::uniform(2, 200.0, 9.5);
        atm.calculate_sw_rad_degree_day(&params, &soltab, Season::Growing)
            .unwrap();
        atm.calculate_potential_et_jh(&params).unwrap();

        let potet = atm.get_timeseries(ForcingVar::Potet).unwrap();
        assert!(potet.iter().all(|&v| v >= 0.0));
        // 暖 HRU 的蒸散潜力应为正
        assert!(potet[[0, 1]] > 0.0);
    }
}
