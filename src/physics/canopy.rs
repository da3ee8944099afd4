// src/physics/canopy.rs

//! 冠层截留过程单元
//!
//! 每步消费强迫容器的当前状态与上一步雪被水当量，对每个 HRU 施加
//! 截留-蒸发质量平衡，更新自身持久储量并追加收支日志。
//!
//! 同一套平衡方程保留两种计算路径：逐 HRU 标量循环为参考定义
//! （可读性基准），整场数组形式为性能路径。二者输出必须数值一致，
//! 由等价性测试保证。

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Zip};
use std::sync::Arc;

use crate::domain::params::{CoverType, HruParameters, HruType};
use crate::forcing::state::{ForcingStateContainer, ForcingVar};
use crate::infra::config::{CalcStrategy, Season};
use crate::infra::constants::tolerances::{DNEARZERO, NEARZERO};
use crate::infra::error::ThResult;
use crate::physics::process::{BudgetLog, ProcessUnit};

/// 截留相态：由当前降雪量每步重算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptionForm {
    Rain,
    Snow,
}

/// 收支日志输出变量
pub const BUDGET_VARIABLES: [&str; 7] = [
    "hru_intcp_stor",
    "net_rain",
    "net_snow",
    "intcp_evap",
    "rainfall_adj",
    "snowfall_adj",
    "potet",
];

/// 单步通量（两种策略的公共输出形状）
struct StepFluxes {
    intcp_stor: Array1<f64>,
    intcp_evap: Array1<f64>,
    net_rain: Array1<f64>,
    net_snow: Array1<f64>,
}

/// 冠层截留单元
pub struct Canopy {
    nhru: usize,
    params: Arc<HruParameters>,
    season: Season,
    strategy: CalcStrategy,

    /// 雪被水当量完整记录 [time, nhru]（上游雪被单元的滞后产物）
    pkwater_equiv_alltimes: Array2<f64>,

    // --- 本步系数, advance 时选定 ---
    covden: Array1<f64>,
    stor_max_rain: Array1<f64>,
    interception_form: Vec<InterceptionForm>,
    pkwater_equiv: Array1<f64>,

    // --- 持久储量 ---
    intcp_stor: Array1<f64>,
    intcp_stor_old: Array1<f64>,

    budget: BudgetLog,
}

impl Canopy {
    /// 构造冠层单元
    ///
    /// `initial_storage` 缺省为全零；雪被记录的空间维与 nhru 不符
    /// 属调用方错误，直接断言失败（不可恢复）。
    pub fn new(
        params: Arc<HruParameters>,
        pkwater_equiv_alltimes: Array2<f64>,
        season: Season,
        strategy: CalcStrategy,
        initial_storage: Option<Array1<f64>>,
    ) -> Self {
        let nhru = params.nhru;
        assert_eq!(
            pkwater_equiv_alltimes.ncols(),
            nhru,
            "雪被水当量空间维 {} != nhru {}",
            pkwater_equiv_alltimes.ncols(),
            nhru
        );

        let intcp_stor = match initial_storage {
            Some(s) => {
                assert_eq!(s.len(), nhru, "初始储量长度 {} != nhru {}", s.len(), nhru);
                s
            }
            None => Array1::zeros(nhru),
        };

        Self {
            nhru,
            params,
            season,
            strategy,
            pkwater_equiv_alltimes,
            covden: Array1::zeros(nhru),
            stor_max_rain: Array1::zeros(nhru),
            interception_form: vec![InterceptionForm::Rain; nhru],
            pkwater_equiv: Array1::zeros(nhru),
            intcp_stor_old: Array1::zeros(nhru),
            intcp_stor,
            budget: BudgetLog::new(BUDGET_VARIABLES.to_vec()),
        }
    }

    /// 本单元消费的参数名（参数源完整性自检用）
    pub fn required_parameters() -> &'static [&'static str] {
        &[
            "nhru",
            "hru_area",
            "hru_type",
            "cov_type",
            "covden_sum",
            "covden_win",
            "srain_intcp",
            "wrain_intcp",
            "snow_intcp",
            "epan_coef",
            "potet_sublim",
        ]
    }

    pub fn intcp_stor(&self) -> ArrayView1<'_, f64> {
        self.intcp_stor.view()
    }

    pub fn intcp_stor_old(&self) -> ArrayView1<'_, f64> {
        self.intcp_stor_old.view()
    }

    pub fn interception_form(&self) -> &[InterceptionForm] {
        &self.interception_form
    }

    pub fn set_strategy(&mut self, strategy: CalcStrategy) {
        self.strategy = strategy;
    }

    /// 逐 HRU 标量参考实现
    fn calculate_procedural(
        &self,
        rain: &ArrayView1<f64>,
        snow: &ArrayView1<f64>,
        potet: &ArrayView1<f64>,
        prcp: &ArrayView1<f64>,
    ) -> StepFluxes {
        let n = self.nhru;
        let p = &self.params;

        let mut out = StepFluxes {
            intcp_stor: Array1::zeros(n),
            intcp_evap: Array1::zeros(n),
            net_rain: Array1::zeros(n),
            net_snow: Array1::zeros(n),
        };

        for i in 0..n {
            let cov = self.covden[i];
            let mut netrain = rain[i];
            let mut netsnow = snow[i];
            let mut intcpstor = self.intcp_stor_old[i];
            let mut intcpevap = 0.0;

            // 湖面或裸地：储量清零, 既有储水转为直接穿透
            if p.hru_type[i] == HruType::Lake || p.cov_type[i] == CoverType::Bare {
                if intcpstor > 0.0 {
                    netrain += intcpstor * cov;
                    intcpstor = 0.0;
                }
            }

            // 雨水截留
            if p.hru_type[i] != HruType::Lake
                && p.cov_type[i] != CoverType::Bare
                && rain[i] > 0.0
                && cov > 0.0
            {
                if p.cov_type[i] > CoverType::Grasses {
                    let (s, nr) = intercept(rain[i], self.stor_max_rain[i], cov, intcpstor);
                    intcpstor = s;
                    netrain = nr;
                } else if p.cov_type[i] == CoverType::Grasses
                    && self.pkwater_equiv[i] < DNEARZERO
                    && netsnow < NEARZERO
                {
                    // 草地只在无雪被且无当前降雪时截留
                    let (s, nr) = intercept(rain[i], self.stor_max_rain[i], cov, intcpstor);
                    intcpstor = s;
                    netrain = nr;
                }
            }

            // 降雪截留
            if snow[i] > 0.0 && cov > 0.0 && p.cov_type[i] > CoverType::Grasses {
                let (s, ns) = intercept(snow[i], p.snow_intcp[i], cov, intcpstor);
                intcpstor = s;
                netsnow = ns;
                // 残余净雪近零时并入净雨
                if netsnow < NEARZERO {
                    netrain += netsnow;
                    netsnow = 0.0;
                }
            }

            // 无降水时段：按截留相态蒸发或升华, 储量不得为负
            if intcpstor > 0.0 && prcp[i] < NEARZERO {
                let evrn = potet[i] / p.epan_coef[i];
                let evsn = potet[i] * p.potet_sublim[i];
                match self.interception_form[i] {
                    InterceptionForm::Snow => {
                        let z = intcpstor - evsn;
                        if z > 0.0 {
                            intcpstor = z;
                            intcpevap = evsn;
                        } else {
                            intcpevap = intcpstor;
                            intcpstor = 0.0;
                        }
                    }
                    InterceptionForm::Rain => {
                        let d = intcpstor - evrn;
                        if d > 0.0 {
                            intcpstor = d;
                            intcpevap = evrn;
                        } else {
                            intcpevap = intcpstor;
                            intcpstor = 0.0;
                        }
                    }
                }
            }

            // 蒸发订正：evap*cov 不得超过 potet, 超出部分退回储量
            if intcpevap * cov > potet[i] {
                let last = intcpevap;
                intcpevap = if cov > 0.0 { potet[i] / cov } else { 0.0 };
                intcpstor += last - intcpevap;
            }

            out.intcp_stor[i] = intcpstor;
            out.intcp_evap[i] = intcpevap;
            out.net_rain[i] = netrain;
            out.net_snow[i] = netsnow;
        }

        out
    }

    /// 整场数组实现（性能路径）
    ///
    /// 与标量参考实现分段对应：清零、雨截留、雪截留、蒸发、订正
    /// 各为一趟掩膜化整场操作。
    fn calculate_vectorized(
        &self,
        rain: &ArrayView1<f64>,
        snow: &ArrayView1<f64>,
        potet: &ArrayView1<f64>,
        prcp: &ArrayView1<f64>,
    ) -> StepFluxes {
        let n = self.nhru;
        let p = &self.params;
        let covden = &self.covden;
        let stor_max_rain = &self.stor_max_rain;
        let pkwater = &self.pkwater_equiv;
        let forms = &self.interception_form;

        let mut net_rain = rain.to_owned();
        let mut net_snow = snow.to_owned();
        let mut intcp_stor = self.intcp_stor_old.clone();
        let mut intcp_evap = Array1::<f64>::zeros(n);

        // 湖面/裸地清零
        Zip::indexed(&mut net_rain)
            .and(&mut intcp_stor)
            .par_for_each(|i, nr, st| {
                if (p.hru_type[i] == HruType::Lake || p.cov_type[i] == CoverType::Bare)
                    && *st > 0.0
                {
                    *nr += *st * covden[i];
                    *st = 0.0;
                }
            });

        // 雨水截留（高于草地的覆被, 以及无雪被无降雪的草地）
        Zip::indexed(&mut net_rain)
            .and(&mut intcp_stor)
            .and(rain)
            .and(snow)
            .par_for_each(|i, nr, st, &r, &s| {
                if p.hru_type[i] == HruType::Lake || r <= 0.0 || covden[i] <= 0.0 {
                    return;
                }
                let eligible = p.cov_type[i] > CoverType::Grasses
                    || (p.cov_type[i] == CoverType::Grasses
                        && pkwater[i] < DNEARZERO
                        && s < NEARZERO);
                if eligible {
                    let (s_new, nr_new) = intercept(r, stor_max_rain[i], covden[i], *st);
                    *st = s_new;
                    *nr = nr_new;
                }
            });

        // 降雪截留与近零并流
        Zip::indexed(&mut net_snow)
            .and(&mut net_rain)
            .and(&mut intcp_stor)
            .and(snow)
            .par_for_each(|i, ns, nr, st, &s| {
                if s > 0.0 && covden[i] > 0.0 && p.cov_type[i] > CoverType::Grasses {
                    let (s_new, ns_new) = intercept(s, p.snow_intcp[i], covden[i], *st);
                    *st = s_new;
                    *ns = ns_new;
                    if *ns < NEARZERO {
                        *nr += *ns;
                        *ns = 0.0;
                    }
                }
            });

        // 无降水时段蒸发/升华
        Zip::indexed(&mut intcp_stor)
            .and(&mut intcp_evap)
            .and(prcp)
            .and(potet)
            .par_for_each(|i, st, ev, &pp, &pet| {
                if *st > 0.0 && pp < NEARZERO {
                    let loss = match forms[i] {
                        InterceptionForm::Snow => pet * p.potet_sublim[i],
                        InterceptionForm::Rain => pet / p.epan_coef[i],
                    };
                    let z = *st - loss;
                    if z > 0.0 {
                        *st = z;
                        *ev = loss;
                    } else {
                        *ev = *st;
                        *st = 0.0;
                    }
                }
            });

        // 蒸发订正
        Zip::indexed(&mut intcp_stor)
            .and(&mut intcp_evap)
            .and(potet)
            .par_for_each(|i, st, ev, &pet| {
                if *ev * covden[i] > pet {
                    let last = *ev;
                    *ev = if covden[i] > 0.0 { pet / covden[i] } else { 0.0 };
                    *st += last - *ev;
                }
            });

        StepFluxes {
            intcp_stor,
            intcp_evap,
            net_rain,
            net_snow,
        }
    }
}

/// 单点截留核
///
/// 净降水替换为穿透量 `precip * (1 - cov)`，储量吸收全部入流后
/// 以容量封顶，超出部分按覆盖度折算回净降水。
/// 返回 (新储量, 净降水)。
#[inline]
pub fn intercept(precip: f64, stor_max: f64, cov: f64, stor: f64) -> (f64, f64) {
    let mut net = precip * (1.0 - cov);
    let mut stor = stor + precip;
    if stor > stor_max {
        net += (stor - stor_max) * cov;
        stor = stor_max;
    }
    (stor, net)
}

impl ProcessUnit for Canopy {
    fn name(&self) -> &'static str {
        "canopy"
    }

    fn advance(&mut self, step_index: usize, atm: &ForcingStateContainer) -> ThResult<()> {
        // 快照上一步储量
        self.intcp_stor_old.assign(&self.intcp_stor);

        // 按生长季选择覆盖度与雨水截留容量
        let (covden, stor_max): (&[f64], &[f64]) = match self.season {
            Season::Growing => (&self.params.covden_sum, &self.params.srain_intcp),
            Season::Dormant => (&self.params.covden_win, &self.params.wrain_intcp),
        };
        self.covden = Array1::from_vec(covden.to_vec());
        self.stor_max_rain = Array1::from_vec(stor_max.to_vec());

        // 截留相态由当前降雪重算
        let snowfall = atm.get_current_state(ForcingVar::Snowfall)?;
        for (form, &s) in self.interception_form.iter_mut().zip(snowfall.iter()) {
            *form = if s > 0.0 {
                InterceptionForm::Snow
            } else {
                InterceptionForm::Rain
            };
        }

        // 雪被水当量取上一步（首步为零向量）
        if step_index == 0 {
            self.pkwater_equiv.fill(0.0);
        } else {
            assert!(
                step_index - 1 < self.pkwater_equiv_alltimes.nrows(),
                "雪被记录行 {} 越界 (共 {} 步)",
                step_index - 1,
                self.pkwater_equiv_alltimes.nrows()
            );
            self.pkwater_equiv
                .assign(&self.pkwater_equiv_alltimes.row(step_index - 1));
        }

        debug!(
            "[Canopy] advance: step={}, 相态(雪)={}",
            step_index,
            self.interception_form
                .iter()
                .filter(|f| **f == InterceptionForm::Snow)
                .count()
        );
        Ok(())
    }

    fn calculate(&mut self, atm: &ForcingStateContainer) -> ThResult<()> {
        let rain = atm.get_current_state(ForcingVar::Rainfall)?.to_owned();
        let snow = atm.get_current_state(ForcingVar::Snowfall)?.to_owned();
        let potet = atm.get_current_state(ForcingVar::Potet)?.to_owned();
        let prcp = atm.get_current_state(ForcingVar::Prcp)?.to_owned();

        let fluxes = match self.strategy {
            CalcStrategy::Procedural => {
                self.calculate_procedural(&rain.view(), &snow.view(), &potet.view(), &prcp.view())
            }
            CalcStrategy::Vectorized => {
                self.calculate_vectorized(&rain.view(), &snow.view(), &potet.view(), &prcp.view())
            }
        };

        self.intcp_stor.assign(&fluxes.intcp_stor);
        let hru_intcp_stor = &self.intcp_stor * &self.covden;

        let time = atm.current_time();
        self.budget.append("hru_intcp_stor", time, hru_intcp_stor)?;
        self.budget.append("net_rain", time, fluxes.net_rain)?;
        self.budget.append("net_snow", time, fluxes.net_snow)?;
        self.budget.append("intcp_evap", time, fluxes.intcp_evap)?;
        self.budget.append("rainfall_adj", time, rain)?;
        self.budget.append("snowfall_adj", time, snow)?;
        self.budget.append("potet", time, potet)?;

        Ok(())
    }

    fn budget(&self) -> &BudgetLog {
        &self.budget
    }

    fn budget_mut(&mut self) -> &mut BudgetLog {
        &mut self.budget
    }
}
