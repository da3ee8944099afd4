// tests/canopy_reference.rs

//! 参考算例回归测试
//!
//! 2-HRU 固定算例经订正链与冠层计算后复现独立计算的参考轨迹，
//! 并验证标量/向量化两种策略在完整运行上的等价性。

use chrono::{DateTime, TimeZone, Utc};
use ndarray::{array, Array2};
use std::collections::BTreeMap;
use std::sync::Arc;

use terrahydro::domain::params::{CoverType, HruParameters};
use terrahydro::forcing::sources::MemoryDataset;
use terrahydro::forcing::state::{ForcingVar, StateMap};
use terrahydro::physics::process::ProcessUnit;
use terrahydro::simulation::run_steps;
use terrahydro::{CalcStrategy, Canopy, ForcingStateContainer, Season, SolarGeometryTable};

fn axis(n: u32) -> Vec<DateTime<Utc>> {
    (0..n)
        .map(|d| Utc.with_ymd_and_hms(1979, 1, 3 + d, 0, 0, 0).unwrap())
        .collect()
}

/// 2-HRU x 2 步原始气象算例 (HRU 5307/5308, 1979-01-03..04)
fn reference_state_map() -> StateMap {
    let mut variables = BTreeMap::new();
    variables.insert(
        ForcingVar::Tmin,
        array![[46.1209, 45.76805], [37.7609, 37.4881]],
    );
    variables.insert(
        ForcingVar::Tmax,
        array![
            [57.41188049316406, 56.47270965576172],
            [55.511878967285156, 55.032711029052734]
        ],
    );
    variables.insert(
        ForcingVar::Rhavg,
        array![
            [82.45999908447266, 82.5999984741211],
            [81.98999786376953, 82.3499984741211]
        ],
    );
    variables.insert(
        ForcingVar::Prcp,
        array![
            [0.31392958760261536, 0.24780480563640594],
            [0.6605601906776428, 0.5214226245880127]
        ],
    );
    StateMap {
        datetime: axis(2),
        spatial_id: vec![5307, 5308],
        variables,
    }
}

fn assert_close(actual: &[f64], expected: &[f64], atol: f64, what: &str) {
    assert_eq!(actual.len(), expected.len());
    for (k, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - e).abs() < atol,
            "{} [{}]: {} != {} (atol {})",
            what,
            k,
            a,
            e,
            atol
        );
    }
}

/// 订正链 + 冠层计算复现参考轨迹（全雨算例）
#[test]
fn test_reference_trace_rain_scenario() {
    terrahydro::infra::logger::init_logging(Some("warn"));

    let params = Arc::new(HruParameters::with_defaults(vec![5307, 5308]));
    let mut atm =
        ForcingStateContainer::from_state_map(reference_state_map(), axis(2)[0], Some(5.0))
            .unwrap();

    atm.param_adjust(&params).unwrap();

    // tmin 全部高于全雪阈值 => 全雨, 与算例自带的相态一致
    let rainfall = atm.get_timeseries(ForcingVar::Rainfall).unwrap().clone();
    let prcp = atm.get_timeseries(ForcingVar::Prcp).unwrap().clone();
    assert_close(
        rainfall.as_slice().unwrap(),
        prcp.as_slice().unwrap(),
        1e-12,
        "rainfall",
    );
    let snowfall = atm.get_timeseries(ForcingVar::Snowfall).unwrap();
    assert!(snowfall.iter().all(|&v| v == 0.0));

    let soltab = SolarGeometryTable::uniform(2, 237.0, 9.8);
    atm.calculate_sw_rad_degree_day(&params, &soltab, Season::Growing)
        .unwrap();
    atm.calculate_potential_et_jh(&params).unwrap();

    // 独立计算的参考值
    let swrad = atm.get_timeseries(ForcingVar::Swrad).unwrap();
    assert_close(
        swrad.as_slice().unwrap(),
        &[
            168.18646270751952,
            167.29612875366212,
            166.3852612609863,
            165.93101005554198,
        ],
        1e-3,
        "swrad",
    );
    let potet = atm.get_timeseries(ForcingVar::Potet).unwrap();
    assert_close(
        potet.as_slice().unwrap(),
        &[
            0.06079746198542924,
            0.05944743510318576,
            0.052045256712084494,
            0.051312776361270164,
        ],
        1e-5,
        "potet",
    );

    let mut canopy = Canopy::new(
        Arc::clone(&params),
        Array2::zeros((2, 2)),
        Season::Growing,
        CalcStrategy::Procedural,
        None,
    );
    {
        let mut units: Vec<&mut dyn ProcessUnit> = vec![&mut canopy];
        run_steps(&mut atm, &mut units, 2).unwrap();
    }

    let net_rain = canopy.budget().records("net_rain").unwrap();
    assert_close(
        net_rain[0].values.as_slice().unwrap(),
        &[0.28892958760261533, 0.22280480563640595],
        1e-5,
        "net_rain t0",
    );
    assert_close(
        net_rain[1].values.as_slice().unwrap(),
        &[0.6605601906776428, 0.5214226245880127],
        1e-5,
        "net_rain t1",
    );

    // 两步都有降水: 容量封顶, 无蒸发
    let stor = canopy.budget().records("hru_intcp_stor").unwrap();
    assert_close(stor[0].values.as_slice().unwrap(), &[0.025, 0.025], 1e-5, "stor t0");
    assert_close(stor[1].values.as_slice().unwrap(), &[0.025, 0.025], 1e-5, "stor t1");

    let evap = canopy.budget().records("intcp_evap").unwrap();
    assert!(evap.iter().all(|r| r.values.iter().all(|&v| v == 0.0)));

    // 净雪为零轨迹
    let net_snow = canopy.budget().records("net_snow").unwrap();
    assert!(net_snow.iter().all(|r| r.values.iter().all(|&v| v == 0.0)));
}

/// 降雪日 + 干燥日算例：雪截留、蒸发支路与储量衰减
#[test]
fn test_reference_trace_snow_then_dry() {
    let mut p = HruParameters::with_defaults(vec![5307, 5308]);
    p.cov_type = vec![CoverType::Trees, CoverType::Conifer];
    p.covden_sum = vec![0.5, 0.8];
    p.srain_intcp = vec![0.05, 0.1];
    p.snow_intcp = vec![0.1, 0.15];
    let params = Arc::new(p);

    let mut variables = BTreeMap::new();
    variables.insert(
        ForcingVar::Tmax,
        array![[30.0, 31.0], [40.0, 41.0], [50.0, 51.0]],
    );
    variables.insert(
        ForcingVar::Tmin,
        array![[20.0, 22.0], [33.0, 34.0], [35.0, 36.0]],
    );
    variables.insert(ForcingVar::Prcp, array![[0.4, 0.3], [0.0, 0.0], [0.0, 0.0]]);
    let map = StateMap {
        datetime: axis(3),
        spatial_id: vec![5307, 5308],
        variables,
    };
    let mut atm = ForcingStateContainer::from_state_map(map, axis(3)[0], None).unwrap();

    atm.param_adjust(&params).unwrap();

    // 第 0 步 tmax <= 32 => 全雪
    let snowfall = atm.get_timeseries(ForcingVar::Snowfall).unwrap();
    assert_close(snowfall.row(0).to_vec().as_slice(), &[0.4, 0.3], 1e-12, "snowfall t0");

    let soltab = SolarGeometryTable::uniform(2, 237.0, 9.8);
    atm.calculate_sw_rad_degree_day(&params, &soltab, Season::Growing)
        .unwrap();
    atm.calculate_potential_et_jh(&params).unwrap();

    let mut canopy = Canopy::new(
        Arc::clone(&params),
        Array2::zeros((3, 2)),
        Season::Growing,
        CalcStrategy::Procedural,
        None,
    );
    {
        let mut units: Vec<&mut dyn ProcessUnit> = vec![&mut canopy];
        run_steps(&mut atm, &mut units, 3).unwrap();
    }

    let net_snow = canopy.budget().records("net_snow").unwrap();
    assert_close(
        net_snow[0].values.as_slice().unwrap(),
        &[0.35000000000000003, 0.18],
        1e-5,
        "net_snow t0",
    );

    let stor = canopy.budget().records("hru_intcp_stor").unwrap();
    assert_close(stor[0].values.as_slice().unwrap(), &[0.05, 0.12], 1e-5, "stor t0");
    assert_close(
        stor[1].values.as_slice().unwrap(),
        &[0.034029868487964327, 0.09300249675981181],
        1e-5,
        "stor t1",
    );
    assert_close(
        stor[2].values.as_slice().unwrap(),
        &[0.011907539419212455, 0.0562157560889093],
        1e-5,
        "stor t2",
    );

    // 干燥日按液态蒸发衰减（相态每步由当前降雪重算）
    let evap = canopy.budget().records("intcp_evap").unwrap();
    assert_close(
        evap[1].values.as_slice().unwrap(),
        &[0.03194026302407136, 0.03374687905023523],
        1e-5,
        "evap t1",
    );
    assert_close(
        evap[2].values.as_slice().unwrap(),
        &[0.044244658137503744, 0.04598342583862813],
        1e-5,
        "evap t2",
    );
}

/// 完整运行上的策略等价性 (1e-6 绝对容差)
#[test]
fn test_full_run_strategy_equivalence() {
    let mut p = HruParameters::with_defaults(vec![5307, 5308]);
    p.cov_type = vec![CoverType::Trees, CoverType::Conifer];
    p.covden_sum = vec![0.5, 0.8];
    let params = Arc::new(p);

    let run = |strategy: CalcStrategy| {
        let mut atm =
            ForcingStateContainer::from_state_map(reference_state_map(), axis(2)[0], None)
                .unwrap();
        atm.param_adjust(&params).unwrap();
        let soltab = SolarGeometryTable::uniform(2, 237.0, 9.8);
        atm.calculate_sw_rad_degree_day(&params, &soltab, Season::Growing)
            .unwrap();
        atm.calculate_potential_et_jh(&params).unwrap();

        let mut canopy = Canopy::new(
            Arc::clone(&params),
            Array2::zeros((2, 2)),
            Season::Growing,
            strategy,
            None,
        );
        {
            let mut units: Vec<&mut dyn ProcessUnit> = vec![&mut canopy];
            run_steps(&mut atm, &mut units, 2).unwrap();
        }
        canopy
    };

    let proc = run(CalcStrategy::Procedural);
    let vect = run(CalcStrategy::Vectorized);

    for var in ["hru_intcp_stor", "net_rain", "net_snow", "intcp_evap"] {
        let a = proc.budget().records(var).unwrap();
        let b = vect.budget().records(var).unwrap();
        assert_eq!(a.len(), b.len());
        for (ra, rb) in a.iter().zip(b.iter()) {
            for (x, y) in ra.values.iter().zip(rb.values.iter()) {
                assert!((x - y).abs() < 1e-6, "{} 策略输出不一致: {} vs {}", var, x, y);
            }
        }
    }
}

/// 数据集装载 + 订正链（原始变量显式读取）
#[test]
fn test_dataset_load_then_adjust() {
    let params = Arc::new(HruParameters::with_defaults(vec![5307, 5308]));
    let mut ds = MemoryDataset::new("cbh.nc", axis(2), vec![5307, 5308]).unwrap();
    ds.insert(
        "prcp",
        array![
            [0.31392958760261536, 0.24780480563640594],
            [0.6605601906776428, 0.5214226245880127]
        ],
    )
    .unwrap();
    ds.insert(
        "tmax",
        array![
            [57.41188049316406, 56.47270965576172],
            [55.511878967285156, 55.032711029052734]
        ],
    )
    .unwrap();
    ds.insert(
        "tmin",
        array![[46.1209, 45.76805], [37.7609, 37.4881]],
    )
    .unwrap();

    let mut atm = ForcingStateContainer::from_dataset(
        &ds,
        &params,
        Some(&["prcp", "tmax", "tmin"]),
        axis(2)[0],
        None,
    )
    .unwrap();
    atm.param_adjust(&params).unwrap();

    // 全雨: rainfall == 订正后 prcp
    let rainfall = atm.get_timeseries(ForcingVar::Rainfall).unwrap().clone();
    let prcp = atm.get_timeseries(ForcingVar::Prcp).unwrap().clone();
    assert_close(
        rainfall.as_slice().unwrap(),
        prcp.as_slice().unwrap(),
        1e-12,
        "rainfall",
    );
}
