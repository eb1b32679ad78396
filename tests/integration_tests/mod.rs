use blatter::comm::SingleProcess;
use blatter::config::{BlatterConfig, FlowLawConfig, LineSearchConfig};
use blatter::parameters::InputGrid;
use blatter::boundary::NoSlipStressFree;
use blatter::Blatter;


/// Unit density and gravity, so that the driving stress is the surface slope.
pub fn slab_config(mz: usize, n_levels: usize, exponent: f64, line_search: LineSearchConfig) -> BlatterConfig {
    let mut config = BlatterConfig {
        mz,
        n_levels,
        ice_density: 1.0,
        standard_gravity: 1.0,
        flow_law: FlowLawConfig {
            exponent,
            schoof_velocity: 1.0,
            schoof_length: 10.0,
        },
        ..BlatterConfig::default()
    };
    config.newton.line_search = line_search;
    config
}

pub fn single_process_solver(grid: InputGrid, config: BlatterConfig) -> Blatter<SingleProcess> {
    Blatter::new(SingleProcess, grid, (1, 1), config, NoSlipStressFree).unwrap()
}
