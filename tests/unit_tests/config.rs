use blatter::config::{BlatterConfig, LineSearchConfig, LinearSolverConfig, SECONDS_PER_YEAR};
use blatter::BlatterError;

#[test]
fn default_config_is_valid() {
    let config = BlatterConfig::default();
    config.validate().unwrap();
    assert_eq!(config.mz, 17);
    assert_eq!(config.n_levels, 3);
    assert_eq!(config.newton.line_search, LineSearchConfig::Full);

    let epsilon = config.flow_law.regularization();
    let expected = (1.0 / SECONDS_PER_YEAR / 1000.0e3).powi(2);
    assert!((epsilon - expected).abs() <= 1e-12 * expected);
}

#[test]
fn config_json_roundtrip() {
    let config = BlatterConfig {
        mz: 9,
        newton: blatter::config::NewtonConfig {
            line_search: LineSearchConfig::Damped { factor: 0.5 },
            ..Default::default()
        },
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    let deserialized: BlatterConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, config);
}

#[test]
fn missing_fields_take_default_values() {
    let json = r#"{ "mz": 5, "flow_law": { "exponent": 1.0 }, "newton": { "line_search": "Backtracking" } }"#;
    let config: BlatterConfig = serde_json::from_str(json).unwrap();
    let default = BlatterConfig::default();

    assert_eq!(config.mz, 5);
    assert_eq!(config.n_levels, default.n_levels);
    assert_eq!(config.flow_law.exponent, 1.0);
    assert_eq!(config.flow_law.schoof_length, default.flow_law.schoof_length);
    assert_eq!(config.newton.line_search, LineSearchConfig::Backtracking);
    assert_eq!(config.newton.max_iterations, default.newton.max_iterations);
    assert_eq!(config.linear, default.linear);
}

#[test]
fn invalid_configs_are_rejected() {
    let invalid_configs = [
        BlatterConfig {
            mz: 1,
            ..Default::default()
        },
        BlatterConfig {
            n_levels: 0,
            ..Default::default()
        },
        BlatterConfig {
            min_thickness: 0.0,
            ..Default::default()
        },
        BlatterConfig {
            flow_law: blatter::config::FlowLawConfig {
                exponent: 0.5,
                ..Default::default()
            },
            ..Default::default()
        },
        BlatterConfig {
            newton: blatter::config::NewtonConfig {
                relative_tolerance: -1.0,
                ..Default::default()
            },
            ..Default::default()
        },
        BlatterConfig {
            newton: blatter::config::NewtonConfig {
                line_search: LineSearchConfig::Damped { factor: 1.5 },
                ..Default::default()
            },
            ..Default::default()
        },
        BlatterConfig {
            linear: LinearSolverConfig {
                smoothing_sweeps: 0,
                ..Default::default()
            },
            ..Default::default()
        },
        BlatterConfig {
            n_levels: 1,
            linear: LinearSolverConfig {
                coarse_direct_max_dofs: 0,
                coarse_smoothing_sweeps: 0,
                ..Default::default()
            },
            ..Default::default()
        },
    ];

    for config in invalid_configs {
        match config.validate() {
            Err(BlatterError::InvalidConfiguration(_)) => {}
            other => panic!("Expected invalid configuration for {:?}, got {:?}", config, other),
        }
    }
}

#[test]
fn single_level_solve_needs_no_smoothing_sweeps() {
    // The only level is solved by the coarse solver
    let config = BlatterConfig {
        n_levels: 1,
        linear: LinearSolverConfig {
            smoothing_sweeps: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    config.validate().unwrap();
}
