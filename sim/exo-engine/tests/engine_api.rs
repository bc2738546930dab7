//! Engine lifecycle, validation, and determinism behavior.

use exo_engine::{Engine, EnginePhase, FnController, ZeroController};
use exo_multibody::{factories, EncoderSensor, SensorNoise, SensorRegistry};
use exo_types::{EngineOptions, SimError, Wrench};
use nalgebra::{DVector, Vector3};

fn hinge_engine(options: EngineOptions) -> Engine {
    let model = factories::single_hinge(1.0, 1.0);
    let mut engine = Engine::new(options);
    engine
        .initialize(model, SensorRegistry::new(), Box::new(ZeroController))
        .unwrap();
    engine
}

#[test]
fn lifecycle_phases() {
    let mut engine = Engine::new(EngineOptions::default());
    assert_eq!(engine.phase(), EnginePhase::Uninitialized);
    assert!(engine.simulate(&DVector::zeros(2), 1.0).is_err());

    let model = factories::single_hinge(1.0, 1.0);
    engine
        .initialize(model, SensorRegistry::new(), Box::new(ZeroController))
        .unwrap();
    assert_eq!(engine.phase(), EnginePhase::Initialized);

    engine.simulate(&DVector::zeros(2), 0.1).unwrap();
    assert_eq!(engine.phase(), EnginePhase::Completed);

    engine.reset(false).unwrap();
    assert_eq!(engine.phase(), EnginePhase::Initialized);
}

#[test]
fn duration_boundary() {
    let mut engine = hinge_engine(EngineOptions::default());
    assert!(engine.simulate(&DVector::zeros(2), 0.05).is_ok());
    let err = engine.simulate(&DVector::zeros(2), 0.049);
    assert!(matches!(err, Err(SimError::BadInput(_))));
}

#[test]
fn state_size_is_validated() {
    let mut engine = hinge_engine(EngineOptions::default());
    let err = engine.simulate(&DVector::zeros(1), 1.0);
    assert!(matches!(err, Err(SimError::BadInput(_))));
}

#[test]
fn controller_probe_sizes_are_validated() {
    let model = factories::single_hinge(1.0, 1.0);
    let mut engine = Engine::new(EngineOptions::default());
    // Command of the wrong size: the model has no motors.
    let wrong = FnController::new(
        |_m: &exo_multibody::Model, _s: &SensorRegistry, _t: f64, _q: &DVector<f64>, _v: &DVector<f64>| {
            DVector::zeros(3)
        },
        |m: &exo_multibody::Model, _s: &SensorRegistry, _t: f64, _q: &DVector<f64>, _v: &DVector<f64>| {
            DVector::zeros(m.nv)
        },
    );
    let err = engine.initialize(model, SensorRegistry::new(), Box::new(wrong));
    assert!(matches!(err, Err(SimError::BadInput(_))));
    assert_eq!(engine.phase(), EnginePhase::Uninitialized);
}

#[test]
fn command_is_clipped_to_effort_limit() {
    let mut model = factories::single_hinge(1.0, 1.0);
    model.add_motor(1, 5.0).unwrap();

    let controller = FnController::new(
        |_m: &exo_multibody::Model, _s: &SensorRegistry, _t: f64, _q: &DVector<f64>, _v: &DVector<f64>| {
            DVector::from_element(1, 100.0)
        },
        |m: &exo_multibody::Model, _s: &SensorRegistry, _t: f64, _q: &DVector<f64>, _v: &DVector<f64>| {
            DVector::zeros(m.nv)
        },
    );

    let mut options = EngineOptions::default();
    options.world.gravity = Wrench::zero();
    let mut engine = Engine::new(options);
    engine
        .initialize(model, SensorRegistry::new(), Box::new(controller))
        .unwrap();
    engine.simulate(&DVector::zeros(2), 0.1).unwrap();

    let state = engine.stepper_state().unwrap();
    assert_eq!(state.u_command[0], 5.0);
    assert_eq!(state.u_control[0], 5.0);

    let log = engine.get_log().unwrap();
    let cmd = log.header.iter().position(|h| h == "command.link").unwrap() - 1;
    for row in log.float_data.iter().skip(1) {
        assert!(row[cmd].abs() <= 5.0);
    }
}

#[test]
fn no_contact_frames_means_zero_external_forces() {
    let mut engine = hinge_engine(EngineOptions::default());
    engine.simulate(&DVector::zeros(2), 0.2).unwrap();
    let state = engine.stepper_state().unwrap();
    assert!(state.f_external.iter().all(exo_types::Wrench::is_zero));
}

#[test]
fn incremental_stepping_matches_row_invariant() {
    let mut engine = hinge_engine(EngineOptions::default().with_update_period(0.01));

    assert!(engine.step(None).is_err(), "step before start must fail");

    engine.start(&DVector::from_vec(vec![0.4, 0.0])).unwrap();
    assert_eq!(engine.phase(), EnginePhase::Running);
    for _ in 0..5 {
        engine.step(None).unwrap();
    }
    engine.stop().unwrap();
    assert_eq!(engine.phase(), EnginePhase::Completed);

    let state = engine.stepper_state().unwrap();
    assert_eq!(state.iter, 5);
    assert!((state.t - 0.05).abs() < 1e-9);
    let log = engine.get_log().unwrap();
    assert_eq!(log.timestamps.len(), 6);
}

#[test]
fn reset_and_reseed_is_deterministic() {
    let mut model = factories::single_hinge(1.0, 1.0);
    model.add_motor(1, 50.0).unwrap();

    let mut sensors = SensorRegistry::new();
    sensors
        .add_sensor(Box::new(
            EncoderSensor::new("knee", 1).with_noise(SensorNoise::white(2, 0.01)),
        ))
        .unwrap();

    let mut options = EngineOptions::default().with_update_period(0.01);
    options.stepper.random_seed = 1234;

    let mut engine = Engine::new(options);
    engine
        .initialize(model, sensors, Box::new(ZeroController))
        .unwrap();

    let x0 = DVector::from_vec(vec![0.3, 0.0]);
    engine.simulate(&x0, 0.5).unwrap();
    let first = engine.get_log().unwrap();

    engine.reset(false).unwrap();
    engine.simulate(&x0, 0.5).unwrap();
    let second = engine.get_log().unwrap();

    assert_eq!(first.timestamps, second.timestamps);
    assert_eq!(first.float_data, second.float_data);
    // The noise actually fired: encoder column differs from the exact q.
    let enc = first
        .header
        .iter()
        .position(|h| h == "encoder.knee.position")
        .unwrap()
        - 1;
    let q_col = first.header.iter().position(|h| h == "q.link").unwrap() - 1;
    // Reading at row k was sampled from the state at row k-1; any residual
    // is the injected noise.
    let diverged = (2..first.timestamps.len())
        .any(|k| (first.float_data[k][enc] - first.float_data[k - 1][q_col]).abs() > 1e-6);
    assert!(diverged, "sensor noise should perturb the encoder reading");
}

#[test]
fn clearing_forces_on_reset() {
    let mut model = factories::free_body(1.0, Vector3::new(0.1, 0.1, 0.1));
    model
        .add_frame(
            "hand",
            1,
            Vector3::zeros(),
            nalgebra::UnitQuaternion::identity(),
        )
        .unwrap();
    let mut options = EngineOptions::default().with_update_period(0.01);
    options.world.gravity = Wrench::zero();

    let mut engine = Engine::new(options);
    engine
        .initialize(model, SensorRegistry::new(), Box::new(ZeroController))
        .unwrap();
    engine
        .register_force_impulse(
            "hand",
            0.1,
            0.01,
            Wrench::from_linear(Vector3::new(0.0, 0.0, 10.0)),
        )
        .unwrap();
    engine.reset(true).unwrap();

    let mut x0 = DVector::zeros(13);
    x0[3] = 1.0;
    engine.simulate(&x0, 0.5).unwrap();
    let state = engine.stepper_state().unwrap();
    assert!(
        state.v.norm() < 1e-12,
        "cleared impulse must not accelerate the body"
    );
}

#[test]
fn unknown_frame_registration_fails() {
    let mut engine = hinge_engine(EngineOptions::default());
    let err = engine.register_force_impulse("nope", 0.0, 0.1, Wrench::zero());
    assert!(matches!(err, Err(SimError::BadInput(_))));
}

#[test]
fn iteration_cap_stops_simulation() {
    let mut options = EngineOptions::default().with_update_period(0.01);
    options.stepper.iter_max = 10;
    let mut engine = hinge_engine(options);
    engine.simulate(&DVector::zeros(2), 1.0).unwrap();

    let state = engine.stepper_state().unwrap();
    assert_eq!(state.iter, 10);
    let log = engine.get_log().unwrap();
    assert_eq!(log.timestamps.len(), 11);
}
