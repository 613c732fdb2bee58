//! Execution scenarios on a controller driven from the calling thread

mod common;

use common::builders::{ModelBuilder, ROOT};
use common::mock_helpers::{call_log, calls, state_changes, update_count, RecordingProcess};
use lumass_core::controller::ControllerState;
use lumass_core::{ControllerEvent, ExecutionOutcome};

#[test]
fn test_chain_updates_each_once() {
    let log = call_log();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut controller = ModelBuilder::new()
        .process("A", ROOT, RecordingProcess::new("A", log.clone()), &[])
        .process("B", ROOT, RecordingProcess::new("B", log.clone()), &["A"])
        .process("C", ROOT, RecordingProcess::new("C", log.clone()), &["B"])
        .build()
        .with_events(tx);

    let report = controller.execute_model(ROOT).unwrap();
    assert_eq!(report.outcome, ExecutionOutcome::Completed);
    assert_eq!(report.updates, 3);

    let updates: Vec<String> = calls(&log)
        .into_iter()
        .filter(|c| c.starts_with("update:"))
        .collect();
    assert_eq!(updates, vec!["update:A", "update:B", "update:C"]);
    assert_eq!(common::scalar_output(&controller, "C"), Some(3.0));

    let events: Vec<ControllerEvent> = rx.try_iter().collect();
    assert_eq!(
        state_changes(&events),
        vec![
            ControllerState::Running,
            ControllerState::Completed,
            ControllerState::Idle
        ]
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, ControllerEvent::Finished(r) if r.outcome.is_success())));
}

#[test]
fn test_shared_upstream_updated_once_per_step() {
    let log = call_log();
    let mut controller = ModelBuilder::new()
        .process("A", ROOT, RecordingProcess::new("A", log.clone()), &[])
        .process("B", ROOT, RecordingProcess::new("B", log.clone()), &["A"])
        .process("C", ROOT, RecordingProcess::new("C", log.clone()), &["A"])
        .process("D", ROOT, RecordingProcess::new("D", log.clone()), &["B", "C"])
        .build();

    let report = controller.execute_model(ROOT).unwrap();
    assert!(report.outcome.is_success());
    for label in ["A", "B", "C", "D"] {
        assert_eq!(update_count(&log, label), 1, "{} updated more than once", label);
    }
    // A = 1, B = C = 2, D = 2 + 2 + 1
    assert_eq!(common::scalar_output(&controller, "D"), Some(5.0));
}

#[test]
fn test_shared_upstream_inside_loop() {
    let log = call_log();
    let mut controller = ModelBuilder::new()
        .aggregate("Loop", ROOT, 3)
        .process("A", "Loop", RecordingProcess::new("A", log.clone()), &[])
        .process("B", "Loop", RecordingProcess::new("B", log.clone()), &["A"])
        .process("C", "Loop", RecordingProcess::new("C", log.clone()), &["A", "B"])
        .build();

    let report = controller.execute_model(ROOT).unwrap();
    assert!(report.outcome.is_success());
    assert_eq!(report.updates, 9);
    assert_eq!(update_count(&log, "A"), 3);
    assert_eq!(update_count(&log, "C"), 3);
}

#[test]
fn test_abort_after_first_component() {
    let log = call_log();
    let mut controller = ModelBuilder::new()
        .process("A", ROOT, RecordingProcess::new("A", log.clone()), &[])
        .process("B", ROOT, RecordingProcess::new("B", log.clone()), &["A"])
        .process("C", ROOT, RecordingProcess::new("C", log.clone()), &["B"])
        .build();
    let flag = controller.abort_flag();
    controller
        .get_component_mut("A")
        .unwrap()
        .set_process(Box::new(RecordingProcess::new("A", log.clone()).aborting(flag)))
        .unwrap();

    let report = controller.execute_model(ROOT).unwrap();
    assert_eq!(report.outcome, ExecutionOutcome::Aborted);
    assert_eq!(report.updates, 1);
    assert_eq!(update_count(&log, "A"), 1);
    assert_eq!(update_count(&log, "B"), 0);
    assert_eq!(update_count(&log, "C"), 0);
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(controller.execution_stack().is_empty());

    // a new run starts with a cleared flag
    let report = controller.execute_model(ROOT).unwrap();
    assert_eq!(report.outcome, ExecutionOutcome::Completed);
    assert_eq!(report.updates, 3);
}

#[test]
fn test_abort_before_run_is_discarded() {
    let log = call_log();
    let mut controller = ModelBuilder::new()
        .process("A", ROOT, RecordingProcess::new("A", log.clone()), &[])
        .process("B", ROOT, RecordingProcess::new("B", log.clone()), &["A"])
        .build();

    controller.abort_model();
    let report = controller.execute_model(ROOT).unwrap();
    assert_eq!(report.outcome, ExecutionOutcome::Completed);
    assert_eq!(report.updates, 2);
    assert!(!controller.abort_flag().load(std::sync::atomic::Ordering::SeqCst));
}

#[test]
fn test_data_buffer_feeds_back_previous_value() {
    let mut controller = ModelBuilder::new()
        .aggregate("Loop", ROOT, 3)
        .builtin("MapAlgebra", "Calc", "Loop", &[("Expression", &["b1 + 1.0"])], &["State"])
        .data("State", "Loop", Some(0.0), &["Calc"])
        .build();

    let report = controller.execute_model("Loop").unwrap();
    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    assert_eq!(report.updates, 3);
    common::assert_float_eq(common::scalar_output(&controller, "State").unwrap(), 3.0, 1e-9);

    // a second run starts again from the preloaded value
    controller.execute_model("Loop").unwrap();
    common::assert_float_eq(common::scalar_output(&controller, "State").unwrap(), 3.0, 1e-9);
}

#[test]
fn test_failure_names_host_and_component_steps() {
    let log = call_log();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut controller = ModelBuilder::new()
        .aggregate("Loop", ROOT, 3)
        .process("Fail", "Loop", RecordingProcess::new("Fail", log.clone()).failing_on(2), &[])
        .build()
        .with_events(tx);

    let report = controller.execute_model(ROOT).unwrap();
    assert_eq!(
        report.outcome,
        ExecutionOutcome::Failed {
            component: "Fail".to_string(),
            message: "Loop step #2: Fail step #1: boom".to_string(),
        }
    );
    assert_eq!(report.updates, 1);
    assert_eq!(controller.state(), ControllerState::Idle);

    let events: Vec<ControllerEvent> = rx.try_iter().collect();
    assert!(events.iter().any(|e| matches!(
        e,
        ControllerEvent::ComponentError { component, .. } if component == "Fail"
    )));
    assert_eq!(
        state_changes(&events),
        vec![
            ControllerState::Running,
            ControllerState::Failed,
            ControllerState::Idle
        ]
    );
}

#[test]
fn test_resources_bracket_the_run() {
    let log = call_log();
    let mut controller = ModelBuilder::new()
        .process("A", ROOT, RecordingProcess::new("A", log.clone()), &[])
        .process("B", ROOT, RecordingProcess::new("B", log.clone()).failing_on(1), &["A"])
        .build();

    let report = controller.execute_model(ROOT).unwrap();
    assert!(!report.outcome.is_success());
    assert_eq!(
        calls(&log),
        vec!["open:A", "open:B", "update:A", "update:B", "close:A", "close:B"]
    );
}

#[test]
fn test_panicking_process_fails_the_run() {
    let log = call_log();
    let mut controller = ModelBuilder::new()
        .process("Bad", ROOT, RecordingProcess::new("Bad", log.clone()).panicking("kaboom"), &[])
        .build();

    let report = controller.execute_model(ROOT).unwrap();
    match report.outcome {
        ExecutionOutcome::Failed { component, message } => {
            assert_eq!(component, "Bad");
            assert!(message.contains("process panicked: kaboom"), "{}", message);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(calls(&log).last().map(String::as_str), Some("close:Bad"));

    // the process was put back and the controller accepts another run
    assert!(controller.get_component("Bad").unwrap().has_process());
    assert!(controller.execute_model(ROOT).is_ok());
}

#[test]
fn test_zero_iterations_expression_skips_component() {
    let log = call_log();
    let mut controller = ModelBuilder::new()
        .aggregate("Loop", ROOT, 2)
        .process("A", "Loop", RecordingProcess::new("A", log.clone()), &[])
        .build();
    controller
        .get_component_mut("Loop")
        .unwrap()
        .set_num_iterations_expression(vec!["0".to_string()]);

    let report = controller.execute_model(ROOT).unwrap();
    assert!(report.outcome.is_success());
    assert_eq!(report.updates, 0);
    assert_eq!(update_count(&log, "A"), 0);
}

#[test]
fn test_per_step_values_follow_host_iteration() {
    let mut controller = ModelBuilder::new()
        .aggregate("Loop", ROOT, 4)
        .builtin("ScalarSource", "Src", "Loop", &[("Values", &["10", "20"])], &[])
        .builtin("MapAlgebra", "Twice", "Loop", &[("Expression", &["b1 * 2.0"])], &["Src"])
        .build();

    let report = controller.execute_model(ROOT).unwrap();
    assert!(report.outcome.is_success(), "{:?}", report.outcome);
    assert_eq!(report.updates, 8);
    // host step 3 (0-based) selects "20" from the cycled list
    assert_eq!(common::scalar_output(&controller, "Twice"), Some(40.0));
}
