//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use lumass_core::ModelController;
use std::time::Duration;

/// Upper bound for waiting on the controller thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Scalar output 0 of `component`
pub fn scalar_output(controller: &ModelController, component: &str) -> Option<f64> {
    controller
        .component_output(component, 0)
        .and_then(|d| d.as_scalar())
}
