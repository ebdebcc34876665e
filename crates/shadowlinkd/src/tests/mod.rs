//! Test suites for the device agent.

mod support;
