//! End-to-end tests against the mock transport.

pub mod dispatch_tests;
