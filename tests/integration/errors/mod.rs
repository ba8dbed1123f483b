//! Error path tests

mod fault_test;
mod network_test;
