//! Policy, enrollment and certmonger operation tests

mod certmonger_test;
mod enroll_test;
mod helper_binary_test;
mod policy_test;
mod poll_test;
