pub mod provision;
pub mod teardown;
