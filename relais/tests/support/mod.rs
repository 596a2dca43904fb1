pub mod harness;
pub mod mock_api;

pub use harness::E2ETestHarness;
