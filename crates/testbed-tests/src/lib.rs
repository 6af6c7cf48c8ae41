//! Integration test infrastructure for testbed.
//!
//! Every test in `tests/` needs a local Docker daemon and is ignored by
//! default. Run them with:
//!
//! ```text
//! cargo test -p testbed-tests -- --ignored
//! ```

pub mod context;

pub use context::TestEnvironment;
pub use testbed_trace::init_test_logging;
