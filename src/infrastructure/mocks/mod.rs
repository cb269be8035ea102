//! Test doubles for the infrastructure adapters.
//!
//! Time, address resolution, persistence and tracing output can all be
//! controlled or inspected from a test.

pub mod clock;
pub mod layer;
pub mod persistence;
pub mod resolver;

pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use persistence::MockPersistence;
pub use resolver::MockResolver;
