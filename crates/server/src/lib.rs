//! Serving side of the pipeline: socket fan-out, HTTP surface and the wiring
//! used by the `newswire-api`, `newswire-producer` and `newswire-archiver`
//! binaries.

pub mod api;
pub mod fanout;
pub mod lifecycle;
pub mod live;
pub mod pipeline;
pub mod router;
pub mod state;

pub use fanout::{FanoutConfig, Hub};
pub use router::build_router;
pub use state::AppState;
