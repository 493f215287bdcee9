//! Request handlers.

pub mod control;
pub mod detections;
pub mod enrich;
pub mod health;
pub mod stream;

pub use control::*;
pub use detections::*;
pub use enrich::*;
pub use health::*;
pub use stream::*;
