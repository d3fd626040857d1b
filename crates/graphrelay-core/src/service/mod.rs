//! Upstream services the relay talks to.

pub mod graph;
pub mod relay;

pub use graph::{GRAPH_BASE_URL, GraphMailer, SendError};
pub use relay::GraphRelay;
