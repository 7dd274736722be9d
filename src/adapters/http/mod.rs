//! Origin access over HTTP.

pub mod auto_block;
pub mod origin_client;

pub use auto_block::{AutoBlock, BlockStatus};
pub use origin_client::HttpOriginClient;
