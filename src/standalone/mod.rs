//! The MCP server the gateway protects, and its catalog reload task.

pub mod hot_reload;
pub mod server;
