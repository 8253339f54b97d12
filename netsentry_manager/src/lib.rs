//! NetSentry Manager Library
//!
//! Terminal front end for NetSentry plus the HTTP bridge used to reach a
//! remote backend.

pub mod http_bridge;
pub mod logging;
pub mod monitor_tui;
