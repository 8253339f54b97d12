//! # NetSentry Core
//!
//! Controllers and view state for the NetSentry network monitoring shell.
//!
//! All real work (packet capture, log storage, anomaly detection, deep
//! analysis, system log collection) lives in a backend reached through the
//! [`bridge::Backend`] trait. This crate owns everything on the near side of
//! that boundary:
//!
//! - **Bridge**: typed, validated calls plus connectivity tracking
//! - **Signals**: push notifications from the backend (alerts, log growth, progress)
//! - **Dashboard**: four charts, the alert feed and the capture/sound/auto-update toggles
//! - **Log browser**: folder/file navigation, multi-card file view, search, analysis
//! - **System logs**: one-shot collection job with streamed progress
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netsentry_core::{bridge::MemoryBackend, Config, Session};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let session = Session::new(Arc::new(MemoryBackend::demo()), Config::default());
//! session.start().await;
//! session.dashboard.update_all_data().await;
//! # }
//! ```

pub mod analysis;
pub mod bridge;
pub mod chart;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod model;
pub mod navigator;
pub mod progress;
pub mod search;
pub mod session;
pub mod signal;
pub mod system_log;

pub use bridge::{Backend, BridgeAdapter};
pub use config::Config;
pub use error::{SentryError, SentryResult};
pub use session::Session;
pub use signal::{ProgressUpdate, Signal, SignalHub};
