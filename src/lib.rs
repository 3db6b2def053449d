//! MaVille: municipal work-order tracking with subscription-based
//! notification fanout. Residents report problems, providers bid on them,
//! STPM agents arbitrate, and every state change is routed to the
//! subscribers it concerns, over a live stream or the polling fallback.

pub mod app;
pub mod common;
pub mod config;
pub mod domain;
pub mod infra;
pub mod logging;
pub mod notify;
pub mod server;
pub mod storage;
