//! QX order placement with finality tracking.
//!
//! Wires the components together:
//! - Qubic RPC and QX API clients
//! - Task monitor with a shared tick clock
//! - Order placer (broadcast, then monitor until confirmed or expired)
//! - Optional push-hint listener

pub mod app;
pub mod config;
pub mod error;
pub mod placer;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use placer::{OrderNotice, OrderPlacer, PlaceOrderError, PlacedOrder};
