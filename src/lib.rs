//! Sends a "mail delivered" notification email whenever `/mail-delivered` is hit.

pub mod config;
pub mod delivery;
pub mod handler;
pub mod message;

pub use config::{Config, ConfigError};
pub use delivery::{deliver, Connector, DataCloseError, DeliveryError, SessionError, SmtpSession, Stage};
pub use handler::{router, AppState};
pub use message::{compose, sender_address, OutboundMessage};
