//! Reactive resource cache and data-access layer for a medical-laboratory
//! catalog of categories, services and packages.

pub mod app;
pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod query;
pub mod remote;

pub use app::{Catalog, CatalogOptions};
pub use error::{AuthError, ConfigError, DecodeError, OperationError, RemoteError, ValidationError};
pub use notify::{ChannelSink, LogSink, Notification, NotificationSink};
pub use query::{FetchStatus, QueryObserver};
