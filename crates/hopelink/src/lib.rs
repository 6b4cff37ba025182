//! `hopelink` - wandering-detector registry for dementia care centers
//!
//! This library keeps the registry of GPS wandering detectors handed out to
//! patients. Records live in a cloud document collection when one is
//! configured and in a single key of a local database otherwise; callers see
//! one live, newest-first record set either way.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod form;
pub mod listing;
pub mod logging;
pub mod record;
pub mod seed;
pub mod sequence;
pub mod stats;
pub mod store;
pub mod summary;
pub mod view;

pub use auth::{Authenticator, LoginRequest, Role, Session};
pub use config::Config;
pub use error::{Error, Result};
pub use form::{Attachment, FormAssembler, RegistrationInput};
pub use logging::init_logging;
pub use record::Record;
pub use stats::DashboardStats;
pub use store::{RecordBackend, RecordStore, Subscription};
pub use summary::SummaryClient;
pub use view::{Screen, ViewState};
