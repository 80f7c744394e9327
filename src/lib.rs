//! PR Validator
//!
//! Links the CodeCommit pull request lifecycle to CodePipeline review
//! pipelines and feeds each pipeline outcome back as an approval decision
//! on the pull request.

pub mod aws;
pub mod clients;
pub mod config;
pub mod configurator;
pub mod error;
pub mod event;
pub mod handler;
pub mod pipeline;
pub mod registry;
pub mod review;
pub mod server;

pub use error::{UpstreamError, ValidatorError};
pub use event::EventEnvelope;
pub use handler::{EventHandler, HandlerOutcome, HandlerSettings};
