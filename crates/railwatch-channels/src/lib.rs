//! # Railwatch Channels
//! Notifier implementations.

pub mod dry_run;
pub mod slack;

pub use dry_run::LogNotifier;
pub use slack::SlackNotifier;
