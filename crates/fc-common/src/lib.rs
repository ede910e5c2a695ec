//! Shared domain types, error taxonomy, and logging setup used across every
//! crate in the messaging engine.

pub mod domain;
pub mod error;
pub mod logging;
pub mod phone;
pub mod segment;

pub use domain::{CampaignStatus, ConsentState, MessageStatus, SkipReason};
pub use error::{DomainError, Result};
pub use phone::{extract_channel_and_phone, normalize, Channel, PhoneNumber};
pub use segment::{Logic, Operator, SegmentPredicate};
