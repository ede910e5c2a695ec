//! Transactional storage gateway (§3, §4.1) for Users, Templates, Segments,
//! Campaigns, Messages, and the raw webhook audit tables. `sqlite` is the
//! only backend wired up today; the trait seam exists so a Postgres
//! implementation can be dropped in without touching any caller.

pub mod entities;
pub mod error;
pub mod gateway;
pub mod sqlite;

pub use entities::{
    Campaign, CampaignReport, ConsentCaller, DeliveryReceipt, DispatchOutcome, InboundEvent,
    Message, NewDeliveryReceipt, NewInboundEvent, RecipientPage, Segment, Subscription, Template,
    User,
};
pub use error::{Result, StorageError};
pub use gateway::StorageGateway;
pub use sqlite::SqliteStorageGateway;
