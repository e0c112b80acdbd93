pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod updates;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, SeedResult, SourceSeedInfo, VerificationResult};
pub use updates::{SubmissionReceipt, UpdateService};
