//! Cloud registration ("claim") of a discovered device.

mod accounts;
mod orchestrator;

pub use accounts::{annotate_accounts, AccountChoice, AccountEntry, IDENTITY_ACCOUNT_INDEX};
pub use orchestrator::{claim_url, ConfirmPath, Phase, RegistrationOrchestrator};
