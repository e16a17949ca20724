pub mod health;
pub mod selector;

pub use health::{apply_outcome, Outcome};
pub use selector::{AccountSelector, NoHealthyAccounts};
