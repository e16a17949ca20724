pub mod singleflight;
pub mod token_manager;

pub use singleflight::SingleFlight;
pub use token_manager::TokenManager;
