//! Utility functions and helpers.

pub mod preflight;
pub mod settings;

pub use preflight::{check_ai_credentials, create_ai_client, AiCredentialInfo, AiProvider};
pub use settings::Settings;
