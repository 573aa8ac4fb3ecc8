//! Connection authentication

mod credential;
mod gate;

pub use credential::Credential;
pub use gate::{AuthGate, Identity};
