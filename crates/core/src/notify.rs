use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("email rendering failed: {0}")]
    Render(String),
    #[error("email provider rejected the message: {0}")]
    Rejected(String),
    #[error("email transport failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Returns the provider's message id.
    async fn send(&self, email: OutboundEmail) -> Result<String, EmailError>;
}
