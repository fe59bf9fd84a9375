pub mod email;

use async_trait::async_trait;
use std::sync::Arc;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, text: &str) -> anyhow::Result<()>;
}

pub type ImplEmailService = Arc<dyn EmailService>;
