//! Log-only notifier for dry runs: nothing leaves the process.

use async_trait::async_trait;
use railwatch_core::error::Result;
use railwatch_core::traits::Notifier;
use railwatch_core::types::OutboundMessage;

#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, destination_id: &str, message: &OutboundMessage) -> Result<()> {
        tracing::info!(
            destination = destination_id,
            blocks = message.blocks.len(),
            "📢 [dry-run] {}",
            message.text
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let notifier = LogNotifier;
        assert_eq!(notifier.name(), "log");
        assert!(notifier.send("C123", &OutboundMessage::text("hello")).await.is_ok());
    }
}
