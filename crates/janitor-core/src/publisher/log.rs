use async_trait::async_trait;
use tracing::info;

use crate::diff::Correction;
use crate::message::ChangeRequest;
use crate::traits::CorrectionPublisher;
use crate::Error;

/// Logs corrections without acting on them (dry run)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl CorrectionPublisher for LogPublisher {
    async fn publish(&self, request: &ChangeRequest, correction: &Correction) -> Result<(), Error> {
        if correction.is_empty() {
            info!("{}: no changes", request);
            return Ok(());
        }

        for deletion in &correction.deletions {
            info!("{}: would delete {}", request, deletion);
        }
        for addition in &correction.additions {
            info!("{}: would add {}", request, addition);
        }
        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        "log"
    }
}
