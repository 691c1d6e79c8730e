//! Delivery: upload the rendered quiz, then notify the requester.
//!
//! The two steps are deliberately independent. An upload failure skips
//! notification entirely — no success message for a document nobody can
//! retrieve — while a notification failure is logged and leaves
//! `stored=true` standing. Both facts live in the returned
//! [`DeliveryOutcome`] rather than in the error channel so callers can
//! report partial delivery honestly.

use crate::error::QuizError;
use crate::notify::Notifier;
use crate::prompts::{notification_body, NOTIFICATION_SUBJECT};
use crate::quiz::DeliveryOutcome;
use crate::storage::ObjectStore;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Key prefix for rendered quizzes in the bucket.
const RESULT_PREFIX: &str = "results";

/// Upload the rendered quiz PDF and dispatch the completion email.
///
/// Returns `Err` only when the upload itself fails; every notification
/// outcome is encoded in the returned [`DeliveryOutcome`].
pub async fn deliver(
    store: &Arc<dyn ObjectStore>,
    notifier: &Arc<dyn Notifier>,
    pdf_bytes: Vec<u8>,
    email: &str,
) -> Result<DeliveryOutcome, QuizError> {
    // Fresh, globally-unique key per delivery; uploads never collide or
    // overwrite a previous quiz.
    let key = format!("{RESULT_PREFIX}/quiz_{}.pdf", Uuid::new_v4());

    let location = match store
        .put_object(&key, pdf_bytes, "application/pdf")
        .await
    {
        Ok(location) => location,
        Err(e) => {
            error!("Upload of '{}' failed: {}", key, e);
            return Err(e);
        }
    };

    let notified = match notifier
        .send(email, NOTIFICATION_SUBJECT, &notification_body(&location))
        .await
    {
        Ok(()) => true,
        Err(e) => {
            // Never retroactively fails the stored quiz.
            warn!("Notification failed after successful upload: {}", e);
            false
        }
    };

    info!(
        "Delivery complete: stored at {}, notified={}",
        location, notified
    );

    Ok(DeliveryOutcome {
        stored: true,
        location: Some(location),
        notified,
    })
}
