//! Background task turning letter events into delivered notices.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::{Notifier, audience, compose};
use crate::letters::events::LetterEvent;
use crate::store::LetterStore;

/// Consume `events` until the channel closes. Delivery failures are logged
/// and never reach the workflow.
pub fn spawn_notifier_task(
    mut events: broadcast::Receiver<LetterEvent>,
    store: Arc<dyn LetterStore>,
    notifier: Arc<dyn Notifier>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let sent = deliver(&event, store.as_ref(), notifier.as_ref()).await;
                    debug!(letter_id = %event.letter_id, sent, "Notices delivered");
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(missed = n, "Notifier lagged behind letter events");
                }
                Err(RecvError::Closed) => {
                    debug!("Letter event channel closed");
                    break;
                }
            }
        }
    })
}

/// Send `event`'s notice to everyone in its audience. Returns how many
/// notices went out.
pub async fn deliver(event: &LetterEvent, store: &dyn LetterStore, notifier: &dyn Notifier) -> usize {
    let Some((role, department)) = audience(event) else {
        return 0;
    };

    let recipients = match store.find_users(role, department).await {
        Ok(users) => users,
        Err(e) => {
            warn!(letter_id = %event.letter_id, error = %e, "Cannot resolve notice recipients");
            return 0;
        }
    };

    let notices: Vec<_> = recipients
        .iter()
        .filter_map(|user| compose(event, &user.email))
        .collect();
    let results = join_all(notices.iter().map(|notice| notifier.send(notice))).await;

    let mut sent = 0;
    for (notice, result) in notices.iter().zip(results) {
        match result {
            Ok(()) => sent += 1,
            Err(e) => warn!(
                letter_id = %event.letter_id,
                notifier = notifier.name(),
                to = %notice.to,
                error = %e,
                "Notice delivery failed"
            ),
        }
    }
    sent
}
