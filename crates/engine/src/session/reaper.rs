//! Background expiry of abandoned sessions

use crate::session::store::{ExpiredSession, SessionStore};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawn the reaper task.
///
/// Every `interval` it expires sessions idle for at least `timeout` and
/// forwards each one on the returned channel, so the chat layer can tell
/// the owner the session lapsed. The task only ever goes through the
/// store's atomic contract; it never inspects sessions directly. It stops
/// on its own once the receiver is dropped.
pub fn spawn_reaper(
    store: SessionStore,
    timeout: Duration,
    interval: Duration,
) -> (JoinHandle<()>, mpsc::UnboundedReceiver<ExpiredSession>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let expired = store.expire_idle(timeout);
            if expired.is_empty() {
                debug!("Reaper pass: nothing to expire");
                continue;
            }
            for session in expired {
                if tx.send(session).is_err() {
                    debug!("Expiry receiver gone, reaper stopping");
                    return;
                }
            }
        }
    });

    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::DocumentAssembler;
    use protocol::{AssembleError, OwnerKey};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    struct NullAssembler;

    impl DocumentAssembler for NullAssembler {
        fn assemble(&self, _pages: &[PathBuf], _dest: &Path) -> Result<(), AssembleError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reaper_expires_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
            1,
            Arc::new(NullAssembler),
        );
        let owner = OwnerKey {
            user: "alice".to_string(),
            chat: 42,
        };
        store.start(owner.clone()).unwrap();

        let (handle, mut rx) = spawn_reaper(
            store.clone(),
            Duration::from_millis(10),
            Duration::from_millis(5),
        );

        let expired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("reaper should expire the idle session")
            .unwrap();
        assert_eq!(expired.owner, owner);
        assert!(store.get_active(&owner).is_none());

        drop(rx);
        handle.abort();
    }
}
