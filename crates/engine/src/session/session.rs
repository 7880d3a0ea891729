//! One user's in-progress multi-page scan

use chrono::{DateTime, Local};
use protocol::{OwnerKey, SessionId};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Bounded-lifetime record of one accumulating scan.
///
/// Presence in the store is what makes a session active: finalize, cancel
/// and expiry all remove the record rather than flagging it terminal, so
/// no history is kept.
#[derive(Debug)]
pub struct ScanSession {
    id: SessionId,
    owner: OwnerKey,
    /// Spooled page files, in capture order. Append-only.
    pages: Vec<PathBuf>,
    created_at: DateTime<Local>,
    last_activity: Instant,
}

impl ScanSession {
    pub(crate) fn new(owner: OwnerKey) -> Self {
        Self {
            id: SessionId(Uuid::new_v4().to_string()),
            owner,
            pages: Vec::new(),
            created_at: Local::now(),
            last_activity: Instant::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn owner(&self) -> &OwnerKey {
        &self.owner
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub(crate) fn pages(&self) -> &[PathBuf] {
        &self.pages
    }

    pub(crate) fn push_page(&mut self, path: PathBuf) {
        self.pages.push(path);
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Output document name: `<user>-<session start>.pdf`.
    pub fn document_name(&self) -> String {
        format!(
            "{}-{}.pdf",
            self.owner.user,
            self.created_at.format("%Y-%m-%d-%H-%M-%S")
        )
    }
}
