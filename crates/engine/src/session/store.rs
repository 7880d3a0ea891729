//! Session store
//!
//! Keyed store of active scan sessions, one per owner, capped at a
//! deployment-configured number of concurrent sessions (one, for a single
//! shared scanner). A single mutex guards the whole map and every
//! operation is one critical section, so the chat request path and the
//! reaper cannot both win a race on the same session: whichever mutates
//! second observes `NotFound`. Check-then-act belongs inside this module,
//! never in callers.

use crate::session::session::ScanSession;
use protocol::{AssembleError, FinalizeError, OwnerKey, SessionError, SessionId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

/// Merges ordered page images into one output document.
///
/// Implemented by the PDF writer in the bot crate; tests substitute
/// recording and failing assemblers.
pub trait DocumentAssembler: Send + Sync {
    fn assemble(&self, pages: &[PathBuf], dest: &Path) -> Result<(), AssembleError>;
}

/// What the chat layer needs to know about an active session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub page_count: usize,
}

/// Result of a successful finalize.
#[derive(Debug, Clone)]
pub struct FinalizedScan {
    pub file_name: String,
    pub path: PathBuf,
    pub page_count: usize,
}

/// A session the reaper removed for inactivity.
#[derive(Debug, Clone)]
pub struct ExpiredSession {
    pub owner: OwnerKey,
    pub id: SessionId,
    pub page_count: usize,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<OwnerKey, ScanSession>>>,
    /// Spool directory for per-page files.
    tmp_dir: PathBuf,
    /// Destination directory for assembled documents.
    output_dir: PathBuf,
    /// At most this many sessions may be active at once.
    max_active: usize,
    assembler: Arc<dyn DocumentAssembler>,
}

impl SessionStore {
    pub fn new(
        tmp_dir: PathBuf,
        output_dir: PathBuf,
        max_active: usize,
        assembler: Arc<dyn DocumentAssembler>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            tmp_dir,
            output_dir,
            max_active,
            assembler,
        }
    }

    /// Open a session for `owner`. An owner gets at most one, and the
    /// store refuses outright once `max_active` is reached: a second user
    /// is rejected, not queued, while the shared scanner is spoken for.
    pub fn start(&self, owner: OwnerKey) -> Result<SessionId, SessionError> {
        let mut sessions = self.lock();
        if sessions.contains_key(&owner) {
            return Err(SessionError::AlreadyActive);
        }
        if sessions.len() >= self.max_active {
            return Err(SessionError::Busy);
        }

        let session = ScanSession::new(owner.clone());
        let id = session.id().clone();
        info!(user = %owner.user, session = %id, "Scan session started");
        sessions.insert(owner, session);
        Ok(id)
    }

    /// Append captured pages in order. Each page is written to the spool
    /// directory as `<session>-<index>.jpg` before its path is recorded,
    /// so names cannot collide across sessions. Bumps the activity clock.
    pub fn add_pages(&self, owner: &OwnerKey, pages: Vec<Vec<u8>>) -> Result<usize, SessionError> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(owner).ok_or(SessionError::NotFound)?;

        for bytes in pages {
            let path = self
                .tmp_dir
                .join(format!("{}-{}.jpg", session.id(), session.page_count()));
            fs::write(&path, &bytes).map_err(|e| SessionError::Spool(e.to_string()))?;
            session.push_page(path);
        }
        Ok(session.page_count())
    }

    /// Bump the activity clock on any user interaction with the session.
    /// No-op when the owner has no session.
    pub fn touch(&self, owner: &OwnerKey) {
        if let Some(session) = self.lock().get_mut(owner) {
            session.touch();
        }
    }

    pub fn get_active(&self, owner: &OwnerKey) -> Option<SessionSnapshot> {
        self.lock().get(owner).map(|session| SessionSnapshot {
            id: session.id().clone(),
            page_count: session.page_count(),
        })
    }

    /// Assemble the accumulated pages and close the session.
    ///
    /// Non-destructive on failure: the session and its page files stay in
    /// place so the user can retry once the cause is fixed. Runs as one
    /// critical section, so a racing reaper expiry cannot interleave.
    pub fn finalize(&self, owner: &OwnerKey) -> Result<FinalizedScan, FinalizeError> {
        let mut sessions = self.lock();
        let session = sessions.get(owner).ok_or(SessionError::NotFound)?;
        if session.page_count() == 0 {
            return Err(AssembleError::NoPages.into());
        }

        let file_name = session.document_name();
        let dest = self.output_dir.join(&file_name);
        self.assembler.assemble(session.pages(), &dest)?;

        // Assembly succeeded; only now does the session go away.
        let session = sessions.remove(owner).ok_or(SessionError::NotFound)?;
        remove_artifacts(&session);
        info!(
            user = %owner.user,
            file = %file_name,
            pages = session.page_count(),
            "Scan finalized"
        );
        Ok(FinalizedScan {
            file_name,
            path: dest,
            page_count: session.page_count(),
        })
    }

    /// Drop the session and its spooled pages. Reports `NotFound` without
    /// side effects when nothing is active.
    pub fn cancel(&self, owner: &OwnerKey) -> Result<(), SessionError> {
        let mut sessions = self.lock();
        let session = sessions.remove(owner).ok_or(SessionError::NotFound)?;
        remove_artifacts(&session);
        info!(user = %owner.user, session = %session.id(), "Scan session cancelled");
        Ok(())
    }

    /// Remove every session idle for at least `timeout`, deleting spooled
    /// pages, and report what was removed. One critical section: an expiry
    /// here and a finalize/cancel on the chat path cannot both succeed for
    /// the same session.
    pub fn expire_idle(&self, timeout: Duration) -> Vec<ExpiredSession> {
        let mut sessions = self.lock();
        let stale: Vec<OwnerKey> = sessions
            .iter()
            .filter(|(_, session)| session.idle_for() >= timeout)
            .map(|(owner, _)| owner.clone())
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for owner in stale {
            if let Some(session) = sessions.remove(&owner) {
                warn!(
                    user = %owner.user,
                    session = %session.id(),
                    pages = session.page_count(),
                    "Scan session expired after inactivity"
                );
                remove_artifacts(&session);
                expired.push(ExpiredSession {
                    id: session.id().clone(),
                    page_count: session.page_count(),
                    owner,
                });
            }
        }
        expired
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OwnerKey, ScanSession>> {
        // A poisoned lock means a peer thread panicked mid-update.
        self.inner.lock().expect("session store mutex poisoned")
    }
}

/// Best-effort deletion of a closed session's page files.
fn remove_artifacts(session: &ScanSession) {
    for path in session.pages() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Could not remove page file");
        }
    }
}
