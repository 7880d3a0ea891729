//! Chat conversation runtime
//!
//! Long-polls the Bot API, authorizes senders, and drives the engine.
//! Updates are handled strictly one at a time, so capture requests are
//! sequential by construction; the scanner pool has one device to give
//! out anyway.

pub mod api;

pub use api::ChatApi;

use crate::config::BotConfig;
use api::{Keyboard, Update};
use engine::{
    CaptureClient, DeviceRegistry, ExpiredSession, FinalizedScan, SessionStore, capture_pages,
};
use protocol::{FinalizeError, OwnerKey, ScanSettings, SessionError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// Button labels double as the recognized command texts.
pub const START_SCAN: &str = "🖨 Start scan";
pub const SCAN_PAGE: &str = "📄 Scan page";
pub const FINISH_SCAN: &str = "✅ Finish";
pub const CANCEL_SCAN: &str = "❌ Cancel";

/// What an inbound text asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Capture,
    Finish,
    Cancel,
    Other,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            START_SCAN | "/start" | "/scan" => Self::Start,
            SCAN_PAGE => Self::Capture,
            FINISH_SCAN | "/done" => Self::Finish,
            CANCEL_SCAN | "/cancel" => Self::Cancel,
            _ => Self::Other,
        }
    }
}

pub struct BotRuntime {
    api: ChatApi,
    registry: DeviceRegistry,
    store: SessionStore,
    capture: Arc<dyn CaptureClient>,
    settings: ScanSettings,
    device_override: Option<String>,
    authorized_users: Vec<String>,
    send_document: bool,
}

impl BotRuntime {
    pub fn new(
        api: ChatApi,
        registry: DeviceRegistry,
        store: SessionStore,
        capture: Arc<dyn CaptureClient>,
        config: &BotConfig,
    ) -> Self {
        Self {
            api,
            registry,
            store,
            capture,
            settings: config.scan.settings(),
            device_override: config.scan.override_name().map(str::to_string),
            authorized_users: config.chat.authorized_users.clone(),
            send_document: config.chat.send_document,
        }
    }

    /// Long-poll loop. Transport errors are logged and retried; nothing a
    /// single update does can take the loop down.
    pub async fn run(self) -> common::Result<()> {
        info!("Chat runtime started");
        let mut offset: i64 = 0;
        loop {
            let updates = match self.api.get_updates(offset, 60).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "Polling failed, backing off");
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                self.handle_update(update).await;
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text else { return };
        let Some(from) = message.from else { return };
        let Some(user) = from.username else {
            debug!(id = from.id, "Message without a username, ignoring");
            return;
        };

        if !self.authorized_users.iter().any(|allowed| allowed == &user) {
            warn!(user = %user, id = from.id, "Unauthorized user, ignoring");
            return;
        }

        let owner = OwnerKey {
            user,
            chat: message.chat.id,
        };
        debug!(user = %owner.user, text = %text, "Handling message");

        // Any interaction counts as session activity.
        self.store.touch(&owner);

        match Command::parse(&text) {
            Command::Start => self.handle_start(&owner).await,
            Command::Capture => self.handle_capture(&owner).await,
            Command::Finish => self.handle_finish(&owner).await,
            Command::Cancel => self.handle_cancel(&owner).await,
            Command::Other => self.reprompt(&owner).await,
        }
    }

    async fn handle_start(&self, owner: &OwnerKey) {
        match self.store.start(owner.clone()) {
            Ok(_) => {
                self.send(
                    owner,
                    "Session started. Insert the first page and press Scan.",
                    Some(self.session_keyboard()),
                )
                .await;
            }
            Err(SessionError::AlreadyActive) => {
                self.send(
                    owner,
                    "A scan session is already running. Continue it or cancel.",
                    Some(self.session_keyboard()),
                )
                .await;
            }
            Err(e) => {
                self.report_failure(owner, "Could not start a session", &e.to_string())
                    .await;
            }
        }
    }

    async fn handle_capture(&self, owner: &OwnerKey) {
        if self.store.get_active(owner).is_none() {
            self.send(
                owner,
                "No scan session is active. Start one first.",
                Some(self.start_keyboard()),
            )
            .await;
            return;
        }

        self.send(owner, "⌛ Scanning, please wait...", None).await;

        let captured = capture_pages(
            &self.registry,
            self.capture.as_ref(),
            &self.settings,
            self.device_override.as_deref(),
        )
        .await;

        let pages = match captured {
            Ok(pages) => pages,
            Err(e) => {
                self.report_failure(owner, "Could not capture a page", &e.to_string())
                    .await;
                return;
            }
        };

        match self.store.add_pages(owner, pages) {
            Ok(count) => {
                self.send(
                    owner,
                    &format!("✅ Scanned page {count}. Insert the next page, or finish."),
                    Some(self.session_keyboard()),
                )
                .await;
            }
            // The reaper may have expired the session while the scanner ran.
            Err(e) => {
                self.report_failure(owner, "Could not record the scanned page", &e.to_string())
                    .await;
            }
        }
    }

    async fn handle_finish(&self, owner: &OwnerKey) {
        self.send(owner, "⌛ Assembling document...", None).await;

        match self.store.finalize(owner) {
            Ok(finalized) => {
                self.send(
                    owner,
                    &format!(
                        "✅ Scan finished. Wrote {} ({} page(s)).",
                        finalized.file_name, finalized.page_count
                    ),
                    Some(self.start_keyboard()),
                )
                .await;
                if self.send_document {
                    self.deliver_document(owner, &finalized).await;
                }
            }
            Err(FinalizeError::Session(SessionError::NotFound)) => {
                self.send(
                    owner,
                    "No scan session is active. Start one first.",
                    Some(self.start_keyboard()),
                )
                .await;
            }
            // The session and its pages are retained; the user may retry.
            Err(e) => {
                self.report_failure(owner, "Could not assemble the document", &e.to_string())
                    .await;
            }
        }
    }

    async fn deliver_document(&self, owner: &OwnerKey, finalized: &FinalizedScan) {
        match tokio::fs::read(&finalized.path).await {
            Ok(bytes) => {
                if let Err(e) = self
                    .api
                    .send_document(owner.chat, bytes, &finalized.file_name)
                    .await
                {
                    self.report_failure(owner, "Could not send the document", &e.to_string())
                        .await;
                }
            }
            Err(e) => {
                self.report_failure(owner, "Could not read the finished document", &e.to_string())
                    .await;
            }
        }
    }

    async fn handle_cancel(&self, owner: &OwnerKey) {
        match self.store.cancel(owner) {
            Ok(()) => {
                self.send(owner, "✅ Scan cancelled.", Some(self.start_keyboard()))
                    .await;
            }
            Err(SessionError::NotFound) => {
                self.send(owner, "Nothing to cancel.", Some(self.start_keyboard()))
                    .await;
            }
            Err(e) => {
                self.report_failure(owner, "Could not cancel", &e.to_string())
                    .await;
            }
        }
    }

    /// Unrecognized text: prompt with whatever applies to the session state.
    async fn reprompt(&self, owner: &OwnerKey) {
        match self.store.get_active(owner) {
            Some(snapshot) if snapshot.page_count > 0 => {
                self.send(
                    owner,
                    "Insert the next page and press Scan, or finish the document.",
                    Some(self.session_keyboard()),
                )
                .await;
            }
            Some(_) => {
                self.send(
                    owner,
                    "Insert the first page and press Scan.",
                    Some(self.session_keyboard()),
                )
                .await;
            }
            None => {
                self.send(
                    owner,
                    "Welcome. Press Start scan to begin.",
                    Some(self.start_keyboard()),
                )
                .await;
            }
        }
    }

    fn start_keyboard(&self) -> Keyboard {
        Keyboard::new(vec![vec![START_SCAN.to_string()]])
    }

    fn session_keyboard(&self) -> Keyboard {
        Keyboard::new(vec![vec![
            SCAN_PAGE.to_string(),
            FINISH_SCAN.to_string(),
            CANCEL_SCAN.to_string(),
        ]])
    }

    /// Exactly one outbound message per failure: the friendly cause first,
    /// the collaborator's detail appended.
    async fn report_failure(&self, owner: &OwnerKey, friendly: &str, detail: &str) {
        warn!(user = %owner.user, friendly, detail, "Request failed");
        self.send(owner, &format!("❌ {friendly}. ({detail})"), None)
            .await;
    }

    async fn send(&self, owner: &OwnerKey, text: &str, keyboard: Option<Keyboard>) {
        if let Err(e) = self.api.send_message(owner.chat, text, keyboard).await {
            warn!(chat = owner.chat, error = %e, "Could not send message");
        }
    }
}

/// Forward reaper expiries to the owning chats.
pub async fn notify_expiries(api: ChatApi, mut rx: mpsc::UnboundedReceiver<ExpiredSession>) {
    while let Some(expired) = rx.recv().await {
        info!(user = %expired.owner.user, session = %expired.id, "Notifying session expiry");
        let text = format!(
            "⏰ Your scan session expired after inactivity; {} page(s) were discarded.",
            expired.page_count
        );
        if let Err(e) = api.send_message(expired.owner.chat, &text, None).await {
            warn!(error = %e, "Could not deliver expiry notification");
        }
    }
}
