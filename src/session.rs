//! Per-screenshot lifecycle.
//!
//! ```text
//! Detected -> AwaitingConfirmation -> Confirmed -> OcrInFlight -> ResultShown -> Copied | Sent | Discarded
//!          \-> Confirmed (skip)     \-> Cancelled
//! ```
//! Any live stage may also end in `Failed`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::types::{Preview, ScreenshotEvent, ScreenshotId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detected,
    AwaitingConfirmation,
    Confirmed,
    OcrInFlight,
    ResultShown,
    Cancelled,
    Copied,
    Sent,
    Discarded,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Stage::Cancelled | Stage::Copied | Stage::Sent | Stage::Discarded | Stage::Failed
        )
    }

    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) => true,
            (Detected, AwaitingConfirmation) | (Detected, Confirmed) => true,
            (AwaitingConfirmation, Confirmed) | (AwaitingConfirmation, Cancelled) => true,
            (Confirmed, OcrInFlight) => true,
            (OcrInFlight, ResultShown) => true,
            (ResultShown, Copied) | (ResultShown, Sent) | (ResultShown, Discarded) => true,
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no screenshot session {0}")]
    Unknown(ScreenshotId),
    #[error("screenshot {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: ScreenshotId,
        from: Stage,
        to: Stage,
    },
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: ScreenshotId,
    pub screenshot: ScreenshotEvent,
    pub stage: Stage,
    pub preview: Option<Preview>,
    pub text: Option<String>,
}

/// Live sessions keyed by id. Terminal sessions are dropped by [`SessionBook::remove`].
#[derive(Default)]
pub struct SessionBook {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<ScreenshotId, Session>>,
}

impl SessionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a detection, unless the same file already has a live session.
    pub fn open(&self, screenshot: ScreenshotEvent) -> Option<ScreenshotId> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions
            .values()
            .any(|s| s.screenshot.path == screenshot.path && !s.stage.is_terminal())
        {
            return None;
        }

        let id = ScreenshotId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        sessions.insert(
            id,
            Session {
                id,
                screenshot,
                stage: Stage::Detected,
                preview: None,
                text: None,
            },
        );
        Some(id)
    }

    pub fn get(&self, id: ScreenshotId) -> Result<Session, SessionError> {
        self.sessions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(SessionError::Unknown(id))
    }

    pub fn advance(&self, id: ScreenshotId, to: Stage) -> Result<(), SessionError> {
        self.update(id, |session| {
            if !session.stage.can_advance_to(to) {
                return Err(SessionError::InvalidTransition {
                    id,
                    from: session.stage,
                    to,
                });
            }
            log::debug!("[session] {} {:?} -> {:?}", id, session.stage, to);
            session.stage = to;
            Ok(())
        })
    }

    pub fn set_preview(&self, id: ScreenshotId, preview: Preview) -> Result<(), SessionError> {
        self.update(id, |session| {
            session.preview = Some(preview);
            Ok(())
        })
    }

    pub fn set_text(&self, id: ScreenshotId, text: String) -> Result<(), SessionError> {
        self.update(id, |session| {
            session.text = Some(text);
            Ok(())
        })
    }

    pub fn remove(&self, id: ScreenshotId) -> Option<Session> {
        self.sessions.lock().unwrap().remove(&id)
    }

    fn update<F>(&self, id: ScreenshotId, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut Session) -> Result<(), SessionError>,
    {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&id).ok_or(SessionError::Unknown(id))?;
        f(session)
    }
}

#[cfg(test)]
impl SessionBook {
    pub fn is_tracking(&self, path: &std::path::Path) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .any(|s| s.screenshot.path == path)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
