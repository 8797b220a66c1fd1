//! Application state shared across request handlers.

use std::sync::Arc;

use crate::db::Database;
use crate::jobs::JobRunner;
use crate::polls::PollRepository;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    runner: Arc<JobRunner>,
    polls: Arc<dyn PollRepository>,
    db: Option<Database>,
}

impl AppState {
    /// `db` is `None` when running on in-memory storage.
    pub fn new(runner: Arc<JobRunner>, polls: Arc<dyn PollRepository>, db: Option<Database>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { runner, polls, db }),
        }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.inner.runner
    }

    pub fn polls(&self) -> &dyn PollRepository {
        self.inner.polls.as_ref()
    }

    pub fn db(&self) -> Option<&Database> {
        self.inner.db.as_ref()
    }
}
