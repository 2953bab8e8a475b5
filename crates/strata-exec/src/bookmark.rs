//! Read-after-write bookmark tracking for one logical session.

use strata_core::QueryResult;

/// Holds the freshest bookmark a session has seen.
///
/// A missing bookmark means "no known minimum point", never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkTracker {
    current: Option<String>,
}

impl BookmarkTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Returns the bookmark to attach to the next request.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Adopts the bookmark of a successful response, if it carries one.
    pub fn observe<T>(&mut self, result: &QueryResult<T>) {
        if !result.success {
            return;
        }
        if let Some(bookmark) = result.bookmark() {
            self.current = Some(bookmark.to_string());
        }
    }

    /// Forgets the tracked bookmark.
    pub fn clear(&mut self) {
        self.current = None;
    }
}
