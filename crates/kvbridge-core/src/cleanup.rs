//! Release handle returned alongside a connected cache.

use std::fmt;

type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

/// Releases the connection behind a cache exactly once.
///
/// Call [`Cleanup::run`] once no operation is in flight any more. A handle
/// that is dropped without being run releases on drop, so early returns and
/// `?` paths still close the connection.
///
/// The same fallback means that discarding the handle closes the cache
/// straight away: `let (cache, _) = new_cache(config).await?;` leaves `cache`
/// failing every call with `Closed`. `#[must_use]` does not catch a handle
/// dropped inside a destructured tuple, so bind it to a named variable
/// (`_cleanup` works, `_` does not) for as long as the cache is in use.
#[must_use = "the cache connection stays open until this handle runs"]
pub struct Cleanup {
    release: Option<ReleaseFn>,
}

impl Cleanup {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release (in-memory backends).
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn run(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup")
            .field("pending", &self.release.is_some())
            .finish()
    }
}
