/*!
 * A cache for a value derived from mutable state.
 *
 * The value is computed the first time it is asked for and kept until the owner mutates the
 * state it was derived from and calls [Memo::invalidate]. Nothing is ever computed ahead of time.
 */
use once_cell::unsync::OnceCell;

#[derive(Debug, Clone)]
pub(crate) struct Memo<T>(OnceCell<T>);

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Memo(OnceCell::new())
    }
}

impl<T> Memo<T> {
    /// Get the cached value, computing it first if the cache is stale.
    ///
    /// If `compute` fails the cache stays stale and the error is returned.
    pub(crate) fn get_or_try_compute<E, F>(&self, compute: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.0.get_or_try_init(compute)
    }

    /// Get the cached value only if it is up to date.
    pub(crate) fn get(&self) -> Option<&T> {
        self.0.get()
    }

    /// Is the cached value out of date?
    pub(crate) fn is_stale(&self) -> bool {
        self.0.get().is_none()
    }

    /// Mark the cached value as out of date.
    pub(crate) fn invalidate(&mut self) {
        let _ = self.0.take();
    }
}
