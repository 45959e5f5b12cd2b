//! Cached `Date` header values.
//!
//! Formatting an IMF-fixdate on every response is wasteful when thousands of
//! responses share the same second, so a [`DateService`] keeps the formatted
//! value in an [`ArcSwap`] and refreshes it from a background tokio task.
//! Readers never block; if the refresh task is not running (no runtime when
//! the service was created, or that runtime has shut down) a stale value is
//! reformatted on read instead.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use httpdate::fmt_http_date;
use once_cell::sync::Lazy;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

const UPDATE_INTERVAL: Duration = Duration::from_millis(800);

static DATE_SERVICE: Lazy<DateService> = Lazy::new(|| DateService::new_with_update_interval(UPDATE_INTERVAL));

#[derive(Debug)]
struct CachedDate {
    at: SystemTime,
    value: String,
}

impl CachedDate {
    fn now() -> Self {
        let at = SystemTime::now();
        Self { at, value: fmt_http_date(at) }
    }
}

#[derive(Debug)]
pub struct DateService {
    current: Arc<ArcSwap<CachedDate>>,
    update_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl DateService {
    /// The process-wide instance.
    pub fn get_global_instance() -> &'static DateService {
        &DATE_SERVICE
    }

    fn new_with_update_interval(update_interval: Duration) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(CachedDate::now()));

        let handle = Handle::try_current().ok().map(|runtime| {
            let current = Arc::clone(&current);
            runtime.spawn(async move {
                loop {
                    tokio::time::sleep(update_interval).await;
                    current.store(Arc::new(CachedDate::now()));
                }
            })
        });

        DateService { current, update_interval, handle }
    }

    /// Calls `f` with the current date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
    pub fn with_http_date<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let cached = self.current.load();
        let fresh_enough = cached.at.elapsed().is_ok_and(|elapsed| elapsed <= self.update_interval * 2);
        if fresh_enough {
            return f(&cached.value);
        }

        let fresh = Arc::new(CachedDate::now());
        self.current.store(Arc::clone(&fresh));
        f(&fresh.value)
    }

    pub fn http_date(&self) -> String {
        self.with_http_date(str::to_string)
    }
}

impl Drop for DateService {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
