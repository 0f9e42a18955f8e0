//! Cached `Date:` header value.
//!
//! Formatting an HTTP date per response is wasteful under load; a background
//! task refreshes a shared, preformatted value instead. Responses clone the
//! current `Bytes` handle, which is cheap.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;
use once_cell::sync::Lazy;

static DATE_SERVICE: Lazy<DateService> =
    Lazy::new(|| DateService::new_with_update_interval(Duration::from_millis(800)));

/// Returns the current preformatted HTTP date value.
///
/// Must be called from within a tokio runtime; the first call starts the
/// refresh task.
pub(crate) fn http_date() -> Bytes {
    DATE_SERVICE.current.load().as_ref().clone()
}

struct DateService {
    current: Arc<ArcSwap<Bytes>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl DateService {
    fn new_with_update_interval(update_interval: Duration) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(format_now()));
        let current_arc = Arc::clone(&current);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(update_interval).await;
                current_arc.store(Arc::new(format_now()));
            }
        });

        DateService { current, _handle: handle }
    }
}

fn format_now() -> Bytes {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    Bytes::from_owner(buf)
}
