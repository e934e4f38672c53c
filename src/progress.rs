//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline advances: remote task submission, each status poll,
//! each locally recognised page, and each resolved image reference.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ebook2md::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PollCounter {
//!     polls: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for PollCounter {
//!     fn on_poll(&self, _task_id: &str, _elapsed_secs: u64, _status: &str) {
//!         self.polls.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(PollCounter { polls: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync` because
/// independent conversions may share one observer.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the input has been resolved, before any backend work.
    fn on_conversion_start(&self, input: &str) {
        let _ = input;
    }

    /// Called when the remote backend accepted the job.
    fn on_task_submitted(&self, task_id: &str) {
        let _ = task_id;
    }

    /// Called after every status query of the remote task.
    ///
    /// # Arguments
    /// * `elapsed_secs` — poll budget consumed so far
    /// * `status`       — backend status label (`pending`, `running`, …)
    fn on_poll(&self, task_id: &str, elapsed_secs: u64, status: &str) {
        let _ = (task_id, elapsed_secs, status);
    }

    /// Called when local OCR finished a page (1-indexed).
    fn on_page_recognized(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called for each embedded image reference, successful or not.
    fn on_image_resolved(&self, url: &str, ok: bool) {
        let _ = (url, ok);
    }

    /// Called once when the document has been assembled.
    fn on_conversion_complete(&self, markdown_len: usize) {
        let _ = markdown_len;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        polls: AtomicUsize,
        pages: AtomicUsize,
        failed_images: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_poll(&self, _task_id: &str, _elapsed_secs: u64, _status: &str) {
            self.polls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_recognized(&self, _page_num: usize, _total_pages: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_resolved(&self, _url: &str, ok: bool) {
            if !ok {
                self.failed_images.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start("doc.pdf");
        cb.on_task_submitted("t1");
        cb.on_poll("t1", 5, "running");
        cb.on_page_recognized(1, 3);
        cb.on_image_resolved("https://x/y.png", false);
        cb.on_conversion_complete(42);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_poll("t", 0, "pending");
        tracker.on_poll("t", 5, "running");
        tracker.on_page_recognized(1, 2);
        tracker.on_image_resolved("a", true);
        tracker.on_image_resolved("b", false);

        assert_eq!(tracker.polls.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.pages.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.failed_images.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_task_submitted("t");
    }
}
