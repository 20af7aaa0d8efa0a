//! Tuning knobs for [`ReadPipeline`](crate::ReadPipeline).

use std::time::Duration;

/// Default number of queued chunks above which the producer pauses.
pub const DEFAULT_WATERMARK: usize = 10;

/// Default wait between backpressure checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default name given to the producer thread.
pub const DEFAULT_THREAD_NAME: &str = "bulkmap-input";

/// Producer thread settings.
///
/// The watermark is a soft bound: the queue may briefly hold
/// `watermark + 1` chunks before the producer pauses.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bulkmap_pipeline::PipelineOptions;
///
/// let options = PipelineOptions::default()
///     .with_watermark(4)
///     .with_poll_interval(Duration::from_millis(2));
/// assert_eq!(options.watermark, 4);
/// assert_eq!(options.thread_name, "bulkmap-input");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineOptions {
    /// Queue length above which the producer waits for the consumer.
    pub watermark: usize,
    /// Longest single wait before the producer re-checks the queue.
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub poll_interval: Duration,
    /// Name of the producer thread.
    pub thread_name: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            watermark: DEFAULT_WATERMARK,
            poll_interval: DEFAULT_POLL_INTERVAL,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

impl PipelineOptions {
    /// Override the backpressure watermark.
    #[must_use]
    pub const fn with_watermark(mut self, watermark: usize) -> Self {
        self.watermark = watermark;
        self
    }

    /// Override the backpressure poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Override the producer thread name.
    #[must_use]
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }
}

#[cfg(feature = "serde")]
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
