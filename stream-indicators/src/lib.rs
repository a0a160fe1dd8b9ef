//! Activity and error indicators for async streams.
//!
//! Two small instrumentation primitives that attach to [`futures::Stream`]s
//! without changing what those streams deliver:
//!
//! - [`ActivityIndicator`] answers "is anything still in flight?". Wrap any
//!   number of streams with [`TrackActivityExt::track_activity`] and consume
//!   [`ActivityIndicator::loading`] to drive a spinner: it reads `true`
//!   exactly while at least one tracked stream is outstanding.
//! - [`ErrorIndicator`] captures stream failures on a side channel. Wrap
//!   fallible streams with [`TrackErrorsExt::track_errors`]: the consumer
//!   sees only the successful items and a clean completion, while every
//!   failure surfaces once on [`ErrorIndicator::errors`] - show a toast
//!   without tearing down the view the stream feeds.
//!
//! The indicators never spawn tasks, never block, and never alter the values
//! or timing of the streams they instrument. All shared state lives in
//! [`state_cell::StateCell`].
//!
//! ## Usage
//!
//! ```
//! use futures::{StreamExt, stream};
//! use stream_indicators::{ActivityIndicator, TrackActivityExt};
//!
//! # tokio_test::block_on(async {
//! let indicator = ActivityIndicator::new();
//!
//! let items: Vec<_> = stream::iter([1, 2, 3])
//!     .track_activity(&indicator)
//!     .collect()
//!     .await;
//!
//! // The data path is untouched and the counter is back at zero.
//! assert_eq!(items, vec![1, 2, 3]);
//! assert_eq!(indicator.in_flight(), 0);
//! # });
//! ```

mod activity;
mod error;

pub use activity::{ActivityIndicator, Loading, TrackActivity, TrackActivityExt};
pub use error::{ErrorIndicator, Errors, TrackErrors, TrackErrorsExt};
