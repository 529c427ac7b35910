//! Error types shared by every actor, daemon and connector.

/// Boxed error produced by user transforms.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by actors, daemons and their connectors.
///
/// Cancellation is represented by [`PipelineError::Cancelled`] so transforms can use `?` on
/// cancelled sends, but it is never delivered on an error channel.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  /// An actor received an input of the wrong shape.
  #[error("invalid input format: {0}")]
  InvalidInput(String),

  #[error("daemon '{daemon}' already launched")]
  AlreadyLaunched { daemon: &'static str },

  #[error("invalid composition: {0}")]
  InvalidComposition(String),

  /// A connector stage failed. `stage` is `from` or `to`.
  #[error("error '{stage}' call: {source}")]
  Upstream {
    stage: &'static str,
    #[source]
    source: Box<PipelineError>,
  },

  #[error("channel closed")]
  ChannelClosed,

  #[error("operation cancelled")]
  Cancelled,

  #[error("daemon '{daemon}' panicked: {message}")]
  Panicked { daemon: &'static str, message: String },

  #[error("{0}")]
  Transform(#[source] BoxError),
}

impl PipelineError {
  /// Wrap an arbitrary error raised by a user transform.
  pub fn transform(err: impl Into<BoxError>) -> Self {
    Self::Transform(err.into())
  }

  pub(crate) fn upstream(stage: &'static str, source: PipelineError) -> Self {
    Self::Upstream {
      stage,
      source: Box::new(source),
    }
  }

  /// True for the cancellation marker, which is never reported.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled)
  }
}

/// Failure to push a value into a [`Channel`](crate::Channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
  #[error("channel closed")]
  Closed,
  #[error("send cancelled")]
  Cancelled,
}

impl From<SendError> for PipelineError {
  fn from(err: SendError) -> Self {
    match err {
      SendError::Closed => Self::ChannelClosed,
      SendError::Cancelled => Self::Cancelled,
    }
  }
}
