use ductwork::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
  #[error("journal io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to encode row: {0}")]
  Encode(#[source] serde_json::Error),

  #[error("undecodable row on line {line}: {source}")]
  Corrupt {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
}

impl From<JournalError> for PipelineError {
  fn from(err: JournalError) -> Self {
    PipelineError::transform(err)
  }
}
