use std::{
  marker::PhantomData,
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use async_trait::async_trait;
use ductwork::{Actor, FnDaemon, Io, Message, PipelineError};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::{
  fs::{File, OpenOptions},
  io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
  sync::Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::JournalError;

/// One line of the journal file.
#[derive(Debug, Serialize, Deserialize)]
struct Entry<T> {
  row: u64,
  data: T,
}

#[derive(Deserialize)]
struct RowHeader {
  row: u64,
}

/// Handle to a journal file. Clones share the same writer.
#[derive(Clone)]
pub struct Journal {
  inner: Arc<Inner>,
}

struct Inner {
  path: PathBuf,
  writer: Mutex<Writer>,
  disabled_write: AtomicBool,
}

struct Writer {
  file: File,
  last_row: u64,
}

/// What a scan of an existing journal found.
struct Scan {
  last_row: u64,
  valid_len: u64,
  total_len: u64,
}

impl Journal {
  /// Open (or create) the journal at `path` and continue numbering after its last row.
  ///
  /// A trailing line cut short by a crash is dropped from the file.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await?;
    }

    let scan = scan(&path).await?;
    let file = OpenOptions::new().create(true).append(true).open(&path).await?;
    if scan.valid_len < scan.total_len {
      warn!(
        path = %path.display(),
        dropped_bytes = scan.total_len - scan.valid_len,
        "Dropping truncated journal tail"
      );
      file.set_len(scan.valid_len).await?;
    }

    info!(path = %path.display(), last_row = scan.last_row, "Journal opened");
    Ok(Self {
      inner: Arc::new(Inner {
        path,
        writer: Mutex::new(Writer {
          file,
          last_row: scan.last_row,
        }),
        disabled_write: AtomicBool::new(false),
      }),
    })
  }

  pub fn path(&self) -> &Path {
    &self.inner.path
  }

  /// Number of the last row written.
  pub async fn last_row(&self) -> u64 {
    self.inner.writer.lock().await.last_row
  }

  /// Turn journal actors into plain pass-throughs.
  pub fn set_disabled_write(&self, disabled: bool) {
    self.inner.disabled_write.store(disabled, Ordering::Relaxed);
  }

  pub fn is_write_disabled(&self) -> bool {
    self.inner.disabled_write.load(Ordering::Relaxed)
  }

  /// Append one value and return its row number.
  pub async fn append<T: Serialize>(&self, value: &T) -> Result<u64, JournalError> {
    let data = serde_json::to_value(value).map_err(JournalError::Encode)?;
    self.append_value(data).await
  }

  async fn append_value(&self, data: serde_json::Value) -> Result<u64, JournalError> {
    let mut writer = self.inner.writer.lock().await;
    let row = writer.last_row + 1;

    let mut line = serde_json::to_vec(&Entry { row, data }).map_err(JournalError::Encode)?;
    line.push(b'\n');
    writer.file.write_all(&line).await?;
    writer.file.flush().await?;

    writer.last_row = row;
    trace!(row, "Journal row appended");
    Ok(row)
  }

  /// A pass-through actor recording every value it sees.
  pub fn actor<T: Serialize + Message>(&self) -> JournalActor<T> {
    JournalActor {
      journal: self.clone(),
      _row: PhantomData,
    }
  }

  /// A daemon that emits every recorded value in row order, then finishes.
  ///
  /// Rows that do not decode as `T` are reported on the error channel and skipped.
  pub fn replay_daemon<T: DeserializeOwned + Message>(&self) -> FnDaemon<(), T> {
    let path = self.inner.path.clone();
    FnDaemon::new(move |cancel, io: Io<(), T>| {
      let path = path.clone();
      async move { replay(&path, &cancel, &io).await }
    })
    .named("journal-replay")
  }
}

async fn scan(path: &Path) -> Result<Scan, JournalError> {
  let bytes = match tokio::fs::read(path).await {
    Ok(bytes) => bytes,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
      return Ok(Scan {
        last_row: 0,
        valid_len: 0,
        total_len: 0,
      });
    }
    Err(err) => return Err(err.into()),
  };

  let mut last_row = 0;
  let mut valid_len = 0;
  for (index, line) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
    if line.last() != Some(&b'\n') {
      break;
    }
    valid_len += line.len();

    let line = line.trim_ascii();
    if line.is_empty() {
      continue;
    }
    match serde_json::from_slice::<RowHeader>(line) {
      Ok(header) => last_row = last_row.max(header.row),
      Err(err) => warn!(line = index + 1, error = %err, "Unreadable journal row"),
    }
  }

  Ok(Scan {
    last_row,
    valid_len: valid_len as u64,
    total_len: bytes.len() as u64,
  })
}

async fn replay<T: DeserializeOwned + Message>(
  path: &Path,
  cancel: &CancellationToken,
  io: &Io<(), T>,
) -> Result<(), PipelineError> {
  let file = match File::open(path).await {
    Ok(file) => file,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
    Err(err) => return Err(JournalError::from(err).into()),
  };

  let mut lines = BufReader::new(file).lines();
  let mut line_no = 0;
  let mut replayed = 0u64;
  loop {
    let line = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        line = lines.next_line() => line.map_err(JournalError::from)?,
    };
    let Some(line) = line else {
      break;
    };
    line_no += 1;
    if line.trim().is_empty() {
      continue;
    }

    match serde_json::from_str::<Entry<T>>(&line) {
      Ok(entry) => {
        if io.send(cancel, entry.data).await.is_err() {
          return Ok(());
        }
        replayed += 1;
      }
      Err(source) => {
        warn!(line = line_no, error = %source, "Skipping undecodable journal row");
        io.report(cancel, JournalError::Corrupt { line: line_no, source }.into())
          .await;
      }
    }
  }

  debug!(rows = replayed, "Journal replay finished");
  Ok(())
}

// ============================================================================
// Actor
// ============================================================================

/// Records its input in the journal and returns it unchanged.
pub struct JournalActor<T> {
  journal: Journal,
  _row: PhantomData<fn(T) -> T>,
}

impl<T> Clone for JournalActor<T> {
  fn clone(&self) -> Self {
    Self {
      journal: self.journal.clone(),
      _row: PhantomData,
    }
  }
}

#[async_trait]
impl<T: Serialize + Message> Actor<T, T> for JournalActor<T> {
  async fn call(&self, _cancel: &CancellationToken, input: T) -> Result<Option<T>, PipelineError> {
    if self.journal.is_write_disabled() {
      return Ok(Some(input));
    }
    let data = serde_json::to_value(&input).map_err(JournalError::Encode)?;
    self.journal.append_value(data).await?;
    Ok(Some(input))
  }
}
