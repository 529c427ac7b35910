//! Channel-draining sink.

use tokio_util::sync::CancellationToken;

use crate::{
  Message,
  channel::Channel,
  daemon::{DaemonExt, FnDaemon, Io},
};

/// A daemon that discards everything arriving on its input, output and error channels.
///
/// Useful for terminating a pipeline whose results are not needed, or for keeping an error
/// channel from filling up. Runs until cancelled or until all three channels are closed.
pub fn null_sink<I: Message, O: Message>() -> FnDaemon<I, O> {
  FnDaemon::new(|cancel: CancellationToken, io: Io<I, O>| async move {
    let mut input_open = true;
    let mut output_open = true;
    let mut errors_open = true;

    while input_open || output_open || errors_open {
      tokio::select! {
          biased;
          _ = cancel.cancelled() => break,
          msg = drain(&io.input, &cancel), if input_open => input_open = msg,
          msg = drain(&io.output, &cancel), if output_open => output_open = msg,
          msg = drain(&io.errors, &cancel), if errors_open => errors_open = msg,
      }
    }
    Ok(())
  })
  .named("null-sink")
  .without_close_on_stop()
}

async fn drain<T>(channel: &Channel<T>, cancel: &CancellationToken) -> bool {
  channel.recv(cancel).await.is_some()
}
