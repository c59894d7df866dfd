use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::wal::Wal;

use super::memory::StoreState;

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = Vec<(Event, oneshot::Sender<io::Result<()>>)>;

/// Owns the journal and group-commits appends.
///
/// Waits for one append, drains whatever else is already queued, then writes
/// the batch with a single fsync. A durable batch is applied to `state` before
/// anyone is answered, whether or not the senders are still waiting.
pub(super) async fn run_writer(
    mut wal: Wal,
    state: Arc<StoreState>,
    mut rx: mpsc::Receiver<JournalCommand>,
) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            JournalCommand::Append { event, response } => (event, response),
            other => {
                handle_control(&mut wal, &state, other);
                continue;
            }
        };

        let mut batch: Pending = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        commit_batch(&mut wal, &state, &mut batch);
        if let Some(cmd) = deferred {
            handle_control(&mut wal, &state, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, state: &StoreState, batch: &mut Pending) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();
    let result = write_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    match &result {
        Ok(()) => batch.iter().for_each(|(event, _)| state.apply(event)),
        Err(e) => tracing::error!("journal flush failed for {} events: {e}", batch.len()),
    }

    for (_, tx) in batch.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn write_batch(wal: &mut Wal, batch: &Pending) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so stray buffered bytes don't leak into
    // the next batch; this batch is reported failed either way.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_control(wal: &mut Wal, state: &StoreState, cmd: JournalCommand) {
    match cmd {
        // Every event in the old file is already applied, so the snapshot covers it.
        JournalCommand::Compact { response } => {
            let result = Wal::write_compact_file(wal.path(), &state.snapshot())
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        JournalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, state, &mut batch);
        }
    }
}
