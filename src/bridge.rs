//! Stdio bridge: speaks the surface/coordinator protocol as one JSON message
//! per line, so an extension (or anything else) can drive the coordinator
//! from another process.

use crate::coordinator::Coordinator;
use crate::protocol::{Inbound, Outbound};
use crate::relay::{Disconnected, FnObserver, Increment, RequestId};
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Serve until `input` reaches EOF and every accepted request has replied.
pub async fn serve<R, W>(coordinator: Coordinator, input: R, output: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, rx) = mpsc::unbounded_channel::<Outbound>();

    let reader = async move {
        let mut lines = BufReader::new(input).lines();
        let mut tasks = JoinSet::new();

        while let Some(line) = lines.next_line().await.context("failed to read input")? {
            if line.trim().is_empty() {
                continue;
            }
            dispatch(&coordinator, &tx, &mut tasks, &line);
        }

        tracing::debug!(in_flight = tasks.len(), "input closed; waiting for requests");
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                tracing::error!(error = %e, "request task panicked");
            }
        }
        // Dropping `tx` here lets the writer drain and stop.
        anyhow::Ok(())
    };

    tokio::try_join!(reader, write_all(rx, output))?;
    Ok(())
}

fn dispatch(
    coordinator: &Coordinator,
    tx: &mpsc::UnboundedSender<Outbound>,
    tasks: &mut JoinSet<()>,
    line: &str,
) {
    let msg = match serde_json::from_str::<Inbound>(line) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed message");
            let _ = tx.send(Outbound::err(salvage_request_id(line), format!("invalid message: {e}")));
            return;
        }
    };

    match msg {
        Inbound::Ping => {
            let _ = tx.send(Outbound::Pong {
                version: env!("CARGO_PKG_VERSION").to_string(),
            });
        }
        Inbound::Generate {
            prompt,
            context,
            request_id,
        } => {
            let chunk_tx = tx.clone();
            let handle = coordinator.relay().subscribe(
                request_id.clone(),
                FnObserver(move |inc: &Increment| -> Result<(), Disconnected> {
                    chunk_tx.send(inc.clone().into()).map_err(|_| Disconnected)
                }),
            );

            let coordinator = coordinator.clone();
            let reply_tx = tx.clone();
            tasks.spawn(async move {
                let reply = match coordinator.generate(&prompt, &context, &request_id).await {
                    Ok(text) => Outbound::ok(request_id.clone(), text),
                    Err(e) => Outbound::err(request_id.clone(), e.to_string()),
                };
                coordinator.relay().unsubscribe(&handle);
                if reply_tx.send(reply).is_err() {
                    tracing::debug!(%request_id, "output closed before reply");
                }
            });
        }
    }
}

/// Best effort: pull `requestId` out of a message that failed to parse so the
/// sender can still correlate the error.
fn salvage_request_id(line: &str) -> RequestId {
    let id = serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("requestId")?.as_str().map(str::to_string))
        .unwrap_or_default();
    RequestId::new(id)
}

async fn write_all<W>(mut rx: mpsc::UnboundedReceiver<Outbound>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        let mut line = serde_json::to_vec(&msg).context("failed to encode message")?;
        line.push(b'\n');
        output.write_all(&line).await.context("failed to write output")?;
        output.flush().await.context("failed to flush output")?;
    }
    Ok(())
}
