use anyhow::{Context as _, Result};
use ingrid::{Config, Context, Outbound, Stores};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(config: Config, stores: Stores) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let ctx = Context::init(&config, stores, tx)
        .await
        .context("failed to start history bridge")?;
    let writer = tokio::spawn(write_outbound(rx));
    let bridge = ctx.spawn();
    info!("reading editor messages from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        bridge.dispatch_raw(line);
    }

    bridge.close().await;
    writer.await.context("output task failed")??;
    Ok(())
}

/// Writes each outbound message as one JSON line. Ends once every sender is gone.
async fn write_outbound(mut rx: mpsc::UnboundedReceiver<Outbound>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(msg) = rx.recv().await {
        let mut line = msg.to_json()?;
        line.push('\n');
        stdout
            .write_all(line.as_bytes())
            .await
            .context("failed to write stdout")?;
        stdout.flush().await.context("failed to flush stdout")?;
    }
    Ok(())
}
