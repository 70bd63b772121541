use anyhow::{Context, Result};
use ingrid::{DocumentStore, Stores};
use serde_json::{Value, json};

pub async fn run(stores: Stores, pretty: bool) -> Result<()> {
    let report = json!({
        "history": describe(stores.history.as_ref()).await,
        "backup": describe(stores.backup.as_ref()).await,
    });
    let out = if pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("failed to serialize status")?;
    println!("{out}");
    Ok(())
}

async fn describe(store: &dyn DocumentStore) -> Value {
    match store.info().await {
        Ok(info) => json!({ "ok": true, "db_name": info.db_name, "doc_count": info.doc_count }),
        Err(e) => json!({ "ok": false, "error": e.to_string() }),
    }
}
