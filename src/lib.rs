pub mod error;
pub mod ir;
pub mod keys;
pub mod kube_watch;
pub mod memstore;
pub mod names;
pub mod selector;
pub mod translate;

pub use error::{Error, Result};
pub use translate::translate;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Watch NetworkPolicies and write their IR updates to `output` as JSON lines.
pub async fn process_kube_events<W: AsyncWrite + Unpin>(
    store: memstore::PolicyStore,
    watch_config: kube_watch::Config,
    event_buffer_size: usize,
    output: W,
) -> eyre::Result<()> {
    let (tx, rx) = mpsc::channel(event_buffer_size);

    watch_config.watch_to(tx);

    process_events(store, rx, event_buffer_size, output).await
}

pub async fn process_events<W: AsyncWrite + Unpin>(
    mut store: memstore::PolicyStore,
    mut rx: mpsc::Receiver<kube_watch::Event>,
    event_buffer_size: usize,
    mut output: W,
) -> eyre::Result<()> {
    let mut updates = Vec::new();

    while let Some(event) = rx.recv().await {
        // consume this new event
        store.ingest(event, &mut updates);

        // also consume the current event queue, up to the buffer size before publishing
        let mut disconnected = false;
        for _ in 0..event_buffer_size {
            match rx.try_recv() {
                Ok(event) => {
                    store.ingest(event, &mut updates);
                }
                Err(TryRecvError::Empty) => {
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        // publish only a complete view
        if store.is_ready() {
            publish(&mut output, &mut updates).await?;
        }

        if disconnected {
            break;
        }
    }

    Ok(())
}

async fn publish<W: AsyncWrite + Unpin>(
    output: &mut W,
    updates: &mut Vec<memstore::Update>,
) -> eyre::Result<()> {
    if updates.is_empty() {
        return Ok(());
    }

    let mut buf = Vec::new();
    for update in updates.drain(..) {
        serde_json::to_writer(&mut buf, &update)?;
        buf.push(b'\n');
    }

    output.write_all(&buf).await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::networking::v1::NetworkPolicy;
    use kube::runtime::watcher::Event;
    use serde_json::json;

    fn np(name: &str) -> NetworkPolicy {
        serde_json::from_value(json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": {"name": name, "namespace": "prod"},
            "spec": {"podSelector": {"matchLabels": {"app": "web"}}},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_process_events() {
        let (tx, rx) = mpsc::channel(10);

        tx.send(Event::Init).await.unwrap();
        tx.send(Event::InitApply(np("a"))).await.unwrap();
        tx.send(Event::InitDone).await.unwrap();
        tx.send(Event::Delete(np("a"))).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        let store = memstore::PolicyStore::new(translate::Translator::default());
        process_events(store, rx, 10, &mut out).await.unwrap();

        let lines: Vec<serde_json::Value> = (String::from_utf8(out).unwrap().lines())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["op"], "apply");
        assert_eq!(lines[0]["policy"]["name"], "a");
        assert_eq!(lines[1], json!({"op": "delete", "key": "prod/a", "policyID": "azure-acl-prod-a"}));
    }
}
