use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::{Client, api::Api, runtime::watcher};
use log::{error, info};
use tokio::sync::mpsc;

pub type Event = watcher::Event<NetworkPolicy>;

pub struct Config {
    /// Namespace to watch, or all of them.
    pub namespace: Option<String>,
    pub client: Client,
    pub watcher_config: watcher::Config,
}

impl Config {
    fn api(&self) -> Api<NetworkPolicy> {
        match &self.namespace {
            None => Api::all(self.client.clone()),
            Some(ns) => Api::namespaced(self.client.clone(), ns.as_str()),
        }
    }

    pub fn watch_to(&self, tx: mpsc::Sender<Event>) {
        tokio::spawn(watch_to_events(
            self.api(),
            self.watcher_config.clone(),
            tx,
        ));
    }
}

async fn watch_to_events(
    api: Api<NetworkPolicy>,
    watcher_config: watcher::Config,
    tx: mpsc::Sender<Event>,
) {
    let resource = api.resource_url().to_string();
    info!("starting watch on {resource}");

    let mut watcher = watcher(api, watcher_config).boxed();

    loop {
        let event = match watcher.try_next().await {
            Ok(v) => v,
            Err(e) => {
                error!("watch error: {resource}: {e}");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                continue;
            }
        };

        let Some(event) = event else {
            info!("watch on {resource} stopped");
            return;
        };

        if tx.send(event).await.is_err() {
            info!("receiver of {resource} stopped");
            return;
        }
    }
}
