use eyre::Result;

#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Namespace to watch instead of the whole cluster.
    pub namespace: Option<String>,

    /// Kubernetes API server URL
    pub cluster_url: Option<String>,

    /// Kubernetes watch events buffer size
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Translation settings.
    #[serde(default)]
    pub translation: knpm::translate::Config,
}
fn default_event_buffer() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            cluster_url: None,
            event_buffer: default_event_buffer(),
            translation: Default::default(),
        }
    }
}

impl Config {
    /// parse the cluster_url
    pub fn cluster_url(&self) -> Result<Option<http::Uri>> {
        match self.cluster_url {
            None => Ok(None),
            Some(ref v) => Ok(Some(v.parse()?)),
        }
    }
}
