use clap::{Parser, Subcommand, ValueEnum};
use eyre::format_err;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::{Client, runtime::watcher};
use log::info;
use serde::Deserialize;
use std::process::exit;
use tokio::{
    io::AsyncReadExt,
    select,
    signal::unix::{SignalKind, signal},
};

use knpm::{ir::NpmNetworkPolicy, kube_watch, memstore::PolicyStore, translate::Translator};

pub mod config;

/// Kubernetes NetworkPolicy translator
#[derive(Parser)]
#[command(version, about, long_about = ABOUT)]
struct Cli {
    /// log filters (see https://docs.rs/env_logger/latest/env_logger/index.html#enabling-logging)
    #[arg(long, default_value = "info", env = "KNPM_LOG")]
    log: String,
    /// log style (see https://docs.rs/env_logger/latest/env_logger/index.html#disabling-colors)
    #[arg(long, default_value = "auto", env = "KNPM_LOG_STYLE")]
    log_style: String,

    /// Config file path.
    #[arg(long, short = 'c', env = "KNPM_CONFIG")]
    config: Option<String>,

    /// Test the config and exit.
    #[arg(long)]
    test_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Translate NetworkPolicy manifests and print their IR.
    Translate {
        /// namespace of the policies that don't specify one
        #[arg(long, short = 'n', default_value = "default")]
        namespace: String,
        /// output format
        #[arg(long, short = 'o', value_enum, default_value_t = Output::Json)]
        output: Output,
        /// manifest files, possibly multi-document YAML ("-" for stdin)
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Watch the cluster's NetworkPolicies and write IR updates as JSON lines.
    Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
    Json,
    Yaml,
}

const ABOUT: &str = r#"
Kubernetes NetworkPolicy translator

Translate NetworkPolicies to the intermediate representation of a host dataplane:
- sets of pods, namespaces, CIDRs and named ports
- ordered allow/drop ACLs referencing these sets
"#;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .parse_filters(cli.log.as_str())
        .parse_write_style(cli.log_style.as_str())
        .format_timestamp_millis()
        .init();

    use config::*;
    let config: Config = match cli.config {
        None => Config::default(),
        Some(ref path) => {
            let config = tokio::fs::read(path)
                .await
                .map_err(|e| format_err!("read config failed: {path}: {e}"))?;
            serde_yaml::from_slice(&config).map_err(|e| format_err!("parse config failed: {e}"))?
        }
    };

    let cluster_url = config
        .cluster_url()
        .map_err(|e| format_err!("invalid cluster_url: {e}"))?;

    if cli.test_config {
        return Ok(());
    }

    let translator = Translator::new(config.translation.clone());

    match cli.command {
        None => Err(format_err!("no command given (see --help)")),
        Some(Command::Translate {
            namespace,
            output,
            files,
        }) => {
            let policies = translate_files(&translator, &namespace, &files).await?;
            print_policies(&policies, output)
        }
        Some(Command::Watch) => watch(translator, config, cluster_url).await,
    }
}

async fn translate_files(
    translator: &Translator,
    namespace: &str,
    files: &[String],
) -> eyre::Result<Vec<NpmNetworkPolicy>> {
    let mut policies = Vec::new();

    for file in files {
        let data = if file == "-" {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .map_err(|e| format_err!("read stdin failed: {e}"))?;
            buf
        } else {
            tokio::fs::read(file)
                .await
                .map_err(|e| format_err!("read failed: {file}: {e}"))?
        };

        for doc in serde_yaml::Deserializer::from_slice(&data) {
            let mut np = NetworkPolicy::deserialize(doc)
                .map_err(|e| format_err!("parse failed: {file}: {e}"))?;

            if np.metadata.namespace.is_none() {
                np.metadata.namespace = Some(namespace.to_string());
            }

            let policy = translator.translate(&np).map_err(|e| {
                let name = np.metadata.name.as_deref().unwrap_or("<unnamed>");
                format_err!("translation failed: {file}: {name}: {e}")
            })?;

            info!("{}: translated", policy.policy_key());
            policies.push(policy);
        }
    }

    Ok(policies)
}

fn print_policies(policies: &[NpmNetworkPolicy], output: Output) -> eyre::Result<()> {
    let out = match output {
        Output::Json => serde_json::to_string_pretty(policies)?,
        Output::Yaml => serde_yaml::to_string(policies)?,
    };
    println!("{out}");

    Ok(())
}

async fn watch(
    translator: Translator,
    config: config::Config,
    cluster_url: Option<http::Uri>,
) -> eyre::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        };
        exit(0);
    });

    let mut kube_cfg = kube::Config::infer().await?;
    if let Some(cluster_url) = cluster_url {
        kube_cfg.cluster_url = cluster_url;
    }

    info!("kubernetes cluster at {}", kube_cfg.cluster_url);

    let client: Client = kube_cfg.try_into()?;

    match &config.namespace {
        None => info!("watching all namespaces"),
        Some(ns) => info!("watching namespace {ns}"),
    };

    let watch_config = kube_watch::Config {
        namespace: config.namespace,
        client,
        watcher_config: watcher::Config::default(),
    };

    knpm::process_kube_events(
        PolicyStore::new(translator),
        watch_config,
        config.event_buffer,
        tokio::io::stdout(),
    )
    .await?;

    info!("watch stopped");
    Ok(())
}
