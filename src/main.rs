use clap::{Parser, Subcommand};
use k8s_openapi::serde_json;
use podmirror::k8s::api::{KubeResourceApi, PodApi, WatchScope};
use podmirror::k8s::reflect::{PodKind, ReflectorConfig, ResourceKey};
use podmirror::k8s::spawner::{ReflectorRegistry, Spawner, SpawnerConfig};
use podmirror::k8s::{USER_AGENT, client};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace to mirror and to spawn pods into
    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// Mirror pods in every namespace
    #[arg(short = 'A', long)]
    all_namespaces: bool,

    /// Label selector for mirrored pods
    #[arg(short = 'l', long)]
    selector: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror pods and report changes until interrupted
    Watch {
        /// Seconds between reports
        #[arg(long, default_value_t = 5)]
        interval: u64,

        /// Print the mirrored pods as JSON once the first list completes, then exit
        #[arg(long)]
        json: bool,
    },
    /// Create a user's pod and wait until it is running
    Spawn {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        image: Option<String>,

        /// Seconds to wait for the pod to become ready
        #[arg(long, default_value_t = 300)]
        start_timeout: u64,
    },
    /// Print the exit status of a user's pod
    Poll {
        #[arg(short, long)]
        user: String,
    },
    /// Delete a user's pod and wait until it is gone
    Stop {
        #[arg(short, long)]
        user: String,

        /// Delete without a grace period
        #[arg(long)]
        now: bool,
    },
    /// Print events about a user's pod
    Events {
        #[arg(short, long)]
        user: String,
    },
}

fn keys_line(keys: &[ResourceKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

async fn watch(registry: &ReflectorRegistry, interval: u64, json: bool) -> anyhow::Result<()> {
    let reflector = registry.pods().await?;
    reflector.wait_for_first_load().await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reflector.pods().values())?
        );
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    let mut last: Vec<ResourceKey> = Vec::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Interrupted");
                return Ok(());
            }
            _ = ticker.tick() => {
                let keys = reflector.pods().keys();
                if keys != last {
                    println!("{} pods: {}", keys.len(), keys_line(&keys));
                    last = keys;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let args = Args::parse();
    let scope = if args.all_namespaces {
        WatchScope::AllNamespaces
    } else {
        WatchScope::Namespace(args.namespace.clone())
    };

    let client = client::new(Some(USER_AGENT)).await?;
    let mut pod_config = ReflectorConfig::for_kind::<PodKind>(scope.clone());
    if args.selector.is_some() {
        pod_config = pod_config.with_label_selector(args.selector.clone());
    }
    let registry = Arc::new(
        ReflectorRegistry::from_client(client.clone(), scope.clone()).with_pod_config(pod_config),
    );
    let pod_api: Arc<dyn PodApi> = Arc::new(KubeResourceApi::new(client, scope));
    let spawner_config = SpawnerConfig::default().with_namespace(args.namespace.clone());

    match args.command {
        Command::Watch { interval, json } => watch(&registry, interval, json).await?,
        Command::Spawn {
            user,
            image,
            start_timeout,
        } => {
            let mut config =
                spawner_config.with_start_timeout(Duration::from_secs(start_timeout));
            if let Some(image) = image {
                config = config.with_image(image);
            }
            let mut spawner = Spawner::new(&user, config, pod_api, registry.clone());
            let endpoint = spawner.start().await?;
            println!("{} {}:{}", spawner.pod_name(), endpoint.ip, endpoint.port);
        }
        Command::Poll { user } => {
            let spawner = Spawner::new(&user, spawner_config, pod_api, registry.clone());
            match spawner.poll().await? {
                Some(code) => println!("{} exited with {}", spawner.pod_name(), code),
                None => println!("{} is {:?}", spawner.pod_name(), spawner.state().await?),
            }
        }
        Command::Stop { user, now } => {
            let spawner = Spawner::new(&user, spawner_config, pod_api, registry.clone());
            spawner.stop(now).await?;
            println!("{} deleted", spawner.pod_name());
        }
        Command::Events { user } => {
            let spawner = Spawner::new(&user, spawner_config, pod_api, registry.clone());
            for event in spawner.events().await? {
                println!(
                    "{}\t{}\t{}",
                    event.type_.unwrap_or_default(),
                    event.reason.unwrap_or_default(),
                    event.message.unwrap_or_default()
                );
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}
