//! Pull secret controller - keeps a managed ExternalSecret next to every pod
//! that pulls with the trigger secret

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use pullsecret::config::{ControllerConfig, MatchMode};
use pullsecret::controller::{reconcile_namespace, reconcile_workload, Context};
use pullsecret::events::NoopEventPublisher;
use pullsecret::kube_utils::create_client;
use pullsecret::telemetry::{init_telemetry, LogFormat};
use pullsecret::template::ManagedTemplate;

/// Keeps a managed resource in every namespace whose pods pull with a given secret
#[derive(Parser, Debug)]
#[command(name = "pullsecret-controller", version, about, long_about = None)]
struct Cli {
    /// Image pull secret name that activates the managed resource
    #[arg(long, env = "TRIGGER_SECRET_NAME")]
    trigger_secret_name: String,

    /// Path to the managed resource template (YAML)
    #[arg(long = "template", env = "MANAGED_TEMPLATE_PATH")]
    template_path: PathBuf,

    /// How existence of the managed resource is checked
    #[arg(long, env = "MATCH_MODE", value_enum, default_value_t = MatchMode::ExternalSecret)]
    match_mode: MatchMode,

    /// Deadline for a single reconciliation pass in seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value = "30")]
    reconcile_timeout_secs: u64,

    /// Path to a kubeconfig file
    ///
    /// Defaults to the in-cluster config or `KUBECONFIG`.
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Log output format: json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches namespaces, pods and the managed kind, and reconciles each
    /// namespace until a shutdown signal arrives.
    Run,

    /// Print the managed resource as it would be created in a namespace
    ///
    /// Validates the configuration without contacting the cluster.
    Render {
        /// Namespace to render the instance for
        #[arg(long)]
        namespace: String,
    },

    /// Run a single reconciliation pass and print the outcome
    Reconcile {
        /// Namespace to reconcile
        #[arg(long)]
        namespace: String,

        /// Treat the pass as triggered by this pod's change
        #[arg(long)]
        workload: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             The kube client cannot establish TLS connections without it.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();
    init_telemetry(cli.log_format)?;

    let template = ManagedTemplate::from_file(&cli.template_path)
        .await
        .context("failed to load managed resource template")?;
    let config = ControllerConfig::new(
        cli.trigger_secret_name.clone(),
        template,
        cli.match_mode,
        Duration::from_secs(cli.reconcile_timeout_secs),
    )
    .context("invalid controller configuration")?;

    match cli.command {
        Some(Commands::Render { namespace }) => {
            print!("{}", config.template.render(&namespace)?);
            Ok(())
        }
        Some(Commands::Reconcile {
            namespace,
            workload,
        }) => {
            run_once(
                cli.kubeconfig.as_deref(),
                &config,
                &namespace,
                workload.as_deref(),
            )
            .await
        }
        Some(Commands::Run) | None => run_controller(cli.kubeconfig.as_deref(), &config).await,
    }
}

/// Run the controller until signalled
async fn run_controller(
    kubeconfig: Option<&Path>,
    config: &ControllerConfig,
) -> anyhow::Result<()> {
    let client = create_client(kubeconfig)
        .await
        .context("failed to create kube client")?;

    tracing::info!("Starting pull secret controller...");
    let ctx = Arc::new(Context::builder(client.clone(), config).build());
    pullsecret::runner::run(client, config, ctx).await;
    Ok(())
}

/// One pass, outcome on stdout
async fn run_once(
    kubeconfig: Option<&Path>,
    config: &ControllerConfig,
    namespace: &str,
    workload: Option<&str>,
) -> anyhow::Result<()> {
    let client = create_client(kubeconfig)
        .await
        .context("failed to create kube client")?;
    let ctx = Context::builder(client, config)
        .event_publisher(Arc::new(NoopEventPublisher))
        .build();

    match workload {
        Some(name) => match reconcile_workload(&ctx, namespace, name).await? {
            Some(outcome) => println!("{}: {}", namespace, outcome),
            None => println!("{}: pod {} is not relevant, nothing to do", namespace, name),
        },
        None => {
            let outcome = reconcile_namespace(&ctx, namespace).await?;
            println!("{}: {}", namespace, outcome);
        }
    }
    Ok(())
}
