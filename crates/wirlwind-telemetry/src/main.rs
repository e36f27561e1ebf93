//! Standalone launcher.
//!
//! ```text
//! wirlwind-telemetry --host 10.0.0.1 --vendor cisco_ios_xe --user admin --key ~/.ssh/id_rsa
//! wirlwind-telemetry --vendor arista_eos --preflight-only
//! ```
//!
//! Live sessions print the published event stream as NDJSON; a rendering
//! front-end subscribes to the same stream in-process.

mod preflight;
mod ssh;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wirlwind_collections::CollectionRegistry;
use wirlwind_common::DeviceTarget;
use wirlwind_drivers::DriverRegistry;
use wirlwind_engine::{EngineOptions, PollEngine, StateStore};
use wirlwind_parse::{EngineSet, ParserChain, TemplateResolver, TraceStore};

#[derive(Debug, Parser)]
#[command(name = "wirlwind-telemetry", about = "Per-device operational console")]
struct Args {
    /// Device hostname or IP.
    #[arg(long, required_unless_present = "preflight_only")]
    host: Option<String>,

    /// SSH port.
    #[arg(long, default_value_t = 22)]
    port: u16,

    /// Vendor identifier (cisco_ios, cisco_ios_xe, cisco_nxos, arista_eos,
    /// juniper_junos, ...).
    #[arg(long)]
    vendor: String,

    /// SSH username.
    #[arg(long, required_unless_present = "preflight_only")]
    user: Option<String>,

    /// Path to an SSH private key. Without one the ssh adapter relies on
    /// an agent.
    #[arg(long)]
    key: Option<PathBuf>,

    /// SSH password. Prompted for when neither --password nor --key is
    /// given.
    #[arg(long)]
    password: Option<String>,

    /// Display name for the device.
    #[arg(long)]
    name: Option<String>,

    /// Collection definition tree.
    #[arg(long, default_value = "collections")]
    collections: PathBuf,

    /// Local template override root (searched before the system template
    /// directory).
    #[arg(long, default_value = "templates")]
    templates: PathBuf,

    /// System template directory (e.g. an installed template package).
    #[arg(long)]
    system_templates: Option<PathBuf>,

    /// Elevate parse-trace verbosity.
    #[arg(long)]
    debug: bool,

    /// Resolve all templates and schemas, print resolution paths, exit.
    #[arg(long)]
    preflight_only: bool,

    /// Disable legacy SSH cipher/KEX support.
    #[arg(long)]
    no_legacy: bool,
}

fn init_logging(debug: bool) -> Result<()> {
    let default = if debug { "wirlwind=debug" } else { "wirlwind=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default.parse()?))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_chain(args: &Args) -> ParserChain {
    let local_dirs = vec![
        args.templates.join("textfsm"),
        args.templates.join("ttp"),
    ];
    let system_dirs = args.system_templates.iter().cloned().collect::<Vec<_>>();
    let resolver = TemplateResolver::new(local_dirs, system_dirs);
    // TextFSM/TTP engines are external; the stock binary parses with the
    // inline regex backend and any templates shipped alongside it.
    ParserChain::new(resolver, EngineSet::new())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug)?;

    let collections = CollectionRegistry::load(&args.collections, &args.vendor)
        .context("loading collection definitions")?;
    let chain = build_chain(&args);

    let capabilities = chain.capabilities();
    tracing::info!(
        textfsm = capabilities.textfsm,
        ttp = capabilities.ttp,
        regex = capabilities.regex,
        search_paths = ?capabilities.search_paths,
        "Parser backends"
    );

    if args.preflight_only {
        let ok = preflight::run(&collections, &chain, &args.collections);
        std::process::exit(if ok { 0 } else { 1 });
    }

    let (Some(host), Some(user)) = (args.host.clone(), args.user.clone()) else {
        anyhow::bail!("--host and --user are required outside --preflight-only");
    };

    let password = match (&args.password, &args.key) {
        (Some(password), _) => Some(password.clone()),
        (None, Some(_)) => None,
        (None, None) => {
            Some(rpassword::prompt_password(format!("Password for {user}@{host}: "))?)
        }
    };

    let drivers = DriverRegistry::with_builtins().context("registering vendor drivers")?;
    let driver = drivers.get(&args.vendor);

    let target = DeviceTarget {
        host,
        port: args.port,
        vendor: args.vendor.clone(),
        display_name: args.name.clone(),
    };
    let transport = ssh::SshSubprocessTransport {
        user,
        key: args.key.clone(),
        password,
        legacy: !args.no_legacy,
    };

    let store = Arc::new(StateStore::new());
    let traces = Arc::new(TraceStore::default());
    let engine = PollEngine::new(
        target,
        collections,
        driver,
        chain,
        Arc::clone(&store),
        Arc::clone(&traces),
    )
    .with_options(EngineOptions::default());

    // NDJSON event stream on stdout; logs go to stderr.
    let mut events = store.subscribe("stdout", 256);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    engine.run(&transport, shutdown_rx).await?;
    printer.abort();
    Ok(())
}
