use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use gir_bridge::config::LoggingConfig;
use gir_bridge::function::{CallPlan, Parameter, ParameterRole};
use gir_bridge::repository::{MetadataStore, Repository};
use gir_bridge::BridgeConfig;

#[derive(Parser)]
#[command(name = "gir-bridge")]
#[command(about = "Inspect call plans derived from introspection metadata")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "GIR_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Additional namespace documents to load
    #[arg(short, long)]
    metadata: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the derived calling convention of a callable
    Describe {
        /// `Namespace.name` or `Namespace.Type.method`
        callable: String,
    },

    /// Derive every call plan and report the ones that fail
    Check {
        /// Restrict to one namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// List the callables of every loaded namespace, as bound names
    List {
        /// Restrict to one namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .context("invalid log filter")?;
    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

fn load_store(cli: &Cli, config: &BridgeConfig) -> anyhow::Result<MetadataStore> {
    let mut store = config.load_repository()?;
    for path in &cli.metadata {
        store
            .load_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }
    Ok(store)
}

fn selected(store: &MetadataStore, namespace: Option<&str>) -> anyhow::Result<Vec<String>> {
    let namespaces = store.namespaces();
    match namespace {
        Some(ns) if namespaces.iter().any(|n| n == ns) => Ok(vec![ns.to_string()]),
        Some(ns) => bail!("Namespace '{}' not loaded", ns),
        None => Ok(namespaces),
    }
}

/// Every callable of a namespace with its bound name.
fn callables(store: &MetadataStore, namespace: &str) -> Vec<(String, String)> {
    let mut out: Vec<_> = store
        .functions(namespace)
        .iter()
        .map(|f| (f.name.clone(), f.qualified_name()))
        .collect();
    for info in store.infos(namespace) {
        for method in &info.methods {
            out.push((format!("{}_{}", info.name, method.name), method.qualified_name()));
        }
    }
    out.sort();
    out
}

fn role_label(plan: &CallPlan, param: &Parameter) -> String {
    let name_of = |index: usize| {
        plan.parameter(index)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| index.to_string())
    };
    match param.role {
        ParameterRole::Normal => "normal".to_string(),
        ParameterRole::Skip => "skip".to_string(),
        ParameterRole::Array { length } => format!("array (length: {})", name_of(length)),
        ParameterRole::Callback { closure, destroy } => {
            let mut label = "callback".to_string();
            if let Some(closure) = closure {
                label.push_str(&format!(" (closure: {})", name_of(closure)));
            }
            if let Some(destroy) = destroy {
                label.push_str(&format!(" (destroy: {})", name_of(destroy)));
            }
            label
        }
    }
}

fn describe(plan: &CallPlan) {
    println!("{}", plan.name);
    if plan.is_method {
        println!("  receiver: implicit");
    }
    for param in &plan.parameters {
        let nullable = if param.nullable { ", nullable" } else { "" };
        println!(
            "  {:<16} {:<10} {:<8} {}{}",
            param.name,
            param.type_name,
            format!("{:?}", param.direction).to_lowercase(),
            role_label(plan, param),
            nullable
        );
    }
    if plan.skip_return {
        println!("  returns: nothing");
    } else {
        println!(
            "  returns: {} (transfer {:?})",
            plan.return_type.display_name(),
            plan.return_transfer
        );
    }
    if plan.can_throw {
        println!("  throws: GError");
    }
    println!(
        "  inputs: {}, outputs: {}, native slots: {}",
        plan.n_in,
        plan.n_out,
        plan.total_args()
    );
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    init_logging(&config.logging)?;
    let store = load_store(&cli, &config)?;

    match &cli.command {
        Commands::Describe { callable } => {
            let info = store
                .find_callable(callable)
                .with_context(|| format!("Callable '{}' not found", callable))?;
            let plan = CallPlan::derive(&store, &info)?;
            describe(&plan);
        }

        Commands::Check { namespace } => {
            let mut failures = 0usize;
            let mut total = 0usize;
            for ns in selected(&store, namespace.as_deref())? {
                for (_, qualified) in callables(&store, &ns) {
                    total += 1;
                    let Some(info) = store.find_callable(&qualified) else {
                        continue;
                    };
                    if let Err(err) = CallPlan::derive(&store, &info) {
                        failures += 1;
                        println!("{}: {}", qualified, err);
                    }
                }
            }
            eprintln!("{} callables, {} failed", total, failures);
            if failures > 0 {
                std::process::exit(1);
            }
        }

        Commands::List { namespace } => {
            for ns in selected(&store, namespace.as_deref())? {
                match store.version(&ns) {
                    Some(version) => println!("{} {}", ns, version),
                    None => println!("{}", ns),
                }
                for (bound, qualified) in callables(&store, &ns) {
                    println!("  {:<32} {}", bound, qualified);
                }
            }
        }
    }

    Ok(())
}
