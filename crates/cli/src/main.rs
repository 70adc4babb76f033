use clap::{Parser, Subcommand};
use relay::config::{ServiceSettings, Settings};
use relay::pipeline::{PipelineTrigger, ResearchPipeline};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay: webhook-triggered research pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook gateway. Requires TRIGGER_ID, CHANNEL_ID and OPENAI_API_KEY (environment or .env).
    Serve {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 2000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run the pipeline once for a topic in the foreground and print each task's output.
    /// Requires OPENAI_API_KEY; the webhook settings are not needed.
    Run {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Topic passed to the research and reporting agents.
        #[arg(long, short)]
        topic: String,
    },

    /// Print the task graph for a topic without calling any service.
    Plan {
        #[arg(long, short)]
        topic: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, topic }) => {
            if let Err(e) = run_once(config, &topic).await {
                log::error!("run failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Plan { topic }) => {
            print_plan(&topic);
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Load config and resolve the required settings. Fails before anything is bound or called.
fn load_settings(config_path: Option<std::path::PathBuf>) -> anyhow::Result<Settings> {
    let (config, path) = relay::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    Ok(Settings::resolve(&config)?)
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut settings = load_settings(config_path)?;
    if let Some(p) = port {
        settings.port = p;
    }
    log::info!("starting gateway on {}", settings.bind_addr());
    relay::gateway::run_gateway(settings).await
}

async fn run_once(config_path: Option<std::path::PathBuf>, topic: &str) -> anyhow::Result<()> {
    let (config, path) = relay::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    let services = ServiceSettings::resolve(&config)?;
    let pipeline = ResearchPipeline::from_settings(&services);
    let outcome = pipeline.trigger(topic).await?;
    for out in &outcome.outputs {
        println!("== {}\n{}\n", out.task, out.output.trim());
    }
    Ok(())
}

fn print_plan(topic: &str) {
    let pipeline = ResearchPipeline::pipeline_for(topic);
    println!("{} ({} tasks)", pipeline.name, pipeline.tasks.len());
    for (i, task) in pipeline.tasks.iter().enumerate() {
        let tool = task.tool.map(|a| a.name()).unwrap_or("text");
        let deps = if task.input_tasks.is_empty() {
            "-".to_string()
        } else {
            task.input_tasks.join(", ")
        };
        println!("{}. {} [{}] agent={:?} after={}", i + 1, task.name, tool, task.agent.role, deps);
    }
}
