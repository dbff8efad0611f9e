mod teams;

use std::io::{self, BufRead};
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use troupe_agent::graph::{Snapshot, Target};
use troupe_core::config::AppConfig;
use troupe_core::state::State;

#[derive(Parser)]
#[command(name = "troupe", version, about = "Supervised teams of LLM workers that research and write papers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "troupe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a prompt through the top-level team and stream every hop
    Run {
        /// Maximum node executions in the top-level graph
        #[arg(long)]
        step_limit: Option<usize>,
        /// Print snapshots as JSON lines
        #[arg(long)]
        json: bool,
        /// The request (read from stdin when empty)
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Print the composed graphs
    Graph,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("troupe=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "troupe", &mut io::stdout());
        return Ok(());
    }

    let config = AppConfig::load(&cli.config)?;
    info!(config = %cli.config.display(), model = %config.model.model_id, "Configuration loaded");

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Graph => {
            let teams = teams::build(&config)?;
            println!("# {}\n{}", teams::RESEARCH_TEAM, teams.research.describe());
            println!("# {}\n{}", teams::WRITING_TEAM, teams.writing.describe());
            println!("# top\n{}", teams.top.describe());
        }
        Commands::Run {
            step_limit,
            json,
            prompt,
        } => {
            let mut text = prompt.join(" ");
            if text.is_empty() {
                text = io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            if text.trim().is_empty() {
                anyhow::bail!("empty prompt");
            }

            let teams = teams::build(&config)?;
            let limit = step_limit.unwrap_or(config.run.step_limit);
            let mut run = teams.top.stream(State::seeded(text), limit);

            while let Some(item) = run.next().await {
                match item {
                    Ok(snapshot) => print_snapshot(&snapshot, json)?,
                    Err(e) => {
                        eprintln!("{}: {}", e.kind(), e);
                        std::process::exit(1);
                    }
                }
            }
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn print_snapshot(snapshot: &Snapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }
    match &snapshot.node {
        Target::Terminal => {
            println!(
                "[done] {} steps, {} messages",
                snapshot.step,
                snapshot.state.messages.len()
            );
            if let Some(last) = snapshot.state.last_message() {
                println!("\n{}", last.content());
            }
        }
        Target::Node(name) => match (&snapshot.state.next, snapshot.state.last_message()) {
            (Some(next), _) if is_routing_hop(snapshot) => {
                println!("[{}] {} -> {}", snapshot.step, name, next);
            }
            (_, Some(last)) => {
                println!("[{}] {}: {}", snapshot.step, last.author(), preview(last.content()));
            }
            _ => println!("[{}] {}", snapshot.step, name),
        },
    }
    Ok(())
}

fn is_routing_hop(snapshot: &Snapshot) -> bool {
    snapshot.node.name() == teams::SUPERVISOR
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= MAX {
        flat
    } else {
        let cut: String = flat.chars().take(MAX).collect();
        format!("{cut}...")
    }
}
