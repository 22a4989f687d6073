use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;

use scene_runtime::config::Config;
use scene_runtime::engine::{Bindings, ScriptContext, ScriptExecutor};
use scene_runtime::telemetry;

#[derive(Parser)]
#[command(name = "scene-runtime")]
#[command(about = "Run and check scene element scripts", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/scene-runtime/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file once and print its result as JSON
    Run {
        /// Path to the script file
        file: PathBuf,
        /// JSON value used as `this`
        #[arg(short, long)]
        context: Option<String>,
        /// Bindings (name=value, value parsed as JSON, else taken as a string)
        #[arg(short, long = "bind", value_parser = parse_var)]
        bindings: Vec<(String, String)>,
    },
    /// Compile a script file without running it
    Check {
        /// Path to the script file
        file: PathBuf,
        /// Parameter names the script expects
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    telemetry::init_logging();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    debug!(?config, "Loaded configuration");

    if let Err(e) = run(cli.command, config).await {
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&e.to_json()).unwrap_or_else(|_| e.to_string())
        );
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: Config) -> scene_runtime::Result<()> {
    match command {
        Commands::Run {
            file,
            context,
            bindings,
        } => {
            let script = std::fs::read_to_string(&file)?;
            let context = match context {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Value::Object(serde_json::Map::new()),
            };
            let bindings: Bindings = bindings
                .into_iter()
                .map(|(name, raw)| (name, parse_value(&raw)))
                .collect();

            let executor = ScriptExecutor::new(&config.script);
            let context = ScriptContext::new(context);
            let result = executor
                .call_function_script(&script, &context, bindings)?
                .await?;

            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Check { file, params } => {
            let script = std::fs::read_to_string(&file)?;
            let params: Vec<&str> = params.iter().map(String::as_str).collect();
            ScriptExecutor::new(&config.script).check(&script, &params)?;
            println!("{}: ok", file.display());
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid binding '{}': expected name=value", s))?;
    if name.is_empty() {
        return Err(format!("invalid binding '{}': empty name", s));
    }
    Ok((name.to_string(), value.to_string()))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
