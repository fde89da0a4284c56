//! stdio-bridge - drive a long-lived child process over its standard streams.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stdio_bridge::bridge::ChildProcessBridge;
use stdio_bridge::config::{BridgeConfig, ConfigLoader};
use stdio_bridge::display::{self, ConsoleSink, ResponseDecorator};
use stdio_bridge::session::{CommandSession, ResponsePayload, TerminalState};

#[derive(Parser)]
#[command(
    name = "stdio-bridge",
    about = "Send commands to a long-lived child process over stdio",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the child, send one command and print its response.
    Run {
        /// The command line to send, e.g. BUILD.
        command: String,
        /// Executable to spawn.
        #[arg(short, long)]
        program: Option<String>,
        /// Fixed terminator line instead of `<COMMAND>_DONE`.
        #[arg(long)]
        terminator: Option<String>,
        /// Disable colored output.
        #[arg(long)]
        no_color: bool,
        /// Arguments for the child process (after `--`).
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Print the effective configuration as TOML.
    PrintConfig,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Option<BridgeConfig> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    match loader.load() {
        Ok(config) => Some(config),
        Err(e) => {
            display::print_error(&e.to_string());
            None
        }
    }
}

async fn run(config: BridgeConfig, command: &str) -> ExitCode {
    display::print_command_line(&config.process.program, &config.process.args);

    let mut bridge = match ChildProcessBridge::start(&config.process) {
        Ok(bridge) => bridge,
        Err(e) => {
            display::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let mut session = CommandSession::new(
        config.protocol.clone(),
        ResponseDecorator::from_config(&config.display),
        ConsoleSink,
    );
    let outcome = session
        .drive::<ResponsePayload>(bridge.channels_mut(), command)
        .await;

    match bridge.shutdown().await {
        Ok(status) => tracing::info!(%status, "Child process finished"),
        Err(e) => tracing::warn!(error = %e, "Failed to shut down child process"),
    }

    match outcome {
        Ok(outcome) => match outcome.state {
            TerminalState::Completed => {
                if let Some(payload) = outcome.payload {
                    display::print_payload(&payload);
                }
                ExitCode::SUCCESS
            }
            TerminalState::Aborted => {
                if outcome.diagnostic.is_none() {
                    display::print_error("child process exited without a response");
                }
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(mut config) = load_config(cli.config) else {
        return ExitCode::FAILURE;
    };

    match cli.command {
        Commands::Run {
            command,
            program,
            terminator,
            no_color,
            args,
        } => {
            if let Some(program) = program {
                config.process.program = program;
            }
            if !args.is_empty() {
                config.process.args = args;
            }
            if terminator.is_some() {
                config.protocol.terminator = terminator;
            }
            if no_color {
                config.display.color = false;
            }
            tracing::info!(
                program = %config.process.program,
                command = %command,
                "Starting stdio bridge"
            );
            run(config, &command).await
        }
        Commands::PrintConfig => match toml::to_string_pretty(&config) {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                display::print_error(&format!("Failed to render config: {e}"));
                ExitCode::FAILURE
            }
        },
    }
}
