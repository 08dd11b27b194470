use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use deploy_transport::{Connector, WsConnector};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::build::{BuildArtifact, BuildPipeline, BuildSettings, BuildSnapshot, Phase};
use crate::config::Config;
use crate::console::{Console, ConsoleSettings, ConsoleUpdate};
use crate::gateway::HttpGateway;
use crate::logging::{LogConfig, LogLevel};
use crate::transcript::Entry;

#[derive(Parser, Debug)]
#[command(name = "easy-deploy")]
#[command(about = "Remote image builds and a kubectl console for the easy-deploy executor")]
pub struct Cli {
    /// Executor websocket base (e.g., ws://localhost:53801)
    #[arg(long, env = "EASY_DEPLOY_WS_BASE", global = true)]
    pub ws_base: Option<String>,

    /// Dashboard API base used for the registry account lookup
    #[arg(long, env = "EASY_DEPLOY_API_BASE", global = true)]
    pub api_base: Option<String>,

    /// Session token
    #[arg(long, env = "EASY_DEPLOY_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    pub log_level: LogLevel,

    /// Write logs here instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clone, generate the Dockerfile, then build and push an image
    Build {
        /// Id of the stored Dockerfile record
        #[arg(long)]
        dockerfile_id: i64,

        /// Image name and tag to push (e.g., app:latest)
        #[arg(long)]
        image: String,
    },
    /// Interactive cluster console; reads commands from stdin
    Console,
}

impl Cli {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            file: self.log_file.clone(),
        }
    }
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let token = config
        .token
        .clone()
        .context("no session token; set EASY_DEPLOY_TOKEN or pass --token")?;
    let connector: Arc<dyn Connector> = Arc::new(WsConnector::new(config.connect_timeout));
    match cli.command {
        Commands::Build {
            dockerfile_id,
            image,
        } => {
            let artifact = BuildArtifact::new(dockerfile_id, image);
            run_build(&config, token, connector, artifact).await
        }
        Commands::Console => run_console(&config, token, connector).await,
    }
}

enum BuildWake {
    Event(Option<Phase>),
    Interrupted,
}

async fn run_build(
    config: &Config,
    token: String,
    connector: Arc<dyn Connector>,
    artifact: BuildArtifact,
) -> Result<()> {
    let gateway = Arc::new(HttpGateway::new(&config.api_base, token.clone())?);
    let mut pipeline = BuildPipeline::new(
        connector,
        gateway,
        BuildSettings {
            ws_base: config.ws_base.clone(),
            token,
        },
    );

    if let Err(err) = pipeline.start(artifact).await {
        if let Some(notice) = pipeline.notice() {
            eprintln!("{notice}");
        }
        return Err(err.into());
    }
    if let Some(credential) = pipeline.credential() {
        println!("pushing as {}", credential.username);
    }

    let mut shown = 0;
    let mut phase = pipeline.phase();
    println!("phase: {phase}");
    loop {
        let entries = pipeline.transcript().entries();
        for entry in entries.iter().skip(shown) {
            print_entry(entry);
        }
        shown = entries.len();
        if pipeline.phase() != phase {
            phase = pipeline.phase();
            println!("phase: {phase}");
        }
        if phase.is_terminal() {
            break;
        }

        let wake = tokio::select! {
            next = pipeline.next_event() => BuildWake::Event(next),
            _ = tokio::signal::ctrl_c() => BuildWake::Interrupted,
        };
        match wake {
            BuildWake::Event(Some(_)) => {}
            BuildWake::Event(None) => break,
            BuildWake::Interrupted => {
                pipeline.cancel().await;
                return Err(anyhow!("build cancelled"));
            }
        }
    }

    let outcome = build_outcome(&pipeline.snapshot());
    pipeline.cancel().await;
    println!("{}", outcome?);
    Ok(())
}

fn build_outcome(snapshot: &BuildSnapshot) -> Result<String> {
    match snapshot.phase {
        Phase::Completed => Ok(match &snapshot.target {
            Some(target) => format!("pushed {}", target.docker_image_name),
            None => "build completed".to_owned(),
        }),
        _ => Err(anyhow!(
            "build failed: {}",
            snapshot
                .failure
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "session ended early".to_owned())
        )),
    }
}

/// One line typed at the console prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(String),
    Deploy(i64),
    Stop(i64),
    Clear,
    Reconnect,
    Pending,
    Help,
    Quit,
    Empty,
}

pub fn parse_input(line: &str) -> Result<ConsoleInput, String> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let input = match words.next() {
        None => ConsoleInput::Empty,
        Some(verb @ ("deploy" | "stop")) => {
            let id = words
                .next()
                .ok_or_else(|| format!("usage: {verb} <resource-id>"))?
                .parse::<i64>()
                .map_err(|_| "resource id must be a number".to_owned())?;
            if verb == "deploy" {
                ConsoleInput::Deploy(id)
            } else {
                ConsoleInput::Stop(id)
            }
        }
        Some("clear") => ConsoleInput::Clear,
        Some("reconnect") => ConsoleInput::Reconnect,
        Some("pending") => ConsoleInput::Pending,
        Some("help") => ConsoleInput::Help,
        Some("quit" | "exit") => ConsoleInput::Quit,
        Some(_) => ConsoleInput::Command(line.to_owned()),
    };
    Ok(input)
}

const CONSOLE_HELP: &str = "\
kubectl ...       run a kubectl command on the cluster
deploy <id>       deploy a stored resource
stop <id>         stop a stored resource
pending           list resources waiting for an answer
clear             clear the transcript
reconnect         drop the session and open a new one
quit              leave";

enum ConsoleWake {
    Input(std::io::Result<Option<String>>),
    Update(Option<ConsoleUpdate>),
}

async fn run_console(config: &Config, token: String, connector: Arc<dyn Connector>) -> Result<()> {
    let mut console = Console::new(
        connector,
        ConsoleSettings {
            ws_base: config.ws_base.clone(),
            token,
            timeouts: config.operation_timeouts(),
        },
    );
    match console.connect().await {
        Ok(()) => println!("console connected; type `help` for commands"),
        Err(err) => eprintln!("{err}; type `reconnect` to try again"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let watching = console.is_watching();
        let wake = tokio::select! {
            line = lines.next_line() => ConsoleWake::Input(line),
            update = console.next_update(), if watching => ConsoleWake::Update(update),
        };
        match wake {
            ConsoleWake::Input(line) => {
                let Some(line) = line? else {
                    break;
                };
                match parse_input(&line) {
                    Ok(ConsoleInput::Quit) => break,
                    Ok(input) => apply_input(&mut console, input).await,
                    Err(usage) => eprintln!("{usage}"),
                }
            }
            ConsoleWake::Update(Some(update)) => {
                render_update(&update);
                if !matches!(update, ConsoleUpdate::Ended(_)) {
                    print_pending(&console);
                }
            }
            ConsoleWake::Update(None) => debug!(target = "console", "nothing left to watch"),
        }
    }
    console.close().await;
    Ok(())
}

async fn apply_input(console: &mut Console, input: ConsoleInput) {
    let result = match input {
        ConsoleInput::Command(text) => console.execute_command(&text),
        ConsoleInput::Deploy(id) => console.deploy(id),
        ConsoleInput::Stop(id) => console.stop(id),
        ConsoleInput::Clear => {
            console.clear_transcript();
            Ok(())
        }
        ConsoleInput::Reconnect => console.reconnect().await.map(|()| {
            println!("console reconnected");
        }),
        ConsoleInput::Pending => {
            print_pending(console);
            Ok(())
        }
        ConsoleInput::Help => {
            println!("{CONSOLE_HELP}");
            Ok(())
        }
        ConsoleInput::Quit | ConsoleInput::Empty => Ok(()),
    };
    if let Err(err) = result {
        eprintln!("{err}");
    }
}

fn render_update(update: &ConsoleUpdate) {
    match update {
        ConsoleUpdate::Received { entry, resolved } => {
            if let Some(entry) = entry {
                print_entry(entry);
            }
            for op in resolved {
                println!("  {} {} answered", op.kind.command(), op.resource_id);
            }
        }
        ConsoleUpdate::TimedOut(ops) => {
            for op in ops {
                println!(
                    "  {} {} timed out without an answer",
                    op.kind.command(),
                    op.resource_id
                );
            }
        }
        ConsoleUpdate::Ended(state) => {
            println!(
                "console session {}; type `reconnect` to open a new one",
                state.label()
            );
        }
    }
}

fn print_pending(console: &Console) {
    let ops = console.pending().snapshot();
    if ops.is_empty() {
        return;
    }
    let busy: Vec<String> = ops
        .iter()
        .map(|op| format!("{} {}", op.kind.command(), op.resource_id))
        .collect();
    println!("  pending: {}", busy.join(", "));
}

fn print_entry(entry: &Entry) {
    println!("{} [{}] {}", entry.clock(), entry.tag.label(), entry.message);
    if let Some(detail) = &entry.detail {
        println!("{detail}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFailure;
    use clap::CommandFactory;
    use deploy_proto::BuildTarget;

    #[test]
    fn parses_console_verbs() {
        assert_eq!(parse_input("deploy 42"), Ok(ConsoleInput::Deploy(42)));
        assert_eq!(parse_input("  stop 7 "), Ok(ConsoleInput::Stop(7)));
        assert_eq!(parse_input("exit"), Ok(ConsoleInput::Quit));
        assert_eq!(parse_input(""), Ok(ConsoleInput::Empty));
        assert!(parse_input("deploy").is_err());
        assert!(parse_input("stop web").is_err());
    }

    #[test]
    fn everything_else_is_a_command() {
        assert_eq!(
            parse_input(" kubectl get pods "),
            Ok(ConsoleInput::Command("kubectl get pods".into()))
        );
        assert_eq!(
            parse_input("rm -rf /"),
            Ok(ConsoleInput::Command("rm -rf /".into()))
        );
    }

    #[test]
    fn cli_parses_build_arguments() {
        let cli = Cli::try_parse_from([
            "easy-deploy",
            "--log-level",
            "debug",
            "build",
            "--dockerfile-id",
            "7",
            "--image",
            "app:latest",
        ])
        .expect("cli parses");
        assert_eq!(cli.log_level, LogLevel::Debug);
        match cli.command {
            Commands::Build {
                dockerfile_id,
                image,
            } => {
                assert_eq!(dockerfile_id, 7);
                assert_eq!(image, "app:latest");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn session_arguments_fall_back_to_environment() {
        let command = Cli::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id().as_str() == id)
                .and_then(|arg| arg.get_env())
                .and_then(|name| name.to_str())
                .map(str::to_owned)
        };
        assert_eq!(env_of("ws_base").as_deref(), Some("EASY_DEPLOY_WS_BASE"));
        assert_eq!(env_of("api_base").as_deref(), Some("EASY_DEPLOY_API_BASE"));
        assert_eq!(env_of("token").as_deref(), Some("EASY_DEPLOY_TOKEN"));
        let token = command
            .get_arguments()
            .find(|arg| arg.get_id().as_str() == "token")
            .expect("token argument");
        assert!(token.is_hide_env_values_set());
    }

    #[test]
    fn outcome_reports_pushed_image_or_failure() {
        let done = BuildSnapshot {
            phase: Phase::Completed,
            target: Some(BuildTarget {
                id: 7,
                docker_image_name: "app:latest".into(),
            }),
            ..BuildSnapshot::default()
        };
        assert_eq!(build_outcome(&done).expect("completed"), "pushed app:latest");

        let failed = BuildSnapshot {
            phase: Phase::Failed,
            failure: Some(BuildFailure::Remote("denied".into())),
            ..BuildSnapshot::default()
        };
        let err = build_outcome(&failed).unwrap_err().to_string();
        assert!(err.starts_with("build failed:"));
        assert!(err.contains("denied"));

        let dropped = BuildSnapshot {
            phase: Phase::Building,
            ..BuildSnapshot::default()
        };
        assert!(build_outcome(&dropped).unwrap_err().to_string().contains("ended early"));
    }
}
