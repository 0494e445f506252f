//! Bergo binary: configuration loading, startup checks, terminal I/O.

use bergo_agent::{Agent, AppConfig, AppContext, MsgKind, OutputSink, Prompter};
use bergo_session::{memento, SessionRegistry, StorePaths};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

const BERGO_TITLE: &str = r#"
██████╗ ███████╗██████╗  ██████╗  ██████╗
██╔══██╗██╔════╝██╔══██╗██╔═══╗  ██╔═══██╗
██████╔╝█████╗  ██████╔╝██║ ████║██║   ██║
██╔══██╗██╔══╝  ██╔══██╗██║   ██║██║   ██║
██████╔╝███████╗██║  ██║╚██████╔╝╚██████╔╝
╚═════╝ ╚══════╝╚═╝  ╚═╝ ╚═════╝  ╚═════╝
"#;

#[derive(Parser, Debug)]
#[command(name = "bergo")]
#[command(about = "An interactive terminal coding agent")]
struct Cli {
    /// `init` writes a starter bergo.toml; otherwise a path to the config
    /// file (defaults to ./bergo.toml).
    #[arg(value_name = "INIT|CONFIG")]
    target: Option<String>,
}

/// Plain stdout sink. Rendering niceties (markdown, styles, spinners) belong
/// to the TUI layer; this sink prints and keeps the rendered transcript of
/// the in-progress block.
#[derive(Default)]
struct CliOutput {
    buffer: Mutex<String>,
}

impl OutputSink for CliOutput {
    fn on_llm_delta(&self, delta: &str, _reasoning: bool) {
        print!("{delta}");
        let _ = std::io::stdout().flush();
        let mut buffer = self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        buffer.push_str(delta);
    }

    fn on_system(&self, msg: &str, kind: MsgKind) {
        match kind {
            MsgKind::Warning => eprintln!("warning: {msg}"),
            MsgKind::Text | MsgKind::Dump => println!("{msg}"),
        }
    }

    fn update_tail(&self, msg: &str) {
        // No cursor control without the TUI; print status lines as they come.
        println!("{msg}");
    }

    fn stop(&self) -> String {
        println!();
        let mut buffer = self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *buffer)
    }
}

struct CliPrompter;

impl Prompter for CliPrompter {
    fn read_line(&self, multiline: bool) -> Result<String, bergo_agent::io::Interrupted> {
        if multiline {
            println!("(multiline input; finish with an empty line)");
            let mut lines = Vec::new();
            loop {
                let line = read_stdin_line()?;
                if line.trim().is_empty() {
                    break;
                }
                lines.push(line);
            }
            return Ok(lines.join("\n"));
        }
        print!("> ");
        let _ = std::io::stdout().flush();
        read_stdin_line()
    }

    fn select(&self, prompt: &str, options: &[&str]) -> String {
        println!("{prompt}");
        for (idx, option) in options.iter().enumerate() {
            println!("  {}. {option}", idx + 1);
        }
        print!("choice [1]: ");
        let _ = std::io::stdout().flush();
        let Ok(line) = read_stdin_line() else {
            return options.first().copied().unwrap_or_default().to_string();
        };
        let choice = line.trim().parse::<usize>().unwrap_or(1);
        options
            .get(choice.saturating_sub(1))
            .copied()
            .unwrap_or_else(|| options.first().copied().unwrap_or_default())
            .to_string()
    }

    fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [y/N]: ");
        let _ = std::io::stdout().flush();
        match read_stdin_line() {
            Ok(line) => matches!(line.trim(), "y" | "Y" | "yes"),
            Err(_) => false,
        }
    }
}

fn read_stdin_line() -> Result<String, bergo_agent::io::Interrupted> {
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        // EOF: treat like an interrupt so the double-press exit path applies.
        Ok(0) => Err(bergo_agent::io::Interrupted),
        Ok(_) => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
        Err(_) => Err(bergo_agent::io::Interrupted),
    }
}

fn init_config() -> ExitCode {
    let path = PathBuf::from("bergo.toml");
    if path.exists() {
        eprintln!("bergo.toml already exists; not overwriting");
        return ExitCode::FAILURE;
    }
    if let Err(error) = std::fs::write(&path, bergo_agent::config::STARTER_TOML) {
        eprintln!("failed to write bergo.toml: {error}");
        return ExitCode::FAILURE;
    }
    println!("wrote starter config to bergo.toml; fill in your API keys and run `bergo`");
    ExitCode::SUCCESS
}

/// Startup recovery: a live memento means the previous run died mid-task.
/// Offer to revert that session to its last checkpoint.
fn check_recovery(
    paths: &StorePaths,
    registry: &SessionRegistry,
    output: &dyn OutputSink,
    prompter: &dyn Prompter,
) -> Option<String> {
    if !memento::workspace_copy_exists(paths) {
        return None;
    }
    output.on_system("Detected abnormal exit from last session", MsgKind::Warning);
    let Some(last) = registry.entries().last() else {
        let _ = std::fs::remove_file(paths.memento_workspace_copy());
        return None;
    };
    let session_id = last.session_id.clone();
    if prompter.confirm(&format!(
        "Revert session {session_id} to its last checkpoint?"
    )) {
        let mut timeline = bergo_session::Timeline::load(&session_id, paths.clone());
        if let Err(error) = timeline.revert_to_last_checkpoint() {
            output.on_system(&format!("revert failed: {error}"), MsgKind::Warning);
        }
    } else {
        memento::stash_if_present(paths, &session_id);
    }
    Some(session_id)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.target.as_deref() == Some("init") {
        return init_config();
    }

    let config_path = cli.target.unwrap_or_else(|| "bergo.toml".to_string());
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    let paths = match StorePaths::new(".") {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("cannot resolve storage paths: {error}");
            return ExitCode::FAILURE;
        }
    };

    println!("{BERGO_TITLE}");

    let max_session_count = config.max_session_count;
    let mut session_registry = SessionRegistry::load(paths.clone());
    session_registry.evict_to(max_session_count);

    let output: Arc<dyn OutputSink> = Arc::new(CliOutput::default());
    let prompter: Arc<dyn Prompter> = Arc::new(CliPrompter);
    let recovery = check_recovery(&paths, &session_registry, output.as_ref(), prompter.as_ref());

    let app = Arc::new(AppContext::new(config, paths));
    let mut agent = match Agent::new(app, output, prompter) {
        Ok(agent) => agent,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(session_id) = recovery {
        agent.set_recovery_session(session_id);
    }

    // SIGINT cancels the in-flight stream; the agent surfaces it as a
    // user-interrupt and returns to the prompt.
    let abort = agent.abort_handle();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            abort.request_abort();
        }
    });

    match agent.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}
