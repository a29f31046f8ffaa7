use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tagwright::agent::AgentRuntime;
use tagwright::config::{Config, SandboxConfig};
use tagwright::llm::{LlmClient, OpenAiClient};
use tagwright::sandbox::DEFAULT_ROOT;
use tagwright::{parse, protocol_prompt, OperationExecutor};

const DEFAULT_CONFIG_PATH: &str = "config/agent.toml";
const DEFAULT_LOG_DIR: &str = "log";
/// Daily log files kept; older ones are pruned.
const MAX_LOG_FILES: usize = 7;

fn print_help() {
    println!(
        "\
tagwright v{}

An LLM agent that edits a sandboxed project through tagged file operations.

USAGE:
    tagwright [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: {DEFAULT_CONFIG_PATH}]

OPTIONS:
    --apply <FILE>   Apply the tagged operations in FILE (`-` for stdin),
                     print the results as JSON and exit
    --root <DIR>     Sandbox root, overrides [sandbox] root
    --log-dir <DIR>  Directory for the daily log files [default: {DEFAULT_LOG_DIR}]
    --prompt         Print the protocol instructions given to the model
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

INTERACTIVE SESSION:
    Type a task over one or more lines and finish it with a `/done` line.
    `/reset` starts a new conversation; `quit`, `exit` or `q` leaves.

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax,
    and a `.env` file in the working directory is loaded first.

    RUST_LOG          Log level filter for tracing
                      (e.g. debug, tagwright=debug,warn)
    OPENAI_API_KEY    Typical source for [llm] api_key

EXAMPLES:
    tagwright                               # uses {DEFAULT_CONFIG_PATH}
    tagwright --apply reply.txt --root out  # replay a saved model reply
    RUST_LOG=debug tagwright                # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config_path: Option<String>,
    apply: Option<String>,
    root: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    prompt: bool,
    help: bool,
    version: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => parsed.version = true,
            "--help" | "-h" => parsed.help = true,
            "--prompt" => parsed.prompt = true,
            "--apply" => {
                parsed.apply = Some(args.next().ok_or_else(|| anyhow!("--apply needs a file"))?)
            }
            "--root" => {
                let dir = args.next().ok_or_else(|| anyhow!("--root needs a directory"))?;
                parsed.root = Some(PathBuf::from(dir));
            }
            "--log-dir" => {
                let dir = args.next().ok_or_else(|| anyhow!("--log-dir needs a directory"))?;
                parsed.log_dir = Some(PathBuf::from(dir));
            }
            flag if flag.starts_with("--") => return Err(anyhow!("Unknown option: {flag}")),
            path => parsed.config_path = Some(path.to_string()),
        }
    }
    Ok(parsed)
}

/// One complete entry from the interactive prompt.
#[derive(Debug, PartialEq)]
enum Input {
    Message(String),
    Reset,
    Quit,
}

/// Accumulates lines until `/done`, recognising the control words.
#[derive(Debug, Default)]
struct InputCollector {
    lines: Vec<String>,
}

impl InputCollector {
    fn push_line(&mut self, line: &str) -> Option<Input> {
        match line.trim() {
            "/done" => Some(Input::Message(std::mem::take(&mut self.lines).join("\n"))),
            "quit" | "exit" | "q" => Some(Input::Quit),
            "/reset" if self.lines.is_empty() => Some(Input::Reset),
            _ => {
                self.lines.push(line.to_string());
                None
            }
        }
    }

    /// Called on end of input: whatever was typed counts as a message.
    fn finish(&mut self) -> Option<Input> {
        if self.lines.is_empty() {
            None
        } else {
            Some(Input::Message(std::mem::take(&mut self.lines).join("\n")))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    // Handle --help / --version before anything else
    if args.version {
        println!("tagwright v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.help {
        print_help();
        return Ok(());
    }
    if args.prompt {
        print!("{}", protocol_prompt());
        return Ok(());
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    let log_dir = args
        .log_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
    let _log_guard = init_logging(&log_dir)?;

    if dotenvy::dotenv().is_ok() {
        info!("Loaded environment from .env");
    }

    let config_path = args
        .config_path
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    if let Some(input) = &args.apply {
        return apply_file(&args, &config_path, input);
    }

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)?;
    config.validate()?;

    let root = args.root.clone().unwrap_or_else(|| config.sandbox.root.clone());
    let executor = OperationExecutor::new(&root)?;
    let llm: Box<dyn LlmClient> = match config.llm.provider.as_str() {
        "openai" => Box::new(OpenAiClient::new(config.llm.clone())),
        other => return Err(anyhow!("Unsupported LLM provider: {other}")),
    };

    info!("Agent: {}", config.agent.name);
    info!("LLM: {}", llm.description());
    let mut runtime = AgentRuntime::new(&config.agent, llm, executor);

    run_interactive(&mut runtime, &config.agent.name).await
}

/// Daily-rotating log file appender writing `app.<date>.log` into `dir`.
fn log_file_appender(dir: &Path) -> Result<RollingFileAppender> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("app")
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)?;
    Ok(appender)
}

/// Logs to stderr and to the daily log file. Keep the guard alive until
/// exit or buffered file lines are lost.
fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    let (file_writer, guard) = tracing_appender::non_blocking(log_file_appender(log_dir)?);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tagwright=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    Ok(guard)
}

/// Sandbox root for `--apply` when `--root` is absent. Only `[sandbox]` is
/// read; a missing or unreadable config falls back to the default root.
fn apply_root(config_path: &str) -> PathBuf {
    if !Path::new(config_path).exists() {
        return PathBuf::from(DEFAULT_ROOT);
    }
    match SandboxConfig::load(config_path) {
        Ok(sandbox) => sandbox.root,
        Err(e) => {
            warn!("Ignoring {config_path} ({e}), using sandbox root '{DEFAULT_ROOT}'");
            PathBuf::from(DEFAULT_ROOT)
        }
    }
}

/// `--apply`: one batch, results to stdout as JSON.
fn apply_file(args: &CliArgs, config_path: &str, input: &str) -> Result<()> {
    let root = args.root.clone().unwrap_or_else(|| apply_root(config_path));

    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input)?
    };

    let records = parse(&text);
    if records.is_empty() {
        warn!("No tagged operations found in {input}");
    }

    let mut executor = OperationExecutor::new(&root)?;
    let results = executor.execute_all(&records);
    let failed = results.iter().filter(|r| !r.success).count();
    info!("{} operation(s), {failed} failed", results.len());

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

async fn run_interactive(runtime: &mut AgentRuntime, name: &str) -> Result<()> {
    println!("{name} | sandbox: {}", runtime.executor().root().display());
    println!("Describe a task; end it with a line containing /done. Type quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut collector = InputCollector::default();

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let input = loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, exiting");
                    return Ok(());
                }
            };
            match line {
                Some(line) => {
                    if let Some(input) = collector.push_line(&line) {
                        break Some(input);
                    }
                }
                None => break collector.finish(),
            }
        };

        let text = match input {
            None | Some(Input::Quit) => break,
            Some(Input::Reset) => {
                runtime.reset();
                println!("(new conversation)");
                continue;
            }
            Some(Input::Message(text)) if text.trim().is_empty() => continue,
            Some(Input::Message(text)) => text,
        };

        let mut step = 0;
        let turn = tokio::select! {
            turn = runtime.chat_with(&text, |_, result| {
                step += 1;
                println!("  [{step}] {}", result.summary());
            }) => turn,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, exiting");
                return Ok(());
            }
        };

        match turn {
            Ok(turn) => {
                println!("\n{name}: {}\n", turn.reply.trim());
                if turn.exhausted {
                    println!("(stopped after {} rounds; send another message to continue)", turn.rounds);
                }
            }
            Err(e) => {
                error!("Turn failed: {e}");
                println!("Sorry, an error occurred: {e}");
            }
        }
    }

    println!("Bye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<CliArgs> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    // ── parse_args ──────────────────────────────────────

    #[test]
    fn test_no_args() {
        assert_eq!(args(&[]).unwrap(), CliArgs::default());
    }

    #[test]
    fn test_config_path_and_flags() {
        let parsed = args(&["--root", "out", "my.toml", "--apply", "-"]).unwrap();
        assert_eq!(parsed.config_path.as_deref(), Some("my.toml"));
        assert_eq!(parsed.root, Some(PathBuf::from("out")));
        assert_eq!(parsed.apply.as_deref(), Some("-"));
    }

    #[test]
    fn test_missing_option_value() {
        assert!(args(&["--apply"]).is_err());
        assert!(args(&["--root"]).is_err());
    }

    #[test]
    fn test_unknown_option() {
        assert!(args(&["--frobnicate"]).is_err());
    }

    #[test]
    fn test_log_dir_option() {
        let parsed = args(&["--log-dir", "/var/log/tagwright"]).unwrap();
        assert_eq!(parsed.log_dir, Some(PathBuf::from("/var/log/tagwright")));
        assert!(args(&["--log-dir"]).is_err());
    }

    // ── --apply sandbox root ────────────────────────────

    #[test]
    fn test_apply_root_reads_only_sandbox_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "[sandbox]\nroot = \"demo\"\n\n[llm]\napi_key = \"${TAGWRIGHT_TEST_UNSET_KEY}\"\n",
        )
        .unwrap();
        assert_eq!(apply_root(path.to_str().unwrap()), PathBuf::from("demo"));
    }

    #[test]
    fn test_apply_root_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert_eq!(apply_root(missing.to_str().unwrap()), PathBuf::from(DEFAULT_ROOT));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[sandbox\nroot = ").unwrap();
        assert_eq!(apply_root(broken.to_str().unwrap()), PathBuf::from(DEFAULT_ROOT));

        let unresolved = dir.path().join("unresolved.toml");
        std::fs::write(&unresolved, "[sandbox]\nroot = \"${TAGWRIGHT_TEST_UNSET_DIR}\"\n").unwrap();
        assert_eq!(apply_root(unresolved.to_str().unwrap()), PathBuf::from(DEFAULT_ROOT));
    }

    // ── logging ─────────────────────────────────────────

    #[test]
    fn test_log_file_created_in_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("log");
        let _appender = log_file_appender(&log_dir).unwrap();

        let names: Vec<String> = std::fs::read_dir(&log_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("app.") && names[0].ends_with(".log"), "{names:?}");
    }

    // ── InputCollector ──────────────────────────────────

    #[test]
    fn test_multiline_message() {
        let mut c = InputCollector::default();
        assert_eq!(c.push_line("write a CLI"), None);
        assert_eq!(c.push_line("  with logging"), None);
        assert_eq!(
            c.push_line("/done"),
            Some(Input::Message("write a CLI\n  with logging".to_string()))
        );
        assert_eq!(c.finish(), None);
    }

    #[test]
    fn test_quit_words() {
        for word in ["quit", "exit", " q "] {
            let mut c = InputCollector::default();
            assert_eq!(c.push_line(word), Some(Input::Quit));
        }
    }

    #[test]
    fn test_reset_only_at_start() {
        let mut c = InputCollector::default();
        assert_eq!(c.push_line("/reset"), Some(Input::Reset));
        assert_eq!(c.push_line("text"), None);
        assert_eq!(c.push_line("/reset"), None);
    }

    #[test]
    fn test_finish_flushes_pending_lines() {
        let mut c = InputCollector::default();
        c.push_line("partial");
        assert_eq!(c.finish(), Some(Input::Message("partial".to_string())));
    }
}
