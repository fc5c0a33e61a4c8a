//! CLI argument parsing for subagent.
//!
//! Uses clap derive macros for declarative argument definitions. Server-wide
//! settings are global flags, most of which can also come from `SUBAGENT_*`
//! environment variables. Implementations live in the `commands` module.

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Subagent: run coding agents as supervised subprocesses.
///
/// Each request spawns the agent binary with a freshly assembled
/// environment, waits for it under a timeout, and returns its final message
/// together with a session id that continues the conversation.
#[derive(Parser, Debug)]
#[command(name = "subagent")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Allow the agent to modify files in its working directory.
    #[arg(long, global = true, env = "SUBAGENT_YOLO", value_parser = FalseyValueParser::new())]
    pub yolo: bool,

    /// Bypass every approval prompt and sandbox (implies --yolo).
    #[arg(
        long,
        global = true,
        env = "SUBAGENT_AUTO_APPROVE",
        value_parser = FalseyValueParser::new()
    )]
    pub auto_approve: bool,

    /// Per-agent wall-clock timeout in seconds (minimum 1).
    #[arg(
        long = "timeout",
        global = true,
        value_name = "SECONDS",
        env = "SUBAGENT_AGENT_TIMEOUT_SECONDS"
    )]
    pub timeout_seconds: Option<f64>,

    /// Seconds between SIGTERM and SIGKILL when stopping an agent.
    #[arg(long, global = true, value_name = "SECONDS", default_value_t = 5)]
    pub grace_seconds: u64,

    /// Agent binary name or path.
    #[arg(long, global = true, value_name = "BIN", env = "SUBAGENT_AGENT_BIN")]
    pub agent_bin: Option<String>,

    /// YAML file with additional or replacement review templates.
    #[arg(long, global = true, value_name = "FILE", env = "SUBAGENT_REVIEW_TEMPLATES")]
    pub review_templates: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). Logs go to stderr.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve tool calls as JSON lines on stdin/stdout.
    ///
    /// Each request line is `{"id": .., "tool": .., "arguments": {..}}`;
    /// `{"id": .., "cancel": <request id>}` cancels an in-flight call.
    /// Responses are written as they complete, not in request order.
    Serve,

    /// Run a single agent task and print its final message.
    Run(RunArgs),

    /// Run a templated review.
    Review(ReviewCmdArgs),

    /// Run a batch of tasks in parallel from a JSON file.
    ///
    /// The file holds an array of `{"prompt", "work_dir"?, "model"?}`
    /// objects. Use `-` to read from stdin.
    Batch(BatchArgs),

    /// Show the environment an agent would receive, without running one.
    Env(EnvArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Instructions for the agent.
    pub prompt: String,

    /// Working directory (defaults to the current directory).
    #[arg(long = "cd", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Model to request from the agent.
    #[arg(long, short)]
    pub model: Option<String>,

    /// Output JSON instead of plain text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ReviewCmdArgs {
    /// Review template name. Omit with --list to see the available ones.
    #[arg(required_unless_present = "list")]
    pub review_type: Option<String>,

    /// What to review (path, commit range, ...).
    #[arg(long)]
    pub target: Option<String>,

    /// Extra instructions appended to the template.
    #[arg(long = "prompt", value_name = "TEXT")]
    pub custom_prompt: Option<String>,

    #[arg(long = "cd", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    #[arg(long, short)]
    pub model: Option<String>,

    /// List the available review types and exit.
    #[arg(long)]
    pub list: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// JSON file containing the task array, or `-` for stdin.
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct EnvArgs {
    /// Working directory whose `.env` would be used.
    #[arg(long = "cd", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Print values as well as names.
    #[arg(long)]
    pub show_values: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
