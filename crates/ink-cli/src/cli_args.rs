use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ink-player")]
#[command(about = "Plays compiled ink stories")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Machine-readable, one boundary per invocation.
    Agent(AgentArgs),
    /// Interactive play on stdin/stdout.
    Play(PlayArgs),
}

#[derive(Debug, Args)]
pub(crate) struct AgentArgs {
    #[command(subcommand)]
    pub(crate) command: AgentCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum AgentCommand {
    Start(StartArgs),
    Choose(ChooseArgs),
}

#[derive(Debug, Args)]
pub(crate) struct StoryArgs {
    #[arg(long = "story")]
    pub(crate) story: String,
    #[arg(long = "seed")]
    pub(crate) seed: Option<i32>,
    /// Fail on unbound EXTERNAL functions instead of running their ink fallbacks.
    #[arg(long = "strict-externals")]
    pub(crate) strict_externals: bool,
}

#[derive(Debug, Args)]
pub(crate) struct StartArgs {
    #[command(flatten)]
    pub(crate) story: StoryArgs,
    /// Knot or stitch to start from instead of the top of the story.
    #[arg(long = "path")]
    pub(crate) path: Option<String>,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct ChooseArgs {
    #[arg(long = "state-in")]
    pub(crate) state_in: String,
    #[arg(long = "choice")]
    pub(crate) choice: usize,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct PlayArgs {
    #[command(flatten)]
    pub(crate) story: StoryArgs,
    #[arg(long = "state-file")]
    pub(crate) state_file: Option<String>,
}
