use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use tunelink::{
    cli::{self, App},
    config, error,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in to the analysis backend
    Login(LoginOptions),

    /// Log out and forget stored credentials
    Logout,

    /// Show the current session
    Status,

    /// Send an authorized request to the backend
    Request(RequestOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct LoginOptions {
    /// Authorization code to exchange instead of using the browser
    #[clap(long, conflicts_with = "token")]
    pub code: Option<String>,

    /// Bearer token to log in with directly (no refresh)
    #[clap(long)]
    pub token: Option<String>,

    /// Print the login URL instead of opening a browser
    #[clap(long)]
    pub no_browser: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method, e.g. GET or POST
    pub method: String,

    /// Path on the backend, e.g. /analysis/top-tracks
    pub path: String,

    /// JSON body to send
    #[clap(long)]
    pub data: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Completions(opt) = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let app = match config::Config::from_env().and_then(App::from_config) {
        Ok(app) => app,
        Err(e) => error!("Cannot initialize. Err: {}", e),
    };

    match cli.command {
        Command::Login(opt) => cli::login(&app, opt.code, opt.token, !opt.no_browser).await,
        Command::Logout => cli::logout(&app),
        Command::Status => cli::status(&app),
        Command::Request(opt) => cli::request(&app, &opt.method, &opt.path, opt.data).await,
        Command::Completions(_) => {}
    }
}
