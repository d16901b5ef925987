//! boardguard - command-line client for the board service.
//!
//! Logs in, keeps the session fresh and runs the navigation guard against a
//! path the way the web client's router would.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use boardguard_core::auth::{AuthState, LoginError, UnauthenticatedReason};
use boardguard_core::{
    AccessResolver, ApiClient, Config, FileCredentialStore, NavigationDecision, NavigationGuard,
    SessionManager,
};

/// Directory for an additional log file; unset means stderr only.
const LOG_DIR_ENV: &str = "BOARDGUARD_LOG_DIR";

const USAGE: &str = "\
Usage: boardguard <command>

Commands:
  login [username]   Sign in and store the session
  logout             Forget the stored session
  status             Show credential validity and expiry
  boards             List boards visible to the signed-in user
  tasks <board-id>   List a board's tasks, if the guard lets you in
  open <path>        Run the navigation guard for a path, e.g. /board/42/task";

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so the file writer flushes.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "boardguard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Everything a command needs, wired from the config.
struct Cli {
    config: Config,
    boards: ApiClient,
    session: Arc<SessionManager>,
    store: Arc<FileCredentialStore>,
}

impl Cli {
    fn build(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let store = Arc::new(
            FileCredentialStore::open(&cache_dir)
                .with_context(|| format!("Failed to open session store in {}", cache_dir.display()))?,
        );

        let api = ApiClient::new(&config.api_base_url, config.request_timeout())?;
        let boards = api.with_credentials(store.clone());
        let session = Arc::new(
            SessionManager::new(store.clone(), Arc::new(api)).with_renewal_timeout(config.renewal_timeout()),
        );

        Ok(Self {
            config,
            boards,
            session,
            store,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()?;
    info!(api = %config.api_base_url, command = %command, "boardguard starting");
    let ctx = Cli::build(config)?;

    match (command.as_str(), &args[1..]) {
        ("login", rest) => login(ctx, rest.first().cloned()).await,
        ("logout", []) => logout(&ctx).await,
        ("status", []) => status(&ctx),
        ("boards", []) => boards(&ctx).await,
        ("tasks", [board_id]) => tasks(&ctx, board_id).await,
        ("open", [path]) => open(&ctx, path).await,
        ("-h" | "--help" | "help", _) => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => bail!("Unrecognized arguments: {}\n\n{}", args.join(" "), USAGE),
    }
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

async fn login(mut ctx: Cli, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| ctx.config.last_username.clone()) {
        Some(name) => name,
        None => prompt_username()?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", username))?;

    match ctx.session.login(&username, &password).await {
        Ok(()) => {}
        Err(LoginError::Invalid(msg)) => bail!(msg),
        Err(e) => return Err(e.into()),
    }

    ctx.config.last_username = Some(username.trim().to_string());
    if let Err(e) = ctx.config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as {}", username.trim());
    Ok(())
}

async fn logout(ctx: &Cli) -> Result<()> {
    ctx.session.logout().await?;
    println!("Signed out");
    Ok(())
}

fn status(ctx: &Cli) -> Result<()> {
    let status = ctx.session.status();
    let describe = |valid: bool, remaining: Option<i64>| match (valid, remaining) {
        (true, Some(secs)) => format!("valid, expires in {}s", secs),
        (false, Some(_)) => "expired".to_string(),
        (_, None) => "missing".to_string(),
    };

    println!("Session file: {}", ctx.store.path().display());
    println!(
        "User:         {}",
        ctx.session.current_username().unwrap_or_else(|| "-".to_string())
    );
    println!(
        "Access:       {}",
        describe(status.is_access_valid, status.access_expires_in_sec)
    );
    println!(
        "Refresh:      {}",
        describe(status.is_refresh_valid, status.refresh_expires_in_sec)
    );
    Ok(())
}

async fn boards(ctx: &Cli) -> Result<()> {
    match ctx.session.ensure_authenticated().await? {
        AuthState::Authenticated => {}
        AuthState::Unauthenticated(UnauthenticatedReason::NoSession) => {
            bail!("Not signed in. Run `boardguard login` first.")
        }
        AuthState::Unauthenticated(UnauthenticatedReason::RefreshRejected) => {
            bail!("Session expired. Run `boardguard login` again.")
        }
    }

    let boards = ctx.boards.list_boards().await?;
    if boards.is_empty() {
        println!("No boards");
        return Ok(());
    }

    for board in boards {
        let visibility = if board.is_public() { "public" } else { "private" };
        println!("{:<24} {:<8} {:<16} {}", board.id, visibility, board.owner.name, board.name);
    }
    Ok(())
}

impl Cli {
    fn guard(&self) -> NavigationGuard {
        let resolver = Arc::new(AccessResolver::new(Arc::new(self.boards.clone())));
        NavigationGuard::new(self.session.clone(), resolver).with_landing_path(self.config.landing_path.clone())
    }
}

fn print_decision(path: &str, decision: &Option<NavigationDecision>) {
    match decision {
        Some(NavigationDecision::Proceed) => println!("proceed {}", path),
        Some(NavigationDecision::Redirect {
            target,
            query_redirect: Some(from),
        }) => println!("redirect {}?redirect={}", target, from),
        Some(NavigationDecision::Redirect { target, .. }) => println!("redirect {}", target),
        None => println!("superseded"),
    }
}

async fn open(ctx: &Cli, path: &str) -> Result<()> {
    let decision = ctx.guard().navigate(path).await;
    print_decision(path, &decision);
    Ok(())
}

async fn tasks(ctx: &Cli, board_id: &str) -> Result<()> {
    let path = format!("/board/{}/task", board_id);
    let decision = ctx.guard().navigate(&path).await;
    if decision != Some(NavigationDecision::Proceed) {
        print_decision(&path, &decision);
        return Ok(());
    }

    let tasks = ctx.boards.fetch_tasks(board_id).await?;
    if tasks.is_empty() {
        println!("No tasks");
        return Ok(());
    }

    for task in tasks {
        println!(
            "{:<6} {:<16} {:<24} {}",
            task.id,
            task.display_status(),
            task.display_assignees(),
            task.title
        );
    }
    Ok(())
}
