// varscope: browse the variables of a recorded debugger stop

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::info;
use tracing_subscriber::EnvFilter;

use varscope::config::Config;
use varscope::inspect::pretty::{breakpoint_summary, multiline};
use varscope::inspect::panels::evaluate_watch;
use varscope::inspect::{DisplayTree, LoadCoordinator, WatchExpr, Workspace, Wrapper};
use varscope::remote::replay::ReplayService;
use varscope::remote::{DebuggerService, LoadPolicy};
use varscope::scrollback::Scrollback;
use varscope::ui::App;

#[derive(Parser, Debug)]
#[command(version, about = "Browse the variables of a recorded debugger stop")]
struct Args {
    /// Recorded session (JSON)
    session: PathBuf,

    /// Configuration file with load limits and custom formatters
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to this file; filtered with RUST_LOG (default "info")
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print one expression and exit
    #[arg(short, long, value_name = "EXPR")]
    print: Option<String>,

    /// Print the stopped function with its arguments and exit
    #[arg(long)]
    summary: bool,
}

fn init_logging(path: &Path) -> io::Result<()> {
    let file = fs::File::create(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = &args.log_file {
        init_logging(path)?;
    }

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let service = ReplayService::from_file(&args.session)?;
    let scope = service.scope();
    info!(session = %args.session.display(), frames = service.frame_count(), "session loaded");

    let formatters = config.formatters();
    let policy = config.load_policy();

    if args.summary {
        let function = service.function_name(scope.frame).unwrap_or("?");
        let fn_args = service.list_function_args(scope, LoadPolicy::SHORT)?;
        println!("{}({})", function, breakpoint_summary(&formatters, fn_args));
        return Ok(());
    }

    if let Some(expr) = &args.print {
        let value = evaluate_watch(&service, scope, &WatchExpr::new(expr.as_str()), policy);
        let mut tree = DisplayTree::new(0);
        let id = Wrapper::new(&formatters, true).wrap(&mut tree, value, expr, expr);
        println!("{}", multiline(&tree, id, ""));
        return Ok(());
    }

    let frames: Vec<String> = (0..service.frame_count())
        .map(|i| service.function_name(i as i32).unwrap_or("?").to_string())
        .collect();

    let mut workspace = Workspace::new(formatters, policy, Scrollback::new());
    workspace.set_scope(scope);
    if let Err(e) = workspace.refresh_all(&service) {
        eprintln!("Warning: could not load variables: {}", e);
    }

    let service: Arc<dyn DebuggerService> = Arc::new(service);
    let (coordinator, events) = LoadCoordinator::new(service, Arc::new(Mutex::new(workspace)));

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create and run app
    let mut app = App::new(coordinator, events, frames);
    let res = app.run(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}
