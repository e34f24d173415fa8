// tracescope: step through model-generated execution traces

mod cli;

use std::fs;
use std::io;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use ratatui::{backend::CrosstermBackend, Terminal};

use cli::Args;
use tracescope::analyzer::{AnalyzeRequest, Analyzer};
use tracescope::generator;
use tracescope::ui::App;

fn init_logging(args: &Args) -> Result<()> {
    let default_filter = if args.verbose { "debug" } else { "warn" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));

    match &args.log_file {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("cannot create log file '{}'", path.display()))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        // Log lines would corrupt the TUI
        None if !args.json => {
            builder.filter_level(log::LevelFilter::Off);
        }
        None => {}
    }

    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("cannot read '{}'", args.file.display()))?;
    let language = args.language()?;

    let llm = args.llm_config();
    let playback = args.playback_config();
    playback.validate()?;

    let generator = generator::from_config(&llm)?;
    let analyzer = Analyzer::new(generator);
    let request = AnalyzeRequest::new(language, source, args.session.clone());
    let runtime = tokio::runtime::Runtime::new().context("cannot start async runtime")?;

    if args.json {
        let analysis = match runtime.block_on(analyzer.analyze(&request)) {
            Ok(analysis) => analysis,
            Err(e) => bail!("{}", e.to_body()),
        };
        for violation in &analysis.violations {
            info!("repaired: {}", violation);
        }
        println!("{}", analysis.trace.to_json_pretty()?);
        return Ok(());
    }

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(
        analyzer,
        request,
        args.file.clone(),
        playback,
        runtime.handle().clone(),
    );
    let res = app.run(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.context("terminal UI failed")
}
