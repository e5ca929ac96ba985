// cppstep: step-by-step C++ execution with memory visualization

use std::io;
use std::path::PathBuf;

use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cppstep::program::{Program, demos};
use cppstep::ui::App;
use cppstep::{Error, Result, Simulation, SimulationConfig};

#[derive(Parser, Debug)]
#[command(name = "cppstep", version, about = "Step through a compiled C++ program")]
struct Cli {
    /// Compiled program as JSON
    #[arg(required_unless_present_any = ["demo", "list_demos"], conflicts_with = "demo")]
    program: Option<PathBuf>,

    /// Run a built-in demo instead of a program file
    #[arg(long)]
    demo: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Text queued for cin before the program starts
    #[arg(long)]
    stdin: Option<String>,

    /// Seed for rand() and fresh memory contents
    #[arg(long)]
    seed: Option<u64>,

    /// Run headless to completion and print the output
    #[arg(long)]
    run: bool,

    /// Take this many steps before showing the viewer
    #[arg(long, default_value_t = 0)]
    steps: usize,

    /// With --run, dump every event as JSON to stdout
    #[arg(long, requires = "run")]
    events_json: bool,

    /// List the built-in demos and exit
    #[arg(long)]
    list_demos: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.list_demos {
        for (name, about) in demos::DEMOS {
            println!("{:<12} {}", name, about);
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(stdin) = &cli.stdin {
        config.stdin = stdin.replace("\\n", "\n");
    }
    if let Some(seed) = cli.seed {
        config.random_seed = seed;
    }

    let program = load_program(&cli)?;
    let mut sim = Simulation::new(program, config)?;
    info!(functions = sim.program().functions.len(), "program loaded");

    if cli.run {
        sim.step_to_end();
        print!("{}", sim.console().output());
        if cli.events_json {
            let json = serde_json::to_string_pretty(sim.events().events()).map_err(Error::WriteEvents)?;
            println!("{}", json);
        }
        report_summary(&sim);
        return Ok(());
    }

    sim.step_forward(cli.steps);
    run_viewer(sim)
}

fn load_program(cli: &Cli) -> Result<Program> {
    if let Some(name) = &cli.demo {
        return demos::demo(name);
    }
    let path = cli.program.clone().ok_or(Error::NoProgram)?;
    let text = std::fs::read_to_string(&path).map_err(|source| Error::ReadFile { path, source })?;
    Ok(serde_json::from_str(&text)?)
}

fn report_summary(sim: &Simulation) {
    if sim.is_blocking_until_cin() {
        warn!("program is waiting for input on cin");
    }
    eprintln!("steps taken: {}", sim.steps_taken());
    if let Some(code) = sim.main_return_value() {
        eprintln!("main returned {}", code);
    }
    eprintln!("undefined behavior: {}", sim.total_ub());
    eprintln!("leaked heap objects: {}", sim.leaked_objects().len());
}

fn run_viewer(sim: Simulation) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(sim);
    let res = app.run(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Error::from)
}
