use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{
        DisableBracketedPaste, EnableBracketedPaste, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    tty::IsTty,
};
use handterm::{
    app::{Control, HandTerm},
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    content::Catalog,
    location::Location,
    runtime::{CrosstermEventSource, FixedTicker, KeyTrigger, Runner},
    store::{MemoryStore, SqliteStore, Store},
    ui,
};
use log::info;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::{self, OpenOptions},
    io::{self, stdin},
    path::PathBuf,
    rc::Rc,
    time::Duration,
};

const TICK_RATE_MS: u64 = 100;

/// typing tutor and chorded-keyboard practice console
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Practice typing phrases with per-character timing, work through the tutorial and unlock games."
)]
pub struct Cli {
    /// where to start, e.g. /tutorial/fdsa?group=home-row or /normal
    #[clap(short = 'u', long, default_value = "")]
    url: String,

    /// keep logs, files and progress in memory only
    #[clap(short = 'e', long)]
    ephemeral: bool,

    /// database file to use instead of the default
    #[clap(long)]
    store: Option<PathBuf>,

    /// number of slowest characters to show after each phrase
    #[clap(short = 's', long)]
    slowest: Option<usize>,

    /// log level used when RUST_LOG is unset
    #[clap(long)]
    log_level: Option<String>,

    /// write the effective settings to the config file and continue
    #[clap(long)]
    save_config: bool,
}

impl Cli {
    /// Flags given on the command line win over the config file.
    fn apply(&self, mut config: Config) -> Config {
        if self.ephemeral {
            config.ephemeral = true;
        }
        if let Some(path) = &self.store {
            config.store_path = Some(path.clone());
        }
        if let Some(count) = self.slowest {
            config.slowest_count = count;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config
    }
}

fn init_logging(config: &Config) -> io::Result<()> {
    // The terminal belongs to the UI, so logs go to a file or nowhere.
    let Some(path) = AppDirs::log_path().filter(|_| !config.ephemeral) else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(config.log_filter());
    }
    builder
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn open_store(config: &Config) -> Result<Rc<dyn Store>, Box<dyn Error>> {
    match config.resolved_store_path() {
        Some(path) => {
            info!("using store {}", path.display());
            Ok(Rc::new(SqliteStore::open(path)?))
        }
        None => {
            info!("using in-memory store");
            Ok(Rc::new(MemoryStore::new()))
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let config_store = FileConfigStore::new();
    let config = cli.apply(config_store.load());
    if cli.save_config {
        config_store.save(&config)?;
    }
    init_logging(&config)?;

    let store = open_store(&config)?;
    let catalog = Catalog::embedded()?;
    let location = Location::parse(&cli.url);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;

    let enhanced = supports_keyboard_enhancement().unwrap_or(false);
    if enhanced {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    }

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = HandTerm::new(&config, &location, store, Box::new(catalog))
        .with_trigger(KeyTrigger::for_enhancement(enhanced));
    let result = start_tui(&mut terminal, &mut app);

    if enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut HandTerm,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    terminal.draw(|f| ui::draw(&*app, f))?;
    loop {
        match app.on_event(runner.step()) {
            Control::Quit => break,
            Control::Redraw => {
                terminal.draw(|f| ui::draw(&*app, f))?;
            }
            Control::Continue => {}
        }
    }

    info!("exiting from {}", app.activity());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["handterm"]).unwrap();
        assert_eq!(cli.url, "");
        assert!(!cli.ephemeral);
        assert_eq!(cli.slowest, None);
        assert!(!cli.save_config);
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "handterm",
            "--url",
            "/game?group=reach",
            "-e",
            "-s",
            "5",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let config = cli.apply(Config::default());

        assert_eq!(cli.url, "/game?group=reach");
        assert!(config.ephemeral);
        assert_eq!(config.slowest_count, 5);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.resolved_store_path(), None);
    }

    #[test]
    fn test_cli_keeps_config_values_when_unset() {
        let cli = Cli::try_parse_from(["handterm"]).unwrap();
        let base = Config {
            slowest_count: 9,
            store_path: Some(PathBuf::from("/tmp/h.db")),
            ..Config::default()
        };
        assert_eq!(cli.apply(base.clone()), base);
    }

    #[test]
    fn test_cli_store_path() {
        let cli = Cli::try_parse_from(["handterm", "--store", "/tmp/x.db"]).unwrap();
        let config = cli.apply(Config::default());
        assert_eq!(config.resolved_store_path(), Some(PathBuf::from("/tmp/x.db")));
    }

    #[test]
    fn test_ephemeral_store_is_in_memory() {
        let config = Config {
            ephemeral: true,
            ..Config::default()
        };
        let store = open_store(&config).unwrap();
        assert!(store.put_file("a", "b").is_success());
    }
}
