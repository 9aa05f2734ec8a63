pub mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{
        DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    fs,
    io::{self, stdin},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use typetrail::{
    analysis::{self, AttemptAnalysis},
    app_dirs::AppDirs,
    clock::{Clock, SystemClock},
    config::{Config, ConfigStore, FileConfigStore},
    engine::{Engine, Fact},
    event_log::EventLog,
    export,
    lifecycle::LifecycleConfig,
    logging,
    metrics::RateMode,
    remote::{DirRemoteStore, RemoteSync},
    runtime::{
        key_press, remote_notifier, AppEvent, AppEventSource, ChannelEventSource, FixedTicker,
        Runner, ThreadTickScheduler, Ticker,
    },
    sentences::{SentenceOrder, SentenceSet},
    session::Mode,
    storage::{LocalStore, SqliteStore},
    telemetry::Button,
};

const TICK_RATE_MS: u64 = 100;

/// typing-speed exercise with a local-first telemetry trail
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A typing-speed exercise that records every keystroke to a local event log and mirrors it to a remote store when one is reachable."
)]
pub struct Cli {
    /// number of seconds to run test
    #[clap(short = 's', long)]
    secs: Option<u64>,

    /// built-in sentence set to type
    #[clap(long)]
    sentences: Option<String>,

    /// JSON sentence set to load instead of a built-in one
    #[clap(long)]
    sentence_file: Option<PathBuf>,

    /// keep sentences in file order (remembered)
    #[clap(long, overrides_with = "shuffle")]
    no_shuffle: bool,

    /// shuffle sentences again after --no-shuffle
    #[clap(long, overrides_with = "no_shuffle")]
    shuffle: bool,

    /// seed for a reproducible sentence order
    #[clap(long)]
    seed: Option<u64>,

    /// posture the test is taken in
    #[clap(short = 'm', long, value_enum)]
    mode: Option<Mode>,

    /// participant label stamped on every event
    #[clap(short = 'n', long)]
    name: Option<String>,

    /// elapsed-time basis for wpm
    #[clap(long, value_enum)]
    rate_mode: Option<RateMode>,

    /// where exports are written
    #[clap(long)]
    export_dir: Option<PathBuf>,

    /// directory the remote mirror writes to
    #[clap(long)]
    remote_dir: Option<PathBuf>,

    /// never talk to the remote store (remembered)
    #[clap(long, overrides_with = "online")]
    offline: bool,

    /// mirror to the remote store again after --offline
    #[clap(long, overrides_with = "offline")]
    online: bool,

    /// write the stored event log to the export dir and exit
    #[clap(long)]
    export_log: bool,

    /// print per-mode analysis of exported session summaries and exit
    #[clap(long, num_args = 1..)]
    analyze: Vec<PathBuf>,
}

impl Cli {
    /// Flags win over the stored config; the result is saved back.
    fn apply(&self, cfg: &mut Config) {
        if let Some(secs) = self.secs {
            cfg.duration_secs = secs;
        }
        if let Some(set) = &self.sentences {
            cfg.sentence_set = set.clone();
            cfg.sentence_file = None;
        }
        if let Some(file) = &self.sentence_file {
            cfg.sentence_file = Some(file.clone());
        }
        if self.no_shuffle {
            cfg.shuffle = false;
        }
        if self.shuffle {
            cfg.shuffle = true;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if let Some(mode) = self.mode {
            cfg.mode = mode;
        }
        if let Some(rate_mode) = self.rate_mode {
            cfg.rate_mode = rate_mode;
        }
        if let Some(dir) = &self.export_dir {
            cfg.export_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.remote_dir {
            cfg.remote_dir = Some(dir.clone());
        }
        if self.offline {
            cfg.offline = true;
        }
        if self.online {
            cfg.offline = false;
        }
    }
}

fn lifecycle_config(cfg: &Config) -> typetrail::Result<LifecycleConfig> {
    let set = match &cfg.sentence_file {
        Some(path) => SentenceSet::from_file(path)?,
        None => SentenceSet::builtin(&cfg.sentence_set)?,
    };
    let order = match (cfg.shuffle, cfg.seed) {
        (false, _) => SentenceOrder::AsGiven,
        (true, Some(seed)) => SentenceOrder::Seeded(seed),
        (true, None) => SentenceOrder::Random,
    };
    Ok(LifecycleConfig {
        sentences: set.sentences,
        order,
        duration_secs: cfg.duration_secs,
        mode: cfg.mode,
        rate_mode: cfg.rate_mode,
    })
}

fn open_store() -> Arc<dyn LocalStore> {
    let opened = AppDirs::db_path().map(SqliteStore::open);
    match opened {
        Some(Ok(store)) => Arc::new(store),
        Some(Err(e)) => {
            tracing::error!(error = %e, "local_store_unavailable");
            eprintln!("local store unavailable ({e}); events will not outlive this run");
            Arc::new(typetrail::storage::MemoryStore::new())
        }
        None => Arc::new(typetrail::storage::MemoryStore::new()),
    }
}

fn run_export_log(store: Arc<dyn LocalStore>, dir: &Path) -> Result<(), Box<dyn Error>> {
    let events = EventLog::new(store).read_all();
    match export::export_events(&events, dir, SystemClock::new().wall())? {
        Some(path) => println!("exported {} events to {}", events.len(), path.display()),
        None => println!("No events to export yet."),
    }
    Ok(())
}

fn run_analysis(files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let mut analyses = Vec::with_capacity(files.len());
    for file in files {
        let summary = export::parse_summary(&fs::read_to_string(file)?)?;
        analyses.push(AttemptAnalysis::from_summary(&summary));
    }
    for group in analysis::summarize_by_mode(&analyses) {
        println!("{group}");
    }
    Ok(())
}

pub struct App {
    pub engine: Engine,
    pub participant_draft: Option<String>,
}

impl App {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            participant_draft: None,
        }
    }

    /// Returns true when the user asked to quit.
    pub fn on_key(&mut self, key: KeyEvent) -> typetrail::Result<bool> {
        if key.kind != KeyEventKind::Press {
            return Ok(false);
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('c') {
            return Ok(true);
        }

        if let Some(draft) = self.participant_draft.as_mut() {
            match key.code {
                KeyCode::Enter => {
                    let name = draft.clone();
                    self.participant_draft = None;
                    self.engine.handle(Fact::Participant(name))?;
                }
                KeyCode::Esc => self.participant_draft = None,
                KeyCode::Backspace => {
                    draft.pop();
                }
                KeyCode::Char(c) => draft.push(c),
                _ => {}
            }
            return Ok(false);
        }

        if self.engine.lifecycle().state().is_terminal() {
            match key.code {
                KeyCode::Esc => return Ok(true),
                KeyCode::Char('r') => self.engine.handle(Fact::Button(Button::Reset))?,
                KeyCode::Char('e') => self.engine.handle(Fact::Button(Button::ExportLog))?,
                KeyCode::Char('s') => self.engine.handle(Fact::Button(Button::ExportSummary))?,
                KeyCode::Char('p') => self.begin_participant_edit(),
                _ => {}
            }
            return Ok(false);
        }

        match key.code {
            KeyCode::Esc => return Ok(true),
            KeyCode::Tab => self.engine.handle(Fact::Button(Button::Start))?,
            KeyCode::Char('r') if ctrl => self.engine.handle(Fact::Button(Button::Reset))?,
            KeyCode::Char('e') if ctrl => self.engine.handle(Fact::Button(Button::ExportLog))?,
            KeyCode::Char('p') if ctrl => self.begin_participant_edit(),
            KeyCode::Char(c) if !ctrl => {
                let mut value = self.engine.lifecycle().input().to_string();
                value.push(c);
                self.engine.handle(Fact::Key(key_press(&key)))?;
                self.engine.handle(Fact::Input(value))?;
            }
            KeyCode::Backspace => {
                let mut value = self.engine.lifecycle().input().to_string();
                value.pop();
                self.engine.handle(Fact::Key(key_press(&key)))?;
                self.engine.handle(Fact::Input(value))?;
            }
            _ => self.engine.handle(Fact::Key(key_press(&key)))?,
        }
        Ok(false)
    }

    fn begin_participant_edit(&mut self) {
        self.participant_draft = Some(self.engine.ctx().participant.clone().unwrap_or_default());
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config_store = FileConfigStore::new();
    let mut config = config_store.load();
    cli.apply(&mut config);

    let _log_guard = match AppDirs::log_dir() {
        Some(dir) => logging::init_file_logging(&dir)?,
        None => None,
    };

    if !cli.analyze.is_empty() {
        return run_analysis(&cli.analyze);
    }

    let export_dir = config.export_dir.clone().unwrap_or_else(AppDirs::export_dir);
    let store = open_store();

    if cli.export_log {
        return run_export_log(store, &export_dir);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let lifecycle = lifecycle_config(&config)?;
    if let Err(e) = config_store.save(&config) {
        tracing::warn!(error = %e, "config_save_failed");
    }

    let source = ChannelEventSource::new().with_terminal_reader();
    let remote = match (config.offline, config.remote_dir.clone().or_else(AppDirs::remote_dir)) {
        (false, Some(dir)) => RemoteSync::spawn(DirRemoteStore::new(dir), remote_notifier(source.sender())),
        _ => RemoteSync::disabled(),
    };
    let mut engine = Engine::new(
        lifecycle,
        store,
        Arc::new(SystemClock::new()),
        remote,
        Box::new(ThreadTickScheduler::new(source.sender())),
        export_dir,
    );
    engine.sign_in();
    if let Some(name) = &cli.name {
        engine.handle(Fact::Participant(name.clone()))?;
    }
    tracing::info!(mode = %config.mode, secs = config.duration_secs, "app_start");

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(engine);
    let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(TICK_RATE_MS)));
    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend, E: AppEventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    loop {
        terminal.draw(|f| ui(app, f))?;

        match runner.step() {
            AppEvent::Tick | AppEvent::Resize => {}
            AppEvent::FocusGained => app.engine.handle(Fact::Focus)?,
            AppEvent::FocusLost => app.engine.handle(Fact::Blur)?,
            AppEvent::Fact(fact) => app.engine.handle(fact)?,
            AppEvent::Key(key) => {
                if app.on_key(key)? {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn ui(app: &mut App, f: &mut Frame) {
    f.render_widget(&*app, f.area());
}
