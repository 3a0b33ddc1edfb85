use std::error::Error;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use atty::Stream;
use clap::{Args, Parser, Subcommand};
use rc_vocab_rs::client::{ClientController, ClientState, HeadlessPlatform, ToastKind};
use rc_vocab_rs::offline::{CACHE_NAME, CacheStorage, OfflineWorker, ReqwestFetcher};
use rc_vocab_rs::render;
use rc_vocab_rs::storage::{FileStore, KeyValueStore, KeyValueStoreExt, OFFLINE_CACHE_KEY};
use rc_vocab_rs::transport::{ApiTransport, HttpTransport};
use rc_vocab_rs::vocab::VocabularyItem;
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rc-vocab-rs",
    about = "Reading-comprehension vocabulary assistant",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Emit the rendered HTML view instead of tables.
    #[arg(long, global = true, conflicts_with = "json")]
    html: bool,

    /// Base URL of the proxy server used by client commands.
    #[arg(
        long,
        global = true,
        env = "RC_VOCAB_SERVER",
        default_value = "http://127.0.0.1:3000"
    )]
    server: String,

    /// Local storage file; defaults to the platform data directory.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proxy server.
    #[cfg(feature = "web")]
    Serve(ServeArgs),
    /// Extract vocabulary from a passage.
    Analyze {
        #[command(flatten)]
        input: PassageInput,
        /// Only show cards whose word or meaning contains this text.
        #[arg(long)]
        search: Option<String>,
        /// Save these words from the result.
        #[arg(long = "save", value_name = "WORD")]
        save: Vec<String>,
        /// Show the detail panel for one word.
        #[arg(long)]
        open: Option<String>,
        /// Copy every `word: meaning` line and print it.
        #[arg(long)]
        copy_all: bool,
    },
    /// Summarize a passage in 2-3 sentences.
    Summary {
        #[command(flatten)]
        input: PassageInput,
    },
    /// Analyze a passage and build a multiple-choice quiz from its vocabulary.
    Quiz {
        #[command(flatten)]
        input: PassageInput,
        /// Comma-separated answers (a-d), one per question, to be scored.
        #[arg(long, value_delimiter = ',')]
        answers: Vec<String>,
    },
    /// Manage saved words.
    #[command(subcommand)]
    Saved(SavedCommand),
    /// Toggle between light and dark theme.
    Theme,
    /// Toggle between beginner and advanced meanings.
    Mode,
    /// Check that the proxy server is reachable.
    Health,
}

#[derive(Subcommand, Debug)]
enum SavedCommand {
    /// List saved words.
    List,
    /// Remove a saved word.
    Remove { word: String },
    /// Remove every saved word.
    Clear,
}

#[derive(Args, Debug)]
struct PassageInput {
    /// Passage text; `-` or omitted reads standard input.
    passage: Option<String>,
    /// Read the passage from a file.
    #[arg(long, conflicts_with = "passage")]
    file: Option<PathBuf>,
}

#[cfg(feature = "web")]
#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "RC_VOCAB_MODEL", default_value = rc_vocab_rs::llm::DEFAULT_MODEL)]
    model: String,
    #[arg(long, env = "RC_VOCAB_API_BASE", default_value = rc_vocab_rs::llm::DEFAULT_API_BASE)]
    api_base: String,
    #[arg(long, env = "APP_ENV", default_value = "development")]
    environment: String,
}

type Controller = ClientController<HttpTransport<ReqwestFetcher>, Arc<FileStore>>;

struct Session {
    runtime: Runtime,
    controller: Controller,
    cache: Arc<CacheStorage>,
    platform: Arc<HeadlessPlatform>,
}

pub fn run() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let output = Output {
        json: cli.json,
        html: cli.html,
    };
    match cli.command {
        #[cfg(feature = "web")]
        Command::Serve(args) => handle_serve(args),
        command => {
            init_tracing("warn");
            let prepare = talks_to_proxy(&command);
            let mut session = open_session(&cli.server, cli.store, prepare)?;
            let result = dispatch(&mut session, command, output);
            session.close();
            result
        }
    }
}

fn dispatch(session: &mut Session, command: Command, output: Output) -> Result<(), Box<dyn Error>> {
    match command {
        #[cfg(feature = "web")]
        Command::Serve(_) => Err("serve does not run inside a client session".into()),
        Command::Analyze {
            input,
            search,
            save,
            open,
            copy_all,
        } => handle_analyze(session, input.read()?, search, save, open, copy_all, output),
        Command::Summary { input } => handle_summary(session, input.read()?, output),
        Command::Quiz { input, answers } => handle_quiz(session, input.read()?, answers, output),
        Command::Saved(command) => handle_saved(session, command, output),
        Command::Theme => {
            let theme = session.controller.toggle_theme();
            report(session, output, json!({ "theme": theme.to_string() }), || {
                println!("Theme: {theme}")
            })
        }
        Command::Mode => {
            let mode = session.controller.toggle_mode();
            report(session, output, json!({ "mode": mode.as_str() }), || {
                println!("Mode: {mode}")
            })
        }
        Command::Health => {
            let healthy = session
                .runtime
                .block_on(session.controller.transport().health())?;
            if output.json {
                println!("{}", json!({ "status": if healthy { "ok" } else { "unhealthy" } }));
            } else {
                println!("Server: {}", if healthy { "ok" } else { "unhealthy" });
            }
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
    html: bool,
}

impl PassageInput {
    fn read(self) -> Result<String, Box<dyn Error>> {
        if let Some(path) = self.file {
            return Ok(fs::read_to_string(&path)
                .map_err(|err| format!("Failed to read {}: {err}", path.display()))?);
        }
        match self.passage {
            Some(text) if text != "-" => Ok(text),
            _ => Ok(io::read_to_string(io::stdin())?),
        }
    }
}

#[cfg(feature = "web")]
fn handle_serve(args: ServeArgs) -> Result<(), Box<dyn Error>> {
    use rc_vocab_rs::llm::GroqConfig;
    use rc_vocab_rs::web::{WebConfig, serve};
    use std::net::ToSocketAddrs;

    init_tracing("info");
    let addr = (args.host.as_str(), args.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| format!("Cannot resolve {}:{}", args.host, args.port))?;
    let config = WebConfig {
        addr,
        environment: args.environment,
        model: GroqConfig {
            api_key: args.api_key.filter(|key| !key.trim().is_empty()),
            api_base: args.api_base,
            model: args.model,
            ..GroqConfig::default()
        },
    };
    let runtime = Runtime::new()?;
    runtime.block_on(serve(config))?;
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("rc-vocab")
        .join("local-storage.json")
}

/// Commands that reach the proxy and so warm the offline cache first.
fn talks_to_proxy(command: &Command) -> bool {
    matches!(
        command,
        Command::Analyze { .. } | Command::Summary { .. } | Command::Quiz { .. } | Command::Health
    )
}

fn open_session(
    server: &str,
    store: Option<PathBuf>,
    prepare_offline: bool,
) -> Result<Session, Box<dyn Error>> {
    let store = Arc::new(FileStore::open(store.unwrap_or_else(default_store_path))?);
    let cache = Arc::new(CacheStorage::restore(
        store.load(OFFLINE_CACHE_KEY).unwrap_or_default(),
    ));
    let worker = OfflineWorker::new(ReqwestFetcher::new(server), cache.clone());
    let platform = Arc::new(HeadlessPlatform::default());
    let controller = ClientController::load(HttpTransport::new(worker), store, platform.clone());
    let runtime = Runtime::new()?;
    if prepare_offline && !cache.keys().iter().any(|name| name == CACHE_NAME) {
        runtime.block_on(controller.prepare_offline());
    }
    Ok(Session {
        runtime,
        controller,
        cache,
        platform,
    })
}

impl Session {
    /// Flushes pending toasts and writes the offline cache back to the store.
    fn close(mut self) {
        print_toasts(&mut self.controller);
        if let Err(err) = self
            .controller
            .store()
            .store(OFFLINE_CACHE_KEY, &self.cache.snapshot())
        {
            eprintln!("warning: offline cache not saved: {err}");
        }
    }
}

fn print_toasts(controller: &mut Controller) {
    for toast in controller.take_toasts() {
        let label = match toast.kind {
            ToastKind::Success => "ok",
            ToastKind::Error => "error",
            ToastKind::Info => "info",
        };
        eprintln!("[{label}] {}", toast.message);
    }
}

/// Prints `payload` as JSON, the page as HTML, or falls back to `human`.
fn report(
    session: &Session,
    output: Output,
    payload: serde_json::Value,
    human: impl FnOnce(),
) -> Result<(), Box<dyn Error>> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if output.html {
        println!("{}", render::render_page(session.controller.state())?);
    } else {
        human();
    }
    Ok(())
}

fn handle_analyze(
    session: &mut Session,
    passage: String,
    search: Option<String>,
    save: Vec<String>,
    open: Option<String>,
    copy_all: bool,
    output: Output,
) -> Result<(), Box<dyn Error>> {
    session.controller.set_passage(passage);
    if !session.runtime.block_on(session.controller.analyze()) {
        print_toasts(&mut session.controller);
        return Err("Analysis failed".into());
    }
    if let Some(term) = search {
        session.controller.search(term);
    }
    for word in save_words(&mut session.controller, &save) {
        eprintln!("warning: {word:?} is not in this passage's vocabulary");
    }
    if let Some(word) = &open {
        if !session.controller.open_highlighted(word) {
            eprintln!("warning: {word:?} is not in this passage's vocabulary");
        }
    }
    if copy_all {
        session.controller.copy_all();
    }

    let state = session.controller.state();
    let payload = json!({
        "vocabulary": state.visible_vocabulary(),
        "stats": state.stats,
        "passage": state.analyzed_passage,
    });
    report(session, output, payload, || {
        print_analysis(state);
        if let Some(item) = &state.selected {
            print_word_detail(item, state.saved.contains(&item.word));
        }
        if copy_all {
            if let Some(text) = session.platform.clipboard() {
                println!("\n{text}");
            }
        }
    })
}

/// Saves each word that is not saved yet. Returns the words that matched nothing.
fn save_words<T: ApiTransport, S: KeyValueStore>(
    controller: &mut ClientController<T, S>,
    words: &[String],
) -> Vec<String> {
    words
        .iter()
        .filter(|word| controller.save_word(word).is_none())
        .cloned()
        .collect()
}

fn handle_summary(
    session: &mut Session,
    passage: String,
    output: Output,
) -> Result<(), Box<dyn Error>> {
    session.controller.set_passage(passage);
    if !session.runtime.block_on(session.controller.generate_summary()) {
        print_toasts(&mut session.controller);
        return Err("Summary failed".into());
    }
    let summary = session.controller.state().summary.clone().unwrap_or_default();
    report(session, output, json!({ "summary": summary }), || {
        render_markdown_block("Summary", &summary)
    })
}

fn handle_quiz(
    session: &mut Session,
    passage: String,
    answers: Vec<String>,
    output: Output,
) -> Result<(), Box<dyn Error>> {
    session.controller.set_passage(passage);
    if !session.runtime.block_on(session.controller.analyze()) {
        print_toasts(&mut session.controller);
        return Err("Analysis failed".into());
    }
    if !session.runtime.block_on(session.controller.generate_quiz()) {
        print_toasts(&mut session.controller);
        return Err("Quiz generation failed".into());
    }

    for (question, answer) in answers.iter().enumerate() {
        let option = parse_option_letter(answer)?;
        session.controller.answer_question(question, option);
    }

    let Some(quiz) = session.controller.state().quiz.clone() else {
        return Err("No quiz was generated".into());
    };
    let (correct, answered) = quiz.score();
    let payload = json!({
        "quiz": quiz.questions,
        "chosen": quiz.chosen,
        "score": { "correct": correct, "answered": answered },
    });
    report(session, output, payload, || {
        for (index, (question, chosen)) in quiz.questions.iter().zip(&quiz.chosen).enumerate() {
            println!("\nQuestion {}: {}", index + 1, question.question);
            for (option, text) in question.options.iter().enumerate() {
                let marker = match chosen {
                    Some(picked) if *picked == option && question.is_correct(option) => "  ✔",
                    Some(picked) if *picked == option => "  ✘",
                    Some(_) if question.is_correct(option) => "  ←",
                    _ => "",
                };
                println!("  {}) {text}{marker}", option_letter(option));
            }
        }
        if answered > 0 {
            println!("\nScore: {correct}/{answered}");
        }
    })
}

fn handle_saved(
    session: &mut Session,
    command: SavedCommand,
    output: Output,
) -> Result<(), Box<dyn Error>> {
    match command {
        SavedCommand::List => {}
        SavedCommand::Remove { word } => {
            if !session.controller.state().saved.contains(&word) {
                return Err(format!("{word:?} is not saved").into());
            }
            session.controller.toggle_save_word(&word);
        }
        SavedCommand::Clear => session.controller.clear_saved(),
    }
    let saved: Vec<&VocabularyItem> = session.controller.state().saved.iter().collect();
    report(session, output, json!({ "savedWords": saved }), || {
        print_saved_table(&saved)
    })
}

fn option_letter(index: usize) -> char {
    (b'a' + index as u8) as char
}

fn parse_option_letter(answer: &str) -> Result<usize, Box<dyn Error>> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "a" => Ok(0),
        "b" => Ok(1),
        "c" => Ok(2),
        "d" => Ok(3),
        other => Err(format!("Answer {other:?} must be one of a, b, c, d").into()),
    }
}

fn print_analysis(state: &ClientState) {
    if let Some(stats) = &state.stats {
        println!(
            "Vocabulary words: {}  Total words: {}  Difficulty score: {}",
            stats.total_words, stats.word_count, stats.difficulty_score
        );
        println!(
            "Easy: {}  Medium: {}  Hard: {}\n",
            stats.easy_count, stats.medium_count, stats.hard_count
        );
    }
    let rows = state.visible_vocabulary();
    if rows.is_empty() {
        println!("No vocabulary words found.");
        return;
    }
    let width = rows
        .iter()
        .map(|item| item.word.chars().count())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    println!("{:<width$}  {:<10}  {}", "WORD", "DIFFICULTY", "MEANING", width = width);
    println!("{:-<width$}  {:-<10}  {}", "", "", "-------", width = width);
    for item in rows {
        let saved = if state.saved.contains(&item.word) { " ♥" } else { "" };
        println!(
            "{:<width$}  {:<10}  {}{}",
            item.word,
            item.difficulty.label(),
            item.meaning,
            saved,
            width = width
        );
    }
}

fn print_word_detail(item: &VocabularyItem, saved: bool) {
    println!("\n{} ({})", item.word, item.difficulty);
    println!("{}", item.meaning);
    if saved {
        println!("Saved");
    }
}

fn print_saved_table(rows: &[&VocabularyItem]) {
    if rows.is_empty() {
        println!("No saved words.");
        return;
    }
    let width = rows
        .iter()
        .map(|item| item.word.chars().count())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    println!("{:<width$}  {}", "WORD", "MEANING", width = width);
    println!("{:-<width$}  {}", "", "-------", width = width);
    for item in rows {
        println!("{:<width$}  {}", item.word, item.meaning, width = width);
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("{title}:");
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
