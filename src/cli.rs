use std::error::Error;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use atty::Stream;
use clap::{Parser, Subcommand};
use rhyme_finder::datamuse::DEFAULT_ENDPOINT;
use rhyme_finder::{
    ClientConfig, DatamuseClient, Dispatcher, Output, QueryMode, QueryView, SavedWords, Session,
};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rhyme-finder", about = "Find rhymes and synonyms", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable listings.
    #[arg(long, global = true)]
    json: bool,

    /// Word service endpoint.
    #[arg(long, global = true, env = "RHYME_FINDER_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Request timeout in seconds.
    #[arg(long, global = true, default_value_t = 10)]
    timeout_secs: u64,

    /// Ask the service for at most this many results.
    #[arg(long, global = true)]
    max: Option<u32>,

    /// Log request details to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List words that rhyme with a term, grouped by syllable count.
    Rhyme {
        /// Word to find rhymes for.
        term: String,
    },
    /// List words with a similar meaning to a term.
    Synonym {
        /// Word to find synonyms for.
        term: String,
    },
    /// Start an interactive session with a saved-word list.
    Session,
    /// Serve the HTML front-end.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind the HTTP listener to.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        /// Page styling: bootstrap or tailwind.
        #[arg(long, default_value = "bootstrap")]
        theme: String,
        /// Public base URL used in links.
        #[arg(long)]
        base_url: Option<String>,
    },
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            max_results: self.max,
            ..ClientConfig::default()
        }
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client_config = cli.client_config();
    match cli.command {
        Command::Rhyme { term } => {
            init_tracing(cli.verbose, "warn");
            handle_lookup(client_config, QueryMode::Rhyme, &term, cli.json)
        }
        Command::Synonym { term } => {
            init_tracing(cli.verbose, "warn");
            handle_lookup(client_config, QueryMode::Synonym, &term, cli.json)
        }
        Command::Session => {
            init_tracing(cli.verbose, "warn");
            handle_session(client_config, cli.json)
        }
        #[cfg(feature = "web")]
        Command::Serve {
            addr,
            theme,
            base_url,
        } => {
            init_tracing(cli.verbose, "info");
            handle_serve(client_config, addr, &theme, base_url)
        }
    }
}

fn init_tracing(verbose: bool, default_level: &str) {
    let fallback = if verbose {
        "rhyme_finder=debug,tower_http=debug".to_string()
    } else {
        default_level.to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn build_dispatcher(config: ClientConfig) -> Result<Dispatcher, Box<dyn Error>> {
    let client = DatamuseClient::new(config)?;
    Ok(Dispatcher::new(Arc::new(client)))
}

fn current_thread_runtime() -> io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

fn handle_lookup(
    config: ClientConfig,
    mode: QueryMode,
    term: &str,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let dispatcher = build_dispatcher(config)?;
    let runtime = current_thread_runtime()?;
    let view = runtime.block_on(dispatcher.dispatch(mode, term));

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }
    if let Output::Failed { message } = &view.output {
        return Err(message.clone().into());
    }
    Ok(())
}

#[cfg(feature = "web")]
fn handle_serve(
    client_config: ClientConfig,
    addr: std::net::SocketAddr,
    theme: &str,
    base_url: Option<String>,
) -> Result<(), Box<dyn Error>> {
    use rhyme_finder::web::{WebConfig, WebTheme, serve};

    let theme: WebTheme = theme.parse()?;
    let config = WebConfig {
        addr,
        theme,
        base_url: base_url.unwrap_or_else(|| format!("http://{addr}")),
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, client_config))?;
    Ok(())
}

/// One parsed line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionCommand {
    Empty,
    Lookup(QueryMode, String),
    Save(Vec<usize>),
    ShowSaved,
    Help,
    Quit,
    Invalid(String),
}

fn parse_line(line: &str) -> SessionCommand {
    let line = line.trim();
    if line.is_empty() {
        return SessionCommand::Empty;
    }
    let Some(rest) = line.strip_prefix(':') else {
        // A bare line is the Enter shortcut for a rhyme lookup.
        return SessionCommand::Lookup(QueryMode::Rhyme, line.to_string());
    };
    let (command, argument) = match rest.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (rest, ""),
    };
    match command {
        "q" | "quit" | "exit" => SessionCommand::Quit,
        "h" | "help" => SessionCommand::Help,
        "saved" => SessionCommand::ShowSaved,
        "rhyme" | "r" | "syn" | "synonym" | "s" if argument.is_empty() => {
            SessionCommand::Invalid(format!(":{command} needs a word"))
        }
        "rhyme" | "r" => SessionCommand::Lookup(QueryMode::Rhyme, argument.to_string()),
        "syn" | "synonym" | "s" => SessionCommand::Lookup(QueryMode::Synonym, argument.to_string()),
        "save" => {
            let parsed: Result<Vec<usize>, _> =
                argument.split_whitespace().map(str::parse::<usize>).collect();
            match parsed {
                Ok(indices) if !indices.is_empty() => SessionCommand::Save(indices),
                Ok(_) => SessionCommand::Invalid(":save needs one or more item numbers".into()),
                Err(_) => SessionCommand::Invalid(format!("cannot parse item numbers {argument:?}")),
            }
        }
        other => SessionCommand::Invalid(format!("unknown command :{other} (try :help)")),
    }
}

const SESSION_HELP: &str = "\
Type a word and press Enter to list rhymes.
  :rhyme <word>    rhymes, grouped by syllable count
  :syn <word>      words with a similar meaning
  :save <n>...     save the numbered results
  :saved           show saved words
  :quit            leave the session";

fn handle_session(config: ClientConfig, as_json: bool) -> Result<(), Box<dyn Error>> {
    let dispatcher = build_dispatcher(config)?;
    let runtime = current_thread_runtime()?;
    let mut session = Session::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    if !as_json {
        println!("{SESSION_HELP}");
        print_saved(session.saved());
    }
    loop {
        if !as_json {
            print!("> ");
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        match parse_line(&line?) {
            SessionCommand::Empty => {}
            SessionCommand::Quit => break,
            SessionCommand::Help => println!("{SESSION_HELP}"),
            SessionCommand::ShowSaved => emit_saved(session.saved(), as_json)?,
            SessionCommand::Invalid(message) => eprintln!("{message}"),
            SessionCommand::Lookup(mode, term) => {
                if !as_json {
                    println!("loading...");
                }
                runtime.block_on(dispatcher.run(&mut session, mode, &term));
                if as_json {
                    println!("{}", serde_json::to_string(session.view())?);
                } else {
                    print_view(session.view());
                }
            }
            SessionCommand::Save(indices) => {
                for index in indices {
                    match session.save(index) {
                        Some(word) if !as_json => println!("saved {word}"),
                        Some(_) => {}
                        None => eprintln!("no result numbered {index}"),
                    }
                }
                emit_saved(session.saved(), as_json)?;
            }
        }
    }
    Ok(())
}

fn emit_saved(saved: &SavedWords, as_json: bool) -> Result<(), Box<dyn Error>> {
    if as_json {
        println!("{}", serde_json::to_string(&json!({ "saved": saved }))?);
    } else {
        print_saved(saved);
    }
    Ok(())
}

fn print_saved(saved: &SavedWords) {
    println!("Saved words: {saved}");
}

fn print_view(view: &QueryView) {
    if stdout_is_tty() {
        let skin = markdown_skin();
        let markdown = view_markdown(view);
        let formatted = FmtText::from(&skin, &markdown, Some(markdown_width()));
        println!("{formatted}");
    } else {
        print!("{}", view_plain(view));
    }
}

fn view_plain(view: &QueryView) -> String {
    let mut text = format!("{}\n", view.description);
    match &view.output {
        Output::Idle => {}
        Output::Loading => text.push_str("loading...\n"),
        Output::NoResult => text.push_str("(no result)\n"),
        Output::Failed { message } => text.push_str(&format!("lookup failed: {message}\n")),
        Output::Results { sections } => {
            for section in sections {
                if let Some(heading) = &section.heading {
                    text.push_str(heading);
                    text.push('\n');
                }
                for item in &section.items {
                    text.push_str(&format!("  [{}] {}\n", item.index, item.word));
                }
            }
        }
    }
    text
}

fn view_markdown(view: &QueryView) -> String {
    let mut text = format!("## {}\n\n", view.description);
    match &view.output {
        Output::Idle => {}
        Output::Loading => text.push_str("*loading...*\n"),
        Output::NoResult => text.push_str("*(no result)*\n"),
        Output::Failed { message } => text.push_str(&format!("**lookup failed:** {message}\n")),
        Output::Results { sections } => {
            for section in sections {
                if let Some(heading) = &section.heading {
                    text.push_str(&format!("### {heading}\n\n"));
                }
                for item in &section.items {
                    text.push_str(&format!("* `{:>3}` {}\n", item.index, item.word));
                }
                text.push('\n');
            }
        }
    }
    text
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}
