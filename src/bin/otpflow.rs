//! Otpflow CLI: inspect persisted state and run the extraction engine.
//!
//! Usage:
//!   otpflow extract [--file path] [--keywords k1,k2] [--json]
//!   otpflow state <subcommand> [--db path]

use clap::{Parser, Subcommand};
use otpflow::{ExtractionEngine, OpenStore, SqliteStore, StateStore};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "otpflow", version, about = "One-time-passcode handoff engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the extraction engine over a file (or stdin) and print the result
    Extract {
        /// Path to a text file; stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
        /// Extra comma-separated topic keywords (service names)
        #[arg(long)]
        keywords: Option<String>,
        /// Print the candidate as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or modify persisted state
    State {
        #[command(subcommand)]
        action: StateAction,
        /// Path to the state database file
        #[arg(long, global = true)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum StateAction {
    /// Show the persisted automation config, snapshot, and used codes
    Show,
    /// Update the automation toggles
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        auto_submit: Option<bool>,
    },
    /// Drop every persisted record
    Clear,
}

/// Get the default database path (~/.local/share/otpflow/otpflow.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let otpflow_dir = data_dir.join("otpflow");
    std::fs::create_dir_all(&otpflow_dir).ok();
    otpflow_dir.join("otpflow.db")
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteStore, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))
}

fn cmd_extract(file: Option<PathBuf>, keywords: Option<String>, json: bool) -> i32 {
    let text = match file {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Error: cannot read '{}': {}", path.display(), e);
                return 1;
            }
        },
        None => {
            let mut buf = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
                eprintln!("Error: cannot read stdin: {}", e);
                return 1;
            }
            buf
        }
    };

    let mut engine = ExtractionEngine::new();
    if let Some(keywords) = keywords {
        engine = engine.with_topic_keywords(keywords.split(',').map(|k| k.trim().to_string()));
    }

    match engine.extract_text(&text) {
        Some(candidate) => {
            if json {
                match serde_json::to_string_pretty(&candidate) {
                    Ok(out) => println!("{}", out),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return 1;
                    }
                }
            } else {
                println!("code: {}", candidate.code);
                match candidate.source_timestamp {
                    Some(ts) => println!("source time: {}", ts.to_rfc3339()),
                    None => println!("source time: unknown"),
                }
            }
            0
        }
        None => {
            println!("No code found.");
            1
        }
    }
}

fn cmd_state_show(store: &SqliteStore) -> i32 {
    let config = match store.load_automation() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    println!("enabled:        {}", config.enabled);
    println!("auto-submit:    {}", config.auto_submit_enabled);

    match store.load_snapshot() {
        Ok(Some(record)) => {
            println!("current code:   {} (valid: {})", record.code, record.valid);
            println!("captured at:    {}", record.captured_at.to_rfc3339());
            match record.source_timestamp {
                Some(ts) => println!("source time:    {}", ts.to_rfc3339()),
                None => println!("source time:    unknown"),
            }
        }
        Ok(None) => println!("current code:   none"),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    match store.load_used_codes() {
        Ok(codes) if codes.is_empty() => println!("used codes:     none"),
        Ok(codes) => {
            let mut codes: Vec<_> = codes.into_iter().collect();
            codes.sort();
            println!("used codes:     {}", codes.join(", "));
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }
    0
}

fn cmd_state_set(store: &SqliteStore, enabled: Option<bool>, auto_submit: Option<bool>) -> i32 {
    let mut config = match store.load_automation() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Some(enabled) = enabled {
        config.enabled = enabled;
    }
    if let Some(auto_submit) = auto_submit {
        config.auto_submit_enabled = auto_submit;
    }
    match store.save_automation(&config) {
        Ok(()) => {
            println!(
                "enabled: {}, auto-submit: {}",
                config.enabled, config.auto_submit_enabled
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_state_clear(store: &SqliteStore) -> i32 {
    match store.clear_all() {
        Ok(()) => {
            println!("Cleared all persisted state.");
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Extract {
            file,
            keywords,
            json,
        } => cmd_extract(file, keywords, json),
        Commands::State { action, db } => {
            let store = match open_store(db) {
                Ok(store) => store,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            match action {
                StateAction::Show => cmd_state_show(&store),
                StateAction::Set {
                    enabled,
                    auto_submit,
                } => cmd_state_set(&store, enabled, auto_submit),
                StateAction::Clear => cmd_state_clear(&store),
            }
        }
    };
    std::process::exit(code);
}
