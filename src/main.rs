use checkout_callbacks::application::click::ClickProtocol;
use checkout_callbacks::application::payme::PaymeProtocol;
use checkout_callbacks::config::{
    ClickConfig, DEFAULT_PAYME_LOGIN, DEFAULT_PAYME_TIMEOUT_MS, EngineConfig, PaymeConfig,
};
use checkout_callbacks::domain::ports::{ClockRef, EffectsRef, SessionStoreRef};
use checkout_callbacks::infrastructure::clock::SystemClock;
use checkout_callbacks::infrastructure::effects::CheckoutCompletion;
use checkout_callbacks::infrastructure::in_memory::InMemorySessionStore;
#[cfg(feature = "storage-rocksdb")]
use checkout_callbacks::infrastructure::rocksdb::RocksDBStore;
use checkout_callbacks::infrastructure::signature::Md5SignatureVerifier;
use checkout_callbacks::interfaces::csv::session_reader::SessionReader;
use checkout_callbacks::interfaces::replay::{ReplayReader, Replayer};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Replays recorded Click and Payme callbacks against a set of checkout sessions.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sessions CSV file (id, correlation_id, amount, currency)
    sessions: PathBuf,

    /// Callbacks JSON-lines file, one recorded request per line
    callbacks: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    #[arg(long, env = "CLICK_SECRET_KEY")]
    click_secret_key: String,

    #[arg(long, env = "CLICK_SERVICE_ID")]
    click_service_id: Option<String>,

    #[arg(long, env = "PAYME_KEY")]
    payme_key: String,

    #[arg(long, env = "PAYME_LOGIN", default_value = DEFAULT_PAYME_LOGIN)]
    payme_login: String,

    /// Age after which an unperformed Payme transaction is cancelled
    #[arg(long, default_value_t = DEFAULT_PAYME_TIMEOUT_MS)]
    payme_timeout_ms: i64,

    /// Refuse CancelTransaction on performed Payme transactions
    #[arg(long)]
    payme_deny_refunds: bool,

    #[arg(long, default_value_t = 5_000)]
    effects_timeout_ms: u64,
}

fn open_store(db_path: Option<PathBuf>) -> Result<SessionStoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            info!(path = %path.display(), "Opening RocksDB session store");
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemorySessionStore::new()))
        }
        None => Ok(Arc::new(InMemorySessionStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let store = open_store(cli.db_path)?;

    // Sessions already present in a persistent store keep their state.
    let file = File::open(&cli.sessions).into_diagnostic()?;
    let mut seeded = 0usize;
    for session in SessionReader::new(file).sessions() {
        match session {
            Ok(session) => {
                if store.get(&session.id).await.into_diagnostic()?.is_none() {
                    store.insert(session).await.into_diagnostic()?;
                    seeded += 1;
                }
            }
            Err(e) => error!(error = %e, "Skipping unreadable session row"),
        }
    }
    info!(seeded, "Sessions loaded");

    let clock: ClockRef = Arc::new(SystemClock);
    let effects: EffectsRef = Arc::new(CheckoutCompletion::new(store.clone(), clock.clone()));
    let engine = EngineConfig {
        effects_timeout: Duration::from_millis(cli.effects_timeout_ms),
        ..EngineConfig::default()
    };

    let mut click_config = ClickConfig::new(cli.click_secret_key);
    if let Some(service_id) = cli.click_service_id {
        click_config = click_config.with_service_id(service_id);
    }
    let payme_config = PaymeConfig::new(cli.payme_key)
        .with_login(cli.payme_login)
        .with_transaction_timeout_ms(cli.payme_timeout_ms)
        .with_cancel_after_perform(!cli.payme_deny_refunds);

    let replayer = Replayer::new(
        ClickProtocol::new(
            click_config,
            store.clone(),
            Arc::new(Md5SignatureVerifier::new()),
            effects.clone(),
            &engine,
        ),
        PaymeProtocol::new(payme_config, store, clock, effects, &engine),
    );

    let file = File::open(&cli.callbacks).into_diagnostic()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in ReplayReader::new(BufReader::new(file)).records() {
        match record {
            Ok(record) => {
                let response = replayer.replay(&record).await.into_diagnostic()?;
                writeln!(out, "{}", response).into_diagnostic()?;
            }
            Err(e) => error!(error = %e, "Skipping unreadable callback"),
        }
    }
    out.flush().into_diagnostic()?;

    Ok(())
}
