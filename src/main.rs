use clap::{Parser, Subcommand};
use ledger_indexer::config::{AppConfig, ConfigError};
use ledger_indexer::decoder::DecoderRegistry;
use ledger_indexer::enrichment::{DecodeClient, EnrichmentError, EnrichmentWorker};
use ledger_indexer::lease::{self, LeaseError};
use ledger_indexer::ledger::{LedgerClient, LedgerError};
use ledger_indexer::logging::init_logging;
use ledger_indexer::store::{self, Store, StoreError};
use ledger_indexer::sync::{EngineExit, EngineState, EventPublisher, SyncEngine, SyncError};
use ledger_indexer::task::TaskControl;
use ledger_indexer::utils::generate_instance_id;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, trace, warn};

#[derive(Parser)]
#[command(name = "ledger-indexer")]
#[command(about = "Indexes a Cosmos-style ledger into a relational store and enriches shielded transfers")]
#[command(version)]
struct Cli {
	/// Path to the TOML configuration file
	#[arg(short, long, default_value = "config.toml", global = true)]
	config: PathBuf,

	/// Database URL, overrides `[database] url`
	#[arg(long, env = "DATABASE_URL", global = true)]
	database_url: Option<String>,

	/// Enable verbose debug logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Run the sync engine and the enrichment worker together
	Run,
	/// Run only the sync engine
	Sync,
	/// Run only the enrichment worker
	Enrich,
	/// Drop everything above a height and move the checkpoint back to it
	Resync {
		/// Last height to keep
		#[arg(long)]
		height: u64,
	},
	/// Move failed enrichment records back to pending
	RequeueFailed,
	/// Print the checkpoint and enrichment counts
	Status,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error("Lease error: {0}")]
	Lease(#[from] LeaseError),

	#[error("Ledger client error: {0}")]
	Ledger(#[from] LedgerError),

	#[error("Sync error: {0}")]
	Sync(#[from] SyncError),

	#[error("Enrichment error: {0}")]
	Enrichment(#[from] EnrichmentError),

	#[error("Lease {0} is held by another instance")]
	LeaseHeld(String),
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	let mut config = match AppConfig::load(&cli.config) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("Failed to load {}: {}", cli.config.display(), e);
			return ExitCode::from(1);
		}
	};
	if let Some(url) = cli.database_url {
		config.database.url = url;
	}
	if cli.verbose {
		config.logging.level = "debug".to_string();
	}
	init_logging(&config.logging);

	match execute(cli.command, config).await {
		Ok(EngineExit::Halted(reason)) => {
			error!("Sync halted: {}", reason);
			ExitCode::from(2)
		}
		Ok(_) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{}", e);
			ExitCode::from(1)
		}
	}
}

async fn execute(command: Commands, config: AppConfig) -> Result<EngineExit, CliError> {
	let store = store::open(&config.database).await?;

	match command {
		Commands::Run => run(config, store, true).await,
		Commands::Sync => run(config, store, false).await,
		Commands::Enrich => {
			let control = stop_on_ctrl_c();
			enrichment_worker(&config, store)?.run(&control).await;
			Ok(EngineExit::Stopped)
		}
		Commands::Resync { height } => {
			resync(&config, store.as_ref(), height).await?;
			Ok(EngineExit::Stopped)
		}
		Commands::RequeueFailed => {
			let moved = store.requeue_failed_enrichments().await?;
			info!("Requeued {} failed enrichment records", moved);
			println!("requeued: {moved}");
			Ok(EngineExit::Stopped)
		}
		Commands::Status => {
			let checkpoint = store.checkpoint().await?;
			let counts = store.enrichment_counts().await?;
			match checkpoint {
				Some(height) => println!("checkpoint: {height}"),
				None => println!("checkpoint: none"),
			}
			println!(
				"enrichment: pending {} ok {} failed {}",
				counts.pending, counts.ok, counts.failed
			);
			Ok(EngineExit::Stopped)
		}
	}
}

/// Run the sync engine, plus the enrichment worker once the engine holds its lease.
async fn run(
	config: AppConfig,
	store: Arc<dyn Store>,
	with_enrichment: bool,
) -> Result<EngineExit, CliError> {
	let control = stop_on_ctrl_c();
	let ledger = Arc::new(LedgerClient::new(&config.ledger)?);
	let lease = lease::open(&config.database, &config.sync.lease_name);
	let publisher = EventPublisher::new(config.sync.event_buffer);
	tokio::spawn(log_bus_events(publisher.clone()));

	let worker = if with_enrichment && config.enrichment.enabled {
		Some(enrichment_worker(&config, store.clone())?)
	} else {
		None
	};

	let engine = SyncEngine::new(
		ledger,
		store,
		lease,
		publisher,
		DecoderRegistry::with_defaults(),
		config.sync.clone(),
	);
	info!("Starting sync engine {}", engine.instance_id());

	let mut states = engine.watch_state();
	let worker_task = async {
		let Some(worker) = worker else {
			return;
		};
		let syncing = states
			.wait_for(|state| *state == EngineState::Polling || state.is_terminal())
			.await
			.map(|state| !state.is_terminal())
			.unwrap_or(false);
		if syncing {
			worker.run(&control).await;
		}
	};
	let engine_task = async {
		let exit = engine.run(&control).await;
		control.stop();
		exit
	};

	let (exit, ()) = tokio::join!(engine_task, worker_task);
	Ok(exit?)
}

fn enrichment_worker(config: &AppConfig, store: Arc<dyn Store>) -> Result<EnrichmentWorker, CliError> {
	let decoder = Arc::new(DecodeClient::new(&config.enrichment)?);
	Ok(EnrichmentWorker::new(store, decoder, config.enrichment.clone()))
}

/// Operator resync. Takes the sync lease so a running engine cannot interleave with the rewind.
async fn resync(config: &AppConfig, store: &dyn Store, height: u64) -> Result<(), CliError> {
	let lease = lease::open(&config.database, &config.sync.lease_name);
	let holder = generate_instance_id();
	let Some(guard) = lease.try_acquire(&holder).await? else {
		return Err(CliError::LeaseHeld(lease.name().to_string()));
	};

	let result = store.rewind(height).await;
	if let Err(e) = guard.release().await {
		warn!("Failed to release lease {}: {}", lease.name(), e);
	}
	result?;

	info!("Rewound store to height {}", height);
	Ok(())
}

/// Stop control wired to Ctrl-C.
fn stop_on_ctrl_c() -> TaskControl {
	let control = TaskControl::new();
	let signal_control = control.clone();
	tokio::spawn(async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => {
				info!("Shutdown requested; finishing the current unit of work");
				signal_control.stop();
			}
			Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
		}
	});
	control
}

/// Trace every bus event. Downstream fan-out subscribes to the same publisher.
async fn log_bus_events(publisher: EventPublisher) {
	let mut events = publisher.subscribe();
	drop(publisher);
	loop {
		match events.recv().await {
			Ok(event) => match event.to_envelope() {
				Ok(envelope) => trace!("{}", envelope),
				Err(e) => warn!("Failed to serialize {} event: {}", event.channel(), e),
			},
			Err(RecvError::Lagged(skipped)) => trace!("Event log lagged by {} events", skipped),
			Err(RecvError::Closed) => break,
		}
	}
}
