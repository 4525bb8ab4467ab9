//! `vfsd` — the service daemon. HTTP+WebSocket front end over the
//! Filesystem Engine, grounded in the teacher's `apps/server` binary
//! (axum router, graceful shutdown) and `infra::daemon::bootstrap`
//! (embedded-daemon startup shape).

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use vfsd::blob::object_store::OpendalObjectStore;
use vfsd::blob::BlobStore;
use vfsd::config::ServiceConfig;
use vfsd::database::Database;
use vfsd::engine::FilesystemEngine;
use vfsd::rpc::http::{stream_file, HttpState};
use vfsd::rpc::watch_ws::{watch_handler, WatchState};
use vfsd::rpc::{dispatch, RpcRequest};
use vfsd::watch::{BroadcasterConfig, WatchBroadcaster};

#[derive(Clone)]
struct AppState {
	engine: Arc<FilesystemEngine>,
	broadcaster: Arc<WatchBroadcaster>,
}

impl FromRef<AppState> for HttpState {
	fn from_ref(state: &AppState) -> Self {
		HttpState { engine: state.engine.clone() }
	}
}

impl FromRef<AppState> for WatchState {
	fn from_ref(state: &AppState) -> Self {
		WatchState { broadcaster: state.broadcaster.clone() }
	}
}

#[derive(Parser, Debug)]
#[command(name = "vfsd", about = "Virtual filesystem service daemon")]
struct Args {
	/// Directory holding the metadata database and service config.
	#[arg(long, env = "VFSD_DATA_DIR")]
	data_dir: Option<PathBuf>,

	/// HTTP bind address, overrides the config file.
	#[arg(long, env = "VFSD_BIND")]
	bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,vfsd=debug".into()),
		)
		.init();

	let args = Args::parse();
	let data_dir = args
		.data_dir
		.unwrap_or_else(|| dirs::data_dir().map(|d| d.join("vfsd")).unwrap_or_else(|| PathBuf::from("./vfsd-data")));

	let mut config = ServiceConfig::load_or_create(&data_dir)?;
	if let Some(bind) = args.bind {
		config.http_bind = bind;
	}
	info!(data_dir = %data_dir.display(), bind = %config.http_bind, "starting vfsd");

	let db = Database::open(&config.db_path()).await?;
	let warm = match &config.warm_dir {
		Some(dir) => Some(Arc::new(OpendalObjectStore::new_fs(dir)?) as Arc<dyn vfsd::blob::object_store::ObjectStore>),
		None => None,
	};
	let cold = match &config.cold_dir {
		Some(dir) => Some(Arc::new(OpendalObjectStore::new_fs(dir)?) as Arc<dyn vfsd::blob::object_store::ObjectStore>),
		None => None,
	};
	let blobs = Arc::new(BlobStore::new(db.conn().clone(), warm, cold, config.hot_tier_threshold_bytes));

	let orphan_config = config.orphan_cleanup.into();
	let engine = Arc::new(FilesystemEngine::new(db, blobs, config.jail_root.clone(), orphan_config));

	let broadcaster_config: BroadcasterConfig = config.broadcaster.into();
	let broadcaster = Arc::new(WatchBroadcaster::new(broadcaster_config));
	let events_rx = engine.subscribe();
	let broadcaster_task = {
		let broadcaster = broadcaster.clone();
		tokio::spawn(async move { broadcaster.run(events_rx).await })
	};

	let rpc_engine = engine.clone();
	let state = AppState { engine: engine.clone(), broadcaster: broadcaster.clone() };
	let app = Router::new()
		.route("/health", get(|| async { "OK" }))
		.route(
			"/rpc",
			post(move |Json(req): Json<RpcRequest>| {
				let engine = rpc_engine.clone();
				async move { Json(dispatch(&engine, req).await) }
			}),
		)
		.route("/fs", get(stream_file))
		.route("/watch", get(watch_handler))
		.with_state(state);

	let addr: SocketAddr = config.http_bind.parse()?;
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!("vfsd listening on http://{addr}");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	broadcaster_task.abort();
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => info!("received Ctrl+C, shutting down"),
		() = terminate => info!("received SIGTERM, shutting down"),
	}
}
