//! Quiz room backend binary wiring room store supervision, the optional room agent and the
//! observation API.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use futures::future::BoxFuture;
use time::OffsetDateTime;
use tokio::{net::TcpListener, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use quiz_room_back::{
    config::AppConfig,
    dao::{
        models::RoomDocument,
        profile::MemoryProfileStore,
        quiz_provider::{QuizProvider, StaticQuizProvider},
        room_store::{MemoryRoomStore, RoomStore},
        storage::{StorageError, StorageResult},
    },
    routes,
    services::{
        rank_notice::RankNoticeStore,
        room_session::{Rewards, RoomSession},
        room_switch::RoomMembership,
        storage_supervisor,
    },
    state::{AppState, GameEngine, SharedState, TokioScheduler},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let quizzes = load_quizzes(&config);
    let backend =
        StoreBackend::from_env(&config).context("selecting room store backend")?;
    let app_state = AppState::new(config);

    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        backend.connect()
    }));

    let agent = AgentSettings::from_env()
        .map(|settings| tokio::spawn(start_agent(app_state.clone(), settings, quizzes)));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    if let Some(agent) = agent {
        stop_agent(agent).await;
    }
    Ok(())
}

/// Backend selected with `STORE_BACKEND`.
#[derive(Clone)]
enum StoreBackend {
    Memory(MemoryRoomStore),
    #[cfg(feature = "couch-store")]
    Couch { poll_interval: Duration },
    #[cfg(feature = "mongo-store")]
    Mongo { poll_interval: Duration },
}

impl StoreBackend {
    fn from_env(config: &AppConfig) -> anyhow::Result<Self> {
        let poll_interval = config.poll_interval;
        let name = env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".into());
        match name.as_str() {
            "memory" => Ok(Self::Memory(MemoryRoomStore::new())),
            #[cfg(feature = "couch-store")]
            "couch" => Ok(Self::Couch { poll_interval }),
            #[cfg(feature = "mongo-store")]
            "mongo" => Ok(Self::Mongo { poll_interval }),
            other => anyhow::bail!("unsupported STORE_BACKEND `{other}`"),
        }
    }

    fn connect(&self) -> BoxFuture<'static, StorageResult<Arc<dyn RoomStore>>> {
        match self.clone() {
            Self::Memory(store) => Box::pin(async move { Ok(Arc::new(store) as Arc<dyn RoomStore>) }),
            #[cfg(feature = "couch-store")]
            Self::Couch { poll_interval } => Box::pin(async move {
                use quiz_room_back::dao::room_store::couchdb::{CouchConfig, CouchRoomStore};

                let config = CouchConfig::from_env()?.with_poll_interval(poll_interval);
                let store = CouchRoomStore::connect(config).await?;
                Ok(Arc::new(store) as Arc<dyn RoomStore>)
            }),
            #[cfg(feature = "mongo-store")]
            Self::Mongo { poll_interval } => Box::pin(async move {
                use quiz_room_back::dao::room_store::mongodb::{MongoConfig, MongoRoomStore};

                let config = MongoConfig::from_env()
                    .await?
                    .with_poll_interval(poll_interval);
                let store = MongoRoomStore::connect(config).await?;
                Ok(Arc::new(store) as Arc<dyn RoomStore>)
            }),
        }
    }
}

fn load_quizzes(config: &AppConfig) -> Arc<dyn QuizProvider> {
    let Some(path) = config.quizzes_path.as_deref() else {
        info!("no quiz file configured; rooms start without quizzes");
        return Arc::new(StaticQuizProvider::new());
    };
    match StaticQuizProvider::from_json_file(path) {
        Ok(provider) => {
            info!(path = %path.display(), "loaded quiz sequences");
            Arc::new(provider)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to load quizzes; using none");
            Arc::new(StaticQuizProvider::new())
        }
    }
}

/// Participant identity the server plays as, when configured.
struct AgentSettings {
    room_id: String,
    participant_id: String,
    username: String,
}

impl AgentSettings {
    fn from_env() -> Option<Self> {
        let room_id = env::var("AGENT_ROOM_ID").ok()?;
        let participant_id = env::var("AGENT_PARTICIPANT_ID")
            .unwrap_or_else(|_| format!("agent-{}", Uuid::new_v4().simple()));
        let username = env::var("AGENT_USERNAME").unwrap_or_else(|_| participant_id.clone());
        Some(Self {
            room_id,
            participant_id,
            username,
        })
    }
}

struct Agent {
    membership: RoomMembership,
    _session: RoomSession,
}

/// Join the configured room once a store is available and drive it like any other client.
async fn start_agent(
    state: SharedState,
    settings: AgentSettings,
    quizzes: Arc<dyn QuizProvider>,
) -> anyhow::Result<Agent> {
    let mut degraded = state.degraded_watcher();
    if degraded.wait_for(|degraded| !*degraded).await.is_err() {
        anyhow::bail!("application state dropped before the room store connected");
    }
    let store = state.require_room_store().await?;

    ensure_room(store.as_ref(), quizzes.as_ref(), &settings.room_id).await?;

    let membership = RoomMembership::new(
        Arc::clone(&store),
        settings.participant_id.clone(),
        settings.username,
    );
    membership.join(&settings.room_id).await?;

    let config = state.config();
    let notices = RankNoticeStore::new(config.notice_path.clone());
    match notices.take(OffsetDateTime::now_utc()) {
        Ok(Some(notice)) => info!(rank = %notice.new_rank, "{}", notice.message),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "failed to read pending rank notice"),
    }

    let engine = GameEngine::new(
        settings.participant_id,
        store,
        quizzes,
        Arc::new(TokioScheduler),
        config,
    );
    let session = RoomSession::spawn(
        engine,
        settings.room_id,
        Rewards {
            profiles: Arc::new(MemoryProfileStore::new()),
            notices,
        },
    )
    .await?;

    Ok(Agent {
        membership,
        _session: session,
    })
}

/// Create the room on first use, taking its genre from the quiz sequence.
async fn ensure_room(
    store: &dyn RoomStore,
    quizzes: &dyn QuizProvider,
    room_id: &str,
) -> StorageResult<()> {
    if store.read(room_id).await?.is_some() {
        return Ok(());
    }
    let genre = match quizzes.quiz_sequence(room_id).await {
        Ok(sequence) => sequence
            .first()
            .map(|quiz| quiz.genre.clone())
            .unwrap_or_else(|| "general".into()),
        Err(_) => "general".into(),
    };
    match store.create(RoomDocument::new(room_id, genre)).await {
        Ok(()) => {
            info!(room_id, "room created");
            Ok(())
        }
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        Err(err) => Err(err),
    }
}

async fn stop_agent(agent: JoinHandle<anyhow::Result<Agent>>) {
    if !agent.is_finished() {
        agent.abort();
        return;
    }
    match agent.await {
        Ok(Ok(agent)) => match agent.membership.leave().await {
            Ok(Some(room_id)) => info!(room_id = %room_id, "agent left room"),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "agent failed to leave room"),
        },
        Ok(Err(err)) => error!(error = %err, "room agent failed"),
        Err(err) => error!(error = %err, "room agent task panicked"),
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
