use crate::{
    aof::Aof,
    client::{Addr, Client},
    config::Config,
    store::Store,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::oneshot,
    time::{interval, Duration},
};
use triomphe::Arc;

/// How often the periodic timer fires.
const CRON_PERIOD: Duration = Duration::from_millis(100);

/// The top of the world: owns the store and the periodic timer, and
/// attaches transports as connections. The TCP acceptor lives in the
/// binary; tests connect in-memory pipes.
pub struct Server {
    store: Arc<Store>,

    /// Dropping this stops the timer task.
    _shutdown: oneshot::Sender<()>,
}

impl Server {
    /// Build a server from configuration, load persisted state, and start
    /// the periodic timer.
    pub async fn start(config: Config) -> Server {
        let store = Store::new(config);

        // Startup load: an existing command log wins when append-only is
        // on; otherwise the snapshot is used.
        let mut loaded = 0;
        if store.aof.enabled() {
            match Aof::load(&store).await {
                Ok(commands) => {
                    loaded = commands;
                    if commands > 0 {
                        tracing::info!(commands, "command log replayed");
                    }
                }
                Err(error) => tracing::error!(%error, "replaying the command log failed"),
            }
        }
        if loaded == 0 {
            match store.snapshot.load(&store.dbs) {
                Ok(0) => {}
                Ok(keys) => tracing::info!(keys, "snapshot loaded"),
                Err(error) => tracing::error!(%error, "loading the snapshot failed"),
            }
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let cron = store.clone();
        tokio::spawn(async move {
            let mut timer = interval(CRON_PERIOD);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = timer.tick() => cron.cron(),
                }
            }
        });

        Server {
            store,
            _shutdown: shutdown,
        }
    }

    /// Attach a transport as a client connection.
    pub fn connect<S: AsyncRead + AsyncWrite + Send + 'static>(
        &self,
        stream: S,
        addr: Option<Addr>,
    ) {
        Client::spawn(stream, self.store.clone(), addr);
    }

    /// The engine behind this server, for introspection.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}
