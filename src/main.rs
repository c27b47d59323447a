use cinnabar::{Addr, Config, Server};
use std::path::PathBuf;
use tokio::{net::TcpListener, sync::mpsc};
use tracing_subscriber::EnvFilter;

/// Usage: `cinnabar-server [config-file] [--key value]...`
/// Command line options override the file.
fn configuration() -> Result<Config, String> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    let mut overrides = Vec::new();

    while let Some(argument) = args.next() {
        if let Some(key) = argument.strip_prefix("--") {
            let value = args
                .next()
                .ok_or_else(|| format!("missing value for --{key}"))?;
            overrides.push((key.to_string(), value));
        } else if path.is_none() {
            path = Some(PathBuf::from(argument));
        } else {
            return Err(format!("unexpected argument '{argument}'"));
        }
    }

    let mut config = match path {
        Some(path) => Config::load(&path).map_err(|error| error.to_string())?,
        None => Config::default(),
    };
    for (key, value) in overrides {
        config
            .apply(&key, &value)
            .map_err(|error| error.to_string())?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let config = match configuration() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("cinnabar-server: {error}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.tracing_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port = config.port;
    let binds = config.bind.clone();
    let server = Server::start(config).await;

    // One acceptor task per bind address, funneled into the server.
    let (sender, mut streams) = mpsc::unbounded_channel();
    for host in binds {
        let listener = match TcpListener::bind((host.as_str(), port)).await {
            Ok(listener) => listener,
            Err(error) => {
                tracing::error!(%host, port, %error, "can't bind");
                std::process::exit(1);
            }
        };
        tracing::info!(%host, port, "listening");

        let sender = sender.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let local = stream.local_addr().ok();
                        let addr = local.map(|local| Addr { local, peer });
                        if sender.send((stream, addr)).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "accept failed");
                    }
                }
            }
        });
    }
    drop(sender);

    tracing::info!(version = cinnabar::VERSION, "ready to accept connections");
    while let Some((stream, addr)) = streams.recv().await {
        server.connect(stream, addr);
    }
}
