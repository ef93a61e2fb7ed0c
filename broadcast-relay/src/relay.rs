use std::{
    future::Future,
    net::SocketAddr,
    sync::Arc,
};

use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    error::RelayError,
    message::DEFAULT_MARKER,
    registry::{BroadcastLoop, Registry},
    session::Session,
};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";
pub const DEFAULT_READ_BUFFER_SIZE: usize = 20;

/// Settings for one relay instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    /// Byte prepended to every relayed chunk.
    pub marker: u8,
    /// Upper bound on the bytes taken from a socket per read, and so on the
    /// payload of one relayed message.
    pub read_buffer_size: usize,
    /// Messages a session may hold while its writer is busy. Zero means a
    /// broadcast only reaches the session if its writer is waiting for it.
    pub mailbox_capacity: usize,
    /// Chunks that may wait for the broadcast loop before readers stall.
    /// Zero hands each chunk straight to the loop.
    pub inbound_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5000)),
            marker: DEFAULT_MARKER,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            mailbox_capacity: 0,
            inbound_capacity: 0,
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.read_buffer_size == 0 {
            return Err(RelayError::InvalidConfig("read buffer size must be positive"));
        }
        Ok(())
    }
}

pub struct Relay {
    listener: TcpListener,
    registry: Arc<Registry>,
    broadcast: BroadcastLoop,
    read_buffer_size: usize,
}

impl Relay {
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.listen,
                source,
            })?;
        Ok(Self::assemble(listener, &config))
    }

    /// Wraps an already bound listener. `config.listen` is ignored.
    pub fn new(listener: TcpListener, config: &RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        Ok(Self::assemble(listener, config))
    }

    fn assemble(listener: TcpListener, config: &RelayConfig) -> Self {
        let (registry, broadcast) = Registry::new(config);
        Self {
            listener,
            registry,
            broadcast,
            read_buffer_size: config.read_buffer_size,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        self.listener.local_addr().map_err(RelayError::LocalAddr)
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections until `shutdown` resolves. Sessions that are
    /// already running are left alone; only accepting and broadcasting stop.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let Relay {
            listener,
            registry,
            broadcast,
            read_buffer_size,
        } = self;
        let broadcast = tokio::spawn(broadcast.run());
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay no longer accepting connections");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry, read_buffer_size).await;
                }
            }
        }

        broadcast.abort();
    }

    pub async fn run_until_ctrl_c(self) {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<Registry>,
    read_buffer_size: usize,
) {
    match result {
        Ok((stream, peer)) => {
            let (id, mailbox) = registry.register().await;
            debug!(session = id, peer = %peer, "client connected");
            spawn_session(Session::new(id, stream, mailbox), peer, registry, read_buffer_size);
        }
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(
    session: Session<TcpStream>,
    peer: SocketAddr,
    registry: &Arc<Registry>,
    read_buffer_size: usize,
) {
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        let id = session.id();
        match session.run(registry, read_buffer_size).await {
            Ok(()) => info!(session = id, peer = %peer, "client disconnected"),
            Err(err) => warn!(session = id, peer = %peer, error = ?err, "client session closed with error"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = RelayConfig::default();
        assert_eq!(config.listen.to_string(), DEFAULT_LISTEN);
        assert_eq!(config.marker, b'a');
        assert_eq!(config.read_buffer_size, 20);
        assert_eq!(config.mailbox_capacity, 0);
        assert_eq!(config.inbound_capacity, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_read_buffer_is_rejected() {
        let config = RelayConfig {
            read_buffer_size: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn bind_rejects_invalid_config_before_binding() {
        let result = Relay::bind(RelayConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            read_buffer_size: 0,
            ..RelayConfig::default()
        })
        .await;
        assert!(matches!(result, Err(RelayError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn new_rejects_invalid_config() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let config = RelayConfig {
            read_buffer_size: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(
            Relay::new(listener, &config),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn bind_reports_address_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = taken.local_addr().expect("addr");

        let result = Relay::bind(RelayConfig {
            listen: addr,
            ..RelayConfig::default()
        })
        .await;

        match result {
            Err(RelayError::Bind { addr: reported, .. }) => assert_eq!(reported, addr),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("second bind on {addr} should fail"),
        }
    }
}
