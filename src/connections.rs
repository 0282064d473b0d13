//! One shared connection per IRC network, opened lazily.

use crate::client::{ClientConnector, ConnectOptions, Connecting, ConnectionEvent, TransferClient};
use crate::error::TransferError;
use crate::types::MuleConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectionState {
    Connecting,
    Ready,
    Failed(String),
    Closed,
}

/// A registered connection to one network.
pub struct Connection {
    id: u64,
    network: String,
    client: Arc<dyn TransferClient>,
    state: watch::Receiver<ConnectionState>,
}

impl Connection {
    pub fn client(&self) -> &Arc<dyn TransferClient> {
        &self.client
    }

    /// Waits until the connection is ready for transfers.
    ///
    /// Fails if the connection reports an error or goes away first.
    pub async fn ready(&self) -> Result<(), TransferError> {
        let mut state = self.state.clone();
        loop {
            let current = state.borrow_and_update().clone();
            match current {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Failed(message) => {
                    return Err(TransferError::ConnectionFailed {
                        network: self.network.clone(),
                        message,
                    })
                }
                ConnectionState::Closed => {
                    return Err(TransferError::ConnectionClosed(self.network.clone()))
                }
                ConnectionState::Connecting => {}
            }
            if state.changed().await.is_err() {
                return Err(TransferError::ConnectionClosed(self.network.clone()));
            }
        }
    }
}

/// Maps network → live [`Connection`].
///
/// Connections leave the registry only when they report themselves idle or
/// broken; the registry never closes one that might still serve transfers.
#[derive(Clone)]
pub struct ConnectionRegistry {
    connector: Arc<dyn ClientConnector>,
    nickname: String,
    randomize_nick: bool,
    port: u16,
    download_path: PathBuf,
    connections: Arc<Mutex<HashMap<String, Arc<Connection>>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new(config: &MuleConfig, connector: Arc<dyn ClientConnector>) -> Self {
        Self {
            connector,
            nickname: config.nickname.clone(),
            randomize_nick: config.randomize_nick,
            port: config.irc_port,
            download_path: config.download_path.clone(),
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Returns the connection for `network`, opening one that joins
    /// `channel_hint` if none is registered.
    pub async fn acquire(&self, network: &str, channel_hint: &str) -> Arc<Connection> {
        let mut connections = self.connections.lock().await;
        if let Some(connection) = connections.get(network) {
            debug!("Reusing connection {} to {}", connection.id, network);
            return Arc::clone(connection);
        }

        let options = ConnectOptions {
            network: network.to_string(),
            port: self.port,
            channels: vec![channel_hint.to_string()],
            nickname: self.nickname.clone(),
            randomize_nick: self.randomize_nick,
            download_path: self.download_path.clone(),
        };
        let Connecting { client, events } = self.connector.connect(options);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let connection = Arc::new(Connection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            network: network.to_string(),
            client,
            state: state_rx,
        });
        info!(
            "Opening connection {} to {} (joining {})",
            connection.id, network, channel_hint
        );
        connections.insert(network.to_string(), Arc::clone(&connection));
        drop(connections);

        tokio::spawn(
            self.clone()
                .watch_connection(Arc::clone(&connection), events, state_tx),
        );
        connection
    }

    /// Whether a connection to `network` is registered.
    pub async fn contains(&self, network: &str) -> bool {
        self.connections.lock().await.contains_key(network)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn watch_connection(
        self,
        connection: Arc<Connection>,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        state: watch::Sender<ConnectionState>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Ready => {
                    info!("Connection {} to {} is ready", connection.id, connection.network);
                    state.send_replace(ConnectionState::Ready);
                }
                ConnectionEvent::Error(message) => {
                    warn!(
                        "Connection {} to {} failed: {}",
                        connection.id, connection.network, message
                    );
                    state.send_replace(ConnectionState::Failed(message));
                    self.forget(&connection).await;
                    connection.client.close().await;
                    return;
                }
                ConnectionEvent::IdleCloseable => {
                    info!(
                        "Connection {} to {} is idle, closing it",
                        connection.id, connection.network
                    );
                    state.send_replace(ConnectionState::Closed);
                    self.forget(&connection).await;
                    connection.client.close().await;
                    return;
                }
            }
        }

        debug!("Connection {} to {} stopped reporting", connection.id, connection.network);
        state.send_replace(ConnectionState::Closed);
        self.forget(&connection).await;
    }

    // Only removes the entry if it still belongs to `connection`; a newer
    // connection to the same network must survive.
    async fn forget(&self, connection: &Connection) {
        let mut connections = self.connections.lock().await;
        if connections
            .get(&connection.network)
            .is_some_and(|current| current.id == connection.id)
        {
            connections.remove(&connection.network);
        }
    }
}
