//! Process wiring: one engine, one driver, one transport and an optional
//! client API per node.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, NodeConfig};
use crate::network::http_api::run_http_api;
use crate::network::{MessageSender, Transport, TransportError};
use crate::raft::{bootstrap_storage, Driver, DriverError, DriverHandle, EngineError, RawNodeEngine};
use crate::storage::KvStore;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP server error: {0}")]
    Http(#[from] hyper::Error),

    #[error("Inbound queue already taken")]
    ReceiverTaken,

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct Node {
    id: u64,
    handle: DriverHandle,
    transport: Arc<Transport>,
    raft_addr: SocketAddr,
    http_addr: Option<SocketAddr>,
    driver_task: JoinHandle<Result<(), DriverError>>,
    transport_task: JoinHandle<Result<(), TransportError>>,
    http: Option<(oneshot::Sender<()>, JoinHandle<Result<(), hyper::Error>>)>,
}

impl Node {
    /// Bind the configured transport address and start.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        Self::start_with_listener(config, listener).await
    }

    /// Start on a pre-bound transport listener. `config.listen_addr` is
    /// ignored.
    pub async fn start_with_listener(
        config: NodeConfig,
        listener: TcpListener,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let raft_addr = listener.local_addr()?;

        // Everything fallible happens before the first spawn.
        let http_listener = match &config.http_addr {
            Some(addr) => {
                let listener = std::net::TcpListener::bind(addr)?;
                listener.set_nonblocking(true)?;
                Some(listener)
            }
            None => None,
        };
        let http_addr = http_listener.as_ref().map(|l| l.local_addr()).transpose()?;

        let voters = config.peers.voters(config.node_id);
        let storage = bootstrap_storage(&voters);
        let engine = RawNodeEngine::new(&config.raft_config(), storage.clone())?;

        let transport = Arc::new(Transport::new(
            config.node_id,
            config.peers.clone(),
            config.transport_config(),
        ));
        let inbound = transport.take_receiver().ok_or(NodeError::ReceiverTaken)?;

        let sender: Arc<dyn MessageSender> = transport.clone();
        let driver = Driver::new(
            engine,
            storage,
            sender,
            Arc::new(KvStore::new()),
            inbound,
            config.driver_config(),
        );
        let handle = driver.handle();

        let transport_task = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.serve(listener).await })
        };
        let driver_task = tokio::spawn(driver.run());

        let http = http_listener.map(|listener| {
            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            let task = tokio::spawn(run_http_api(listener, handle.clone(), async move {
                let _ = stop_rx.await;
            }));
            (stop_tx, task)
        });

        info!(
            "Node {} started: transport {}, voters {:?}",
            config.node_id, raft_addr, voters
        );

        Ok(Self {
            id: config.node_id,
            handle,
            transport,
            raft_addr,
            http_addr,
            driver_task,
            transport_task,
            http,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn handle(&self) -> DriverHandle {
        self.handle.clone()
    }

    pub fn raft_addr(&self) -> SocketAddr {
        self.raft_addr
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Stop the client API, then the driver, then the transport.
    pub async fn shutdown(self) -> Result<(), NodeError> {
        info!("Node {} shutting down", self.id);

        if let Some((stop, task)) = self.http {
            let _ = stop.send(());
            if let Err(e) = task.await? {
                warn!("Node {} HTTP server stopped with error: {}", self.id, e);
            }
        }

        self.handle.shutdown();
        let driver_result = self.driver_task.await?;

        self.transport.shutdown().await;
        if let Err(e) = self.transport_task.await? {
            warn!("Node {} transport stopped with error: {}", self.id, e);
        }

        if let Err(e) = &driver_result {
            error!("Node {} driver failed: {}", self.id, e);
        }
        driver_result.map_err(NodeError::from)
    }
}
