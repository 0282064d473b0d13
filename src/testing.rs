//! In-memory fakes of the fetcher and transfer client used by unit tests.

use crate::client::{
    ClientConnector, ConnectOptions, Connecting, ConnectionEvent, JobEvent, TransferClient,
    TransferJob,
};
use crate::error::{CatalogError, TransferError};
use crate::fetch::DocumentFetcher;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Serves canned documents; unknown URLs answer HTTP 404.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    documents: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, url: &str, body: &str) -> Self {
        self.documents.insert(url.to_string(), body.to_string());
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl DocumentFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CatalogError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| CatalogError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// One `begin_transfer` call seen by a [`FakeClient`].
pub(crate) struct FakeJob {
    pub(crate) bot_name: String,
    pub(crate) file_number: String,
    pub(crate) events: mpsc::UnboundedSender<JobEvent>,
    pub(crate) cancel: CancellationToken,
}

pub(crate) struct FakeClient {
    pub(crate) options: ConnectOptions,
    pub(crate) events: mpsc::UnboundedSender<ConnectionEvent>,
    jobs: Mutex<Vec<Arc<FakeJob>>>,
    rejection: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl FakeClient {
    /// Makes the next `begin_transfer` fail with `message`.
    pub(crate) fn reject_next(&self, message: &str) {
        *self.rejection.lock().unwrap() = Some(message.to_string());
    }

    pub(crate) fn jobs(&self) -> Vec<Arc<FakeJob>> {
        self.jobs.lock().unwrap().clone()
    }

    pub(crate) fn job(&self, index: usize) -> Arc<FakeJob> {
        self.jobs()[index].clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl TransferClient for FakeClient {
    async fn begin_transfer(
        &self,
        bot_name: &str,
        file_number: &str,
        cancel: CancellationToken,
    ) -> Result<TransferJob, TransferError> {
        if let Some(message) = self.rejection.lock().unwrap().take() {
            return Err(TransferError::Rejected {
                bot: bot_name.to_string(),
                message,
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.jobs.lock().unwrap().push(Arc::new(FakeJob {
            bot_name: bot_name.to_string(),
            file_number: file_number.to_string(),
            events: tx,
            cancel,
        }));
        Ok(TransferJob { events: rx })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// How a [`FakeConnector`] behaves right after `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnConnect {
    Ready,
    Fail,
    Wait,
}

/// Records every connection it opens so tests can drive their events.
pub(crate) struct FakeConnector {
    on_connect: OnConnect,
    clients: Mutex<Vec<Arc<FakeClient>>>,
}

impl FakeConnector {
    pub(crate) fn new(on_connect: OnConnect) -> Self {
        Self {
            on_connect,
            clients: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn clients(&self) -> Vec<Arc<FakeClient>> {
        self.clients.lock().unwrap().clone()
    }

    /// The most recent connection opened to `network`.
    pub(crate) fn client(&self, network: &str) -> Arc<FakeClient> {
        self.clients()
            .into_iter()
            .rev()
            .find(|c| c.options.network == network)
            .expect("no connection opened for network")
    }
}

impl ClientConnector for FakeConnector {
    fn connect(&self, options: ConnectOptions) -> Connecting {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.on_connect {
            OnConnect::Ready => {
                let _ = tx.send(ConnectionEvent::Ready);
            }
            OnConnect::Fail => {
                let _ = tx.send(ConnectionEvent::Error("cannot join network".to_string()));
            }
            OnConnect::Wait => {}
        }
        let client = Arc::new(FakeClient {
            options,
            events: tx,
            jobs: Mutex::new(Vec::new()),
            rejection: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        self.clients.lock().unwrap().push(client.clone());
        Connecting {
            client,
            events: rx,
        }
    }
}

/// Lets spawned tasks on the current-thread test runtime catch up.
pub(crate) async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
