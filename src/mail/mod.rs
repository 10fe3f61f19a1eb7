//! Mail Module
//!
//! A single worker drains a bounded job queue. Senders wait for the worker's
//! reply, but never longer than the configured deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::MailError;

/// Jobs that may wait in the queue
pub const QUEUE_CAPACITY: usize = 20;

// == Message ==
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Name of the template the transport renders
    pub template: String,
    pub data: serde_json::Value,
}

// == Transport ==
/// Delivers one rendered message.
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    async fn deliver(&self, message: &Message) -> Result<(), MailError>;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn deliver(&self, message: &Message) -> Result<(), MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            template = %message.template,
            data = %message.data,
            "mail delivered to log"
        );
        Ok(())
    }
}

type Job = (Message, oneshot::Sender<Result<(), MailError>>);

// == Mailer ==
#[derive(Clone)]
pub struct Mailer {
    jobs: mpsc::Sender<Job>,
    timeout: Duration,
}

impl Mailer {
    /// Starts the worker. It stops once every `Mailer` clone is dropped.
    pub fn spawn<T: MailTransport>(transport: T, timeout: Duration) -> (Self, JoinHandle<()>) {
        let (jobs, mut queue) = mpsc::channel::<Job>(QUEUE_CAPACITY);
        let transport = Arc::new(transport);

        let handle = tokio::spawn(async move {
            while let Some((message, reply)) = queue.recv().await {
                let result = transport.deliver(&message).await;
                if let Err(e) = &result {
                    warn!(to = %message.to, error = %e, "mail delivery failed");
                }
                // The sender may have given up waiting.
                let _ = reply.send(result);
            }
            debug!("mail worker stopped");
        });

        (Self { jobs, timeout }, handle)
    }

    /// Queues `message` and waits for the delivery result.
    ///
    /// The deadline covers both waiting for queue space and the delivery.
    pub async fn send(&self, message: Message) -> Result<(), MailError> {
        let (reply, result) = oneshot::channel();

        let dispatch = async {
            self.jobs
                .send((message, reply))
                .await
                .map_err(|_| MailError::WorkerClosed)?;
            result.await.map_err(|_| MailError::WorkerClosed)?
        };

        tokio::time::timeout(self.timeout, dispatch)
            .await
            .map_err(|_| MailError::Timeout(self.timeout))?
    }
}
