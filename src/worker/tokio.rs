//! Tokio flavour of the tag worker.
//!
//! One task owns the [`AsyncChainedTransport`] and drains an unbounded queue in order;
//! each job carries a oneshot sender for its result.

use std::future::Future;
use std::time::Duration;

use ::tokio::runtime::{Handle, TryCurrentError};
use ::tokio::sync::{mpsc, oneshot};
use ::tokio::task::{JoinError, JoinHandle};
use log::{debug, info};

use super::{SelectResult, SendResult, TimeoutResult};
use crate::buffer::Buffer;
use crate::engine::ShutdownSignal;
use crate::engine::r#async::AsyncChainedTransport;
use crate::error::{ChannelSetupError, TransportError};
use crate::transport::r#async::AsyncTagChannel;

enum AsyncJob<E> {
    ConfigureTimeout(Duration, oneshot::Sender<TimeoutResult<E>>),
    Select(oneshot::Sender<SelectResult<E>>),
    Send(Vec<u8>, oneshot::Sender<SendResult<E>>),
}

impl<E> AsyncJob<E> {
    fn cancel(self) {
        // The caller may have stopped waiting.
        match self {
            AsyncJob::ConfigureTimeout(_, done) => {
                let _ = done.send(Err(TransportError::Shutdown));
            }
            AsyncJob::Select(done) => {
                let _ = done.send(Err(ChannelSetupError::Shutdown));
            }
            AsyncJob::Send(_, done) => {
                let _ = done.send(Err(TransportError::Shutdown));
            }
        }
    }
}

/// Worker task owning an [`AsyncChainedTransport`].
///
/// Jobs run one at a time in submission order. Must be spawned from within a tokio
/// runtime.
#[derive(Debug)]
pub struct AsyncTagWorker<E> {
    jobs: Option<mpsc::UnboundedSender<AsyncJob<E>>>,
    shutdown: ShutdownSignal,
    task: Option<JoinHandle<()>>,
}

impl<E> core::fmt::Debug for AsyncJob<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            AsyncJob::ConfigureTimeout(..) => "configure timeout",
            AsyncJob::Select(_) => "select application",
            AsyncJob::Send(..) => "send payload",
        })
    }
}

impl<E: Send + 'static> AsyncTagWorker<E> {
    /// Spawns the worker task on the current runtime.
    pub fn spawn<C, B>(transport: AsyncChainedTransport<C, B>) -> Result<Self, TryCurrentError>
    where
        C: AsyncTagChannel<Error = E> + 'static,
        B: Buffer + Send + 'static,
    {
        let runtime = Handle::try_current()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = transport.shutdown_signal().clone();
        let task = runtime.spawn(worker_loop(transport, receiver, shutdown.clone()));

        Ok(Self { jobs: Some(sender), shutdown, task: Some(task) })
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Queues a timeout change; the job is queued when this is called, before the
    /// returned future is first polled.
    pub fn configure_timeout(&self, timeout: Duration) -> impl Future<Output = TimeoutResult<E>> {
        let (done, result) = oneshot::channel();
        self.submit(AsyncJob::ConfigureTimeout(timeout, done));
        async move { result.await.unwrap_or(Err(TransportError::Shutdown)) }
    }

    pub fn select_application(&self) -> impl Future<Output = SelectResult<E>> {
        let (done, result) = oneshot::channel();
        self.submit(AsyncJob::Select(done));
        async move { result.await.unwrap_or(Err(ChannelSetupError::Shutdown)) }
    }

    /// Queues a payload transaction and returns a future resolving to its reply.
    ///
    /// Jobs run in the order these calls are made. Dropping the returned future does
    /// not cancel the transaction.
    pub fn send_payload(&self, payload: impl Into<Vec<u8>>) -> impl Future<Output = SendResult<E>> {
        let (done, result) = oneshot::channel();
        self.submit(AsyncJob::Send(payload.into(), done));
        async move { result.await.unwrap_or(Err(TransportError::Shutdown)) }
    }

    fn submit(&self, job: AsyncJob<E>) {
        match &self.jobs {
            Some(jobs) => {
                if let Err(mpsc::error::SendError(job)) = jobs.send(job) {
                    job.cancel();
                }
            }
            None => job.cancel(),
        }
    }
}

impl<E> AsyncTagWorker<E> {
    /// Stops the worker: the transaction in flight fails at its next exchange and
    /// queued jobs are answered with a shutdown error.
    pub fn shutdown(&mut self) {
        if self.jobs.take().is_some() {
            info!("shutting down async tag worker");
        }
        self.shutdown.trip();
    }

    /// Stops accepting jobs, lets the queued ones finish and waits for the task.
    pub async fn join(mut self) -> Result<(), JoinError> {
        self.jobs = None;
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        }
    }
}

impl<E> Drop for AsyncTagWorker<E> {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.shutdown();
        }
    }
}

async fn worker_loop<C, B>(
    mut transport: AsyncChainedTransport<C, B>,
    mut jobs: mpsc::UnboundedReceiver<AsyncJob<C::Error>>,
    shutdown: ShutdownSignal,
) where
    C: AsyncTagChannel,
    B: Buffer,
{
    info!("async tag worker started");
    while let Some(job) = jobs.recv().await {
        if shutdown.is_tripped() {
            debug!("cancelling queued {:?}", job);
            job.cancel();
            continue;
        }
        debug!("running {:?}", job);
        match job {
            AsyncJob::ConfigureTimeout(timeout, done) => {
                let _ = done.send(transport.configure_timeout(timeout).await.map_err(TransportError::Channel));
            }
            AsyncJob::Select(done) => {
                let _ = done.send(transport.select_application().await);
            }
            AsyncJob::Send(payload, done) => {
                let _ = done.send(transport.send_payload(&payload).await);
            }
        }
    }
    info!("async tag worker stopped");
}
