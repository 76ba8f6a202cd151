//! Single-worker queue for one tag.
//!
//! ISO-DEP is half-duplex and single-session, so every operation against a tag runs
//! on one dedicated thread, one transaction at a time, in submission order. Callers
//! get each result through a callback or a [`Pending`] handle.
//!
//! Shutting the worker down trips the transport's [`ShutdownSignal`]: the transaction
//! in flight fails with a shutdown error at its next exchange, and every job still in
//! the queue is answered with a shutdown error without touching the tag.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendError, Sender, TryRecvError, bounded, unbounded};
use log::{debug, info};

use crate::buffer::Buffer;
use crate::engine::ShutdownSignal;
use crate::engine::sync::ChainedTransport;
use crate::error::{ChannelSetupError, ShutdownError, TransportError};
use crate::transport::sync::TagChannel;

#[cfg(feature = "tokio")]
pub mod tokio;

type Completion<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

/// Result of a timeout configuration.
pub type TimeoutResult<E> = Result<(), TransportError<E>>;
/// Result of an application selection.
pub type SelectResult<E> = Result<Option<Vec<u8>>, ChannelSetupError<E>>;
/// Result of a payload transaction.
pub type SendResult<E> = Result<Vec<u8>, TransportError<E>>;

enum Job<E> {
    ConfigureTimeout(Duration, Completion<(), TransportError<E>>),
    Select(Completion<Option<Vec<u8>>, ChannelSetupError<E>>),
    Send(Vec<u8>, Completion<Vec<u8>, TransportError<E>>),
}

impl<E> Job<E> {
    fn name(&self) -> &'static str {
        match self {
            Job::ConfigureTimeout(..) => "configure timeout",
            Job::Select(_) => "select application",
            Job::Send(..) => "send payload",
        }
    }

    /// Answers the job without running it.
    fn cancel(self) {
        match self {
            Job::ConfigureTimeout(_, done) => done(Err(TransportError::Shutdown)),
            Job::Select(done) => done(Err(ChannelSetupError::Shutdown)),
            Job::Send(_, done) => done(Err(TransportError::Shutdown)),
        }
    }
}

/// Handle to the result of a queued job.
///
/// Dropping the handle does not cancel the job.
#[derive(Debug)]
pub struct Pending<T, E: ShutdownError> {
    receiver: Receiver<Result<T, E>>,
}

impl<T, E: ShutdownError> Pending<T, E> {
    fn channel() -> (Completion<T, E>, Self)
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let (sender, receiver) = bounded(1);
        let done: Completion<T, E> = Box::new(move |result| {
            let _ = sender.send(result);
        });
        (done, Self { receiver })
    }

    /// Blocks until the job completes.
    pub fn wait(self) -> Result<T, E> {
        self.receiver.recv().unwrap_or_else(|_| Err(E::shutdown()))
    }

    /// Blocks for at most `timeout`; `None` if the job has not completed yet.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, E>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(E::shutdown())),
        }
    }

    /// Returns the result if the job has completed.
    pub fn try_get(&self) -> Option<Result<T, E>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(E::shutdown())),
        }
    }
}

/// Dedicated worker thread owning a [`ChainedTransport`].
///
/// `E` is the error type of the transport's channel.
///
/// # Examples
///
/// ```no_run
/// use type4_chain::{ChannelConfig, TagWorker, TransportBuilder};
/// # use std::time::Duration;
/// # #[derive(Debug)]
/// # struct Reader;
/// # impl type4_chain::TagChannel for Reader {
/// #     type Error = String;
/// #     fn is_connected(&self) -> bool { true }
/// #     fn connect(&mut self) -> Result<(), String> { Ok(()) }
/// #     fn set_timeout(&mut self, _timeout: Duration) -> Result<(), String> { Ok(()) }
/// #     fn transceive(&mut self, _command: &[u8]) -> Result<Vec<u8>, String> { Ok(vec![0x90, 0x00]) }
/// # }
///
/// let transport = TransportBuilder::new(Reader, ChannelConfig::default()).build_with_heap().unwrap();
/// let mut worker = TagWorker::spawn(transport).unwrap();
///
/// worker.configure_timeout(Duration::from_secs(5)).wait().unwrap();
/// worker.select_application().wait().unwrap();
/// worker.send_payload_with(b"hello".to_vec(), |result| println!("reply: {:?}", result));
/// let reply = worker.send_payload(b"world".to_vec()).wait();
/// # let _ = reply;
/// worker.shutdown();
/// ```
#[derive(Debug)]
pub struct TagWorker<E> {
    jobs: Option<Sender<Job<E>>>,
    shutdown: ShutdownSignal,
    thread: Option<JoinHandle<()>>,
}

impl<E> core::fmt::Debug for Job<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl<E: Send + 'static> TagWorker<E> {
    /// Moves `transport` onto a new worker thread.
    pub fn spawn<C, B>(transport: ChainedTransport<C, B>) -> io::Result<Self>
    where
        C: TagChannel<Error = E> + Send + 'static,
        B: Buffer + Send + 'static,
    {
        let (sender, receiver) = unbounded();
        let shutdown = transport.shutdown_signal().clone();
        let signal = shutdown.clone();
        let thread = thread::Builder::new()
            .name("type4-tag-worker".into())
            .spawn(move || worker_loop(transport, receiver, signal))?;

        Ok(Self { jobs: Some(sender), shutdown, thread: Some(thread) })
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn configure_timeout(&self, timeout: Duration) -> Pending<(), TransportError<E>> {
        let (done, pending) = Pending::channel();
        self.submit(Job::ConfigureTimeout(timeout, done));
        pending
    }

    pub fn configure_timeout_with<F>(&self, timeout: Duration, callback: F)
    where
        F: FnOnce(TimeoutResult<E>) + Send + 'static,
    {
        self.submit(Job::ConfigureTimeout(timeout, Box::new(callback)));
    }

    pub fn select_application(&self) -> Pending<Option<Vec<u8>>, ChannelSetupError<E>> {
        let (done, pending) = Pending::channel();
        self.submit(Job::Select(done));
        pending
    }

    pub fn select_application_with<F>(&self, callback: F)
    where
        F: FnOnce(SelectResult<E>) + Send + 'static,
    {
        self.submit(Job::Select(Box::new(callback)));
    }

    /// Queues a payload transaction.
    pub fn send_payload(&self, payload: impl Into<Vec<u8>>) -> Pending<Vec<u8>, TransportError<E>> {
        let (done, pending) = Pending::channel();
        self.submit(Job::Send(payload.into(), done));
        pending
    }

    /// Queues a payload transaction; `callback` runs on the worker thread with its
    /// result.
    pub fn send_payload_with<F>(&self, payload: impl Into<Vec<u8>>, callback: F)
    where
        F: FnOnce(SendResult<E>) + Send + 'static,
    {
        self.submit(Job::Send(payload.into(), Box::new(callback)));
    }

    fn submit(&self, job: Job<E>) {
        let Some(jobs) = &self.jobs else {
            debug!("worker stopped, cancelling {}", job.name());
            return job.cancel();
        };
        if let Err(SendError(job)) = jobs.send(job) {
            job.cancel();
        }
    }
}

impl<E> TagWorker<E> {
    /// Stops the worker: the transaction in flight fails at its next exchange and
    /// queued jobs are answered with a shutdown error. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.jobs.take().is_some() {
            info!("shutting down tag worker");
        }
        self.shutdown.trip();
    }

    /// Stops accepting jobs, lets the queued ones finish and waits for the thread.
    pub fn join(mut self) -> thread::Result<()> {
        self.jobs = None;
        match self.thread.take() {
            Some(thread) => thread.join(),
            None => Ok(()),
        }
    }
}

impl<E> Drop for TagWorker<E> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shutdown();
            let _ = thread.join();
        }
    }
}

fn worker_loop<C, B>(mut transport: ChainedTransport<C, B>, jobs: Receiver<Job<C::Error>>, shutdown: ShutdownSignal)
where
    C: TagChannel,
    B: Buffer,
{
    info!("tag worker started");
    for job in jobs {
        if shutdown.is_tripped() {
            debug!("cancelling queued {}", job.name());
            job.cancel();
            continue;
        }
        debug!("running {}", job.name());
        match job {
            Job::ConfigureTimeout(timeout, done) => {
                done(transport.configure_timeout(timeout).map_err(TransportError::Channel));
            }
            Job::Select(done) => done(transport.select_application()),
            Job::Send(payload, done) => done(transport.send_payload(&payload)),
        }
    }
    info!("tag worker stopped");
}
