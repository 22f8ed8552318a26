//! The engine task (§4.3, §4.5, §5): the single-owner actor that holds the
//! queue, the lock arbiter, the parser state, and the transport, and
//! serializes every entry point — public API calls, inbound bytes, and
//! timer fires — through one `tokio::select!` loop.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, Sleep};

use crate::config::{EngineOptions, WATCHDOG_PERIOD};
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::lock::LockArbiter;
use crate::payload::IntoPayload;
use crate::queue::{Exchange, RequestQueue};
use crate::transport::{self, LinkEvent};
use crate::wire::{self, PayloadStep, Reply, StatusOutcome};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Engine state (§3): exactly one of these at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Idle,
    Sending,
    Reading,
}

/// A transport factory, called once at startup and again on every
/// reconnect attempt. Boxed so the concrete stream type (a real serial
/// port, or an in-memory duplex half in tests) is erased from the public
/// [`EngineHandle`] surface.
pub(crate) type Opener<T> = Box<dyn FnMut() -> io::Result<T> + Send>;

enum Command {
    Send {
        payload: Bytes,
        prepend: bool,
        reply: oneshot::Sender<Result<Reply>>,
    },
    Lock {
        reply: oneshot::Sender<oneshot::Receiver<()>>,
    },
    Unlock,
    Close,
    Clear,
}

/// Handle to a running engine task. Cloning shares the same underlying
/// engine; dropping every clone closes the command channel, which causes
/// the engine task to run `close()` and exit.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    events: EventSink,
    locked_flag: Arc<AtomicBool>,
}

/// RAII guard returned by [`EngineHandle::lock`]. Releases the lock when
/// dropped, regardless of whether that happens because the guard went out
/// of scope normally, an error propagated past it, or the future holding it
/// was cancelled.
pub struct LockGuard {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Unlock);
    }
}

impl EngineHandle {
    /// Enqueues `payload` at the tail of the request queue.
    pub async fn send<P: IntoPayload>(&self, payload: P) -> Result<Reply> {
        self.send_with(payload.into_payload(), false).await
    }

    /// Enqueues `payload` ahead of every pending (not yet dispatched)
    /// exchange, without displacing one already in flight (§8 invariant 3).
    pub async fn send_prepend<P: IntoPayload>(&self, payload: P) -> Result<Reply> {
        self.send_with(payload.into_payload(), true).await
    }

    async fn send_with(&self, payload: Bytes, prepend: bool) -> Result<Reply> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send {
                payload,
                prepend,
                reply,
            })
            .map_err(|_| Error::Disconnected)?;
        rx.await.map_err(|_| Error::Disconnected)?
    }

    /// Acquires the cooperative lock, queueing behind any earlier acquirer
    /// (§4.4). Release happens when the returned guard is dropped.
    pub async fn lock(&self) -> Result<LockGuard> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Lock { reply })
            .map_err(|_| Error::Disconnected)?;
        let grant = rx.await.map_err(|_| Error::Disconnected)?;
        grant.await.map_err(|_| Error::Disconnected)?;
        Ok(LockGuard {
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Releases the oldest outstanding lock. Prefer letting the
    /// [`LockGuard`] from [`Self::lock`] drop; this exists for callers
    /// migrating from the original driver's explicit `unlock()` call.
    pub fn unlock(&self) {
        let _ = self.cmd_tx.send(Command::Unlock);
    }

    /// Runs `f` with the lock held, releasing it on every exit path —
    /// including `f`'s own error return and the returned future being
    /// dropped before completion.
    pub async fn sequence<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(EngineHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.lock().await?;
        f(self.clone()).await
    }

    /// Whether at least one lock is currently held.
    pub fn locked(&self) -> bool {
        self.locked_flag.load(Ordering::Acquire)
    }

    /// Idempotently tears down the connection: fails every pending
    /// exchange with `Cleared`, releases every lock, and stops reconnect
    /// attempts. Subsequent `send` calls reject with `Disconnected`.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }

    /// Fails every pending exchange with `Cleared` and releases every lock,
    /// without closing the transport or stopping reconnect attempts.
    pub fn clear(&self) {
        let _ = self.cmd_tx.send(Command::Clear);
    }

    /// Subscribes to the engine's event stream (§6).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

async fn sleep_opt(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// The engine task's owned state. `T` is the concrete transport stream
/// type; it never appears in [`EngineHandle`], so callers and tests can
/// instantiate this with a real serial port or an in-memory duplex half
/// interchangeably.
struct Engine<T> {
    instance_id: u64,
    options: EngineOptions,
    state: State,
    queue: RequestQueue,
    lock_arbiter: LockArbiter,
    locked_flag: Arc<AtomicBool>,
    events: EventSink,
    closing: bool,
    opener: Opener<T>,
    writer: Option<WriteHalf<T>>,
    reader_handle: Option<JoinHandle<()>>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    watchdog: Option<Pin<Box<Sleep>>>,
    reconnect: Option<Pin<Box<Sleep>>>,
}

/// Spawns the engine task, opening the transport once via `opener` before
/// returning (§4.5: "on construction the Supervisor opens the Transport").
pub(crate) fn spawn<T>(mut opener: Opener<T>, options: EngineOptions) -> io::Result<EngineHandle>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let instance_id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (link_tx, link_rx) = mpsc::unbounded_channel();
    let (events, _initial_subscriber) = EventSink::new();
    let locked_flag = Arc::new(AtomicBool::new(false));

    let stream = opener()?;
    let (reader, writer) = tokio::io::split(stream);
    let reader_handle = transport::spawn_reader(reader, link_tx.clone());

    let engine = Engine {
        instance_id,
        options,
        state: State::Idle,
        queue: RequestQueue::new(),
        lock_arbiter: LockArbiter::new(),
        locked_flag: locked_flag.clone(),
        events: events.clone(),
        closing: false,
        opener,
        writer: Some(writer),
        reader_handle: Some(reader_handle),
        link_tx,
        link_rx,
        cmd_rx,
        watchdog: None,
        reconnect: None,
    };

    tracing::debug!(instance = instance_id, "engine started");
    tokio::spawn(engine.run());

    Ok(EngineHandle {
        cmd_tx,
        events,
        locked_flag,
    })
}

impl<T> Engine<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            self.do_close();
                            break;
                        }
                    }
                }
                link = self.link_rx.recv() => {
                    if let Some(event) = link {
                        self.handle_link_event(event).await;
                    }
                }
                _ = sleep_opt(&mut self.watchdog) => {
                    self.on_watchdog_fire().await;
                }
                _ = sleep_opt(&mut self.reconnect) => {
                    self.on_reconnect_fire();
                }
            }
        }
        tracing::debug!(instance = self.instance_id, "engine task exiting");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Send {
                payload,
                prepend,
                reply,
            } => {
                if self.writer.is_none() {
                    let _ = reply.send(Err(Error::Disconnected));
                    return;
                }
                let exchange = Exchange::new(payload, reply);
                if prepend {
                    if matches!(self.state, State::Sending | State::Reading) {
                        self.queue.push_after_head(exchange);
                    } else {
                        self.queue.push_head(exchange);
                    }
                } else {
                    self.queue.push_tail(exchange);
                }
                self.advance().await;
            }
            Command::Lock { reply } => {
                let grant = self.lock_arbiter.acquire();
                self.sync_locked_flag();
                let _ = reply.send(grant);
            }
            Command::Unlock => {
                self.lock_arbiter.release();
                self.sync_locked_flag();
            }
            Command::Close => self.do_close(),
            Command::Clear => self.do_clear(),
        }
    }

    fn sync_locked_flag(&self) {
        self.locked_flag
            .store(self.lock_arbiter.locked(), Ordering::Release);
    }

    /// The scheduling primitive (§4.3): if Idle with a non-empty queue and
    /// an open transport, writes the head's payload and arms the watchdog.
    async fn advance(&mut self) {
        if self.state != State::Idle || self.queue.is_empty() {
            return;
        }
        let Some(writer) = self.writer.as_mut() else {
            self.queue.fail_all(Error::Disconnected);
            return;
        };
        let payload = self
            .queue
            .peek_head_mut()
            .expect("queue non-empty was just checked")
            .payload
            .clone();

        match writer.write_all(&payload).await {
            Ok(()) => {
                self.state = State::Sending;
                self.arm_watchdog();
                tracing::debug!(instance = self.instance_id, len = payload.len(), "dispatched head exchange");
            }
            Err(e) => {
                tracing::error!(instance = self.instance_id, error = %e, "write to transport failed");
                self.fail_head_and_reconnect(Error::Io(e.to_string()));
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened => {
                self.cancel_reconnect();
                self.events.emit(Event::Open);
                self.advance().await;
            }
            LinkEvent::Data(bytes) => {
                self.on_data(&bytes).await;
            }
            LinkEvent::Closed => {
                self.events.emit(Event::Close);
                if self.closing {
                    self.teardown_transport();
                } else {
                    self.fail_head_and_reconnect(Error::Disconnected);
                }
            }
            LinkEvent::Error(e) => {
                tracing::error!(instance = self.instance_id, error = %e, "transport error");
                self.events.emit(Event::Error(e.to_string()));
                self.fail_head_and_reconnect(Error::Io(e.to_string()));
            }
        }
    }

    /// Parses one inbound delivery, re-feeding bytes left over after a
    /// terminal completion as a fresh reply (§4.1, §8 invariant 7), via an
    /// iterative loop rather than recursion (§9).
    async fn on_data(&mut self, data: &[u8]) {
        let mut i = 0;
        while i < data.len() {
            match self.state {
                State::Sending => {
                    tracing::trace!(instance = self.instance_id, byte = data[i], "status byte");
                    match wire::classify_status(&data[i..]) {
                        StatusOutcome::Complete {
                            result,
                            remainder_start,
                        } => {
                            self.disarm_watchdog();
                            if let Some(mut exchange) = self.queue.pop_head() {
                                exchange.complete(result);
                            }
                            self.state = State::Idle;
                            i += remainder_start;
                            self.advance().await;
                        }
                        StatusOutcome::BeginOutput { remainder_start } => {
                            tracing::debug!(instance = self.instance_id, "Sending -> Reading");
                            self.state = State::Reading;
                            self.arm_watchdog();
                            i += remainder_start;
                        }
                        StatusOutcome::WaitUserConfirm { remainder_start } => {
                            tracing::debug!(instance = self.instance_id, "wait-user-confirm, watchdog disarmed");
                            self.events.emit(Event::WaitUserConfirm);
                            self.disarm_watchdog();
                            i += remainder_start;
                        }
                        StatusOutcome::Locked { remainder_start } => {
                            tracing::warn!(instance = self.instance_id, reject_on_locked = self.options.reject_on_locked, "device reported LOCKED");
                            self.events.emit(Event::Locked);
                            if self.options.reject_on_locked {
                                self.queue.fail_all(Error::Locked);
                                self.disarm_watchdog();
                                self.state = State::Idle;
                            }
                            i += remainder_start;
                        }
                    }
                }
                State::Reading => {
                    let byte = data[i];
                    tracing::trace!(instance = self.instance_id, byte, "payload byte");
                    i += 1;
                    let step = match self.queue.peek_head_mut() {
                        Some(exchange) => wire::feed_payload_byte(
                            byte,
                            &mut exchange.prev_was_escape,
                            &mut exchange.output_buf,
                        ),
                        None => break,
                    };
                    match step {
                        PayloadStep::Continue => self.arm_watchdog(),
                        PayloadStep::Done => {
                            tracing::debug!(instance = self.instance_id, "Reading -> Idle, output complete");
                            self.disarm_watchdog();
                            if let Some(mut exchange) = self.queue.pop_head() {
                                let payload = std::mem::take(&mut exchange.output_buf);
                                exchange.complete(Ok(Reply::Payload(payload)));
                            }
                            self.state = State::Idle;
                            self.advance().await;
                            // Bytes after OUTPUT_END in the same delivery are
                            // discarded, matching the device's own framing.
                            break;
                        }
                    }
                }
                State::Idle => {
                    tracing::trace!(instance = self.instance_id, byte = data[i], "byte received with nothing in flight, discarding");
                    i += 1;
                }
            }
        }
    }

    async fn on_watchdog_fire(&mut self) {
        tracing::warn!(instance = self.instance_id, "watchdog fired");
        self.watchdog = None;
        if let Some(mut exchange) = self.queue.pop_head() {
            exchange.fail(Error::Watchdog);
        }
        self.state = State::Idle;
        self.advance().await;
    }

    fn on_reconnect_fire(&mut self) {
        self.reconnect = None;
        tracing::warn!(instance = self.instance_id, "attempting reconnect");
        match (self.opener)() {
            Ok(stream) => {
                let (reader, writer) = tokio::io::split(stream);
                self.reader_handle = Some(transport::spawn_reader(reader, self.link_tx.clone()));
                self.writer = Some(writer);
                // The reader task immediately emits `Opened` on the link
                // channel, which drives `advance()` on the next loop turn.
            }
            Err(e) => {
                tracing::error!(instance = self.instance_id, error = %e, "reconnect attempt failed");
                self.schedule_reconnect();
            }
        }
    }

    /// Fails the in-flight exchange (if any) and tears down the transport,
    /// unifying the error/close paths (§9(b)): any fault that renders the
    /// port unusable fails the head and schedules a reconnect, whether or
    /// not a distinct `close` notification also arrives.
    fn fail_head_and_reconnect(&mut self, err: Error) {
        self.disarm_watchdog();
        if let Some(mut exchange) = self.queue.pop_head() {
            exchange.fail(err.clone());
            self.events.emit(Event::Failed(err));
        }
        self.teardown_transport();
        self.state = State::Idle;
        self.schedule_reconnect();
    }

    fn teardown_transport(&mut self) {
        self.writer = None;
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
    }

    fn do_clear(&mut self) {
        self.disarm_watchdog();
        self.queue.fail_all(Error::Cleared);
        self.state = State::Idle;
        self.lock_arbiter.release_all();
        self.sync_locked_flag();
    }

    fn do_close(&mut self) {
        if self.closing {
            return;
        }
        self.closing = true;
        self.do_clear();
        self.cancel_reconnect();
        self.teardown_transport();
        self.events.emit(Event::Close);
    }

    fn arm_watchdog(&mut self) {
        self.watchdog = Some(Box::pin(sleep_until(Instant::now() + WATCHDOG_PERIOD)));
    }

    fn disarm_watchdog(&mut self) {
        self.watchdog = None;
    }

    fn schedule_reconnect(&mut self) {
        if self.closing {
            return;
        }
        let deadline = Instant::now() + self.options.reconnect_interval();
        self.reconnect = Some(Box::pin(sleep_until(deadline)));
    }

    fn cancel_reconnect(&mut self) {
        self.reconnect = None;
    }
}
