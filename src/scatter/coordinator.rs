//! Scatter-gather sessions.
//!
//! A session sends one request to a fixed set of nodes and gathers their
//! replies until either every node has answered or the deadline passes with no
//! further progress. Every reply pushes the deadline out to `now + window`.
//! The merge and the completion callback run exactly once, whichever trigger
//! fires first.

use super::codec::DynCodec;
use super::reducer::Reducer;
use super::transport::{Destination, DynReplyHandler, DynTransport, NodeAddr, ReplyHandler};
use crate::config::ScatterConfig;
use crate::error::{GeoshardError, Result};
use crate::protocol::{Envelope, Message, Request, Response};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

type OnComplete = Box<dyn FnOnce(Response, Request) + Send>;

/// Upper bound for a deadline when `now + window` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

struct Completion {
    reducer: Box<dyn Reducer>,
    on_complete: OnComplete,
}

struct Gather {
    replies: Vec<(NodeAddr, Bytes)>,
    closed: bool,
}

struct SessionInner {
    id: Uuid,
    request: Request,
    targets: Vec<NodeAddr>,
    window: Duration,
    expected: AtomicUsize,
    deadline: Mutex<Instant>,
    wake: Notify,
    gather: Mutex<Gather>,
    completion: Mutex<Option<Completion>>,
    transport: DynTransport,
    codec: DynCodec,
}

impl SessionInner {
    fn is_closed(&self) -> bool {
        self.gather.lock().closed
    }

    fn on_reply(&self, source: NodeAddr, data: Bytes) -> bool {
        {
            let mut gather = self.gather.lock();
            if gather.closed {
                log::debug!(
                    "Ignoring late reply from {} to closed session {}",
                    source,
                    self.id
                );
                return false;
            }
            gather.replies.push((source, data));
        }

        let remaining = match self
            .expected
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        };

        if remaining > 0 {
            *self.deadline.lock() = deadline_after(self.window);
            self.wake.notify_one();
            log::debug!(
                "Session {} awaiting {} more replies",
                self.id,
                remaining
            );
        } else {
            *self.deadline.lock() = Instant::now();
            self.close();
        }
        true
    }

    fn close(&self) -> bool {
        let replies = {
            let mut gather = self.gather.lock();
            if gather.closed {
                return false;
            }
            gather.closed = true;
            std::mem::take(&mut gather.replies)
        };
        self.transport.unregister(self.id);
        self.wake.notify_one();

        let Some(completion) = self.completion.lock().take() else {
            return false;
        };

        log::info!(
            "Closing session {} with {} of {} replies",
            self.id,
            replies.len(),
            self.targets.len()
        );

        let reducer = completion.reducer;
        let mut result = reducer.empty();
        for (source, data) in replies {
            match self.codec.decode(&data) {
                Ok(Envelope {
                    request_id,
                    body: Message::Response(response),
                }) if request_id == self.id => {
                    result = reducer.reduce(result, response);
                }
                Ok(envelope) => log::warn!(
                    "Session {} received an unexpected message from {} for request {}",
                    self.id,
                    source,
                    envelope.request_id
                ),
                Err(e) => log::warn!(
                    "Session {} could not decode reply from {}: {}",
                    self.id,
                    source,
                    e
                ),
            }
        }

        (completion.on_complete)(result, self.request.clone());
        true
    }
}

/// Waits for the deadline, re-arming whenever a reply moves it.
async fn run_deadline(inner: Arc<SessionInner>) {
    loop {
        if inner.is_closed() {
            return;
        }
        let deadline = *inner.deadline.lock();
        if Instant::now() >= deadline {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = inner.wake.notified() => {}
        }
    }
    if inner.close() {
        log::debug!("Session {} closed by deadline", inner.id);
    }
}

struct SessionHandler(Weak<SessionInner>);

impl ReplyHandler for SessionHandler {
    fn on_message(&self, source: Destination, data: Bytes) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_reply(source.node, data);
        }
    }
}

/// Handle to an open or closed scatter-gather session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Id of the session, also the request id and the reply channel.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// Deduplicated, sorted targets fixed at open.
    pub fn targets(&self) -> &[NodeAddr] {
        &self.inner.targets
    }

    /// Record an encoded reply. Returns `false` if the session was already closed.
    ///
    /// The transport calls this through the handler registered at open; it is
    /// public for transports that deliver replies by other means.
    pub fn on_reply(&self, source: NodeAddr, data: Bytes) -> bool {
        self.inner.on_reply(source, data)
    }

    /// Merge whatever has arrived and run the completion callback.
    ///
    /// Only the first call, from here or from either internal trigger, does
    /// anything; later calls return `false`.
    pub fn close(&self) -> bool {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Replies still expected.
    pub fn pending(&self) -> usize {
        self.inner.expected.load(Ordering::Acquire)
    }

    pub fn deadline(&self) -> Instant {
        *self.inner.deadline.lock()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("targets", &self.inner.targets)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens scatter-gather sessions over a transport.
#[derive(Clone)]
pub struct ScatterGather {
    transport: DynTransport,
    codec: DynCodec,
    config: ScatterConfig,
}

impl ScatterGather {
    pub fn new(transport: DynTransport, codec: DynCodec, config: ScatterConfig) -> Self {
        Self {
            transport,
            codec,
            config,
        }
    }

    pub fn transport(&self) -> &DynTransport {
        &self.transport
    }

    pub fn config(&self) -> &ScatterConfig {
        &self.config
    }

    /// Send `request` to every target and gather the replies.
    ///
    /// `on_complete` receives the reduced result and the original request
    /// exactly once. Sends run in the background; a failed send is logged and
    /// counts as a target that never replies. With no targets the session
    /// completes before this returns, with the reducer's empty value.
    ///
    /// # Errors
    ///
    /// Fails only if the request cannot be encoded.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open<I, R, F>(
        &self,
        targets: I,
        request: Request,
        reducer: R,
        on_complete: F,
    ) -> Result<Session>
    where
        I: IntoIterator<Item = NodeAddr>,
        R: Reducer,
        F: FnOnce(Response, Request) + Send + 'static,
    {
        let mut targets: Vec<NodeAddr> = targets.into_iter().collect();
        targets.sort();
        targets.dedup();

        let id = Uuid::new_v4();
        let data = self
            .codec
            .encode(&Envelope::request(id, request.clone()))?;
        let window = self.config.window();

        let inner = Arc::new(SessionInner {
            id,
            request,
            expected: AtomicUsize::new(targets.len()),
            targets,
            window,
            deadline: Mutex::new(deadline_after(window)),
            wake: Notify::new(),
            gather: Mutex::new(Gather {
                replies: Vec::new(),
                closed: false,
            }),
            completion: Mutex::new(Some(Completion {
                reducer: Box::new(reducer),
                on_complete: Box::new(on_complete),
            })),
            transport: self.transport.clone(),
            codec: self.codec.clone(),
        });
        let session = Session {
            inner: inner.clone(),
        };

        if inner.targets.is_empty() {
            log::debug!("Session {} has no targets", id);
            inner.close();
            return Ok(session);
        }

        let handler: DynReplyHandler = Arc::new(SessionHandler(Arc::downgrade(&inner)));
        self.transport.register(id, handler);
        tokio::spawn(run_deadline(inner.clone()));

        for target in &inner.targets {
            let transport = self.transport.clone();
            let dest = Destination::service(target.clone());
            let data = data.clone();
            tokio::spawn(async move {
                if let Err(e) = transport.send(dest.clone(), id, data).await {
                    log::warn!("Failed to send request {} to {}: {}", id, dest.node, e);
                }
            });
        }

        log::info!(
            "Opened session {} over {} nodes",
            id,
            inner.targets.len()
        );
        Ok(session)
    }

    /// [`open`](Self::open) and wait for the merged result.
    pub async fn request<I, R>(&self, targets: I, request: Request, reducer: R) -> Result<Response>
    where
        I: IntoIterator<Item = NodeAddr>,
        R: Reducer,
    {
        let (tx, rx) = oneshot::channel();
        self.open(targets, request, reducer, move |response, _| {
            let _ = tx.send(response);
        })?;
        rx.await
            .map_err(|_| GeoshardError::Transport("session ended without a result".into()))
    }
}

impl fmt::Debug for ScatterGather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScatterGather")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
