//! Serializing, coalescing queue between UI actions and the engine.
//!
//! Every UI-originated command goes through [`DispatchQueue::submit`]. Items
//! run strictly one at a time in submission order. Bursts of pointer moves,
//! pans and zooms submitted while earlier work is still in flight are folded
//! into a single pending item per class, and every folded submitter shares
//! that item's [`Ticket`].

use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use serde_json::Value;
use shared::{
    domain::RenderTarget,
    protocol::{CoalescingClass, Command, Request},
};
use tokio::{runtime::Handle, sync::oneshot};
use tracing::{debug, error, warn};

use crate::{channel::CommandChannel, error::DispatchError, render::RenderScheduler};

type TicketFuture = Shared<BoxFuture<'static, Result<Value, DispatchError>>>;

/// Awaitable result of a submission.
#[derive(Clone)]
pub struct Ticket {
    sequence: u64,
    inner: TicketFuture,
}

impl Ticket {
    fn pending(sequence: u64) -> (Self, oneshot::Sender<Result<Value, DispatchError>>) {
        let (tx, rx) = oneshot::channel();
        let inner = rx
            .map(|received| received.unwrap_or(Err(DispatchError::Dropped)))
            .boxed()
            .shared();
        (Self { sequence, inner }, tx)
    }

    /// Queue position of the item this ticket resolves with. Coalesced
    /// submissions share the sequence of the item they merged into.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl Future for Ticket {
    type Output = Result<Value, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

enum Job {
    Request {
        request: Request,
        /// Render target active when the request was submitted.
        target: RenderTarget,
    },
    /// Disable the previous view and paint the newly active one.
    SwitchTarget {
        previous: RenderTarget,
        next: RenderTarget,
    },
}

impl Job {
    fn describe(&self) -> String {
        match self {
            Self::Request { request, target } => match request.kind.to_command(target.address()) {
                Some(command) => command.path().to_string(),
                None => format!("{target}/renderFrame"),
            },
            Self::SwitchTarget { previous, .. } => format!("{previous}/enabled"),
        }
    }
}

struct QueueItem {
    sequence: u64,
    job: Job,
    ticket: Ticket,
    responder: oneshot::Sender<Result<Value, DispatchError>>,
}

#[derive(Default)]
struct DispatchState {
    queue: VecDeque<QueueItem>,
    running: bool,
    /// Sequence of the waiting representative of each coalescing class.
    pending: [Option<u64>; 3],
    next_sequence: u64,
}

impl DispatchState {
    /// Folds `request` into its class's waiting representative, if any.
    fn absorb(&mut self, request: &Request) -> Option<Ticket> {
        let class = request.coalescing_class()?;
        let sequence = self.pending[class.index()]?;
        let item = self.queue.iter_mut().find(|item| item.sequence == sequence)?;
        let Job::Request { request: waiting, .. } = &mut item.job else {
            return None;
        };
        waiting.merge(request).then(|| item.ticket.clone())
    }

    /// Keeps only `class`'s slot; `None` clears them all.
    fn retain_slot(&mut self, class: Option<CoalescingClass>) {
        for other in CoalescingClass::ALL {
            if Some(other) != class {
                self.pending[other.index()] = None;
            }
        }
    }

    fn push(&mut self, job: Job, class: Option<CoalescingClass>) -> Ticket {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let (ticket, responder) = Ticket::pending(sequence);
        self.queue.push_back(QueueItem {
            sequence,
            job,
            ticket: ticket.clone(),
            responder,
        });
        if let Some(class) = class {
            self.pending[class.index()] = Some(sequence);
        }
        ticket
    }

    fn next(&mut self) -> Option<QueueItem> {
        let item = self.queue.pop_front()?;
        for slot in &mut self.pending {
            if *slot == Some(item.sequence) {
                *slot = None;
            }
        }
        Some(item)
    }
}

struct Inner {
    state: Mutex<DispatchState>,
    channel: Arc<CommandChannel>,
    render: Arc<RenderScheduler>,
}

/// Cloneable handle to the single dispatcher of an application.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<Inner>,
}

impl DispatchQueue {
    pub fn new(channel: Arc<CommandChannel>, render: Arc<RenderScheduler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(DispatchState::default()),
                channel,
                render,
            }),
        }
    }

    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.inner.channel
    }

    pub fn render_scheduler(&self) -> &Arc<RenderScheduler> {
        &self.inner.render
    }

    /// Queues `request` and returns a ticket for its result.
    ///
    /// Must be called from within a Tokio runtime; otherwise the ticket
    /// resolves with [`DispatchError::NoRuntime`].
    pub fn submit(&self, request: Request) -> Ticket {
        let target = self.inner.render.active_target();
        let class = request.coalescing_class();
        let mut state = self.lock();
        if let Some(ticket) = state.absorb(&request) {
            state.retain_slot(class);
            return ticket;
        }
        state.retain_slot(class);
        let ticket = state.push(Job::Request { request, target }, class);
        self.start(state);
        ticket
    }

    /// Makes `target` the rendered view.
    ///
    /// The previous target is disabled and the new one rendered exactly once.
    /// Returns `None` when `target` is already active.
    pub fn set_active_target(&self, target: RenderTarget) -> Option<Ticket> {
        let previous = self.inner.render.switch_target(target.clone())?;
        debug!(from = %previous, to = %target, "switching render target");
        let mut state = self.lock();
        state.retain_slot(None);
        let ticket = state.push(
            Job::SwitchTarget {
                previous,
                next: target,
            },
            None,
        );
        self.start(state);
        Some(ticket)
    }

    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        !state.running && state.queue.is_empty()
    }

    /// Items waiting to be dispatched, not counting the one in flight.
    pub fn pending_len(&self) -> usize {
        self.lock().queue.len()
    }

    fn start(&self, mut state: MutexGuard<'_, DispatchState>) {
        if state.running {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                state.running = true;
                drop(state);
                handle.spawn(self.clone().drain());
            }
            Err(_) => {
                let stranded: Vec<_> = state.queue.drain(..).collect();
                state.retain_slot(None);
                drop(state);
                for item in stranded {
                    let command = item.job.describe();
                    error!(command = %command, "no async runtime to dispatch on");
                    let _ = item.responder.send(Err(DispatchError::NoRuntime { command }));
                }
            }
        }
    }

    async fn drain(self) {
        // let submissions made in the same turn coalesce first
        tokio::task::yield_now().await;
        loop {
            let item = {
                let mut state = self.lock();
                match state.next() {
                    Some(item) => item,
                    None => {
                        state.running = false;
                        return;
                    }
                }
            };
            let command = item.job.describe();
            debug!(sequence = item.sequence, command = %command, "dispatching");
            let result = AssertUnwindSafe(self.execute(item.job))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(command = %command, "dispatch panicked");
                    Err(DispatchError::Internal { command })
                });
            if item.responder.send(result).is_err() {
                debug!(sequence = item.sequence, "ticket dropped before completion");
            }
        }
    }

    async fn execute(&self, job: Job) -> Result<Value, DispatchError> {
        let channel = &self.inner.channel;
        let render = &self.inner.render;
        match job {
            Job::Request { request, target } => {
                if request.invalidate {
                    render.invalidate();
                }
                let Some(command) = request.kind.to_command(target.address()) else {
                    return Ok(render.render_target(channel, &target).await?);
                };
                let result = channel.send(&command).await;
                render.after_command(channel, &target, request.render).await;
                Ok(result?)
            }
            Job::SwitchTarget { previous, next } => {
                let disable = Command::new(previous.address().clone(), "enabled", vec![false.into()]);
                if let Err(err) = channel.send(&disable).await {
                    warn!(target = %previous, "failed to disable previous view: {err}");
                }
                Ok(render.render_target(channel, &next).await?)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
