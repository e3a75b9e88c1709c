//! Context-local profiling sessions.
//!
//! A session lives in a thread-local slot while it is being recorded. Code
//! running on a plain thread uses [`start`], [`step`] and [`stop`] directly.
//! Async request handlers may hop between worker threads, so they run inside
//! [`scope`], which carries the session with the future and installs it in
//! the slot only for the duration of each poll.
//!
//! All entry points are infallible: without an active session a step is
//! inert and [`stop`] returns `None`.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use pin_project_lite::pin_project;
use tracing::warn;

use crate::ids::RequestId;
use crate::model::span::Span;
use crate::stack::{ProfileStack, ROOT_NAME, StepToken};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<ActiveSession>> = const { RefCell::new(None) };
}

#[derive(Debug)]
struct ActiveSession {
    serial: u64,
    id: Option<RequestId>,
    predecessor_ids: Vec<RequestId>,
    started_at: DateTime<Utc>,
    stack: ProfileStack,
}

/// A finished profiling session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Option<RequestId>,
    pub predecessor_ids: Vec<RequestId>,
    pub started_at: DateTime<Utc>,
    pub root: Span,
}

/// Starts an anonymous session in the current context.
pub fn start() {
    install(None, Vec::new());
}

/// Starts a session that knows its request id and the ids of the requests
/// that redirected to it.
///
/// Starting while a session is already active replaces it; the replaced
/// session is discarded.
pub fn start_with(id: RequestId, predecessor_ids: Vec<RequestId>) {
    install(Some(id), predecessor_ids);
}

fn install(id: Option<RequestId>, predecessor_ids: Vec<RequestId>) {
    let session = ActiveSession {
        serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
        id,
        predecessor_ids,
        started_at: Utc::now(),
        stack: ProfileStack::new(ROOT_NAME),
    };
    let replaced = CURRENT.with(|slot| slot.borrow_mut().replace(session));
    if let Some(old) = replaced {
        warn!(
            request_id = ?old.id,
            "profiling session started while another was active; discarding the old one"
        );
    }
}

pub fn is_active() -> bool {
    CURRENT.with(|slot| slot.borrow().is_some())
}

/// Opens a named step under the innermost open step.
///
/// Steps must be closed innermost first, on the context that opened them.
/// Dropping the handle closes it.
pub fn step(name: impl Into<String>) -> Step {
    let target = CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        let session = slot.as_mut()?;
        let token = session.stack.push(name)?;
        Some((session.serial, token))
    });
    Step { target }
}

/// Finishes the current session and clears the context-local state.
///
/// Returns `None` when nothing was being recorded.
pub fn stop() -> Option<Session> {
    let active = CURRENT.with(|slot| slot.borrow_mut().take())?;
    Some(Session {
        id: active.id,
        predecessor_ids: active.predecessor_ids,
        started_at: active.started_at,
        root: active.stack.finish(),
    })
}

/// Handle for an open step. Inert when created outside a session.
#[derive(Debug)]
#[must_use = "a step is closed as soon as its handle is dropped"]
pub struct Step {
    target: Option<(u64, StepToken)>,
}

impl Step {
    pub fn is_recording(&self) -> bool {
        self.target.is_some()
    }

    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        let Some((serial, token)) = self.target.take() else {
            return;
        };
        let _ = CURRENT.try_with(|slot| {
            if let Some(session) = slot.borrow_mut().as_mut()
                && session.serial == serial
            {
                session.stack.pop(token);
            }
        });
    }
}

impl Drop for Step {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Binds a future to its own session slot.
///
/// Sessions started inside the future are invisible to other tasks sharing
/// the worker thread, and whatever the future leaves behind is dropped with
/// it rather than leaking into the next task scheduled on that thread.
pub fn scope<F: Future>(inner: F) -> Scoped<F> {
    Scoped { inner, slot: None }
}

pin_project! {
    #[must_use = "futures do nothing unless polled"]
    pub struct Scoped<F> {
        #[pin]
        inner: F,
        slot: Option<ActiveSession>,
    }
}

impl<F: Future> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _entered = Entered::new(this.slot);
        this.inner.poll(cx)
    }
}

/// Swaps a task's session into the thread-local slot for one poll and puts
/// the thread's previous state back afterwards, even on unwind.
struct Entered<'a> {
    slot: &'a mut Option<ActiveSession>,
    outer: Option<ActiveSession>,
}

impl<'a> Entered<'a> {
    fn new(slot: &'a mut Option<ActiveSession>) -> Self {
        let outer = CURRENT.with(|current| current.replace(slot.take()));
        Self { slot, outer }
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        let outer = self.outer.take();
        if let Ok(mine) = CURRENT.try_with(|current| current.replace(outer)) {
            *self.slot = mine;
        }
    }
}
