use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::span::Span;

/// Label given to the root span of every session.
pub const ROOT_NAME: &str = "Request";

/// Identifies one opened step inside a [`ProfileStack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepToken(u64);

#[derive(Debug)]
struct OpenSpan {
    token: StepToken,
    name: String,
    start_time: DateTime<Utc>,
    started: Instant,
    depth: usize,
    children: Vec<Span>,
}

impl OpenSpan {
    fn close(self) -> Span {
        let elapsed = self.started.elapsed();
        let end_time = chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.start_time.checked_add_signed(d))
            .unwrap_or(self.start_time);
        Span {
            name: self.name,
            start_time: self.start_time,
            end_time: Some(end_time),
            duration: Some(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)),
            depth: self.depth,
            children: self.children,
        }
    }
}

/// Nesting stack that builds a [`Span`] tree as steps open and close.
///
/// The bottom of the stack is the root span. Closed spans are moved into
/// their parent's `children`, so the finished tree is owned top-down and
/// sibling order equals open order.
#[derive(Debug)]
pub struct ProfileStack {
    open: Vec<OpenSpan>,
    finished: Option<Span>,
    next_token: u64,
}

impl ProfileStack {
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut stack = Self {
            open: Vec::new(),
            finished: None,
            next_token: 0,
        };
        stack.open_span(root_name.into(), 0);
        stack
    }

    pub fn root_token(&self) -> StepToken {
        StepToken(0)
    }

    /// Opens a child of the innermost open span. Returns `None` once the root
    /// has been closed, since a session has at most one root.
    pub fn push(&mut self, name: impl Into<String>) -> Option<StepToken> {
        let depth = self.open.last()?.depth + 1;
        Some(self.open_span(name.into(), depth))
    }

    /// Closes the step identified by `token`.
    ///
    /// Steps opened after `token` that are still open are closed first, so a
    /// missed or out-of-order close cannot leave the tree inconsistent.
    /// Returns `false` when the step is not open (already closed or foreign).
    pub fn pop(&mut self, token: StepToken) -> bool {
        let Some(pos) = self.open.iter().rposition(|s| s.token == token) else {
            return false;
        };

        let dangling = self.open.len() - pos - 1;
        if dangling > 0 {
            debug!(
                dangling,
                step = %self.open[pos].name,
                "closing step with unclosed descendants"
            );
        }
        while self.open.len() > pos {
            self.close_top();
        }
        true
    }

    /// Number of currently open spans, root included.
    pub fn open_len(&self) -> usize {
        self.open.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Closes every span still open and hands back the root.
    pub fn finish(mut self) -> Span {
        while !self.open.is_empty() {
            self.close_top();
        }
        // The constructor always opens a root, so after draining the stack a
        // finished root is present.
        self.finished.take().unwrap_or_else(|| Span {
            name: ROOT_NAME.to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            depth: 0,
            children: Vec::new(),
        })
    }

    fn open_span(&mut self, name: String, depth: usize) -> StepToken {
        let token = StepToken(self.next_token);
        self.next_token += 1;
        self.open.push(OpenSpan {
            token,
            name,
            start_time: Utc::now(),
            started: Instant::now(),
            depth,
            children: Vec::new(),
        });
        token
    }

    fn close_top(&mut self) {
        let Some(top) = self.open.pop() else {
            return;
        };
        let span = top.close();
        match self.open.last_mut() {
            Some(parent) => parent.children.push(span),
            None => self.finished = Some(span),
        }
    }
}
