use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One named, timed node of a profile tree.
///
/// Children are owned top-down and kept in the order they were opened. The
/// parent of a node is only reachable while walking the tree, see
/// [`Span::walk`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub end_time: Option<DateTime<Utc>>,
    /// Elapsed nanoseconds, present once the span is closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub depth: usize,
    #[serde(default)]
    pub children: Vec<Span>,
}

impl Span {
    pub fn is_closed(&self) -> bool {
        self.duration.is_some()
    }

    pub fn duration_ms(&self) -> Option<f64> {
        self.duration.map(|ns| ns as f64 / 1_000_000.0)
    }

    /// Number of spans in this subtree, including `self`.
    pub fn span_count(&self) -> usize {
        1 + self.children.iter().map(Span::span_count).sum::<usize>()
    }

    /// Depth-first pre-order walk that hands every node its parent.
    pub fn walk<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Span, Option<&'a Span>),
    {
        self.walk_from(None, f);
    }

    fn walk_from<'a, F>(&'a self, parent: Option<&'a Span>, f: &mut F)
    where
        F: FnMut(&'a Span, Option<&'a Span>),
    {
        f(self, parent);
        for child in &self.children {
            child.walk_from(Some(self), f);
        }
    }

    pub fn find(&self, name: &str) -> Option<&Span> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name.as_str()).collect()
    }
}
