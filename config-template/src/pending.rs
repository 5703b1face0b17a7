// Async Aggregation
// Pending values, partially settled trees and the set of in-flight work for one pass

use crate::value::Value;

use futures::future::{self, LocalBoxFuture, Shared};
use futures::FutureExt;
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;

/// A settled-or-not result shared between the tree it sits in and the
/// aggregate that waits for it
pub type PendingValue = Shared<LocalBoxFuture<'static, Value>>;

/// Either a value available now, or one that settles later
pub enum Outcome<T> {
    Ready(T),
    Pending(LocalBoxFuture<'static, T>),
}

impl<T: 'static> Outcome<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }

    /// The value if it is available without waiting
    pub fn ready(self) -> Option<T> {
        match self {
            Outcome::Ready(value) => Some(value),
            Outcome::Pending(_) => None,
        }
    }

    pub fn into_future(self) -> LocalBoxFuture<'static, T> {
        match self {
            Outcome::Ready(value) => future::ready(value).boxed_local(),
            Outcome::Pending(fut) => fut,
        }
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U + 'static,
    {
        match self {
            Outcome::Ready(value) => Outcome::Ready(f(value)),
            Outcome::Pending(fut) => Outcome::Pending(fut.map(f).boxed_local()),
        }
    }

    /// Wait for the value, resolving immediately when it is ready
    pub async fn settle(self) -> T {
        self.into_future().await
    }
}

impl<T> fmt::Debug for Outcome<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Outcome::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// One step of a path from the root of a tree to a leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

/// A tree whose leaves may still be in flight
#[derive(Clone)]
pub enum Partial {
    Ready(Value),
    Array(Vec<Partial>),
    Object(IndexMap<String, Partial>),
    Pending(PendingValue),
}

impl Partial {
    /// Eager shape of a value: containers are opened up so their leaves can be
    /// replaced one at a time
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => Partial::Array(items.iter().map(Partial::from_value).collect()),
            Value::Object(map) => Partial::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Partial::from_value(v)))
                    .collect(),
            ),
            scalar => Partial::Ready(scalar.clone()),
        }
    }

    pub fn pending(value: PendingValue) -> Self {
        // A future that has already produced its value is not pending any more
        match value.peek() {
            Some(settled) => Partial::Ready(settled.clone()),
            None => Partial::Pending(value),
        }
    }

    /// Current best-effort value; leaves still in flight read as null
    pub fn to_value(&self) -> Value {
        match self {
            Partial::Ready(value) => value.clone(),
            Partial::Array(items) => Value::Array(items.iter().map(Partial::to_value).collect()),
            Partial::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Partial::Pending(shared) => shared.peek().cloned().unwrap_or_default(),
        }
    }

    /// True when no leaf is still waiting for its value
    pub fn is_settled(&self) -> bool {
        match self {
            Partial::Ready(_) => true,
            Partial::Array(items) => items.iter().all(Partial::is_settled),
            Partial::Object(map) => map.values().all(Partial::is_settled),
            Partial::Pending(shared) => shared.peek().is_some(),
        }
    }

    /// Replace the node at `path`. Returns false when the path does not exist.
    pub fn set(&mut self, path: &[PathSegment], value: Partial) -> bool {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return true;
        };

        let mut node = self;
        for segment in parents {
            match node.child_mut(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }

        match node.child_mut(last) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, path: &[PathSegment]) -> Option<&Partial> {
        path.iter().try_fold(self, |node, segment| match (node, segment) {
            (Partial::Array(items), PathSegment::Index(i)) => items.get(*i),
            (Partial::Object(map), PathSegment::Key(k)) => map.get(k),
            _ => None,
        })
    }

    /// Swap every settled pending leaf for its value
    pub fn resolve(&mut self) {
        match self {
            Partial::Ready(_) => {}
            Partial::Array(items) => items.iter_mut().for_each(Partial::resolve),
            Partial::Object(map) => map.values_mut().for_each(Partial::resolve),
            Partial::Pending(shared) => {
                if let Some(value) = shared.peek() {
                    *self = Partial::Ready(value.clone());
                }
            }
        }
    }

    fn child_mut(&mut self, segment: &PathSegment) -> Option<&mut Partial> {
        match (self, segment) {
            (Partial::Array(items), PathSegment::Index(i)) => items.get_mut(*i),
            (Partial::Object(map), PathSegment::Key(k)) => map.get_mut(k),
            _ => None,
        }
    }
}

impl From<Outcome<Value>> for Partial {
    fn from(outcome: Outcome<Value>) -> Self {
        match outcome {
            Outcome::Ready(value) => Partial::Ready(value),
            Outcome::Pending(fut) => Partial::pending(fut.shared()),
        }
    }
}

impl fmt::Debug for Partial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partial::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Partial::Array(items) => f.debug_list().entries(items).finish(),
            Partial::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Partial::Pending(shared) => match shared.peek() {
                Some(value) => f.debug_tuple("Settled").field(value).finish(),
                None => f.write_str("Pending"),
            },
        }
    }
}

/// All in-flight work produced while building one environment or walking one tree.
///
/// Members are awaited together and never short-circuit: every member
/// resolves to a value (failures have already been mapped to the sentinel),
/// so the aggregate completes only after all of them have.
#[derive(Default)]
pub struct PendingSet {
    futures: Vec<LocalBoxFuture<'static, ()>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + 'static,
    {
        self.futures.push(fut.boxed_local());
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Combined completion signal for every tracked member
    pub async fn settle(self) {
        future::join_all(self.futures).await;
    }
}

impl fmt::Debug for PendingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSet")
            .field("len", &self.futures.len())
            .finish()
    }
}
