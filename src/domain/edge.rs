//! Transition edges
//!
//! An edge is an operation that moves an item out of one of its start
//! states. The handler decides at runtime which state the item ends up in;
//! the edge only checks that the answer is one it declared.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use super::id::EdgeId;
use super::item::Item;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EdgeError {
    #[error("Edge {edge} produced undeclared state '{state}'")]
    InvalidTransitionOutput { edge: EdgeId, state: String },
}

type Handler<T> = Box<dyn Fn(&mut Item<T>) -> String + Send + Sync>;

/// A transition between states, carrying the handler that performs it
pub struct TransitionEdge<T> {
    id: EdgeId,
    start_states: BTreeSet<String>,
    end_states: BTreeSet<String>,
    error_end_states: BTreeSet<String>,
    handler: Handler<T>,
}

impl<T> TransitionEdge<T> {
    /// Creates an edge with a generated ID and no error states
    ///
    /// `end_states` are the outcomes the planner may route through. A
    /// handler that can also fail into other states should declare them
    /// with [`with_error_states`](Self::with_error_states).
    pub fn new<S, E, F, R>(start_states: S, end_states: E, handler: F) -> Self
    where
        T: 'static,
        S: IntoIterator,
        S::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
        F: Fn(&mut Item<T>) -> R + Send + Sync + 'static,
        R: Into<String>,
    {
        Self {
            id: EdgeId::generate(),
            start_states: start_states.into_iter().map(Into::into).collect(),
            end_states: end_states.into_iter().map(Into::into).collect(),
            error_end_states: BTreeSet::new(),
            handler: Box::new(move |item: &mut Item<T>| -> String { handler(item).into() }),
        }
    }

    /// Replaces the generated ID with a caller-supplied one
    pub fn with_id(mut self, id: EdgeId) -> Self {
        self.id = id;
        self
    }

    /// Declares states the handler may report on failure
    ///
    /// Error states are legal outcomes but are never used for planning.
    pub fn with_error_states<I>(mut self, states: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.error_end_states = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> &EdgeId {
        &self.id
    }

    pub fn start_states(&self) -> &BTreeSet<String> {
        &self.start_states
    }

    pub fn end_states(&self) -> &BTreeSet<String> {
        &self.end_states
    }

    pub fn error_end_states(&self) -> &BTreeSet<String> {
        &self.error_end_states
    }

    /// Every state this edge mentions, start, end and error alike
    pub fn referenced_states(&self) -> impl Iterator<Item = &String> {
        self.start_states
            .iter()
            .chain(&self.end_states)
            .chain(&self.error_end_states)
    }

    /// Returns true if the edge may fire from `state`
    pub fn can_fire_from(&self, state: &str) -> bool {
        self.start_states.contains(state)
    }

    /// Returns true if `state` is a legal outcome (end or error)
    pub fn produces(&self, state: &str) -> bool {
        self.end_states.contains(state) || self.error_end_states.contains(state)
    }

    /// Runs the handler and validates the reported state
    ///
    /// The item's state bookkeeping is left untouched; on success the caller
    /// decides what to do with the returned state.
    pub fn invoke(&self, item: &mut Item<T>) -> Result<String, EdgeError> {
        let state = (self.handler)(item);
        if self.produces(&state) {
            Ok(state)
        } else {
            Err(EdgeError::InvalidTransitionOutput {
                edge: self.id.clone(),
                state,
            })
        }
    }
}

impl<T> fmt::Debug for TransitionEdge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionEdge")
            .field("id", &self.id)
            .field("start_states", &self.start_states)
            .field("end_states", &self.end_states)
            .field("error_end_states", &self.error_end_states)
            .finish_non_exhaustive()
    }
}
