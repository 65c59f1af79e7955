//! Item domain model
//!
//! An item is anything whose lifecycle is tracked by the engine: it carries
//! a current state, a desired state and an arbitrary payload.

use super::id::ItemId;

/// A reconciled item
///
/// The state bookkeeping fields are only writable from inside the crate
/// (registry update path and the reconciler). Transition handlers receive
/// `&mut Item<T>` and may change the payload freely.
#[derive(Debug, Clone, PartialEq)]
pub struct Item<T> {
    id: ItemId,
    curr_state: String,
    desired_state: String,
    payload: T,
}

impl<T> Item<T> {
    /// Creates an item with a generated ID
    pub fn new(curr_state: impl Into<String>, desired_state: impl Into<String>, payload: T) -> Self {
        Self::with_id(ItemId::generate(), curr_state, desired_state, payload)
    }

    /// Creates an item with a caller-supplied ID
    pub fn with_id(
        id: ItemId,
        curr_state: impl Into<String>,
        desired_state: impl Into<String>,
        payload: T,
    ) -> Self {
        Self {
            id,
            curr_state: curr_state.into(),
            desired_state: desired_state.into(),
            payload,
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn curr_state(&self) -> &str {
        &self.curr_state
    }

    pub fn desired_state(&self) -> &str {
        &self.desired_state
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    /// Consumes the item, returning its payload
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Returns true if the current state differs from the desired state
    pub fn is_discrepant(&self) -> bool {
        self.curr_state != self.desired_state
    }

    pub(crate) fn set_curr_state(&mut self, state: impl Into<String>) {
        self.curr_state = state.into();
    }

    pub(crate) fn set_states(&mut self, curr: impl Into<String>, desired: impl Into<String>) {
        self.curr_state = curr.into();
        self.desired_state = desired.into();
    }
}
