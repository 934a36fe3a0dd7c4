//! Two-pass vetoable expand/collapse protocol.
//!
//! Every listener is first asked to approve a transition. Only when all of them agree
//! is the transition applied, after which every listener gets an action pass with
//! mutable access to the tree.

use crate::domain::error::DomainResult;
use crate::domain::node::TreeModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Expanding,
    Collapsing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionEvent<Id> {
    pub node: Id,
    pub direction: Direction,
}

/// Result of an expand, collapse or toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The transition happened; `rows` were inserted or removed.
    Applied { direction: Direction, rows: usize },
    /// Listener number `listener` (registration order) vetoed; nothing changed.
    Rejected { listener: usize },
    /// Nothing to do: already in the requested state, a node that cannot have
    /// children, or the hidden root.
    Unchanged,
}

impl ToggleOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ToggleOutcome::Applied { .. })
    }
}

/// Observer of expansion transitions.
pub trait ExpansionListener<M: TreeModel> {
    /// Approval pass. Returning `Ok(false)` vetoes the transition.
    fn approve(&mut self, _model: &M, _event: &ExpansionEvent<M::Id>) -> DomainResult<bool> {
        Ok(true)
    }

    /// Action pass, after the projection has been updated.
    fn on_expansion(&mut self, _model: &mut M, _event: &ExpansionEvent<M::Id>) -> DomainResult<()> {
        Ok(())
    }
}

/// Asks `listeners` in order; returns the index of the first one that vetoes.
pub fn ask_all<M: TreeModel>(
    listeners: &mut [Box<dyn ExpansionListener<M>>],
    model: &M,
    event: &ExpansionEvent<M::Id>,
) -> DomainResult<Option<usize>> {
    for (i, listener) in listeners.iter_mut().enumerate() {
        if !listener.approve(model, event)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

pub fn notify_all<M: TreeModel>(
    listeners: &mut [Box<dyn ExpansionListener<M>>],
    model: &mut M,
    event: &ExpansionEvent<M::Id>,
) -> DomainResult<()> {
    for listener in listeners.iter_mut() {
        listener.on_expansion(model, event)?;
    }
    Ok(())
}
