//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a location is read,
//! the current computation is registered as one of its dependents.
//!
//! # Implementation
//!
//! Each store owns an explicit stack of frames. Running a computation pushes
//! a frame holding it; the guard returned by [`ReactiveContext::enter`] pops
//! the frame when dropped, so an inner run restores the outer computation as
//! active even if the body panics. [`ReactiveContext::pause`] pushes an empty
//! frame, which suspends tracking until it is popped.
//!
//! The stack is per store rather than per thread, so independent stores
//! never see each other's computations.

use std::cell::RefCell;
use std::rc::Rc;

use super::subscriber::{ComputationId, Subscriber};

type Frame = Option<Rc<dyn Subscriber>>;

/// The active-computation stack of one store.
#[derive(Default)]
pub(crate) struct ReactiveContext {
    frames: RefCell<Vec<Frame>>,
}

/// Guard that pops the frame when dropped.
pub(crate) struct ContextGuard<'a> {
    context: &'a ReactiveContext,
    expected: Option<ComputationId>,
}

impl ReactiveContext {
    /// Make `subscriber` the active computation until the guard drops.
    pub(crate) fn enter(&self, subscriber: Rc<dyn Subscriber>) -> ContextGuard<'_> {
        let expected = Some(subscriber.id());
        self.frames.borrow_mut().push(Some(subscriber));
        ContextGuard {
            context: self,
            expected,
        }
    }

    /// Suspend tracking until the guard drops.
    pub(crate) fn pause(&self) -> ContextGuard<'_> {
        self.frames.borrow_mut().push(None);
        ContextGuard {
            context: self,
            expected: None,
        }
    }

    /// The computation reads should be attributed to, if any.
    pub(crate) fn current(&self) -> Option<Rc<dyn Subscriber>> {
        self.frames.borrow().last().cloned().flatten()
    }

    pub(crate) fn current_id(&self) -> Option<ComputationId> {
        self.frames
            .borrow()
            .last()
            .and_then(|frame| frame.as_ref().map(|subscriber| subscriber.id()))
    }

    pub(crate) fn is_tracking(&self) -> bool {
        matches!(self.frames.borrow().last(), Some(Some(_)))
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.context.frames.borrow_mut().pop();

        // Verify we're popping the right frame.
        if let Some(frame) = popped {
            debug_assert_eq!(
                frame.as_ref().map(|subscriber| subscriber.id()),
                self.expected,
                "ReactiveContext mismatch"
            );
        }
    }
}
