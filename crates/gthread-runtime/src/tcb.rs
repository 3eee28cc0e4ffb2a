//! Thread control blocks and the FIFO queues that hold them

use crate::context::ExecutionContext;
use crate::current_arch::SavedRegs;
use gthread_core::{GThreadId, GThreadState, JoinStatus};
use std::collections::VecDeque;

/// Boxed entry closure of a green thread
pub type EntryClosure = Box<dyn FnOnce() -> usize + 'static>;

/// Per-thread bookkeeping
pub struct Tcb {
    pub id: GThreadId,
    pub state: GThreadState,

    /// Taken by the trampoline on first dispatch; `None` for the main thread
    pub entry: Option<EntryClosure>,

    /// Set only when the thread terminates through `exit`
    pub return_value: Option<usize>,

    /// Thread this one is blocked joining, set only while parked in `join`
    pub join_target: Option<GThreadId>,

    /// Threads parked in `join` on this one
    pub joiners: Vec<GThreadId>,

    /// Status handed over by the target's terminal transition
    pub join_result: Option<JoinStatus>,

    /// Present while Running, `None` forever after
    pub context: Option<Box<ExecutionContext>>,
}

impl Tcb {
    /// TCB for the thread that initializes the scheduler
    pub fn main(id: GThreadId) -> Box<Self> {
        Box::new(Tcb::with_context(id, None, ExecutionContext::for_current()))
    }

    /// TCB for a created thread
    pub fn with_context(
        id: GThreadId,
        entry: Option<EntryClosure>,
        context: Box<ExecutionContext>,
    ) -> Self {
        Tcb {
            id,
            state: GThreadState::Running,
            entry,
            return_value: None,
            join_target: None,
            joiners: Vec::new(),
            join_result: None,
            context: Some(context),
        }
    }

    /// Register file to resume, only for a Running thread that owns a context
    ///
    /// This is the single gate the dispatcher uses: a terminated thread can
    /// never be resumed because it has no resume point.
    #[inline]
    pub fn resume_point(&self) -> Option<*const SavedRegs> {
        match (&self.state, &self.context) {
            (GThreadState::Running, Some(ctx)) => Some(ctx.resume_point()),
            _ => None,
        }
    }

    /// Save area for switching away from this thread
    #[inline]
    pub fn save_area(&mut self) -> Option<*mut SavedRegs> {
        self.context.as_mut().map(|ctx| ctx.save_area())
    }

    /// Move to a terminal state and hand back the context for disposal
    pub fn retire(&mut self, state: GThreadState) -> Option<Box<ExecutionContext>> {
        debug_assert!(state.is_terminated());
        self.state = state;
        self.join_target = None;
        self.entry = None;
        self.context.take()
    }

    /// Status a joiner observes once this thread has terminated
    pub fn terminal_status(&self) -> Option<JoinStatus> {
        match self.state {
            GThreadState::Running => None,
            GThreadState::Cancelled => Some(JoinStatus::Cancelled),
            GThreadState::Done => Some(JoinStatus::Finished(self.return_value.unwrap_or(0))),
        }
    }
}

impl std::fmt::Debug for Tcb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tcb")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("join_target", &self.join_target)
            .field("joiners", &self.joiners)
            .finish_non_exhaustive()
    }
}

/// FIFO of owned TCBs
///
/// Push-back, pop-front, front and is-empty are O(1); lookup and removal by
/// id are linear scans.
#[derive(Debug, Default)]
pub struct TcbQueue {
    inner: VecDeque<Box<Tcb>>,
}

impl TcbQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        TcbQueue {
            inner: VecDeque::with_capacity(cap),
        }
    }

    #[inline]
    pub fn push_back(&mut self, tcb: Box<Tcb>) {
        self.inner.push_back(tcb);
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<Box<Tcb>> {
        self.inner.pop_front()
    }

    #[inline]
    pub fn front(&self) -> Option<&Tcb> {
        self.inner.front().map(|b| &**b)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn find(&self, id: GThreadId) -> Option<&Tcb> {
        self.inner.iter().find(|t| t.id == id).map(|b| &**b)
    }

    pub fn find_mut(&mut self, id: GThreadId) -> Option<&mut Tcb> {
        self.inner.iter_mut().find(|t| t.id == id).map(|b| &mut **b)
    }

    /// Remove by id, preserving the order of the others
    pub fn remove(&mut self, id: GThreadId) -> Option<Box<Tcb>> {
        let pos = self.inner.iter().position(|t| t.id == id)?;
        self.inner.remove(pos)
    }

    /// Make sure `total` entries fit without reallocating
    pub fn ensure_capacity(&mut self, total: usize) {
        if total > self.inner.capacity() {
            self.inner.reserve(total - self.inner.len());
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tcb> {
        self.inner.iter().map(|b| &**b)
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Box<Tcb>> + '_ {
        self.inner.drain(..)
    }
}
