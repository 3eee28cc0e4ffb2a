//! Main scheduler implementation
//!
//! One `Scheduler` multiplexes green threads onto the OS thread that started
//! it. All queue and current-thread mutation happens inside the critical
//! section (`MaskLock`), which is the only protection needed against the
//! preemption handler.
//!
//! Every transfer of control goes through one dispatcher: `yield_now`, join
//! parking, exit and the SIGVTALRM handler all pop the ready queue and swap.

use crate::config::SchedulerConfig;
use crate::context::{self, ExecutionContext};
use crate::critical::{MaskGuard, MaskLock};
use crate::current_arch::SavedRegs;
use crate::signal;
use crate::tcb::{EntryClosure, Tcb, TcbQueue};
use crate::timer::PreemptTimer;
use crate::tls;

use gthread_core::error::{SchedError, SchedResult};
use gthread_core::id::{GThreadId, IdAllocator};
use gthread_core::kprint;
use gthread_core::preempt;
use gthread_core::state::{GThreadState, JoinStatus};

// Use kprint macros for debug output
use gthread_core::{kdebug, kerror, kwarn};

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit status used when the last runnable thread dies by panic
const PANIC_EXIT_STATUS: i32 = 101;

/// Everything the critical section protects
pub(crate) struct SchedState {
    /// The running thread
    current: Box<Tcb>,

    /// Runnable threads in dispatch order
    ready: TcbQueue,

    /// Threads parked in `join`
    blocked: TcbQueue,

    /// Terminated threads awaiting `join`
    zombies: TcbQueue,

    ids: IdAllocator,

    /// Contexts of exited threads, unmapped at the next entry from another stack
    graveyard: Vec<Box<ExecutionContext>>,

    /// Save area for a thread switching away for the last time
    scratch: Box<SavedRegs>,
}

type CriticalSection<'a> = MaskGuard<'a, SchedState>;

/// Where the dispatcher puts the thread it switches away from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requeue {
    Ready,
    Blocked,
}

impl SchedState {
    /// Pop the ready queue until a resumable thread turns up
    ///
    /// Anything else is moved to the zombie queue without being touched.
    fn next_runnable(&mut self) -> Option<(Box<Tcb>, *const SavedRegs)> {
        while let Some(tcb) = self.ready.pop_front() {
            match tcb.resume_point() {
                Some(resume) => return Some((tcb, resume)),
                None => self.zombies.push_back(tcb),
            }
        }
        None
    }

    fn lookup(&self, id: GThreadId) -> Option<&Tcb> {
        if self.current.id == id {
            return Some(&*self.current);
        }
        self.ready
            .find(id)
            .or_else(|| self.blocked.find(id))
            .or_else(|| self.zombies.find(id))
    }

    fn lookup_mut(&mut self, id: GThreadId) -> Option<&mut Tcb> {
        if self.current.id == id {
            return Some(&mut *self.current);
        }
        if let Some(t) = self.ready.find_mut(id) {
            return Some(t);
        }
        if let Some(t) = self.blocked.find_mut(id) {
            return Some(t);
        }
        self.zombies.find_mut(id)
    }

    /// Move every joiner from the blocked set to the ready queue with `status`
    fn wake_joiners(&mut self, joiners: Vec<GThreadId>, status: JoinStatus) {
        for id in joiners {
            if let Some(mut joiner) = self.blocked.remove(id) {
                joiner.join_target = None;
                joiner.join_result = Some(status);
                self.ready.push_back(joiner);
            }
        }
    }

    /// Size every queue so a TCB can move anywhere without reallocating
    fn reserve_for(&mut self, extra: usize) {
        let total = 1 + self.ready.len() + self.blocked.len() + self.zombies.len() + extra;
        self.ready.ensure_capacity(total);
        self.blocked.ensure_capacity(total);
        self.zombies.ensure_capacity(total);
    }

    fn live_count(&self) -> usize {
        1 + self.ready.len() + self.blocked.len()
    }
}

/// Green thread scheduler bound to one OS thread
pub struct Scheduler {
    config: SchedulerConfig,

    state: MaskLock<SchedState>,

    /// Set between releasing the critical section and landing on the next
    /// thread; ticks arriving in that window are dropped
    dispatching: AtomicBool,

    timer: Cell<Option<PreemptTimer>>,

    started: Cell<bool>,
}

impl Scheduler {
    /// Create a scheduler with the calling thread registered as id 1
    ///
    /// Nothing is bound to the OS thread until `start`.
    pub fn new(config: SchedulerConfig) -> SchedResult<Box<Self>> {
        config.validate()?;

        let mut ids = IdAllocator::new();
        let main_id = ids.allocate();
        let cap = config.queue_capacity.max(1);

        Ok(Box::new(Scheduler {
            state: MaskLock::new(SchedState {
                current: Tcb::main(main_id),
                ready: TcbQueue::with_capacity(cap),
                blocked: TcbQueue::with_capacity(cap),
                zombies: TcbQueue::with_capacity(cap),
                ids,
                graveyard: Vec::new(),
                scratch: Box::new(SavedRegs::default()),
            }),
            dispatching: AtomicBool::new(false),
            timer: Cell::new(None),
            started: Cell::new(false),
            config,
        }))
    }

    /// Bind to the calling OS thread and arm preemption
    pub fn start(&self) -> SchedResult<()> {
        if self.started.get() || tls::has_scheduler() {
            return Err(SchedError::AlreadyInitialized);
        }

        signal::install_preempt_handler(preempt_handler)?;
        install_panic_hook();

        tls::set_scheduler(self);
        kprint::set_gthread_id(GThreadId::MAIN.as_u64());
        preempt::set_deferred_hook(Some(deferred_tick));

        if self.config.enable_preemption {
            match PreemptTimer::start(self.config.quantum) {
                Ok(timer) => self.timer.set(Some(timer)),
                Err(e) => {
                    preempt::set_deferred_hook(None);
                    tls::clear_scheduler();
                    kprint::clear_gthread_id();
                    return Err(e);
                }
            }
        }

        self.started.set(true);

        if self.config.debug_logging {
            kdebug!(
                "scheduler started (quantum={:?}, preemption={})",
                self.config.quantum,
                self.config.enable_preemption
            );
        }

        Ok(())
    }

    /// Drain, disarm and unbind
    ///
    /// Runs every other runnable thread to completion first. Only the thread
    /// that started the scheduler may call this.
    pub fn shutdown(&self) -> SchedResult<()> {
        if !self.started.get() {
            return Ok(());
        }
        if !self.current_id().is_main() {
            return Err(SchedError::NotMainThread);
        }

        self.drain();

        // Dropping the timer deletes it; stray pending ticks see no scheduler.
        drop(self.timer.take());
        if std::ptr::eq(tls::scheduler_ptr(), self) {
            preempt::set_deferred_hook(None);
            tls::clear_scheduler();
        }
        self.started.set(false);

        let leftover = self.reclaim_all();
        if leftover > 0 {
            kwarn!("shutdown discarded {} thread(s) still blocked in join", leftover);
        }
        kprint::clear_gthread_id();

        Ok(())
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Critical section with exited stacks reaped first
    fn enter(&self) -> CriticalSection<'_> {
        let mut cs = self.state.lock();
        cs.graveyard.clear();
        cs
    }

    /// Run the dispatcher once
    ///
    /// Hands the critical section back when nothing else is runnable.
    /// Otherwise the caller is suspended and this returns once it is
    /// dispatched again.
    fn dispatch<'a>(
        &'a self,
        mut cs: CriticalSection<'a>,
        requeue: Requeue,
    ) -> Result<(), CriticalSection<'a>> {
        let Some((next, to)) = cs.next_runnable() else {
            return Err(cs);
        };

        let mut prev = std::mem::replace(&mut cs.current, next);
        let from = match prev.save_area() {
            Some(regs) => regs,
            None => &mut *cs.scratch as *mut SavedRegs,
        };
        match requeue {
            Requeue::Ready => cs.ready.push_back(prev),
            Requeue::Blocked => cs.blocked.push_back(prev),
        }

        self.switch_to(cs, from, to);
        Ok(())
    }

    /// Release the critical section and swap to the new current thread
    fn switch_to(&self, cs: CriticalSection<'_>, from: *mut SavedRegs, to: *const SavedRegs) {
        kprint::set_gthread_id(cs.current.id.as_u64());
        self.dispatching.store(true, Ordering::SeqCst);
        drop(cs);
        unsafe { context::switch(from, to) };
        self.finish_switch();
    }

    /// First thing a resumed thread does
    #[inline]
    fn finish_switch(&self) {
        self.dispatching.store(false, Ordering::SeqCst);
    }

    /// Preemption tick
    ///
    /// Runs in signal context or at the end of a no-preemption section: no
    /// allocation, no logging, no reaping.
    fn on_tick(&self) {
        if self.state.is_held() || self.dispatching.load(Ordering::SeqCst) {
            return;
        }
        let cs = self.state.lock();
        let _ = self.dispatch(cs, Requeue::Ready);
    }

    /// Create a green thread running `f`, queued at the back of the ready queue
    pub fn create<F>(&self, f: F) -> SchedResult<GThreadId>
    where
        F: FnOnce() -> usize + 'static,
    {
        let mut cs = self.enter();

        let ctx = ExecutionContext::new(
            self.config.stack_size,
            thread_start,
            self as *const Scheduler as usize,
        )?;
        let entry: EntryClosure = Box::new(f);
        let id = cs.ids.allocate();
        let tcb = Box::new(Tcb::with_context(id, Some(entry), ctx));

        cs.reserve_for(1);
        cs.ready.push_back(tcb);

        if self.config.debug_logging {
            kdebug!("created {} (ready={})", id, cs.ready.len());
        }

        Ok(id)
    }

    /// Give up the CPU to the next ready thread, if any
    pub fn yield_now(&self) {
        let cs = self.enter();
        let _ = self.dispatch(cs, Requeue::Ready);
    }

    /// Wait for `target` to terminate and reclaim it
    pub fn join(&self, target: GThreadId) -> SchedResult<JoinStatus> {
        let mut cs = self.enter();
        let me = cs.current.id;

        if target == me {
            return Err(SchedError::SelfJoin);
        }
        let tcb = cs.lookup(target).ok_or(SchedError::GThreadNotFound)?;
        if tcb.join_target == Some(me) {
            return Err(SchedError::ReciprocalJoin);
        }
        if let Some(status) = tcb.terminal_status() {
            cs.zombies.remove(target);
            if self.config.debug_logging {
                kdebug!("join {} -> {} (already terminated)", target, status);
            }
            return Ok(status);
        }

        if let Some(t) = cs.lookup_mut(target) {
            t.joiners.push(me);
        }
        cs.current.join_target = Some(target);
        if self.config.debug_logging {
            kdebug!("parking on {}", target);
        }

        if let Err(mut cs) = self.dispatch(cs, Requeue::Blocked) {
            cs.current.join_target = None;
            if let Some(t) = cs.lookup_mut(target) {
                t.joiners.retain(|&j| j != me);
            }
            if self.config.debug_logging {
                kdebug!("join {} would deadlock", target);
            }
            return Err(SchedError::Deadlock);
        }

        // Woken by the target's terminal transition
        let mut cs = self.enter();
        let status = cs.current.join_result.take().ok_or(SchedError::InvalidState)?;
        cs.zombies.remove(target);
        if self.config.debug_logging {
            kdebug!("join {} -> {}", target, status);
        }
        Ok(status)
    }

    /// Terminate the calling thread with `value`
    ///
    /// For the initializing thread this first runs every other runnable
    /// thread to completion, then ends the process.
    pub fn exit(&self, value: usize) -> ! {
        if self.current_id().is_main() {
            self.drain();
            signal::block_preempt();
            std::process::exit(value as i32);
        }
        self.terminate_current(GThreadState::Done, value, value as i32)
    }

    /// Cancel `target`; it never runs another instruction
    ///
    /// Cancelling the calling thread is `exit(0)`.
    pub fn cancel(&self, target: GThreadId) -> SchedResult<()> {
        let mut cs = self.enter();

        if target == cs.current.id {
            drop(cs);
            self.exit(0);
        }

        let tcb = cs.lookup_mut(target).ok_or(SchedError::GThreadNotFound)?;
        if tcb.state.is_terminated() {
            return Err(SchedError::AlreadyTerminated);
        }

        let waiting_on = tcb.join_target;
        let joiners = std::mem::take(&mut tcb.joiners);
        // Not running, so its stack can be unmapped right away
        let ctx = tcb.retire(GThreadState::Cancelled);

        if let Some(waiting_on) = waiting_on {
            if let Some(t) = cs.lookup_mut(waiting_on) {
                t.joiners.retain(|&j| j != target);
            }
        }
        cs.wake_joiners(joiners, JoinStatus::Cancelled);

        let moved = match cs.ready.remove(target) {
            Some(t) => Some(t),
            None => cs.blocked.remove(target),
        };
        if let Some(t) = moved {
            cs.zombies.push_back(t);
        }
        drop(ctx);

        if self.config.debug_logging {
            kdebug!("cancelled {}", target);
        }
        Ok(())
    }

    /// Id of the running thread
    pub fn current_id(&self) -> GThreadId {
        self.enter().current.id
    }

    /// Number of threads that have not terminated, the caller included
    pub fn live_count(&self) -> usize {
        self.enter().live_count()
    }

    /// Terminal state of `id`, if it is known and has terminated
    pub fn status_of(&self, id: GThreadId) -> SchedResult<Option<JoinStatus>> {
        let cs = self.enter();
        cs.lookup(id)
            .map(|t| t.terminal_status())
            .ok_or(SchedError::GThreadNotFound)
    }

    /// Dispatch until nothing but the caller is runnable
    fn drain(&self) {
        while self.dispatch(self.enter(), Requeue::Ready).is_ok() {}
    }

    /// Retire the running thread for good and switch away
    fn terminate_current(&self, state: GThreadState, value: usize, exit_status: i32) -> ! {
        let mut cs = self.enter();
        let id = cs.current.id;

        if state == GThreadState::Done {
            cs.current.return_value = Some(value);
        }
        let joiners = std::mem::take(&mut cs.current.joiners);
        let ctx = cs.current.retire(state);
        if let Some(status) = cs.current.terminal_status() {
            cs.wake_joiners(joiners, status);
        }

        if self.config.debug_logging {
            kdebug!("{} terminated ({})", id, state);
        }

        let Some((next, to)) = cs.next_runnable() else {
            // Last runnable thread: nothing left to hand the CPU to
            std::process::exit(exit_status);
        };

        let exiting = std::mem::replace(&mut cs.current, next);
        cs.zombies.push_back(exiting);
        // Still running on this stack; reaped at the next `enter`
        if let Some(ctx) = ctx {
            cs.graveyard.push(ctx);
        }

        let from = &mut *cs.scratch as *mut SavedRegs;
        self.switch_to(cs, from, to);
        unreachable!("terminated green thread {} was resumed", id);
    }

    /// Drop every remaining TCB; returns how many were still blocked
    fn reclaim_all(&self) -> usize {
        let mut cs = self.state.lock();
        cs.graveyard.clear();
        let blocked = cs.blocked.len();
        cs.ready.drain().for_each(drop);
        cs.blocked.drain().for_each(drop);
        cs.zombies.drain().for_each(drop);
        blocked
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("started", &self.started.get())
            .finish_non_exhaustive()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        drop(self.timer.take());
        if std::ptr::eq(tls::scheduler_ptr(), self) {
            preempt::set_deferred_hook(None);
            tls::clear_scheduler();
        }
    }
}

/// SIGVTALRM handler
pub(crate) extern "C" fn preempt_handler(_sig: libc::c_int) {
    let Some(sched) = tls::current_scheduler() else {
        return;
    };
    // Interrupted inside the allocator or stdio; switch once it is left
    if preempt::is_disabled() {
        preempt::defer_tick();
        return;
    }
    // The threads run in between may clobber errno
    let errno = unsafe { *libc::__errno_location() };
    sched.on_tick();
    unsafe { *libc::__errno_location() = errno };
}

/// Run the panic hook with ticks deferred, since it writes to stderr
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let prev = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let _np = preempt::NoPreempt::new();
            prev(info);
        }));
    });
}

/// Tick that arrived inside a no-preemption section
fn deferred_tick() {
    if let Some(sched) = tls::current_scheduler() {
        sched.on_tick();
    }
}

/// First frame of every created thread
///
/// Runs the entry closure and turns its return into `exit`. A panic ends the
/// thread as cancelled instead of unwinding off the stack.
extern "C" fn thread_start(arg: usize) -> ! {
    let sched = unsafe { &*(arg as *const Scheduler) };
    sched.finish_switch();

    let entry = sched.enter().current.entry.take();
    let outcome = match entry {
        Some(f) => panic::catch_unwind(AssertUnwindSafe(f)),
        None => Ok(0),
    };

    match outcome {
        Ok(value) => sched.terminate_current(GThreadState::Done, value, value as i32),
        Err(_) => {
            kerror!("green thread panicked, marking it cancelled");
            sched.terminate_current(GThreadState::Cancelled, 0, PANIC_EXIT_STATUS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn cooperative() -> SchedulerConfig {
        SchedulerConfig::new()
            .enable_preemption(false)
            .stack_size(64 * 1024)
    }

    /// Run `f` against a started scheduler on a fresh OS thread
    fn with_scheduler<F: FnOnce(&Scheduler) + Send + 'static>(f: F) {
        std::thread::spawn(move || {
            let sched = Scheduler::new(cooperative()).unwrap();
            sched.start().unwrap();
            f(&sched);
            sched.shutdown().unwrap();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_main_is_thread_one() {
        with_scheduler(|s| {
            assert_eq!(s.current_id(), GThreadId::MAIN);
            assert_eq!(s.live_count(), 1);
        });
    }

    #[test]
    fn test_start_twice_on_one_os_thread() {
        with_scheduler(|_| {
            let other = Scheduler::new(cooperative()).unwrap();
            assert_eq!(other.start(), Err(SchedError::AlreadyInitialized));
        });
    }

    #[test]
    fn test_create_and_join() {
        with_scheduler(|s| {
            let a = s.create(|| 11).unwrap();
            let b = s.create(|| 22).unwrap();
            assert!(b > a);
            assert_eq!(s.live_count(), 3);
            assert_eq!(s.join(b), Ok(JoinStatus::Finished(22)));
            assert_eq!(s.join(a), Ok(JoinStatus::Finished(11)));
            assert_eq!(s.live_count(), 1);
            // Reclaimed by the first join
            assert_eq!(s.join(a), Err(SchedError::GThreadNotFound));
        });
    }

    #[test]
    fn test_yield_alternates() {
        with_scheduler(|s| {
            let log = Rc::new(Cell::new(0u64));
            let sp = s as *const Scheduler as usize;
            let mut ids = Vec::new();
            for tag in 1..=2u64 {
                let log = log.clone();
                ids.push(
                    s.create(move || {
                        let s = unsafe { &*(sp as *const Scheduler) };
                        for _ in 0..3 {
                            log.set(log.get() * 10 + tag);
                            s.yield_now();
                        }
                        0
                    })
                    .unwrap(),
                );
            }
            for id in ids {
                s.join(id).unwrap();
            }
            assert_eq!(log.get(), 121212);
        });
    }

    #[test]
    fn test_cancel_ready_thread_never_runs() {
        with_scheduler(|s| {
            let ran = Rc::new(Cell::new(false));
            let r = ran.clone();
            let id = s.create(move || {
                r.set(true);
                1
            })
            .unwrap();
            assert_eq!(s.cancel(id), Ok(()));
            assert_eq!(s.status_of(id), Ok(Some(JoinStatus::Cancelled)));
            assert_eq!(s.cancel(id), Err(SchedError::AlreadyTerminated));
            s.yield_now();
            assert!(!ran.get());
            assert_eq!(s.join(id), Ok(JoinStatus::Cancelled));
        });
    }

    #[test]
    fn test_panicking_thread_is_cancelled() {
        with_scheduler(|s| {
            let id = s.create(|| panic!("boom")).unwrap();
            assert_eq!(s.join(id), Ok(JoinStatus::Cancelled));
        });
    }

    #[test]
    fn test_reciprocal_join_rejected() {
        with_scheduler(|s| {
            let sp = s as *const Scheduler as usize;
            // Joins main while main is parked on it
            let id = s.create(move || {
                let s = unsafe { &*(sp as *const Scheduler) };
                match s.join(GThreadId::MAIN) {
                    Err(SchedError::ReciprocalJoin) => 7,
                    _ => 0,
                }
            })
            .unwrap();
            assert_eq!(s.join(id), Ok(JoinStatus::Finished(7)));
        });
    }

    #[test]
    fn test_shutdown_drains_ready_threads() {
        let done = std::thread::spawn(|| {
            let hits = Rc::new(Cell::new(0));
            let sched = Scheduler::new(cooperative()).unwrap();
            sched.start().unwrap();
            for _ in 0..4 {
                let h = hits.clone();
                sched.create(move || {
                    h.set(h.get() + 1);
                    0
                })
                .unwrap();
            }
            sched.shutdown().unwrap();
            assert!(!tls::has_scheduler());
            hits.get()
        })
        .join()
        .unwrap();
        assert_eq!(done, 4);
    }
}
