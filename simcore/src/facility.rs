use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::continuation::{Callback, Contended};
use crate::{
    Continuation, Error, Message, Population, Result, Source, SourceKind, Time, WaitQueue,
};

/// Scheduling discipline of a [`Facility`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Discipline {
    /// Any number of servers; requests are served in arrival order.
    Fcfs,
    /// A single server; every new request preempts the one in service.
    Lcfs,
}

struct Job {
    request: Continuation,
    remaining: Time,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("remaining", &self.remaining)
            .finish()
    }
}

enum Servers {
    Fcfs {
        slots: Vec<bool>,
        free: usize,
    },
    Lcfs(Option<Running>),
}

/// Job currently served by a preemptive facility.
struct Running {
    job: Job,
    segment: Continuation,
    started: Time,
    finish: Time,
}

struct State {
    servers: Servers,
    queue: WaitQueue<Job>,
    stats: Population,
    busy: Time,
}

struct FacilityCell {
    this: Weak<FacilityCell>,
    name: Rc<str>,
    state: RefCell<State>,
}

/// A pool of servers that actors use for a given duration.
///
/// With [`Discipline::Fcfs`], requests wait in arrival order and each is committed as soon as
/// it gets a server. With [`Discipline::Lcfs`], the single server always works on the newest
/// request: preempted requests go back onto the queue with their remaining service time and
/// resume, newest first, once the server frees up.
#[derive(Clone)]
pub struct Facility(Rc<FacilityCell>);

impl fmt::Debug for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facility")
            .field("name", &self.0.name)
            .field("discipline", &self.discipline())
            .finish()
    }
}

impl Facility {
    /// Creates a facility with the given discipline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `servers` is zero, or if a preemptive facility
    /// is requested with more than one server.
    pub fn new(name: &str, discipline: Discipline, servers: usize) -> Result<Self> {
        let servers = match (discipline, servers) {
            (_, 0) => return Err(Error::capacity(name, "a facility needs at least one server")),
            (Discipline::Fcfs, n) => Servers::Fcfs {
                slots: vec![true; n],
                free: n,
            },
            (Discipline::Lcfs, 1) => Servers::Lcfs(None),
            (Discipline::Lcfs, _) => {
                return Err(Error::capacity(
                    name,
                    "a preemptive facility has exactly one server",
                ))
            }
        };
        Ok(Self::build(name, servers))
    }

    fn build(name: &str, servers: Servers) -> Self {
        Self(Rc::new_cyclic(|this| FacilityCell {
            this: Weak::clone(this),
            name: Rc::from(name),
            state: RefCell::new(State {
                servers,
                queue: WaitQueue::new(format!("{} queue", name)),
                stats: Population::new(name),
                busy: 0.0,
            }),
        }))
    }

    /// Creates a first-come-first-served facility with `servers` servers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `servers` is zero.
    pub fn fcfs(name: &str, servers: usize) -> Result<Self> {
        Self::new(name, Discipline::Fcfs, servers)
    }

    /// Creates a preemptive last-come-first-served facility with a single server.
    #[must_use]
    pub fn lcfs(name: &str) -> Self {
        Self::build(name, Servers::Lcfs(None))
    }

    /// Limits the number of waiting requests; requests arriving at a full queue are rejected.
    ///
    /// Preemptive facilities keep an unbounded queue.
    #[must_use]
    pub fn with_max_queue_len(self, max_queue_len: usize) -> Self {
        if self.discipline() == Discipline::Fcfs {
            let mut state = self.0.state.borrow_mut();
            let queue = std::mem::take(&mut state.queue);
            state.queue = queue.with_capacity(max_queue_len);
        }
        self
    }

    /// Name of the facility.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Queueing discipline of the facility.
    #[must_use]
    pub fn discipline(&self) -> Discipline {
        match self.0.state.borrow().servers {
            Servers::Fcfs { .. } => Discipline::Fcfs,
            Servers::Lcfs(_) => Discipline::Lcfs,
        }
    }

    /// Number of idle servers.
    #[must_use]
    pub fn free_servers(&self) -> usize {
        match &self.0.state.borrow().servers {
            Servers::Fcfs { free, .. } => *free,
            Servers::Lcfs(running) => usize::from(running.is_none()),
        }
    }

    /// Number of waiting (or, for LCFS, preempted) requests.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.0.state.borrow().queue.len()
    }

    /// Total time the servers spent serving requests.
    #[must_use]
    pub fn usage(&self) -> Time {
        self.0.state.borrow().busy
    }

    /// Requests inside the facility, waiting or in service.
    #[must_use]
    pub fn system_stats(&self) -> Ref<'_, Population> {
        Ref::map(self.0.state.borrow(), |state| &state.stats)
    }

    /// Requests waiting for a server.
    #[must_use]
    pub fn queue_stats(&self) -> Ref<'_, Population> {
        Ref::map(self.0.state.borrow(), |state| state.queue.stats())
    }

    /// Closes open statistics intervals at `timestamp`.
    pub fn finalize(&self, timestamp: Time) {
        let mut state = self.0.state.borrow_mut();
        state.stats.finalize(timestamp);
        state.queue.finalize(timestamp);
    }

    /// Resets statistics and busy time.
    pub fn reset(&self) {
        let mut state = self.0.state.borrow_mut();
        state.stats.reset();
        state.queue.reset();
        state.busy = 0.0;
    }

    /// Requests `duration` of service for `request`.
    ///
    /// # Panics
    ///
    /// Panics if `duration` is negative or NaN.
    pub fn serve(&self, duration: Time, request: Continuation) {
        assert!(duration >= 0.0, "service duration must be non-negative");
        request.set_source(self.0.source());
        let lcfs = matches!(self.0.state.borrow().servers, Servers::Lcfs(_));
        if lcfs {
            self.0.serve_lcfs(duration, request);
        } else {
            self.0.serve_fcfs(duration, request);
        }
    }
}

impl FacilityCell {
    fn source(&self) -> Source {
        let this: Weak<dyn Contended> = self.this.clone();
        Source::contended(SourceKind::Facility, Rc::clone(&self.name), this)
    }

    fn serve_fcfs(&self, duration: Time, request: Continuation) {
        let now = request.now();
        let job = Job {
            request,
            remaining: duration,
        };
        let mut state = self.state.borrow_mut();
        let idle = matches!(state.servers, Servers::Fcfs { free, .. } if free > 0);
        if idle && state.queue.is_empty() {
            state.stats.enter(now);
            state.queue.passby(now);
            self.start_fcfs(&mut state, job, now);
            return;
        }
        match state.queue.push(job, now) {
            Ok(()) => {
                state.stats.enter(now);
                self.schedule_fcfs(&mut state, now);
            }
            Err(job) => {
                log::trace!("Facility {} rejected a request at {}", self.name, now);
                job.request.set_message(Message::Rejected);
                job.request.schedule_at(now);
            }
        }
    }

    /// Drops cancelled requests from the head of the queue and hands free servers to the
    /// requests behind them.
    fn schedule_fcfs(&self, state: &mut State, now: Time) {
        loop {
            let ready = match (state.queue.top(), &state.servers) {
                (None, _) => break,
                (Some(job), Servers::Fcfs { free, .. }) => !job.request.is_pending() || *free > 0,
                (Some(_), Servers::Lcfs(_)) => false,
            };
            if !ready {
                break;
            }
            if let Some(job) = state.queue.shift(now) {
                if job.request.is_pending() {
                    self.start_fcfs(state, job, now);
                } else {
                    state.stats.leave(job.request.scheduled_at(), now);
                }
            }
        }
    }

    fn start_fcfs(&self, state: &mut State, job: Job, now: Time) {
        let slot = match &mut state.servers {
            Servers::Fcfs { slots, free } => {
                let slot = slots
                    .iter()
                    .position(|&idle| idle)
                    .expect("free server count out of sync with server slots");
                slots[slot] = false;
                *free -= 1;
                slot
            }
            Servers::Lcfs(_) => unreachable!("FCFS scheduling on a preemptive facility"),
        };
        state.busy += job.remaining;
        job.request.set_message(Message::Server(slot));
        job.request.cancel_renege_clauses();
        log::trace!(
            "Facility {} started service on server {} at {}",
            self.name,
            slot,
            now
        );
        let completion = job.request.internal();
        let facility = Weak::clone(&self.this);
        let request = job.request;
        completion.push_callback(Callback::new(None, move || {
            if let Some(facility) = facility.upgrade() {
                facility.complete_fcfs(request, slot);
            }
        }));
        completion.schedule_at(now + job.remaining);
    }

    fn complete_fcfs(&self, request: Continuation, slot: usize) {
        let now = request.now();
        {
            let mut state = self.state.borrow_mut();
            if let Servers::Fcfs { slots, free } = &mut state.servers {
                slots[slot] = true;
                *free += 1;
            }
            state.stats.leave(request.scheduled_at(), now);
            self.schedule_fcfs(&mut state, now);
        }
        request.deliver();
    }

    fn serve_lcfs(&self, duration: Time, request: Continuation) {
        let now = request.now();
        let job = Job {
            request,
            remaining: duration,
        };
        let mut state = self.state.borrow_mut();
        self.preempt_and_issue(&mut state, job, now, true);
    }

    /// Puts the job in service back onto the queue, if any, and starts `job`.
    fn preempt_and_issue(&self, state: &mut State, job: Job, now: Time, first: bool) {
        let current = match &mut state.servers {
            Servers::Lcfs(running) => running.take(),
            Servers::Fcfs { .. } => unreachable!("preemption on an FCFS facility"),
        };
        if let Some(running) = current {
            state.busy += now - running.started;
            running.segment.cancel();
            let preempted = Job {
                request: running.job.request,
                remaining: running.finish - now,
            };
            log::trace!(
                "Facility {} preempted a job with {} remaining at {}",
                self.name,
                preempted.remaining,
                now
            );
            state
                .queue
                .push(preempted, now)
                .expect("preemption queue is unbounded");
        }
        if first {
            job.request.cancel_renege_clauses();
            state.stats.enter(now);
        }
        let segment = job.request.internal();
        let facility = Weak::clone(&self.this);
        segment.push_callback(Callback::new(None, move || {
            if let Some(facility) = facility.upgrade() {
                facility.complete_lcfs();
            }
        }));
        let finish = now + job.remaining;
        segment.schedule_at(finish);
        state.servers = Servers::Lcfs(Some(Running {
            job,
            segment,
            started: now,
            finish,
        }));
    }

    fn complete_lcfs(&self) {
        let request = {
            let mut state = self.state.borrow_mut();
            let running = match &mut state.servers {
                Servers::Lcfs(running) => running.take(),
                Servers::Fcfs { .. } => None,
            };
            let running = match running {
                Some(running) => running,
                None => return,
            };
            let now = running.finish;
            state.busy += now - running.started;
            state.stats.leave(running.job.request.scheduled_at(), now);
            running.job.request
        };
        request.deliver();
        let now = request.now();
        let mut state = self.state.borrow_mut();
        if !matches!(state.servers, Servers::Lcfs(None)) {
            return;
        }
        if let Some(job) = state.queue.pop(now) {
            self.preempt_and_issue(&mut state, job, now, false);
        }
    }
}

impl Contended for FacilityCell {
    fn reevaluate(&self, now: Time) {
        let mut state = self.state.borrow_mut();
        if matches!(state.servers, Servers::Fcfs { .. }) {
            self.schedule_fcfs(&mut state, now);
        }
    }
}
