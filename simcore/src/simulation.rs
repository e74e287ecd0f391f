use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::actor::{self, ActorRef};
use crate::scheduler::{ClockRef, Scheduler};
use crate::{Actor, Error, Random, Result, Time};

fn default_step_duration() -> Duration {
    Duration::from_secs(1)
}

/// Parameters of a single [`Simulation::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Continuations scheduled after this time are never delivered.
    pub end_time: Time,
    /// Maximum number of continuations taken off the event queue.
    #[serde(default)]
    pub max_events: Option<u64>,
    /// Slows the run down to follow the wall clock.
    #[serde(default)]
    pub real_time: bool,
    /// Wall-clock duration of one unit of simulated time when running in real time.
    #[serde(default = "default_step_duration")]
    pub step_duration: Duration,
}

impl RunConfig {
    /// Runs until `end_time`, without an event budget and as fast as possible.
    #[must_use]
    pub fn until(end_time: Time) -> Self {
        Self {
            end_time,
            max_events: None,
            real_time: false,
            step_duration: default_step_duration(),
        }
    }

    /// Stops the run after `max_events` events.
    #[must_use]
    pub fn max_events(self, max_events: u64) -> Self {
        Self {
            max_events: Some(max_events),
            ..self
        }
    }

    /// Paces the run so that one unit of simulated time takes `step_duration` of wall time.
    #[must_use]
    pub fn real_time(self, step_duration: Duration) -> Self {
        Self {
            real_time: true,
            step_duration,
            ..self
        }
    }

    /// Checks if the configuration describes a run that can be performed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the end time is not positive and finite, or if a
    /// real-time run has a zero step duration.
    pub fn validate(&self) -> Result<()> {
        if !(self.end_time > 0.0 && self.end_time.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "end time must be positive and finite, got {}",
                self.end_time
            )));
        }
        if self.real_time && self.step_duration == Duration::default() {
            return Err(Error::InvalidConfig(String::from(
                "real-time step duration must not be zero",
            )));
        }
        Ok(())
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// No events were left.
    Exhausted,
    /// The event budget ran out.
    EventBudget,
    /// The next event was past the end time.
    Horizon,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Number of continuations delivered.
    pub delivered: u64,
    /// Number of cancelled continuations taken off the queue without delivery.
    pub skipped: u64,
    /// Simulation time at the end of the run.
    pub time: Time,
    /// Why the run stopped.
    pub stop: StopReason,
    /// Wall-clock duration of the run.
    pub wall_time: Duration,
}

/// The simulation engine.
///
/// Owns the clock, the event queue, and every registered actor. Time advances in steps: each
/// step takes every continuation scheduled at the earliest pending time and delivers them in the
/// order they were scheduled.
///
/// # Examples
///
/// ```
/// # use simcore::{Actor, Context, RunConfig, Simulation, StopReason};
/// struct Clock;
///
/// impl Actor for Clock {
///     type Args = f64;
///     fn start(&mut self, ctx: &Context<Self>, period: f64) {
///         ctx.set_timer(period).done(move |clock, ctx| clock.start(ctx, period));
///     }
/// }
///
/// let mut simulation = Simulation::new(42);
/// simulation.add_actor("clock", Clock, 10.0);
/// let report = simulation.run(&RunConfig::until(35.0)).unwrap();
/// assert_eq!(report.delivered, 3);
/// assert_eq!(report.stop, StopReason::Horizon);
/// ```
pub struct Simulation {
    scheduler: Rc<Scheduler>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Simulation {
    /// Creates an empty simulation whose random stream is seeded with `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            scheduler: Rc::new(Scheduler::new(seed)),
        }
    }

    /// Current simulation time.
    #[must_use]
    pub fn time(&self) -> Time {
        self.scheduler.time()
    }

    /// Read-only handle to the simulation clock.
    #[must_use]
    pub fn clock(&self) -> ClockRef {
        self.scheduler.clock()
    }

    /// Number of continuations in the event queue, including cancelled ones.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.scheduler.pending()
    }

    /// Random stream shared by all actors.
    pub fn random(&self) -> std::cell::RefMut<'_, Random> {
        self.scheduler.random().borrow_mut()
    }

    /// Registers `actor` under `name` and immediately calls its `start` with `args`.
    pub fn add_actor<A, S>(&mut self, name: S, actor: A, args: A::Args) -> ActorRef<A>
    where
        A: Actor,
        S: Into<String>,
    {
        actor::register(&self.scheduler, name.into(), actor, args)
    }

    /// Runs the simulation until there is nothing left to do or one of the limits in `config`
    /// is reached, and then calls the finalization hooks of all actors.
    ///
    /// Continuations past the end time stay queued, so a later run with a larger end time picks
    /// up where this one stopped. When the event budget runs out in the middle of a step, the
    /// rest of that step is discarded. An end time behind the current clock leaves the clock
    /// where it is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn run(&mut self, config: &RunConfig) -> Result<RunReport> {
        config.validate()?;
        let started = Instant::now();
        let max_events = config.max_events.unwrap_or(u64::MAX);
        let mut taken: u64 = 0;
        let mut delivered: u64 = 0;
        let mut skipped: u64 = 0;
        let stop = 'run: loop {
            let step_started = Instant::now();
            let step_time = self.time();
            match self.scheduler.next_time() {
                None => break StopReason::Exhausted,
                Some(at) if at > config.end_time => break StopReason::Horizon,
                Some(_) => {}
            }
            for (at, continuation) in self.scheduler.next_batch() {
                taken += 1;
                if taken > max_events {
                    break 'run StopReason::EventBudget;
                }
                if !continuation.is_pending() {
                    skipped += 1;
                    continue;
                }
                self.scheduler.set_time(at);
                continuation.deliver();
                delivered += 1;
            }
            if config.real_time {
                Self::pace(config.step_duration, self.time() - step_time, step_started);
            }
        };
        if stop == StopReason::Horizon && config.end_time > self.time() {
            self.scheduler.set_time(config.end_time);
        }
        log::debug!(
            "Run stopped at {} ({:?}) after {} deliveries",
            self.time(),
            stop,
            delivered
        );
        self.finalize();
        Ok(RunReport {
            delivered,
            skipped,
            time: self.time(),
            stop,
            wall_time: started.elapsed(),
        })
    }

    /// Sleeps for whatever is left of the wall-clock time matching `elapsed` simulated time.
    fn pace(step_duration: Duration, elapsed: Time, step_started: Instant) {
        let target = match Duration::try_from_secs_f64(step_duration.as_secs_f64() * elapsed) {
            Ok(target) => target,
            Err(_) => return,
        };
        if let Some(sleep) = target.checked_sub(step_started.elapsed()) {
            if sleep > Duration::default() {
                std::thread::sleep(sleep);
            }
        }
    }

    /// Delivers the next step that has at least one live continuation.
    ///
    /// Returns the number of delivered continuations, which is 0 only if there are no more
    /// events. Finalization hooks are not called.
    pub fn step(&mut self) -> usize {
        loop {
            let batch = self.scheduler.next_batch();
            if batch.is_empty() {
                return 0;
            }
            let mut delivered = 0;
            for (at, continuation) in batch {
                if continuation.is_pending() {
                    self.scheduler.set_time(at);
                    continuation.deliver();
                    delivered += 1;
                }
            }
            if delivered > 0 {
                log::debug!("Step at {} delivered {} continuations", self.time(), delivered);
                return delivered;
            }
        }
    }

    /// Delivers a single live continuation. Returns `false` if there are no more events.
    pub fn step_event(&mut self) -> bool {
        while let Some((at, continuation)) = self.scheduler.pop() {
            if continuation.is_pending() {
                self.scheduler.set_time(at);
                continuation.deliver();
                return true;
            }
        }
        false
    }

    /// Calls the finalization hooks of all actors in registration order.
    pub fn finalize(&self) {
        for slot in self.scheduler.actors() {
            slot.finalize();
        }
    }
}
