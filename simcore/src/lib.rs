#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

//! Discrete-event simulation kernel.
//!
//! A [`Simulation`] advances a logical clock by jumping from one scheduled event to the next.
//! Client code models its entities as [`Actor`]s that issue requests through their
//! [`Context`]: timers, service at a [`Facility`], quantities from a [`Buffer`], items from a
//! [`Store`], or signals from an [`Event`]. Each request is a [`Continuation`] whose callbacks
//! run once the wait is over; a request can race against timeouts and events, and the first
//! alternative to fire cancels the others.
//!
//! Every resource keeps its own queue statistics in [`Population`]s, built on top of the
//! [`DataSeries`] and [`TimeSeries`] accumulators.

use std::cell::Cell;
use std::rc::Rc;

/// Simulation time.
pub type Time = f64;

/// Simulation clock.
pub type Clock = Rc<Cell<Time>>;

pub use actor::{Actor, ActorId, ActorRef, Context, Finalize, Receive, Targets};
pub use buffer::Buffer;
pub use continuation::{Continuation, Delivery, Message, Payload, Source, SourceKind};
pub use error::{Error, Result};
pub use event::Event;
pub use facility::{Discipline, Facility};
pub use population::Population;
pub use queue::EventQueue;
pub use random::Random;
pub use request::Request;
pub use scheduler::ClockRef;
pub use simulation::{RunConfig, RunReport, Simulation, StopReason};
pub use stats::{DataSeries, Histogram, TimeSeries};
pub use store::{Filter, Store};
pub use wait_queue::WaitQueue;

mod actor;
mod buffer;
mod continuation;
mod error;
mod event;
mod facility;
mod population;
mod queue;
mod random;
mod request;
mod scheduler;
mod simulation;
mod stats;
mod store;
mod wait_queue;
