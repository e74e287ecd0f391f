use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::{Actor, Context, Continuation, Event, Message, Payload, Time};

/// A pending request issued by an actor of type `A`.
///
/// Callbacks registered with [`done`](Self::done) run when the request is delivered. Alternatives
/// registered with [`wait_until`](Self::wait_until) and [`unless_event`](Self::unless_event)
/// race against it: whichever is delivered first wins and the others are cancelled.
///
/// All methods return `&Self`, so that they can be chained:
///
/// ```ignore
/// ctx.get_buffer(&buffet, 1.0)
///     .done(|customer, ctx| customer.served(ctx))
///     .wait_until(patience, |customer, ctx| customer.leave(ctx));
/// ```
pub struct Request<A> {
    continuation: Continuation,
    ctx: Context<A>,
}

impl<A> Clone for Request<A> {
    fn clone(&self) -> Self {
        Self {
            continuation: self.continuation.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<A> fmt::Debug for Request<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("continuation", &self.continuation)
            .finish()
    }
}

impl<A: Actor> Request<A> {
    pub(crate) fn new(continuation: Continuation, ctx: Context<A>) -> Self {
        Self { continuation, ctx }
    }

    /// Runs `f` on the issuing actor once the request is delivered.
    pub fn done<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&mut A, &Context<A>) + 'static,
    {
        self.continuation.push_callback(self.ctx.bind(f));
        self
    }

    /// Runs `f` on another actor once the request is delivered.
    pub fn done_on<B, F>(&self, receiver: &Context<B>, f: F) -> &Self
    where
        B: Actor,
        F: FnOnce(&mut B, &Context<B>) + 'static,
    {
        self.continuation.push_callback(receiver.bind(f));
        self
    }

    /// Gives up waiting `delay` after the request was issued, running `f` instead.
    ///
    /// Does nothing if a resource already committed to serving the request.
    pub fn wait_until<F>(&self, delay: Time, f: F) -> &Self
    where
        F: FnOnce(&mut A, &Context<A>) + 'static,
    {
        assert!(delay >= 0.0, "timeout must be non-negative");
        if let Some(timeout) = self.continuation.add_alternative(self.ctx.bind(f)) {
            timeout.schedule_at(self.continuation.scheduled_at() + delay);
        }
        self
    }

    /// Gives up waiting when `event` fires, running `f` instead.
    ///
    /// Does nothing if a resource already committed to serving the request.
    pub fn unless_event<F>(&self, event: &Event, f: F) -> &Self
    where
        F: FnOnce(&mut A, &Context<A>) + 'static,
    {
        if let Some(interrupt) = self.continuation.add_alternative(self.ctx.bind(f)) {
            interrupt.set_message(Message::Event(Rc::from(event.name())));
            event.add_wait_list(interrupt);
        }
        self
    }

    /// Gives up waiting when any of `events` fires, running `f` instead.
    pub fn unless_events<F>(&self, events: &[Event], f: F) -> &Self
    where
        F: FnOnce(&mut A, &Context<A>) + Clone + 'static,
    {
        for event in events {
            self.unless_event(event, f.clone());
        }
        self
    }

    /// Attaches `data`, available to callbacks through [`Context::callback_data`].
    pub fn set_data<T: Any>(&self, data: T) -> &Self {
        self.continuation.set_data(Payload::new(data));
        self
    }

    /// Cancels the request and all its alternatives; see [`Continuation::cancel`].
    pub fn cancel(&self) {
        self.continuation.cancel();
    }

    /// Whether the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.continuation.is_cancelled()
    }

    /// Whether the request was delivered.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.continuation.is_delivered()
    }

    /// The underlying continuation.
    #[must_use]
    pub fn continuation(&self) -> &Continuation {
        &self.continuation
    }
}
