use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::{Continuation, Message, Source, SourceKind};

#[derive(Debug, Default)]
struct Waiters {
    wait_list: Vec<Continuation>,
    queue: VecDeque<Continuation>,
    fired: bool,
}

/// Named signal that actors can wait on.
///
/// Firing releases every continuation on the wait list and one continuation from the queue.
/// Released continuations are scheduled at the current time, so their callbacks run through the
/// event loop like any other delivery.
///
/// An event fired with `keep_fired` stays fired until [`clear`](Self::clear)ed, and releases
/// new waiters right away.
#[derive(Debug, Clone)]
pub struct Event {
    name: Rc<str>,
    waiters: Rc<RefCell<Waiters>>,
}

impl Event {
    /// Creates an event with no waiters that has not fired.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            waiters: Rc::default(),
        }
    }

    /// Name of the event.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the event was fired with the sticky flag and not cleared since.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.waiters.borrow().fired
    }

    /// Number of continuations on the wait list.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiters.borrow().wait_list.len()
    }

    /// Number of queued continuations.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.waiters.borrow().queue.len()
    }

    fn release(&self, continuation: &Continuation) {
        continuation.set_message(Message::Event(Rc::clone(&self.name)));
        continuation.schedule_now();
    }

    fn prepare(&self, continuation: &Continuation) {
        continuation.set_source(Source::new(SourceKind::Event, Rc::clone(&self.name)));
    }

    pub(crate) fn add_wait_list(&self, continuation: Continuation) {
        self.prepare(&continuation);
        let mut waiters = self.waiters.borrow_mut();
        if waiters.fired {
            drop(waiters);
            self.release(&continuation);
        } else {
            waiters.wait_list.push(continuation);
        }
    }

    pub(crate) fn add_queue(&self, continuation: Continuation) {
        self.prepare(&continuation);
        let mut waiters = self.waiters.borrow_mut();
        if waiters.fired {
            drop(waiters);
            self.release(&continuation);
        } else {
            waiters.queue.push_back(continuation);
        }
    }

    /// Releases all waiting continuations and the first live queued one.
    pub fn fire(&self, keep_fired: bool) {
        let (wait_list, lucky) = {
            let mut waiters = self.waiters.borrow_mut();
            if keep_fired {
                waiters.fired = true;
            }
            let wait_list = std::mem::take(&mut waiters.wait_list);
            let mut lucky = None;
            while let Some(continuation) = waiters.queue.pop_front() {
                if continuation.is_pending() {
                    lucky = Some(continuation);
                    break;
                }
            }
            (wait_list, lucky)
        };
        log::trace!(
            "Event {} fired, releasing {} waiters",
            self.name,
            wait_list.len() + usize::from(lucky.is_some())
        );
        for continuation in wait_list.iter().chain(lucky.iter()) {
            if continuation.is_pending() {
                self.release(continuation);
            }
        }
    }

    /// Resets the sticky fired flag.
    pub fn clear(&self) {
        self.waiters.borrow_mut().fired = false;
    }
}
