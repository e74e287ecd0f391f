use float_cmp::approx_eq;
use simcore::{
    Actor, ActorId, Buffer, Context, Event, Finalize, Payload, Receive, RunConfig, Simulation,
    SourceKind, Store, Targets,
};
use testing::Trace;

struct Customer {
    buffer: Buffer,
    patience: f64,
    trace: Trace,
}

impl Actor for Customer {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        ctx.get_buffer(&self.buffer, 1.0)
            .done(|customer, ctx| customer.trace.record(ctx.time(), "got"))
            .wait_until(self.patience, |customer, ctx| {
                customer.trace.record(ctx.time(), "timeout")
            });
    }
}

struct Supplier {
    buffer: Buffer,
    delay: f64,
    amount: f64,
    trace: Trace,
}

impl Actor for Supplier {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        ctx.set_timer(self.delay).done(|supplier, ctx| {
            ctx.put_buffer(&supplier.buffer, supplier.amount)
                .done(|supplier, ctx| supplier.trace.record(ctx.time(), "put"));
        });
    }
}

fn race(supply_at: f64) -> (Trace, Buffer) {
    let trace = Trace::new();
    let buffer = Buffer::new("buffet", 10.0, 0.0).unwrap();
    let mut simulation = Simulation::new(0);
    simulation.add_actor(
        "customer",
        Customer {
            buffer: buffer.clone(),
            patience: 5.0,
            trace: trace.clone(),
        },
        (),
    );
    simulation.add_actor(
        "supplier",
        Supplier {
            buffer: buffer.clone(),
            delay: supply_at,
            amount: 1.0,
            trace: trace.clone(),
        },
        (),
    );
    simulation.run(&RunConfig::until(100.0)).unwrap();
    (trace, buffer)
}

#[test]
fn test_timeout_beats_buffer() {
    let (trace, buffer) = race(8.0);
    assert_eq!(trace.labels(), vec!["timeout", "put"]);
    assert_eq!(trace.times_of("timeout"), vec![5.0]);
    assert!(approx_eq!(f64, buffer.current(), 1.0));
    assert_eq!(buffer.get_stats().current(), 0);
}

#[test]
fn test_buffer_beats_timeout() {
    let (trace, buffer) = race(2.0);
    assert_eq!(trace.labels(), vec!["put", "got"]);
    assert_eq!(trace.times_of("got"), vec![2.0]);
    assert!(approx_eq!(f64, buffer.current(), 0.0));
}

#[test]
fn test_put_and_parked_get_in_same_step() {
    let trace = Trace::new();
    let buffer = Buffer::new("tank", 10.0, 0.0).unwrap();
    let mut simulation = Simulation::new(0);

    struct Getter(Buffer, Trace);
    impl Actor for Getter {
        type Args = ();
        fn start(&mut self, ctx: &Context<Self>, _: ()) {
            ctx.get_buffer(&self.0, 5.0)
                .done(|getter, ctx| getter.1.record(ctx.time(), "get"));
        }
    }

    simulation.add_actor("getter", Getter(buffer.clone(), trace.clone()), ());
    simulation.add_actor(
        "putter",
        Supplier {
            buffer: buffer.clone(),
            delay: 0.0,
            amount: 10.0,
            trace: trace.clone(),
        },
        (),
    );
    simulation.run(&RunConfig::until(1.0)).unwrap();
    assert_eq!(
        trace.entries(),
        vec![(0.0, String::from("put")), (0.0, String::from("get"))]
    );
    assert!(approx_eq!(f64, buffer.current(), 5.0));
}

struct Canceller {
    trace: Trace,
}

impl Actor for Canceller {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        let request = ctx.set_timer(5.0);
        request.done(|canceller, ctx| canceller.trace.record(ctx.time(), "fired"));
        request.cancel();
        request.cancel();
        assert!(request.is_cancelled());
        assert!(!request.is_delivered());
        let kept = ctx.set_timer(1.0);
        kept.done(|canceller, ctx| canceller.trace.record(ctx.time(), "kept"));
    }
}

#[test]
fn test_cancelled_request_is_skipped() {
    let trace = Trace::new();
    let mut simulation = Simulation::new(0);
    simulation.add_actor("canceller", Canceller { trace: trace.clone() }, ());
    let report = simulation.run(&RunConfig::until(10.0)).unwrap();
    assert_eq!(trace.entries(), vec![(1.0, String::from("kept"))]);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.skipped, 1);
}

struct Tagger {
    trace: Trace,
}

impl Actor for Tagger {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        ctx.set_timer(2.0).set_data(42_u32).done(|tagger, ctx| {
            let data = ctx.callback_data_as::<u32>();
            tagger
                .trace
                .record(ctx.time(), format!("data {:?}", data.as_deref()));
            assert!(ctx.callback_data_as::<String>().is_none());
            assert!(ctx.callback_source().is_none());
        });
    }
}

#[test]
fn test_callback_data_is_scoped() {
    let trace = Trace::new();
    let mut simulation = Simulation::new(0);
    let tagger = simulation.add_actor("tagger", Tagger { trace: trace.clone() }, ());
    simulation.run(&RunConfig::until(10.0)).unwrap();
    assert_eq!(trace.labels(), vec!["data Some(42)"]);
    assert!(tagger.context().callback_data().is_none());
    assert!(tagger.context().callback_message().payload().is_none());
}

struct Listener {
    trace: Trace,
}

impl Actor for Listener {
    type Args = ();

    fn start(&mut self, _: &Context<Self>, _: ()) {}

    fn receiver(&mut self) -> Option<&mut dyn Receive<Self>> {
        Some(self)
    }
}

impl Receive<Listener> for Listener {
    fn on_message(&mut self, ctx: &Context<Self>, sender: ActorId, message: &Payload) {
        let text = message.get::<&'static str>().copied().unwrap_or("?");
        self.trace
            .record(ctx.time(), format!("{} <- {} {}", ctx.name(), sender, text));
        let source = ctx.callback_source().unwrap();
        assert_eq!(source.kind(), SourceKind::Actor(sender));
    }
}

struct Mute;

impl Actor for Mute {
    type Args = ();
    fn start(&mut self, _: &Context<Self>, _: ()) {}
}

struct Speaker;

impl Actor for Speaker {
    type Args = Targets;

    fn start(&mut self, ctx: &Context<Self>, targets: Targets) {
        ctx.send("hello", 1.0, targets);
    }
}

#[test]
fn test_broadcast_in_reverse_registration_order() {
    let trace = Trace::new();
    let mut simulation = Simulation::new(0);
    let speaker = simulation.add_actor("speaker", Speaker, Targets::All);
    simulation.add_actor("first", Listener { trace: trace.clone() }, ());
    simulation.add_actor("mute", Mute, ());
    simulation.add_actor("second", Listener { trace: trace.clone() }, ());
    simulation.run(&RunConfig::until(10.0)).unwrap();
    let id = speaker.id();
    assert_eq!(
        trace.entries(),
        vec![
            (1.0, format!("second <- {} hello", id)),
            (1.0, format!("first <- {} hello", id)),
        ]
    );
}

#[test]
fn test_send_to_selected_actors() {
    let trace = Trace::new();
    let mut simulation = Simulation::new(0);
    let first = simulation.add_actor("first", Listener { trace: trace.clone() }, ());
    let second = simulation.add_actor("second", Listener { trace: trace.clone() }, ());
    simulation.add_actor("third", Listener { trace: trace.clone() }, ());
    simulation.add_actor("one", Speaker, Targets::One(second.id()));
    simulation.add_actor("many", Speaker, Targets::Many(vec![first.id(), second.id()]));
    simulation.run(&RunConfig::until(10.0)).unwrap();
    let labels: Vec<String> = trace
        .labels()
        .into_iter()
        .map(|label| label.split(' ').next().unwrap().to_string())
        .collect();
    assert_eq!(labels, vec!["second", "second", "first"]);
}

struct Waiter {
    bell: Event,
    queued: bool,
    trace: Trace,
}

impl Actor for Waiter {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        let request = if self.queued {
            ctx.queue_event(&self.bell)
        } else {
            ctx.wait_event(&self.bell)
        };
        request.done(|waiter, ctx| {
            assert_eq!(ctx.callback_message().event(), Some("bell"));
            waiter.trace.record(ctx.time(), ctx.name().to_string());
        });
    }
}

struct Ringer {
    bell: Event,
    rings: Vec<(f64, bool)>,
}

impl Actor for Ringer {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        for (at, keep_fired) in self.rings.clone() {
            ctx.set_timer(at)
                .done(move |ringer, _| ringer.bell.fire(keep_fired));
        }
    }
}

#[test]
fn test_event_wait_list_and_queue() {
    let trace = Trace::new();
    let bell = Event::new("bell");
    let mut simulation = Simulation::new(0);
    for (name, queued) in &[("w1", false), ("w2", false), ("q1", true), ("q2", true)] {
        simulation.add_actor(
            *name,
            Waiter {
                bell: bell.clone(),
                queued: *queued,
                trace: trace.clone(),
            },
            (),
        );
    }
    assert_eq!(bell.waiting(), 2);
    assert_eq!(bell.queued(), 2);
    simulation.add_actor(
        "ringer",
        Ringer {
            bell: bell.clone(),
            rings: vec![(2.0, false), (4.0, false)],
        },
        (),
    );
    simulation.run(&RunConfig::until(10.0)).unwrap();
    assert_eq!(trace.times_of("w1"), vec![2.0]);
    assert_eq!(trace.times_of("w2"), vec![2.0]);
    assert_eq!(trace.times_of("q1"), vec![2.0]);
    assert_eq!(trace.times_of("q2"), vec![4.0]);
    assert!(!bell.is_fired());
}

#[test]
fn test_sticky_event_releases_late_waiters() {
    let trace = Trace::new();
    let bell = Event::new("bell");
    let mut simulation = Simulation::new(0);
    simulation.add_actor(
        "ringer",
        Ringer {
            bell: bell.clone(),
            rings: vec![(1.0, true)],
        },
        (),
    );
    simulation.run(&RunConfig::until(2.0)).unwrap();
    assert!(bell.is_fired());
    simulation.add_actor(
        "late",
        Waiter {
            bell: bell.clone(),
            queued: false,
            trace: trace.clone(),
        },
        (),
    );
    simulation.run(&RunConfig::until(5.0)).unwrap();
    assert_eq!(trace.entries(), vec![(1.0, String::from("late"))]);
}

struct Sleeper {
    alarm: Event,
    trace: Trace,
}

impl Actor for Sleeper {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        ctx.set_timer(10.0)
            .done(|sleeper, ctx| sleeper.trace.record(ctx.time(), "rested"))
            .unless_event(&self.alarm, |sleeper, ctx| {
                let event = ctx.callback_message().event().map(String::from);
                sleeper
                    .trace
                    .record(ctx.time(), format!("woken by {:?}", event));
            });
    }
}

#[test]
fn test_unless_event_interrupts_timer() {
    let trace = Trace::new();
    let alarm = Event::new("alarm");
    let mut simulation = Simulation::new(0);
    simulation.add_actor(
        "sleeper",
        Sleeper {
            alarm: alarm.clone(),
            trace: trace.clone(),
        },
        (),
    );
    simulation.add_actor(
        "ringer",
        Ringer {
            bell: alarm.clone(),
            rings: vec![(3.0, false)],
        },
        (),
    );
    let report = simulation.run(&RunConfig::until(20.0)).unwrap();
    assert_eq!(
        trace.entries(),
        vec![(3.0, String::from("woken by Some(\"alarm\")"))]
    );
    assert_eq!(report.skipped, 1);
}

struct Producer {
    store: Store<u32>,
}

impl Actor for Producer {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        for item in 1..=3_u32 {
            let store = self.store.clone();
            ctx.set_timer(f64::from(item - 1)).done(move |_, ctx| {
                ctx.put_store(&store, item);
            });
        }
    }
}

struct Picker {
    store: Store<u32>,
    trace: Trace,
}

impl Actor for Picker {
    type Args = u32;

    fn start(&mut self, ctx: &Context<Self>, wanted: u32) {
        ctx.get_store_matching(&self.store, move |item: &u32| *item == wanted)
            .done(|picker, ctx| {
                let item = ctx.callback_message().item::<u32>();
                let source = ctx.callback_source().unwrap();
                assert_eq!(source.kind(), SourceKind::Store);
                assert_eq!(source.name(), "shelf");
                picker
                    .trace
                    .record(ctx.time(), format!("picked {:?}", item.as_deref()));
            });
    }
}

#[test]
fn test_store_filtered_get() {
    let trace = Trace::new();
    let store = Store::new("shelf", 5).unwrap();
    let mut simulation = Simulation::new(0);
    simulation.add_actor(
        "picker",
        Picker {
            store: store.clone(),
            trace: trace.clone(),
        },
        2,
    );
    simulation.add_actor(
        "producer",
        Producer {
            store: store.clone(),
        },
        (),
    );
    simulation.run(&RunConfig::until(10.0)).unwrap();
    assert_eq!(trace.entries(), vec![(1.0, String::from("picked Some(2)"))]);
    assert_eq!(store.current(), 2);
}

struct Closer {
    trace: Trace,
}

impl Actor for Closer {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        ctx.set_timer(1.0).done(|_, _| {});
    }

    fn finalizer(&mut self) -> Option<&mut dyn Finalize<Self>> {
        Some(self)
    }
}

impl Finalize<Closer> for Closer {
    fn finalize(&mut self, ctx: &Context<Self>) {
        self.trace.record(ctx.time(), ctx.name().to_string());
    }
}

#[test]
fn test_finalize_in_registration_order() {
    let trace = Trace::new();
    let mut simulation = Simulation::new(0);
    for name in &["a", "b", "c"] {
        simulation.add_actor(*name, Closer { trace: trace.clone() }, ());
    }
    simulation.add_actor("mute", Mute, ());
    simulation.run(&RunConfig::until(4.0)).unwrap();
    assert_eq!(trace.labels(), vec!["a", "b", "c"]);
    assert_eq!(trace.times_of("a"), vec![1.0]);
}
