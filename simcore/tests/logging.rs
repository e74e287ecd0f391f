use simcore::{Actor, Context, RunConfig, Simulation};
use testing::logger::{self, LoggerBuilder};

struct Greeter;

impl Actor for Greeter {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        ctx.set_timer(1.5).done(|_, ctx| ctx.log("hello"));
    }
}

#[test]
fn test_actor_log_lines() -> anyhow::Result<()> {
    LoggerBuilder::default()
        .level(log::LevelFilter::Info)
        .target("simcore")
        .init()?;
    let mut simulation = Simulation::new(0);
    simulation.add_actor("greeter", Greeter, ());
    simulation.add_actor("", Greeter, ());
    simulation.run(&RunConfig::until(10.0))?;
    assert_eq!(
        logger::clear()?,
        vec![
            "[INFO]  1.500000 [greeter] hello",
            "[INFO]  1.500000 [2] hello",
        ]
    );
    Ok(())
}
