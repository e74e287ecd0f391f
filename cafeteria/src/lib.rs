//! Cafeteria model.
//!
//! A chef refills the buffet to its capacity every `preparation_time` seconds. Customers arrive
//! with exponentially distributed gaps, take one plate from the buffet, waiting for the chef if
//! it is empty, and then pay at a single cashier. The time between entering and leaving is
//! recorded in the customer population statistics.
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

use std::fmt;
use std::time::Duration;

use rand_distr::Exp;
use serde::{Deserialize, Serialize};
use simcore::{
    Actor, Buffer, Context, Error, Facility, Finalize, Result, RunConfig, RunReport, Simulation,
};

/// (De)serializes durations as human-readable strings, such as `"1s 500ms"`.
mod human_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

fn default_seed() -> u64 {
    1234
}

fn default_sim_time() -> f64 {
    3600.0
}

fn default_buffet_capacity() -> f64 {
    10.0
}

fn default_cashier_time() -> f64 {
    15.0
}

fn default_mean_arrival() -> f64 {
    40.0
}

fn default_preparation_time() -> f64 {
    300.0
}

fn default_step_duration() -> Duration {
    Duration::from_secs(1)
}

/// Parameters of the cafeteria model. All times are in simulated seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Seed of the random stream.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// How long the cafeteria is open.
    #[serde(default = "default_sim_time")]
    pub sim_time: f64,
    /// Number of plates the buffet holds.
    #[serde(default = "default_buffet_capacity")]
    pub buffet_capacity: f64,
    /// Mean service time at the cashier.
    #[serde(default = "default_cashier_time")]
    pub cashier_time: f64,
    /// Mean time between two customer arrivals.
    #[serde(default = "default_mean_arrival")]
    pub mean_arrival: f64,
    /// Time between two buffet refills.
    #[serde(default = "default_preparation_time")]
    pub preparation_time: f64,
    /// Follow the wall clock.
    #[serde(default)]
    pub real_time: bool,
    /// Wall-clock duration of one simulated second in real-time mode.
    #[serde(default = "default_step_duration", with = "human_duration")]
    pub step_duration: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            sim_time: default_sim_time(),
            buffet_capacity: default_buffet_capacity(),
            cashier_time: default_cashier_time(),
            mean_arrival: default_mean_arrival(),
            preparation_time: default_preparation_time(),
            real_time: false,
            step_duration: default_step_duration(),
        }
    }
}

impl ModelConfig {
    /// Checks that all times are positive and the buffet holds at least one plate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("cashier_time", self.cashier_time),
            ("mean_arrival", self.mean_arrival),
            ("preparation_time", self.preparation_time),
        ];
        for (name, value) in &positive {
            if !(*value > 0.0 && value.is_finite()) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.buffet_capacity < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "buffet must hold at least one plate, got {}",
                self.buffet_capacity
            )));
        }
        self.run_config().validate()
    }

    /// Engine configuration of a model run.
    #[must_use]
    pub fn run_config(&self) -> RunConfig {
        let config = RunConfig::until(self.sim_time);
        if self.real_time {
            config.real_time(self.step_duration)
        } else {
            config
        }
    }
}

fn exponential(distribution: &'static str, mean: f64) -> Result<Exp<f64>> {
    Exp::new(1.0 / mean).map_err(|err| Error::InvalidDistribution {
        distribution,
        reason: err.to_string(),
    })
}

/// Keeps the buffet full.
#[derive(Debug)]
pub struct Chef {
    buffet: Buffer,
    preparation_time: f64,
}

impl Chef {
    /// Creates a chef refilling `buffet` every `preparation_time` seconds.
    #[must_use]
    pub fn new(buffet: Buffer, preparation_time: f64) -> Self {
        Self {
            buffet,
            preparation_time,
        }
    }

    fn refill(&mut self, ctx: &Context<Self>) {
        let missing = self.buffet.size() - self.buffet.current();
        if missing > 0.0 {
            ctx.log(format!("Chef refills {} plates", missing));
            ctx.put_buffer(&self.buffet, missing);
        }
        ctx.set_timer(self.preparation_time).done(Self::refill);
    }
}

impl Actor for Chef {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        self.refill(ctx);
    }
}

/// The stream of arriving customers.
#[derive(Debug)]
pub struct Customer {
    buffet: Buffer,
    cashier: Facility,
    arrivals: Exp<f64>,
    service: Exp<f64>,
    served: usize,
}

impl Customer {
    /// Creates the customer stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDistribution`] if either mean is not positive.
    pub fn new(
        buffet: Buffer,
        cashier: Facility,
        mean_arrival: f64,
        cashier_time: f64,
    ) -> Result<Self> {
        Ok(Self {
            buffet,
            cashier,
            arrivals: exponential("arrival", mean_arrival)?,
            service: exponential("cashier", cashier_time)?,
            served: 0,
        })
    }

    /// Number of customers that paid and left.
    #[must_use]
    pub fn served(&self) -> usize {
        self.served
    }

    fn arrive(&mut self, ctx: &Context<Self>) {
        let now = ctx.time();
        ctx.log("Customer ENTER");
        ctx.stats_mut().enter(now);
        ctx.get_buffer(&self.buffet, 1.0)
            .set_data(now)
            .done(Self::pay);
        let gap = ctx.random().sample(&self.arrivals);
        ctx.set_timer(gap).done(Self::arrive);
    }

    fn pay(&mut self, ctx: &Context<Self>) {
        let entered = ctx.callback_data_as::<f64>().map_or(ctx.time(), |t| *t);
        ctx.log(format!("Customer at CASHIER (entered at {:.6})", entered));
        let service = ctx.random().sample(&self.service);
        ctx.use_facility(&self.cashier, service)
            .set_data(entered)
            .done(Self::leave);
    }

    fn leave(&mut self, ctx: &Context<Self>) {
        let entered = ctx.callback_data_as::<f64>().map_or(ctx.time(), |t| *t);
        ctx.log(format!("Customer LEAVE (entered at {:.6})", entered));
        ctx.stats_mut().leave(entered, ctx.time());
        self.served += 1;
    }
}

impl Actor for Customer {
    type Args = ();

    fn start(&mut self, ctx: &Context<Self>, _: ()) {
        self.arrive(ctx);
    }

    fn finalizer(&mut self) -> Option<&mut dyn Finalize<Self>> {
        Some(self)
    }
}

impl Finalize<Customer> for Customer {
    fn finalize(&mut self, ctx: &Context<Self>) {
        ctx.stats_mut().finalize(ctx.time());
        self.cashier.finalize(ctx.time());
        self.buffet.finalize(ctx.time());
    }
}

/// Outcome of a model run.
#[derive(Debug, Clone)]
pub struct ModelReport {
    /// Engine summary.
    pub run: RunReport,
    /// Customers that paid and left.
    pub served: usize,
    /// Mean time between entering and leaving, in seconds.
    pub mean_wait: f64,
    /// Standard deviation of the time between entering and leaving, in seconds.
    pub wait_deviation: f64,
    /// Time-weighted mean number of customers inside.
    pub mean_queue: f64,
    /// Standard deviation of the number of customers inside.
    pub queue_deviation: f64,
    /// Largest number of customers inside at once.
    pub max_queue: f64,
    /// Time the cashier spent serving.
    pub cashier_usage: f64,
}

impl fmt::Display for ModelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Customers served:           {}", self.served)?;
        writeln!(f, "Average wait time:          {:.2} min", self.mean_wait / 60.0)?;
        writeln!(f, "Wait time deviation:        {:.2} min", self.wait_deviation / 60.0)?;
        writeln!(f, "Average queue length:       {:.2}", self.mean_queue)?;
        writeln!(f, "Queue length deviation:     {:.2}", self.queue_deviation)?;
        writeln!(f, "Maximum queue length:       {}", self.max_queue)?;
        writeln!(
            f,
            "Cashier utilization:        {:.1}%",
            self.cashier_usage * 100.0 / self.run.time.max(f64::EPSILON)
        )?;
        writeln!(
            f,
            "Simulated time:             {}",
            humantime::format_duration(Duration::from_secs_f64(self.run.time.max(0.0)))
        )?;
        write!(
            f,
            "Wall time:                  {}",
            humantime::format_duration(self.run.wall_time)
        )
    }
}

/// Builds the cafeteria from `config`, runs it, and collects the statistics.
///
/// # Errors
///
/// Fails if `config` is invalid.
pub fn run_model(config: &ModelConfig) -> Result<ModelReport> {
    config.validate()?;
    let mut simulation = Simulation::new(config.seed);
    let cashier = Facility::fcfs("Cashier", 1)?;
    let buffet = Buffer::new("Buffet", config.buffet_capacity, 0.0)?;
    simulation.add_actor("Chef", Chef::new(buffet.clone(), config.preparation_time), ());
    let customer = simulation.add_actor(
        "Customer",
        Customer::new(
            buffet,
            cashier.clone(),
            config.mean_arrival,
            config.cashier_time,
        )?,
        (),
    );
    let run = simulation.run(&config.run_config())?;
    log::info!("Run finished: {:?}", run.stop);
    let stats = customer.stats();
    let served = customer.borrow().served();
    Ok(ModelReport {
        served,
        mean_wait: stats.duration_series().average(),
        wait_deviation: stats.duration_series().deviation(),
        mean_queue: stats.size_series().average(),
        queue_deviation: stats.size_series().deviation(),
        max_queue: stats.size_series().max(),
        cashier_usage: cashier.usage(),
        run,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::approx_eq;
    use rstest::*;
    use simcore::StopReason;

    #[fixture]
    fn config() -> ModelConfig {
        ModelConfig {
            sim_time: 600.0,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_config_defaults() {
        let config: ModelConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ModelConfig::default());
        assert_eq!(config.seed, 1234);
        assert!(approx_eq!(f64, config.sim_time, 3600.0));
        let config: ModelConfig =
            serde_json::from_str(r#"{"real_time": true, "step_duration": "20ms"}"#).unwrap();
        assert_eq!(config.run_config().step_duration, Duration::from_millis(20));
        assert!(config.run_config().real_time);
    }

    #[rstest]
    fn test_invalid_config(config: ModelConfig) {
        let zero_arrival = ModelConfig {
            mean_arrival: 0.0,
            ..config.clone()
        };
        assert!(run_model(&zero_arrival).is_err());
        let no_plates = ModelConfig {
            buffet_capacity: 0.5,
            ..config.clone()
        };
        assert!(run_model(&no_plates).is_err());
        let no_time = ModelConfig {
            sim_time: 0.0,
            ..config
        };
        assert!(run_model(&no_time).is_err());
    }

    #[rstest]
    fn test_same_seed_same_report(config: ModelConfig) {
        let first = run_model(&config).unwrap();
        let second = run_model(&config).unwrap();
        assert_eq!(first.served, second.served);
        assert!(approx_eq!(f64, first.mean_wait, second.mean_wait));
        assert!(approx_eq!(f64, first.cashier_usage, second.cashier_usage));
        assert_eq!(first.run.delivered, second.run.delivered);
    }

    #[rstest]
    fn test_report(config: ModelConfig) {
        let report = run_model(&config).unwrap();
        assert_eq!(report.run.stop, StopReason::Horizon);
        assert!(approx_eq!(f64, report.run.time, 600.0));
        assert!(report.served > 0);
        assert!(report.mean_wait > 0.0);
        assert!(report.max_queue >= 1.0);
        assert!(report.cashier_usage > 0.0);
        let text = report.to_string();
        assert!(text.contains("Customers served"));
        assert!(text.contains("10m"));
    }

    #[test]
    fn test_chef_refills_buffet() {
        let buffet = Buffer::new("Buffet", 5.0, 0.0).unwrap();
        let mut simulation = Simulation::new(0);
        simulation.add_actor("Chef", Chef::new(buffet.clone(), 100.0), ());
        simulation.step();
        assert!(approx_eq!(f64, buffet.current(), 5.0));
        assert!(approx_eq!(f64, buffet.percentage(), 100.0));
    }
}
