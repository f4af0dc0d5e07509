use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio_util::sync::CancellationToken;

use crate::service::{CountPolicy, QueueOptions};

/// Timings and counting policy for the queue and its drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub produce_interval: Duration,
    pub drain_interval: Duration,
    pub report_interval: Duration,
    pub time_unit: Duration,
    pub policy: CountPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            produce_interval: Duration::from_secs(2),
            drain_interval: Duration::from_secs(5),
            report_interval: Duration::from_secs(10),
            time_unit: Duration::from_secs(1),
            policy: CountPolicy::Fixed,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let policy = match lookup("ORDERS_COUNT_POLICY").filter(|v| !v.is_empty()) {
            Some(value) => value.parse::<CountPolicy>().context("invalid ORDERS_COUNT_POLICY")?,
            None => defaults.policy,
        };

        Ok(Self {
            produce_interval: parse_period(
                &lookup,
                "ORDERS_PRODUCE_INTERVAL_MS",
                defaults.produce_interval,
            )?,
            drain_interval: parse_period(&lookup, "ORDERS_DRAIN_INTERVAL_MS", defaults.drain_interval)?,
            report_interval: parse_period(
                &lookup,
                "ORDERS_REPORT_INTERVAL_MS",
                defaults.report_interval,
            )?,
            time_unit: parse_period(&lookup, "ORDERS_TIME_UNIT_MS", defaults.time_unit)?,
            policy,
        })
    }

    pub fn queue_options(&self, shutdown: CancellationToken) -> QueueOptions {
        QueueOptions {
            policy: self.policy,
            time_unit: self.time_unit,
            shutdown,
        }
    }
}

fn parse_period<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };

    let millis = value
        .trim()
        .parse::<u64>()
        .with_context(|| format!("invalid {key} value '{value}', expected milliseconds"))?;
    if millis == 0 {
        return Err(anyhow!("{key} must be greater than zero"));
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_two_and_five_second_periods() {
        let cfg = ServiceConfig::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.produce_interval, Duration::from_secs(2));
        assert_eq!(cfg.drain_interval, Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = ServiceConfig::from_lookup(lookup(&[
            ("ORDERS_PRODUCE_INTERVAL_MS", "20"),
            ("ORDERS_DRAIN_INTERVAL_MS", " 50 "),
            ("ORDERS_TIME_UNIT_MS", "10"),
            ("ORDERS_COUNT_POLICY", "on-demand"),
        ]))
        .expect("overrides");

        assert_eq!(cfg.produce_interval, Duration::from_millis(20));
        assert_eq!(cfg.drain_interval, Duration::from_millis(50));
        assert_eq!(cfg.time_unit, Duration::from_millis(10));
        assert_eq!(cfg.report_interval, Duration::from_secs(10));
        assert_eq!(cfg.policy, CountPolicy::OnDemand);
    }

    #[test]
    fn zero_and_garbage_periods_are_rejected() {
        let err = ServiceConfig::from_lookup(lookup(&[("ORDERS_DRAIN_INTERVAL_MS", "0")]))
            .expect_err("zero period");
        assert!(err.to_string().contains("ORDERS_DRAIN_INTERVAL_MS"));

        assert!(ServiceConfig::from_lookup(lookup(&[("ORDERS_TIME_UNIT_MS", "soon")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup(&[("ORDERS_COUNT_POLICY", "maybe")])).is_err());
    }
}
