//! Weighted retry budgeting for fetch failures.
//!
//! This module provides the [`RetryPlan`] and [`FailureClass`] types for
//! classifying invalid fetch outcomes and pacing retries.
//!
//! # Overview
//!
//! Every failed attempt is classified into a [`FailureClass`]:
//! - [`FailureClass::Unavailable`] - the vendor signaled a known transient
//!   numeric code in-band (the body was e.g. `"503"`)
//! - [`FailureClass::Error`] - any other invalid outcome: empty body, unknown
//!   numeric code, non-2xx status, connection failure, timeout
//!
//! Each class maps to a [`BackoffRule`] carrying a weight, a pause interval,
//! and a [`PauseStyle`]. Failures spend their rule's weight against the plan's
//! cumulative budget; once the budget is exceeded the fetch gives up without a
//! further sleep. The classic fixed-count configuration (N retries for
//! unavailable, M for errors, constant interval) is the special case built by
//! [`RetryPlan::flat`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use novelkeeper_core::fetch::{FailureClass, RetryDecision, RetryPlan};
//!
//! let plan = RetryPlan::flat(3, 2, Duration::from_millis(200));
//! let mut state = plan.state();
//!
//! match plan.decide(FailureClass::Unavailable, &mut state) {
//!     RetryDecision::Pause { pause, occurrence } => {
//!         println!("occurrence {occurrence} failed, pausing {pause:?}");
//!     }
//!     RetryDecision::GiveUp { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::error::FetchError;

/// Default retry count for vendor-unavailable responses in flat plans.
pub const DEFAULT_RETRY_UNAVAILABLE: u32 = 3;

/// Default retry count for transport/validation failures in flat plans.
pub const DEFAULT_RETRY_ERROR: u32 = 3;

/// Default pause between attempts in flat plans.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Hard cap on a single computed pause, jitter excluded.
const MAX_PAUSE: Duration = Duration::from_secs(60);

/// Classification of an invalid fetch outcome.
///
/// Used to pick the backoff rule that pays for the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The vendor signaled a known transient numeric code in-band.
    ///
    /// The request itself succeeded at the transport level; the body carried
    /// a bare code from the site's configured transient set (e.g. `"503"`).
    Unavailable,

    /// Any other invalid outcome.
    ///
    /// Examples: empty body, numeric body outside the transient set, non-2xx
    /// transport status, connection failure, timeout.
    Error,
}

/// Pacing applied to a rule's pause interval across repeated failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseStyle {
    /// Constant pause: every occurrence sleeps the rule's interval.
    #[default]
    Linear,

    /// Doubling pause: occurrence n sleeps `interval * 2^(n-1)`, capped.
    Exponential,
}

/// One backoff rule: how much budget a failure of its class burns and how
/// long to pause before the next attempt.
#[derive(Debug, Clone)]
pub struct BackoffRule {
    condition: FailureClass,
    weight: u32,
    pause: Duration,
    style: PauseStyle,
}

impl BackoffRule {
    /// Creates a rule for a failure class.
    ///
    /// `weight` is clamped to at least 1 so a rule can never retry for free.
    #[must_use]
    pub fn new(condition: FailureClass, weight: u32, pause: Duration, style: PauseStyle) -> Self {
        Self {
            condition,
            weight,
            pause,
            style,
        }
        .clamped()
    }

    fn clamped(mut self) -> Self {
        self.weight = self.weight.max(1);
        self
    }

    /// Pause for the n-th occurrence of this rule's class (1-indexed).
    fn pause_for(&self, occurrence: u32) -> Duration {
        let nominal = match self.style {
            PauseStyle::Linear => self.pause,
            PauseStyle::Exponential => {
                let factor = 1_u32 << occurrence.saturating_sub(1).min(16);
                self.pause.saturating_mul(factor)
            }
        };
        nominal.min(MAX_PAUSE)
    }
}

/// Decision on whether to retry a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep `pause`, then try again.
    Pause {
        /// How long to wait before retrying (nominal pause plus jitter).
        pause: Duration,
        /// How many failures of this class have now occurred (1-indexed).
        occurrence: u32,
    },

    /// Budget exhausted; surface the last error to the caller.
    GiveUp {
        /// Human-readable reason why no further retry is attempted.
        reason: String,
    },
}

/// Mutable bookkeeping for one logical fetch.
///
/// Created fresh per fetch via [`RetryPlan::state`]; tracks cumulative spent
/// weight and per-rule occurrence counts for exponential pacing.
#[derive(Debug, Clone)]
pub struct RetryState {
    spent: u32,
    occurrences: Vec<u32>,
}

impl RetryState {
    /// Total weight spent so far.
    #[must_use]
    pub fn spent(&self) -> u32 {
        self.spent
    }
}

/// Cumulative retry budget with per-condition backoff rules.
///
/// # Budget Semantics
///
/// Each failure spends its rule's weight. A failure that pushes the total
/// over `max_weight` is terminal: the plan returns [`RetryDecision::GiveUp`]
/// and no sleep happens. A failure at or under budget pauses and retries, so
/// a flat plan built for `(ru, re)` sleeps exactly `ru` times under pure
/// unavailable failures and exactly `re` times under pure transport failures.
#[derive(Debug, Clone)]
pub struct RetryPlan {
    rules: Vec<BackoffRule>,
    max_weight: u32,
}

impl Default for RetryPlan {
    fn default() -> Self {
        Self::flat(
            DEFAULT_RETRY_UNAVAILABLE,
            DEFAULT_RETRY_ERROR,
            DEFAULT_RETRY_INTERVAL,
        )
    }
}

impl RetryPlan {
    /// Creates a plan from explicit rules and a cumulative weight budget.
    ///
    /// A class with no rule gives up on its first failure.
    #[must_use]
    pub fn new(rules: Vec<BackoffRule>, max_weight: u32) -> Self {
        Self { rules, max_weight }
    }

    /// Creates the classic fixed-count plan as a weighted special case.
    ///
    /// The budget is `lcm(retry_unavailable, retry_error)` and each class
    /// weighs `budget / count`, so pure failure runs of either class retry
    /// exactly `count` times with a constant `interval` pause (linear
    /// pacing). A count of zero makes that class terminal on first failure.
    #[must_use]
    pub fn flat(retry_unavailable: u32, retry_error: u32, interval: Duration) -> Self {
        let budget = match (retry_unavailable, retry_error) {
            (0, 0) => 0,
            (0, n) | (n, 0) => n,
            (a, b) => lcm(a, b),
        };
        // weight budget+1 means "give up on first failure of this class"
        let unavailable_weight = if retry_unavailable == 0 {
            budget.saturating_add(1)
        } else {
            budget / retry_unavailable
        };
        let error_weight = if retry_error == 0 {
            budget.saturating_add(1)
        } else {
            budget / retry_error
        };

        Self::new(
            vec![
                BackoffRule::new(
                    FailureClass::Unavailable,
                    unavailable_weight,
                    interval,
                    PauseStyle::Linear,
                ),
                BackoffRule::new(FailureClass::Error, error_weight, interval, PauseStyle::Linear),
            ],
            budget,
        )
    }

    /// Returns the cumulative weight budget.
    #[must_use]
    pub fn max_weight(&self) -> u32 {
        self.max_weight
    }

    /// Creates fresh bookkeeping for one logical fetch.
    #[must_use]
    pub fn state(&self) -> RetryState {
        RetryState {
            spent: 0,
            occurrences: vec![0; self.rules.len()],
        }
    }

    /// Spends a failure against the budget and decides what happens next.
    ///
    /// # Arguments
    ///
    /// * `class` - Classification of the failure that just happened
    /// * `state` - Bookkeeping created by [`RetryPlan::state`] for this fetch
    #[instrument(skip(self, state), fields(budget = self.max_weight))]
    pub fn decide(&self, class: FailureClass, state: &mut RetryState) -> RetryDecision {
        let Some(pos) = self.rules.iter().position(|rule| rule.condition == class) else {
            return RetryDecision::GiveUp {
                reason: format!("no backoff rule configured for {class:?} failures"),
            };
        };
        let rule = &self.rules[pos];

        state.spent = state.spent.saturating_add(rule.weight);
        if state.spent > self.max_weight {
            debug!(spent = state.spent, "retry budget exhausted");
            return RetryDecision::GiveUp {
                reason: format!("retry budget ({}) exhausted", self.max_weight),
            };
        }

        state.occurrences[pos] += 1;
        let occurrence = state.occurrences[pos];
        let nominal = rule.pause_for(occurrence);
        let pause = nominal + additive_jitter(nominal);

        debug!(
            spent = state.spent,
            occurrence,
            pause_ms = pause.as_millis() as u64,
            "will retry"
        );

        RetryDecision::Pause { pause, occurrence }
    }
}

/// Classifies a fetch error against a site's transient code set.
///
/// Only an in-band numeric code listed in `transient_codes` counts as
/// [`FailureClass::Unavailable`]; everything else (empty body, unknown code,
/// transport failure, timeout, non-2xx status) is [`FailureClass::Error`].
#[must_use]
pub fn classify_failure(error: &FetchError, transient_codes: &[String]) -> FailureClass {
    match error.code() {
        Some(code) if transient_codes.iter().any(|known| known == code) => {
            FailureClass::Unavailable
        }
        _ => FailureClass::Error,
    }
}

/// Additive jitter between zero and a quarter of the nominal pause.
///
/// Strictly additive so elapsed-time lower bounds on retry runs still hold.
fn additive_jitter(pause: Duration) -> Duration {
    let cap = u64::try_from(pause.as_millis() / 4).unwrap_or(u64::MAX);
    if cap == 0 {
        return Duration::ZERO;
    }
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..=cap))
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: u32, b: u32) -> u32 {
    let scaled = u64::from(a / gcd(a, b)) * u64::from(b);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}
