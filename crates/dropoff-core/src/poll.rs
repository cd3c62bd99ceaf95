//! Bounded polling with an owned countdown.
//!
//! Each tick issues one probe. If the countdown is already zero the poll is
//! exhausted, whatever the probe answered. Otherwise a ready probe ends the
//! poll, and a not-ready probe decrements the countdown and sleeps one
//! interval. A budget of `n` therefore allows up to `n + 1` probes.
//!
//! Timeouts are counted in ticks, not wall-clock time: a slow probe stretches
//! the real duration.

use std::future::Future;
use std::time::Duration;

/// How a bounded poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The probe reported ready after `ticks` probes.
    Ready {
        /// Probes issued, including the ready one.
        ticks: u32,
    },
    /// The countdown ran out after `ticks` probes.
    Exhausted {
        /// Probes issued.
        ticks: u32,
    },
    /// The poll noticed it was no longer wanted and stopped.
    Abandoned,
}

/// A countdown budget plus the delay between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedPoll {
    budget: u32,
    interval: Duration,
}

impl BoundedPoll {
    /// A poll allowing `budget` not-ready answers, `interval` apart.
    #[must_use]
    pub const fn new(budget: u32, interval: Duration) -> Self {
        Self { budget, interval }
    }

    /// Countdown the poll starts from.
    #[must_use]
    pub const fn budget(&self) -> u32 {
        self.budget
    }

    /// Run `probe` until it reports ready or the countdown runs out.
    ///
    /// `is_current` is checked before and after every probe; once it returns
    /// `false` the poll stops with [`PollOutcome::Abandoned`] and issues no
    /// further probes. Probes never overlap.
    pub async fn run<P, F, C>(&self, mut probe: P, mut is_current: C) -> PollOutcome
    where
        P: FnMut() -> F,
        F: Future<Output = bool>,
        C: FnMut() -> bool,
    {
        let mut remaining = self.budget;
        let mut ticks = 0;

        loop {
            if !is_current() {
                return PollOutcome::Abandoned;
            }

            let ready = probe().await;
            ticks += 1;

            if !is_current() {
                return PollOutcome::Abandoned;
            }
            if remaining == 0 {
                return PollOutcome::Exhausted { ticks };
            }
            if ready {
                return PollOutcome::Ready { ticks };
            }

            remaining -= 1;
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    fn scripted(values: &[bool]) -> RefCell<VecDeque<bool>> {
        RefCell::new(values.iter().copied().collect())
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_probe() {
        let poll = BoundedPoll::new(6, Duration::from_secs(1));
        let outcome = poll.run(|| async { true }, || true).await;
        assert_eq!(outcome, PollOutcome::Ready { ticks: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_sequence() {
        let answers = scripted(&[false, false, true]);
        let poll = BoundedPoll::new(6, Duration::from_secs(1));
        let started = tokio::time::Instant::now();

        let outcome = poll
            .run(
                || {
                    let next = answers.borrow_mut().pop_front().unwrap_or(false);
                    async move { next }
                },
                || true,
            )
            .await;

        assert_eq!(outcome, PollOutcome::Ready { ticks: 3 });
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert!(answers.borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_budget_plus_one_probes() {
        let probes = Cell::new(0u32);
        let poll = BoundedPoll::new(6, Duration::from_secs(1));

        let outcome = poll
            .run(
                || {
                    probes.set(probes.get() + 1);
                    async { false }
                },
                || true,
            )
            .await;

        assert_eq!(outcome, PollOutcome::Exhausted { ticks: 7 });
        assert_eq!(probes.get(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_wins_over_late_ready() {
        let mut answers = vec![false; 6];
        answers.push(true);
        let answers = scripted(&answers);
        let poll = BoundedPoll::new(6, Duration::from_secs(1));

        let outcome = poll
            .run(
                || {
                    let next = answers.borrow_mut().pop_front().unwrap_or(false);
                    async move { next }
                },
                || true,
            )
            .await;

        assert_eq!(outcome, PollOutcome::Exhausted { ticks: 7 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_when_no_longer_current() {
        let probes = Cell::new(0u32);
        let poll = BoundedPoll::new(30, Duration::from_secs(1));

        let outcome = poll
            .run(
                || {
                    probes.set(probes.get() + 1);
                    async { false }
                },
                || probes.get() < 3,
            )
            .await;

        assert_eq!(outcome, PollOutcome::Abandoned);
        assert_eq!(probes.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_current_before_first_probe() {
        let probes = Cell::new(0u32);
        let poll = BoundedPoll::new(30, Duration::from_secs(1));

        let outcome = poll
            .run(
                || {
                    probes.set(probes.get() + 1);
                    async { true }
                },
                || false,
            )
            .await;

        assert_eq!(outcome, PollOutcome::Abandoned);
        assert_eq!(probes.get(), 0);
    }
}
