//! Background job replacing the expired activation tokens of users who
//! never activated their account.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;

use crate::AppState;
use crate::clock::Clock;
use crate::config;
use crate::error::Result;
use crate::mail::{self, Mailer, Template};
use crate::token::{Scope, TokenAuthority};
use crate::user::UserRepository;

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub reissued: usize,
    pub failed: usize,
}

pub struct ActivationSweeper {
    users: Arc<dyn UserRepository>,
    tokens: TokenAuthority,
    mail: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    config: config::Sweeper,
}

impl ActivationSweeper {
    /// Create a new [`ActivationSweeper`].
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: TokenAuthority,
        mail: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        config: config::Sweeper,
    ) -> Self {
        Self {
            users,
            tokens,
            mail,
            clock,
            config,
        }
    }

    /// Build a sweeper sharing the application stores.
    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            Arc::clone(&state.users),
            state.tokens.clone(),
            Arc::clone(&state.mail),
            Arc::clone(&state.clock),
            state.config.sweeper.clone(),
        )
    }

    /// Sweep on every tick until the candidate query fails.
    pub async fn run(self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval = ?self.config.interval(), "activation sweeper started");

        loop {
            ticker.tick().await;

            if let Err(err) = self.sweep().await {
                tracing::error!(error = %err, "activation sweeper stopped");
                return Err(err);
            }
        }
    }

    /// Reissue an activation token for every user whose newest one expired
    /// more than the grace period ago.
    ///
    /// Only a failing candidate query is an error. A user whose token can't
    /// be replaced is logged and skipped.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let cutoff = self.clock.now() - self.config.grace();
        let candidates = self.users.find_unactivated_expired(cutoff).await?;

        let mut report = SweepReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        for user in candidates {
            let token = match self
                .tokens
                .reissue(user.id, self.config.ttl(), Scope::Activation)
                .await
            {
                Ok(token) => token,
                Err(err) => {
                    tracing::error!(
                        user_id = user.id,
                        error = %err,
                        "activation token not reissued"
                    );
                    report.failed += 1;
                    continue;
                },
            };

            mail::dispatch(
                Arc::clone(&self.mail),
                user.email,
                Template::UserWelcome,
                mail::activation_payload(&token),
            );
            report.reissued += 1;
        }

        metrics::counter!("sweeper_candidates_total").increment(report.candidates as u64);
        metrics::counter!("sweeper_reissued_total").increment(report.reissued as u64);
        metrics::counter!("sweeper_failures_total").increment(report.failed as u64);

        if report.candidates > 0 {
            tracing::info!(?report, "activation sweep done");
        }

        Ok(report)
    }
}
