//! Purchase through the recency-window key.

use std::time::{Duration, Instant};

use anyhow::Result;
use paygate_auth::AuthConfig;
use tokio_util::sync::CancellationToken;

use super::{PresenceArg, Simulation};
use crate::output;

pub async fn recency(
    config: AuthConfig,
    enroll_password: &str,
    item: u64,
    unlocked_ago: Option<Duration>,
    presence: Vec<PresenceArg>,
    json: bool,
) -> Result<()> {
    let mut sim = Simulation::enrolled(config, enroll_password).await?;
    sim.script(&presence);

    if let Some(ago) = unlocked_ago {
        // An unrepresentable instant means "long ago": leave no unlock recorded.
        if let Some(at) = Instant::now().checked_sub(ago) {
            sim.device.record_unlock_at(at);
        }
    }
    if !json {
        eprintln!(
            "Recency window {:?}, last unlock {}",
            sim.controller.config().recency_window,
            unlocked_ago.map_or("never".to_string(), |ago| format!("{ago:?} ago")),
        );
    }

    let result = sim
        .controller
        .attempt_recency(item, &CancellationToken::new())
        .await?;
    let stage = sim.controller.stage();

    output::print_steps(&[(result, stage)], json)
}
