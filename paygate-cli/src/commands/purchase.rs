//! Biometric purchase with password fallback.

use std::time::Duration;

use anyhow::Result;
use paygate_auth::{AttemptResult, AuthConfig, AuthStage};
use tokio_util::sync::CancellationToken;

use super::{PresenceArg, Simulation};
use crate::output;

pub struct PurchaseOptions {
    pub item: u64,
    pub presence: Vec<PresenceArg>,
    pub password: Option<String>,
    pub reset_credential: bool,
    pub reenroll: bool,
    pub cancel_after: Option<Duration>,
}

/// Try the biometric channel until it settles, then the password if one
/// was given and the controller fell back.
pub async fn purchase(
    config: AuthConfig,
    enroll_password: &str,
    opts: PurchaseOptions,
    json: bool,
) -> Result<()> {
    let mut sim = Simulation::enrolled(config, enroll_password).await?;
    if !json {
        eprintln!("Enrolled device key {}", sim.fingerprint);
    }

    sim.script(&opts.presence);
    if opts.reset_credential {
        sim.device.reset_credential();
    }

    let mut steps = Vec::new();

    // Each NotRecognized consumes one scripted step; stop when the script
    // runs out or the attempt settles.
    while sim.controller.stage() == AuthStage::Biometric {
        let cancel = CancellationToken::new();
        if let Some(after) = opts.cancel_after {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                tracing::debug!(?after, "cancelling pending prompt");
                cancel.cancel();
            });
        }

        let result = sim.controller.attempt_biometric(opts.item, &cancel).await?;
        let settled = result != AttemptResult::TryAgain || sim.presence.remaining() == 0;
        steps.push((result, sim.controller.stage()));
        if settled {
            break;
        }
    }

    if sim.controller.stage() != AuthStage::Biometric {
        if let Some(password) = &opts.password {
            let result = sim
                .controller
                .submit_password(opts.item, password, opts.reenroll)
                .await?;
            steps.push((result, sim.controller.stage()));

            if opts.reenroll && sim.controller.stage() == AuthStage::Biometric {
                let result = sim
                    .controller
                    .attempt_biometric(opts.item, &CancellationToken::new())
                    .await?;
                steps.push((result, sim.controller.stage()));
            }
        }
    }

    output::print_steps(&steps, json)
}
