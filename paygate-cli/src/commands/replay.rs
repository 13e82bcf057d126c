//! Replay demonstration.

use anyhow::{bail, Result};
use paygate_auth::{AttemptResult, AuthConfig, Proof};
use tokio_util::sync::CancellationToken;

use super::Simulation;
use crate::output;

/// Authorize once, then hand the identical transaction and signature to the
/// backend a second time.
pub async fn replay(config: AuthConfig, enroll_password: &str, item: u64, json: bool) -> Result<()> {
    let mut sim = Simulation::enrolled(config, enroll_password).await?;

    let result = sim
        .controller
        .attempt_biometric(item, &CancellationToken::new())
        .await?;
    let AttemptResult::Accepted(auth) = &result else {
        bail!("first submission was not accepted: {}", output::describe(&result));
    };
    let Proof::Signature(signature) = &auth.proof else {
        bail!("first submission was not signed");
    };

    let replay_accepted = sim.backend.verify_signature(&auth.transaction, signature);

    if json {
        let value = serde_json::json!({
            "first": output::result_to_json(&result, sim.controller.stage()),
            "replay_accepted": replay_accepted,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", output::describe(&result));
        println!(
            "Resubmitting the same transaction: {}",
            if replay_accepted { "ACCEPTED (bug!)" } else { "rejected" }
        );
    }
    Ok(())
}
