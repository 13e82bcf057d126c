//! Output formatting for CLI commands.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use paygate_auth::{AttemptResult, AuthConfig, AuthStage, Proof};

/// Render a configuration.
pub fn print_config(config: &AuthConfig, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "user_id": config.user_id,
            "signing_alias": config.signing_alias,
            "recency_alias": config.recency_alias,
            "signing_algorithm": config.signing_algorithm.as_str(),
            "recency_window_ms": config.recency_window.as_millis() as u64,
            "prefer_biometric": config.prefer_biometric,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("User:              {}", config.user_id);
        println!("Signing key:       {} ({})", config.signing_alias, config.signing_algorithm);
        println!("Recency key:       {}", config.recency_alias);
        println!("Recency window:    {:?}", config.recency_window);
        println!("Prefer biometric:  {}", config.prefer_biometric);
    }
    Ok(())
}

/// JSON form of an attempt result. Never includes secrets beyond the proof
/// the caller already holds.
pub fn result_to_json(result: &AttemptResult, stage: AuthStage) -> serde_json::Value {
    let mut value = match result {
        AttemptResult::Accepted(auth) => {
            let proof = match &auth.proof {
                Proof::Signature(signature) => serde_json::json!({
                    "kind": "signature",
                    "signature": STANDARD.encode(signature.as_bytes()),
                }),
                Proof::Password => serde_json::json!({ "kind": "password" }),
                Proof::Recency { sealed } => serde_json::json!({
                    "kind": "recency",
                    "sealed": STANDARD.encode(sealed),
                }),
            };
            serde_json::json!({
                "outcome": "accepted",
                "transaction": auth.transaction,
                "proof": proof,
            })
        }
        AttemptResult::Rejected => serde_json::json!({ "outcome": "rejected" }),
        AttemptResult::Cancelled => serde_json::json!({ "outcome": "cancelled" }),
        AttemptResult::TryAgain => serde_json::json!({ "outcome": "try-again" }),
        AttemptResult::FellBack(reason) => serde_json::json!({
            "outcome": "fell-back",
            "reason": reason.map(|r| format!("{r:?}")),
        }),
        AttemptResult::ReEnrollRequired => serde_json::json!({ "outcome": "re-enroll-required" }),
    };
    value["stage"] = serde_json::json!(stage);
    value
}

/// Human-readable one-liner for an attempt result.
pub fn describe(result: &AttemptResult) -> String {
    match result {
        AttemptResult::Accepted(auth) => {
            let via = match auth.proof {
                Proof::Signature(_) => "device signature",
                Proof::Password => "password",
                Proof::Recency { .. } => "recent unlock",
            };
            format!(
                "Accepted: item {} for {} (nonce {}) via {via}",
                auth.transaction.item_id(),
                auth.transaction.user_id(),
                auth.transaction.client_nonce().value(),
            )
        }
        AttemptResult::Rejected => "Rejected".to_string(),
        AttemptResult::Cancelled => "Cancelled".to_string(),
        AttemptResult::TryAgain => "Not recognized, try again".to_string(),
        AttemptResult::FellBack(Some(reason)) => format!("Falling back to password ({reason:?})"),
        AttemptResult::FellBack(None) => "Falling back to password".to_string(),
        AttemptResult::ReEnrollRequired => {
            "Device key invalidated: enter password to re-enroll".to_string()
        }
    }
}

/// Print each step of a command, either as lines or as a JSON array.
pub fn print_steps(steps: &[(AttemptResult, AuthStage)], json: bool) -> Result<()> {
    if json {
        let values: Vec<_> = steps
            .iter()
            .map(|(result, stage)| result_to_json(result, *stage))
            .collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        for (result, stage) in steps {
            println!("{}  [stage: {stage:?}]", describe(result));
        }
    }
    Ok(())
}
