//! Policy decisions by risk tier
//!
//! | risk      | decision                                   |
//! |-----------|--------------------------------------------|
//! | SAFE, LOW | allow                                      |
//! | MEDIUM    | allow, annotated with a warning            |
//! | HIGH      | allow only with a valid confirmation token |
//! | CRITICAL  | block, tokens are ignored                  |

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::confirm::{ConfirmationBinding, ConfirmationSigner};
use super::error::{SecurityError, SecurityPolicyError};
use super::types::{Classification, RiskLevel};

/// What the caller must do before a HIGH risk operation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationRequest {
    pub risk: RiskLevel,
    pub category: String,
    pub description: String,
    pub command: String,
    pub message: String,
    /// Pass back unchanged as `confirmation_token` to proceed
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Run it. `warning` is set for MEDIUM risk.
    Allow { warning: Option<String> },
    Confirm(ConfirmationRequest),
}

#[derive(Debug, Clone)]
pub struct PolicyEngine {
    signer: ConfirmationSigner,
    ttl: Duration,
}

impl PolicyEngine {
    pub fn new(signer: ConfirmationSigner, ttl: Duration) -> Self {
        Self { signer, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn decide(
        &self,
        classification: &Classification,
        command: &str,
        binding: &ConfirmationBinding,
        token: Option<&str>,
    ) -> Result<Decision, SecurityError> {
        self.decide_at(classification, command, binding, token, Utc::now())
    }

    pub fn decide_at(
        &self,
        classification: &Classification,
        command: &str,
        binding: &ConfirmationBinding,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Decision, SecurityError> {
        match classification.risk {
            RiskLevel::Safe | RiskLevel::Low => Ok(Decision::Allow { warning: None }),
            RiskLevel::Medium => Ok(Decision::Allow {
                warning: Some(warning_message(classification)),
            }),
            RiskLevel::High => match token {
                Some(token) => {
                    self.signer.verify(token, binding, now.timestamp())?;
                    Ok(Decision::Allow { warning: None })
                }
                None => Ok(Decision::Confirm(self.request(
                    classification,
                    command,
                    binding,
                    now,
                ))),
            },
            RiskLevel::Critical => Err(SecurityPolicyError {
                risk: classification.risk,
                category: classification.category.clone(),
                description: classification.description.clone(),
                command: command.to_string(),
            }
            .into()),
        }
    }

    fn request(
        &self,
        classification: &Classification,
        command: &str,
        binding: &ConfirmationBinding,
        now: DateTime<Utc>,
    ) -> ConfirmationRequest {
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        ConfirmationRequest {
            risk: classification.risk,
            category: classification.category.clone(),
            description: classification.description.clone(),
            command: command.to_string(),
            message: warning_message(classification),
            token: self.signer.issue(binding, expires_at.timestamp()),
            expires_at,
        }
    }
}

/// Human-readable warning for a classified command
pub fn warning_message(classification: &Classification) -> String {
    match classification.risk {
        RiskLevel::Critical => format!(
            "CRITICAL: {} ({}). This operation is blocked.",
            classification.description, classification.category
        ),
        RiskLevel::High => format!(
            "HIGH RISK: {} ({}). Re-send the request with the confirmation token to proceed.",
            classification.description, classification.category
        ),
        RiskLevel::Medium => format!(
            "Caution: {} ({}).",
            classification.description, classification.category
        ),
        RiskLevel::Safe | RiskLevel::Low => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::error::ConfirmationError;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(
            ConfirmationSigner::new(b"policy-test").unwrap(),
            Duration::from_secs(300),
        )
    }

    fn binding(command: &str) -> ConfirmationBinding {
        ConfirmationBinding::new("emulator-5554", "adb_shell", command, None)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_oversized_ttl_saturates() {
        let engine = PolicyEngine::new(
            ConfirmationSigner::new(b"policy-test").unwrap(),
            Duration::from_secs(9_000_000_000_000),
        );
        let c = Classification::new(RiskLevel::High, "app_removal", "Uninstalling");
        let command = "pm uninstall com.example.app";
        match engine.decide(&c, command, &binding(command), None).unwrap() {
            Decision::Confirm(request) => assert_eq!(request.expires_at, DateTime::<Utc>::MAX_UTC),
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[test]
    fn test_safe_and_low_allowed() {
        let engine = engine();
        for risk in [RiskLevel::Safe, RiskLevel::Low] {
            let c = Classification::new(risk, "device_info", "getprop");
            let decision = engine.decide(&c, "getprop", &binding("getprop"), None).unwrap();
            assert_eq!(decision, Decision::Allow { warning: None });
        }
    }

    #[test]
    fn test_medium_allowed_with_warning() {
        let c = Classification::new(RiskLevel::Medium, "unknown", "Unrecognized command");
        let decision = engine()
            .decide(&c, "frobnicate", &binding("frobnicate"), None)
            .unwrap();
        match decision {
            Decision::Allow { warning: Some(w) } => assert!(w.contains("Unrecognized")),
            other => panic!("expected warning, got {other:?}"),
        }
    }

    #[test]
    fn test_high_requires_then_accepts_token() {
        let engine = engine();
        let command = "pm uninstall com.example.app";
        let c = Classification::new(RiskLevel::High, "app_removal", "Uninstalling");

        let request = match engine.decide_at(&c, command, &binding(command), None, at(1_000)) {
            Ok(Decision::Confirm(request)) => request,
            other => panic!("expected confirmation, got {other:?}"),
        };
        assert_eq!(request.expires_at, at(1_300));
        assert_eq!(request.command, command);
        assert!(request.message.starts_with("HIGH RISK"));

        let decision = engine
            .decide_at(&c, command, &binding(command), Some(&request.token), at(1_100))
            .unwrap();
        assert_eq!(decision, Decision::Allow { warning: None });

        let late = engine.decide_at(&c, command, &binding(command), Some(&request.token), at(1_301));
        assert_eq!(
            late,
            Err(SecurityError::Confirmation(ConfirmationError::Expired))
        );
    }

    #[test]
    fn test_token_for_other_command_rejected() {
        let engine = engine();
        let c = Classification::new(RiskLevel::High, "app_removal", "Uninstalling");
        let token = match engine.decide_at(&c, "pm uninstall a.b", &binding("pm uninstall a.b"), None, at(0)) {
            Ok(Decision::Confirm(request)) => request.token,
            other => panic!("expected confirmation, got {other:?}"),
        };
        let other = engine.decide_at(
            &c,
            "pm uninstall c.d",
            &binding("pm uninstall c.d"),
            Some(&token),
            at(10),
        );
        assert_eq!(
            other,
            Err(SecurityError::Confirmation(ConfirmationError::Mismatch))
        );
    }

    #[test]
    fn test_critical_blocked_even_with_token() {
        let engine = engine();
        let command = "dd if=/dev/zero of=/dev/block/sda";
        let c = Classification::new(RiskLevel::Critical, "partition_write", "dd");

        // a token that would be valid for the same binding
        let forged = engine.signer.issue(&binding(command), 9_999_999_999);
        let result = engine.decide(&c, command, &binding(command), Some(&forged));
        match result {
            Err(SecurityError::Policy(err)) => {
                assert_eq!(err.risk, RiskLevel::Critical);
                assert_eq!(err.category, "partition_write");
                assert_eq!(err.command, command);
            }
            other => panic!("expected block, got {other:?}"),
        }
    }
}
