//! Audit trail for gateway executions
//!
//! Every execution owns one [`AuditTrail`]. State changes and the policy
//! decision are logged under the `audit` target. A trail dropped before it
//! settles (the client cancelled the request) ends as `failed` with reason
//! `cancelled`.

use std::fmt;
use std::time::Instant;

use mcp_common::AUDIT_TARGET;
use tracing::{info, warn};

use crate::device::ExecutionError;
use crate::operation::OperationKind;
use crate::security::{Classification, ValidationResult};

/// Lifecycle of one operation through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Received,
    Sanitizing,
    Classifying,
    Allowed,
    /// Waiting for the caller to come back with a confirmation token
    WarnPending,
    Blocked,
    Executing,
    Succeeded,
    Failed,
}

impl OperationState {
    /// States after which the trail is complete
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            OperationState::Succeeded
                | OperationState::Failed
                | OperationState::Blocked
                | OperationState::WarnPending
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationState::Received => "received",
            OperationState::Sanitizing => "sanitizing",
            OperationState::Classifying => "classifying",
            OperationState::Allowed => "allowed",
            OperationState::WarnPending => "warn_pending",
            OperationState::Blocked => "blocked",
            OperationState::Executing => "executing",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct AuditTrail {
    serial: String,
    operation: OperationKind,
    command: String,
    state: OperationState,
    classification: Option<Classification>,
    started: Instant,
}

impl AuditTrail {
    pub fn start(serial: &str, operation: OperationKind, raw_input: &str) -> Self {
        info!(
            target: AUDIT_TARGET,
            serial,
            operation = %operation,
            raw_input,
            state = %OperationState::Received,
            "Operation received"
        );
        Self {
            serial: serial.to_string(),
            operation,
            command: String::new(),
            state: OperationState::Received,
            classification: None,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Record the sanitized command line once it is known
    pub fn set_command(&mut self, command: &str) {
        self.command = command.to_string();
    }

    pub fn transition(&mut self, next: OperationState) {
        tracing::debug!(
            target: AUDIT_TARGET,
            serial = %self.serial,
            operation = %self.operation,
            from = %self.state,
            to = %next,
            "State change"
        );
        self.state = next;
    }

    /// Log the policy outcome and move to `next`. The validation record is
    /// written before anything runs.
    pub fn decision(
        &mut self,
        classification: &Classification,
        validation: &ValidationResult,
        next: OperationState,
    ) {
        self.state = next;
        self.classification = Some(classification.clone());
        let (serial, command) = (&self.serial, &validation.sanitized_input);
        let (risk, category) = (classification.risk, &classification.category);
        let reason = validation.reason.as_str();
        if matches!(next, OperationState::Blocked | OperationState::WarnPending) {
            warn!(
                target: AUDIT_TARGET,
                serial = %serial,
                operation = %self.operation,
                command = %command,
                risk = %risk,
                category = %category,
                allowed = validation.allowed,
                decision = %next,
                reason,
                "Security decision"
            );
        } else {
            info!(
                target: AUDIT_TARGET,
                serial = %serial,
                operation = %self.operation,
                command = %command,
                risk = %risk,
                category = %category,
                allowed = validation.allowed,
                decision = %next,
                reason,
                "Security decision"
            );
        }
    }

    /// Rejected before classification (bad input)
    pub fn rejected(&mut self, reason: &str) {
        self.state = OperationState::Blocked;
        warn!(
            target: AUDIT_TARGET,
            serial = %self.serial,
            operation = %self.operation,
            decision = %OperationState::Blocked,
            reason,
            "Input rejected"
        );
    }

    pub fn finish(&mut self, state: OperationState, exit_code: Option<i32>) {
        self.state = state;
        info!(
            target: AUDIT_TARGET,
            serial = %self.serial,
            operation = %self.operation,
            command = %self.command,
            state = %state,
            exit_code,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Operation finished"
        );
    }
}

impl Drop for AuditTrail {
    fn drop(&mut self) {
        if self.state.is_settled() {
            return;
        }
        let interrupted = self.state;
        self.state = OperationState::Failed;
        let (risk, category) = match &self.classification {
            Some(c) => (c.risk.to_string(), c.category.as_str()),
            None => ("UNCLASSIFIED".to_string(), "none"),
        };
        warn!(
            target: AUDIT_TARGET,
            serial = %self.serial,
            operation = %self.operation,
            command = %self.command,
            state = %self.state,
            interrupted = %interrupted,
            reason = %ExecutionError::Cancelled,
            risk = %risk,
            category = %category,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Operation cancelled"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::RiskLevel;

    #[test]
    fn test_settled_states() {
        assert!(!OperationState::Received.is_settled());
        assert!(!OperationState::Executing.is_settled());
        assert!(!OperationState::Allowed.is_settled());
        assert!(OperationState::Succeeded.is_settled());
        assert!(OperationState::Failed.is_settled());
        assert!(OperationState::Blocked.is_settled());
        assert!(OperationState::WarnPending.is_settled());
    }

    #[test]
    fn test_trail_tracks_state() {
        let mut trail = AuditTrail::start("emulator-5554", OperationKind::Shell, "getprop");
        trail.transition(OperationState::Sanitizing);
        trail.set_command("getprop");
        trail.transition(OperationState::Classifying);
        let c = Classification::new(RiskLevel::Safe, "device_info", "getprop");
        let validation = ValidationResult {
            allowed: true,
            risk: c.risk,
            reason: "allowed".to_string(),
            sanitized_input: "getprop".to_string(),
        };
        trail.decision(&c, &validation, OperationState::Allowed);
        assert_eq!(trail.state(), OperationState::Allowed);
        trail.finish(OperationState::Succeeded, Some(0));
        assert!(trail.state().is_settled());
    }
}
