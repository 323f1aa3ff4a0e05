//! Command execution gateway
//!
//! The single path from a tool call to a device. Each call runs
//! sanitize, plan, classify, decide and only then execute. No step is
//! skipped and nothing is cached between calls.

use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditTrail, OperationState};
use crate::device::{DeviceExecutor, DeviceHandle, DeviceRegistry, ExecutionError};
use crate::operation::{CommandPlan, Operation};
use crate::security::{
    Classification, ConfirmationBinding, ConfirmationRequest, Decision, InputKind, RiskLevel,
    Security, SecurityError, ValidationResult,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything the gateway needs to run one operation
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub device_serial: String,
    pub operation: Operation,
    /// Minimum risk for this call. Never lowers the classified risk.
    pub risk_override: Option<RiskLevel>,
    pub confirmation: Option<String>,
    pub timeout: Option<Duration>,
}

impl ExecutionContext {
    pub fn new(device_serial: impl Into<String>, operation: Operation) -> Self {
        Self {
            device_serial: device_serial.into(),
            operation,
            risk_override: None,
            confirmation: None,
            timeout: None,
        }
    }

    pub fn with_confirmation(mut self, token: Option<String>) -> Self {
        self.confirmation = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_risk_override(mut self, floor: Option<RiskLevel>) -> Self {
        self.risk_override = floor;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: i32,
    pub validation: ValidationResult,
    /// Set for MEDIUM risk operations
    pub warning: Option<String>,
}

impl ExecutionOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[derive(Debug)]
pub enum ExecutionOutcome {
    Success(ExecutionOutput),
    ConfirmationRequired(ConfirmationRequest),
    /// Refused by the security layer. Nothing ran.
    Rejected(SecurityError),
    /// Allowed, but the device side failed
    Failed(ExecutionError),
}

impl ExecutionOutcome {
    pub fn final_state(&self) -> OperationState {
        match self {
            ExecutionOutcome::Success(_) => OperationState::Succeeded,
            ExecutionOutcome::ConfirmationRequired(_) => OperationState::WarnPending,
            ExecutionOutcome::Rejected(_) => OperationState::Blocked,
            ExecutionOutcome::Failed(_) => OperationState::Failed,
        }
    }
}

/// Sanitized and classified, not yet decided
struct Evaluation {
    serial: String,
    plan: CommandPlan,
    classification: Classification,
}

#[derive(Clone)]
pub struct Gateway {
    security: Arc<Security>,
    executor: Arc<dyn DeviceExecutor>,
    registry: Arc<dyn DeviceRegistry>,
    default_timeout: Duration,
    max_timeout: Duration,
}

impl Gateway {
    pub fn new(
        security: Arc<Security>,
        executor: Arc<dyn DeviceExecutor>,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Self {
        Self {
            security,
            executor,
            registry,
            default_timeout: DEFAULT_TIMEOUT,
            max_timeout: MAX_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, default_timeout: Duration, max_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self.max_timeout = max_timeout.max(default_timeout);
        self
    }

    pub fn security(&self) -> &Security {
        &self.security
    }

    /// Pre-flight classification of a shell command. Nothing runs.
    pub fn classify(&self, command: &str) -> Classification {
        self.security.classify(command)
    }

    pub async fn devices(&self) -> Result<Vec<DeviceHandle>, ExecutionError> {
        self.registry.list().await
    }

    /// Pick the target device for a tool call
    pub async fn select_device(&self, serial: Option<&str>) -> Result<DeviceHandle, ExecutionError> {
        self.registry.select(serial).await
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> Result<Evaluation, SecurityError> {
        let sanitizer = self.security.sanitizer();
        let serial = sanitizer.sanitize(&ctx.device_serial, InputKind::Serial)?;
        let plan = ctx.operation.plan(sanitizer)?;

        let mut classification = self.security.classify(&plan.command_line);
        if let Some(floor) = ctx.risk_override {
            if floor > classification.risk {
                classification.risk = floor;
                classification.description =
                    format!("{} (raised to {floor} by override)", classification.description);
            }
        }

        Ok(Evaluation {
            serial,
            plan,
            classification,
        })
    }

    fn binding(&self, evaluation: &Evaluation) -> ConfirmationBinding {
        ConfirmationBinding::new(
            &evaluation.serial,
            evaluation.plan.kind,
            &evaluation.plan.command_line,
            evaluation.plan.stdin.as_deref(),
        )
    }

    fn decide(
        &self,
        evaluation: &Evaluation,
        token: Option<&str>,
    ) -> (Result<Decision, SecurityError>, ValidationResult) {
        let decision = self.security.policy().decide(
            &evaluation.classification,
            &evaluation.plan.command_line,
            &self.binding(evaluation),
            token,
        );
        let (allowed, reason) = match &decision {
            Ok(Decision::Allow { warning }) => (
                true,
                warning.clone().unwrap_or_else(|| "allowed".to_string()),
            ),
            Ok(Decision::Confirm(request)) => (false, request.message.clone()),
            Err(e) => (false, e.to_string()),
        };
        let validation = ValidationResult {
            allowed,
            risk: evaluation.classification.risk,
            reason,
            sanitized_input: evaluation.plan.command_line.clone(),
        };
        (decision, validation)
    }

    /// Sanitize, classify and decide without executing.
    ///
    /// Only sanitization failures are errors. Policy refusals come back as
    /// `allowed: false` with the reason.
    pub fn validate(&self, ctx: &ExecutionContext) -> Result<ValidationResult, SecurityError> {
        let evaluation = self.evaluate(ctx)?;
        let (_, validation) = self.decide(&evaluation, ctx.confirmation.as_deref());
        Ok(validation)
    }

    pub async fn execute(&self, ctx: ExecutionContext) -> ExecutionOutcome {
        let kind = ctx.operation.kind();
        let mut trail = AuditTrail::start(&ctx.device_serial, kind, &ctx.operation.raw_input());

        trail.transition(OperationState::Sanitizing);
        let evaluation = match self.evaluate(&ctx) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                trail.rejected(&e.to_string());
                return ExecutionOutcome::Rejected(e);
            }
        };
        trail.set_command(&evaluation.plan.command_line);
        trail.transition(OperationState::Classifying);

        let classification = &evaluation.classification;
        let (decision, validation) = self.decide(&evaluation, ctx.confirmation.as_deref());

        let warning = match decision {
            Ok(Decision::Allow { warning }) => {
                trail.decision(classification, &validation, OperationState::Allowed);
                warning
            }
            Ok(Decision::Confirm(request)) => {
                trail.decision(classification, &validation, OperationState::WarnPending);
                return ExecutionOutcome::ConfirmationRequired(request);
            }
            Err(e) => {
                trail.decision(classification, &validation, OperationState::Blocked);
                return ExecutionOutcome::Rejected(e);
            }
        };

        if let Err(e) = self.registry.resolve(&evaluation.serial).await {
            trail.finish(OperationState::Failed, None);
            return ExecutionOutcome::Failed(e);
        }

        trail.transition(OperationState::Executing);
        let timeout = ctx
            .timeout
            .unwrap_or(self.default_timeout)
            .min(self.max_timeout);
        let result = self
            .executor
            .run(
                &evaluation.serial,
                &evaluation.plan.argv,
                evaluation.plan.stdin.as_deref(),
                timeout,
            )
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                trail.finish(OperationState::Failed, None);
                return ExecutionOutcome::Failed(e);
            }
        };

        if output.exit_code != 0 {
            trail.finish(OperationState::Failed, Some(output.exit_code));
            let stderr = if output.stderr.is_empty() {
                output.stdout_text().trim().to_string()
            } else {
                output.stderr
            };
            return ExecutionOutcome::Failed(ExecutionError::NonZeroExit {
                code: output.exit_code,
                stderr,
            });
        }

        trail.finish(OperationState::Succeeded, Some(output.exit_code));
        ExecutionOutcome::Success(ExecutionOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            validation,
            warning,
        })
    }
}
