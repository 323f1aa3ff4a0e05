//! Security core: sanitizer, risk classifier and policy engine
//!
//! Everything here is pure and synchronous. Nothing in this module talks to
//! a device.

mod classifier;
mod confirm;
mod error;
mod lexer;
mod policy;
mod rules;
mod sanitizer;
mod types;

pub use classifier::Classifier;
pub use confirm::{ConfirmationBinding, ConfirmationSigner};
pub use error::{ConfirmationError, SanitizeError, SecurityError, SecurityPolicyError};
pub use lexer::{lex, Lexed, Operator};
pub use policy::{warning_message, ConfirmationRequest, Decision, PolicyEngine};
pub use rules::RuleSet;
pub use sanitizer::Sanitizer;
pub use types::{
    Classification, CommandRule, InputKind, ProtectedPath, RiskLevel, ValidationResult,
};

use crate::config::{ConfigError, SecurityConfig};

/// The three security stages, built once from configuration
#[derive(Debug, Clone)]
pub struct Security {
    sanitizer: Sanitizer,
    classifier: Classifier,
    policy: PolicyEngine,
}

impl Security {
    pub fn new(config: &SecurityConfig) -> Result<Self, ConfigError> {
        let sanitizer = Sanitizer::new(&config.device_root).map_err(|e| {
            ConfigError::InvalidSetting {
                name: "security.device_root".to_string(),
                reason: e.to_string(),
            }
        })?;
        let rules = RuleSet::new(&config.rules, &config.protected_paths)?;
        let signer = Self::signer(config)?;

        Ok(Self {
            sanitizer,
            classifier: Classifier::new(rules),
            policy: PolicyEngine::new(signer, config.confirmation_ttl()),
        })
    }

    fn signer(config: &SecurityConfig) -> Result<ConfirmationSigner, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidSetting {
            name: "security.confirmation_secret".to_string(),
            reason,
        };
        match &config.confirmation_secret {
            Some(secret) => {
                let key = hex::decode(secret.trim()).map_err(|e| invalid(e.to_string()))?;
                if key.len() < 16 {
                    return Err(invalid("must be at least 16 bytes".to_string()));
                }
                ConfirmationSigner::new(&key).map_err(|e| invalid(e.to_string()))
            }
            None => ConfirmationSigner::random().map_err(|e| invalid(e.to_string())),
        }
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn classify(&self, command: &str) -> Classification {
        self.classifier.classify(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_security() {
        let security = Security::new(&SecurityConfig::default()).unwrap();
        assert_eq!(security.sanitizer().device_root(), "/");
        assert_eq!(
            security.classify("getprop ro.build.version.release").risk,
            RiskLevel::Safe
        );
    }

    #[test]
    fn test_configured_secret() {
        let config = SecurityConfig {
            confirmation_secret: Some("00112233445566778899aabbccddeeff".to_string()),
            ..SecurityConfig::default()
        };
        assert!(Security::new(&config).is_ok());

        let short = SecurityConfig {
            confirmation_secret: Some("0011".to_string()),
            ..SecurityConfig::default()
        };
        assert!(matches!(
            Security::new(&short),
            Err(ConfigError::InvalidSetting { .. })
        ));

        let not_hex = SecurityConfig {
            confirmation_secret: Some("not-hex".to_string()),
            ..SecurityConfig::default()
        };
        assert!(Security::new(&not_hex).is_err());
    }
}
