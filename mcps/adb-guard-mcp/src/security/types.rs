//! Value types shared by the sanitizer, classifier and policy engine

use std::fmt;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Risk tier of a command, ordered by severity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// What kind of raw string is being sanitized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A full shell command line
    ShellArg,
    /// A path on the device
    Path,
    /// An Android package name (`com.example.app`)
    PackageName,
    /// An activity class, relative (`.MainActivity`) or fully qualified
    ActivityName,
    /// A key event name or numeric keycode
    KeyCode,
    /// An adb device serial (`emulator-5554`, `192.168.1.20:5555`)
    Serial,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputKind::ShellArg => "shell command",
            InputKind::Path => "device path",
            InputKind::PackageName => "package name",
            InputKind::ActivityName => "activity name",
            InputKind::KeyCode => "key code",
            InputKind::Serial => "device serial",
        };
        f.write_str(name)
    }
}

/// A classification rule. Rules are built once at start-up and never change.
#[derive(Debug, Clone)]
pub struct CommandRule {
    pub pattern: Regex,
    pub risk: RiskLevel,
    pub category: String,
    pub description: String,
}

impl CommandRule {
    pub fn matches(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }

    pub fn classification(&self) -> Classification {
        Classification {
            risk: self.risk,
            category: self.category.clone(),
            description: self.description.clone(),
        }
    }
}

/// A device path prefix that is always critical, whatever command touches it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedPath {
    pub path_prefix: String,
    pub reason: String,
}

impl ProtectedPath {
    pub fn new(path_prefix: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            reason: reason.into(),
        }
    }

    /// Whether a normalized absolute path falls under this prefix.
    ///
    /// Prefixes ending in `/` cover the directory itself and everything below
    /// it; other prefixes are plain string prefixes so `/dev/mmcblk` covers
    /// `/dev/mmcblk0p12`.
    pub fn covers(&self, path: &str) -> bool {
        path.starts_with(&self.path_prefix)
            || self
                .path_prefix
                .strip_suffix('/')
                .is_some_and(|dir| dir == path)
    }
}

/// Result of classifying one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub risk: RiskLevel,
    pub category: String,
    pub description: String,
}

impl Classification {
    pub fn new(
        risk: RiskLevel,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            risk,
            category: category.into(),
            description: description.into(),
        }
    }

    /// Raise the risk to `floor` if it is lower. Never lowers it.
    pub fn at_least(
        self,
        floor: RiskLevel,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        if self.risk >= floor {
            self
        } else {
            Classification::new(floor, category, description)
        }
    }
}

/// Outcome of validating one operation, produced fresh for every call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub allowed: bool,
    pub risk: RiskLevel,
    pub reason: String,
    pub sanitized_input: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_order() {
        assert!(RiskLevel::Safe < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(
            [RiskLevel::High, RiskLevel::Safe, RiskLevel::Critical]
                .into_iter()
                .max(),
            Some(RiskLevel::Critical)
        );
    }

    #[test]
    fn test_risk_serde_lowercase() {
        let json = serde_json::to_string(&RiskLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
        let parsed: RiskLevel = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(parsed, RiskLevel::Critical);
    }

    #[test]
    fn test_protected_path_covers() {
        let boot = ProtectedPath::new("/boot/", "boot partition");
        assert!(boot.covers("/boot"));
        assert!(boot.covers("/boot/kernel"));
        assert!(!boot.covers("/bootstrap"));

        let mmc = ProtectedPath::new("/dev/mmcblk", "raw eMMC");
        assert!(mmc.covers("/dev/mmcblk0p12"));
        assert!(!mmc.covers("/dev/null"));
    }

    #[test]
    fn test_at_least_never_lowers() {
        let critical = Classification::new(RiskLevel::Critical, "partition_write", "dd");
        let kept = critical.clone().at_least(RiskLevel::High, "override", "floor");
        assert_eq!(kept, critical);

        let raised = Classification::new(RiskLevel::Safe, "device_info", "getprop").at_least(
            RiskLevel::High,
            "override",
            "floor",
        );
        assert_eq!(raised.risk, RiskLevel::High);
        assert_eq!(raised.category, "override");
    }
}
