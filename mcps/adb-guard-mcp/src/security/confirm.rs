//! Confirmation tokens
//!
//! A token is `"<expires_unix>.<hex hmac>"`, where the MAC covers the expiry
//! and everything that identifies the operation: device serial, operation
//! kind, the exact command line and a digest of any payload. A token for
//! one command never authorizes another. Nothing is stored server side.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::error::ConfirmationError;

type HmacSha256 = Hmac<Sha256>;

/// The operation a token is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationBinding {
    bytes: Vec<u8>,
}

impl ConfirmationBinding {
    pub fn new(
        serial: &str,
        operation: impl fmt::Display,
        command_line: &str,
        payload: Option<&[u8]>,
    ) -> Self {
        let operation = operation.to_string();
        let digest = payload.map(|p| Sha256::digest(p).to_vec()).unwrap_or_default();

        let mut bytes = Vec::new();
        for field in [
            serial.as_bytes(),
            operation.as_bytes(),
            command_line.as_bytes(),
            digest.as_slice(),
        ] {
            // length prefix keeps field boundaries unambiguous
            bytes.extend_from_slice(&(field.len() as u64).to_be_bytes());
            bytes.extend_from_slice(field);
        }
        Self { bytes }
    }
}

#[derive(Clone)]
pub struct ConfirmationSigner {
    mac: HmacSha256,
}

impl fmt::Debug for ConfirmationSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationSigner").finish_non_exhaustive()
    }
}

impl ConfirmationSigner {
    pub fn new(secret: &[u8]) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    /// Signer with a fresh random key for this process
    pub fn random() -> Result<Self, hmac::digest::InvalidLength> {
        let secret: [u8; 32] = rand::random();
        Self::new(&secret)
    }

    fn tag(&self, binding: &ConfirmationBinding, expires_at: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(&expires_at.to_be_bytes());
        mac.update(&binding.bytes);
        mac
    }

    pub fn issue(&self, binding: &ConfirmationBinding, expires_at: i64) -> String {
        let tag = self.tag(binding, expires_at).finalize().into_bytes();
        format!("{expires_at}.{}", hex::encode(tag))
    }

    /// Check a token against the operation being executed.
    ///
    /// The MAC is checked before the expiry so a forged token never learns
    /// anything about timing.
    pub fn verify(
        &self,
        token: &str,
        binding: &ConfirmationBinding,
        now: i64,
    ) -> Result<(), ConfirmationError> {
        let (expires, signature) = token
            .trim()
            .split_once('.')
            .ok_or(ConfirmationError::Malformed)?;
        let expires_at: i64 = expires.parse().map_err(|_| ConfirmationError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| ConfirmationError::Malformed)?;

        self.tag(binding, expires_at)
            .verify_slice(&signature)
            .map_err(|_| ConfirmationError::Mismatch)?;

        if now > expires_at {
            return Err(ConfirmationError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(command: &str) -> ConfirmationBinding {
        ConfirmationBinding::new("emulator-5554", "adb_shell", command, None)
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = ConfirmationSigner::new(b"test-secret").unwrap();
        let b = binding("pm uninstall com.example.app");
        let token = signer.issue(&b, 1_000);
        assert!(token.starts_with("1000."));
        assert_eq!(signer.verify(&token, &b, 900), Ok(()));
        assert_eq!(signer.verify(&token, &b, 1_000), Ok(()));
    }

    #[test]
    fn test_expired() {
        let signer = ConfirmationSigner::new(b"test-secret").unwrap();
        let b = binding("pm uninstall com.example.app");
        let token = signer.issue(&b, 1_000);
        assert_eq!(
            signer.verify(&token, &b, 1_001),
            Err(ConfirmationError::Expired)
        );
    }

    #[test]
    fn test_bound_to_operation() {
        let signer = ConfirmationSigner::new(b"test-secret").unwrap();
        let token = signer.issue(&binding("pm uninstall com.example.app"), 1_000);

        let other_command = binding("pm uninstall com.example.other");
        assert_eq!(
            signer.verify(&token, &other_command, 900),
            Err(ConfirmationError::Mismatch)
        );

        let other_device = ConfirmationBinding::new(
            "emulator-5556",
            "adb_shell",
            "pm uninstall com.example.app",
            None,
        );
        assert_eq!(
            signer.verify(&token, &other_device, 900),
            Err(ConfirmationError::Mismatch)
        );

        let other_payload = ConfirmationBinding::new(
            "emulator-5554",
            "adb_shell",
            "pm uninstall com.example.app",
            Some(b"data"),
        );
        assert_eq!(
            signer.verify(&token, &other_payload, 900),
            Err(ConfirmationError::Mismatch)
        );
    }

    #[test]
    fn test_tampered_expiry_is_mismatch() {
        let signer = ConfirmationSigner::new(b"test-secret").unwrap();
        let b = binding("reboot");
        let token = signer.issue(&b, 1_000);
        let (_, signature) = token.split_once('.').unwrap();
        let extended = format!("9999999999.{signature}");
        assert_eq!(
            signer.verify(&extended, &b, 2_000),
            Err(ConfirmationError::Mismatch)
        );
    }

    #[test]
    fn test_other_signer_rejects() {
        let b = binding("reboot");
        let token = ConfirmationSigner::random().unwrap().issue(&b, 1_000);
        assert_eq!(
            ConfirmationSigner::random().unwrap().verify(&token, &b, 900),
            Err(ConfirmationError::Mismatch)
        );
    }

    #[test]
    fn test_malformed() {
        let signer = ConfirmationSigner::new(b"test-secret").unwrap();
        let b = binding("reboot");
        for token in ["", "yes", "abc.def", "1000.zz", "1000"] {
            assert_eq!(
                signer.verify(token, &b, 900),
                Err(ConfirmationError::Malformed),
                "{token:?}"
            );
        }
    }
}
