//! Input sanitization
//!
//! Every raw string that ends up in a device command goes through
//! [`Sanitizer::sanitize`] first. Sanitization is pure: it neutralizes or
//! rejects, it never executes.

use super::error::SanitizeError;
use super::lexer::{lex, Operator};
use super::types::InputKind;

/// Characters that are never legitimate in a device path argument
const PATH_FORBIDDEN: &[char] = &[
    ';', '&', '|', '<', '>', '$', '`', '"', '\'', '\\', '\n', '\r', '\0',
];

const MAX_IDENTIFIER_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct Sanitizer {
    device_root: String,
}

impl Sanitizer {
    /// `device_root` is the directory relative paths resolve against and that
    /// no path may escape.
    pub fn new(device_root: &str) -> Result<Self, SanitizeError> {
        if !device_root.starts_with('/') {
            return Err(SanitizeError::invalid("device root", device_root));
        }
        let device_root = normalize_path(device_root, "/")?;
        Ok(Self { device_root })
    }

    pub fn device_root(&self) -> &str {
        &self.device_root
    }

    pub fn sanitize(&self, raw: &str, kind: InputKind) -> Result<String, SanitizeError> {
        match kind {
            InputKind::ShellArg => sanitize_shell(raw),
            InputKind::Path => self.sanitize_path_within(raw, &self.device_root),
            InputKind::PackageName => sanitize_package(raw),
            InputKind::ActivityName => sanitize_activity(raw),
            InputKind::KeyCode => sanitize_keycode(raw),
            InputKind::Serial => sanitize_serial(raw),
        }
    }

    /// Normalize a device path and make sure it stays under `root`
    pub fn sanitize_path_within(&self, raw: &str, root: &str) -> Result<String, SanitizeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SanitizeError::Empty(InputKind::Path));
        }
        if let Some(c) = raw.chars().find(|c| PATH_FORBIDDEN.contains(c) || c.is_control()) {
            return Err(SanitizeError::injection(
                InputKind::Path,
                format!("forbidden character {c:?}"),
            ));
        }
        normalize_path(raw, root)
    }

    /// Quote a single already-validated word for the device shell
    pub fn quote(word: &str) -> Result<String, SanitizeError> {
        shlex::try_quote(word)
            .map(|quoted| quoted.into_owned())
            .map_err(|e| SanitizeError::injection(InputKind::ShellArg, e.to_string()))
    }

    /// Prepare free text for `input text`: spaces become `%s` and the
    /// result is quoted as one word.
    pub fn quote_text(text: &str) -> Result<String, SanitizeError> {
        if text.is_empty() {
            return Err(SanitizeError::Empty(InputKind::ShellArg));
        }
        if let Some(c) = text.chars().find(|c| c.is_control()) {
            return Err(SanitizeError::injection(
                InputKind::ShellArg,
                format!("control character {c:?} in text input"),
            ));
        }
        Self::quote(&text.replace(' ', "%s"))
    }
}

/// Resolve `.` and `..` lexically. Relative paths are joined to `root`; the
/// result must stay under `root`.
fn normalize_path(raw: &str, root: &str) -> Result<String, SanitizeError> {
    let root_parts: Vec<&str> = root
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();

    let mut parts: Vec<&str> = if raw.starts_with('/') {
        Vec::new()
    } else {
        root_parts.clone()
    };

    for component in raw.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(SanitizeError::PathTraversal {
                        path: raw.to_string(),
                        root: root.to_string(),
                    });
                }
            }
            other => parts.push(other),
        }
    }

    if !parts.starts_with(&root_parts) || parts.contains(&"..") {
        return Err(SanitizeError::PathTraversal {
            path: raw.to_string(),
            root: root.to_string(),
        });
    }

    Ok(format!("/{}", parts.join("/")))
}

/// Lexical normalization that clamps at `/` instead of failing, for
/// inspecting paths inside commands that were never meant to be paths.
pub(crate) fn clamp_path(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in raw.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

fn sanitize_shell(raw: &str) -> Result<String, SanitizeError> {
    let kind = InputKind::ShellArg;

    if let Some(c) = raw
        .chars()
        .find(|c| *c == '\0' || (c.is_control() && *c != '\n' && *c != '\t'))
    {
        return Err(SanitizeError::injection(
            kind,
            format!("control character {c:?}"),
        ));
    }

    let lexed = lex(raw);
    if lexed.unbalanced {
        return Err(SanitizeError::injection(kind, "unbalanced quoting"));
    }
    if !lexed.substitutions.is_empty() {
        return Err(SanitizeError::injection(kind, "command substitution"));
    }
    // `;` and newlines that only pad a single command are stripped below;
    // every other operator changes what runs.
    if let Some(op) = lexed
        .operators
        .iter()
        .find(|op| !matches!(op, Operator::Semicolon | Operator::Newline))
    {
        return Err(SanitizeError::injection(kind, op.describe()));
    }

    let commands: Vec<&str> = lexed.commands().collect();
    let command = match commands.as_slice() {
        [] => return Err(SanitizeError::Empty(kind)),
        [single] => *single,
        many => {
            return Err(SanitizeError::injection(
                kind,
                format!("{} commands where one was expected", many.len()),
            ))
        }
    };

    let words = shlex::split(command)
        .ok_or_else(|| SanitizeError::injection(kind, "command cannot be tokenized"))?;
    if words.is_empty() {
        return Err(SanitizeError::Empty(kind));
    }

    let rendered = shlex::try_join(words.iter().map(String::as_str))
        .map_err(|e| SanitizeError::injection(kind, e.to_string()))?;

    // The quoted rendering must read back as exactly the same words
    match shlex::split(&rendered) {
        Some(again) if again == words => Ok(rendered),
        _ => Err(SanitizeError::injection(
            kind,
            "re-tokenization changed the command",
        )),
    }
}

fn is_java_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn sanitize_package(raw: &str) -> Result<String, SanitizeError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SanitizeError::Empty(InputKind::PackageName));
    }
    let segments: Vec<&str> = name.split('.').collect();
    if name.len() > MAX_IDENTIFIER_LEN
        || segments.len() < 2
        || !segments.iter().all(|s| is_java_identifier(s))
    {
        return Err(SanitizeError::invalid(InputKind::PackageName, name));
    }
    Ok(name.to_string())
}

fn sanitize_activity(raw: &str) -> Result<String, SanitizeError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SanitizeError::Empty(InputKind::ActivityName));
    }
    let body = name.strip_prefix('.').unwrap_or(name);
    if name.len() > MAX_IDENTIFIER_LEN || !body.split('.').all(is_java_identifier) {
        return Err(SanitizeError::invalid(InputKind::ActivityName, name));
    }
    Ok(name.to_string())
}

fn sanitize_keycode(raw: &str) -> Result<String, SanitizeError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(SanitizeError::Empty(InputKind::KeyCode));
    }
    if key.len() <= 4 && key.chars().all(|c| c.is_ascii_digit()) {
        return Ok(key.to_string());
    }

    let upper = key.to_ascii_uppercase();
    let name = upper.strip_prefix("KEYCODE_").unwrap_or(&upper);
    if name.is_empty()
        || name.len() > 64
        || !name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(SanitizeError::invalid(InputKind::KeyCode, key));
    }
    Ok(format!("KEYCODE_{name}"))
}

fn sanitize_serial(raw: &str) -> Result<String, SanitizeError> {
    let serial = raw.trim();
    if serial.is_empty() {
        return Err(SanitizeError::Empty(InputKind::Serial));
    }
    if serial.len() > 128
        || serial.starts_with('-')
        || !serial
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
    {
        return Err(SanitizeError::invalid(InputKind::Serial, serial));
    }
    Ok(serial.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new("/").unwrap()
    }

    fn shell(raw: &str) -> Result<String, SanitizeError> {
        sanitizer().sanitize(raw, InputKind::ShellArg)
    }

    #[test]
    fn test_chained_command_is_injection() {
        assert!(matches!(
            shell("ls; rm -rf /"),
            Err(SanitizeError::Injection { .. })
        ));
        for raw in [
            "ls && reboot",
            "ls || reboot",
            "ls | sh",
            "echo `reboot`",
            "echo $(reboot)",
            "echo \"$(reboot)\"",
            "sleep 100 &",
            "cat /sdcard/a > /sdcard/b",
            "sh < /sdcard/script",
            "ls\nreboot",
        ] {
            assert!(
                matches!(shell(raw), Err(SanitizeError::Injection { .. })),
                "expected injection for {raw:?}"
            );
        }
    }

    #[test]
    fn test_plain_commands_pass_unchanged() {
        assert_eq!(
            shell("getprop ro.build.version.release").unwrap(),
            "getprop ro.build.version.release"
        );
        assert_eq!(shell("pm list packages -3").unwrap(), "pm list packages -3");
    }

    #[test]
    fn test_stray_separators_are_stripped() {
        assert_eq!(shell("ls -la /sdcard;").unwrap(), "ls -la /sdcard");
        assert_eq!(shell(";;ls\n").unwrap(), "ls");
    }

    #[test]
    fn test_quoted_metacharacters_are_neutralized() {
        let sanitized = shell("echo \"a;b && c\"").unwrap();
        let words = shlex::split(&sanitized).unwrap();
        assert_eq!(words, vec!["echo", "a;b && c"]);

        // variable expansion becomes literal text
        let literal = shell("echo $HOME").unwrap();
        assert_eq!(shlex::split(&literal).unwrap(), vec!["echo", "$HOME"]);
        assert!(lex(&literal).operators.is_empty());
    }

    #[test]
    fn test_sanitized_output_retokenizes_to_reference() {
        // manually cleaned reference for each input
        let cases = [
            ("dumpsys battery;", vec!["dumpsys", "battery"]),
            ("echo 'x; y'", vec!["echo", "x; y"]),
            ("ls \\&\\& reboot", vec!["ls", "&&", "reboot"]),
        ];
        for (raw, reference) in cases {
            let sanitized = shell(raw).unwrap();
            assert_eq!(shlex::split(&sanitized).unwrap(), reference, "{raw:?}");
            assert_eq!(lex(&sanitized).commands().count(), 1);
        }
    }

    #[test]
    fn test_empty_and_control_characters() {
        assert_eq!(shell("   "), Err(SanitizeError::Empty(InputKind::ShellArg)));
        assert_eq!(shell(";"), Err(SanitizeError::Empty(InputKind::ShellArg)));
        assert!(matches!(
            shell("ls\0-la"),
            Err(SanitizeError::Injection { .. })
        ));
        assert!(matches!(
            shell("echo 'open"),
            Err(SanitizeError::Injection { .. })
        ));
    }

    #[test]
    fn test_path_normalization() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("/sdcard/./Download/../DCIM", InputKind::Path).unwrap(),
            "/sdcard/DCIM"
        );
        assert_eq!(
            s.sanitize("sdcard/file.txt", InputKind::Path).unwrap(),
            "/sdcard/file.txt"
        );
    }

    #[test]
    fn test_path_traversal_rejected() {
        let s = sanitizer();
        assert!(matches!(
            s.sanitize("/sdcard/../../etc", InputKind::Path),
            Err(SanitizeError::PathTraversal { .. })
        ));
        assert!(matches!(
            s.sanitize_path_within("/sdcard/../data/local", "/sdcard"),
            Err(SanitizeError::PathTraversal { .. })
        ));
        assert!(matches!(
            s.sanitize_path_within("../secret", "/sdcard"),
            Err(SanitizeError::PathTraversal { .. })
        ));
        assert_eq!(
            s.sanitize_path_within("Download/../DCIM/a.jpg", "/sdcard")
                .unwrap(),
            "/sdcard/DCIM/a.jpg"
        );
    }

    #[test]
    fn test_path_rejects_metacharacters() {
        let s = sanitizer();
        for raw in ["/sdcard/a;reboot", "/sdcard/$(id)", "/sdcard/'x'", "/sdcard/a\nb"] {
            assert!(
                matches!(
                    s.sanitize(raw, InputKind::Path),
                    Err(SanitizeError::Injection { .. })
                ),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn test_device_root_confines_paths() {
        let s = Sanitizer::new("/sdcard/").unwrap();
        assert_eq!(s.device_root(), "/sdcard");
        assert_eq!(
            s.sanitize("notes.txt", InputKind::Path).unwrap(),
            "/sdcard/notes.txt"
        );
        assert!(s.sanitize("/data/system", InputKind::Path).is_err());
        assert!(Sanitizer::new("relative/root").is_err());
    }

    #[test]
    fn test_package_names() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("com.example.app", InputKind::PackageName).unwrap(),
            "com.example.app"
        );
        for bad in ["example", "com..app", "com.1app", "com.example;reboot", "com.ex ample"] {
            assert!(
                matches!(
                    s.sanitize(bad, InputKind::PackageName),
                    Err(SanitizeError::InvalidIdentifier { .. })
                ),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_activity_names() {
        let s = sanitizer();
        assert!(s.sanitize(".MainActivity", InputKind::ActivityName).is_ok());
        assert!(s
            .sanitize("com.example.app.ui.Settings", InputKind::ActivityName)
            .is_ok());
        assert!(s.sanitize("Main;reboot", InputKind::ActivityName).is_err());
        assert!(s.sanitize("..Main", InputKind::ActivityName).is_err());
    }

    #[test]
    fn test_keycodes() {
        let s = sanitizer();
        assert_eq!(s.sanitize("back", InputKind::KeyCode).unwrap(), "KEYCODE_BACK");
        assert_eq!(
            s.sanitize("KEYCODE_HOME", InputKind::KeyCode).unwrap(),
            "KEYCODE_HOME"
        );
        assert_eq!(s.sanitize("66", InputKind::KeyCode).unwrap(), "66");
        assert!(s.sanitize("HOME; reboot", InputKind::KeyCode).is_err());
    }

    #[test]
    fn test_serials() {
        let s = sanitizer();
        assert!(s.sanitize("emulator-5554", InputKind::Serial).is_ok());
        assert!(s.sanitize("192.168.1.20:5555", InputKind::Serial).is_ok());
        assert!(s.sanitize("-H evil", InputKind::Serial).is_err());
        assert!(s.sanitize("abc;reboot", InputKind::Serial).is_err());
    }

    #[test]
    fn test_quote_text() {
        let quoted = Sanitizer::quote_text("hello world; reboot").unwrap();
        assert_eq!(shlex::split(&quoted).unwrap(), vec!["hello%sworld;%sreboot"]);
        assert!(Sanitizer::quote_text("line\nbreak").is_err());
    }
}
