//! Quote-aware splitting of shell command lines
//!
//! Follows POSIX `sh` quoting closely enough to find unquoted operators and
//! live command substitutions. Lexing never fails; unterminated quotes or
//! substitutions are reported through [`Lexed::unbalanced`].

use std::iter::Peekable;
use std::str::Chars;

/// Shell operators that matter for command safety
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Semicolon,
    Newline,
    Pipe,
    Or,
    And,
    Background,
    RedirectIn,
    RedirectOut,
}

impl Operator {
    pub fn describe(self) -> &'static str {
        match self {
            Operator::Semicolon => "multiple commands (;)",
            Operator::Newline => "multiple lines",
            Operator::Pipe => "piped commands (|)",
            Operator::Or => "conditional execution (||)",
            Operator::And => "chained commands (&&)",
            Operator::Background => "background execution (&)",
            Operator::RedirectIn => "input redirection (<)",
            Operator::RedirectOut => "output redirection (>)",
        }
    }
}

/// A command line split at unquoted separators
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Lexed {
    /// Raw text between separators, quotes preserved. May be blank.
    pub segments: Vec<String>,
    /// Unquoted operators in order of appearance
    pub operators: Vec<Operator>,
    /// Bodies of live `` `...` `` and `$(...)` substitutions
    pub substitutions: Vec<String>,
    pub unbalanced: bool,
}

impl Lexed {
    /// Non-blank command segments, trimmed
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// First construct that makes the line do more than run one command
    pub fn hazard(&self) -> Option<&'static str> {
        if !self.substitutions.is_empty() {
            return Some("command substitution");
        }
        if self.unbalanced {
            return Some("unbalanced quoting");
        }
        self.operators.first().map(|op| op.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

pub fn lex(input: &str) -> Lexed {
    let mut out = Lexed::default();
    let mut current = String::new();
    let mut quote = Quote::None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                current.push(c);
                if c == '\'' {
                    quote = Quote::None;
                }
            }
            Quote::Double => match c {
                '\\' => push_escaped(&mut chars, &mut current),
                '"' => {
                    current.push(c);
                    quote = Quote::None;
                }
                '`' => take_backtick(&mut chars, &mut current, &mut out),
                '$' if chars.peek() == Some(&'(') => take_parens(&mut chars, &mut current, &mut out),
                _ => current.push(c),
            },
            Quote::None => match c {
                '\\' => push_escaped(&mut chars, &mut current),
                '\'' => {
                    current.push(c);
                    quote = Quote::Single;
                }
                '"' => {
                    current.push(c);
                    quote = Quote::Double;
                }
                '`' => take_backtick(&mut chars, &mut current, &mut out),
                '$' if chars.peek() == Some(&'(') => take_parens(&mut chars, &mut current, &mut out),
                ';' => split(&mut out, &mut current, Operator::Semicolon),
                '\n' => split(&mut out, &mut current, Operator::Newline),
                '|' => {
                    let op = if chars.next_if_eq(&'|').is_some() {
                        Operator::Or
                    } else {
                        Operator::Pipe
                    };
                    split(&mut out, &mut current, op);
                }
                '&' => {
                    let op = if chars.next_if_eq(&'&').is_some() {
                        Operator::And
                    } else {
                        Operator::Background
                    };
                    split(&mut out, &mut current, op);
                }
                '<' => {
                    out.operators.push(Operator::RedirectIn);
                    current.push(c);
                }
                '>' => {
                    out.operators.push(Operator::RedirectOut);
                    current.push(c);
                    // `>>`, `>&` and `>|` are still a single redirection
                    if let Some(next) = chars.next_if(|n| matches!(n, '>' | '&' | '|')) {
                        current.push(next);
                    }
                }
                _ => current.push(c),
            },
        }
    }

    if quote != Quote::None {
        out.unbalanced = true;
    }
    out.segments.push(current);
    out
}

fn split(out: &mut Lexed, current: &mut String, op: Operator) {
    out.operators.push(op);
    out.segments.push(std::mem::take(current));
}

fn push_escaped(chars: &mut Peekable<Chars<'_>>, current: &mut String) {
    current.push('\\');
    if let Some(next) = chars.next() {
        current.push(next);
    }
}

fn take_backtick(chars: &mut Peekable<Chars<'_>>, current: &mut String, out: &mut Lexed) {
    current.push('`');
    let mut body = String::new();
    let mut closed = false;

    while let Some(c) = chars.next() {
        current.push(c);
        match c {
            '`' => {
                closed = true;
                break;
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    body.push(next);
                }
            }
            _ => body.push(c),
        }
    }

    if !closed {
        out.unbalanced = true;
    }
    out.substitutions.push(body);
}

/// Consume `$( ... )` with the `$` already taken and `(` next
fn take_parens(chars: &mut Peekable<Chars<'_>>, current: &mut String, out: &mut Lexed) {
    current.push('$');
    let mut body = String::new();
    let mut depth = 0usize;
    let mut inner = Quote::None;
    let mut closed = false;

    while let Some(c) = chars.next() {
        current.push(c);
        match (inner, c) {
            (Quote::None, '(') => {
                depth += 1;
                if depth == 1 {
                    continue;
                }
            }
            (Quote::None, ')') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    closed = true;
                    break;
                }
            }
            (Quote::None, '\'') => inner = Quote::Single,
            (Quote::None, '"') => inner = Quote::Double,
            (Quote::Single, '\'') | (Quote::Double, '"') => inner = Quote::None,
            (Quote::None | Quote::Double, '\\') => {
                body.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                    body.push(next);
                }
                continue;
            }
            _ => {}
        }
        body.push(c);
    }

    if !closed {
        out.unbalanced = true;
    }
    out.substitutions.push(body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_command_is_one_segment() {
        let lexed = lex("getprop ro.build.version.release");
        assert_eq!(lexed.segments, vec!["getprop ro.build.version.release"]);
        assert!(lexed.operators.is_empty());
        assert_eq!(lexed.hazard(), None);
    }

    #[test]
    fn test_semicolon_splits() {
        let lexed = lex("ls; rm -rf /");
        assert_eq!(lexed.commands().collect::<Vec<_>>(), vec!["ls", "rm -rf /"]);
        assert_eq!(lexed.operators, vec![Operator::Semicolon]);
    }

    #[test]
    fn test_chaining_operators() {
        let lexed = lex("a && b || c | d & e");
        assert_eq!(
            lexed.operators,
            vec![
                Operator::And,
                Operator::Or,
                Operator::Pipe,
                Operator::Background
            ]
        );
        assert_eq!(lexed.commands().count(), 5);
    }

    #[test]
    fn test_quoted_operators_are_inert() {
        let lexed = lex("echo 'a; b && c' \"x | y\"");
        assert!(lexed.operators.is_empty());
        assert_eq!(lexed.commands().count(), 1);

        let escaped = lex(r"ls \; rm");
        assert!(escaped.operators.is_empty());
    }

    #[test]
    fn test_substitutions() {
        let lexed = lex("echo $(id) `whoami`");
        assert_eq!(lexed.substitutions, vec!["id", "whoami"]);
        assert_eq!(lexed.hazard(), Some("command substitution"));

        // live inside double quotes
        assert_eq!(lex("echo \"$(reboot)\"").substitutions, vec!["reboot"]);
        // inert inside single quotes
        assert!(lex("echo '$(reboot)'").substitutions.is_empty());
    }

    #[test]
    fn test_nested_substitution_body() {
        let lexed = lex("echo $(cat $(ls))");
        assert_eq!(lexed.substitutions, vec!["cat $(ls)"]);
    }

    #[test]
    fn test_redirection_stays_in_segment() {
        let lexed = lex("logcat -d 2>&1 > /sdcard/log.txt");
        assert_eq!(lexed.commands().count(), 1);
        assert_eq!(
            lexed.operators,
            vec![Operator::RedirectOut, Operator::RedirectOut]
        );
    }

    #[test]
    fn test_unbalanced_quotes() {
        assert!(lex("echo 'open").unbalanced);
        assert!(lex("echo $(id").unbalanced);
        assert!(!lex("echo 'closed'").unbalanced);
    }
}
