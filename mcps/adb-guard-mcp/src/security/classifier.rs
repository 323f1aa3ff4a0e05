//! Risk classification of device command lines
//!
//! Classification runs in three passes over the command's segments (the
//! pieces between unquoted separators, plus the bodies of command
//! substitutions):
//!
//! 1. Critical pass. Critical rules, then protected path prefixes. The first
//!    hit is the answer. Segments led by an unrecognized program, or one
//!    already rated HIGH, are also checked from every later word that names
//!    a program, so an unknown launcher cannot hide a critical command.
//!    Relative paths resolve from `/`, where `adb shell` starts.
//! 2. Rule pass. The first matching ordered rule per segment; the riskiest
//!    segment wins, ties going to the earlier one.
//! 3. Escalation. Any chaining, substitution or redirection lifts the result
//!    to at least HIGH.

use super::lexer::lex;
use super::rules::{self, RuleSet};
use super::sanitizer::clamp_path;
use super::types::{Classification, CommandRule, RiskLevel};

/// `sh -c` nesting beyond this depth is not unwrapped
const MAX_NESTING: usize = 3;

const SHELLS: &[&str] = &["sh", "bash", "mksh", "ash", "dash", "zsh"];

/// Launchers that take no arguments of their own besides flags
const WRAPPERS: &[&str] = &["busybox", "toybox", "nohup", "command", "setsid"];

const XARGS_VALUES: &[&str] = &["-n", "-I", "-d", "-s", "-L", "-P", "-E", "-a"];

const STRACE_VALUES: &[&str] = &[
    "-o", "-p", "-e", "-s", "-a", "-u", "-E", "-P", "-b", "-I", "-X", "-O", "-S",
];

#[derive(Debug, Clone)]
pub struct Classifier {
    rules: RuleSet,
}

/// One segment after wrapper stripping
enum Segment {
    Words(Vec<String>),
    Nested(String),
}

impl Classifier {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn classify(&self, command: &str) -> Classification {
        self.classify_at(command, 0)
    }

    fn classify_at(&self, command: &str, depth: usize) -> Classification {
        if depth > MAX_NESTING {
            return Classification::new(
                RiskLevel::High,
                "nested_shell",
                "Deeply nested shell invocation",
            );
        }

        let lexed = lex(command);
        let segments: Vec<Segment> = lexed.commands().filter_map(parse_segment).collect();

        // critical pass
        for segment in &segments {
            if let Segment::Words(words) = segment {
                if let Some(rule) = self.critical_hit(words) {
                    return rule.classification();
                }
                let fragments = words.iter().flat_map(|w| path_fragments(w));
                if let Some(hit) = self.protected_hit(fragments) {
                    return hit;
                }
            }
        }
        if let Some(hit) = self.protected_hit(path_fragments(command)) {
            return hit;
        }

        // nested scripts and substitutions are classified as whole commands
        let mut nested = Vec::new();
        for segment in &segments {
            if let Segment::Nested(script) = segment {
                nested.push(self.classify_at(script, depth + 1));
            }
        }
        for body in &lexed.substitutions {
            nested.push(self.classify_at(body, depth + 1));
        }
        if let Some(critical) = nested.iter().find(|c| c.risk == RiskLevel::Critical) {
            return critical.clone();
        }

        // rule pass
        let mut worst: Option<Classification> = None;
        let ordered = segments.iter().filter_map(|segment| match segment {
            Segment::Words(words) => Some(
                self.rules
                    .ordered_match(&words.join(" "))
                    .map(|rule| rule.classification())
                    .unwrap_or_else(rules::unknown),
            ),
            Segment::Nested(_) => None,
        });
        for candidate in ordered.chain(nested) {
            worst = match worst {
                Some(current) if current.risk >= candidate.risk => Some(current),
                _ => Some(candidate),
            };
        }
        let result = worst.unwrap_or_else(rules::unknown);

        match lexed.hazard() {
            Some(hazard) => result.at_least(
                RiskLevel::High,
                "shell_chaining",
                format!("Command uses {hazard}"),
            ),
            None => result,
        }
    }

    fn critical_hit(&self, words: &[String]) -> Option<&CommandRule> {
        let text = words.join(" ");
        if let Some(rule) = self.rules.critical_match(&text) {
            return Some(rule);
        }
        if self
            .rules
            .ordered_match(&text)
            .is_some_and(|rule| rule.risk < RiskLevel::High)
        {
            return None;
        }
        (1..words.len()).find_map(|start| {
            let program = program_name(&words[start])?;
            let suffix = std::iter::once(program)
                .chain(words[start + 1..].iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ");
            self.rules.critical_match(&suffix)
        })
    }

    fn protected_hit<'a>(&self, fragments: impl Iterator<Item = &'a str>) -> Option<Classification> {
        fragments
            .filter(|f| f.contains('/'))
            .find_map(|fragment| {
                let path = clamp_path(fragment);
                self.rules.protected_match(&path).map(|protected| {
                    Classification::new(
                        RiskLevel::Critical,
                        "protected_path",
                        format!(
                            "Touches protected path {} ({})",
                            protected.path_prefix, protected.reason
                        ),
                    )
                })
            })
    }
}

/// Pieces of a word that could be paths: `of=/dev/block/x` yields
/// `of` and `/dev/block/x`.
fn path_fragments(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| {
        c.is_whitespace()
            || matches!(
                c,
                '\'' | '"' | '=' | ';' | '|' | '&' | '<' | '>' | '(' | ')' | '`' | ','
            )
    })
    .filter(|f| !f.is_empty())
}

fn basename(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}

/// The program a word would run if it were in command position. Paths only
/// count when they point into a `bin` directory.
fn program_name(word: &str) -> Option<&str> {
    if word.is_empty() || word.starts_with('-') || word.contains(char::is_whitespace) {
        return None;
    }
    match word.rsplit_once('/') {
        None => Some(word),
        Some((dir, name)) if dir.ends_with("bin") && !name.is_empty() => Some(name),
        Some(_) => None,
    }
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Tokenize one segment and peel off wrappers until the real program is in
/// front.
fn parse_segment(segment: &str) -> Option<Segment> {
    let mut words: Vec<String> = shlex::split(segment)
        .unwrap_or_else(|| segment.split_whitespace().map(str::to_string).collect());

    loop {
        while words.first().is_some_and(|w| is_assignment(w)) {
            words.remove(0);
        }
        let program = basename(words.first()?).to_string();

        let rest = &words[1..];
        let skip = match program.as_str() {
            p if WRAPPERS.contains(&p) => 1 + options(rest, &[]),
            "exec" => 1 + options(rest, &["-a"]),
            "time" => 1 + options(rest, &["-o", "-f"]),
            "env" => 1 + options(rest, &["-u", "-C"]),
            "nice" => 1 + options(rest, &["-n"]),
            "ionice" => 1 + options(rest, &["-c", "-n", "-p", "-P", "-u"]),
            "nsenter" | "unshare" => 1 + options(rest, &["-t", "-S", "-G"]),
            "stdbuf" => 1 + options(rest, &["-i", "-o", "-e"]),
            "xargs" => 1 + options(rest, XARGS_VALUES),
            "strace" => 1 + options(rest, STRACE_VALUES),
            // flags, then the duration, mask or priority
            "timeout" => 2 + options(rest, &["-s", "-k"]),
            "taskset" => 2 + options(rest, &[]),
            "chrt" => 2 + options(rest, &["-T", "-P", "-D"]),
            "chroot" => 2 + options(rest, &["--userspec", "--groups"]),
            "run-as" => 2 + options(words.get(2..).unwrap_or_default(), &["--user"]),
            "flock" => {
                let skip = 2 + options(rest, &["-w", "-E"]);
                if let [flag, script, ..] = words.get(skip..).unwrap_or_default() {
                    if flag == "-c" || flag == "--command" {
                        return Some(Segment::Nested(script.clone()));
                    }
                }
                skip
            }
            "watch" => {
                // the remaining words are handed to `sh -c` as one script
                let skip = 1 + options(rest, &["-n"]);
                if let Some(script) = words.get(skip..).filter(|w| !w.is_empty()) {
                    return Some(Segment::Nested(script.join(" ")));
                }
                skip
            }
            _ => 0,
        };

        if skip == 0 {
            words[0] = program;
            break;
        }
        if skip >= words.len() {
            // a bare wrapper is classified as itself
            words.truncate(1);
            words[0] = program;
            break;
        }
        words.drain(..skip);
    }

    if SHELLS.contains(&words[0].as_str()) {
        let flag = words[1..]
            .iter()
            .position(|w| w.starts_with('-') && !w.starts_with("--") && w.contains('c'));
        if let Some(script) = flag.and_then(|i| words.get(i + 2)) {
            return Some(Segment::Nested(script.clone()));
        }
    }

    Some(Segment::Words(words))
}

/// Number of leading option words. Options listed in `with_value` consume
/// the following word too; `--` ends the options.
fn options(words: &[String], with_value: &[&str]) -> usize {
    let mut count = 0;
    while let Some(word) = words.get(count) {
        if word == "--" {
            return count + 1;
        }
        if !word.starts_with('-') || word == "-" {
            break;
        }
        count += if with_value.contains(&word.as_str()) { 2 } else { 1 };
    }
    count.min(words.len())
}
