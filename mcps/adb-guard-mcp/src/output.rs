//! Shaping device output for the client

/// Keep the first `n` lines for positive `max_lines`, the last `|n|` for
/// negative, everything for `None` or zero. The result is then capped at
/// `max_bytes` (zero disables the cap). Every cut is announced in the text.
pub fn limit_output(text: &str, max_lines: Option<i64>, max_bytes: usize) -> String {
    let mut out = match max_lines {
        Some(n) if n != 0 => limit_lines(text, n),
        _ => text.to_string(),
    };

    if max_bytes > 0 && out.len() > max_bytes {
        let total = out.len();
        let mut cut = max_bytes;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str(&format!(
            "\n\n[Output truncated: {total} bytes, showing first {cut}]"
        ));
    }
    out
}

fn limit_lines(text: &str, n: i64) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let keep = n.unsigned_abs() as usize;
    if lines.len() <= keep {
        return text.to_string();
    }

    let omitted = lines.len() - keep;
    if n > 0 {
        format!(
            "{}\n[... {omitted} more lines omitted]",
            lines[..keep].join("\n")
        )
    } else {
        format!(
            "[... {omitted} earlier lines omitted]\n{}",
            lines[omitted..].join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "one\ntwo\nthree\nfour\nfive";

    #[test]
    fn test_no_limits() {
        assert_eq!(limit_output(TEXT, None, 0), TEXT);
        assert_eq!(limit_output(TEXT, Some(0), 1000), TEXT);
        assert_eq!(limit_output(TEXT, Some(10), 1000), TEXT);
    }

    #[test]
    fn test_head_and_tail() {
        assert_eq!(
            limit_output(TEXT, Some(2), 0),
            "one\ntwo\n[... 3 more lines omitted]"
        );
        assert_eq!(
            limit_output(TEXT, Some(-2), 0),
            "[... 3 earlier lines omitted]\nfour\nfive"
        );
    }

    #[test]
    fn test_byte_cap_respects_char_boundaries() {
        let text = "ééééé";
        let limited = limit_output(text, None, 3);
        assert!(limited.starts_with("é\n\n[Output truncated: 10 bytes"));
    }
}
