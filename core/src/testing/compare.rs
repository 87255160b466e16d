use super::result::JudgeCode;

/// Placeholder compared against actual lines that run past the end of the
/// expected output.
const EOF_MARK: &str = "<EOF>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    strict: bool,
    max_diffs: Option<usize>,
}

/// AC with empty report, or WA with a line-by-line diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub judge: JudgeCode,
    pub report: String,
}

impl Comparator {
    pub fn new(strict: bool, max_diffs: Option<usize>) -> Self {
        Self { strict, max_diffs }
    }

    /// Judges `actual` against `expected` line by line.
    ///
    /// Lenient mode trims surrounding whitespace of every line and drops
    /// blank lines before comparing, so a stray trailing space cannot flip a
    /// correct answer to WA. Strict mode keeps lines as-is. The very last
    /// newline never matters in either mode.
    pub fn compare(&self, actual: &str, expected: &str) -> Comparison {
        let got = self.split(actual);
        let want = self.split(expected);
        if got == want {
            return Comparison {
                judge: JudgeCode::AC,
                report: String::new(),
            };
        }
        Comparison {
            judge: JudgeCode::WA,
            report: self.render_diff(&got, &want),
        }
    }

    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        if self.strict {
            text.lines().collect()
        } else {
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect()
        }
    }

    /// At most `max_diffs` mismatch entries, then a one-line count of the
    /// suppressed rest. Runs out of actual lines => a single note instead of
    /// phantom per-line mismatches.
    fn render_diff(&self, got: &[&str], want: &[&str]) -> String {
        let mut report = Vec::new();
        let mut num_diffs = 0usize;

        for i in 0..got.len().max(want.len()) {
            let Some(&got_line) = got.get(i) else {
                report.push("Error: Insufficient output lines.".to_owned());
                break;
            };
            let want_line = want.get(i).copied().unwrap_or(EOF_MARK);
            if got_line != want_line {
                num_diffs += 1;
                if self.max_diffs.map_or(true, |limit| num_diffs <= limit) {
                    report.push(format!(
                        "line {}: got:    {:?}\n        expect: {:?}",
                        i + 1,
                        got_line,
                        want_line,
                    ));
                }
            }
        }

        if let Some(limit) = self.max_diffs {
            if num_diffs > limit {
                report.push(format!("... and {} more differences.", num_diffs - limit));
            }
        }
        report.join("\n")
    }
}
