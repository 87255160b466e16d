use std::time::Duration;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, Serialize)]
pub enum JudgeCode {
    AC,
    WA,
    TLE,
    RE,
    /// The program ran fine but there is no expected-output file to compare with.
    MISSING,
}

/// What happened during a single execution of the candidate program.
///
/// A crash, a timeout or a failed spawn is a normal judging outcome, not an
/// error, so runs always yield a record instead of a `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub status: JudgeCode,
    pub stdout: String,
    pub elapsed: Duration,
    /// Captured stderr for RE, the spawn failure message when the program
    /// never started, empty otherwise.
    pub detail: String,
}

/// Outcome of running one testcase `repeat` times in a row.
///
/// `times` holds the wall-clock duration of every attempt that was made;
/// the remaining fields come from the last attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatedRun {
    pub status: JudgeCode,
    pub times: Vec<Duration>,
    pub stdout: String,
    pub detail: String,
}

/// Final per-testcase judgement, after output comparison.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub status: JudgeCode,
    #[serde(rename = "times_ms", serialize_with = "serialize_times_ms")]
    pub times: Vec<Duration>,
    pub stdout: String,
    /// Diff report for WA, stderr for RE, info message for MISSING.
    pub detail: String,
}

fn serialize_times_ms<S>(times: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(times.iter().map(|t| t.as_secs_f64() * 1000.0))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn judge_code_should_display_as_verdict_name() {
        assert_eq!(JudgeCode::AC.to_string(), "AC");
        assert_eq!(JudgeCode::MISSING.to_string(), "MISSING");
    }

    #[test]
    fn test_result_should_serialize_times_as_millis() {
        let res = TestResult {
            name: "01".into(),
            status: JudgeCode::AC,
            times: vec![Duration::from_millis(12), Duration::from_micros(3500)],
            stdout: "ok\n".into(),
            detail: "".into(),
        };
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["status"], "AC");
        assert_eq!(json["times_ms"][0], 12.0);
        assert_eq!(json["times_ms"][1], 3.5);
    }
}
