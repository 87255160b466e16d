use std::{collections::HashMap, sync::Arc, time::Duration};

use colored::{Color, ColoredString, Colorize};
use crossterm::terminal;
use indicatif::ProgressBar;
use tokio::sync::Mutex;

use crate::testing::{JudgeCode, TestResult};

const BOLD_LINE: &str = "━";
const THIN_LINE: &str = "─";

#[macro_export]
macro_rules! print_success {
    ($fmt:literal, $($e:tt)*) => {
        use ::colored::Colorize as _;
        println!("{}", format!($fmt, $($e)*).green())
    }
}

pub fn is_truecolor_supported() -> bool {
    let Ok(v) = std::env::var("COLORTERM") else {
        return false;
    };
    matches!(v.as_str(), "truecolor" | "24bit")
}

pub trait ColorTheme {
    fn color(&self) -> Color;
}

impl ColorTheme for JudgeCode {
    fn color(&self) -> Color {
        use JudgeCode::*;
        if !self::is_truecolor_supported() {
            return match self {
                AC => Color::Green,
                WA => Color::Yellow,
                TLE => Color::Red,
                RE => Color::Magenta,
                MISSING => Color::Blue,
            };
        }

        match self {
            AC => Color::TrueColor {
                r: 30,
                g: 180,
                b: 40,
            },
            WA => Color::TrueColor {
                r: 210,
                g: 138,
                b: 4,
            },
            TLE => Color::TrueColor {
                r: 220,
                g: 42,
                b: 42,
            },
            RE => Color::TrueColor {
                r: 171,
                g: 40,
                b: 200,
            },
            MISSING => Color::TrueColor {
                r: 70,
                g: 130,
                b: 200,
            },
        }
    }
}

pub fn judge_icon(judge: JudgeCode) -> ColoredString {
    let fg = if is_truecolor_supported() {
        Color::TrueColor {
            r: 255,
            g: 255,
            b: 255,
        }
    } else {
        Color::BrightBlack
    };
    format!(" {} ", judge)
        .on_color(judge.color())
        .bold()
        .color(fg)
}

/// "12.34ms" for a single attempt, avg/min/max for repeated runs.
pub fn fmt_exec_times(times: &[Duration]) -> String {
    fn ms(d: &Duration) -> f64 {
        d.as_secs_f64() * 1000.0
    }
    match times {
        [] => "-".to_owned(),
        [only] => format!("{:.2}ms", ms(only)),
        _ => {
            let avg = times.iter().map(ms).sum::<f64>() / times.len() as f64;
            let min = times.iter().map(ms).fold(f64::INFINITY, f64::min);
            let max = times.iter().map(ms).fold(0.0, f64::max);
            format!("avg {:.2}ms (min: {:.2}, max: {:.2})", avg, min, max)
        }
    }
}

pub trait SpinnerExt {
    fn with_ticking(self) -> Arc<Mutex<Self>>
    where
        Self: Sized;
}

impl SpinnerExt for ProgressBar {
    fn with_ticking(self) -> Arc<Mutex<Self>> {
        let mutex_spinner = Arc::new(Mutex::new(self));
        let spinner = mutex_spinner.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(30)).await;
                let spinner = spinner.lock().await;
                if spinner.is_finished() {
                    break;
                }
                spinner.tick();
            }
        });
        mutex_spinner
    }
}

pub fn case_spinner(case_name: &str) -> Arc<Mutex<ProgressBar>> {
    ProgressBar::new_spinner()
        .with_message(format!("Testcase {} ...", case_name))
        .with_ticking()
}

pub fn print_run_header(run_display: &str, num_cases: usize) {
    let msg = format!(
        "=== Judging {} ({} testcase{}) ===",
        run_display,
        num_cases,
        if num_cases == 1 { "" } else { "s" },
    );
    println!("{}", msg.blue().bold());
}

/// One verdict line per testcase, plus a detail block for everything that
/// needs explaining (diff for WA, stderr for RE, raw output on demand).
pub fn print_test_result(res: &TestResult, show_raw: bool, show_missing_output: bool) {
    println!(
        "Testcase {} ... {}{} [{}]",
        res.name,
        judge_icon(res.status),
        " ".repeat(3_usize.saturating_sub(res.status.to_string().len())),
        fmt_exec_times(&res.times),
    );

    if res.status == JudgeCode::MISSING {
        println!("  {} {}", "[info]".cyan().bold(), res.detail);
    }

    let show_stdout = show_raw || (res.status == JudgeCode::MISSING && show_missing_output);
    let has_block = show_stdout || matches!(res.status, JudgeCode::WA | JudgeCode::RE);
    if !has_block {
        return;
    }

    let (cols, _) = terminal::size().unwrap_or((40, 40));
    let bold_bar = BOLD_LINE.repeat(cols as usize).blue().bold();
    println!("{}", bold_bar);

    match res.status {
        JudgeCode::WA => {
            print_sub_title("[diff]", cols as usize);
            println!("{}", res.detail);
        }
        JudgeCode::RE => {
            print_sub_title("[stderr]", cols as usize);
            if res.detail.is_empty() {
                println!("{}", "<EMPTY>".magenta().dimmed());
            } else {
                print!("{}", res.detail);
                if !res.detail.ends_with('\n') {
                    println!();
                }
            }
        }
        _ => {}
    }

    if show_stdout {
        print_sub_title("[stdout]", cols as usize);
        print_lines(&res.stdout.lines().collect::<Vec<_>>(), &res.stdout);
    }
    println!("{}", bold_bar);
}

fn print_sub_title(s: &str, cols: usize) {
    println!(
        "{}{}",
        s.cyan().bold(),
        THIN_LINE.repeat(cols.saturating_sub(s.len() + 1)).bright_black(),
    )
}

fn print_lines(lines: &[&str], entire_str: &str) {
    if lines.is_empty() {
        println!("{}", "<EMPTY>".magenta().dimmed());
        return;
    }
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_end();
        print!("{}", trimmed);

        let num_trailing_whitespace = line.len() - trimmed.len();
        if num_trailing_whitespace > 0 {
            print!(
                "{}{}",
                " ".repeat(num_trailing_whitespace).on_red(),
                "(Trailing whitespace)".bright_red().bold()
            );
        }

        let is_last_line = i + 1 == lines.len();
        if is_last_line && !entire_str.ends_with('\n') {
            print!("{}", " Missing new line ".on_yellow().black().bold());
        }

        println!();
    }
}

pub fn print_test_result_summary(results: &[TestResult]) {
    let bar = "-".repeat(5);
    print!("{} ", bar);

    let count: HashMap<JudgeCode, usize> = results.iter().fold(HashMap::new(), |mut count, r| {
        *count.entry(r.status).or_default() += 1;
        count
    });

    let num_total_test = results.len();
    let num_passed = *count.get(&JudgeCode::AC).unwrap_or(&0);
    let num_failed = num_total_test - num_passed;

    if num_passed == num_total_test {
        let msg = format!("All {} tests passed ✨", num_total_test);
        print!("{}", msg.green());
    } else {
        let summary_msg = if num_passed > 0 {
            format!("{}/{} tests failed 💣", num_failed, num_total_test)
        } else {
            format!("All {} tests failed 💀", num_total_test)
        };

        let detail_msg = count
            .iter()
            .filter(|(&judge, _)| judge != JudgeCode::AC)
            .map(|(&judge, &cnt)| {
                format!(
                    "{}{}{}",
                    self::judge_icon(judge),
                    "x".dimmed(),
                    cnt.to_string().bold().bright_white(),
                )
            })
            .collect::<Vec<String>>()
            .join(", ");

        print!("{} ({})", summary_msg.bright_red(), detail_msg);
    }

    println!(" {}", bar);
}
