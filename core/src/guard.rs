use std::{
    any::Any,
    backtrace::Backtrace,
    fmt::Write as _,
    io::{self, Write as _},
    panic::{self, AssertUnwindSafe},
    process,
    sync::{Arc, Mutex},
};

use anyhow::ensure;

/// Set to "1" in the environment of every spawned candidate, so that a
/// candidate which itself embeds the judge runs its solution instead of
/// recursively judging.
pub const CHILD_MARKER_ENV: &str = "OJT_CHILD_PROCESS";

pub fn is_child_process() -> bool {
    std::env::var_os(CHILD_MARKER_ENV).is_some_and(|v| v == "1")
}

/// Bails when already inside a candidate spawned by another judge run,
/// which would otherwise fork-bomb.
pub fn ensure_top_level() -> anyhow::Result<()> {
    ensure!(
        !is_child_process(),
        "Nested judge invocation detected ({}=1); refusing to judge from inside a candidate",
        CHILD_MARKER_ENV
    );
    Ok(())
}

/// In a spawned candidate, runs `solve` as the whole program and exits:
/// 0 on success, 1 with the error or a cleaned-up panic report on failure.
/// In a top-level process this is a no-op and judging proceeds.
pub fn child_takeover<F>(solve: F)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    if !is_child_process() {
        return;
    }
    let (code, diagnostic) = run_as_child(solve);
    eprint!("{}", diagnostic);
    let _ = io::stdout().flush();
    process::exit(code);
}

/// The takeover decision itself: exit code plus the stderr text for one run
/// of the solution.
fn run_as_child<F>(solve: F) -> (i32, String)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    let report: Arc<Mutex<Option<PanicReport>>> = Arc::new(Mutex::new(None));
    let sink = report.clone();
    panic::set_hook(Box::new(move |info| {
        let captured = PanicReport {
            message: panic_message(info.payload()),
            location: info.location().map(|loc| loc.to_string()),
            backtrace: Backtrace::force_capture().to_string(),
        };
        if let Ok(mut slot) = sink.lock() {
            *slot = Some(captured);
        }
    }));

    let result = panic::catch_unwind(AssertUnwindSafe(solve));
    let _ = panic::take_hook();

    match result {
        Ok(Ok(())) => (0, String::new()),
        Ok(Err(e)) => (1, format!("Error: {:?}\n", e)),
        Err(_) => {
            let diagnostic = match report.lock().ok().and_then(|mut slot| slot.take()) {
                Some(r) => r.render(),
                None => "solution panicked (no details captured)\n".to_owned(),
            };
            (1, diagnostic)
        }
    }
}

struct PanicReport {
    message: String,
    location: Option<String>,
    backtrace: String,
}

impl PanicReport {
    fn render(&self) -> String {
        let mut s = String::new();
        match &self.location {
            Some(loc) => {
                let _ = writeln!(s, "solution panicked at {}:", loc);
            }
            None => {
                let _ = writeln!(s, "solution panicked:");
            }
        }
        let _ = writeln!(s, "{}", self.message);
        let frames = user_frames(&self.backtrace);
        if !frames.is_empty() {
            let _ = writeln!(s, "stack backtrace (harness frames omitted):");
            let _ = writeln!(s, "{}", frames);
        }
        s
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// Strips panic machinery and this module's own frames out of a rendered
/// backtrace, leaving the solution's frames (with their `at file:line`
/// continuation lines).
fn user_frames(backtrace: &str) -> String {
    let mut kept = Vec::new();
    let mut keep_current = false;
    for line in backtrace.lines() {
        if let Some(symbol) = frame_symbol(line) {
            keep_current = !is_internal_frame(symbol);
        }
        if keep_current {
            kept.push(line);
        }
    }
    kept.join("\n")
}

/// `"  12: foo::bar"` => `Some("foo::bar")`; continuation lines => `None`.
fn frame_symbol(line: &str) -> Option<&str> {
    let (num, rest) = line.trim_start().split_once(": ")?;
    if num.is_empty() || !num.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(rest.trim())
}

fn is_internal_frame(symbol: &str) -> bool {
    const INTERNAL_PREFIXES: &[&str] = &[
        "std::panicking",
        "std::panic",
        "std::backtrace",
        "std::rt",
        "std::sys",
        "core::panicking",
        "core::panic::",
        "core::ops::function",
        "rust_begin_unwind",
        "__rust",
        "__libc_start",
        "_start",
    ];
    // Panic machinery that only shows up inside a generic signature, like the
    // boxed hook closure taking a `&PanicHookInfo`.
    const INTERNAL_PARTS: &[&str] = &[
        "std::panic::PanicHookInfo",
        "unwind_safe::AssertUnwindSafe",
    ];
    // Trait-impl frames demangle bracketed ("<T as Trait>::call"); match on
    // the inner path.
    let symbol = symbol.strip_prefix('<').unwrap_or(symbol);
    symbol.starts_with(module_path!())
        || INTERNAL_PREFIXES.iter().any(|p| symbol.starts_with(p))
        || INTERNAL_PARTS.iter().any(|p| symbol.contains(p))
}

#[cfg(test)]
mod test {
    use super::*;

    // The panic hook is process-global; takeover tests must not interleave.
    static HOOK_LOCK: Mutex<()> = Mutex::new(());

    fn hook_lock() -> std::sync::MutexGuard<'static, ()> {
        HOOK_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn marker_should_require_the_exact_value() {
        std::env::remove_var(CHILD_MARKER_ENV);
        assert!(!is_child_process());
        assert!(ensure_top_level().is_ok());

        std::env::set_var(CHILD_MARKER_ENV, "1");
        assert!(is_child_process());
        let err = ensure_top_level().unwrap_err();
        assert!(err.to_string().contains("Nested judge invocation"));

        std::env::set_var(CHILD_MARKER_ENV, "0");
        assert!(!is_child_process());

        std::env::remove_var(CHILD_MARKER_ENV);
        // Without the marker, takeover must neither run the solution nor exit.
        child_takeover(|| unreachable!("solve must not run at top level"));
    }

    #[test]
    fn takeover_should_succeed_silently_on_clean_solve() {
        let _guard = hook_lock();
        let (code, diagnostic) = run_as_child(|| Ok(()));
        assert_eq!(code, 0);
        assert!(diagnostic.is_empty());
    }

    #[test]
    fn takeover_should_report_a_failed_solve_on_stderr() {
        let _guard = hook_lock();
        let (code, diagnostic) = run_as_child(|| anyhow::bail!("no input"));
        assert_eq!(code, 1);
        assert!(diagnostic.starts_with("Error: no input"));
    }

    #[test]
    fn takeover_should_report_a_panicking_solve_with_its_location() {
        let _guard = hook_lock();
        let (code, diagnostic) = run_as_child(|| panic!("index out of range"));
        assert_eq!(code, 1);
        assert!(diagnostic.contains("solution panicked at"));
        assert!(diagnostic.contains("guard.rs"));
        assert!(diagnostic.contains("index out of range"));
    }

    #[test]
    fn user_frames_should_drop_machinery_and_harness_frames() {
        let bt = "\
   0: std::panicking::begin_panic_handler
             at /rustc/abc/library/std/src/panicking.rs:595:5
   1: core::panicking::panic_fmt
             at /rustc/abc/library/core/src/panicking.rs:67:14
   2: <alloc::boxed::Box<F,A> as core::ops::function::Fn<(&std::panic::PanicHookInfo,)>>::call
             at /rustc/abc/library/alloc/src/boxed.rs:2084:9
   3: mysol::solve
             at ./src/main.rs:10:9
   4: <core::panic::unwind_safe::AssertUnwindSafe<F> as core::ops::function::FnOnce<()>>::call_once
             at /rustc/abc/library/core/src/panic/unwind_safe.rs:272:9
   5: ojt_core::guard::child_takeover
             at ./core/src/guard.rs:50:18
   6: mysol::main
             at ./src/main.rs:3:5
   7: std::rt::lang_start
             at /rustc/abc/library/std/src/rt.rs:166:17";

        let kept = user_frames(bt);
        assert!(kept.contains("mysol::solve"));
        assert!(kept.contains("src/main.rs:10:9"));
        assert!(kept.contains("mysol::main"));
        assert!(!kept.contains("panicking"));
        assert!(!kept.contains("PanicHookInfo"));
        assert!(!kept.contains("AssertUnwindSafe"));
        assert!(!kept.contains("guard"));
        assert!(!kept.contains("lang_start"));
    }

    #[test]
    fn panic_message_should_unwrap_common_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&"boom".to_owned()), "boom");
        assert_eq!(panic_message(&42_u32), "Box<dyn Any>");
    }
}
