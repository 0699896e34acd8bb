//! Process-wide diagnostics configuration.
//!
//! The engine never prints directly and never carries a back-pointer to
//! this module from `Image` or `Key`. Instead every diagnostic passes
//! through a small set of free functions backed by a lazily constructed,
//! mutex-guarded sink. The `set_*` functions below are the only
//! observable mutation surface, mirroring the historical tool's global
//! `rs_set_progname` / `rs_set_verbose` / `rs_set_error_func` /
//! `rs_set_message_func` entry points.

use std::sync::Mutex;

/// `(key_file, image_file, message)`
pub type Sink = Box<dyn Fn(Option<&str>, Option<&str>, &str) + Send + 'static>;

lazy_static! {
    static ref PROGNAME: Mutex<Option<String>> = Mutex::new(None);
    static ref VERBOSE: Mutex<i32> = Mutex::new(0);
    static ref ERROR_SINK: Mutex<Option<Sink>> = Mutex::new(None);
    static ref MESSAGE_SINK: Mutex<Option<Sink>> = Mutex::new(None);
}

/// Set the program name used as a diagnostic prefix when no key/image
/// file name is available.
pub fn set_progname(name: impl Into<String>) {
    *PROGNAME.lock().unwrap() = Some(name.into());
}

/// Set the verbosity level; `message()` calls above this level are
/// dropped before reaching the sink.
pub fn set_verbose(level: i32) {
    *VERBOSE.lock().unwrap() = level;
}

pub fn verbose() -> i32 {
    *VERBOSE.lock().unwrap()
}

/// Redirect error/warning output to `sink` instead of stderr.
pub fn set_error_sink(sink: impl Fn(Option<&str>, Option<&str>, &str) + Send + 'static) {
    *ERROR_SINK.lock().unwrap() = Some(Box::new(sink));
}

/// Redirect informational output to `sink` instead of stderr.
pub fn set_message_sink(sink: impl Fn(Option<&str>, Option<&str>, &str) + Send + 'static) {
    *MESSAGE_SINK.lock().unwrap() = Some(Box::new(sink));
}

fn default_print(key_file: Option<&str>, image_file: Option<&str>, msg: &str) {
    if let Some(f) = image_file {
        eprint!("{}: ", f);
    } else if let Some(f) = key_file {
        eprint!("{}: ", f);
    } else if let Some(p) = PROGNAME.lock().unwrap().as_deref() {
        eprint!("{}: ", p);
    }
    eprintln!("{}", msg);
}

fn emit(sink: &Mutex<Option<Sink>>, key_file: Option<&str>, image_file: Option<&str>, msg: &str) {
    let guard = sink.lock().unwrap();
    match guard.as_ref() {
        Some(f) => f(key_file, image_file, msg),
        None => default_print(key_file, image_file, msg),
    }
}

/// Report a fatal or repair-level error.
pub fn error(key_file: Option<&str>, image_file: Option<&str>, msg: &str) {
    emit(&ERROR_SINK, key_file, image_file, &format!("error: {}", msg));
}

/// Report a downgraded (soft-mode) issue.
pub fn warning(key_file: Option<&str>, image_file: Option<&str>, msg: &str) {
    emit(&ERROR_SINK, key_file, image_file, &format!("warning: {}", msg));
}

/// Report an informational message, gated by `level <= verbose()`.
pub fn message(level: i32, key_file: Option<&str>, image_file: Option<&str>, msg: &str) {
    if level > verbose() {
        return;
    }
    emit(&MESSAGE_SINK, key_file, image_file, msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn verbosity_gates_messages() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        set_message_sink(move |_, _, _| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        set_verbose(1);
        message(2, None, None, "too verbose, should be dropped");
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        message(1, None, None, "should arrive");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        set_verbose(0);
        set_message_sink(|_, _, _| {});
    }
}
