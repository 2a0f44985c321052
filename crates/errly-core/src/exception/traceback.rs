use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;

use once_cell::sync::Lazy;
use regex::Regex;

/// `exception_type` recorded for captured panics
pub const PANIC_EXCEPTION_TYPE: &str = "panic";

static FRAME_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<index>\d+):\s+(?P<symbol>.+?)\s*$").expect("valid regex"));

static FRAME_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+at\s+(?P<path>.+?):(?P<line>\d+)(?::\d+)?\s*$").expect("valid regex")
});

static SYMBOL_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"::h[0-9a-f]{16}$").expect("valid regex"));

static ADDRESS_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]+\s+-\s+").expect("valid regex"));

static PANIC_MACHINERY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:std::panicking::(?:begin_panic|rust_panic_with_hook|panic_with_hook)",
        r"|core::panicking::",
        r"|std::panic::panic_any",
        r"|(?:__rustc::)?rust_begin_unwind",
        r"|.*__rust_end_short_backtrace)"
    ))
    .expect("valid regex")
});

const SDK_SYMBOL_PREFIXES: &[&str] = &[
    "std::backtrace",
    "errly_core::",
    "errly_client::",
    "errly_panic::",
    "errly_axum::",
    "errly::",
];

/// One frame as reported by the runtime, before filtering.
///
/// Every field is optional because symbolication is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    pub filename: Option<String>,
    pub function: Option<String>,
    pub line_number: Option<u32>,
    pub source_line: Option<String>,
    pub locals: Vec<(String, String)>,
}

impl RawFrame {
    pub fn new(filename: impl Into<String>, function: impl Into<String>, line_number: u32) -> Self {
        Self {
            filename: Some(filename.into()),
            function: Some(function.into()),
            line_number: Some(line_number),
            ..Default::default()
        }
    }

    pub fn with_source_line(mut self, source_line: impl Into<String>) -> Self {
        self.source_line = Some(source_line.into());
        self
    }

    pub fn with_local(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.locals.push((name.into(), value.into()));
        self
    }
}

/// Call stack of a raised exception, outermost frame first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Traceback {
    frames: Vec<RawFrame>,
}

impl Traceback {
    pub fn from_frames(frames: Vec<RawFrame>) -> Self {
        Self { frames }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Stack of the caller, without the SDK's own frames
    pub fn capture() -> Self {
        let backtrace = Backtrace::force_capture();
        let mut frames = parse_innermost_first(&backtrace.to_string());
        trim_sdk_frames(&mut frames);
        frames.reverse();
        Self { frames }
    }

    /// Stack of a panic, captured from inside a panic hook.
    ///
    /// Frames belonging to the hook and to the panic runtime are cut so the
    /// innermost frame is the code that panicked.
    pub fn capture_panic() -> Self {
        let backtrace = Backtrace::force_capture();
        let mut frames = parse_innermost_first(&backtrace.to_string());

        let machinery_end = frames.iter().rposition(|frame| {
            frame
                .function
                .as_deref()
                .is_some_and(|symbol| PANIC_MACHINERY.is_match(symbol))
        });
        if let Some(end) = machinery_end {
            frames.drain(..=end);
        }
        trim_sdk_frames(&mut frames);
        frames.reverse();
        Self { frames }
    }

    /// Parse the rendered form of a `std::backtrace::Backtrace`.
    pub fn parse(rendered: &str) -> Self {
        let mut frames = parse_innermost_first(rendered);
        frames.reverse();
        Self { frames }
    }

    pub fn frames(&self) -> &[RawFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn contains_location(&self, file: &str, line: u32) -> bool {
        self.frames.iter().any(|frame| {
            frame.line_number == Some(line)
                && frame
                    .filename
                    .as_deref()
                    .is_some_and(|filename| same_source_path(filename, file))
        })
    }

    fn push_innermost(&mut self, frame: RawFrame) {
        self.frames.push(frame);
    }
}

fn same_source_path(a: &str, b: &str) -> bool {
    let a = a.trim_start_matches("./");
    let b = b.trim_start_matches("./");
    a.ends_with(b) || b.ends_with(a)
}

fn trim_sdk_frames(innermost_first: &mut Vec<RawFrame>) {
    let sdk_frames = innermost_first
        .iter()
        .take_while(|frame| {
            frame.function.as_deref().is_some_and(|symbol| {
                SDK_SYMBOL_PREFIXES
                    .iter()
                    .any(|prefix| symbol.starts_with(prefix))
            })
        })
        .count();
    innermost_first.drain(..sdk_frames);
}

fn clean_symbol(raw: &str) -> Option<String> {
    let symbol = ADDRESS_PREFIX.replace(raw.trim(), "");
    let symbol = SYMBOL_HASH.replace(&symbol, "");
    if symbol.is_empty() || symbol == "<unknown>" {
        None
    } else {
        Some(symbol.into_owned())
    }
}

fn parse_innermost_first(rendered: &str) -> Vec<RawFrame> {
    let mut frames: Vec<RawFrame> = Vec::new();

    for line in rendered.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(location) = FRAME_LOCATION.captures(line) {
            if let Some(frame) = frames.last_mut() {
                if frame.filename.is_none() {
                    frame.filename = Some(location["path"].to_string());
                    frame.line_number = location["line"].parse().ok();
                }
            }
            continue;
        }

        if let Some(header) = FRAME_HEADER.captures(line) {
            frames.push(RawFrame {
                function: clean_symbol(&header["symbol"]),
                ..Default::default()
            });
            continue;
        }

        // Inlined symbols are printed below their frame without an index.
        if line.starts_with(char::is_whitespace) && !frames.is_empty() {
            frames.push(RawFrame {
                function: clean_symbol(line),
                ..Default::default()
            });
        }
    }

    frames
}

/// Text carried by a panic payload.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// The `(type, value, traceback)` triple handed to the capture pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaisedException {
    exception_type: String,
    value: String,
    traceback: Traceback,
}

impl RaisedException {
    pub fn new(exception_type: impl Into<String>, value: impl Into<String>, traceback: Traceback) -> Self {
        Self {
            exception_type: exception_type.into(),
            value: value.into(),
            traceback,
        }
    }

    /// Capture an error value together with the current call stack.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        Self::new(std::any::type_name::<E>(), error.to_string(), Traceback::capture())
    }

    /// Build from inside a panic hook, where the panicking stack is still live.
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let mut traceback = Traceback::capture_panic();

        if let Some(location) = info.location() {
            if !traceback.contains_location(location.file(), location.line()) {
                traceback.push_innermost(RawFrame {
                    filename: Some(location.file().to_string()),
                    line_number: Some(location.line()),
                    ..Default::default()
                });
            }
        }

        Self::new(PANIC_EXCEPTION_TYPE, payload_message(info.payload()), traceback)
    }

    /// Build from a payload recovered by `catch_unwind`, after the panicking
    /// stack is gone.
    pub fn from_panic_payload(payload: &(dyn Any + Send), traceback: Traceback) -> Self {
        Self::new(PANIC_EXCEPTION_TYPE, payload_message(payload), traceback)
    }

    pub fn exception_type(&self) -> &str {
        &self.exception_type
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn traceback(&self) -> &Traceback {
        &self.traceback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDERED: &str = "   0: std::backtrace_rs::backtrace::libunwind::trace
             at /rustc/abc123/library/std/src/../../backtrace/src/backtrace/libunwind.rs:116:5
   1: app::handler::divide::h0123456789abcdef
             at ./src/handler.rs:42:13
   2: app::main
             at ./src/main.rs:10:5
      core::ops::function::FnOnce::call_once
             at /rustc/abc123/library/core/src/ops/function.rs:250:5
   3: <unknown>
";

    #[test]
    fn test_parse_orders_outermost_first() {
        let traceback = Traceback::parse(RENDERED);
        let functions: Vec<_> = traceback
            .frames()
            .iter()
            .map(|frame| frame.function.as_deref())
            .collect();

        assert_eq!(
            functions,
            vec![
                None,
                Some("core::ops::function::FnOnce::call_once"),
                Some("app::main"),
                Some("app::handler::divide"),
                Some("std::backtrace_rs::backtrace::libunwind::trace"),
            ]
        );
    }

    #[test]
    fn test_parse_reads_locations() {
        let traceback = Traceback::parse(RENDERED);
        let handler = &traceback.frames()[3];
        assert_eq!(handler.filename.as_deref(), Some("./src/handler.rs"));
        assert_eq!(handler.line_number, Some(42));

        let unresolved = &traceback.frames()[0];
        assert_eq!(unresolved.filename, None);
        assert_eq!(unresolved.line_number, None);
    }

    #[test]
    fn test_parse_disabled_backtrace_is_empty() {
        assert!(Traceback::parse("disabled backtrace").is_empty());
        assert!(Traceback::parse("unsupported backtrace").is_empty());
    }

    #[test]
    fn test_sdk_frames_are_trimmed_from_innermost_side() {
        let mut frames = vec![
            RawFrame::new("/rustc/x/backtrace.rs", "std::backtrace::Backtrace::create", 1),
            RawFrame::new("src/traceback.rs", "errly_core::exception::Traceback::capture", 2),
            RawFrame::new("src/main.rs", "app::main", 3),
            RawFrame::new("src/lib.rs", "errly::tail", 4),
        ];
        trim_sdk_frames(&mut frames);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].function.as_deref(), Some("app::main"));
    }

    #[test]
    fn test_payload_message_variants() {
        let borrowed: Box<dyn Any + Send> = Box::new("static message");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        let opaque: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(payload_message(borrowed.as_ref()), "static message");
        assert_eq!(payload_message(owned.as_ref()), "owned message");
        assert_eq!(payload_message(opaque.as_ref()), "Box<dyn Any>");
    }

    #[test]
    fn test_from_error_uses_display_text() {
        let error = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let raised = RaisedException::from_error(&error);

        assert_eq!(raised.value(), "disk full");
        assert_eq!(raised.exception_type(), "std::io::error::Error");
    }

    #[test]
    fn test_same_source_path_ignores_relative_prefix() {
        assert!(same_source_path("./src/main.rs", "src/main.rs"));
        assert!(same_source_path("/home/dev/app/src/main.rs", "src/main.rs"));
        assert!(!same_source_path("src/lib.rs", "src/main.rs"));
    }
}
