use std::path::PathBuf;

/// Source prefix under which rustc records std, core and alloc frames
pub const RUSTC_SOURCE_PREFIX: &str = "/rustc/";

/// Thread-start, unwind and C runtime symbols that carry no source location
const RUNTIME_SYMBOLS: &[&str] = &[
    "__rust_try",
    "_start",
    "main",
    "start_thread",
    "thread_start",
    "clone",
    "clone3",
    "__clone",
    "__clone3",
    "BaseThreadInitThunk",
    "RtlUserThreadStart",
];

const RUNTIME_SYMBOL_PREFIXES: &[&str] = &[
    "__libc_",
    "__GI_",
    "__pthread",
    "_dl_",
    "std::",
    "core::",
    "alloc::",
    "test::",
    "<std::",
    "<core::",
    "<alloc::",
    "<test::",
];

/// True iff `symbol` belongs to the standard library, libtest or the C
/// runtime.
pub fn is_runtime_symbol(symbol: &str) -> bool {
    RUNTIME_SYMBOLS.contains(&symbol)
        || RUNTIME_SYMBOL_PREFIXES
            .iter()
            .any(|prefix| symbol.starts_with(prefix))
}

/// True iff `path` lies under one of `exclusion_prefixes`.
///
/// Empty prefixes are ignored so a misconfigured set can never hide every
/// frame.
pub fn is_library_frame<P: AsRef<str>>(path: &str, exclusion_prefixes: &[P]) -> bool {
    exclusion_prefixes
        .iter()
        .map(AsRef::as_ref)
        .any(|prefix| !prefix.is_empty() && path.starts_with(prefix))
}

/// Installation roots of the Rust toolchain and of downloaded crates.
///
/// This is the default exclusion set: the rustc source prefix and the cargo
/// registry source directory (`$CARGO_HOME/registry`, else
/// `~/.cargo/registry`).
pub fn runtime_prefixes() -> Vec<String> {
    let mut prefixes = vec![RUSTC_SOURCE_PREFIX.to_string()];

    let cargo_home = std::env::var_os("CARGO_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".cargo")));

    if let Some(cargo_home) = cargo_home {
        prefixes.push(cargo_home.join("registry").to_string_lossy().into_owned());
    }

    prefixes
}

/// Classifies frames as application or library frames by path prefix.
///
/// Prefixes are never inferred: a virtualenv-like vendored directory is an
/// application path unless it is listed explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrameFilter {
    prefixes: Vec<String>,
}

impl Default for StackFrameFilter {
    fn default() -> Self {
        Self::new(runtime_prefixes())
    }
}

impl StackFrameFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|prefix| !prefix.is_empty())
                .collect(),
        }
    }

    /// Filter with no path prefixes: every frame with a source location is
    /// kept
    pub fn keep_all() -> Self {
        Self {
            prefixes: Vec::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !prefix.is_empty() && !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
        }
        self
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_library_frame(&self, path: &str) -> bool {
        is_library_frame(path, &self.prefixes)
    }

    /// Classify a frame that may lack a location or a symbol.
    ///
    /// Without a path the symbol decides; a frame with neither is runtime
    /// glue the unwinder could not resolve.
    pub fn is_library(&self, path: Option<&str>, symbol: Option<&str>) -> bool {
        match (path, symbol) {
            (Some(path), _) => self.is_library_frame(path),
            (None, Some(symbol)) => is_runtime_symbol(symbol),
            (None, None) => true,
        }
    }
}
