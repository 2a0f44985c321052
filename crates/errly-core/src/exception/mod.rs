//! Structured representation of a captured exception
//!
//! A [`RaisedException`] is what a hook hands to the pipeline, a
//! [`StructuredException`] is what the pipeline hands back. Frames are kept
//! in raise order: outermost call first, the frame that raised last.

mod chain;
mod filter;
mod traceback;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use chain::{
    CallbackChain, ExceptionCallback, ExtractionLimits, FrameExtractionCallback, MAX_FRAMES,
    MAX_LOCALS, MAX_LOCAL_VALUE_LEN,
};
pub use filter::{
    is_library_frame, is_runtime_symbol, runtime_prefixes, StackFrameFilter, RUSTC_SOURCE_PREFIX,
};
pub use traceback::{payload_message, RaisedException, RawFrame, Traceback, PANIC_EXCEPTION_TYPE};

/// Filename recorded for frames whose location could not be resolved
pub const UNKNOWN_FILENAME: &str = "<unknown>";
/// Function name recorded for frames whose symbol could not be resolved
pub const UNKNOWN_FUNCTION: &str = "<unknown>";

/// One application call-stack frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDetail {
    filename: String,
    function: String,
    line_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_line: Option<String>,
    #[serde(default)]
    locals: BTreeMap<String, String>,
}

impl FrameDetail {
    pub fn new(filename: impl Into<String>, function: impl Into<String>, line_number: u32) -> Self {
        Self {
            filename: filename.into(),
            function: function.into(),
            line_number,
            source_line: None,
            locals: BTreeMap::new(),
        }
    }

    pub fn with_source_line(mut self, source_line: Option<String>) -> Self {
        self.source_line = source_line;
        self
    }

    pub fn with_locals(mut self, locals: BTreeMap<String, String>) -> Self {
        self.locals = locals;
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    pub fn source_line(&self) -> Option<&str> {
        self.source_line.as_deref()
    }

    pub fn locals(&self) -> &BTreeMap<String, String> {
        &self.locals
    }
}

/// Immutable result of parsing one exception
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredException {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exception_type: Option<String>,
    #[serde(default)]
    frames: Vec<FrameDetail>,
}

impl StructuredException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exception_type: None,
            frames: Vec::new(),
        }
    }

    pub fn with_exception_type(mut self, exception_type: impl Into<String>) -> Self {
        self.exception_type = Some(exception_type.into());
        self
    }

    pub fn with_frames(mut self, frames: Vec<FrameDetail>) -> Self {
        self.frames = frames;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exception_type(&self) -> Option<&str> {
        self.exception_type.as_deref()
    }

    pub fn frames(&self) -> &[FrameDetail] {
        &self.frames
    }

    /// Frame closest to the program entry point
    pub fn outermost_frame(&self) -> Option<&FrameDetail> {
        self.frames.first()
    }

    /// Frame that raised
    pub fn innermost_frame(&self) -> Option<&FrameDetail> {
        self.frames.last()
    }
}
