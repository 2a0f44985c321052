use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use tracing::{debug, warn};

use super::filter::StackFrameFilter;
use super::traceback::{payload_message, RawFrame, RaisedException};
use super::{FrameDetail, StructuredException, UNKNOWN_FILENAME, UNKNOWN_FUNCTION};
use crate::scope::catch_isolated;

/// Most frames kept per exception (innermost frames win)
pub const MAX_FRAMES: usize = 128;
/// Most locals kept per frame
pub const MAX_LOCALS: usize = 32;
/// Longest rendered local value, in bytes
pub const MAX_LOCAL_VALUE_LEN: usize = 512;

/// One step of exception processing.
///
/// A step that does not accept context starts from scratch; a step that does
/// receives the result of the previous step.
pub trait ExceptionCallback: Send + Sync {
    fn name(&self) -> &str;

    fn accepts_context(&self) -> bool {
        false
    }

    fn process(
        &self,
        exception: &RaisedException,
        previous: Option<StructuredException>,
    ) -> StructuredException;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub max_frames: usize,
    pub max_locals: usize,
    pub max_local_value_len: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_frames: MAX_FRAMES,
            max_locals: MAX_LOCALS,
            max_local_value_len: MAX_LOCAL_VALUE_LEN,
        }
    }
}

/// Root step: turns the traceback into application frames.
#[derive(Debug, Clone)]
pub struct FrameExtractionCallback {
    filter: StackFrameFilter,
    limits: ExtractionLimits,
    read_source: bool,
}

impl Default for FrameExtractionCallback {
    fn default() -> Self {
        Self::new(StackFrameFilter::default())
    }
}

impl FrameExtractionCallback {
    pub fn new(filter: StackFrameFilter) -> Self {
        Self {
            filter,
            limits: ExtractionLimits::default(),
            read_source: true,
        }
    }

    pub fn with_limits(mut self, limits: ExtractionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Whether missing source lines are read from disk
    pub fn with_source_lines(mut self, read_source: bool) -> Self {
        self.read_source = read_source;
        self
    }

    pub fn filter(&self) -> &StackFrameFilter {
        &self.filter
    }

    fn is_application_frame(&self, frame: &RawFrame) -> bool {
        !self
            .filter
            .is_library(frame.filename.as_deref(), frame.function.as_deref())
    }

    fn to_detail(&self, frame: &RawFrame) -> FrameDetail {
        let filename = frame.filename.as_deref().unwrap_or(UNKNOWN_FILENAME);
        let function = frame.function.as_deref().unwrap_or(UNKNOWN_FUNCTION);
        let line_number = frame.line_number.unwrap_or(0);

        let source_line = frame.source_line.clone().or_else(|| {
            match (self.read_source, frame.filename.as_deref()) {
                (true, Some(path)) if line_number > 0 => read_source_line(path, line_number),
                _ => None,
            }
        });

        let locals: BTreeMap<String, String> = frame
            .locals
            .iter()
            .take(self.limits.max_locals)
            .map(|(name, value)| {
                (
                    name.clone(),
                    truncate_on_char_boundary(value, self.limits.max_local_value_len),
                )
            })
            .collect();

        FrameDetail::new(filename, function, line_number)
            .with_source_line(source_line)
            .with_locals(locals)
    }
}

impl ExceptionCallback for FrameExtractionCallback {
    fn name(&self) -> &str {
        "frame_extraction"
    }

    fn process(
        &self,
        exception: &RaisedException,
        _previous: Option<StructuredException>,
    ) -> StructuredException {
        let application: Vec<&RawFrame> = exception
            .traceback()
            .frames()
            .iter()
            .filter(|frame| self.is_application_frame(frame))
            .collect();

        let skip = application.len().saturating_sub(self.limits.max_frames);
        if skip > 0 {
            debug!(
                "Dropping {} outermost frames of {} (limit {})",
                skip,
                application.len(),
                self.limits.max_frames
            );
        }

        let frames = application
            .into_iter()
            .skip(skip)
            .map(|frame| self.to_detail(frame))
            .collect();

        StructuredException::new(exception.value())
            .with_exception_type(exception.exception_type())
            .with_frames(frames)
    }
}

fn read_source_line(path: &str, line_number: u32) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let index = usize::try_from(line_number).ok()?.checked_sub(1)?;
    contents.lines().nth(index).map(|line| line.trim().to_string())
}

fn truncate_on_char_boundary(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Ordered sequence of [`ExceptionCallback`]s, root step first
#[derive(Clone)]
pub struct CallbackChain {
    steps: Vec<Arc<dyn ExceptionCallback>>,
}

impl Default for CallbackChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|step| step.name()))
            .finish()
    }
}

impl CallbackChain {
    /// Chain holding only the default frame extraction step
    pub fn new() -> Self {
        Self::with_root(FrameExtractionCallback::default())
    }

    pub fn with_root<C>(root: C) -> Self
    where
        C: ExceptionCallback + 'static,
    {
        Self {
            steps: vec![Arc::new(root)],
        }
    }

    pub fn then<C>(mut self, step: C) -> Self
    where
        C: ExceptionCallback + 'static,
    {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order and return the final result.
    ///
    /// A step that panics is skipped and the previous result carries over.
    pub fn run(&self, exception: &RaisedException) -> StructuredException {
        let mut current: Option<StructuredException> = None;

        for step in &self.steps {
            let context = if step.accepts_context() {
                current.clone()
            } else {
                None
            };

            let outcome = catch_isolated(|| step.process(exception, context));

            match outcome {
                Ok(result) => current = Some(result),
                Err(payload) => warn!(
                    "Exception step '{}' failed, keeping previous result: {}",
                    step.name(),
                    payload_message(payload.as_ref())
                ),
            }
        }

        current.unwrap_or_else(|| {
            StructuredException::new(exception.value()).with_exception_type(exception.exception_type())
        })
    }
}
