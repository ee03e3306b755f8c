//! Stack traces attached to asynchronous errors.
//!
//! A [`StackTrace`] is a cheap, clonable list of [`StackFrame`]s. The runtime
//! has no access to a native unwinder, so frames are recorded from
//! `#[track_caller]` locations at the points where errors are created
//! (`AsyncError::new`, `Completer::complete_error`, `add_error`, ...).

use std::cell::Cell;
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

thread_local! {
    static CAPTURE_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Enables or disables frame capture in [`StackTrace::current`] for the
/// current thread.
pub fn set_stack_trace_capture(enabled: bool) {
    CAPTURE_ENABLED.with(|flag| flag.set(enabled));
}

/// Returns whether [`StackTrace::current`] records frames on this thread.
pub fn stack_trace_capture_enabled() -> bool {
    CAPTURE_ENABLED.with(|flag| flag.get())
}

/// Represents a single frame in a call stack.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame {
///     function_name: Some("load_config".to_string()),
///     source_url: Some("src/config.rs".to_string()),
///     line: 25,
///     column: 10,
/// };
///
/// assert_eq!(frame.to_string(), "load_config (src/config.rs:25:10)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Name of the function, or None when unknown
    pub function_name: Option<String>,
    /// File path of the source, or None if not available
    pub source_url: Option<String>,
    /// Line number where the call occurred
    pub line: u32,
    /// Column number where the call occurred
    pub column: u32,
}

impl StackFrame {
    /// Builds an anonymous frame from a caller location.
    pub fn from_location(location: &Location<'_>) -> Self {
        Self {
            function_name: None,
            source_url: Some(location.file().to_string()),
            line: location.line(),
            column: location.column(),
        }
    }

    /// Returns a copy of this frame carrying `name` as its function name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.function_name.as_deref().unwrap_or("<anonymous>");
        match &self.source_url {
            Some(url) => write!(f, "{} ({}:{}:{})", name, url, self.line, self.column),
            None => write!(f, "{} (<unknown>:{}:{})", name, self.line, self.column),
        }
    }
}

/// An immutable, shareable stack trace.
///
/// Frames are ordered innermost first.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StackTrace {
    frames: Rc<Vec<StackFrame>>,
}

impl StackTrace {
    /// A stack trace with no frames.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Captures the location of the caller.
    ///
    /// Returns an empty trace when capture has been disabled with
    /// [`set_stack_trace_capture`].
    #[track_caller]
    pub fn current() -> Self {
        if !stack_trace_capture_enabled() {
            return Self::empty();
        }
        Self::from_frames(vec![StackFrame::from_location(Location::caller())])
    }

    /// Wraps an explicit list of frames.
    pub fn from_frames(frames: Vec<StackFrame>) -> Self {
        Self {
            frames: Rc::new(frames),
        }
    }

    /// Returns a new trace with `frame` pushed as the innermost frame.
    pub fn with_frame(&self, frame: StackFrame) -> Self {
        let mut frames = Vec::with_capacity(self.frames.len() + 1);
        frames.push(frame);
        frames.extend(self.frames.iter().cloned());
        Self::from_frames(frames)
    }

    /// The recorded frames, innermost first.
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Returns true if no frame was recorded.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.frames.iter()).finish()
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.frames.iter().enumerate() {
            writeln!(f, "#{:<3} {}", index, frame)?;
        }
        Ok(())
    }
}
