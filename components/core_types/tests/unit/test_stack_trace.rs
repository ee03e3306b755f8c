//! Unit tests for StackTrace and StackFrame

use core_types::{StackFrame, StackTrace};

#[cfg(test)]
mod stack_frame_tests {
    use super::*;

    #[test]
    fn test_stack_frame_creation() {
        let frame = StackFrame {
            function_name: Some("myFunction".to_string()),
            source_url: Some("src/main.rs".to_string()),
            line: 25,
            column: 10,
        };

        assert_eq!(frame.function_name, Some("myFunction".to_string()));
        assert_eq!(frame.line, 25);
        assert_eq!(frame.column, 10);
    }

    #[test]
    fn test_stack_frame_display_anonymous() {
        let frame = StackFrame {
            function_name: None,
            source_url: None,
            line: 3,
            column: 4,
        };

        assert_eq!(frame.to_string(), "<anonymous> (<unknown>:3:4)");
    }

    #[test]
    fn test_stack_frame_named() {
        let frame = StackFrame::from_location(std::panic::Location::caller()).named("poll");
        assert_eq!(frame.function_name.as_deref(), Some("poll"));
        assert!(frame.source_url.is_some());
    }
}

#[cfg(test)]
mod stack_trace_tests {
    use super::*;

    #[test]
    fn test_empty_trace() {
        let trace = StackTrace::empty();
        assert!(trace.is_empty());
        assert_eq!(trace.to_string(), "");
    }

    #[test]
    fn test_current_points_at_this_file() {
        let trace = StackTrace::current();
        let frame = &trace.frames()[0];
        assert!(frame
            .source_url
            .as_deref()
            .is_some_and(|url| url.ends_with("test_stack_trace.rs")));
    }

    #[test]
    fn test_display_numbers_frames() {
        let trace = StackTrace::from_frames(vec![
            StackFrame {
                function_name: Some("inner".to_string()),
                source_url: Some("a.rs".to_string()),
                line: 1,
                column: 2,
            },
            StackFrame {
                function_name: Some("outer".to_string()),
                source_url: Some("a.rs".to_string()),
                line: 9,
                column: 1,
            },
        ]);

        let rendered = trace.to_string();
        assert!(rendered.starts_with("#0   inner (a.rs:1:2)"));
        assert!(rendered.contains("#1   outer (a.rs:9:1)"));
    }

    #[test]
    fn test_clone_is_equal() {
        let trace = StackTrace::current();
        assert_eq!(trace.clone(), trace);
    }
}
