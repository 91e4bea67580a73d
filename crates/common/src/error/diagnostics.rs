use std::{borrow::Cow, fmt, panic::Location};

/// Human-friendly error message that automatically records the call-site.
///
/// A diagnostic may also name the *subject* it is about (a transfer unit, a
/// connection id, a Livy statement) so that the rendered message identifies
/// the failing piece of work without every error variant carrying its own
/// field for it.
///
/// Call [`DiagnosticMessage::new`], [`DiagnosticMessage::about`] or the
/// [`diag!`] macro to create an instance; the macro allows inline formatting
/// (e.g. `diag!("missing {}", x)`) while capturing the call-site.
#[derive(Clone, Debug)]
pub struct DiagnosticMessage {
    message: Cow<'static, str>,
    subject: Option<String>,
    location: &'static Location<'static>,
}

impl DiagnosticMessage {
    /// Create a message and record the caller location.
    #[track_caller]
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            subject: None,
            location: Location::caller(),
        }
    }

    /// Create a message about a named subject, e.g. `about("orders", "...")`.
    #[track_caller]
    pub fn about(subject: impl Into<String>, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            subject: Some(subject.into()),
            location: Location::caller(),
        }
    }

    pub fn message(&self) -> &str {
        self.message.as_ref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl fmt::Display for DiagnosticMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(subject) = &self.subject {
            write!(f, "[{}] ", subject)?;
        }
        write!(
            f,
            "{} (at {}:{})",
            self.message,
            self.location.file(),
            self.location.line()
        )
    }
}

/// Convenience macro for creating [`DiagnosticMessage`] values with `format!`
/// style syntax while capturing the file/line automatically.
#[macro_export]
macro_rules! diag {
    ($msg:literal $(,)?) => {
        $crate::error::diagnostics::DiagnosticMessage::new($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::diagnostics::DiagnosticMessage::new(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_subject_and_location() {
        let diag = DiagnosticMessage::about("orders", "truncate failed");
        let rendered = diag.to_string();
        assert!(rendered.starts_with("[orders] truncate failed (at "));
        assert!(rendered.contains("diagnostics.rs"));
        assert_eq!(diag.subject(), Some("orders"));
    }

    #[test]
    fn macro_formats_message() {
        let diag = diag!("missing {} columns", 3);
        assert_eq!(diag.message(), "missing 3 columns");
        assert!(diag.subject().is_none());
    }
}
