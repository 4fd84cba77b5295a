use std::{
    any::{Any, type_name},
    backtrace::Backtrace,
    borrow::Cow,
    error::Error as StdError,
    fmt,
    panic::Location,
};

/// An uncaught application failure on its way to the error boundary.
///
/// Any `std::error::Error` converts into a `Failure` through `?`, which records
/// the error's type name, the location of the `?` and a trace. `Failure` does not
/// implement `std::error::Error` itself, so the blanket conversion stays coherent.
pub struct Failure {
    kind: Cow<'static, str>,
    message: String,
    location: &'static Location<'static>,
    causes: Vec<String>,
    backtrace: Backtrace,
}

impl Failure {
    /// Creates a failure from a plain message.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self::build(Cow::Borrowed(type_name::<Self>()), message.into(), Vec::new())
    }

    /// Creates a failure from an error, keeping its source chain.
    #[track_caller]
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + 'static,
    {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self::build(Cow::Borrowed(type_name::<E>()), error.to_string(), causes)
    }

    /// Creates a failure from the payload of a caught panic.
    #[track_caller]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&'static str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "panic with a non-string payload".to_string()
        };
        Self::build(Cow::Borrowed("panic"), message, Vec::new())
    }

    #[track_caller]
    fn build(kind: Cow<'static, str>, message: String, causes: Vec<String>) -> Self {
        Self {
            kind,
            message,
            location: Location::caller(),
            causes,
            backtrace: Backtrace::force_capture(),
        }
    }

    /// Overrides the reported failure type.
    pub fn with_kind(mut self, kind: impl Into<Cow<'static, str>>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn file(&self) -> &'static str {
        self.location.file()
    }

    pub fn line(&self) -> u32 {
        self.location.line()
    }

    /// Textual trace: the failure itself, its causes, then the captured backtrace.
    pub fn trace(&self) -> String {
        let mut trace = format!(
            "#0 {}({}): {}: {}",
            self.file(),
            self.line(),
            self.kind,
            self.message
        );
        for (depth, cause) in self.causes.iter().enumerate() {
            trace.push_str(&format!("\n#{} caused by: {cause}", depth + 1));
        }
        let backtrace = self.backtrace.to_string();
        if !backtrace.trim().is_empty() {
            trace.push('\n');
            trace.push_str(backtrace.trim_end());
        }
        trace
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    #[track_caller]
    fn from(error: E) -> Self {
        Self::from_error(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("file", &self.file())
            .field("line", &self.line())
            .field("causes", &self.causes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn read_missing() -> Result<(), Failure> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no such view"))?;
        Ok(())
    }

    #[test]
    fn test_question_mark_records_type_and_location() {
        let failure = read_missing().unwrap_err();
        assert_eq!(failure.message(), "no such view");
        assert!(failure.kind().contains("io"));
        assert!(failure.kind().ends_with("Error"));
        assert!(failure.file().ends_with("failure.rs"));
        assert!(failure.line() > 0);
    }

    #[test]
    fn test_new_uses_message() {
        let failure = Failure::new("boom");
        assert_eq!(failure.to_string(), "boom");
        assert!(failure.trace().starts_with("#0 "));
        assert!(failure.trace().contains("boom"));
    }

    #[test]
    fn test_from_panic_payloads() {
        let failure = Failure::from_panic(Box::new("static text"));
        assert_eq!(failure.kind(), "panic");
        assert_eq!(failure.message(), "static text");

        let failure = Failure::from_panic(Box::new(String::from("owned text")));
        assert_eq!(failure.message(), "owned text");

        let failure = Failure::from_panic(Box::new(42_u8));
        assert_eq!(failure.message(), "panic with a non-string payload");
    }

    #[test]
    fn test_trace_includes_causes() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] io::Error);

        let failure = Failure::from(Outer(io::Error::other("inner")));
        assert!(failure.trace().contains("#1 caused by: inner"));
    }
}
