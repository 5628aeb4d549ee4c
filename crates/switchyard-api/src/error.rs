use std::{borrow::Cow, fmt::Write as _};

/// An error reading a loosely typed resource into one of the typed API objects.
///
/// Errors carry a message and a jsonpath style path to the field that could not
/// be read, so `spec.targetRefs[2].kind: field is required` points straight at
/// the offending value.
#[derive(Clone, PartialEq, Eq, thiserror::Error)]
pub struct Error {
    message: String,

    // the reversed path to the field. the leaf is pushed first, and every
    // caller on the way back up appends its own segment. see ErrorContext.
    path: Vec<PathEntry>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.path.is_empty() {
            write!(f, "{}: ", self.path())?;
        }

        f.write_str(&self.message)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Error")
            .field("message", &self.message)
            .field("path", &self.path())
            .finish()
    }
}

impl Error {
    /// The path to the field that caused this error, root first.
    pub fn path(&self) -> String {
        path_str(self.path.iter().rev())
    }

    /// The error message without any path information.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: vec![],
        }
    }

    pub(crate) fn missing_field(field: &'static str) -> Self {
        Self::new("field is required").with_field(field)
    }

    pub(crate) fn wrong_type(field: &'static str, expected: &'static str) -> Self {
        Self::new(format!("expected {expected}")).with_field(field)
    }

    /// Append a field to this error's path.
    pub fn with_field(mut self, field: &'static str) -> Self {
        self.path.push(PathEntry::from(field));
        self
    }

    /// Append a sequence index to this error's path.
    pub fn with_index(mut self, index: usize) -> Self {
        self.path.push(PathEntry::Index(index));
        self
    }
}

/// Join path entries into a single string. Fields are dot separated and
/// indices are bracketed.
fn path_str<'a, I>(path: I) -> String
where
    I: IntoIterator<Item = &'a PathEntry>,
{
    let mut buf = String::with_capacity(16);

    for (i, entry) in path.into_iter().enumerate() {
        if i > 0 && entry.is_field() {
            buf.push('.');
        }
        let _ = write!(&mut buf, "{}", entry);
    }

    buf
}

/// Add field-path context to a `Result` by appending an entry to its error's
/// path. Context is added at each callsite, so a function only names its own
/// fields and the full path comes out in order.
pub trait ErrorContext<T>: Sized {
    fn with_field(self, field: &'static str) -> Result<T, Error>;
    fn with_index(self, index: usize) -> Result<T, Error>;

    /// Shorthand for `with_field(b).with_field(a)`.
    fn with_fields(self, a: &'static str, b: &'static str) -> Result<T, Error> {
        self.with_field(b).with_field(a)
    }

    /// Shorthand for `with_index(idx).with_field(name)`.
    fn with_field_index(self, field: &'static str, index: usize) -> Result<T, Error> {
        self.with_index(index).with_field(field)
    }
}

impl<T> ErrorContext<T> for Result<T, Error> {
    fn with_field(self, field: &'static str) -> Result<T, Error> {
        self.map_err(|e| e.with_field(field))
    }

    fn with_index(self, index: usize) -> Result<T, Error> {
        self.map_err(|e| e.with_index(index))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
enum PathEntry {
    Field(Cow<'static, str>),
    Index(usize),
}

impl PathEntry {
    fn is_field(&self) -> bool {
        matches!(self, PathEntry::Field(_))
    }
}

impl std::fmt::Display for PathEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathEntry::Field(field) => f.write_str(field),
            PathEntry::Index(idx) => f.write_fmt(format_args!("[{idx}]")),
        }
    }
}

impl From<&'static str> for PathEntry {
    fn from(value: &'static str) -> Self {
        PathEntry::Field(Cow::Borrowed(value))
    }
}
