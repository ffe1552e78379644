use std::fmt;

/// Transport failure or non-success HTTP status while fetching a document.
#[derive(Debug, Clone)]
pub struct FetchError {
    pub url: String,
    pub status: Option<u16>,
    pub message: String,
}

impl FetchError {
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            message: format!("server responded with status {status}"),
        }
    }

    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unable to fetch {}: {}", self.url, self.message)
    }
}

impl std::error::Error for FetchError {}

/// A response body that is not JSON, or JSON without the expected OSCAL root.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub url: String,
    pub message: String,
}

impl ParseError {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid document at {}: {}", self.url, self.message)
    }
}

impl std::error::Error for ParseError {}

/// A path segment that does not address an existing, compatible container.
#[derive(Debug, Clone)]
pub struct AddressingError {
    /// Zero-based position of the failing segment within the path.
    pub position: usize,
    pub segment: String,
    pub reason: String,
}

impl AddressingError {
    pub fn new(position: usize, segment: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            position,
            segment: segment.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AddressingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid path at segment {} ({}): {}",
            self.position, self.segment, self.reason
        )
    }
}

impl std::error::Error for AddressingError {}

/// An import href that cannot be turned into a fetchable URL.
#[derive(Debug, Clone)]
pub struct ReferenceError {
    pub href: String,
    pub message: String,
}

impl ReferenceError {
    pub fn new(href: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolvable reference {}: {}", self.href, self.message)
    }
}

impl std::error::Error for ReferenceError {}

#[derive(Debug)]
pub struct CancelledError;

impl fmt::Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resolution cancelled")
    }
}

impl std::error::Error for CancelledError {}
