//! Response state with a swappable output target.

use std::fmt;
use std::io::Write;

use crate::error::RenderError;

/// Where rendered markup is written.
pub enum Output {
    /// Markup accumulated in memory.
    Buffered(String),
    /// Markup written straight through to the host.
    Streaming(Box<dyn Write + Send>),
}

impl Output {
    /// Create an empty in-memory buffer.
    pub fn buffer() -> Self {
        Self::Buffered(String::new())
    }

    /// Write a chunk of markup.
    pub fn write_str(&mut self, markup: &str) -> std::io::Result<()> {
        match self {
            Self::Buffered(buf) => {
                buf.push_str(markup);
                Ok(())
            }
            Self::Streaming(writer) => writer.write_all(markup.as_bytes()),
        }
    }

    /// Check if this target is an in-memory buffer.
    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered(_))
    }

    /// Get the buffered markup, if any.
    pub fn as_buffered(&self) -> Option<&str> {
        match self {
            Self::Buffered(buf) => Some(buf),
            Self::Streaming(_) => None,
        }
    }

    /// Consume the target and return the buffered markup.
    pub fn into_buffered(self) -> Option<String> {
        match self {
            Self::Buffered(buf) => Some(buf),
            Self::Streaming(_) => None,
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::buffer()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(buf) => f.debug_tuple("Buffered").field(&buf.len()).finish(),
            Self::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// Response being produced for the current request.
#[derive(Debug)]
pub struct Response {
    status: u16,
    content_type: String,
    headers: Vec<(String, String)>,
    output: Output,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Create a buffered `200 text/html` response.
    pub fn new() -> Self {
        Self {
            status: 200,
            content_type: "text/html".to_string(),
            headers: Vec::new(),
            output: Output::buffer(),
        }
    }

    /// Create a response that streams to the given writer.
    pub fn streaming(writer: Box<dyn Write + Send>) -> Self {
        Self {
            output: Output::Streaming(writer),
            ..Self::new()
        }
    }

    /// Get the status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Set the status code.
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Get the content type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Set the content type.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    /// Set a header, replacing any existing value (case-insensitive name).
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get all headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Write markup to the current output target.
    pub fn write(&mut self, markup: &str) -> Result<(), RenderError> {
        self.output.write_str(markup)?;
        Ok(())
    }

    /// Replace the output target, returning the previous one.
    pub fn swap_output(&mut self, output: Output) -> Output {
        std::mem::replace(&mut self.output, output)
    }

    /// Get the current output target.
    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Get the buffered body, if the output is buffered.
    pub fn body(&self) -> Option<&str> {
        self.output.as_buffered()
    }
}
