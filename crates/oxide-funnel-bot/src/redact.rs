//! Log redaction of bot tokens.
//!
//! Bot API and file download URLs embed the token in their path, so any
//! logged URL or request error would leak it.

use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;

/// Compiled redaction rules, applied in order.
pub struct RedactionPatterns {
    rules: Vec<(Regex, &'static str)>,
}

impl RedactionPatterns {
    /// Compile all patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            rules: vec![
                // https://api.telegram.org/bot<token>/... and /file/bot<token>/...
                (
                    Regex::new(r"(/bot)[0-9]+:[A-Za-z0-9_-]+")?,
                    "$1[TELEGRAM_TOKEN]",
                ),
                (
                    Regex::new(r"[0-9]{8,10}:[A-Za-z0-9_-]{35}")?,
                    "[TELEGRAM_TOKEN]",
                ),
                (
                    Regex::new(r"TELEGRAM_BOT_TOKEN=[^\s&]+")?,
                    "TELEGRAM_BOT_TOKEN=[MASKED]",
                ),
            ],
        })
    }

    /// Redact all tokens in `input`.
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |acc, (pattern, replacement)| {
                pattern.replace_all(&acc, *replacement).into_owned()
            })
    }
}

/// Writer that redacts every chunk before passing it on.
pub struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let redacted = self.patterns.redact(&String::from_utf8_lossy(buf));
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the caller wrote all of it
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// `MakeWriter` producing [`RedactingWriter`]s.
pub struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    /// Wrap a writer factory.
    pub const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: Arc::clone(&self.patterns),
        }
    }
}
