//! A writer that checks what it is given against the text it should produce.
//!
//! Every character written is compared with the next character of the
//! original. Carriage returns are ignored on both sides: an emitted `\r`
//! is forwarded without a check and a `\r` in the original is skipped, so
//! CRLF and LF checkouts both pass.

use std::fmt;
use std::str::Chars;

use crate::error::{Result, RoundTripMismatch, SourceError};

pub struct RoundTripWriter<'a, W> {
    expected: Chars<'a>,
    file: String,
    sink: W,
    line: usize,
    column: usize,
    error: Option<SourceError>,
}

impl<'a, W: fmt::Write> RoundTripWriter<'a, W> {
    pub fn new(original: &'a str, file: impl Into<String>, sink: W) -> Self {
        Self {
            expected: original.chars(),
            file: file.into(),
            sink,
            line: 1,
            column: 0,
            error: None,
        }
    }

    fn mismatch(&self) -> SourceError {
        RoundTripMismatch {
            file: self.file.clone(),
            line: self.line,
            column: self.column,
        }
        .into()
    }

    fn next_expected(&mut self) -> Option<char> {
        self.expected.by_ref().find(|&c| c != '\r')
    }

    pub fn write_char(&mut self, c: char) -> Result<()> {
        self.sink
            .write_char(c)
            .map_err(|_| SourceError::unsupported(&self.file, "output sink rejected a write"))?;
        if c == '\r' {
            return Ok(());
        }

        self.column += 1;
        match self.next_expected() {
            Some(e) if e == c => {}
            _ => return Err(self.mismatch()),
        }
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        }
        Ok(())
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        s.chars().try_for_each(|c| self.write_char(c))
    }

    /// Position of the last character checked.
    pub fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    /// The error that made a `fmt::Write` call fail, if any.
    pub fn take_error(&mut self) -> Option<SourceError> {
        self.error.take()
    }

    /// Succeeds only if the whole original was reproduced.
    pub fn finish(mut self) -> Result<W> {
        if self.next_expected().is_some() {
            self.column += 1;
            return Err(self.mismatch());
        }
        Ok(self.sink)
    }
}

impl<W: fmt::Write> fmt::Write for RoundTripWriter<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        RoundTripWriter::write_str(self, s).map_err(|e| {
            self.error.get_or_insert(e);
            fmt::Error
        })
    }

    fn write_char(&mut self, c: char) -> fmt::Result {
        RoundTripWriter::write_char(self, c).map_err(|e| {
            self.error.get_or_insert(e);
            fmt::Error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_of(err: SourceError) -> (usize, usize) {
        match err {
            SourceError::RoundTrip(m) => (m.line, m.column),
            other => panic!("expected a round-trip mismatch, got {other:?}"),
        }
    }

    #[test]
    fn extra_output_is_reported_where_it_starts() {
        let mut w = RoundTripWriter::new("input : value", "a.fx.yaml", String::new());
        let err = w.write_str("input : value2").unwrap_err();
        assert_eq!(position_of(err), (1, 14));
    }

    #[test]
    fn identical_text_passes_and_reaches_the_sink() {
        let mut w = RoundTripWriter::new("a\nbc\n", "f", String::new());
        w.write_str("a\nbc\n").unwrap();
        assert_eq!(w.position(), (3, 0));
        assert_eq!(w.finish().unwrap(), "a\nbc\n");
    }

    #[test]
    fn line_and_column_of_a_difference() {
        let mut w = RoundTripWriter::new("one\ntwo\n", "f", String::new());
        let err = w.write_str("one\ntwX").unwrap_err();
        assert_eq!(position_of(err), (2, 3));
    }

    #[test]
    fn leftover_input_fails_finish() {
        let mut w = RoundTripWriter::new("abc", "f", String::new());
        w.write_str("ab").unwrap();
        assert_eq!(position_of(w.finish().unwrap_err()), (1, 3));
    }

    #[test]
    fn crlf_original_matches_lf_output() {
        let mut w = RoundTripWriter::new("a\r\nb\r\n", "f", String::new());
        w.write_str("a\nb\n").unwrap();
        assert!(w.finish().is_ok());
    }

    #[test]
    fn crlf_output_matches_lf_original() {
        let mut w = RoundTripWriter::new("a\nb\n", "f", String::new());
        w.write_str("a\r\nb\r\n").unwrap();
        assert_eq!(w.finish().unwrap(), "a\r\nb\r\n");
    }

    #[test]
    fn fmt_write_keeps_the_underlying_error() {
        use std::fmt::Write as _;
        let mut w = RoundTripWriter::new("x = 1", "f", String::new());
        assert!(write!(w, "x = {}", 2).is_err());
        assert_eq!(position_of(w.take_error().unwrap()), (1, 5));
    }
}
