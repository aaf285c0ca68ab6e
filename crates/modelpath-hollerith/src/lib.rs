//! A codec for the length-prefixed quoted-string record format used by
//! search path configuration files.
//!
//! Each field is encoded as `"<N>:<content>"` where `N` is the decimal byte
//! length of the content. Fields are comma separated, with no trailing comma
//! after the last field:
//!
//! ```text
//! "5:MYLIB","20:/home/user/3dmodels","11:My Library"
//! ```
//!
//! The reader is byte-exact: the declared length counts raw bytes, not
//! characters, and the closing quote must follow immediately after the
//! declared number of bytes. Any deviation is an error for the whole record.

/// Encode a single field as `"<N>:<content>"`.
pub fn encode_field(content: &str) -> String {
    format!("\"{}:{}\"", content.len(), content)
}

/// Encode a sequence of fields as one comma-separated record line.
pub fn encode_record(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| encode_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Errors that can occur while reading a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HollerithError {
    #[error("expected an opening quote at byte {0}")]
    MissingQuote(usize),

    #[error("expected decimal length digits at byte {0}")]
    BadLength(usize),

    #[error("declared length {declared} overruns the record at byte {at}")]
    Truncated { declared: usize, at: usize },

    #[error("expected a closing quote at byte {0}")]
    MissingClosingQuote(usize),

    #[error("field content at byte {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    #[error("unexpected trailing bytes at byte {0}")]
    TrailingGarbage(usize),
}

/// Cursor-style reader over a single record line.
pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a str) -> Self {
        Reader {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    /// Read every field in the record. Fails on the first malformed field.
    pub fn read_record(&mut self) -> Result<Vec<String>, HollerithError> {
        let mut fields = vec![self.read_field()?];

        loop {
            self.skip_whitespace();

            if self.is_at_end() {
                break;
            }

            if self.input[self.pos] != b',' {
                return Err(HollerithError::TrailingGarbage(self.pos));
            }

            self.pos += 1;
            fields.push(self.read_field()?);
        }

        Ok(fields)
    }

    /// Read one `"<N>:<content>"` field starting at the next quote.
    pub fn read_field(&mut self) -> Result<String, HollerithError> {
        let quote = self.input[self.pos..]
            .iter()
            .position(|&b| b == b'"')
            .map(|off| self.pos + off)
            .ok_or(HollerithError::MissingQuote(self.pos))?;

        let mut cursor = quote + 1;
        let digits_start = cursor;

        while cursor < self.input.len() && self.input[cursor].is_ascii_digit() {
            cursor += 1;
        }

        if cursor == digits_start || cursor >= self.input.len() || self.input[cursor] != b':' {
            return Err(HollerithError::BadLength(digits_start));
        }

        let declared: usize = std::str::from_utf8(&self.input[digits_start..cursor])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(HollerithError::BadLength(digits_start))?;

        cursor += 1;
        let content_start = cursor;

        if content_start + declared > self.input.len() {
            return Err(HollerithError::Truncated {
                declared,
                at: content_start,
            });
        }

        let content = std::str::from_utf8(&self.input[content_start..content_start + declared])
            .map_err(|_| HollerithError::InvalidUtf8(content_start))?;

        cursor = content_start + declared;

        if cursor >= self.input.len() || self.input[cursor] != b'"' {
            return Err(HollerithError::MissingClosingQuote(cursor));
        }

        self.pos = cursor + 1;
        Ok(content.to_string())
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}

/// Parse one record line into its fields.
pub fn parse_record(line: &str) -> Result<Vec<String>, HollerithError> {
    log::trace!("Parsing record from {} bytes of input", line.len());
    let result = Reader::new(line).read_record();

    if let Err(e) = &result {
        log::trace!("Failed to parse record: {e}");
    }

    result
}
