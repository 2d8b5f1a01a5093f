//! Incremental hash sinks fed by the checksum walker.
//!
//! The walker only ever talks to [`CanonicalHasher`], so the same traversal
//! can produce a blake3 digest or a readable dump of exactly what was hashed.

use std::fmt::Write as _;

/// Token sink for a normalized document walk.
pub trait CanonicalHasher {
    fn start_object(&mut self);
    fn property_name(&mut self, name: &str);
    /// A property whose content is hashed but whose key is not asserted.
    fn property_name_skipped(&mut self, name: &str);
    fn end_object(&mut self);
    fn start_array(&mut self);
    fn end_array(&mut self);
    fn append_string(&mut self, value: &str);
    fn append_number(&mut self, value: f64);
    fn append_bool(&mut self, value: bool);
    fn append_null(&mut self);
    /// Opaque bytes: non-JSON entries and per-entry digests.
    fn append_bytes(&mut self, bytes: &[u8]);
    fn finalize(self) -> Vec<u8>
    where
        Self: Sized;
}

// Frame tags keep adjacent tokens from running together.
const TAG_START_OBJ: u8 = 0x01;
const TAG_END_OBJ: u8 = 0x02;
const TAG_START_ARR: u8 = 0x03;
const TAG_END_ARR: u8 = 0x04;
const TAG_PROP: u8 = 0x05;
const TAG_PROP_SKIPPED: u8 = 0x06;
const TAG_STRING: u8 = 0x07;
const TAG_NUMBER: u8 = 0x08;
const TAG_TRUE: u8 = 0x09;
const TAG_FALSE: u8 = 0x0A;
const TAG_NULL: u8 = 0x0B;
const TAG_BYTES: u8 = 0x0C;

/// Production sink: blake3 over length-prefixed, tagged tokens.
#[derive(Default)]
pub struct Blake3Hasher {
    inner: blake3::Hasher,
}

impl Blake3Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    fn framed(&mut self, tag: u8, payload: &[u8]) {
        self.inner.update(&[tag]);
        self.inner.update(&(payload.len() as u64).to_le_bytes());
        self.inner.update(payload);
    }
}

impl CanonicalHasher for Blake3Hasher {
    fn start_object(&mut self) {
        self.inner.update(&[TAG_START_OBJ]);
    }

    fn property_name(&mut self, name: &str) {
        self.framed(TAG_PROP, name.as_bytes());
    }

    fn property_name_skipped(&mut self, _name: &str) {
        self.inner.update(&[TAG_PROP_SKIPPED]);
    }

    fn end_object(&mut self) {
        self.inner.update(&[TAG_END_OBJ]);
    }

    fn start_array(&mut self) {
        self.inner.update(&[TAG_START_ARR]);
    }

    fn end_array(&mut self) {
        self.inner.update(&[TAG_END_ARR]);
    }

    fn append_string(&mut self, value: &str) {
        self.framed(TAG_STRING, value.as_bytes());
    }

    fn append_number(&mut self, value: f64) {
        // -0.0 and 0.0 are the same JSON number
        let value = if value == 0.0 { 0.0 } else { value };
        self.inner.update(&[TAG_NUMBER]);
        self.inner.update(&value.to_le_bytes());
    }

    fn append_bool(&mut self, value: bool) {
        self.inner.update(&[if value { TAG_TRUE } else { TAG_FALSE }]);
    }

    fn append_null(&mut self) {
        self.inner.update(&[TAG_NULL]);
    }

    fn append_bytes(&mut self, bytes: &[u8]) {
        self.framed(TAG_BYTES, bytes);
    }

    fn finalize(self) -> Vec<u8> {
        self.inner.finalize().as_bytes().to_vec()
    }
}

/// Diagnostic sink: one token per line, indented by nesting depth.
///
/// Dump two archives with this and diff the output to see exactly which
/// normalized content differs.
#[derive(Debug, Default)]
pub struct DebugTextHasher {
    out: String,
    depth: usize,
}

impl DebugTextHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.out
    }

    fn line(&mut self, token: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(token);
        self.out.push('\n');
    }
}

impl CanonicalHasher for DebugTextHasher {
    fn start_object(&mut self) {
        self.line("{");
        self.depth += 1;
    }

    fn property_name(&mut self, name: &str) {
        self.line(&format!("{name}:"));
    }

    fn property_name_skipped(&mut self, name: &str) {
        self.line(&format!("{name}~:"));
    }

    fn end_object(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    fn start_array(&mut self) {
        self.line("[");
        self.depth += 1;
    }

    fn end_array(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("]");
    }

    fn append_string(&mut self, value: &str) {
        self.line(&format!("{value:?}"));
    }

    fn append_number(&mut self, value: f64) {
        self.line(&value.to_string());
    }

    fn append_bool(&mut self, value: bool) {
        self.line(if value { "true" } else { "false" });
    }

    fn append_null(&mut self) {
        self.line("null");
    }

    fn append_bytes(&mut self, bytes: &[u8]) {
        let mut hex = String::with_capacity(bytes.len() * 2 + 8);
        hex.push_str("bytes:");
        for b in bytes.iter().take(32) {
            let _ = write!(hex, "{b:02x}");
        }
        if bytes.len() > 32 {
            let _ = write!(hex, "..({} bytes)", bytes.len());
        }
        self.line(&hex);
    }

    fn finalize(self) -> Vec<u8> {
        self.out.into_bytes()
    }
}
