//! A small line-oriented tokenizer for the Tor directory-document
//! grammar (dir-spec.txt §1.2): each line is a keyword followed by
//! whitespace-separated arguments, and some keywords are followed by a
//! PEM-style `-----BEGIN X-----`/`-----END X-----` object.
//!
//! This is deliberately a fraction of the generality of a full
//! directory-document parser: it knows nothing about which keywords
//! are legal where, or how many times they may repeat. Callers
//! (`consensus`, `routerdesc`, `hsdesc`) walk the item stream and pick
//! out the keywords they care about.

use crate::{Error, Result};

/// One line of a directory document, split into its keyword and
/// space-separated arguments.
#[derive(Debug, Clone)]
pub struct Item<'a> {
    /// The first whitespace-delimited token on the line.
    pub keyword: &'a str,
    /// The remaining whitespace-delimited tokens.
    pub args: Vec<&'a str>,
}

impl<'a> Item<'a> {
    /// Borrow the arguments as a plain slice.
    pub fn args(&self) -> &[&'a str] {
        &self.args
    }
}

/// A cursor over the items of a directory document, with the ability
/// to pull a trailing PEM object for the item just read.
pub struct Reader<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Build a reader over the raw text of a directory document.
    pub fn new(text: &'a str) -> Self {
        Reader { lines: text.lines().collect(), pos: 0 }
    }

    /// Return the next item, or `None` at end of document. PEM object
    /// lines (`-----BEGIN ...`) are never returned as items directly;
    /// use [`Reader::take_object`] right after the item that owns one.
    pub fn next(&mut self) -> Option<Item<'a>> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            self.pos += 1;
            if line.is_empty() {
                continue;
            }
            if line.starts_with("-----BEGIN") {
                // An orphan BEGIN (no preceding take_object call) is
                // skipped rather than erroring: some fields' objects
                // are optional to us (e.g. certificates we don't verify).
                self.skip_to_end();
                continue;
            }
            let mut parts = line.split_ascii_whitespace();
            let keyword = match parts.next() {
                Some(k) => k,
                None => continue,
            };
            let args: Vec<&'a str> = parts.collect();
            return Some(Item { keyword, args });
        }
        None
    }

    fn skip_to_end(&mut self) {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            self.pos += 1;
            if line.starts_with("-----END") {
                break;
            }
        }
    }

    /// Assuming the line just consumed by `next` is immediately
    /// followed by a PEM object, collect and base64-decode its body.
    pub fn take_object(&mut self) -> Result<Vec<u8>> {
        if self.pos >= self.lines.len() || !self.lines[self.pos].starts_with("-----BEGIN") {
            return Err(Error::MissingObject);
        }
        self.pos += 1;
        let mut b64 = String::new();
        loop {
            if self.pos >= self.lines.len() {
                return Err(Error::UnterminatedObject);
            }
            let line = self.lines[self.pos];
            self.pos += 1;
            if line.starts_with("-----END") {
                break;
            }
            b64.push_str(line.trim());
        }
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(b64.as_bytes())
            .map_err(|_| Error::BadBase64)
    }
}

/// Decode a base64 token with no surrounding PEM markers (as used for
/// e.g. `ntor-onion-key`'s inline argument), tolerating missing `=`
/// padding the way Tor's directory documents do.
pub fn decode_base64_unpadded(s: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    let mut padded = s.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    base64::engine::general_purpose::STANDARD
        .decode(padded.as_bytes())
        .map_err(|_| Error::BadBase64)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_simple_keyword_lines() {
        let doc = "valid-after 2020-01-01 00:00:00\nparams hsdir_spread_store=4\n";
        let mut r = Reader::new(doc);
        let i1 = r.next().unwrap();
        assert_eq!(i1.keyword, "valid-after");
        assert_eq!(i1.args, ["2020-01-01", "00:00:00"]);
        let i2 = r.next().unwrap();
        assert_eq!(i2.keyword, "params");
        assert!(r.next().is_none());
    }

    #[test]
    fn reads_pem_object_after_its_owning_line() {
        let doc = "identity-ed25519\n-----BEGIN ED25519 CERT-----\nAAAA\n-----END ED25519 CERT-----\nnext-line foo\n";
        let mut r = Reader::new(doc);
        let i1 = r.next().unwrap();
        assert_eq!(i1.keyword, "identity-ed25519");
        let obj = r.take_object().unwrap();
        assert_eq!(obj, vec![0, 0, 0]);
        let i2 = r.next().unwrap();
        assert_eq!(i2.keyword, "next-line");
    }

    #[test]
    fn unclaimed_object_is_skipped_without_error() {
        let doc = "identity-ed25519\n-----BEGIN ED25519 CERT-----\nAAAA\n-----END ED25519 CERT-----\nnext-line foo\n";
        let mut r = Reader::new(doc);
        let _ = r.next().unwrap();
        let i2 = r.next().unwrap();
        assert_eq!(i2.keyword, "next-line");
    }
}
