//! Web archive (WARC / ARC) reader.
//!
//! A web archive is a sequence of records, each a header block followed by a
//! length-prefixed content block. WARC headers are `Name: value` lines after a
//! `WARC/x.y` version line; ARC records instead start with a single
//! space-separated line whose last field is the content length. Both dialects
//! may appear in one stream, and `.warc.gz` / `.arc.gz` files are a series of
//! gzip members, one per record.
//!
//! Only `response` records are extracted. For HTTP responses the payload is
//! the message body: the status line and headers are stripped, chunked
//! transfer encoding is undone and gzip/deflate content encoding is decoded.
//!
//! The logical name of a record is its target URI without the scheme and
//! without the final path segment, followed by `cd-<filename>` when a
//! `Content-Disposition` header names a file:
//!
//! ```text
//! http://example.com/x/y.bin  +  filename="z.bin"  ->  example.com/xcd-z.bin
//! ```
//!
//! Bad header lines and odd URIs degrade to a best-effort name. Only framing
//! damage (a record whose length cannot be read) stops enumeration, since the
//! next record can no longer be located.
//!
//! # Framing
//!
//! WARC records follow ISO 28500 (WARC 1.0 and 1.1 share the framing):
//! - a `WARC/<major>.<minor>` version line opens the record
//! - named fields are `Name: value`, names compared case-insensitively, and a
//!   line starting with space or tab continues the previous value
//! - a blank line ends the header; `Content-Length` is mandatory and counts
//!   the content block bytes exactly
//! - two CRLFs close the record
//!
//! ARC records follow the Internet Archive ARC file format: one header line
//! (v1 `URL IP date type length`, v2 with extra fields before the length),
//! then `length` bytes, then a newline. The `filedesc://` version block is an
//! ordinary record and is skipped like any non-response record.
//!
//! Lines may end in CRLF or bare LF, and whitespace between records is
//! skipped, so slightly non-conforming writers still parse.

use super::{extract_stream, ArchiveReader, ExtractedEntry, Format, ScratchSpace, Visit};

use crate::paths;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

const READ_BUFFER: usize = 64 * 1024;
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const FALLBACK_FILE_NAME: &str = "record";

/// Record framing errors.
#[derive(Debug, thiserror::Error)]
pub enum WebArchiveError {
    #[error("record header has no Content-Length")]
    MissingLength,

    #[error("invalid record length '{0}'")]
    InvalidLength(String),

    #[error("unrecognised record header line: {0}")]
    BadHeaderLine(String),

    #[error("stream ended inside a record header")]
    TruncatedHeader,

    #[error("malformed chunk size line: {0}")]
    BadChunk(String),
}

/// Header fields in stored order, looked up case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn push(&mut self, name: &str, value: &str) {
        self.0.push((name.trim().to_string(), value.trim().to_string()));
    }

    /// Parse one `Name: value` line; continuation lines extend the last value.
    fn push_line(&mut self, line: &str) {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = self.0.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            return;
        }

        match line.split_once(':') {
            Some((name, value)) => self.push(name, value),
            None => debug!("ignoring malformed header line '{}'", line),
        }
    }
}

/// Parsed record header.
#[derive(Debug, Clone)]
struct RecordHead {
    /// Lowercased WARC-Type (ARC records are `response` or `warcinfo`)
    kind: String,
    headers: Headers,
    target_uri: Option<String>,
    length: u64,
}

impl RecordHead {
    fn is_response(&self) -> bool {
        self.kind == "response"
    }
}

pub struct WebArchiveReader {
    path: PathBuf,
    stream: Box<dyn BufRead>,
}

impl WebArchiveReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .with_context(|| format!("Failed to open web archive: {}", path.display()))?;

        let mut magic = [0u8; 2];
        let bytes_read = file.read(&mut magic).unwrap_or(0);
        file.seek(SeekFrom::Start(0))
            .with_context(|| format!("Failed to rewind web archive: {}", path.display()))?;

        let stream: Box<dyn BufRead> = if bytes_read == 2 && magic == GZIP_MAGIC {
            let decoder = flate2::read::MultiGzDecoder::new(BufReader::new(file));
            Box::new(BufReader::with_capacity(READ_BUFFER, decoder))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER, file))
        };

        Ok(Self {
            path: path.to_path_buf(),
            stream,
        })
    }
}

impl ArchiveReader for WebArchiveReader {
    fn format(&self) -> Format {
        Format::WebArchive
    }

    fn walk(&mut self, scratch: &ScratchSpace, visit: &mut Visit<'_>) -> Result<()> {
        let mut ordinal = 0usize;

        while let Some(head) = next_record_head(&mut self.stream)
            .with_context(|| format!("Failed to read record header in {}", self.path.display()))?
        {
            ordinal += 1;
            let mut block = (&mut self.stream).take(head.length);

            let extracted = if head.is_response() {
                Some(extract_record(&head, &mut block, scratch, ordinal))
            } else {
                debug!("skipping {} record #{}", head.kind, ordinal);
                None
            };

            // Whatever the payload handling left unread still has to be passed
            io::copy(&mut block, &mut io::sink())
                .with_context(|| format!("Failed to skip record #{} in {}", ordinal, self.path.display()))?;

            if let Some(result) = extracted {
                visit(result);
            }
        }

        Ok(())
    }
}

/// Read one line including its terminator; `None` at end of stream.
fn read_line<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Read the next record header, skipping the blank lines between records.
fn next_record_head<R: BufRead + ?Sized>(reader: &mut R) -> Result<Option<RecordHead>> {
    let first = loop {
        match read_line(reader)? {
            None => return Ok(None),
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => break line,
        }
    };

    let first = strip_eol(&first);
    if first.starts_with("WARC/") {
        parse_warc_head(reader).map(Some)
    } else {
        parse_arc_head(first).map(Some)
    }
}

fn parse_warc_head<R: BufRead + ?Sized>(reader: &mut R) -> Result<RecordHead> {
    let mut headers = Headers::default();

    loop {
        let line = read_line(reader)?.ok_or(WebArchiveError::TruncatedHeader)?;
        let line = strip_eol(&line);
        if line.is_empty() {
            break;
        }
        headers.push_line(line);
    }

    let raw_length = headers
        .get("Content-Length")
        .ok_or(WebArchiveError::MissingLength)?;
    let length = raw_length
        .parse::<u64>()
        .map_err(|_| WebArchiveError::InvalidLength(raw_length.to_string()))?;

    Ok(RecordHead {
        kind: headers.get("WARC-Type").unwrap_or_default().to_ascii_lowercase(),
        target_uri: headers.get("WARC-Target-URI").map(str::to_string),
        headers,
        length,
    })
}

/// ARC v1: `URL IP date content-type length`; v2 adds fields but keeps the
/// URL first and the length last.
fn parse_arc_head(line: &str) -> Result<RecordHead> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (Some(url), Some(raw_length)) = (fields.first(), fields.last()) else {
        return Err(WebArchiveError::BadHeaderLine(line.to_string()).into());
    };
    if fields.len() < 2 {
        return Err(WebArchiveError::BadHeaderLine(line.to_string()).into());
    }

    let length = raw_length
        .parse::<u64>()
        .map_err(|_| WebArchiveError::InvalidLength(raw_length.to_string()))?;

    // The file header record describes the ARC file itself
    let kind = if url.starts_with("filedesc:") {
        "warcinfo"
    } else {
        "response"
    };

    Ok(RecordHead {
        kind: kind.to_string(),
        headers: Headers::default(),
        target_uri: Some(url.to_string()),
        length,
    })
}

/// Read an HTTP status line and headers if the block holds an HTTP message.
fn read_http_head<R: BufRead + ?Sized>(block: &mut R) -> Result<Option<Headers>> {
    if !block.fill_buf()?.starts_with(b"HTTP/") {
        return Ok(None);
    }

    let _status = read_line(block)?;
    let mut headers = Headers::default();
    while let Some(line) = read_line(block)? {
        let line = strip_eol(&line);
        if line.is_empty() {
            break;
        }
        headers.push_line(line);
    }
    Ok(Some(headers))
}

/// Body of the record with transfer and content encodings undone.
fn payload_reader<'a, R: BufRead + 'a>(block: R, http: Option<&Headers>) -> Box<dyn Read + 'a> {
    let Some(http) = http else {
        return Box::new(block);
    };

    let chunked = http
        .get("Transfer-Encoding")
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
    let body: Box<dyn Read + 'a> = if chunked {
        Box::new(ChunkedReader::new(block))
    } else {
        Box::new(block)
    };

    let encoding = http
        .get("Content-Encoding")
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match encoding.as_str() {
        "gzip" | "x-gzip" => Box::new(flate2::read::MultiGzDecoder::new(body)),
        "deflate" => Box::new(flate2::read::ZlibDecoder::new(body)),
        _ => body,
    }
}

fn extract_record<R: BufRead>(
    head: &RecordHead,
    block: &mut R,
    scratch: &ScratchSpace,
    ordinal: usize,
) -> Result<ExtractedEntry> {
    let http = read_http_head(block)
        .with_context(|| format!("Failed to read HTTP headers of record #{}", ordinal))?;

    let filename = head
        .headers
        .get("Content-Disposition")
        .or_else(|| http.as_ref().and_then(|h| h.get("Content-Disposition")))
        .and_then(content_disposition_filename);

    let uri = head.target_uri.as_deref();
    let name = record_name(uri, filename.as_deref(), ordinal);
    let file_name = filename
        .clone()
        .or_else(|| uri.and_then(uri_file_name))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

    debug!("extracting response record #{} as '{}'", ordinal, name);
    let mut body = payload_reader(block, http.as_ref());
    extract_stream(scratch, &name, &file_name, None, &mut body)
}

/// Logical name for a response record.
pub fn record_name(target_uri: Option<&str>, disposition_filename: Option<&str>, ordinal: usize) -> String {
    let mut name = match target_uri.map(str::trim).filter(|uri| !uri.is_empty()) {
        Some(uri) => uri_stem(uri),
        None => format!("record-{}", ordinal),
    };

    if let Some(filename) = disposition_filename.filter(|f| !f.is_empty()) {
        name.push_str("cd-");
        name.push_str(filename);
    }

    name
}

/// Strip the scheme (and `//`) and drop the final path segment.
fn without_scheme(uri: &str) -> &str {
    let uri = uri.trim_start_matches('<').trim_end_matches('>');
    match uri.split_once("//") {
        Some((_, rest)) => rest,
        None => uri.split_once(':').map_or(uri, |(_, rest)| rest),
    }
}

fn uri_stem(uri: &str) -> String {
    let rest = without_scheme(uri);
    match rest.rsplit_once('/') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        // Host only (or nothing before the slash): keep what there is
        _ => rest.trim_matches('/').to_string(),
    }
}

/// Final path segment of a URI, without query or fragment.
fn uri_file_name(uri: &str) -> Option<String> {
    let rest = without_scheme(uri);
    let path = rest.split(['?', '#']).next().unwrap_or(rest);
    let (_, last) = path.rsplit_once('/')?;
    (!last.is_empty()).then(|| paths::transient_file_name(last))
}

/// `filename` parameter of a Content-Disposition value.
pub fn content_disposition_filename(value: &str) -> Option<String> {
    value.split(';').find_map(|param| {
        let (key, val) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let val = val.trim().trim_matches('"');
        (!val.is_empty()).then(|| val.to_string())
    })
}

/// Decodes HTTP/1.1 chunked transfer encoding. Trailers are left unread.
struct ChunkedReader<R> {
    inner: R,
    remaining: u64,
    started: bool,
    done: bool,
}

impl<R: BufRead> ChunkedReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            remaining: 0,
            started: false,
            done: false,
        }
    }

    fn next_chunk_size(&mut self) -> io::Result<u64> {
        if self.started {
            // CRLF after the previous chunk's data
            read_line(&mut self.inner)?;
        }
        self.started = true;

        let line = read_line(&mut self.inner)?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "missing chunk size"))?;
        let size = strip_eol(&line).split(';').next().unwrap_or_default().trim();
        u64::from_str_radix(size, 16).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                WebArchiveError::BadChunk(size.to_string()),
            )
        })
    }
}

impl<R: BufRead> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        if self.remaining == 0 {
            let size = self.next_chunk_size()?;
            if size == 0 {
                self.done = true;
                return Ok(0);
            }
            self.remaining = size;
        }

        let limit = self.remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..limit])?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunk"));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::tempdir;

    fn warc_record(headers: &[(&str, &str)], block: &[u8]) -> Vec<u8> {
        let mut out = b"WARC/1.0\r\n".to_vec();
        for (name, value) in headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", block.len()).as_bytes());
        out.extend_from_slice(block);
        out.extend_from_slice(b"\r\n\r\n");
        out
    }

    fn http_response(headers: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 200 OK\r\n{}\r\n", headers).into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn walk_all(path: &Path, scratch: &ScratchSpace) -> Result<(Vec<(String, Vec<u8>)>, usize)> {
        let mut seen = Vec::new();
        let mut failures = 0;
        let mut reader = WebArchiveReader::open(path)?;
        reader.walk(scratch, &mut |item| match item {
            Ok(entry) => {
                assert!(entry.size_compressed.is_none());
                seen.push((entry.name.clone(), std::fs::read(&entry.path).unwrap()));
            }
            Err(_) => failures += 1,
        })?;
        Ok((seen, failures))
    }

    #[rstest]
    #[case(Some("http://example.com/x/y.bin"), Some("z.bin"), "example.com/xcd-z.bin")]
    #[case(Some("http://example.com/x/y.bin"), None, "example.com/x")]
    #[case(Some("https://example.com/"), None, "example.com")]
    #[case(Some("https://example.com"), None, "example.com")]
    #[case(Some("<http://example.com/a/b>"), None, "example.com/a")]
    #[case(Some("dns:example.com"), None, "example.com")]
    #[case(None, None, "record-7")]
    #[case(Some("  "), Some("f.bin"), "record-7cd-f.bin")]
    fn test_record_name(#[case] uri: Option<&str>, #[case] filename: Option<&str>, #[case] expected: &str) {
        assert_eq!(record_name(uri, filename, 7), expected);
    }

    #[rstest]
    #[case("attachment; filename=\"z.bin\"", Some("z.bin"))]
    #[case("filename=\"z.bin\";", Some("z.bin"))]
    #[case("inline; FILENAME=plain.txt", Some("plain.txt"))]
    #[case("attachment", None)]
    #[case("attachment; filename=\"\"", None)]
    fn test_content_disposition_filename(#[case] value: &str, #[case] expected: Option<&str>) {
        assert_eq!(content_disposition_filename(value).as_deref(), expected);
    }

    #[test]
    fn test_only_response_records_extracted() -> Result<()> {
        let mut data = warc_record(&[("WARC-Type", "warcinfo")], b"software: test\r\n");
        data.extend(warc_record(
            &[
                ("WARC-Type", "request"),
                ("WARC-Target-URI", "http://example.com/x/y.bin"),
            ],
            b"GET /x/y.bin HTTP/1.1\r\n\r\n",
        ));
        data.extend(warc_record(
            &[
                ("WARC-Type", "response"),
                ("WARC-Target-URI", "http://example.com/x/y.bin"),
                ("Content-Disposition", "filename=\"z.bin\""),
                ("Content-Type", "application/http; msgtype=response"),
            ],
            &http_response("Content-Type: application/octet-stream\r\n", b"payload"),
        ));
        data.extend(warc_record(
            &[("WARC-Type", "metadata"), ("WARC-Target-URI", "http://example.com/x/y.bin")],
            b"via: test\r\n",
        ));

        let dir = tempdir()?;
        let path = dir.path().join("capture.warc");
        std::fs::write(&path, data)?;

        let (seen, failures) = walk_all(&path, &ScratchSpace::in_dir(dir.path()))?;
        assert_eq!(failures, 0);
        assert_eq!(seen, vec![("example.com/xcd-z.bin".to_string(), b"payload".to_vec())]);
        Ok(())
    }

    #[test]
    fn test_chunked_gzip_body_in_gzipped_warc() -> Result<()> {
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(b"compressed body")?;
        let encoded = gz.finish()?;

        let mut chunked = format!("{:x}\r\n", 4).into_bytes();
        chunked.extend_from_slice(&encoded[..4]);
        chunked.extend_from_slice(format!("\r\n{:x};ext=1\r\n", encoded.len() - 4).as_bytes());
        chunked.extend_from_slice(&encoded[4..]);
        chunked.extend_from_slice(b"\r\n0\r\n\r\n");

        let block = http_response(
            "Transfer-Encoding: chunked\r\nContent-Encoding: gzip\r\nContent-Disposition: attachment; filename=\"doc.txt\"\r\n",
            &chunked,
        );
        let record = warc_record(
            &[("WARC-Type", "response"), ("WARC-Target-URI", "http://host/dir/get")],
            &block,
        );

        // One gzip member per record, as in .warc.gz files
        let mut file_bytes = Vec::new();
        for part in [record.clone(), record] {
            let mut member = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            member.write_all(&part)?;
            file_bytes.extend(member.finish()?);
        }

        let dir = tempdir()?;
        let path = dir.path().join("capture.warc.gz");
        std::fs::write(&path, file_bytes)?;

        let (seen, failures) = walk_all(&path, &ScratchSpace::in_dir(dir.path()))?;
        assert_eq!(failures, 0);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "host/dircd-doc.txt");
        assert_eq!(seen[0].1, b"compressed body");
        Ok(())
    }

    #[test]
    fn test_arc_records() -> Result<()> {
        let version_block = b"1 0 test\nURL IP-address Archive-date Content-type Archive-length\n";
        let body = b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nhello arc";

        let mut data = format!(
            "filedesc://test.arc 0.0.0.0 20240101000000 text/plain {}\n",
            version_block.len()
        )
        .into_bytes();
        data.extend_from_slice(version_block);
        data.extend_from_slice(b"\n");
        data.extend_from_slice(
            format!("http://example.org/files/a.txt 10.0.0.1 20240101000001 text/plain {}\n", body.len()).as_bytes(),
        );
        data.extend_from_slice(body);
        data.extend_from_slice(b"\n");

        let dir = tempdir()?;
        let path = dir.path().join("old.arc");
        std::fs::write(&path, data)?;

        let (seen, failures) = walk_all(&path, &ScratchSpace::in_dir(dir.path()))?;
        assert_eq!(failures, 0);
        assert_eq!(seen, vec![("example.org/files".to_string(), b"hello arc".to_vec())]);
        Ok(())
    }

    #[test]
    fn test_malformed_header_lines_degrade() -> Result<()> {
        let mut data = b"WARC/1.0\r\nWARC-Type: response\r\nthis line has no colon\r\n".to_vec();
        data.extend_from_slice(b"Content-Length: 3\r\n\r\nabc\r\n\r\n");

        let dir = tempdir()?;
        let path = dir.path().join("odd.warc");
        std::fs::write(&path, data)?;

        let (seen, failures) = walk_all(&path, &ScratchSpace::in_dir(dir.path()))?;
        assert_eq!(failures, 0);
        assert_eq!(seen, vec![("record-1".to_string(), b"abc".to_vec())]);
        Ok(())
    }

    #[test]
    fn test_folded_fields_lowercase_names_and_bare_lf() -> Result<()> {
        let mut data = b"WARC/1.1\nwarc-type: response\ncontent-disposition: attachment;\n\tfilename=\"folded.bin\"\n".to_vec();
        data.extend_from_slice(b"content-length: 4\n\nbody\n\n");
        data.extend(warc_record(&[("WARC-Type", "response")], b"next"));

        let dir = tempdir()?;
        let path = dir.path().join("lenient.warc");
        std::fs::write(&path, data)?;

        let (seen, failures) = walk_all(&path, &ScratchSpace::in_dir(dir.path()))?;
        assert_eq!(failures, 0);
        assert_eq!(
            seen,
            vec![
                ("record-1cd-folded.bin".to_string(), b"body".to_vec()),
                ("record-2".to_string(), b"next".to_vec()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_missing_length_stops_enumeration() -> Result<()> {
        let mut data = warc_record(
            &[("WARC-Type", "response"), ("WARC-Target-URI", "http://a.example/one/1.bin")],
            b"first",
        );
        data.extend_from_slice(b"WARC/1.0\r\nWARC-Type: response\r\n\r\nlost");

        let dir = tempdir()?;
        let path = dir.path().join("cut.warc");
        std::fs::write(&path, data)?;

        let mut seen = Vec::new();
        let mut reader = WebArchiveReader::open(&path)?;
        let result = reader.walk(&ScratchSpace::in_dir(dir.path()), &mut |item| {
            seen.push(item.map(|e| e.name.clone()).ok());
        });

        assert_eq!(seen, vec![Some("a.example/one".to_string())]);
        let err = result.unwrap_err();
        assert!(err.chain().any(|cause| cause.to_string().contains("Content-Length")));
        Ok(())
    }

    #[test]
    fn test_chunked_reader_rejects_bad_size() {
        let mut reader = ChunkedReader::new(&b"zz\r\nabc\r\n0\r\n\r\n"[..]);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
