//! Plain-HTTP directory fetches: GET
//! a compressed document from a directory authority's dir port,
//! decompress it, retry against a different authority on failure.
//!
//! Requests are hand-encoded HTTP/1.0 (as real Tor directory caches
//! expect), built with [`http::Request`] and parsed back with
//! [`httparse`] rather than pulling in a full client stack — the same
//! split the reference client uses, since a directory fetch is a single
//! unpipelined request/response with no redirects, cookies, or TLS.

use crate::authorities::{shuffled_authorities, DirAuthority};
use crate::retry::RetryBudget;
use crate::{Error, Result};
use std::io::Read;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Maximum response body this client will buffer (16 MiB, matching the
/// reference client's own ceiling on a single directory document).
const MAX_RESPONSE_LEN: usize = 16 * 1024 * 1024;

pub(crate) fn encode_request(req: &http::Request<()>) -> String {
    use std::fmt::Write;
    let mut s = format!("{} {} HTTP/1.0\r\n", req.method(), req.uri());
    for (key, val) in req.headers().iter() {
        let _ = writeln!(s, "{}: {}\r", key, val.to_str().unwrap_or_default());
    }
    s.push_str("\r\n");
    s
}

pub(crate) struct HeaderStatus {
    pub(crate) status: u16,
    pub(crate) encoding: Option<String>,
    pub(crate) body_start: usize,
}

pub(crate) fn parse_headers(buf: &[u8]) -> Result<Option<HeaderStatus>> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(buf).map_err(|_| Error::BadResponse("malformed HTTP headers"))? {
        httparse::Status::Partial => Ok(None),
        httparse::Status::Complete(body_start) => {
            let status = response.code.ok_or(Error::BadResponse("missing status code"))?;
            let encoding = response
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("Content-Encoding"))
                .map(|h| String::from_utf8_lossy(h.value).into_owned());
            Ok(Some(HeaderStatus { status, encoding, body_start }))
        }
    }
}

/// Issue a GET for `path` against `stream` and return the decompressed
/// response body.
async fn fetch_over(stream: &mut TcpStream, path: &str) -> Result<Vec<u8>> {
    let req = http::Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", "dirauth")
        .header("Connection", "close")
        .body(())
        .map_err(|_| Error::BadResponse("could not build request"))?;
    stream.write_all(encode_request(&req).as_bytes()).await?;
    stream.flush().await?;

    let mut raw = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let header = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::BadResponse("connection closed before headers completed"));
        }
        raw.extend_from_slice(&chunk[..n]);
        if let Some(h) = parse_headers(&raw)? {
            break h;
        }
        if raw.len() > 16384 {
            return Err(Error::BadResponse("response headers too large"));
        }
    };

    if header.status != 200 {
        return Err(Error::BadResponse("directory server returned non-200 status"));
    }

    let mut body = raw.split_off(header.body_start);
    loop {
        if body.len() > MAX_RESPONSE_LEN {
            return Err(Error::BadResponse("response body exceeded the size limit"));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    decompress(&body, header.encoding.as_deref())
}

pub(crate) fn decompress(body: &[u8], encoding: Option<&str>) -> Result<Vec<u8>> {
    match encoding {
        Some(enc) if enc.eq_ignore_ascii_case("deflate") => {
            let mut out = Vec::new();
            flate2::read::DeflateDecoder::new(body).read_to_end(&mut out).map_err(|_| Error::Compression)?;
            Ok(out)
        }
        Some(enc) if enc.eq_ignore_ascii_case("gzip") => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(body).read_to_end(&mut out).map_err(|_| Error::Compression)?;
            Ok(out)
        }
        _ => Ok(body.to_vec()),
    }
}

async fn dial(authority: &DirAuthority) -> Result<TcpStream> {
    Ok(TcpStream::connect(authority.dir_addr()).await?)
}

/// Fetch and return the current consensus's decompressed text,
/// retrying against different authorities up to [`crate::retry::RETRY_DEFAULT`] times.
pub async fn fetch_consensus() -> Result<String> {
    let mut rng = rand::thread_rng();
    let candidates = shuffled_authorities(&mut rng);
    fetch_consensus_from(&candidates).await
}

/// As [`fetch_consensus`], but against a caller-supplied authority list
/// rather than the embedded [`crate::authorities::AUTHORITIES`] set.
pub async fn fetch_consensus_from(candidates: &[&DirAuthority]) -> Result<String> {
    let mut budget = RetryBudget::default_budget();
    let mut last_err = Error::DirectoryUnavailable;

    for authority in candidates.iter().copied() {
        if !budget.attempt() {
            break;
        }
        match try_fetch_consensus(authority).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                tracing::debug!(authority = authority.nickname, error = ?e, "consensus fetch failed");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

async fn try_fetch_consensus(authority: &DirAuthority) -> Result<String> {
    let mut stream = dial(authority).await?;
    let body = fetch_over(&mut stream, "/tor/status-vote/current/authority.z").await?;
    String::from_utf8(body).map_err(|_| Error::BadResponse("consensus body was not valid UTF-8"))
}

/// Fetch router descriptors for the given fingerprints, batching at
/// most 512 per request (the reference server's own per-request limit)
/// and retrying each batch against a different authority on failure.
pub async fn fetch_descriptor_batches(fingerprints: &[[u8; 20]]) -> Result<std::collections::HashMap<[u8; 20], garlic_netdoc::routerdesc::ParsedDescriptorExtra>> {
    const BATCH_SIZE: usize = 512;
    let mut rng = rand::thread_rng();
    let mut out = std::collections::HashMap::new();

    for chunk in fingerprints.chunks(BATCH_SIZE) {
        let path = format!("/tor/server/fp/{}.z", chunk.iter().map(hex::encode_upper).collect::<Vec<_>>().join("+"));
        let candidates = shuffled_authorities(&mut rng);
        let mut budget = RetryBudget::default_budget();
        let mut fetched = false;
        let mut last_err = Error::DirectoryUnavailable;

        for authority in candidates {
            if !budget.attempt() {
                break;
            }
            match try_fetch_descriptors(authority, &path).await {
                Ok(batch) => {
                    out.extend(batch);
                    fetched = true;
                    break;
                }
                Err(e) => {
                    tracing::debug!(authority = authority.nickname, error = ?e, "descriptor batch fetch failed");
                    last_err = e;
                }
            }
        }
        if !fetched {
            return Err(last_err);
        }
    }
    Ok(out)
}

async fn try_fetch_descriptors(authority: &DirAuthority, path: &str) -> Result<std::collections::HashMap<[u8; 20], garlic_netdoc::routerdesc::ParsedDescriptorExtra>> {
    let mut stream = dial(authority).await?;
    let body = fetch_over(&mut stream, path).await?;
    let text = String::from_utf8(body).map_err(|_| Error::BadResponse("descriptor body was not valid UTF-8"))?;
    Ok(garlic_netdoc::routerdesc::parse_batch(&text)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_request_matches_http_1_0_wire_format() {
        let req = http::Request::builder().method("GET").uri("/tor/status-vote/current/authority.z").body(()).unwrap();
        let encoded = encode_request(&req);
        assert!(encoded.starts_with("GET /tor/status-vote/current/authority.z HTTP/1.0\r\n"));
        assert!(encoded.ends_with("\r\n\r\n"));
    }

    #[test]
    fn parse_headers_reports_partial_until_double_crlf() {
        let partial = b"HTTP/1.0 200 OK\r\nContent-Encoding: deflate\r\n";
        assert!(parse_headers(partial).unwrap().is_none());
        let complete = b"HTTP/1.0 200 OK\r\nContent-Encoding: deflate\r\n\r\nbody-bytes";
        let header = parse_headers(complete).unwrap().unwrap();
        assert_eq!(header.status, 200);
        assert_eq!(header.encoding.as_deref(), Some("deflate"));
    }

    #[test]
    fn decompress_passes_through_when_no_encoding_is_given() {
        let body = b"plain text".to_vec();
        assert_eq!(decompress(&body, None).unwrap(), body);
    }
}
