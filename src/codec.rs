//! HTTP/1.1 message framing over any `AsyncRead`/`AsyncWrite` stream.
//!
//! Heads are parsed with `httparse` straight out of a connection-owned
//! [`BytesMut`]; bodies are framed by `Content-Length`, chunked transfer
//! coding, or (responses only) connection close. Messages surface as
//! `http::Request<String>` / `http::Response<String>`.

use bytes::{Buf, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SiestaError};

/// httparse needs a preallocated header array of this size.
pub const MAX_HEADERS: usize = 64;

/// Read chunk size for the connection buffer.
const READ_CHUNK: usize = 8 * 1024;

/// Size limits applied while decoding one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: 16 * 1024,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Empty,
    Length(usize),
    Chunked,
    UntilEof,
}

/// Read one request from `io`.
///
/// Bytes already in `buf` are consumed first and anything read past the end
/// of the message stays in `buf` for the next call, so a connection can carry
/// any number of requests.
///
/// # Errors
///
/// `EndOfStream` if the peer closed the connection before sending any byte of
/// a new request; `Protocol` for malformed or oversized messages; `Io` for
/// transport failures, including EOF in the middle of a message.
pub async fn read_request<R>(
    io: &mut R,
    buf: &mut BytesMut,
    limits: &Limits,
) -> Result<Request<String>>
where
    R: AsyncRead + Unpin,
{
    let head = loop {
        if let Some((head, consumed)) = parse_request_head(buf)? {
            ensure_head_room(consumed, limits)?;
            buf.advance(consumed);
            break head;
        }
        ensure_head_room(buf.len(), limits)?;
        fill_head(io, buf).await?;
    };

    let kind = match body_kind(head.headers())? {
        BodyKind::UntilEof => BodyKind::Empty,
        kind => kind,
    };
    let body = read_body(io, buf, kind, limits).await?;
    Ok(head.map(|()| body))
}

/// Read the response to a `method` request from `io`. See [`read_request`]
/// for buffering. Responses to `HEAD` never carry a body, whatever their
/// `Content-Length` says.
///
/// # Errors
///
/// As [`read_request`].
pub async fn read_response<R>(
    io: &mut R,
    buf: &mut BytesMut,
    method: &Method,
    limits: &Limits,
) -> Result<Response<String>>
where
    R: AsyncRead + Unpin,
{
    let head = loop {
        if let Some((head, consumed)) = parse_response_head(buf)? {
            ensure_head_room(consumed, limits)?;
            buf.advance(consumed);
            break head;
        }
        ensure_head_room(buf.len(), limits)?;
        fill_head(io, buf).await?;
    };

    let status = head.status();
    let kind = if *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        BodyKind::Empty
    } else {
        body_kind(head.headers())?
    };
    let body = read_body(io, buf, kind, limits).await?;
    Ok(head.map(|()| body))
}

/// Serialize `req` onto `io`. `Content-Length` is always derived from the
/// body; any `Transfer-Encoding` header is dropped.
///
/// # Errors
///
/// `Io` if the write fails.
pub async fn write_request<W>(io: &mut W, req: &Request<String>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let target = req
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let mut out = Vec::with_capacity(256 + req.body().len());
    out.extend_from_slice(req.method().as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.as_bytes());
    out.push(b' ');
    out.extend_from_slice(version_str(req.version()).as_bytes());
    out.extend_from_slice(b"\r\n");
    encode_headers(&mut out, req.headers(), req.body().len());
    out.extend_from_slice(req.body().as_bytes());

    io.write_all(&out).await?;
    io.flush().await?;
    Ok(())
}

/// Serialize the response to a `method` request onto `io`. Same header rules
/// as [`write_request`]; for `HEAD` the `Content-Length` of the body is sent
/// but the body itself is not.
///
/// # Errors
///
/// `Io` if the write fails.
pub async fn write_response<W>(io: &mut W, res: &Response<String>, method: &Method) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let status = res.status();
    let mut out = Vec::with_capacity(256 + res.body().len());
    out.extend_from_slice(version_str(res.version()).as_bytes());
    out.push(b' ');
    out.extend_from_slice(status.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(status.canonical_reason().unwrap_or("").as_bytes());
    out.extend_from_slice(b"\r\n");
    encode_headers(&mut out, res.headers(), res.body().len());
    if *method != Method::HEAD {
        out.extend_from_slice(res.body().as_bytes());
    }

    io.write_all(&out).await?;
    io.flush().await?;
    Ok(())
}

/// Whether the sender of a message with these headers wants the connection
/// closed after it.
#[must_use]
pub fn wants_close(version: Version, headers: &HeaderMap) -> bool {
    let connection = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim);
    let mut close = false;
    let mut keep_alive = false;
    for token in connection {
        close |= token.eq_ignore_ascii_case("close");
        keep_alive |= token.eq_ignore_ascii_case("keep-alive");
    }
    close || (version == Version::HTTP_10 && !keep_alive)
}

fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    }
}

fn encode_headers(out: &mut Vec<u8>, headers: &HeaderMap, body_len: usize) {
    for (name, value) in headers {
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"content-length: ");
    out.extend_from_slice(body_len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n\r\n");
}

fn parse_version(version: Option<u8>) -> Version {
    match version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn protocol(err: impl std::fmt::Display) -> SiestaError {
    SiestaError::Protocol(err.to_string())
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for header in raw {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(protocol)?;
        let value = HeaderValue::from_bytes(header.value).map_err(protocol)?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn parse_request_head(buf: &[u8]) -> Result<Option<(Request<()>, usize)>> {
    let mut raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut raw);
    let consumed = match req.parse(buf).map_err(protocol)? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    let method = Method::from_bytes(req.method.unwrap_or("GET").as_bytes()).map_err(protocol)?;
    let mut head = Request::builder()
        .method(method)
        .uri(req.path.unwrap_or("/"))
        .version(parse_version(req.version))
        .body(())
        .map_err(protocol)?;
    *head.headers_mut() = collect_headers(req.headers)?;
    Ok(Some((head, consumed)))
}

fn parse_response_head(buf: &[u8]) -> Result<Option<(Response<()>, usize)>> {
    let mut raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut raw);
    let consumed = match res.parse(buf).map_err(protocol)? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Ok(None),
    };

    let status = StatusCode::from_u16(res.code.unwrap_or(0)).map_err(protocol)?;
    let mut head = Response::builder()
        .status(status)
        .version(parse_version(res.version))
        .body(())
        .map_err(protocol)?;
    *head.headers_mut() = collect_headers(res.headers)?;
    Ok(Some((head, consumed)))
}

fn body_kind(headers: &HeaderMap) -> Result<BodyKind> {
    let chunked = headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return Ok(BodyKind::Chunked);
    }

    match headers.get(CONTENT_LENGTH) {
        Some(value) => {
            let len = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .ok_or_else(|| SiestaError::Protocol("invalid content-length".into()))?;
            Ok(if len == 0 {
                BodyKind::Empty
            } else {
                BodyKind::Length(len)
            })
        }
        None => Ok(BodyKind::UntilEof),
    }
}

fn ensure_head_room(len: usize, limits: &Limits) -> Result<()> {
    if len > limits.max_header_bytes {
        return Err(SiestaError::Protocol(format!(
            "message head exceeds {} bytes",
            limits.max_header_bytes
        )));
    }
    Ok(())
}

fn ensure_body_room(len: usize, limits: &Limits) -> Result<()> {
    if len > limits.max_body_bytes {
        return Err(SiestaError::Protocol(format!(
            "message body exceeds {} bytes",
            limits.max_body_bytes
        )));
    }
    Ok(())
}

async fn fill<R>(io: &mut R, buf: &mut BytesMut) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    buf.reserve(READ_CHUNK);
    Ok(io.read_buf(buf).await?)
}

/// Read more of a message head. A clean EOF before any byte arrived is the
/// peer ending the connection; anywhere else it truncates a message.
async fn fill_head<R>(io: &mut R, buf: &mut BytesMut) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    if fill(io, buf).await? == 0 {
        return Err(if buf.is_empty() {
            SiestaError::EndOfStream
        } else {
            truncated()
        });
    }
    Ok(())
}

fn truncated() -> SiestaError {
    SiestaError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed mid-message",
    ))
}

async fn fill_exact<R>(io: &mut R, buf: &mut BytesMut, len: usize) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    while buf.len() < len {
        if fill(io, buf).await? == 0 {
            return Err(truncated());
        }
    }
    Ok(())
}

async fn read_body<R>(
    io: &mut R,
    buf: &mut BytesMut,
    kind: BodyKind,
    limits: &Limits,
) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let bytes = match kind {
        BodyKind::Empty => return Ok(String::new()),
        BodyKind::Length(len) => {
            ensure_body_room(len, limits)?;
            fill_exact(io, buf, len).await?;
            buf.split_to(len)
        }
        BodyKind::UntilEof => {
            while fill(io, buf).await? != 0 {
                ensure_body_room(buf.len(), limits)?;
            }
            buf.split()
        }
        BodyKind::Chunked => read_chunked(io, buf, limits).await?,
    };
    String::from_utf8(bytes.to_vec())
        .map_err(|_| SiestaError::Protocol("body is not valid UTF-8".into()))
}

async fn read_chunked<R>(io: &mut R, buf: &mut BytesMut, limits: &Limits) -> Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    let mut body = BytesMut::new();
    loop {
        let (consumed, size) = loop {
            match httparse::parse_chunk_size(buf).map_err(|_| protocol("invalid chunk size"))? {
                httparse::Status::Complete((consumed, size)) => break (consumed, size),
                httparse::Status::Partial => {
                    if fill(io, buf).await? == 0 {
                        return Err(truncated());
                    }
                }
            }
        };
        buf.advance(consumed);

        let size = usize::try_from(size).map_err(|_| protocol("chunk too large"))?;
        if size == 0 {
            skip_trailers(io, buf).await?;
            return Ok(body);
        }

        ensure_body_room(body.len().saturating_add(size), limits)?;
        fill_exact(io, buf, size + 2).await?;
        body.extend_from_slice(&buf[..size]);
        if &buf[size..size + 2] != b"\r\n" {
            return Err(protocol("chunk missing trailing CRLF"));
        }
        buf.advance(size + 2);
    }
}

/// Discard trailer fields up to and including the terminating empty line.
async fn skip_trailers<R>(io: &mut R, buf: &mut BytesMut) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        match buf.windows(2).position(|w| w == b"\r\n") {
            Some(0) => {
                buf.advance(2);
                return Ok(());
            }
            Some(end) => buf.advance(end + 2),
            None => {
                if fill(io, buf).await? == 0 {
                    return Err(truncated());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::HOST;

    async fn decode_request(raw: &[u8]) -> Result<Request<String>> {
        let mut io = raw;
        let mut buf = BytesMut::new();
        read_request(&mut io, &mut buf, &Limits::default()).await
    }

    #[tokio::test]
    async fn test_read_request_with_length() {
        let raw = b"POST /v1/echo?x=1 HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhello";
        let req = decode_request(raw).await.unwrap();
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri().path(), "/v1/echo");
        assert_eq!(req.uri().query(), Some("x=1"));
        assert_eq!(req.headers()[HOST], "a");
        assert_eq!(req.body(), "hello");
    }

    #[tokio::test]
    async fn test_pipelined_requests_share_buffer() {
        let mut io: &[u8] = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let mut buf = BytesMut::new();
        let limits = Limits::default();
        let first = read_request(&mut io, &mut buf, &limits).await.unwrap();
        let second = read_request(&mut io, &mut buf, &limits).await.unwrap();
        assert_eq!(first.uri().path(), "/a");
        assert_eq!(second.uri().path(), "/b");
        assert!(matches!(
            read_request(&mut io, &mut buf, &limits).await,
            Err(SiestaError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn test_truncated_head_is_not_clean_eof() {
        let err = decode_request(b"GET /a HTTP/1.1\r\nHo").await.unwrap_err();
        assert!(matches!(
            err,
            SiestaError::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof
        ));
        assert!(err.is_peer_closed());
    }

    #[tokio::test]
    async fn test_chunked_response() {
        let mut io: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
            4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nX-Trailer: 1\r\n\r\n";
        let mut buf = BytesMut::new();
        let res = read_response(&mut io, &mut buf, &Method::GET, &Limits::default()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), "Wikipedia");
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_response_until_eof_and_no_content() {
        let mut io: &[u8] = b"HTTP/1.0 200 OK\r\n\r\nall of it";
        let mut buf = BytesMut::new();
        let res = read_response(&mut io, &mut buf, &Method::GET, &Limits::default()).await.unwrap();
        assert_eq!(res.version(), Version::HTTP_10);
        assert_eq!(res.body(), "all of it");

        let mut io: &[u8] = b"HTTP/1.1 204 No Content\r\n\r\n";
        let mut buf = BytesMut::new();
        let res = read_response(&mut io, &mut buf, &Method::GET, &Limits::default()).await.unwrap();
        assert!(res.body().is_empty());
    }

    #[tokio::test]
    async fn test_limits_enforced() {
        let limits = Limits {
            max_header_bytes: 32,
            max_body_bytes: 4,
        };
        let mut io: &[u8] = b"GET / HTTP/1.1\r\nX-Long: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n\r\n";
        let mut buf = BytesMut::new();
        assert!(matches!(
            read_request(&mut io, &mut buf, &limits).await,
            Err(SiestaError::Protocol(_))
        ));

        let mut io: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let mut buf = BytesMut::new();
        assert!(matches!(
            read_request(&mut io, &mut buf, &limits).await,
            Err(SiestaError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_write_response_sets_length() {
        let mut res = Response::new("{\"ok\":true}".to_string());
        res.headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from_static("999"));
        let mut out = Vec::new();
        write_response(&mut out, &res, &Method::GET).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-length: 11\r\n"));
        assert!(!text.contains("999"));
        assert!(text.ends_with("\r\n\r\n{\"ok\":true}"));
    }

    #[tokio::test]
    async fn test_head_response_has_no_body() {
        // Content-Length describes the body a GET would have received.
        let mut io: &[u8] =
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n";
        let mut buf = BytesMut::new();
        let limits = Limits::default();
        let head = read_response(&mut io, &mut buf, &Method::HEAD, &limits)
            .await
            .unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(head.headers()[CONTENT_LENGTH], "5");
        assert!(head.body().is_empty());

        // The next response on the connection is framed correctly.
        let next = read_response(&mut io, &mut buf, &Method::GET, &limits)
            .await
            .unwrap();
        assert_eq!(next.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_write_head_response_omits_body() {
        let res = Response::new("hello".to_string());
        let mut out = Vec::new();
        write_response(&mut out, &res, &Method::HEAD).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("content-length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
        assert!(!text.contains("hello"));
    }

    #[tokio::test]
    async fn test_write_request_uses_origin_form() {
        let req = Request::builder()
            .uri("http://example.com/v1/echo?message=hi")
            .body(String::new())
            .unwrap();
        let mut out = Vec::new();
        write_request(&mut out, &req).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("GET /v1/echo?message=hi HTTP/1.1\r\n"));
    }

    #[test]
    fn test_wants_close() {
        let mut headers = HeaderMap::new();
        assert!(!wants_close(Version::HTTP_11, &headers));
        assert!(wants_close(Version::HTTP_10, &headers));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        assert!(!wants_close(Version::HTTP_10, &headers));
        headers.insert(CONNECTION, HeaderValue::from_static("Close"));
        assert!(wants_close(Version::HTTP_11, &headers));
    }
}
