//! Wire format of the control socket.
//!
//! A request is a sequence of NUL-terminated tokens: the program name, the
//! service name, then the service's arguments. The client half-closes its
//! end once the request is written. The reply is a little-endian `i32`
//! status code followed by the raw output bytes.

use thiserror::Error;

/// Token 0 of every request.
pub const PROGRAM_NAME: &str = "appgrid";

/// Upper bound for a request, and for the output of a reply.
pub const MAX_MESSAGE_LEN: usize = 128 * 1024;

/// Service used when a request names none.
pub const DEFAULT_SERVICE: &str = "usage";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message exceeds {} bytes", MAX_MESSAGE_LEN)]
    TooLarge,

    #[error("request contains no tokens")]
    Empty,

    #[error("request token {0} is not valid UTF-8")]
    NotUtf8(usize),

    #[error("reply is {0} bytes, shorter than its status code")]
    ShortReply(usize),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Reply status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReplyCode {
    Ok = 0,
    Usage = 1,
    ServiceError = 2,
}

impl ReplyCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Unknown codes read as `ServiceError`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ReplyCode::Ok,
            1 => ReplyCode::Usage,
            _ => ReplyCode::ServiceError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub service: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: ReplyCode,
    pub output: Vec<u8>,
}

impl Reply {
    pub fn new(code: ReplyCode, output: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            output: output.into(),
        }
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Encode `service` and its arguments, prefixed with [`PROGRAM_NAME`].
pub fn encode_request<S: AsRef<str>>(tokens: &[S]) -> Vec<u8> {
    let mut buf = Vec::new();
    for token in std::iter::once(PROGRAM_NAME).chain(tokens.iter().map(|t| t.as_ref())) {
        buf.extend_from_slice(token.as_bytes());
        buf.push(0);
    }
    buf
}

/// Parse a request. Bytes after the last NUL are not a token and are ignored.
pub fn parse_request(bytes: &[u8]) -> ProtocolResult<Request> {
    if bytes.len() > MAX_MESSAGE_LEN {
        return Err(ProtocolError::TooLarge);
    }
    let mut tokens = Vec::new();
    let mut rest = bytes;
    while let Some(end) = rest.iter().position(|&b| b == 0) {
        let token = std::str::from_utf8(&rest[..end])
            .map_err(|_| ProtocolError::NotUtf8(tokens.len()))?;
        tokens.push(token.to_string());
        rest = &rest[end + 1..];
    }
    if tokens.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let mut tokens = tokens.into_iter().skip(1);
    Ok(Request {
        service: tokens.next().unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
        args: tokens.collect(),
    })
}

/// Encode a reply, truncating output to [`MAX_MESSAGE_LEN`].
pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    let output = &reply.output[..reply.output.len().min(MAX_MESSAGE_LEN)];
    let mut buf = Vec::with_capacity(4 + output.len());
    buf.extend_from_slice(&reply.code.code().to_le_bytes());
    buf.extend_from_slice(output);
    buf
}

pub fn decode_reply(bytes: &[u8]) -> ProtocolResult<Reply> {
    let Some((code, output)) = bytes.split_first_chunk::<4>() else {
        return Err(ProtocolError::ShortReply(bytes.len()));
    };
    Ok(Reply {
        code: ReplyCode::from_code(i32::from_le_bytes(*code)),
        output: output.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout() {
        let bytes = encode_request(&["app-manager", "install", "tech.appgrid.web", "1.0"]);
        assert_eq!(
            bytes,
            b"appgrid\0app-manager\0install\0tech.appgrid.web\01.0\0".to_vec()
        );
        let request = parse_request(&bytes).unwrap();
        assert_eq!(request.service, "app-manager");
        assert_eq!(request.args, vec!["install", "tech.appgrid.web", "1.0"]);
    }

    #[test]
    fn empty_tokens_are_kept() {
        let request = parse_request(b"appgrid\0jobs\0\0list\0").unwrap();
        assert_eq!(request.args, vec!["", "list"]);
    }

    #[test]
    fn program_name_alone_means_usage() {
        let request = parse_request(b"appgrid\0").unwrap();
        assert_eq!(request.service, DEFAULT_SERVICE);
        assert!(request.args.is_empty());
    }

    #[test]
    fn malformed_requests() {
        assert_eq!(parse_request(b""), Err(ProtocolError::Empty));
        assert_eq!(parse_request(b"appgrid"), Err(ProtocolError::Empty));
        assert_eq!(
            parse_request(b"appgrid\0\xff\0"),
            Err(ProtocolError::NotUtf8(1))
        );
        let huge = vec![b'a'; MAX_MESSAGE_LEN + 1];
        assert_eq!(parse_request(&huge), Err(ProtocolError::TooLarge));
    }

    #[test]
    fn trailing_bytes_without_nul_are_ignored() {
        let request = parse_request(b"appgrid\0help\0dangling").unwrap();
        assert_eq!(request.service, "help");
        assert!(request.args.is_empty());
    }

    #[test]
    fn reply_layout() {
        let reply = Reply::new(ReplyCode::ServiceError, "boom");
        let bytes = encode_reply(&reply);
        assert_eq!(&bytes[..4], &[2, 0, 0, 0]);
        assert_eq!(&bytes[4..], b"boom");
        assert_eq!(decode_reply(&bytes).unwrap(), reply);
    }

    #[test]
    fn reply_edge_cases() {
        assert_eq!(decode_reply(&[0, 0]), Err(ProtocolError::ShortReply(2)));
        let reply = decode_reply(&[0, 0, 0, 0]).unwrap();
        assert_eq!(reply.code, ReplyCode::Ok);
        assert!(reply.output.is_empty());
        assert_eq!(
            decode_reply(&(-1i32).to_le_bytes()).unwrap().code,
            ReplyCode::ServiceError
        );

        let big = Reply::new(ReplyCode::Ok, vec![b'x'; MAX_MESSAGE_LEN + 10]);
        assert_eq!(encode_reply(&big).len(), 4 + MAX_MESSAGE_LEN);
    }
}
