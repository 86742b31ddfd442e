//! Request classification and field extraction.

use crate::protocol::framing::next_token;
use thiserror::Error;

/// Errors found while parsing the fields of a `set` line.
///
/// Every variant maps to the message sent back in a `CLIENT_ERROR` frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing {0} token")]
    MissingToken(&'static str),

    #[error("unexpected data after the last token")]
    TrailingData,

    #[error("invalid exptime")]
    InvalidExptime,

    #[error("invalid size")]
    InvalidSize,

    #[error("unrecognized noreply")]
    InvalidNoreply,
}

impl ParseError {
    /// Text sent to the client after `CLIENT_ERROR `.
    pub fn client_message(&self) -> &'static str {
        match self {
            ParseError::MissingToken(_) | ParseError::TrailingData => "unrecognized 'set' command",
            ParseError::InvalidExptime => "invalid exptime",
            ParseError::InvalidSize => "invalid size",
            ParseError::InvalidNoreply => "unrecognized noreply",
        }
    }
}

/// A request line split into its verb and the rest of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Get(&'a [u8]),
    Gets(&'a [u8]),
    Set(&'a [u8]),
}

impl<'a> Request<'a> {
    /// Classifies `line` by its prefix. Returns `None` for unknown verbs.
    ///
    /// The verb must be followed by a space, so a bare `get` is unknown.
    pub fn classify(line: &'a [u8]) -> Option<Self> {
        if let Some(args) = line.strip_prefix(b"get ") {
            Some(Request::Get(args))
        } else if let Some(args) = line.strip_prefix(b"gets ") {
            Some(Request::Gets(args))
        } else {
            line.strip_prefix(b"set ").map(Request::Set)
        }
    }

    /// Returns the command name
    pub fn name(&self) -> &'static str {
        match self {
            Request::Get(_) => "get",
            Request::Gets(_) => "gets",
            Request::Set(_) => "set",
        }
    }
}

/// Iterates over the keys of a `get`/`gets` line.
///
/// Keys are separated by single spaces; empty keys produced by runs of
/// spaces are skipped. An empty argument list yields no keys.
pub fn keys(args: &[u8]) -> impl Iterator<Item = &[u8]> {
    args.split(|&b| b == b' ').filter(|key| !key.is_empty())
}

/// The raw fields of `set <key> <flags> <exptime> <size> [noreply]`.
///
/// `flags` is checked for presence and then dropped: items are always
/// served back with flags `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCommand<'a> {
    pub key: &'a [u8],
    pub exptime: &'a [u8],
    pub size: &'a [u8],
    pub noreply: Option<&'a [u8]>,
}

impl<'a> SetCommand<'a> {
    /// Splits the arguments of a `set` line (everything after `set `).
    ///
    /// The four mandatory tokens plus the optional fifth must consume the
    /// whole line.
    pub fn parse(args: &'a [u8]) -> Result<Self, ParseError> {
        let (key, n) = next_token(args, 0).ok_or(ParseError::MissingToken("key"))?;
        let (_flags, n) = next_token(args, n).ok_or(ParseError::MissingToken("flags"))?;
        let (exptime, n) = next_token(args, n).ok_or(ParseError::MissingToken("exptime"))?;
        let (size, n) = next_token(args, n).ok_or(ParseError::MissingToken("size"))?;

        if n == args.len() {
            return Ok(Self {
                key,
                exptime,
                size,
                noreply: None,
            });
        }

        let (noreply, n) = next_token(args, n).ok_or(ParseError::MissingToken("noreply"))?;
        if n != args.len() {
            return Err(ParseError::TrailingData);
        }

        Ok(Self {
            key,
            exptime,
            size,
            noreply: Some(noreply),
        })
    }

    /// The declared payload length.
    pub fn payload_size(&self) -> Result<usize, ParseError> {
        parse_decimal(self.size)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(ParseError::InvalidSize)
    }

    /// Whether the `STORED` reply should be suppressed.
    pub fn is_noreply(&self) -> Result<bool, ParseError> {
        match self.noreply {
            None => Ok(false),
            Some(b"noreply") => Ok(true),
            Some(_) => Err(ParseError::InvalidNoreply),
        }
    }
}

/// Parses a whole token as a base-10 `i64` (optional sign, nothing else).
pub(crate) fn parse_decimal(token: &[u8]) -> Option<i64> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Request::classify(b"get a b"), Some(Request::Get(b"a b")));
        assert_eq!(Request::classify(b"gets a"), Some(Request::Gets(b"a")));
        assert_eq!(
            Request::classify(b"set k 0 0 1"),
            Some(Request::Set(b"k 0 0 1"))
        );
        assert_eq!(Request::classify(b"get "), Some(Request::Get(b"")));
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(Request::classify(b"foo"), None);
        assert_eq!(Request::classify(b"get"), None);
        assert_eq!(Request::classify(b"GET a"), None);
        assert_eq!(Request::classify(b"delete a"), None);
        assert_eq!(Request::classify(b"setx a"), None);
    }

    #[test]
    fn test_keys() {
        let keys: Vec<&[u8]> = keys(b"a  bb c").collect();
        assert_eq!(keys, vec![&b"a"[..], &b"bb"[..], &b"c"[..]]);
    }

    #[test]
    fn test_keys_empty() {
        assert_eq!(keys(b"").count(), 0);
        assert_eq!(keys(b"   ").count(), 0);
    }

    #[test]
    fn test_parse_set() {
        let cmd = SetCommand::parse(b"foo 12 60 5").unwrap();
        assert_eq!(cmd.key, b"foo");
        assert_eq!(cmd.exptime, b"60");
        assert_eq!(cmd.size, b"5");
        assert_eq!(cmd.noreply, None);
        assert_eq!(cmd.payload_size(), Ok(5));
        assert_eq!(cmd.is_noreply(), Ok(false));
    }

    #[test]
    fn test_parse_set_noreply() {
        let cmd = SetCommand::parse(b"foo 0 0 1 noreply").unwrap();
        assert_eq!(cmd.is_noreply(), Ok(true));
    }

    #[test]
    fn test_parse_set_bad_noreply() {
        let cmd = SetCommand::parse(b"foo 0 0 1 please").unwrap();
        assert_eq!(cmd.is_noreply(), Err(ParseError::InvalidNoreply));
    }

    #[test]
    fn test_parse_set_missing_tokens() {
        assert_eq!(
            SetCommand::parse(b""),
            Err(ParseError::MissingToken("key"))
        );
        assert_eq!(
            SetCommand::parse(b"foo 0 0"),
            Err(ParseError::MissingToken("size"))
        );
        assert_eq!(
            SetCommand::parse(b"foo 0 0 5 "),
            Err(ParseError::MissingToken("noreply"))
        );
    }

    #[test]
    fn test_parse_set_trailing_data() {
        assert_eq!(
            SetCommand::parse(b"foo 0 0 5 noreply extra"),
            Err(ParseError::TrailingData)
        );
    }

    #[test]
    fn test_payload_size() {
        let size = |token: &'static [u8]| SetCommand {
            key: b"k",
            exptime: b"0",
            size: token,
            noreply: None,
        }
        .payload_size();

        assert_eq!(size(b"0"), Ok(0));
        assert_eq!(size(b"1024"), Ok(1024));
        assert_eq!(size(b"abc"), Err(ParseError::InvalidSize));
        assert_eq!(size(b"-1"), Err(ParseError::InvalidSize));
        assert_eq!(size(b"5x"), Err(ParseError::InvalidSize));
    }

    #[test]
    fn test_client_messages() {
        assert_eq!(
            ParseError::TrailingData.client_message(),
            "unrecognized 'set' command"
        );
        assert_eq!(ParseError::InvalidSize.client_message(), "invalid size");
        assert_eq!(
            ParseError::InvalidExptime.client_message(),
            "invalid exptime"
        );
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(b"42"), Some(42));
        assert_eq!(parse_decimal(b"-5"), Some(-5));
        assert_eq!(parse_decimal(b""), None);
        assert_eq!(parse_decimal(b"1e3"), None);
        assert_eq!(parse_decimal(b" 1"), None);
        assert_eq!(parse_decimal(b"1.0"), None);
    }
}
