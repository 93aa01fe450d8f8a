//! IMAP response parsing and argument encoding

use crate::{ImapError, Result};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum response line size (prevents unbounded buffering)
pub const MAX_LINE_LENGTH: usize = 64 * 1024; // 64KB

/// Maximum literal size accepted inside a response
pub const MAX_LITERAL_SIZE: usize = 64 * 1024;

/// Capability names used by the client
pub mod capability {
    pub const IMAP4REV1: &str = "IMAP4REV1";
    pub const STARTTLS: &str = "STARTTLS";
    pub const LOGINDISABLED: &str = "LOGINDISABLED";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
    PreAuth,
    Bye,
}

impl Status {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Status::Ok),
            "NO" => Some(Status::No),
            "BAD" => Some(Status::Bad),
            "PREAUTH" => Some(Status::PreAuth),
            "BYE" => Some(Status::Bye),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Status::Ok => "OK",
            Status::No => "NO",
            Status::Bad => "BAD",
            Status::PreAuth => "PREAUTH",
            Status::Bye => "BYE",
        };
        f.write_str(word)
    }
}

/// Capability set advertised by a server. Names are kept uppercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<String>);

impl Capabilities {
    /// Parse a space-separated capability list
    pub fn parse(list: &str) -> Self {
        Capabilities(list.split_ascii_whitespace().map(str::to_ascii_uppercase).collect())
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.contains(&name.to_ascii_uppercase())
    }

    pub fn supports_starttls(&self) -> bool {
        self.has(capability::STARTTLS)
    }

    pub fn login_disabled(&self) -> bool {
        self.has(capability::LOGINDISABLED)
    }
}

/// Bracketed response code, e.g. `[CAPABILITY ...]` or `[ALERT]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    Capability(Capabilities),
    Other(String),
}

/// One server response line (literals already inlined)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Status response; `tag` is `None` for untagged (`*`) responses
    Status {
        tag: Option<String>,
        status: Status,
        code: Option<ResponseCode>,
        text: String,
    },
    /// Untagged `CAPABILITY` data
    Capability(Capabilities),
    /// Any other untagged data
    Data(String),
    /// Command continuation request (`+`)
    Continuation(String),
}

impl Response {
    pub fn parse(line: &str) -> Result<Self> {
        if let Some(rest) = line.strip_prefix('+') {
            return Ok(Response::Continuation(rest.trim_start().to_string()));
        }

        let (tag, after_tag) = split_word(line);
        if tag.is_empty() {
            return Err(ImapError::Protocol("empty response line".into()));
        }
        let tag = (tag != "*").then(|| tag.to_string());

        let (word, rest) = split_word(after_tag);
        if let Some(status) = Status::parse(word) {
            let (code, text) = parse_status_text(rest)?;
            return Ok(Response::Status {
                tag,
                status,
                code,
                text,
            });
        }

        match tag {
            None if word.eq_ignore_ascii_case("CAPABILITY") => {
                Ok(Response::Capability(Capabilities::parse(rest)))
            }
            None => Ok(Response::Data(after_tag.to_string())),
            Some(tag) => Err(ImapError::Protocol(format!(
                "unexpected tagged response for {}: {:?}",
                tag, word
            ))),
        }
    }

    /// Capabilities carried by this response, in data or a response code
    pub fn capabilities(&self) -> Option<&Capabilities> {
        match self {
            Response::Capability(caps) => Some(caps),
            Response::Status {
                code: Some(ResponseCode::Capability(caps)),
                ..
            } => Some(caps),
            _ => None,
        }
    }
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(' ') {
        Some((word, rest)) => (word, rest),
        None => (input, ""),
    }
}

fn parse_status_text(rest: &str) -> Result<(Option<ResponseCode>, String)> {
    let Some(bracketed) = rest.strip_prefix('[') else {
        return Ok((None, rest.trim().to_string()));
    };

    let end = bracketed
        .find(']')
        .ok_or_else(|| ImapError::Protocol(format!("unterminated response code in {:?}", rest)))?;
    let inner = &bracketed[..end];
    let text = bracketed[end + 1..].trim().to_string();

    let (name, args) = split_word(inner);
    let code = if name.eq_ignore_ascii_case("CAPABILITY") {
        ResponseCode::Capability(Capabilities::parse(args))
    } else {
        ResponseCode::Other(inner.to_string())
    };

    Ok((Some(code), text))
}

/// Parse a trailing `{n}` literal announcement
pub fn literal_length(line: &str) -> Option<usize> {
    let open = line.strip_suffix('}')?.rfind('{')?;
    line[open + 1..line.len() - 1].parse().ok()
}

/// Encoded form of an `astring` command argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument<'a> {
    Atom(&'a str),
    Quoted(String),
    /// Sent as `{n}` followed by the raw bytes once the server sends `+`
    Literal(&'a [u8]),
}

impl<'a> Argument<'a> {
    /// Pick the narrowest encoding able to carry `value`
    pub fn astring(value: &'a str) -> Self {
        if !value.is_empty() && value.bytes().all(is_atom_char) {
            return Argument::Atom(value);
        }

        if value.bytes().all(|b| b.is_ascii() && b != b'\r' && b != b'\n' && b != 0) {
            let mut quoted = String::with_capacity(value.len() + 2);
            quoted.push('"');
            for c in value.chars() {
                if c == '"' || c == '\\' {
                    quoted.push('\\');
                }
                quoted.push(c);
            }
            quoted.push('"');
            return Argument::Quoted(quoted);
        }

        Argument::Literal(value.as_bytes())
    }
}

fn is_atom_char(b: u8) -> bool {
    b.is_ascii_graphic() && !matches!(b, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b']')
}
