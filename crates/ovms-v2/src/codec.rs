//! Message codec
//!
//! Outbound: plaintext -> RC4(tx) -> base64 -> CRLF.
//! Inbound: line -> base64 -> RC4(rx) -> cut at NUL -> `MP-0 ` frame.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::crypto::LinkCipher;
use crate::error::CodecError;

/// Prefix of every post-login frame
pub const FRAME_PREFIX: &str = "MP-0 ";

/// Encrypt and frame one message
///
/// Returns `None` for an empty message so callers can build optional
/// messages without guarding the send.
pub fn encode_line(cipher: &mut LinkCipher, message: &str) -> Option<String> {
    if message.is_empty() {
        return None;
    }
    let mut bytes = message.as_bytes().to_vec();
    cipher.apply(&mut bytes);
    let mut line = STANDARD.encode(&bytes);
    line.push_str("\r\n");
    Some(line)
}

/// Decrypt one received line into a frame
pub fn decode_line(cipher: &mut LinkCipher, line: &str) -> Result<String, CodecError> {
    let mut bytes = STANDARD.decode(line.trim())?;
    cipher.apply(&mut bytes);
    if let Some(nul) = bytes.iter().position(|b| *b == 0) {
        bytes.truncate(nul);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// A decoded server frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage<'a> {
    /// `A`
    Ping,
    /// `Z<n>`
    Peers(i64),
    /// `h<id>`
    DataAck(u32),
    /// `C<code>[,<args>]`
    Command(&'a str),
    /// Opcodes this link does not handle
    Unknown(&'a str),
}

/// Split a frame into its opcode and payload
pub fn parse_frame(frame: &str) -> Result<ServerMessage<'_>, CodecError> {
    let body = frame
        .strip_prefix(FRAME_PREFIX)
        .ok_or_else(|| CodecError::MissingPrefix(frame.to_string()))?;
    let mut chars = body.chars();
    let Some(opcode) = chars.next() else {
        return Ok(ServerMessage::Unknown(body));
    };
    let payload = chars.as_str();
    Ok(match opcode {
        'A' => ServerMessage::Ping,
        'Z' => ServerMessage::Peers(atoi(payload)),
        'h' => ServerMessage::DataAck(u32::try_from(atoi(payload)).unwrap_or(0)),
        'C' => ServerMessage::Command(payload),
        _ => ServerMessage::Unknown(body),
    })
}

/// Make free text safe for a comma separated, line based payload
///
/// `\r\n` and `\n` become `\r`, `,` becomes `;`.
pub fn mp_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = '\0';
    for c in text.chars() {
        match c {
            '\n' if last == '\r' => {}
            '\n' => out.push('\r'),
            ',' => out.push(';'),
            other => out.push(other),
        }
        last = c;
    }
    out
}

/// Leading integer of `text`, 0 when there is none
pub fn atoi(text: &str) -> i64 {
    let text = text.trim_start();
    let (sign, digits) = match text.as_bytes().first() {
        Some(b'-') => (-1, &text[1..]),
        Some(b'+') => (1, &text[1..]),
        _ => (1, text),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end]
        .parse::<i64>()
        .map(|v| sign * v)
        .unwrap_or(0)
}
