//! Sender and plain-text body extraction from raw RFC 822 messages.

use mail_parser::{Addr, MessageParser, MessagePart, MessagePartId, MimeHeaders, PartType};

use super::Message;
use crate::normalize::normalize;

/// Sender shown when a message has no usable `From` header.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Parse a raw message into a [`Message`] with a normalized body.
///
/// Returns `None` when the bytes are not a message or when a multipart
/// message carries no `text/plain` part.
pub fn extract_message(raw: &[u8]) -> Option<Message> {
    let parsed = MessageParser::default().parse(raw)?;
    let body = first_plain_text(&parsed)?;
    Some(Message {
        body: normalize(body.trim()),
        sender: sender_display(&parsed),
    })
}

/// `From` as a display string: every address as `Name <addr>`, `addr`, or
/// `Name`, joined with `, `. Names containing specials are quoted.
pub fn sender_display(parsed: &mail_parser::Message) -> String {
    let Some(from) = parsed.from() else {
        return UNKNOWN_SENDER.to_string();
    };
    let shown: Vec<String> = from.iter().filter_map(display_addr).collect();
    if shown.is_empty() {
        UNKNOWN_SENDER.to_string()
    } else {
        shown.join(", ")
    }
}

fn display_addr(addr: &Addr) -> Option<String> {
    let name = addr.name().map(str::trim).filter(|n| !n.is_empty());
    match (name, addr.address()) {
        (Some(name), Some(address)) => Some(format!("{} <{address}>", quote_name(name))),
        (None, Some(address)) => Some(address.to_string()),
        (Some(name), None) => Some(name.to_string()),
        (None, None) => None,
    }
}

fn quote_name(name: &str) -> String {
    const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];
    if name.contains(SPECIALS) {
        format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        name.to_string()
    }
}

/// Body text of the message.
///
/// Multipart messages yield their first `text/plain` part in document
/// order, descending into attached `message/rfc822` parts; everything else
/// is ignored. Single-part messages yield the root body whatever its type.
/// Undecodable bytes are replaced, never rejected.
pub fn first_plain_text(parsed: &mail_parser::Message) -> Option<String> {
    let root = parsed.root_part();
    if !matches!(root.body, PartType::Multipart(_)) {
        return Some(part_text(root));
    }
    find_plain_text(parsed, 0)
}

/// Pre-order walk from part `id`.
fn find_plain_text(parsed: &mail_parser::Message, id: MessagePartId) -> Option<String> {
    let part = parsed.part(id)?;
    match &part.body {
        PartType::Multipart(children) => children.iter().find_map(|&child| find_plain_text(parsed, child)),
        PartType::Message(inner) => find_plain_text(inner, 0),
        _ if is_plain_text(part) => Some(part_text(part)),
        _ => None,
    }
}

fn is_plain_text(part: &MessagePart) -> bool {
    match MimeHeaders::content_type(part) {
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct.subtype().is_some_and(|s| s.eq_ignore_ascii_case("plain"))
        }
        // Untyped parts default to text/plain.
        None => matches!(part.body, PartType::Text(_)),
    }
}

fn part_text(part: &MessagePart) -> String {
    match &part.body {
        PartType::Text(text) | PartType::Html(text) => text.to_string(),
        PartType::Multipart(_) => String::new(),
        _ => String::from_utf8_lossy(part.contents()).into_owned(),
    }
}
