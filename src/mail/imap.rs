//! Minimal blocking IMAP client over rustls.
//!
//! Speaks just enough IMAP4rev1 for one retrieval: greeting, `LOGIN`,
//! `SELECT`, `SEARCH SUBJECT`, `FETCH <id> RFC822` and `LOGOUT`. Literals
//! (`{n}`) in server responses are read exactly, so message bodies come back
//! byte-for-byte. Run it inside `spawn_blocking`.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use super::{MailQuery, Message, extract_message};
use crate::config::ImapConfig;
use crate::error::ImapError;

/// TLS stream used for live sessions.
pub type TlsStream = StreamOwned<ClientConnection, TcpStream>;

// ── Responses ───────────────────────────────────────────────────────

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

/// One logical response line, with any literals it carried.
#[derive(Debug, Clone, Default)]
pub struct ResponseLine {
    /// Line text with literal payloads cut out.
    pub text: String,
    pub literals: Vec<Vec<u8>>,
}

/// Everything the server sent for one command.
#[derive(Debug, Clone)]
pub struct Response {
    pub untagged: Vec<ResponseLine>,
    pub status: Status,
    /// Text after the status word of the tagged line.
    pub detail: String,
}

// ── Session ─────────────────────────────────────────────────────────

/// An IMAP session over any byte stream.
pub struct ImapSession<S> {
    stream: S,
    buf: Vec<u8>,
    tag_counter: u32,
}

impl<S: Read + Write> ImapSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            tag_counter: 0,
        }
    }

    /// Hand back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Read the server greeting. `* OK` and `* PREAUTH` are accepted.
    pub fn read_greeting(&mut self) -> Result<(), ImapError> {
        let line = self.read_response_line()?;
        if line.text.starts_with("* OK") || line.text.starts_with("* PREAUTH") {
            Ok(())
        } else {
            Err(ImapError::CommandFailed {
                command: "greeting".into(),
                response: line.text,
            })
        }
    }

    /// `LOGIN`. A `NO` or `BAD` reply is an authentication failure.
    pub fn login(&mut self, username: &str, password: &str) -> Result<(), ImapError> {
        let cmd = format!("LOGIN {} {}", quote(username), quote(password));
        let resp = self.run("LOGIN", &cmd)?;
        match resp.status {
            Status::Ok => Ok(()),
            Status::No | Status::Bad => Err(ImapError::AuthFailed(resp.detail)),
        }
    }

    /// `SELECT` a mailbox.
    pub fn select(&mut self, mailbox: &str) -> Result<(), ImapError> {
        let cmd = format!("SELECT {}", quote(mailbox));
        expect_ok("SELECT", self.run("SELECT", &cmd)?).map(|_| ())
    }

    /// `SEARCH SUBJECT` — ids in the order the server returned them.
    ///
    /// Non-ASCII filters are sent as a UTF-8 literal with `CHARSET UTF-8`.
    pub fn search_subject(&mut self, subject: &str) -> Result<Vec<u32>, ImapError> {
        let resp = if is_quotable(subject) {
            self.run("SEARCH", &format!("SEARCH SUBJECT {}", quote(subject)))?
        } else {
            self.run_with_literal("SEARCH", "SEARCH CHARSET UTF-8 SUBJECT", subject.as_bytes())?
        };
        let resp = expect_ok("SEARCH", resp)?;
        parse_search(&resp.untagged)
    }

    /// `FETCH <id> RFC822` — the raw message bytes.
    pub fn fetch_rfc822(&mut self, id: u32) -> Result<Vec<u8>, ImapError> {
        let resp = expect_ok("FETCH", self.run("FETCH", &format!("FETCH {id} RFC822"))?)?;
        resp.untagged
            .into_iter()
            .filter(|line| line.text.contains("FETCH"))
            .find_map(|line| line.literals.into_iter().next())
            .ok_or_else(|| ImapError::Malformed(format!("no message data for id {id}")))
    }

    /// `LOGOUT`. The untagged `BYE` is expected and ignored.
    pub fn logout(&mut self) -> Result<(), ImapError> {
        expect_ok("LOGOUT", self.run("LOGOUT", "LOGOUT")?).map(|_| ())
    }

    /// Log in, search `INBOX` by subject and fetch the trailing
    /// `max_messages` hits.
    ///
    /// Messages without a plain-text body are left out. Any error aborts the
    /// whole batch.
    pub fn retrieve(&mut self, query: &MailQuery, max_messages: usize) -> Result<Vec<Message>, ImapError> {
        self.read_greeting()?;
        self.login(&query.username, query.password.expose_secret())?;
        self.select("INBOX")?;

        let ids = self.search_subject(&query.subject)?;
        let recent = &ids[ids.len().saturating_sub(max_messages)..];
        info!(matches = ids.len(), fetching = recent.len(), "IMAP search complete");

        let mut messages = Vec::with_capacity(recent.len());
        for &id in recent {
            let raw = self.fetch_rfc822(id)?;
            match extract_message(&raw) {
                Some(message) => messages.push(message),
                None => debug!(id, "Message has no plain-text body, skipping"),
            }
        }

        self.logout()?;
        Ok(messages)
    }

    // ── Wire helpers ────────────────────────────────────────────────

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    /// Send one command line and collect the response. `name` is what gets
    /// logged, never the arguments.
    fn run(&mut self, name: &str, cmd: &str) -> Result<Response, ImapError> {
        let tag = self.next_tag();
        debug!(tag = %tag, command = name, "IMAP >");
        self.stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;
        self.read_response(&tag)
    }

    /// Send `prefix {n}`, wait for the continuation, then send the literal.
    fn run_with_literal(&mut self, name: &str, prefix: &str, literal: &[u8]) -> Result<Response, ImapError> {
        let tag = self.next_tag();
        debug!(tag = %tag, command = name, "IMAP > (literal)");
        self.stream
            .write_all(format!("{tag} {prefix} {{{}}}\r\n", literal.len()).as_bytes())?;
        self.stream.flush()?;

        let line = self.read_response_line()?;
        if !line.text.starts_with('+') {
            // Server refused the literal: this is already the tagged reply.
            let (status, detail) = parse_tagged(&line.text, &tag)
                .ok_or_else(|| ImapError::Malformed(line.text.clone()))?;
            return Ok(Response {
                untagged: Vec::new(),
                status,
                detail,
            });
        }

        self.stream.write_all(literal)?;
        self.stream.write_all(b"\r\n")?;
        self.stream.flush()?;
        self.read_response(&tag)
    }

    fn read_response(&mut self, tag: &str) -> Result<Response, ImapError> {
        let mut untagged = Vec::new();
        loop {
            let line = self.read_response_line()?;
            if let Some((status, detail)) = parse_tagged(&line.text, tag) {
                debug!(tag, ?status, "IMAP <");
                return Ok(Response {
                    untagged,
                    status,
                    detail,
                });
            }
            untagged.push(line);
        }
    }

    fn read_response_line(&mut self) -> Result<ResponseLine, ImapError> {
        let mut line = ResponseLine::default();
        loop {
            let raw = self.read_line()?;
            let text = String::from_utf8_lossy(&raw[..raw.len() - 2]);
            match literal_len(&text) {
                Some(n) => {
                    line.text.push_str(&text);
                    let literal = self.read_bytes(n)?;
                    line.literals.push(literal);
                }
                None => {
                    line.text.push_str(&text);
                    return Ok(line);
                }
            }
        }
    }

    /// Read through the next CRLF, inclusive.
    fn read_line(&mut self) -> Result<Vec<u8>, ImapError> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buf[scanned..].windows(2).position(|w| w == b"\r\n") {
                let end = scanned + pos + 2;
                return Ok(self.buf.drain(..end).collect());
            }
            scanned = self.buf.len().saturating_sub(1);
            self.fill()?;
        }
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, ImapError> {
        while self.buf.len() < n {
            self.fill()?;
        }
        Ok(self.buf.drain(..n).collect())
    }

    fn fill(&mut self) -> Result<(), ImapError> {
        let mut chunk = [0u8; 8192];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ImapError::Closed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// ── Live connection ─────────────────────────────────────────────────

/// Open a TLS session to the configured server (greeting not yet read).
pub fn connect(config: &ImapConfig) -> Result<ImapSession<TlsStream>, ImapError> {
    let tcp = TcpStream::connect((config.host.as_str(), config.port))?;
    tcp.set_read_timeout(Some(config.read_timeout))?;

    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name =
        ServerName::try_from(config.host.clone()).map_err(|e| ImapError::InvalidHost {
            host: config.host.clone(),
            reason: e.to_string(),
        })?;
    let conn = ClientConnection::new(tls_config, server_name)?;

    debug!(host = %config.host, port = config.port, "IMAP connected");
    Ok(ImapSession::new(StreamOwned::new(conn, tcp)))
}

/// Connect, run [`ImapSession::retrieve`] and drop the connection.
pub fn fetch_matching(config: &ImapConfig, query: &MailQuery) -> Result<Vec<Message>, ImapError> {
    let mut session = connect(config)?;
    session.retrieve(query, config.max_messages)
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn expect_ok(command: &str, resp: Response) -> Result<Response, ImapError> {
    match resp.status {
        Status::Ok => Ok(resp),
        Status::No | Status::Bad => Err(ImapError::CommandFailed {
            command: command.to_string(),
            response: resp.detail,
        }),
    }
}

/// `"{tag} OK ..."` → `(Ok, "...")`. `None` if the line is not tagged `tag`.
fn parse_tagged(text: &str, tag: &str) -> Option<(Status, String)> {
    let rest = text.strip_prefix(tag)?.strip_prefix(' ')?;
    let (word, detail) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = match word.to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        _ => return None,
    };
    Some((status, detail.trim().to_string()))
}

/// Length of a trailing `{n}` literal marker.
fn literal_len(text: &str) -> Option<usize> {
    let inner = text.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].trim_end_matches('+').parse().ok()
}

fn parse_search(lines: &[ResponseLine]) -> Result<Vec<u32>, ImapError> {
    let mut ids = Vec::new();
    for line in lines {
        let Some(rest) = line.text.strip_prefix("* SEARCH") else {
            continue;
        };
        for token in rest.split_whitespace() {
            let id = token
                .parse()
                .map_err(|_| ImapError::Malformed(format!("bad SEARCH id {token:?}")))?;
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Whether `s` can go out as an IMAP quoted string.
fn is_quotable(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii() && b != b'\r' && b != b'\n' && b != 0)
}

/// Quote and escape an IMAP string.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use secrecy::SecretString;

    use super::*;

    /// Replays canned server bytes and records what the client wrote.
    struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Scripted {
        fn new(server: &str) -> Self {
            Self {
                input: Cursor::new(server.as_bytes().to_vec()),
                output: Vec::new(),
            }
        }

        fn sent(&self) -> String {
            String::from_utf8_lossy(&self.output).to_string()
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn query(subject: &str) -> MailQuery {
        MailQuery {
            username: "me@example.com".into(),
            password: SecretString::from("app-password"),
            subject: subject.into(),
        }
    }

    fn fetch_reply(tag: &str, id: u32, from: &str, body: &str) -> String {
        let message = format!("From: {from}\r\nSubject: job\r\n\r\n{body}\r\n");
        format!(
            "* {id} FETCH (RFC822 {{{}}}\r\n{message})\r\n{tag} OK FETCH completed\r\n",
            message.len()
        )
    }

    // ── Parsing helpers ─────────────────────────────────────────────

    #[test]
    fn quote_escapes_quotes_and_backslashes() {
        assert_eq!(quote("job"), "\"job\"");
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn literal_len_detects_trailing_marker() {
        assert_eq!(literal_len("* 1 FETCH (RFC822 {342}"), Some(342));
        assert_eq!(literal_len("* 1 FETCH (FLAGS (\\Seen))"), None);
        assert_eq!(literal_len("A1 OK done"), None);
    }

    #[test]
    fn parse_tagged_status_words() {
        assert_eq!(parse_tagged("A3 OK SEARCH completed", "A3"), Some((Status::Ok, "SEARCH completed".into())));
        assert_eq!(parse_tagged("A3 NO nope", "A3"), Some((Status::No, "nope".into())));
        assert_eq!(parse_tagged("A30 OK other", "A3"), None);
        assert_eq!(parse_tagged("* OK untagged", "A3"), None);
    }

    #[test]
    fn search_rejects_garbage_ids() {
        let lines = vec![ResponseLine {
            text: "* SEARCH 1 two 3".into(),
            literals: vec![],
        }];
        assert!(matches!(parse_search(&lines), Err(ImapError::Malformed(_))));
    }

    // ── Session ─────────────────────────────────────────────────────

    #[test]
    fn retrieve_fetches_trailing_ids_in_server_order() {
        let mut server = String::from("* OK IMAP4rev1 ready\r\n");
        server.push_str("A1 OK LOGIN completed\r\n");
        server.push_str("* 7 EXISTS\r\nA2 OK [READ-WRITE] SELECT completed\r\n");
        server.push_str("* SEARCH 2 4 5 7\r\nA3 OK SEARCH completed\r\n");
        server.push_str(&fetch_reply("A4", 5, "Alice <alice@example.com>", "Interview Monday!"));
        server.push_str(&fetch_reply("A5", 7, "bob@example.com", "Salary offer."));
        server.push_str("* BYE logging out\r\nA6 OK LOGOUT completed\r\n");

        let mut session = ImapSession::new(Scripted::new(&server));
        let messages = session.retrieve(&query("job"), 2).unwrap();

        assert_eq!(
            messages,
            vec![
                Message::new("interview monday", "Alice <alice@example.com>"),
                Message::new("salary offer", "bob@example.com"),
            ]
        );

        let sent = session.into_inner().sent();
        assert!(sent.contains("A1 LOGIN \"me@example.com\" \"app-password\"\r\n"));
        assert!(sent.contains("A2 SELECT \"INBOX\"\r\n"));
        assert!(sent.contains("A3 SEARCH SUBJECT \"job\"\r\n"));
        assert!(sent.contains("A4 FETCH 5 RFC822\r\n"));
        assert!(sent.contains("A5 FETCH 7 RFC822\r\n"));
        assert!(!sent.contains("FETCH 4 "));
        assert!(sent.ends_with("A6 LOGOUT\r\n"));
    }

    #[test]
    fn retrieve_with_no_matches_returns_empty() {
        let server = concat!(
            "* OK ready\r\n",
            "A1 OK LOGIN completed\r\n",
            "A2 OK SELECT completed\r\n",
            "* SEARCH\r\nA3 OK SEARCH completed\r\n",
            "A4 OK LOGOUT completed\r\n",
        );
        let mut session = ImapSession::new(Scripted::new(server));
        assert!(session.retrieve(&query("job"), 20).unwrap().is_empty());
    }

    #[test]
    fn login_rejection_is_auth_failure() {
        let server = concat!(
            "* OK ready\r\n",
            "A1 NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)\r\n",
        );
        let mut session = ImapSession::new(Scripted::new(server));
        let err = session.retrieve(&query("job"), 20).unwrap_err();
        match err {
            ImapError::AuthFailed(reason) => assert!(reason.contains("Invalid credentials")),
            other => panic!("expected AuthFailed, got {other:?}"),
        }
    }

    #[test]
    fn connection_closed_mid_batch_aborts() {
        let mut server = String::from("* OK ready\r\nA1 OK\r\nA2 OK\r\n");
        server.push_str("* SEARCH 1 2\r\nA3 OK\r\n");
        server.push_str(&fetch_reply("A4", 1, "a@example.com", "first"));
        let mut session = ImapSession::new(Scripted::new(&server));
        assert!(matches!(session.retrieve(&query("job"), 20), Err(ImapError::Closed)));
    }

    #[test]
    fn non_ascii_subject_uses_literal() {
        let server = concat!(
            "+ go ahead\r\n",
            "* SEARCH 3\r\n",
            "A1 OK SEARCH completed\r\n",
        );
        let mut session = ImapSession::new(Scripted::new(server));
        let ids = session.search_subject("Bewerbung für").unwrap();
        assert_eq!(ids, vec![3]);

        let sent = session.into_inner().sent();
        let len = "Bewerbung für".len();
        assert_eq!(sent, format!("A1 SEARCH CHARSET UTF-8 SUBJECT {{{len}}}\r\nBewerbung für\r\n"));
    }

    #[test]
    fn bad_greeting_is_rejected() {
        let mut session = ImapSession::new(Scripted::new("* BYE too busy\r\n"));
        assert!(matches!(session.read_greeting(), Err(ImapError::CommandFailed { .. })));
    }

    #[test]
    fn select_failure_is_command_failure() {
        let server = "A1 NO Mailbox does not exist\r\n";
        let mut session = ImapSession::new(Scripted::new(server));
        let err = session.select("INBOX").unwrap_err();
        assert_eq!(err.to_string(), "IMAP command SELECT failed: Mailbox does not exist");
    }
}
