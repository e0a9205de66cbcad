//! Typed wire frames for the LanChat line protocol.
//!
//! Wire format:
//! ```text
//! [NEW_USER]<name>\n      handshake, sent once by a peer after connect
//! [HUB_DOWN]\n            shutdown notice, broadcast by the hub on stop
//! <text>\n                ordinary chat line, relayed verbatim
//! [TEXT]<text>\n          chat line whose text begins with a reserved tag
//! ```
//!
//! Control frames are distinguished by a bracketed tag at the start of the
//! line. A chat message whose text happens to *spell* a reserved tag is
//! escaped with `[TEXT]` on encode, so a peer can never mistake user input
//! for the hub shutdown notice: shutdown detection compares decoded frame
//! types, not raw strings.

use thiserror::Error;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Well-known TCP port the hub listens on.
pub const DEFAULT_PORT: u16 = 5050;

/// Tag opening the one-time handshake line.
pub const HANDSHAKE_TAG: &str = "[NEW_USER]";

/// The hub's shutdown notice. Matched exactly: a line that merely starts
/// with this tag decodes as chat.
pub const SHUTDOWN_TAG: &str = "[HUB_DOWN]";

/// Escape tag for chat text that would otherwise parse as a control frame.
pub const LITERAL_TAG: &str = "[TEXT]";

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can occur while encoding a frame.
///
/// Decoding is total: every line decodes to *some* frame, because a peer on
/// the other end of the wire may be buggy or stale and a malformed line must
/// degrade to chat (or to a fallback display name), never to a dropped
/// connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The message text contains a line break, which would split it into two
    /// wire frames.
    #[error("message text contains an embedded line break")]
    EmbeddedNewline,
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One application-level message, as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The one-time handshake establishing a peer's display name. An empty
    /// name is allowed; the hub substitutes the remote address.
    Hello { name: String },
    /// An ordinary chat line, relayed verbatim to every other peer.
    Chat { text: String },
    /// The hub is stopping; peers disconnect locally on receipt.
    Shutdown,
}

impl Frame {
    /// Encodes the frame as a single line, without the trailing `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EmbeddedNewline`] if the chat text or
    /// handshake name contains `\n` or `\r`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanchat_core::Frame;
    ///
    /// let line = Frame::Hello { name: "alice".to_string() }.encode().unwrap();
    /// assert_eq!(line, "[NEW_USER]alice");
    ///
    /// // Chat spelling the shutdown tag is escaped, not sent bare.
    /// let line = Frame::Chat { text: "[HUB_DOWN]".to_string() }.encode().unwrap();
    /// assert_eq!(line, "[TEXT][HUB_DOWN]");
    /// ```
    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            Frame::Hello { name } => {
                reject_line_breaks(name)?;
                Ok(format!("{HANDSHAKE_TAG}{name}"))
            }
            Frame::Chat { text } => {
                reject_line_breaks(text)?;
                if needs_escape(text) {
                    Ok(format!("{LITERAL_TAG}{text}"))
                } else {
                    Ok(text.clone())
                }
            }
            Frame::Shutdown => Ok(SHUTDOWN_TAG.to_string()),
        }
    }

    /// Decodes one line (already stripped of its delimiter) into a frame.
    ///
    /// Never fails: unrecognised input is chat.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanchat_core::Frame;
    ///
    /// assert_eq!(
    ///     Frame::decode("[NEW_USER]bob"),
    ///     Frame::Hello { name: "bob".to_string() }
    /// );
    /// assert_eq!(Frame::decode("[HUB_DOWN]"), Frame::Shutdown);
    /// assert_eq!(
    ///     Frame::decode("hello there"),
    ///     Frame::Chat { text: "hello there".to_string() }
    /// );
    /// ```
    pub fn decode(line: &str) -> Frame {
        if line == SHUTDOWN_TAG {
            return Frame::Shutdown;
        }
        if let Some(rest) = line.strip_prefix(HANDSHAKE_TAG) {
            return Frame::Hello {
                name: rest.trim().to_string(),
            };
        }
        if let Some(rest) = line.strip_prefix(LITERAL_TAG) {
            return Frame::Chat {
                text: rest.to_string(),
            };
        }
        Frame::Chat {
            text: line.to_string(),
        }
    }
}

/// True when chat text would be misread as a control frame if sent bare.
fn needs_escape(text: &str) -> bool {
    text.starts_with(HANDSHAKE_TAG)
        || text.starts_with(SHUTDOWN_TAG)
        || text.starts_with(LITERAL_TAG)
}

fn reject_line_breaks(text: &str) -> Result<(), ProtocolError> {
    if text.contains('\n') || text.contains('\r') {
        Err(ProtocolError::EmbeddedNewline)
    } else {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
