//! Classify raw WebSocket messages once, before they reach the relay.

use axum::extract::ws::{CloseFrame, Message};

#[derive(Debug)]
pub enum Frame {
    Text(String),
    /// Binary frames carry nothing the relay understands; only the size is
    /// kept for logging.
    Binary(usize),
    Ping,
    Pong,
    Close(Option<u16>),
}

pub fn classify(msg: Message) -> Frame {
    match msg {
        Message::Text(s) => Frame::Text(s),
        Message::Binary(b) => Frame::Binary(b.len()),
        Message::Ping(_) => Frame::Ping,
        Message::Pong(_) => Frame::Pong,
        Message::Close(frame) => Frame::Close(frame.map(|f| f.code)),
    }
}

/// Close frame with an empty reason.
pub fn close_frame(code: u16) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: "".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_code_is_surfaced() {
        assert!(matches!(classify(close_frame(1000)), Frame::Close(Some(1000))));
        assert!(matches!(classify(Message::Close(None)), Frame::Close(None)));
    }

    #[test]
    fn binary_reduced_to_length() {
        assert!(matches!(classify(Message::Binary(vec![1, 2, 3])), Frame::Binary(3)));
    }
}
