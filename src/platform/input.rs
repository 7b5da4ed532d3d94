//! Input source implementations

use super::InputSource;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

/// A source that never produces anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn poll_char(&mut self) -> Option<char> {
        None
    }

    fn is_exhausted(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
struct Script {
    pending: VecDeque<char>,
    closed: bool,
    delivered: usize,
}

/// Input fed by the program itself
///
/// Clones share one queue: tests keep a handle to push characters while
/// tasks are running, and `close` it to signal end of input.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    script: Rc<RefCell<Script>>,
}

impl ScriptedInput {
    pub fn new(initial: &str) -> Self {
        let input = Self::default();
        input.push_str(initial);
        input
    }

    pub fn push(&self, ch: char) {
        self.script.borrow_mut().pending.push_back(ch);
    }

    pub fn push_str(&self, s: &str) {
        self.script.borrow_mut().pending.extend(s.chars());
    }

    /// No more characters after the pending ones
    pub fn close(&self) {
        self.script.borrow_mut().closed = true;
    }

    /// Characters handed out so far
    pub fn delivered(&self) -> usize {
        self.script.borrow().delivered
    }

    pub fn pending(&self) -> usize {
        self.script.borrow().pending.len()
    }
}

impl InputSource for ScriptedInput {
    fn poll_char(&mut self) -> Option<char> {
        let mut script = self.script.borrow_mut();
        let ch = script.pending.pop_front()?;
        script.delivered += 1;
        Some(ch)
    }

    fn is_exhausted(&self) -> bool {
        let script = self.script.borrow();
        script.closed && script.pending.is_empty()
    }
}

/// Characters from the process's standard input
///
/// A reader thread blocks on stdin and forwards decoded characters over a
/// channel; polling only ever does a `try_recv`. The terminal stays in its
/// normal line-buffered mode, so characters show up once a line is entered.
pub struct StdinInput {
    rx: Receiver<char>,
    eof: bool,
}

impl StdinInput {
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("spindle-stdin".into())
            .spawn(move || {
                decode_utf8(io::stdin().lock(), |ch| tx.send(ch).is_ok());
                log::debug!("[input] stdin closed");
            })?;
        Ok(Self { rx, eof: false })
    }
}

/// Decode `reader` as UTF-8, handing each character to `emit`
///
/// Each malformed sequence becomes one `U+FFFD` and decoding resumes right
/// after it. A sequence cut short by end of input also becomes `U+FFFD`.
/// Stops early once `emit` returns false.
fn decode_utf8(reader: impl Read, mut emit: impl FnMut(char) -> bool) {
    let mut buf: Vec<u8> = Vec::with_capacity(4);
    for byte in reader.bytes() {
        let Ok(byte) = byte else { break };
        buf.push(byte);
        loop {
            let (valid, skip) = match std::str::from_utf8(&buf) {
                Ok(_) => (buf.len(), None),
                Err(e) => (e.valid_up_to(), e.error_len()),
            };
            if !emit_valid(&buf[..valid], &mut emit) {
                return;
            }
            match skip {
                Some(len) => {
                    if !emit(char::REPLACEMENT_CHARACTER) {
                        return;
                    }
                    buf.drain(..valid + len);
                }
                // Clean, or an incomplete tail waiting for more bytes
                None => {
                    buf.drain(..valid);
                    break;
                }
            }
        }
    }
    if !buf.is_empty() {
        emit(char::REPLACEMENT_CHARACTER);
    }
}

fn emit_valid(bytes: &[u8], emit: &mut impl FnMut(char) -> bool) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.chars().all(|ch| emit(ch)),
        Err(_) => true,
    }
}

impl InputSource for StdinInput {
    fn poll_char(&mut self) -> Option<char> {
        match self.rx.try_recv() {
            Ok(ch) => Some(ch),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.eof = true;
                None
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_input_in_order() {
        let mut input = ScriptedInput::new("ab");
        assert_eq!(input.poll_char(), Some('a'));
        assert_eq!(input.poll_char(), Some('b'));
        assert_eq!(input.poll_char(), None);
        assert_eq!(input.delivered(), 2);
    }

    #[test]
    fn test_scripted_input_shared_handle() {
        let mut input = ScriptedInput::new("");
        let feeder = input.clone();
        assert_eq!(input.poll_char(), None);
        assert!(!input.is_exhausted());

        feeder.push('x');
        assert_eq!(input.pending(), 1);
        feeder.close();
        assert!(!input.is_exhausted());
        assert_eq!(input.poll_char(), Some('x'));
        assert!(input.is_exhausted());
    }

    #[test]
    fn test_no_input_is_exhausted() {
        let mut input = NoInput;
        assert_eq!(input.poll_char(), None);
        assert!(input.is_exhausted());
    }

    fn decode(bytes: &[u8]) -> String {
        let mut out = String::new();
        decode_utf8(bytes, |ch| {
            out.push(ch);
            true
        });
        out
    }

    #[test]
    fn test_decode_multibyte() {
        assert_eq!(decode("aé€😀".as_bytes()), "aé€😀");
    }

    #[test]
    fn test_decode_truncated_lead_keeps_next_char() {
        assert_eq!(decode(&[0xC3, 0x41, b'q']), "\u{FFFD}Aq");
        assert_eq!(decode(&[0xE2, 0x82, 0x41]), "\u{FFFD}A");
    }

    #[test]
    fn test_decode_invalid_bytes_replaced_one_each() {
        assert_eq!(decode(&[b'x', 0xFF, 0xFE, b'y']), "x\u{FFFD}\u{FFFD}y");
        assert_eq!(decode(&[0xC3, 0xA9, 0xC3]), "é\u{FFFD}");
    }

    #[test]
    fn test_decode_stops_when_receiver_gone() {
        let mut seen = Vec::new();
        decode_utf8(&b"abc"[..], |ch| {
            seen.push(ch);
            seen.len() < 2
        });
        assert_eq!(seen, vec!['a', 'b']);
    }
}
