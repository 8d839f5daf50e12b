//! Response framing for debugger output
//!
//! GDB/MI carries no command identifiers, so a response is everything up to
//! and including the next result record:
//! ```text
//! =thread-group-added,id="i1"
//! (gdb)
//! ^done,asm_insns=[...]
//! (gdb)
//! ```
//! Console (batch) output has no terminator at all; the process exiting ends
//! the frame.

use super::types::{Dialect, Frame, FrameStatus};

/// Accumulates chunked process output and cuts it into frames
#[derive(Debug)]
pub struct Framer {
    dialect: Dialect,
    buf: Vec<u8>,
    /// Start of the first line not yet checked for a result record
    scan_from: usize,
}

impl Framer {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            buf: Vec::new(),
            scan_from: 0,
        }
    }

    /// Append a chunk exactly as it was read from the pipe
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet part of a frame
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Cut the next complete frame off the front of the buffer
    ///
    /// Only complete lines are tested, so a result record split across any
    /// number of chunks is recognised once, when its newline arrives. Console
    /// output never yields a frame here; see [`Framer::finish`].
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.dialect == Dialect::CliText {
            return None;
        }

        while let Some(rel) = self.buf[self.scan_from..].iter().position(|&b| b == b'\n') {
            let line_end = self.scan_from + rel + 1;
            let line = &self.buf[self.scan_from..line_end];

            if result_class(line).is_some() {
                let raw: Vec<u8> = self.buf.drain(..line_end).collect();
                self.scan_from = 0;
                return Some(postprocess(&String::from_utf8_lossy(&raw)));
            }

            self.scan_from = line_end;
        }

        None
    }

    /// End of stream: everything accumulated is one frame
    pub fn finish(self) -> Frame {
        Frame::new(
            FrameStatus::Exited,
            String::from_utf8_lossy(&self.buf).into_owned(),
        )
    }
}

/// Result class of a line that starts a `^done` / `^error` record
fn result_class(line: &[u8]) -> Option<FrameStatus> {
    let (status, rest) = if let Some(rest) = line.strip_prefix(b"^done") {
        (FrameStatus::Done, rest)
    } else if let Some(rest) = line.strip_prefix(b"^error") {
        (FrameStatus::Error, rest)
    } else {
        return None;
    };

    match rest.first() {
        None | Some(b',') | Some(b'\r') | Some(b'\n') => Some(status),
        _ => None,
    }
}

/// Strip a raw frame down to the result record's payload
///
/// Everything up to and including the last `^done,` / `^error,` token goes,
/// as does a trailing `(gdb)` prompt and anything after it.
pub fn postprocess(raw: &str) -> Frame {
    let mut status = FrameStatus::Done;
    let mut body_start = 0;

    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if let Some(class) = result_class(line.as_bytes()) {
            status = class;
            let token_len = match class {
                FrameStatus::Error => "^error".len(),
                _ => "^done".len(),
            };
            body_start = offset + token_len;
            if raw[body_start..].starts_with(',') {
                body_start += 1;
            }
        }
        offset += line.len();
    }

    let mut body = &raw[body_start..];
    if let Some(prompt) = find_prompt(body) {
        body = &body[..prompt];
    }

    Frame::new(status, body.trim_end_matches(['\r', '\n']))
}

/// Byte offset of the line break that precedes a `(gdb)` prompt line
fn find_prompt(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.starts_with("(gdb)") {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "=thread-group-added,id=\"i1\"\n(gdb) \n^done,asm_insns=[{address=\"0x80000000\"}]\n(gdb) \n";

    fn frames_from_chunks(chunks: &[&[u8]]) -> Vec<Frame> {
        let mut framer = Framer::new(Dialect::Structured);
        let mut frames = Vec::new();
        for chunk in chunks {
            framer.push(chunk);
            while let Some(frame) = framer.next_frame() {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn test_single_chunk() {
        let frames = frames_from_chunks(&[RESPONSE.as_bytes()]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].status, FrameStatus::Done);
        assert_eq!(frames[0].body, "asm_insns=[{address=\"0x80000000\"}]");
    }

    #[test]
    fn test_sentinel_split_at_every_chunk_size() {
        let bytes = RESPONSE.as_bytes();
        for size in 1..=bytes.len() {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            let frames = frames_from_chunks(&chunks);
            assert_eq!(frames.len(), 1, "chunk size {}", size);
            assert_eq!(frames[0].body, "asm_insns=[{address=\"0x80000000\"}]");
        }
    }

    #[test]
    fn test_partial_sentinel_does_not_complete() {
        let mut framer = Framer::new(Dialect::Structured);
        framer.push(b"^do");
        assert!(framer.next_frame().is_none());
        framer.push(b"ne,lines=[{pc=\"0x10\",line=\"4\"}");
        assert!(framer.next_frame().is_none());
        framer.push(b"]\n");
        let frame = framer.next_frame().unwrap();
        assert_eq!(frame.body, "lines=[{pc=\"0x10\",line=\"4\"}]");
        assert!(framer.next_frame().is_none());
    }

    #[test]
    fn test_error_record() {
        let frames = frames_from_chunks(&[
            "^error,msg=\"No symbol table is loaded.  Use the \\\"file\\\" command.\"\r\n(gdb) \r\n"
                .as_bytes(),
        ]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].status, FrameStatus::Error);
        assert!(frames[0].body.starts_with("msg=\"No symbol table"));
        assert!(!frames[0].body.ends_with('\r'));
    }

    #[test]
    fn test_bare_done_has_empty_body() {
        let frames = frames_from_chunks(&["^done\n(gdb) \n".as_bytes()]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, "");
    }

    #[test]
    fn test_stream_records_and_lookalikes_are_skipped() {
        let frames = frames_from_chunks(&[
            "~\"^done is not a record here\\n\"\n&\"warning\\n\"\n^doneish\n^done,x=\"1\"\n".as_bytes(),
        ]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, "x=\"1\"");
    }

    #[test]
    fn test_prompt_left_over_goes_to_next_frame_prefix() {
        let mut framer = Framer::new(Dialect::Structured);
        framer.push(b"^done,a=\"1\"\n(gdb) \n^done,b=\"2\"\n");
        let first = framer.next_frame().unwrap();
        let second = framer.next_frame().unwrap();
        assert_eq!(first.body, "a=\"1\"");
        assert_eq!(second.body, "b=\"2\"");
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn test_postprocess_strips_trailing_prompt() {
        let frame = postprocess("junk\n^done,lines=[]\n(gdb) \ntrailing");
        assert_eq!(frame.body, "lines=[]");
    }

    #[test]
    fn test_console_dialect_frames_on_finish() {
        let mut framer = Framer::new(Dialect::CliText);
        framer.push(b"Reading symbols from a.out...\n");
        framer.push(b"main in section .text\n");
        assert!(framer.next_frame().is_none());
        let frame = framer.finish();
        assert_eq!(frame.status, FrameStatus::Exited);
        assert_eq!(frame.body, "Reading symbols from a.out...\nmain in section .text\n");
    }
}
