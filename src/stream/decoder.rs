/// One decoded unit of the wire protocol: an optional event tag and a
/// data payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub tag: Option<String>,
    pub data: String,
}

/// Reassembles frames from an append-only stream of byte chunks.
///
/// Chunks may split anywhere, including inside a multi-byte UTF-8
/// sequence or between the `event:` line and its `data:` line. The
/// decoder buffers bytes until a full line arrives, so a frame is never
/// emitted from a partial line; splitting on `\n` at the byte level is
/// safe because `0x0A` cannot occur inside a multi-byte sequence.
///
/// The only state is the carry-over buffer and the pending tag, which
/// makes decoding resumable from any chunk boundary.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    carry: Vec<u8>,
    tag: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every frame completed by it, in
    /// arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.carry.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.carry.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            self.process_line(&line, &mut frames);
        }
        frames
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<Frame>) {
        if let Some(rest) = line.strip_prefix("event:") {
            let tag = rest.trim();
            self.tag = (!tag.is_empty()).then(|| tag.to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            // The data line consumes the pending tag whether or not it
            // yields a frame.
            let tag = self.tag.take();
            let payload = rest.trim();
            if payload.is_empty() {
                // Keep-alive.
                return;
            }
            out.push(Frame {
                tag,
                data: payload.to_string(),
            });
        } else if !line.is_empty() {
            tracing::trace!(line, "ignoring line matching no marker");
        }
    }
}
