//! Relay of provider completion streams to the caller
//!
//! Providers answer with server-sent events (`data: {...}` lines ending
//! in `data: [DONE]`) or with bare JSON lines. The relay forwards each
//! JSON chunk as one newline-terminated line as soon as it is complete,
//! which is the format the editor reads.

use bytes::Bytes;
use futures_util::StreamExt;
use log::{debug, error, trace};
use serde::Deserialize;
use tokio::sync::mpsc;

/// Chunks buffered between the upstream reader and the response body
pub const RELAY_BUFFER: usize = 32;

pub type RelayItem = Result<Bytes, std::io::Error>;

/// Longest line held while waiting for its newline
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a byte stream into lines, holding partial lines (and partial
/// UTF-8 sequences) until their newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer
{   pending: Vec<u8>
  , /// Bytes of `pending` already known to hold no newline
    scanned: usize
}

impl LineBuffer
{   /// Append a chunk and return the lines it completed. Fails once a
    /// partial line grows past [`MAX_LINE_BYTES`].
    pub fn push(&mut self, chunk: &[u8])
      -> Result<Vec<String>, crate::error::Error>
    {   self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.pending[self.scanned..]
          .iter()
          .position(|b| *b == b'\n')
        {   let end = self.scanned + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
            self.scanned = start;
        }

        self.pending.drain(..start);
        self.scanned = self.pending.len();

        if self.pending.len() > MAX_LINE_BYTES
        {   return Err(crate::error::Error::ParseError(format!(
              "stream line exceeds {} bytes",
              MAX_LINE_BYTES
            )));
        }
        Ok(lines)
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String>
    {   self.scanned = 0;
        if self.pending.is_empty()
        {   return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(raw: &[u8]) -> String
{   let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Turn one upstream line into the relayed line, if it carries a chunk.
pub fn frame_line(line: &str) -> Option<String>
{   let line = line.trim();
    if line.is_empty() || line.starts_with(':')
    {   return None;
    }
    let payload = match line.strip_prefix("data:")
    {   Some(data) => data.trim()
      , None if is_sse_field(line) => return None
      , None => line
    };
    if payload.is_empty() || payload == "[DONE]"
    {   return None;
    }
    Some(format!("{}\n", payload))
}

fn is_sse_field(line: &str) -> bool
{   ["event:", "id:", "retry:"]
      .iter()
      .any(|field| line.starts_with(field))
}

/// Spawn the relay for a successful provider response.
///
/// Dropping the receiver (the caller went away) stops the task even
/// while the provider is silent, which drops the upstream response and
/// closes the provider connection.
pub fn relay(response: reqwest::Response) -> mpsc::Receiver<RelayItem>
{   let (tx, rx) = mpsc::channel(RELAY_BUFFER);
    tokio::spawn(async move {
      run_relay(response, tx).await
    });
    rx
}

async fn run_relay(
  response: reqwest::Response
, tx: mpsc::Sender<RelayItem>
)
{   let mut body = response.bytes_stream();
    let mut lines = LineBuffer::default();
    let mut relayed = 0usize;

    loop
    {   let next = tokio::select!
        {   next = body.next() => next
          , _ = tx.closed() => {
              debug!("Caller disconnected; aborting provider stream");
              return;
            }
        };
        let Some(next) = next else
        {   break;
        };

        let chunk = match next
        {   Ok(chunk) => chunk
          , Err(e) => {
              error!("Provider stream broke after {} chunks: {}", relayed, e);
              let _ = tx.send(Err(std::io::Error::other(
                "completion stream interrupted"
              ))).await;
              return;
            }
        };
        trace!("Provider sent {} bytes", chunk.len());

        let completed = match lines.push(&chunk)
        {   Ok(completed) => completed
          , Err(e) => {
              error!("Dropping provider stream after {} chunks: {}", relayed, e);
              let _ = tx.send(Err(std::io::Error::other(
                "completion stream malformed"
              ))).await;
              return;
            }
        };

        for line in completed
        {   if let Some(framed) = frame_line(&line)
            {   if tx.send(Ok(Bytes::from(framed))).await.is_err()
                {   debug!("Caller disconnected; aborting provider stream");
                    return;
                }
                relayed += 1;
            }
        }
    }

    if let Some(framed) = lines.finish().as_deref().and_then(frame_line)
    {   if tx.send(Ok(Bytes::from(framed))).await.is_ok()
        {   relayed += 1;
        }
    }
    debug!("Provider stream finished after {} chunks", relayed);
}

// ===== Chunk decoding =====

#[derive(Debug, Deserialize)]
struct StreamChunk
{   #[serde(default)]
    choices: Vec<StreamChoice>
}

#[derive(Debug, Deserialize)]
struct StreamChoice
{   #[serde(default)]
    delta: Option<StreamDelta>
}

#[derive(Debug, Deserialize)]
struct StreamDelta
{   #[serde(default)]
    content: Option<String>
}

/// Content fragment of one relayed line (`choices[0].delta.content`).
pub fn chunk_content(line: &str)
  -> Result<String, crate::error::Error>
{   let chunk: StreamChunk = serde_json::from_str(line)?;
    Ok(chunk.choices
      .into_iter()
      .next()
      .and_then(|c| c.delta)
      .and_then(|d| d.content)
      .unwrap_or_default())
}

/// Concatenated content of a full relayed body. Lines that fail to parse
/// are skipped, as the editor does.
pub fn collect_content(body: &[u8]) -> String
{   body.split(|b| *b == b'\n')
      .map(decode_line)
      .filter(|line| !line.trim().is_empty())
      .filter_map(|line| match chunk_content(&line)
      {   Ok(content) => Some(content)
        , Err(e) => {
            debug!("Skipping unparsable chunk {:?}: {}", line, e);
            None
          }
      })
      .collect()
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn lines_survive_chunk_boundaries()
    {   let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data: {\"a\"").unwrap().is_empty());
        assert_eq!(
          buffer.push(b":1}\r\n\n").unwrap(),
          vec!["data: {\"a\":1}", ""]
        );
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn split_utf8_sequence_is_reassembled()
    {   let text = "续".as_bytes();
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(&text[..1]).unwrap().is_empty());
        let mut tail = text[1..].to_vec();
        tail.push(b'\n');
        assert_eq!(buffer.push(&tail).unwrap(), vec!["续"]);
    }

    #[test]
    fn lines_split_over_many_chunks_are_joined()
    {   let mut buffer = LineBuffer::default();
        for piece in ["da", "ta: ", "{\"n\"", ":2}"]
        {   assert!(buffer.push(piece.as_bytes()).unwrap().is_empty());
        }
        assert_eq!(
          buffer.push(b"\n{\"n\":3}\n{").unwrap(),
          vec!["data: {\"n\":2}", "{\"n\":3}"]
        );
        assert_eq!(buffer.finish(), Some("{".to_string()));
    }

    #[test]
    fn unterminated_line_past_cap_fails()
    {   let mut buffer = LineBuffer::default();
        let block = vec![b'x'; 64 * 1024];
        for _ in 0..(MAX_LINE_BYTES / block.len())
        {   assert!(buffer.push(&block).is_ok());
        }
        match buffer.push(b"x")
        {   Err(crate::error::Error::ParseError(msg)) => {
              assert!(msg.contains("exceeds"), "{msg}");
            }
          , other => panic!("expected overflow error, got {:?}", other)
        }
    }

    #[test]
    fn sse_framing_becomes_json_lines()
    {   assert_eq!(frame_line("data: {\"x\":1}"), Some("{\"x\":1}\n".to_string()));
        assert_eq!(frame_line("{\"x\":1}"), Some("{\"x\":1}\n".to_string()));
        assert_eq!(frame_line("data: [DONE]"), None);
        assert_eq!(frame_line(": keep-alive"), None);
        assert_eq!(frame_line("event: message"), None);
        assert_eq!(frame_line("   "), None);
    }

    #[test]
    fn content_is_concatenated_across_lines()
    {   let body = concat!(
          "{\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n",
          "{\"choices\":[{\"delta\":{}}]}\n",
          "not json\n",
          "{\"choices\":[{\"delta\":{\"content\":\"B\"}}]}"
        );
        assert_eq!(collect_content(body.as_bytes()), "AB");
    }
}
