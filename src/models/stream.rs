use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Framing used for the body of a streamed chat response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamProtocol {
    /// Line-oriented data-stream parts (`0:"text"`, `3:"error"`, `d:{...}`).
    #[default]
    Data,
    /// Raw text fragments, no framing.
    Text,
}

impl StreamProtocol {
    pub const DATA_STREAM_HEADER: &'static str = "x-vercel-ai-data-stream";
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid stream protocol: '{0}' (expected 'data' or 'text')")]
pub struct ParseStreamProtocolError(String);

impl FromStr for StreamProtocol {
    type Err = ParseStreamProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "data" => Ok(StreamProtocol::Data),
            "text" => Ok(StreamProtocol::Text),
            _ => Err(ParseStreamProtocolError(s.to_string())),
        }
    }
}

impl fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamProtocol::Data => write!(f, "data"),
            StreamProtocol::Text => write!(f, "text"),
        }
    }
}

/// One line of the data-stream protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPart {
    Text(String),
    Error(String),
    Finish,
}

#[derive(Debug, Error)]
pub enum StreamPartError {
    #[error("malformed stream part (no type prefix): {0}")]
    MissingPrefix(String),
    #[error("malformed stream part payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl StreamPart {
    /// Encodes the part as a single newline-terminated line.
    pub fn encode(&self) -> String {
        match self {
            StreamPart::Text(text) => format!("0:{}\n", Value::String(text.clone())),
            StreamPart::Error(message) => format!("3:{}\n", Value::String(message.clone())),
            StreamPart::Finish => "d:{\"finishReason\":\"stop\"}\n".to_string(),
        }
    }

    /// Decodes one line. Part types this crate does not produce yield `Ok(None)`.
    pub fn decode(line: &str) -> Result<Option<StreamPart>, StreamPartError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(None);
        }
        let (code, payload) = line
            .split_once(':')
            .ok_or_else(|| StreamPartError::MissingPrefix(line.to_string()))?;

        match code {
            "0" => Ok(Some(StreamPart::Text(serde_json::from_str(payload)?))),
            "3" => Ok(Some(StreamPart::Error(serde_json::from_str(payload)?))),
            "d" => Ok(Some(StreamPart::Finish)),
            _ => Ok(None),
        }
    }
}

/// Reassembles newline-delimited text from arbitrarily split byte chunks.
///
/// Bytes are held until a full line is seen, so multi-byte characters and
/// lines that straddle network chunks come out intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every line completed by them, without
    /// the trailing `\n` / `\r\n`.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        // Only the new bytes can contain a newline the pending ones lacked.
        let scan_from = self.pending.len();
        self.pending.extend_from_slice(bytes);
        let Some(last_newline) = self.pending[scan_from..]
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|pos| scan_from + pos) else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(|raw| String::from_utf8_lossy(raw).trim_end_matches('\r').to_string())
            .collect()
    }

    /// Returns the unterminated tail, if any, once the source is exhausted.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
        if text.is_empty() { None } else { Some(text) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_part_escapes_newlines_and_quotes() {
        let line = StreamPart::Text("say \"hi\"\nnow".into()).encode();
        assert_eq!(line, "0:\"say \\\"hi\\\"\\nnow\"\n");
        assert_eq!(
            StreamPart::decode(&line).unwrap(),
            Some(StreamPart::Text("say \"hi\"\nnow".into()))
        );
    }

    #[test]
    fn finish_and_error_parts_decode() {
        assert_eq!(
            StreamPart::decode(&StreamPart::Finish.encode()).unwrap(),
            Some(StreamPart::Finish)
        );
        assert_eq!(
            StreamPart::decode("3:\"upstream closed\"").unwrap(),
            Some(StreamPart::Error("upstream closed".into()))
        );
    }

    #[test]
    fn unknown_part_types_are_skipped() {
        assert_eq!(StreamPart::decode("e:{\"finishReason\":\"stop\"}").unwrap(), None);
        assert_eq!(StreamPart::decode("").unwrap(), None);
        assert!(StreamPart::decode("no prefix here").is_err());
    }

    #[test]
    fn line_buffer_joins_lines_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        assert_eq!(buf.push(b":1}\r\ndata: x\n\npartial"), vec![
            "data: {\"a\":1}".to_string(),
            "data: x".to_string(),
            String::new()
        ]);
        assert_eq!(buf.finish(), Some("partial".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_keeps_multibyte_characters_intact() {
        let text = "héllo\n".as_bytes();
        let mut buf = LineBuffer::new();
        assert!(buf.push(&text[..2]).is_empty());
        assert_eq!(buf.push(&text[2..]), vec!["héllo".to_string()]);
    }

    #[test]
    fn line_buffer_splits_a_large_chunk_in_one_pass() {
        let body: String = (0..2000).map(|i| format!("0:\"{}\"\n", i)).collect::<String>() + "0:\"tail";
        let mut buf = LineBuffer::new();
        let lines = buf.push(body.as_bytes());
        assert_eq!(lines.len(), 2000);
        assert_eq!(lines[0], "0:\"0\"");
        assert_eq!(lines[1999], "0:\"1999\"");
        assert_eq!(buf.push(b"\"\n"), vec!["0:\"tail\"".to_string()]);
    }

    #[test]
    fn protocol_parses_case_insensitively() {
        assert_eq!("TEXT".parse::<StreamProtocol>().unwrap(), StreamProtocol::Text);
        assert_eq!("data".parse::<StreamProtocol>().unwrap(), StreamProtocol::Data);
        assert!("sse".parse::<StreamProtocol>().is_err());
    }
}
