//! File-backed plugins
//!
//! Records on disk are stored one after another, each followed by a line
//! holding only the payload separator:
//!
//! ```text
//! 1 8f3a...e901 1700000000000000000 -1\n
//! GET / HTTP/1.1\r\n
//! \r\n
//! 🐵🙈🙉\n
//! 2 8f3a...7c11 1700000000002000000 2000000\n
//! ...
//! ```
//!
//! A record crosses these plugins byte-for-byte, so a capture written by
//! [`FileOutput`] replays unchanged through [`FileInput`].

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use relay_dataplane::{Input, Output};
use std::io;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Line separating records in a file
pub const PAYLOAD_SEPARATOR: &str = "🐵🙈🙉";

/// Reads records from a separator-delimited file
pub struct FileInput {
    name: String,
    reader: BufReader<File>,
    line: Vec<u8>,
}

impl FileInput {
    /// Open `path` for reading
    pub async fn open(name: impl Into<String>, path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            name: name.into(),
            reader: BufReader::new(file),
            line: Vec::new(),
        })
    }
}

fn is_separator(line: &[u8]) -> bool {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line == PAYLOAD_SEPARATOR.as_bytes()
}

#[async_trait]
impl Input for FileInput {
    async fn read(&mut self) -> io::Result<Option<Bytes>> {
        let mut record = BytesMut::new();

        loop {
            self.line.clear();
            let n = self.reader.read_until(b'\n', &mut self.line).await?;

            if n == 0 {
                // Trailing record without separator is kept as is
                if record.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(record.freeze()));
            }
            if is_separator(&self.line) {
                break;
            }
            record.extend_from_slice(&self.line);
        }

        // Newline preceding the separator belongs to the file layout
        if record.ends_with(b"\n") {
            record.truncate(record.len() - 1);
        }
        Ok(Some(record.freeze()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Appends records to a file
pub struct FileOutput {
    name: String,
    file: Mutex<File>,
}

impl FileOutput {
    /// Open `path` for appending, creating it if needed
    pub async fn open(name: impl Into<String>, path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        Ok(Self {
            name: name.into(),
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl Output for FileOutput {
    async fn write(&self, frame: Bytes) -> io::Result<()> {
        let mut buf = BytesMut::with_capacity(frame.len() + PAYLOAD_SEPARATOR.len() + 2);
        buf.extend_from_slice(&frame);
        buf.extend_from_slice(b"\n");
        buf.extend_from_slice(PAYLOAD_SEPARATOR.as_bytes());
        buf.extend_from_slice(b"\n");

        // One write per record keeps concurrent writers from interleaving
        let mut file = self.file.lock().await;
        file.write_all(&buf).await?;
        file.flush().await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_common::{RecordId, RecordKind, Timestamp};
    use relay_dataplane::{decode, frame, Header};

    fn sample(body: &[u8]) -> Bytes {
        let header = Header::full(RecordKind::Request, RecordId::generate(), Timestamp::now(), 42);
        frame(&header, body)
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.gor");

        let records = vec![
            sample(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n"),
            sample(b"POST /form HTTP/1.1\r\n\r\nfield=1\n"),
            sample(b""),
        ];

        let output = FileOutput::open("out", &path).await.unwrap();
        for record in &records {
            output.write(record.clone()).await.unwrap();
        }
        drop(output);

        let mut input = FileInput::open("in", &path).await.unwrap();
        for record in &records {
            let read = input.read().await.unwrap().unwrap();
            assert_eq!(&read, record);
            assert!(decode(&read).is_ok());
        }
        assert!(input.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trailing_record_without_separator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.gor");
        let content = format!(
            "1 abcdefghijklmnopqrstuvwx 1 -1\nGET / HTTP/1.1\r\n\r\n\n{PAYLOAD_SEPARATOR}\n2 abcdefghijklmnopqrstuvwx 2 1\nHTTP/1.1 200 OK\r\n\r\n"
        );
        std::fs::write(&path, content).unwrap();

        let mut input = FileInput::open("in", &path).await.unwrap();
        let first = input.read().await.unwrap().unwrap();
        assert_eq!(decode(&first).unwrap().body(), b"GET / HTTP/1.1\r\n\r\n");

        let second = input.read().await.unwrap().unwrap();
        let env = decode(&second).unwrap();
        assert_eq!(env.header.kind, RecordKind::Response);
        assert_eq!(env.body(), b"HTTP/1.1 200 OK\r\n\r\n");

        assert!(input.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_output_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.gor");
        let record = sample(b"GET / HTTP/1.1\r\n\r\n");

        for _ in 0..2 {
            let output = FileOutput::open("out", &path).await.unwrap();
            output.write(record.clone()).await.unwrap();
        }

        let mut input = FileInput::open("in", &path).await.unwrap();
        assert_eq!(input.read().await.unwrap().unwrap(), record);
        assert_eq!(input.read().await.unwrap().unwrap(), record);
        assert!(input.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_input_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileInput::open("in", dir.path().join("absent")).await.is_err());
    }
}
