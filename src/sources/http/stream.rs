use std::io::{self, Read, Seek, SeekFrom};

use symphonia::core::io::MediaSource;

/// Forward-only body reader fed by an async pump task.
///
/// Reads block the calling thread, so it must only be driven from blocking
/// contexts (probing on `spawn_blocking`, the voice pacing thread).
pub struct StreamReader {
    chunks: flume::Receiver<io::Result<Vec<u8>>>,
    current: Vec<u8>,
    offset: usize,
    position: u64,
    len: Option<u64>,
}

impl StreamReader {
    /// Spawns the pump onto the current runtime.
    pub fn spawn(mut response: reqwest::Response) -> Self {
        let len = response.content_length();
        let (tx, rx) = flume::bounded(32);

        tokio::spawn(async move {
            loop {
                let next = match response.chunk().await {
                    Ok(Some(chunk)) => Ok(chunk.to_vec()),
                    Ok(None) => break,
                    Err(e) => Err(io::Error::other(e)),
                };
                let failed = next.is_err();
                if tx.send_async(next).await.is_err() || failed {
                    break;
                }
            }
        });

        Self {
            chunks: rx,
            current: Vec::new(),
            offset: 0,
            position: 0,
            len,
        }
    }
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.offset >= self.current.len() {
            match self.chunks.recv() {
                Ok(chunk) => {
                    self.current = chunk?;
                    self.offset = 0;
                }
                Err(flume::RecvError::Disconnected) => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len() - self.offset);
        buf[..n].copy_from_slice(&self.current[self.offset..self.offset + n]);
        self.offset += n;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for StreamReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.position),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "http streams are not seekable",
            )),
        }
    }
}

impl MediaSource for StreamReader {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}
