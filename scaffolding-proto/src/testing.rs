use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// In-memory stream that replays scripted reads and records writes.
#[derive(Default)]
pub struct ScriptedStream {
    reads: VecDeque<Result<Vec<u8>, io::ErrorKind>>,
    written: Vec<u8>,
    write_limit: Option<usize>,
    write_error: Option<io::ErrorKind>,
}

impl ScriptedStream {
    /// Each read yields at most `chunk` bytes of `data`, then EOF.
    pub fn chunked(data: &[u8], chunk: usize) -> Self {
        Self {
            reads: data.chunks(chunk.max(1)).map(|c| Ok(c.to_vec())).collect(),
            ..Default::default()
        }
    }

    pub fn from_reads(reads: Vec<Result<Vec<u8>, io::ErrorKind>>) -> Self {
        Self {
            reads: reads.into(),
            ..Default::default()
        }
    }

    pub fn with_write_limit(limit: usize) -> Self {
        Self {
            write_limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn failing_writes(kind: io::ErrorKind) -> Self {
        Self {
            write_error: Some(kind),
            ..Default::default()
        }
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            None => Ok(0),
            Some(Err(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(Ok(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.reads.push_front(Ok(chunk.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.write_error {
            return Err(io::Error::new(kind, "scripted failure"));
        }
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl crate::session::SessionStream for ScriptedStream {}
