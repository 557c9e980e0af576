//! Frame extraction from the controller byte stream.
//!
//! The controller interleaves newline-terminated response lines with
//! `<...>` bracketed realtime status reports. [`FrameReader`] splits the
//! raw stream into those two frame kinds, stripping carriage returns and
//! spaces and skipping empty frames.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

/// A logical unit read from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A newline-terminated response or push line.
    Line(String),
    /// The interior of a `<...>` realtime status report.
    Report(String),
}

/// Incremental frame reader over a raw byte stream.
///
/// Holds only accumulation buffers; all interpretation of frame content
/// happens downstream.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    report: Vec<u8>,
    in_report: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader {
            reader: BufReader::new(inner),
            line: Vec::with_capacity(128),
            report: Vec::with_capacity(128),
            in_report: false,
        }
    }

    /// Read until the next complete, non-empty frame.
    ///
    /// The stream ending mid-frame surfaces as the underlying I/O error
    /// (`UnexpectedEof`), never as a partial frame.
    pub async fn next_frame(&mut self) -> io::Result<Frame> {
        loop {
            let b = self.reader.read_u8().await?;
            match b {
                b'\r' | b' ' => {}
                b'<' if !self.in_report => self.in_report = true,
                b'>' if self.in_report => {
                    self.in_report = false;
                    if !self.report.is_empty() {
                        return Ok(Frame::Report(take_string(&mut self.report)));
                    }
                }
                b'\n' => {
                    if self.in_report {
                        // unterminated report; the newline closes it
                        self.in_report = false;
                        if !self.report.is_empty() {
                            return Ok(Frame::Report(take_string(&mut self.report)));
                        }
                    } else if !self.line.is_empty() {
                        return Ok(Frame::Line(take_string(&mut self.line)));
                    }
                }
                _ => {
                    if self.in_report {
                        self.report.push(b);
                    } else {
                        self.line.push(b);
                    }
                }
            }
        }
    }
}

fn take_string(buf: &mut Vec<u8>) -> String {
    let s = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn frames(input: &[u8]) -> Vec<Frame> {
        let mut reader = FrameReader::new(input);
        let mut out = Vec::new();
        loop {
            match reader.next_frame().await {
                Ok(frame) => out.push(frame),
                Err(err) => {
                    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
                    return out;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_plain_lines() {
        let got = frames(b"ok\r\nerror:20\r\n").await;
        assert_eq!(
            got,
            vec![
                Frame::Line("ok".to_string()),
                Frame::Line("error:20".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_report_frame() {
        let got = frames(b"<Idle|MPos:0.000,0.000,0.000>\r\n").await;
        assert_eq!(
            got,
            vec![Frame::Report("Idle|MPos:0.000,0.000,0.000".to_string())]
        );
    }

    #[tokio::test]
    async fn test_blank_lines_skipped() {
        let got = frames(b"\r\n\r\nok\r\n\r\n").await;
        assert_eq!(got, vec![Frame::Line("ok".to_string())]);
    }

    #[tokio::test]
    async fn test_spaces_discarded() {
        let got = frames(b"$10 = 3\r\n").await;
        assert_eq!(got, vec![Frame::Line("$10=3".to_string())]);
    }

    #[tokio::test]
    async fn test_empty_report_skipped() {
        let got = frames(b"<>\r\nok\r\n").await;
        assert_eq!(got, vec![Frame::Line("ok".to_string())]);
    }

    #[tokio::test]
    async fn test_report_between_lines() {
        let got = frames(b"ok\n<Run>\nerror:1\n").await;
        assert_eq!(
            got,
            vec![
                Frame::Line("ok".to_string()),
                Frame::Report("Run".to_string()),
                Frame::Line("error:1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_error() {
        let mut reader = FrameReader::new(&b"<Idle|MPos:1.0"[..]);
        let err = reader.next_frame().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_eof_mid_line_is_error() {
        let mut reader = FrameReader::new(&b"ok"[..]);
        let err = reader.next_frame().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_newline_terminates_report() {
        let got = frames(b"<Hold:0\nok\n").await;
        assert_eq!(
            got,
            vec![
                Frame::Report("Hold:0".to_string()),
                Frame::Line("ok".to_string()),
            ]
        );
    }
}
