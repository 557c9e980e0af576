//! Serial transport plumbing.
//!
//! Port discovery plus an adapter that drives a blocking serial port from
//! dedicated threads and exposes it as an async byte stream the client
//! can own. The client itself stays generic over `AsyncRead + AsyncWrite`;
//! this module only supplies the common case of a physical device.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;

/// Information about an available serial port.
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,
    /// USB manufacturer name if available
    pub manufacturer: Option<String>,
    /// USB serial number if available
    pub serial_number: Option<String>,
    /// USB vendor ID if applicable
    pub usb_vid: Option<u16>,
    /// USB product ID if applicable
    pub usb_pid: Option<u16>,
}

/// Enumerate serial ports present on the system.
pub fn list_ports() -> io::Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|err| io::Error::other(format!("failed to enumerate ports: {err}")))?;

    Ok(ports
        .into_iter()
        .map(|port| {
            let mut info = SerialPortInfo {
                port_name: port.port_name,
                manufacturer: None,
                serial_number: None,
                usb_vid: None,
                usb_pid: None,
            };
            if let serialport::SerialPortType::UsbPort(usb) = port.port_type {
                info.manufacturer = usb.manufacturer;
                info.serial_number = usb.serial_number;
                info.usb_vid = Some(usb.vid);
                info.usb_pid = Some(usb.pid);
            }
            info
        })
        .collect())
}

enum ReadEvent {
    Data(Vec<u8>),
    Error(io::Error),
}

/// A serial port driven by reader/writer threads, usable wherever the
/// client expects an async duplex stream.
pub struct SerialTransport {
    incoming: mpsc::Receiver<ReadEvent>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    buffered: VecDeque<u8>,
}

impl SerialTransport {
    /// Open `path` at `baud_rate` and spawn the bridge threads.
    pub fn open(path: &str, baud_rate: u32) -> io::Result<SerialTransport> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|err| io::Error::other(format!("failed to open {path}: {err}")))?;
        let writer_port = port
            .try_clone()
            .map_err(|err| io::Error::other(format!("failed to clone {path}: {err}")))?;

        let (read_tx, read_rx) = mpsc::channel(32);
        let (write_tx, write_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        std::thread::spawn(move || read_thread(port, read_tx));
        std::thread::spawn(move || write_thread(writer_port, write_rx));

        Ok(SerialTransport {
            incoming: read_rx,
            outgoing: write_tx,
            buffered: VecDeque::new(),
        })
    }
}

fn read_thread(mut port: Box<dyn serialport::SerialPort>, tx: mpsc::Sender<ReadEvent>) {
    let mut buf = [0u8; 1024];
    loop {
        match port.read(&mut buf) {
            Ok(0) => {
                let _ = tx.blocking_send(ReadEvent::Error(io::ErrorKind::UnexpectedEof.into()));
                return;
            }
            Ok(n) => {
                if tx.blocking_send(ReadEvent::Data(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                if tx.is_closed() {
                    return;
                }
            }
            Err(err) => {
                let _ = tx.blocking_send(ReadEvent::Error(err));
                return;
            }
        }
    }
}

fn write_thread(
    mut port: Box<dyn serialport::SerialPort>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(data) = rx.blocking_recv() {
        if port.write_all(&data).and_then(|()| port.flush()).is_err() {
            // the reader thread surfaces the port failure
            return;
        }
    }
}

impl AsyncRead for SerialTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.buffered.is_empty() {
            let take = self.buffered.len().min(buf.remaining());
            for _ in 0..take {
                let b = self.buffered.pop_front().expect("len checked");
                buf.put_slice(&[b]);
            }
            return Poll::Ready(Ok(()));
        }

        match self.incoming.poll_recv(cx) {
            Poll::Ready(Some(ReadEvent::Data(data))) => {
                let take = data.len().min(buf.remaining());
                buf.put_slice(&data[..take]);
                self.buffered.extend(&data[take..]);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Some(ReadEvent::Error(err))) => Poll::Ready(Err(err)),
            Poll::Ready(None) => Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncWrite for SerialTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.outgoing.send(data.to_vec()) {
            Ok(()) => Poll::Ready(Ok(data.len())),
            Err(_) => Poll::Ready(Err(io::ErrorKind::BrokenPipe.into())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
