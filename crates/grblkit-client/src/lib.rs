//! # GrblKit Client
//!
//! Streaming client for the Grbl serial protocol. Frames the inbound byte
//! stream, pipelines outbound commands against a shadow model of the
//! controller's receive buffer, correlates acknowledgments in strict FIFO
//! order, dispatches realtime bytes out-of-band, and recovers from
//! controller resets.

pub mod client;
pub mod framer;
pub mod grbl;
pub mod realtime;
pub mod serial;
pub mod settings;
pub mod status;

pub use client::{
    Client, ClientConfig, ClientMode, Push, Response, LEGACY_RX_BUFFER_SIZE, RX_BUFFER_SIZE,
};
pub use framer::{Frame, FrameReader};
pub use grbl::{Grbl, LineStatus};
pub use serial::{list_ports, SerialPortInfo, SerialTransport};
pub use settings::{Axes, PortInvertMask, Settings, StatusReportOptions};
pub use status::{Aux, MachineState, Overrides, Pins, SpindleDirection, Status, StatusField};
