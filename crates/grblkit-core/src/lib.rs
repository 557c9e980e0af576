//! # GrblKit Core
//!
//! Core types shared by every GrblKit layer: the error taxonomy, the
//! physical quantities used for unit-correct settings decoding, and the
//! G-code line model sent over the wire.

pub mod error;
pub mod gcode;
pub mod units;

pub use error::{ClientError, Error, Result, SettingsError, StatusError};
pub use gcode::{Line, Word};
pub use units::{Accel, Distance, Rate};
