//! Drivers for the EOL rig.
//!
//! Real drivers talk to the instruments (serial MCU and loadcell, SCPI power
//! supply and analyzer, AXL robot and DIO boards); `mock` provides in-memory
//! counterparts with fault injection. Both implement the `eol_traits` device
//! traits.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod axl;
pub mod bs205;
pub mod engine;
pub mod error;
pub mod integration;
pub mod mcu;
pub mod mock;
pub mod oda;
pub mod protocol;
pub mod scpi;
pub mod transport;
pub mod wt1800e;

mod peak;

pub use axl::{AxlDigitalIo, AxlRobot, AxlSettings, DioBoard, MotionBoard};
pub use bs205::{Bs205LoadCell, Bs205Settings};
pub use engine::{CommandRequest, CommandResponseEngine, ResponseSet};
pub use error::HwError;
pub use integration::{IntegrationState, IntegrationStateManager, TransitionRejected};
pub use mcu::{LmaMcu, LmaSettings};
pub use oda::{OdaPowerSupply, OdaSettings};
pub use transport::{SerialOpener, StreamTransport, Transport, TransportOpener};
pub use wt1800e::{Wt1800ePowerAnalyzer, Wt1800eSettings};
