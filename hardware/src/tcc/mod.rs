//! Telescope Control Computer (TCC) link.
//!
//! The TCC speaks an ASCII, line-oriented protocol. We send commands tagged
//! with a fixed administrative command id and receive a mix of solicited and
//! unsolicited reply lines, from which we track the telescope state needed to
//! decide whether it is safe to apply a guide offset.
//!
//! # Protocol Overview
//!
//! Outgoing commands:
//!
//! ```text
//! 999 device status
//! 999 guideoffset <ra_deg>,<dec_deg>,<rot_deg>,0.0,0.0
//! ```
//!
//! Incoming replies (lower-cased before parsing):
//!
//! ```text
//! <cmdID> <userID> <kw=val>[;kw=val...]
//! ```
//!
//! An unsolicited `cmdID=0` line carrying `youruserid=<N>` assigns our session
//! id. Status keywords (`instrumentnum`, `axiscmdstate`, `secorient`) are read
//! from replies to the admin command id; unknown keywords are ignored.
//!
//! # Requests
//!
//! [`TccLink::update_status`] clears the status fields, sends a status query
//! and returns a [`StatusRequest`] that completes once both the instrument
//! number and the axis states have been seen again. Only one status request
//! is live at a time: starting another fails the previous one with
//! [`TccError::Superseded`].
//!
//! [`TccLink::offset`] refuses to write anything unless every axis is
//! tracking, and completes as soon as the command is written; confirmation
//! only arrives with a later status poll.
//!
//! # Connection Handling
//!
//! Every operation checks the connection first. A dropped link gets exactly
//! one reconnect attempt and the operation is retried once; a second failure
//! is reported to the caller as [`TccError::Connection`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hardware::tcc::{OffsetRequest, TccLink, TcpLineTransport};
//! use shared::{StaticPlateCatalog, TccSettings};
//!
//! # async fn run() -> Result<(), hardware::tcc::TccError> {
//! let settings = TccSettings::default();
//! let transport = TcpLineTransport::new(settings.address(), settings.connect_timeout());
//! let link = TccLink::new(transport, Arc::new(StaticPlateCatalog::new()), settings);
//!
//! link.connect().await?;
//! let state = link.update_status().await.wait().await?;
//! println!("instrument {:?}, plate {:?}", state.instrument_num(), state.plate_id());
//!
//! link.offset(&OffsetRequest::translation(1.5, -0.5)).await?;
//! # Ok(())
//! # }
//! ```

mod link;
pub mod mock;
mod protocol;
mod request;
mod state;
mod transport;

use std::time::Duration;

use thiserror::Error;

pub use link::TccLink;
pub use protocol::{status_command, Keyword, OffsetRequest, ReplyLine};
pub use request::{RequestState, StatusRequest};
pub use state::{AxisCmdState, TccState};
pub use transport::{LineReceiver, LineTransport, TcpLineTransport};

/// Errors from the TCC link.
///
/// Every failure a caller can see carries a human-readable reason; nothing
/// is dropped silently.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TccError {
    /// The link is down and the single reconnect attempt failed.
    #[error("TCC connection error: {0}")]
    Connection(String),

    /// A reply line could not be parsed. The link logs and drops such lines.
    #[error("cannot parse TCC reply: {0}")]
    ProtocolParse(String),

    /// The telescope axes are not all tracking.
    #[error("not ok to offset: {0}")]
    NotReady(String),

    /// A command was issued without the data it needs.
    #[error("missing data: {0}")]
    MissingData(String),

    /// The status request did not complete in time.
    #[error("TCC status did not complete within {0:?}")]
    Timeout(Duration),

    /// A newer status request replaced this one.
    #[error("status request superseded by a newer one")]
    Superseded,
}

/// Result type for TCC operations.
pub type TccResult<T> = Result<T, TccError>;

/// Connection state of a [`TccLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}
