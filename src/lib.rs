#![doc(html_root_url = "https://docs.rs/hivewire/latest")]
//! Public API for the `hivewire` library.
//!
//! `hivewire` multiplexes HTTP traffic between a coordinator (the *queen*)
//! and backend processes (*cells*). Each cell keeps one control connection
//! to the queen and any number of data connections (*bands*). Frames are a
//! one-byte kind tag followed by a payload whose shape the message catalog
//! fixes per kind.

pub mod cell;
pub mod codec;
pub mod error;
pub mod frame;
pub mod http;
pub mod kind;
mod link;
pub mod message;
pub mod metrics;
pub mod queen;
pub mod registry;
pub mod role;
pub mod session;

pub use cell::{Cell, CellError, CellSession, RequestHandler};
pub use codec::MessageCodec;
pub use error::{HiveError, ProtocolViolation, Result};
pub use http::{HttpRequest, HttpResponse};
pub use kind::FrameKind;
pub use message::{Message, MountPoint};
pub use metrics::{BANDS_ACTIVE, Direction, FRAMES_PROCESSED, SESSIONS_ACTIVE};
pub use queen::{DispatchError, Queen, QueenHandle};
pub use role::{ConnectionRole, Peer};
pub use session::SessionId;
