//! Structured payload records.
//!
//! Field names are part of the wire contract and are pinned with serde
//! renames. Mappings use [`BTreeMap`] so that encoding is deterministic.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{error::ProtocolViolation, role::ConnectionRole, session::SessionId};

/// Mapping from a name to its values in arrival order.
pub type MultiMap = BTreeMap<String, Vec<String>>;

/// Identity announcement sent by a cell on every new connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IAm {
    /// Raw connection role number.
    pub conn_kind: i64,
    /// Session identifier; empty when opening a cell connection.
    pub uuid: String,
}

impl IAm {
    /// Announcement opening a cell's control connection.
    #[must_use]
    pub fn cell() -> Self {
        Self {
            conn_kind: ConnectionRole::Cell.conn_kind(),
            uuid: String::new(),
        }
    }

    /// Announcement opening a band for `session`.
    #[must_use]
    pub fn band(session: &SessionId) -> Self {
        Self {
            conn_kind: ConnectionRole::Band.conn_kind(),
            uuid: session.to_string(),
        }
    }

    /// Role announced by this `IAm`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::UnknownRole`] when `conn_kind` names no role.
    pub fn role(&self) -> Result<ConnectionRole, ProtocolViolation> {
        ConnectionRole::from_conn_kind(self.conn_kind)
    }
}

/// Session identifier issued by the queen in reply to a cell's `IAm`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accept {
    /// Session identifier the cell uses when opening bands.
    pub uuid: String,
}

/// A `(host, path prefix)` routing key.
///
/// An empty host matches requests for any host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MountPoint {
    /// Host name the mount applies to.
    pub host: String,
    /// Path prefix the mount applies to.
    pub path: String,
}

impl MountPoint {
    /// Create a mount point.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host, self.path)
    }
}

/// Request from the queen for the cell to open more bands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedBand {
    /// Number of bands to open; must be positive.
    pub count: u32,
}

/// Head of an HTTP request routed to a cell.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpReqHead {
    /// Client address as reported by a fronting proxy, if any.
    #[serde(default)]
    pub remote_addr_real: String,
    /// Address of the peer that connected to the queen.
    pub remote_addr: String,
    /// Request method.
    pub method: String,
    /// URL scheme.
    pub scheme: String,
    /// Host the request was addressed to.
    pub host: String,
    /// Port the request was addressed to.
    pub port: u16,
    /// Request path.
    pub path: String,
    /// URL fragment.
    #[serde(default)]
    pub fragment: String,
    /// Query parameters with repeated keys preserved.
    #[serde(default)]
    pub query: MultiMap,
    /// Protocol string, for example `HTTP/1.1`.
    pub proto: String,
    /// Protocol major version.
    pub proto_major: u8,
    /// Protocol minor version.
    pub proto_minor: u8,
    /// Request headers.
    #[serde(default)]
    pub headers: MultiMap,
    /// Parsed form fields.
    #[serde(default)]
    pub form: MultiMap,
}

impl HttpReqHead {
    /// Minimal `HTTP/1.1` request head for `method` on `host` and `path`.
    pub fn new(
        method: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            scheme: "http".to_owned(),
            host: host.into(),
            port: 80,
            path: path.into(),
            proto: "HTTP/1.1".to_owned(),
            proto_major: 1,
            proto_minor: 1,
            ..Self::default()
        }
    }
}

/// Head of an HTTP response produced by a cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResHead {
    /// Response status code.
    pub status_code: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: MultiMap,
}

impl HttpResHead {
    /// Response head with `status_code` and no headers.
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: MultiMap::new(),
        }
    }

    /// Append a header value, keeping earlier values for the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }
}

impl Default for HttpResHead {
    fn default() -> Self { Self::new(200) }
}
