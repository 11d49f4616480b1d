//! Self-announcement record broadcast during discovery.
//!
//! Every searching node multicasts its [`Announcement`] at a fixed interval.
//! The record carries everything an opponent needs to bootstrap the encrypted
//! point-to-point channel: address, display name and public key material.

use crate::error::{Result, VolleyError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Self-description record, broadcast verbatim on every discovery tick.
///
/// Created once at process start and never mutated. The `session_type` tag
/// lets unrelated protocols share the multicast group without confusing each
/// other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Address the announcing node receives datagrams on
    pub addr: SocketAddr,
    /// Display name, also the input to role arbitration
    pub name: String,
    /// Hex-encoded encryption public key material
    #[serde(default)]
    pub enc_key: String,
    /// Hex-encoded signature public key material
    #[serde(default)]
    pub sign_key: String,
    /// Protocol tag, see [`SESSION_TYPE`](crate::protocol::constants::SESSION_TYPE)
    #[serde(rename = "type")]
    pub session_type: String,
}

impl Announcement {
    /// Encode the record as its textual wire form.
    ///
    /// # Examples
    ///
    /// ```
    /// use volleynet::protocol::announce::Announcement;
    ///
    /// let ann = Announcement {
    ///     addr: "127.0.0.1:4000".parse().unwrap(),
    ///     name: "alice".into(),
    ///     enc_key: "aa".into(),
    ///     sign_key: "bb".into(),
    ///     session_type: "pong".into(),
    /// };
    /// let text = ann.marshal().unwrap();
    /// assert_eq!(Announcement::unmarshal(&text).unwrap(), ann);
    /// ```
    pub fn marshal(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| VolleyError::Malformed(e.to_string()))
    }

    /// Decode a record from its textual wire form.
    ///
    /// Decoding does not validate credentials; call [`Announcement::validate`]
    /// before using the record to bootstrap a channel.
    pub fn unmarshal(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| VolleyError::Malformed(e.to_string()))
    }

    /// Checks that the record can be used to bootstrap a secure channel.
    ///
    /// A record without encryption key material cannot key the transport and
    /// must be dropped by the receiver.
    pub fn validate(&self) -> Result<()> {
        if self.enc_key.is_empty() {
            return Err(VolleyError::MissingCredential(format!(
                "announcement from {:?} carries no encryption key",
                self.name
            )));
        }
        Ok(())
    }

    /// Reduce the announcement to the opponent bookkeeping record.
    pub fn into_record(self) -> PeerRecord {
        PeerRecord {
            addr: self.addr,
            name: self.name,
            enc_key: self.enc_key,
            sign_key: self.sign_key,
        }
    }
}

/// Opponent descriptor held by the peer registry and carried in `init`
/// messages. Same fields as an [`Announcement`] minus the protocol tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Address the opponent receives datagrams on
    pub addr: SocketAddr,
    /// Opponent display name
    pub name: String,
    /// Hex-encoded encryption public key material
    #[serde(default)]
    pub enc_key: String,
    /// Hex-encoded signature public key material
    #[serde(default)]
    pub sign_key: String,
}

impl PeerRecord {
    /// Checks that the record can key the transport.
    pub fn validate(&self) -> Result<()> {
        if self.enc_key.is_empty() {
            return Err(VolleyError::MissingCredential(format!(
                "init record from {:?} carries no encryption key",
                self.name
            )));
        }
        Ok(())
    }
}
