//! Channel → device resolution.
//!
//! Asterisk channel names carry a per-call suffix after the device name
//! (`DAHDI/1-1`, `SIP/payphone-0000002a`). Hardware is addressed by the
//! device part, which is stable across calls on the same line.

use std::fmt;

use thiserror::Error;

/// Separator between device name and call suffix in Asterisk channel names.
pub const DEFAULT_SEPARATOR: char = '-';

/// Longest device name accepted, in bytes.
pub const MAX_DEVICE_NAME_LEN: usize = 63;

/// Normalized, line-stable identifier used to address hardware actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("invalid device name: {channel} (no '{separator}' separator)")]
    NoSeparator { channel: String, separator: char },

    #[error("invalid device name: {channel} (empty device part)")]
    EmptyDevice { channel: String },

    #[error("invalid device name: {channel} ({len} bytes, limit {MAX_DEVICE_NAME_LEN})")]
    TooLong { channel: String, len: usize },
}

/// Maps a raw channel identifier to a device identifier.
///
/// Implementations must be deterministic and must map distinct physical lines
/// to distinct identifiers.
pub trait DeviceResolver: Send {
    fn resolve(&self, channel: &str) -> Result<DeviceId, ResolutionError>;
}

impl<T: DeviceResolver + ?Sized> DeviceResolver for Box<T> {
    fn resolve(&self, channel: &str) -> Result<DeviceId, ResolutionError> {
        (**self).resolve(channel)
    }
}

/// Device part of `channel`: everything before the last `separator`.
///
/// Borrows from the input; nothing is allocated and nothing is truncated
/// silently.
pub fn device_name(channel: &str, separator: char) -> Result<&str, ResolutionError> {
    let Some(pos) = channel.rfind(separator) else {
        return Err(ResolutionError::NoSeparator {
            channel: channel.to_owned(),
            separator,
        });
    };
    let device = &channel[..pos];
    if device.is_empty() {
        return Err(ResolutionError::EmptyDevice {
            channel: channel.to_owned(),
        });
    }
    if device.len() > MAX_DEVICE_NAME_LEN {
        return Err(ResolutionError::TooLong {
            channel: channel.to_owned(),
            len: device.len(),
        });
    }
    Ok(device)
}

/// Default policy: truncate at the last separator.
#[derive(Debug, Clone)]
pub struct SuffixResolver {
    separator: char,
}

impl SuffixResolver {
    pub fn new(separator: char) -> Self {
        Self { separator }
    }

    pub fn separator(&self) -> char {
        self.separator
    }
}

impl Default for SuffixResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR)
    }
}

impl DeviceResolver for SuffixResolver {
    fn resolve(&self, channel: &str) -> Result<DeviceId, ResolutionError> {
        device_name(channel, self.separator).map(DeviceId::from)
    }
}

/// Uses the full channel name as the device identifier.
#[derive(Debug, Clone, Default)]
pub struct ChannelResolver;

impl DeviceResolver for ChannelResolver {
    fn resolve(&self, channel: &str) -> Result<DeviceId, ResolutionError> {
        if channel.is_empty() {
            return Err(ResolutionError::EmptyDevice {
                channel: String::new(),
            });
        }
        if channel.len() > MAX_DEVICE_NAME_LEN {
            return Err(ResolutionError::TooLong {
                channel: channel.to_owned(),
                len: channel.len(),
            });
        }
        Ok(DeviceId::from(channel))
    }
}
