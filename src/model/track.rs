use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use crate::codec::DataReader;
use crate::error::CodecError;

const TRACK_INFO_VERSIONED: u32 = 1;
const MESSAGE_SIZE_MASK: u32 = 0x3fff_ffff;

/// Probe information carried by `local` and `http` tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeInfo {
    pub name: Option<String>,
    pub parameter: Option<String>
}

/// Metadata of a playable item, decoded from the node's encoded track.
///
/// The encoded string is kept as-is and is what gets sent back to the node
/// when the track is played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    #[serde(skip)]
    encoded: String,
    #[serde(skip)]
    message_size: u32,
    pub version: u8,
    pub title: String,
    pub author: String,
    /// Length of the track in milliseconds.
    pub length: u64,
    pub identifier: String,
    pub is_stream: bool,
    pub uri: Option<String>,
    pub source: String,
    pub probe_info: ProbeInfo,
    /// Start position in milliseconds.
    pub position: u64
}

impl Track {
    /// Decodes a base64 encoded track.
    pub fn decode(encoded: &str) -> Result<Self, CodecError> {
        let bytes = STANDARD.decode(encoded)?;
        let mut reader = DataReader::new(&bytes);

        Self::read(encoded, &mut reader)
    }

    pub(crate) fn read(encoded: &str, reader: &mut DataReader<'_>) -> Result<Self, CodecError> {
        let header = reader.read_u32("header")?;
        let flags = header >> 30;

        let version = if flags & TRACK_INFO_VERSIONED != 0 {
            reader.read_u8("version")?
        } else {
            1
        };

        let title = reader.read_utf("title")?;
        let author = reader.read_utf("author")?;
        let length = reader.read_u64("length")?;
        let identifier = reader.read_utf("identifier")?;
        let is_stream = reader.read_bool("is_stream")?;
        let uri = if version >= 2 {
            reader.read_optional_utf("uri")?
        } else {
            None
        };
        let source = reader.read_utf("source")?;

        let probe_info = if matches!(source.as_str(), "local" | "http") {
            let info = reader.read_utf("probe_info")?;
            let mut parts = info.split('|');

            ProbeInfo {
                name: parts.next().map(ToOwned::to_owned),
                parameter: parts.next().map(ToOwned::to_owned)
            }
        } else {
            ProbeInfo::default()
        };

        let position = reader.read_u64("position")?;

        Ok(Self {
            encoded: encoded.to_owned(),
            message_size: header & MESSAGE_SIZE_MASK,
            version,
            title,
            author,
            length,
            identifier,
            is_stream,
            uri,
            source,
            probe_info,
            position
        })
    }

    /// The encoded form of the track, as received from the node.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Message size declared in the header of the encoded track.
    pub fn message_size(&self) -> u32 {
        self.message_size
    }
}

impl FromStr for Track {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
