//! Codec configuration containers
//!
//! The stream-control core never interprets media payloads, but it moves codec information
//! elements between the transport and the codec call-out and has to know their media type and
//! codec type. Choosing a configuration is left to the codec call-out.

use crate::AvError;
use crate::constants::{CODEC_INFO_LEN, PROTECT_INFO_LEN};

/// Media type of a stream endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MediaType {
    /// Audio
    #[default]
    Audio = 0x00,
    /// Video
    Video = 0x01,
    /// Multimedia
    Multimedia = 0x02,
}

impl MediaType {
    /// Decode from the upper nibble of the codec info media byte
    #[must_use]
    pub const fn from_nibble(value: u8) -> Self {
        match value {
            0x01 => Self::Video,
            0x02 => Self::Multimedia,
            _ => Self::Audio,
        }
    }
}

/// Stream endpoint type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Tsep {
    /// Source endpoint
    #[default]
    Source = 0x00,
    /// Sink endpoint
    Sink = 0x01,
}

impl Tsep {
    /// The role a peer endpoint must have to pair with this one
    #[must_use]
    pub const fn peer(self) -> Self {
        match self {
            Self::Source => Self::Sink,
            Self::Sink => Self::Source,
        }
    }
}

/// Codec type byte of a codec information element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodecType {
    /// SBC, mandatory for A2DP
    Sbc = 0x00,
    /// MPEG-1,2 Audio
    Mpeg12Audio = 0x01,
    /// MPEG-2,4 AAC
    Mpeg24Aac = 0x02,
    /// Vendor specific
    VendorSpecific = 0xFF,
}

impl CodecType {
    /// Decode a codec type byte, unknown values map to vendor specific
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Sbc,
            0x01 => Self::Mpeg12Audio,
            0x02 => Self::Mpeg24Aac,
            _ => Self::VendorSpecific,
        }
    }
}

/// A codec information element as exchanged over AVDTP.
///
/// Byte 0 is the length of the remaining bytes, byte 1 carries the media type in its upper
/// nibble and byte 2 is the codec type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecInfo(pub [u8; CODEC_INFO_LEN]);

impl CodecInfo {
    /// Media type encoded in the element
    #[must_use]
    pub const fn media_type(&self) -> MediaType {
        MediaType::from_nibble(self.0[1] >> 4)
    }

    /// Codec type encoded in the element
    #[must_use]
    pub const fn codec_type(&self) -> CodecType {
        CodecType::from_u8(self.0[2])
    }

    /// Raw codec type byte
    #[must_use]
    pub const fn codec_type_raw(&self) -> u8 {
        self.0[2]
    }

    /// Build an element from its codec specific bytes.
    ///
    /// # Errors
    /// Returns `AvError::InvalidParameter` when the payload does not fit.
    pub fn from_parts(media: MediaType, codec: u8, payload: &[u8]) -> Result<Self, AvError> {
        if payload.len() + 3 > CODEC_INFO_LEN {
            return Err(AvError::InvalidParameter);
        }
        let mut raw = [0u8; CODEC_INFO_LEN];
        raw[0] = (payload.len() + 2) as u8;
        raw[1] = (media as u8) << 4;
        raw[2] = codec;
        raw[3..3 + payload.len()].copy_from_slice(payload);
        Ok(Self(raw))
    }
}

/// Stream configuration: codec element, content protection and the service categories in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamConfig {
    /// Codec information element
    pub codec_info: CodecInfo,
    /// Number of media codec capabilities present
    pub num_codec: u8,
    /// Protocol service capability mask
    pub psc_mask: u8,
    /// Number of content protection capabilities
    pub num_protect: u8,
    /// Content protection information
    pub protect_info: [u8; PROTECT_INFO_LEN],
}

impl StreamConfig {
    /// A configuration carrying one codec element and no content protection
    #[must_use]
    pub const fn with_codec(codec_info: CodecInfo) -> Self {
        Self {
            codec_info,
            num_codec: 1,
            psc_mask: 0,
            num_protect: 0,
            protect_info: [0; PROTECT_INFO_LEN],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_sets_header() {
        let info = CodecInfo::from_parts(MediaType::Audio, CodecType::Sbc as u8, &[0x33, 0x15, 2, 53]).unwrap();
        assert_eq!(info.0[0], 6);
        assert_eq!(info.media_type(), MediaType::Audio);
        assert_eq!(info.codec_type(), CodecType::Sbc);
        assert_eq!(&info.0[3..7], &[0x33, 0x15, 2, 53]);
    }

    #[test]
    fn test_unknown_codec_is_vendor_specific() {
        let info = CodecInfo::from_parts(MediaType::Video, 0x42, &[1]).unwrap();
        assert_eq!(info.media_type(), MediaType::Video);
        assert_eq!(info.codec_type(), CodecType::VendorSpecific);
        assert_eq!(info.codec_type_raw(), 0x42);
    }

    #[test]
    fn test_from_parts_rejects_oversized_payload() {
        let payload = [0u8; CODEC_INFO_LEN];
        assert_eq!(
            CodecInfo::from_parts(MediaType::Audio, 0, &payload),
            Err(AvError::InvalidParameter)
        );
    }

    #[test]
    fn test_tsep_peer() {
        assert_eq!(Tsep::Source.peer(), Tsep::Sink);
        assert_eq!(Tsep::Sink.peer(), Tsep::Source);
    }
}
