//! A2DP codec configuration decoding.
//!
//! BlueZ exposes the negotiated media transport as a codec id plus an opaque
//! capabilities byte string. This module decodes the two codecs seen in
//! practice (SBC and AAC) into PCM parameters. Pure and deterministic.

use std::fmt;

/// Negotiated A2DP codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Sbc,
    Aac,
    /// Codec id we have no decode table for.
    Unknown(u8),
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sbc => write!(f, "SBC"),
            Self::Aac => write!(f, "AAC"),
            Self::Unknown(id) => write!(f, "Unknown({id:#04x})"),
        }
    }
}

/// Channel layout of the negotiated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Mono,
    DualChannel,
    Stereo,
    JointStereo,
    /// Codec carries channel info we do not decode.
    Unknown,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mono => write!(f, "mono"),
            Self::DualChannel => write!(f, "dual-channel"),
            Self::Stereo => write!(f, "stereo"),
            Self::JointStereo => write!(f, "joint-stereo"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Decoded PCM parameters of the active media transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioProfile {
    pub codec: Codec,
    pub sample_rate: Option<u32>,
    pub channel_mode: Option<ChannelMode>,
}

/// A2DP codec id for SBC.
pub const CODEC_SBC: u8 = 0x00;
/// A2DP codec id for MPEG-2/4 AAC.
pub const CODEC_AAC: u8 = 0x02;

// SBC capabilities byte 0: frequency bits in the high nibble, channel mode
// bits in the low nibble. First matching bit wins.
const SBC_FREQUENCIES: [(u8, u32); 4] = [
    (0x80, 16_000),
    (0x40, 32_000),
    (0x20, 44_100),
    (0x10, 48_000),
];

const SBC_CHANNEL_MODES: [(u8, ChannelMode); 4] = [
    (0x08, ChannelMode::Mono),
    (0x04, ChannelMode::DualChannel),
    (0x02, ChannelMode::Stereo),
    (0x01, ChannelMode::JointStereo),
];

// AAC capabilities byte 1 carries the low eight sampling-frequency bits;
// 48000 and above live in the next byte, so an empty byte 1 means 48000.
const AAC_FREQUENCIES: [(u8, u32); 8] = [
    (0x80, 8_000),
    (0x40, 11_025),
    (0x20, 12_000),
    (0x10, 16_000),
    (0x08, 22_050),
    (0x04, 24_000),
    (0x02, 32_000),
    (0x01, 44_100),
];

/// Decode a (codec id, configuration bytes) pair into PCM parameters.
///
/// Unknown codec ids and short configuration blobs degrade to `None` fields;
/// this never fails.
pub fn parse_a2dp_config(codec_id: u8, config: &[u8]) -> AudioProfile {
    match codec_id {
        CODEC_SBC => parse_sbc(config),
        CODEC_AAC => parse_aac(config),
        other => AudioProfile {
            codec: Codec::Unknown(other),
            sample_rate: None,
            channel_mode: None,
        },
    }
}

fn parse_sbc(config: &[u8]) -> AudioProfile {
    let byte0 = config.first().copied();
    let sample_rate = byte0.and_then(|b| {
        SBC_FREQUENCIES
            .iter()
            .find(|(mask, _)| b & mask != 0)
            .map(|(_, rate)| *rate)
    });
    let channel_mode = byte0.and_then(|b| {
        SBC_CHANNEL_MODES
            .iter()
            .find(|(mask, _)| b & mask != 0)
            .map(|(_, mode)| *mode)
    });
    AudioProfile {
        codec: Codec::Sbc,
        sample_rate,
        channel_mode,
    }
}

fn parse_aac(config: &[u8]) -> AudioProfile {
    let sample_rate = config.get(1).map(|b| {
        AAC_FREQUENCIES
            .iter()
            .find(|(mask, _)| b & mask != 0)
            .map(|(_, rate)| *rate)
            .unwrap_or(48_000)
    });
    AudioProfile {
        codec: Codec::Aac,
        sample_rate,
        channel_mode: Some(ChannelMode::Unknown),
    }
}
