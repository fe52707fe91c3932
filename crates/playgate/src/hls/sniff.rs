/// Container formats a fragment may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentFormat {
    /// MPEG-2 Transport Stream
    TransportStream,
    /// ISO-BMFF fragment or init segment (fMP4/CMAF)
    FragmentedMp4,
    /// Packed audio (ID3-prefixed or raw ADTS)
    PackedAudio,
    Unknown,
}

const TS_PACKET_SIZE: usize = 188;

/// Detect the container of a fragment from its first bytes
#[inline]
pub fn detect_format(data: &[u8]) -> FragmentFormat {
    if data.len() < 4 {
        return FragmentFormat::Unknown;
    }

    // TS sync byte, repeated at the next packet when there is one
    if data[0] == 0x47 && (data.len() <= TS_PACKET_SIZE || data[TS_PACKET_SIZE] == 0x47) {
        return FragmentFormat::TransportStream;
    }

    if data.len() >= 8 {
        let box_type = &data[4..8];
        if matches!(
            box_type,
            b"ftyp" | b"styp" | b"moof" | b"moov" | b"sidx" | b"emsg" | b"prft"
        ) {
            return FragmentFormat::FragmentedMp4;
        }
    }

    if &data[0..3] == b"ID3" || (data[0] == 0xFF && data[1] & 0xF6 == 0xF0) {
        return FragmentFormat::PackedAudio;
    }

    FragmentFormat::Unknown
}
