use bytes::BytesMut;

/// Packet carries a complete keyframe (or, for audio, an independently
/// decodable frame).
pub const FLAG_KEY: u32 = 0x0001;

/// A compressed unit of one stream, owned by the transcoder and refilled in
/// place by the demuxer on every read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Packet {
    stream_index: usize,
    pts: Option<i64>,
    dts: Option<i64>,
    duration: i64,
    data: BytesMut,
    flags: u32,
}

impl Packet {
    pub fn new(stream_index: usize) -> Self {
        Self {
            stream_index,
            ..Default::default()
        }
    }

    /// Reset every field so no state leaks from the previous read. Keeps the
    /// data allocation.
    pub fn clean(&mut self) -> &mut Self {
        self.stream_index = 0;
        self.pts = None;
        self.dts = None;
        self.duration = 0;
        self.data.clear();
        self.flags = 0;
        self
    }

    pub fn index(&self) -> usize {
        self.stream_index
    }

    pub fn set_index(&mut self, stream_index: usize) -> &mut Self {
        self.stream_index = stream_index;
        self
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn set_pts(&mut self, pts: Option<i64>) -> &mut Self {
        self.pts = pts;
        self
    }

    pub fn dts(&self) -> Option<i64> {
        self.dts
    }

    pub fn set_dts(&mut self, dts: Option<i64>) -> &mut Self {
        self.dts = dts;
        self
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn set_duration(&mut self, duration: i64) -> &mut Self {
        self.duration = duration;
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }

    /// Replace the payload, reusing the existing allocation where possible.
    pub fn set_data(&mut self, data: &[u8]) -> &mut Self {
        self.data.clear();
        self.data.extend_from_slice(data);
        self
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn is_key(&self) -> bool {
        self.flags & FLAG_KEY != 0
    }

    pub fn set_key(&mut self, key: bool) -> &mut Self {
        if key {
            self.flags |= FLAG_KEY;
        } else {
            self.flags &= !FLAG_KEY;
        }
        self
    }

    /// Shift whichever of pts/dts are set by `ticks`.
    pub fn offset(&mut self, ticks: i64) -> &mut Self {
        if ticks != 0 {
            self.pts = self.pts.map(|pts| pts.saturating_add(ticks));
            self.dts = self.dts.map(|dts| dts.saturating_add(ticks));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_resets_everything() {
        let mut packet = Packet::new(2);
        packet
            .set_pts(Some(10))
            .set_dts(Some(9))
            .set_duration(3)
            .set_data(b"abc")
            .set_key(true);
        assert!(packet.is_key());
        assert_eq!(packet.size(), 3);

        packet.clean();
        assert_eq!(packet, Packet::default());
        assert_eq!(packet.pts(), None);
        assert_eq!(packet.dts(), None);
        assert!(!packet.is_key());
    }

    #[test]
    fn test_offset_skips_unset() {
        let mut packet = Packet::new(0);
        packet.set_pts(Some(100)).offset(-40);
        assert_eq!(packet.pts(), Some(60));
        assert_eq!(packet.dts(), None);

        packet.set_dts(Some(i64::MAX - 1)).offset(10);
        assert_eq!(packet.dts(), Some(i64::MAX));
    }

    #[test]
    fn test_key_flag() {
        let mut packet = Packet::new(0);
        packet.set_key(true);
        assert_eq!(packet.flags(), FLAG_KEY);
        packet.set_key(false);
        assert_eq!(packet.flags(), 0);
    }
}
