//! Serial frame synchronizer and decoder
//!
//! Wire format, one frame per sample:
//!
//! ```text
//! +------+------+------+------+------+------+------+
//! | 0x53 | x lo | x hi | y lo | y hi | z lo | z hi |
//! +------+------+------+------+------+------+------+
//! ```
//!
//! Axis values are signed 16-bit little-endian raw counts. The decoder is fed
//! one byte at a time and stays byte-synchronous: every byte seen where a sync
//! byte is expected but that is not the sync byte counts as one lost byte, and
//! the very next byte becomes the new sync candidate.

use crate::config::DecoderConfig;
use tracing::debug;

/// Number of payload bytes following the sync byte
pub const PAYLOAD_LEN: usize = 6;

/// Total frame length on the wire
pub const FRAME_LEN: usize = PAYLOAD_LEN + 1;

/// Raw axis counts of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawFrame {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawFrame {
    /// Parse the 6 payload bytes that follow a sync byte
    pub fn from_payload(payload: &[u8; PAYLOAD_LEN]) -> Self {
        Self {
            x: i16::from_le_bytes([payload[0], payload[1]]),
            y: i16::from_le_bytes([payload[2], payload[3]]),
            z: i16::from_le_bytes([payload[4], payload[5]]),
        }
    }

    /// Encode as a complete wire frame
    pub fn to_bytes(&self, sync_byte: u8) -> [u8; FRAME_LEN] {
        let [x0, x1] = self.x.to_le_bytes();
        let [y0, y1] = self.y.to_le_bytes();
        let [z0, z1] = self.z.to_le_bytes();
        [sync_byte, x0, x1, y0, y1, z0, z1]
    }

    /// Convert raw counts to acceleration in g
    pub fn scaled(&self, scale_factor: f64) -> (f64, f64, f64) {
        (
            self.x as f64 * scale_factor,
            self.y as f64 * scale_factor,
            self.z as f64 * scale_factor,
        )
    }
}

/// One decoded acceleration reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Position in the stream of decoded frames (0-based)
    pub index: u64,
    /// Seconds, computed as index / configured sample rate
    pub t: f64,
    /// X-axis acceleration (g)
    pub ax: f64,
    /// Y-axis acceleration (g)
    pub ay: f64,
    /// Z-axis acceleration (g)
    pub az: f64,
}

/// Result of feeding one byte to the decoder
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeResult {
    /// A complete frame was decoded
    Decoded(Sample),
    /// A non-sync byte arrived in sync position
    Lost {
        /// Consecutive lost bytes since the last decoded frame, including this one
        run: u64,
    },
    /// Mid-frame, waiting for more payload bytes
    Pending,
}

#[derive(Debug, Clone, Copy)]
enum State {
    AwaitingSync,
    Collecting { buf: [u8; PAYLOAD_LEN], len: usize },
}

/// Byte-at-a-time frame decoder
///
/// Holds at most one in-flight frame; never fails.
#[derive(Debug)]
pub struct FrameDecoder {
    config: DecoderConfig,
    state: State,
    next_index: u64,
    loss_run: u64,
    total_lost: u64,
}

impl FrameDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            state: State::AwaitingSync,
            next_index: 0,
            loss_run: 0,
            total_lost: 0,
        }
    }

    /// Feed the next byte from the stream
    pub fn next(&mut self, byte: u8) -> DecodeResult {
        match self.state {
            State::AwaitingSync => {
                if byte == self.config.sync_byte {
                    self.state = State::Collecting {
                        buf: [0; PAYLOAD_LEN],
                        len: 0,
                    };
                    DecodeResult::Pending
                } else {
                    self.loss_run += 1;
                    self.total_lost += 1;
                    DecodeResult::Lost { run: self.loss_run }
                }
            }
            State::Collecting { mut buf, len } => {
                buf[len] = byte;
                let len = len + 1;
                if len < PAYLOAD_LEN {
                    self.state = State::Collecting { buf, len };
                    return DecodeResult::Pending;
                }

                self.state = State::AwaitingSync;
                DecodeResult::Decoded(self.emit(RawFrame::from_payload(&buf)))
            }
        }
    }

    fn emit(&mut self, frame: RawFrame) -> Sample {
        let index = self.next_index;
        self.next_index += 1;
        self.loss_run = 0;

        let (ax, ay, az) = frame.scaled(self.config.scale_factor);
        Sample {
            index,
            t: index as f64 / self.config.sample_rate,
            ax,
            ay,
            az,
        }
    }

    /// Drop any in-flight partial frame (end of stream)
    ///
    /// Returns the number of bytes discarded, counting the sync byte.
    pub fn discard_partial(&mut self) -> usize {
        let discarded = match self.state {
            State::AwaitingSync => 0,
            State::Collecting { len, .. } => len + 1,
        };
        if discarded > 0 {
            debug!("Discarding partial frame ({} of {} bytes)", discarded, FRAME_LEN);
        }
        self.state = State::AwaitingSync;
        discarded
    }

    /// True while a sync byte has been seen but the payload is incomplete
    pub fn is_mid_frame(&self) -> bool {
        matches!(self.state, State::Collecting { .. })
    }

    /// Number of frames decoded so far
    pub fn frames_decoded(&self) -> u64 {
        self.next_index
    }

    /// Total lost bytes over the decoder's lifetime
    pub fn total_lost(&self) -> u64 {
        self.total_lost
    }

    /// Lost bytes since the last decoded frame
    pub fn loss_run(&self) -> u64 {
        self.loss_run
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> FrameDecoder {
        FrameDecoder::new(DecoderConfig::default())
    }

    fn feed(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<DecodeResult> {
        bytes.iter().map(|&b| decoder.next(b)).collect()
    }

    fn decoded(results: &[DecodeResult]) -> Vec<Sample> {
        results
            .iter()
            .filter_map(|r| match r {
                DecodeResult::Decoded(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    fn lost_count(results: &[DecodeResult]) -> usize {
        results
            .iter()
            .filter(|r| matches!(r, DecodeResult::Lost { .. }))
            .count()
    }

    #[test]
    fn test_single_frame_decodes_once() {
        let mut dec = decoder();
        let results = feed(&mut dec, &[0x53, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

        assert_eq!(decoded(&results).len(), 1);
        assert_eq!(lost_count(&results), 0);
        // Everything before the last byte is pending
        assert!(results[..6].iter().all(|r| *r == DecodeResult::Pending));
    }

    #[test]
    fn test_little_endian_signed_scaling() {
        let mut dec = decoder();
        let frame = RawFrame { x: 2048, y: -2048, z: -32768 };
        let results = feed(&mut dec, &frame.to_bytes(0x53));
        let sample = decoded(&results)[0];

        assert_eq!(sample.ax, 1.0);
        assert_eq!(sample.ay, -1.0);
        assert_eq!(sample.az, -16.0);
    }

    #[test]
    fn test_raw_bytes_interpreted_little_endian() {
        let mut dec = decoder();
        // x = 0x0100 (256), y = 0xFFFF (-1), z = 0x7FFF (32767)
        let results = feed(&mut dec, &[0x53, 0x00, 0x01, 0xFF, 0xFF, 0xFF, 0x7F]);
        let sample = decoded(&results)[0];
        let scale = 16.0 / 32768.0;

        assert_eq!(sample.ax, 256.0 * scale);
        assert_eq!(sample.ay, -1.0 * scale);
        assert_eq!(sample.az, 32767.0 * scale);
    }

    #[test]
    fn test_scale_factor_is_configurable() {
        let config = DecoderConfig {
            scale_factor: 2.0 / 32768.0,
            ..DecoderConfig::default()
        };
        let mut dec = FrameDecoder::new(config);
        let frame = RawFrame { x: 16384, y: 0, z: -16384 };
        let sample = decoded(&feed(&mut dec, &frame.to_bytes(0x53)))[0];

        assert_eq!(sample.ax, 1.0);
        assert_eq!(sample.az, -1.0);
    }

    #[test]
    fn test_non_sync_bytes_are_lost() {
        let mut dec = decoder();
        let results = feed(&mut dec, &[0x00, 0xAA, 0x52]);

        assert_eq!(
            results,
            vec![
                DecodeResult::Lost { run: 1 },
                DecodeResult::Lost { run: 2 },
                DecodeResult::Lost { run: 3 },
            ]
        );
        assert_eq!(dec.total_lost(), 3);
    }

    #[test]
    fn test_three_lost_then_frame() {
        let mut dec = decoder();
        let mut bytes = vec![0x01, 0x02, 0x03];
        bytes.extend_from_slice(&RawFrame { x: 1, y: 2, z: 3 }.to_bytes(0x53));
        let results = feed(&mut dec, &bytes);

        assert_eq!(lost_count(&results), 3);
        assert_eq!(decoded(&results).len(), 1);
        assert_eq!(dec.loss_run(), 0);
        assert_eq!(dec.total_lost(), 3);
    }

    #[test]
    fn test_loss_run_resets_after_frame() {
        let mut dec = decoder();
        feed(&mut dec, &[0x00, 0x00]);
        feed(&mut dec, &RawFrame::default().to_bytes(0x53));
        let results = feed(&mut dec, &[0x00]);

        assert_eq!(results, vec![DecodeResult::Lost { run: 1 }]);
        assert_eq!(dec.total_lost(), 3);
    }

    #[test]
    fn test_sync_value_inside_payload_is_data() {
        let mut dec = decoder();
        let results = feed(&mut dec, &[0x53, 0x53, 0x53, 0x53, 0x53, 0x53, 0x53]);
        let samples = decoded(&results);

        assert_eq!(samples.len(), 1);
        assert_eq!(lost_count(&results), 0);
        assert_eq!(samples[0].ax, 0x5353 as f64 * 16.0 / 32768.0);
    }

    #[test]
    fn test_index_and_timestamp_ignore_losses() {
        let mut dec = decoder();
        let frame = RawFrame::default().to_bytes(0x53);
        let mut bytes = Vec::new();
        for i in 0..5 {
            bytes.extend(std::iter::repeat(0xEE).take(i));
            bytes.extend_from_slice(&frame);
        }
        let samples = decoded(&feed(&mut dec, &bytes));

        assert_eq!(samples.len(), 5);
        for (i, sample) in samples.iter().enumerate() {
            assert_eq!(sample.index, i as u64);
            assert_eq!(sample.t, i as f64 / 16000.0);
        }
        assert_eq!(dec.frames_decoded(), 5);
        assert_eq!(dec.total_lost(), 10);
    }

    #[test]
    fn test_zero_payload_full_second() {
        let mut dec = decoder();
        let frame = RawFrame::default().to_bytes(0x53);
        let mut last = None;
        let mut count = 0;

        for _ in 0..16000 {
            for &b in &frame {
                match dec.next(b) {
                    DecodeResult::Decoded(s) => {
                        assert_eq!((s.ax, s.ay, s.az), (0.0, 0.0, 0.0));
                        count += 1;
                        last = Some(s);
                    }
                    DecodeResult::Lost { .. } => panic!("unexpected loss"),
                    DecodeResult::Pending => {}
                }
            }
        }

        assert_eq!(count, 16000);
        assert_eq!(last.unwrap().t, 15999.0 / 16000.0);
    }

    #[test]
    fn test_partial_frame_discarded_silently() {
        let mut dec = decoder();
        let results = feed(&mut dec, &[0x53, 0x10, 0x20, 0x30, 0x40]);

        assert!(decoded(&results).is_empty());
        assert_eq!(lost_count(&results), 0);
        assert!(dec.is_mid_frame());
        assert_eq!(dec.discard_partial(), 5);
        assert!(!dec.is_mid_frame());
        assert_eq!(dec.frames_decoded(), 0);
        assert_eq!(dec.discard_partial(), 0);
    }

    #[test]
    fn test_custom_sync_byte() {
        let config = DecoderConfig {
            sync_byte: 0xA5,
            ..DecoderConfig::default()
        };
        let mut dec = FrameDecoder::new(config);
        let mut bytes = vec![0x53];
        bytes.extend_from_slice(&RawFrame { x: -1, y: 0, z: 1 }.to_bytes(0xA5));
        let results = feed(&mut dec, &bytes);

        assert_eq!(lost_count(&results), 1);
        assert_eq!(decoded(&results).len(), 1);
    }
}
