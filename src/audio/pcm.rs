// PCM sample conversion helpers shared by the capture engine and the
// orchestrator's channel routing.

/// Convert a float sample in [-1.0, 1.0] to signed 16-bit PCM.
///
/// Negative values scale by 32768 and non-negative values by 32767 so that
/// both endpoints land exactly on the i16 range without overflow.
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Interleave equal-length left/right sample slices as LRLR...
pub fn interleave(left: &[i16], right: &[i16]) -> Vec<i16> {
    debug_assert_eq!(left.len(), right.len());
    let mut out = Vec::with_capacity(left.len() * 2);
    for (l, r) in left.iter().zip(right.iter()) {
        out.push(*l);
        out.push(*r);
    }
    out
}

/// Extract the left channel from interleaved stereo s16le bytes.
///
/// The left channel occupies the even-indexed 16-bit samples, i.e. bytes
/// `4i` and `4i + 1` of every sample pair. Returns None when the buffer is
/// not a whole number of stereo sample pairs; callers drop such buffers.
pub fn extract_left_channel(stereo: &[u8]) -> Option<Vec<u8>> {
    if stereo.len() % 4 != 0 {
        return None;
    }
    let pairs = stereo.len() / 4;
    let mut mono = Vec::with_capacity(pairs * 2);
    for i in 0..pairs {
        mono.push(stereo[i * 4]);
        mono.push(stereo[i * 4 + 1]);
    }
    Some(mono)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_endpoints() {
        assert_eq!(f32_to_i16(-1.0), -32768);
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn test_f32_to_i16_scaling_is_asymmetric() {
        assert_eq!(f32_to_i16(-0.5), -16384); // -0.5 * 32768
        assert_eq!(f32_to_i16(0.5), 16383); // 0.5 * 32767, truncated
    }

    #[test]
    fn test_f32_to_i16_clamps_out_of_range() {
        assert_eq!(f32_to_i16(-2.5), -32768);
        assert_eq!(f32_to_i16(1.7), 32767);
    }

    #[test]
    fn test_interleave_order() {
        let left = vec![1, 2, 3];
        let right = vec![-1, -2, -3];
        assert_eq!(interleave(&left, &right), vec![1, -1, 2, -2, 3, -3]);
    }

    #[test]
    fn test_extract_left_channel_takes_even_samples() {
        // Two stereo pairs [L0, R0, L1, R1] as little-endian bytes
        let stereo = vec![0x01, 0x02, 0xAA, 0xBB, 0x03, 0x04, 0xCC, 0xDD];
        let left = extract_left_channel(&stereo).unwrap();
        assert_eq!(left, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_extract_left_channel_rejects_ragged_buffers() {
        assert!(extract_left_channel(&[0x01]).is_none());
        assert!(extract_left_channel(&[0x01, 0x02]).is_none());
        assert!(extract_left_channel(&[0x01, 0x02, 0x03, 0x04, 0x05]).is_none());
    }

    #[test]
    fn test_extract_left_channel_empty() {
        assert_eq!(extract_left_channel(&[]), Some(Vec::new()));
    }
}
