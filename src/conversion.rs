// conversion.rs

/// Bytes per PCM sample on the wire (16-bit signed little-endian).
pub const SAMPLE_BYTES: usize = std::mem::size_of::<i16>();

/// Decodes little-endian i16 samples into `out`, keeping their raw integer scale.
///
/// Decodes `min(bytes.len() / 2, out.len())` samples and returns that count;
/// a trailing odd byte is ignored.
pub fn decode_i16_le(bytes: &[u8], out: &mut [f64]) -> usize {
    let count = (bytes.len() / SAMPLE_BYTES).min(out.len());
    for (sample, pair) in out.iter_mut().zip(bytes.chunks_exact(SAMPLE_BYTES)).take(count) {
        *sample = i16::from_le_bytes([pair[0], pair[1]]) as f64;
    }
    count
}

pub fn encode_i16_le(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * SAMPLE_BYTES);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let scaled = (sample * i16::MAX as f32).round();
            scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect()
}
