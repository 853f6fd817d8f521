/// Bytes per sample of one channel.
pub fn sample_size(bits_per_sample: u32) -> usize {
    bits_per_sample.div_ceil(8) as usize
}

/// Extracts one channel from interleaved PCM.
pub fn deinterleave(data: &[u8], bits_per_sample: u32, channel_count: u32, channel: u32) -> Vec<u8> {
    let sample_size = sample_size(bits_per_sample);
    let block_align = sample_size * channel_count as usize;
    let offset = sample_size * channel as usize;

    data.chunks_exact(block_align)
        .flat_map(|frame| &frame[offset..offset + sample_size])
        .copied()
        .collect()
}

/// Interleaves per-channel PCM. Channels shorter than the longest are padded with zero samples.
pub fn interleave(channels: &[&[u8]], bits_per_sample: u32) -> Vec<u8> {
    let sample_size = sample_size(bits_per_sample);
    let num_samples = channels
        .iter()
        .map(|c| c.len() / sample_size)
        .max()
        .unwrap_or(0);

    let mut data = Vec::with_capacity(num_samples * sample_size * channels.len());
    for i in 0..num_samples {
        let range = i * sample_size..(i + 1) * sample_size;
        for channel in channels {
            match channel.get(range.clone()) {
                Some(sample) => data.extend_from_slice(sample),
                None => data.extend(std::iter::repeat_n(0, sample_size)),
            }
        }
    }
    data
}

#[test]
fn test_pcm_interleaving() {
    // 24 bit stereo, two sample frames
    let data = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
    let left = deinterleave(&data, 24, 2, 0);
    let right = deinterleave(&data, 24, 2, 1);
    assert_eq!(left, [1, 2, 3, 7, 8, 9]);
    assert_eq!(right, [4, 5, 6, 10, 11, 12]);
    assert_eq!(interleave(&[&left, &right], 24), data);

    assert_eq!(interleave(&[&[1, 2, 3, 4], &[5, 6]], 16), [1, 2, 5, 6, 3, 4, 0, 0]);
    assert_eq!(sample_size(20), 3);
}
