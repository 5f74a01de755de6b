//! Assigns each channel a compression scheme (lossy DCT or RLE) and groups
//! R/G/B triplets that should go through a color-space conversion before
//! the DCT stage, mirroring the channel-name based heuristics of the
//! reference DWA compressor.

use crate::meta::{ChannelList, SampleType};

/// Which per-channel encoding a DWA channel is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionScheme {
    /// Compressed through the lossy DCT pipeline (optionally CSC'd first).
    LossyDct,

    /// Compressed losslessly with the same byte-delta RLE scheme as `UNKNOWN`
    /// channels, but tracked separately because alpha is expected to be RLE.
    Rle,

    /// Retained byte-for-byte; used for channels that do not fit either
    /// of the named schemes (e.g. unrecognized non-half types).
    Unknown,
}

/// Index of a channel within an R/G/B CSC triplet: 0 = R, 1 = G, 2 = B.
pub type CscRole = u8;

#[derive(Debug, Clone)]
pub struct ChannelClassification {
    pub scheme: CompressionScheme,
    pub csc_channel_role: Option<CscRole>,
}

/// Three channel indices that should be transformed from RGB to YCbCr
/// together before DCT quantization.
#[derive(Debug, Clone, Copy)]
pub struct CscGroup {
    pub r_index: usize,
    pub g_index: usize,
    pub b_index: usize,
}

#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub channel_classifications: Vec<ChannelClassification>,
    pub csc_groups: Vec<CscGroup>,
}

/// Splits a channel name like `"light1.R"` into `("light1", "R")`, or
/// `(name, name)` when there is no layer prefix.
fn name_prefix_and_suffix(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot + 1..]),
        None => ("", name),
    }
}

fn suffix_role(suffix: &str) -> Option<CscRole> {
    match suffix {
        "R" => Some(0),
        "G" => Some(1),
        "B" => Some(2),
        _ => None,
    }
}

fn is_named_lossy_suffix(suffix: &str) -> bool {
    suffix_role(suffix).is_some() || matches!(suffix, "Y" | "BY" | "RY")
}

fn is_named_rle_suffix(suffix: &str) -> bool {
    suffix == "A"
}

pub fn classify_channels(channels: &ChannelList) -> ClassificationResult {
    let channel_classifications: Vec<ChannelClassification> = channels.list.iter()
        .map(|channel| {
            let name: String = channel.name.clone().into();
            let (_, suffix) = name_prefix_and_suffix(&name);

            // Only a recognized, case-sensitive suffix on a half channel
            // routes to LossyDct/Rle. Any other channel — an unrecognized
            // name, wrong case, or a recognized name on a non-half sample
            // type — falls through to the byte-for-byte Unknown scheme.
            let scheme = if is_named_rle_suffix(suffix) && channel.sample_type == SampleType::F16 {
                CompressionScheme::Rle
            }
            else if is_named_lossy_suffix(suffix) && channel.sample_type == SampleType::F16 {
                CompressionScheme::LossyDct
            }
            else {
                CompressionScheme::Unknown
            };

            let csc_channel_role = if scheme == CompressionScheme::LossyDct {
                suffix_role(suffix)
            } else {
                None
            };

            ChannelClassification { scheme, csc_channel_role }
        })
        .collect();

    let mut csc_groups = Vec::new();

    for (index, channel) in channels.list.iter().enumerate() {
        if channel_classifications[index].csc_channel_role != Some(0) {
            continue;
        }

        let name: String = channel.name.clone().into();
        let (prefix, _) = name_prefix_and_suffix(&name);

        let find_role = |role: CscRole| {
            channels.list.iter().enumerate().find(|(other_index, other)| {
                if channel_classifications[*other_index].csc_channel_role != Some(role) {
                    return false;
                }

                let other_name: String = other.name.clone().into();
                let (other_prefix, _) = name_prefix_and_suffix(&other_name);
                other_prefix == prefix && other.sample_type == channel.sample_type
            }).map(|(other_index, _)| other_index)
        };

        if let (Some(g_index), Some(b_index)) = (find_role(1), find_role(2)) {
            csc_groups.push(CscGroup { r_index: index, g_index, b_index });
        }
    }

    ClassificationResult { channel_classifications, csc_groups }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::ChannelDescription;
    use crate::math::Vec2;
    use smallvec::smallvec;

    fn channel(name: &str, sample_type: SampleType) -> ChannelDescription {
        ChannelDescription {
            name: crate::meta::Text::new_or_panic(name),
            sample_type,
            quantize_linearly: false,
            sampling: Vec2(1, 1),
        }
    }

    #[test]
    fn groups_rgb_triplet_for_csc() {
        let channels = ChannelList::new(smallvec![
            channel("R", SampleType::F16),
            channel("G", SampleType::F16),
            channel("B", SampleType::F16),
            channel("A", SampleType::F16),
        ]);

        let classification = classify_channels(&channels);
        assert_eq!(classification.csc_groups.len(), 1);
        let group = classification.csc_groups[0];
        assert_eq!((group.r_index, group.g_index, group.b_index), (0, 1, 2));
        assert_eq!(classification.channel_classifications[3].scheme, CompressionScheme::Rle);
    }

    #[test]
    fn unnamed_float_channel_defaults_to_unknown() {
        let channels = ChannelList::new(smallvec![channel("depth", SampleType::F32)]);
        let classification = classify_channels(&channels);
        assert_eq!(classification.channel_classifications[0].scheme, CompressionScheme::Unknown);
    }

    #[test]
    fn rgba_and_z_classify_as_in_reference_example() {
        let channels = ChannelList::new(smallvec![
            channel("R", SampleType::F16),
            channel("G", SampleType::F16),
            channel("B", SampleType::F16),
            channel("A", SampleType::F16),
            channel("Z", SampleType::F32),
        ]);

        let classification = classify_channels(&channels);
        let schemes: Vec<CompressionScheme> = classification.channel_classifications
            .iter().map(|c| c.scheme).collect();

        assert_eq!(schemes, vec![
            CompressionScheme::LossyDct,
            CompressionScheme::LossyDct,
            CompressionScheme::LossyDct,
            CompressionScheme::Rle,
            CompressionScheme::Unknown,
        ]);
    }

    #[test]
    fn unnamed_integer_channel_defaults_to_unknown() {
        let channels = ChannelList::new(smallvec![channel("id", SampleType::U32)]);
        let classification = classify_channels(&channels);
        assert_eq!(classification.channel_classifications[0].scheme, CompressionScheme::Unknown);
    }

    #[test]
    fn unrecognized_half_suffix_is_unknown_not_lossy() {
        let channels = ChannelList::new(smallvec![
            channel("Z", SampleType::F16),
            channel("mask", SampleType::F16),
        ]);
        let classification = classify_channels(&channels);
        assert_eq!(classification.channel_classifications[0].scheme, CompressionScheme::Unknown);
        assert_eq!(classification.channel_classifications[1].scheme, CompressionScheme::Unknown);
    }

    #[test]
    fn suffix_matching_is_case_sensitive() {
        let channels = ChannelList::new(smallvec![
            channel("r", SampleType::F16),
            channel("a", SampleType::F16),
        ]);
        let classification = classify_channels(&channels);
        assert_eq!(classification.channel_classifications[0].scheme, CompressionScheme::Unknown);
        assert_eq!(classification.channel_classifications[1].scheme, CompressionScheme::Unknown);
    }

    #[test]
    fn recognized_suffix_on_non_half_type_is_unknown() {
        let channels = ChannelList::new(smallvec![
            channel("R", SampleType::F32),
            channel("A", SampleType::U32),
        ]);
        let classification = classify_channels(&channels);
        assert_eq!(classification.channel_classifications[0].scheme, CompressionScheme::Unknown);
        assert_eq!(classification.channel_classifications[1].scheme, CompressionScheme::Unknown);
    }
}
