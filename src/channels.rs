//! Per-channel decomposition of an image for dialects which store channels separately.
use crate::chunk_key_encoding::{join_path, normalize_path};
use crate::dialect::MetadataDialect;
use crate::image::{AxisType, Image, PixelView};
use crate::options::OverwritePolicy;
use crate::{Error, Result};

/// One channel's dataset: where it goes and what it holds.
#[derive(Debug, Clone)]
pub struct ChannelTarget<'a> {
    pub channel: u64,
    pub path: String,
    pub view: PixelView<'a>,
    /// Block size for `view`'s axes.
    pub block_size: Vec<u32>,
    /// The export's policy, with any subset offset expressed in `view`'s axes.
    pub policy: OverwritePolicy,
}

/// Dataset path of channel `channel`.
///
/// N5 Viewer nests every channel as `c{n}/s0`; other dialects only split multi-channel images.
pub fn channel_path(base: &str, channel: u64, num_channels: u64, dialect: &MetadataDialect) -> String {
    match dialect {
        MetadataDialect::N5Viewer => join_path(base, &format!("c{channel}/s0")),
        _ if num_channels > 1 => join_path(base, &format!("c{channel}")),
        _ => normalize_path(base),
    }
}

/// Whether frames must be stored as depth-less 4-D volumes for N5 Viewer.
fn needs_depth_axis(image: &Image, dialect: &MetadataDialect) -> bool {
    matches!(dialect, MetadataDialect::N5Viewer) && image.num_frames() > 1 && image.num_slices() == 1
}

/// Split `image` into one target per channel.
///
/// `block_size` and any subset offset are given in image axes and adjusted per channel.
pub fn split_channels<'a>(
    image: &'a Image,
    base: &str,
    block_size: &[u32],
    policy: &OverwritePolicy,
    dialect: &MetadataDialect,
) -> Result<Vec<ChannelTarget<'a>>> {
    if block_size.len() != image.num_dimensions() {
        return Err(Error::config(format!(
            "block size {block_size:?} does not match {} image dimensions",
            image.num_dimensions()
        )));
    }
    let channel_axis = image.channel_axis();
    let depth_at = needs_depth_axis(image, dialect).then(|| {
        // frames sit where depth would, once channels are gone
        image
            .axes()
            .iter()
            .filter(|a| **a != AxisType::Channel)
            .position(|a| *a == AxisType::Time)
            .unwrap_or(2)
    });

    let adapt = |values: &[u64], fill: u64| -> Vec<u64> {
        let mut out = values.to_vec();
        if let Some(axis) = channel_axis {
            out.remove(axis);
        }
        if let Some(at) = depth_at {
            out.insert(at, fill);
        }
        out
    };

    let block_size: Vec<u32> = adapt(
        &block_size.iter().map(|&b| b as u64).collect::<Vec<_>>(),
        1,
    )
    .into_iter()
    .map(|b| b as u32)
    .collect();

    (0..image.num_channels())
        .map(|channel| {
            let mut view = image.channel_view(channel)?;
            if let Some(at) = depth_at {
                view = view.with_depth_axis(at);
            }
            let policy = match policy {
                OverwritePolicy::MergeSubset { offset } => OverwritePolicy::MergeSubset {
                    offset: adapt(offset, 0),
                },
                other => other.clone(),
            };
            Ok(ChannelTarget {
                channel,
                path: channel_path(base, channel, image.num_channels(), dialect),
                view,
                block_size: block_size.clone(),
                policy,
            })
        })
        .collect()
}
