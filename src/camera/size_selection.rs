use crate::camera::device::{FpsRange, Size, SizePair};
use crate::config::CameraConfig;

/// Pairs every preview size with the first picture size of the same aspect ratio, so the
/// preview and the captured picture are not distorted relative to each other. When no preview
/// size has a matching picture size, every preview size is offered on its own.
pub fn make_valid_size_pairs(
    preview_sizes: &[Size],
    picture_sizes: &[Size],
    tolerance: f32,
) -> Vec<SizePair> {
    let pairs: Vec<SizePair> = preview_sizes
        .iter()
        .filter_map(|preview| {
            picture_sizes
                .iter()
                .find(|picture| (preview.aspect_ratio() - picture.aspect_ratio()).abs() < tolerance)
                .map(|picture| SizePair::new(*preview, Some(*picture)))
        })
        .collect();

    if pairs.is_empty() {
        preview_sizes
            .iter()
            .map(|preview| SizePair::new(*preview, None))
            .collect()
    } else {
        pairs
    }
}

/// Picks the pair whose preview aspect ratio is closest to the display's, preferring the wider
/// preview among near-ties. Falls back to the size closest to the default preview size.
pub fn select_size_pair(
    pairs: &[SizePair],
    display_aspect_ratio_in_landscape: f32,
    config: &CameraConfig,
) -> Option<SizePair> {
    let mut selected: Option<SizePair> = None;
    let mut min_aspect_ratio_diff = f32::MAX;

    for pair in pairs {
        let preview = pair.preview;
        if preview.width < config.min_preview_width || preview.width > config.max_preview_width {
            continue;
        }

        let aspect_ratio_diff = (display_aspect_ratio_in_landscape - preview.aspect_ratio()).abs();
        if (aspect_ratio_diff - min_aspect_ratio_diff).abs() < config.aspect_ratio_tolerance {
            if selected.map_or(true, |current| current.preview.width < preview.width) {
                selected = Some(*pair);
            }
        } else if aspect_ratio_diff < min_aspect_ratio_diff {
            min_aspect_ratio_diff = aspect_ratio_diff;
            selected = Some(*pair);
        }
    }

    if selected.is_none() {
        selected = pairs
            .iter()
            .min_by_key(|pair| {
                pair.preview.width.abs_diff(config.default_preview_width)
                    + pair.preview.height.abs_diff(config.default_preview_height)
            })
            .copied();
    }

    selected
}

/// Picks the supported range closest to the requested frame rate at both ends.
pub fn select_preview_fps_range(ranges: &[FpsRange], requested_fps: f32) -> Option<FpsRange> {
    let desired = (requested_fps * 1000.0) as i64;
    ranges
        .iter()
        .min_by_key(|range| (desired - range.min as i64).abs() + (desired - range.max as i64).abs())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(list: &[(u32, u32)]) -> Vec<Size> {
        list.iter().map(|(w, h)| Size::new(*w, *h)).collect()
    }

    #[test]
    fn preview_sizes_pair_with_matching_picture_aspect() {
        let pairs = make_valid_size_pairs(
            &sizes(&[(640, 480), (1280, 720)]),
            &sizes(&[(1920, 1080), (2048, 1536)]),
            0.01,
        );
        assert_eq!(
            pairs,
            vec![
                SizePair::new(Size::new(640, 480), Some(Size::new(2048, 1536))),
                SizePair::new(Size::new(1280, 720), Some(Size::new(1920, 1080))),
            ]
        );
    }

    #[test]
    fn unmatched_previews_are_offered_without_picture() {
        let pairs = make_valid_size_pairs(&sizes(&[(640, 480)]), &sizes(&[(1920, 1080)]), 0.01);
        assert_eq!(pairs, vec![SizePair::new(Size::new(640, 480), None)]);
    }

    #[test]
    fn closest_aspect_ratio_wins_and_wider_breaks_ties() {
        let config = CameraConfig::default();
        let pairs: Vec<SizePair> = sizes(&[(640, 480), (960, 540), (1280, 720), (1920, 1080)])
            .into_iter()
            .map(|size| SizePair::new(size, None))
            .collect();

        // 16:9 display: 1920 is out of range, 1280x720 beats 960x540.
        let selected = select_size_pair(&pairs, 16.0 / 9.0, &config).unwrap();
        assert_eq!(selected.preview, Size::new(1280, 720));

        let selected = select_size_pair(&pairs, 4.0 / 3.0, &config).unwrap();
        assert_eq!(selected.preview, Size::new(640, 480));
    }

    #[test]
    fn falls_back_to_default_when_nothing_in_range() {
        let config = CameraConfig::default();
        let pairs: Vec<SizePair> = sizes(&[(320, 240), (176, 144), (1920, 1080)])
            .into_iter()
            .map(|size| SizePair::new(size, None))
            .collect();
        let selected = select_size_pair(&pairs, 16.0 / 9.0, &config).unwrap();
        assert_eq!(selected.preview, Size::new(320, 240));
        assert!(select_size_pair(&[], 1.0, &config).is_none());
    }

    #[test]
    fn fps_range_closest_to_thirty() {
        let ranges = vec![
            FpsRange::new(15_000, 15_000),
            FpsRange::new(7_000, 30_000),
            FpsRange::new(30_000, 30_000),
            FpsRange::new(24_000, 60_000),
        ];
        assert_eq!(
            select_preview_fps_range(&ranges, 30.0),
            Some(FpsRange::new(30_000, 30_000))
        );
        assert_eq!(select_preview_fps_range(&[], 30.0), None);
    }
}
