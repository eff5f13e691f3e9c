//! Playback order for clips.
//!
//! Clips play back by when they were recorded, not when they were uploaded.
//! Equal recording times fall back to the clip id so the order is total.

use std::cmp::Ordering;

use crate::model::Clip;

/// Compare two clips for playback.
#[must_use]
pub fn playback_order(a: &Clip, b: &Clip) -> Ordering {
    a.recorded_at
        .cmp(&b.recorded_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort clips in place into playback order.
pub fn sort_for_playback(clips: &mut [Clip]) {
    clips.sort_by(playback_order);
}

/// Return `clips` in playback order.
#[must_use]
pub fn order_for_playback(mut clips: Vec<Clip>) -> Vec<Clip> {
    sort_for_playback(&mut clips);
    clips
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn clip(id: &str, recorded: DateTime<Utc>, uploaded: DateTime<Utc>) -> Clip {
        Clip {
            id: id.to_string(),
            capsule_id: "cap".to_string(),
            uploader_id: "u".to_string(),
            uploader_name: "U".to_string(),
            storage_path: format!("capsules/cap/videos/{id}.mov"),
            recorded_at: recorded,
            uploaded_at: uploaded,
            duration_ms: None,
            content_hash: id.to_string(),
        }
    }

    fn hm(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap()
    }

    fn ids(clips: &[Clip]) -> Vec<&str> {
        clips.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_orders_by_recorded_at() {
        let upload = hm(23, 0);
        let clips = vec![
            clip("a", hm(10, 30), upload),
            clip("b", hm(8, 45), upload),
            clip("c", hm(12, 15), upload),
        ];

        let ordered = order_for_playback(clips);
        let times: Vec<_> = ordered.iter().map(|c| c.recorded_at).collect();
        assert_eq!(times, vec![hm(8, 45), hm(10, 30), hm(12, 15)]);
    }

    #[test]
    fn test_ignores_upload_time() {
        let clips = vec![
            clip("late-recorded", hm(12, 0), hm(13, 0)),
            clip("early-recorded", hm(9, 0), hm(20, 0)),
        ];

        assert_eq!(
            ids(&order_for_playback(clips)),
            vec!["early-recorded", "late-recorded"]
        );
    }

    #[test]
    fn test_equal_timestamps_fall_back_to_id() {
        let t = hm(9, 0);
        let clips = vec![
            clip("c", t, hm(11, 0)),
            clip("a", t, hm(12, 0)),
            clip("b", t, hm(10, 0)),
        ];

        assert_eq!(ids(&order_for_playback(clips)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sorting_twice_is_identical() {
        let mut clips = vec![
            clip("x", hm(11, 0), hm(11, 0)),
            clip("y", hm(9, 0), hm(9, 0)),
            clip("z", hm(9, 0), hm(8, 0)),
            clip("w", hm(10, 0), hm(10, 0)),
        ];

        sort_for_playback(&mut clips);
        let first = clips.clone();
        sort_for_playback(&mut clips);
        assert_eq!(clips, first);
        assert_eq!(ids(&clips), vec!["y", "z", "w", "x"]);
    }

    #[test]
    fn test_empty_and_single() {
        assert!(order_for_playback(Vec::new()).is_empty());

        let one = vec![clip("only", hm(1, 0), hm(1, 0))];
        assert_eq!(order_for_playback(one.clone()), one);
    }
}
