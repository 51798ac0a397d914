use shared::{HeatmapSlot, Preference};
use std::collections::BTreeMap;

use crate::db::{slot_order, VoteRow};

/// Group every vote by its exact `(start, end)` pair and tally it, earliest
/// slot first.
///
/// Slots are matched on their stored text, which is canonical, so two slots
/// that differ by a single second land in different buckets.
pub fn build_heatmap(votes: &[VoteRow]) -> Vec<HeatmapSlot> {
    let mut slots: BTreeMap<(&str, &str), HeatmapSlot> = BTreeMap::new();

    for vote in votes {
        let slot = slots
            .entry((vote.time_slot_start.as_str(), vote.time_slot_end.as_str()))
            .or_insert_with(|| HeatmapSlot {
                start: vote.time_slot_start.clone(),
                end: vote.time_slot_end.clone(),
                ..Default::default()
            });

        if !vote.is_available {
            slot.unavailable += 1;
            continue;
        }

        slot.available += 1;
        match vote.preference.parse() {
            Ok(Preference::Preferred) => slot.preferred += 1,
            Ok(Preference::IfNeeded) => slot.if_needed += 1,
            // Anything unrecognised counts as neutral
            _ => slot.neutral += 1,
        }
    }

    let mut heatmap: Vec<HeatmapSlot> = slots.into_values().collect();
    heatmap.sort_by_cached_key(|slot| slot_order(&slot.start, &slot.end));
    heatmap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(start: &str, end: &str, available: bool, preference: &str) -> VoteRow {
        VoteRow {
            time_slot_start: start.into(),
            time_slot_end: end.into(),
            is_available: available,
            preference: preference.into(),
        }
    }

    #[test]
    fn tallies_per_slot() {
        let heatmap = build_heatmap(&[
            vote("2024-01-10T09:00:00Z", "2024-01-10T09:30:00Z", true, "preferred"),
            vote("2024-01-10T09:00:00Z", "2024-01-10T09:30:00Z", true, "if_needed"),
            vote("2024-01-10T09:00:00Z", "2024-01-10T09:30:00Z", false, "preferred"),
            vote("2024-01-10T09:00:00Z", "2024-01-10T09:30:00Z", true, "neutral"),
            vote("2024-01-10T09:30:00Z", "2024-01-10T10:00:00Z", false, "neutral"),
        ]);

        assert_eq!(
            heatmap,
            vec![
                HeatmapSlot {
                    start: "2024-01-10T09:00:00Z".into(),
                    end: "2024-01-10T09:30:00Z".into(),
                    available: 3,
                    unavailable: 1,
                    preferred: 1,
                    neutral: 1,
                    if_needed: 1,
                },
                HeatmapSlot {
                    start: "2024-01-10T09:30:00Z".into(),
                    end: "2024-01-10T10:00:00Z".into(),
                    available: 0,
                    unavailable: 1,
                    preferred: 0,
                    neutral: 0,
                    if_needed: 0,
                },
            ]
        );
    }

    #[test]
    fn one_second_apart_is_a_different_slot() {
        let heatmap = build_heatmap(&[
            vote("2024-01-10T09:00:00Z", "2024-01-10T09:30:00Z", true, "neutral"),
            vote("2024-01-10T09:00:01Z", "2024-01-10T09:30:00Z", true, "neutral"),
        ]);
        assert_eq!(heatmap.len(), 2);
        assert!(heatmap.iter().all(|slot| slot.available == 1));
    }

    #[test]
    fn fractional_seconds_sort_after_the_whole_second() {
        let heatmap = build_heatmap(&[
            vote("2024-01-10T09:00:00.500Z", "2024-01-10T09:30:00Z", true, "neutral"),
            vote("2024-01-10T09:00:00Z", "2024-01-10T09:30:00Z", true, "neutral"),
            vote("2024-01-10T08:59:59.250Z", "2024-01-10T09:30:00Z", false, "neutral"),
        ]);

        let starts: Vec<_> = heatmap.iter().map(|slot| slot.start.as_str()).collect();
        assert_eq!(
            starts,
            vec![
                "2024-01-10T08:59:59.250Z",
                "2024-01-10T09:00:00Z",
                "2024-01-10T09:00:00.500Z",
            ]
        );
    }

    #[test]
    fn unknown_preference_counts_as_neutral() {
        let heatmap = build_heatmap(&[vote("a", "b", true, "maybe")]);
        assert_eq!(heatmap[0].neutral, 1);
    }

    #[test]
    fn empty_input_gives_empty_heatmap() {
        assert!(build_heatmap(&[]).is_empty());
    }
}
