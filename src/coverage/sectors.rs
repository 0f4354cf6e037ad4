use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SECTOR_COUNT: u16 = 24;

/// Result of recording one angle against the current stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectorUpdate {
    pub sector_index: u16,
    pub is_new_sector: bool,
    pub coverage_fraction: f64,
    pub is_stage_complete: bool,
}

/// Tracks which of `sector_count` equal angular slices have been observed
/// during the current stage.
#[derive(Debug, Clone)]
pub struct SectorCoverage {
    sector_count: u16,
    covered: BTreeSet<u16>,
}

impl Default for SectorCoverage {
    fn default() -> Self {
        Self::new(DEFAULT_SECTOR_COUNT)
    }
}

impl SectorCoverage {
    /// `sector_count` is clamped to `1..=360`; configuration validation
    /// rejects anything outside that range before it gets here.
    pub fn new(sector_count: u16) -> Self {
        Self {
            sector_count: sector_count.clamp(1, 360),
            covered: BTreeSet::new(),
        }
    }

    pub fn sector_count(&self) -> u16 {
        self.sector_count
    }

    pub fn reset(&mut self) {
        self.covered.clear();
    }

    /// Floors, never rounds, so every normalized angle lands in `0..sector_count`.
    pub fn sector_for_angle(&self, angle_degrees: i32) -> u16 {
        let normalized = angle_degrees.rem_euclid(360) as u32;
        (normalized * u32::from(self.sector_count) / 360) as u16
    }

    pub fn record_angle(&mut self, angle_degrees: i32) -> SectorUpdate {
        let sector_index = self.sector_for_angle(angle_degrees);
        let is_new_sector = self.covered.insert(sector_index);

        SectorUpdate {
            sector_index,
            is_new_sector,
            coverage_fraction: self.coverage_fraction(),
            is_stage_complete: self.is_complete(),
        }
    }

    pub fn covered_count(&self) -> usize {
        self.covered.len()
    }

    pub fn coverage_fraction(&self) -> f64 {
        self.covered.len() as f64 / f64::from(self.sector_count)
    }

    pub fn coverage_percent(&self) -> f64 {
        self.coverage_fraction() * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.covered.len() == usize::from(self.sector_count)
    }

    pub fn is_covered(&self, sector_index: u16) -> bool {
        self.covered.contains(&sector_index)
    }

    pub fn covered_sectors(&self) -> Vec<u16> {
        self.covered.iter().copied().collect()
    }

    pub fn missing_sectors(&self) -> Vec<u16> {
        (0..self.sector_count)
            .filter(|index| !self.covered.contains(index))
            .collect()
    }

    /// Lowest sector not yet observed; the capture guide points the user there.
    pub fn next_target_sector(&self) -> Option<u16> {
        (0..self.sector_count).find(|index| !self.covered.contains(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(14, 0)]
    #[case(15, 1)]
    #[case(29, 1)]
    #[case(345, 23)]
    #[case(359, 23)]
    #[case(360, 0)]
    #[case(375, 1)]
    #[case(-1, 23)]
    #[case(-15, 23)]
    #[case(-16, 22)]
    fn angles_floor_into_sectors(#[case] angle: i32, #[case] expected: u16) {
        let coverage = SectorCoverage::new(24);
        assert_eq!(coverage.sector_for_angle(angle), expected);
    }

    #[test]
    fn full_rotation_completes_exactly_on_last_step() {
        let mut coverage = SectorCoverage::new(24);
        for tick in 0..24 {
            let update = coverage.record_angle(tick * 15);
            assert!(update.is_new_sector);
            assert_eq!(update.sector_index, tick as u16);
            assert_relative_eq!(update.coverage_fraction, f64::from(tick + 1) / 24.0);
            assert_eq!(update.is_stage_complete, tick == 23, "tick {tick}");
        }
        assert!(coverage.is_complete());
        assert_eq!(coverage.next_target_sector(), None);
    }

    #[test]
    fn re_recording_a_sector_changes_nothing() {
        let mut coverage = SectorCoverage::new(24);
        let first = coverage.record_angle(30);
        let second = coverage.record_angle(44);

        assert!(first.is_new_sector);
        assert!(!second.is_new_sector);
        assert_eq!(first.sector_index, second.sector_index);
        assert_eq!(first.coverage_fraction, second.coverage_fraction);
        assert!(!second.is_stage_complete);
        assert_eq!(coverage.covered_count(), 1);
    }

    #[test]
    fn reset_clears_coverage() {
        let mut coverage = SectorCoverage::new(24);
        for angle in [0, 15, 30] {
            coverage.record_angle(angle);
        }
        coverage.reset();
        assert_eq!(coverage.coverage_fraction(), 0.0);
        assert!(coverage.covered_sectors().is_empty());
        assert_eq!(coverage.missing_sectors().len(), 24);
    }

    #[test]
    fn next_target_is_lowest_gap() {
        let mut coverage = SectorCoverage::new(24);
        coverage.record_angle(0);
        coverage.record_angle(15);
        coverage.record_angle(45);
        assert_eq!(coverage.next_target_sector(), Some(2));
        assert_eq!(coverage.covered_sectors(), vec![0, 1, 3]);
        assert_relative_eq!(coverage.coverage_percent(), 12.5);
    }

    #[test]
    fn coarse_sectors_need_every_step() {
        let mut coverage = SectorCoverage::new(12);
        let completions: Vec<usize> = (0..24)
            .map(|tick| coverage.record_angle(tick * 15))
            .enumerate()
            .filter(|(_, update)| update.is_stage_complete && update.is_new_sector)
            .map(|(tick, _)| tick)
            .collect();
        assert_eq!(completions, vec![22]);
    }
}
