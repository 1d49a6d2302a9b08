use super::model::{Restriction, Sample, Series, WorkSection};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Range predicates: which samples fall inside a kilometre range
// ---------------------------------------------------------------------------

/// Return indices of samples whose position lies in `[start, end]`.
///
/// Positions are sorted, so the result is a contiguous run found by binary
/// search rather than a full scan.
pub fn range_indices(series: &Series, start: f64, end: f64) -> std::ops::Range<usize> {
    let samples = series.samples();
    let lo = samples.partition_point(|s| s.position < start);
    let hi = samples.partition_point(|s| s.position <= end);
    lo..hi.max(lo)
}

/// Copy the part of `series` covered by the work section.
pub fn crop_to_section(series: &Series, section: &WorkSection) -> Result<Series> {
    let range = range_indices(series, section.start_km, section.end_km);
    let samples: Vec<Sample> = series.samples()[range].to_vec();
    Series::new(samples)
}

/// Return, per sample, the indices of the restrictions covering it.
///
/// A sample passes a restriction when:
/// * its position is inside `[start_km, end_km]` → listed
/// * otherwise → not listed
pub fn restrictions_per_sample(series: &Series, restrictions: &[Restriction]) -> Vec<Vec<usize>> {
    let mut per_sample = vec![Vec::new(); series.len()];
    for (r_idx, r) in restrictions.iter().enumerate() {
        for i in range_indices(series, r.start_km, r.end_km) {
            per_sample[i].push(r_idx);
        }
    }
    per_sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{RestrictionDirection, TrackDirection};

    fn ramp() -> Series {
        Series::from_values(0.0, 1.0, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap()
    }

    #[test]
    fn range_is_inclusive_on_both_ends() {
        assert_eq!(range_indices(&ramp(), 1.0, 3.0), 1..4);
        assert_eq!(range_indices(&ramp(), 1.5, 1.7), 2..2);
        assert_eq!(range_indices(&ramp(), 10.0, 20.0), 6..6);
    }

    #[test]
    fn crop_keeps_section_samples() {
        let section = WorkSection::new(2.0, 4.0, TrackDirection::Up, 0.0, 0.0).unwrap();
        let cropped = crop_to_section(&ramp(), &section).unwrap();
        assert_eq!(cropped.values(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn overlapping_restrictions_are_all_listed() {
        let a = Restriction::new(0.0, 2.0, RestrictionDirection::Both, 5.0).unwrap();
        let b = Restriction::fixed(2.0, 3.0, RestrictionDirection::Both).unwrap();
        let per = restrictions_per_sample(&ramp(), &[a, b]);
        assert_eq!(per[0], vec![0]);
        assert_eq!(per[2], vec![0, 1]);
        assert!(per[5].is_empty());
    }
}
