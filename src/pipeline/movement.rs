use log::{debug, warn};

use crate::data::filter::restrictions_per_sample;
use crate::data::model::{Axis, Channel, MovementRecord, Restriction, Series};
use crate::error::{Result, TrackError, Warning};

#[derive(Debug, Clone, PartialEq)]
pub struct MovementResult {
    pub records: Vec<MovementRecord>,
    pub warnings: Vec<Warning>,
}

impl MovementResult {
    pub fn clamped_count(&self) -> usize {
        self.records.iter().filter(|r| r.clamped).count()
    }
}

/// Apply every restriction covering one sample to a raw movement.
///
/// A fixed zone pins the track on every axis. Otherwise the bounds of the
/// zones acting on the axis are intersected.
fn restrict(raw: f64, axis: Axis, zones: &[&Restriction]) -> f64 {
    if zones.iter().any(|z| z.is_fixed) {
        return 0.0;
    }
    let (lo, hi) = zones
        .iter()
        .filter_map(|z| z.bounds(axis))
        .fold((f64::NEG_INFINITY, f64::INFINITY), |(lo, hi), (a, b)| {
            (lo.max(a), hi.min(b))
        });
    // every zone admits zero, so lo <= hi
    raw.clamp(lo, hi)
}

/// `movement = plan - restored`, limited by the restriction zones that act
/// on the channel's axis.
pub fn calculate(
    plan: &Series,
    restored: &Series,
    channel: Channel,
    restrictions: &[Restriction],
) -> Result<MovementResult> {
    if plan.len() != restored.len() {
        return Err(TrackError::LengthMismatch {
            expected: restored.len(),
            found: plan.len(),
        });
    }
    let axis = channel.axis();
    let covering = restrictions_per_sample(restored, restrictions);

    let mut records = Vec::with_capacity(restored.len());
    let mut warnings = Vec::new();
    for ((p, r), zone_ids) in plan.samples().iter().zip(restored.samples()).zip(&covering) {
        let raw = p.value - r.value;
        let zones: Vec<&Restriction> = zone_ids.iter().map(|&i| &restrictions[i]).collect();
        let movement = restrict(raw, axis, &zones);

        let mut record = MovementRecord::new(r.position, axis, movement);
        if movement != raw {
            record.clamped = true;
            warnings.push(Warning::RestrictionClamped {
                position: r.position,
                raw,
                clamped: movement,
            });
        }
        records.push(record);
    }

    if !warnings.is_empty() {
        warn!("{} movements limited by restriction zones", warnings.len());
    }
    debug!("computed {} {channel} movements", records.len());
    Ok(MovementResult { records, warnings })
}

/// Zero every record that lies inside a fixed zone.
///
/// Run after boundary smoothing, which rescales records by position and
/// would otherwise move pinned track inside a taper zone.
pub fn pin_fixed_zones(records: &[MovementRecord], restrictions: &[Restriction]) -> Vec<MovementRecord> {
    let fixed: Vec<&Restriction> = restrictions.iter().filter(|z| z.is_fixed).collect();
    let mut pinned = 0;
    let out: Vec<MovementRecord> = records
        .iter()
        .map(|rec| {
            if rec.movement() == 0.0 || !fixed.iter().any(|z| z.covers(rec.position)) {
                return *rec;
            }
            pinned += 1;
            MovementRecord {
                clamped: true,
                ..rec.map_movement(|_| 0.0)
            }
        })
        .collect();
    if pinned > 0 {
        debug!("{pinned} smoothed movements pinned back to zero by fixed zones");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::RestrictionDirection;

    fn fixture() -> (Series, Series) {
        let restored = Series::from_values(0.0, 1.0, &[-5.0, -20.0, 10.0, 3.0, -8.0, 0.0]).unwrap();
        let plan = Series::from_values(0.0, 1.0, &[0.0; 6]).unwrap();
        (plan, restored)
    }

    #[test]
    fn unrestricted_movement_is_plan_minus_restored() {
        let (plan, restored) = fixture();
        let result = calculate(&plan, &restored, Channel::Level, &[]).unwrap();
        let m: Vec<f64> = result.records.iter().map(|r| r.movement()).collect();
        assert_eq!(m, vec![5.0, 20.0, -10.0, -3.0, 8.0, 0.0]);
        assert!(result.records.iter().all(|r| r.vertical_movement.is_some()));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn fixed_zone_forces_zero() {
        let (plan, restored) = fixture();
        let zone = Restriction::fixed(1.0, 2.0, RestrictionDirection::Vertical).unwrap();
        let result = calculate(&plan, &restored, Channel::Level, &[zone]).unwrap();
        assert_eq!(result.records[1].movement(), 0.0);
        assert_eq!(result.records[2].movement(), 0.0);
        assert!(result.records[1].clamped);
        assert_eq!(result.clamped_count(), 2);
        assert_eq!(result.records[3].movement(), -3.0);
    }

    #[test]
    fn capped_zone_bounds_magnitude() {
        let (plan, restored) = fixture();
        let zone = Restriction::new(0.0, 5.0, RestrictionDirection::Both, 6.0).unwrap();
        let result = calculate(&plan, &restored, Channel::Alignment, &[zone]).unwrap();
        for r in &result.records {
            assert!(r.lateral_movement.unwrap().abs() <= 6.0);
        }
        assert_eq!(result.records[0].movement(), 5.0);
        assert!(!result.records[0].clamped);
        assert_eq!(result.records[1].movement(), 6.0);
    }

    #[test]
    fn one_sided_zones() {
        let (plan, restored) = fixture();
        let left = Restriction::new(0.0, 5.0, RestrictionDirection::Left, 4.0).unwrap();
        let result = calculate(&plan, &restored, Channel::Alignment, &[left]).unwrap();
        assert_eq!(result.records[1].movement(), 20.0);
        assert_eq!(result.records[2].movement(), -4.0);
    }

    #[test]
    fn fixed_zone_pins_every_axis() {
        let (plan, restored) = fixture();
        let zone = Restriction::fixed(1.0, 2.0, RestrictionDirection::Both).unwrap();
        let result = calculate(&plan, &restored, Channel::Level, &[zone]).unwrap();
        assert_eq!(result.records[1].movement(), 0.0);
        assert_eq!(result.records[2].movement(), 0.0);
        assert!(result.records[1].clamped);
        assert_eq!(result.records[0].movement(), 5.0);

        let zone = Restriction::fixed(1.0, 2.0, RestrictionDirection::Vertical).unwrap();
        let result = calculate(&plan, &restored, Channel::Alignment, &[zone]).unwrap();
        assert_eq!(result.records[1].lateral_movement, Some(0.0));
        assert_eq!(result.clamped_count(), 2);
    }

    #[test]
    fn capped_zone_only_limits_its_axis() {
        let (plan, restored) = fixture();
        let lateral = Restriction::new(0.0, 5.0, RestrictionDirection::Both, 6.0).unwrap();
        let result = calculate(&plan, &restored, Channel::Level, &[lateral]).unwrap();
        assert_eq!(result.records[1].movement(), 20.0);
        assert!(result.warnings.is_empty());

        let vertical = Restriction::new(0.0, 5.0, RestrictionDirection::Vertical, 6.0).unwrap();
        let result = calculate(&plan, &restored, Channel::Alignment, &[vertical]).unwrap();
        assert_eq!(result.records[1].movement(), 20.0);
    }

    #[test]
    fn pinning_restores_zero_inside_fixed_zones() {
        let mut records: Vec<MovementRecord> = (0..6)
            .map(|i| MovementRecord::new(i as f64, Axis::Vertical, 4.0))
            .collect();
        records[0] = MovementRecord::new(0.0, Axis::Vertical, 0.0);
        let zones = [
            Restriction::fixed(0.0, 2.0, RestrictionDirection::Both).unwrap(),
            Restriction::new(3.0, 5.0, RestrictionDirection::Vertical, 1.0).unwrap(),
        ];
        let pinned = pin_fixed_zones(&records, &zones);
        let m: Vec<f64> = pinned.iter().map(|r| r.movement()).collect();
        assert_eq!(m, vec![0.0, 0.0, 0.0, 4.0, 4.0, 4.0]);
        assert!(!pinned[0].clamped);
        assert!(pinned[1].clamped && pinned[2].clamped);
        assert!(!pinned[3].clamped);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let (_, restored) = fixture();
        let short = Series::from_values(0.0, 1.0, &[0.0; 3]).unwrap();
        assert!(calculate(&short, &restored, Channel::Level, &[]).is_err());
    }
}
