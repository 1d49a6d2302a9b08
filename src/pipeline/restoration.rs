use log::debug;
use num_complex::Complex64;

use super::fft;
use crate::data::model::{Series, WavelengthBand};
use crate::error::Result;

/// Wavelength (m) of DFT bin `k` for `n` samples spaced `interval` apart.
///
/// Bins above Nyquist fold onto their mirror so a real signal keeps a
/// conjugate-symmetric spectrum. DC has no finite wavelength.
pub fn bin_wavelength(k: usize, n: usize, interval: f64) -> Option<f64> {
    let folded = k.min(n - k);
    if folded == 0 {
        None
    } else {
        Some(n as f64 * interval / folded as f64)
    }
}

/// Pass-band mask: `true` for every bin kept by `band`.
pub fn band_mask(n: usize, interval: f64, band: &WavelengthBand) -> Vec<bool> {
    (0..n)
        .map(|k| bin_wavelength(k, n, interval).is_some_and(|wl| band.contains(wl)))
        .collect()
}

/// Band-limit `series` to the wavelengths in `band`.
///
/// The output has the same positions as the input. Series with fewer than
/// two samples are returned unchanged. Restoring an already restored series
/// with the same band returns it unchanged (up to rounding), since the mask
/// is a projection.
pub fn restore(series: &Series, band: &WavelengthBand) -> Result<Series> {
    let Some(interval) = series.interval() else {
        return Ok(series.clone());
    };
    let n = series.len();

    let spectrum: Vec<Complex64> = series
        .samples()
        .iter()
        .map(|s| Complex64::new(s.value, 0.0))
        .collect();
    let mut spectrum = fft::forward(&spectrum);

    let mask = band_mask(n, interval, band);
    let kept = mask.iter().filter(|&&m| m).count();
    for (bin, keep) in spectrum.iter_mut().zip(&mask) {
        if !keep {
            *bin = Complex64::new(0.0, 0.0);
        }
    }
    debug!("restoring {n} samples at {interval} m, band {band}: {kept} bins kept");

    let values = fft::inverse(&spectrum).into_iter().map(|c| c.re).collect();
    series.with_values(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn mixed(n: usize, interval: f64) -> Series {
        // 20 m defect, 2 m noise and a 5 mm offset
        let values: Vec<f64> = (0..n)
            .map(|i| {
                let p = i as f64 * interval;
                5.0 + 4.0 * (2.0 * PI * p / 20.0).sin() + 0.8 * (2.0 * PI * p / 2.0).sin()
            })
            .collect();
        Series::from_values(0.0, interval, &values).unwrap()
    }

    #[test]
    fn trivial_series_pass_through() {
        let band = WavelengthBand::new(6.0, 40.0).unwrap();
        let empty = Series::default();
        assert_eq!(restore(&empty, &band).unwrap(), empty);
        let single = Series::from_values(3.0, 0.25, &[7.0]).unwrap();
        assert_eq!(restore(&single, &band).unwrap(), single);
    }

    #[test]
    fn keeps_in_band_component_only() {
        // 400 samples × 0.25 m = 100 m: the 20 m and 2 m waves sit on exact bins
        let s = mixed(400, 0.25);
        let band = WavelengthBand::new(6.0, 40.0).unwrap();
        let r = restore(&s, &band).unwrap();
        assert_eq!(r.positions(), s.positions());
        for sample in r.samples() {
            let expected = 4.0 * (2.0 * PI * sample.position / 20.0).sin();
            assert!((sample.value - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn restoration_is_idempotent() {
        let band = WavelengthBand::new(6.0, 40.0).unwrap();
        for n in [64usize, 101, 401] {
            let s = mixed(n, 0.25);
            let once = restore(&s, &band).unwrap();
            let twice = restore(&once, &band).unwrap();
            for (a, b) in once.samples().iter().zip(twice.samples()) {
                assert!((a.value - b.value).abs() < 1e-9, "n={n}");
            }
        }
    }

    #[test]
    fn mask_is_symmetric_and_excludes_dc() {
        let band = WavelengthBand::new(6.0, 40.0).unwrap();
        let mask = band_mask(401, 0.25, &band);
        assert!(!mask[0]);
        for k in 1..401 {
            assert_eq!(mask[k], mask[401 - k]);
        }
    }
}
