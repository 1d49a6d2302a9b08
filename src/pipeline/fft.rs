//! Discrete Fourier transform for arbitrary lengths.
//!
//! Power-of-two sizes use an iterative radix-2 transform; every other size
//! goes through Bluestein's chirp-z algorithm on a padded radix-2 grid.

use std::f64::consts::PI;

use num_complex::Complex64;

/// Forward transform (`exp(-2πi·jk/n)` kernel, no scaling).
pub fn forward(input: &[Complex64]) -> Vec<Complex64> {
    transform(input, false)
}

/// Inverse transform, scaled by `1/n`.
pub fn inverse(input: &[Complex64]) -> Vec<Complex64> {
    let n = input.len();
    let mut out = transform(input, true);
    if n > 0 {
        let scale = 1.0 / n as f64;
        for v in &mut out {
            *v *= scale;
        }
    }
    out
}

fn transform(input: &[Complex64], inverse: bool) -> Vec<Complex64> {
    let n = input.len();
    if n <= 1 {
        return input.to_vec();
    }
    if n.is_power_of_two() {
        let mut buf = input.to_vec();
        radix2_in_place(&mut buf, inverse);
        buf
    } else {
        bluestein(input, inverse)
    }
}

fn radix2_in_place(buf: &mut [Complex64], inverse: bool) {
    let n = buf.len();
    let bits = n.trailing_zeros();

    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if j > i {
            buf.swap(i, j);
        }
    }

    let sign = if inverse { 1.0 } else { -1.0 };
    let mut len = 2;
    while len <= n {
        let angle = sign * 2.0 * PI / len as f64;
        let half = len / 2;
        for start in (0..n).step_by(len) {
            for k in 0..half {
                let w = Complex64::from_polar(1.0, angle * k as f64);
                let a = buf[start + k];
                let b = buf[start + k + half] * w;
                buf[start + k] = a + b;
                buf[start + k + half] = a - b;
            }
        }
        len <<= 1;
    }
}

fn bluestein(input: &[Complex64], inverse: bool) -> Vec<Complex64> {
    let n = input.len();
    let m = (2 * n - 1).next_power_of_two();
    let sign = if inverse { 1.0 } else { -1.0 };

    // chirp[k] = exp(sign·iπk²/n); k² taken mod 2n to keep the angle small
    let chirp: Vec<Complex64> = (0..n)
        .map(|k| {
            let k2 = (k as u128 * k as u128 % (2 * n as u128)) as f64;
            Complex64::from_polar(1.0, sign * PI * k2 / n as f64)
        })
        .collect();

    let mut a = vec![Complex64::new(0.0, 0.0); m];
    for k in 0..n {
        a[k] = input[k] * chirp[k];
    }
    let mut b = vec![Complex64::new(0.0, 0.0); m];
    b[0] = chirp[0].conj();
    for k in 1..n {
        b[k] = chirp[k].conj();
        b[m - k] = chirp[k].conj();
    }

    radix2_in_place(&mut a, false);
    radix2_in_place(&mut b, false);
    for (x, y) in a.iter_mut().zip(&b) {
        *x *= *y;
    }
    radix2_in_place(&mut a, true);
    let scale = 1.0 / m as f64;

    (0..n).map(|k| a[k] * scale * chirp[k]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_dft(input: &[Complex64]) -> Vec<Complex64> {
        let n = input.len();
        (0..n)
            .map(|k| {
                input
                    .iter()
                    .enumerate()
                    .map(|(j, x)| x * Complex64::from_polar(1.0, -2.0 * PI * (j * k) as f64 / n as f64))
                    .sum()
            })
            .collect()
    }

    fn signal(n: usize) -> Vec<Complex64> {
        (0..n)
            .map(|i| Complex64::new((i as f64 * 0.37).sin() + 0.1 * i as f64, 0.0))
            .collect()
    }

    #[test]
    fn matches_naive_dft_for_power_of_two_and_odd_sizes() {
        for n in [1usize, 2, 8, 13, 100, 401] {
            let x = signal(n);
            let fast = forward(&x);
            let slow = naive_dft(&x);
            for (a, b) in fast.iter().zip(&slow) {
                assert!((a - b).norm() < 1e-8 * n as f64, "n={n}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn inverse_restores_input() {
        let x = signal(37);
        let back = inverse(&forward(&x));
        for (a, b) in back.iter().zip(&x) {
            assert!((a - b).norm() < 1e-10);
        }
    }
}
