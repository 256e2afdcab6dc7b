//! Viridis colour scale.

use plotters::style::RGBColor;

/// Viridis sampled at nine evenly spaced stops.
const VIRIDIS_STOPS: [(u8, u8, u8); 9] = [
    (68, 1, 84),
    (71, 44, 122),
    (59, 81, 139),
    (44, 113, 142),
    (33, 144, 141),
    (39, 173, 129),
    (92, 200, 99),
    (170, 220, 50),
    (253, 231, 37),
];

/// Map `t` in `[0, 1]` to a viridis colour. Values outside are clamped.
pub fn viridis(t: f64) -> RGBColor {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let scaled = t * (VIRIDIS_STOPS.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(VIRIDIS_STOPS.len() - 2);
    let frac = scaled - lower as f64;

    let (r0, g0, b0) = VIRIDIS_STOPS[lower];
    let (r1, g1, b1) = VIRIDIS_STOPS[lower + 1];
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}

/// Linear normalisation of `value` into `[0, 1]`; a flat range maps to 0.
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max > min {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
