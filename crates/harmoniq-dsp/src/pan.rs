/// Equal-power pan gains for `pan` in `[-1, 1]`.
///
/// Returns `(sin(pi/4 * (1 - pan)), sin(pi/4 * (1 + pan)))`, which loses 3 dB
/// at center (`pan == 0.0` gives both channels `sqrt(2)/2`).
#[inline]
pub fn constant_power(pan: f32) -> (f32, f32) {
    let p = pan.clamp(-1.0, 1.0);
    let quarter_pi = core::f32::consts::FRAC_PI_4;
    ((quarter_pi * (1.0 - p)).sin(), (quarter_pi * (1.0 + p)).sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pan_loses_three_db() {
        let (l, r) = constant_power(0.0);
        assert!((l - core::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((r - core::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn hard_left_silences_right() {
        let (l, r) = constant_power(-1.0);
        assert!((l - 1.0).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }

    #[test]
    fn hard_right_silences_left() {
        let (l, r) = constant_power(1.0);
        assert!(l.abs() < 1e-6);
        assert!((r - 1.0).abs() < 1e-6);
    }
}
