//! Property-based check of the one-pole amplitude smoother's monotone
//! convergence law: each sample moves `amp` no further from `targetAmp`
//! than it started.

use harmoniq_engine::Partial;
use proptest::prelude::*;

proptest! {
    #[test]
    fn amp_error_never_grows(
        start_amp in -2.0f32..2.0,
        target_amp in -2.0f32..2.0,
        coeff in 0.0f32..1.0,
        steps in 1usize..64,
    ) {
        let mut partial = Partial::new(target_amp.abs().max(1e-3), 0.0, 0.1, coeff);
        partial.amp = start_amp;
        partial.target_amp = target_amp;

        let mut left = vec![0.0f32; 1];
        let mut right = vec![0.0f32; 1];
        let mut previous_error = (target_amp - start_amp).abs();

        for _ in 0..steps {
            harmoniq_engine::partial::process_partial(&mut partial, 1, &mut left, &mut right);
            let error = (partial.target_amp - partial.amp).abs();
            prop_assert!(error <= previous_error + f32::EPSILON * 4.0);
            previous_error = error;
        }
    }
}
