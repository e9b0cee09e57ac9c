//! Weight solvers for the three blend operators.
//!
//! Each solver overwrites every entry of `out` with the weight of the matching child.

use bevy::math::Vec2;

/// Binary cross-fade from state `from` to state `to`.
///
/// A transition with a non-positive duration switches instantly once `time` reaches
/// `transition_start`.
pub fn state_blend_weights(
    from: usize,
    to: usize,
    transition_start: f32,
    transition_duration: f32,
    time: f32,
    out: &mut [f32],
) {
    out.fill(0.);

    let progress = if transition_duration > 0. {
        ((time - transition_start) / transition_duration).clamp(0., 1.)
    } else if time >= transition_start {
        1.
    } else {
        0.
    };

    debug_assert!(from < out.len() && to < out.len());

    if from == to {
        if let Some(weight) = out.get_mut(to) {
            *weight = 1.;
        }
        return;
    }

    if let Some(weight) = out.get_mut(from) {
        *weight = 1. - progress;
    }
    if let Some(weight) = out.get_mut(to) {
        *weight = progress;
    }
}

/// One-dimensional blend over ascending `positions`, clamped at both ends.
pub fn linear_weights(parameter: f32, positions: &[f32], out: &mut [f32]) {
    out.fill(0.);

    let (Some(&first), Some(&last)) = (positions.first(), positions.last()) else {
        return;
    };

    if parameter <= first {
        out[0] = 1.;
        return;
    }

    let last_index = positions.len() - 1;
    if parameter >= last {
        out[last_index] = 1.;
        return;
    }

    for (i, segment) in positions.windows(2).enumerate() {
        let (t0, t1) = (segment[0], segment[1]);
        if parameter >= t0 && parameter <= t1 {
            let t = (parameter - t0) / (t1 - t0);
            out[i] = 1. - t;
            out[i + 1] = t;
            return;
        }
    }
}

/// Freeform cartesian (gradient band) blend.
///
/// Each child's weight is the tightest of its influence values against every other child,
/// clamped to `[0, 1]` and then normalized. Positions must be pairwise distinct and
/// `parameter` finite.
pub fn freeform_cartesian_weights(parameter: Vec2, positions: &[[f32; 2]], out: &mut [f32]) {
    let mut total = 0.;

    for (i, (position, weight_out)) in positions.iter().zip(out.iter_mut()).enumerate() {
        let position = Vec2::from_array(*position);
        let to_parameter = parameter - position;

        let mut weight = f32::INFINITY;
        for (j, other) in positions.iter().enumerate() {
            if i == j {
                continue;
            }

            let to_other = Vec2::from_array(*other) - position;
            let influence = 1. - to_parameter.dot(to_other) / to_other.length_squared();
            weight = weight.min(influence);
        }

        let weight = weight.clamp(0., 1.);
        total += weight;
        *weight_out = weight;
    }

    // The child nearest to `parameter` always scores at least 0.5, so `total` is positive.
    out.iter_mut().for_each(|weight| *weight /= total);
}
