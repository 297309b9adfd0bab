//! Generalized Advantage Estimation

/// Per-step targets computed from one drained rollout
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvantageSet {
    pub returns: Vec<f32>,
    pub advantages: Vec<f32>,
}

impl AdvantageSet {
    pub fn len(&self) -> usize {
        self.advantages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advantages.is_empty()
    }
}

/// Raw (unnormalized) GAE over a rollout that may span several episodes.
///
/// A `done` step gets no bootstrap value and cuts the running estimate, so
/// nothing propagates backwards across an episode boundary. The value after
/// the last step is taken as 0. All three slices must have the same length.
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    gamma: f32,
    lambda: f32,
) -> AdvantageSet {
    debug_assert_eq!(rewards.len(), values.len(), "one value estimate per reward");
    debug_assert_eq!(rewards.len(), dones.len(), "one done flag per reward");
    let len = rewards.len();
    let mut advantages = vec![0.0; len];
    let mut returns = vec![0.0; len];
    let mut gae = 0.0f32;

    for t in (0..len).rev() {
        let (next_value, continues) = if dones[t] {
            (0.0, 0.0)
        } else {
            (values.get(t + 1).copied().unwrap_or(0.0), 1.0)
        };

        let delta = rewards[t] + gamma * next_value - values[t];
        gae = delta + gamma * lambda * continues * gae;

        advantages[t] = gae;
        returns[t] = gae + values[t];
    }

    AdvantageSet {
        returns,
        advantages,
    }
}

/// `(x - mean) / (std + 1e-8)` with the sample (n - 1) standard deviation.
/// A single value has no spread and normalizes to 0.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }

    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let std = if values.len() > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / (n - 1.0);
        var.sqrt()
    } else {
        0.0
    };

    values.iter().map(|v| (v - mean) / (std + 1e-8)).collect()
}

/// GAE followed by advantage normalization; returns are left untouched
pub fn compute_normalized(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    gamma: f32,
    lambda: f32,
) -> AdvantageSet {
    let mut set = compute_gae(rewards, values, dones, gamma, lambda);
    set.advantages = normalize(&set.advantages);
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAMMA: f32 = 0.99;
    const LAMBDA: f32 = 0.95;

    #[test]
    fn test_terminal_step_has_no_bootstrap() {
        let set = compute_normalized(
            &[1.0, 0.0, 0.0, 1.0],
            &[0.0; 4],
            &[false, false, false, true],
            GAMMA,
            LAMBDA,
        );
        assert_eq!(set.len(), 4);
        assert_eq!(set.returns.len(), 4);
        assert_eq!(set.returns[3], 1.0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "one value estimate per reward")]
    fn test_mismatched_lengths_are_rejected() {
        compute_gae(&[1.0, 0.0, 1.0], &[0.0, 0.0], &[false, false, true], GAMMA, LAMBDA);
    }

    #[test]
    fn test_done_cuts_propagation() {
        let dones = [false, true, false];
        let base = compute_gae(&[1.0, 2.0, 3.0], &[0.5, 0.25, 0.75], &dones, GAMMA, LAMBDA);
        let changed = compute_gae(&[-7.0, 9.0, 3.0], &[4.0, -2.0, 0.75], &dones, GAMMA, LAMBDA);

        // Last step stands alone: its own reward minus its own value
        assert_eq!(base.advantages[2], changed.advantages[2]);
        assert!((base.advantages[2] - (3.0 - 0.75)).abs() < 1e-6);

        // Step 1 is terminal, so step 2 does not leak into it
        assert!((base.advantages[1] - (2.0 - 0.25)).abs() < 1e-6);
    }

    #[test]
    fn test_recursion_within_episode() {
        let set = compute_gae(&[0.0, 1.0], &[0.5, 0.0], &[false, true], GAMMA, LAMBDA);
        let delta0 = 0.0 + GAMMA * 0.0 - 0.5;
        let expected0 = delta0 + GAMMA * LAMBDA * 1.0;
        assert!((set.advantages[0] - expected0).abs() < 1e-6);
        assert!((set.returns[0] - (expected0 + 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_final_step_without_done_bootstraps_zero() {
        let set = compute_gae(&[1.0], &[0.4], &[false], GAMMA, LAMBDA);
        assert!((set.advantages[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_single_value() {
        assert_eq!(normalize(&[5.0]), vec![0.0]);
    }

    #[test]
    fn test_normalize_constant_advantages() {
        let normalized = normalize(&[2.0, 2.0, 2.0]);
        assert!(normalized.iter().all(|v| v.is_finite() && v.abs() < 1e-6));
    }

    #[test]
    fn test_normalize_zero_mean_unit_std() {
        let normalized = normalize(&[1.0, 2.0, 3.0, 4.0]);
        let mean: f32 = normalized.iter().sum::<f32>() / 4.0;
        let var: f32 = normalized.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 3.0;
        assert!(mean.abs() < 1e-6);
        assert!((var - 1.0).abs() < 1e-4);
    }
}
