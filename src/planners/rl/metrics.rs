//! Moving-window training metrics and evaluation summaries

use std::collections::VecDeque;
use std::time::Instant;

use super::ppo::UpdateStats;

/// Moving average calculator
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Training metrics tracker
#[derive(Debug)]
pub struct TrainingMetrics {
    pub episode_rewards: MovingAverage,
    pub episode_lengths: MovingAverage,
    /// 1.0 for a win, 0.0 otherwise
    pub win_rate: MovingAverage,
    pub death_rate: MovingAverage,
    pub policy_loss: MovingAverage,
    pub value_loss: MovingAverage,
    pub entropy: MovingAverage,
    pub approx_kl: MovingAverage,
    pub episodes: usize,
    pub updates: usize,
    pub total_timesteps: usize,
    start_time: Instant,
}

impl TrainingMetrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            episode_rewards: MovingAverage::new(window_size),
            episode_lengths: MovingAverage::new(window_size),
            win_rate: MovingAverage::new(window_size),
            death_rate: MovingAverage::new(window_size),
            policy_loss: MovingAverage::new(window_size),
            value_loss: MovingAverage::new(window_size),
            entropy: MovingAverage::new(window_size),
            approx_kl: MovingAverage::new(window_size),
            episodes: 0,
            updates: 0,
            total_timesteps: 0,
            start_time: Instant::now(),
        }
    }

    /// Record episode completion
    pub fn record_episode(&mut self, reward: f32, length: usize, won: bool, died: bool) {
        self.episodes += 1;
        self.total_timesteps += length;
        self.episode_rewards.push(reward);
        self.episode_lengths.push(length as f32);
        self.win_rate.push(if won { 1.0 } else { 0.0 });
        self.death_rate.push(if died { 1.0 } else { 0.0 });
    }

    pub fn record_update(&mut self, stats: &UpdateStats) {
        self.updates += 1;
        self.policy_loss.push(stats.policy_loss);
        self.value_loss.push(stats.value_loss);
        self.entropy.push(stats.entropy);
        self.approx_kl.push(stats.approx_kl);
    }

    pub fn training_duration_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn timesteps_per_second(&self) -> f64 {
        let duration = self.training_duration_secs();
        if duration > 0.0 {
            self.total_timesteps as f64 / duration
        } else {
            0.0
        }
    }

    pub fn log_to_console(&self) {
        tracing::info!(
            "Episode {} | Updates {} | Timesteps {} | SPS {:.1}",
            self.episodes,
            self.updates,
            self.total_timesteps,
            self.timesteps_per_second()
        );
        tracing::info!(
            "  Episode: reward={:.2}, length={:.1}, win={:.1}%, death={:.1}%",
            self.episode_rewards.average(),
            self.episode_lengths.average(),
            self.win_rate.average() * 100.0,
            self.death_rate.average() * 100.0
        );
        tracing::info!(
            "  Losses: policy={:.4}, value={:.4}, entropy={:.4}, kl={:.4}",
            self.policy_loss.average(),
            self.value_loss.average(),
            self.entropy.average(),
            self.approx_kl.average()
        );
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Aggregate over a batch of greedy evaluation episodes
#[derive(Debug, Clone, Default)]
pub struct EvaluationMetrics {
    pub num_episodes: usize,
    pub total_reward: f32,
    pub num_wins: usize,
    pub num_deaths: usize,
    pub total_steps: usize,
}

impl EvaluationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_episode(&mut self, reward: f32, steps: usize, won: bool, died: bool) {
        self.num_episodes += 1;
        self.total_reward += reward;
        self.total_steps += steps;
        if won {
            self.num_wins += 1;
        }
        if died {
            self.num_deaths += 1;
        }
    }

    fn ratio(&self, count: f32) -> f32 {
        if self.num_episodes > 0 {
            count / self.num_episodes as f32
        } else {
            0.0
        }
    }

    pub fn avg_reward(&self) -> f32 {
        self.ratio(self.total_reward)
    }

    pub fn win_rate(&self) -> f32 {
        self.ratio(self.num_wins as f32)
    }

    pub fn avg_steps(&self) -> f32 {
        self.ratio(self.total_steps as f32)
    }

    pub fn death_rate(&self) -> f32 {
        self.ratio(self.num_deaths as f32)
    }

    pub fn print_summary(&self) {
        tracing::info!(
            "Evaluation over {} episodes: win={:.1}%, avg_reward={:.2}, avg_steps={:.1}, death={:.1}%",
            self.num_episodes,
            self.win_rate() * 100.0,
            self.avg_reward(),
            self.avg_steps(),
            self.death_rate() * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average() {
        let mut avg = MovingAverage::new(3);

        avg.push(1.0);
        assert!((avg.average() - 1.0).abs() < 1e-6);

        avg.push(2.0);
        assert!((avg.average() - 1.5).abs() < 1e-6);

        avg.push(3.0);
        assert!((avg.average() - 2.0).abs() < 1e-6);

        avg.push(4.0); // Pushes out 1.0
        assert!((avg.average() - 3.0).abs() < 1e-6);
        assert_eq!(avg.len(), 3);
    }

    #[test]
    fn test_training_metrics_window() {
        let mut metrics = TrainingMetrics::new(2);
        metrics.record_episode(-200.0, 10, false, true);
        metrics.record_episode(200.0, 20, true, false);
        metrics.record_episode(100.0, 30, true, false);

        assert_eq!(metrics.episodes, 3);
        assert_eq!(metrics.total_timesteps, 60);
        assert!((metrics.win_rate.average() - 1.0).abs() < 1e-6);
        assert!((metrics.episode_rewards.average() - 150.0).abs() < 1e-6);
        assert!(metrics.death_rate.average().abs() < 1e-6);
    }

    #[test]
    fn test_evaluation_metrics() {
        let mut metrics = EvaluationMetrics::new();
        assert_eq!(metrics.win_rate(), 0.0);

        metrics.record_episode(10.0, 50, true, false);
        metrics.record_episode(5.0, 100, false, true);

        assert_eq!(metrics.num_episodes, 2);
        assert!((metrics.avg_reward() - 7.5).abs() < 1e-6);
        assert!((metrics.win_rate() - 0.5).abs() < 1e-6);
        assert!((metrics.avg_steps() - 75.0).abs() < 1e-6);
        assert!((metrics.death_rate() - 0.5).abs() < 1e-6);
    }
}
