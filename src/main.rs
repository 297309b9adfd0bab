use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use bomber_rl::AgentError;
use bomber_rl::planners::rl::{TrainConfig, Trainer};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

type TrainingBackend = Autodiff<NdArray<f32>>;

fn get_env_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bomber_rl=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn config_from_env() -> TrainConfig {
    let mut config = TrainConfig::default();

    if let Some(episodes) = get_env_var("BOMBER_EPISODES") {
        config.episodes = episodes;
    }
    if let Some(max_steps) = get_env_var("BOMBER_MAX_STEPS") {
        config.env.max_steps = max_steps;
    }
    if let Some(seed) = get_env_var("BOMBER_SEED") {
        config.seed = seed;
    }
    if let Ok(path) = env::var("BOMBER_MODEL_PATH") {
        config.model_path = PathBuf::from(path);
    }
    if let Some(resume) = get_env_var("BOMBER_RESUME") {
        config.resume = resume;
    }
    if let Some(interval) = get_env_var("BOMBER_EVAL_INTERVAL") {
        config.eval_interval = interval;
    }
    if let Some(episodes) = get_env_var("BOMBER_EVAL_EPISODES") {
        config.eval_episodes = episodes;
    }
    if let Some(interval) = get_env_var("BOMBER_SAVE_INTERVAL") {
        config.save_interval = interval;
    }
    if let Some(rate) = get_env_var("BOMBER_TARGET_WIN_RATE") {
        config.target_win_rate = rate;
    }

    config
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let config = config_from_env();
    tracing::info!(
        "Training {} episodes, seed {}, model {:?}",
        config.episodes,
        config.seed,
        config.model_path
    );

    let mut trainer = Trainer::<TrainingBackend>::new(config, NdArrayDevice::default())?;
    match trainer.train() {
        Ok(summary) => {
            tracing::info!(
                "Done: {} episodes, {} updates, best win rate {:.1}%",
                summary.episodes,
                summary.updates,
                summary.best_win_rate * 100.0
            );
            Ok(())
        }
        Err(err @ AgentError::TrainingDivergence { .. }) => {
            tracing::error!("{}; the diverged policy was not persisted", err);
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}
