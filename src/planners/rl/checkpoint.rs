//! Policy checkpoints: weights, optimizer moments, schedule and update counter
//! written as one MessagePack artifact.

use std::fmt;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::optim::Optimizer;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder};
use burn::tensor::backend::AutodiffBackend;

use super::policy::{ActorCritic, ActorCriticConfig, ActorCriticRecord};
use super::ppo::PolicyOptimizer;
use crate::error::{AgentError, CheckpointLoadReason, Result};

/// File extension added by the recorder
pub const CHECKPOINT_EXTENSION: &str = "mpk";

/// Adam moments of the policy optimizer, keyed by parameter
pub type OptimizerRecord<B> = <PolicyOptimizer<ActorCritic<B>, B> as Optimizer<ActorCritic<B>, B>>::Record;

/// Everything persisted for one policy
#[derive(Record)]
pub struct PolicyCheckpoint<B: AutodiffBackend> {
    pub model: ActorCriticRecord<B>,
    /// Absent in inference-only checkpoints
    pub optimizer: Option<OptimizerRecord<B>>,
    /// Current learning rate of the decay schedule
    pub scheduler: Option<f64>,
    pub update_count: usize,
    pub feature_count: usize,
    pub hidden_size: usize,
    pub action_count: usize,
}

impl<B: AutodiffBackend> PolicyCheckpoint<B> {
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.feature_count, self.hidden_size, self.action_count)
    }
}

impl<B: AutodiffBackend> fmt::Debug for PolicyCheckpoint<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyCheckpoint")
            .field("update_count", &self.update_count)
            .field("shape", &self.shape())
            .field("scheduler", &self.scheduler)
            .field("optimizer", &self.optimizer.is_some())
            .finish_non_exhaustive()
    }
}

/// Path the recorder actually writes for `path`
pub fn artifact_path(path: &Path) -> PathBuf {
    path.with_extension(CHECKPOINT_EXTENSION)
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Write `checkpoint` next to its final location, then rename it into place
/// so a crash never leaves a truncated artifact at `path`.
pub fn save<B: AutodiffBackend>(checkpoint: PolicyCheckpoint<B>, path: &Path) -> Result<PathBuf> {
    let target = artifact_path(path);
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    let staging = target.with_file_name(format!("{stem}-partial"));

    Recorder::<B>::record(&recorder(), checkpoint, staging.clone()).map_err(|err| {
        AgentError::CheckpointSave {
            path: target.clone(),
            message: err.to_string(),
        }
    })?;
    std::fs::rename(artifact_path(&staging), &target)?;

    tracing::info!("Saved checkpoint to {}", target.display());
    Ok(target)
}

/// Read a checkpoint and check it against the network shape it will be loaded into
pub fn load<B: AutodiffBackend>(
    path: &Path,
    expected: &ActorCriticConfig,
    device: &B::Device,
) -> Result<PolicyCheckpoint<B>> {
    let target = artifact_path(path);
    if !target.exists() {
        return Err(AgentError::CheckpointLoad {
            path: target,
            reason: CheckpointLoadReason::Missing,
        });
    }

    let checkpoint: PolicyCheckpoint<B> = Recorder::<B>::load(&recorder(), target.clone(), device)
        .map_err(|err| AgentError::CheckpointLoad {
            path: target.clone(),
            reason: CheckpointLoadReason::Unreadable(err.to_string()),
        })?;

    if checkpoint.shape() != expected.shape() {
        return Err(AgentError::CheckpointLoad {
            path: target,
            reason: CheckpointLoadReason::ShapeMismatch {
                expected: expected.shape(),
                found: checkpoint.shape(),
            },
        });
    }

    tracing::info!(
        "Loaded checkpoint from {} (update {}, optimizer state: {})",
        target.display(),
        checkpoint.update_count,
        checkpoint.optimizer.is_some()
    );
    Ok(checkpoint)
}

/// Weights-only checkpoint for evaluation use
pub fn inference_only<B: AutodiffBackend>(
    model: &ActorCritic<B>,
    config: &ActorCriticConfig,
    update_count: usize,
) -> PolicyCheckpoint<B> {
    let (feature_count, hidden_size, action_count) = config.shape();
    PolicyCheckpoint {
        model: model.clone().into_record(),
        optimizer: None,
        scheduler: None,
        update_count,
        feature_count,
        hidden_size,
        action_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planners::rl::policy::{PolicyNetwork, to_floats};
    use crate::planners::rl::ppo::policy_optimizer;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::GradientsParams;
    use burn::tensor::Tensor;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn config() -> ActorCriticConfig {
        ActorCriticConfig::new(8).with_hidden_size(6)
    }

    #[test]
    fn test_round_trip_restores_forward() {
        let device = NdArrayDevice::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy");

        let model = config().init::<TestBackend>(&device, 17).unwrap();
        let written = save(inference_only(&model, &config(), 3), &path).unwrap();
        assert_eq!(written, dir.path().join("policy.mpk"));
        assert!(!dir.path().join("policy-partial.mpk").exists());

        let restored = load::<TestBackend>(&path, &config(), &device).unwrap();
        assert_eq!(restored.update_count, 3);
        assert!(restored.optimizer.is_none());

        let fresh = config().init::<TestBackend>(&device, 99).unwrap();
        let fresh = fresh.load_record(restored.model);

        let input = Tensor::<TestBackend, 1>::from_floats([0.1, 0.9, 0.3, 0.0, 1.0, 0.5, 0.2, 0.7], &device)
            .reshape([1, 8]);
        let (p1, v1) = model.forward(input.clone());
        let (p2, v2) = fresh.forward(input);
        assert_eq!(to_floats(p1), to_floats(p2));
        assert_eq!(to_floats(v1), to_floats(v2));
    }

    #[test]
    fn test_optimizer_state_round_trip() {
        let device = NdArrayDevice::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training");

        // One Adam step so the record carries moments for every parameter
        let model = config().init::<TestBackend>(&device, 5).unwrap();
        let mut optimizer = policy_optimizer::<TestBackend, ActorCritic<TestBackend>>();
        let input = Tensor::<TestBackend, 1>::from_floats([0.5; 8], &device).reshape([1, 8]);
        let (_, value) = model.forward(input);
        let grads = GradientsParams::from_grads(value.sum().backward(), &model);
        let model = optimizer.step(1e-3, model, grads);

        let record = optimizer.to_record();
        let moments = record.len();
        assert!(moments > 0);

        let mut checkpoint = inference_only(&model, &config(), 7);
        checkpoint.optimizer = Some(record);
        checkpoint.scheduler = Some(2.5e-4);
        save(checkpoint, &path).unwrap();

        let restored = load::<TestBackend>(&path, &config(), &device).unwrap();
        assert_eq!(restored.update_count, 7);
        assert_eq!(restored.scheduler, Some(2.5e-4));
        assert_eq!(restored.optimizer.as_ref().map(|r| r.len()), Some(moments));
        assert!(format!("{restored:?}").contains("update_count: 7"));

        // The restored moments load back into a fresh optimizer
        let fresh = policy_optimizer::<TestBackend, ActorCritic<TestBackend>>();
        let fresh = fresh.load_record(restored.optimizer.unwrap());
        assert_eq!(fresh.to_record().len(), moments);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load::<TestBackend>(&dir.path().join("absent"), &config(), &NdArrayDevice::default())
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::CheckpointLoad {
                reason: CheckpointLoadReason::Missing,
                ..
            }
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let device = NdArrayDevice::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small");

        let model = config().init::<TestBackend>(&device, 1).unwrap();
        save(inference_only(&model, &config(), 0), &path).unwrap();

        let wider = ActorCriticConfig::new(9).with_hidden_size(6);
        let err = load::<TestBackend>(&path, &wider, &device).unwrap_err();
        assert!(matches!(
            err,
            AgentError::CheckpointLoad {
                reason: CheckpointLoadReason::ShapeMismatch { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_garbage_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk");
        std::fs::write(artifact_path(&path), b"not a checkpoint").unwrap();

        let err = load::<TestBackend>(&path, &config(), &NdArrayDevice::default()).unwrap_err();
        assert!(matches!(
            err,
            AgentError::CheckpointLoad {
                reason: CheckpointLoadReason::Unreadable(_),
                ..
            }
        ));
    }
}
