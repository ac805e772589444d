//! Stage thresholds, reward idempotence, and next-stage selection.

use std::collections::HashSet;

use derive_getters::Getters;
use tracing::{debug, info, instrument};

use crate::config::{EngineConfig, FinalStagePolicy, RewardKind, StageRequirement};
use crate::engine::scoring::check_stage_completion;

/// Where play continues after a stage is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStage {
    /// Move up to this stage.
    Advance(u32),
    /// Stay on the final stage with its remaining pool.
    Stay(u32),
    /// Wrap to this stage on a new lap.
    Loop(u32),
    /// End the session.
    End,
}

/// A granted stage completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct StageAdvance {
    completed_stage: u32,
    reward: RewardKind,
    lap: u32,
    next: NextStage,
}

/// Tracks which stage crossings have already paid out.
///
/// Thresholds are cumulative within a lap. A lap only changes under the
/// `loop` policy, after which thresholds are measured from the lap's
/// starting score.
#[derive(Debug, Clone)]
pub struct StageProgression {
    requirements: Vec<StageRequirement>,
    policy: FinalStagePolicy,
    granted: HashSet<(u32, u32)>,
    lap: u32,
    lap_base_score: u32,
}

impl StageProgression {
    /// Creates progression bookkeeping from the engine config.
    #[instrument(skip(config))]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            requirements: config.stages().clone(),
            policy: *config.final_stage_policy(),
            granted: HashSet::new(),
            lap: 0,
            lap_base_score: 0,
        }
    }

    /// Highest configured stage.
    pub fn max_stage(&self) -> u32 {
        self.requirements.len() as u32
    }

    /// Current lap (0 until the first wrap).
    pub fn lap(&self) -> u32 {
        self.lap
    }

    /// Returns `true` if `stage` already paid out on `lap`.
    pub fn is_granted(&self, lap: u32, stage: u32) -> bool {
        self.granted.contains(&(lap, stage))
    }

    /// Checks the threshold for `stage` after the score changed.
    ///
    /// Returns the advance at most once per stage and lap.
    #[instrument(skip(self))]
    pub fn on_score(&mut self, score: u32, stage: u32) -> Option<StageAdvance> {
        let lap_score = score.saturating_sub(self.lap_base_score);
        let reward = check_stage_completion(lap_score, stage, &self.requirements)?;
        let lap = self.lap;
        if !self.granted.insert((lap, stage)) {
            debug!(stage, lap, "Stage already granted; ignoring repeat crossing");
            return None;
        }

        let max_stage = self.max_stage();
        let next = if stage < max_stage {
            NextStage::Advance((stage + 1).min(max_stage))
        } else {
            match self.policy {
                FinalStagePolicy::Stay => NextStage::Stay(stage),
                FinalStagePolicy::End => NextStage::End,
                FinalStagePolicy::Loop => {
                    self.lap += 1;
                    self.lap_base_score = score;
                    NextStage::Loop(1)
                }
            }
        };

        info!(stage, lap, %reward, next = ?next, "Stage completed");
        Some(StageAdvance {
            completed_stage: stage,
            reward,
            lap,
            next,
        })
    }

    /// Stage whose pool should be prefetched while `stage` is played.
    pub fn prefetch_target(&self, stage: u32) -> Option<u32> {
        if stage < self.max_stage() {
            Some(stage + 1)
        } else if self.policy == FinalStagePolicy::Loop && stage != 1 {
            Some(1)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(policy: FinalStagePolicy) -> EngineConfig {
        EngineConfig::default()
            .with_stages(vec![
                StageRequirement::new(1, 3, RewardKind::Sticker),
                StageRequirement::new(2, 5, RewardKind::Badge),
            ])
            .with_final_stage_policy(policy)
    }

    #[test]
    fn test_grants_once_per_crossing() {
        let mut progression = StageProgression::new(&config(FinalStagePolicy::Stay));
        assert!(progression.on_score(2, 1).is_none());
        let advance = progression.on_score(3, 1).expect("stage 1 complete");
        assert_eq!(*advance.next(), NextStage::Advance(2));
        assert_eq!(*advance.reward(), RewardKind::Sticker);
        assert!(progression.on_score(4, 1).is_none());
        assert!(progression.is_granted(0, 1));
    }

    #[test]
    fn test_final_stage_stay() {
        let mut progression = StageProgression::new(&config(FinalStagePolicy::Stay));
        let advance = progression.on_score(5, 2).expect("stage 2 complete");
        assert_eq!(*advance.next(), NextStage::Stay(2));
        assert!(progression.on_score(9, 2).is_none());
    }

    #[test]
    fn test_final_stage_end() {
        let mut progression = StageProgression::new(&config(FinalStagePolicy::End));
        let advance = progression.on_score(5, 2).expect("stage 2 complete");
        assert_eq!(*advance.next(), NextStage::End);
    }

    #[test]
    fn test_loop_measures_from_lap_start() {
        let mut progression = StageProgression::new(&config(FinalStagePolicy::Loop));
        let advance = progression.on_score(5, 2).expect("stage 2 complete");
        assert_eq!(*advance.next(), NextStage::Loop(1));
        assert_eq!(progression.lap(), 1);

        // Lap 1 needs three more points on stage 1.
        assert!(progression.on_score(7, 1).is_none());
        let again = progression.on_score(8, 1).expect("lap 1 stage 1");
        assert_eq!(*again.lap(), 1);
    }

    #[test]
    fn test_prefetch_target() {
        let progression = StageProgression::new(&config(FinalStagePolicy::Stay));
        assert_eq!(progression.prefetch_target(1), Some(2));
        assert_eq!(progression.prefetch_target(2), None);

        let looping = StageProgression::new(&config(FinalStagePolicy::Loop));
        assert_eq!(looping.prefetch_target(2), Some(1));
    }
}
