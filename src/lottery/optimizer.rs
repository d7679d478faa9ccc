use crate::config::EngineSettings;
use crate::error::LotteryError;
use crate::lottery::matcher::TrialMatcher;
use crate::lottery::model::{GradeOrder, StudentPreferences, TrialOutcome};
use crate::lottery::overrides::ResolvedOverrides;
use async_trait::async_trait;
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialProgress {
    /// 当前试验序号（1 起），只是计数器，不是 PRNG 种子
    pub seed: u32,
    pub percent: i32,
}

/// 进度检查点的接收方；返回错误会中止整个优化循环
#[async_trait]
pub trait ProgressSink: Send {
    async fn report(&mut self, progress: TrialProgress) -> Result<(), LotteryError>;
}

pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn report(&mut self, _progress: TrialProgress) -> Result<(), LotteryError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestTrial {
    pub seed: u32,
    pub outcome: TrialOutcome,
}

/// 多次试验间保留的最优结果；cost 严格更低才替换，相等时保留先出现的
#[derive(Debug, Default)]
pub struct BestTrialTracker {
    best: Option<BestTrial>,
    trials_seen: u32,
    worst_cost: Option<i64>,
}

impl BestTrialTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回该试验是否成为新的最优
    pub fn offer(&mut self, seed: u32, outcome: TrialOutcome) -> bool {
        self.trials_seen += 1;
        self.worst_cost = Some(self.worst_cost.map_or(outcome.cost, |w| w.max(outcome.cost)));

        let better = match &self.best {
            None => true,
            Some(current) => outcome.cost < current.outcome.cost,
        };
        if better {
            self.best = Some(BestTrial { seed, outcome });
        }
        better
    }

    pub fn best(&self) -> Option<&BestTrial> {
        self.best.as_ref()
    }

    pub fn trials_seen(&self) -> u32 {
        self.trials_seen
    }

    pub fn worst_cost(&self) -> Option<i64> {
        self.worst_cost
    }

    pub fn into_best(self) -> Option<BestTrial> {
        self.best
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationReport {
    pub best: BestTrial,
    pub trials_run: u32,
    pub worst_cost: i64,
}

pub struct MultiTrialOptimizer {
    matcher: TrialMatcher,
    settings: EngineSettings,
}

impl MultiTrialOptimizer {
    pub fn new(grade_order: GradeOrder, settings: EngineSettings) -> Self {
        Self {
            matcher: TrialMatcher::new(grade_order),
            settings,
        }
    }

    pub fn percent_for(seed: u32, trials: u32) -> i32 {
        if trials == 0 {
            return 100;
        }
        ((seed as u64 * 100) / trials as u64) as i32
    }

    /// 顺序执行 seed 1..=trials；每 progress_interval 次上报一次进度并让出执行权
    pub async fn run<S: ProgressSink + ?Sized>(
        &self,
        students: &[StudentPreferences],
        overrides: &ResolvedOverrides,
        sink: &mut S,
    ) -> Result<OptimizationReport, LotteryError> {
        self.settings.validate()?;
        let trials = self.settings.trials;
        let interval = self.settings.progress_interval;

        let mut ambient = StdRng::from_entropy();
        let mut tracker = BestTrialTracker::new();

        for seed in 1..=trials {
            let outcome = match self.settings.rng_seed {
                Some(base) => {
                    let mut rng = StdRng::seed_from_u64(base.wrapping_add(seed as u64));
                    self.matcher.run(students, overrides, &mut rng)
                }
                None => self.matcher.run(students, overrides, &mut ambient),
            };
            if tracker.offer(seed, outcome) {
                debug!("seed {} 得到更优结果", seed);
            }

            if seed % interval == 0 {
                sink.report(TrialProgress {
                    seed,
                    percent: Self::percent_for(seed, trials),
                })
                .await?;
                tokio::task::yield_now().await;
            }
        }

        let trials_run = tracker.trials_seen();
        let worst_cost = tracker.worst_cost().unwrap_or(0);
        let best = tracker
            .into_best()
            .ok_or_else(|| LotteryError::InvalidConfig("no trial was run".to_string()))?;

        Ok(OptimizationReport {
            best,
            trials_run,
            worst_cost,
        })
    }
}
