use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::config::{AppConfig, ModelConfig, OptimConfig};
use crate::data::DataSource;
use crate::engine::{Event, Flow, Loop, RunContext, RunStatus, Trigger};
use crate::error::{LoopError, TrainingError};
use crate::gan::{GanStep, GanStepConfig, PlayerLosses, PlayerState, TrainState};
use crate::networks::{Discriminator, DiscriminatorConfig, Generator, GeneratorConfig};
use crate::training::observers::{
    HaltAfter, HistorySnapshot, LossHistory, LossLogger, PgmGridWriter, SampleRequester,
    SampleSink,
};

/// Trainer configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Iterations between loss log lines.
    pub log_interval: usize,
    /// Epochs between sample requests; 0 disables sampling.
    pub sample_interval: usize,
    pub sample_count: usize,
    pub seed: u64,
    pub check_finite: bool,
    /// Stop the run after this many batches.
    pub max_iterations: Option<usize>,
    /// Write sample grids here when set.
    pub sample_dir: Option<PathBuf>,
    /// Window size of the loss history reported at the end.
    pub history_window: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            epochs: 10,
            batch_size: 64,
            log_interval: 50,
            sample_interval: 1,
            sample_count: 16,
            seed: 42,
            check_finite: true,
            max_iterations: None,
            sample_dir: None,
            history_window: 100,
        }
    }
}

pub type AdamOptimizer<M, B> = OptimizerAdaptor<Adam, M, B>;

/// Training state of the feed-forward GAN.
pub type GanState<B> = TrainState<
    Generator<B>,
    Discriminator<B>,
    AdamOptimizer<Generator<B>, B>,
    AdamOptimizer<Discriminator<B>, B>,
>;

/// Losses at the end of one epoch.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EpochSummary {
    /// 1-based.
    pub epoch: usize,
    pub iterations: usize,
    /// The epoch was cut short.
    pub halted: bool,
    pub losses: PlayerLosses,
}

/// What a run did, in a form that serializes to JSON.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrainingReport {
    /// `completed` or `halted at <event>`.
    pub status: String,
    pub iterations: usize,
    pub final_losses: PlayerLosses,
    pub epochs: Vec<EpochSummary>,
    pub history: HistorySnapshot,
}

/// Builds the models, optimizers and loop from config and runs them.
pub struct GanTrainer<B: AutodiffBackend> {
    model: ModelConfig,
    optim: OptimConfig,
    config: TrainerConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> GanTrainer<B> {
    pub fn new(app: &AppConfig, device: &B::Device) -> Self {
        GanTrainer {
            model: app.model.clone(),
            optim: app.optim.clone(),
            config: app.training.clone(),
            device: device.clone(),
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn step_config(&self) -> GanStepConfig {
        GanStepConfig {
            latent_dim: self.model.latent_dim,
            image_dim: self.model.image_dim(),
            generator_lr: self.optim.generator_lr,
            discriminator_lr: self.optim.discriminator_lr,
            seed: self.config.seed,
            check_finite: self.config.check_finite,
        }
    }

    /// Fresh models and Adam state for both players.
    pub fn init_state(&self) -> GanState<B> {
        let generator = GeneratorConfig::new(self.model.latent_dim, self.model.image_dim())
            .with_hidden_dim(self.model.hidden_dim)
            .init(&self.device);
        let discriminator = DiscriminatorConfig::new(self.model.image_dim())
            .with_hidden_dim(self.model.hidden_dim)
            .with_dropout(self.model.discriminator_dropout)
            .init(&self.device);
        let adam = AdamConfig::new()
            .with_beta_1(self.optim.beta_1)
            .with_beta_2(self.optim.beta_2);

        TrainState::new(
            PlayerState::new(generator, adam.init()),
            PlayerState::new(discriminator, adam.init()),
        )
    }

    /// Train on `data`, writing sample grids to `sample_dir` if configured.
    pub fn train<D>(&self, data: &D) -> Result<(GanState<B>, TrainingReport), LoopError<TrainingError>>
    where
        D: DataSource<Batch = Tensor<B, 2>> + ?Sized,
    {
        let sink = self.config.sample_dir.clone().map(PgmGridWriter::new);
        self.train_with_sink(data, sink)
    }

    /// Train on `data`, handing generated samples to `sink`.
    pub fn train_with_sink<D, K>(
        &self,
        data: &D,
        sink: Option<K>,
    ) -> Result<(GanState<B>, TrainingReport), LoopError<TrainingError>>
    where
        D: DataSource<Batch = Tensor<B, 2>> + ?Sized,
        K: SampleSink,
    {
        let cfg = &self.config;
        let step = GanStep::<B>::new(self.step_config(), &self.device);
        let history = LossHistory::with_capacity(cfg.history_window);
        let epochs: Rc<RefCell<Vec<EpochSummary>>> = Rc::default();

        let mut lp: Loop<'_, GanState<B>, Tensor<B, 2>, TrainingError> = Loop::build(
            |state, batch| Ok(step.step(state, batch)?),
            || Ok(self.init_state()),
        );

        let total_epochs = cfg.epochs;
        let clock = history.clone();
        lp.register(Event::Started, Trigger::Always, move |_: &RunContext<GanState<B>>| {
            tracing::info!(epochs = total_epochs, "Starting GAN training");
            clock.start_clock();
            Ok(Flow::Continue)
        });
        lp.register(
            Event::IterationCompleted,
            Trigger::Every(cfg.log_interval),
            LossLogger::new(cfg.epochs),
        );
        lp.register(Event::IterationCompleted, Trigger::Always, history.clone());
        for (event, halted) in [(Event::EpochCompleted, false), (Event::EpochHalted, true)] {
            lp.register(
                event,
                Trigger::Always,
                epoch_recorder(Rc::clone(&epochs), history.clone(), halted),
            );
        }
        if let Some(sink) = sink {
            let sampler = SampleRequester::<B, K>::new(
                sink,
                self.model.latent_dim,
                self.model.image_width,
                self.model.image_height,
                &self.device,
            )
            .with_count(cfg.sample_count)
            .with_seed(cfg.seed);
            lp.register(
                Event::EpochCompleted,
                Trigger::Every(cfg.sample_interval),
                sampler,
            );
        }
        if let Some(max) = cfg.max_iterations {
            let budget = HaltAfter::new(max).with_epoch_length(data.batches_per_epoch());
            for event in [Event::IterationCompleted, Event::EpochStarted, Event::EpochHalted] {
                lp.register(event, Trigger::Always, budget);
            }
        }

        let outcome = lp.run(data, cfg.epochs)?;

        let status = match outcome.status {
            RunStatus::Completed => "completed".to_string(),
            RunStatus::Halted { event } => format!("halted at {event}"),
        };
        let state = outcome.into_state();
        let report = TrainingReport {
            status,
            iterations: state.iteration,
            final_losses: state.losses(),
            epochs: epochs.take(),
            history: history.snapshot(cfg.history_window),
        };
        tracing::info!(
            status = %report.status,
            iterations = report.iterations,
            d_loss = report.final_losses.discriminator,
            g_loss = report.final_losses.generator,
            "Training finished"
        );
        Ok((state, report))
    }
}

fn epoch_recorder<B: AutodiffBackend>(
    epochs: Rc<RefCell<Vec<EpochSummary>>>,
    history: LossHistory,
    halted: bool,
) -> impl FnMut(&RunContext<GanState<B>>) -> Result<Flow, TrainingError> {
    move |ctx| {
        let summary = EpochSummary {
            epoch: ctx.epoch + 1,
            iterations: ctx.iteration,
            halted,
            losses: ctx.state.losses(),
        };
        tracing::info!(
            epoch = summary.epoch,
            iterations = summary.iterations,
            halted,
            d_loss = format_args!("{:.4}", summary.losses.discriminator),
            g_loss = format_args!("{:.4}", summary.losses.generator),
            it_per_sec = format_args!("{:.1}", history.take_throughput()),
            "Epoch finished"
        );
        epochs.borrow_mut().push(summary);
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{synthetic_blobs, SyntheticConfig};
    use crate::training::observers::CollectingSink;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;

    type TrainBackend = Autodiff<NdArray<f32>>;

    /// 10 images of 4x4, batch 4: two batches per epoch.
    fn small_config() -> AppConfig {
        let mut app = AppConfig::default();
        app.model = ModelConfig {
            latent_dim: 4,
            hidden_dim: 8,
            image_width: 4,
            image_height: 4,
            discriminator_dropout: 0.0,
        };
        app.training.epochs = 2;
        app.training.batch_size = 4;
        app.training.log_interval = 1;
        app.training.sample_count = 2;
        app.data.synthetic = SyntheticConfig {
            num_images: 10,
            width: 4,
            height: 4,
            seed: 3,
        };
        app.validate().unwrap();
        app
    }

    fn run(
        app: &AppConfig,
        sink: CollectingSink,
    ) -> (GanState<TrainBackend>, TrainingReport) {
        let device = Default::default();
        let data =
            synthetic_blobs::<TrainBackend>(&app.data.synthetic, app.training.batch_size, &device)
                .unwrap();
        GanTrainer::<TrainBackend>::new(app, &device)
            .train_with_sink(&data, Some(sink))
            .unwrap()
    }

    #[test]
    fn test_init_state_shapes() {
        let app = small_config();
        let device = Default::default();
        let trainer = GanTrainer::<TrainBackend>::new(&app, &device);
        let state = trainer.init_state();
        assert_eq!(state.iteration, 0);
        assert_eq!(state.generator.loss.count(), 0);
        assert_eq!(trainer.step_config().image_dim, 16);
    }

    #[test]
    fn test_train_runs_every_epoch() {
        let app = small_config();
        let sink = CollectingSink::new();
        let (state, report) = run(&app, sink.clone());

        assert_eq!(state.iteration, 4);
        assert_eq!(report.status, "completed");
        assert_eq!(report.iterations, 4);
        assert_eq!(report.epochs.len(), 2);
        assert_eq!(report.epochs[1].epoch, 2);
        assert_eq!(report.epochs[1].iterations, 4);
        assert!(!report.epochs[1].halted);
        assert!(report.final_losses.discriminator.is_finite());
        assert!(report.final_losses.generator.is_finite());
        assert_eq!(report.history.iterations, 4);
        assert_eq!(report.history.latest, Some(report.final_losses));

        let samples = sink.batches();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].epoch, 0);
        assert_eq!(samples[1].epoch, 1);
        assert_eq!(samples[1].pixels.len(), 2 * 16);
    }

    #[test]
    fn test_max_iterations_halts_run() {
        let mut app = small_config();
        app.training.epochs = 5;
        app.training.max_iterations = Some(3);
        let sink = CollectingSink::new();
        let (state, report) = run(&app, sink.clone());

        assert_eq!(state.iteration, 3);
        assert_eq!(report.status, "halted at epoch_halted");
        assert_eq!(report.epochs.len(), 2);
        assert!(!report.epochs[0].halted);
        assert!(report.epochs[1].halted);
        // Samples are only requested for completed epochs.
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_budget_matching_whole_run_completes() {
        let mut app = small_config();
        // 2 epochs of 2 batches.
        app.training.max_iterations = Some(4);
        let sink = CollectingSink::new();
        let (state, report) = run(&app, sink.clone());

        assert_eq!(state.iteration, 4);
        assert_eq!(report.status, "completed");
        let halted: Vec<bool> = report.epochs.iter().map(|e| e.halted).collect();
        assert_eq!(halted, vec![false, false]);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_budget_on_epoch_boundary_stops_before_next_epoch() {
        let mut app = small_config();
        app.training.epochs = 3;
        app.training.max_iterations = Some(2);
        let sink = CollectingSink::new();
        let (state, report) = run(&app, sink.clone());

        assert_eq!(state.iteration, 2);
        assert_eq!(report.status, "halted at epoch_started");
        assert_eq!(report.epochs.len(), 1);
        assert!(!report.epochs[0].halted);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_sampling_can_be_disabled() {
        let mut app = small_config();
        app.training.sample_interval = 0;
        let sink = CollectingSink::new();
        let (_, report) = run(&app, sink.clone());
        assert_eq!(report.iterations, 4);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_full_sink_aborts_with_handler_error() {
        let app = small_config();
        let device = Default::default();
        let data =
            synthetic_blobs::<TrainBackend>(&app.data.synthetic, app.training.batch_size, &device)
                .unwrap();
        let result = GanTrainer::<TrainBackend>::new(&app, &device)
            .train_with_sink(&data, Some(CollectingSink::with_limit(1)));

        match result {
            Err(LoopError::Handler { event, handler, .. }) => {
                assert_eq!(event, Event::EpochCompleted);
                assert_eq!(handler, "sampler");
            }
            _ => panic!("expected a sampler failure"),
        }
    }

    #[test]
    fn test_report_serializes_to_json() {
        let app = small_config();
        let (_, report) = run(&app, CollectingSink::new());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["iterations"], 4);
        assert_eq!(json["epochs"].as_array().map(Vec::len), Some(2));
        assert!(json["final_losses"]["generator"].is_number());
    }
}
