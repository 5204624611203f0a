//! Loop handlers used by the GAN trainer: loss logging, loss history,
//! periodic sample requests and an iteration budget.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::engine::{Flow, Handler, RunContext};
use crate::error::{ObserverError, StepError, TrainingError};
use crate::gan::{noise_seed, PlayerLosses, TrainState};
use crate::networks::{ImageGenerator, Mode};
use crate::training::metrics::{TimingMetrics, TrainingMetrics};

// ─── Loss logging ───────────────────────────────────────────────────────────

/// Logs epoch, iteration and both running losses. How often it fires is up
/// to the trigger it is registered with.
pub struct LossLogger {
    total_epochs: usize,
}

impl LossLogger {
    pub fn new(total_epochs: usize) -> Self {
        LossLogger { total_epochs }
    }
}

impl<G, D, OG, OD> Handler<TrainState<G, D, OG, OD>, TrainingError> for LossLogger {
    fn handle(&mut self, ctx: &RunContext<TrainState<G, D, OG, OD>>) -> Result<Flow, TrainingError> {
        let losses = ctx.state.losses();
        tracing::info!(
            epoch = ctx.epoch + 1,
            epochs = self.total_epochs,
            iteration = ctx.iteration,
            d_loss = format_args!("{:.4}", losses.discriminator),
            g_loss = format_args!("{:.4}", losses.generator),
            "training"
        );
        Ok(Flow::Continue)
    }

    fn name(&self) -> &str {
        "loss_logger"
    }
}

// ─── Loss history ───────────────────────────────────────────────────────────

struct HistoryInner {
    losses: TrainingMetrics,
    timing: TimingMetrics,
    last_tick: Instant,
}

/// Records running losses and step timings at every iteration it sees.
///
/// Clones share one buffer, so a clone registered with the loop can be read
/// through any other clone after the run.
#[derive(Clone)]
pub struct LossHistory {
    inner: Rc<RefCell<HistoryInner>>,
}

/// Point-in-time view of a [`LossHistory`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HistorySnapshot {
    pub iterations: usize,
    pub window: usize,
    pub average: PlayerLosses,
    pub latest: Option<PlayerLosses>,
    pub avg_step_ms: f32,
}

impl LossHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        LossHistory {
            inner: Rc::new(RefCell::new(HistoryInner {
                losses: TrainingMetrics::with_capacity(capacity),
                timing: TimingMetrics::with_capacity(capacity),
                last_tick: Instant::now(),
            })),
        }
    }

    /// Restart the step clock. Call when the run starts so the first step
    /// time excludes setup.
    pub fn start_clock(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.last_tick = Instant::now();
        inner.timing.reset_window();
    }

    pub fn snapshot(&self, last_n: usize) -> HistorySnapshot {
        let inner = self.inner.borrow();
        HistorySnapshot {
            iterations: inner.losses.total_iterations(),
            window: last_n,
            average: inner.losses.average(last_n),
            latest: inner.losses.latest(),
            avg_step_ms: inner.timing.avg_step_ms(last_n),
        }
    }

    /// Iterations per second since the previous call.
    pub fn take_throughput(&self) -> f32 {
        let mut inner = self.inner.borrow_mut();
        let rate = inner.timing.iterations_per_sec();
        inner.timing.reset_window();
        rate
    }
}

impl Default for LossHistory {
    fn default() -> Self {
        Self::with_capacity(100)
    }
}

impl<G, D, OG, OD> Handler<TrainState<G, D, OG, OD>, TrainingError> for LossHistory {
    fn handle(&mut self, ctx: &RunContext<TrainState<G, D, OG, OD>>) -> Result<Flow, TrainingError> {
        let mut inner = self.inner.borrow_mut();
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_tick);
        inner.last_tick = now;
        inner.timing.record_step_time(elapsed);
        inner.losses.record(ctx.state.losses());
        Ok(Flow::Continue)
    }

    fn name(&self) -> &str {
        "loss_history"
    }
}

/// Mixed into the sampler seed so sample noise differs from training noise.
const SAMPLE_SALT: u64 = 0x5A4D_504C_4552_0001;

// ─── Samples ────────────────────────────────────────────────────────────────

/// Generated images handed to a [`SampleSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    /// 0-based epoch that just finished.
    pub epoch: usize,
    pub count: usize,
    pub width: usize,
    pub height: usize,
    /// `count * width * height` pixels in `[0, 1]`, row-major per image.
    pub pixels: Vec<f32>,
}

impl SampleBatch {
    pub fn image(&self, index: usize) -> Option<&[f32]> {
        let dim = self.width * self.height;
        self.pixels.get(index * dim..(index + 1) * dim)
    }
}

/// Destination for generated samples.
pub trait SampleSink {
    fn accept(&mut self, batch: SampleBatch) -> Result<(), ObserverError>;
}

/// Keeps batches in memory. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    batches: Rc<RefCell<Vec<SampleBatch>>>,
    limit: Option<usize>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject batches once `limit` are held.
    pub fn with_limit(limit: usize) -> Self {
        CollectingSink {
            batches: Rc::default(),
            limit: Some(limit),
        }
    }

    pub fn batches(&self) -> Vec<SampleBatch> {
        self.batches.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.batches.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SampleSink for CollectingSink {
    fn accept(&mut self, batch: SampleBatch) -> Result<(), ObserverError> {
        let mut batches = self.batches.borrow_mut();
        if self.limit.is_some_and(|limit| batches.len() >= limit) {
            return Err(ObserverError::Sink("full".to_string()));
        }
        batches.push(batch);
        Ok(())
    }
}

/// Writes each batch as one binary PGM image, tiled in a near-square grid.
pub struct PgmGridWriter {
    dir: PathBuf,
}

impl PgmGridWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        PgmGridWriter { dir: dir.into() }
    }

    pub fn path_for(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("samples_epoch_{:04}.pgm", epoch + 1))
    }
}

impl SampleSink for PgmGridWriter {
    fn accept(&mut self, batch: SampleBatch) -> Result<(), ObserverError> {
        if batch.count > 0 && (batch.width == 0 || batch.height == 0) {
            return Err(ObserverError::Sink(format!(
                "cannot tile {} images of {}x{} pixels",
                batch.count, batch.width, batch.height
            )));
        }
        let columns = (batch.count as f64).sqrt().ceil().max(1.0) as usize;
        let rows = batch.count.div_ceil(columns);
        let (grid_w, grid_h) = (columns * batch.width, rows * batch.height);

        let mut grid = vec![0u8; grid_w * grid_h];
        for i in 0..batch.count {
            let Some(image) = batch.image(i) else {
                return Err(ObserverError::Sink(format!(
                    "batch holds {} pixels, too few for {} images",
                    batch.pixels.len(),
                    batch.count
                )));
            };
            let (ox, oy) = ((i % columns) * batch.width, (i / columns) * batch.height);
            for (y, row) in image.chunks_exact(batch.width).enumerate() {
                for (x, p) in row.iter().enumerate() {
                    grid[(oy + y) * grid_w + ox + x] = (p.clamp(0.0, 1.0) * 255.0).round() as u8;
                }
            }
        }

        std::fs::create_dir_all(&self.dir)?;
        let mut bytes = format!("P5\n{grid_w} {grid_h}\n255\n").into_bytes();
        bytes.extend_from_slice(&grid);
        let path = self.path_for(batch.epoch);
        std::fs::write(&path, bytes)?;
        tracing::info!(path = %path.display(), images = batch.count, "Wrote samples");
        Ok(())
    }
}

/// Runs the generator on fresh noise in inference mode and hands the images
/// to a sink. The generator is evaluated on the non-autodiff backend.
pub struct SampleRequester<B: Backend, K> {
    sink: K,
    count: usize,
    latent_dim: usize,
    width: usize,
    height: usize,
    seed: u64,
    device: B::Device,
}

impl<B: Backend, K: SampleSink> SampleRequester<B, K> {
    pub fn new(sink: K, latent_dim: usize, width: usize, height: usize, device: &B::Device) -> Self {
        SampleRequester {
            sink,
            count: 16,
            latent_dim,
            width,
            height,
            seed: 0,
            device: device.clone(),
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn noise(&self, epoch: usize) -> TensorData {
        let mut rng = StdRng::seed_from_u64(noise_seed(self.seed ^ SAMPLE_SALT, epoch));
        let data: Vec<f32> = (0..self.count * self.latent_dim)
            .map(|_| rng.sample(StandardNormal))
            .collect();
        TensorData::new(data, [self.count, self.latent_dim])
    }
}

impl<B, K, G, D, OG, OD> Handler<TrainState<G, D, OG, OD>, TrainingError> for SampleRequester<B, K>
where
    B: AutodiffBackend,
    K: SampleSink,
    G: AutodiffModule<B>,
    G::InnerModule: ImageGenerator<B::InnerBackend>,
{
    fn handle(&mut self, ctx: &RunContext<TrainState<G, D, OG, OD>>) -> Result<Flow, TrainingError> {
        let noise = Tensor::<B::InnerBackend, 2>::from_data(self.noise(ctx.epoch), &self.device);
        let generator = ctx.state.generator.model.valid();
        let images = generator.generate(noise, Mode::Inference);

        let dims = images.dims();
        if dims != [self.count, self.width * self.height] {
            return Err(StepError::ShapeMismatch {
                what: "generated samples",
                expected: vec![self.count, self.width * self.height],
                actual: dims.to_vec(),
            }
            .into());
        }

        let pixels = images
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ObserverError::Readback(format!("{e:?}")))?;

        self.sink.accept(SampleBatch {
            epoch: ctx.epoch,
            count: self.count,
            width: self.width,
            height: self.height,
            pixels,
        })?;
        Ok(Flow::Continue)
    }

    fn name(&self) -> &str {
        "sampler"
    }
}

// ─── Budget ─────────────────────────────────────────────────────────────────

/// Halts once `max_iterations` batches have been processed.
///
/// At `IterationCompleted` this ends the epoch; registering it at
/// `EpochHalted` as well turns that into a run halt. With a known epoch
/// length it lets an epoch whose last batch meets the budget complete, and a
/// registration at `EpochStarted` then stops the run before the next epoch.
#[derive(Debug, Clone, Copy)]
pub struct HaltAfter {
    max_iterations: usize,
    epoch_length: Option<usize>,
}

impl HaltAfter {
    pub fn new(max_iterations: usize) -> Self {
        HaltAfter {
            max_iterations,
            epoch_length: None,
        }
    }

    /// Batches per epoch, as reported by the data source.
    pub fn with_epoch_length(mut self, epoch_length: Option<usize>) -> Self {
        self.epoch_length = epoch_length;
        self
    }
}

impl<S, E> Handler<S, E> for HaltAfter {
    fn handle(&mut self, ctx: &RunContext<S>) -> Result<Flow, E> {
        if ctx.iteration < self.max_iterations {
            return Ok(Flow::Continue);
        }
        // A budget met on the last batch lets the epoch complete.
        if ctx.iteration_in_epoch > 0
            && self
                .epoch_length
                .is_some_and(|len| ctx.iteration_in_epoch >= len)
        {
            return Ok(Flow::Continue);
        }
        tracing::debug!(
            iteration = ctx.iteration,
            max = self.max_iterations,
            "iteration budget reached"
        );
        Ok(Flow::Halt)
    }

    fn name(&self) -> &str {
        "halt_after"
    }
}
