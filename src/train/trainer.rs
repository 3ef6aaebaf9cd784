//! Trainer: the epoch loop and its step functions

use super::callback::{CallbackAction, CallbackContext, CallbackRunner};
use super::meter::{name_to_metric, AverageMeter, MetricMeters};
use super::{Callback, Metrics, Model, ModelOutput, ModelState, TrainArgs, TrainerState, TrainingState};
use crate::amp::GradScaler;
use crate::autograd::{autocast, backward, mean, no_grad};
use crate::data::{
    resolve_workers, Batch, CollateFn, DataLoader, Dataset, DistributedSampler, IntoBatches,
    RandomSampler, Sampler, SequentialSampler,
};
use crate::device::Device;
use crate::distributed::{init_process_group, DistributedEnv, ProcessGroup};
use crate::io::{load_checkpoint, save_checkpoint, Checkpoint, SavedState};
use crate::optim::{clip_grad_norm, LRScheduler, Optimizer};
use crate::{Error, Result, Tensor};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// When the learning-rate scheduler advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerStep {
    /// After every optimizer step
    Batch,
    /// After every epoch, once validation has run
    #[default]
    Epoch,
}

/// Optional inputs of [`Trainer::fit`]
#[derive(Default)]
pub struct FitOptions<'a> {
    pub valid_dataset: Option<&'a dyn Dataset>,
    pub train_sampler: Option<Box<dyn Sampler>>,
    pub valid_sampler: Option<Box<dyn Sampler>>,
    pub callbacks: Vec<Box<dyn Callback>>,
    pub train_collate: Option<CollateFn>,
    pub valid_collate: Option<CollateFn>,
}

impl<'a> FitOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_valid_dataset(mut self, dataset: &'a dyn Dataset) -> Self {
        self.valid_dataset = Some(dataset);
        self
    }

    pub fn with_train_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.train_sampler = Some(sampler);
        self
    }

    pub fn with_valid_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.valid_sampler = Some(sampler);
        self
    }

    pub fn with_callback<C: Callback + 'static>(mut self, callback: C) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn with_train_collate(mut self, collate: CollateFn) -> Self {
        self.train_collate = Some(collate);
        self
    }

    pub fn with_valid_collate(mut self, collate: CollateFn) -> Self {
        self.valid_collate = Some(collate);
        self
    }
}

/// Summary of a [`Trainer::fit`] run
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub epochs_run: usize,
    pub stopped_early: bool,
    /// Average training loss of the last epoch
    pub train_loss: Option<f32>,
    /// Average validation loss of the last epoch
    pub valid_loss: Option<f32>,
    pub metrics: Metrics,
}

/// Inputs of [`Trainer::predict`]
pub struct PredictOptions {
    pub sampler: Option<Box<dyn Sampler>>,
    pub batch_size: usize,
    /// Worker count; `-1` uses every logical CPU, ignored for batch size 1
    pub n_jobs: i64,
    pub collate: Option<CollateFn>,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            sampler: None,
            batch_size: 16,
            n_jobs: 1,
            collate: None,
        }
    }
}

impl PredictOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: i64) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn with_collate(mut self, collate: CollateFn) -> Self {
        self.collate = Some(collate);
        self
    }
}

/// Drives a [`Model`] through epochs
///
/// # Example
///
/// ```no_run
/// # use bucle::train::{Model, Trainer, TrainArgs, FitOptions};
/// # use bucle::optim::Adam;
/// # fn run<M: Model>(model: M, train: &dyn bucle::data::Dataset, valid: &dyn bucle::data::Dataset) -> bucle::Result<()> {
/// let mut trainer = Trainer::new(model).with_optimizer(Box::new(Adam::default_params(1e-3)));
/// let args = TrainArgs::default().with_epochs(10).with_accumulation_steps(2);
///
/// let report = trainer.fit(train, &args, FitOptions::new().with_valid_dataset(valid))?;
/// println!("valid loss: {:?}", report.valid_loss);
/// trainer.save("model.safetensors", false)?;
/// # Ok(())
/// # }
/// ```
pub struct Trainer<M: Model> {
    model: M,
    optimizer: Option<Box<dyn Optimizer>>,
    scheduler: Option<Box<dyn LRScheduler>>,
    scheduler_step: SchedulerStep,
    scheduler_metric: Option<String>,
    group: Option<Box<dyn ProcessGroup>>,
    scaler: Option<GradScaler>,
    callbacks: CallbackRunner,
    state: TrainerState,
    model_state: ModelState,
    train_state: Option<TrainingState>,
    metrics: Metrics,
    progress: bool,
    stop_requested: bool,
}

impl<M: Model> Trainer<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            optimizer: None,
            scheduler: None,
            scheduler_step: SchedulerStep::default(),
            scheduler_metric: None,
            group: None,
            scaler: None,
            callbacks: CallbackRunner::default(),
            state: TrainerState::default(),
            model_state: ModelState::Train,
            train_state: None,
            metrics: Metrics::default(),
            progress: false,
            stop_requested: false,
        }
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn Optimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn LRScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_scheduler_step(mut self, step: SchedulerStep) -> Self {
        self.scheduler_step = step;
        self
    }

    /// Feed the named metric (e.g. `valid_loss`) to the scheduler on each step
    pub fn with_scheduler_metric(mut self, name: impl Into<String>) -> Self {
        self.scheduler_metric = Some(name.into());
        self
    }

    /// Run data-parallel over an existing group instead of the environment
    pub fn with_process_group(mut self, group: Box<dyn ProcessGroup>) -> Self {
        self.group = Some(group);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    pub fn model_state(&self) -> ModelState {
        self.model_state
    }

    /// Last event fired
    pub fn train_state(&self) -> Option<TrainingState> {
        self.train_state
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn lr(&self) -> Option<f32> {
        self.optimizer.as_ref().map(|o| o.lr())
    }

    pub fn scaler(&self) -> Option<&GradScaler> {
        self.scaler.as_ref()
    }

    pub fn name_to_metric(&self, name: &str) -> Result<f32> {
        name_to_metric(&self.metrics, self.state.current_epoch, name)
    }

    /// Train for `args.epochs` epochs, validating after each one when a
    /// validation dataset is given
    pub fn fit(
        &mut self,
        train_dataset: &dyn Dataset,
        args: &TrainArgs,
        options: FitOptions<'_>,
    ) -> Result<FitReport> {
        args.validate()?;
        self.init_run(args)?;

        let workers = resolve_workers(args.n_jobs)?;
        let train_sampler: Box<dyn Sampler> = match options.train_sampler {
            Some(sampler) => sampler,
            None => match self.group.as_ref() {
                Some(group) => Box::new(
                    DistributedSampler::new(train_dataset.len(), group.world_size(), group.rank())
                        .with_shuffle(args.train_shuffle)
                        .with_seed(args.seed),
                ),
                None if args.train_shuffle => {
                    Box::new(RandomSampler::new(train_dataset.len(), args.seed))
                }
                None => Box::new(SequentialSampler::new(train_dataset.len())),
            },
        };
        let mut train_loader = build_loader(
            train_dataset,
            args.train_batch_size,
            train_sampler,
            workers,
            options.train_collate,
        )?;

        let mut valid_loader = match options.valid_dataset {
            Some(dataset) => {
                let sampler: Box<dyn Sampler> = match options.valid_sampler {
                    Some(sampler) => sampler,
                    None => Box::new(SequentialSampler::new(dataset.len())),
                };
                Some(build_loader(
                    dataset,
                    args.valid_batch_size,
                    sampler,
                    workers,
                    options.valid_collate,
                )?)
            }
            None => None,
        };

        if self.optimizer.is_none() {
            self.optimizer = self.model.fetch_optimizer();
        }
        let Some(optimizer) = self.optimizer.as_mut() else {
            return Err(Error::ConfigError(
                "no optimizer: pass one to Trainer::with_optimizer or implement Model::fetch_optimizer"
                    .to_string(),
            ));
        };
        if self.scheduler.is_none() {
            self.scheduler = self.model.fetch_scheduler();
        }
        if let Some(scheduler) = self.scheduler.as_ref() {
            scheduler.apply(optimizer.as_mut());
        }

        self.scaler = self.state.fp16.then(GradScaler::new);
        self.callbacks = CallbackRunner::new(options.callbacks);
        self.stop_requested = false;
        self.progress = args.progress;

        tracing::info!(
            epochs = args.epochs,
            train_batches = train_loader.len(),
            valid_batches = valid_loader.as_ref().map_or(0, |l| l.len()),
            workers,
            "starting training"
        );
        self.fire(TrainingState::TrainStart)?;

        let mut report = FitReport {
            epochs_run: 0,
            stopped_early: false,
            train_loss: None,
            valid_loss: None,
            metrics: Metrics::default(),
        };
        for _ in 0..args.epochs {
            self.fire(TrainingState::EpochStart)?;
            self.fire(TrainingState::TrainEpochStart)?;
            report.train_loss = Some(self.train_one_epoch(&mut train_loader)?);
            self.fire(TrainingState::TrainEpochEnd)?;

            if let Some(loader) = valid_loader.as_mut() {
                self.fire(TrainingState::ValidEpochStart)?;
                report.valid_loss = Some(self.validate_one_epoch(loader)?);
                self.fire(TrainingState::ValidEpochEnd)?;
            }

            if self.scheduler_step == SchedulerStep::Epoch {
                self.step_scheduler()?;
            }
            self.fire(TrainingState::EpochEnd)?;
            report.epochs_run += 1;

            tracing::info!(
                epoch = self.state.current_epoch,
                train_loss = ?report.train_loss,
                valid_loss = ?report.valid_loss,
                lr = ?self.lr(),
                "epoch finished"
            );

            if self.stop_requested {
                self.model_state = ModelState::End;
                report.stopped_early = true;
                tracing::info!(epoch = self.state.current_epoch, "stop requested, ending training");
                break;
            }
            self.state.current_epoch += 1;
        }

        self.fire(TrainingState::TrainEnd)?;
        report.metrics = self.metrics.clone();
        Ok(report)
    }

    /// Resolve device, fp16 and the process group for a run
    fn init_run(&mut self, args: &TrainArgs) -> Result<()> {
        let env = match self.group {
            Some(_) => None,
            None => DistributedEnv::from_env()?,
        };
        self.state.local_rank = match (&env, self.group.as_ref()) {
            (Some(env), _) => env.local_rank as i64,
            (None, Some(group)) => group.rank() as i64,
            (None, None) => -1,
        };

        let device = Device::resolve(&args.device, self.state.local_rank);
        self.state.fp16 = args.fp16 && !device.is_tpu();
        device.ensure_available()?;
        self.state.device = device;

        if let Some(env) = env {
            self.group = Some(Box::new(init_process_group(&env)?));
        }

        self.state.accumulation_steps = args.accumulation_steps.max(1);
        self.state.clip_grad_norm = args.clip_grad_norm;
        tracing::debug!(
            device = %self.state.device,
            fp16 = self.state.fp16,
            local_rank = self.state.local_rank,
            accumulation_steps = self.state.accumulation_steps,
            "run initialized"
        );
        Ok(())
    }

    /// One pass over the training loader; returns the epoch's average loss
    pub fn train_one_epoch(&mut self, loader: &mut DataLoader<'_>) -> Result<f32> {
        loader.set_epoch(self.state.current_epoch);
        self.model.set_training(true);
        if let Some(group) = self.group.as_mut() {
            group.barrier()?;
        }
        self.model_state = ModelState::Train;

        let mut losses = AverageMeter::new();
        let mut meters = MetricMeters::default();
        let num_batches = loader.len();
        let bar = self.progress_bar(num_batches, "train");

        for (b_idx, batch) in loader.iter().enumerate() {
            let batch = batch?;
            self.state.batch_index = b_idx;
            self.fire(TrainingState::TrainStepStart)?;
            let (loss, metrics) = self.train_one_step(&batch, b_idx + 1 == num_batches)?;
            self.fire(TrainingState::TrainStepEnd)?;

            losses.update(loss, batch.len());
            let monitor = meters.update(&metrics, batch.len());
            self.state.current_train_step += 1;
            self.report_step(&bar, "train", self.state.current_train_step, losses.avg, &monitor);
        }
        bar.finish_and_clear();

        self.metrics
            .update(ModelState::Train, meters.averages(), losses.avg);
        Ok(losses.avg)
    }

    /// Forward and backward for one batch, stepping the optimizer when the
    /// accumulation window closes or `last_in_epoch` is set
    ///
    /// Returns the batch loss and the model's step metrics.
    pub fn train_one_step(
        &mut self,
        batch: &Batch,
        last_in_epoch: bool,
    ) -> Result<(f32, BTreeMap<String, f32>)> {
        let acc = self.state.accumulation_steps.max(1);
        if self.state.batch_index % acc == 0 {
            for param in self.model.parameters() {
                param.zero_grad();
            }
        }

        let ModelOutput { loss, metrics, .. } = self.model_fn(batch)?;
        let mut loss = reduce_loss(loss)?;
        if loss.backward_op().is_none() {
            return Err(Error::InvalidParameter(
                "loss is not connected to any trainable parameter".to_string(),
            ));
        }

        let scale = self.scaler.as_ref().map_or(1.0, |s| s.scale());
        backward(&mut loss, Some(Array1::from_elem(1, scale / acc as f32)));

        if (self.state.batch_index + 1) % acc == 0 || last_in_epoch {
            self.optimizer_step()?;
            if self.scheduler_step == SchedulerStep::Batch {
                self.step_scheduler()?;
            }
        }

        Ok((loss.item(), metrics))
    }

    /// Sync, unscale, clip and apply the accumulated gradients
    fn optimizer_step(&mut self) -> Result<()> {
        let Some(optimizer) = self.optimizer.as_mut() else {
            return Err(Error::ConfigError("no optimizer set".to_string()));
        };
        let params = self.model.parameters_mut();

        if let Some(group) = self.group.as_mut() {
            sync_gradients(group.as_mut(), params)?;
        }

        let found_inf = self.scaler.as_ref().is_some_and(|s| s.unscale(params));
        if found_inf {
            tracing::warn!(
                step = self.state.current_train_step,
                "non-finite gradients, skipping optimizer step"
            );
        } else {
            if let Some(max_norm) = self.state.clip_grad_norm {
                let norm = clip_grad_norm(params, max_norm);
                tracing::trace!(norm, max_norm, "gradients clipped");
            }
            optimizer.step(params);
        }

        if let Some(scaler) = self.scaler.as_mut() {
            scaler.update(found_inf);
        }
        Ok(())
    }

    fn step_scheduler(&mut self) -> Result<()> {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return Ok(());
        };
        match self.scheduler_metric.as_deref() {
            Some(name) => {
                let value = name_to_metric(&self.metrics, self.state.current_epoch, name)?;
                scheduler.step_with_metric(value);
            }
            None => scheduler.step(),
        }
        if let Some(optimizer) = self.optimizer.as_mut() {
            scheduler.apply(optimizer.as_mut());
        }
        Ok(())
    }

    /// One pass over the validation loader without building graphs
    pub fn validate_one_epoch(&mut self, loader: &mut DataLoader<'_>) -> Result<f32> {
        self.model.set_training(false);
        self.model_state = ModelState::Valid;

        let mut losses = AverageMeter::new();
        let mut meters = MetricMeters::default();
        let bar = self.progress_bar(loader.len(), "valid");

        for batch in loader.iter() {
            let batch = batch?;
            self.fire(TrainingState::ValidStepStart)?;
            let (loss, metrics) = self.validate_one_step(&batch)?;
            self.fire(TrainingState::ValidStepEnd)?;

            losses.update(loss, batch.len());
            let monitor = meters.update(&metrics, batch.len());
            self.state.current_valid_step += 1;
            self.report_step(&bar, "valid", self.state.current_valid_step, losses.avg, &monitor);
        }
        bar.finish_and_clear();

        self.metrics
            .update(ModelState::Valid, meters.averages(), losses.avg);
        Ok(losses.avg)
    }

    /// Loss and metrics for one batch; the loss is averaged across ranks
    pub fn validate_one_step(&mut self, batch: &Batch) -> Result<(f32, BTreeMap<String, f32>)> {
        let ModelOutput { loss, metrics, .. } = no_grad(|| self.model_fn(batch))?;
        let mut loss = reduce_loss(loss)?.item();

        if let Some(group) = self.group.as_mut() {
            group.barrier()?;
            let gathered = group.all_gather(&[loss])?;
            let values: Vec<f32> = gathered.iter().filter_map(|v| v.first().copied()).collect();
            loss = values.iter().sum::<f32>() / values.len().max(1) as f32;
        }

        Ok((loss, metrics))
    }

    /// Lazily run the model over `dataset`, yielding processed outputs per batch
    pub fn predict<'t, 'd>(
        &'t mut self,
        dataset: &'d dyn Dataset,
        options: PredictOptions,
    ) -> Result<Predictions<'t, 'd, M>> {
        let workers = if options.batch_size == 1 {
            0
        } else {
            resolve_workers(options.n_jobs)?
        };
        let sampler: Box<dyn Sampler> = match options.sampler {
            Some(sampler) => sampler,
            None => Box::new(SequentialSampler::new(dataset.len())),
        };
        let loader = build_loader(dataset, options.batch_size, sampler, workers, options.collate)?;

        self.model.set_training(false);
        self.model_state = ModelState::Test;
        let bar = self.progress_bar(loader.len(), "test");

        Ok(Predictions {
            trainer: self,
            batches: loader.into_batches(),
            bar,
        })
    }

    pub fn predict_one_step(&self, batch: &Batch) -> Result<Vec<f32>> {
        let output = no_grad(|| self.model_fn(batch))?;
        Ok(self.model.process_output(&output.output))
    }

    /// Write model weights, plus optimizer/scheduler state, epoch and fp16
    /// flag unless `weights_only`
    pub fn save(&self, path: impl AsRef<Path>, weights_only: bool) -> Result<()> {
        let path = path.as_ref();
        let state_dict = self.model.state_dict();
        let state = if weights_only {
            SavedState::WeightsOnly(state_dict)
        } else {
            SavedState::Full(Checkpoint {
                state_dict,
                optimizer: self.optimizer.as_ref().map(|o| o.state_dict()).transpose()?,
                scheduler: self.scheduler.as_ref().map(|s| s.state_dict()).transpose()?,
                epoch: self.state.current_epoch,
                fp16: self.state.fp16,
            })
        };
        save_checkpoint(&state, path)?;
        tracing::info!(path = %path.display(), weights_only, "model saved");
        Ok(())
    }

    /// Restore a checkpoint written by [`save`](Self::save)
    ///
    /// A full load also restores optimizer and scheduler state (when both the
    /// file and the trainer have them), the epoch counter and the fp16 flag.
    pub fn load(&mut self, path: impl AsRef<Path>, weights_only: bool, device: &str) -> Result<()> {
        let path = path.as_ref();
        let device = Device::parse(device);
        device.ensure_available()?;
        self.state.device = device;

        let saved = load_checkpoint(path)?;
        if weights_only {
            self.model.load_state_dict(saved.weights())?;
        } else {
            let SavedState::Full(checkpoint) = saved else {
                return Err(Error::Serialization(format!(
                    "{} holds only weights; load it with weights_only",
                    path.display()
                )));
            };
            self.model.load_state_dict(&checkpoint.state_dict)?;
            if let (Some(optimizer), Some(state)) = (self.optimizer.as_mut(), &checkpoint.optimizer) {
                optimizer.load_state_dict(state)?;
            }
            if let (Some(scheduler), Some(state)) = (self.scheduler.as_mut(), &checkpoint.scheduler) {
                scheduler.load_state_dict(state)?;
            }
            self.state.current_epoch = checkpoint.epoch;
            self.state.fp16 = checkpoint.fp16;
        }
        tracing::info!(path = %path.display(), weights_only, "model loaded");
        Ok(())
    }

    fn model_fn(&self, batch: &Batch) -> Result<ModelOutput> {
        if self.state.fp16 {
            autocast(|| self.model.forward(batch))
        } else {
            self.model.forward(batch)
        }
    }

    /// Record the event and dispatch it to the callbacks
    fn fire(&mut self, event: TrainingState) -> Result<()> {
        self.train_state = Some(event);
        if self.callbacks.is_empty() {
            return Ok(());
        }

        let lr = self.optimizer.as_ref().map(|o| o.lr());
        let ctx = CallbackContext {
            event,
            model_state: self.model_state,
            state: &self.state,
            metrics: &self.metrics,
            lr,
        };
        let actions = self.callbacks.dispatch(&ctx);

        for action in actions {
            match action {
                CallbackAction::Continue => {}
                CallbackAction::Stop => {
                    tracing::debug!(%event, "callback requested stop");
                    self.stop_requested = true;
                }
                CallbackAction::SaveCheckpoint { path, weights_only } => {
                    self.save(&path, weights_only)?;
                }
            }
        }
        Ok(())
    }

    fn progress_bar(&self, len: usize, stage: &'static str) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{prefix:>5} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_prefix(stage);
        bar
    }

    fn report_step(
        &self,
        bar: &ProgressBar,
        stage: &str,
        step: usize,
        loss: f32,
        monitor: &BTreeMap<String, f32>,
    ) {
        if self.progress {
            let extra: String = monitor
                .iter()
                .map(|(name, value)| format!(" {name}={value:.4}"))
                .collect();
            bar.set_message(format!("loss={loss:.4}{extra}"));
            bar.inc(1);
        } else {
            tracing::debug!(stage, step, loss, metrics = ?monitor, "step");
        }
    }
}

/// Lazy prediction results, one `Vec<f32>` per batch
pub struct Predictions<'t, 'd, M: Model> {
    trainer: &'t mut Trainer<M>,
    batches: IntoBatches<'d>,
    bar: ProgressBar,
}

impl<M: Model> Iterator for Predictions<'_, '_, M> {
    type Item = Result<Vec<f32>>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = match self.batches.next() {
            Some(Ok(batch)) => batch,
            Some(Err(e)) => return Some(Err(e)),
            None => {
                self.bar.finish_and_clear();
                return None;
            }
        };
        let output = self.trainer.predict_one_step(&batch);
        self.bar.inc(1);
        Some(output)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.batches.size_hint()
    }
}

fn build_loader<'a>(
    dataset: &'a dyn Dataset,
    batch_size: usize,
    sampler: Box<dyn Sampler>,
    workers: usize,
    collate: Option<CollateFn>,
) -> Result<DataLoader<'a>> {
    let loader = DataLoader::new(dataset, batch_size)?
        .with_sampler(sampler)
        .with_workers(workers)?;
    Ok(match collate {
        Some(collate) => loader.with_collate(collate),
        None => loader,
    })
}

/// Multi-element losses are averaged to a scalar
fn reduce_loss(loss: Tensor) -> Result<Tensor> {
    match loss.len() {
        0 => Err(Error::InvalidParameter("model returned an empty loss".to_string())),
        1 => Ok(loss),
        _ => Ok(mean(&loss)),
    }
}

/// Average the gradients of trainable parameters across ranks
fn sync_gradients(group: &mut dyn ProcessGroup, params: &[Tensor]) -> Result<()> {
    if group.world_size() <= 1 {
        return Ok(());
    }
    let trainable = || params.iter().filter(|p| p.requires_grad());

    let mut flat: Vec<f32> = Vec::with_capacity(trainable().map(Tensor::len).sum());
    for param in trainable() {
        match param.grad() {
            Some(grad) => flat.extend(grad.iter()),
            None => flat.resize(flat.len() + param.len(), 0.0),
        }
    }

    group.all_reduce_mean(&mut flat)?;

    let mut offset = 0;
    for param in trainable() {
        let end = offset + param.len();
        param.set_grad(Array1::from(flat[offset..end].to_vec()));
        offset = end;
    }
    Ok(())
}
