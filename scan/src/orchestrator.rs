//! Synchronized move/trigger/read loop.
//!
//! An [`Orchestrator`] owns the stage and the acquisition module for the
//! duration of a scan. [`Orchestrator::run`] connects and validates the stage,
//! configures the lock-in grid, makes the two calibration moves and then steps
//! or sweeps through the target plan, reading one triggered row per sample.
//!
//! Every move of non-zero length fires one trigger and therefore fills one
//! grid row. Rows 0 and 1 belong to the calibration moves; a continuous scan
//! adds one more for the lead-in move to the sweep start. A discrete step moves first and then reads
//! the row that move triggered, which pairs each target with the same burst as
//! reading the pending trigger before commanding the next target.
//!
//! Between raster rows the stepped axis moves while the sweep axis is parked
//! at the start of the next serpentine row. That step fires a trigger too: in
//! a discrete raster it acquires the first cell of the new row, in a
//! continuous raster it occupies a grid row of its own ahead of the sweep.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use hardware::{
    AcquisitionModule, Burst, DeviceResult, MotionAxis, ReferenceMode, StageChain, TriggerOutput,
};
use tracing::{debug, error, info, warn};

use crate::calibration::{CalibrationPlan, CALIBRATION_READS};
use crate::config::{ConfigError, MainAxis, RemediationPolicy, ScanConfig, ScanKind, ScanMode};
use crate::error::{ScanError, ScanResult};
use crate::geometry::{self, DaqGeometry};
use crate::range::{validate_with_remediation, AxisRange, ClampToRange, EdgeRemediation, RejectEdges};
use crate::reconstruct::{resample_sweep, DataGapError, Frame, LineSample, Reconstructor, ScanData};
use crate::session::{AcquisitionSession, SessionState};
use crate::stream::{EventSink, ScanEvent};
use crate::targets::{self, RasterTargets};

/// Grid rows fired by the lead-in move of a continuous scan.
const LEAD_IN_ROWS: usize = 1;

/// Grid rows fired by the row-change step of a continuous raster.
const STEP_ROWS: usize = 1;

/// Motion hardware for a scan: one axis for line scans, a daisy chain for rasters.
pub enum Stage<P: MotionAxis, S: MotionAxis> {
    Single(P),
    Chain(StageChain<P, S>),
}

impl<P: MotionAxis> Stage<P, P> {
    pub fn single(axis: P) -> Self {
        Stage::Single(axis)
    }
}

impl<P: MotionAxis, S: MotionAxis> Stage<P, S> {
    pub fn chain(primary: P, secondary: S) -> Self {
        Stage::Chain(StageChain::new(primary, secondary))
    }

    pub fn axis_count(&self) -> u8 {
        match self {
            Stage::Single(_) => 1,
            Stage::Chain(_) => 2,
        }
    }

    fn connect(&mut self) -> DeviceResult<()> {
        match self {
            Stage::Single(axis) => axis.connect(),
            Stage::Chain(chain) => chain.connect_both(),
        }
    }

    fn travel_ranges(&mut self) -> DeviceResult<(AxisRange, Option<AxisRange>)> {
        match self {
            Stage::Single(axis) => Ok((axis.travel_range()?.into(), None)),
            Stage::Chain(chain) => {
                let (primary, secondary) = chain.travel_ranges()?;
                Ok((primary.into(), Some(secondary.into())))
            }
        }
    }

    fn reference(&mut self, modes: [ReferenceMode; 2]) -> DeviceResult<()> {
        match self {
            Stage::Single(axis) => axis.reference(modes[0]),
            Stage::Chain(chain) => chain.reference_both(modes),
        }
    }

    fn configure_triggers(&mut self, kinds: [TriggerOutput; 2]) -> DeviceResult<()> {
        match self {
            Stage::Single(axis) => axis.configure_trigger(kinds[0]),
            Stage::Chain(chain) => chain.configure_both_triggers(kinds),
        }
    }

    /// The sweep axis and, for rasters, the stepped axis.
    fn axes(
        &mut self,
        main_axis: MainAxis,
    ) -> (&mut dyn MotionAxis, Option<&mut dyn MotionAxis>) {
        match self {
            Stage::Single(axis) => (axis as &mut dyn MotionAxis, None),
            Stage::Chain(chain) => {
                let (primary, secondary) = chain.both_mut();
                match main_axis {
                    MainAxis::Primary => (
                        primary as &mut dyn MotionAxis,
                        Some(secondary as &mut dyn MotionAxis),
                    ),
                    MainAxis::Secondary => (
                        secondary as &mut dyn MotionAxis,
                        Some(primary as &mut dyn MotionAxis),
                    ),
                }
            }
        }
    }

    /// Close every controller connection.
    pub fn close(&mut self) -> DeviceResult<()> {
        match self {
            Stage::Single(axis) => axis.close(),
            Stage::Chain(chain) => chain.close_both(),
        }
    }

    /// Primary axis and, for a chain, the secondary axis.
    pub fn into_parts(self) -> (P, Option<S>) {
        match self {
            Stage::Single(axis) => (axis, None),
            Stage::Chain(chain) => {
                let (primary, secondary) = chain.into_parts();
                (primary, Some(secondary))
            }
        }
    }
}

/// Cooperative cancellation flag, checked before every target step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct ProgressCounters {
    completed: AtomicUsize,
    total: AtomicUsize,
}

/// Shared view of scan progress in completed rows (targets for discrete lines).
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle(Arc<ProgressCounters>);

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> usize {
        self.0.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.0.total.load(Ordering::SeqCst)
    }

    /// `completed / total`, or 0 before the scan is planned.
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.completed() as f64 / total as f64,
        }
    }

    fn reset(&self, total: usize) {
        self.0.completed.store(0, Ordering::SeqCst);
        self.0.total.store(total, Ordering::SeqCst);
    }

    fn advance(&self) -> usize {
        self.0.completed.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Result of a scan that got past setup.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub data: ScanData,
    pub state: SessionState,
    /// The scan stopped before the target plan was exhausted
    pub partial: bool,
    /// Samples skipped because their burst lacked data
    pub gaps: Vec<DataGapError>,
    /// Error that ended the scan early, if any
    pub abort: Option<ScanError>,
    /// Scan mode after range remediation
    pub mode: ScanMode,
    pub geometry: DaqGeometry,
    /// Sample indices claimed, including gaps
    pub samples: usize,
}

enum TargetPlan {
    Line(Vec<f64>),
    Raster(RasterTargets),
}

impl TargetPlan {
    fn first_sweep_target(&self) -> Option<f64> {
        match self {
            TargetPlan::Line(targets) => targets.first().copied(),
            TargetPlan::Raster(raster) => raster.rows.first().map(|row| row.start()),
        }
    }

    /// Units reported through [`ProgressHandle`].
    fn progress_units(&self, kind: ScanKind) -> usize {
        match (self, kind) {
            (TargetPlan::Line(targets), ScanKind::Discrete) => targets.len(),
            (TargetPlan::Line(_), ScanKind::Continuous) => 1,
            (TargetPlan::Raster(raster), _) => raster.row_count(),
        }
    }
}

struct Prepared {
    mode: ScanMode,
    geometry: DaqGeometry,
    plan: TargetPlan,
    calibration: CalibrationPlan,
    reconstructor: Reconstructor,
}

/// Assembles an [`Orchestrator`] from a validated config and injected devices.
pub struct ScanBuilder<P: MotionAxis, S: MotionAxis, A: AcquisitionModule> {
    config: ScanConfig,
    stage: Option<Stage<P, S>>,
    acquisition: Option<A>,
    remediation: Option<Box<dyn EdgeRemediation + Send>>,
    events: Option<Sender<ScanEvent>>,
    cancel: CancelToken,
    progress: ProgressHandle,
}

impl<P: MotionAxis, S: MotionAxis, A: AcquisitionModule> ScanBuilder<P, S, A> {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            stage: None,
            acquisition: None,
            remediation: None,
            events: None,
            cancel: CancelToken::new(),
            progress: ProgressHandle::new(),
        }
    }

    pub fn stage(mut self, stage: Stage<P, S>) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn acquisition(mut self, acquisition: A) -> Self {
        self.acquisition = Some(acquisition);
        self
    }

    /// Override the remediation selected by `run.remediation`.
    pub fn remediation(mut self, remediation: impl EdgeRemediation + Send + 'static) -> Self {
        self.remediation = Some(Box::new(remediation));
        self
    }

    /// Publish live events on `sender`.
    pub fn events(mut self, sender: Sender<ScanEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    pub fn build(self) -> ScanResult<Orchestrator<P, S, A>> {
        let mode = self.config.validate()?;
        let dimension = self.config.scan.dimension;

        let stage = self.stage.ok_or(ConfigError::StageMismatch { dimension, axes: 0 })?;
        let expected_axes = if mode.is_raster() { 2 } else { 1 };
        if stage.axis_count() != expected_axes {
            return Err(ConfigError::StageMismatch {
                dimension,
                axes: stage.axis_count(),
            }
            .into());
        }
        let acquisition = self.acquisition.ok_or(ConfigError::MissingAcquisition)?;

        let remediation: Box<dyn EdgeRemediation + Send> = match self.remediation {
            Some(remediation) => remediation,
            None => match self.config.run.remediation {
                RemediationPolicy::Clamp => Box::new(ClampToRange),
                RemediationPolicy::Reject => Box::new(RejectEdges),
            },
        };

        Ok(Orchestrator {
            config: self.config,
            mode,
            stage,
            acquisition,
            remediation,
            events: EventSink::new(self.events),
            cancel: self.cancel,
            progress: self.progress,
            session: AcquisitionSession::new(),
        })
    }
}

/// Drives one stage and one acquisition module through a scan.
pub struct Orchestrator<P: MotionAxis, S: MotionAxis, A: AcquisitionModule> {
    config: ScanConfig,
    mode: ScanMode,
    stage: Stage<P, S>,
    acquisition: A,
    remediation: Box<dyn EdgeRemediation + Send>,
    events: EventSink,
    cancel: CancelToken,
    progress: ProgressHandle,
    session: AcquisitionSession,
}

impl<P: MotionAxis, S: MotionAxis, A: AcquisitionModule> Orchestrator<P, S, A> {
    pub fn builder(config: ScanConfig) -> ScanBuilder<P, S, A> {
        ScanBuilder::new(config)
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Hand the devices back.
    pub fn into_parts(self) -> (Stage<P, S>, A) {
        (self.stage, self.acquisition)
    }

    /// Run the scan.
    ///
    /// Setup failures (invalid ranges, device errors while referencing or
    /// configuring the grid) are returned as `Err`. Once the target plan is
    /// ready the scan always yields a [`ScanOutcome`]; timeouts, device errors
    /// and cancellation end it early with `partial` set and the cause in `abort`.
    pub fn run(&mut self) -> ScanResult<ScanOutcome> {
        self.session = AcquisitionSession::new();

        let prepared = match self.prepare() {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Scan setup failed: {e}");
                self.fail_session();
                self.events.send(ScanEvent::End {
                    state: self.session.state(),
                    partial: false,
                });
                return Err(e);
            }
        };

        let paths = self.config.daq.signal_paths();
        let mut line = Vec::new();
        let mut frames: Vec<Frame> = match &prepared.plan {
            TargetPlan::Line(_) => Vec::new(),
            TargetPlan::Raster(raster) => paths
                .iter()
                .map(|path| {
                    Frame::new(
                        path.as_str(),
                        raster.step_positions(),
                        raster.sweep_positions.clone(),
                        raster.main_axis,
                    )
                })
                .collect(),
        };
        let mut gaps = Vec::new();

        self.progress
            .reset(prepared.plan.progress_units(prepared.mode.kind()));
        let result = self.execute(&prepared, &mut line, &mut frames, &mut gaps);

        if let Err(e) = self.acquisition.stop() {
            warn!("Failed to stop acquisition module: {e}");
        }

        let (state, abort) = match result {
            Ok(()) => (SessionState::Finished, None),
            Err(ScanError::Cancelled) => (SessionState::Cancelled, Some(ScanError::Cancelled)),
            Err(e) => {
                error!("Scan aborted: {e}");
                (SessionState::Failed, Some(e))
            }
        };
        if let Err(e) = self.session.transition(state) {
            warn!("Could not close scan session: {e}");
            self.fail_session();
        }

        let partial = abort.is_some();
        info!(
            "Scan {}: {} samples, {} data gaps{}",
            state,
            self.session.samples(),
            gaps.len(),
            if partial { " (partial)" } else { "" }
        );
        self.events.send(ScanEvent::End {
            state: self.session.state(),
            partial,
        });

        let data = match prepared.plan {
            TargetPlan::Line(_) => ScanData::Line(line),
            TargetPlan::Raster(_) => ScanData::Raster(frames),
        };

        Ok(ScanOutcome {
            data,
            state: self.session.state(),
            partial,
            gaps,
            abort,
            mode: prepared.mode,
            geometry: prepared.geometry,
            samples: self.session.samples(),
        })
    }

    fn fail_session(&mut self) {
        if self.session.state().can_transition_to(SessionState::Failed) {
            if let Err(e) = self.session.transition(SessionState::Failed) {
                warn!("Could not mark scan session failed: {e}");
            }
        }
    }

    /// Everything up to arming: ranges, motion profile, referencing, DAQ grid
    /// and target plan. No calibration or scan motion happens here.
    fn prepare(&mut self) -> ScanResult<Prepared> {
        self.stage.connect()?;

        let (primary_range, secondary_range) = self.stage.travel_ranges()?;
        let max_attempts = self.config.run.max_remediation_attempts;
        let primary_edges = validate_with_remediation(
            self.mode.primary().edges,
            &primary_range,
            self.remediation.as_mut(),
            max_attempts,
        )?;
        let secondary_edges = match (self.mode.secondary(), secondary_range) {
            (Some(axis), Some(range)) => Some(validate_with_remediation(
                axis.edges,
                &range,
                self.remediation.as_mut(),
                max_attempts,
            )?),
            _ => None,
        };
        let mode = self.mode.with_edges(primary_edges, secondary_edges)?;
        let sweep_range = match (mode.main_axis(), secondary_range) {
            (MainAxis::Secondary, Some(range)) => range,
            _ => primary_range,
        };

        let acceleration = mode.acceleration();
        let step_velocity = mode.step_axis().map(|axis| axis.velocity);
        {
            let (sweep, step) = self.stage.axes(mode.main_axis());
            sweep.set_velocity(mode.sweep_axis().velocity)?;
            sweep.set_acceleration(acceleration)?;
            if let (Some(step), Some(velocity)) = (step, step_velocity) {
                step.set_velocity(velocity)?;
                step.set_acceleration(acceleration)?;
            }
        }

        self.stage.reference(self.config.stage.reference_modes)?;
        self.stage
            .configure_triggers(self.config.stage.trigger_outputs)?;
        info!("Stage referenced, triggers configured");

        let geometry = geometry::plan(&mode);
        let (row_offset, row_stride) = match (mode.kind(), mode.is_raster()) {
            (ScanKind::Discrete, _) => (CALIBRATION_READS, 1),
            (ScanKind::Continuous, false) => (CALIBRATION_READS + LEAD_IN_ROWS, 1),
            (ScanKind::Continuous, true) => (CALIBRATION_READS + LEAD_IN_ROWS, 1 + STEP_ROWS),
        };
        let extra_rows = row_offset + geometry.rows.saturating_sub(1) * (row_stride - 1);
        let settings = geometry.to_settings(extra_rows, self.config.daq.trigger_node.clone());
        self.acquisition.configure(&settings)?;
        let paths = self.config.daq.signal_paths();
        self.acquisition.subscribe(&paths)?;
        info!(
            "Acquisition grid {}x{} ({} mode, {} edge), duration {:.4}s, holdoff {:.4}s",
            settings.rows,
            settings.cols,
            settings.grid_mode,
            settings.trigger_edge,
            settings.duration_s,
            settings.holdoff_s
        );

        let plan = match mode.step_axis() {
            None => TargetPlan::Line(targets::generate(mode.sweep_axis(), mode.direction())),
            Some(step) => {
                let raster = RasterTargets::generate(
                    mode.sweep_axis(),
                    step,
                    mode.main_axis(),
                    mode.direction(),
                );
                info!(
                    "Raster of {} rows x {} columns",
                    raster.row_count(),
                    raster.col_count()
                );
                TargetPlan::Raster(raster)
            }
        };

        let first_target = plan
            .first_sweep_target()
            .unwrap_or(mode.sweep_axis().edges[0]);
        let (sweep, _) = self.stage.axes(mode.main_axis());
        let calibration = CalibrationPlan::new(
            first_target,
            sweep.reference_position(),
            mode.sweep_axis().stepsize,
        )
        .clamped(&sweep_range);
        debug!(
            "Calibration points {:.6}, {:.6}",
            calibration.points[0], calibration.points[1]
        );

        Ok(Prepared {
            mode,
            geometry,
            plan,
            calibration,
            reconstructor: Reconstructor::new(paths, row_offset, row_stride),
        })
    }

    fn execute(
        &mut self,
        prepared: &Prepared,
        line: &mut Vec<LineSample>,
        frames: &mut [Frame],
        gaps: &mut Vec<DataGapError>,
    ) -> ScanResult<()> {
        let (sweep, mut step) = self.stage.axes(prepared.mode.main_axis());
        let mut scan = ScanLoop {
            acquisition: &mut self.acquisition,
            session: &mut self.session,
            events: &mut self.events,
            cancel: &self.cancel,
            progress: &self.progress,
            reconstructor: &prepared.reconstructor,
            read_retries: self.config.run.read_retries.min(1),
            gaps,
        };

        if let (TargetPlan::Raster(raster), Some(step)) = (&prepared.plan, step.as_deref_mut()) {
            if let Some(first) = raster.rows.first() {
                debug!("Positioning stepped axis at {:.6}", first.step_position);
                step.move_to(first.step_position)?;
            }
        }

        scan.arm()?;
        scan.calibrate(sweep, &prepared.calibration)?;
        scan.session.transition(SessionState::Scanning)?;

        match (&prepared.plan, prepared.mode.kind()) {
            (TargetPlan::Line(targets), ScanKind::Discrete) => {
                scan.discrete_line(sweep, targets, line)
            }
            (TargetPlan::Line(targets), ScanKind::Continuous) => {
                scan.continuous_line(sweep, targets, line)
            }
            (TargetPlan::Raster(raster), kind) => {
                let step = step.ok_or(ConfigError::StageMismatch {
                    dimension: 2,
                    axes: 1,
                })?;
                match kind {
                    ScanKind::Discrete => scan.discrete_raster(sweep, step, raster, frames),
                    ScanKind::Continuous => scan.continuous_raster(sweep, step, raster, frames),
                }
            }
        }
    }
}

/// Split a (sweep, step) position pair into (primary, secondary).
fn split(main_axis: MainAxis, sweep: f64, step: f64) -> (f64, f64) {
    match main_axis {
        MainAxis::Primary => (sweep, step),
        MainAxis::Secondary => (step, sweep),
    }
}

/// Per-column `(position, values)` of a sweep, one value per signal.
fn sweep_columns(rows: &[Vec<f64>], start: f64, end: f64) -> Vec<(f64, Vec<f64>)> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    resample_sweep(first, start, end)
        .into_iter()
        .enumerate()
        .map(|(j, (position, _))| {
            let values = rows
                .iter()
                .map(|row| row.get(j).copied().unwrap_or(f64::NAN))
                .collect();
            (position, values)
        })
        .collect()
}

/// Borrowed state of a running scan, separate from the axes it drives.
struct ScanLoop<'a, A: AcquisitionModule> {
    acquisition: &'a mut A,
    session: &'a mut AcquisitionSession,
    events: &'a mut EventSink,
    cancel: &'a CancelToken,
    progress: &'a ProgressHandle,
    reconstructor: &'a Reconstructor,
    read_retries: u8,
    gaps: &'a mut Vec<DataGapError>,
}

impl<A: AcquisitionModule> ScanLoop<'_, A> {
    fn check_cancel(&self) -> ScanResult<()> {
        if self.cancel.is_cancelled() {
            info!("Scan cancelled after {} samples", self.session.samples());
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn arm(&mut self) -> ScanResult<()> {
        self.check_cancel()?;
        self.acquisition.execute()?;
        self.session.transition(SessionState::Armed)
    }

    fn calibrate(&mut self, sweep: &mut dyn MotionAxis, plan: &CalibrationPlan) -> ScanResult<()> {
        self.session.transition(SessionState::Calibrating)?;
        for (i, &point) in plan.points.iter().enumerate() {
            self.check_cancel()?;
            debug!("Calibration move {} to {point:.6}", i + 1);
            sweep.move_to(point)?;
            self.read(None)?;
            self.session.discard_calibration_burst()?;
        }
        info!(
            "Calibration complete, {} bursts discarded",
            self.session.discarded()
        );
        Ok(())
    }

    /// Blocking read with at most one retry after a timeout. `index` is `None`
    /// for calibration reads.
    fn read(&mut self, index: Option<usize>) -> ScanResult<Burst> {
        let mut attempt = 0;
        loop {
            match self.acquisition.read(true) {
                Ok(burst) => return Ok(burst),
                Err(e) if e.is_timeout() && attempt < self.read_retries => {
                    attempt += 1;
                    match index {
                        Some(i) => warn!("Read timed out at sample {i}, retrying: {e}"),
                        None => warn!("Calibration read timed out, retrying: {e}"),
                    }
                }
                Err(e) if e.is_timeout() => {
                    return Err(match index {
                        Some(index) => {
                            error!("Read timed out at sample {index} after retry: {e}");
                            ScanError::DeviceTimeout { index }
                        }
                        None => e.into(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn record_gap(&mut self, gap: DataGapError) {
        warn!("Data gap at sample {}: {gap}", gap.index());
        self.gaps.push(gap);
    }

    fn complete_unit(&mut self) {
        let completed = self.progress.advance();
        self.events.send(ScanEvent::RowComplete {
            completed,
            total: self.progress.total(),
        });
    }

    fn discrete_line(
        &mut self,
        sweep: &mut dyn MotionAxis,
        targets: &[f64],
        samples: &mut Vec<LineSample>,
    ) -> ScanResult<()> {
        for &target in targets {
            self.check_cancel()?;
            let index = self.session.next_index()?;
            debug!("Sample {index}: moving to {target:.6}");
            sweep.move_to(target)?;

            let burst = self.read(Some(index))?;
            match self.reconstructor.pixel(&burst, index) {
                Ok(values) => {
                    self.events.send(ScanEvent::Sample {
                        index,
                        primary: target,
                        secondary: None,
                        values: values.clone(),
                    });
                    samples.push(LineSample {
                        position: target,
                        values,
                    });
                }
                Err(gap) => self.record_gap(gap),
            }
            self.complete_unit();

            if self.acquisition.finished()? {
                break;
            }
        }
        Ok(())
    }

    fn continuous_line(
        &mut self,
        sweep: &mut dyn MotionAxis,
        targets: &[f64],
        samples: &mut Vec<LineSample>,
    ) -> ScanResult<()> {
        let (Some(&start), Some(&end)) = (targets.first(), targets.last()) else {
            return Ok(());
        };

        self.check_cancel()?;
        debug!("Lead-in move to {start:.6}");
        sweep.move_to(start)?;

        let index = self.session.next_index()?;
        info!("Sweeping {start:.6} -> {end:.6}");
        sweep.move_to(end)?;

        let burst = self.read(Some(index))?;
        match self.reconstructor.sweep(&burst, index) {
            Ok(rows) => {
                for (position, values) in sweep_columns(&rows, start, end) {
                    self.events.send(ScanEvent::Sample {
                        index,
                        primary: position,
                        secondary: None,
                        values: values.clone(),
                    });
                    samples.push(LineSample { position, values });
                }
            }
            Err(gap) => self.record_gap(gap),
        }
        self.complete_unit();
        Ok(())
    }

    fn discrete_raster(
        &mut self,
        sweep: &mut dyn MotionAxis,
        step: &mut dyn MotionAxis,
        raster: &RasterTargets,
        frames: &mut [Frame],
    ) -> ScanResult<()> {
        for (r, row) in raster.rows.iter().enumerate() {
            for frame in frames.iter_mut() {
                frame.record_traversal(r, row.reversed);
            }

            for (t, &position) in row.sweep_positions.iter().enumerate() {
                self.check_cancel()?;
                let index = self.session.next_index()?;
                if t == 0 && r > 0 {
                    // The sweep axis already sits at the row start
                    debug!("Sample {index}: stepping to {:.6}", row.step_position);
                    step.move_to(row.step_position)?;
                } else {
                    debug!("Sample {index}: moving to {position:.6}");
                    sweep.move_to(position)?;
                }

                let burst = self.read(Some(index))?;
                match self.reconstructor.pixel(&burst, index) {
                    Ok(values) => {
                        for (frame, &value) in frames.iter_mut().zip(&values) {
                            frame.set_pixel(r, t, row.reversed, value);
                        }
                        let (primary, secondary) =
                            split(raster.main_axis, position, row.step_position);
                        self.events.send(ScanEvent::Sample {
                            index,
                            primary,
                            secondary: Some(secondary),
                            values,
                        });
                    }
                    Err(gap) => self.record_gap(gap),
                }
            }
            self.complete_unit();
        }
        Ok(())
    }

    fn continuous_raster(
        &mut self,
        sweep: &mut dyn MotionAxis,
        step: &mut dyn MotionAxis,
        raster: &RasterTargets,
        frames: &mut [Frame],
    ) -> ScanResult<()> {
        for (r, row) in raster.rows.iter().enumerate() {
            self.check_cancel()?;
            if r == 0 {
                debug!("Lead-in move to {:.6}", row.start());
                sweep.move_to(row.start())?;
            } else {
                debug!("Row {r}: stepping to {:.6}", row.step_position);
                step.move_to(row.step_position)?;
            }

            let index = self.session.next_index()?;
            debug!("Row {r}: sweeping {:.6} -> {:.6}", row.start(), row.end());
            sweep.move_to(row.end())?;

            let burst = self.read(Some(index))?;
            for frame in frames.iter_mut() {
                frame.record_traversal(r, row.reversed);
            }
            match self.reconstructor.sweep(&burst, index) {
                Ok(rows) => {
                    for (frame, values) in frames.iter_mut().zip(&rows) {
                        frame.insert_row(r, values, row.reversed);
                    }
                    for (position, values) in sweep_columns(&rows, row.start(), row.end()) {
                        let (primary, secondary) =
                            split(raster.main_axis, position, row.step_position);
                        self.events.send(ScanEvent::Sample {
                            index,
                            primary,
                            secondary: Some(secondary),
                            values,
                        });
                    }
                }
                Err(gap) => self.record_gap(gap),
            }
            self.complete_unit();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_handle() {
        let progress = ProgressHandle::new();
        assert_eq!(progress.fraction(), 0.0);
        progress.reset(4);
        progress.advance();
        let observer = progress.clone();
        assert_eq!(observer.completed(), 1);
        assert_eq!(observer.fraction(), 0.25);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_split_follows_main_axis() {
        assert_eq!(split(MainAxis::Primary, 1.0, 2.0), (1.0, 2.0));
        assert_eq!(split(MainAxis::Secondary, 1.0, 2.0), (2.0, 1.0));
    }

    #[test]
    fn test_sweep_columns() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0]];
        let columns = sweep_columns(&rows, 0.0, 1.0);
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[1], (0.5, vec![2.0, 5.0]));
        assert!(columns[2].1[1].is_nan());
    }
}
