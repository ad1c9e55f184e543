use super::compliance::ComplianceEvaluator;
use super::domain::{Receipt, ReceiptSource, SubmissionMetadata};
use super::drivers::{self, StageError};
use super::extraction::{ExtractionFailed, ExtractionGateway};
use super::graph::{self, Node};
use super::intake::IntakeError;
use super::notify::Notifier;
use super::report::ReportBuilder;
use super::ruleset::RuleSet;
use super::state::{ControlSignal, ReportMode, RunState};
use super::update::{PartialUpdate, Progress, StageTag, StateChange};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Per-call deadlines. `None` leaves the call unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadlines {
    pub extraction: Option<Duration>,
    pub compliance: Option<Duration>,
    pub report: Option<Duration>,
    pub notification: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub max_concurrency: usize,
    pub deadlines: Deadlines,
    pub report_mode: ReportMode,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            deadlines: Deadlines::default(),
            report_mode: ReportMode::default(),
        }
    }
}

/// Final state of a run plus the stage-fatal error that stopped it, if any.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,
    pub error: Option<StageError>,
}

/// Sequences the four collaborators over one batch of receipts.
#[derive(Debug, Clone)]
pub struct ExpensePipeline<E, C, R, N> {
    gateway: E,
    evaluator: C,
    reporter: R,
    notifier: N,
    options: PipelineOptions,
}

impl<E, C, R, N> ExpensePipeline<E, C, R, N>
where
    E: ExtractionGateway,
    C: ComplianceEvaluator,
    R: ReportBuilder,
    N: Notifier,
{
    pub fn new(gateway: E, evaluator: C, reporter: R, notifier: N) -> Self {
        Self {
            gateway,
            evaluator,
            reporter,
            notifier,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = PipelineOptions {
            max_concurrency: options.max_concurrency.max(1),
            ..options
        };
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Start a lazy update sequence over `state`. What runs is decided from
    /// the state itself, so a partially complete state resumes where it
    /// stopped.
    pub fn advance<'a>(&'a self, state: &'a mut RunState) -> Advance<'a, E, C, R, N> {
        Advance {
            pipeline: self,
            state,
            node: Node::INITIAL,
            extraction: None,
            extraction_started: false,
            closing: false,
            progressed: false,
            finished: false,
        }
    }

    /// Drive `state` to the end, handing each update to `observer`.
    pub async fn drive<F>(&self, state: &mut RunState, mut observer: F) -> Option<StageError>
    where
        F: FnMut(&PartialUpdate),
    {
        let mut updates = self.advance(state);
        while let Some(next) = updates.next().await {
            match next {
                Ok(update) => observer(&update),
                Err(err) => return Some(err),
            }
        }
        None
    }

    pub async fn run(
        &self,
        sources: Vec<ReceiptSource>,
        rules: RuleSet,
        metadata: SubmissionMetadata,
    ) -> Result<RunOutcome, IntakeError> {
        self.run_streaming(sources, rules, metadata, |_| {}).await
    }

    /// Same as [`ExpensePipeline::run`], reporting every update as it lands.
    pub async fn run_streaming<F>(
        &self,
        sources: Vec<ReceiptSource>,
        rules: RuleSet,
        metadata: SubmissionMetadata,
        observer: F,
    ) -> Result<RunOutcome, IntakeError>
    where
        F: FnMut(&PartialUpdate),
    {
        let mut state = RunState::new(sources, rules, metadata)?;
        let error = self.drive(&mut state, observer).await;
        Ok(RunOutcome { state, error })
    }

    fn extraction_stream<'a>(
        &'a self,
        pending: Vec<ReceiptSource>,
    ) -> BoxStream<'a, Result<Receipt, ExtractionFailed>> {
        let deadline = self.options.deadlines.extraction;
        let gateway = &self.gateway;
        // buffered, not buffer_unordered: results come back in source order
        stream::iter(pending)
            .map(move |source| async move { drivers::extract(gateway, &source, deadline).await })
            .buffered(self.options.max_concurrency)
            .boxed()
    }
}

enum Step {
    Emit(PartialUpdate),
    Fatal(StageError),
    Idle,
}

/// One pass over a run state. Single use; pass the state to a fresh
/// [`ExpensePipeline::advance`] to resume after it ends or is dropped.
pub struct Advance<'a, E, C, R, N> {
    pipeline: &'a ExpensePipeline<E, C, R, N>,
    state: &'a mut RunState,
    node: Node,
    extraction: Option<BoxStream<'a, Result<Receipt, ExtractionFailed>>>,
    extraction_started: bool,
    closing: bool,
    progressed: bool,
    finished: bool,
}

impl<'a, E, C, R, N> Advance<'a, E, C, R, N>
where
    E: ExtractionGateway,
    C: ComplianceEvaluator,
    R: ReportBuilder,
    N: Notifier,
{
    pub fn state(&self) -> &RunState {
        self.state
    }

    pub fn node(&self) -> Node {
        self.node
    }

    /// Next update, `None` once the sequence has ended. A stage-fatal error
    /// is yielded once and ends the sequence.
    pub async fn next(&mut self) -> Option<Result<PartialUpdate, StageError>> {
        if self.finished {
            return None;
        }

        loop {
            match self.node {
                Node::Processing => match self.process().await {
                    Step::Emit(update) => {
                        self.progressed = true;
                        return Some(Ok(update));
                    }
                    Step::Fatal(err) => {
                        self.finished = true;
                        return Some(Err(err));
                    }
                    Step::Idle => self.transition(),
                },
                Node::Action => {
                    let step = self.act().await;
                    self.transition();
                    match step {
                        Step::Emit(update) => return Some(Ok(update)),
                        Step::Fatal(err) => {
                            self.finished = true;
                            return Some(Err(err));
                        }
                        Step::Idle => {}
                    }
                }
                Node::Exit => {
                    self.finished = true;
                    let change = StateChange::Terminated;
                    self.state.apply(&change);
                    return Some(Ok(PartialUpdate {
                        stage: StageTag::Control,
                        change,
                        progress: Progress {
                            done: self.state.settled_sources(),
                            total: self.state.receipt_sources().len(),
                        },
                    }));
                }
            }
        }
    }

    /// Adapt into a `Stream` for callers that prefer combinators.
    pub fn into_stream(self) -> impl Stream<Item = Result<PartialUpdate, StageError>> + 'a
    where
        E: 'a,
        C: 'a,
        R: 'a,
        N: 'a,
    {
        stream::unfold(self, |mut advance| async move {
            let item = advance.next().await?;
            Some((item, advance))
        })
    }

    fn transition(&mut self) {
        let next = graph::next_node(self.node, self.state);
        debug!(from = self.node.label(), to = next.label(), "workflow transition");
        if next == Node::Processing {
            self.progressed = false;
        }
        self.node = next;
    }

    /// One step of extraction, validation or reporting. Returns `Idle` at the
    /// end of each stage so the action node can look at the state.
    async fn process(&mut self) -> Step {
        if self.closing {
            self.closing = false;
            return Step::Idle;
        }

        if !self.extraction_started {
            self.extraction_started = true;
            let pending = self.state.pending_sources();
            if !pending.is_empty() {
                info!(pending = pending.len(), "extracting receipts");
                self.extraction = Some(self.pipeline.extraction_stream(pending));
            }
        }

        if let Some(extraction) = self.extraction.as_mut() {
            return match extraction.next().await {
                Some(result) => Step::Emit(self.merge_extraction(result)),
                None => {
                    self.extraction = None;
                    info!(
                        extracted = self.state.extracted_receipts().len(),
                        failed = self.state.extraction_failures().len(),
                        "extraction stage settled"
                    );
                    Step::Idle
                }
            };
        }

        let next = {
            let mut pending = self.state.pending_validation();
            pending
                .next()
                .cloned()
                .map(|receipt| (receipt, pending.next().is_none()))
        };
        if let Some((receipt, last)) = next {
            if last {
                self.closing = true;
            }
            return Step::Emit(self.validate(receipt).await);
        }

        if self.state.needs_report(self.pipeline.options.report_mode) {
            self.closing = true;
            return match self.report().await {
                Ok(update) => Step::Emit(update),
                Err(err) => Step::Fatal(err),
            };
        }

        Step::Idle
    }

    /// Notify when artifacts are waiting, otherwise choose between looping
    /// back to processing and stopping.
    async fn act(&mut self) -> Step {
        let mode = self.pipeline.options.report_mode;
        if self.progressed && self.state.has_processing_work(mode) {
            self.state.set_control_signal(ControlSignal::Continue);
            return Step::Idle;
        }

        if self.state.needs_notification() {
            let deadline = self.pipeline.options.deadlines.notification;
            let artifacts = self.state.report_artifacts().to_vec();
            return match drivers::notify(&self.pipeline.notifier, &artifacts, deadline).await {
                Ok(status) => {
                    info!(delivered = status.delivered, message = %status.message, "notification dispatched");
                    let change = StateChange::NotificationDispatched { status };
                    self.state.apply(&change);
                    Step::Emit(PartialUpdate {
                        stage: StageTag::Notification,
                        change,
                        progress: Progress { done: 1, total: 1 },
                    })
                }
                Err(err) => {
                    self.state.set_control_signal(ControlSignal::Terminate);
                    Step::Fatal(err)
                }
            };
        }

        self.state.set_control_signal(ControlSignal::Terminate);
        Step::Idle
    }

    fn merge_extraction(&mut self, result: Result<Receipt, ExtractionFailed>) -> PartialUpdate {
        let change = match result {
            Ok(receipt) => StateChange::ReceiptExtracted { receipt },
            Err(failure) => StateChange::ExtractionFailed { failure },
        };
        self.state.apply(&change);
        PartialUpdate {
            stage: StageTag::Extraction,
            change,
            progress: Progress {
                done: self.state.settled_sources(),
                total: self.state.receipt_sources().len(),
            },
        }
    }

    async fn validate(&mut self, receipt: Receipt) -> PartialUpdate {
        let pipeline = self.pipeline;
        let annotated = drivers::validate(
            &pipeline.evaluator,
            receipt,
            self.state.compliance_rules(),
            pipeline.options.deadlines.compliance,
        )
        .await;
        debug!(receipt_id = %annotated.receipt_id, compliant = annotated.compliant(), "receipt validated");

        let change = StateChange::ReceiptValidated { receipt: annotated };
        self.state.apply(&change);
        PartialUpdate {
            stage: StageTag::Compliance,
            change,
            progress: Progress {
                done: self.state.validated_receipts().len(),
                total: self.state.extracted_receipts().len(),
            },
        }
    }

    async fn report(&mut self) -> Result<PartialUpdate, StageError> {
        let pipeline = self.pipeline;
        let (compliant, non_compliant) = self.state.partition();
        let artifacts = drivers::report(
            &pipeline.reporter,
            &compliant,
            &non_compliant,
            self.state.metadata(),
            pipeline.options.deadlines.report,
        )
        .await?;
        info!(artifacts = artifacts.len(), receipts = compliant.len() + non_compliant.len(), "report stage complete");

        let change = StateChange::ReportGenerated {
            artifacts,
            receipts_covered: compliant.len() + non_compliant.len(),
        };
        self.state.apply(&change);
        Ok(PartialUpdate {
            stage: StageTag::Report,
            change,
            progress: Progress { done: 1, total: 1 },
        })
    }
}
