//! Per-socket audio loop.

use crate::error::CallError;
use crate::router::EventRouter;
use crate::session::CallSession;
use callbridge_audio::{SegmenterConfig, Utterance, UtteranceSegmenter};
use callbridge_voice::{PipelineConfig, SilentReason, SpeechPipeline, TurnOutcome};
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How one turn ended.
#[derive(Debug)]
pub enum TurnReport {
    Spoke {
        transcript: String,
        response: String,
        frames: usize,
    },
    Silent(SilentReason),
    Failed(CallError),
}

/// Streams a call's inbound audio through the speech pipeline and writes
/// the responses back, one utterance at a time.
#[derive(Debug, Clone)]
pub struct AudioBridge {
    router: Arc<EventRouter>,
    pipeline: Arc<SpeechPipeline>,
    segmenter: SegmenterConfig,
    turn_timeout: Duration,
    max_pending: usize,
}

impl AudioBridge {
    pub fn new(
        router: Arc<EventRouter>,
        pipeline: Arc<SpeechPipeline>,
        segmenter: SegmenterConfig,
        limits: &PipelineConfig,
    ) -> Self {
        Self {
            router,
            pipeline,
            segmenter,
            turn_timeout: Duration::from_millis(limits.turn_timeout_ms),
            max_pending: limits.max_pending_utterances.max(1),
        }
    }

    /// Runs until the call leaves `Streaming` or `inbound` ends.
    ///
    /// `socket_id` names the socket attached to `session`; on exit it is
    /// detached and its close reported to the router. An in-flight turn is
    /// aborted at that point.
    pub async fn run<S>(&self, session: Arc<CallSession>, socket_id: Uuid, mut inbound: S)
    where
        S: Stream<Item = Vec<u8>> + Unpin,
    {
        let call_id = session.id().to_string();
        let codec = *self.pipeline.codec();
        let mut state_rx = session.subscribe();
        let mut segmenter =
            match UtteranceSegmenter::new(self.segmenter.clone(), codec.pipeline_rate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(call_id = %call_id, "invalid segmenter config: {}", e);
                    self.router.socket_closed(&call_id, socket_id);
                    return;
                }
            };
        // One decoder per socket: resampler state carries across frames.
        let mut decoder = match codec.decoder() {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(call_id = %call_id, "cannot decode transport audio: {}", e);
                self.router.socket_closed(&call_id, socket_id);
                return;
            }
        };

        let (done_tx, mut done_rx) = mpsc::channel::<TurnReport>(1);
        let mut pending: VecDeque<Utterance> = VecDeque::new();
        let mut in_flight: Option<JoinHandle<()>> = None;

        tracing::info!(call_id = %call_id, %socket_id, "audio bridge started");

        loop {
            if state_rx.borrow_and_update().is_ending() {
                break;
            }

            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                frame = inbound.next() => {
                    let Some(frame) = frame else {
                        tracing::info!(call_id = %call_id, "audio socket ended");
                        break;
                    };
                    let samples = match decoder.decode(&frame) {
                        Ok(samples) => samples,
                        Err(e) => {
                            tracing::warn!(call_id = %call_id, bytes = frame.len(), "dropping undecodable frame: {}", e);
                            continue;
                        }
                    };
                    for utterance in segmenter.push(&samples) {
                        if pending.len() >= self.max_pending {
                            pending.pop_front();
                            tracing::warn!(call_id = %call_id, max_pending = self.max_pending, "utterance queue full, dropped oldest");
                        }
                        pending.push_back(utterance);
                    }
                }
                Some(report) = done_rx.recv() => {
                    in_flight = None;
                    session.finish_pipeline();
                    log_turn(&call_id, &report);
                }
            }

            if in_flight.is_none() {
                if let Some(utterance) = pending.pop_front() {
                    in_flight = self.start_turn(&session, utterance, done_tx.clone());
                }
            }
        }

        if let Some(task) = in_flight.take() {
            task.abort();
            session.finish_pipeline();
            tracing::info!(call_id = %call_id, "in-flight turn cancelled");
        }
        if !pending.is_empty() {
            tracing::debug!(call_id = %call_id, dropped = pending.len(), "discarding queued utterances");
        }

        self.router.socket_closed(&call_id, socket_id);
        tracing::info!(call_id = %call_id, %socket_id, "audio bridge stopped");
    }

    fn start_turn(
        &self,
        session: &CallSession,
        utterance: Utterance,
        done: mpsc::Sender<TurnReport>,
    ) -> Option<JoinHandle<()>> {
        if !session.begin_pipeline() {
            return None;
        }
        tracing::debug!(
            call_id = %session.id(),
            duration_ms = utterance.duration_ms(),
            voiced_ms = utterance.voiced_ms,
            "starting turn"
        );

        let pipeline = self.pipeline.clone();
        let sink = session.socket_sender();
        let timeout = self.turn_timeout;
        Some(tokio::spawn(async move {
            let report = run_turn(&pipeline, &utterance, timeout, sink).await;
            let _ = done.send(report).await;
        }))
    }
}

/// Runs one turn under `timeout`. The budget covers writing the response
/// frames as well as the pipeline, so a socket that stops reading cannot
/// hold the turn open.
async fn run_turn(
    pipeline: &SpeechPipeline,
    utterance: &Utterance,
    timeout: Duration,
    sink: Option<mpsc::Sender<Vec<u8>>>,
) -> TurnReport {
    tokio::time::timeout(timeout, speak(pipeline, utterance, sink))
        .await
        .unwrap_or(TurnReport::Failed(CallError::Timeout(timeout)))
}

/// Runs the pipeline for one utterance and writes the response frames, in
/// order, to `sink`.
async fn speak(
    pipeline: &SpeechPipeline,
    utterance: &Utterance,
    sink: Option<mpsc::Sender<Vec<u8>>>,
) -> TurnReport {
    let outcome = match pipeline.run(utterance).await {
        Err(e) => return TurnReport::Failed(e.into()),
        Ok(outcome) => outcome,
    };

    match outcome {
        TurnOutcome::Silent(reason) => TurnReport::Silent(reason),
        TurnOutcome::Spoke {
            transcript,
            response,
            frames,
        } => {
            let count = frames.len();
            if let Some(sink) = sink {
                for frame in frames {
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                }
            }
            TurnReport::Spoke {
                transcript,
                response,
                frames: count,
            }
        }
    }
}

fn log_turn(call_id: &str, report: &TurnReport) {
    match report {
        TurnReport::Spoke {
            transcript,
            response,
            frames,
        } => tracing::info!(call_id, transcript = %transcript, response = %response, frames, "turn spoken"),
        TurnReport::Silent(reason) => {
            tracing::debug!(call_id, reason = ?reason, "turn produced no speech")
        }
        TurnReport::Failed(e) => tracing::warn!(call_id, "turn failed: {}", e),
    }
}
