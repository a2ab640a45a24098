//! The single worker lane that runs completion requests off the interactive loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use super::config::Agent;
use super::error::ChatError;
use super::message::Message;
use super::providers::ChatCompletion;
use super::session::Session;
use super::stream::{DEFAULT_FLUSH_INTERVAL, StreamAggregator, StreamFailure};
use crate::event::{InboxSender, Inbound};

pub type JobId = u64;

/// Everything one request needs, captured when the user hits send.
///
/// The messages are an owned copy of the session, so resets or agent edits
/// made while the job waits do not change what gets sent.
#[derive(Debug, Clone)]
pub struct PendingJob {
    pub agent_id: String,
    pub model: String,
    pub messages: Vec<Message>,
    /// Session generation at submission time.
    pub generation: u64,
    pub submitted_at: Instant,
}

impl PendingJob {
    pub fn new(agent: &Agent, session: &Session) -> Self {
        Self {
            agent_id: agent.nickname.clone(),
            model: agent.model.clone(),
            messages: session.snapshot(),
            generation: session.generation(),
            submitted_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub id: JobId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded(String),
    /// `partial` holds whatever streamed before the failure; it is empty when
    /// the backend rejected the request outright.
    Failed { reason: ChatError, partial: String },
}

/// Progress reports posted to the interactive inbox, in lane order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Started {
        job: JobId,
        agent_id: String,
    },
    Snapshot {
        job: JobId,
        text: String,
    },
    Finished {
        job: JobId,
        generation: u64,
        outcome: JobOutcome,
        elapsed: Duration,
    },
}

struct QueuedJob {
    id: JobId,
    job: PendingJob,
    client: Arc<dyn ChatCompletion>,
}

/// Serializes completion requests: one job runs at a time, in submission order.
///
/// Jobs cannot be cancelled. Dropping the dispatcher closes the queue; the
/// job in progress still runs to its end.
pub struct RequestDispatcher {
    client: Arc<dyn ChatCompletion>,
    jobs: UnboundedSender<QueuedJob>,
    next_id: JobId,
    outstanding: Arc<AtomicUsize>,
}

impl RequestDispatcher {
    /// Starts the worker lane on the current tokio runtime.
    pub fn spawn(client: Arc<dyn ChatCompletion>, inbox: InboxSender) -> Self {
        Self::with_flush_interval(client, inbox, DEFAULT_FLUSH_INTERVAL)
    }

    pub fn with_flush_interval(
        client: Arc<dyn ChatCompletion>,
        inbox: InboxSender,
        flush_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let outstanding = Arc::new(AtomicUsize::new(0));
        tokio::spawn(run_lane(rx, inbox, Arc::clone(&outstanding), flush_interval));
        Self {
            client,
            jobs: tx,
            next_id: 1,
            outstanding,
        }
    }

    /// Queues `job` behind everything submitted before it.
    pub fn submit(&mut self, job: PendingJob) -> JobHandle {
        let id = self.next_id;
        self.next_id += 1;
        debug!(
            "Queueing job #{id} for agent `{}` (model {}, {} messages)",
            job.agent_id,
            job.model,
            job.messages.len()
        );
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedJob {
            id,
            job,
            client: Arc::clone(&self.client),
        };
        if self.jobs.send(queued).is_err() {
            // Only happens if the runtime is shutting down under us.
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            warn!("Worker lane is gone, job #{id} dropped");
        }
        JobHandle { id }
    }

    /// Jobs waiting or running.
    pub fn queued(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Uses `client` for jobs submitted from now on. Queued jobs keep the
    /// client they were submitted with.
    pub fn set_client(&mut self, client: Arc<dyn ChatCompletion>) {
        info!("Completion backend replaced with `{}`", client.name());
        self.client = client;
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }
}

async fn run_lane(
    mut jobs: UnboundedReceiver<QueuedJob>,
    inbox: InboxSender,
    outstanding: Arc<AtomicUsize>,
    flush_interval: Duration,
) {
    while let Some(QueuedJob { id, job, client }) = jobs.recv().await {
        let started = inbox.send(Inbound::Dispatch(DispatchEvent::Started {
            job: id,
            agent_id: job.agent_id.clone(),
        }));
        if started.is_err() {
            break;
        }

        let outcome = execute(id, &job, client.as_ref(), &inbox, flush_interval).await;
        let elapsed = job.submitted_at.elapsed();
        match &outcome {
            JobOutcome::Succeeded(text) => {
                info!("Job #{id} finished in {elapsed:?} ({} bytes)", text.len())
            }
            JobOutcome::Failed { reason, .. } => warn!("Job #{id} failed: {reason}"),
        }
        outstanding.fetch_sub(1, Ordering::SeqCst);

        let finished = inbox.send(Inbound::Dispatch(DispatchEvent::Finished {
            job: id,
            generation: job.generation,
            outcome,
            elapsed,
        }));
        if finished.is_err() {
            break;
        }
    }
    debug!("Worker lane stopped");
}

async fn execute(
    id: JobId,
    job: &PendingJob,
    client: &dyn ChatCompletion,
    inbox: &InboxSender,
    flush_interval: Duration,
) -> JobOutcome {
    let fragments = match client.request(&job.model, &job.messages).await {
        Ok(fragments) => fragments,
        Err(reason) => {
            return JobOutcome::Failed {
                reason,
                partial: String::new(),
            };
        }
    };

    let sink_inbox = inbox.clone();
    let sink = move |snapshot: &str| {
        let _ = sink_inbox.send(Inbound::Dispatch(DispatchEvent::Snapshot {
            job: id,
            text: snapshot.to_string(),
        }));
    };
    match StreamAggregator::with_interval(sink, flush_interval)
        .run(fragments)
        .await
    {
        Ok(text) => JobOutcome::Succeeded(text),
        Err(StreamFailure { partial, error }) => JobOutcome::Failed {
            reason: error,
            partial,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::providers::FragmentStream;
    use crate::event::{InboxReceiver, inbox};
    use async_trait::async_trait;
    use futures_util::stream;

    /// Answers with the model name, after sleeping as many ms as the model's
    /// numeric suffix (`slow-300`). Model `refuse` fails immediately.
    struct EchoModel;

    #[async_trait]
    impl ChatCompletion for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn request(
            &self,
            model: &str,
            messages: &[Message],
        ) -> Result<FragmentStream, ChatError> {
            if model == "refuse" {
                return Err(ChatError::RequestFailed(String::from("401 Unauthorized")));
            }
            let delay = model
                .rsplit('-')
                .next()
                .and_then(|ms| ms.parse::<u64>().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let reply = format!("{model}:{}", messages.len());
            Ok(Box::pin(stream::iter(vec![Ok(Some(reply))])))
        }
    }

    fn job(model: &str, generation: u64) -> PendingJob {
        PendingJob {
            agent_id: String::from("default"),
            model: model.to_string(),
            messages: vec![Message::system("sys"), Message::user("hi")],
            generation,
            submitted_at: Instant::now(),
        }
    }

    async fn collect_finished(rx: &mut InboxReceiver, count: usize) -> Vec<DispatchEvent> {
        let mut events = Vec::new();
        let mut finished = 0;
        while finished < count {
            let Some(Inbound::Dispatch(event)) = rx.recv().await else {
                panic!("inbox closed early");
            };
            if matches!(event, DispatchEvent::Finished { .. }) {
                finished += 1;
            }
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_submission_order() {
        let (tx, mut rx) = inbox();
        let mut dispatcher = RequestDispatcher::spawn(Arc::new(EchoModel), tx);

        let first = dispatcher.submit(job("slow-300", 0));
        let second = dispatcher.submit(job("fast-0", 0));
        assert_eq!(dispatcher.queued(), 2);

        let events = collect_finished(&mut rx, 2).await;
        let order: Vec<_> = events
            .iter()
            .map(|event| match event {
                DispatchEvent::Started { job, .. } => format!("start#{job}"),
                DispatchEvent::Snapshot { job, .. } => format!("snap#{job}"),
                DispatchEvent::Finished { job, .. } => format!("done#{job}"),
            })
            .collect();
        assert_eq!(
            order,
            vec!["start#1", "snap#1", "done#1", "start#2", "snap#2", "done#2"]
        );
        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(dispatcher.queued(), 0);

        let DispatchEvent::Finished { outcome, .. } = &events[2] else {
            panic!("expected finish");
        };
        assert_eq!(outcome, &JobOutcome::Succeeded(String::from("slow-300:2")));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_errors_fail_the_job() {
        let (tx, mut rx) = inbox();
        let mut dispatcher = RequestDispatcher::spawn(Arc::new(EchoModel), tx);
        dispatcher.submit(job("refuse", 7));

        let events = collect_finished(&mut rx, 1).await;
        assert_eq!(events.len(), 2);
        let DispatchEvent::Finished {
            job,
            generation,
            outcome,
            ..
        } = &events[1]
        else {
            panic!("expected finish, got {:?}", events[1]);
        };
        assert_eq!((*job, *generation), (1, 7));
        assert_eq!(
            outcome,
            &JobOutcome::Failed {
                reason: ChatError::RequestFailed(String::from("401 Unauthorized")),
                partial: String::new(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lane_survives_a_failed_job() {
        let (tx, mut rx) = inbox();
        let mut dispatcher = RequestDispatcher::spawn(Arc::new(EchoModel), tx);
        dispatcher.submit(job("refuse", 0));
        dispatcher.submit(job("after-10", 0));

        let events = collect_finished(&mut rx, 2).await;
        let DispatchEvent::Finished { outcome, .. } = events.last().unwrap() else {
            panic!("expected finish");
        };
        assert_eq!(outcome, &JobOutcome::Succeeded(String::from("after-10:2")));
    }
}
