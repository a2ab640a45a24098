use log::{debug, info, warn};

use super::App;
use super::state::InFlight;
use crate::agent::{
    Agent, ChatError, ChatResult, DispatchEvent, JobHandle, JobId, JobOutcome, PendingJob,
};
use crate::event::Inbound;
use crate::panels::chat::greeting;

impl App {
    /// Sends one line of user input, honouring a leading `@nickname`.
    ///
    /// A directive switches the session to the named agent (or to `default`
    /// when the name is unknown) and starts a fresh conversation before the
    /// message is appended.
    pub fn send_message(&mut self, input: &str) -> ChatResult<JobHandle> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let directive = self
            .directory
            .parse_directive(input, self.active_agent());
        if directive.matched {
            self.switch_agent(&directive.agent);
        }
        if directive.remainder.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let agent = directive.agent;
        self.session.append_user(directive.remainder.as_str());
        self.transcript
            .push_user(agent.nickname.as_str(), directive.remainder.as_str());

        let job = PendingJob::new(&agent, &self.session);
        let generation = job.generation;
        let handle = self.dispatcher.submit(job);
        self.in_flight.insert(
            handle.id,
            InFlight {
                agent: agent.nickname.clone(),
                generation,
            },
        );
        info!("Submitted job #{} to @{} ({})", handle.id, agent.nickname, agent.model);
        self.status_message = format!("Waiting for @{} ({} queued)", agent.nickname, self.queued());
        Ok(handle)
    }

    /// Takes the composer content and routes it to a command or to the model.
    pub fn submit_input(&mut self) {
        let raw = self.composer.take();
        let input = raw.trim();
        if let Some(command) = input.strip_prefix('/')
            && !command.starts_with('/')
        {
            self.run_command(command);
            return;
        }
        // `//text` sends `/text` as a message.
        let message = if input.starts_with("//") {
            &input[1..]
        } else {
            input
        };
        if let Err(err) = self.send_message(message) {
            self.report(err);
        }
    }

    /// Drops the conversation and starts over with the active agent.
    pub fn new_conversation(&mut self) {
        let agent = self.active_agent().clone();
        self.session.reset(&agent);
        self.transcript.clear();
        self.transcript
            .push_info("New conversation", greeting(&agent.nickname, &agent.model));
        self.composer.clear();
        self.status_message = format!("New conversation with @{}", agent.nickname);
        info!("New conversation with `{}` (generation {})", agent.nickname, self.session.generation());
    }

    /// Applies one message taken off the inbox.
    pub fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Dispatch(event) => self.handle_dispatch(event),
            Inbound::ToggleVisibility => {
                let visible = self.visibility.apply_pending();
                self.status_message = if visible {
                    String::from("Window shown")
                } else {
                    format!("Hidden, press {} to show", self.hotkey_label())
                };
            }
        }
    }

    fn handle_dispatch(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::Started { job, agent_id } => {
                if self.is_current(job) {
                    self.transcript.open_reply(job, agent_id);
                }
            }
            DispatchEvent::Snapshot { job, text } => {
                self.transcript.update_reply(job, &text);
            }
            DispatchEvent::Finished {
                job,
                generation,
                outcome,
                elapsed,
            } => {
                let agent = self
                    .in_flight
                    .remove(&job)
                    .map(|job| job.agent)
                    .unwrap_or_default();
                match outcome {
                    JobOutcome::Succeeded(text) => {
                        if generation == self.session.generation() {
                            self.session.append_assistant(text.as_str());
                            self.finish_reply(job, &agent, &text);
                            self.status_message =
                                format!("@{agent} replied in {:.1}s", elapsed.as_secs_f32());
                        } else {
                            debug!(
                                "Discarding job #{job}: generation {generation}, session at {}",
                                self.session.generation()
                            );
                            self.transcript.close_reply(job, None);
                            self.transcript.push_info(
                                "Reply discarded",
                                format!("@{agent} answered after the conversation was reset."),
                            );
                        }
                    }
                    JobOutcome::Failed { reason, partial } => {
                        warn!("Job #{job} for @{agent} failed: {reason}");
                        if partial.is_empty() {
                            self.transcript.close_reply(job, None);
                        } else {
                            self.transcript.close_reply(job, Some(&partial));
                        }
                        self.report(reason);
                    }
                }
            }
        }
    }

    fn finish_reply(&mut self, job: JobId, agent: &str, text: &str) {
        if self.transcript.has_open_reply(job) {
            self.transcript.close_reply(job, Some(text));
        } else {
            self.transcript.open_reply(job, agent);
            self.transcript.close_reply(job, Some(text));
        }
    }

    fn is_current(&self, job: JobId) -> bool {
        self.in_flight
            .get(&job)
            .is_some_and(|job| job.generation == self.session.generation())
    }

    /// Points the session at `agent`, starting a new conversation.
    pub(crate) fn switch_agent(&mut self, agent: &Agent) {
        self.session.reset(agent);
        self.transcript.push_info(
            "Agent",
            format!("Now talking to @{} ({})", agent.nickname, agent.model),
        );
        info!("Switched to agent `{}`", agent.nickname);
    }

    /// Shows a recoverable error inline and in the status bar.
    pub(crate) fn report(&mut self, err: ChatError) {
        let title = match &err {
            ChatError::RequestFailed(_) => "Request failed",
            ChatError::EmptyMessage => {
                self.status_message = err.to_string();
                return;
            }
            ChatError::Persist(_) => "Not saved",
            _ => "Agent",
        };
        self.status_message = err.to_string();
        self.transcript.push_error(title, err.to_string());
    }
}
