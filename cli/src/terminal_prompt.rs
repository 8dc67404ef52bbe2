// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Consent prompts rendered in the terminal.

use async_trait::async_trait;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Select};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use keyward_core::domain::policy::Conditions;
use keyward_core::domain::prompt::{PromptChannel, PromptError, PromptOutcome, PromptRequest, PromptResolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    AllowOnce,
    AllowKind(u32),
    AllowAlways,
    RejectOnce,
    RejectKind(u32),
    RejectAlways,
}

impl Choice {
    /// Options offered for a request; kind-scoped answers only exist for
    /// requests carrying an event kind.
    fn offered(kind: Option<u32>) -> Vec<Choice> {
        let mut choices = vec![Choice::AllowOnce];
        if let Some(kind) = kind {
            choices.push(Choice::AllowKind(kind));
        }
        choices.push(Choice::AllowAlways);
        choices.push(Choice::RejectOnce);
        if let Some(kind) = kind {
            choices.push(Choice::RejectKind(kind));
        }
        choices.push(Choice::RejectAlways);
        choices
    }

    fn resolution(self) -> PromptResolution {
        match self {
            Choice::AllowOnce => PromptResolution::once(true),
            Choice::AllowKind(kind) => PromptResolution::remember(true, Conditions::kinds([kind])),
            Choice::AllowAlways => PromptResolution::remember(true, Conditions::unconditional()),
            Choice::RejectOnce => PromptResolution::once(false),
            Choice::RejectKind(kind) => PromptResolution::remember(false, Conditions::kinds([kind])),
            Choice::RejectAlways => PromptResolution::remember(false, Conditions::unconditional()),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::AllowOnce => write!(f, "Authorize just this"),
            Choice::AllowKind(kind) => write!(f, "Authorize kind {} forever", kind),
            Choice::AllowAlways => write!(f, "Authorize forever"),
            Choice::RejectOnce => write!(f, "Reject"),
            Choice::RejectKind(kind) => write!(f, "Reject kind {} forever", kind),
            Choice::RejectAlways => write!(f, "Reject forever"),
        }
    }
}

/// Renders one prompt and blocks for the answer: the index picked, or `None`.
type Asker = Arc<dyn Fn(&PromptRequest, &[Choice]) -> Result<Option<usize>, PromptError> + Send + Sync>;

/// Asks on the controlling terminal. Escape or `q` abandons the prompt.
///
/// A blocking read cannot be interrupted, so one prompt owns the terminal
/// until answered even if its request went away. The next prompt waits its
/// turn and an answer to a request that is gone is discarded.
pub struct TerminalPromptChannel {
    asker: Asker,
    terminal: Arc<tokio::sync::Mutex<()>>,
}

impl TerminalPromptChannel {
    pub fn new() -> Self {
        Self::with_asker(Arc::new(ask_on_terminal))
    }

    fn with_asker(asker: Asker) -> Self {
        Self {
            asker,
            terminal: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

impl Default for TerminalPromptChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn ask_on_terminal(request: &PromptRequest, choices: &[Choice]) -> Result<Option<usize>, PromptError> {
    eprintln!();
    eprintln!("{}", request.summary().bold());
    if !request.params.is_null() {
        let params = serde_json::to_string_pretty(&request.params).unwrap_or_default();
        eprintln!("{}", params.dimmed());
    }

    Select::with_theme(&ColorfulTheme::default())
        .items(choices)
        .default(0)
        .interact_opt()
        .map_err(|e| PromptError::Unavailable(e.to_string()))
}

/// Flags the request as gone unless disarmed first.
struct CancelOnDrop {
    cancelled: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl PromptChannel for TerminalPromptChannel {
    async fn open(&self, request: PromptRequest) -> Result<PromptOutcome, PromptError> {
        let kind = request.params["event"]["kind"].as_u64().and_then(|k| u32::try_from(k).ok());
        let choices = Choice::offered(kind);

        let turn = self.terminal.clone().lock_owned().await;
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut guard = CancelOnDrop {
            cancelled: cancelled.clone(),
            armed: true,
        };
        let asker = self.asker.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let _turn = turn;
            if cancelled.load(Ordering::SeqCst) {
                return Ok(PromptOutcome::Abandoned);
            }

            let picked = asker(&request, &choices)?;

            if cancelled.load(Ordering::SeqCst) {
                debug!(correlation_id = %request.id, "Discarding answer for a request that went away");
                eprintln!("{}", "Request expired, answer discarded".yellow());
                return Ok(PromptOutcome::Abandoned);
            }

            Ok(match picked.and_then(|index| choices.get(index).copied()) {
                Some(choice) => {
                    debug!(correlation_id = %request.id, choice = %choice, "Terminal prompt answered");
                    PromptOutcome::Answered(choice.resolution())
                }
                None => PromptOutcome::Abandoned,
            })
        })
        .await
        .map_err(|e| PromptError::Unavailable(e.to_string()))?;

        guard.armed = false;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::domain::action::{ActionType, Origin};
    use keyward_core::domain::prompt::CorrelationId;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn kind_choices_only_for_events() {
        assert_eq!(Choice::offered(None).len(), 4);
        let with_kind = Choice::offered(Some(7));
        assert!(with_kind.contains(&Choice::AllowKind(7)));
        assert!(with_kind.contains(&Choice::RejectKind(7)));
        assert_eq!(with_kind[0], Choice::AllowOnce);
    }

    #[test]
    fn choices_map_to_resolutions() {
        assert_eq!(Choice::AllowOnce.resolution(), PromptResolution::once(true));
        assert_eq!(
            Choice::RejectKind(1).resolution(),
            PromptResolution::remember(false, Conditions::kinds([1]))
        );
        assert_eq!(
            Choice::AllowAlways.resolution(),
            PromptResolution::remember(true, Conditions::unconditional())
        );
    }

    fn request() -> PromptRequest {
        PromptRequest {
            id: CorrelationId::new(),
            host: Origin::new("example.com"),
            action: ActionType::GetPublicKey,
            params: serde_json::Value::Null,
        }
    }

    /// Answers the first choice after `delay`, tracking overlap between asks.
    struct SlowHuman {
        asked: AtomicUsize,
        showing: AtomicUsize,
        most_at_once: AtomicUsize,
        delay: Duration,
    }

    impl SlowHuman {
        fn channel(delay: Duration) -> (Arc<TerminalPromptChannel>, Arc<SlowHuman>) {
            let human = Arc::new(SlowHuman {
                asked: AtomicUsize::new(0),
                showing: AtomicUsize::new(0),
                most_at_once: AtomicUsize::new(0),
                delay,
            });
            let asking = human.clone();
            let channel = TerminalPromptChannel::with_asker(Arc::new(
                move |_request: &PromptRequest, _choices: &[Choice]| -> Result<Option<usize>, PromptError> {
                    asking.asked.fetch_add(1, Ordering::SeqCst);
                    let now = asking.showing.fetch_add(1, Ordering::SeqCst) + 1;
                    asking.most_at_once.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(asking.delay);
                    asking.showing.fetch_sub(1, Ordering::SeqCst);
                    Ok(Some(0))
                },
            ));
            (Arc::new(channel), human)
        }
    }

    #[tokio::test]
    async fn answered_prompt_maps_choice() {
        let (channel, human) = SlowHuman::channel(Duration::from_millis(1));
        let outcome = channel.open(request()).await.unwrap();
        assert_eq!(outcome, PromptOutcome::Answered(PromptResolution::once(true)));
        assert_eq!(human.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prompt_left_behind_keeps_the_terminal_until_answered() {
        let (channel, human) = SlowHuman::channel(Duration::from_millis(150));

        let first = channel.clone();
        let stale = tokio::spawn(async move { first.open(request()).await });
        while human.asked.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stale.abort();
        let _ = stale.await;

        let outcome = channel.open(request()).await.unwrap();
        assert_eq!(outcome, PromptOutcome::Answered(PromptResolution::once(true)));
        assert_eq!(human.asked.load(Ordering::SeqCst), 2);
        assert_eq!(human.most_at_once.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_gone_before_its_turn_is_never_shown() {
        let (channel, human) = SlowHuman::channel(Duration::from_millis(150));

        let first = channel.clone();
        let showing = tokio::spawn(async move { first.open(request()).await });
        while human.asked.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = channel.clone();
        let waiting = tokio::spawn(async move { second.open(request()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiting.abort();
        let _ = waiting.await;

        assert!(showing.await.unwrap().is_ok());
        assert_eq!(human.asked.load(Ordering::SeqCst), 1);
    }
}
