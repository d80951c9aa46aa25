//! Seams to the presentation and animation layers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::net::protocol::PeerId;

/// Named animation triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationCue {
    Run(bool),
    Punch,
    Throw,
    Die,
}

/// Fire-and-forget animation trigger sink
pub trait AnimationSink: Send + Sync {
    fn fire(&self, cue: AnimationCue);
}

/// Purely reactive presentation layer
pub trait Presentation: Send + Sync {
    fn show_timer(&self, text: &str);
    fn show_lives(&self, lives: u32);
    fn show_round_complete(&self, completed_round: u32);
    fn hide_round_complete(&self);
    fn show_win(&self, winner_name: &str);
    fn show_loss(&self, winner_name: &str);
    fn show_no_winner(&self);
    fn show_defeated(&self);
    fn hide_defeated(&self);
}

/// Gates the one-time global loss screen for one client
#[derive(Debug, Default)]
pub struct LoserGate {
    global_active: AtomicBool,
}

impl LoserGate {
    /// Returns true on the first activation only
    pub fn activate(&self) -> bool {
        !self.global_active.swap(true, Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.global_active.load(Ordering::SeqCst)
    }
}

/// Everything a peer session needs from its hosting client
#[derive(Clone)]
pub struct SessionContext {
    pub presentation: Arc<dyn Presentation>,
    pub animation: Arc<dyn AnimationSink>,
    pub loser_gate: Arc<LoserGate>,
}

impl SessionContext {
    pub fn new(presentation: Arc<dyn Presentation>, animation: Arc<dyn AnimationSink>) -> Self {
        Self {
            presentation,
            animation,
            loser_gate: Arc::new(LoserGate::default()),
        }
    }

    /// Context that renders everything as log lines
    pub fn logging(peer_label: &str) -> Self {
        let sink = Arc::new(TracingPresentation {
            label: peer_label.to_string(),
        });
        Self::new(sink.clone(), sink)
    }

    /// Local defeat panel, unless the global loss screen already took over
    pub fn show_local_defeat(&self) {
        if !self.loser_gate.is_active() {
            self.presentation.show_defeated();
        }
    }

    /// Global loss screen, hiding any local defeat panel
    pub fn show_global_loss(&self, winner_name: &str) {
        self.loser_gate.activate();
        self.presentation.hide_defeated();
        self.presentation.show_loss(winner_name);
    }
}

/// Presentation and animation rendered through tracing
pub struct TracingPresentation {
    label: String,
}

impl Presentation for TracingPresentation {
    fn show_timer(&self, text: &str) {
        tracing::debug!(client = %self.label, timer = %text, "Timer");
    }

    fn show_lives(&self, lives: u32) {
        info!(client = %self.label, lives, "Lives");
    }

    fn show_round_complete(&self, completed_round: u32) {
        info!(
            client = %self.label,
            "Round {} complete! Round {} starting...",
            completed_round,
            completed_round + 1
        );
    }

    fn hide_round_complete(&self) {
        info!(client = %self.label, "Round resumed");
    }

    fn show_win(&self, winner_name: &str) {
        info!(client = %self.label, "You Win, {}!", winner_name);
    }

    fn show_loss(&self, winner_name: &str) {
        info!(client = %self.label, "You Lost. Winner: {}!", winner_name);
    }

    fn show_no_winner(&self) {
        info!(client = %self.label, "Game Over! No winner this time.");
    }

    fn show_defeated(&self) {
        info!(client = %self.label, "Lives: 0 - Game Over");
    }

    fn hide_defeated(&self) {}
}

impl AnimationSink for TracingPresentation {
    fn fire(&self, cue: AnimationCue) {
        tracing::trace!(client = %self.label, ?cue, "Animation cue");
    }
}

/// Label for log lines of a peer's client
pub fn client_label(peer: PeerId, display_name: &str) -> String {
    format!("{}({})", display_name, peer)
}

#[cfg(test)]
pub mod recording {
    //! Presentation double that records every call

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Shown {
        Timer(String),
        Lives(u32),
        RoundComplete(u32),
        RoundResumed,
        Win(String),
        Loss(String),
        NoWinner,
        Defeated,
        DefeatedHidden,
        Cue(AnimationCue),
    }

    #[derive(Default)]
    pub struct Recorder {
        shown: Mutex<Vec<Shown>>,
    }

    impl Recorder {
        pub fn shown(&self) -> Vec<Shown> {
            self.shown.lock().clone()
        }

        pub fn count(&self, pred: impl Fn(&Shown) -> bool) -> usize {
            self.shown.lock().iter().filter(|s| pred(s)).count()
        }

        fn push(&self, s: Shown) {
            self.shown.lock().push(s);
        }
    }

    impl Presentation for Recorder {
        fn show_timer(&self, text: &str) {
            self.push(Shown::Timer(text.to_string()));
        }
        fn show_lives(&self, lives: u32) {
            self.push(Shown::Lives(lives));
        }
        fn show_round_complete(&self, completed_round: u32) {
            self.push(Shown::RoundComplete(completed_round));
        }
        fn hide_round_complete(&self) {
            self.push(Shown::RoundResumed);
        }
        fn show_win(&self, winner_name: &str) {
            self.push(Shown::Win(winner_name.to_string()));
        }
        fn show_loss(&self, winner_name: &str) {
            self.push(Shown::Loss(winner_name.to_string()));
        }
        fn show_no_winner(&self) {
            self.push(Shown::NoWinner);
        }
        fn show_defeated(&self) {
            self.push(Shown::Defeated);
        }
        fn hide_defeated(&self) {
            self.push(Shown::DefeatedHidden);
        }
    }

    impl AnimationSink for Recorder {
        fn fire(&self, cue: AnimationCue) {
            self.push(Shown::Cue(cue));
        }
    }

    pub fn context() -> (SessionContext, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (SessionContext::new(recorder.clone(), recorder.clone()), recorder)
    }
}

#[cfg(test)]
mod tests {
    use super::recording::{context, Shown};

    #[test]
    fn gate_opens_once() {
        let (ctx, _) = context();
        assert!(ctx.loser_gate.activate());
        assert!(!ctx.loser_gate.activate());
    }

    #[test]
    fn local_defeat_suppressed_after_global_loss() {
        let (ctx, rec) = context();
        ctx.show_global_loss("Bo");
        ctx.show_local_defeat();

        assert_eq!(rec.shown(), vec![Shown::DefeatedHidden, Shown::Loss("Bo".into())]);
    }

    #[test]
    fn global_loss_hides_earlier_local_defeat() {
        let (ctx, rec) = context();
        ctx.show_local_defeat();
        ctx.show_global_loss("Bo");

        assert_eq!(
            rec.shown(),
            vec![Shown::Defeated, Shown::DefeatedHidden, Shown::Loss("Bo".into())]
        );
    }
}
