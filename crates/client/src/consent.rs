//! Consent gate and the audio unlock lifecycle.
//!
//! ```text
//! Unset ──grant──▶ Granted(Locked) ──▶ Granted(Unlocking) ──▶ Granted(Unlocked)
//!   │                    ▲                    │
//!   └──deny──▶ Denied ───┘ (widget toggle)    └─ budget spent: back to Locked, prompt shown
//! ```
//!
//! Automatic unlock tries a silent buffer a few times; focus/visibility regain
//! and the next genuine gesture are armed as listeners alongside. The first
//! success disarms everything.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use novasound_shared::Consent;

use crate::audio::{AudioBackend, AudioEngine, UnlockTechnique};
use crate::options::EngineOptions;
use crate::page::{Decoration, GlobalTarget, ListenerKey, PageHost};
use crate::preferences::PreferenceStore;
use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocking,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentState {
    Unset,
    Denied,
    Granted(LockState),
}

impl ConsentState {
    pub fn is_granted(self) -> bool {
        matches!(self, ConsentState::Granted(_))
    }
}

const GESTURE_EVENTS: [&str; 3] = ["click", "touchstart", "keydown"];

pub struct ConsentController<P: PageHost, B: AudioBackend> {
    this: Weak<Self>,
    page: Rc<P>,
    audio: Rc<AudioEngine<B>>,
    prefs: Rc<PreferenceStore>,
    runtime: Rc<dyn Runtime>,
    require_consent: bool,
    attempts: u32,
    spacing_ms: u32,
    state: Cell<ConsentState>,
    armed: RefCell<Vec<ListenerKey>>,
    prompt: RefCell<Option<(P::Node, ListenerKey)>>,
    /// Bumped whenever a running attempt loop must stop.
    generation: Cell<u64>,
}

impl<P: PageHost, B: AudioBackend> ConsentController<P, B> {
    pub fn new(
        page: Rc<P>,
        audio: Rc<AudioEngine<B>>,
        prefs: Rc<PreferenceStore>,
        runtime: Rc<dyn Runtime>,
        require_consent: bool,
        options: &EngineOptions,
    ) -> Rc<Self> {
        let initial = Self::initial_state(prefs.current().consent, require_consent);
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            page,
            audio,
            prefs,
            runtime,
            require_consent,
            attempts: options.unlock_attempts.max(1),
            spacing_ms: options.unlock_spacing_ms,
            state: Cell::new(initial),
            armed: RefCell::new(Vec::new()),
            prompt: RefCell::new(None),
            generation: Cell::new(0),
        })
    }

    fn initial_state(consent: Consent, require_consent: bool) -> ConsentState {
        match consent {
            Consent::Granted => ConsentState::Granted(LockState::Locked),
            Consent::Denied => ConsentState::Denied,
            Consent::Unset if !require_consent => ConsentState::Granted(LockState::Locked),
            Consent::Unset => ConsentState::Unset,
        }
    }

    pub fn state(&self) -> ConsentState {
        self.state.get()
    }

    pub fn permits_playback(&self) -> bool {
        self.state.get().is_granted()
    }

    /// Kick off unlocking if consent is already granted.
    pub fn start(&self) {
        self.begin_unlock();
    }

    /// Record consent and start unlocking right away.
    pub fn grant(&self) -> ConsentState {
        if !self.state.get().is_granted() {
            self.state.set(ConsentState::Granted(LockState::Locked));
            crate::log_info!("Sound consent granted");
        }
        self.persist(Consent::Granted);
        self.begin_unlock();
        self.state.get()
    }

    pub fn deny(&self) -> ConsentState {
        self.disarm();
        self.state.set(ConsentState::Denied);
        crate::log_info!("Sound consent denied");
        self.persist(Consent::Denied);
        self.state.get()
    }

    /// Forget the stored choice.
    pub fn reset(&self) -> ConsentState {
        self.disarm();
        self.state
            .set(Self::initial_state(Consent::Unset, self.require_consent));
        self.persist(Consent::Unset);
        self.begin_unlock();
        self.state.get()
    }

    /// The widget's toggle: grants consent when it isn't granted yet.
    ///
    /// Returns `true` if the click was consumed by the promotion.
    pub fn promote_from_widget(&self) -> bool {
        if self.state.get().is_granted() {
            return false;
        }
        self.grant();
        true
    }

    /// Saving notifies preference subscribers, so the state must already be final.
    fn persist(&self, consent: Consent) {
        if self.prefs.current().consent == consent {
            return;
        }
        self.prefs.update(|p| p.consent = consent);
        self.prefs.save();
    }

    // --- Unlocking ---

    /// Run the unlock protocol if consent is granted and audio is still locked.
    pub fn begin_unlock(&self) {
        if self.state.get() != ConsentState::Granted(LockState::Locked) {
            return;
        }
        if self.audio.is_unlocked() {
            self.state.set(ConsentState::Granted(LockState::Unlocked));
            return;
        }

        self.state.set(ConsentState::Granted(LockState::Unlocking));
        self.arm();

        let generation = self.generation.get();
        let weak = self.this.clone();
        let runtime = Rc::clone(&self.runtime);
        let attempts = self.attempts;
        let spacing = self.spacing_ms;

        self.runtime.spawn(Box::pin(async move {
            for attempt in 0..attempts {
                if attempt > 0 {
                    runtime.sleep(spacing).await;
                }
                let Some(this) = weak.upgrade() else {
                    return;
                };
                if !this.is_current(generation) {
                    return;
                }
                if this.audio.attempt_unlock(UnlockTechnique::SilentBuffer).await {
                    this.on_unlocked();
                    return;
                }
            }

            if let Some(this) = weak.upgrade() {
                if this.is_current(generation) {
                    crate::log_info!("Audio is locked; waiting for a tap or key press");
                    this.state.set(ConsentState::Granted(LockState::Locked));
                    this.show_prompt();
                }
            }
        }));
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.get() == generation
            && matches!(self.state.get(), ConsentState::Granted(LockState::Unlocking))
    }

    /// One event-driven attempt with `technique`.
    fn try_technique(&self, technique: UnlockTechnique) {
        if !matches!(
            self.state.get(),
            ConsentState::Granted(LockState::Locked | LockState::Unlocking)
        ) {
            return;
        }
        let weak = self.this.clone();
        self.runtime.spawn(Box::pin(async move {
            let Some(this) = weak.upgrade() else {
                return;
            };
            if this.audio.attempt_unlock(technique).await {
                this.on_unlocked();
            }
        }));
    }

    fn arm(&self) {
        if !self.armed.borrow().is_empty() {
            return;
        }
        let mut keys = Vec::new();

        for (target, event) in [
            (GlobalTarget::Document, "visibilitychange"),
            (GlobalTarget::Window, "focus"),
        ] {
            let weak = self.this.clone();
            keys.push(self.page.listen_global(
                target,
                event,
                Rc::new(move || {
                    if let Some(this) = weak.upgrade() {
                        this.try_technique(UnlockTechnique::FocusResume);
                    }
                }),
            ));
        }

        for event in GESTURE_EVENTS {
            let weak = self.this.clone();
            keys.push(self.page.listen_global(
                GlobalTarget::Document,
                event,
                Rc::new(move || {
                    if let Some(this) = weak.upgrade() {
                        this.try_technique(UnlockTechnique::GestureResume);
                    }
                }),
            ));
        }

        *self.armed.borrow_mut() = keys;
    }

    fn show_prompt(&self) {
        if let Some((node, _)) = self.prompt.borrow().as_ref() {
            self.page.set_visible(node, true);
            return;
        }
        let Some(node) = self.page.decoration(Decoration::UnlockPrompt) else {
            return;
        };
        let weak = self.this.clone();
        let key = self.page.listen(
            &node,
            "click",
            Rc::new(move |_: &P::Node| {
                if let Some(this) = weak.upgrade() {
                    this.try_technique(UnlockTechnique::GestureResume);
                }
            }),
        );
        self.page.set_visible(&node, true);
        *self.prompt.borrow_mut() = Some((node, key));
    }

    fn on_unlocked(&self) {
        if !self.state.get().is_granted() {
            return;
        }
        self.state.set(ConsentState::Granted(LockState::Unlocked));
        self.disarm();
    }

    /// Remove every unlock listener and hide the prompt.
    fn disarm(&self) {
        self.generation.set(self.generation.get() + 1);
        for key in self.armed.borrow_mut().drain(..) {
            self.page.unlisten(key);
        }
        if let Some((node, key)) = self.prompt.borrow_mut().take() {
            self.page.unlisten(key);
            self.page.set_visible(&node, false);
        }
    }

    pub fn destroy(&self) {
        self.disarm();
    }
}
