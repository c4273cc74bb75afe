//! The single path from a trigger to the speakers.
//!
//! Rule engines and the public API build a [`PlayRequest`]; [`Playback`]
//! checks consent, hands it to the [`AudioEngine`] and flashes the visual
//! feedback once something was audible.

use std::fmt;
use std::rc::Rc;

use crate::audio::{AudioBackend, AudioEngine, PlayOptions, PlayOutcome, SkipReason};
use crate::consent::ConsentController;
use crate::options::EngineOptions;
use crate::page::{Decoration, PageHost};
use crate::runtime::{defer, Runtime};

pub const PLAYING_CLASS: &str = "nova-sound-playing";
pub const WAVE_ACTIVE_CLASS: &str = "active";

/// Who asked for a sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSource {
    Api,
    Selector { rule_id: String },
    Transition { rule_id: String },
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Api => f.write_str("api"),
            TriggerSource::Selector { rule_id } => write!(f, "selector rule {}", rule_id),
            TriggerSource::Transition { rule_id } => write!(f, "transition rule {}", rule_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayRequest<N> {
    pub url: String,
    pub options: PlayOptions,
    pub source: TriggerSource,
    /// Element that gets the playing marker.
    pub element: Option<N>,
    /// Whether this request wants visual feedback at all.
    pub visual: bool,
}

impl<N> PlayRequest<N> {
    pub fn new(url: impl Into<String>, options: PlayOptions, source: TriggerSource) -> Self {
        Self {
            url: url.into(),
            options,
            source,
            element: None,
            visual: false,
        }
    }

    pub fn with_feedback(mut self, element: Option<N>) -> Self {
        self.element = element;
        self.visual = true;
        self
    }
}

pub struct Playback<P: PageHost, B: AudioBackend> {
    page: Rc<P>,
    audio: Rc<AudioEngine<B>>,
    consent: Rc<ConsentController<P, B>>,
    runtime: Rc<dyn Runtime>,
    show_visual_feedback: bool,
    element_effect_ms: u32,
    wave_effect_ms: u32,
}

impl<P: PageHost, B: AudioBackend> Playback<P, B> {
    pub fn new(
        page: Rc<P>,
        audio: Rc<AudioEngine<B>>,
        consent: Rc<ConsentController<P, B>>,
        runtime: Rc<dyn Runtime>,
        show_visual_feedback: bool,
        options: &EngineOptions,
    ) -> Self {
        Self {
            page,
            audio,
            consent,
            runtime,
            show_visual_feedback,
            element_effect_ms: options.element_effect_ms,
            wave_effect_ms: options.wave_effect_ms,
        }
    }

    pub fn audio(&self) -> &Rc<AudioEngine<B>> {
        &self.audio
    }

    pub fn consent(&self) -> &Rc<ConsentController<P, B>> {
        &self.consent
    }

    pub fn runtime(&self) -> &Rc<dyn Runtime> {
        &self.runtime
    }

    pub async fn request(&self, request: PlayRequest<P::Node>) -> PlayOutcome {
        if !self.consent.permits_playback() {
            crate::log_debug!("Sound from {} blocked: no consent", request.source);
            return PlayOutcome::Skipped(SkipReason::NotPermitted);
        }

        let outcome = self.audio.play(&request.url, request.options).await;
        if outcome.is_audible() && request.visual && self.show_visual_feedback {
            self.flash(request.element.as_ref());
        }
        outcome
    }

    /// Fire-and-forget variant of [`Playback::request`].
    pub fn trigger(self: &Rc<Self>, request: PlayRequest<P::Node>) {
        let this = Rc::clone(self);
        self.runtime.spawn(Box::pin(async move {
            this.request(request).await;
        }));
    }

    fn flash(&self, element: Option<&P::Node>) {
        if let Some(element) = element {
            self.page.add_class(element, PLAYING_CLASS);
            let page = Rc::clone(&self.page);
            let element = element.clone();
            defer(&self.runtime, self.element_effect_ms, move || {
                page.remove_class(&element, PLAYING_CLASS);
            });
        }

        if let Some(wave) = self.page.decoration(Decoration::SoundWave) {
            self.page.add_class(&wave, WAVE_ACTIVE_CLASS);
            let page = Rc::clone(&self.page);
            defer(&self.runtime, self.wave_effect_ms, move || {
                page.remove_class(&wave, WAVE_ACTIVE_CLASS);
            });
        }
    }
}
