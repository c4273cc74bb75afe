//! The SoundFx service: one engine instance with an explicit lifecycle.
//!
//! [`SoundFx::init`] decides whether the engine runs at all for this page
//! view. A dormant instance answers every public call as a harmless no-op;
//! an active one owns the audio engine, the rule engines and the widgets
//! until [`SoundFx::destroy`].

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use novasound_shared::{DisabledReason, Environment, FeedError, RuleError, SiteConfig, UserPreferences};

use crate::audio::{AudioBackend, AudioEngine, PlayOptions, PlayOutcome, SkipReason};
use crate::consent::{ConsentController, ConsentState};
use crate::feeds::FeedSource;
use crate::options::EngineOptions;
use crate::page::{ListenerKey, PageHost};
use crate::playback::{PlayRequest, Playback, TriggerSource};
use crate::preferences::{PreferenceStore, SaveOutcome, SubscriptionId};
use crate::runtime::Runtime;
use crate::selector_rules::SelectorRuleEngine;
use crate::storage::PreferenceBackend;
use crate::transitions::TransitionRuleEngine;
use crate::widget::{WidgetActions, Widgets, SAVED_MESSAGE};

/// The platform pieces a [`SoundFx`] runs on.
pub struct Hosts<P: PageHost, B: AudioBackend> {
    pub page: Rc<P>,
    /// Called only if the engine activates, so a dormant page never creates
    /// an audio context.
    pub audio: Box<dyn FnOnce() -> B>,
    pub runtime: Rc<dyn Runtime>,
    pub primary: Box<dyn PreferenceBackend>,
    pub fallback: Option<Box<dyn PreferenceBackend>>,
    pub feeds: Box<dyn FeedSource>,
    pub environment: Environment,
}

/// What a feed (re)load did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReloadReport {
    pub selector_rules: usize,
    pub elements: usize,
    pub transition_rules: usize,
    pub skipped: Vec<RuleError>,
}

struct Engine<P: PageHost, B: AudioBackend> {
    this: Weak<Self>,
    config: SiteConfig,
    options: EngineOptions,
    page: Rc<P>,
    prefs: Rc<PreferenceStore>,
    audio: Rc<AudioEngine<B>>,
    consent: Rc<ConsentController<P, B>>,
    playback: Rc<Playback<P, B>>,
    selectors: SelectorRuleEngine<P, B>,
    transitions: Rc<TransitionRuleEngine<P, B>>,
    widgets: Rc<Widgets<P>>,
    feeds: Box<dyn FeedSource>,
    sound_urls: RefCell<Vec<String>>,
    observer: Cell<Option<ListenerKey>>,
    subscription: Cell<Option<SubscriptionId>>,
    destroyed: Cell<bool>,
}

impl<P: PageHost, B: AudioBackend> Engine<P, B> {
    fn build(
        config: SiteConfig,
        options: EngineOptions,
        page: Rc<P>,
        backend: B,
        runtime: Rc<dyn Runtime>,
        feeds: Box<dyn FeedSource>,
        prefs: Rc<PreferenceStore>,
    ) -> Rc<Self> {
        let current = prefs.current();
        let audio = Rc::new(AudioEngine::with_cache_capacity(
            backend,
            current.volume,
            current.muted,
            options.cache_capacity,
        ));
        let consent = ConsentController::new(
            Rc::clone(&page),
            Rc::clone(&audio),
            Rc::clone(&prefs),
            Rc::clone(&runtime),
            config.require_consent,
            &options,
        );
        let playback = Rc::new(Playback::new(
            Rc::clone(&page),
            Rc::clone(&audio),
            Rc::clone(&consent),
            Rc::clone(&runtime),
            config.show_visual_feedback,
            &options,
        ));
        let selectors = SelectorRuleEngine::new(Rc::clone(&page), Rc::clone(&playback));
        let transitions = TransitionRuleEngine::new(Rc::clone(&page), Rc::clone(&playback), &options);

        Rc::new_cyclic(|this: &Weak<Self>| {
            let actions: Weak<dyn WidgetActions> = this.clone();
            let widgets = Widgets::new(Rc::clone(&page), actions, runtime, &options);
            Self {
                this: this.clone(),
                config,
                options,
                page,
                prefs,
                audio,
                consent,
                playback,
                selectors,
                transitions,
                widgets,
                feeds,
                sound_urls: RefCell::new(Vec::new()),
                observer: Cell::new(None),
                subscription: Cell::new(None),
                destroyed: Cell::new(false),
            }
        })
    }

    fn start(&self) {
        self.consent.start();
        let widgets = self.widgets.attach_all();
        crate::log_debug!("Attached {} control widgets", widgets);

        let weak = Rc::downgrade(&self.widgets);
        let subscription = self.prefs.subscribe(Rc::new(move |_: &UserPreferences| {
            if let Some(widgets) = weak.upgrade() {
                widgets.sync_all();
            }
        }));
        self.subscription.set(Some(subscription));

        let weak = self.this.clone();
        let observer = self.page.observe_insertions(Rc::new(move |nodes: &[P::Node]| {
            if let Some(this) = weak.upgrade() {
                this.selectors.attach_to(nodes);
                this.widgets.attach_to(nodes);
            }
        }));
        self.observer.set(Some(observer));

        let weak = self.this.clone();
        self.playback.runtime().spawn(Box::pin(async move {
            let Some(this) = weak.upgrade() else {
                return;
            };
            if let Err(e) = this.reload().await {
                crate::log_error!("Failed to load sound rules: {}", e);
            }
            if this.destroyed.get() {
                return;
            }
            this.transitions.install();

            if this.config.preload_sounds {
                let urls = this.sound_urls.borrow().clone();
                this.audio.preload(&urls, this.options.preload_count).await;
            }
        }));
    }

    async fn reload(&self) -> Result<ReloadReport, FeedError> {
        let feeds = self.feeds.fetch().await?;
        if self.destroyed.get() {
            return Ok(ReloadReport::default());
        }

        let (resolved, mut skipped) = feeds.resolve();
        for e in &skipped {
            crate::log_warn!("Skipping rule: {}", e);
        }

        let bound = self.selectors.rebind(&resolved.selectors);
        let invalid_patterns = self.transitions.load(&resolved.transitions);
        let transition_rules = resolved.transitions.len() - invalid_patterns.len();
        skipped.extend(bound.skipped);
        skipped.extend(invalid_patterns);
        *self.sound_urls.borrow_mut() = resolved.sound_urls;

        let report = ReloadReport {
            selector_rules: bound.rules,
            elements: bound.elements,
            transition_rules,
            skipped,
        };
        crate::log_info!(
            "Loaded {} selector rules on {} elements and {} transition rules",
            report.selector_rules,
            report.elements,
            report.transition_rules
        );
        Ok(report)
    }

    fn set_volume(&self, volume: i32) -> u8 {
        let volume = self.audio.set_master_volume(volume);
        self.prefs.update(|p| p.volume = volume);
        self.widgets.sync_all();
        volume
    }

    fn set_muted(&self, muted: bool) {
        if muted {
            self.audio.mute();
        } else {
            self.audio.unmute();
        }
        self.prefs.update(|p| p.muted = muted);
        self.widgets.sync_all();
    }

    fn save(&self) -> SaveOutcome {
        let outcome = self.prefs.save();
        self.widgets.notify(SAVED_MESSAGE);
        outcome
    }

    fn destroy(&self) {
        self.destroyed.set(true);
        self.selectors.unbind_all();
        self.transitions.uninstall();
        self.widgets.detach_all();
        self.consent.destroy();
        if let Some(key) = self.observer.take() {
            self.page.unlisten(key);
        }
        if let Some(id) = self.subscription.take() {
            self.prefs.unsubscribe(id);
        }
        self.audio.close();
        crate::log_info!("Sound engine stopped");
    }
}

impl<P: PageHost, B: AudioBackend> WidgetActions for Engine<P, B> {
    fn preferences(&self) -> UserPreferences {
        self.prefs.current()
    }

    fn consent_granted(&self) -> bool {
        self.consent.permits_playback()
    }

    fn toggle_mute(&self) {
        if self.consent.promote_from_widget() {
            return;
        }
        self.set_muted(!self.audio.is_muted());
    }

    fn preview_volume(&self, volume: i32) {
        self.set_volume(volume);
    }

    fn commit_volume(&self, volume: i32) {
        self.set_volume(volume);
        self.prefs.save();
    }

    fn save_preferences(&self) -> SaveOutcome {
        self.save()
    }
}

/// The public sound service.
pub struct SoundFx<P: PageHost, B: AudioBackend> {
    engine: RefCell<Option<Rc<Engine<P, B>>>>,
    prefs: Rc<PreferenceStore>,
    disabled: Option<DisabledReason>,
}

impl<P: PageHost, B: AudioBackend> SoundFx<P, B> {
    /// Load preferences, decide activation and, if active, bind everything.
    pub fn init(config: SiteConfig, hosts: Hosts<P, B>, options: EngineOptions) -> Self {
        let Hosts {
            page,
            audio,
            runtime,
            primary,
            fallback,
            feeds,
            environment,
        } = hosts;

        let prefs = Rc::new(PreferenceStore::new(primary, fallback, config.default_preferences()));
        let current = prefs.load();

        if let Err(reason) = config.activation(&environment, &current) {
            crate::log_info!("Sound effects inactive: {}", reason);
            return Self {
                engine: RefCell::new(None),
                prefs,
                disabled: Some(reason),
            };
        }

        let engine = Engine::build(
            config,
            options,
            page,
            audio(),
            runtime,
            feeds,
            Rc::clone(&prefs),
        );
        engine.start();
        crate::log_info!(
            "Sound effects initialised (volume {}%, muted: {})",
            current.volume,
            current.muted
        );
        Self {
            engine: RefCell::new(Some(engine)),
            prefs,
            disabled: None,
        }
    }

    fn engine(&self) -> Option<Rc<Engine<P, B>>> {
        self.engine.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.engine.borrow().is_some()
    }

    /// Why the engine never started, if it didn't.
    pub fn disabled_reason(&self) -> Option<DisabledReason> {
        self.disabled
    }

    pub fn audio(&self) -> Option<Rc<AudioEngine<B>>> {
        self.engine().map(|e| Rc::clone(&e.audio))
    }

    // --- Public API ---

    /// Play `url` with sound-wave feedback, marking `element` if given.
    pub async fn play(&self, url: &str, options: PlayOptions, element: Option<P::Node>) -> PlayOutcome {
        let Some(engine) = self.engine() else {
            return PlayOutcome::Skipped(SkipReason::NotPermitted);
        };
        let request = PlayRequest::new(url, options, TriggerSource::Api).with_feedback(element);
        engine.playback.request(request).await
    }

    /// Set the master volume; out-of-range values are clamped. Not persisted.
    pub fn set_volume(&self, volume: i32) -> u8 {
        match self.engine() {
            Some(engine) => engine.set_volume(volume),
            None => self.prefs.current().volume,
        }
    }

    pub fn get_volume(&self) -> u8 {
        match self.engine() {
            Some(engine) => engine.audio.volume(),
            None => self.prefs.current().volume,
        }
    }

    pub fn mute(&self) {
        if let Some(engine) = self.engine() {
            engine.set_muted(true);
        }
    }

    pub fn unmute(&self) {
        if let Some(engine) = self.engine() {
            engine.set_muted(false);
        }
    }

    pub fn is_muted(&self) -> bool {
        match self.engine() {
            Some(engine) => engine.audio.is_muted(),
            None => self.prefs.current().muted,
        }
    }

    /// Persist volume and mute state and show the saved notification.
    pub fn save_preferences(&self) -> SaveOutcome {
        match self.engine() {
            Some(engine) => engine.save(),
            None => SaveOutcome::SessionOnly,
        }
    }

    /// Fetch the feeds again and rebind every rule.
    pub async fn reload(&self) -> Result<ReloadReport, FeedError> {
        match self.engine() {
            Some(engine) => engine.reload().await,
            None => Ok(ReloadReport::default()),
        }
    }

    // --- Consent ---

    pub fn consent_state(&self) -> Option<ConsentState> {
        self.engine().map(|e| e.consent.state())
    }

    pub fn grant_consent(&self) -> Option<ConsentState> {
        let engine = self.engine()?;
        let state = engine.consent.grant();
        engine.widgets.sync_all();
        Some(state)
    }

    pub fn deny_consent(&self) -> Option<ConsentState> {
        let engine = self.engine()?;
        let state = engine.consent.deny();
        engine.widgets.sync_all();
        Some(state)
    }

    pub fn reset_consent(&self) -> Option<ConsentState> {
        let engine = self.engine()?;
        let state = engine.consent.reset();
        engine.widgets.sync_all();
        Some(state)
    }

    /// Tear everything down. Later calls behave as if the engine never started.
    pub fn destroy(&self) {
        if let Some(engine) = self.engine.borrow_mut().take() {
            engine.destroy();
        }
    }
}
