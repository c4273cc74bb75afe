//! Page entry and exit sounds chosen by URL pattern and priority.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use novasound_shared::{Direction, Resolved, RuleError, TransitionRule, UrlPattern};

use crate::audio::{AudioBackend, PlayOptions};
use crate::options::EngineOptions;
use crate::page::{match_target, same_document, same_origin, Decoration, GlobalTarget, LinkAction, ListenerKey, PageHost};
use crate::playback::{PlayRequest, Playback, TriggerSource};
use crate::runtime::defer;

const OVERLAY_ACTIVE_CLASS: &str = "active";

struct CompiledTransition {
    resolved: Resolved<TransitionRule>,
    pattern: UrlPattern,
}

/// Transition rules ordered by descending priority, patterns compiled.
#[derive(Default)]
pub struct TransitionTable {
    rules: Vec<CompiledTransition>,
}

impl TransitionTable {
    /// Compile every pattern. Rules with an invalid pattern are left out.
    pub fn compile(rules: &[Resolved<TransitionRule>]) -> (Self, Vec<RuleError>) {
        let mut errors = Vec::new();
        let mut compiled = Vec::with_capacity(rules.len());

        for resolved in rules {
            match UrlPattern::compile(&resolved.rule.url_pattern) {
                Ok(pattern) => compiled.push(CompiledTransition {
                    resolved: resolved.clone(),
                    pattern,
                }),
                Err(e) => errors.push(RuleError::InvalidPattern {
                    rule_id: resolved.rule.id.clone(),
                    pattern: resolved.rule.url_pattern.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        // Stable: equal priorities keep feed order.
        compiled.sort_by(|a, b| b.resolved.rule.priority.cmp(&a.resolved.rule.priority));
        (Self { rules: compiled }, errors)
    }

    /// Highest-priority rule for `direction` whose pattern matches `path`.
    pub fn select(&self, direction: Direction, path: &str) -> Option<&Resolved<TransitionRule>> {
        self.rules
            .iter()
            .filter(|c| c.resolved.rule.transition_type.applies_to(direction))
            .find(|c| c.pattern.matches(path))
            .map(|c| &c.resolved)
    }

    pub fn match_entry(&self, path: &str) -> Option<&Resolved<TransitionRule>> {
        self.select(Direction::Entry, path)
    }

    pub fn match_exit(&self, path: &str) -> Option<&Resolved<TransitionRule>> {
        self.select(Direction::Exit, path)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub struct TransitionRuleEngine<P: PageHost, B: AudioBackend> {
    this: Weak<Self>,
    page: Rc<P>,
    playback: Rc<Playback<P, B>>,
    table: RefCell<TransitionTable>,
    keys: RefCell<Vec<ListenerKey>>,
    /// A delayed exit navigation is underway.
    pending: Cell<bool>,
    /// Bumped on uninstall to cancel everything scheduled.
    generation: Cell<u64>,
    /// Bumped to cancel a scheduled navigation only.
    navigation: Cell<u64>,
    entry_delay_ms: u32,
    exit_delay_ms: u32,
}

impl<P: PageHost, B: AudioBackend> TransitionRuleEngine<P, B> {
    pub fn new(page: Rc<P>, playback: Rc<Playback<P, B>>, options: &EngineOptions) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            page,
            playback,
            table: RefCell::new(TransitionTable::default()),
            keys: RefCell::new(Vec::new()),
            pending: Cell::new(false),
            generation: Cell::new(0),
            navigation: Cell::new(0),
            entry_delay_ms: options.entry_delay_ms,
            exit_delay_ms: options.exit_delay_ms,
        })
    }

    /// Replace the rule set.
    pub fn load(&self, rules: &[Resolved<TransitionRule>]) -> Vec<RuleError> {
        let (table, errors) = TransitionTable::compile(rules);
        for e in &errors {
            crate::log_warn!("Skipping rule: {}", e);
        }
        crate::log_debug!("Loaded {} transition rules", table.len());
        *self.table.borrow_mut() = table;
        errors
    }

    fn current_path(&self) -> String {
        match_target(&self.page.location())
    }

    pub fn match_entry(&self, path: &str) -> Option<Resolved<TransitionRule>> {
        self.table.borrow().match_entry(path).cloned()
    }

    pub fn match_exit(&self, path: &str) -> Option<Resolved<TransitionRule>> {
        self.table.borrow().match_exit(path).cloned()
    }

    pub fn is_navigation_pending(&self) -> bool {
        self.pending.get()
    }

    /// Schedule the entry sound and start intercepting navigation.
    pub fn install(&self) {
        if !self.keys.borrow().is_empty() {
            return;
        }
        let generation = self.generation.get();
        let weak = self.this.clone();
        defer(self.playback.runtime(), self.entry_delay_ms, move || {
            if let Some(this) = weak.upgrade() {
                if this.generation.get() == generation {
                    this.play_entry();
                }
            }
        });

        let mut keys = Vec::with_capacity(3);
        let weak = self.this.clone();
        keys.push(self.page.intercept_links(Rc::new(move |href: &str| {
            match weak.upgrade() {
                Some(this) => this.on_link_click(href),
                None => LinkAction::Proceed,
            }
        })));

        let weak = self.this.clone();
        keys.push(self.page.listen_global(
            GlobalTarget::Window,
            "beforeunload",
            Rc::new(move || {
                if let Some(this) = weak.upgrade() {
                    this.on_unload();
                }
            }),
        ));

        let weak = self.this.clone();
        keys.push(self.page.observe_restore(Rc::new(move || {
            if let Some(this) = weak.upgrade() {
                this.on_restore();
            }
        })));
        *self.keys.borrow_mut() = keys;
    }

    pub fn play_entry(&self) {
        let Some(rule) = self.match_entry(&self.current_path()) else {
            return;
        };
        self.playback.trigger(request(&rule));
    }

    /// Decide what happens to a same-page link click.
    pub fn on_link_click(&self, href: &str) -> LinkAction {
        if self.pending.get() {
            return LinkAction::Suppress;
        }
        let location = self.page.location();
        // A fragment jump never unloads the page, so nothing would clear `pending`.
        if !same_origin(&location, href) || same_document(&location, href) {
            return LinkAction::Proceed;
        }
        // Only hold navigation back for a sound that can actually play.
        if !self.playback.consent().permits_playback() || self.playback.audio().is_muted() {
            return LinkAction::Proceed;
        }
        let Some(rule) = self.match_exit(&match_target(&location)) else {
            return LinkAction::Proceed;
        };

        self.pending.set(true);
        self.set_overlay(true);
        self.playback.trigger(request(&rule));

        let scheduled = (self.generation.get(), self.navigation.get());
        let weak = self.this.clone();
        let target = href.to_string();
        defer(self.playback.runtime(), self.exit_delay_ms, move || {
            if let Some(this) = weak.upgrade() {
                let current = (this.generation.get(), this.navigation.get());
                if current == scheduled && this.pending.get() {
                    this.page.navigate(&target);
                }
            }
        });
        LinkAction::Suppress
    }

    /// Best-effort exit sound on tab close; never delays anything.
    pub fn on_unload(&self) {
        if self.pending.get() {
            return;
        }
        if let Some(rule) = self.match_exit(&self.current_path()) {
            self.playback.trigger(request(&rule));
        }
    }

    /// Back-forward cache restore: the old navigation is history.
    pub fn on_restore(&self) {
        self.navigation.set(self.navigation.get() + 1);
        self.pending.set(false);
        self.set_overlay(false);
    }

    fn set_overlay(&self, active: bool) {
        if active {
            if let Some(overlay) = self.page.decoration(Decoration::TransitionOverlay) {
                self.page.add_class(&overlay, OVERLAY_ACTIVE_CLASS);
            }
        } else {
            let selector = format!(".{}", Decoration::TransitionOverlay.class_name());
            for overlay in self.page.query_all(&selector) {
                self.page.remove_class(&overlay, OVERLAY_ACTIVE_CLASS);
            }
        }
    }

    pub fn uninstall(&self) {
        self.generation.set(self.generation.get() + 1);
        for key in self.keys.borrow_mut().drain(..) {
            self.page.unlisten(key);
        }
    }
}

fn request<N>(rule: &Resolved<TransitionRule>) -> PlayRequest<N> {
    PlayRequest::new(
        rule.sound_url.clone(),
        PlayOptions::percent(rule.rule.volume),
        TriggerSource::Transition {
            rule_id: rule.rule.id.clone(),
        },
    )
}
