//! CSS-mapping rules: bind selector/event pairs on live elements.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use novasound_shared::{ClassIdSelector, EventKind, Resolved, RuleError, SelectorRule};

use crate::audio::{AudioBackend, PlayOptions};
use crate::page::{ListenerKey, PageHost};
use crate::playback::{PlayRequest, Playback, TriggerSource};

/// Marker class on every bound element.
pub const ACTIVE_MARKER: &str = "nova-sound-fx-active";
/// Attribute naming the bound event kind.
pub const EVENT_ATTRIBUTE: &str = "data-nova-sound-event";
pub const SPEAKER_ICON_CLASS: &str = "nova-has-speaker-icon";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BindReport {
    pub rules: usize,
    pub elements: usize,
    pub skipped: Vec<RuleError>,
}

struct CompiledRule {
    rule: SelectorRule,
    sound_url: String,
    selector: String,
    trigger: Vec<String>,
    release: Vec<String>,
}

/// One element wired to one rule.
struct Binding<N> {
    rule_id: String,
    element: N,
    keys: Vec<ListenerKey>,
    /// Set while an `active` press is held; dropped with the binding.
    held: Rc<Cell<bool>>,
}

pub struct SelectorRuleEngine<P: PageHost, B: AudioBackend> {
    page: Rc<P>,
    playback: Rc<Playback<P, B>>,
    rules: RefCell<Vec<Rc<CompiledRule>>>,
    bindings: RefCell<Vec<Binding<P::Node>>>,
}

impl<P: PageHost, B: AudioBackend> SelectorRuleEngine<P, B> {
    pub fn new(page: Rc<P>, playback: Rc<Playback<P, B>>) -> Self {
        Self {
            page,
            playback,
            rules: RefCell::new(Vec::new()),
            bindings: RefCell::new(Vec::new()),
        }
    }

    fn compile(resolved: &Resolved<SelectorRule>) -> Result<CompiledRule, RuleError> {
        let rule = &resolved.rule;
        let invalid = || RuleError::InvalidSelector {
            rule_id: rule.id.clone(),
            selector: rule.selector.clone(),
        };
        let selector = ClassIdSelector::parse(&rule.selector).ok_or_else(invalid)?;

        let trigger = rule.event_type.trigger_events();
        if trigger.iter().any(|e| e.trim().is_empty()) {
            return Err(invalid());
        }
        Ok(CompiledRule {
            rule: rule.clone(),
            sound_url: resolved.sound_url.clone(),
            selector: selector.to_string(),
            trigger,
            release: rule.event_type.release_events(),
        })
    }

    /// Bind `rules` to every matching element. Invalid rules are skipped.
    pub fn bind(&self, rules: &[Resolved<SelectorRule>]) -> BindReport {
        let mut report = BindReport::default();

        for resolved in rules {
            let compiled = match Self::compile(resolved) {
                Ok(compiled) => Rc::new(compiled),
                Err(e) => {
                    crate::log_warn!("Skipping rule: {}", e);
                    report.skipped.push(e);
                    continue;
                }
            };

            for element in self.page.query_all(&compiled.selector) {
                if self.attach(&compiled, &element) {
                    report.elements += 1;
                }
            }
            self.rules.borrow_mut().push(compiled);
            report.rules += 1;
        }

        crate::log_debug!(
            "Bound {} selector rules to {} elements ({} skipped)",
            report.rules,
            report.elements,
            report.skipped.len()
        );
        report
    }

    /// Bind the current rules to freshly inserted nodes and their descendants.
    pub fn attach_to(&self, nodes: &[P::Node]) -> usize {
        let rules: Vec<Rc<CompiledRule>> = self.rules.borrow().iter().cloned().collect();
        let mut attached = 0;
        for node in nodes {
            for rule in &rules {
                if self.page.matches(node, &rule.selector) && self.attach(rule, node) {
                    attached += 1;
                }
                for element in self.page.query_within(node, &rule.selector) {
                    if self.attach(rule, &element) {
                        attached += 1;
                    }
                }
            }
        }
        attached
    }

    /// Wire one element. Returns `false` if it was already bound to this rule.
    fn attach(&self, rule: &Rc<CompiledRule>, element: &P::Node) -> bool {
        let already = self
            .bindings
            .borrow()
            .iter()
            .any(|b| b.rule_id == rule.rule.id && &b.element == element);
        if already {
            return false;
        }

        let held = Rc::new(Cell::new(false));
        let mut keys = Vec::with_capacity(rule.trigger.len() + rule.release.len());

        for event in &rule.trigger {
            let playback = Rc::downgrade(&self.playback);
            let rule = Rc::clone(rule);
            let held = Rc::clone(&held);
            keys.push(self.page.listen(
                element,
                event,
                Rc::new(move |el: &P::Node| {
                    if rule.rule.event_type.is_held() {
                        if held.get() {
                            return;
                        }
                        held.set(true);
                    }
                    fire(&playback, &rule, el);
                }),
            ));
        }
        for event in &rule.release {
            let held = Rc::clone(&held);
            keys.push(self.page.listen(
                element,
                event,
                Rc::new(move |_: &P::Node| held.set(false)),
            ));
        }

        self.page.add_class(element, ACTIVE_MARKER);
        self.page
            .set_attribute(element, EVENT_ATTRIBUTE, rule.rule.event_type.as_str());
        if rule.rule.show_speaker_icon {
            self.page.add_class(element, SPEAKER_ICON_CLASS);
        }

        self.bindings.borrow_mut().push(Binding {
            rule_id: rule.rule.id.clone(),
            element: element.clone(),
            keys,
            held,
        });
        true
    }

    /// Remove every listener, marker and held guard, and forget the rules.
    pub fn unbind_all(&self) -> usize {
        let bindings = std::mem::take(&mut *self.bindings.borrow_mut());
        let count = bindings.len();
        for binding in bindings {
            for key in binding.keys {
                self.page.unlisten(key);
            }
            binding.held.set(false);
            self.page.remove_class(&binding.element, ACTIVE_MARKER);
            self.page.remove_class(&binding.element, SPEAKER_ICON_CLASS);
            self.page.remove_attribute(&binding.element, EVENT_ATTRIBUTE);
        }
        self.rules.borrow_mut().clear();
        count
    }

    pub fn rebind(&self, rules: &[Resolved<SelectorRule>]) -> BindReport {
        self.unbind_all();
        self.bind(rules)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.borrow().len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.borrow().len()
    }

    /// Event kinds currently bound, for diagnostics.
    pub fn bound_kinds(&self) -> Vec<EventKind> {
        self.rules
            .borrow()
            .iter()
            .map(|r| r.rule.event_type.clone())
            .collect()
    }
}

/// Each trigger schedules its own request; delays are never coalesced.
fn fire<P: PageHost, B: AudioBackend>(
    playback: &Weak<Playback<P, B>>,
    rule: &Rc<CompiledRule>,
    element: &P::Node,
) {
    let Some(playback) = playback.upgrade() else {
        return;
    };
    let mut request = PlayRequest::new(
        rule.sound_url.clone(),
        PlayOptions::percent(rule.rule.volume),
        TriggerSource::Selector {
            rule_id: rule.rule.id.clone(),
        },
    );
    if rule.rule.show_visual_effect {
        request = request.with_feedback(Some(element.clone()));
    }

    if rule.rule.delay_ms == 0 {
        playback.trigger(request);
        return;
    }
    let delay = playback.runtime().sleep(rule.rule.delay_ms);
    let weak = Rc::downgrade(&playback);
    playback.runtime().spawn(Box::pin(async move {
        delay.await;
        if let Some(playback) = weak.upgrade() {
            playback.request(request).await;
        }
    }));
}
