//! The mute/volume/save control widgets.
//!
//! Any number of `.nova-sound-fx-controls` instances can exist (floating and
//! embedded); they all drive the same engine state through [`WidgetActions`]
//! and are re-synced together whenever preferences are saved.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use novasound_shared::UserPreferences;

use crate::options::EngineOptions;
use crate::page::{ListenerKey, PageHost};
use crate::preferences::SaveOutcome;
use crate::runtime::{defer, Runtime};

pub const WIDGET_SELECTOR: &str = ".nova-sound-fx-controls";
const MUTE_BUTTON: &str = ".nova-mute-btn";
const VOLUME_SLIDER: &str = ".nova-volume-slider";
const VOLUME_VALUE: &str = ".nova-volume-value";
const SAVE_BUTTON: &str = ".nova-save-btn";
const EXPAND_BUTTON: &str = ".nova-expand-btn";
const ICON_ON: &str = ".nova-icon-volume-on";
const ICON_OFF: &str = ".nova-icon-volume-off";
const NOTIFICATION: &str = ".nova-notification";
const NOTIFICATION_TEXT: &str = ".nova-notification-text";

pub const COLLAPSED_CLASS: &str = "nova-collapsed";
pub const ENTER_CLASS: &str = "nova-controls-enter";
pub const INERT_CLASS: &str = "nova-consent-inert";
const SHOW_CLASS: &str = "nova-show";

pub const SAVED_MESSAGE: &str = "Preferences saved!";

/// What a widget can ask of the engine.
pub trait WidgetActions {
    fn preferences(&self) -> UserPreferences;
    fn consent_granted(&self) -> bool;
    /// Mute toggle; grants consent instead when it isn't granted yet.
    fn toggle_mute(&self);
    /// Live gain change while the slider moves. Not persisted.
    fn preview_volume(&self, volume: i32);
    /// Slider released: apply and persist.
    fn commit_volume(&self, volume: i32);
    /// Persist, then announce the save (see [`Widgets::notify`]).
    fn save_preferences(&self) -> SaveOutcome;
}

struct Instance<N> {
    root: N,
    mute: Option<N>,
    slider: Option<N>,
    keys: Vec<ListenerKey>,
}

pub struct Widgets<P: PageHost> {
    this: Weak<Self>,
    page: Rc<P>,
    actions: Weak<dyn WidgetActions>,
    runtime: Rc<dyn Runtime>,
    notification_ms: u32,
    instances: RefCell<Vec<Instance<P::Node>>>,
}

impl<P: PageHost> Widgets<P> {
    pub fn new(
        page: Rc<P>,
        actions: Weak<dyn WidgetActions>,
        runtime: Rc<dyn Runtime>,
        options: &EngineOptions,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            page,
            actions,
            runtime,
            notification_ms: options.notification_ms,
            instances: RefCell::new(Vec::new()),
        })
    }

    fn first_within(&self, root: &P::Node, selector: &str) -> Option<P::Node> {
        self.page.query_within(root, selector).into_iter().next()
    }

    pub fn attach_all(&self) -> usize {
        self.page
            .query_all(WIDGET_SELECTOR)
            .iter()
            .filter(|root| self.attach(root))
            .count()
    }

    /// Attach to widgets among (or inside) freshly inserted nodes.
    pub fn attach_to(&self, nodes: &[P::Node]) -> usize {
        let mut attached = 0;
        for node in nodes {
            if self.page.matches(node, WIDGET_SELECTOR) && self.attach(node) {
                attached += 1;
            }
            for root in self.page.query_within(node, WIDGET_SELECTOR) {
                if self.attach(&root) {
                    attached += 1;
                }
            }
        }
        attached
    }

    /// Wire one widget. Returns `false` if it was already attached.
    pub fn attach(&self, root: &P::Node) -> bool {
        if self.instances.borrow().iter().any(|i| &i.root == root) {
            return false;
        }
        let Some(actions) = self.actions.upgrade() else {
            return false;
        };

        let mute = self.first_within(root, MUTE_BUTTON);
        let slider = self.first_within(root, VOLUME_SLIDER);
        let mut keys = Vec::new();

        if let Some(button) = &mute {
            let weak = self.this.clone();
            keys.push(self.page.listen(
                button,
                "click",
                Rc::new(move |_: &P::Node| {
                    let Some(this) = weak.upgrade() else { return };
                    if let Some(actions) = this.actions.upgrade() {
                        actions.toggle_mute();
                        this.sync_all();
                    }
                }),
            ));
        }

        if let Some(input) = &slider {
            let weak = self.this.clone();
            let widget = root.clone();
            keys.push(self.page.listen(
                input,
                "input",
                Rc::new(move |el: &P::Node| {
                    let Some(this) = weak.upgrade() else { return };
                    let Some(volume) = this.slider_value(el) else { return };
                    if let Some(actions) = this.actions.upgrade() {
                        actions.preview_volume(volume);
                    }
                    this.show_readout(&widget, volume.clamp(0, 100));
                }),
            ));

            let weak = self.this.clone();
            keys.push(self.page.listen(
                input,
                "change",
                Rc::new(move |el: &P::Node| {
                    let Some(this) = weak.upgrade() else { return };
                    let Some(volume) = this.slider_value(el) else { return };
                    if let Some(actions) = this.actions.upgrade() {
                        actions.commit_volume(volume);
                    }
                }),
            ));
        }

        if let Some(button) = self.first_within(root, SAVE_BUTTON) {
            let weak = self.this.clone();
            keys.push(self.page.listen(
                &button,
                "click",
                Rc::new(move |_: &P::Node| {
                    let Some(this) = weak.upgrade() else { return };
                    if let Some(actions) = this.actions.upgrade() {
                        actions.save_preferences();
                    }
                }),
            ));
        }

        if let Some(button) = self.first_within(root, EXPAND_BUTTON) {
            let page = Rc::downgrade(&self.page);
            let widget = root.clone();
            keys.push(self.page.listen(
                &button,
                "click",
                Rc::new(move |_: &P::Node| {
                    if let Some(page) = page.upgrade() {
                        page.toggle_class(&widget, COLLAPSED_CLASS);
                    }
                }),
            ));
            self.page.add_class(root, COLLAPSED_CLASS);
        }

        self.page.add_class(root, ENTER_CLASS);

        let instance = Instance {
            root: root.clone(),
            mute,
            slider,
            keys,
        };
        self.sync(&instance, &actions.preferences(), actions.consent_granted());
        self.instances.borrow_mut().push(instance);
        crate::log_debug!("Attached control widget");
        true
    }

    fn slider_value(&self, slider: &P::Node) -> Option<i32> {
        let raw = self.page.input_value(slider)?;
        raw.trim().parse::<f64>().ok().map(|v| v.round() as i32)
    }

    fn show_readout(&self, root: &P::Node, volume: i32) {
        for readout in self.page.query_within(root, VOLUME_VALUE) {
            self.page.set_text(&readout, &format!("{}%", volume));
        }
    }

    fn sync(&self, instance: &Instance<P::Node>, prefs: &UserPreferences, granted: bool) {
        if let Some(slider) = &instance.slider {
            self.page.set_input_value(slider, &prefs.volume.to_string());
        }
        self.show_readout(&instance.root, i32::from(prefs.volume));

        if let Some(button) = &instance.mute {
            for icon in self.page.query_within(button, ICON_ON) {
                self.page.set_visible(&icon, !prefs.muted);
            }
            for icon in self.page.query_within(button, ICON_OFF) {
                self.page.set_visible(&icon, prefs.muted);
            }
            let pressed = if prefs.muted { "true" } else { "false" };
            self.page.set_attribute(button, "aria-pressed", pressed);
        }

        if granted {
            self.page.remove_class(&instance.root, INERT_CLASS);
        } else {
            self.page.add_class(&instance.root, INERT_CLASS);
        }
    }

    /// Bring every instance in line with the engine state.
    pub fn sync_all(&self) {
        let Some(actions) = self.actions.upgrade() else {
            return;
        };
        self.sync_with(&actions.preferences(), actions.consent_granted());
    }

    pub fn sync_with(&self, prefs: &UserPreferences, granted: bool) {
        for instance in self.instances.borrow().iter() {
            self.sync(instance, prefs, granted);
        }
    }

    /// Show `message` in every notification area for a moment.
    pub fn notify(&self, message: &str) {
        for area in self.page.query_all(NOTIFICATION) {
            let Some(text) = self.first_within(&area, NOTIFICATION_TEXT) else {
                continue;
            };
            self.page.set_text(&text, message);
            self.page.set_visible(&area, true);
            self.page.add_class(&area, SHOW_CLASS);

            let page = Rc::clone(&self.page);
            defer(&self.runtime, self.notification_ms, move || {
                page.set_visible(&area, false);
                page.remove_class(&area, SHOW_CLASS);
            });
        }
    }

    pub fn len(&self) -> usize {
        self.instances.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.borrow().is_empty()
    }

    pub fn detach_all(&self) {
        for instance in self.instances.borrow_mut().drain(..) {
            for key in instance.keys {
                self.page.unlisten(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::testing::{FakePage, ManualRuntime, NodeId};

    #[derive(Default)]
    struct FakeActions {
        prefs: RefCell<UserPreferences>,
        granted: Cell<bool>,
        previews: RefCell<Vec<i32>>,
        commits: RefCell<Vec<i32>>,
        saves: Cell<usize>,
    }

    impl WidgetActions for FakeActions {
        fn preferences(&self) -> UserPreferences {
            self.prefs.borrow().clone()
        }
        fn consent_granted(&self) -> bool {
            self.granted.get()
        }
        fn toggle_mute(&self) {
            if !self.granted.get() {
                self.granted.set(true);
                return;
            }
            let mut prefs = self.prefs.borrow_mut();
            prefs.muted = !prefs.muted;
        }
        fn preview_volume(&self, volume: i32) {
            self.previews.borrow_mut().push(volume);
        }
        fn commit_volume(&self, volume: i32) {
            self.commits.borrow_mut().push(volume);
            self.prefs.borrow_mut().volume = volume.clamp(0, 100) as u8;
        }
        fn save_preferences(&self) -> SaveOutcome {
            self.saves.set(self.saves.get() + 1);
            SaveOutcome::Primary
        }
    }

    struct Parts {
        root: NodeId,
        mute: NodeId,
        on: NodeId,
        off: NodeId,
        slider: NodeId,
        readout: NodeId,
        save: NodeId,
        expand: NodeId,
    }

    fn build_widget(page: &FakePage, parent: Option<NodeId>) -> Parts {
        let root = page.element(".nova-sound-fx-controls", parent);
        let mute = page.element(".nova-mute-btn", Some(root));
        let on = page.element(".nova-icon-volume-on", Some(mute));
        let off = page.element(".nova-icon-volume-off", Some(mute));
        let slider = page.element(".nova-volume-slider", Some(root));
        let readout = page.element(".nova-volume-value", Some(root));
        let save = page.element(".nova-save-btn", Some(root));
        let expand = page.element(".nova-expand-btn", Some(root));
        Parts {
            root,
            mute,
            on,
            off,
            slider,
            readout,
            save,
            expand,
        }
    }

    struct Setup {
        rt: Rc<ManualRuntime>,
        page: Rc<FakePage>,
        actions: Rc<FakeActions>,
        widgets: Rc<Widgets<FakePage>>,
    }

    fn setup() -> Setup {
        let rt = ManualRuntime::new();
        let page = FakePage::new("https://shop.test/");
        let actions = Rc::new(FakeActions::default());
        let weak: Weak<dyn WidgetActions> = Rc::downgrade(&actions) as Weak<dyn WidgetActions>;
        let widgets = Widgets::new(Rc::clone(&page), weak, rt.as_runtime(), &EngineOptions::default());
        Setup {
            rt,
            page,
            actions,
            widgets,
        }
    }

    #[test]
    fn test_initial_state_reflects_preferences() {
        let s = setup();
        s.actions.prefs.borrow_mut().volume = 40;
        let w = build_widget(&s.page, None);
        assert_eq!(s.widgets.attach_all(), 1);

        assert_eq!(s.page.node(w.slider).value, "40");
        assert_eq!(s.page.node(w.readout).text, "40%");
        assert!(s.page.node(w.on).visible);
        assert!(!s.page.node(w.off).visible);
        assert!(s.page.has_class(&w.root, COLLAPSED_CLASS));
        assert!(s.page.has_class(&w.root, ENTER_CLASS));
        assert!(s.page.has_class(&w.root, INERT_CLASS));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let s = setup();
        let w = build_widget(&s.page, None);
        s.widgets.attach_all();
        s.widgets.attach_all();
        assert_eq!(s.widgets.attach_to(&[w.root]), 0);
        assert_eq!(s.widgets.len(), 1);
        assert_eq!(s.page.node_listener_count(w.slider), 2);
    }

    #[test]
    fn test_slider_previews_on_input_and_commits_on_change() {
        let s = setup();
        let w = build_widget(&s.page, None);
        s.widgets.attach_all();

        for value in ["10", "20", "30"] {
            s.page.set_value(w.slider, value);
            s.page.dispatch(w.slider, "input");
        }
        assert_eq!(*s.actions.previews.borrow(), vec![10, 20, 30]);
        assert!(s.actions.commits.borrow().is_empty());
        assert_eq!(s.page.node(w.readout).text, "30%");

        s.page.dispatch(w.slider, "change");
        assert_eq!(*s.actions.commits.borrow(), vec![30]);
    }

    #[test]
    fn test_toggle_promotes_consent_then_mutes_everywhere() {
        let s = setup();
        let first = build_widget(&s.page, None);
        let second = build_widget(&s.page, None);
        s.widgets.attach_all();

        s.page.dispatch(first.mute, "click");
        assert!(s.actions.granted.get());
        assert!(!s.actions.prefs.borrow().muted, "first click only grants consent");
        assert!(!s.page.has_class(&second.root, INERT_CLASS));

        s.page.dispatch(first.mute, "click");
        assert!(s.actions.prefs.borrow().muted);
        assert!(s.page.node(second.off).visible);
        assert!(!s.page.node(second.on).visible);
    }

    #[test]
    fn test_save_shows_notification_briefly() {
        let s = setup();
        let w = build_widget(&s.page, None);
        let area = s.page.element(".nova-notification", None);
        let text = s.page.element(".nova-notification-text", Some(area));
        s.widgets.attach_all();

        s.page.dispatch(w.save, "click");
        assert_eq!(s.actions.saves.get(), 1);

        s.widgets.notify(SAVED_MESSAGE);
        assert_eq!(s.page.node(text).text, SAVED_MESSAGE);
        assert!(s.page.has_class(&area, "nova-show"));

        s.rt.advance(2000);
        assert!(!s.page.has_class(&area, "nova-show"));
        assert!(!s.page.node(area).visible);
    }

    #[test]
    fn test_expand_button_toggles_collapsed() {
        let s = setup();
        let w = build_widget(&s.page, None);
        s.widgets.attach_all();
        s.page.dispatch(w.expand, "click");
        assert!(!s.page.has_class(&w.root, COLLAPSED_CLASS));
        s.page.dispatch(w.expand, "click");
        assert!(s.page.has_class(&w.root, COLLAPSED_CLASS));
    }

    #[test]
    fn test_late_inserted_widget_attaches() {
        let s = setup();
        s.widgets.attach_all();
        let block = s.page.element(".wp-block", None);
        let w = build_widget(&s.page, Some(block));
        assert_eq!(s.widgets.attach_to(&[block]), 1);

        s.widgets.detach_all();
        assert_eq!(s.page.listener_count(), 0);
        assert_eq!(s.page.node_listener_count(w.mute), 0);
    }
}
