//! `web_sys` implementation of [`PageHost`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::js_sys;
use web_sys::{
    Document, Element, Event, EventTarget, HtmlAnchorElement, HtmlElement, HtmlInputElement,
    MouseEvent, MutationObserver, MutationObserverInit, MutationRecord, NodeList,
    PageTransitionEvent, Window,
};

use super::{
    Decoration, GlobalHandler, GlobalTarget, LinkAction, LinkHandler, ListenerKey,
    MutationHandler, NodeHandler, PageHost,
};

const WAVE_BARS: usize = 5;

enum Registration {
    Listener {
        target: EventTarget,
        event: String,
        capture: bool,
        callback: Closure<dyn FnMut(Event)>,
    },
    Observer {
        observer: MutationObserver,
        _callback: Closure<dyn FnMut(js_sys::Array, MutationObserver)>,
    },
}

impl Registration {
    fn detach(self) {
        match self {
            Registration::Listener {
                target,
                event,
                capture,
                callback,
            } => {
                let _ = target.remove_event_listener_with_callback_and_bool(
                    &event,
                    callback.as_ref().unchecked_ref(),
                    capture,
                );
            }
            Registration::Observer { observer, .. } => observer.disconnect(),
        }
    }
}

fn elements(list: NodeList) -> Vec<Element> {
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

/// The live document. Every listener closure is owned here until `unlisten`.
pub struct WebPage {
    window: Window,
    document: Document,
    registrations: RefCell<HashMap<u64, Registration>>,
    next_key: Cell<u64>,
}

impl WebPage {
    pub fn new() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        Some(Self {
            window,
            document,
            registrations: RefCell::new(HashMap::new()),
            next_key: Cell::new(1),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn prefers_reduced_motion(&self) -> bool {
        self.window
            .match_media("(prefers-reduced-motion: reduce)")
            .ok()
            .flatten()
            .map(|query| query.matches())
            .unwrap_or(false)
    }

    fn register(&self, registration: Registration) -> ListenerKey {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        self.registrations.borrow_mut().insert(key, registration);
        ListenerKey(key)
    }

    fn add_listener(
        &self,
        target: EventTarget,
        event: &str,
        capture: bool,
        callback: Closure<dyn FnMut(Event)>,
    ) -> ListenerKey {
        if let Err(e) = target.add_event_listener_with_callback_and_bool(
            event,
            callback.as_ref().unchecked_ref(),
            capture,
        ) {
            crate::log_warn!("Failed to add {} listener: {:?}", event, e);
        }
        self.register(Registration::Listener {
            target,
            event: event.to_string(),
            capture,
            callback,
        })
    }

    fn create_decoration(&self, kind: Decoration) -> Option<Element> {
        let body = self.document.body()?;
        let tag = match kind {
            Decoration::UnlockPrompt => "button",
            Decoration::SoundWave | Decoration::TransitionOverlay => "div",
        };
        let element = self.document.create_element(tag).ok()?;
        element.set_class_name(kind.class_name());

        match kind {
            Decoration::SoundWave => {
                for _ in 0..WAVE_BARS {
                    let bar = self.document.create_element("span").ok()?;
                    element.append_child(&bar).ok()?;
                }
            }
            Decoration::UnlockPrompt => {
                let _ = element.set_attribute("type", "button");
                element.set_text_content(Some("Tap to enable sound"));
                if let Some(el) = element.dyn_ref::<HtmlElement>() {
                    let _ = el.style().set_property("display", "none");
                }
            }
            Decoration::TransitionOverlay => {}
        }

        body.append_child(&element).ok()?;
        Some(element)
    }
}

impl Drop for WebPage {
    fn drop(&mut self) {
        for (_, registration) in self.registrations.borrow_mut().drain() {
            registration.detach();
        }
    }
}

impl PageHost for WebPage {
    type Node = Element;

    fn query_all(&self, selector: &str) -> Vec<Element> {
        match self.document.query_selector_all(selector) {
            Ok(list) => elements(list),
            Err(_) => Vec::new(),
        }
    }

    fn query_within(&self, root: &Element, selector: &str) -> Vec<Element> {
        match root.query_selector_all(selector) {
            Ok(list) => elements(list),
            Err(_) => Vec::new(),
        }
    }

    fn matches(&self, node: &Element, selector: &str) -> bool {
        node.matches(selector).unwrap_or(false)
    }

    fn listen(&self, node: &Element, event: &str, handler: NodeHandler<Element>) -> ListenerKey {
        let element = node.clone();
        let callback = Closure::wrap(Box::new(move |_: Event| {
            handler(&element);
        }) as Box<dyn FnMut(Event)>);
        self.add_listener(node.clone().into(), event, false, callback)
    }

    fn listen_global(&self, target: GlobalTarget, event: &str, handler: GlobalHandler) -> ListenerKey {
        let target: EventTarget = match target {
            GlobalTarget::Document => self.document.clone().into(),
            GlobalTarget::Window => self.window.clone().into(),
        };
        let callback = Closure::wrap(Box::new(move |_: Event| {
            handler();
        }) as Box<dyn FnMut(Event)>);
        self.add_listener(target, event, true, callback)
    }

    fn intercept_links(&self, handler: LinkHandler) -> ListenerKey {
        let callback = Closure::wrap(Box::new(move |event: Event| {
            if event.default_prevented() {
                return;
            }
            // Modified clicks open new tabs; the current page is not leaving.
            if let Some(mouse) = event.dyn_ref::<MouseEvent>() {
                if mouse.button() != 0
                    || mouse.ctrl_key()
                    || mouse.meta_key()
                    || mouse.shift_key()
                    || mouse.alt_key()
                {
                    return;
                }
            }
            let Some(anchor) = event
                .target()
                .and_then(|t| t.dyn_into::<Element>().ok())
                .and_then(|el| el.closest("a[href]").ok().flatten())
            else {
                return;
            };
            if anchor.has_attribute("data-nova-no-sound") || anchor.has_attribute("download") {
                return;
            }
            let Some(anchor) = anchor.dyn_ref::<HtmlAnchorElement>() else {
                return;
            };
            if !anchor.target().is_empty() && anchor.target() != "_self" {
                return;
            }
            let href = anchor.href();
            if href.is_empty() {
                return;
            }
            if handler(&href) == LinkAction::Suppress {
                event.prevent_default();
            }
        }) as Box<dyn FnMut(Event)>);
        self.add_listener(self.document.clone().into(), "click", false, callback)
    }

    fn observe_restore(&self, handler: GlobalHandler) -> ListenerKey {
        let callback = Closure::wrap(Box::new(move |event: Event| {
            let persisted = event
                .dyn_ref::<PageTransitionEvent>()
                .map(|e| e.persisted())
                .unwrap_or(false);
            if persisted {
                handler();
            }
        }) as Box<dyn FnMut(Event)>);
        self.add_listener(self.window.clone().into(), "pageshow", true, callback)
    }

    fn observe_insertions(&self, handler: MutationHandler<Element>) -> ListenerKey {
        let callback = Closure::wrap(Box::new(move |records: js_sys::Array, _: MutationObserver| {
            let added: Vec<Element> = records
                .iter()
                .filter_map(|r| r.dyn_into::<MutationRecord>().ok())
                .flat_map(|r| elements(r.added_nodes()))
                .collect();
            if !added.is_empty() {
                handler(&added);
            }
        }) as Box<dyn FnMut(js_sys::Array, MutationObserver)>);

        match MutationObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => {
                let init = MutationObserverInit::new();
                init.set_child_list(true);
                init.set_subtree(true);
                if let Some(body) = self.document.body() {
                    if let Err(e) = observer.observe_with_options(&body, &init) {
                        crate::log_warn!("Failed to observe DOM mutations: {:?}", e);
                    }
                }
                self.register(Registration::Observer {
                    observer,
                    _callback: callback,
                })
            }
            Err(e) => {
                crate::log_warn!("MutationObserver unavailable: {:?}", e);
                let key = self.next_key.get();
                self.next_key.set(key + 1);
                ListenerKey(key)
            }
        }
    }

    fn unlisten(&self, key: ListenerKey) {
        let registration = self.registrations.borrow_mut().remove(&key.0);
        if let Some(registration) = registration {
            registration.detach();
        }
    }

    fn add_class(&self, node: &Element, class: &str) {
        let _ = node.class_list().add_1(class);
    }

    fn remove_class(&self, node: &Element, class: &str) {
        let _ = node.class_list().remove_1(class);
    }

    fn has_class(&self, node: &Element, class: &str) -> bool {
        node.class_list().contains(class)
    }

    fn set_attribute(&self, node: &Element, name: &str, value: &str) {
        let _ = node.set_attribute(name, value);
    }

    fn remove_attribute(&self, node: &Element, name: &str) {
        let _ = node.remove_attribute(name);
    }

    fn set_text(&self, node: &Element, text: &str) {
        node.set_text_content(Some(text));
    }

    fn set_visible(&self, node: &Element, visible: bool) {
        if let Some(el) = node.dyn_ref::<HtmlElement>() {
            let display = if visible { "block" } else { "none" };
            let _ = el.style().set_property("display", display);
        }
    }

    fn input_value(&self, node: &Element) -> Option<String> {
        node.dyn_ref::<HtmlInputElement>().map(|input| input.value())
    }

    fn set_input_value(&self, node: &Element, value: &str) {
        if let Some(input) = node.dyn_ref::<HtmlInputElement>() {
            input.set_value(value);
        }
    }

    fn decoration(&self, kind: Decoration) -> Option<Element> {
        let selector = format!(".{}", kind.class_name());
        if let Ok(Some(existing)) = self.document.query_selector(&selector) {
            return Some(existing);
        }
        self.create_decoration(kind)
    }

    fn location(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn navigate(&self, url: &str) {
        if let Err(e) = self.window.location().set_href(url) {
            crate::log_error!("Navigation to {} failed: {:?}", url, e);
        }
    }
}
