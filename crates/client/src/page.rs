//! Host page abstraction: DOM queries, listeners, markers and navigation.
//!
//! The engine never touches `web_sys` directly; it talks to a [`PageHost`].
//! The browser implementation lives in [`web`], and tests drive the engine with
//! a synthetic page instead.

use std::fmt;
use std::rc::Rc;

/// Opaque handle for a registered listener or observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerKey(pub u64);

/// Page-level event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalTarget {
    Document,
    Window,
}

/// What the host should do with an intercepted same-page link click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Let the browser follow the link as usual.
    Proceed,
    /// Prevent the default navigation; the engine navigates itself (or not at all).
    Suppress,
}

pub type NodeHandler<N> = Rc<dyn Fn(&N)>;
pub type GlobalHandler = Rc<dyn Fn()>;
pub type LinkHandler = Rc<dyn Fn(&str) -> LinkAction>;
pub type MutationHandler<N> = Rc<dyn Fn(&[N])>;

/// Page-level decorations the host creates on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decoration {
    /// `.nova-sound-wave`, flashed when a sound plays.
    SoundWave,
    /// `.nova-page-transition-overlay`, shown while an exit sound delays navigation.
    TransitionOverlay,
    /// `.nova-unlock-prompt`, the manual "tap to enable sound" button.
    UnlockPrompt,
}

impl Decoration {
    pub fn class_name(self) -> &'static str {
        match self {
            Decoration::SoundWave => "nova-sound-wave",
            Decoration::TransitionOverlay => "nova-page-transition-overlay",
            Decoration::UnlockPrompt => "nova-unlock-prompt",
        }
    }
}

/// Everything the engine needs from the page it runs in.
///
/// Listener registration must hand back a key that [`PageHost::unlisten`]
/// accepts exactly once; removing an unknown key is a no-op.
pub trait PageHost: 'static {
    type Node: Clone + PartialEq + fmt::Debug + 'static;

    // --- Queries ---

    fn query_all(&self, selector: &str) -> Vec<Self::Node>;
    /// Descendants of `root` matching `selector` (not `root` itself).
    fn query_within(&self, root: &Self::Node, selector: &str) -> Vec<Self::Node>;
    fn matches(&self, node: &Self::Node, selector: &str) -> bool;

    // --- Listeners ---

    fn listen(&self, node: &Self::Node, event: &str, handler: NodeHandler<Self::Node>) -> ListenerKey;
    /// Capture-phase listener on the document or window.
    fn listen_global(&self, target: GlobalTarget, event: &str, handler: GlobalHandler) -> ListenerKey;
    /// Clicks on `<a href>` elements (excluding `data-nova-no-sound` and
    /// `download` links), reported with the absolute target URL.
    fn intercept_links(&self, handler: LinkHandler) -> ListenerKey;
    /// The document coming back from the back-forward cache (`pageshow` with
    /// `persisted` set). Not fired on the first load.
    fn observe_restore(&self, handler: GlobalHandler) -> ListenerKey;
    /// Elements added anywhere under `<body>` after this call.
    fn observe_insertions(&self, handler: MutationHandler<Self::Node>) -> ListenerKey;
    fn unlisten(&self, key: ListenerKey);

    // --- Mutation ---

    fn add_class(&self, node: &Self::Node, class: &str);
    fn remove_class(&self, node: &Self::Node, class: &str);
    fn has_class(&self, node: &Self::Node, class: &str) -> bool;
    fn toggle_class(&self, node: &Self::Node, class: &str) {
        if self.has_class(node, class) {
            self.remove_class(node, class);
        } else {
            self.add_class(node, class);
        }
    }
    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str);
    fn remove_attribute(&self, node: &Self::Node, name: &str);
    fn set_text(&self, node: &Self::Node, text: &str);
    fn set_visible(&self, node: &Self::Node, visible: bool);
    fn input_value(&self, node: &Self::Node) -> Option<String>;
    fn set_input_value(&self, node: &Self::Node, value: &str);

    /// Find the decoration, creating it under `<body>` if needed.
    fn decoration(&self, kind: Decoration) -> Option<Self::Node>;

    // --- Location ---

    /// Absolute URL of the current document.
    fn location(&self) -> String;
    fn navigate(&self, url: &str);
}

/// Path plus query of an absolute or relative location, as matched by
/// transition patterns.
pub fn match_target(location: &str) -> String {
    match url::Url::parse(location) {
        Ok(url) => match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        },
        Err(_) => location.to_string(),
    }
}

/// Whether `target` points at the same origin as `current`.
pub fn same_origin(current: &str, target: &str) -> bool {
    let Ok(base) = url::Url::parse(current) else {
        return false;
    };
    match base.join(target) {
        Ok(resolved) => resolved.origin() == base.origin(),
        Err(_) => false,
    }
}

/// Whether following `target` from `current` stays in the same document,
/// i.e. the two differ at most by fragment.
pub fn same_document(current: &str, target: &str) -> bool {
    let Ok(mut base) = url::Url::parse(current) else {
        return false;
    };
    let Ok(mut resolved) = base.join(target) else {
        return false;
    };
    base.set_fragment(None);
    resolved.set_fragment(None);
    resolved == base
}

#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(target_arch = "wasm32")]
pub use web::WebPage;
