//! Synthetic hosts for driving the engine in unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::future::{poll_fn, LocalBoxFuture};
use futures_util::task::noop_waker;
use futures_util::FutureExt;
use novasound_shared::ClassIdSelector;

use crate::audio::{AudioBackend, AudioError, ContextState};
use crate::page::{
    Decoration, GlobalHandler, GlobalTarget, LinkAction, LinkHandler, ListenerKey,
    MutationHandler, NodeHandler, PageHost,
};
use crate::runtime::Runtime;

// =========================================
// Runtime
// =========================================

/// Single-threaded executor with a virtual clock.
#[derive(Default)]
pub struct ManualRuntime {
    now: Rc<Cell<u64>>,
    timers: RefCell<Vec<u64>>,
    tasks: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
}

impl ManualRuntime {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Poll every task until none makes progress.
    pub fn run(&self) {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        loop {
            let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
            if tasks.is_empty() {
                return;
            }
            let mut progressed = false;
            let mut pending = Vec::new();
            for mut task in tasks {
                match Pin::as_mut(&mut task).poll(&mut cx) {
                    Poll::Ready(()) => progressed = true,
                    Poll::Pending => pending.push(task),
                }
            }
            let spawned = !self.tasks.borrow().is_empty();
            self.tasks.borrow_mut().splice(0..0, pending);
            if !progressed && !spawned {
                return;
            }
        }
    }

    /// Move the clock forward, stopping at every timer on the way.
    pub fn advance(&self, ms: u64) {
        let target = self.now.get() + ms;
        self.run();
        loop {
            let now = self.now.get();
            let next = self
                .timers
                .borrow()
                .iter()
                .copied()
                .filter(|&deadline| deadline > now && deadline <= target)
                .min();
            let Some(deadline) = next else {
                break;
            };
            self.now.set(deadline);
            self.run();
        }
        self.now.set(target);
        self.run();
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn as_runtime(self: &Rc<Self>) -> Rc<dyn Runtime> {
        self.clone()
    }
}

impl Runtime for ManualRuntime {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        self.tasks.borrow_mut().push(task);
    }

    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()> {
        let now = Rc::clone(&self.now);
        let deadline = now.get() + u64::from(ms);
        self.timers.borrow_mut().push(deadline);
        poll_fn(move |_| {
            if now.get() >= deadline {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .boxed_local()
    }
}

// =========================================
// Audio
// =========================================

pub struct FakeAudio {
    pub state: Cell<ContextState>,
    pub resume_allowed: Cell<bool>,
    pub silence_unlocks: Cell<bool>,
    pub hold_loads: Cell<bool>,
    pub element_blocked: Cell<bool>,
    pub failing: RefCell<HashSet<String>>,
    pub loads: RefCell<Vec<String>>,
    pub started: RefCell<Vec<(String, f32)>>,
    pub element_plays: RefCell<Vec<(String, f32)>>,
    pub master_gain: Cell<f32>,
    pub silences: Cell<usize>,
    pub closed: Cell<bool>,
}

impl FakeAudio {
    fn with_state(state: ContextState, resume_allowed: bool) -> Self {
        Self {
            state: Cell::new(state),
            resume_allowed: Cell::new(resume_allowed),
            silence_unlocks: Cell::new(false),
            hold_loads: Cell::new(false),
            element_blocked: Cell::new(false),
            failing: RefCell::new(HashSet::new()),
            loads: RefCell::new(Vec::new()),
            started: RefCell::new(Vec::new()),
            element_plays: RefCell::new(Vec::new()),
            master_gain: Cell::new(1.0),
            silences: Cell::new(0),
            closed: Cell::new(false),
        }
    }

    pub fn running() -> Self {
        Self::with_state(ContextState::Running, true)
    }

    /// A context that starts suspended; `resume_allowed` decides whether resume works.
    pub fn suspended(resume_allowed: bool) -> Self {
        Self::with_state(ContextState::Suspended, resume_allowed)
    }

    pub fn fail_url(&self, url: &str) {
        self.failing.borrow_mut().insert(url.to_string());
    }

    pub fn started_urls(&self) -> Vec<String> {
        self.started.borrow().iter().map(|(u, _)| u.clone()).collect()
    }
}

#[async_trait(?Send)]
impl AudioBackend for FakeAudio {
    type Buffer = String;

    fn context_state(&self) -> ContextState {
        self.state.get()
    }

    async fn resume(&self) -> Result<(), AudioError> {
        if self.resume_allowed.get() && self.state.get() != ContextState::Closed {
            self.state.set(ContextState::Running);
            Ok(())
        } else {
            Err(AudioError::Policy("no user gesture".into()))
        }
    }

    fn play_silence(&self) -> Result<(), AudioError> {
        self.silences.set(self.silences.get() + 1);
        if self.silence_unlocks.get() {
            self.state.set(ContextState::Running);
        }
        Ok(())
    }

    async fn load(&self, url: &str) -> Result<String, AudioError> {
        self.loads.borrow_mut().push(url.to_string());
        poll_fn(|_| {
            if self.hold_loads.get() {
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await;
        if self.failing.borrow().contains(url) {
            return Err(AudioError::Decode {
                url: url.to_string(),
                reason: "corrupt".into(),
            });
        }
        Ok(url.to_string())
    }

    fn start(&self, buffer: &String, gain: f32) -> Result<(), AudioError> {
        self.started.borrow_mut().push((buffer.clone(), gain));
        Ok(())
    }

    fn set_master_gain(&self, gain: f32) {
        self.master_gain.set(gain);
    }

    async fn play_element(&self, url: &str, volume: f32) -> Result<(), AudioError> {
        if self.element_blocked.get() {
            return Err(AudioError::Policy("autoplay blocked".into()));
        }
        self.element_plays.borrow_mut().push((url.to_string(), volume));
        Ok(())
    }

    fn close(&self) {
        self.closed.set(true);
        self.state.set(ContextState::Closed);
    }
}

// =========================================
// Page
// =========================================

pub type NodeId = usize;

#[derive(Debug, Default, Clone)]
pub struct FakeNode {
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub parent: Option<NodeId>,
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub value: String,
    pub visible: bool,
}

enum Listener {
    Node {
        node: NodeId,
        event: String,
        handler: NodeHandler<NodeId>,
    },
    Global {
        target: GlobalTarget,
        event: String,
        handler: GlobalHandler,
    },
    Links(LinkHandler),
    Restore(GlobalHandler),
    Insertions(MutationHandler<NodeId>),
}

/// In-memory DOM supporting class/ID selectors.
pub struct FakePage {
    nodes: RefCell<Vec<FakeNode>>,
    listeners: RefCell<HashMap<u64, Listener>>,
    next_key: Cell<u64>,
    location: RefCell<String>,
    pub navigations: RefCell<Vec<String>>,
}

impl FakePage {
    pub fn new(location: &str) -> Rc<Self> {
        Rc::new(Self {
            nodes: RefCell::new(Vec::new()),
            listeners: RefCell::new(HashMap::new()),
            next_key: Cell::new(1),
            location: RefCell::new(location.to_string()),
            navigations: RefCell::new(Vec::new()),
        })
    }

    /// Create a detached-from-listeners element; `selector` is like `.a.b#id`.
    pub fn element(&self, shape: &str, parent: Option<NodeId>) -> NodeId {
        let mut node = FakeNode {
            parent,
            visible: true,
            ..FakeNode::default()
        };
        let mut current = String::new();
        let mut sigil = None;
        for ch in shape.chars().chain(std::iter::once('.')) {
            if ch == '.' || ch == '#' {
                match sigil {
                    Some('.') if !current.is_empty() => node.classes.push(current.clone()),
                    Some('#') if !current.is_empty() => node.id = Some(current.clone()),
                    _ => {}
                }
                current.clear();
                sigil = Some(ch);
            } else {
                current.push(ch);
            }
        }
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(node);
        nodes.len() - 1
    }

    /// Add an element after startup and notify insertion observers.
    pub fn insert(&self, shape: &str, parent: Option<NodeId>) -> NodeId {
        let id = self.element(shape, parent);
        self.announce(&[id]);
        id
    }

    /// Notify insertion observers about already-created nodes.
    pub fn announce(&self, nodes: &[NodeId]) {
        let handlers: Vec<MutationHandler<NodeId>> = self
            .listeners
            .borrow()
            .values()
            .filter_map(|l| match l {
                Listener::Insertions(h) => Some(h.clone()),
                _ => None,
            })
            .collect();
        for handler in handlers {
            handler(nodes);
        }
    }

    pub fn node(&self, id: NodeId) -> FakeNode {
        self.nodes.borrow()[id].clone()
    }

    pub fn set_value(&self, id: NodeId, value: &str) {
        self.nodes.borrow_mut()[id].value = value.to_string();
    }

    /// Fire `event` on `node` (no bubbling).
    pub fn dispatch(&self, node: NodeId, event: &str) {
        let handlers: Vec<NodeHandler<NodeId>> = self
            .listeners
            .borrow()
            .values()
            .filter_map(|l| match l {
                Listener::Node {
                    node: n,
                    event: e,
                    handler,
                } if *n == node && e == event => Some(handler.clone()),
                _ => None,
            })
            .collect();
        for handler in handlers {
            handler(&node);
        }
    }

    pub fn dispatch_global(&self, target: GlobalTarget, event: &str) {
        let handlers: Vec<GlobalHandler> = self
            .listeners
            .borrow()
            .values()
            .filter_map(|l| match l {
                Listener::Global {
                    target: t,
                    event: e,
                    handler,
                } if *t == target && e == event => Some(handler.clone()),
                _ => None,
            })
            .collect();
        for handler in handlers {
            handler();
        }
    }

    /// Bring the page back from the back-forward cache.
    pub fn restore_from_cache(&self) {
        let handlers: Vec<GlobalHandler> = self
            .listeners
            .borrow()
            .values()
            .filter_map(|l| match l {
                Listener::Restore(h) => Some(h.clone()),
                _ => None,
            })
            .collect();
        for handler in handlers {
            handler();
        }
    }

    /// Click a link; returns what the interceptors decided.
    pub fn click_link(&self, href: &str) -> LinkAction {
        let handlers: Vec<LinkHandler> = self
            .listeners
            .borrow()
            .values()
            .filter_map(|l| match l {
                Listener::Links(h) => Some(h.clone()),
                _ => None,
            })
            .collect();
        let mut action = LinkAction::Proceed;
        for handler in handlers {
            if handler(href) == LinkAction::Suppress {
                action = LinkAction::Suppress;
            }
        }
        action
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn node_listener_count(&self, node: NodeId) -> usize {
        self.listeners
            .borrow()
            .values()
            .filter(|l| matches!(l, Listener::Node { node: n, .. } if *n == node))
            .count()
    }

    pub fn global_listener_count(&self, target: GlobalTarget, event: &str) -> usize {
        self.listeners
            .borrow()
            .values()
            .filter(|l| {
                matches!(l, Listener::Global { target: t, event: e, .. } if *t == target && e == event)
            })
            .count()
    }

    fn register(&self, listener: Listener) -> ListenerKey {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        self.listeners.borrow_mut().insert(key, listener);
        ListenerKey(key)
    }

    fn is_descendant(&self, node: NodeId, root: NodeId) -> bool {
        let nodes = self.nodes.borrow();
        let mut current = nodes[node].parent;
        while let Some(parent) = current {
            if parent == root {
                return true;
            }
            current = nodes[parent].parent;
        }
        false
    }
}

impl PageHost for FakePage {
    type Node = NodeId;

    fn query_all(&self, selector: &str) -> Vec<NodeId> {
        let count = self.nodes.borrow().len();
        (0..count).filter(|&n| self.matches(&n, selector)).collect()
    }

    fn query_within(&self, root: &NodeId, selector: &str) -> Vec<NodeId> {
        self.query_all(selector)
            .into_iter()
            .filter(|&n| self.is_descendant(n, *root))
            .collect()
    }

    fn matches(&self, node: &NodeId, selector: &str) -> bool {
        let Some(selector) = ClassIdSelector::parse(selector) else {
            return false;
        };
        let nodes = self.nodes.borrow();
        let node = &nodes[*node];
        let classes: Vec<&str> = node.classes.iter().map(String::as_str).collect();
        selector.matches(node.id.as_deref(), &classes)
    }

    fn listen(&self, node: &NodeId, event: &str, handler: NodeHandler<NodeId>) -> ListenerKey {
        self.register(Listener::Node {
            node: *node,
            event: event.to_string(),
            handler,
        })
    }

    fn listen_global(&self, target: GlobalTarget, event: &str, handler: GlobalHandler) -> ListenerKey {
        self.register(Listener::Global {
            target,
            event: event.to_string(),
            handler,
        })
    }

    fn intercept_links(&self, handler: LinkHandler) -> ListenerKey {
        self.register(Listener::Links(handler))
    }

    fn observe_restore(&self, handler: GlobalHandler) -> ListenerKey {
        self.register(Listener::Restore(handler))
    }

    fn observe_insertions(&self, handler: MutationHandler<NodeId>) -> ListenerKey {
        self.register(Listener::Insertions(handler))
    }

    fn unlisten(&self, key: ListenerKey) {
        self.listeners.borrow_mut().remove(&key.0);
    }

    fn add_class(&self, node: &NodeId, class: &str) {
        let mut nodes = self.nodes.borrow_mut();
        let classes = &mut nodes[*node].classes;
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
    }

    fn remove_class(&self, node: &NodeId, class: &str) {
        self.nodes.borrow_mut()[*node].classes.retain(|c| c != class);
    }

    fn has_class(&self, node: &NodeId, class: &str) -> bool {
        self.nodes.borrow()[*node].classes.iter().any(|c| c == class)
    }

    fn set_attribute(&self, node: &NodeId, name: &str, value: &str) {
        self.nodes.borrow_mut()[*node]
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    fn remove_attribute(&self, node: &NodeId, name: &str) {
        self.nodes.borrow_mut()[*node].attributes.remove(name);
    }

    fn set_text(&self, node: &NodeId, text: &str) {
        self.nodes.borrow_mut()[*node].text = text.to_string();
    }

    fn set_visible(&self, node: &NodeId, visible: bool) {
        self.nodes.borrow_mut()[*node].visible = visible;
    }

    fn input_value(&self, node: &NodeId) -> Option<String> {
        Some(self.nodes.borrow()[*node].value.clone())
    }

    fn set_input_value(&self, node: &NodeId, value: &str) {
        self.set_value(*node, value);
    }

    fn decoration(&self, kind: Decoration) -> Option<NodeId> {
        let selector = format!(".{}", kind.class_name());
        if let Some(existing) = self.query_all(&selector).into_iter().next() {
            return Some(existing);
        }
        Some(self.element(&selector, None))
    }

    fn location(&self) -> String {
        self.location.borrow().clone()
    }

    fn navigate(&self, url: &str) {
        self.navigations.borrow_mut().push(url.to_string());
    }
}
