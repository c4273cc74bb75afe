//! Task spawning and timers for the single-threaded event loop.
//!
//! Everything in the engine runs on one thread; futures are `!Send` and are
//! driven by the browser's microtask queue on web.

use std::rc::Rc;

use futures_util::future::LocalBoxFuture;

/// The event loop the engine schedules work on.
pub trait Runtime {
    /// Run a future to completion in the background.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);

    /// A future that resolves after `ms` milliseconds.
    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()>;
}

/// Run `f` after `ms` milliseconds. Each call schedules independently.
pub fn defer(runtime: &Rc<dyn Runtime>, ms: u32, f: impl FnOnce() + 'static) {
    let delay = runtime.sleep(ms);
    runtime.spawn(Box::pin(async move {
        delay.await;
        f();
    }));
}

#[cfg(target_arch = "wasm32")]
mod web {
    use futures_util::future::LocalBoxFuture;
    use futures_util::FutureExt;

    /// Browser event loop: `spawn_local` plus `setTimeout`-backed sleeps.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct WebRuntime;

    impl super::Runtime for WebRuntime {
        fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
            wasm_bindgen_futures::spawn_local(task);
        }

        fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()> {
            gloo_timers::future::TimeoutFuture::new(ms).boxed_local()
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::WebRuntime;
