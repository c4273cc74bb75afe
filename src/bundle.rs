//! Browser entry point: read the page globals, start the engine and publish
//! `window.NovaSoundFX`.

use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use novasound_client::audio::WebAudioBackend;
use novasound_client::page::WebPage;
use novasound_client::runtime::WebRuntime;
use novasound_client::storage::{CookieStorage, LocalStorage};
use novasound_client::{
    log_debug, log_error, log_warn, EngineOptions, FeedSource, Hosts, HttpFeed, PageHost,
    PlayOptions, SaveOutcome, SoundFx,
};
use novasound_shared::{FeedError, SoundFeeds};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::{Promise, Reflect, JSON};
use web_sys::Element;

use crate::page_data::{PageData, GLOBALS_NAME, RULES_NAME};

/// Where the API object is published.
const API_NAME: &str = "NovaSoundFX";

type WebSoundFx = SoundFx<WebPage, WebAudioBackend>;

/// A page global as JSON text; `None` if it is missing or not serialisable.
fn read_global(name: &str) -> Option<String> {
    let window = web_sys::window()?;
    let value = Reflect::get(&window, &JsValue::from_str(name)).ok()?;
    if value.is_undefined() || value.is_null() {
        return None;
    }
    match JSON::stringify(&value) {
        Ok(json) => Some(String::from(json)),
        Err(_) => {
            log_warn!("window.{} cannot be read as JSON", name);
            None
        }
    }
}

/// Rules printed inline by the site, re-read on every reload.
struct InlineFeed;

#[async_trait(?Send)]
impl FeedSource for InlineFeed {
    async fn fetch(&self) -> Result<SoundFeeds, FeedError> {
        let globals = read_global(GLOBALS_NAME).unwrap_or_else(|| "{}".to_string());
        let rules = read_global(RULES_NAME);
        Ok(PageData::parse(&globals, rules.as_deref())?.feeds())
    }
}

fn boot() -> Result<Option<WebSoundFx>> {
    let Some(globals) = read_global(GLOBALS_NAME) else {
        log_debug!("window.{} is not defined; nothing to do", GLOBALS_NAME);
        return Ok(None);
    };
    let rules = read_global(RULES_NAME);
    let data = PageData::parse(&globals, rules.as_deref())
        .with_context(|| format!("window.{GLOBALS_NAME} / window.{RULES_NAME} are malformed"))?;

    let page = WebPage::new().ok_or_else(|| anyhow!("no window or document"))?;
    let environment = data.environment(page.prefers_reduced_motion());
    let feeds: Box<dyn FeedSource> = match &data.settings().feeds_url {
        Some(url) => Box::new(HttpFeed::new(url, Some(&page.location()))),
        None => Box::new(InlineFeed),
    };

    let hosts = Hosts {
        page: Rc::new(page),
        audio: Box::new(WebAudioBackend::new),
        runtime: Rc::new(WebRuntime),
        primary: Box::new(LocalStorage),
        fallback: Some(Box::new(CookieStorage)),
        feeds,
        environment,
    };
    Ok(Some(SoundFx::init(
        data.settings().clone(),
        hosts,
        EngineOptions::default(),
    )))
}

fn publish(api: NovaSoundFx) -> Result<()> {
    let window = web_sys::window().ok_or_else(|| anyhow!("no window"))?;
    Reflect::set(&window, &JsValue::from_str(API_NAME), &JsValue::from(api))
        .map_err(|e| anyhow!("cannot set window.{API_NAME}: {e:?}"))?;
    Ok(())
}

#[wasm_bindgen(start)]
pub fn start() {
    let result = boot().and_then(|fx| match fx {
        Some(fx) => publish(NovaSoundFx { fx: Rc::new(fx) }),
        None => Ok(()),
    });
    if let Err(e) = result {
        log_error!("Failed to start: {:#}", e);
    }
}

/// Decode a `{volume, element}` options object. Missing or odd members fall
/// back to defaults; a bare number is taken as the volume.
fn play_options(options: &JsValue) -> (PlayOptions, Option<Element>) {
    if let Some(volume) = options.as_f64() {
        return (PlayOptions::gain(volume), None);
    }
    if !options.is_object() {
        return (PlayOptions::default(), None);
    }
    let member = |name: &str| Reflect::get(options, &JsValue::from_str(name)).ok();
    let play = member("volume")
        .and_then(|v| v.as_f64())
        .map(PlayOptions::gain)
        .unwrap_or_default();
    let element = member("element")
        .filter(|v| !v.is_undefined())
        .or_else(|| member("onElement"))
        .and_then(|v| v.dyn_into::<Element>().ok());
    (play, element)
}

/// The page-facing API. No method throws.
#[wasm_bindgen(js_name = NovaSoundFX)]
pub struct NovaSoundFx {
    fx: Rc<WebSoundFx>,
}

#[wasm_bindgen(js_class = NovaSoundFX)]
impl NovaSoundFx {
    /// `options` is `{volume?, element?}`; `volume` is a gain in `0..1`.
    /// Resolves to `true` if something was audible.
    pub fn play(&self, url: JsValue, options: JsValue) -> Promise {
        let fx = Rc::clone(&self.fx);
        let url = url.as_string().unwrap_or_default();
        let (options, element) = play_options(&options);
        future_to_promise(async move {
            let outcome = fx.play(&url, options, element).await;
            Ok(JsValue::from_bool(outcome.is_audible()))
        })
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&self, volume: f64) -> u8 {
        if !volume.is_finite() {
            return self.fx.get_volume();
        }
        self.fx.set_volume(volume.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
    }

    #[wasm_bindgen(js_name = getVolume)]
    pub fn get_volume(&self) -> u8 {
        self.fx.get_volume()
    }

    pub fn mute(&self) {
        self.fx.mute();
    }

    pub fn unmute(&self) {
        self.fx.unmute();
    }

    #[wasm_bindgen(js_name = isMuted)]
    pub fn is_muted(&self) -> bool {
        self.fx.is_muted()
    }

    /// Where the preferences ended up: `local`, `cookie` or `session`.
    #[wasm_bindgen(js_name = savePreferences)]
    pub fn save_preferences(&self) -> String {
        match self.fx.save_preferences() {
            SaveOutcome::Primary => "local",
            SaveOutcome::Fallback => "cookie",
            SaveOutcome::SessionOnly => "session",
        }
        .to_string()
    }

    /// Resolves to `true` once the rules are rebound; `false` if the feed failed.
    pub fn reload(&self) -> Promise {
        let fx = Rc::clone(&self.fx);
        future_to_promise(async move {
            let ok = match fx.reload().await {
                Ok(_) => true,
                Err(e) => {
                    log_error!("Reload failed: {}", e);
                    false
                }
            };
            Ok(JsValue::from_bool(ok))
        })
    }

    #[wasm_bindgen(js_name = grantConsent)]
    pub fn grant_consent(&self) {
        self.fx.grant_consent();
    }

    #[wasm_bindgen(js_name = denyConsent)]
    pub fn deny_consent(&self) {
        self.fx.deny_consent();
    }

    #[wasm_bindgen(js_name = resetConsent)]
    pub fn reset_consent(&self) {
        self.fx.reset_consent();
    }

    #[wasm_bindgen(js_name = isActive)]
    pub fn is_active(&self) -> bool {
        self.fx.is_active()
    }

    pub fn destroy(&self) {
        self.fx.destroy();
    }
}
