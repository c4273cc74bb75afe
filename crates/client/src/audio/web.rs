//! Web Audio API backend.

use async_trait::async_trait;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::js_sys;
use web_sys::{AudioBuffer, AudioContext, AudioContextState, GainNode, HtmlAudioElement};

use super::{AudioBackend, AudioError, ContextState};

fn js_reason(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| format!("{:?}", value))
}

/// Resolve `url` against the document location; `reqwest` needs absolute urls on web.
fn absolute_url(url: &str) -> String {
    let base = web_sys::window().and_then(|w| w.location().href().ok());
    base.and_then(|base| url::Url::parse(&base).ok())
        .and_then(|base| base.join(url).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| url.to_string())
}

/// One `AudioContext` with a persistent master gain node wired to the destination.
pub struct WebAudioBackend {
    ctx: Option<AudioContext>,
    master: Option<GainNode>,
}

impl WebAudioBackend {
    pub fn new() -> Self {
        let ctx = match AudioContext::new() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                crate::log_error!("Failed to initialize audio context: {}", js_reason(&e));
                None
            }
        };

        let master = ctx.as_ref().and_then(|ctx| {
            let gain = ctx.create_gain().ok()?;
            gain.connect_with_audio_node(&ctx.destination()).ok()?;
            Some(gain)
        });

        Self { ctx, master }
    }

    fn ctx(&self) -> Result<&AudioContext, AudioError> {
        self.ctx
            .as_ref()
            .ok_or_else(|| AudioError::Unavailable("no audio context".into()))
    }
}

impl Default for WebAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl AudioBackend for WebAudioBackend {
    type Buffer = AudioBuffer;

    fn context_state(&self) -> ContextState {
        match self.ctx.as_ref().map(|ctx| ctx.state()) {
            Some(AudioContextState::Running) => ContextState::Running,
            Some(AudioContextState::Suspended) => ContextState::Suspended,
            _ => ContextState::Closed,
        }
    }

    async fn resume(&self) -> Result<(), AudioError> {
        let promise = self
            .ctx()?
            .resume()
            .map_err(|e| AudioError::Policy(js_reason(&e)))?;
        JsFuture::from(promise)
            .await
            .map(|_| ())
            .map_err(|e| AudioError::Policy(js_reason(&e)))
    }

    fn play_silence(&self) -> Result<(), AudioError> {
        let ctx = self.ctx()?;
        let unavailable = |e: JsValue| AudioError::Unavailable(js_reason(&e));

        let buffer = ctx.create_buffer(1, 1, 22050.0).map_err(unavailable)?;
        let source = ctx.create_buffer_source().map_err(unavailable)?;
        source.set_buffer(Some(&buffer));
        source
            .connect_with_audio_node(&ctx.destination())
            .map_err(unavailable)?;
        source.start().map_err(|e| AudioError::Policy(js_reason(&e)))
    }

    async fn load(&self, url: &str) -> Result<AudioBuffer, AudioError> {
        let ctx = self.ctx()?;
        let network = |reason: String| AudioError::Network {
            url: url.to_string(),
            reason,
        };
        let decode = |reason: String| AudioError::Decode {
            url: url.to_string(),
            reason,
        };

        let response = reqwest::get(absolute_url(url))
            .await
            .map_err(|e| network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(network(format!("HTTP {}", response.status().as_u16())));
        }
        let bytes = response.bytes().await.map_err(|e| network(e.to_string()))?;

        let array = js_sys::Uint8Array::from(bytes.as_ref());
        let promise = ctx
            .decode_audio_data(&array.buffer())
            .map_err(|e| decode(js_reason(&e)))?;
        let decoded = JsFuture::from(promise)
            .await
            .map_err(|e| decode(js_reason(&e)))?;
        decoded
            .dyn_into::<AudioBuffer>()
            .map_err(|_| decode("decoder returned no AudioBuffer".into()))
    }

    fn start(&self, buffer: &AudioBuffer, gain: f32) -> Result<(), AudioError> {
        let ctx = self.ctx()?;
        let master = self
            .master
            .as_ref()
            .ok_or_else(|| AudioError::Unavailable("no master gain".into()))?;
        let unavailable = |e: JsValue| AudioError::Unavailable(js_reason(&e));

        let source = ctx.create_buffer_source().map_err(unavailable)?;
        source.set_buffer(Some(buffer));

        let voice = ctx.create_gain().map_err(unavailable)?;
        voice.gain().set_value(gain);

        source.connect_with_audio_node(&voice).map_err(unavailable)?;
        voice.connect_with_audio_node(master).map_err(unavailable)?;
        source.start().map_err(|e| AudioError::Policy(js_reason(&e)))
    }

    fn set_master_gain(&self, gain: f32) {
        if let Some(master) = &self.master {
            master.gain().set_value(gain);
        }
    }

    async fn play_element(&self, url: &str, volume: f32) -> Result<(), AudioError> {
        let audio = HtmlAudioElement::new_with_src(url)
            .map_err(|e| AudioError::Unavailable(js_reason(&e)))?;
        audio.set_volume(f64::from(volume.clamp(0.0, 1.0)));
        let promise = audio
            .play()
            .map_err(|e| AudioError::Policy(js_reason(&e)))?;
        JsFuture::from(promise)
            .await
            .map(|_| ())
            .map_err(|e| AudioError::Policy(js_reason(&e)))
    }

    fn close(&self) {
        if let Some(ctx) = &self.ctx {
            let _ = ctx.close();
        }
    }
}
