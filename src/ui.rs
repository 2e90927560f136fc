#![allow(non_snake_case)]

use std::sync::Arc;
use std::time::Duration;

use dioxus::prelude::*;
use dioxus_desktop::{use_window, DesktopContext};
use futures_util::StreamExt;
use tokio::sync::mpsc::unbounded_channel;
use tracing::warn;

use crate::config::ViewerConfig;
use crate::error::{Error, Result};
use crate::media::MediaOutput;
use crate::session::{self, ViewerSession};
use crate::viewer::{dispatch, FullscreenSurface, ViewerEvent, ViewerState};

const STYLE: &str = include_str!("../public/style.css");
const FULLSCREEN_ICON: &str = include_str!("../public/icons/fullscreen.svg");
// How often the view picks up the latest decoded picture.
const FRAME_INTERVAL: Duration = Duration::from_millis(40);

pub fn custom_head() -> String {
    format!("<style>{STYLE}</style>")
}

pub struct ViewerProps {
    pub config: ViewerConfig,
    pub output: MediaOutput,
}

struct WindowSurface(DesktopContext);

impl FullscreenSurface for WindowSurface {
    fn is_fullscreen(&self) -> bool {
        self.0.fullscreen().is_some()
    }

    fn request_fullscreen(&self) -> Result<()> {
        if self.0.current_monitor().is_none() {
            return Err(Error::Fullscreen("window is not on any monitor".into()));
        }
        self.0.set_fullscreen(true);
        Ok(())
    }

    fn exit_fullscreen(&self) {
        self.0.set_fullscreen(false);
    }
}

/// Closes the peer connection when the viewer goes away.
#[derive(Default)]
struct Teardown(Option<Arc<ViewerSession>>);

impl Drop for Teardown {
    fn drop(&mut self) {
        let Some(session) = self.0.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = session.close().await {
                    warn!("failed to close peer connection: {e}");
                }
            });
            return;
        }

        warn!("no async runtime at teardown, closing peer connection in place");
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => {
                if let Err(e) = runtime.block_on(session.close()) {
                    warn!("failed to close peer connection: {e}");
                }
            }
            Err(e) => warn!("peer connection left open: {e}"),
        }
    }
}

pub fn Viewer(cx: Scope<ViewerProps>) -> Element {
    let state = use_ref(cx, ViewerState::new);
    let teardown = use_ref(cx, Teardown::default);
    let frame_url = use_state(cx, || None::<String>);
    let window = use_window(cx);

    let dispatcher = use_coroutine(cx, |mut events: UnboundedReceiver<ViewerEvent>| {
        let state = state.to_owned();
        let surface = WindowSurface(window.clone());
        let output = cx.props.output.clone();
        async move {
            while let Some(event) = events.next().await {
                state.with_mut(|state| dispatch(state, event, &surface, &output));
            }
        }
    });

    use_future(cx, (), |_| {
        let dispatcher = dispatcher.clone();
        let teardown = teardown.to_owned();
        let config = cx.props.config.clone();
        let output = cx.props.output.clone();
        async move {
            let (tx, mut rx) = unbounded_channel();
            let connect = async move {
                if let Some(session) = session::start(&config, tx, output).await {
                    teardown.write_silent().0 = Some(session);
                }
            };
            let forward = async move {
                while let Some(event) = rx.recv().await {
                    dispatcher.send(event);
                }
            };
            futures_util::future::join(connect, forward).await;
        }
    });

    use_future(cx, (), |_| {
        let frame_url = frame_url.to_owned();
        let frames = cx.props.output.frames();
        async move {
            let mut seen = 0;
            let mut tick = tokio::time::interval(FRAME_INTERVAL);
            loop {
                tick.tick().await;
                let Some((seq, frame)) = frames.newer_than(seen) else {
                    continue;
                };
                seen = seq;
                match tokio::task::spawn_blocking(move || frame.to_jpeg_data_url()).await {
                    Ok(Ok(url)) => frame_url.set(Some(url)),
                    Ok(Err(e)) => warn!("failed to show video frame: {e}"),
                    Err(e) => warn!("frame encoding task failed: {e}"),
                }
            }
        }
    });

    let (status, mute_label, mute_icon, mute_class, fullscreen_label, video_class, tracks) = {
        let state = state.read();
        (
            state.status(),
            state.mute_label(),
            state.mute_icon(),
            if state.is_muted() { "muted" } else { "" },
            if state.is_fullscreen() { "Exit fullscreen" } else { "Fullscreen" },
            if state.is_rendering() { "video playing" } else { "video" },
            state.stream().tracks().to_vec(),
        )
    };

    cx.render(rsx! {
        div { id: "video-container", class: "video-container",
            div { id: "video", class: "{video_class}",
                frame_url.get().as_ref().map(|url| rsx!(
                    img { class: "frame", src: "{url}" }
                ))
                tracks.iter().map(|track| rsx!(
                    div { key: "{track.id}", class: "track",
                        span { class: "track-kind", "{track.kind}" }
                        span { class: "track-codec", "{track.mime_type}" }
                    }
                ))
            }
            status.map(|text| rsx!(
                div { id: "status", class: "status", "{text}" }
            ))
            div { class: "controls",
                button {
                    id: "mute-btn",
                    class: "{mute_class}",
                    title: "{mute_label}",
                    onclick: move |_| dispatcher.send(ViewerEvent::UserToggledMute),
                    span { id: "mute-icon", dangerous_inner_html: "{mute_icon}" }
                }
                button {
                    id: "fullscreen-btn",
                    title: "{fullscreen_label}",
                    onclick: move |_| dispatcher.send(ViewerEvent::UserToggledFullscreen),
                    span { dangerous_inner_html: "{FULLSCREEN_ICON}" }
                }
            }
        }
    })
}
