mod audio;
mod config;
mod connection;
mod error;
mod host;
mod media;
mod session;
mod signaling;
mod ui;
mod video;
mod viewer;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dioxus_desktop::{Config, WindowBuilder};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{info, warn};

use crate::config::{
    HostConfig, ViewerConfig, DEFAULT_HTTP_PORT, DEFAULT_ORIGIN, DEFAULT_PUBLIC_ROOT,
};
use crate::media::MediaOutput;
use crate::viewer::{FullscreenSurface, ViewerState};

#[derive(Parser, Debug)]
#[command(name = "whep-viewer")]
#[command(about = "Watch a WHEP stream from a media server, or host the viewer's assets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the viewer and connect to the media server
    View {
        /// Origin the viewer is served from; its host locates the media server
        #[arg(long, env = "WHEP_VIEWER_ORIGIN", default_value = DEFAULT_ORIGIN)]
        origin: String,

        /// Log status changes instead of opening a window
        #[arg(long)]
        headless: bool,
    },
    /// Serve the public asset directory over HTTP
    Serve {
        #[arg(short, long, env = "PORT", default_value_t = DEFAULT_HTTP_PORT)]
        port: u16,

        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,

        #[arg(long, env = "WHEP_VIEWER_PUBLIC", default_value = DEFAULT_PUBLIC_ROOT)]
        root: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::View { origin, headless } => {
            let config = ViewerConfig::new(&origin)?;
            info!("media server endpoint: {}", config.whep_endpoint()?);

            if headless {
                runtime()?.block_on(view_headless(config))
            } else {
                view_desktop(config);
                Ok(())
            }
        }
        Command::Serve { port, bind, root } => {
            let config = HostConfig { bind, port, root };
            runtime()?.block_on(host::serve(config))
        }
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .thread_name("whep-viewer")
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
}

fn view_desktop(config: ViewerConfig) {
    let window = WindowBuilder::new()
        .with_title("WHEP Viewer")
        .with_inner_size(dioxus_desktop::LogicalSize::new(960.0, 600.0));

    dioxus_desktop::launch_with_props(
        ui::Viewer,
        ui::ViewerProps {
            config,
            output: MediaOutput::new(),
        },
        Config::new()
            .with_window(window)
            .with_custom_head(ui::custom_head()),
    );
}

/// Without a window there is nothing to show full screen.
struct NoSurface;

impl FullscreenSurface for NoSurface {
    fn is_fullscreen(&self) -> bool {
        false
    }

    fn request_fullscreen(&self) -> error::Result<()> {
        Err(error::Error::Fullscreen("running headless".into()))
    }

    fn exit_fullscreen(&self) {}
}

async fn view_headless(config: ViewerConfig) -> anyhow::Result<()> {
    let output = MediaOutput::new();
    let (tx, mut rx) = unbounded_channel();
    let mut state = ViewerState::new();
    let mut shown = state.status();

    let connect = session::start(&config, tx, output.clone());
    let shutdown = host::shutdown_signal();
    tokio::pin!(connect, shutdown);
    let mut session = None;
    let mut connecting = true;

    loop {
        tokio::select! {
            started = &mut connect, if connecting => {
                connecting = false;
                session = started;
            }
            Some(event) = rx.recv() => {
                viewer::dispatch(&mut state, event, &NoSurface, &output);
                let status = state.status();
                if status != shown {
                    info!("status: {}", status.unwrap_or("video playing"));
                    shown = status;
                }
            }
            _ = &mut shutdown => break,
        }
    }

    if let Some(session) = session {
        if let Err(e) = session.close().await {
            warn!("failed to close peer connection: {e}");
        }
    }
    Ok(())
}
