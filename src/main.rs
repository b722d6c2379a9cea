//! Bongo cat overlay entry point.
//!
//! A keyboard-reactive cat drawn in a thin bar at the edge of the screen,
//! written in Rust using:
//! - **smithay-client-toolkit** for the wlr layer-shell surface
//! - **evdev** devices read by a forked capture process
//! - **notify** for config hot reload
//!
//! # Project Structure
//!
//! - [`components`](bongocat::components) – frames, animation sets, sleep windows
//! - [`events`](bongocat::events) – messages sent to the main loop and its waker
//! - [`resources`](bongocat::resources) – config, frame store, shared input flags, animation context
//! - [`systems`](bongocat::systems) – state machine, compositor, input capture, Wayland glue
//!
//! # Main Loop
//!
//! 1. Load the config, take the PID file lock, decode all frames
//! 2. Fork the input capture process (before any thread exists)
//! 3. Start the animation thread, the signal thread, fullscreen polling and
//!    the optional config watcher
//! 4. Connect to the compositor and map the bar
//! 5. Wait on the Wayland socket and the event waker:
//!    - redraw when the animation frame changed or the surface was configured
//!    - apply config reloads and fullscreen changes
//!    - restart input capture if the child died
//! 6. On SIGINT/SIGTERM stop every helper and remove the PID file
//!
//! Losing the bar's output does not end the process; the bar comes back
//! when a suitable output appears.
//!
//! # Running
//!
//! ```sh
//! cargo run --release -- --watch-config
//! ```
//!
//! Assets are looked up in `$XDG_DATA_HOME/bongocat/assets`,
//! `~/.local/share/bongocat/assets`, `/usr/local/share/bongocat/assets`,
//! `/usr/share/bongocat/assets`, then `assets/` next to the executable. Set
//! `asset_dir` to override; a relative value is taken from the config
//! file's directory.

use bongocat::resources::overlayconfig::OverlayConfig;
use clap::Parser;
use log::error;
use std::path::PathBuf;

/// Bongo cat overlay
#[derive(Parser, Debug)]
#[command(
    version,
    about = "A bongo cat that taps along with your keyboard, in a Wayland layer-shell bar."
)]
struct Cli {
    /// Config file to use instead of the default search path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Reload the config file when it changes on disk.
    #[arg(long)]
    watch_config: bool,

    /// Stop the running instance if there is one, otherwise start.
    #[arg(long)]
    toggle: bool,

    /// Log at debug level.
    #[arg(long)]
    debug: bool,

    /// Print the effective config as JSON and exit.
    #[arg(long)]
    dump_config: bool,

    /// Bind the bar to this output (overrides `monitor`).
    #[arg(long, value_name = "NAME")]
    output: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let loaded = OverlayConfig::load(cli.config.as_deref());
    let debug = cli.debug || loaded.as_ref().is_ok_and(|c| c.enable_debug);
    if let Err(e) = bongocat::logging::init(if debug { "debug" } else { "info" }) {
        eprintln!("Logger already installed: {e}");
    }

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };
    if let Some(output) = &cli.output {
        config.monitor = Some(output.clone());
    }

    // Early-exit: print the effective config and quit (no surface needed)
    if cli.dump_config {
        match serde_json::to_string_pretty(&config) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing config: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = overlay::run(&cli, config) {
        error!("{e}");
        std::process::exit(1);
    }
}

#[cfg(all(feature = "wayland", target_os = "linux"))]
mod overlay {
    use super::Cli;
    use bongocat::error::{OverlayError, Result};
    use bongocat::events::overlay::{EventWaker, OverlayEvent, OverlaySender};
    use bongocat::resources::animationcontext::AnimationContext;
    use bongocat::resources::framestore::load_frame_store;
    use bongocat::resources::inputflags::SharedInputFlags;
    use bongocat::resources::overlayconfig::OverlayConfig;
    use bongocat::resources::pidfile::{self, PidFile, PidLock, default_pid_path};
    use bongocat::resources::worldtime::SystemClock;
    use bongocat::systems::configwatcher::ConfigWatcher;
    use bongocat::systems::fullscreen::{
        FullscreenPoller, POLL_INTERVAL, query_fullscreen, wants_fullscreen_detection,
    };
    use bongocat::systems::inputcapture::CaptureSettings;
    use bongocat::systems::inputmonitor::InputMonitor;
    use bongocat::systems::reload::apply_reload;
    use bongocat::systems::render::draw_overlay;
    use bongocat::systems::wayland::{SurfaceOptions, WaylandOverlay};
    use crossbeam_channel::{Receiver, unbounded};
    use log::{debug, error, info, warn};
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Longest wait on the Wayland socket between liveness checks.
    const DISPATCH_TIMEOUT: Duration = Duration::from_secs(1);
    /// Minimum gap between two restarts of a crashing capture child.
    const RESTART_BACKOFF: Duration = Duration::from_secs(5);

    pub fn run(cli: &Cli, config: OverlayConfig) -> Result<()> {
        let pid_path = default_pid_path();
        if cli.toggle && pidfile::toggle(&pid_path)? {
            return Ok(());
        }
        let _pid_file = match PidFile::acquire(&pid_path)? {
            PidLock::Acquired(lock) => lock,
            PidLock::Held(holder) => {
                let who = holder.map_or_else(|| "unknown pid".to_string(), |p| format!("pid {p}"));
                return Err(OverlayError::config(format!(
                    "another instance is already running ({who}); use --toggle to stop it"
                )));
            }
        };

        let frames = load_frame_store(&config)?;
        info!("Loaded {} animation set(s)", frames.len());

        // Fork while this process is still single threaded.
        let flags = Arc::new(SharedInputFlags::new()?);
        let mut monitor =
            InputMonitor::new(Arc::clone(&flags), CaptureSettings::from_config(&config));
        monitor.start()?;

        let waker = Arc::new(EventWaker::new()?);
        let (tx, rx) = unbounded();
        let events = OverlaySender::new(tx, Some(Arc::clone(&waker)));

        let ctx = AnimationContext::new(
            config.clone(),
            frames,
            Arc::clone(&flags),
            Arc::new(SystemClock),
        );
        let redraw = events.clone();
        ctx.set_draw_callback(move || {
            redraw.send(OverlayEvent::Redraw);
        });
        ctx.start()?;

        let mut signals = Signals::new([SIGINT, SIGTERM])
            .map_err(|e| OverlayError::thread(format!("failed to install signal handlers: {e}")))?;
        let signal_handle = signals.handle();
        let signal_events = events.clone();
        let signal_thread = std::thread::Builder::new()
            .name("signals".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!("Received signal {sig}, shutting down");
                    signal_events.send(OverlayEvent::Shutdown);
                }
            })
            .map_err(|e| OverlayError::thread(format!("failed to spawn signal thread: {e}")))?;

        let mut poller = spawn_poller(&config, config.monitor.clone(), &events)?;

        let watcher = if cli.watch_config {
            match config.config_path.clone() {
                Some(path) => Some(ConfigWatcher::spawn(&path, events.clone())?),
                None => {
                    warn!("--watch-config given but no config file is in use");
                    None
                }
            }
        } else {
            None
        };

        let mut wayland = WaylandOverlay::connect(&SurfaceOptions::from_config(&config))?;

        let mut state = MainLoop {
            cli,
            poll_target: config.monitor.clone(),
            config,
            ctx: Arc::clone(&ctx),
            monitor: &mut monitor,
            wayland: &mut wayland,
            last_restart: Instant::now(),
        };
        let result = state.run(&rx, &waker, &events, &mut poller);

        info!("Shutting down");
        if let Some(watcher) = watcher {
            watcher.shutdown();
        }
        if let Some(poller) = poller {
            poller.shutdown();
        }
        signal_handle.close();
        let _ = signal_thread.join();
        ctx.stop();
        monitor.stop();
        result
    }

    /// Start fullscreen polling for the bar on `output`, if wanted.
    fn spawn_poller(
        config: &OverlayConfig,
        output: Option<String>,
        events: &OverlaySender,
    ) -> Result<Option<FullscreenPoller>> {
        if !wants_fullscreen_detection(config) {
            debug!("Fullscreen detection disabled");
            return Ok(None);
        }
        FullscreenPoller::spawn(events.clone(), POLL_INTERVAL, move || {
            query_fullscreen(output.as_deref())
        })
        .map(Some)
    }

    struct MainLoop<'a> {
        cli: &'a Cli,
        config: OverlayConfig,
        ctx: Arc<AnimationContext>,
        monitor: &'a mut InputMonitor,
        wayland: &'a mut WaylandOverlay,
        last_restart: Instant,
        /// Output the fullscreen poller watches.
        poll_target: Option<String>,
    }

    impl MainLoop<'_> {
        fn run(
            &mut self,
            rx: &Receiver<OverlayEvent>,
            waker: &EventWaker,
            events: &OverlaySender,
            poller: &mut Option<FullscreenPoller>,
        ) -> Result<()> {
            loop {
                self.wayland
                    .dispatch(Some(waker.raw_fd()), DISPATCH_TIMEOUT)?;
                waker.drain();

                if self.wayland.take_needs_draw() {
                    self.draw();
                }
                let target = self.wayland.output_name().or_else(|| self.config.monitor.clone());
                if poller.is_some() && target != self.poll_target {
                    self.respawn_poller(events, poller);
                }

                let mut redraw = false;
                for event in rx.try_iter() {
                    match event {
                        OverlayEvent::Redraw => redraw = true,
                        OverlayEvent::FullscreenChanged(fullscreen) => {
                            info!("Fullscreen {}", if fullscreen { "entered" } else { "left" });
                            self.ctx.set_fullscreen(fullscreen);
                        }
                        OverlayEvent::ReloadConfig => self.reload_config(events, poller),
                        OverlayEvent::Shutdown => return Ok(()),
                    }
                }
                if redraw {
                    self.draw();
                }

                self.supervise_input();
            }
        }

        fn draw(&mut self) {
            if self.wayland.is_waiting_for_output() {
                return;
            }
            if let Err(e) = draw_overlay(self.wayland.surface(), &self.ctx) {
                warn!("Failed to present frame: {e}");
            }
        }

        fn supervise_input(&mut self) {
            if self.monitor.check_alive() || self.last_restart.elapsed() < RESTART_BACKOFF {
                return;
            }
            self.last_restart = Instant::now();
            warn!("Restarting input capture");
            if let Err(e) = self.monitor.start() {
                error!("Failed to restart input capture: {e}");
            }
        }

        fn reload_config(&mut self, events: &OverlaySender, poller: &mut Option<FullscreenPoller>) {
            let path = self
                .config
                .config_path
                .clone()
                .or_else(|| self.cli.config.clone());
            let mut new = match OverlayConfig::load(path.as_deref()) {
                Ok(new) => new,
                Err(e) => {
                    error!("Config reload failed, keeping current config: {e}");
                    return;
                }
            };
            if let Some(output) = &self.cli.output {
                new.monitor = Some(output.clone());
            }

            let (new, outcome) = apply_reload(&self.ctx, &self.config, new);

            if outcome.restart_input {
                info!("Input devices changed, restarting capture");
                self.last_restart = Instant::now();
                if let Err(e) = self.monitor.restart(CaptureSettings::from_config(&new)) {
                    error!("Failed to restart input capture: {e}");
                }
            }
            if outcome.recreate_surface {
                info!("Surface settings changed, recreating the bar");
                self.wayland
                    .recreate_surface(&SurfaceOptions::from_config(&new));
            }
            let monitor_changed = new.monitor != self.config.monitor;
            self.config = new;
            if outcome.fullscreen_detection_changed || (monitor_changed && poller.is_some()) {
                self.respawn_poller(events, poller);
            }
        }

        /// Replace the fullscreen poller to match the current config and
        /// output.
        fn respawn_poller(&mut self, events: &OverlaySender, poller: &mut Option<FullscreenPoller>) {
            if let Some(old) = poller.take() {
                old.shutdown();
            }
            self.ctx.set_fullscreen(false);
            self.poll_target = self
                .wayland
                .output_name()
                .or_else(|| self.config.monitor.clone());
            match spawn_poller(&self.config, self.poll_target.clone(), events) {
                Ok(p) => *poller = p,
                Err(e) => error!("Failed to start fullscreen detection: {e}"),
            }
        }
    }
}

#[cfg(not(all(feature = "wayland", target_os = "linux")))]
mod overlay {
    use super::Cli;
    use bongocat::error::{OverlayError, Result};
    use bongocat::resources::overlayconfig::OverlayConfig;

    pub fn run(_cli: &Cli, _config: OverlayConfig) -> Result<()> {
        Err(OverlayError::surface(
            "built without the `wayland` feature; no presentation surface available",
        ))
    }
}
