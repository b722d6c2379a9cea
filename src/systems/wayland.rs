//! Layer-shell presentation surface.
//!
//! [`WaylandOverlay`] owns the Wayland connection and one `zwlr_layer_surface`
//! anchored to the top (or bottom) edge and stretched across the output. The
//! bar reserves its height as exclusive zone and never takes keyboard focus.
//!
//! Drawing goes to a heap staging buffer exposed through
//! [`PresentationSurface`]; `present()` copies it into an `Argb8888` shm
//! buffer from a [`SlotPool`], damages and commits. A configure with a new
//! size reallocates both.
//!
//! The main loop drives the connection with [`WaylandOverlay::dispatch`],
//! which waits on the Wayland socket and an optional wake fd together.
//!
//! # Output loss
//!
//! When the bar's output is unplugged (or the compositor closes the layer
//! surface) the bar is dropped and the overlay keeps running without one.
//! [`OutputBinding`] decides which returning output gets the bar back: the
//! configured output by name when the bar was bound to it, otherwise any
//! output.

use log::{debug, info, warn};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState},
    delegate_compositor, delegate_layer, delegate_output, delegate_registry, delegate_shm,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    shell::{
        WaylandSurface,
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
    },
    shm::{
        Shm, ShmHandler,
        slot::{Buffer, SlotPool},
    },
};
use smithay_client_toolkit::reexports::client::{
    Connection, EventQueue, QueueHandle,
    backend::WaylandError,
    globals::registry_queue_init,
    protocol::{wl_output, wl_shm, wl_surface},
};
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use crate::error::{OverlayError, Result};
use crate::resources::overlayconfig::{Layer as BarLayer, OverlayConfig, OverlayPosition};
use crate::systems::render::PresentationSurface;

const NAMESPACE: &str = "bongocat";
/// Least time between two attempts to map the bar after losing it.
const REMAP_BACKOFF: Duration = Duration::from_secs(1);

/// Layer-surface settings taken from the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceOptions {
    pub layer: BarLayer,
    pub position: OverlayPosition,
    pub height: u32,
    pub output: Option<String>,
}

impl SurfaceOptions {
    pub fn from_config(config: &OverlayConfig) -> Self {
        Self {
            layer: config.layer,
            position: config.overlay_position,
            height: config.overlay_height.max(1) as u32,
            output: config.monitor.clone(),
        }
    }
}

/// Which output may host the bar after the current one went away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBinding {
    /// Set when the bar was placed on the configured output by name.
    name: Option<String>,
    lost: bool,
}

impl OutputBinding {
    /// `name` is the output the bar was mapped on by name, if any.
    pub fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_string),
            lost: false,
        }
    }

    pub fn mark_lost(&mut self) {
        self.lost = true;
    }

    pub fn mark_mapped(&mut self) {
        self.lost = false;
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// True when the bar is lost and an output called `name` may take it.
    pub fn accepts(&self, name: Option<&str>) -> bool {
        self.lost
            && match &self.name {
                Some(wanted) => name == Some(wanted.as_str()),
                None => true,
            }
    }
}

struct BarSurface {
    layer: LayerSurface,
    width: u32,
    height: u32,
    configured: bool,
    staging: Vec<u8>,
    buffer: Option<Buffer>,
}

struct OverlayState {
    registry_state: RegistryState,
    compositor_state: CompositorState,
    output_state: OutputState,
    shm: Shm,
    layer_shell: LayerShell,
    pool: SlotPool,
    bar: Option<BarSurface>,
    needs_draw: bool,
    options: SurfaceOptions,
    binding: OutputBinding,
    /// Output the bar sits on; learned from `surface_enter` when the
    /// compositor picked it.
    bound_output: Option<wl_output::WlOutput>,
    /// Output the bar was lost with; never a remap target.
    lost_output: Option<wl_output::WlOutput>,
    last_remap: Option<Instant>,
}

pub struct WaylandOverlay {
    queue: EventQueue<OverlayState>,
    qh: QueueHandle<OverlayState>,
    state: OverlayState,
    _conn: Connection,
}

fn surface_err(what: &str, e: impl std::fmt::Display) -> OverlayError {
    OverlayError::surface(format!("{what}: {e}"))
}

impl WaylandOverlay {
    /// Connect to `$WAYLAND_DISPLAY` and map the bar.
    pub fn connect(options: &SurfaceOptions) -> Result<Self> {
        let conn = Connection::connect_to_env()
            .map_err(|e| surface_err("failed to connect to Wayland server", e))?;
        let (globals, mut queue) = registry_queue_init::<OverlayState>(&conn)
            .map_err(|e| surface_err("failed to initialize Wayland registry", e))?;
        let qh = queue.handle();

        let compositor_state = CompositorState::bind(&globals, &qh)
            .map_err(|e| surface_err("wl_compositor is unavailable", e))?;
        let layer_shell = LayerShell::bind(&globals, &qh)
            .map_err(|e| surface_err("layer shell is unavailable", e))?;
        let shm = Shm::bind(&globals, &qh).map_err(|e| surface_err("wl_shm is unavailable", e))?;
        let width_guess = 1920 * options.height as usize * 4;
        let pool = SlotPool::new(width_guess, &shm)
            .map_err(|e| surface_err("failed to allocate shared memory pool", e))?;

        let mut state = OverlayState {
            registry_state: RegistryState::new(&globals),
            output_state: OutputState::new(&globals, &qh),
            compositor_state,
            shm,
            layer_shell,
            pool,
            bar: None,
            needs_draw: false,
            options: options.clone(),
            binding: OutputBinding::default(),
            bound_output: None,
            lost_output: None,
            last_remap: None,
        };
        queue
            .roundtrip(&mut state)
            .map_err(|e| surface_err("failed to collect output metadata", e))?;

        let mut overlay = Self {
            queue,
            qh,
            state,
            _conn: conn,
        };
        overlay.create_bar(options);
        Ok(overlay)
    }

    fn create_bar(&mut self, options: &SurfaceOptions) {
        self.state.options = options.clone();
        let output = self.state.find_output(options.output.as_deref());
        let by_name = output.as_ref().and(options.output.as_deref());
        self.state.binding = OutputBinding::new(by_name.map(str::trim));
        self.state.map_bar(&self.qh, output);
    }

    /// Destroy the bar and map a new one with `options`.
    pub fn recreate_surface(&mut self, options: &SurfaceOptions) {
        self.state.bar = None;
        self.create_bar(options);
    }

    /// Map the bar again if its output came back.
    fn remap_if_lost(&mut self) {
        if !self.state.binding.is_lost() {
            return;
        }
        if self
            .state
            .last_remap
            .is_some_and(|at| at.elapsed() < REMAP_BACKOFF)
        {
            return;
        }
        let outputs = &self.state.output_state;
        let candidate = outputs
            .outputs()
            .filter(|o| Some(o) != self.state.lost_output.as_ref())
            .find(|o| {
                let name = outputs.info(o).and_then(|i| i.name);
                self.state.binding.accepts(name.as_deref())
            });
        if let Some(output) = candidate {
            let name = outputs.info(&output).and_then(|i| i.name);
            info!(
                "Output {} available, mapping the bar again",
                name.as_deref().unwrap_or("<unnamed>")
            );
            self.state.last_remap = Some(Instant::now());
            self.state.map_bar(&self.qh, Some(output));
        }
    }

    /// Flush, wait up to `timeout` for Wayland events or a wakeup on
    /// `wake_fd`, then dispatch whatever arrived.
    pub fn dispatch(&mut self, wake_fd: Option<RawFd>, timeout: Duration) -> Result<()> {
        self.queue
            .dispatch_pending(&mut self.state)
            .map_err(|e| surface_err("Wayland dispatch failed", e))?;
        self.queue
            .flush()
            .map_err(|e| surface_err("Wayland flush failed", e))?;

        if let Some(guard) = self.queue.prepare_read() {
            let mut fds = vec![libc::pollfd {
                fd: guard.connection_fd().as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            }];
            if let Some(fd) = wake_fd {
                fds.push(libc::pollfd {
                    fd,
                    events: libc::POLLIN,
                    revents: 0,
                });
            }
            let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
            // SAFETY: `fds` is a valid array of `fds.len()` pollfd structs.
            let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, millis) };
            if ready > 0 && fds[0].revents & libc::POLLIN != 0 {
                match guard.read() {
                    Ok(_) => {}
                    Err(WaylandError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(surface_err("Wayland read failed", e)),
                }
            }
        }

        self.queue
            .dispatch_pending(&mut self.state)
            .map_err(|e| surface_err("Wayland dispatch failed", e))?;
        self.remap_if_lost();
        Ok(())
    }

    /// True once after a configure asked for a fresh frame.
    pub fn take_needs_draw(&mut self) -> bool {
        std::mem::take(&mut self.state.needs_draw)
    }

    /// Name of the output the bar sits on, once known.
    pub fn output_name(&self) -> Option<String> {
        let output = self.state.bound_output.as_ref()?;
        self.state.output_state.info(output)?.name
    }

    /// True while the bar's output is gone and no replacement showed up.
    pub fn is_waiting_for_output(&self) -> bool {
        self.state.binding.is_lost()
    }

    pub fn surface(&mut self) -> &mut dyn PresentationSurface {
        &mut self.state
    }
}

impl OverlayState {
    fn find_output(&self, wanted: Option<&str>) -> Option<wl_output::WlOutput> {
        let wanted = wanted.map(str::trim).filter(|n| !n.is_empty())?;
        let outputs = &self.output_state;
        let found = outputs
            .outputs()
            .find(|o| outputs.info(o).and_then(|i| i.name).as_deref() == Some(wanted));
        if found.is_none() {
            let available: Vec<String> = outputs
                .outputs()
                .filter_map(|o| outputs.info(&o).and_then(|i| i.name))
                .collect();
            warn!(
                "Output '{wanted}' not found (available: {}), using the compositor's choice",
                available.join(", ")
            );
        }
        found
    }

    /// Create the layer surface on `output` (or the compositor's choice).
    fn map_bar(&mut self, qh: &QueueHandle<Self>, output: Option<wl_output::WlOutput>) {
        let options = &self.options;
        let surface = self.compositor_state.create_surface(qh);
        let layer = match options.layer {
            BarLayer::Top => Layer::Top,
            BarLayer::Overlay => Layer::Overlay,
        };
        let layer = self.layer_shell.create_layer_surface(
            qh,
            surface,
            layer,
            Some(NAMESPACE),
            output.as_ref(),
        );
        let edge = match options.position {
            OverlayPosition::Top => Anchor::TOP,
            OverlayPosition::Bottom => Anchor::BOTTOM,
        };
        layer.set_anchor(edge | Anchor::LEFT | Anchor::RIGHT);
        layer.set_size(0, options.height);
        layer.set_exclusive_zone(options.height as i32);
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);
        layer.commit();

        self.bar = Some(BarSurface {
            layer,
            width: 0,
            height: options.height,
            configured: false,
            staging: Vec::new(),
            buffer: None,
        });
        self.bound_output = output;
        self.lost_output = None;
        self.binding.mark_mapped();
        info!(
            "Layer surface created ({:?}, {:?}, height {})",
            options.layer, options.position, options.height
        );
    }

    /// Drop the bar and wait for an output to put it on.
    fn lose_bar(&mut self) {
        self.bar = None;
        self.lost_output = self.bound_output.take();
        self.binding.mark_lost();
        warn!("Bar lost its output, waiting for one to return");
    }
}

impl PresentationSurface for OverlayState {
    fn size(&self) -> (usize, usize) {
        match &self.bar {
            Some(bar) if bar.configured => (bar.width as usize, bar.height as usize),
            _ => (0, 0),
        }
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        match &mut self.bar {
            Some(bar) if bar.configured => &mut bar.staging,
            _ => &mut [],
        }
    }

    fn present(&mut self) -> Result<()> {
        let (pool, bar) = (&mut self.pool, &mut self.bar);
        let Some(bar) = bar.as_mut().filter(|b| b.configured) else {
            return Ok(());
        };
        let (w, h) = (bar.width as i32, bar.height as i32);
        let stride = w * 4;

        let buffer = match bar.buffer.take() {
            Some(buffer) if buffer.height() == h && buffer.stride() == stride => buffer,
            _ => {
                pool.create_buffer(w, h, stride, wl_shm::Format::Argb8888)
                    .map_err(|e| surface_err("failed to create shm buffer", e))?
                    .0
            }
        };
        let buffer = match pool.canvas(&buffer) {
            Some(canvas) => {
                canvas.copy_from_slice(&bar.staging[..canvas.len()]);
                buffer
            }
            None => {
                // Still held by the compositor.
                let (next, canvas) = pool
                    .create_buffer(w, h, stride, wl_shm::Format::Argb8888)
                    .map_err(|e| surface_err("failed to create shm buffer", e))?;
                canvas.copy_from_slice(&bar.staging[..canvas.len()]);
                next
            }
        };

        let surface = bar.layer.wl_surface();
        surface.damage_buffer(0, 0, w, h);
        buffer
            .attach_to(surface)
            .map_err(|e| surface_err("failed to attach shm buffer", e))?;
        bar.layer.commit();
        bar.buffer = Some(buffer);
        Ok(())
    }
}

impl CompositorHandler for OverlayState {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        surface: &wl_surface::WlSurface,
        output: &wl_output::WlOutput,
    ) {
        let ours = self
            .bar
            .as_ref()
            .is_some_and(|bar| bar.layer.wl_surface() == surface);
        if ours && self.bound_output.is_none() {
            self.bound_output = Some(output.clone());
        }
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for OverlayState {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        if self.bar.is_some() && self.bound_output.as_ref() == Some(&output) {
            self.lose_bar();
        }
    }
}

impl LayerShellHandler for OverlayState {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, layer: &LayerSurface) {
        if self.bar.as_ref().is_some_and(|bar| bar.layer == *layer) {
            info!("Layer surface closed by the compositor");
            self.lose_bar();
        }
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        let Some(bar) = self.bar.as_mut().filter(|b| b.layer == *layer) else {
            return;
        };
        let width = configure.new_size.0.max(1);
        let height = if configure.new_size.1 == 0 {
            bar.height
        } else {
            configure.new_size.1
        };
        if !bar.configured || bar.width != width || bar.height != height {
            debug!("Bar configured to {width}x{height}");
            bar.width = width;
            bar.height = height;
            bar.staging = vec![0; width as usize * height as usize * 4];
            bar.buffer = None;
        }
        bar.configured = true;
        self.needs_draw = true;
    }
}

impl ShmHandler for OverlayState {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

delegate_compositor!(OverlayState);
delegate_output!(OverlayState);
delegate_shm!(OverlayState);
delegate_layer!(OverlayState);
delegate_registry!(OverlayState);

impl ProvidesRegistryState for OverlayState {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_binding_waits_for_its_output() {
        let mut binding = OutputBinding::new(Some("DP-1"));
        assert!(!binding.is_lost());
        assert!(!binding.accepts(Some("DP-1")));

        binding.mark_lost();
        assert!(binding.is_lost());
        assert!(!binding.accepts(Some("HDMI-A-1")));
        assert!(!binding.accepts(None));
        assert!(binding.accepts(Some("DP-1")));

        binding.mark_mapped();
        assert!(!binding.is_lost());
    }

    #[test]
    fn test_fallback_binding_takes_any_output() {
        let mut binding = OutputBinding::new(None);
        binding.mark_lost();
        assert!(binding.accepts(Some("HDMI-A-1")));
        assert!(binding.accepts(None));
    }

    #[test]
    fn test_surface_options_clamp_height() {
        let mut config = OverlayConfig::new();
        config.overlay_height = 0;
        config.monitor = Some("eDP-1".into());
        let options = SurfaceOptions::from_config(&config);
        assert_eq!(options.height, 1);
        assert_eq!(options.output.as_deref(), Some("eDP-1"));
    }
}
