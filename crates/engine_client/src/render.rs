//! Decides when the active canvas is re-rendered after engine commands.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{domain::RenderTarget, protocol::Command};
use tracing::{debug, warn};

use crate::{channel::CommandChannel, error::ChannelError};

/// Placement of the native canvas window the engine draws into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasGeometry {
    pub window_id: u64,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

impl CanvasGeometry {
    pub fn is_known(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    fn to_args(self) -> Vec<Value> {
        vec![
            self.window_id.into(),
            self.left.into(),
            self.top.into(),
            self.width.into(),
            self.height.into(),
            self.scale.into(),
        ]
    }
}

pub trait GeometryProvider: Send + Sync {
    fn geometry(&self) -> Option<CanvasGeometry>;
}

/// Geometry slot updated by the UI as the canvas is laid out.
#[derive(Debug, Clone, Default)]
pub struct SharedGeometry {
    inner: Arc<RwLock<Option<CanvasGeometry>>>,
}

impl SharedGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, geometry: CanvasGeometry) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(geometry);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl GeometryProvider for SharedGeometry {
    fn geometry(&self) -> Option<CanvasGeometry> {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

struct RenderState {
    target: RenderTarget,
    stale: bool,
}

pub struct RenderScheduler {
    state: Mutex<RenderState>,
    geometry: Arc<dyn GeometryProvider>,
    frontend_driven: bool,
}

impl RenderScheduler {
    /// Starts stale so the first command paints the canvas.
    pub fn new(
        target: RenderTarget,
        geometry: Arc<dyn GeometryProvider>,
        frontend_driven: bool,
    ) -> Self {
        Self {
            state: Mutex::new(RenderState {
                target,
                stale: true,
            }),
            geometry,
            frontend_driven,
        }
    }

    pub fn active_target(&self) -> RenderTarget {
        self.lock().target.clone()
    }

    /// Makes `target` active and returns the one it replaced, if different.
    pub fn switch_target(&self, target: RenderTarget) -> Option<RenderTarget> {
        let mut state = self.lock();
        if state.target == target {
            return None;
        }
        Some(std::mem::replace(&mut state.target, target))
    }

    pub fn invalidate(&self) {
        self.lock().stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.lock().stale
    }

    pub fn frontend_driven(&self) -> bool {
        self.frontend_driven
    }

    pub fn render_command(&self, target: &RenderTarget) -> Option<Command> {
        let geometry = self.geometry.geometry().filter(CanvasGeometry::is_known)?;
        Some(Command::new(
            target.address().clone(),
            "renderFrame",
            geometry.to_args(),
        ))
    }

    pub fn redraw_command(target: &RenderTarget) -> Command {
        Command::new(target.address().clone(), "requestRedraw", Vec::new())
    }

    /// Follows a command dispatched against `target` with a render when it
    /// asked for one or the view is stale.
    pub async fn after_command(
        &self,
        channel: &CommandChannel,
        target: &RenderTarget,
        render_requested: bool,
    ) {
        let wanted = (self.frontend_driven && render_requested) || self.is_stale();
        if !wanted {
            return;
        }
        if let Err(err) = self.render_target(channel, target).await {
            warn!(target = %target, "render after command failed: {err}");
        }
    }

    /// Renders the active target unconditionally.
    pub async fn render_now(&self, channel: &CommandChannel) -> Result<Value, ChannelError> {
        let target = self.active_target();
        self.render_target(channel, &target).await
    }

    /// Renders `target` unconditionally.
    ///
    /// Without known geometry nothing is sent and the view is left stale, so
    /// the next command renders instead. Only a render of the active target
    /// clears the stale flag.
    pub async fn render_target(
        &self,
        channel: &CommandChannel,
        target: &RenderTarget,
    ) -> Result<Value, ChannelError> {
        let Some(render) = self.render_command(target) else {
            debug!(target = %target, "canvas geometry unknown, deferring render");
            self.invalidate();
            return Ok(Value::Null);
        };
        let frame = channel.send(&render).await?;
        channel.send(&Self::redraw_command(target)).await?;
        let mut state = self.lock();
        if state.target == *target {
            state.stale = false;
        }
        Ok(frame)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
