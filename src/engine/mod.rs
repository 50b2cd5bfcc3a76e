//! The engine facade
//!
//! [`Engine`] owns the scene graph, lifecycle tracking, editing state, and
//! reparent coordination, and exposes the operations an embedding calls:
//! feed poses with [`Engine::tick`], manipulate content with the edit and
//! reparent methods, and read back composed transforms from the returned
//! snapshot or a registered listener.

pub mod driver;
pub mod snapshot;

use std::collections::HashMap;

use glam::{DMat4, DVec2};

use crate::compositor::editing::{EditingSession, RecencyList};
use crate::compositor::popout::PopOut;
use crate::core::error::Error;
use crate::core::time::{TickStats, TickTimer};
use crate::core::types::Result;
use crate::lifecycle::surface::RenderSurface;
use crate::lifecycle::tracker::LifecycleTracker;
use crate::math::plane::{plane_intersection, screen_ray};
use crate::reparent::coordinator::{self, PendingSync};
use crate::reparent::{KeyedStore, TransitionSlot};
use crate::scene::attachment::Attachment;
use crate::scene::config::EngineConfig;
use crate::scene::graph::{EntityPath, SceneGraph};
use crate::scene::trackable::TrackableId;

pub use snapshot::{EntityRender, TickSnapshot};

/// Callback invoked with every tick's snapshot.
pub type TickListener = Box<dyn FnMut(&TickSnapshot)>;

pub struct Engine {
    pub(crate) graph: SceneGraph,
    pub(crate) tracker: LifecycleTracker,
    pub(crate) surface: Box<dyn RenderSurface>,
    pub(crate) config: EngineConfig,
    pub(crate) editing: Option<EditingSession>,
    pub(crate) transition: Option<TransitionSlot>,
    pub(crate) recency: RecencyList,
    pub(crate) keyed_data: KeyedStore,
    pub(crate) pending_sync: Option<PendingSync>,
    pub(crate) listeners: Vec<TickListener>,
    pub(crate) projection: DMat4,
    pub(crate) correction: DMat4,
    pub(crate) viewport: DVec2,
    pub(crate) final_matrices: HashMap<String, DMat4>,
    pub(crate) timer: TickTimer,
    pub(crate) content_nearby: bool,
}

impl Engine {
    pub fn new(surface: Box<dyn RenderSurface>, config: EngineConfig) -> Self {
        Self {
            graph: SceneGraph::new(),
            tracker: LifecycleTracker::new(),
            surface,
            config,
            editing: None,
            transition: None,
            recency: RecencyList::new(),
            keyed_data: KeyedStore::new(),
            pending_sync: None,
            listeners: Vec::new(),
            projection: DMat4::IDENTITY,
            correction: DMat4::IDENTITY,
            viewport: DVec2::new(1920.0, 1080.0),
            final_matrices: HashMap::new(),
            timer: TickTimer::new(),
            content_nearby: false,
        }
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    pub fn keyed_data(&self) -> &KeyedStore {
        &self.keyed_data
    }

    pub fn keyed_data_mut(&mut self) -> &mut KeyedStore {
        &mut self.keyed_data
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Set the camera projection used for composition and drag raycasts.
    pub fn set_projection(&mut self, projection: DMat4) {
        self.projection = projection;
    }

    /// Set the camera correction (device-to-world rotation). While this is
    /// identity, world anchors are excluded from rendering.
    pub fn set_camera_correction(&mut self, correction: DMat4) {
        self.correction = correction;
    }

    /// Set the viewport size in pixels, used to resolve drag touches.
    pub fn set_viewport(&mut self, viewport: DVec2) {
        self.viewport = viewport;
    }

    /// Register a listener called with every tick snapshot.
    pub fn add_listener(&mut self, listener: TickListener) {
        self.listeners.push(listener);
    }

    /// Bind an attachment into the scene.
    pub fn attach(&mut self, attachment: Attachment) -> EntityPath {
        self.graph.attach(attachment)
    }

    /// Remove an attachment, releasing its render resources.
    pub fn detach(&mut self, path: &EntityPath) -> Result<()> {
        let removed = self.graph.detach(&path.trackable, &path.attachment)?;
        self.surface.release(&path.key());
        for sub_id in removed.subs.keys() {
            let sub_path =
                EntityPath::sub(path.trackable.clone(), path.attachment.clone(), sub_id.clone());
            self.surface.release(&sub_path.key());
            self.final_matrices.remove(&sub_path.key());
        }
        self.tracker.remove(&path.trackable, &path.attachment);
        self.recency.remove(path);
        self.final_matrices.remove(&path.key());
        if self.editing.as_ref().is_some_and(|s| s.path.trackable == path.trackable
            && s.path.attachment == path.attachment)
        {
            self.editing = None;
        }
        Ok(())
    }

    /// Latest composed matrix for an entity, if it rendered last tick.
    pub fn query_final_matrix(&self, path: &EntityPath) -> Option<DMat4> {
        self.final_matrices.get(&path.key()).copied()
    }

    /// Whether renderable content was near the viewer at the last scan.
    pub fn content_nearby(&self) -> bool {
        self.content_nearby
    }

    pub fn tick_stats(&self) -> TickStats {
        self.timer.stats()
    }

    // --- editing -----------------------------------------------------------

    /// Begin a free-form edit on an entity. Any previous edit is committed.
    pub fn begin_edit(&mut self, path: &EntityPath) -> Result<()> {
        let pre_edit = if path.sub.is_some() {
            self.graph.resolve_sub(path)?.position.clone()
        } else {
            self.graph.resolve_attachment(path)?.position.clone()
        };
        self.recency.touch(path);
        self.editing = Some(EditingSession::new(path.clone(), pre_edit));
        log::debug!("begin edit {path}");
        Ok(())
    }

    /// Begin an edit for freshly dropped content, playing the pop-out
    /// animation.
    pub fn begin_drop(&mut self, path: &EntityPath) -> Result<()> {
        self.begin_edit(path)?;
        if let Some(session) = &mut self.editing {
            session.popout = Some(PopOut::new(&self.config));
        }
        Ok(())
    }

    /// Commit the active edit. A no-op when nothing is under edit.
    pub fn end_edit(&mut self) {
        if let Some(session) = self.editing.take() {
            log::debug!("end edit {}", session.path);
        }
        self.transition = None;
    }

    /// Cancel the active edit, restoring the pre-edit position.
    pub fn cancel_edit(&mut self) -> Result<()> {
        let Some(session) = self.editing.take() else {
            return Ok(());
        };
        let restored = session.pre_edit.clone();
        if session.path.sub.is_some() {
            self.graph.resolve_sub_mut(&session.path)?.position = restored;
        } else {
            self.graph.resolve_attachment_mut(&session.path)?.position = restored;
        }
        self.transition = None;
        log::debug!("cancelled edit {}", session.path);
        Ok(())
    }

    /// Move the entity under edit so it tracks a screen touch.
    ///
    /// The touch is unprojected onto the owner's marker plane. With
    /// `use_touch_offset` the first call only records where on the entity
    /// the finger landed, so the entity does not jump under it.
    pub fn drag_to(&mut self, screen: DVec2, use_touch_offset: bool) -> Result<()> {
        let Some(session) = &mut self.editing else {
            return Err(Error::StaleEditSession("drag".into()));
        };
        let path = session.path.clone();

        let Some(point) = self.touch_on_owner_plane(&path, screen) else {
            log::debug!("drag ray missed the marker plane, ignoring");
            return Ok(());
        };

        let current = if path.sub.is_some() {
            let sub = self.graph.resolve_sub(&path)?;
            DVec2::new(sub.position.x, sub.position.y)
        } else {
            let attachment = self.graph.resolve_attachment(&path)?;
            DVec2::new(attachment.position.x, attachment.position.y)
        };

        let session = self.editing.as_mut().ok_or_else(|| Error::StaleEditSession("drag".into()))?;
        let Some(resolved) = session.resolve_drag(point, current, use_touch_offset) else {
            return Ok(());
        };

        if path.sub.is_some() {
            let sub = self.graph.resolve_sub_mut(&path)?;
            sub.position.x = resolved.x;
            sub.position.y = resolved.y;
        } else {
            let attachment = self.graph.resolve_attachment_mut(&path)?;
            attachment.position.x = resolved.x;
            attachment.position.y = resolved.y;
        }
        self.recency.touch(&path);
        Ok(())
    }

    /// Apply a two-touch pinch-scale gesture to the entity under edit.
    ///
    /// `center` is the touch pinned on the entity and `outer` the second
    /// finger; their distance drives the scale. The first call of a pinch
    /// baselines the radius, so scaling starts from the current size, and
    /// the scale never drops below the configured minimum. The position
    /// shifts along with the scale so the content under the pinned finger
    /// stays there instead of sliding away from it.
    pub fn scale_gesture(&mut self, center: DVec2, outer: DVec2) -> Result<()> {
        let Some(session) = &mut self.editing else {
            return Err(Error::StaleEditSession("scale".into()));
        };
        let path = session.path.clone();
        let radius = (outer - center).length();

        let (current_scale, current_xy) = if path.sub.is_some() {
            let position = &self.graph.resolve_sub(&path)?.position;
            (position.scale, DVec2::new(position.x, position.y))
        } else {
            let position = &self.graph.resolve_attachment(&path)?.position;
            (position.scale, DVec2::new(position.x, position.y))
        };

        let session = self.editing.as_mut().ok_or_else(|| Error::StaleEditSession("scale".into()))?;
        let new_scale = session.resolve_scale(radius, current_scale, &self.config);

        // The entity scales about its own origin, so compensate the
        // position to pin the touched point in place.
        let shift = if current_scale.abs() > f64::EPSILON {
            self.touch_on_owner_plane(&path, center)
                .map(|touch| (touch - current_xy) * (1.0 - new_scale / current_scale))
        } else {
            None
        };

        let position = if path.sub.is_some() {
            &mut self.graph.resolve_sub_mut(&path)?.position
        } else {
            &mut self.graph.resolve_attachment_mut(&path)?.position
        };
        position.scale = new_scale;
        if let Some(shift) = shift {
            position.x += shift.x;
            position.y += shift.y;
        }
        self.recency.touch(&path);
        Ok(())
    }

    /// End the pinch gesture; the next pinch re-baselines.
    pub fn end_scale_gesture(&mut self) {
        if let Some(session) = &mut self.editing {
            session.end_scale();
        }
    }

    // --- reparenting -------------------------------------------------------

    /// Move a global attachment to a new trackable.
    ///
    /// The local graph updates immediately; call [`Engine::resolve_sync`]
    /// once the externally-persisted side reports back. Starting a second
    /// move treats the previous one as synced.
    pub fn reparent(&mut self, path: &EntityPath, to: &TrackableId) -> Result<EntityPath> {
        if self.pending_sync.is_some() {
            log::warn!("reparent started with a sync still pending; assuming success");
            self.pending_sync = None;
        }

        let new_object = self.graph.trackable(to).filter(|t| t.visible).map(|t| {
            crate::compositor::compose::object_matrix(&self.projection, &self.correction, &t.pose)
        });

        let old_keys = self.entity_keys(path);
        let (outcome, pending) = coordinator::reparent(
            &mut self.graph,
            &mut self.keyed_data,
            path,
            to,
            new_object.as_ref(),
        )?;
        let new_path = outcome.new_path.clone();

        self.tracker.reassign(
            (&path.trackable, &path.attachment),
            (&new_path.trackable, &new_path.attachment),
        );
        self.recency.rewrite(path, &new_path);
        let new_keys = self.entity_keys(&new_path);
        self.swap_surface_keys(&old_keys, &new_keys);
        for key in &old_keys {
            self.final_matrices.remove(key);
        }

        // A drag in progress follows the attachment; the next tick
        // re-captures its begin pose under the new owner.
        if let Some(session) = &mut self.editing {
            if session.path.trackable == path.trackable
                && session.path.attachment == path.attachment
            {
                session.path.trackable = new_path.trackable.clone();
                session.path.attachment = new_path.attachment.clone();
                if let Some(sub) = &session.path.sub {
                    if let Some(renamed) = outcome.sub_renames.get(sub) {
                        session.path.sub = Some(renamed.clone());
                    }
                }
                session.needs_snapshot = true;
            }
        }
        self.transition = None;
        self.pending_sync = Some(pending);
        Ok(new_path)
    }

    /// Abort the pending reparent, restoring the pre-move state.
    pub fn abort_reparent(&mut self) -> Result<()> {
        let Some(pending) = self.pending_sync.take() else {
            return Ok(());
        };
        self.revert_move(pending)
    }

    /// Report the outcome of the externally-persisted side of the pending
    /// reparent. Failure reverts the local move and returns the error.
    pub fn resolve_sync(&mut self, success: bool) -> Result<()> {
        let Some(pending) = self.pending_sync.take() else {
            return Ok(());
        };
        if success {
            return Ok(());
        }
        let description = format!("{} -> {}", pending.from, pending.to);
        self.revert_move(pending)?;
        Err(Error::DeferredSyncFailure(description))
    }

    fn revert_move(&mut self, pending: PendingSync) -> Result<()> {
        let from = pending.from.clone();
        let to = pending.to.clone();

        let new_keys = self.entity_keys(&to);
        coordinator::abort(&mut self.graph, &mut self.keyed_data, pending)?;

        self.tracker.reassign(
            (&to.trackable, &to.attachment),
            (&from.trackable, &from.attachment),
        );
        self.recency.rewrite(&to, &from);
        let old_keys = self.entity_keys(&from);
        self.swap_surface_keys(&new_keys, &old_keys);
        for key in &new_keys {
            self.final_matrices.remove(key);
        }

        // The pre-move sub ids are back, so any session on the moved
        // attachment can no longer be resolved; drop it.
        let session_on_moved = self.editing.as_ref().is_some_and(|s| {
            s.path.trackable == to.trackable && s.path.attachment == to.attachment
        });
        if session_on_moved {
            self.editing = None;
            log::warn!("edit session dropped by reverted reparent");
        }
        Ok(())
    }

    /// Resolve a screen touch onto the marker plane of the entity's owner.
    /// `None` when the owner is unknown or the ray misses the plane.
    fn touch_on_owner_plane(&self, path: &EntityPath, screen: DVec2) -> Option<DVec2> {
        let trackable = self.graph.trackable(&path.trackable)?;
        // Marker plane in camera space: pose then camera correction
        let plane = self.correction * trackable.pose;
        let ray = screen_ray(screen, self.viewport, &self.projection);
        plane_intersection(&ray, &plane).map(|(x, y)| DVec2::new(x, y))
    }

    /// Path keys for an attachment and all its subs, used for render
    /// surface bookkeeping.
    fn entity_keys(&self, path: &EntityPath) -> Vec<String> {
        let mut keys = vec![path.key()];
        if let Some(attachment) = self.graph.attachment(&path.trackable, &path.attachment) {
            for sub_id in attachment.subs.keys() {
                keys.push(
                    EntityPath::sub(path.trackable.clone(), path.attachment.clone(), sub_id.clone())
                        .key(),
                );
            }
        }
        keys
    }

    fn swap_surface_keys(&mut self, old_keys: &[String], new_keys: &[String]) {
        let had_resources = old_keys.iter().any(|k| self.surface.does_resource_exist(k));
        for key in old_keys {
            self.surface.release(key);
        }
        if had_resources {
            for key in new_keys {
                self.surface.allocate(key);
            }
        }
    }
}
