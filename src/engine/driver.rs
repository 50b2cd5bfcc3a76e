//! The per-tick driver
//!
//! [`Engine::tick`] ingests the tracking system's pose reports and rebuilds
//! every rendered entity's final matrix from scratch. A failure while
//! processing one attachment is logged and skipped; it never stalls the
//! rest of the tick.

use std::cmp::Ordering;
use std::collections::HashMap;

use glam::DMat4;

use crate::compositor::compose::{
    compose, depth_key, object_matrix, opacity, projected_origin,
};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::lifecycle::tracker::VisibilityState;
use crate::math::matrix::{safe_invert, sanitize};
use crate::reparent::TransitionSlot;
use crate::scene::attachment::{AttachmentId, Location, SubKind};
use crate::scene::graph::EntityPath;
use crate::scene::trackable::TrackableId;

use super::snapshot::{EntityRender, TickSnapshot};
use super::Engine;

impl Engine {
    /// Advance the engine one tick.
    ///
    /// `poses` holds the raw pose of every trackable the tracking system
    /// detected this tick; absence means undetected. Returns the snapshot
    /// of everything that rendered, nearest first.
    pub fn tick(&mut self, poses: &HashMap<TrackableId, DMat4>) -> TickSnapshot {
        self.timer.tick();
        let tick = self.timer.tick_count();

        if let Some(session) = &mut self.editing {
            if let Some(popout) = &mut session.popout {
                popout.advance();
                if popout.finished() {
                    session.popout = None;
                }
            }
        }

        for (id, pose) in poses {
            let trackable = self.graph.ensure_trackable(id);
            trackable.pose = sanitize(pose);
            trackable.visible = true;
            trackable.ticks_missing = 0;
        }
        let all_ids = self.graph.trackable_ids();
        for id in &all_ids {
            if !poses.contains_key(id) {
                if let Some(trackable) = self.graph.trackable_mut(id) {
                    trackable.visible = false;
                    trackable.ticks_missing = trackable.ticks_missing.saturating_add(1);
                }
            }
        }

        let correction_identity = self.correction == DMat4::IDENTITY;
        let mut entries: Vec<EntityRender> = Vec::new();

        for trackable_id in &all_ids {
            let Some(trackable) = self.graph.trackable(trackable_id) else {
                continue;
            };
            // A trackable hosting a sticky attachment is treated as present
            // even before tracking ever reports it, so sticky content
            // renders from the start. World anchors are meaningless until
            // the camera correction is known.
            let detected = (trackable.visible || trackable.hosts_sticky())
                && !(trackable.is_world_anchor && correction_identity);
            let pose = trackable.pose;
            let attachment_ids: Vec<AttachmentId> = trackable.attachments.keys().cloned().collect();

            let object = object_matrix(&self.projection, &self.correction, &pose);
            let camera_distance = (self.correction * pose).w_axis.truncate().length();

            for attachment_id in attachment_ids {
                if let Err(e) = self.process_attachment(
                    trackable_id,
                    &attachment_id,
                    detected,
                    &object,
                    camera_distance,
                    &mut entries,
                ) {
                    log::error!(
                        "tick {tick}: skipping {}/{}: {e}",
                        trackable_id.0,
                        attachment_id.0
                    );
                }
            }
        }

        entries.sort_by(|a, b| {
            b.depth_key
                .partial_cmp(&a.depth_key)
                .unwrap_or(Ordering::Equal)
        });

        self.final_matrices = entries
            .iter()
            .map(|e| (e.path.key(), e.final_matrix))
            .collect();

        if self.config.content_scan_interval > 0 && tick % self.config.content_scan_interval == 0 {
            self.content_nearby = entries.iter().any(|e| e.opacity > 0.0);
        }

        let snapshot = TickSnapshot { tick, entries };
        for listener in &mut self.listeners {
            listener(&snapshot);
        }
        snapshot
    }

    fn process_attachment(
        &mut self,
        trackable_id: &TrackableId,
        attachment_id: &AttachmentId,
        owner_detected: bool,
        object: &DMat4,
        camera_distance: f64,
        entries: &mut Vec<EntityRender>,
    ) -> Result<()> {
        let path = EntityPath::attachment(trackable_id.clone(), attachment_id.clone());

        let (sticky, hosts_sticky, location, saved_temp, sub_list) = {
            let trackable = self
                .graph
                .trackable(trackable_id)
                .ok_or_else(|| Error::UnknownEntity(trackable_id.0.clone()))?;
            let hosts_sticky = trackable.hosts_sticky();
            let attachment = trackable
                .attachments
                .get(attachment_id)
                .ok_or_else(|| Error::UnknownEntity(path.key()))?;
            let sub_list: Vec<(crate::scene::attachment::SubAttachmentId, SubKind)> = attachment
                .subs
                .iter()
                .map(|(id, sub)| (id.clone(), sub.kind))
                .collect();
            (
                attachment.is_sticky(),
                hosts_sticky,
                attachment.location,
                attachment.temp,
                sub_list,
            )
        };

        let editing_this = self.editing.as_ref().is_some_and(|s| {
            s.path.trackable == *trackable_id && s.path.attachment == *attachment_id
        });

        // An entity under edit whose owner just vanished either survives in
        // the transition slot (global) or snaps back (local).
        if editing_this && !owner_detected {
            match location {
                Location::Global => {
                    if self.transition.is_none() {
                        self.transition = Some(TransitionSlot {
                            owner: trackable_id.clone(),
                            attachment: attachment_id.clone(),
                        });
                        log::info!("{path} entered the transition slot");
                    }
                }
                Location::Local => {
                    log::info!("owner of {path} lost mid-edit, restoring pre-edit position");
                    self.cancel_edit()?;
                }
            }
        }

        let in_slot = self.transition.as_ref().is_some_and(|slot| {
            slot.owner == *trackable_id && slot.attachment == *attachment_id
        });
        let exempt = sticky || hosts_sticky || in_slot;

        let (prev, state) = self.tracker.advance(
            trackable_id,
            attachment_id,
            owner_detected,
            exempt,
            self.config.grace_ticks,
        );

        if state == VisibilityState::TornDown {
            if prev != VisibilityState::TornDown {
                self.surface.release(&path.key());
                for (sub_id, _) in &sub_list {
                    let sub_path = EntityPath::sub(
                        trackable_id.clone(),
                        attachment_id.clone(),
                        sub_id.clone(),
                    );
                    self.surface.release(&sub_path.key());
                }
                log::info!("released render resources for {path}");
            }
            if let Some(attachment) = self.graph.attachment_mut(trackable_id, attachment_id) {
                attachment.visible = false;
                attachment.loaded = false;
            }
            return Ok(());
        }

        if state == VisibilityState::Appearing && prev != VisibilityState::Appearing {
            self.surface.allocate(&path.key());
            for (sub_id, kind) in &sub_list {
                if kind.renders() {
                    let sub_path = EntityPath::sub(
                        trackable_id.clone(),
                        attachment_id.clone(),
                        sub_id.clone(),
                    );
                    self.surface.allocate(&sub_path.key());
                }
            }
            if let Some(attachment) = self.graph.attachment_mut(trackable_id, attachment_id) {
                attachment.loaded = true;
            }
        }

        let renders = state.renders();
        if let Some(attachment) = self.graph.attachment_mut(trackable_id, attachment_id) {
            attachment.visible = renders;
        }
        if !renders {
            return Ok(());
        }

        // A live entity the surface lost is hidden rather than drawn blank.
        if !self.surface.does_resource_exist(&path.key()) {
            log::warn!("{path} has no render resource, forcing invisible");
            self.tracker.force_invisible(trackable_id, attachment_id);
            if let Some(attachment) = self.graph.attachment_mut(trackable_id, attachment_id) {
                attachment.visible = false;
            }
            return Ok(());
        }

        // The slot occupant keeps rendering from its last composed pose
        // while its owner is away.
        let object_used = if in_slot && !owner_detected {
            saved_temp
        } else {
            *object
        };

        if editing_this && owner_detected {
            self.apply_edit_math(&path, &object_used)?;
        }

        let session_path = self.editing.as_ref().map(|s| s.path.clone());
        let popout = self.editing.as_ref().and_then(|s| s.popout);

        let position = self.graph.effective_position(&path, self.config.default_scale)?;
        let mut final_matrix = compose(&object_used, position.matrix.as_ref(), &position);
        let being_edited = session_path.as_ref() == Some(&path);
        if being_edited {
            if let Some(popout) = &popout {
                final_matrix = popout.apply(&final_matrix);
            }
        }

        let screen = projected_origin(&final_matrix);
        entries.push(EntityRender {
            final_matrix,
            screen,
            depth_key: depth_key(
                &self.config,
                being_edited,
                self.recency.fraction(&path),
                screen.z,
            ),
            opacity: opacity(&self.config, camera_distance),
            being_edited,
            path,
        });

        for (sub_id, kind) in sub_list {
            if !kind.renders() {
                continue;
            }
            let sub_path =
                EntityPath::sub(trackable_id.clone(), attachment_id.clone(), sub_id);
            let position = self.graph.effective_position(&sub_path, self.config.default_scale)?;
            let mut final_matrix = compose(&object_used, position.matrix.as_ref(), &position);
            let being_edited = session_path.as_ref() == Some(&sub_path);
            if being_edited {
                if let Some(popout) = &popout {
                    final_matrix = popout.apply(&final_matrix);
                }
            }
            if let Ok(sub) = self.graph.resolve_sub_mut(&sub_path) {
                sub.visible = true;
            }
            let screen = projected_origin(&final_matrix);
            entries.push(EntityRender {
                final_matrix,
                screen,
                depth_key: depth_key(
                    &self.config,
                    being_edited,
                    self.recency.fraction(&sub_path),
                    screen.z,
                ),
                opacity: opacity(&self.config, camera_distance),
                being_edited,
                path: sub_path,
            });
        }

        Ok(())
    }

    /// The free-form continuity step, run once per tick for the entity
    /// under edit while its owner is detected.
    ///
    /// On the first edited tick the current composed pose is captured as
    /// `begin` (folding in any pre-existing free-form matrix). Every edited
    /// tick thereafter re-solves the free-form matrix against the fresh
    /// pose, which holds the entity fixed relative to the camera while the
    /// marker moves underneath it.
    fn apply_edit_math(&mut self, path: &EntityPath, object: &DMat4) -> Result<()> {
        let Some(session) = &self.editing else {
            return Ok(());
        };
        let session_path = session.path.clone();

        if session.needs_snapshot {
            let existing = self
                .graph
                .effective_position(&session_path, self.config.default_scale)?
                .matrix
                .unwrap_or(DMat4::IDENTITY);
            let attachment = self.graph.resolve_attachment_mut(path)?;
            attachment.temp = *object;
            attachment.begin = *object * existing;
            if let Some(session) = &mut self.editing {
                session.needs_snapshot = false;
            }
        } else {
            let attachment = self.graph.resolve_attachment_mut(path)?;
            attachment.temp = *object;
        }

        let (temp, begin) = {
            let attachment = self.graph.resolve_attachment(path)?;
            (attachment.temp, attachment.begin)
        };
        let freeform = safe_invert(&temp) * begin;
        self.graph.set_freeform_matrix(&session_path, freeform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::surface::MemorySurface;
    use crate::scene::attachment::{Attachment, FullScreen, SubAttachment};
    use crate::scene::config::EngineConfig;
    use crate::scene::trackable::Trackable;
    use glam::{DVec3, DVec4};

    fn engine() -> Engine {
        Engine::new(Box::new(MemorySurface::new()), EngineConfig::default())
    }

    fn pose_at(z: f64) -> DMat4 {
        DMat4::from_translation(DVec3::new(0.0, 0.0, z))
    }

    fn poses(list: &[(&str, DMat4)]) -> HashMap<TrackableId, DMat4> {
        list.iter()
            .map(|(id, m)| (TrackableId::new(*id), *m))
            .collect()
    }

    fn global_frame(engine: &mut Engine, trackable: &str, frame: &str) -> EntityPath {
        engine.attach(Attachment::new(
            frame,
            TrackableId::new(trackable),
            Location::Global,
        ))
    }

    fn mat_close(a: &DMat4, b: &DMat4, tol: f64) -> bool {
        (0..4).all(|c| (a.col(c) - b.col(c)).abs().max_element() < tol)
    }

    #[test]
    fn test_appears_after_one_tick_delay() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");

        let snap = engine.tick(&poses(&[("m1", pose_at(50.0))]));
        assert!(snap.entry(&path).is_none());

        let snap = engine.tick(&poses(&[("m1", pose_at(50.0))]));
        assert!(snap.entry(&path).is_some());
    }

    #[test]
    fn test_hide_is_idempotent() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");
        engine.tick(&poses(&[("m1", pose_at(50.0))]));
        engine.tick(&poses(&[("m1", pose_at(50.0))]));

        let snap = engine.tick(&poses(&[]));
        assert!(snap.entry(&path).is_none());
        // Repeated absence changes nothing visible
        let snap = engine.tick(&poses(&[]));
        assert!(snap.entry(&path).is_none());
    }

    #[test]
    fn test_resources_released_after_grace_period() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");
        engine.tick(&poses(&[("m1", pose_at(50.0))]));
        engine.tick(&poses(&[("m1", pose_at(50.0))]));
        assert!(engine.surface.does_resource_exist(&path.key()));

        // Disappearance tick plus grace - 1 more: still held
        for _ in 0..3 {
            engine.tick(&poses(&[]));
            assert!(engine.surface.does_resource_exist(&path.key()));
        }
        // Tick grace_ticks after disappearance: released
        engine.tick(&poses(&[]));
        assert!(!engine.surface.does_resource_exist(&path.key()));
    }

    #[test]
    fn test_reappearance_during_grace_keeps_resources() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");
        engine.tick(&poses(&[("m1", pose_at(50.0))]));
        engine.tick(&poses(&[("m1", pose_at(50.0))]));

        for _ in 0..3 {
            engine.tick(&poses(&[]));
        }
        // Back one tick before teardown
        engine.tick(&poses(&[("m1", pose_at(50.0))]));
        let snap = engine.tick(&poses(&[("m1", pose_at(50.0))]));
        assert!(snap.entry(&path).is_some());
        assert!(engine.surface.does_resource_exist(&path.key()));
    }

    #[test]
    fn test_sticky_survives_flapping_owner() {
        let mut engine = engine();
        let mut attachment =
            Attachment::new("menu", TrackableId::new("m1"), Location::Local);
        attachment.full_screen = FullScreen::Sticky;
        let path = engine.attach(attachment);

        engine.tick(&poses(&[("m1", pose_at(50.0))]));
        engine.tick(&poses(&[("m1", pose_at(50.0))]));

        for i in 0..1000 {
            let snap = if i % 2 == 0 {
                engine.tick(&poses(&[]))
            } else {
                engine.tick(&poses(&[("m1", pose_at(50.0))]))
            };
            assert!(snap.entry(&path).is_some(), "tick {i}");
        }
        assert!(engine.surface.does_resource_exist(&path.key()));
    }

    #[test]
    fn test_sticky_renders_before_owner_ever_detected() {
        let mut engine = engine();
        let mut attachment = Attachment::new("menu", TrackableId::new("m1"), Location::Local);
        attachment.full_screen = FullScreen::Sticky;
        let path = engine.attach(attachment);

        // No pose is ever reported for the owner
        engine.tick(&poses(&[]));
        for _ in 0..10 {
            let snap = engine.tick(&poses(&[]));
            assert!(snap.entry(&path).is_some());
        }
        assert!(engine.surface.does_resource_exist(&path.key()));
    }

    #[test]
    fn test_sticky_host_shields_siblings() {
        let mut engine = engine();
        let sibling = global_frame(&mut engine, "m1", "f1");
        let mut sticky = Attachment::new("menu", TrackableId::new("m1"), Location::Local);
        sticky.full_screen = FullScreen::Sticky;
        engine.attach(sticky);

        engine.tick(&poses(&[("m1", pose_at(50.0))]));
        engine.tick(&poses(&[("m1", pose_at(50.0))]));

        for _ in 0..100 {
            engine.tick(&poses(&[]));
        }
        // The sibling never counted down
        assert!(engine.surface.does_resource_exist(&sibling.key()));
    }

    #[test]
    fn test_all_zero_pose_is_survivable() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");
        let zero = DMat4::from_cols_array(&[0.0; 16]);

        engine.tick(&poses(&[("m1", zero)]));
        let snap = engine.tick(&poses(&[("m1", zero)]));

        let entry = snap.entry(&path).unwrap();
        assert!(entry.final_matrix.is_finite());
    }

    #[test]
    fn test_depth_orders_nearest_first() {
        let mut engine = engine();
        let near = global_frame(&mut engine, "near", "f1");
        let far = global_frame(&mut engine, "far", "f2");

        let frame = poses(&[("near", pose_at(50.0)), ("far", pose_at(500.0))]);
        engine.tick(&frame);
        let snap = engine.tick(&frame);

        let near_index = snap.entries.iter().position(|e| e.path == near).unwrap();
        let far_index = snap.entries.iter().position(|e| e.path == far).unwrap();
        assert!(near_index < far_index);
    }

    #[test]
    fn test_recently_touched_stacks_above_at_equal_depth() {
        let mut engine = engine();
        let a = global_frame(&mut engine, "m1", "a");
        let b = global_frame(&mut engine, "m1", "b");

        let frame = poses(&[("m1", pose_at(50.0))]);
        engine.tick(&frame);
        engine.tick(&frame);

        engine.begin_edit(&b).unwrap();
        engine.end_edit();

        let snap = engine.tick(&frame);
        let a_entry = snap.entry(&a).unwrap();
        let b_entry = snap.entry(&b).unwrap();
        assert!(b_entry.depth_key > a_entry.depth_key);
    }

    #[test]
    fn test_edited_entity_stays_camera_fixed() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");

        let pose1 = pose_at(-50.0);
        engine.tick(&poses(&[("m1", pose1)]));
        engine.tick(&poses(&[("m1", pose1)]));

        engine.begin_edit(&path).unwrap();
        let snap = engine.tick(&poses(&[("m1", pose1)]));
        let held = snap.entry(&path).unwrap().final_matrix;

        // The marker moves; the edited entity does not
        let pose2 = DMat4::from_translation(DVec3::new(7.0, -3.0, -60.0))
            * DMat4::from_rotation_y(0.4);
        let snap = engine.tick(&poses(&[("m1", pose2)]));
        let after = snap.entry(&path).unwrap().final_matrix;
        assert!(mat_close(&held, &after, 1e-9));

        // Ending the edit pins the entity to the marker again
        engine.end_edit();
        let snap = engine.tick(&poses(&[("m1", pose2)]));
        let released = snap.entry(&path).unwrap().final_matrix;
        assert!(mat_close(&released, &after, 1e-9));
    }

    #[test]
    fn test_global_edit_survives_owner_loss_in_slot() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");

        let pose = pose_at(-50.0);
        engine.tick(&poses(&[("m1", pose)]));
        engine.tick(&poses(&[("m1", pose)]));

        engine.begin_edit(&path).unwrap();
        let snap = engine.tick(&poses(&[("m1", pose)]));
        let held = snap.entry(&path).unwrap().final_matrix;

        // Owner vanishes mid-drag: the entity keeps rendering, frozen
        for _ in 0..20 {
            let snap = engine.tick(&poses(&[]));
            let entry = snap.entry(&path).unwrap();
            assert!(mat_close(&entry.final_matrix, &held, 1e-9));
        }
        assert!(engine.surface.does_resource_exist(&path.key()));
    }

    #[test]
    fn test_local_edit_cancelled_on_owner_loss() {
        let mut engine = engine();
        let mut attachment = Attachment::new("f1", TrackableId::new("m1"), Location::Local);
        attachment.position.x = 11.0;
        let path = engine.attach(attachment);

        engine.tick(&poses(&[("m1", pose_at(-50.0))]));
        engine.tick(&poses(&[("m1", pose_at(-50.0))]));

        engine.begin_edit(&path).unwrap();
        engine
            .graph_mut()
            .resolve_attachment_mut(&path)
            .unwrap()
            .position
            .x = 99.0;

        engine.tick(&poses(&[]));

        // Session gone, position restored
        assert!(engine.editing.is_none());
        let restored = engine.graph().resolve_attachment(&path).unwrap();
        assert_eq!(restored.position.x, 11.0);
    }

    #[test]
    fn test_storage_and_hidden_subs_never_render() {
        let mut engine = engine();
        let mut attachment = Attachment::new("f1", TrackableId::new("m1"), Location::Global);
        let storage = attachment.add_sub(SubAttachment::new("f1store", "store", SubKind::Storage));
        let hidden = attachment.add_sub(SubAttachment::new("f1hide", "hide", SubKind::Hidden));
        let normal = attachment.add_sub(SubAttachment::new("f1val", "val", SubKind::Normal));
        let path = engine.attach(attachment);

        let frame = poses(&[("m1", pose_at(50.0))]);
        engine.tick(&frame);
        let snap = engine.tick(&frame);

        let sub_path = |id: &crate::scene::attachment::SubAttachmentId| {
            EntityPath::sub(path.trackable.clone(), path.attachment.clone(), id.clone())
        };
        assert!(snap.entry(&sub_path(&normal)).is_some());
        assert!(snap.entry(&sub_path(&storage)).is_none());
        assert!(snap.entry(&sub_path(&hidden)).is_none());
    }

    #[test]
    fn test_world_anchor_waits_for_camera_correction() {
        let mut engine = engine();
        let mut anchor = Trackable::new("world");
        anchor.is_world_anchor = true;
        engine.graph_mut().insert_trackable(anchor);
        let path = global_frame(&mut engine, "world", "f1");

        let frame = poses(&[("world", pose_at(50.0))]);
        engine.tick(&frame);
        engine.tick(&frame);
        let snap = engine.tick(&frame);
        assert!(snap.entry(&path).is_none());

        engine.set_camera_correction(DMat4::from_rotation_x(0.1));
        engine.tick(&frame);
        let snap = engine.tick(&frame);
        assert!(snap.entry(&path).is_some());
    }

    #[test]
    fn test_popout_eases_final_matrix() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");
        let frame = poses(&[("m1", pose_at(-50.0))]);
        engine.tick(&frame);
        engine.tick(&frame);

        engine.begin_drop(&path).unwrap();
        let snap = engine.tick(&frame);
        let early_w = (snap.entry(&path).unwrap().final_matrix * DVec4::new(0.0, 0.0, 0.0, 1.0)).w;

        for _ in 0..engine.config().popout_ticks + 1 {
            engine.tick(&frame);
        }
        let snap = engine.tick(&frame);
        let final_w = (snap.entry(&path).unwrap().final_matrix * DVec4::new(0.0, 0.0, 0.0, 1.0)).w;

        // The perspective divide relaxes from compressed toward natural
        assert!(early_w < final_w);
        assert!((final_w - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_listener_sees_every_tick() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut engine = engine();
        global_frame(&mut engine, "m1", "f1");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        engine.add_listener(Box::new(move |snap| {
            sink.borrow_mut().push((snap.tick, snap.entries.len()));
        }));

        let frame = poses(&[("m1", pose_at(50.0))]);
        engine.tick(&frame);
        engine.tick(&frame);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (1, 0));
        assert_eq!(seen[1].1, 1);
    }

    #[test]
    fn test_content_scan_updates_on_interval() {
        let mut engine = engine();
        global_frame(&mut engine, "m1", "f1");
        assert!(!engine.content_nearby());

        let frame = poses(&[("m1", pose_at(50.0))]);
        for _ in 0..engine.config().content_scan_interval {
            engine.tick(&frame);
        }
        assert!(engine.content_nearby());
    }

    #[test]
    fn test_scale_gesture_two_touch() {
        use glam::DVec2;

        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");
        let frame = poses(&[("m1", pose_at(-50.0))]);
        engine.tick(&frame);
        engine.tick(&frame);

        engine.begin_edit(&path).unwrap();

        // First call baselines at the current radius
        let center = DVec2::new(400.0, 300.0);
        engine.scale_gesture(center, DVec2::new(500.0, 300.0)).unwrap();
        let scale = engine.graph().resolve_attachment(&path).unwrap().position.scale;
        assert!((scale - 1.0).abs() < 1e-12);

        // Widening the pinch by 300px adds 1.0 of scale
        engine.scale_gesture(center, DVec2::new(800.0, 300.0)).unwrap();
        let scale = engine.graph().resolve_attachment(&path).unwrap().position.scale;
        assert!((scale - 2.0).abs() < 1e-12);

        // Collapsing the pinch shrinks below the gesture's baseline scale
        engine.scale_gesture(center, center).unwrap();
        let scale = engine.graph().resolve_attachment(&path).unwrap().position.scale;
        assert!((scale - (1.0 - 100.0 / 300.0)).abs() < 1e-12);

        // A fresh pinch from a wide radius collapses far enough to clamp
        engine.end_scale_gesture();
        engine.scale_gesture(center, DVec2::new(1300.0, 300.0)).unwrap();
        engine.scale_gesture(center, center).unwrap();
        let scale = engine.graph().resolve_attachment(&path).unwrap().position.scale;
        assert!((scale - engine.config().min_scale).abs() < 1e-12);
    }

    #[test]
    fn test_scale_pins_content_under_center_touch() {
        use glam::DVec2;

        let mut engine = engine();
        engine.set_viewport(DVec2::new(800.0, 600.0));
        let path = global_frame(&mut engine, "m1", "f1");
        let frame = poses(&[("m1", pose_at(-10.0))]);
        engine.tick(&frame);
        engine.tick(&frame);

        engine.begin_edit(&path).unwrap();

        // Center touch resolves to plane point (1, 1); baseline call moves
        // nothing
        let center = DVec2::new(440.0, 270.0);
        engine.scale_gesture(center, DVec2::new(540.0, 270.0)).unwrap();
        let p = engine.graph().resolve_attachment(&path).unwrap().position.clone();
        assert!(p.x.abs() < 1e-9 && p.y.abs() < 1e-9);

        // Widening the pinch scales up about the pinned finger: the plane
        // point under it stays put, so the position shifts away from it
        engine.scale_gesture(center, DVec2::new(740.0, 270.0)).unwrap();
        let p = engine.graph().resolve_attachment(&path).unwrap().position.clone();
        assert!((p.scale - 5.0 / 3.0).abs() < 1e-9);
        assert!((p.x - (-2.0 / 3.0)).abs() < 1e-9);
        assert!((p.y - (-2.0 / 3.0)).abs() < 1e-9);
        // The content point that was under the finger is still at (1, 1)
        assert!((p.x + p.scale * 1.0 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_drag_with_touch_offset_does_not_jump() {
        use glam::DVec2;

        let mut engine = engine();
        engine.set_viewport(DVec2::new(800.0, 600.0));
        engine.set_projection(DMat4::perspective_rh_gl(1.0, 800.0 / 600.0, 0.1, 100.0));
        let path = global_frame(&mut engine, "m1", "f1");

        let frame = poses(&[("m1", pose_at(-10.0))]);
        engine.tick(&frame);
        engine.tick(&frame);

        engine.begin_edit(&path).unwrap();

        // First touch lands off-center on the entity: no movement
        engine.drag_to(DVec2::new(500.0, 300.0), true).unwrap();
        let p = engine.graph().resolve_attachment(&path).unwrap().position.clone();
        assert_eq!((p.x, p.y), (0.0, 0.0));

        // Moving the finger moves the entity by the screen delta, offset
        // preserved
        engine.drag_to(DVec2::new(520.0, 300.0), true).unwrap();
        let p = engine.graph().resolve_attachment(&path).unwrap().position.clone();
        assert!(p.x > 0.0);
        assert!(p.y.abs() < 1e-9);
    }

    #[test]
    fn test_edit_ops_without_session_are_rejected() {
        use glam::DVec2;

        let mut engine = engine();
        global_frame(&mut engine, "m1", "f1");

        let err = engine.drag_to(DVec2::new(1.0, 1.0), true).unwrap_err();
        assert!(matches!(err, Error::StaleEditSession(_)));
        let err = engine.scale_gesture(DVec2::ZERO, DVec2::ONE).unwrap_err();
        assert!(matches!(err, Error::StaleEditSession(_)));
    }

    #[test]
    fn test_reparent_then_sync_failure_reverts() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");
        engine.graph_mut().ensure_trackable(&TrackableId::new("m2"));

        let frame = poses(&[("m1", pose_at(50.0)), ("m2", pose_at(60.0))]);
        engine.tick(&frame);
        engine.tick(&frame);

        let new_path = engine.reparent(&path, &TrackableId::new("m2")).unwrap();
        assert!(engine.graph().resolve_attachment(&new_path).is_ok());
        assert!(engine.surface.does_resource_exist(&new_path.key()));

        let err = engine.resolve_sync(false).unwrap_err();
        assert!(matches!(err, Error::DeferredSyncFailure(_)));
        assert!(engine.graph().resolve_attachment(&path).is_ok());
        assert!(engine.graph().resolve_attachment(&new_path).is_err());
        assert!(engine.surface.does_resource_exist(&path.key()));
    }

    #[test]
    fn test_reparent_sync_success_keeps_move() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");
        engine.graph_mut().ensure_trackable(&TrackableId::new("m2"));

        let frame = poses(&[("m1", pose_at(50.0)), ("m2", pose_at(60.0))]);
        engine.tick(&frame);
        engine.tick(&frame);

        let new_path = engine.reparent(&path, &TrackableId::new("m2")).unwrap();
        engine.resolve_sync(true).unwrap();
        assert!(engine.graph().resolve_attachment(&new_path).is_ok());
        assert!(engine.graph().resolve_attachment(&path).is_err());
    }

    #[test]
    fn test_reparent_mid_drag_does_not_jump() {
        let mut engine = engine();
        let path = global_frame(&mut engine, "m1", "f1");
        engine.graph_mut().ensure_trackable(&TrackableId::new("m2"));

        let frame = poses(&[("m1", pose_at(-50.0)), ("m2", pose_at(-80.0))]);
        engine.tick(&frame);
        engine.tick(&frame);

        engine.begin_edit(&path).unwrap();
        let snap = engine.tick(&frame);
        let held = snap.entry(&path).unwrap().final_matrix;

        let new_path = engine.reparent(&path, &TrackableId::new("m2")).unwrap();
        let snap = engine.tick(&frame);
        let after = snap.entry(&new_path).unwrap().final_matrix;
        assert!(mat_close(&held, &after, 1e-9));
    }
}
