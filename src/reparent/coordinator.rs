//! The reparent move itself
//!
//! Moving a global attachment to a new trackable is an optimistic local
//! update: the graph changes immediately, and a [`PendingSync`] snapshot is
//! kept so the move can be rolled back if the externally-persisted side
//! fails (or the user aborts mid-drag).
//!
//! A move rewrites identifiers scoped to the old owner, rewrites link
//! endpoints everywhere in the graph, rekeys stored data, corrects scale
//! for the physical size difference between markers, and solves the
//! free-form matrix so the attachment does not jump on screen.

use std::collections::HashMap;

use glam::DMat4;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::matrix::safe_invert;
use crate::scene::attachment::{Attachment, AttachmentId, Link, Location, SubAttachmentId};
use crate::scene::graph::{EntityPath, SceneGraph};
use crate::scene::trackable::{TrackableId, Visualization};

use super::KeyedStore;

/// What a completed (local) reparent produced.
#[derive(Clone, Debug)]
pub struct ReparentOutcome {
    pub new_path: EntityPath,
    /// Old sub id to new sub id, for callers holding sub references.
    pub sub_renames: HashMap<SubAttachmentId, SubAttachmentId>,
}

/// Everything needed to undo an optimistic reparent.
#[derive(Debug)]
pub struct PendingSync {
    pub from: EntityPath,
    pub to: EntityPath,
    original: Attachment,
    rewritten_links: Vec<(TrackableId, AttachmentId, String, Link)>,
    rekeyed: Vec<(String, String)>,
}

/// Identifiers scoped to the old owner are rescoped to the new one; an
/// unscoped id passes through unchanged.
fn rescope(id: &str, from: &TrackableId, to: &TrackableId) -> String {
    match id.strip_prefix(from.0.as_str()) {
        Some(tail) => format!("{}{}", to.0, tail),
        None => id.to_owned(),
    }
}

/// Move a global attachment to a new trackable.
///
/// `new_object` is the destination trackable's current object matrix, used
/// to re-solve the free-form matrix for on-screen continuity; pass `None`
/// when the destination has no pose yet.
pub fn reparent(
    graph: &mut SceneGraph,
    store: &mut KeyedStore,
    path: &EntityPath,
    to: &TrackableId,
    new_object: Option<&DMat4>,
) -> Result<(ReparentOutcome, PendingSync)> {
    let attachment = graph.resolve_attachment(path)?;
    if attachment.location != Location::Global {
        return Err(Error::InvalidReparent(format!(
            "{path} is local to its owner"
        )));
    }
    if graph.trackable(to).is_none() {
        return Err(Error::UnknownEntity(to.0.clone()));
    }
    if *to == path.trackable {
        return Err(Error::InvalidReparent(format!(
            "{path} is already owned by {}",
            to.0
        )));
    }

    let from = path.trackable.clone();
    let scale_factor = scale_correction(graph, &from, to);
    let destination_projected = graph
        .trackable(to)
        .map(|t| t.visualization == Visualization::ProjectedSurface)
        .unwrap_or(false);

    let original = graph.detach(&from, &path.attachment)?;
    let mut moved = original.clone();

    let new_attachment_id = AttachmentId(rescope(&moved.id.0, &from, to));
    let mut sub_renames = HashMap::new();
    let renamed_subs: HashMap<_, _> = moved
        .subs
        .drain()
        .map(|(old_id, mut sub)| {
            let new_id = SubAttachmentId(format!("{}{}", new_attachment_id.0, sub.name));
            sub_renames.insert(old_id, new_id.clone());
            sub.id = new_id.clone();
            (new_id, sub)
        })
        .collect();
    moved.subs = renamed_subs;
    moved.id = new_attachment_id.clone();
    moved.owner = to.clone();
    moved.position.scale *= scale_factor;

    if destination_projected {
        // Projected surfaces lay content out themselves; positional state
        // resets rather than carrying over.
        moved.position.x = 0.0;
        moved.position.y = 0.0;
        moved.position.matrix = None;
        moved.begin = DMat4::IDENTITY;
        moved.temp = DMat4::IDENTITY;
    } else {
        // Solve the free-form matrix so the composed pose under the new
        // owner matches the last pose under the old one.
        let new_temp = new_object.copied().unwrap_or(DMat4::IDENTITY);
        moved.position.matrix = Some(safe_invert(&new_temp) * moved.begin);
        moved.temp = new_temp;
        moved.begin = DMat4::IDENTITY;
    }

    let new_path = graph.attach(moved);

    let rewritten_links = rewrite_links(
        graph,
        (&from, &path.attachment),
        (to, &new_attachment_id),
        &sub_renames,
    );
    let rekeyed = store.rekey(&path.key(), &new_path.key());

    log::info!("reparented {path} -> {new_path} (scale x{scale_factor:.3})");

    Ok((
        ReparentOutcome {
            new_path: new_path.clone(),
            sub_renames,
        },
        PendingSync {
            from: path.clone(),
            to: new_path,
            original,
            rewritten_links,
            rekeyed,
        },
    ))
}

/// Undo an optimistic reparent, restoring the graph and keyed data to the
/// pre-move state.
pub fn abort(graph: &mut SceneGraph, store: &mut KeyedStore, pending: PendingSync) -> Result<()> {
    graph.detach(&pending.to.trackable, &pending.to.attachment)?;
    graph.attach(pending.original);

    for (trackable, attachment, key, old_link) in pending.rewritten_links {
        if let Some(owner) = graph.attachment_mut(&trackable, &attachment) {
            owner.links.insert(key, old_link);
        }
    }

    for (old, new) in pending.rekeyed {
        if let Some(value) = store.remove(&new) {
            store.set(old, value);
        }
    }

    log::info!("reverted reparent {} -> {}", pending.from, pending.to);
    Ok(())
}

/// Scale factor correcting for the physical size difference between the
/// two markers. Unknown sizes contribute no correction.
fn scale_correction(graph: &SceneGraph, from: &TrackableId, to: &TrackableId) -> f64 {
    let from_size = graph.trackable(from).and_then(|t| t.target_size);
    let to_size = graph.trackable(to).and_then(|t| t.target_size);
    match (from_size, to_size) {
        (Some(f), Some(t)) if f > 0.0 => t / f,
        _ => 1.0,
    }
}

/// Rewrite every link endpoint in the graph that referenced the moved
/// attachment. Returns the pre-rewrite links for rollback. The moved
/// attachment's own links are rewritten too but excluded from the rollback
/// list, since rollback restores that attachment wholesale.
fn rewrite_links(
    graph: &mut SceneGraph,
    from: (&TrackableId, &AttachmentId),
    to: (&TrackableId, &AttachmentId),
    sub_renames: &HashMap<SubAttachmentId, SubAttachmentId>,
) -> Vec<(TrackableId, AttachmentId, String, Link)> {
    let mut rewritten = Vec::new();

    for trackable in graph.trackables_mut() {
        let trackable_id = trackable.id.clone();
        for attachment in trackable.attachments.values_mut() {
            let is_moved = trackable_id == *to.0 && attachment.id == *to.1;
            for (key, link) in attachment.links.iter_mut() {
                let before = link.clone();
                let mut touched = false;
                for endpoint in [&mut link.a, &mut link.b] {
                    if endpoint.trackable == *from.0 && endpoint.attachment == *from.1 {
                        endpoint.trackable = to.0.clone();
                        endpoint.attachment = to.1.clone();
                        if let Some(sub) = &endpoint.sub {
                            if let Some(renamed) = sub_renames.get(sub) {
                                endpoint.sub = Some(renamed.clone());
                            }
                        }
                        touched = true;
                    }
                }
                if touched && !is_moved {
                    rewritten.push((trackable_id.clone(), attachment.id.clone(), key.clone(), before));
                }
            }
        }
    }

    rewritten
}
