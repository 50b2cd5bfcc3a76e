//! Effective-position resolution
//!
//! Sub-attachments do not carry an independent world pose. What the
//! compositor consumes is an *effective* position derived from the sub's
//! own offsets and its parent attachment, with rules that differ for
//! local and global parents.

use glam::DMat4;

use crate::core::error::Error;
use crate::core::types::Result;

use super::attachment::{Location, PositionData, SubKind};
use super::graph::{EntityPath, SceneGraph};

impl SceneGraph {
    /// Resolve the effective position for an entity.
    ///
    /// For an attachment this is its own position data. For a sub-attachment
    /// the result depends on the parent's location:
    ///
    /// - `Local` parent: the sub's own offsets. If the sub has never been
    ///   free-form edited but its parent has, the parent's matrix is copied
    ///   onto the sub on first access and persists from then on, so the sub
    ///   follows the parent's historical orientation.
    /// - `Global` parent: offsets are summed with the parent's, scales are
    ///   multiplied (normalized by `default_scale`), and the parent's matrix
    ///   is used directly.
    pub fn effective_position(&mut self, path: &EntityPath, default_scale: f64) -> Result<PositionData> {
        let attachment = self.resolve_attachment(path)?;

        let Some(sub_id) = path.sub.clone() else {
            return Ok(attachment.position.clone());
        };

        let parent = attachment.position.clone();
        let location = attachment.location;

        match location {
            Location::Local => {
                let sub = self.resolve_sub_mut(path)?;
                if sub.position.matrix.is_none() {
                    if let Some(parent_matrix) = parent.matrix {
                        sub.position.matrix = Some(parent_matrix);
                    }
                }
                Ok(sub.position.clone())
            }
            Location::Global => {
                let attachment = self.resolve_attachment(path)?;
                let sub = attachment
                    .subs
                    .get(&sub_id)
                    .ok_or_else(|| Error::UnknownEntity(path.key()))?;
                let divisor = if default_scale.abs() > f64::EPSILON {
                    default_scale
                } else {
                    1.0
                };
                // Logic subs may carry their own free-form matrix
                let matrix = if sub.kind == SubKind::Logic {
                    sub.position.matrix.or(parent.matrix)
                } else {
                    parent.matrix
                };
                Ok(PositionData {
                    x: parent.x + sub.position.x,
                    y: parent.y + sub.position.y,
                    scale: parent.scale * sub.position.scale / divisor,
                    matrix,
                })
            }
        }
    }

    /// Whether a free-form matrix written at `path` actually lands anywhere.
    ///
    /// Attachments are always editable; subs are editable under a local
    /// parent, or anywhere when they are logic-kind. Other subs of global
    /// attachments inherit the parent's matrix.
    pub fn is_freeform_editable(&self, path: &EntityPath) -> bool {
        let Ok(attachment) = self.resolve_attachment(path) else {
            return false;
        };
        if path.sub.is_none() || attachment.location == Location::Local {
            return true;
        }
        self.resolve_sub(path)
            .map(|sub| sub.kind == SubKind::Logic)
            .unwrap_or(false)
    }

    /// Store a free-form matrix at `path`.
    ///
    /// Writes to non-editable entities are rejected with a warning and leave
    /// the graph unchanged; the edit belongs on the parent.
    pub fn set_freeform_matrix(&mut self, path: &EntityPath, matrix: DMat4) -> Result<()> {
        if !self.is_freeform_editable(path) {
            // Still surface UnknownEntity for a dangling path
            self.resolve_attachment(path)?;
            log::warn!(
                "ignoring free-form matrix write to {path}: this entity inherits its parent's matrix"
            );
            return Ok(());
        }
        if path.sub.is_some() {
            self.resolve_sub_mut(path)?.position.matrix = Some(matrix);
        } else {
            self.resolve_attachment_mut(path)?.position.matrix = Some(matrix);
        }
        Ok(())
    }
}
