//! Tether - scene engine demo
//!
//! Runs the engine against a simulated tracking feed: two markers, one of
//! which drifts and drops out partway through, with one attachment dragged
//! free-form mid-run. Logs what renders each second.

use std::collections::HashMap;

use glam::{DMat4, DVec3};

use tether::core::logging;
use tether::engine::Engine;
use tether::lifecycle::MemorySurface;
use tether::scene::{Attachment, EngineConfig, Location, SubAttachment, SubKind, TrackableId};

const TICKS: u64 = 300;

fn main() {
    logging::init();

    let mut engine = Engine::new(Box::new(MemorySurface::new()), EngineConfig::default());
    engine.set_projection(DMat4::perspective_rh_gl(1.0, 16.0 / 9.0, 0.1, 1000.0));

    let mut card = Attachment::new(
        "deskcard",
        TrackableId::new("desk-marker"),
        Location::Global,
    );
    card.add_sub(SubAttachment::new("deskcardvalue", "value", SubKind::Normal));
    card.add_sub(SubAttachment::new("deskcardstore", "store", SubKind::Storage));
    let card_path = engine.attach(card);

    let label = Attachment::new(
        "walllabel",
        TrackableId::new("wall-marker"),
        Location::Local,
    );
    let label_path = engine.attach(label);

    log::info!("starting simulated run: {TICKS} ticks");

    for tick in 0..TICKS {
        let mut poses: HashMap<TrackableId, DMat4> = HashMap::new();

        // The desk marker drifts slowly and drops out for a stretch
        if !(120..160).contains(&tick) {
            let drift = tick as f64 * 0.002;
            poses.insert(
                TrackableId::new("desk-marker"),
                DMat4::from_translation(DVec3::new(drift, 0.0, -2.0))
                    * DMat4::from_rotation_y(drift),
            );
        }
        poses.insert(
            TrackableId::new("wall-marker"),
            DMat4::from_translation(DVec3::new(0.5, 0.3, -4.0)),
        );

        // Drag the card free-form for a while mid-run
        if tick == 60 {
            if let Err(e) = engine.begin_edit(&card_path) {
                log::error!("begin_edit failed: {e}");
            }
        }
        if tick == 200 {
            engine.end_edit();
        }

        let snapshot = engine.tick(&poses);

        if tick % 60 == 0 {
            log::info!(
                "tick {}: {} entities rendering",
                snapshot.tick,
                snapshot.entries.len()
            );
            for entry in &snapshot.entries {
                log::info!(
                    "  {} depth={:.1} opacity={:.2}{}",
                    entry.path,
                    entry.depth_key,
                    entry.opacity,
                    if entry.being_edited { " [editing]" } else { "" }
                );
            }
        }
    }

    match engine.query_final_matrix(&label_path) {
        Some(m) => log::info!("final label transform: {:?}", m.w_axis),
        None => log::info!("label not rendering at end of run"),
    }

    let stats = engine.tick_stats();
    log::info!(
        "done: {} ticks, {:.0} ticks/s over the last second",
        stats.tick_count,
        stats.one_sec.avg
    );
}
