//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `relsync_core` linkage.
//! - Print the relation kind → phase table in a stable order.

use relsync_core::RelationKind;

fn main() {
    println!("relsync_core version={}", relsync_core::core_version());
    for kind in RelationKind::ALL {
        println!("relation_kind={} phase={}", kind, kind.phase());
    }
}
